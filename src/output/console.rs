//! Tab-separated console table.
//!
//! ```text
//! time                 battery  cpm/(mR/h)  cpm     5m-avg-cpm  5m-min-cpm  5m-max-cpm ...
//! 2024-03-01 12:00:00  75%      1070        1020.0  998.4       840.0       1260.0     ...
//! ```
//!
//! Missing values print as `-`.

use crate::measurement::DeviceRecord;
use crate::output::OutputFormatter;
use crate::throttle::format_span;
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

const TIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

const MISSING: &str = "-";

pub struct ConsoleFormatter {
    windows: Vec<Duration>,
}

impl ConsoleFormatter {
    /// `windows` must match the durations reported in each record, shortest
    /// first.
    pub fn new(windows: Vec<Duration>) -> Self {
        Self { windows }
    }
}

fn optional<T>(value: Option<T>, show: impl FnOnce(T) -> String) -> String {
    value.map(show).unwrap_or_else(|| MISSING.to_string())
}

fn one_decimal(value: f64) -> String {
    format!("{value:.1}")
}

impl OutputFormatter for ConsoleFormatter {
    fn header(&self) -> Option<String> {
        let mut columns = vec![
            "time".to_string(),
            "battery".to_string(),
            "cpm/(mR/h)".to_string(),
            "cpm".to_string(),
        ];
        for window in &self.windows {
            let span = format_span(*window);
            for stat in ["avg", "min", "max"] {
                columns.push(format!("{span}-{stat}-cpm"));
            }
        }
        Some(columns.join("\t"))
    }

    fn format(&self, record: &DeviceRecord) -> String {
        // UTC, so rows sort and compare across hosts
        let time = OffsetDateTime::from(record.timestamp)
            .format(TIME_FORMAT)
            .unwrap_or_else(|_| MISSING.to_string());

        let battery = if record.charging {
            "charging".to_string()
        } else {
            optional(record.battery_percent, |b| format!("{b}%"))
        };

        let mut columns = vec![
            time,
            battery,
            optional(record.effective_conversion_factor(), |f| format!("{f}")),
            optional(record.rate_cpm, one_decimal),
        ];
        for window in &self.windows {
            let stats = record.window(*window).and_then(|w| w.stats);
            columns.push(optional(stats.map(|s| s.avg), one_decimal));
            columns.push(optional(stats.map(|s| s.min), one_decimal));
            columns.push(optional(stats.map(|s| s.max), one_decimal));
        }
        columns.join("\t")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{WindowReport, WindowStats};
    use crate::test_utils::base_measurement;
    use std::time::SystemTime;

    const FIVE_MINUTES: Duration = Duration::from_secs(300);
    const TWELVE_HOURS: Duration = Duration::from_secs(43_200);

    fn record() -> DeviceRecord {
        let mut m = base_measurement();
        m.battery_percent = Some(75);
        let m = m.observed(
            // 2024-03-01 12:00:00 UTC
            SystemTime::UNIX_EPOCH + Duration::from_secs(1_709_294_400),
            Some(1020.0),
        );
        let windows = vec![
            WindowReport {
                duration: FIVE_MINUTES,
                samples: 3,
                stats: Some(WindowStats {
                    avg: 998.44,
                    min: 840.0,
                    max: 1260.0,
                }),
            },
            WindowReport {
                duration: TWELVE_HOURS,
                samples: 0,
                stats: None,
            },
        ];
        DeviceRecord::new(&m, windows, Some(1070))
    }

    #[test]
    fn test_header() {
        let formatter = ConsoleFormatter::new(vec![FIVE_MINUTES, TWELVE_HOURS]);
        assert_eq!(
            formatter.header().unwrap(),
            "time\tbattery\tcpm/(mR/h)\tcpm\t5m-avg-cpm\t5m-min-cpm\t5m-max-cpm\t12h-avg-cpm\t12h-min-cpm\t12h-max-cpm"
        );
    }

    #[test]
    fn test_row() {
        let formatter = ConsoleFormatter::new(vec![FIVE_MINUTES, TWELVE_HOURS]);
        assert_eq!(
            formatter.format(&record()),
            "2024-03-01 12:00:00\t75%\t1070\t1020.0\t998.4\t840.0\t1260.0\t-\t-\t-"
        );
    }

    #[test]
    fn test_row_missing_values() {
        let mut record = record();
        record.charging = true;
        record.battery_percent = None;
        record.device_conversion_factor = None;
        record.rate_cpm = None;

        let formatter = ConsoleFormatter::new(vec![FIVE_MINUTES]);
        let row = formatter.format(&record);
        let columns: Vec<&str> = row.split('\t').collect();
        assert_eq!(columns[1..4], ["charging", "-", "-"]);
        assert_eq!(columns.len(), 7);
    }
}
