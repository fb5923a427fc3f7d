//! Output pacing and human-readable durations.
//!
//! The counter produces a record about once a second; [`Throttle`] lets the
//! run loop report and upload at slower cadences while every record still
//! feeds the statistics.

use std::time::{Duration, Instant};

/// Lets one event through per `interval`.
///
/// The first event always passes. Suppressed events do not restart the
/// interval.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Throttle {
            interval,
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether an event at `now` should be emitted.
    pub fn should_emit(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Units accepted by [`parse_duration`], longest suffix first so `ms` wins
/// over `m` and `s`.
const UNITS: [(&str, u64); 5] = [
    ("ms", 1),
    ("d", 86_400_000),
    ("h", 3_600_000),
    ("m", 60_000),
    ("s", 1_000),
];

/// Parse `500ms`, `30s`, `5m`, `12h` or `90d`. A bare number is seconds.
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();
    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    let (number, millis_per_unit) = UNITS
        .iter()
        .find_map(|(suffix, millis)| src.strip_suffix(suffix).map(|n| (n, *millis)))
        .unwrap_or((src, 1_000));

    let count: u64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: {src}"))?;
    count
        .checked_mul(millis_per_unit)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("duration too long: {src}"))
}

/// Shortest label for a duration in the largest unit that divides it:
/// `5m`, `12h`, `90d`, `30s`, `500ms`.
pub fn format_span(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis == 0 {
        return "0s".to_string();
    }
    for (suffix, per_unit) in [("d", 86_400_000u128), ("h", 3_600_000), ("m", 60_000), ("s", 1_000)] {
        if millis % per_unit == 0 {
            return format!("{}{suffix}", millis / per_unit);
        }
    }
    format!("{millis}ms")
}
