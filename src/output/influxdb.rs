//! InfluxDB line protocol output formatter.

use crate::measurement::{AlarmState, DeviceRecord};
use crate::output::OutputFormatter;
use crate::throttle::format_span;
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

/// Field values for InfluxDB line protocol
#[derive(Debug, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Boolean(bool),
    String(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Float(num) => write!(f, "{num}"),
            FieldValue::Integer(num) => write!(f, "{num}i"),
            FieldValue::Boolean(b) => write!(f, "{b}"),
            FieldValue::String(s) => write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        }
    }
}

/// Escape commas, equals signs and spaces in tag keys and values.
fn escape_tag(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, ',' | '=' | ' ') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Data point in InfluxDB line protocol
#[derive(Debug)]
pub struct DataPoint {
    pub measurement: String,
    pub tag_set: BTreeMap<String, String>,
    pub field_set: BTreeMap<String, FieldValue>,
    pub timestamp: Option<SystemTime>,
}

impl fmt::Display for DataPoint {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.measurement.replace(',', "\\,").replace(' ', "\\ "))?;
        for (key, value) in &self.tag_set {
            write!(fmt, ",{}={}", escape_tag(key), escape_tag(value))?;
        }

        let mut separator = " ";
        for (key, value) in &self.field_set {
            write!(fmt, "{separator}{}={value}", escape_tag(key))?;
            separator = ",";
        }

        if let Some(nanos) = self
            .timestamp
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
        {
            write!(fmt, " {nanos}")?;
        }
        Ok(())
    }
}

fn alarm_label(alarm: AlarmState) -> &'static str {
    match alarm {
        AlarmState::Disabled => "disabled",
        AlarmState::Set => "set",
        AlarmState::Alerting => "alerting",
        AlarmState::Silenced => "silenced",
    }
}

/// InfluxDB line protocol formatter.
///
/// Tags: `mode` and, when configured, `device`. Window statistics become
/// `avg_<span>`, `min_<span>` and `max_<span>` fields.
pub struct InfluxDbFormatter {
    measurement_name: String,
    device: Option<String>,
}

impl InfluxDbFormatter {
    pub fn new(measurement_name: String, device: Option<String>) -> Self {
        Self {
            measurement_name,
            device,
        }
    }

    fn tag_set(&self, record: &DeviceRecord) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();
        tags.insert("mode".to_string(), record.mode.slug());
        if let Some(device) = &self.device {
            tags.insert("device".to_string(), device.clone());
        }
        tags
    }

    fn field_set(&self, r: &DeviceRecord) -> BTreeMap<String, FieldValue> {
        let mut fields = BTreeMap::new();

        macro_rules! add {
            ($name:expr, $variant:ident, $val:expr) => {
                if let Some(v) = $val {
                    fields.insert($name.into(), FieldValue::$variant(v));
                }
            };
        }

        add!("battery", Integer, r.battery_percent.map(i64::from));
        add!("charging", Boolean, Some(r.charging));
        add!("alarm", String, r.alarm.map(|a| alarm_label(a).to_string()));
        add!("sequence", Integer, Some(i64::from(r.sequence)));
        add!("count", Integer, Some(i64::from(r.instantaneous_count)));
        add!("display_value", Float, Some(r.display_value));
        add!("rate_cpm", Float, r.rate_cpm);
        add!("device_cpm", Integer, r.device_cpm.map(i64::from));
        add!("conversion_factor", Float, r.effective_conversion_factor());
        add!("dose_rate_mr_h", Float, r.dose_rate_mr_h);

        for window in &r.windows {
            let span = format_span(window.duration);
            if let Some(stats) = window.stats {
                add!(format!("avg_{span}"), Float, Some(stats.avg));
                add!(format!("min_{span}"), Float, Some(stats.min));
                add!(format!("max_{span}"), Float, Some(stats.max));
            }
        }

        fields
    }

    fn to_data_point(&self, record: &DeviceRecord) -> DataPoint {
        DataPoint {
            measurement: self.measurement_name.clone(),
            tag_set: self.tag_set(record),
            field_set: self.field_set(record),
            timestamp: Some(record.timestamp),
        }
    }
}

impl OutputFormatter for InfluxDbFormatter {
    fn format(&self, record: &DeviceRecord) -> String {
        format!("{}", self.to_data_point(record))
    }
}
