use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Timestamp layouts seen in controller dumps, most common first.
const DATE_FORMATS: [&str; 3] = ["%Y/%m/%d %H:%M:%S", "%Y/%m/%d %H:%M", "%Y-%m-%d %H:%M:%S"];

/// Parse a controller timestamp (`2024/03/01 08:15:00`).
pub fn parse_log_date(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
}

/// One `///INDEX n` block of a controller log.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub index: u64,
    pub date: Option<String>,
    pub event: Option<String>,
    pub login_name: Option<String>,
    pub fields: HashMap<String, String>,
    pub raw_data: String,
}

impl LogRecord {
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.date.as_deref().and_then(parse_log_date)
    }

    /// Field lookup by trimmed, case-insensitive key. Empty values count as absent.
    pub fn field(&self, key: &str) -> Option<&str> {
        let key = key.trim();
        self.fields
            .iter()
            .find(|(k, _)| k.trim().eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    /// First present field among `keys`.
    pub fn any_field(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.field(k))
    }

    pub fn field_lower(&self, key: &str) -> Option<String> {
        self.field(key).map(|v| v.trim().to_lowercase())
    }

    pub fn event_lower(&self) -> String {
        self.event.as_deref().unwrap_or_default().to_lowercase()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Axis { S, L, U, R, B, T }

impl Axis {
    pub const ALL: [Axis; 6] = [Axis::S, Axis::L, Axis::U, Axis::R, Axis::B, Axis::T];

    pub fn label(self) -> &'static str {
        match self {
            Axis::S => "S",
            Axis::L => "L",
            Axis::U => "U",
            Axis::R => "R",
            Axis::B => "B",
            Axis::T => "T",
        }
    }
}

/// An `ORG ABSO` record reduced to its current pulse values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AbsolutePositionEvent {
    pub index: u64,
    pub date: Option<String>,
    pub group_number: Option<String>,
    pub axis_number: Option<String>,
    pub set_value: Option<String>,
    pub current_values: BTreeMap<Axis, i64>,
}

impl AbsolutePositionEvent {
    pub fn value(&self, axis: Axis) -> i64 {
        self.current_values.get(&axis).copied().unwrap_or(0)
    }
}

/// Decoded `N-M-K` element number of a tool file edit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedElement {
    pub tool_number: u32,
    pub parameter_group: u32,
    pub parameter_group_name: String,
    pub parameter_index: u32,
    pub parameter_name: String,
    pub actual_tool_number: i64,
}

/// An `OTHER FILE EDIT` of the `tool` file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolEditEvent {
    pub index: u64,
    pub date: Option<String>,
    pub event: String,
    pub element_number: String,
    pub element_value: String,
    pub element: ParsedElement,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisComparison {
    pub axis: Axis,
    pub old_value: i64,
    pub new_value: i64,
    pub change: i64,
    pub change_percent: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TcpComparison {
    pub element_number: String,
    pub tool_number: i64,
    pub parameter_group_name: String,
    pub parameter_name: String,
    pub old_value: f64,
    pub new_value: f64,
    pub change: f64,
    pub change_percent: f64,
    pub old_index: u64,
    pub new_index: u64,
    pub old_date: Option<String>,
    pub new_date: Option<String>,
}

/// What a controller was doing when a record was written. Exactly one per record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatingState { Operating, Teach, Error, Idle }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailyOperatingData {
    pub date: NaiveDate,
    pub total: u64,
    pub operating: u64,
    pub teach: u64,
    pub error: u64,
    pub idle: u64,
    pub operating_rate: f64,
    pub teach_rate: f64,
    pub error_rate: f64,
    pub idle_rate: f64,
    pub critical_events: u64,
}

/// Signed percentage change, 0 when there is no base to compare against.
pub fn percent_change(old: f64, new: f64) -> f64 {
    if old == 0.0 {
        return 0.0;
    }
    let pct = (new - old) / old.abs() * 100.0;
    if pct.is_finite() { pct } else { 0.0 }
}

/// `part` as a percentage of `total`, 0 for an empty total.
pub fn percent_of(part: u64, total: u64) -> f64 {
    if total == 0 { 0.0 } else { part as f64 / total as f64 * 100.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with(fields: &[(&str, &str)]) -> LogRecord {
        LogRecord {
            fields: fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn field_lookup_ignores_case_and_padding() {
        let r = record_with(&[("FILE NAME ", "TOOL")]);
        assert_eq!(r.field("file name"), Some("TOOL"));
        assert_eq!(r.field_lower("File Name").as_deref(), Some("tool"));
        assert_eq!(r.field("element number"), None);
    }

    #[test]
    fn empty_field_value_is_absent() {
        let r = record_with(&[("MODE", "")]);
        assert_eq!(r.field("MODE"), None);
    }

    #[test]
    fn parses_controller_dates() {
        let dt = parse_log_date("2024/03/01 08:15:30").unwrap();
        assert_eq!(dt.to_string(), "2024-03-01 08:15:30");
        assert!(parse_log_date("2024/03/01 08:15").is_some());
        assert!(parse_log_date("yesterday").is_none());
    }

    #[test]
    fn percent_change_guards_zero_base() {
        assert_eq!(percent_change(0.0, 42.0), 0.0);
        assert_eq!(percent_change(100.0, 105.0), 5.0);
        assert_eq!(percent_change(-50.0, -25.0), 50.0);
        assert_eq!(percent_change(f64::NAN, 1.0), 0.0);
    }

    #[test]
    fn percent_of_empty_total_is_zero() {
        assert_eq!(percent_of(3, 0), 0.0);
        assert_eq!(percent_of(1, 4), 25.0);
    }
}
