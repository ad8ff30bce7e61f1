//! Collaborators the analyzer reads from: controller log files and tabular records.

use crate::config::SourceSettings;
use crate::error::SourceError;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One loosely-typed row from the tabular source.
pub type Row = serde_json::Map<String, Value>;

// Column names the report reads
pub const ALARM_TIME: &str = "occurred_at";
pub const UTILIZATION_TIME: &str = "recorded_at";
pub const PRODUCTION_DAY: &str = "date";

/// Lenient accessors: missing or null values read as absent or zero.
pub trait RowExt {
    fn text(&self, key: &str) -> Option<String>;
    fn number_opt(&self, key: &str) -> Option<f64>;
    fn timestamp(&self, key: &str) -> Option<NaiveDateTime>;

    fn text_or(&self, key: &str, default: &str) -> String {
        self.text(key).unwrap_or_else(|| default.to_string())
    }

    fn number(&self, key: &str) -> f64 {
        self.number_opt(key).unwrap_or(0.0)
    }

    fn is_null(&self, key: &str) -> bool {
        self.text(key).is_none()
    }
}

impl RowExt for Row {
    fn text(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn number_opt(&self, key: &str) -> Option<f64> {
        let v: Option<f64> = match self.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        v.filter(|v| v.is_finite())
    }

    fn timestamp(&self, key: &str) -> Option<NaiveDateTime> {
        self.text(key).as_deref().and_then(parse_row_time)
    }
}

fn parse_row_time(s: &str) -> Option<NaiveDateTime> {
    let fmts = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y/%m/%d %H:%M:%S"];
    for f in fmts {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, f) { return Some(dt); }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) { return Some(dt.naive_local()); }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// What the report asks the tabular source for.
#[derive(Clone, Debug, PartialEq)]
pub enum Query {
    Controllers,
    Alarms { since: NaiveDateTime, until: NaiveDateTime },
    Utilization { since: NaiveDateTime, until: NaiveDateTime },
    Production { day: NaiveDate },
    Maintenance,
    Backups,
}

impl Query {
    pub fn table(&self) -> &'static str {
        match self {
            Query::Controllers => "controllers",
            Query::Alarms { .. } => "alarms",
            Query::Utilization { .. } => "utilization",
            Query::Production { .. } => "production",
            Query::Maintenance => "maintenance",
            Query::Backups => "backups",
        }
    }

    /// Whether `row` belongs to this query's time range.
    pub fn matches(&self, row: &Row) -> bool {
        let in_range = |col: &str, since: &NaiveDateTime, until: &NaiveDateTime| {
            row.timestamp(col).is_some_and(|t| t >= *since && t < *until)
        };
        match self {
            Query::Alarms { since, until } => in_range(ALARM_TIME, since, until),
            Query::Utilization { since, until } => in_range(UTILIZATION_TIME, since, until),
            Query::Production { day } => row.timestamp(PRODUCTION_DAY).is_some_and(|t| t.date() == *day),
            _ => true,
        }
    }
}

pub trait TabularSource {
    fn fetch(&self, query: &Query) -> Result<Vec<Row>, SourceError>;
}

/// Tables loaded from one JSON object of named row arrays.
#[derive(Clone, Debug, Default)]
pub struct JsonTables {
    tables: HashMap<String, Vec<Row>>,
}

impl JsonTables {
    pub fn from_json_str(s: &str) -> Result<Self, SourceError> {
        Ok(Self { tables: serde_json::from_str(s)? })
    }

    pub fn from_file(path: &Path) -> Result<Self, SourceError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| SourceError::Io { path: path.to_path_buf(), source })?;
        Self::from_json_str(&text)
    }
}

impl TabularSource for JsonTables {
    fn fetch(&self, query: &Query) -> Result<Vec<Row>, SourceError> {
        let rows = self
            .tables
            .get(query.table())
            .ok_or_else(|| SourceError::MissingTable(query.table().to_string()))?;
        Ok(rows.iter().filter(|r| query.matches(r)).cloned().collect())
    }
}

/// Supplies the raw log text of a controller. `Ok(None)` means no log exists.
pub trait LogProvider {
    fn read_log(&self, controller_ip: &str) -> Result<Option<String>, SourceError>;
}

/// In-memory logs keyed by IP.
impl LogProvider for HashMap<String, String> {
    fn read_log(&self, controller_ip: &str) -> Result<Option<String>, SourceError> {
        Ok(self.get(controller_ip).cloned())
    }
}

/// Finds controller logs under `<root>/<ip>/`.
pub struct FsLogProvider {
    roots: Vec<PathBuf>,
    file_names: Vec<String>,
}

impl FsLogProvider {
    pub fn new(roots: Vec<PathBuf>, file_names: Vec<String>) -> Self {
        Self { roots, file_names }
    }

    pub fn from_settings(s: &SourceSettings) -> Self {
        Self::new(s.log_roots.clone(), s.log_file_names.clone())
    }

    /// Known locations first, then any matching file deeper in the controller directory.
    pub fn locate(&self, controller_ip: &str) -> Option<PathBuf> {
        let ip = controller_ip.trim();
        if ip.is_empty() || ip.contains(['/', '\\']) || ip.contains("..") {
            return None;
        }
        for root in &self.roots {
            let dir = root.join(ip);
            for name in &self.file_names {
                for candidate in [dir.join(name), dir.join("backup").join(name)] {
                    if candidate.is_file() { return Some(candidate); }
                }
            }
            let found = WalkDir::new(&dir)
                .sort_by_file_name()
                .into_iter()
                .flatten()
                .find(|e| {
                    e.file_type().is_file()
                        && self.file_names.iter().any(|n| e.file_name().to_string_lossy().eq_ignore_ascii_case(n))
                });
            if let Some(entry) = found { return Some(entry.into_path()); }
        }
        None
    }
}

impl LogProvider for FsLogProvider {
    fn read_log(&self, controller_ip: &str) -> Result<Option<String>, SourceError> {
        let Some(path) = self.locate(controller_ip) else {
            tracing::debug!("No log file for {controller_ip}");
            return Ok(None);
        };
        let bytes = std::fs::read(&path).map_err(|source| SourceError::Io { path: path.clone(), source })?;
        tracing::info!("Read {} bytes from {}", bytes.len(), path.display());
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn row_accessors_default_missing_values() {
        let r = row(json!({"name": "R1", "count": "12", "rate": 55.5, "resolved_at": null, "blank": " "}));
        assert_eq!(r.text("name").as_deref(), Some("R1"));
        assert_eq!(r.text_or("status", "Unknown"), "Unknown");
        assert_eq!(r.number("count"), 12.0);
        assert_eq!(r.number("rate"), 55.5);
        assert_eq!(r.number("missing"), 0.0);
        assert!(r.is_null("resolved_at"));
        assert!(r.is_null("blank"));
    }

    #[test]
    fn row_timestamps_accept_common_layouts() {
        let r = row(json!({
            "a": "2024-05-01 08:00:00",
            "b": "2024-05-01T08:00:00.250",
            "c": "2024-05-01T08:00:00+09:00",
            "d": "2024-05-01",
            "e": "soon"
        }));
        for k in ["a", "b", "c"] {
            assert_eq!(r.timestamp(k).unwrap().format("%H:%M").to_string(), "08:00", "{k}");
        }
        assert_eq!(r.timestamp("d").unwrap().to_string(), "2024-05-01 00:00:00");
        assert!(r.timestamp("e").is_none());
    }

    #[test]
    fn json_tables_filter_by_query_range() {
        let tables = JsonTables::from_json_str(
            r#"{"alarms": [
                {"code": "4100", "occurred_at": "2024-05-01 08:00:00"},
                {"code": "4200", "occurred_at": "2024-05-03 08:00:00"},
                {"code": "4300"}
            ]}"#,
        )
        .unwrap();
        let since = NaiveDateTime::parse_from_str("2024-05-02 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let until = NaiveDateTime::parse_from_str("2024-05-04 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let rows = tables.fetch(&Query::Alarms { since, until }).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text("code").as_deref(), Some("4200"));
        assert!(matches!(tables.fetch(&Query::Backups), Err(SourceError::MissingTable(_))));
    }

    #[test]
    fn fs_provider_checks_known_paths_then_walks() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("10.0.0.2").join("2024").join("may");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("logdata.dat"), "///INDEX 1\n").unwrap();
        std::fs::create_dir_all(dir.path().join("10.0.0.1")).unwrap();
        std::fs::write(dir.path().join("10.0.0.1").join("LOGDATA.DAT"), "///INDEX 2\n").unwrap();

        let provider = FsLogProvider::new(vec![dir.path().to_path_buf()], vec!["LOGDATA.DAT".into()]);
        assert_eq!(provider.read_log("10.0.0.1").unwrap().as_deref(), Some("///INDEX 2\n"));
        assert_eq!(provider.read_log("10.0.0.2").unwrap().as_deref(), Some("///INDEX 1\n"));
        assert_eq!(provider.read_log("10.0.0.3").unwrap(), None);
        assert_eq!(provider.read_log("../etc").unwrap(), None);
    }
}
