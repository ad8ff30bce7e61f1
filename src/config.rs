//! Analyzer settings.
//!
//! Loaded from TOML. The first existing source wins:
//!
//! 1. an explicit path (`--config`)
//! 2. the `ROBOT_LOG_CONFIG` environment variable
//! 3. `robot_log.toml` in the working directory
//! 4. built-in defaults
//!
//! Every key is optional; missing keys keep their default.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "ROBOT_LOG_CONFIG";
pub const CONFIG_FILE: &str = "robot_log.toml";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub analysis: AnalysisSettings,
    pub report: ReportSettings,
    pub sources: SourceSettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Trailing window for daily operating analysis
    pub window_days: u32,
    pub top_errors: usize,
    pub top_event_types: usize,
    pub critical_excerpts: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self { window_days: 7, top_errors: 5, top_event_types: 10, critical_excerpts: 20 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// Length of the current (and previous) performance period
    pub period_days: u32,
    pub alarm_window_hours: u32,
    /// Backups older than this count as missing
    pub backup_stale_days: i64,
    pub maintenance_interval_hours: f64,
    pub duty_hours_per_day: f64,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            period_days: 7,
            alarm_window_hours: 24,
            backup_stale_days: 7,
            maintenance_interval_hours: 6000.0,
            duty_hours_per_day: 8.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Directories holding one sub-directory per controller IP
    pub log_roots: Vec<PathBuf>,
    pub log_file_names: Vec<String>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self { log_roots: vec![PathBuf::from("logs")], log_file_names: vec!["LOGDATA.DAT".to_string()] }
    }
}

impl Settings {
    pub fn from_toml_str(s: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|source| ConfigError::Parse { path: origin.to_path_buf(), source })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&text, path)
    }

    /// Resolve settings from `explicit`, the environment, the working directory, or defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(p) = explicit {
            return Self::from_file(p);
        }
        if let Some(p) = std::env::var_os(CONFIG_ENV) {
            return Self::from_file(Path::new(&p));
        }
        let local = Path::new(CONFIG_FILE);
        if local.is_file() {
            tracing::debug!("Using {}", local.display());
            return Self::from_file(local);
        }
        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let s = Settings::from_toml_str("", Path::new("t.toml")).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.report.duty_hours_per_day, 8.0);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let s = Settings::from_toml_str(
            "[analysis]\nwindow_days = 14\n\n[sources]\nlog_roots = [\"/srv/robots\"]\n",
            Path::new("t.toml"),
        )
        .unwrap();
        assert_eq!(s.analysis.window_days, 14);
        assert_eq!(s.analysis.top_errors, 5);
        assert_eq!(s.sources.log_roots, vec![PathBuf::from("/srv/robots")]);
        assert_eq!(s.sources.log_file_names, vec!["LOGDATA.DAT".to_string()]);
    }

    #[test]
    fn bad_toml_names_the_file() {
        let err = Settings::from_toml_str("[analysis\n", Path::new("bad.toml")).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = Settings::from_file(Path::new("/nonexistent/robot_log.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
