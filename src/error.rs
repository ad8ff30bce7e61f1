use std::path::PathBuf;
use thiserror::Error;

/// Failures of the collaborators the report reads from.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed table data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Table not available: {0}")]
    MissingTable(String),

    #[error("Query range out of bounds: {0}")]
    OutOfRange(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Conditions that make a report impossible to produce at all.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Controller roster unavailable: {0}")]
    Roster(#[source] SourceError),

    #[error("No controllers to report on")]
    NoControllers,
}
