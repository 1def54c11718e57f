use std::path::PathBuf;
use thiserror::Error;

// Configuration errors. These surface at startup, never per request.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown endpoint profile: {0}")]
    UnknownProfile(String),

    #[error("duplicate endpoint profile: {0}")]
    DuplicateProfile(String),

    #[error("invalid endpoint profile '{name}': {reason}")]
    InvalidProfile { name: String, reason: String },

    #[error("policy table has no profiles")]
    EmptyTable,

    #[error("stale_windows must be at least 1")]
    InvalidStaleWindows,

    #[error("sweep interval must be greater than zero")]
    InvalidSweepInterval,

    #[error("failed to read profile file {path:?}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse profile file {path:?}: {source}")]
    ParseFile {
        path: PathBuf,
        source: serde_json::Error,
    },
}
