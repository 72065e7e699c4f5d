//! Error types for the storefront harness

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Fixture-level errors. These propagate and skip the dependent tests.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("No project root containing {entry_point} found within {max_depth} levels of {searched:?}")]
    Discovery {
        entry_point: String,
        searched: Vec<PathBuf>,
        max_depth: usize,
    },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server exited before becoming ready ({status}): {stderr}")]
    Startup { status: String, stderr: String },

    #[error("Server not ready on port {port} after {waited:?}")]
    StartupTimeout { port: u16, waited: Duration },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

pub type HarnessResult<T> = Result<T, HarnessError>;

/// Failures while sending a status report. Logged by the bridge and never
/// propagated into a test verdict.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Endpoint returned {status}: {body}")]
    Endpoint { status: u16, body: String },

    #[error("No acknowledgment within {0:?}")]
    TimedOut(Duration),

    #[error("Could not start report runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("Report task aborted: {0}")]
    Aborted(String),
}
