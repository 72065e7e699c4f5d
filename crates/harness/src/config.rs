//! Harness configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{HarnessError, HarnessResult};

/// Fallback root-search start, tried after the configured search roots
pub const ENV_ROOT: &str = "STOREFRONT_E2E_ROOT";
pub const ENV_PORT: &str = "STOREFRONT_E2E_PORT";
pub const ENV_KUALITEE_URL: &str = "KUALITEE_API_URL";
pub const ENV_KUALITEE_TOKEN: &str = "KUALITEE_API_TOKEN";
pub const ENV_KUALITEE_PROJECT: &str = "KUALITEE_PROJECT_ID";
pub const ENV_KUALITEE_ENABLED: &str = "KUALITEE_REPORTING";

/// Kualitee project the storefront test cases live in
pub const DEFAULT_PROJECT_ID: &str = "20317";

/// Top-level harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Supervised server
    pub server: ServerConfig,

    /// Result reporting
    pub reporting: ReportingConfig,

    /// Where `test-results.json` is written
    pub output_dir: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            reporting: ReportingConfig::default(),
            output_dir: PathBuf::from("test-results"),
        }
    }
}

/// Configuration for locating and supervising the storefront dev server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directories to start the upward search from
    pub search_roots: Vec<PathBuf>,

    /// File that marks the project root
    pub entry_point: String,

    /// Directory that must sit next to the entry point, if any
    pub companion_dir: Option<String>,

    /// Maximum number of parent directories to ascend per search root
    pub max_depth: usize,

    /// Program used to run the entry point
    pub interpreter: String,

    /// Address the server binds to
    pub bind_address: String,

    /// Host the health probe connects to
    pub probe_host: String,

    /// Listening port
    pub port: u16,

    pub startup_timeout_ms: u64,
    pub poll_interval_ms: u64,

    /// Time allowed between SIGTERM and a forced kill
    pub grace_period_ms: u64,

    /// Change into the discovered root while starting the server
    pub change_dir: bool,

    /// Bytes of stdout/stderr retained per stream
    pub capture_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            search_roots: vec![PathBuf::from(".")],
            entry_point: "manage.py".to_string(),
            companion_dir: None,
            max_depth: 5,
            interpreter: "python3".to_string(),
            bind_address: "0.0.0.0".to_string(),
            probe_host: "localhost".to_string(),
            port: 8000,
            startup_timeout_ms: 30_000,
            poll_interval_ms: 500,
            grace_period_ms: 5_000,
            change_dir: true,
            capture_limit: 64 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// URL tests use to reach the server
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.probe_host, self.port)
    }
}

/// Configuration for the Kualitee push-model reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    /// Send reports at all
    pub enabled: bool,

    /// Base URL of the Kualitee API
    pub base_url: String,

    /// Path of the execution endpoint, appended to `base_url`
    pub execution_path: String,

    /// Bearer token
    pub api_token: Option<String>,

    /// Target project
    pub project_id: String,

    /// Bound on waiting for an acknowledgment
    pub timeout_ms: u64,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.kualitee.com/api/v2".to_string(),
            execution_path: "/test_case_execution/execute".to_string(),
            api_token: None,
            project_id: DEFAULT_PROJECT_ID.to_string(),
            timeout_ms: 5_000,
        }
    }
}

impl ReportingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> HarnessResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            debug!(path = %path.display(), "Loaded harness config");
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> HarnessResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup, used by `apply_env`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(ENV_ROOT) {
            let root = PathBuf::from(root);
            if root.exists() {
                self.server.search_roots.push(root);
            } else {
                warn!(path = %root.display(), "{} does not exist, ignoring", ENV_ROOT);
            }
        }

        if let Some(port) = lookup(ENV_PORT) {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!(value = %port, "Invalid {}, ignoring", ENV_PORT),
            }
        }

        if let Some(url) = lookup(ENV_KUALITEE_URL) {
            self.reporting.base_url = url;
        }
        if let Some(token) = lookup(ENV_KUALITEE_TOKEN) {
            self.reporting.api_token = Some(token);
        }
        if let Some(project) = lookup(ENV_KUALITEE_PROJECT) {
            self.reporting.project_id = project;
        }
        if let Some(flag) = lookup(ENV_KUALITEE_ENABLED) {
            self.reporting.enabled = !matches!(flag.trim(), "0" | "false" | "off" | "no");
        }
    }

    /// Reject values the supervisor or bridge cannot work with
    pub fn validate(&self) -> HarnessResult<()> {
        if self.server.entry_point.trim().is_empty() {
            return Err(HarnessError::Config("server.entry_point is empty".into()));
        }
        if self.server.port == 0 {
            return Err(HarnessError::Config("server.port must be non-zero".into()));
        }
        if self.server.poll_interval_ms == 0 {
            return Err(HarnessError::Config(
                "server.poll_interval_ms must be non-zero".into(),
            ));
        }
        if self.reporting.timeout_ms == 0 {
            return Err(HarnessError::Config(
                "reporting.timeout_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
