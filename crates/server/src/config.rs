//! Server configuration: an optional JSON file, then environment overrides.
//!
//! ```json
//! {
//!   "bindAddress": "0.0.0.0:8000",
//!   "stateDir": "~/.local/state/jobhook",
//!   "workflow": "data_pipeline",
//!   "awaitTimeoutSecs": 86400,
//!   "jobId": 123456
//! }
//! ```

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dirs_next::config_dir;
use jobhook_engine::DATA_PIPELINE;
use jobhook_util::{PROMISES_FILE_NAME, RUNS_FILE_NAME, STATE_DIR_ENV, default_state_dir, expand_tilde};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Environment variable pointing at the configuration file.
pub const CONFIG_PATH_ENV: &str = "JOBHOOK_CONFIG_PATH";
/// Environment variable overriding `bindAddress`.
pub const BIND_ADDRESS_ENV: &str = "JOBHOOK_BIND_ADDRESS";
/// Environment variable overriding `awaitTimeoutSecs`.
pub const AWAIT_TIMEOUT_ENV: &str = "JOBHOOK_AWAIT_TIMEOUT_SECS";

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid bind address '{address}': {reason}")]
    BindAddress { address: String, reason: String },

    #[error("invalid value for {name}: {reason}")]
    Environment { name: &'static str, reason: String },

    #[error("Configuration error: {message}")]
    Invalid { message: String },
}

/// Settings for the front door process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address the HTTP server binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Directory holding `promises.json` and `runs.json`.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Workflow started by `/run`.
    #[serde(default = "default_workflow")]
    pub workflow: String,
    /// Seconds a run may wait for its callback. Absent means no limit.
    #[serde(default)]
    pub await_timeout_secs: Option<u64>,
    /// Job to trigger. Falls back to `JOB_ID` when absent.
    #[serde(default)]
    pub job_id: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            state_dir: default_state_dir(),
            workflow: default_workflow(),
            await_timeout_secs: None,
            job_id: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_socket_address(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_address.trim().parse::<SocketAddr>().map_err(|error| ConfigError::BindAddress {
            address: self.bind_address.clone(),
            reason: error.to_string(),
        })
    }

    pub fn await_timeout(&self) -> Option<Duration> {
        self.await_timeout_secs.map(Duration::from_secs)
    }

    pub fn promises_path(&self) -> PathBuf {
        self.state_dir.join(PROMISES_FILE_NAME)
    }

    pub fn runs_path(&self) -> PathBuf {
        self.state_dir.join(RUNS_FILE_NAME)
    }

    /// Apply `JOBHOOK_*` environment overrides on top of file values.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(address) = non_empty_var(BIND_ADDRESS_ENV) {
            self.bind_address = address;
        }
        if let Some(path) = non_empty_var(STATE_DIR_ENV) {
            self.state_dir = expand_tilde(&path);
        }
        if let Some(raw) = non_empty_var(AWAIT_TIMEOUT_ENV) {
            let seconds = raw.trim().parse::<u64>().map_err(|error| ConfigError::Environment {
                name: AWAIT_TIMEOUT_ENV,
                reason: format!("'{raw}' is not a number of seconds: {error}"),
            })?;
            self.await_timeout_secs = Some(seconds);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_socket_address()?;
        if self.workflow.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "workflow name cannot be empty".to_string(),
            });
        }
        if self.await_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid {
                message: "awaitTimeoutSecs must be greater than zero; omit it to wait indefinitely".to_string(),
            });
        }
        if self.state_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                message: "stateDir cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn default_bind_address() -> String {
    DEFAULT_BIND_ADDRESS.to_string()
}

fn default_workflow() -> String {
    DATA_PIPELINE.to_string()
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Returns the default path for the server configuration file.
pub fn default_config_path() -> PathBuf {
    if let Some(path) = non_empty_var(CONFIG_PATH_ENV) {
        return expand_tilde(&path);
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jobhook")
        .join("server.json")
}

/// Loads configuration from the default path.
pub fn load_config() -> Result<ServerConfig, ConfigError> {
    load_config_from_path(&default_config_path())
}

/// Loads configuration from `path`, applies environment overrides and validates.
///
/// A missing file yields the defaults.
pub fn load_config_from_path(path: &Path) -> Result<ServerConfig, ConfigError> {
    let mut config = if path.exists() {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)?
    } else {
        debug!(path = %path.display(), "no server configuration file; using defaults");
        ServerConfig::default()
    };
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}
