//! Harness configuration
//!
//! Configuration is read from a TOML file (an explicit path, or
//! `stevedore.toml` in the working directory when present), then overridden
//! by `STEVEDORE_*` environment variables, then validated.
//!
//! ```toml
//! compose_path = "docker-compose"
//! compose_files = ["docker-compose.yml"]
//! port = 8080
//! readiness_timeout_ms = 30000
//! ```

use crate::errors::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default configuration file name looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "stevedore.toml";

/// Everything the harness needs to drive one orchestrated application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Orchestrator executable
    pub compose_path: String,
    /// Compose files passed with `-f`, in order (empty: orchestrator default)
    pub compose_files: Vec<PathBuf>,
    /// Compose project name passed with `-p`
    pub project_name: Option<String>,
    /// Working directory for every orchestrator invocation
    pub working_dir: Option<PathBuf>,
    /// Executable used to query the active named host
    pub machine_path: String,
    /// One-time build command; empty means there is no build step
    pub build_command: Vec<String>,
    /// Fixed target address, skipping host discovery
    pub target_address: Option<String>,
    /// Port appended to the target address for the readiness probe
    pub port: Option<u16>,
    /// Path of the readiness endpoint
    pub health_path: String,
    /// HTTP status that means "ready"
    pub ready_status: u16,
    /// Log file receiving orchestrator output and run markers
    pub log_file: PathBuf,
    /// Delay between readiness probes
    pub poll_interval_ms: u64,
    /// Deadline for the application to become ready
    pub readiness_timeout_ms: u64,
    /// Per-request timeout of a single probe
    pub probe_timeout_ms: u64,
    /// Deadline for the orchestrator to exit after an interrupt
    pub shutdown_timeout_ms: u64,
    /// Pause before the end marker so trailing output is not cut off
    pub end_marker_delay_ms: u64,
    /// Skip every run (fast/short test mode)
    pub short: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            compose_path: "docker-compose".to_string(),
            compose_files: Vec::new(),
            project_name: None,
            working_dir: None,
            machine_path: "docker-machine".to_string(),
            build_command: vec!["./build.sh".to_string()],
            target_address: None,
            port: None,
            health_path: "/health_check".to_string(),
            ready_status: 204,
            log_file: PathBuf::from("test.log"),
            poll_interval_ms: 250,
            readiness_timeout_ms: 30_000,
            probe_timeout_ms: 1_000,
            shutdown_timeout_ms: 5_000,
            end_marker_delay_ms: 100,
            short: false,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a file (explicit or discovered), then the environment
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match explicit_path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::from_file(default_path)?
                } else {
                    debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                    Self::default()
                }
            }
        };

        config.apply_env_overrides_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file without applying overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content)
    }

    /// Parse TOML configuration text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            ConfigError::Parsing {
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Render the configuration as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            ConfigError::Parsing {
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Apply `STEVEDORE_*` overrides using the given variable lookup
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("STEVEDORE_SHORT") {
            self.short = is_truthy(&value);
        }
        if let Some(value) = lookup("STEVEDORE_COMPOSE_PATH") {
            self.compose_path = value;
        }
        if let Some(value) = lookup("STEVEDORE_TARGET_ADDRESS") {
            let value = value.trim().to_string();
            self.target_address = (!value.is_empty()).then_some(value);
        }
        if let Some(value) = lookup("STEVEDORE_LOG_FILE") {
            self.log_file = PathBuf::from(value);
        }
        if let Some(value) = lookup("STEVEDORE_BUILD_COMMAND") {
            self.build_command = shell_words::split(&value).map_err(|e| ConfigError::Parsing {
                message: format!("STEVEDORE_BUILD_COMMAND: {}", e),
            })?;
        }
        Ok(())
    }

    /// Check invariants the harness relies on
    pub fn validate(&self) -> Result<()> {
        let fail = |message: &str| -> Result<()> {
            Err(ConfigError::Validation {
                message: message.to_string(),
            }
            .into())
        };

        if self.compose_path.trim().is_empty() {
            return fail("compose_path must not be empty");
        }
        if self.poll_interval_ms == 0 {
            return fail("poll_interval_ms must be greater than zero");
        }
        if self.poll_interval_ms > self.readiness_timeout_ms {
            return fail("poll_interval_ms must not exceed readiness_timeout_ms");
        }
        if self.probe_timeout_ms == 0 {
            return fail("probe_timeout_ms must be greater than zero");
        }
        if self.shutdown_timeout_ms == 0 {
            return fail("shutdown_timeout_ms must be greater than zero");
        }
        if !self.health_path.starts_with('/') {
            return fail("health_path must start with '/'");
        }
        if !(100..=599).contains(&self.ready_status) {
            return fail("ready_status must be a valid HTTP status code");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn end_marker_delay(&self) -> Duration {
        Duration::from_millis(self.end_marker_delay_ms)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
