//! Error types and handling
//!
//! The taxonomy mirrors the phases of a harness run. Each phase has its own
//! error enum (setup, startup, readiness, shutdown, log, configuration) and
//! all of them are wrapped in [`StevedoreError`] for unified handling.
//!
//! Every variant is fatal for the run that produced it. A supervised process
//! exiting with a failure status during graceful shutdown is not an error at
//! all; it is reported through [`crate::supervisor::ShutdownReport`].

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// One-time setup failures (build, address resolution, log open, pull, hooks)
#[derive(Error, Debug)]
pub enum SetupError {
    /// The build command failed or could not be launched
    #[error("build failed: {message}")]
    Build { message: String },

    /// Pulling images failed
    #[error("error pulling Compose images: {message}")]
    Pull { message: String },

    /// An active named host was found but its address could not be resolved
    #[error("failed to resolve address of host '{host}': {message}")]
    AddressResolution { host: String, message: String },

    /// The shared log file could not be created
    #[error("failed to open log file {}", path.display())]
    LogOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The readiness probe client could not be constructed
    #[error("failed to create readiness probe: {message}")]
    Probe { message: String },

    /// A registered hook returned an error
    #[error("{kind} hook #{index} failed: {message}")]
    Hook {
        kind: &'static str,
        index: usize,
        message: String,
    },
}

/// Failures launching the long-running orchestrator process
#[derive(Error, Debug)]
pub enum StartupError {
    /// The up command could not be spawned
    #[error("error starting Compose: {message}")]
    Spawn { message: String },
}

/// Readiness polling failures
#[derive(Error, Debug)]
pub enum ReadinessError {
    /// The probe never reported ready before the deadline
    #[error("timed out waiting for server to start: {url} not ready after {waited:?}")]
    Timeout { url: String, waited: Duration },
}

/// Shutdown failures; each of these means resources may have leaked
#[derive(Error, Debug)]
pub enum ShutdownError {
    /// The interrupt could not be delivered
    #[error("error interrupting Compose (pid {pid:?}): {message}")]
    Signal { pid: Option<u32>, message: String },

    /// Waiting on the process failed
    #[error("error waiting for Compose to exit: {message}")]
    Wait { message: String },

    /// The forced kill failed
    #[error("failed to kill Compose: {message}")]
    Kill { message: String },

    /// The process ignored the interrupt and had to be killed
    #[error("Compose killed as timeout of {timeout:?} was reached")]
    KilledOnTimeout { timeout: Duration },

    /// Removing leftover containers failed
    #[error("error removing containers: {message}")]
    Cleanup { message: String },
}

/// Log sink write failures
#[derive(Error, Debug)]
pub enum LogError {
    /// Writing to the log file failed
    #[error("error writing to log file")]
    Write(#[source] std::io::Error),

    /// Flushing the log file to disk failed
    #[error("error syncing log file")]
    Sync(#[source] std::io::Error),

    /// Duplicating the file handle for subprocess redirection failed
    #[error("error sharing log file with subprocess")]
    Redirect(#[source] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file parsing error
    #[error("Failed to parse configuration file: {message}")]
    Parsing { message: String },

    /// Configuration validation error
    #[error("Configuration validation error: {message}")]
    Validation { message: String },

    /// Configuration file I/O error
    #[error("Failed to read configuration file")]
    Io(#[from] std::io::Error),
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum StevedoreError {
    /// One-time setup errors
    #[error("Setup error: {0}")]
    Setup(#[from] SetupError),

    /// Process launch errors
    #[error("Startup error: {0}")]
    Startup(#[from] StartupError),

    /// Readiness errors
    #[error("Readiness error: {0}")]
    Readiness(#[from] ReadinessError),

    /// Shutdown errors
    #[error("Shutdown error: {0}")]
    Shutdown(#[from] ShutdownError),

    /// Log sink errors
    #[error("Log error: {0}")]
    Log(#[from] LogError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl StevedoreError {
    /// Whether this error means containers or processes may have outlived the run
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown(_))
    }
}

/// Convenience type alias for Results with StevedoreError
pub type Result<T> = std::result::Result<T, StevedoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_setup_error_display() {
        let error = SetupError::Build {
            message: "exit status: 1".to_string(),
        };
        assert_eq!(format!("{}", error), "build failed: exit status: 1");

        let error = SetupError::Hook {
            kind: "per-run",
            index: 2,
            message: "seed failed".to_string(),
        };
        assert_eq!(format!("{}", error), "per-run hook #2 failed: seed failed");
    }

    #[test]
    fn test_shutdown_error_display() {
        let error = ShutdownError::KilledOnTimeout {
            timeout: Duration::from_secs(5),
        };
        assert_eq!(
            format!("{}", error),
            "Compose killed as timeout of 5s was reached"
        );

        let error = ShutdownError::Cleanup {
            message: "no such service".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "error removing containers: no such service"
        );
    }

    #[test]
    fn test_readiness_error_display() {
        let error = ReadinessError::Timeout {
            url: "http://127.0.0.1:8080/health_check".to_string(),
            waited: Duration::from_secs(30),
        };
        assert!(format!("{}", error).contains("timed out waiting for server to start"));
    }

    #[test]
    fn test_wrapping_and_classification() {
        let error: StevedoreError = ShutdownError::Kill {
            message: "ESRCH".to_string(),
        }
        .into();
        assert!(error.is_shutdown());
        assert!(format!("{}", error).starts_with("Shutdown error:"));

        let error: StevedoreError = StartupError::Spawn {
            message: "not found".to_string(),
        }
        .into();
        assert!(!error.is_shutdown());
        assert!(matches!(error, StevedoreError::Startup(_)));
    }

    #[test]
    fn test_error_source_chain() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error: StevedoreError = SetupError::LogOpen {
            path: PathBuf::from("test.log"),
            source: io_error,
        }
        .into();

        let source = error.source().expect("setup error source");
        assert!(source.source().is_some());
    }

    #[test]
    fn test_anyhow_conversion() {
        let error = StevedoreError::Config(ConfigError::Validation {
            message: "poll interval must be non-zero".to_string(),
        });
        let anyhow_error = anyhow::Error::from(error);
        assert!(anyhow_error.to_string().contains("Configuration error"));
    }
}
