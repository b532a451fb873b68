use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::commands;

/// Log format options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Output format of the config command
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML, loadable again with --config
    Toml,
    /// JSON structured format
    Json,
}

/// Log level options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    /// Error messages only
    Error,
    /// Warning and error messages
    Warn,
    /// Informational messages and above
    Info,
    /// Debug messages and above
    Debug,
    /// All messages including trace
    Trace,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// stevedore subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Bring the application up, run a command against it, and tear it down
    #[command(long_about = "Bring the application up, run a command against it, and tear it down\n\n\
        The command runs once the readiness endpoint answers, with STEVEDORE_TARGET_ADDRESS \
        set to the address the application is reachable on. Orchestrator output and the \
        run markers go to the configured log file.")]
    Run {
        /// Command and arguments to run against the live application
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
    /// Print the address the application will be reachable on
    Address,
    /// Print the effective configuration
    Config {
        /// Output format
        #[arg(long, value_enum, default_value = "toml")]
        format: ConfigFormat,
    },
}

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version,
    about = "Integration test harness for Compose applications",
    long_about = "Integration test harness for Compose applications\n\nBuilds and pulls once, supervises `docker-compose up`, waits for readiness, and always cleans up.",
    color = clap::ColorChoice::Auto
)]
pub struct Cli {
    /// Log format (text or json, defaults to text, can be set via STEVEDORE_LOG_FORMAT env var)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Configuration file path (defaults to ./stevedore.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Initialize logging from the global options, then run the subcommand
    pub async fn dispatch(self) -> Result<()> {
        let log_format = match self.log_format {
            Some(LogFormat::Text) => Some("text"),
            Some(LogFormat::Json) => Some("json"),
            None => None,
        };

        let log_level = self.log_level.as_str();
        if std::env::var_os("STEVEDORE_LOG").is_none() && std::env::var_os("RUST_LOG").is_none() {
            std::env::set_var(
                "RUST_LOG",
                format!("stevedore={},stevedore_core={}", log_level, log_level),
            );
        }
        stevedore_core::logging::init(log_format)?;
        tracing::debug!(
            "CLI initialized with log level: {} (stevedore-core {})",
            log_level,
            stevedore_core::version()
        );

        let config_path = self.config;
        match self.command {
            Some(Commands::Run { command }) => {
                commands::run::execute_run(config_path.as_deref(), command).await
            }
            Some(Commands::Address) => {
                commands::address::execute_address(config_path.as_deref()).await
            }
            Some(Commands::Config { format }) => {
                commands::config::execute_config(config_path.as_deref(), format)
            }
            None => {
                println!("Integration test harness for Compose applications");
                println!("Run 'stevedore --help' to see available commands.");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_takes_trailing_command() {
        let cli = Cli::parse_from(["stevedore", "run", "--", "cargo", "test", "--release"]);
        match cli.command {
            Some(Commands::Run { command }) => {
                assert_eq!(command, vec!["cargo", "test", "--release"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_run_requires_command() {
        assert!(Cli::try_parse_from(["stevedore", "run"]).is_err());
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::parse_from([
            "stevedore",
            "config",
            "--config",
            "ci/stevedore.toml",
            "--log-level",
            "debug",
        ]);
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                format: ConfigFormat::Toml
            })
        ));
        assert_eq!(cli.config, Some(PathBuf::from("ci/stevedore.toml")));
        assert_eq!(cli.log_level.as_str(), "debug");
    }
}
