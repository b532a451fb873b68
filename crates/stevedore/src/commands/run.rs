//! Run command implementation
//!
//! Implements `stevedore run -- <cmd>`: one full harness cycle whose test body
//! is an external command pointed at the live application.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::ExitStatus;
use stevedore_core::{Harness, HarnessConfig, TargetAddress};
use tokio::process::Command;
use tracing::{debug, info};

/// Environment variable carrying the target address to the wrapped command
pub const TARGET_ADDRESS_ENV: &str = "STEVEDORE_TARGET_ADDRESS";

/// Error used to exit with the wrapped command's status
#[derive(Debug)]
pub struct CommandFailed {
    pub program: String,
    pub code: Option<i32>,
}

impl CommandFailed {
    /// Process exit code to report; 1 when the command died from a signal
    pub fn exit_code(&self) -> i32 {
        match self.code {
            Some(0) | None => 1,
            Some(code) => code,
        }
    }
}

impl std::fmt::Display for CommandFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "'{}' exited with code {}", self.program, code),
            None => write!(f, "'{}' was terminated by a signal", self.program),
        }
    }
}

impl std::error::Error for CommandFailed {}

/// Execute the run command
pub async fn execute_run(config_path: Option<&Path>, command: Vec<String>) -> Result<()> {
    let config = HarnessConfig::load(config_path).context("Failed to load configuration")?;
    let harness = Harness::new(config).context("Failed to set up harness")?;

    let Some((program, args)) = command.split_first() else {
        anyhow::bail!("No command given to run");
    };
    debug!("Wrapped command: {} {}", program, args.join(" "));
    info!(
        "Compose output goes to {}",
        harness.config().log_file.display()
    );

    let outcome = harness
        .run_test(|address| run_against(program, args, address))
        .await?;

    let Some(status) = outcome else {
        info!("Short mode enabled, '{}' was not run", program);
        return Ok(());
    };
    let status = status.with_context(|| format!("Failed to run '{}'", program))?;
    if status.success() {
        info!("'{}' succeeded", program);
        return Ok(());
    }
    Err(CommandFailed {
        program: program.clone(),
        code: status.code(),
    }
    .into())
}

async fn run_against(
    program: &str,
    args: &[String],
    address: TargetAddress,
) -> std::io::Result<ExitStatus> {
    info!("Running '{}' against {}", program, address);
    Command::new(program)
        .args(args)
        .env(TARGET_ADDRESS_ENV, address.as_str())
        .kill_on_drop(true)
        .status()
        .await
}
