//! Address command implementation
//!
//! Resolves the target address the same way a harness run would (configured
//! override, else the active named host, else loopback) and prints it.

use anyhow::{Context, Result};
use std::path::Path;
use stevedore_core::{Harness, HarnessConfig};

/// Execute the address command
pub async fn execute_address(config_path: Option<&Path>) -> Result<()> {
    let config = HarnessConfig::load(config_path).context("Failed to load configuration")?;
    let harness = Harness::new(config).context("Failed to set up harness")?;
    let address = harness
        .resolve_address()
        .await
        .context("Failed to resolve target address")?;
    println!("{}", address);
    Ok(())
}
