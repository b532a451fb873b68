//! Setup hooks injected by test suites
//!
//! Global hooks run once, before the first run. Per-run hooks run before
//! every test body and receive the resolved target address. Both lists run in
//! registration order and stop at the first failure.

use crate::address::TargetAddress;
use crate::errors::{Result, SetupError};
use tracing::debug;

/// Hook run once before the first run
pub type GlobalHook = Box<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Hook run before every test body
pub type PerRunHook = Box<dyn Fn(&TargetAddress) -> anyhow::Result<()> + Send + Sync>;

/// Append-only, ordered hook lists
#[derive(Default)]
pub struct HookRegistry {
    global: Vec<GlobalHook>,
    per_run: Vec<PerRunHook>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_global<F>(&mut self, hook: F)
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.global.push(Box::new(hook));
    }

    pub fn register_per_run<F>(&mut self, hook: F)
    where
        F: Fn(&TargetAddress) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.per_run.push(Box::new(hook));
    }

    /// Run every global hook in order
    pub fn run_global(&self) -> Result<()> {
        for (index, hook) in self.global.iter().enumerate() {
            debug!("Running global hook #{}", index);
            hook().map_err(|e| SetupError::Hook {
                kind: "global",
                index,
                message: format!("{:#}", e),
            })?;
        }
        Ok(())
    }

    /// Run every per-run hook in order with the target address
    pub fn run_per_run(&self, address: &TargetAddress) -> Result<()> {
        for (index, hook) in self.per_run.iter().enumerate() {
            debug!("Running per-run hook #{} for {}", index, address);
            hook(address).map_err(|e| SetupError::Hook {
                kind: "per-run",
                index,
                message: format!("{:#}", e),
            })?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("global", &self.global.len())
            .field("per_run", &self.per_run.len())
            .finish()
    }
}
