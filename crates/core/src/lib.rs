//! Core library for stevedore
//!
//! This crate runs integration tests against a live multi-container
//! application: it builds and pulls once, supervises the orchestrator's `up`
//! process, polls for readiness, runs setup hooks and the test body, and
//! shuts everything down again on every exit path.

pub mod address;
pub mod cleanup;
pub mod compose;
pub mod config;
pub mod errors;
pub mod harness;
pub mod hooks;
pub mod log_sink;
pub mod logging;
pub mod mock;
pub mod readiness;
pub mod state;
pub mod supervisor;

pub use address::TargetAddress;
pub use config::HarnessConfig;
pub use errors::{Result, StevedoreError};
pub use harness::Harness;

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let version = version();
        assert!(!version.is_empty());
        assert!(version.contains('.'));
    }
}
