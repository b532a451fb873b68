//! Process-wide lifecycle state of a harness
//!
//! The one-time flags only ever go from `false` to `true`; that is what makes
//! "build once, reuse across many tests" work while every test still calls
//! the harness unconditionally.

use crate::address::TargetAddress;
use crate::log_sink::LogSink;

/// One-time guards and shared resources, owned by a [`crate::harness::Harness`]
#[derive(Debug, Default)]
pub struct LifecycleState {
    /// The build step has succeeded
    pub built: bool,
    /// Images have been pulled
    pub pulled: bool,
    /// Global hooks have run
    pub hooks_ran: bool,
    /// Resolved address, immutable once set
    pub target_address: Option<TargetAddress>,
    /// Shared log file, never reopened
    pub log_sink: Option<LogSink>,
    /// Number of runs started so far
    pub sequence: u64,
}

impl LifecycleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new run and return its sequence number
    pub fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_state_has_nothing_done() {
        let state = LifecycleState::new();
        assert!(!state.built && !state.pulled && !state.hooks_ran);
        assert!(state.target_address.is_none());
        assert!(state.log_sink.is_none());
        assert_eq!(state.sequence, 0);
    }

    #[test]
    fn test_sequence_increments_by_one() {
        let mut state = LifecycleState::new();
        assert_eq!(state.next_sequence(), 1);
        assert_eq!(state.next_sequence(), 2);
        assert_eq!(state.next_sequence(), 3);
    }
}
