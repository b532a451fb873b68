//! Scoped cleanup for a single run
//!
//! Actions are pushed as the run acquires resources and unwound in reverse
//! order on every exit path: success, error, or panic in the test body.

use crate::compose::ComposeBackend;
use crate::errors::StevedoreError;
use crate::log_sink::LogSink;
use crate::supervisor::{self, SupervisedProcess};
use std::time::Duration;
use tracing::debug;

/// A deferred action of a run
#[derive(Debug)]
pub enum Cleanup<P> {
    /// Flush the shared log file
    SyncLog { sink: LogSink },
    /// Shut the orchestrator down and remove its containers
    Shutdown {
        process: SupervisedProcess<P>,
        timeout: Duration,
    },
    /// Write the end marker after letting trailing output land
    EndMarker {
        sink: LogSink,
        sequence: u64,
        delay: Duration,
    },
}

impl<P> Cleanup<P> {
    fn name(&self) -> &'static str {
        match self {
            Self::SyncLog { .. } => "sync-log",
            Self::Shutdown { .. } => "shutdown",
            Self::EndMarker { .. } => "end-marker",
        }
    }
}

/// Stack of deferred actions
#[derive(Debug)]
pub struct CleanupStack<P> {
    actions: Vec<Cleanup<P>>,
}

impl<P> Default for CleanupStack<P> {
    fn default() -> Self {
        Self {
            actions: Vec::new(),
        }
    }
}

impl<P> CleanupStack<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Cleanup<P>) {
        debug!("Scheduled cleanup: {}", action.name());
        self.actions.push(action);
    }

    fn len(&self) -> usize {
        self.actions.len()
    }

    /// Run every action, last pushed first, and collect their failures
    ///
    /// A failing action never prevents the ones below it from running.
    pub async fn unwind<B>(self, backend: &B) -> Vec<StevedoreError>
    where
        B: ComposeBackend<Process = P>,
    {
        debug!("Unwinding {} cleanup action(s)", self.len());
        let mut errors = Vec::new();
        for action in self.actions.into_iter().rev() {
            debug!("Running cleanup: {}", action.name());
            let result = match action {
                Cleanup::SyncLog { sink } => sink.sync(),
                Cleanup::Shutdown {
                    mut process,
                    timeout,
                } => {
                    supervisor::shutdown(backend, &mut process, timeout)
                        .await
                        .map(|_| ())
                }
                Cleanup::EndMarker {
                    sink,
                    sequence,
                    delay,
                } => {
                    tokio::time::sleep(delay).await;
                    sink.end_marker(sequence)
                }
            };
            if let Err(e) = result {
                errors.push(e);
            }
        }
        errors
    }
}
