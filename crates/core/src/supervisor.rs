//! Supervision of the long-running orchestrator process
//!
//! Startup spawns `up` and returns immediately. Shutdown is a small state
//! machine:
//!
//! ```text
//! Interrupting -> WaitingForExit -> Exited ---------------> Removing -> Removed
//!       |                |                                     ^
//!       |                +--------> TimedOut -> Killing -------+
//!       +-------------------------------------> Killing
//! ```
//!
//! Exit is raced against a deadline with [`tokio::time::timeout`]. Container
//! removal runs on every path, and only after the process has been reaped.

use crate::compose::{ComposeBackend, ExitReport, ProcessHandle};
use crate::errors::{Result, ShutdownError, StevedoreError};
use crate::log_sink::LogSink;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Lifetime phase of a supervised process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessPhase {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// States of the shutdown protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Interrupting,
    WaitingForExit,
    Exited(ExitReport),
    TimedOut,
    Killing,
    Removing,
    Removed,
}

/// The orchestrator process of one run
#[derive(Debug)]
pub struct SupervisedProcess<P> {
    handle: P,
    pid: Option<u32>,
    started_at: Instant,
    phase: ProcessPhase,
}

impl<P: ProcessHandle> SupervisedProcess<P> {
    /// Spawn `up` with output going to `sink`
    #[instrument(skip_all)]
    pub async fn start<B>(backend: &B, sink: &LogSink) -> Result<Self>
    where
        B: ComposeBackend<Process = P>,
    {
        let handle = backend.up(sink).await?;
        let mut process = Self {
            pid: handle.id(),
            handle,
            started_at: Instant::now(),
            phase: ProcessPhase::Starting,
        };
        process.transition(ProcessPhase::Running);
        info!("Compose started (pid {:?})", process.pid());
        Ok(process)
    }

    fn transition(&mut self, next: ProcessPhase) {
        debug!("Supervised process phase: {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn phase(&self) -> ProcessPhase {
        self.phase
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Result of a shutdown that left nothing behind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// How the process exited; a failure status here is not a run failure
    pub exit: ExitReport,
    /// How long the process ran
    pub uptime: Duration,
}

/// Interrupt, wait up to `timeout`, kill if needed, then remove containers
///
/// The first fatal condition is returned; later ones are logged. Containers
/// are removed even when the interrupt or the kill fails. The process is in
/// [`ProcessPhase::Stopped`] afterwards on every path.
#[instrument(skip_all, fields(pid = ?process.pid()))]
pub async fn shutdown<B>(
    backend: &B,
    process: &mut SupervisedProcess<B::Process>,
    timeout: Duration,
) -> Result<ShutdownReport>
where
    B: ComposeBackend,
{
    process.transition(ProcessPhase::Stopping);
    let mut failures: Vec<ShutdownError> = Vec::new();
    let mut exit = None;
    let mut state = ShutdownState::Interrupting;

    loop {
        debug!("Shutdown state: {:?}", state);
        state = match state {
            ShutdownState::Interrupting => match process.handle.interrupt() {
                Ok(()) => ShutdownState::WaitingForExit,
                Err(e) => {
                    failures.push(ShutdownError::Signal {
                        pid: process.pid(),
                        message: e.to_string(),
                    });
                    ShutdownState::Killing
                }
            },
            ShutdownState::WaitingForExit => {
                match tokio::time::timeout(timeout, process.handle.wait()).await {
                    Ok(Ok(report)) => ShutdownState::Exited(report),
                    Ok(Err(e)) => {
                        failures.push(ShutdownError::Wait {
                            message: e.to_string(),
                        });
                        ShutdownState::Killing
                    }
                    Err(_) => ShutdownState::TimedOut,
                }
            }
            ShutdownState::Exited(report) => {
                if !report.success() {
                    warn!("Compose exited with error: {}", report);
                }
                exit = Some(report);
                ShutdownState::Removing
            }
            ShutdownState::TimedOut => {
                warn!("Compose did not exit within {:?}, killing", timeout);
                failures.push(ShutdownError::KilledOnTimeout { timeout });
                ShutdownState::Killing
            }
            ShutdownState::Killing => {
                if let Err(e) = process.handle.kill().await {
                    // Kill failure outranks the reason for killing
                    failures.insert(
                        0,
                        ShutdownError::Kill {
                            message: e.to_string(),
                        },
                    );
                }
                ShutdownState::Removing
            }
            ShutdownState::Removing => {
                process.transition(ProcessPhase::Stopped);
                match backend.remove_containers().await {
                    Ok(output) if output.success() => {}
                    Ok(output) => failures.push(ShutdownError::Cleanup {
                        message: output.describe(),
                    }),
                    Err(e) => failures.push(ShutdownError::Cleanup {
                        message: e.to_string(),
                    }),
                }
                ShutdownState::Removed
            }
            ShutdownState::Removed => break,
        };
    }

    let mut failures = failures.into_iter();
    if let Some(first) = failures.next() {
        for later in failures {
            error!("Additional shutdown failure: {}", later);
        }
        return Err(StevedoreError::Shutdown(first));
    }

    let exit = exit.unwrap_or(ExitReport { code: None });
    info!("Compose stopped after {:?} ({})", process.uptime(), exit);
    Ok(ShutdownReport {
        exit,
        uptime: process.uptime(),
    })
}
