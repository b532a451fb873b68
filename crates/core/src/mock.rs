//! Mock orchestrator backend and readiness probe for testing
//!
//! These implementations let the whole harness run without docker. Every
//! orchestrator invocation is recorded in order so tests can check what ran,
//! how often, and in which sequence. Clones share state, so a test can keep a
//! handle after moving the backend into a [`crate::harness::Harness`].

use crate::compose::{CommandOutput, ComposeBackend, ExitReport, ProcessHandle};
use crate::errors::{Result, StartupError};
use crate::log_sink::LogSink;
use crate::readiness::ReadinessProbe;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Orchestrator interactions recorded by the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockCommand {
    Build,
    ActiveHost,
    HostAddress,
    Pull,
    Up,
    Interrupt,
    Wait,
    Kill,
    RemoveContainers,
}

/// How the mock `up` process reacts to shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockProcessBehavior {
    /// Exit with `code` after `delay` once interrupted
    ExitOnInterrupt { code: i32, delay: Duration },
    /// Keep running until killed
    IgnoreInterrupt,
    /// Interrupt delivery fails; the process keeps running until killed
    RejectInterrupt,
    /// Ignore the interrupt and fail the kill
    Unkillable,
}

impl Default for MockProcessBehavior {
    fn default() -> Self {
        Self::ExitOnInterrupt {
            code: 0,
            delay: Duration::ZERO,
        }
    }
}

/// Configuration for the MockBackend
#[derive(Debug, Clone)]
pub struct MockBackendConfig {
    /// Whether the build command succeeds
    pub build_success: bool,
    /// Name reported by the active host query; `None` makes the query fail
    pub active_host: Option<String>,
    /// Address reported for the active host; `None` makes the query fail
    pub host_address: Option<String>,
    /// Whether the pull command succeeds
    pub pull_success: bool,
    /// Captured output of the pull command
    pub pull_output: String,
    /// Whether spawning `up` fails
    pub spawn_fails: bool,
    /// Text the `up` process writes to the log when started
    pub up_output: Option<String>,
    /// Shutdown behavior of every spawned process
    pub process_behavior: MockProcessBehavior,
    /// Whether container removal succeeds
    pub remove_success: bool,
}

impl Default for MockBackendConfig {
    fn default() -> Self {
        Self {
            build_success: true,
            active_host: None,
            host_address: None,
            pull_success: true,
            pull_output: String::new(),
            spawn_fails: false,
            up_output: None,
            process_behavior: MockProcessBehavior::default(),
            remove_success: true,
        }
    }
}

/// Mock orchestrator backend
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    config: Arc<Mutex<MockBackendConfig>>,
    history: Arc<Mutex<Vec<MockCommand>>>,
}

impl MockBackend {
    /// Create a new MockBackend with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new MockBackend with custom configuration
    pub fn with_config(config: MockBackendConfig) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Update mock configuration
    pub fn update_config<F>(&self, f: F)
    where
        F: FnOnce(&mut MockBackendConfig),
    {
        let mut config = self.config.lock().unwrap();
        f(&mut config);
    }

    /// Every recorded interaction, in order
    pub fn history(&self) -> Vec<MockCommand> {
        self.history.lock().unwrap().clone()
    }

    /// Number of times `command` was recorded
    pub fn calls(&self, command: MockCommand) -> usize {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == command)
            .count()
    }

    /// Position of the first `command` in the history
    pub fn position(&self, command: MockCommand) -> Option<usize> {
        self.history.lock().unwrap().iter().position(|c| *c == command)
    }

    fn record(&self, command: MockCommand) -> MockBackendConfig {
        debug!("mock backend: {:?}", command);
        self.history.lock().unwrap().push(command);
        self.config.lock().unwrap().clone()
    }
}

fn output(success: bool, text: &str) -> CommandOutput {
    CommandOutput {
        status: ExitReport {
            code: Some(if success { 0 } else { 1 }),
        },
        output: text.as_bytes().to_vec(),
    }
}

impl ComposeBackend for MockBackend {
    type Process = MockProcess;

    async fn build(&self) -> io::Result<CommandOutput> {
        let config = self.record(MockCommand::Build);
        Ok(output(config.build_success, "build output\n"))
    }

    async fn active_host(&self) -> io::Result<CommandOutput> {
        let config = self.record(MockCommand::ActiveHost);
        match config.active_host {
            Some(name) => Ok(output(true, &format!("{}\n", name))),
            None => Ok(output(false, "No active host found\n")),
        }
    }

    async fn host_address(&self, _host: &str) -> io::Result<CommandOutput> {
        let config = self.record(MockCommand::HostAddress);
        match config.host_address {
            Some(address) => Ok(output(true, &format!("{}\n", address))),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "host not found")),
        }
    }

    async fn pull(&self) -> io::Result<CommandOutput> {
        let config = self.record(MockCommand::Pull);
        Ok(output(config.pull_success, &config.pull_output))
    }

    async fn up(&self, sink: &LogSink) -> Result<MockProcess> {
        let config = self.record(MockCommand::Up);
        if config.spawn_fails {
            return Err(StartupError::Spawn {
                message: "mock spawn failure".to_string(),
            }
            .into());
        }
        if let Some(text) = config.up_output {
            sink.write_str(&text)?;
        }
        Ok(MockProcess {
            behavior: config.process_behavior,
            interrupted: false,
            killed: false,
            history: Arc::clone(&self.history),
        })
    }

    async fn remove_containers(&self) -> io::Result<CommandOutput> {
        let config = self.record(MockCommand::RemoveContainers);
        Ok(output(config.remove_success, "No stopped containers\n"))
    }
}

/// Mock `up` process
#[derive(Debug)]
pub struct MockProcess {
    behavior: MockProcessBehavior,
    interrupted: bool,
    killed: bool,
    history: Arc<Mutex<Vec<MockCommand>>>,
}

impl MockProcess {
    fn record(&self, command: MockCommand) {
        self.history.lock().unwrap().push(command);
    }
}

impl ProcessHandle for MockProcess {
    fn id(&self) -> Option<u32> {
        (!self.killed).then_some(4242)
    }

    fn interrupt(&mut self) -> io::Result<()> {
        self.record(MockCommand::Interrupt);
        match self.behavior {
            MockProcessBehavior::RejectInterrupt => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "operation not permitted",
            )),
            _ => {
                self.interrupted = true;
                Ok(())
            }
        }
    }

    async fn wait(&mut self) -> io::Result<ExitReport> {
        self.record(MockCommand::Wait);
        match self.behavior {
            MockProcessBehavior::ExitOnInterrupt { code, delay } if self.interrupted => {
                tokio::time::sleep(delay).await;
                Ok(ExitReport { code: Some(code) })
            }
            _ if self.killed => Ok(ExitReport { code: None }),
            _ => std::future::pending().await,
        }
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.record(MockCommand::Kill);
        match self.behavior {
            MockProcessBehavior::Unkillable => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "operation not permitted",
            )),
            _ => {
                self.killed = true;
                Ok(())
            }
        }
    }
}

/// Mock readiness probe that becomes ready after a number of attempts
#[derive(Debug, Clone, Default)]
pub struct MockProbe {
    ready_after: Option<usize>,
    attempts: Arc<AtomicUsize>,
    urls: Arc<Mutex<Vec<String>>>,
}

impl MockProbe {
    /// Ready on the very first check
    pub fn ready() -> Self {
        Self::ready_after(1)
    }

    /// Ready from the `attempts`-th check onwards
    pub fn ready_after(attempts: usize) -> Self {
        Self {
            ready_after: Some(attempts),
            ..Default::default()
        }
    }

    /// Never ready
    pub fn never() -> Self {
        Self::default()
    }

    /// Total number of checks made
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Every URL checked, in order
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

impl ReadinessProbe for MockProbe {
    async fn check(&self, url: &str) -> bool {
        self.urls.lock().unwrap().push(url.to_string());
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        matches!(self.ready_after, Some(n) if attempt >= n)
    }
}
