//! Orchestrator CLI integration
//!
//! Every orchestrator invocation the harness makes goes through the
//! [`ComposeBackend`] trait: the one-time build, the named-host queries, the
//! image pull, the long-running `up`, and container removal. The backend is a
//! thin command runner; interpreting results (what counts as fatal, what is a
//! fallback) is the harness's job.
//!
//! [`ComposeCli`] is the real implementation on top of `docker-compose` and
//! `docker-machine`; [`crate::mock`] provides a scriptable one for tests.

use crate::config::HarnessConfig;
use crate::errors::{Result, StartupError};
use crate::log_sink::LogSink;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, instrument};

/// How a process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
}

impl ExitReport {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ExitReport {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

impl fmt::Display for ExitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit status: {}", code),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// Exit status plus captured stdout followed by stderr
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitReport,
    pub output: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Captured output with surrounding whitespace removed
    pub fn trimmed(&self) -> String {
        String::from_utf8_lossy(&self.output).trim().to_string()
    }

    /// Message for error reports: the output when there is any, else the status
    pub fn describe(&self) -> String {
        let text = self.trimmed();
        if text.is_empty() {
            self.status.to_string()
        } else {
            format!("{}: {}", self.status, text)
        }
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        Self {
            status: output.status.into(),
            output: combined,
        }
    }
}

/// Handle to the long-running orchestrator process
#[allow(async_fn_in_trait)]
pub trait ProcessHandle: Send {
    /// OS process id, if the process has not been reaped yet
    fn id(&self) -> Option<u32>;

    /// Ask the process to shut down gracefully
    fn interrupt(&mut self) -> io::Result<()>;

    /// Wait for the process to exit
    async fn wait(&mut self) -> io::Result<ExitReport>;

    /// Forcibly terminate the process and reap it
    async fn kill(&mut self) -> io::Result<()>;
}

/// Command runner for every orchestrator invocation
///
/// Methods returning [`CommandOutput`] fail only when the command could not be
/// run at all; a non-zero exit is reported through the output.
#[allow(async_fn_in_trait)]
pub trait ComposeBackend: Send + Sync {
    type Process: ProcessHandle;

    /// Run the one-time build step
    async fn build(&self) -> io::Result<CommandOutput>;

    /// Query the name of the active named host
    async fn active_host(&self) -> io::Result<CommandOutput>;

    /// Query the address of a named host
    async fn host_address(&self, host: &str) -> io::Result<CommandOutput>;

    /// Fetch remote images
    async fn pull(&self) -> io::Result<CommandOutput>;

    /// Launch `up` with output redirected to the sink; returns once spawned
    async fn up(&self, sink: &LogSink) -> Result<Self::Process>;

    /// Remove leftover containers
    async fn remove_containers(&self) -> io::Result<CommandOutput>;
}

/// Docker Compose command builder
#[derive(Debug, Clone)]
pub struct ComposeCommand {
    /// Compose binary path
    compose_path: String,
    /// Compose files
    compose_files: Vec<PathBuf>,
    /// Project name
    project_name: Option<String>,
    /// Working directory
    working_dir: Option<PathBuf>,
}

impl ComposeCommand {
    /// Create a new compose command builder
    pub fn new(compose_path: impl Into<String>) -> Self {
        Self {
            compose_path: compose_path.into(),
            compose_files: Vec::new(),
            project_name: None,
            working_dir: None,
        }
    }

    /// Set compose files
    pub fn with_compose_files(mut self, compose_files: Vec<PathBuf>) -> Self {
        self.compose_files = compose_files;
        self
    }

    /// Set project name
    pub fn with_project_name(mut self, project_name: Option<String>) -> Self {
        self.project_name = project_name;
        self
    }

    /// Set working directory
    pub fn with_working_dir(mut self, working_dir: Option<PathBuf>) -> Self {
        self.working_dir = working_dir;
        self
    }

    /// Full argument vector (after the program) for the given subcommand args
    pub fn args(&self, args: &[&str]) -> Vec<String> {
        let mut full = Vec::new();
        for file in &self.compose_files {
            full.push("-f".to_string());
            full.push(file.display().to_string());
        }
        if let Some(ref project_name) = self.project_name {
            full.push("-p".to_string());
            full.push(project_name.clone());
        }
        full.extend(args.iter().map(|a| a.to_string()));
        full
    }

    /// Build the compose command with given arguments
    pub fn build_command(&self, args: &[&str]) -> Command {
        let mut command = Command::new(&self.compose_path);
        command.args(self.args(args));
        if let Some(ref dir) = self.working_dir {
            command.current_dir(dir);
        }
        command.stdin(Stdio::null());
        command
    }

    pub fn program(&self) -> &str {
        &self.compose_path
    }
}

/// Arguments of the long-running up command
pub const UP_ARGS: &[&str] = &["up", "--force-recreate", "--no-color"];
/// Arguments of the image pull command
pub const PULL_ARGS: &[&str] = &["pull"];
/// Arguments of the container removal command
pub const REMOVE_ARGS: &[&str] = &["rm", "--force", "--stop"];

/// Backend that shells out to the real orchestrator tools
#[derive(Debug, Clone)]
pub struct ComposeCli {
    compose: ComposeCommand,
    machine_path: String,
    build_command: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl ComposeCli {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            compose: ComposeCommand::new(config.compose_path.clone())
                .with_compose_files(config.compose_files.clone())
                .with_project_name(config.project_name.clone())
                .with_working_dir(config.working_dir.clone()),
            machine_path: config.machine_path.clone(),
            build_command: config.build_command.clone(),
            working_dir: config.working_dir.clone(),
        }
    }

    async fn run(mut command: Command) -> io::Result<CommandOutput> {
        let output = command.stdin(Stdio::null()).output().await?;
        Ok(output.into())
    }

    fn machine_command(&self, args: &[&str]) -> Command {
        let mut command = Command::new(&self.machine_path);
        command.args(args);
        command
    }
}

impl ComposeBackend for ComposeCli {
    type Process = CliProcess;

    #[instrument(skip(self))]
    async fn build(&self) -> io::Result<CommandOutput> {
        let Some((program, args)) = self.build_command.split_first() else {
            debug!("No build command configured");
            return Ok(CommandOutput {
                status: ExitReport { code: Some(0) },
                output: Vec::new(),
            });
        };
        debug!("Running build command: {} {}", program, args.join(" "));
        let mut command = Command::new(program);
        command.args(args);
        if let Some(ref dir) = self.working_dir {
            command.current_dir(dir);
        }
        Self::run(command).await
    }

    #[instrument(skip(self))]
    async fn active_host(&self) -> io::Result<CommandOutput> {
        Self::run(self.machine_command(&["active"])).await
    }

    #[instrument(skip(self))]
    async fn host_address(&self, host: &str) -> io::Result<CommandOutput> {
        Self::run(self.machine_command(&["ip", host])).await
    }

    #[instrument(skip(self))]
    async fn pull(&self) -> io::Result<CommandOutput> {
        debug!(
            "Executing: {} {}",
            self.compose.program(),
            self.compose.args(PULL_ARGS).join(" ")
        );
        Self::run(self.compose.build_command(PULL_ARGS)).await
    }

    #[instrument(skip(self, sink))]
    async fn up(&self, sink: &LogSink) -> Result<CliProcess> {
        let mut command = self.compose.build_command(UP_ARGS);
        command
            .stdout(sink.stdio()?)
            .stderr(sink.stdio()?)
            .kill_on_drop(true);

        debug!(
            "Spawning: {} {}",
            self.compose.program(),
            self.compose.args(UP_ARGS).join(" ")
        );
        let child = command.spawn().map_err(|e| StartupError::Spawn {
            message: format!("{}: {}", self.compose.program(), e),
        })?;
        Ok(CliProcess { child })
    }

    #[instrument(skip(self))]
    async fn remove_containers(&self) -> io::Result<CommandOutput> {
        Self::run(self.compose.build_command(REMOVE_ARGS)).await
    }
}

/// The spawned `up` process
#[derive(Debug)]
pub struct CliProcess {
    child: Child,
}

impl ProcessHandle for CliProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn interrupt(&mut self) -> io::Result<()> {
        send_interrupt(&mut self.child)
    }

    async fn wait(&mut self) -> io::Result<ExitReport> {
        self.child.wait().await.map(ExitReport::from)
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.child.kill().await
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn send_interrupt(child: &mut Child) -> io::Result<()> {
    let pid = child
        .id()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "process already reaped"))?;
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

    // SAFETY: libc::kill is called with the positive PID of a child we still
    // own (not yet reaped, so the PID cannot have been recycled) and SIGINT.
    let result = unsafe { libc::kill(pid, libc::SIGINT) };
    if result == 0 {
        return Ok(());
    }
    Err(io::Error::last_os_error())
}

#[cfg(not(unix))]
fn send_interrupt(child: &mut Child) -> io::Result<()> {
    // No SIGINT equivalent for a detached console process
    child.start_kill()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_args_include_files_and_project() {
        let compose = ComposeCommand::new("docker-compose")
            .with_compose_files(vec![
                PathBuf::from("docker-compose.yml"),
                PathBuf::from("docker-compose.test.yml"),
            ])
            .with_project_name(Some("itest".to_string()));

        assert_eq!(
            compose.args(UP_ARGS),
            vec![
                "-f",
                "docker-compose.yml",
                "-f",
                "docker-compose.test.yml",
                "-p",
                "itest",
                "up",
                "--force-recreate",
                "--no-color"
            ]
        );
    }

    #[test]
    fn test_compose_args_plain() {
        let compose = ComposeCommand::new("docker-compose");
        assert_eq!(compose.args(REMOVE_ARGS), vec!["rm", "--force", "--stop"]);
        assert_eq!(compose.args(PULL_ARGS), vec!["pull"]);
    }

    #[test]
    fn test_command_output_describe() {
        let output = CommandOutput {
            status: ExitReport { code: Some(1) },
            output: b"  no such image\n".to_vec(),
        };
        assert!(!output.success());
        assert_eq!(output.trimmed(), "no such image");
        assert_eq!(output.describe(), "exit status: 1: no such image");

        let silent = CommandOutput {
            status: ExitReport { code: None },
            output: Vec::new(),
        };
        assert_eq!(silent.describe(), "terminated by signal");
    }

    #[tokio::test]
    async fn test_empty_build_command_is_noop_success() {
        let config = HarnessConfig {
            build_command: Vec::new(),
            ..Default::default()
        };
        let cli = ComposeCli::from_config(&config);
        let output = cli.build().await.unwrap();
        assert!(output.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cli_process_interrupt_and_wait() {
        let child = Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let mut process = CliProcess { child };

        assert!(process.id().is_some());
        process.interrupt().unwrap();
        let report = process.wait().await.unwrap();
        assert!(!report.success());
        assert_eq!(report.code, None);
    }
}
