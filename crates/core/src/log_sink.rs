//! Shared append-only log file
//!
//! One sink is opened per harness and lives until the harness is dropped.
//! The orchestrator's stdout and stderr are redirected into it directly, and
//! the harness interleaves run markers and pull status lines.

use crate::errors::{LogError, Result, SetupError};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tracing::debug;

/// Cloneable handle to the shared log file
#[derive(Debug, Clone)]
pub struct LogSink {
    path: PathBuf,
    file: Arc<File>,
}

impl LogSink {
    /// Create (or truncate) the log file
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| SetupError::LogOpen {
                path: path.clone(),
                source,
            })?;
        }
        // Truncate, then reopen with O_APPEND; subprocesses inherit this handle.
        let file = File::create(&path)
            .and_then(|_| OpenOptions::new().append(true).open(&path))
            .map_err(|source| SetupError::LogOpen {
                path: path.clone(),
                source,
            })?;
        debug!("Opened log sink at {}", path.display());
        Ok(Self {
            path,
            file: Arc::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append raw bytes
    pub fn write_raw(&self, bytes: &[u8]) -> Result<()> {
        (&*self.file).write_all(bytes).map_err(LogError::Write)?;
        Ok(())
    }

    /// Append text as-is (no newline added)
    pub fn write_str(&self, text: &str) -> Result<()> {
        self.write_raw(text.as_bytes())
    }

    /// Append one line
    pub fn write_line(&self, line: &str) -> Result<()> {
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        self.write_raw(buf.as_bytes())
    }

    /// Write the marker opening run `sequence`
    pub fn start_marker(&self, sequence: u64) -> Result<()> {
        self.write_line(&format!("--- test {} start", sequence))
    }

    /// Write the marker closing run `sequence`
    pub fn end_marker(&self, sequence: u64) -> Result<()> {
        self.write_line(&format!("--- test {} end", sequence))
    }

    /// Flush file contents to disk
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all().map_err(LogError::Sync)?;
        Ok(())
    }

    /// Stdio handle that appends to this sink, for subprocess redirection
    pub fn stdio(&self) -> Result<Stdio> {
        let file = self.file.try_clone().map_err(LogError::Redirect)?;
        Ok(Stdio::from(file))
    }
}
