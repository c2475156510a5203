//! Command Runner
//!
//! Subprocess execution for approved command lines, with timeout handling,
//! output capture, and typed errors.

use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::deadline::Deadline;
use crate::error::ErrorKind;
use crate::guards::CommandLine;

/// Default timeout for command execution in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Maximum captured output per stream in bytes (64KB)
const MAX_OUTPUT_SIZE: usize = 64 * 1024;

/// `PATH` handed to children in place of the service's own environment
pub const DEFAULT_SEARCH_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Errors from running an approved command
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("failed to spawn '{program}'")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error while waiting for command")]
    Io(#[source] io::Error),
}

impl ExecError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecError::Timeout(_) => ErrorKind::Timeout,
            ExecError::Spawn { .. } | ExecError::Io(_) => ErrorKind::Internal,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ExecError::Timeout(_) => "command_timeout",
            ExecError::Spawn { .. } | ExecError::Io(_) => "execution_failed",
        }
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutput {
    /// Standard output (truncated if too large)
    pub stdout: String,

    /// Standard error (truncated if too large)
    pub stderr: String,

    /// Exit code (None if the process was terminated by a signal)
    pub returncode: Option<i32>,

    /// Execution duration in milliseconds
    #[serde(skip)]
    pub duration_ms: f64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.returncode == Some(0)
    }
}

/// Configuration for command execution
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Deadline for each execution (default: 5 seconds)
    pub timeout: Deadline,

    /// Maximum output size per stream in bytes (default: 64KB)
    pub max_output_size: usize,

    /// `PATH` for the child process
    pub search_path: String,

    /// Working directory for the child (default: inherited)
    pub working_dir: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeout: Deadline::from_secs(DEFAULT_TIMEOUT_SECS),
            max_output_size: MAX_OUTPUT_SIZE,
            search_path: DEFAULT_SEARCH_PATH.to_string(),
            working_dir: None,
        }
    }
}

impl RunnerConfig {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Deadline::new(timeout),
            ..Default::default()
        }
    }

    pub fn with_max_output_size(size: usize) -> Self {
        Self {
            max_output_size: size,
            ..Default::default()
        }
    }
}

/// Executes approved command lines
///
/// # Security
///
/// 1. Uses `tokio::process::Command` with an argument vector, never `sh -c`
/// 2. Only accepts a [`CommandLine`], which only the authorizer can build
/// 3. Kills the child when the deadline elapses (`kill_on_drop`)
/// 4. Caps captured output to prevent memory exhaustion
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    config: RunnerConfig,
}

impl CommandRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run a command line to completion or until the deadline
    pub async fn run(&self, line: &CommandLine) -> Result<CommandOutput, ExecError> {
        let start = Instant::now();
        let program = line.program();

        info!(program, args = line.args().len(), "Executing approved command");

        let mut process = Command::new(program);
        process
            .args(line.args())
            .env_clear()
            .env("PATH", &self.config.search_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = self.config.working_dir {
            process.current_dir(dir);
        }

        let child = process.spawn().map_err(|source| ExecError::Spawn {
            program: program.to_string(),
            source,
        })?;

        // On expiry the wait future is dropped together with the child,
        // and kill_on_drop terminates it.
        let output = match self.config.timeout.run(child.wait_with_output()).await {
            Ok(result) => result.map_err(ExecError::Io)?,
            Err(elapsed) => {
                warn!(program, timeout = ?elapsed.0, "Command timed out, child killed");
                return Err(ExecError::Timeout(elapsed.0));
            }
        };

        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        let returncode = output.status.code();
        debug!(program, ?returncode, duration_ms, "Command finished");

        Ok(CommandOutput {
            stdout: truncate_output(&output.stdout, self.config.max_output_size),
            stderr: truncate_output(&output.stderr, self.config.max_output_size),
            returncode,
            duration_ms,
        })
    }
}

/// Decode captured bytes, cutting them at `max_len` and marking the cut
fn truncate_output(bytes: &[u8], max_len: usize) -> String {
    if bytes.len() <= max_len {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let mut s = String::from_utf8_lossy(&bytes[..max_len.saturating_sub(3)]).into_owned();
    s.push_str("...");
    s
}
