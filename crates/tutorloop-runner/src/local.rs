//! Local process runner.
//!
//! This module provides [`LocalRunner`], which executes learner files with
//! the toolchains installed on the host.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::{CodeRunner, RunCommand, RunOutput, RunnerError};

/// Runs learner files as local processes.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use std::time::Duration;
/// use tutorloop_runner::{CodeRunner, LocalRunner};
///
/// # async fn example() -> Result<(), tutorloop_runner::RunnerError> {
/// let runner = LocalRunner::new().with_timeout(Duration::from_secs(30));
/// let out = runner.run("py", Path::new("/tmp/course/lesson1/main.py")).await?;
/// println!("{}", out.output);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalRunner {
    timeout: Option<Duration>,
    open_non_executable: bool,
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalRunner {
    /// Creates a runner with no timeout that opens non-executable files
    /// with the platform's default handler.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            timeout: None,
            open_non_executable: true,
        }
    }

    /// Bounds every run by a wall-clock timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets an optional timeout; `None` means runs are unbounded.
    #[must_use]
    pub const fn with_optional_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Disables opening non-executable files (used in headless contexts).
    #[must_use]
    pub const fn without_opener(mut self) -> Self {
        self.open_non_executable = false;
        self
    }

    /// Returns the configured timeout.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    #[instrument(skip(self, command, path), fields(program = %command.program))]
    async fn execute(&self, command: &RunCommand, path: &Path) -> Result<String, RunnerError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(command.args_for(path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }

        debug!(command = %command.display_for(path), "Launching learner program");

        let child = cmd.spawn().map_err(|e| RunnerError::LaunchFailed {
            program: command.program.clone(),
            message: e.to_string(),
        })?;

        let waited = match self.timeout {
            // Dropping the wait future drops the child, which kills it.
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| RunnerError::TimedOut {
                    program: command.program.clone(),
                    timeout_secs: limit.as_secs(),
                })?,
            None => child.wait_with_output().await,
        };

        let output = waited.map_err(|e| RunnerError::LaunchFailed {
            program: command.program.clone(),
            message: e.to_string(),
        })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            info!(bytes = combined.len(), "Learner program finished");
            Ok(combined)
        } else {
            warn!(code = ?output.status.code(), "Learner program exited with failure");
            Err(RunnerError::NonZeroExit {
                program: command.program.clone(),
                code: output.status.code(),
                output: combined,
            })
        }
    }

    fn open_with_default_handler(path: &Path) {
        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", "start", ""]);
            c
        } else if cfg!(target_os = "macos") {
            Command::new("open")
        } else {
            Command::new("xdg-open")
        };
        cmd.arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        match cmd.spawn() {
            Ok(_) => debug!(path = %path.display(), "Opened file with default handler"),
            Err(e) => warn!(path = %path.display(), error = %e, "Could not open file"),
        }
    }
}

#[async_trait]
impl CodeRunner for LocalRunner {
    #[instrument(skip(self, path), fields(path = %path.display()))]
    async fn run(&self, language: &str, path: &Path) -> Result<RunOutput, RunnerError> {
        let Some(command) = RunCommand::for_language(language) else {
            info!(language, "No run command for language");
            if self.open_non_executable {
                Self::open_with_default_handler(path);
            }
            return Ok(RunOutput::not_executed(path, language));
        };

        let output = self.execute(&command, path).await?;
        Ok(RunOutput {
            path: path.to_path_buf(),
            output,
            executed: true,
        })
    }
}
