//! tutorloop Code Runner
//!
//! Executes a learner's source file on the local machine and captures its
//! output. There is no sandbox: the program runs with the learner's own
//! permissions, optionally bounded by a wall-clock timeout.

mod local;

pub use local::LocalRunner;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while executing a learner's file.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The process could not be started (missing toolchain, bad path).
    #[error("failed to launch '{program}': {message}")]
    LaunchFailed {
        /// The program that was being launched.
        program: String,
        /// Description of the launch failure.
        message: String,
    },

    /// The process ran but exited with a non-zero status.
    #[error("'{program}' exited with {}", describe_code(*.code))]
    NonZeroExit {
        /// The program that was run.
        program: String,
        /// Exit code, if the process was not killed by a signal.
        code: Option<i32>,
        /// Combined stdout and stderr captured before the exit.
        output: String,
    },

    /// The process did not finish within the configured timeout.
    #[error("'{program}' did not finish within {timeout_secs}s")]
    TimedOut {
        /// The program that was run.
        program: String,
        /// The timeout that was exceeded, in seconds.
        timeout_secs: u64,
    },
}

fn describe_code(code: Option<i32>) -> String {
    code.map_or_else(
        || "no exit code (killed by signal)".to_string(),
        |c| format!("exit code {c}"),
    )
}

impl RunnerError {
    /// Returns the output captured before the failure, if any.
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::NonZeroExit { output, .. } => Some(output),
            Self::LaunchFailed { .. } | Self::TimedOut { .. } => None,
        }
    }

    /// Returns the program involved in the failure.
    #[must_use]
    pub fn program(&self) -> &str {
        match self {
            Self::LaunchFailed { program, .. }
            | Self::NonZeroExit { program, .. }
            | Self::TimedOut { program, .. } => program,
        }
    }
}

/// How a language tag is executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCommand {
    /// Program to invoke (resolved through `PATH`).
    pub program: String,
    /// Arguments placed before the file path.
    pub args: Vec<String>,
}

impl RunCommand {
    /// Creates a command that runs `program <args...> <file>`.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the command for a file-extension-like language tag.
    ///
    /// Returns `None` for languages that have no runnable mapping (for
    /// example `html`); those files are opened with the default handler
    /// instead of being executed.
    #[must_use]
    pub fn for_language(language: &str) -> Option<Self> {
        match language.trim().to_lowercase().as_str() {
            "go" => Some(Self::new("go", vec!["run"])),
            "py" => Some(Self::new(python_program(), Vec::<String>::new())),
            "js" => Some(Self::new("node", Vec::<String>::new())),
            "rb" => Some(Self::new("ruby", Vec::<String>::new())),
            _ => None,
        }
    }

    /// Returns the full argument list for running `file`.
    #[must_use]
    pub fn args_for(&self, file: &Path) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(file.to_string_lossy().into_owned());
        args
    }

    /// Renders the command line for logs and error messages.
    #[must_use]
    pub fn display_for(&self, file: &Path) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args_for(file));
        parts.join(" ")
    }
}

const fn python_program() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

/// Result of running (or opening) a learner's file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutput {
    /// The file that was run.
    pub path: PathBuf,
    /// Combined stdout followed by stderr, or a placeholder for
    /// non-executable languages.
    pub output: String,
    /// Whether the file was actually executed.
    pub executed: bool,
}

impl RunOutput {
    /// Creates the placeholder result for a language without a run command.
    #[must_use]
    pub fn not_executed(path: impl Into<PathBuf>, language: &str) -> Self {
        Self {
            path: path.into(),
            output: format!("no output with {language}"),
            executed: false,
        }
    }
}

/// Executes learner files.
///
/// Implemented by [`LocalRunner`]; tests substitute scripted runners.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    /// Runs the file at `path` as a program written in `language`.
    async fn run(&self, language: &str, path: &Path) -> Result<RunOutput, RunnerError>;
}
