//! Error types for the tutorloop engine.
//!
//! This module defines the error hierarchy for all engine operations,
//! including configuration loading, provider calls, course persistence,
//! code execution and session transitions.

use std::path::PathBuf;

use tutorloop_runner::RunnerError;

/// A specialized `Result` type for tutorloop engine operations.
pub type Result<T> = std::result::Result<T, TutorError>;

/// Errors that can occur while generating or studying a course.
///
/// Error variants are organized by subsystem and include actionable suggestions
/// to help users resolve issues.
#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Fix the file by hand or rewrite it with 'tutorloop config'")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Provider Errors
    // ========================================================================
    /// The requested provider is unknown or has no credential.
    #[error("Provider '{provider}' is not configured\n\nSuggestion: Run 'tutorloop config --provider <name> --api-key <key> --model <model>'")]
    ProviderNotConfigured {
        /// Identity of the provider that was requested.
        provider: String,
    },

    /// The provider client could not be constructed or rejected the credential.
    #[error("Failed to initialize provider '{provider}': {message}\n\nSuggestion: Check the API key and model for this provider")]
    ProviderInitFailure {
        /// Identity of the provider.
        provider: String,
        /// Description of the failure.
        message: String,
    },

    /// The provider call failed in transit or with a non-success status.
    #[error("Provider '{provider}' request failed ({kind}): {message}\n\nSuggestion: {suggestion}")]
    TransportFailure {
        /// Identity of the provider.
        provider: String,
        /// Classification of the failure.
        kind: LlmErrorKind,
        /// Detailed error message.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// The provider answered, but not with a usable tool call.
    #[error("Malformed model response: {message}\n\nSuggestion: Retry the command; if it keeps failing try a different model")]
    MalformedResponse {
        /// Description of what was wrong with the response.
        message: String,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// The learner's program could not be run to completion.
    #[error("Execution failed: {source}\n\nSuggestion: Fix the program and run it again")]
    ExecutionFailure {
        /// The underlying runner failure.
        #[from]
        source: RunnerError,
    },

    // ========================================================================
    // Course Store Errors
    // ========================================================================
    /// No course with the given id exists under the courses root.
    #[error("Course not found: '{course_id}' (looked in '{path}')\n\nSuggestion: Run 'tutorloop list' to see available courses")]
    CourseNotFound {
        /// The requested course id.
        course_id: String,
        /// Where the course was expected.
        path: PathBuf,
    },

    /// Reading or writing course files failed.
    #[error("Failed to access '{path}': {message}\n\nSuggestion: Check permissions and available disk space")]
    PersistenceFailure {
        /// Path that was being accessed.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // State Machine Errors
    // ========================================================================
    /// Invalid state transition attempted.
    #[error("Invalid state transition: cannot {action} while {from}\n\nSuggestion: This is a bug in the caller; check the session state before acting")]
    InvalidStateTransition {
        /// The current state.
        from: String,
        /// The attempted action.
        action: String,
    },
}

/// Categories of LLM API errors for structured error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Authentication failure (invalid API key, expired credentials).
    Authentication,
    /// Rate limit exceeded.
    RateLimit,
    /// Server error (5xx responses).
    Server,
    /// Network connectivity issues, including timeouts.
    Network,
    /// Other unclassified errors.
    Other,
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Server => write!(f, "server"),
            Self::Network => write!(f, "network"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl LlmErrorKind {
    /// Classifies an HTTP status code.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            429 => Self::RateLimit,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }

    /// Returns a suggestion message for this error kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::Authentication => "Check your API key or credentials",
            Self::RateLimit => "Wait and retry, or reduce request frequency",
            Self::Server => "Retry later; the LLM service may be experiencing issues",
            Self::Network => "Check your network connection",
            Self::Other => "Check the model name and the LLM provider's status page",
        }
    }
}

impl TutorError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `ProviderNotConfigured` error.
    #[must_use]
    pub fn provider_not_configured(provider: impl Into<String>) -> Self {
        Self::ProviderNotConfigured {
            provider: provider.into(),
        }
    }

    /// Creates a new `ProviderInitFailure` error.
    #[must_use]
    pub fn provider_init(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderInitFailure {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Creates a new `TransportFailure` with automatic suggestion based on error kind.
    #[must_use]
    pub fn transport(
        provider: impl Into<String>,
        kind: LlmErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self::TransportFailure {
            provider: provider.into(),
            kind,
            message: message.into(),
            suggestion: kind.suggestion().to_string(),
        }
    }

    /// Creates a new `MalformedResponse` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    /// Creates a new `CourseNotFound` error.
    #[must_use]
    pub fn course_not_found(course_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::CourseNotFound {
            course_id: course_id.into(),
            path: path.into(),
        }
    }

    /// Creates a new `PersistenceFailure` error.
    #[must_use]
    pub fn persistence(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::PersistenceFailure {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Creates a new `InvalidStateTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, action: impl Into<String>) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            action: action.into(),
        }
    }

    /// Returns `true` if the learner can recover by editing and retrying.
    ///
    /// Only execution failures qualify; every other error aborts the command.
    #[must_use]
    pub const fn is_learner_recoverable(&self) -> bool {
        matches!(self, Self::ExecutionFailure { .. })
    }

    /// Returns `true` if this error is transient and the same call may succeed later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransportFailure {
                kind: LlmErrorKind::RateLimit | LlmErrorKind::Server | LlmErrorKind::Network,
                ..
            }
        )
    }

    /// Returns the program output captured before an execution failure.
    #[must_use]
    pub fn execution_output(&self) -> Option<&str> {
        match self {
            Self::ExecutionFailure { source } => source.output(),
            _ => None,
        }
    }
}
