//! CLI-level error type: distinguishes a caller-facing validation problem
//! (bad flag, missing config field) from an operational failure, so
//! `main` can choose a distinct exit code.

use std::fmt::{self, Display, Formatter};

/// CLI-level error, carrying the exit-code distinction the teacher's own
/// CLI error type makes.
#[derive(Debug)]
pub enum CliError {
    /// The user's input was invalid; no work was attempted.
    Validation(String),
    /// Work was attempted and failed.
    Failure(anyhow::Error),
}

/// Convenience alias for CLI command results.
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    /// Build a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Build an operational failure from any error type.
    pub fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    /// Process exit code: `2` for validation errors, `3` for failures.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
        }
    }

    /// Human-readable message for stderr.
    #[must_use]
    pub fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.display_message())
    }
}

impl std::error::Error for CliError {}

impl From<spindle_core::SpindleError> for CliError {
    fn from(error: spindle_core::SpindleError) -> Self {
        Self::Failure(error.into())
    }
}

impl From<spindle_config::ConfigError> for CliError {
    fn from(error: spindle_config::ConfigError) -> Self {
        Self::Failure(error.into())
    }
}
