//! Shared error taxonomy for the pipeline core and its stage handlers.
//!
//! Every component returns one of the four kinds from the error handling
//! design: `Validation`, `Configuration`, `ExternalTool`, `Transient`. The
//! kind decides retryability; the variant carries a specific, human-readable
//! message plus whatever context the caller had on hand.

use std::error::Error;

use thiserror::Error;

/// Broad classification used by the stage driver to decide retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Inputs or outputs violate an invariant. Non-retryable.
    Validation,
    /// Environment problem (missing binary, unwritable directory). Non-retryable without operator action.
    Configuration,
    /// A supervised child process failed or produced nonsensical output. Retryable at the item level.
    ExternalTool,
    /// An I/O hiccup. Retryable at the item level.
    Transient,
}

/// Primary error type for pipeline core and stage-handler operations.
#[derive(Debug, Error)]
pub enum SpindleError {
    /// Input or output violates a documented invariant.
    #[error("{message}")]
    Validation {
        /// Human-readable description of the violated invariant.
        message: String,
    },
    /// Environment problem: missing binary, unwritable directory, locked settings file.
    #[error("{message}")]
    Configuration {
        /// Human-readable description of the environment problem.
        message: String,
        /// Underlying error when one is available.
        #[source]
        source: Option<Box<dyn Error + Send + Sync>>,
    },
    /// A supervised external tool failed or produced output that could not be interpreted.
    #[error("{message}")]
    ExternalTool {
        /// Human-readable description of the tool failure.
        message: String,
        /// Underlying error when one is available.
        #[source]
        source: Option<Box<dyn Error + Send + Sync>>,
    },
    /// A retryable I/O hiccup.
    #[error("{message}")]
    Transient {
        /// Human-readable description of the transient condition.
        message: String,
        /// Underlying error when one is available.
        #[source]
        source: Option<Box<dyn Error + Send + Sync>>,
    },
}

impl SpindleError {
    /// Build a `Validation` error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Build a `Configuration` error with no underlying source.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Build a `Configuration` error wrapping a lower-level cause.
    pub fn configuration_with_source(
        message: impl Into<String>,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self::Configuration {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Build an `ExternalTool` error with no underlying source.
    #[must_use]
    pub fn external_tool(message: impl Into<String>) -> Self {
        Self::ExternalTool {
            message: message.into(),
            source: None,
        }
    }

    /// Build an `ExternalTool` error wrapping a lower-level cause.
    pub fn external_tool_with_source(
        message: impl Into<String>,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self::ExternalTool {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Build a `Transient` error with no underlying source.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            source: None,
        }
    }

    /// Build a `Transient` error wrapping a lower-level cause.
    pub fn transient_with_source(
        message: impl Into<String>,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transient {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Classify this error into one of the four retry-policy kinds.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::ExternalTool { .. } => ErrorKind::ExternalTool,
            Self::Transient { .. } => ErrorKind::Transient,
        }
    }

    /// The most specific human-readable message, suitable for `error_message`.
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Convenience alias for pipeline operation results.
pub type SpindleResult<T> = Result<T, SpindleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_constructor() {
        assert_eq!(SpindleError::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(
            SpindleError::configuration("x").kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            SpindleError::external_tool("x").kind(),
            ErrorKind::ExternalTool
        );
        assert_eq!(SpindleError::transient("x").kind(), ErrorKind::Transient);
    }

    #[test]
    fn message_is_the_display_string() {
        let err = SpindleError::validation("fingerprint is required");
        assert_eq!(err.message(), "fingerprint is required");
    }
}
