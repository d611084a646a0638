//! Error types for configuration loading and validation.

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The layered `config` crate build (defaults/file/env merge) failed,
    /// e.g. a malformed TOML file or a type mismatch on an env override.
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),

    /// A loaded value violated a validation rule not expressible as a
    /// type (e.g. a threshold outside `[0, 1]`).
    #[error("invalid configuration field '{field}': {reason}")]
    InvalidField {
        /// Dotted path to the offending field, e.g. `"audio.thresholds.fp_dup"`.
        field: &'static str,
        /// Human-readable reason the value was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Construct an [`ConfigError::InvalidField`].
    #[must_use]
    pub fn invalid_field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}
