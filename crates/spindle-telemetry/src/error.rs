//! Error types for telemetry operations.

use thiserror::Error;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors raised by telemetry helpers.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Installing the tracing subscriber failed.
    #[error("failed to install tracing subscriber")]
    SubscriberInstall {
        /// Underlying tracing subscriber error.
        #[source]
        source: tracing_subscriber::util::TryInitError,
    },

    /// Building or registering a Prometheus collector failed.
    #[error("failed to register metrics collector '{name}'")]
    MetricsRegister {
        /// Metric identifier tied to the failure.
        name: &'static str,
        /// Underlying Prometheus error.
        #[source]
        source: prometheus::Error,
    },

    /// Encoding Prometheus metrics failed.
    #[error("failed to encode metrics")]
    MetricsEncode {
        /// Underlying Prometheus error.
        #[source]
        source: prometheus::Error,
    },

    /// Rendered metrics output was not valid UTF-8.
    #[error("metrics output was not valid utf-8")]
    MetricsUtf8 {
        /// Underlying UTF-8 conversion error.
        #[source]
        source: std::string::FromUtf8Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::util::SubscriberInitExt;

    fn try_init_error() -> tracing_subscriber::util::TryInitError {
        tracing_subscriber::registry().try_init().ok();
        tracing_subscriber::registry()
            .try_init()
            .expect_err("second global subscriber install should fail")
    }

    #[test]
    fn telemetry_error_display_and_source() {
        let cases: Vec<(TelemetryError, &str)> = vec![
            (
                TelemetryError::SubscriberInstall { source: try_init_error() },
                "failed to install tracing subscriber",
            ),
            (
                TelemetryError::MetricsRegister {
                    name: "metric",
                    source: prometheus::Error::Msg("metrics".to_string()),
                },
                "failed to register metrics collector 'metric'",
            ),
            (
                TelemetryError::MetricsEncode {
                    source: prometheus::Error::Msg("metrics".to_string()),
                },
                "failed to encode metrics",
            ),
        ];

        for (err, message) in cases {
            assert_eq!(err.to_string(), message);
            assert!(std::error::Error::source(&err).is_some());
        }
    }
}
