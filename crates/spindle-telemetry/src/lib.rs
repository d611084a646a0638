#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Telemetry primitives shared across the Spindle workspace.
//!
//! Layout: `init.rs` (logging setup), `metrics.rs` (Prometheus registry),
//! `log_stream.rs` (in-process broadcast of formatted log lines, for
//! embedders that want a live feed without re-parsing stdout).

pub mod error;
pub mod init;
pub mod log_stream;
pub mod metrics;

pub use error::{Result as TelemetryResult, TelemetryError};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};
pub use log_stream::log_stream_receiver;
pub use metrics::{Metrics, MetricsSnapshot};
