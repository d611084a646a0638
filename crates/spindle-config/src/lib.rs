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

//! Layered configuration for the Spindle pipeline: built-in defaults,
//! overlaid by an optional TOML file, overlaid by `SPINDLE_`-prefixed
//! environment variables.
//!
//! [`model::PipelineConfig`] is the single typed document every other
//! Spindle crate is configured from — queue connection, staging/cache
//! paths, external binaries, the overrides catalog location, ripping and
//! audio-refinement tunables, notifications, and telemetry. [`loader::load`]
//! performs the merge and validates the result; [`validate::validate`] is
//! exposed separately so callers constructing a [`model::PipelineConfig`]
//! by hand (tests, `spindle-cli config check`) can validate it too.

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::ConfigError;
pub use loader::{load, render_defaults};
pub use model::{
    AudioTunables, BinariesConfig, NotifyTunables, OverridesConfig, PipelineConfig, QueueConfig,
    RippingTunables, StorageConfig, TelemetryConfig,
};
