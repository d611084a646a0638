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
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Daemon bootstrap for the Spindle pipeline.
//!
//! Layout: `cli.rs` (argument parsing, command dispatch), `bootstrap.rs`
//! (wires config, the queue store, and the ripping stage's external
//! collaborators into one `RippingStage`), `daemon.rs` (the poll loop and
//! optional metrics endpoint), `preflight.rs` (readiness checks), `error.rs`
//! (`CliError` and exit codes), `commands/config.rs` (`config init`/`check`).

pub mod bootstrap;
pub mod cli;
pub mod commands;
pub mod daemon;
pub mod error;
pub mod preflight;

pub use cli::run;
pub use error::{CliError, CliResult};
