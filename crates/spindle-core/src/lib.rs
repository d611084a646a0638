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

//! Pipeline-core DTOs and traits shared across the workspace: the queue
//! item, the rip spec envelope, the error taxonomy, and the generic Stage
//! Runner that drives every stage handler.

pub mod error;
pub mod model;
pub mod service;

pub use error::{ErrorKind, SpindleError, SpindleResult};
pub use model::{
    Asset, Episode, MediaType, MetadataValue, QueueItem, QueueStatus, RipSpecEnvelope, Title,
};
pub use service::{Cancellation, QueueStore, RunOutcome, StageHandler, run_stage};
