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

//! The ripping stage: cache management, title selection, ripper robot-mode
//! progress parsing, and the resumable external rip itself.
//!
//! Layout: `cache` (content-addressed rip cache), `title_selector` (movie
//! and TV title-id selection), `progress` (robot-mode line parser),
//! `service` (the `StageHandler` that composes everything with the audio
//! refiner).

pub mod cache;
pub mod probe;
pub mod progress;
pub mod service;
pub mod title_selector;

pub use cache::RipCache;
pub use probe::FfprobeMediaProbe;
pub use progress::{MessageSeverity, ProgressTracker, ProgressUpdate, PROGRESS_INTERVAL};
pub use service::{MediaProbe, RipNotifier, RippingStage, MIN_RIP_SIZE};
pub use title_selector::{
    parse_title_id, select_titles, select_titles_with_thresholds, SelectionReport, SelectionThresholds,
};
