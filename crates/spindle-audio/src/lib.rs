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

//! Audio Refiner: probes a ripped container's audio streams, scores a
//! primary track, classifies the remaining streams as commentary or noise,
//! and remuxes to the selected layout with correct dispositions.

pub mod metrics_provider;
pub mod model;
pub mod service;

pub use metrics_provider::FfmpegMetricsProvider;
pub use model::{
    AmbiguityResolver, AudioStream, ClassificationThresholds, CommentaryDecision,
    CommentaryMetrics, MetadataHint, NoAmbiguityResolver, StreamDecision, classify,
    metadata_hint, remux_required, select_primary, selected_set,
};
pub use service::{AudioRefiner, DecisionRecord, MetricsProvider, classify_fingerprint_failure};
