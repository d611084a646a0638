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
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

//! Shared test fixtures for the pipeline crates: fake `makemkvcon`/
//! `ffprobe`/`ffmpeg`/`fpcalc` shell scripts so the process supervisor, the
//! ripping stage, and the audio refiner can be exercised without the real
//! tools installed.

pub mod fake_binary;
