//! Typed configuration model: every tunable named across spec §4 and §9,
//! layered defaults → TOML file → `SPINDLE_`-prefixed environment
//! variables (see [`crate::loader`]).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use spindle_audio::ClassificationThresholds;
use spindle_ripper::SelectionThresholds;

use crate::defaults;

/// Queue Store (C1) connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Postgres connection string.
    pub database_url: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            database_url: defaults::DATABASE_URL.to_string(),
        }
    }
}

/// Filesystem layout: staging working directories and the rip cache root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for per-queue-item working directories
    /// (`staging_root/queue-<id>/rips`).
    pub staging_root: PathBuf,
    /// Root directory for the content-addressed rip cache. `None`
    /// disables caching; the ripping stage then targets the staging
    /// working directory directly (spec §4.9 step 3).
    pub cache_root: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            staging_root: PathBuf::from(defaults::STAGING_ROOT),
            cache_root: Some(PathBuf::from(defaults::CACHE_ROOT)),
        }
    }
}

impl StorageConfig {
    /// Whether the rip cache is enabled.
    #[must_use]
    pub const fn cache_enabled(&self) -> bool {
        self.cache_root.is_some()
    }
}

/// External binaries the pipeline shells out to (spec §6's "Binaries
/// invoked"). Each is resolved via `$PATH` unless an absolute override is
/// configured. The optional classifiers are omitted from the audio
/// refinement chain entirely when unset (spec §9's "optional, dynamically
/// discovered classifiers").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BinariesConfig {
    /// Disc ripper CLI, robot mode. `None` puts the ripping stage into
    /// its placeholder-rip branch (spec §9, `client == nil`).
    pub ripper: Option<String>,
    /// Media probe tool (stream/duration inspection).
    pub probe: String,
    /// Media encoder/remux tool.
    pub encoder: String,
    /// Acoustic fingerprint extractor.
    pub fingerprint: Option<String>,
    /// Optional speech transcription tool, used to disambiguate ambiguous
    /// commentary candidates.
    pub transcription: Option<String>,
    /// Optional speaker-embedding tool, used the same way.
    pub speaker_embedding: Option<String>,
    /// Path to the ripper settings file the ripping stage writes
    /// idempotently before the first rip.
    pub ripper_settings_path: PathBuf,
}

impl Default for BinariesConfig {
    fn default() -> Self {
        Self {
            ripper: Some(defaults::RIPPER_BINARY.to_string()),
            probe: defaults::PROBE_BINARY.to_string(),
            encoder: defaults::ENCODER_BINARY.to_string(),
            fingerprint: Some(defaults::FINGERPRINT_BINARY.to_string()),
            transcription: None,
            speaker_embedding: None,
            ripper_settings_path: PathBuf::from(defaults::RIPPER_SETTINGS_PATH),
        }
    }
}

/// Overrides Catalog (C10) location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverridesConfig {
    /// Path to the curated disc-overrides JSON file. A missing file is an
    /// empty catalog, not an error (spec §4.10).
    pub path: PathBuf,
}

impl Default for OverridesConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(defaults::OVERRIDES_PATH),
        }
    }
}

/// Tunables for the ripping stage proper (spec §9's Open Question: these
/// are calibrated empirically and must not be hard-coded).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RippingTunables {
    /// Minimum size, in bytes, a validated ripped artifact must reach.
    pub min_rip_size_bytes: u64,
    /// Movie-branch title selection thresholds (`MIN_PRIMARY_RUNTIME`,
    /// `DURATION_TOLERANCE`).
    pub selection: SelectionThresholds,
    /// Minimum interval between progress persists during a rip.
    pub progress_interval_secs: u64,
}

impl Default for RippingTunables {
    fn default() -> Self {
        Self {
            min_rip_size_bytes: spindle_ripper::MIN_RIP_SIZE,
            selection: SelectionThresholds::default(),
            progress_interval_secs: defaults::PROGRESS_INTERVAL_SECS,
        }
    }
}

impl RippingTunables {
    /// `progress_interval_secs` as a [`Duration`].
    #[must_use]
    pub const fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }
}

/// Commentary/primary-track classification thresholds, re-exported from
/// `spindle-audio` so this is the single place operators tune them from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioTunables {
    /// The six commentary-classification thresholds (spec §4.8).
    pub thresholds: ClassificationThresholds,
}

impl Default for AudioTunables {
    fn default() -> Self {
        Self {
            thresholds: ClassificationThresholds::default(),
        }
    }
}

/// Outbound notifications (C11) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyTunables {
    /// Full topic URL to POST to. Empty disables notifications entirely.
    pub topic_url: String,
    /// Request timeout for the outbound POST.
    pub timeout_secs: u64,
    /// Minimum spacing between two notifications with the same event
    /// class and message.
    pub dedup_window_secs: u64,
    /// Event classes suppressed entirely, by their `as_str()` name.
    pub disabled_events: Vec<String>,
}

impl Default for NotifyTunables {
    fn default() -> Self {
        Self {
            topic_url: String::new(),
            timeout_secs: defaults::NOTIFY_TIMEOUT_SECS,
            dedup_window_secs: defaults::NOTIFY_DEDUP_WINDOW_SECS,
            disabled_events: Vec::new(),
        }
    }
}

/// Logging/metrics settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `"fmt"` (human-readable) or `"json"`. Defaults to `json` in
    /// release builds and `fmt` in debug builds when left unset at the
    /// call site — see `spindle_telemetry::LogFormat::infer`.
    pub log_format: Option<String>,
    /// `tracing-subscriber` `EnvFilter` directive string, e.g. `"info"`
    /// or `"spindle_ripper=debug,info"`.
    pub log_filter: String,
    /// Address the Prometheus metrics endpoint listens on, if enabled.
    pub metrics_addr: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: None,
            log_filter: "info".to_string(),
            metrics_addr: None,
        }
    }
}

/// Top-level pipeline configuration: the union of every layer's
/// defaults, loaded and overlaid by [`crate::loader::load`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Queue Store connection.
    pub queue: QueueConfig,
    /// Staging/cache filesystem layout.
    pub storage: StorageConfig,
    /// External binaries.
    pub binaries: BinariesConfig,
    /// Curated overrides catalog.
    pub overrides: OverridesConfig,
    /// Ripping stage tunables.
    pub ripping: RippingTunables,
    /// Audio refinement tunables.
    pub audio: AudioTunables,
    /// Notifications.
    pub notify: NotifyTunables,
    /// Logging/metrics.
    pub telemetry: TelemetryConfig,
}
