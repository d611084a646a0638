//! Queue item and rip spec envelope DTOs shared across the workspace.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SpindleError, SpindleResult};

/// Lifecycle status of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Newly created, not yet claimed by any stage.
    Pending,
    /// The identification stage is running.
    Identifying,
    /// Identification completed.
    Identified,
    /// The ripping stage is running.
    Ripping,
    /// Ripping completed.
    Ripped,
    /// The encoding stage is running.
    Encoding,
    /// Encoding completed.
    Encoded,
    /// The organization stage is running.
    Organizing,
    /// Organization completed; terminal success state.
    Organized,
    /// Terminal failure state.
    Failed,
    /// Needs manual operator attention.
    Review,
}

impl QueueStatus {
    /// Lowercase, stable name used in persistence and logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Identifying => "identifying",
            Self::Identified => "identified",
            Self::Ripping => "ripping",
            Self::Ripped => "ripped",
            Self::Encoding => "encoding",
            Self::Encoded => "encoded",
            Self::Organizing => "organizing",
            Self::Organized => "organized",
            Self::Failed => "failed",
            Self::Review => "review",
        }
    }

    /// Whether this status is terminal (no further stage mutates the item,
    /// barring a manual retry).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Organized | Self::Failed)
    }

    /// Title-case words derived from the status name, used by the Stage
    /// Runner as the default `progress_stage` label (e.g. `Ripping` for the
    /// `ripping` status).
    #[must_use]
    pub fn title_case(self) -> String {
        let word = self.as_str();
        let mut chars = word.chars();
        match chars.next() {
            None => String::new(),
            Some(first) => format!("{}{}", first.to_uppercase(), chars.as_str()),
        }
    }

    /// Parse a status from its persisted lowercase name.
    pub fn parse(raw: &str) -> SpindleResult<Self> {
        match raw {
            "pending" => Ok(Self::Pending),
            "identifying" => Ok(Self::Identifying),
            "identified" => Ok(Self::Identified),
            "ripping" => Ok(Self::Ripping),
            "ripped" => Ok(Self::Ripped),
            "encoding" => Ok(Self::Encoding),
            "encoded" => Ok(Self::Encoded),
            "organizing" => Ok(Self::Organizing),
            "organized" => Ok(Self::Organized),
            "failed" => Ok(Self::Failed),
            "review" => Ok(Self::Review),
            other => Err(SpindleError::validation(format!(
                "unrecognized queue status '{other}'"
            ))),
        }
    }
}

/// A single item of work moving through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    /// Stable integer identifier; insertion order is significant for
    /// `NextPending`.
    pub id: i64,
    /// Current lifecycle status.
    pub status: QueueStatus,
    /// Human-readable disc title supplied at detection time.
    pub disc_title: String,
    /// Opaque identifier derived from disc contents by the scanner.
    pub disc_fingerprint: String,
    /// Source path for the physical disc or placeholder input.
    pub source_path: Option<String>,
    /// Path to the ripped artifact once the ripping stage completes.
    pub ripped_file: Option<String>,
    /// Structured rip spec envelope, or `None` before identification runs.
    pub rip_spec: Option<RipSpecEnvelope>,
    /// Coarse stage label shown to operators (e.g. `"Ripping"`).
    pub progress_stage: Option<String>,
    /// Free-form progress message shown alongside the percentage.
    pub progress_message: Option<String>,
    /// Progress percentage, always within `[0, 100]`.
    pub progress_percent: u8,
    /// Most specific error message from the last failure, if any.
    pub error_message: Option<String>,
    /// Non-null while a stage is actively processing this item; the Runner
    /// clears it on a terminal transition.
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Timestamp the item was created.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent mutation.
    pub updated_at: DateTime<Utc>,
}

impl QueueItem {
    /// Construct a fresh `pending` item. The id is assigned by the Queue
    /// Store on insertion; `0` is a placeholder until then.
    #[must_use]
    pub fn new_disc(disc_title: impl Into<String>, disc_fingerprint: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            status: QueueStatus::Pending,
            disc_title: disc_title.into(),
            disc_fingerprint: disc_fingerprint.into(),
            source_path: None,
            ripped_file: None,
            rip_spec: None,
            progress_stage: None,
            progress_message: None,
            progress_percent: 0,
            error_message: None,
            last_heartbeat: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition the item to `failed`, recording the most specific message
    /// available and clearing the heartbeat.
    pub fn set_failed(&mut self, message: impl Into<String>) {
        self.status = QueueStatus::Failed;
        self.error_message = Some(message.into());
        self.last_heartbeat = None;
        self.updated_at = Utc::now();
    }

    /// Clear the error state and reset to `pending` for a manual retry.
    pub fn retry(&mut self) {
        self.status = QueueStatus::Pending;
        self.error_message = None;
        self.last_heartbeat = None;
        self.updated_at = Utc::now();
    }

    /// Set the progress percentage, clamping to the documented `[0, 100]`
    /// invariant.
    pub fn set_progress_percent(&mut self, percent: f64) {
        let clamped = percent.clamp(0.0, 100.0);
        #[expect(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "percent is clamped to [0, 100] immediately above"
        )]
        {
            self.progress_percent = clamped as u8;
        }
    }
}

/// Open metadata value type: the envelope's `metadata` map is restricted to
/// these three JSON scalar kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// A string value.
    String(String),
    /// A numeric value.
    Number(f64),
    /// A boolean value.
    Bool(bool),
}

impl MetadataValue {
    /// Borrow the value as a string, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            Self::Number(_) | Self::Bool(_) => None,
        }
    }
}

/// A candidate title reported by the disc scanner / ripper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Title {
    /// Ripper-assigned title id. Negative means unassigned.
    pub id: i64,
    /// Display name for the title.
    pub name: String,
    /// Duration in seconds.
    pub duration_seconds: f64,
    /// Chapter count.
    pub chapters: u32,
    /// Source playlist file name (e.g. `"00800.mpls"`).
    pub playlist: String,
    /// Segment count reported for the title.
    pub segment_count: u32,
    /// Opaque content hash used to detect duplicate titles.
    pub title_hash: String,
}

/// A television episode mapped to a ripped title.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    /// Unique, lowercase key in `"sSSeEE"` form.
    pub key: String,
    /// Title id this episode is assigned to rip from. Negative means
    /// unassigned.
    pub title_id: i64,
    /// Season number.
    pub season: u32,
    /// Episode number within the season.
    pub episode: u32,
    /// Episode display title, when known.
    pub episode_title: Option<String>,
    /// Output file base name (without extension).
    pub output_basename: String,
}

/// A named artifact produced for an episode or a movie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    /// Episode key this asset belongs to (empty for movies).
    pub episode_key: String,
    /// Title id the asset was ripped from.
    pub title_id: i64,
    /// Filesystem path to the asset.
    pub path: String,
}

/// Structured per-item metadata: candidate titles, episode assignments, and
/// named asset buckets. Rebuilt by identification, mutated by ripping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RipSpecEnvelope {
    /// Mirror of the owning item's disc fingerprint, for self-containment.
    pub fingerprint: String,
    /// Open metadata map; at minimum carries `media_type`.
    #[serde(default)]
    pub metadata: BTreeMap<String, MetadataValue>,
    /// Candidate titles discovered on the disc.
    #[serde(default)]
    pub titles: Vec<Title>,
    /// Episode assignments, populated for TV media only.
    #[serde(default)]
    pub episodes: Vec<Episode>,
    /// Named asset buckets, at minimum `"ripped"`.
    #[serde(default)]
    pub assets: BTreeMap<String, Vec<Asset>>,
}

/// Media type recorded in the envelope's `media_type` metadata entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    /// A single feature film.
    Movie,
    /// A television series.
    Tv,
}

impl RipSpecEnvelope {
    /// Parse a raw JSON document into a structured envelope.
    pub fn parse(raw: &str) -> SpindleResult<Self> {
        serde_json::from_str(raw)
            .map_err(|err| SpindleError::validation(format!("invalid rip spec envelope: {err}")))
    }

    /// Encode the envelope back to JSON. Field ordering and byte-identity
    /// across a parse/encode round trip are not guaranteed.
    pub fn encode(&self) -> SpindleResult<String> {
        serde_json::to_string(self)
            .map_err(|err| SpindleError::validation(format!("failed to encode envelope: {err}")))
    }

    /// The media type recorded in `metadata`, if present and recognized.
    #[must_use]
    pub fn media_type(&self) -> Option<MediaType> {
        match self.metadata.get("media_type")?.as_str()? {
            "movie" => Some(MediaType::Movie),
            "tv" => Some(MediaType::Tv),
            _ => None,
        }
    }

    /// Insert or replace (by `episode_key`) an asset within the named
    /// bucket.
    pub fn add_asset(&mut self, bucket: impl Into<String>, asset: Asset) {
        let entries = self.assets.entry(bucket.into()).or_default();
        if let Some(existing) = entries
            .iter_mut()
            .find(|entry| entry.episode_key == asset.episode_key)
        {
            *existing = asset;
        } else {
            entries.push(asset);
        }
    }

    /// Find an asset within a bucket by episode key.
    #[must_use]
    pub fn find_asset(&self, bucket: &str, key: &str) -> Option<&Asset> {
        self.assets
            .get(bucket)?
            .iter()
            .find(|asset| asset.episode_key == key)
    }

    /// Format a `"sSSeEE"` episode key: lowercase, zero-padded to two
    /// digits.
    #[must_use]
    pub fn episode_key(season: u32, episode: u32) -> String {
        format!("s{season:02}e{episode:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_status_round_trips_through_as_str() {
        for status in [
            QueueStatus::Pending,
            QueueStatus::Identifying,
            QueueStatus::Identified,
            QueueStatus::Ripping,
            QueueStatus::Ripped,
            QueueStatus::Encoding,
            QueueStatus::Encoded,
            QueueStatus::Organizing,
            QueueStatus::Organized,
            QueueStatus::Failed,
            QueueStatus::Review,
        ] {
            assert_eq!(QueueStatus::parse(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn queue_status_title_case_capitalizes_first_letter() {
        assert_eq!(QueueStatus::Ripping.title_case(), "Ripping");
        assert_eq!(QueueStatus::Organized.title_case(), "Organized");
    }

    #[test]
    fn terminal_statuses_are_organized_and_failed() {
        assert!(QueueStatus::Organized.is_terminal());
        assert!(QueueStatus::Failed.is_terminal());
        assert!(!QueueStatus::Ripping.is_terminal());
    }

    #[test]
    fn set_failed_clears_heartbeat_and_sets_message() {
        let mut item = QueueItem::new_disc("Alien", "fp-123");
        item.last_heartbeat = Some(Utc::now());
        item.set_failed("disc fingerprint is required");
        assert_eq!(item.status, QueueStatus::Failed);
        assert!(item.last_heartbeat.is_none());
        assert_eq!(
            item.error_message.as_deref(),
            Some("disc fingerprint is required")
        );
    }

    #[test]
    fn set_progress_percent_clamps_into_bounds() {
        let mut item = QueueItem::new_disc("Alien", "fp-123");
        item.set_progress_percent(-5.0);
        assert_eq!(item.progress_percent, 0);
        item.set_progress_percent(142.0);
        assert_eq!(item.progress_percent, 100);
        item.set_progress_percent(57.4);
        assert_eq!(item.progress_percent, 57);
    }

    #[test]
    fn episode_key_is_lowercase_zero_padded() {
        assert_eq!(RipSpecEnvelope::episode_key(1, 1), "s01e01");
        assert_eq!(RipSpecEnvelope::episode_key(12, 7), "s12e07");
    }

    #[test]
    fn add_asset_replaces_by_episode_key() {
        let mut envelope = RipSpecEnvelope {
            fingerprint: "fp".into(),
            metadata: BTreeMap::new(),
            titles: Vec::new(),
            episodes: Vec::new(),
            assets: BTreeMap::new(),
        };
        envelope.add_asset(
            "ripped",
            Asset {
                episode_key: "s01e01".into(),
                title_id: 3,
                path: "/a/first.mkv".into(),
            },
        );
        envelope.add_asset(
            "ripped",
            Asset {
                episode_key: "s01e01".into(),
                title_id: 3,
                path: "/a/replaced.mkv".into(),
            },
        );
        assert_eq!(envelope.assets.get("ripped").unwrap().len(), 1);
        assert_eq!(
            envelope.find_asset("ripped", "s01e01").unwrap().path,
            "/a/replaced.mkv"
        );
        assert!(envelope.find_asset("ripped", "s02e01").is_none());
    }

    #[test]
    fn parse_then_encode_round_trips_fields() {
        let raw = r#"{
            "fingerprint": "fp-abc",
            "metadata": {"media_type": "movie"},
            "titles": [{"id": 0, "name": "Feature", "duration_seconds": 7200.0, "chapters": 12, "playlist": "00800.mpls", "segment_count": 1, "title_hash": "abc"}],
            "episodes": [],
            "assets": {}
        }"#;
        let envelope = RipSpecEnvelope::parse(raw).unwrap();
        assert_eq!(envelope.media_type(), Some(MediaType::Movie));
        assert_eq!(envelope.titles.len(), 1);
        let encoded = envelope.encode().unwrap();
        let round_tripped = RipSpecEnvelope::parse(&encoded).unwrap();
        assert_eq!(round_tripped.fingerprint, envelope.fingerprint);
        assert_eq!(round_tripped.titles.len(), envelope.titles.len());
    }

    #[test]
    fn parse_rejects_malformed_json() {
        let err = RipSpecEnvelope::parse("not json").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }
}
