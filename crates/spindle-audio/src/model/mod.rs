//! Audio stream types, primary-track scoring, and the commentary
//! classification cascade. Pure logic; no process I/O here.

use serde::{Deserialize, Serialize};
use spindle_core::{SpindleError, SpindleResult};

/// A single audio stream reported by the probe tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioStream {
    /// Stream index within the container's audio streams (not the global
    /// stream index).
    pub index: usize,
    /// Codec name (`"truehd"`, `"ac3"`, `"aac"`, ...).
    pub codec: String,
    /// Channel count.
    pub channels: u32,
    /// BCP-47-ish language tag, when present.
    pub language: Option<String>,
    /// Title tag, when present.
    pub title: Option<String>,
    /// Whether the container's `disposition.default` flag is set.
    pub disposition_default: bool,
    /// Whether the container's `disposition.comment` flag is set.
    pub disposition_comment: bool,
}

/// Codecs considered lossless for primary-selection scoring.
const LOSSLESS_CODECS: [&str; 4] = ["truehd", "dts-hd ma", "flac", "pcm_s24le"];

fn is_lossless(codec: &str) -> bool {
    LOSSLESS_CODECS
        .iter()
        .any(|lossless| codec.eq_ignore_ascii_case(lossless))
}

fn starts_with_en(language: Option<&str>) -> bool {
    language.is_some_and(|lang| lang.to_ascii_lowercase().starts_with("en"))
}

/// Choose the primary audio stream: prefer an `"en"`-prefixed language,
/// falling back to the first stream; within the candidate pool prefer
/// highest channel count, then lossless codecs, then the stream already
/// flagged `default`.
///
/// # Errors
///
/// Returns a validation error if `streams` is empty.
pub fn select_primary(streams: &[AudioStream]) -> SpindleResult<usize> {
    if streams.is_empty() {
        return Err(SpindleError::validation(
            "cannot select a primary audio track from zero streams",
        ));
    }

    let english: Vec<&AudioStream> = streams
        .iter()
        .filter(|stream| starts_with_en(stream.language.as_deref()))
        .collect();
    let pool: Vec<&AudioStream> = if english.is_empty() {
        vec![streams.first().expect("checked non-empty above")]
    } else {
        english
    };

    let best = pool
        .into_iter()
        .max_by(|a, b| {
            a.channels
                .cmp(&b.channels)
                .then_with(|| is_lossless(&a.codec).cmp(&is_lossless(&b.codec)))
                .then_with(|| a.disposition_default.cmp(&b.disposition_default))
        })
        .expect("pool is never empty");

    Ok(best.index)
}

/// Commentary-relevant acoustic metrics computed for one non-primary
/// audio stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommentaryMetrics {
    /// Fraction of frames with voice activity on the candidate stream.
    pub speech_ratio: f64,
    /// Fraction of candidate-speech frames that overlap primary speech.
    pub speech_overlap_with_primary: f64,
    /// Fraction of candidate-speech frames occurring during primary
    /// silence.
    pub speech_in_primary_silence: f64,
    /// Average acoustic fingerprint similarity against the primary track.
    pub fingerprint_similarity: f64,
    /// `speech_ratio` computed for the primary track itself.
    pub primary_speech_ratio: f64,
}

/// Metadata-derived hint from a stream's title/language tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataHint {
    /// Title or language tag indicates commentary.
    Positive,
    /// Title or language tag indicates audio description / descriptive
    /// audio.
    Negative,
    /// No relevant hint.
    Neutral,
}

/// Configurable thresholds for the commentary classification cascade.
/// Defaults mirror the values named in the classification design.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationThresholds {
    /// Rule 2: fingerprint similarity at or above this is a duplicate
    /// downmix.
    pub fp_dup: f64,
    /// Rule 3: speech ratio at or below this is music or silence.
    pub speech_music_max: f64,
    /// Rule 4: speech-in-primary-silence above this is a candidate for
    /// audio description.
    pub speech_silence_max: f64,
    /// Rule 4: overlap with primary at or below this, combined with the
    /// silence condition, confirms audio description.
    pub overlap_ad_max: f64,
    /// Rule 5: overlap with primary at or above this includes the stream
    /// as commentary.
    pub overlap_commentary_min: f64,
    /// Rule 6: speech ratio at or above this includes the stream as
    /// commentary.
    pub speech_commentary_min: f64,
}

impl Default for ClassificationThresholds {
    fn default() -> Self {
        Self {
            fp_dup: 0.98,
            speech_music_max: 0.10,
            speech_silence_max: 0.40,
            overlap_ad_max: 0.30,
            overlap_commentary_min: 0.60,
            speech_commentary_min: 0.25,
        }
    }
}

/// Outcome of the commentary classification cascade for one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentaryDecision {
    /// Include the stream, tagged with the reason it qualified.
    Include(&'static str),
    /// Exclude the stream, tagged with the reason it was rejected.
    Exclude(&'static str),
    /// Neither rule matched conclusively; resolved by an optional
    /// higher-fidelity classifier, or excluded by default (precision over
    /// recall).
    Ambiguous,
}

/// Run the seven-rule classification cascade, top to bottom, for one
/// non-primary audio stream.
#[must_use]
pub fn classify(
    hint: MetadataHint,
    metrics: CommentaryMetrics,
    thresholds: &ClassificationThresholds,
) -> CommentaryDecision {
    if hint == MetadataHint::Negative {
        return CommentaryDecision::Exclude("metadata_audio_description");
    }
    if metrics.fingerprint_similarity >= thresholds.fp_dup {
        return CommentaryDecision::Exclude("duplicate_downmix");
    }
    if metrics.speech_ratio <= thresholds.speech_music_max {
        return CommentaryDecision::Exclude("music_or_silent");
    }
    if metrics.speech_in_primary_silence > thresholds.speech_silence_max
        && metrics.speech_overlap_with_primary <= thresholds.overlap_ad_max
    {
        return CommentaryDecision::Exclude("audio_description");
    }
    if metrics.speech_overlap_with_primary >= thresholds.overlap_commentary_min {
        return CommentaryDecision::Include(if hint == MetadataHint::Positive {
            "commentary_only"
        } else {
            "mixed_commentary"
        });
    }
    if metrics.speech_ratio >= thresholds.speech_commentary_min {
        return CommentaryDecision::Include("commentary_only");
    }
    CommentaryDecision::Ambiguous
}

/// Derive a metadata hint from a stream's title and language tags.
#[must_use]
pub fn metadata_hint(title: Option<&str>, language: Option<&str>) -> MetadataHint {
    const NEGATIVE_WORDS: [&str; 2] = ["audio description", "descriptive"];
    const POSITIVE_WORDS: [&str; 2] = ["commentary", "comment"];

    let haystack = format!(
        "{} {}",
        title.unwrap_or_default(),
        language.unwrap_or_default()
    )
    .to_ascii_lowercase();

    if NEGATIVE_WORDS.iter().any(|word| haystack.contains(word)) {
        MetadataHint::Negative
    } else if POSITIVE_WORDS.iter().any(|word| haystack.contains(word)) {
        MetadataHint::Positive
    } else {
        MetadataHint::Neutral
    }
}

/// Final decision for one candidate stream after any optional
/// ambiguity-resolution pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamDecision {
    /// Stream index this decision applies to.
    pub index: usize,
    /// Whether the stream is part of the final selected set.
    pub include: bool,
    /// Reason code surfaced in the decision record.
    pub reason: &'static str,
}

/// Resolve ambiguous and audio-description candidates with an optional
/// higher-fidelity classifier (speech transcription, speaker embeddings).
/// Implementations return `Some(true)` to include, `Some(false)` to
/// exclude, or `None` to defer to the default (exclude).
pub trait AmbiguityResolver: Send + Sync {
    /// Attempt to resolve one ambiguous or audio-description candidate.
    fn resolve(&self, stream: &AudioStream, metrics: CommentaryMetrics) -> Option<bool>;
}

/// Resolver that defers every ambiguous case to the exclude default.
pub struct NoAmbiguityResolver;

impl AmbiguityResolver for NoAmbiguityResolver {
    fn resolve(&self, _stream: &AudioStream, _metrics: CommentaryMetrics) -> Option<bool> {
        None
    }
}

/// The ordered selected set: primary first, then included commentary
/// streams by ascending index.
#[must_use]
pub fn selected_set(primary_index: usize, decisions: &[StreamDecision]) -> Vec<usize> {
    let mut commentary: Vec<usize> = decisions
        .iter()
        .filter(|decision| decision.include)
        .map(|decision| decision.index)
        .collect();
    commentary.sort_unstable();

    let mut selected = vec![primary_index];
    selected.extend(commentary);
    selected
}

/// Whether a remux is required: the selected set differs from the
/// existing audio set, or any non-primary stream carries an incorrect
/// disposition.
#[must_use]
pub fn remux_required(
    streams: &[AudioStream],
    primary_index: usize,
    selected: &[usize],
) -> bool {
    let existing: Vec<usize> = streams.iter().map(|stream| stream.index).collect();
    if existing != selected {
        return true;
    }

    streams.iter().any(|stream| {
        if stream.index == primary_index {
            return false;
        }
        if selected.contains(&stream.index) {
            !stream.disposition_comment
                || !stream
                    .title
                    .as_deref()
                    .is_some_and(|title| title.to_ascii_lowercase().contains("commentary"))
        } else {
            stream.disposition_default
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(index: usize, codec: &str, channels: u32, language: &str) -> AudioStream {
        AudioStream {
            index,
            codec: codec.into(),
            channels,
            language: Some(language.into()),
            title: None,
            disposition_default: false,
            disposition_comment: false,
        }
    }

    #[test]
    fn select_primary_prefers_english_then_channel_count() {
        let streams = vec![
            stream(0, "ac3", 6, "fr"),
            stream(1, "ac3", 2, "en"),
            stream(2, "truehd", 8, "en"),
        ];
        assert_eq!(select_primary(&streams).unwrap(), 2);
    }

    #[test]
    fn select_primary_falls_back_to_first_stream_without_english() {
        let streams = vec![stream(0, "ac3", 6, "fr"), stream(1, "ac3", 2, "de")];
        assert_eq!(select_primary(&streams).unwrap(), 0);
    }

    #[test]
    fn select_primary_rejects_empty_input() {
        let err = select_primary(&[]).unwrap_err();
        assert_eq!(err.kind(), spindle_core::ErrorKind::Validation);
    }

    #[test]
    fn commentary_classification_scenario_includes_commentary_only() {
        let thresholds = ClassificationThresholds::default();
        let metrics = CommentaryMetrics {
            speech_ratio: 0.30,
            speech_overlap_with_primary: 0.10,
            speech_in_primary_silence: 0.05,
            fingerprint_similarity: 0.20,
            primary_speech_ratio: 0.25,
        };
        assert_eq!(
            classify(MetadataHint::Neutral, metrics, &thresholds),
            CommentaryDecision::Include("commentary_only")
        );
    }

    #[test]
    fn duplicate_downmix_precondition_dominates_other_metrics() {
        let thresholds = ClassificationThresholds::default();
        let metrics = CommentaryMetrics {
            speech_ratio: 0.30,
            speech_overlap_with_primary: 0.10,
            speech_in_primary_silence: 0.05,
            fingerprint_similarity: 0.99,
            primary_speech_ratio: 0.25,
        };
        assert_eq!(
            classify(MetadataHint::Neutral, metrics, &thresholds),
            CommentaryDecision::Exclude("duplicate_downmix")
        );
    }

    #[test]
    fn negative_metadata_hint_excludes_regardless_of_metrics() {
        let thresholds = ClassificationThresholds::default();
        let metrics = CommentaryMetrics {
            speech_ratio: 0.9,
            speech_overlap_with_primary: 0.9,
            speech_in_primary_silence: 0.9,
            fingerprint_similarity: 0.0,
            primary_speech_ratio: 0.9,
        };
        assert_eq!(
            classify(MetadataHint::Negative, metrics, &thresholds),
            CommentaryDecision::Exclude("metadata_audio_description")
        );
    }

    #[test]
    fn ambiguous_when_no_rule_matches() {
        let thresholds = ClassificationThresholds::default();
        let metrics = CommentaryMetrics {
            speech_ratio: 0.20,
            speech_overlap_with_primary: 0.20,
            speech_in_primary_silence: 0.20,
            fingerprint_similarity: 0.0,
            primary_speech_ratio: 0.20,
        };
        assert_eq!(
            classify(MetadataHint::Neutral, metrics, &thresholds),
            CommentaryDecision::Ambiguous
        );
    }

    #[test]
    fn metadata_hint_detects_commentary_and_audio_description() {
        assert_eq!(
            metadata_hint(Some("Director Commentary"), None),
            MetadataHint::Positive
        );
        assert_eq!(
            metadata_hint(Some("Audio Description"), None),
            MetadataHint::Negative
        );
        assert_eq!(metadata_hint(Some("Stereo"), Some("en")), MetadataHint::Neutral);
    }

    #[test]
    fn selected_set_orders_primary_first_then_sorted_commentary() {
        let decisions = vec![
            StreamDecision {
                index: 3,
                include: true,
                reason: "commentary_only",
            },
            StreamDecision {
                index: 2,
                include: false,
                reason: "music_or_silent",
            },
            StreamDecision {
                index: 1,
                include: true,
                reason: "commentary_only",
            },
        ];
        assert_eq!(selected_set(0, &decisions), vec![0, 1, 3]);
    }
}
