//! External-tool-backed orchestration for the Audio Refiner: probing,
//! acoustic metrics, and the dispositioned remux.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use spindle_core::{Cancellation, SpindleError, SpindleResult};

use crate::model::{
    AmbiguityResolver, AudioStream, ClassificationThresholds, CommentaryDecision,
    CommentaryMetrics, NoAmbiguityResolver, StreamDecision, classify, metadata_hint,
    remux_required, select_primary, selected_set,
};

#[derive(Debug, Deserialize)]
struct ProbeDocument {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    index: usize,
    codec_type: String,
    #[serde(default)]
    codec_name: String,
    #[serde(default)]
    channels: u32,
    #[serde(default)]
    tags: ProbeTags,
    #[serde(default)]
    disposition: ProbeDisposition,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeTags {
    language: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeDisposition {
    #[serde(default)]
    default: u32,
    #[serde(default)]
    comment: u32,
}

/// Compute acoustic commentary metrics for one candidate stream against
/// the chosen primary. Implementations typically shell out to a fingerprint
/// tool (Chromaprint/`fpcalc`) and a voice-activity detector; kept
/// pluggable since the concrete tooling is an external collaborator.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Compute metrics for `candidate_index` relative to `primary_index`
    /// within the media at `path`.
    async fn compute(
        &self,
        cancel: &Cancellation,
        path: &Path,
        primary_index: usize,
        candidate_index: usize,
    ) -> SpindleResult<CommentaryMetrics>;
}

/// Classify fingerprint-extraction failures by stderr substring.
#[must_use]
pub fn classify_fingerprint_failure(stderr: &str) -> &'static str {
    if stderr.contains("stream specifier") {
        "fingerprint_failed_stream_missing"
    } else if stderr.contains("invalid data") {
        "fingerprint_failed_decode"
    } else if stderr.contains("fpcalc") {
        "fingerprint_failed_fpcalc"
    } else {
        "fingerprint_failed"
    }
}

/// The per-stream decision record produced by a refine pass, including the
/// reason code for observability and troubleshooting.
#[derive(Debug, Clone)]
pub struct DecisionRecord {
    /// Index of the chosen primary stream.
    pub primary_index: usize,
    /// Per-candidate-stream decisions (excludes the primary).
    pub decisions: Vec<StreamDecision>,
    /// Final ordered selected set, primary first.
    pub selected: Vec<usize>,
    /// Whether a remux was required to realize the decision.
    pub remux_required: bool,
}

/// Drives probe, primary selection, and commentary classification for one
/// media file, then remuxes it if the decision differs from the existing
/// audio layout.
pub struct AudioRefiner {
    probe_binary: String,
    encoder_binary: String,
    thresholds: ClassificationThresholds,
}

impl AudioRefiner {
    /// Construct a refiner bound to the probe and encoder binaries.
    #[must_use]
    pub fn new(probe_binary: impl Into<String>, encoder_binary: impl Into<String>) -> Self {
        Self {
            probe_binary: probe_binary.into(),
            encoder_binary: encoder_binary.into(),
            thresholds: ClassificationThresholds::default(),
        }
    }

    /// Override the default classification thresholds.
    #[must_use]
    pub const fn with_thresholds(mut self, thresholds: ClassificationThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Probe `path` for its audio streams.
    ///
    /// # Errors
    ///
    /// Returns an error if the probe tool cannot be run or its output
    /// cannot be parsed.
    pub async fn probe(&self, cancel: &Cancellation, path: &Path) -> SpindleResult<Vec<AudioStream>> {
        let mut stdout = String::new();
        let args = vec![
            "-v".to_string(),
            "quiet".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_streams".to_string(),
            "-select_streams".to_string(),
            "a".to_string(),
            path.display().to_string(),
        ];
        spindle_process::run(cancel, &self.probe_binary, &args, |line| {
            if let spindle_process::OutputLine::Stdout(text) = line {
                stdout.push_str(&text);
                stdout.push('\n');
            }
        })
        .await?;

        let document: ProbeDocument = serde_json::from_str(&stdout)
            .map_err(|err| SpindleError::validation(format!("invalid probe output: {err}")))?;

        Ok(document
            .streams
            .into_iter()
            .filter(|stream| stream.codec_type == "audio")
            .map(|stream| AudioStream {
                index: stream.index,
                codec: stream.codec_name,
                channels: stream.channels,
                language: stream.tags.language,
                title: stream.tags.title,
                disposition_default: stream.disposition.default != 0,
                disposition_comment: stream.disposition.comment != 0,
            })
            .collect())
    }

    /// Run the full Step 1-4 decision sequence, without remuxing.
    ///
    /// # Errors
    ///
    /// Returns an error if probing fails or no primary stream can be
    /// chosen.
    pub async fn decide(
        &self,
        cancel: &Cancellation,
        path: &Path,
        metrics: &dyn MetricsProvider,
        resolver: &dyn AmbiguityResolver,
    ) -> SpindleResult<DecisionRecord> {
        let streams = self.probe(cancel, path).await?;
        let primary_index = select_primary(&streams)?;
        tracing::debug!(
            path = %path.display(),
            primary_index,
            candidates = streams.len(),
            "audio refiner selected primary track"
        );

        let mut decisions = Vec::new();
        for stream in &streams {
            if stream.index == primary_index {
                continue;
            }
            let computed = metrics
                .compute(cancel, path, primary_index, stream.index)
                .await?;
            let hint = metadata_hint(stream.title.as_deref(), stream.language.as_deref());

            let decision = match classify(hint, computed, &self.thresholds) {
                CommentaryDecision::Include(reason) => StreamDecision {
                    index: stream.index,
                    include: true,
                    reason,
                },
                CommentaryDecision::Exclude(reason) => StreamDecision {
                    index: stream.index,
                    include: false,
                    reason,
                },
                CommentaryDecision::Ambiguous => {
                    let include = resolver.resolve(stream, computed).unwrap_or(false);
                    StreamDecision {
                        index: stream.index,
                        include,
                        reason: "ambiguous",
                    }
                }
            };
            decisions.push(decision);
        }

        let selected = selected_set(primary_index, &decisions);
        let needs_remux = remux_required(&streams, primary_index, &selected);

        Ok(DecisionRecord {
            primary_index,
            decisions,
            selected,
            remux_required: needs_remux,
        })
    }

    /// Run the decision sequence using the default (always-exclude)
    /// ambiguity resolver.
    ///
    /// # Errors
    ///
    /// Returns an error if probing fails or no primary stream can be
    /// chosen.
    pub async fn decide_default(
        &self,
        cancel: &Cancellation,
        path: &Path,
        metrics: &dyn MetricsProvider,
    ) -> SpindleResult<DecisionRecord> {
        self.decide(cancel, path, metrics, &NoAmbiguityResolver).await
    }

    /// Remux `path` in place: only the streams in `decision.selected` are
    /// kept, with `default` on the primary, `comment` on commentary
    /// streams, and commentary titles rewritten to mention "Commentary"
    /// when absent. Writes to a sibling temp path, then atomically
    /// replaces the original.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoder invocation fails or the atomic
    /// rename fails.
    pub async fn remux(
        &self,
        cancel: &Cancellation,
        path: &Path,
        video_stream_index: usize,
        decision: &DecisionRecord,
    ) -> SpindleResult<()> {
        let streams = self.probe(cancel, path).await?;
        let temp_path = sibling_temp_path(path);
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            path.display().to_string(),
            "-map".to_string(),
            format!("0:{video_stream_index}"),
        ];

        for &stream_index in &decision.selected {
            args.push("-map".to_string());
            args.push(format!("0:{stream_index}"));
        }

        for (position, &stream_index) in decision.selected.iter().enumerate() {
            let disposition = if stream_index == decision.primary_index {
                "default"
            } else {
                "comment"
            };
            args.push(format!("-disposition:a:{position}"));
            args.push(disposition.to_string());

            if stream_index == decision.primary_index {
                continue;
            }
            let current_title = streams
                .iter()
                .find(|stream| stream.index == stream_index)
                .and_then(|stream| stream.title.as_deref());
            if !current_title.is_some_and(|title| title.to_ascii_lowercase().contains("commentary")) {
                let rewritten = current_title.map_or_else(
                    || "Commentary".to_string(),
                    |title| format!("{title} (Commentary)"),
                );
                args.push(format!("-metadata:s:a:{position}"));
                args.push(format!("title={rewritten}"));
            }
        }

        args.push("-c".to_string());
        args.push("copy".to_string());
        args.push(temp_path.display().to_string());

        spindle_process::run(cancel, &self.encoder_binary, &args, |_| {}).await?;

        std::fs::rename(&temp_path, path).map_err(|err| {
            SpindleError::transient_with_source(
                format!(
                    "failed to replace {} with remuxed output",
                    path.display()
                ),
                err,
            )
        })?;

        Ok(())
    }
}

fn sibling_temp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map_or_else(|| "output".to_string(), |name| name.to_string_lossy().into_owned());
    path.with_file_name(format!(".{file_name}.refining.tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_fingerprint_failure_matches_known_substrings() {
        assert_eq!(
            classify_fingerprint_failure("stream specifier ':a:3' matches no streams"),
            "fingerprint_failed_stream_missing"
        );
        assert_eq!(
            classify_fingerprint_failure("invalid data found when processing input"),
            "fingerprint_failed_decode"
        );
        assert_eq!(
            classify_fingerprint_failure("fpcalc exited with code 1"),
            "fingerprint_failed_fpcalc"
        );
        assert_eq!(classify_fingerprint_failure("mystery failure"), "fingerprint_failed");
    }

    #[test]
    fn sibling_temp_path_is_hidden_and_sits_next_to_original() {
        let path = PathBuf::from("/rips/feature.mkv");
        let temp = sibling_temp_path(&path);
        assert_eq!(temp, PathBuf::from("/rips/.feature.mkv.refining.tmp"));
    }
}
