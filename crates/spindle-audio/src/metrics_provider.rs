//! `ffmpeg`/`fpcalc`-backed implementation of [`MetricsProvider`].
//!
//! Each candidate stream is extracted to a mono temp WAV alongside the
//! primary, fingerprinted with `fpcalc -raw`, and swept with `ffmpeg`'s
//! `silencedetect` filter to build a coarse speech/silence timeline. The
//! formulas follow the Audio Refiner's metric definitions directly:
//! fingerprint similarity is the average per-frame bitwise similarity of
//! aligned Chromaprint-style 32-bit integers, and the speech ratios are
//! computed over fixed-step samples of the shared duration.

use std::path::Path;

use async_trait::async_trait;
use spindle_core::{Cancellation, SpindleError, SpindleResult};

use crate::model::CommentaryMetrics;
use crate::service::{MetricsProvider, classify_fingerprint_failure};

/// Sample step, in seconds, used to build the speech/silence timeline.
const SAMPLE_STEP_SECS: f64 = 0.5;

/// `silencedetect` noise floor and minimum silence duration.
const SILENCE_NOISE_DB: &str = "-30dB";
const SILENCE_MIN_DURATION_SECS: &str = "0.3";

/// Extracts streams with `ffmpeg`, fingerprints them with `fpcalc`, and
/// derives speech activity from `ffmpeg`'s `silencedetect` filter.
pub struct FfmpegMetricsProvider {
    ffmpeg_binary: String,
    ffprobe_binary: String,
    fpcalc_binary: String,
}

impl FfmpegMetricsProvider {
    /// Construct a provider bound to the three binaries it shells out to.
    #[must_use]
    pub fn new(
        ffmpeg_binary: impl Into<String>,
        ffprobe_binary: impl Into<String>,
        fpcalc_binary: impl Into<String>,
    ) -> Self {
        Self {
            ffmpeg_binary: ffmpeg_binary.into(),
            ffprobe_binary: ffprobe_binary.into(),
            fpcalc_binary: fpcalc_binary.into(),
        }
    }

    async fn extract_mono_wav(
        &self,
        cancel: &Cancellation,
        path: &Path,
        stream_index: usize,
        dest: &Path,
    ) -> SpindleResult<()> {
        let args = vec![
            "-y".to_string(),
            "-i".to_string(),
            path.display().to_string(),
            "-map".to_string(),
            format!("0:{stream_index}"),
            "-ac".to_string(),
            "1".to_string(),
            "-ar".to_string(),
            "8000".to_string(),
            "-f".to_string(),
            "wav".to_string(),
            dest.display().to_string(),
        ];
        spindle_process::run(cancel, &self.ffmpeg_binary, &args, |_| {}).await
    }

    async fn duration_secs(&self, cancel: &Cancellation, path: &Path) -> SpindleResult<f64> {
        let args = vec![
            "-v".to_string(),
            "quiet".to_string(),
            "-show_entries".to_string(),
            "format=duration".to_string(),
            "-of".to_string(),
            "csv=p=0".to_string(),
            path.display().to_string(),
        ];
        let mut stdout = String::new();
        spindle_process::run(cancel, &self.ffprobe_binary, &args, |line| {
            if let spindle_process::OutputLine::Stdout(text) = line {
                stdout.push_str(&text);
            }
        })
        .await?;

        stdout.trim().parse::<f64>().map_err(|err| {
            SpindleError::validation(format!("could not parse duration '{}': {err}", stdout.trim()))
        })
    }

    async fn fingerprint(&self, cancel: &Cancellation, wav: &Path) -> SpindleResult<Vec<u32>> {
        let args = vec!["-raw".to_string(), "-length".to_string(), "0".to_string(), wav.display().to_string()];
        let mut stdout = String::new();
        let mut stderr = String::new();
        let result = spindle_process::run(cancel, &self.fpcalc_binary, &args, |line| match line {
            spindle_process::OutputLine::Stdout(text) => {
                stdout.push_str(&text);
                stdout.push('\n');
            }
            spindle_process::OutputLine::Stderr(text) => {
                stderr.push_str(&text);
                stderr.push('\n');
            }
        })
        .await;

        if let Err(err) = result {
            let reason = classify_fingerprint_failure(&stderr);
            return Err(SpindleError::external_tool_with_source(
                format!("{reason}: fpcalc failed on {}", wav.display()),
                err,
            ));
        }

        parse_fingerprint(&stdout)
    }

    async fn silence_ranges(&self, cancel: &Cancellation, wav: &Path) -> SpindleResult<Vec<(f64, f64)>> {
        let filter = format!(
            "silencedetect=noise={SILENCE_NOISE_DB}:d={SILENCE_MIN_DURATION_SECS}"
        );
        let args = vec![
            "-i".to_string(),
            wav.display().to_string(),
            "-af".to_string(),
            filter,
            "-f".to_string(),
            "null".to_string(),
            "-".to_string(),
        ];
        let mut stderr = String::new();
        spindle_process::run(cancel, &self.ffmpeg_binary, &args, |line| {
            if let spindle_process::OutputLine::Stderr(text) = line {
                stderr.push_str(&text);
                stderr.push('\n');
            }
        })
        .await?;

        Ok(parse_silence_ranges(&stderr))
    }
}

#[async_trait]
impl MetricsProvider for FfmpegMetricsProvider {
    async fn compute(
        &self,
        cancel: &Cancellation,
        path: &Path,
        primary_index: usize,
        candidate_index: usize,
    ) -> SpindleResult<CommentaryMetrics> {
        let work_dir = tempfile::tempdir()
            .map_err(|err| SpindleError::transient_with_source("failed to create temp directory for audio metrics", err))?;
        let primary_wav = work_dir.path().join("primary.wav");
        let candidate_wav = work_dir.path().join("candidate.wav");

        self.extract_mono_wav(cancel, path, primary_index, &primary_wav).await?;
        self.extract_mono_wav(cancel, path, candidate_index, &candidate_wav).await?;

        let primary_fingerprint = self.fingerprint(cancel, &primary_wav).await?;
        let candidate_fingerprint = self.fingerprint(cancel, &candidate_wav).await?;
        let fingerprint_similarity = fingerprint_similarity(&primary_fingerprint, &candidate_fingerprint);

        let duration = self.duration_secs(cancel, &primary_wav).await?;
        let primary_silence = self.silence_ranges(cancel, &primary_wav).await?;
        let candidate_silence = self.silence_ranges(cancel, &candidate_wav).await?;

        let timeline = SpeechTimeline::sample(duration, &primary_silence, &candidate_silence);

        Ok(CommentaryMetrics {
            speech_ratio: timeline.candidate_speech_ratio,
            speech_overlap_with_primary: timeline.speech_overlap_with_primary,
            speech_in_primary_silence: timeline.speech_in_primary_silence,
            fingerprint_similarity,
            primary_speech_ratio: timeline.primary_speech_ratio,
        })
    }
}

/// Parses `fpcalc -raw`'s `FINGERPRINT=1,2,3,...` line into 32-bit frames.
fn parse_fingerprint(stdout: &str) -> SpindleResult<Vec<u32>> {
    let line = stdout
        .lines()
        .find_map(|line| line.strip_prefix("FINGERPRINT="))
        .ok_or_else(|| SpindleError::validation("fpcalc output did not contain a FINGERPRINT line"))?;

    line.split(',')
        .map(|value| {
            value
                .trim()
                .parse::<i64>()
                .map(|signed| signed as u32)
                .map_err(|err| SpindleError::validation(format!("invalid fingerprint value '{value}': {err}")))
        })
        .collect()
}

/// Chromaprint-style similarity: average of `1 - popcount(a^b)/32` across
/// the aligned prefix shared by both fingerprints.
fn fingerprint_similarity(a: &[u32], b: &[u32]) -> f64 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }
    let total: f64 = a
        .iter()
        .zip(b.iter())
        .take(len)
        .map(|(x, y)| 1.0 - f64::from((x ^ y).count_ones()) / 32.0)
        .sum();
    total / len as f64
}

/// Parses `silence_start: <t>` / `silence_end: <t>` pairs from
/// `silencedetect` stderr output into closed ranges.
fn parse_silence_ranges(stderr: &str) -> Vec<(f64, f64)> {
    let mut ranges = Vec::new();
    let mut pending_start: Option<f64> = None;

    for line in stderr.lines() {
        if let Some(value) = extract_after(line, "silence_start: ") {
            pending_start = value.parse::<f64>().ok();
        } else if let Some(value) = extract_after(line, "silence_end: ") {
            if let (Some(start), Some(end)) = (pending_start.take(), first_token(value).parse::<f64>().ok()) {
                ranges.push((start, end));
            }
        }
    }

    ranges
}

fn extract_after<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    line.find(marker).map(|idx| &line[idx + marker.len()..])
}

fn first_token(value: &str) -> &str {
    value.split_whitespace().next().unwrap_or(value)
}

fn is_silent(ranges: &[(f64, f64)], at: f64) -> bool {
    ranges.iter().any(|&(start, end)| at >= start && at < end)
}

struct SpeechTimeline {
    candidate_speech_ratio: f64,
    primary_speech_ratio: f64,
    speech_overlap_with_primary: f64,
    speech_in_primary_silence: f64,
}

impl SpeechTimeline {
    fn sample(duration: f64, primary_silence: &[(f64, f64)], candidate_silence: &[(f64, f64)]) -> Self {
        if duration <= 0.0 {
            return Self {
                candidate_speech_ratio: 0.0,
                primary_speech_ratio: 0.0,
                speech_overlap_with_primary: 0.0,
                speech_in_primary_silence: 0.0,
            };
        }

        let steps = (duration / SAMPLE_STEP_SECS).ceil().max(1.0) as usize;
        let mut candidate_speech_frames = 0usize;
        let mut primary_speech_frames = 0usize;
        let mut overlap_frames = 0usize;
        let mut in_primary_silence_frames = 0usize;

        for step in 0..steps {
            let at = step as f64 * SAMPLE_STEP_SECS;
            let candidate_speech = !is_silent(candidate_silence, at);
            let primary_speech = !is_silent(primary_silence, at);

            if primary_speech {
                primary_speech_frames += 1;
            }
            if candidate_speech {
                candidate_speech_frames += 1;
                if primary_speech {
                    overlap_frames += 1;
                } else {
                    in_primary_silence_frames += 1;
                }
            }
        }

        let candidate_speech_ratio = candidate_speech_frames as f64 / steps as f64;
        let primary_speech_ratio = primary_speech_frames as f64 / steps as f64;
        let (speech_overlap_with_primary, speech_in_primary_silence) = if candidate_speech_frames == 0 {
            (0.0, 0.0)
        } else {
            (
                overlap_frames as f64 / candidate_speech_frames as f64,
                in_primary_silence_frames as f64 / candidate_speech_frames as f64,
            )
        };

        Self {
            candidate_speech_ratio,
            primary_speech_ratio,
            speech_overlap_with_primary,
            speech_in_primary_silence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_similarity_is_one_for_identical_frames() {
        let a = vec![0xDEAD_BEEFu32, 0x1234_5678];
        assert!((fingerprint_similarity(&a, &a) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn fingerprint_similarity_is_zero_for_bitwise_complements() {
        let a = vec![0x0000_0000u32];
        let b = vec![0xFFFF_FFFFu32];
        assert!((fingerprint_similarity(&a, &b) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn fingerprint_similarity_of_empty_inputs_is_zero() {
        assert!((fingerprint_similarity(&[], &[]) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_fingerprint_reads_raw_csv_line() {
        let stdout = "DURATION=10\nFINGERPRINT=1,2,3,4294967295\n";
        let parsed = parse_fingerprint(stdout).unwrap();
        assert_eq!(parsed, vec![1, 2, 3, 4_294_967_295]);
    }

    #[test]
    fn parse_fingerprint_without_marker_line_fails() {
        assert!(parse_fingerprint("DURATION=10\n").is_err());
    }

    #[test]
    fn parse_silence_ranges_pairs_start_and_end_markers() {
        let stderr = "[silencedetect @ 0x1] silence_start: 1.5\n\
             [silencedetect @ 0x1] silence_end: 3.25 | silence_duration: 1.75\n";
        let ranges = parse_silence_ranges(stderr);
        assert_eq!(ranges, vec![(1.5, 3.25)]);
    }

    #[test]
    fn timeline_overlap_and_in_silence_fractions() {
        // Candidate speaks 0..4s; primary speaks 2..4s (silent 0..2s).
        let primary_silence = vec![(0.0, 2.0)];
        let candidate_silence = vec![(4.0, 6.0)];
        let timeline = SpeechTimeline::sample(6.0, &primary_silence, &candidate_silence);

        assert!(timeline.candidate_speech_ratio > 0.0);
        assert!(timeline.speech_in_primary_silence > 0.0);
        assert!(timeline.speech_overlap_with_primary > 0.0);
    }

    #[test]
    fn timeline_with_zero_duration_is_all_zero() {
        let timeline = SpeechTimeline::sample(0.0, &[], &[]);
        assert_eq!(timeline.candidate_speech_ratio, 0.0);
        assert_eq!(timeline.primary_speech_ratio, 0.0);
    }

    #[tokio::test]
    async fn compute_runs_against_fake_ffmpeg_ffprobe_and_fpcalc_binaries() {
        let ffmpeg_script = "case \"$*\" in\n  *-af*)\n    echo 'silence_start: 0.0' >&2\n    echo 'silence_end: 0.5' >&2\n    exit 0\n    ;;\nesac\neval dest=\\$$#\ntouch \"$dest\"\n";
        let binaries = spindle_test_support::fake_binary::build(&[
            ("ffmpeg", ffmpeg_script),
            ("ffprobe", "echo 10.0\n"),
            ("fpcalc", "echo 'FINGERPRINT=1,2,3,4'\n"),
        ])
        .unwrap();

        let provider = FfmpegMetricsProvider::new(
            binaries.path("ffmpeg").to_str().unwrap(),
            binaries.path("ffprobe").to_str().unwrap(),
            binaries.path("fpcalc").to_str().unwrap(),
        );

        let cancel = Cancellation::new();
        let metrics = provider.compute(&cancel, Path::new("disc.mkv"), 0, 1).await.unwrap();

        assert!((metrics.fingerprint_similarity - 1.0).abs() < f64::EPSILON);
    }
}
