//! `ffprobe`-backed [`MediaProbe`]: reports stream counts and duration for
//! the ripping stage's output-validation step, without the full
//! stream-level detail the Audio Refiner's own probe needs.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use spindle_core::{Cancellation, SpindleError, SpindleResult};

use crate::service::MediaProbe;

#[derive(Debug, Deserialize)]
struct ProbeDocument {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: ProbeFormat,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: String,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Probes a media file with `ffprobe`, counting video and audio streams
/// and parsing the container duration.
pub struct FfprobeMediaProbe {
    probe_binary: String,
}

impl FfprobeMediaProbe {
    /// Construct a probe bound to the given `ffprobe`-compatible binary.
    #[must_use]
    pub fn new(probe_binary: impl Into<String>) -> Self {
        Self {
            probe_binary: probe_binary.into(),
        }
    }
}

#[async_trait]
impl MediaProbe for FfprobeMediaProbe {
    async fn probe_summary(&self, cancel: &Cancellation, path: &Path) -> SpindleResult<(u32, u32, f64)> {
        let args = vec![
            "-v".to_string(),
            "quiet".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_streams".to_string(),
            "-show_entries".to_string(),
            "format=duration".to_string(),
            path.display().to_string(),
        ];

        let mut stdout = String::new();
        spindle_process::run(cancel, &self.probe_binary, &args, |line| {
            if let spindle_process::OutputLine::Stdout(text) = line {
                stdout.push_str(&text);
                stdout.push('\n');
            }
        })
        .await?;

        let document: ProbeDocument = serde_json::from_str(&stdout)
            .map_err(|err| SpindleError::validation(format!("invalid probe output: {err}")))?;

        let video_streams = u32::try_from(
            document.streams.iter().filter(|stream| stream.codec_type == "video").count(),
        )
        .unwrap_or(u32::MAX);
        let audio_streams = u32::try_from(
            document.streams.iter().filter(|stream| stream.codec_type == "audio").count(),
        )
        .unwrap_or(u32::MAX);

        let duration = document
            .format
            .duration
            .as_deref()
            .unwrap_or("0")
            .trim()
            .parse::<f64>()
            .map_err(|err| SpindleError::validation(format!("invalid probe duration: {err}")))?;

        Ok((video_streams, audio_streams, duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stream_counts_and_duration() {
        let document: ProbeDocument = serde_json::from_str(
            r#"{
                "streams": [
                    {"codec_type": "video"},
                    {"codec_type": "audio"},
                    {"codec_type": "audio"},
                    {"codec_type": "subtitle"}
                ],
                "format": {"duration": "5400.125000"}
            }"#,
        )
        .unwrap();

        let video = document.streams.iter().filter(|stream| stream.codec_type == "video").count();
        let audio = document.streams.iter().filter(|stream| stream.codec_type == "audio").count();
        assert_eq!(video, 1);
        assert_eq!(audio, 2);
        assert_eq!(document.format.duration.as_deref(), Some("5400.125000"));
    }

    #[tokio::test]
    async fn probe_summary_runs_against_a_fake_ffprobe_binary() {
        let json = r#"{
            "streams": [
                {"codec_type": "video"},
                {"codec_type": "audio"}
            ],
            "format": {"duration": "120.5"}
        }"#;
        let script = spindle_test_support::fake_binary::succeeding_probe(json);
        let binaries = spindle_test_support::fake_binary::build(&[("ffprobe", &script)]).unwrap();

        let probe = FfprobeMediaProbe::new(binaries.path("ffprobe").to_str().unwrap());
        let cancel = Cancellation::new();
        let (video, audio, duration) = probe.probe_summary(&cancel, Path::new("disc.mkv")).await.unwrap();

        assert_eq!((video, audio), (1, 1));
        assert!((duration - 120.5).abs() < f64::EPSILON);
    }
}
