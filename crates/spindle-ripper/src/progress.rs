//! Progress Tracker: a stateful parser for the ripper's robot-mode output
//! lines (`PRGT`, `PRGV`, `MSG`), attributing percent complete to a coarse
//! phase label.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

/// Minimum interval between progress persists during a long rip, unless the
/// stage or percent-to-100 changed.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

static PRGT_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"^PRGT:\d+,\d+,"(.*)"$"#).unwrap());
static PRGV_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^PRGV:(\d+),(\d+),(\d+)(?:,"?(.*?)"?)?$"#).unwrap());
static MSG_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^MSG:(\d+),").unwrap());

/// A progress event emitted from a `PRGV` line, ready to persist onto a
/// queue item.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Coarse stage label: `"Analyzing"` or `"Ripping"`.
    pub stage: &'static str,
    /// Percent complete, always within `[0, 100]`.
    pub percent: f64,
    /// Human-readable message, either the line's own or a synthesized one.
    pub message: String,
}

/// Disc-level message severity derived from a `MSG` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    /// Informational; log and continue.
    Info,
    /// Non-fatal but worth counting (e.g. a single read error).
    Warning,
    /// Cancels the rip context; the stage must fail with a typed error.
    Fatal,
}

/// Classify a ripper `MSG:<code>,...` line by its numeric code.
#[must_use]
pub fn classify_message(code: u32, text: &str) -> MessageSeverity {
    match code {
        5021 | 5055 => MessageSeverity::Fatal,
        2019 if text.contains("No such file") => MessageSeverity::Fatal,
        5004 => MessageSeverity::Info,
        5010 | 2003 => MessageSeverity::Warning,
        _ if code >= 5000 => MessageSeverity::Info,
        _ => MessageSeverity::Info,
    }
}

/// Stateful parser tracking the current ripper phase across a sequence of
/// robot-mode lines.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    current_phase: String,
}

impl ProgressTracker {
    /// Construct a tracker with no phase observed yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line of ripper output; returns a [`ProgressUpdate`] when the
    /// line is a `PRGV` line with a non-zero `max`, otherwise `None`.
    pub fn feed(&mut self, line: &str) -> Option<ProgressUpdate> {
        if let Some(captures) = PRGT_LINE.captures(line) {
            self.current_phase = captures[1].to_string();
            return None;
        }

        let captures = PRGV_LINE.captures(line)?;
        let total: f64 = captures[2].parse().ok()?;
        let max: f64 = captures[3].parse().ok()?;
        if max <= 0.0 {
            return None;
        }

        let percent = (total / max * 100.0).clamp(0.0, 100.0);
        let stage = if self.current_phase.to_lowercase().contains("sav") {
            "Ripping"
        } else {
            "Analyzing"
        };
        let message = captures
            .get(4)
            .map(|m| m.as_str().to_string())
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| {
                format!(
                    "Progress {percent:.0}% ({total}/{max})",
                    percent = percent,
                    total = total as u64,
                    max = max as u64
                )
            });

        Some(ProgressUpdate { stage, percent, message })
    }

    /// Parse a `MSG:<code>,...` line's leading numeric code, if the line is
    /// a `MSG` line.
    #[must_use]
    pub fn message_code(line: &str) -> Option<u32> {
        MSG_LINE.captures(line)?.get(1)?.as_str().parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prgv_without_phase_defaults_to_analyzing() {
        let mut tracker = ProgressTracker::new();
        let update = tracker.feed(r#"PRGV:10,50,100"#).unwrap();
        assert_eq!(update.stage, "Analyzing");
        assert!((update.percent - 50.0).abs() < f64::EPSILON);
        assert_eq!(update.message, "Progress 50% (50/100)");
    }

    #[test]
    fn prgt_then_prgv_with_sav_phase_is_ripping() {
        let mut tracker = ProgressTracker::new();
        assert!(tracker.feed(r#"PRGT:5000,1,"Saving title to file""#).is_none());
        let update = tracker.feed(r#"PRGV:25,25,50"#).unwrap();
        assert_eq!(update.stage, "Ripping");
        assert!((update.percent - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn prgv_with_zero_max_is_ignored() {
        let mut tracker = ProgressTracker::new();
        assert!(tracker.feed(r#"PRGV:0,0,0"#).is_none());
    }

    #[test]
    fn percent_stays_within_bounds_for_monotonic_input() {
        let mut tracker = ProgressTracker::new();
        let mut last = 0.0;
        for current in [10, 30, 60, 100] {
            let update = tracker.feed(&format!("PRGV:{current},{current},100")).unwrap();
            assert!(update.percent >= 0.0 && update.percent <= 100.0);
            assert!(update.percent >= last);
            last = update.percent;
        }
    }

    #[test]
    fn message_code_extracts_leading_number() {
        assert_eq!(
            ProgressTracker::message_code(r#"MSG:5010,0,1,"Failed to open disc""#),
            Some(5010)
        );
        assert_eq!(ProgressTracker::message_code("not a message line"), None);
    }

    #[test]
    fn classify_message_maps_known_fatal_codes() {
        assert_eq!(classify_message(5021, ""), MessageSeverity::Fatal);
        assert_eq!(classify_message(5055, ""), MessageSeverity::Fatal);
        assert_eq!(
            classify_message(2019, "write error: No such file or directory"),
            MessageSeverity::Fatal
        );
        assert_eq!(classify_message(5004, ""), MessageSeverity::Info);
        assert_eq!(classify_message(2003, ""), MessageSeverity::Warning);
    }
}
