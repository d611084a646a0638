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

//! Notifications Publisher: posts pipeline events to a configured topic
//! (an `ntfy`-style HTTP push endpoint — plain-text body, `Title`/
//! `Priority`/`Tags` headers), with a wall-clock dedup window and
//! per-event-class gating.
//!
//! Every call is best-effort: a failed POST is logged and swallowed so a
//! notification outage never aborts an otherwise successful rip (spec
//! §7's "Progress-persist errors and notification errors are logged and
//! swallowed").

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use spindle_core::SpindleResult;

/// The eight notification event classes defined in spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyEvent {
    /// A disc was inserted and a queue item was created.
    DiscDetected,
    /// The identification stage completed.
    IdentificationCompleted,
    /// The ripping stage started.
    RipStarted,
    /// The ripping stage completed.
    RipCompleted,
    /// The encoding stage completed.
    EncodingCompleted,
    /// The organization stage completed.
    OrganizationCompleted,
    /// A stage failed fatally.
    Error,
    /// Operator-triggered connectivity check.
    Test,
}

impl NotifyEvent {
    /// Stable lowercase name, matching spec §6's event list.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DiscDetected => "disc_detected",
            Self::IdentificationCompleted => "identification_completed",
            Self::RipStarted => "rip_started",
            Self::RipCompleted => "rip_completed",
            Self::EncodingCompleted => "encoding_completed",
            Self::OrganizationCompleted => "organization_completed",
            Self::Error => "error",
            Self::Test => "test",
        }
    }

    /// Parse a stage-emitted event tag (e.g. the `event` argument to
    /// [`spindle_ripper`]'s `RipNotifier::notify`) back into a typed event.
    /// Unrecognized tags are treated as [`Self::Error`] so an unexpected
    /// caller-supplied string still reaches an operator.
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        match tag {
            "disc_detected" => Self::DiscDetected,
            "identification_completed" => Self::IdentificationCompleted,
            "rip_started" => Self::RipStarted,
            "rip_completed" => Self::RipCompleted,
            "encoding_completed" => Self::EncodingCompleted,
            "organization_completed" => Self::OrganizationCompleted,
            "test" => Self::Test,
            _ => Self::Error,
        }
    }

    /// `ntfy`-style priority, 1 (min) through 5 (urgent).
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            Self::Error => 5,
            Self::RipStarted | Self::EncodingCompleted => 2,
            Self::Test => 1,
            _ => 3,
        }
    }

    /// `ntfy`-style comma-separated emoji tags.
    #[must_use]
    pub const fn tags(self) -> &'static str {
        match self {
            Self::DiscDetected => "cd",
            Self::IdentificationCompleted => "mag",
            Self::RipStarted => "arrows_counterclockwise",
            Self::RipCompleted => "white_check_mark",
            Self::EncodingCompleted => "clapper",
            Self::OrganizationCompleted => "file_cabinet",
            Self::Error => "x",
            Self::Test => "bell",
        }
    }

    /// Title-cased header value shown in the notification client.
    #[must_use]
    pub fn title(self) -> String {
        match self {
            Self::Error => "Spindle Error".to_string(),
            Self::Test => "Spindle Test Notification".to_string(),
            other => format!("Spindle: {}", other.as_str().replace('_', " ")),
        }
    }
}

/// Which event classes are enabled, plus the dedup window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Full topic URL to POST to (e.g. `https://ntfy.sh/my-spindle-topic`).
    pub topic_url: String,
    /// Request timeout for the outbound POST.
    pub timeout: Duration,
    /// Minimum spacing between two notifications carrying the same event
    /// class and message before the second is skipped as a duplicate.
    pub dedup_window: Duration,
    /// Event classes that are suppressed entirely.
    pub disabled_events: Vec<NotifyEvent>,
}

impl NotifyConfig {
    /// Whether `event` is gated off by configuration.
    #[must_use]
    pub fn is_enabled(&self, event: NotifyEvent) -> bool {
        !self.disabled_events.contains(&event)
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            topic_url: String::new(),
            timeout: Duration::from_secs(10),
            dedup_window: Duration::from_secs(60),
            disabled_events: Vec::new(),
        }
    }
}

struct DedupState {
    last_sent: HashMap<(NotifyEvent, String), Instant>,
}

/// Outbound notifier. Construct once per daemon and share via `Arc`.
pub struct Publisher {
    client: Client,
    config: NotifyConfig,
    dedup: Arc<Mutex<DedupState>>,
}

impl Publisher {
    /// Build a publisher from `config`. The underlying `reqwest::Client`
    /// is constructed once and reused for every POST.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: NotifyConfig) -> SpindleResult<Self> {
        let client = Client::builder().timeout(config.timeout).build().map_err(|err| {
            spindle_core::SpindleError::configuration_with_source("failed to build notification HTTP client", err)
        })?;
        Ok(Self {
            client,
            config,
            dedup: Arc::new(Mutex::new(DedupState {
                last_sent: HashMap::new(),
            })),
        })
    }

    /// Publish `event` with `message` as the POST body. Skipped silently
    /// (with a debug log) if the event class is disabled or the identical
    /// `(event, message)` pair was sent less than `dedup_window` ago.
    ///
    /// # Errors
    ///
    /// Returns an error if the POST itself fails or the topic responds
    /// with a non-success status. Callers in the pipeline treat this as
    /// best-effort and log-and-swallow per spec §7.
    pub async fn publish(&self, event: NotifyEvent, message: &str) -> SpindleResult<()> {
        if !self.config.is_enabled(event) {
            tracing::debug!(event = event.as_str(), "notification event disabled, skipping");
            return Ok(());
        }
        if self.config.topic_url.is_empty() {
            tracing::debug!("no notification topic configured, skipping");
            return Ok(());
        }

        if self.is_duplicate(event, message) {
            tracing::debug!(event = event.as_str(), "duplicate notification within dedup window, skipping");
            return Ok(());
        }

        let response = self
            .client
            .post(&self.config.topic_url)
            .header("Title", event.title())
            .header("Priority", event.priority().to_string())
            .header("Tags", event.tags())
            .body(message.to_string())
            .send()
            .await
            .map_err(|err| {
                spindle_core::SpindleError::transient_with_source(
                    format!("failed to publish {} notification", event.as_str()),
                    err,
                )
            })?;

        if !response.status().is_success() {
            return Err(spindle_core::SpindleError::transient(format!(
                "notification topic responded with {}",
                response.status()
            )));
        }

        self.record_sent(event, message);
        Ok(())
    }

    fn is_duplicate(&self, event: NotifyEvent, message: &str) -> bool {
        let state = self.lock_state();
        state
            .last_sent
            .get(&(event, message.to_string()))
            .is_some_and(|sent_at| sent_at.elapsed() < self.config.dedup_window)
    }

    fn record_sent(&self, event: NotifyEvent, message: &str) {
        let mut state = self.lock_state();
        state.last_sent.insert((event, message.to_string()), Instant::now());
        state.last_sent.retain(|_, sent_at| sent_at.elapsed() < self.config.dedup_window * 4);
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, DedupState> {
        match self.dedup.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("notification dedup mutex poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// Adapts [`Publisher`] to the synchronous, fire-and-forget
/// `RipNotifier` capability the ripping stage calls into: the POST is
/// spawned on the current Tokio runtime and its result is logged, never
/// propagated, matching the stage's "best-effort" contract.
impl spindle_ripper::RipNotifier for Publisher {
    fn notify(&self, event: &str, message: &str) {
        let event = NotifyEvent::parse(event);
        let message = message.to_string();
        let publisher = Publisher {
            client: self.client.clone(),
            config: self.config.clone(),
            dedup: Arc::clone(&self.dedup),
        };
        tokio::spawn(async move {
            if let Err(err) = publisher.publish(event, &message).await {
                tracing::warn!(event = event.as_str(), error = %err, "best-effort notification failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_round_trips_through_as_str_and_parse() {
        for event in [
            NotifyEvent::DiscDetected,
            NotifyEvent::IdentificationCompleted,
            NotifyEvent::RipStarted,
            NotifyEvent::RipCompleted,
            NotifyEvent::EncodingCompleted,
            NotifyEvent::OrganizationCompleted,
            NotifyEvent::Error,
            NotifyEvent::Test,
        ] {
            assert_eq!(NotifyEvent::parse(event.as_str()), event);
        }
    }

    #[test]
    fn unknown_tag_maps_to_error() {
        assert_eq!(NotifyEvent::parse("something_unexpected"), NotifyEvent::Error);
    }

    #[test]
    fn disabled_event_is_gated() {
        let config = NotifyConfig {
            disabled_events: vec![NotifyEvent::Test],
            ..NotifyConfig::default()
        };
        assert!(!config.is_enabled(NotifyEvent::Test));
        assert!(config.is_enabled(NotifyEvent::RipStarted));
    }

    #[tokio::test]
    async fn publish_is_a_noop_without_a_topic() {
        let publisher = Publisher::new(NotifyConfig::default()).unwrap();
        publisher.publish(NotifyEvent::Test, "hello").await.unwrap();
    }

    #[tokio::test]
    async fn dedup_window_suppresses_repeat_sends() {
        let mut config = NotifyConfig::default();
        config.topic_url = "http://127.0.0.1:1".to_string();
        config.dedup_window = Duration::from_secs(60);
        let publisher = Publisher::new(config).unwrap();
        publisher.record_sent(NotifyEvent::RipStarted, "started");
        assert!(publisher.is_duplicate(NotifyEvent::RipStarted, "started"));
        assert!(!publisher.is_duplicate(NotifyEvent::RipStarted, "a different message"));
    }
}
