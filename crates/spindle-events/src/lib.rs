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

//! Typed event bus for the Spindle pipeline.
//!
//! The bus provides a typed event enum, sequential identifiers, and support
//! for replaying recent events when subscribers reconnect. Internally it
//! uses `tokio::broadcast` with a bounded buffer; when the channel
//! overflows, the oldest events are dropped.

pub mod topics;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::sync::broadcast::{Receiver, Sender};
use tracing::error;

/// Identifier assigned to each event published on the bus.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed domain events surfaced by the pipeline.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A disc was detected and a queue item was created for it.
    DiscDetected {
        /// Queue item identifier.
        item_id: i64,
        /// Disc title supplied by the detection collaborator.
        disc_title: String,
        /// Disc fingerprint.
        disc_fingerprint: String,
    },
    /// A queue item transitioned to a new lifecycle status.
    StatusChanged {
        /// Queue item identifier.
        item_id: i64,
        /// New status, as its lowercase persisted name.
        status: String,
    },
    /// A stage reported incremental progress.
    Progress {
        /// Queue item identifier.
        item_id: i64,
        /// Coarse stage label (e.g. `"Ripping"`).
        stage: String,
        /// Progress percentage in `[0, 100]`.
        percent: u8,
        /// Free-form progress message.
        message: String,
    },
    /// The ripping stage found a valid cache entry and skipped the
    /// external rip.
    RipCacheHit {
        /// Queue item identifier.
        item_id: i64,
        /// Disc fingerprint the cache entry was keyed on.
        disc_fingerprint: String,
    },
    /// An episode asset was assigned and persisted mid-rip.
    EpisodeCompleted {
        /// Queue item identifier.
        item_id: i64,
        /// Episode key (`"sSSeEE"`).
        episode_key: String,
    },
    /// A stage failed; the item transitioned to `failed`.
    StageFailed {
        /// Queue item identifier.
        item_id: i64,
        /// Stage name the failure occurred in.
        stage: &'static str,
        /// Most specific available error message.
        message: String,
    },
}

impl Event {
    /// Stable, lowercase event kind used for logging and metrics labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DiscDetected { .. } => "disc_detected",
            Self::StatusChanged { .. } => "status_changed",
            Self::Progress { .. } => "progress",
            Self::RipCacheHit { .. } => "rip_cache_hit",
            Self::EpisodeCompleted { .. } => "episode_completed",
            Self::StageFailed { .. } => "stage_failed",
        }
    }
}

/// An event together with its sequential id and publish timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct EventEnvelope {
    /// Sequential identifier assigned at publish time.
    pub id: EventId,
    /// Wall-clock publish timestamp.
    pub timestamp: DateTime<Utc>,
    /// The published event.
    pub event: Event,
}

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    buffer: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<std::sync::atomic::AtomicU64>,
    replay_capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Construct a bus with the default replay capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Construct a bus with a custom replay capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "replay capacity must be non-zero");
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(std::sync::atomic::AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Publish an event, assigning it the next sequential id. Send errors
    /// (no active subscribers) are ignored; the event is still retained in
    /// the replay buffer.
    pub fn publish(&self, event: Event) -> EventId {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self.lock_buffer();
            if buffer.len() >= self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to the bus. When `since_id` is provided, buffered events
    /// newer than it are replayed before live events are delivered.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let backlog = since_id.map_or_else(VecDeque::new, |since| self.backlog_since(since));
        EventStream {
            backlog,
            receiver: self.sender.subscribe(),
        }
    }

    /// Buffered events with id strictly greater than `since_id`.
    #[must_use]
    pub fn backlog_since(&self, since_id: EventId) -> VecDeque<EventEnvelope> {
        self.lock_buffer()
            .iter()
            .filter(|envelope| envelope.id > since_id)
            .cloned()
            .collect()
    }

    /// The id of the most recently published event, if any.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        self.lock_buffer().back().map(|envelope| envelope.id)
    }

    fn lock_buffer(&self) -> MutexGuard<'_, VecDeque<EventEnvelope>> {
        match self.buffer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("event bus replay buffer mutex poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// A subscription to the event bus: drains any replayed backlog first,
/// then yields live events.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Await the next event, replaying backlog before live events.
    /// Returns `None` once the bus is closed.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(envelope) = self.backlog.pop_front() {
            return Some(envelope);
        }

        loop {
            match self.receiver.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged; resuming from live stream");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_subscribe_round_trips() {
        let bus = EventBus::new();
        let mut stream = bus.subscribe(None);

        bus.publish(Event::DiscDetected {
            item_id: 1,
            disc_title: "Alien".into(),
            disc_fingerprint: "fp-1".into(),
        });

        let envelope = stream.next().await.expect("event expected");
        assert_eq!(envelope.id, 1);
        assert_eq!(envelope.event.kind(), "disc_detected");
    }

    #[tokio::test]
    async fn subscribe_since_replays_only_newer_events() {
        let bus = EventBus::new();
        for item_id in 1..=3 {
            bus.publish(Event::StatusChanged {
                item_id,
                status: "ripping".into(),
            });
        }

        let mut stream = bus.subscribe(Some(1));
        let first = stream.next().await.unwrap();
        assert_eq!(first.id, 2);
        let second = stream.next().await.unwrap();
        assert_eq!(second.id, 3);
    }

    #[test]
    fn with_capacity_zero_panics() {
        let result = std::panic::catch_unwind(|| EventBus::with_capacity(0));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn replay_buffer_drops_oldest_when_full() {
        let bus = EventBus::with_capacity(2);
        for item_id in 1..=3 {
            bus.publish(Event::StatusChanged {
                item_id,
                status: "ripping".into(),
            });
        }
        let backlog = bus.backlog_since(0);
        assert_eq!(backlog.len(), 2);
        assert_eq!(backlog.front().unwrap().id, 2);
    }

    #[tokio::test]
    async fn many_concurrent_publishes_are_all_observed_live() {
        let bus = EventBus::with_capacity(600);
        let mut stream = bus.subscribe(None);
        let publisher = bus.clone();
        let handle = tokio::spawn(async move {
            for item_id in 0..500 {
                publisher.publish(Event::StatusChanged {
                    item_id,
                    status: "ripping".into(),
                });
            }
        });

        let mut received = 0;
        while received < 500 {
            if stream.next().await.is_some() {
                received += 1;
            }
        }
        handle.await.unwrap();
        assert_eq!(received, 500);
    }
}
