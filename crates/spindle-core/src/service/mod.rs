//! The generic Stage Runner and the `QueueStore`/`StageHandler` traits it
//! drives.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::error::SpindleResult;
use crate::model::{QueueItem, QueueStatus};

/// Cooperative cancellation signal threaded through every stage, every
/// supervised process, and every outbound network call.
#[derive(Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    /// Construct a fresh, not-yet-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Durable, ordered work queue. Implementations must serialize all
/// mutations at the store level; readers observe a consistent snapshot of
/// an item, and concurrent writers on distinct ids may proceed in
/// parallel.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Create a `pending` item with a fresh id.
    async fn new_disc(&self, disc_title: &str, disc_fingerprint: &str) -> SpindleResult<QueueItem>;

    /// Write through all mutable fields of the item, including the
    /// envelope blob and progress. Atomic per item.
    async fn update(&self, item: &QueueItem) -> SpindleResult<()>;

    /// Narrow update of progress fields only, to reduce write
    /// amplification during a long-running stage.
    async fn update_progress(&self, item: &QueueItem) -> SpindleResult<()>;

    /// Point lookup by id.
    async fn get_by_id(&self, id: i64) -> SpindleResult<Option<QueueItem>>;

    /// FIFO lookup by id over items currently in the requested status.
    async fn next_pending(&self, status: QueueStatus) -> SpindleResult<Option<QueueItem>>;

    /// Flush and release any held resources (connection pools, file
    /// handles).
    async fn close(&self) -> SpindleResult<()>;
}

/// Per-stage handler implemented by each stage (identification, ripping,
/// encoding, organization).
#[async_trait]
pub trait StageHandler: Send + Sync {
    /// Run any setup that must happen before `execute`, such as announcing
    /// the starting progress state. Default is a no-op.
    async fn prepare(&self, cancel: &Cancellation, item: &mut QueueItem) -> SpindleResult<()> {
        let _ = (cancel, &*item);
        Ok(())
    }

    /// Run the stage's main work.
    async fn execute(&self, cancel: &Cancellation, item: &mut QueueItem) -> SpindleResult<()>;
}

/// Outcome of a single `run_stage` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The stage completed and the item transitioned to `doneStatus`.
    Completed,
    /// Cancellation was observed and the item was left in
    /// `processingStatus` for resume; `last_heartbeat` is the staleness
    /// signal.
    Cancelled,
}

/// Drive a single stage execution against one queue item:
/// transition to `processing_status`, call `prepare` then `execute`,
/// and persist either the `done_status` transition or a `failed`
/// transition with the most specific available error message.
///
/// On success the returned item's status is `done_status` and its
/// heartbeat is cleared. On failure the item's status is `failed` and
/// `error_message` is non-empty; the original error is returned
/// alongside it so callers can classify it (see [`crate::error::ErrorKind`])
/// and decide on notification/retry policy.
pub async fn run_stage(
    store: &dyn QueueStore,
    handler: &dyn StageHandler,
    stage_name: &'static str,
    processing_status: QueueStatus,
    done_status: QueueStatus,
    mut item: QueueItem,
    cancel: &Cancellation,
) -> (QueueItem, Result<RunOutcome, crate::error::SpindleError>) {
    let span = tracing::info_span!("stage", stage = stage_name, item_id = item.id);
    let _entered = span.enter();

    item.status = processing_status;
    item.progress_stage = Some(processing_status.title_case());
    item.progress_percent = 0;
    item.error_message = None;
    item.last_heartbeat = Some(chrono::Utc::now());
    if let Err(err) = store.update(&item).await {
        item.set_failed(err.message());
        return (item, Err(err));
    }

    if cancel.is_cancelled() {
        tracing::info!("cancelled before prepare; leaving item for resume");
        return (item, Ok(RunOutcome::Cancelled));
    }

    if let Err(err) = handler.prepare(cancel, &mut item).await {
        let _ = store.update(&item).await;
        item.set_failed(err.message());
        let _ = store.update(&item).await;
        return (item, Err(err));
    }
    if let Err(err) = store.update(&item).await {
        item.set_failed(err.message());
        return (item, Err(err));
    }

    if cancel.is_cancelled() {
        tracing::info!("cancelled after prepare; leaving item for resume");
        return (item, Ok(RunOutcome::Cancelled));
    }

    if let Err(err) = handler.execute(cancel, &mut item).await {
        item.set_failed(err.message());
        let _ = store.update(&item).await;
        return (item, Err(err));
    }

    if item.status == processing_status {
        item.status = done_status;
    }
    item.last_heartbeat = None;
    if let Err(err) = store.update(&item).await {
        item.set_failed(err.message());
        return (item, Err(err));
    }

    (item, Ok(RunOutcome::Completed))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::SpindleError;

    #[derive(Default)]
    struct MemoryStore {
        items: Mutex<Vec<QueueItem>>,
    }

    #[async_trait]
    impl QueueStore for MemoryStore {
        async fn new_disc(
            &self,
            disc_title: &str,
            disc_fingerprint: &str,
        ) -> SpindleResult<QueueItem> {
            let mut items = self.items.lock().unwrap();
            let mut item = QueueItem::new_disc(disc_title, disc_fingerprint);
            item.id = i64::try_from(items.len()).unwrap() + 1;
            items.push(item.clone());
            Ok(item)
        }

        async fn update(&self, item: &QueueItem) -> SpindleResult<()> {
            let mut items = self.items.lock().unwrap();
            if let Some(existing) = items.iter_mut().find(|candidate| candidate.id == item.id) {
                *existing = item.clone();
            }
            Ok(())
        }

        async fn update_progress(&self, item: &QueueItem) -> SpindleResult<()> {
            self.update(item).await
        }

        async fn get_by_id(&self, id: i64) -> SpindleResult<Option<QueueItem>> {
            Ok(self
                .items
                .lock()
                .unwrap()
                .iter()
                .find(|item| item.id == id)
                .cloned())
        }

        async fn next_pending(&self, status: QueueStatus) -> SpindleResult<Option<QueueItem>> {
            Ok(self
                .items
                .lock()
                .unwrap()
                .iter()
                .find(|item| item.status == status)
                .cloned())
        }

        async fn close(&self) -> SpindleResult<()> {
            Ok(())
        }
    }

    struct SucceedingHandler;

    #[async_trait]
    impl StageHandler for SucceedingHandler {
        async fn execute(&self, _cancel: &Cancellation, item: &mut QueueItem) -> SpindleResult<()> {
            item.progress_percent = 100;
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl StageHandler for FailingHandler {
        async fn execute(&self, _cancel: &Cancellation, _item: &mut QueueItem) -> SpindleResult<()> {
            Err(SpindleError::validation("disc fingerprint is required"))
        }
    }

    #[tokio::test]
    async fn successful_stage_transitions_to_done_status_and_clears_heartbeat() {
        let store = MemoryStore::default();
        let item = store.new_disc("Alien", "fp-1").await.unwrap();
        let cancel = Cancellation::new();

        let (item, outcome) = run_stage(
            &store,
            &SucceedingHandler,
            "ripping",
            QueueStatus::Ripping,
            QueueStatus::Ripped,
            item,
            &cancel,
        )
        .await;

        assert_eq!(outcome.unwrap(), RunOutcome::Completed);
        assert_eq!(item.status, QueueStatus::Ripped);
        assert!(item.last_heartbeat.is_none());
    }

    #[tokio::test]
    async fn failing_stage_transitions_to_failed_with_message() {
        let store = MemoryStore::default();
        let item = store.new_disc("Alien", "fp-1").await.unwrap();
        let cancel = Cancellation::new();

        let (item, outcome) = run_stage(
            &store,
            &FailingHandler,
            "ripping",
            QueueStatus::Ripping,
            QueueStatus::Ripped,
            item,
            &cancel,
        )
        .await;

        assert!(outcome.is_err());
        assert_eq!(item.status, QueueStatus::Failed);
        assert_eq!(
            item.error_message.as_deref(),
            Some("disc fingerprint is required")
        );
    }

    #[tokio::test]
    async fn cancellation_before_prepare_leaves_item_in_processing_status() {
        let store = MemoryStore::default();
        let item = store.new_disc("Alien", "fp-1").await.unwrap();
        let cancel = Cancellation::new();
        cancel.cancel();

        let (item, outcome) = run_stage(
            &store,
            &SucceedingHandler,
            "ripping",
            QueueStatus::Ripping,
            QueueStatus::Ripped,
            item,
            &cancel,
        )
        .await;

        assert_eq!(outcome.unwrap(), RunOutcome::Cancelled);
        assert_eq!(item.status, QueueStatus::Ripping);
        assert!(item.last_heartbeat.is_some());
    }
}
