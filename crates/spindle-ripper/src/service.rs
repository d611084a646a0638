//! Ripping Stage: composes the cache manager, title selector, progress
//! tracker, external rip, and audio refiner into one `StageHandler`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use spindle_audio::{AudioRefiner, MetricsProvider};
use spindle_core::{
    Asset, Cancellation, MediaType, QueueItem, QueueStore, RipSpecEnvelope, SpindleError,
    SpindleResult, StageHandler,
};

use crate::cache::RipCache;
use crate::progress::PROGRESS_INTERVAL;
use crate::title_selector::{select_titles_with_thresholds, SelectionThresholds};

/// Default minimum size, in bytes, a validated ripped artifact must reach.
/// Overridable per spec §9's Open Question via
/// [`RippingStage::with_min_rip_size`].
pub const MIN_RIP_SIZE: u64 = 10 * 1024 * 1024;

/// Best-effort outbound notifier invoked around the rip. Errors are logged
/// and never fail the stage; the concrete implementation lives in the
/// notifications publisher.
pub trait RipNotifier: Send + Sync {
    /// Notify `event` with a human-readable `message`.
    fn notify(&self, event: &str, message: &str);
}

/// Bare-bones probe used for output validation: reports stream and
/// duration counts without the full audio-stream detail the refiner needs.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Probe `path`, returning `(video_streams, audio_streams, duration_seconds)`.
    async fn probe_summary(&self, cancel: &Cancellation, path: &Path) -> SpindleResult<(u32, u32, f64)>;
}

/// The ripping stage's configuration and external collaborators.
pub struct RippingStage {
    ripper_binary: Option<String>,
    probe: Arc<dyn MediaProbe>,
    cache: Option<RipCache>,
    staging_root: PathBuf,
    settings_path: PathBuf,
    audio_refiner: AudioRefiner,
    metrics: Arc<dyn MetricsProvider>,
    notifier: Option<Arc<dyn RipNotifier>>,
    store: Arc<dyn QueueStore>,
    settings_configured: AtomicBool,
    min_rip_size: u64,
    selection_thresholds: SelectionThresholds,
}

impl RippingStage {
    /// Construct a ripping stage. `staging_root` holds per-item working
    /// directories; `settings_path` is the ripper's idempotent settings
    /// file.
    #[must_use]
    pub fn new(
        store: Arc<dyn QueueStore>,
        probe: Arc<dyn MediaProbe>,
        audio_refiner: AudioRefiner,
        metrics: Arc<dyn MetricsProvider>,
        staging_root: impl Into<PathBuf>,
        settings_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            ripper_binary: None,
            probe,
            cache: None,
            staging_root: staging_root.into(),
            settings_path: settings_path.into(),
            audio_refiner,
            metrics,
            notifier: None,
            store,
            settings_configured: AtomicBool::new(false),
            min_rip_size: MIN_RIP_SIZE,
            selection_thresholds: SelectionThresholds::default(),
        }
    }

    /// Configure an external ripper binary. Without one, the stage falls
    /// back to copying `source_path` as a placeholder rip.
    #[must_use]
    pub fn with_ripper_binary(mut self, binary: impl Into<String>) -> Self {
        self.ripper_binary = Some(binary.into());
        self
    }

    /// Enable the rip cache rooted at `root`.
    #[must_use]
    pub fn with_cache(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache = Some(RipCache::new(root));
        self
    }

    /// Override the minimum validated rip size (default [`MIN_RIP_SIZE`]).
    #[must_use]
    pub const fn with_min_rip_size(mut self, bytes: u64) -> Self {
        self.min_rip_size = bytes;
        self
    }

    /// Override the movie-branch title selection thresholds (default
    /// [`SelectionThresholds::default`]).
    #[must_use]
    pub const fn with_selection_thresholds(mut self, thresholds: SelectionThresholds) -> Self {
        self.selection_thresholds = thresholds;
        self
    }

    /// Attach a best-effort notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn RipNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    fn notify(&self, event: &str, message: &str) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(event, message);
        }
    }

    fn working_dir(&self, item: &QueueItem) -> PathBuf {
        self.staging_root.join(format!("queue-{}", item.id)).join("rips")
    }

    /// Write the ripper's audio-selection settings idempotently: once per
    /// process lifetime, guarded by an atomic flag rather than re-checking
    /// file contents on every rip.
    fn configure_settings_file(&self) -> SpindleResult<()> {
        if self
            .settings_configured
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                SpindleError::configuration_with_source(
                    format!("failed to create settings dir {}", parent.display()),
                    err,
                )
            })?;
        }
        fs::write(&self.settings_path, "app_DefaultSelectionString = \"+sel:all\"\n").map_err(|err| {
            SpindleError::configuration_with_source(
                format!("failed to write ripper settings file {}", self.settings_path.display()),
                err,
            )
        })
    }

    async fn validate_ripped_artifact(&self, cancel: &Cancellation, path: &Path) -> SpindleResult<()> {
        if path.as_os_str().is_empty() {
            return Err(SpindleError::validation("ripped artifact path is empty"));
        }
        let metadata = fs::metadata(path).map_err(|err| {
            SpindleError::validation(format!("ripped artifact {} does not exist: {err}", path.display()))
        })?;
        if !metadata.is_file() {
            return Err(SpindleError::validation(format!(
                "ripped artifact {} is not a regular file",
                path.display()
            )));
        }
        if metadata.len() < self.min_rip_size {
            return Err(SpindleError::validation(format!(
                "ripped artifact {} is {} bytes, below the {} byte minimum",
                path.display(),
                metadata.len(),
                self.min_rip_size
            )));
        }

        let (video_streams, audio_streams, duration) = self.probe.probe_summary(cancel, path).await?;
        if video_streams < 1 || audio_streams < 1 || duration <= 0.0 {
            return Err(SpindleError::validation(format!(
                "ripped artifact {} failed probe validation (video={video_streams}, audio={audio_streams}, duration={duration})",
                path.display()
            )));
        }
        Ok(())
    }

    async fn run_ripper_for_title(
        &self,
        cancel: &Cancellation,
        ripper_binary: &str,
        item: &QueueItem,
        dest_dir: &Path,
        title_id: i64,
    ) -> SpindleResult<PathBuf> {
        let args = vec![
            "--robot".to_string(),
            "mkv".to_string(),
            format!("dev:{}", item.source_path.clone().unwrap_or_default()),
            title_id.to_string(),
            dest_dir.display().to_string(),
        ];

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<crate::progress::ProgressUpdate>();
        let store = Arc::clone(&self.store);
        let mut persisted_item = item.clone();
        let persist_task = tokio::spawn(async move {
            let mut last_persist = Instant::now();
            while let Some(update) = rx.recv().await {
                persisted_item.progress_stage = Some(update.stage.to_string());
                persisted_item.progress_message = Some(update.message);
                persisted_item.set_progress_percent(update.percent);
                let at_completion = (update.percent - 100.0).abs() < f64::EPSILON;
                if last_persist.elapsed() >= PROGRESS_INTERVAL || at_completion {
                    let _ = store.update_progress(&persisted_item).await;
                    last_persist = Instant::now();
                }
            }
        });

        let mut tracker = crate::progress::ProgressTracker::new();
        let run_result = spindle_process::run(cancel, ripper_binary, &args, |line| {
            let text = match line {
                spindle_process::OutputLine::Stdout(text) | spindle_process::OutputLine::Stderr(text) => text,
            };
            if let Some(update) = tracker.feed(&text) {
                let _ = tx.send(update);
            }
        })
        .await;

        drop(tx);
        let _ = persist_task.await;
        run_result?;

        RipCache::select_cached(dest_dir)?.ok_or_else(|| {
            SpindleError::external_tool(format!(
                "ripper reported success but produced no .mkv file for title {title_id}"
            ))
        })
    }
}

fn assign_movie_asset(envelope: &mut RipSpecEnvelope, title_id: i64, path: &Path) {
    envelope.add_asset(
        "ripped",
        Asset {
            episode_key: String::new(),
            title_id,
            path: path.display().to_string(),
        },
    );
}

fn assign_episode_asset(envelope: &mut RipSpecEnvelope, title_id: i64, path: &Path) {
    let episode_key = envelope
        .episodes
        .iter()
        .find(|episode| episode.title_id == title_id)
        .map(|episode| episode.key.clone());
    if let Some(episode_key) = episode_key {
        envelope.add_asset(
            "ripped",
            Asset {
                episode_key,
                title_id,
                path: path.display().to_string(),
            },
        );
    }
}

fn sanitize_file_name(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[async_trait]
impl StageHandler for RippingStage {
    async fn prepare(&self, _cancel: &Cancellation, item: &mut QueueItem) -> SpindleResult<()> {
        item.progress_stage = Some("Ripping".to_string());
        item.progress_message = Some("Starting rip".to_string());
        self.notify("rip_started", &format!("Rip started for {}", item.disc_title));
        Ok(())
    }

    async fn execute(&self, cancel: &Cancellation, item: &mut QueueItem) -> SpindleResult<()> {
        let mut envelope = item
            .rip_spec
            .clone()
            .ok_or_else(|| SpindleError::validation("rip spec envelope is missing"))?;

        if item.disc_fingerprint.trim().is_empty() {
            return Err(SpindleError::validation("disc fingerprint is required"));
        }

        let is_tv = matches!(envelope.media_type(), Some(MediaType::Tv));
        let using_cache = self.cache.is_some();
        let dest_dir = match &self.cache {
            Some(cache) => cache.path(item),
            None => self.working_dir(item),
        };
        fs::create_dir_all(&dest_dir).map_err(|err| {
            SpindleError::configuration_with_source(
                format!("failed to create destination dir {}", dest_dir.display()),
                err,
            )
        })?;

        let mut cache_hit = false;
        let result = self
            .execute_into_dest_dir(cancel, item, &mut envelope, &dest_dir, using_cache, is_tv, &mut cache_hit)
            .await;

        // Anything left in `dest_dir` by a failed attempt that never reached
        // `RipCache::register` is an un-registered, possibly un-refined rip:
        // a later attempt for the same fingerprint would otherwise mistake it
        // for a valid cache hit and skip both the rip and audio refinement.
        if result.is_err() && using_cache && !cache_hit {
            tracing::warn!(
                item_id = item.id,
                dir = %dest_dir.display(),
                "rip failed before cache registration, removing cache dir"
            );
            let _ = fs::remove_dir_all(&dest_dir);
        }

        result
    }
}

impl RippingStage {
    #[allow(clippy::too_many_arguments)]
    async fn execute_into_dest_dir(
        &self,
        cancel: &Cancellation,
        item: &mut QueueItem,
        envelope: &mut RipSpecEnvelope,
        dest_dir: &Path,
        using_cache: bool,
        is_tv: bool,
        cache_hit: &mut bool,
    ) -> SpindleResult<()> {
        let mut targets: Vec<(i64, PathBuf)> = Vec::new();

        if using_cache && RipCache::exists_non_empty(dest_dir)? {
            if let Some(candidate) = RipCache::select_cached(dest_dir)? {
                match self.validate_ripped_artifact(cancel, &candidate).await {
                    Ok(()) => {
                        tracing::info!(item_id = item.id, dir = %dest_dir.display(), "rip cache hit");
                        targets.push((-1, candidate));
                        *cache_hit = true;
                    }
                    Err(_) => {
                        tracing::warn!(item_id = item.id, dir = %dest_dir.display(), "cached rip failed validation, invalidating");
                        RipCache::invalidate(dest_dir)?;
                    }
                }
            }
        }

        if targets.is_empty() {
            if let Some(ripper_binary) = self.ripper_binary.clone() {
                self.configure_settings_file()?;
                let (title_ids, _report) = select_titles_with_thresholds(envelope, &self.selection_thresholds);
                if title_ids.is_empty() {
                    return Err(SpindleError::validation("no_episode_titles"));
                }
                tracing::debug!(item_id = item.id, titles = ?title_ids, "selected titles to rip");
                for title_id in title_ids {
                    if cancel.is_cancelled() {
                        return Err(SpindleError::transient("rip cancelled before completion"));
                    }
                    let produced = self
                        .run_ripper_for_title(cancel, &ripper_binary, item, dest_dir, title_id)
                        .await?;
                    if is_tv {
                        assign_episode_asset(envelope, title_id, &produced);
                        item.rip_spec = Some(envelope.clone());
                        self.store.update(item).await?;
                    }
                    targets.push((title_id, produced));
                }
            } else if let Some(source_path) = item.source_path.clone().filter(|path| !path.is_empty()) {
                let dest = dest_dir.join(format!("{}.mkv", sanitize_file_name(&item.disc_title)));
                fs::copy(&source_path, &dest).map_err(|err| {
                    SpindleError::transient_with_source(
                        format!("failed to copy placeholder source {source_path}"),
                        err,
                    )
                })?;
                targets.push((-1, dest));
            } else {
                return Err(SpindleError::configuration(
                    "no ripper binary configured and no source_path available for a placeholder rip",
                ));
            }
        }

        let working_dir = self.working_dir(item);
        let mut working_targets: Vec<(i64, PathBuf)> = Vec::new();
        if using_cache && working_dir != dest_dir {
            fs::create_dir_all(&working_dir).map_err(|err| {
                SpindleError::configuration_with_source(
                    format!("failed to create working dir {}", working_dir.display()),
                    err,
                )
            })?;
            for (title_id, path) in &targets {
                let file_name = path.file_name().ok_or_else(|| {
                    SpindleError::validation(format!("ripped artifact {} has no file name", path.display()))
                })?;
                let dest = working_dir.join(file_name);
                fs::copy(path, &dest).map_err(|err| {
                    SpindleError::transient_with_source(
                        format!("failed to mirror {} into working dir", path.display()),
                        err,
                    )
                })?;
                working_targets.push((*title_id, dest));
            }
        } else {
            working_targets = targets;
        }

        if !is_tv {
            if let Some((title_id, path)) = working_targets.first() {
                assign_movie_asset(envelope, *title_id, path);
            }
        }

        for (_, path) in &working_targets {
            let decision = self
                .audio_refiner
                .decide_default(cancel, path, self.metrics.as_ref())
                .await?;
            if decision.remux_required {
                // MakeMKV always places the video stream immediately before
                // its audio streams in a single-video-track rip.
                let video_index = decision
                    .selected
                    .iter()
                    .min()
                    .copied()
                    .map_or(0, |first_audio| first_audio.saturating_sub(1));
                self.audio_refiner
                    .remux(cancel, path, video_index, &decision)
                    .await
                    .map_err(|err| {
                        SpindleError::external_tool_with_source(
                            format!("audio refinement failed for {}", path.display()),
                            err,
                        )
                    })?;
            }
        }

        for (_, path) in &working_targets {
            self.validate_ripped_artifact(cancel, path).await?;
        }

        if using_cache && !*cache_hit {
            RipCache::register(dest_dir)?;
        }

        item.ripped_file = working_targets.first().map(|(_, path)| path.display().to_string());
        item.rip_spec = Some(envelope.clone());
        item.progress_stage = Some("Ripped".to_string());
        item.set_progress_percent(100.0);
        item.progress_message = Some(if *cache_hit {
            "Reused cached rip".to_string()
        } else {
            "Rip completed".to_string()
        });

        tracing::info!(item_id = item.id, cache_hit = *cache_hit, "rip completed");
        self.notify("rip_completed", &format!("Rip completed for {}", item.disc_title));
        Ok(())
    }
}
