//! Wires a loaded [`spindle_config::PipelineConfig`] into the queue store,
//! the ripping stage, and its external collaborators.

use std::sync::Arc;
use std::time::Duration;

use spindle_audio::{AudioRefiner, FfmpegMetricsProvider};
use spindle_config::PipelineConfig;
use spindle_core::QueueStore;
use spindle_notify::{NotifyConfig, NotifyEvent, Publisher};
use spindle_queue::PostgresQueueStore;
use spindle_ripper::{FfprobeMediaProbe, RippingStage};
use sqlx::postgres::PgPoolOptions;

use crate::error::CliResult;

/// Everything the daemon loop needs: the queue store and the one stage
/// handler this workspace implements (the ripping stage).
pub struct Pipeline {
    /// The durable queue store.
    pub store: Arc<dyn QueueStore>,
    /// The composed ripping stage.
    pub ripping_stage: RippingStage,
    /// Shared Prometheus metrics registry.
    pub metrics: spindle_telemetry::Metrics,
    /// In-process typed event bus for status and progress notifications.
    pub events: spindle_events::EventBus,
}

/// Connect to Postgres, run migrations, and compose the ripping stage
/// from `config`.
///
/// # Errors
///
/// Returns an error if the database cannot be reached, migrations fail,
/// or the Prometheus registry cannot be built.
pub async fn build_pipeline(config: &PipelineConfig) -> CliResult<Pipeline> {
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.queue.database_url)
        .await
        .map_err(|err| crate::error::CliError::failure(anyhow::anyhow!(err).context("failed to connect to the queue database")))?;

    let queue_store = PostgresQueueStore::new(pool)
        .await
        .map_err(crate::error::CliError::from)?;
    let store: Arc<dyn QueueStore> = Arc::new(queue_store);

    let probe = Arc::new(FfprobeMediaProbe::new(config.binaries.probe.clone()));

    let fingerprint_binary = config.binaries.fingerprint.clone().unwrap_or_else(|| "fpcalc".to_string());
    let metrics_provider: Arc<dyn spindle_audio::MetricsProvider> = Arc::new(FfmpegMetricsProvider::new(
        config.binaries.encoder.clone(),
        config.binaries.probe.clone(),
        fingerprint_binary,
    ));

    let audio_refiner = AudioRefiner::new(config.binaries.probe.clone(), config.binaries.encoder.clone())
        .with_thresholds(config.audio.thresholds);

    let mut ripping_stage = RippingStage::new(
        Arc::clone(&store),
        probe,
        audio_refiner,
        metrics_provider,
        config.storage.staging_root.clone(),
        config.binaries.ripper_settings_path.clone(),
    )
    .with_min_rip_size(config.ripping.min_rip_size_bytes)
    .with_selection_thresholds(config.ripping.selection);

    if let Some(ripper_binary) = &config.binaries.ripper {
        ripping_stage = ripping_stage.with_ripper_binary(ripper_binary.clone());
    }
    if let Some(cache_root) = &config.storage.cache_root {
        ripping_stage = ripping_stage.with_cache(cache_root.clone());
    }

    if !config.notify.topic_url.is_empty() {
        let notify_config = build_notify_config(config);
        let publisher = Publisher::new(notify_config).map_err(crate::error::CliError::from)?;
        ripping_stage = ripping_stage.with_notifier(Arc::new(publisher));
    }

    let metrics = spindle_telemetry::Metrics::new()
        .map_err(|err| crate::error::CliError::failure(anyhow::anyhow!(err)))?;

    Ok(Pipeline {
        store,
        ripping_stage,
        metrics,
        events: spindle_events::EventBus::new(),
    })
}

fn build_notify_config(config: &PipelineConfig) -> NotifyConfig {
    let disabled_events = config
        .notify
        .disabled_events
        .iter()
        .map(|name| NotifyEvent::parse(name))
        .collect();

    NotifyConfig {
        topic_url: config.notify.topic_url.clone(),
        timeout: Duration::from_secs(config.notify.timeout_secs),
        dedup_window: Duration::from_secs(config.notify.dedup_window_secs),
        disabled_events,
    }
}
