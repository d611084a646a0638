//! The daemon poll loop: repeatedly claims the next `identified` queue
//! item and drives it through the ripping stage, with an optional
//! Prometheus metrics endpoint and graceful shutdown on SIGINT/SIGTERM.

use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use spindle_core::{Cancellation, QueueStatus, QueueStore, RunOutcome, run_stage};

use crate::bootstrap::Pipeline;
use crate::error::CliResult;

/// How long the daemon sleeps between empty `next_pending` polls.
const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Run the daemon loop until a shutdown signal is received.
///
/// # Errors
///
/// Returns an error if the metrics endpoint cannot bind, or if a queue
/// lookup fails in a way that is not itself a per-item stage failure
/// (those are logged and looped past).
pub async fn run(pipeline: Pipeline, metrics_addr: Option<&str>) -> CliResult<()> {
    let cancel = Cancellation::new();
    let metrics_task = spawn_metrics_server(pipeline.metrics.clone(), metrics_addr)?;

    let shutdown_cancel = cancel.clone();
    let shutdown = tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("shutdown signal received, finishing in-flight item");
        shutdown_cancel.cancel();
    });

    poll_loop(&pipeline, &cancel).await;

    shutdown.abort();
    if let Some(task) = metrics_task {
        task.abort();
    }
    pipeline.store.close().await.map_err(crate::error::CliError::from)?;
    Ok(())
}

async fn poll_loop(pipeline: &Pipeline, cancel: &Cancellation) {
    while !cancel.is_cancelled() {
        match pipeline.store.next_pending(QueueStatus::Identified).await {
            Ok(Some(item)) => {
                let item_id = item.id;
                let started = Instant::now();
                let (_, outcome) = run_stage(
                    pipeline.store.as_ref(),
                    &pipeline.ripping_stage,
                    "ripping",
                    QueueStatus::Ripping,
                    QueueStatus::Ripped,
                    item,
                    cancel,
                )
                .await;

                match outcome {
                    Ok(RunOutcome::Completed) => {
                        pipeline.metrics.inc_stage_transition("ripping", "completed");
                        pipeline.metrics.observe_rip_duration(started.elapsed());
                        pipeline.events.publish(spindle_events::Event::StatusChanged {
                            item_id,
                            status: QueueStatus::Ripped.as_str().to_string(),
                        });
                    }
                    Ok(RunOutcome::Cancelled) => {
                        pipeline.metrics.inc_stage_transition("ripping", "cancelled");
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "ripping stage failed for queue item");
                        pipeline.metrics.inc_stage_transition("ripping", "failed");
                        pipeline.events.publish(spindle_events::Event::StageFailed {
                            item_id,
                            stage: "ripping",
                            message: err.message(),
                        });
                    }
                }
            }
            Ok(None) => {
                tokio::time::sleep(IDLE_POLL_INTERVAL).await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to poll queue for next identified item");
                tokio::time::sleep(IDLE_POLL_INTERVAL).await;
            }
        }
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn spawn_metrics_server(
    metrics: spindle_telemetry::Metrics,
    metrics_addr: Option<&str>,
) -> CliResult<Option<tokio::task::JoinHandle<()>>> {
    let Some(addr) = metrics_addr else {
        return Ok(None);
    };
    let addr = addr
        .parse::<std::net::SocketAddr>()
        .map_err(|err| crate::error::CliError::validation(format!("invalid metrics_addr '{addr}': {err}")))?;

    let router = Router::new().route("/metrics", get(render_metrics)).with_state(metrics);
    let task = tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(err) => {
                tracing::error!(error = %err, "failed to bind metrics listener");
                return;
            }
        };
        if let Err(err) = axum::serve(listener, router).await {
            tracing::error!(error = %err, "metrics server exited");
        }
    });
    Ok(Some(task))
}

async fn render_metrics(State(metrics): State<spindle_telemetry::Metrics>) -> impl IntoResponse {
    match metrics.render() {
        Ok(body) => (axum::http::StatusCode::OK, body),
        Err(err) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}
