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

//! Postgres-backed `QueueStore` implementation: durable, ordered queue items
//! with status, progress, and the rip spec envelope.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use spindle_core::{QueueItem, QueueStatus, RipSpecEnvelope, SpindleError, SpindleResult};
use sqlx::{PgPool, Row, types::Json};

const INSERT_ITEM_SQL: &str = r"
    INSERT INTO spindle_queue.queue_items (
        status,
        disc_title,
        disc_fingerprint
    )
    VALUES ('pending', $1, $2)
    RETURNING
        id, status, disc_title, disc_fingerprint, source_path, ripped_file,
        rip_spec, progress_stage, progress_message, progress_percent,
        error_message, last_heartbeat, created_at, updated_at
";

const UPDATE_ITEM_SQL: &str = r"
    UPDATE spindle_queue.queue_items
    SET
        status = $2,
        disc_title = $3,
        disc_fingerprint = $4,
        source_path = $5,
        ripped_file = $6,
        rip_spec = $7,
        progress_stage = $8,
        progress_message = $9,
        progress_percent = $10,
        error_message = $11,
        last_heartbeat = $12,
        updated_at = now()
    WHERE id = $1
";

const UPDATE_PROGRESS_SQL: &str = r"
    UPDATE spindle_queue.queue_items
    SET
        progress_stage = $2,
        progress_message = $3,
        progress_percent = $4,
        last_heartbeat = $5,
        updated_at = now()
    WHERE id = $1
";

const SELECT_ITEM_BY_ID_SQL: &str = r"
    SELECT
        id, status, disc_title, disc_fingerprint, source_path, ripped_file,
        rip_spec, progress_stage, progress_message, progress_percent,
        error_message, last_heartbeat, created_at, updated_at
    FROM spindle_queue.queue_items
    WHERE id = $1
";

const SELECT_NEXT_PENDING_SQL: &str = r"
    SELECT
        id, status, disc_title, disc_fingerprint, source_path, ripped_file,
        rip_spec, progress_stage, progress_message, progress_percent,
        error_message, last_heartbeat, created_at, updated_at
    FROM spindle_queue.queue_items
    WHERE status = $1
    ORDER BY id ASC
    LIMIT 1
";

/// Durable queue store backed by a Postgres connection pool.
///
/// All mutations go through hand-written SQL rather than the `sqlx::query!`
/// macro, since the workspace does not check compile-time query metadata
/// against a live database.
#[derive(Clone)]
pub struct PostgresQueueStore {
    pool: PgPool,
}

impl PostgresQueueStore {
    /// Initialise the store, applying pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail or the database is unreachable.
    pub async fn new(pool: PgPool) -> SpindleResult<Self> {
        let mut migrator = sqlx::migrate!("./migrations");
        migrator.set_ignore_missing(true);
        migrator.run(&pool).await.map_err(|err| {
            SpindleError::transient_with_source("failed to run queue migrations", err)
        })?;
        Ok(Self { pool })
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn encode_envelope(envelope: &RipSpecEnvelope) -> SpindleResult<Json<serde_json::Value>> {
    let value = serde_json::to_value(envelope)
        .map_err(|err| SpindleError::validation(format!("failed to encode rip spec: {err}")))?;
    Ok(Json(value))
}

fn decode_envelope(value: Option<Json<serde_json::Value>>) -> SpindleResult<Option<RipSpecEnvelope>> {
    value
        .map(|Json(value)| {
            serde_json::from_value(value).map_err(|err| {
                SpindleError::validation(format!("failed to decode persisted rip spec: {err}"))
            })
        })
        .transpose()
}

fn row_to_item(row: &sqlx::postgres::PgRow) -> SpindleResult<QueueItem> {
    let status_label: String = row
        .try_get("status")
        .map_err(|err| SpindleError::transient_with_source("read status column", err))?;
    let status = QueueStatus::parse(&status_label)?;

    let rip_spec_json: Option<Json<serde_json::Value>> = row
        .try_get("rip_spec")
        .map_err(|err| SpindleError::transient_with_source("read rip_spec column", err))?;
    let rip_spec = decode_envelope(rip_spec_json)?;

    let progress_percent: i16 = row
        .try_get("progress_percent")
        .map_err(|err| SpindleError::transient_with_source("read progress_percent column", err))?;
    let progress_percent = u8::try_from(progress_percent).unwrap_or(100);

    Ok(QueueItem {
        id: row
            .try_get("id")
            .map_err(|err| SpindleError::transient_with_source("read id column", err))?,
        status,
        disc_title: row
            .try_get("disc_title")
            .map_err(|err| SpindleError::transient_with_source("read disc_title column", err))?,
        disc_fingerprint: row
            .try_get("disc_fingerprint")
            .map_err(|err| SpindleError::transient_with_source("read disc_fingerprint column", err))?,
        source_path: row
            .try_get("source_path")
            .map_err(|err| SpindleError::transient_with_source("read source_path column", err))?,
        ripped_file: row
            .try_get("ripped_file")
            .map_err(|err| SpindleError::transient_with_source("read ripped_file column", err))?,
        rip_spec,
        progress_stage: row
            .try_get("progress_stage")
            .map_err(|err| SpindleError::transient_with_source("read progress_stage column", err))?,
        progress_message: row
            .try_get("progress_message")
            .map_err(|err| SpindleError::transient_with_source("read progress_message column", err))?,
        progress_percent,
        error_message: row
            .try_get("error_message")
            .map_err(|err| SpindleError::transient_with_source("read error_message column", err))?,
        last_heartbeat: row
            .try_get::<Option<DateTime<Utc>>, _>("last_heartbeat")
            .map_err(|err| SpindleError::transient_with_source("read last_heartbeat column", err))?,
        created_at: row
            .try_get("created_at")
            .map_err(|err| SpindleError::transient_with_source("read created_at column", err))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|err| SpindleError::transient_with_source("read updated_at column", err))?,
    })
}

#[async_trait]
impl spindle_core::QueueStore for PostgresQueueStore {
    async fn new_disc(&self, disc_title: &str, disc_fingerprint: &str) -> SpindleResult<QueueItem> {
        let row = sqlx::query(INSERT_ITEM_SQL)
            .bind(disc_title)
            .bind(disc_fingerprint)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| {
                SpindleError::transient_with_source("failed to insert queue item", err)
            })?;
        row_to_item(&row)
    }

    async fn update(&self, item: &QueueItem) -> SpindleResult<()> {
        let rip_spec = item.rip_spec.as_ref().map(encode_envelope).transpose()?;
        let progress_percent = i16::from(item.progress_percent);

        sqlx::query(UPDATE_ITEM_SQL)
            .bind(item.id)
            .bind(item.status.as_str())
            .bind(&item.disc_title)
            .bind(&item.disc_fingerprint)
            .bind(&item.source_path)
            .bind(&item.ripped_file)
            .bind(rip_spec)
            .bind(&item.progress_stage)
            .bind(&item.progress_message)
            .bind(progress_percent)
            .bind(&item.error_message)
            .bind(item.last_heartbeat)
            .execute(&self.pool)
            .await
            .map_err(|err| {
                SpindleError::transient_with_source("failed to update queue item", err)
            })?;

        Ok(())
    }

    async fn update_progress(&self, item: &QueueItem) -> SpindleResult<()> {
        let progress_percent = i16::from(item.progress_percent);

        sqlx::query(UPDATE_PROGRESS_SQL)
            .bind(item.id)
            .bind(&item.progress_stage)
            .bind(&item.progress_message)
            .bind(progress_percent)
            .bind(item.last_heartbeat)
            .execute(&self.pool)
            .await
            .map_err(|err| {
                SpindleError::transient_with_source("failed to update queue item progress", err)
            })?;

        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> SpindleResult<Option<QueueItem>> {
        let row = sqlx::query(SELECT_ITEM_BY_ID_SQL)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| {
                SpindleError::transient_with_source("failed to look up queue item", err)
            })?;
        row.as_ref().map(row_to_item).transpose()
    }

    async fn next_pending(&self, status: QueueStatus) -> SpindleResult<Option<QueueItem>> {
        let row = sqlx::query(SELECT_NEXT_PENDING_SQL)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| {
                SpindleError::transient_with_source("failed to look up next pending queue item", err)
            })?;
        row.as_ref().map(row_to_item).transpose()
    }

    async fn close(&self) -> SpindleResult<()> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_envelope_passes_through_none() {
        assert!(decode_envelope(None).unwrap().is_none());
    }

    #[test]
    fn decode_envelope_rejects_malformed_json() {
        let value = Json(serde_json::json!({"fingerprint": 5}));
        let err = decode_envelope(Some(value)).unwrap_err();
        assert_eq!(err.kind(), spindle_core::ErrorKind::Validation);
    }
}
