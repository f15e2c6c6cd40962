//! Append-only merge audit sink.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use leadflow_core::{AuditSink, Error, MergeAuditEvent, Result};

/// PostgreSQL implementation of AuditSink.
///
/// Rows are only ever inserted; the engine bounds each append with its own
/// timeout, so no statement timeout is applied here.
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    /// Create a new PgAuditSink with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Recent events touching a lead, oldest first, for merge timeline
    /// reconstruction.
    pub async fn events_for_lead(&self, lead_id: Uuid, limit: i64) -> Result<Vec<MergeAuditEvent>> {
        let rows = sqlx::query_as::<_, (chrono::DateTime<chrono::Utc>, String, String, serde_json::Value)>(
            "SELECT occurred_at, action, actor, details FROM merge_audit_event \
             WHERE details->>'source_lead_id' = $1 OR details->>'target_lead_id' = $1 \
             ORDER BY occurred_at ASC LIMIT $2",
        )
        .bind(lead_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from)?;

        Ok(rows
            .into_iter()
            .map(|(timestamp, action, actor, details)| MergeAuditEvent {
                timestamp,
                action,
                actor,
                details,
            })
            .collect())
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn append_event(&self, event: &MergeAuditEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO merge_audit_event (occurred_at, action, actor, details) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(event.timestamp)
        .bind(&event.action)
        .bind(&event.actor)
        .bind(&event.details)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
