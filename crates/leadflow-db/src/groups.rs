//! Duplicate group store implementation.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use leadflow_core::{
    DuplicateCandidate, DuplicateGroup, Error, GroupStore, ResolutionMethod, Result,
};

/// PostgreSQL implementation of GroupStore.
///
/// Members live in a child table ordered by position (oldest first, the
/// head being the primary); the candidate list is denormalized JSONB, the
/// candidates being transient diagnostics rather than queryable entities.
pub struct PgGroupStore {
    pool: PgPool,
}

impl PgGroupStore {
    /// Create a new PgGroupStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_group(row: &PgRow, member_ids: Vec<Uuid>) -> Result<DuplicateGroup> {
        let candidates_json: JsonValue = row.try_get("candidates")?;
        let candidates: Vec<DuplicateCandidate> = serde_json::from_value(candidates_json)?;
        let method: Option<String> = row.try_get("resolution_method")?;
        let resolution_method = method
            .map(|m| m.parse::<ResolutionMethod>())
            .transpose()
            .map_err(|e| Error::Internal(format!("stored resolution method: {e}")))?;

        Ok(DuplicateGroup {
            group_id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            candidates,
            member_ids,
            primary_lead_id: row.try_get("primary_lead_id")?,
            created_at: row.try_get("created_at")?,
            resolved: row.try_get("resolved")?,
            resolution_method,
        })
    }

    async fn member_ids(&self, group_id: Uuid) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            "SELECT lead_id FROM duplicate_group_member \
             WHERE group_id = $1 ORDER BY position",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| r.try_get::<Uuid, _>("lead_id").map_err(Error::from))
            .collect()
    }
}

#[async_trait]
impl GroupStore for PgGroupStore {
    async fn insert(&self, group: &DuplicateGroup) -> Result<()> {
        let candidates = serde_json::to_value(&group.candidates)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO duplicate_group \
                 (id, tenant_id, primary_lead_id, candidates, resolved, resolution_method, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(group.group_id)
        .bind(group.tenant_id)
        .bind(group.primary_lead_id)
        .bind(&candidates)
        .bind(group.resolved)
        .bind(group.resolution_method.map(|m| m.as_str()))
        .bind(group.created_at)
        .execute(&mut *tx)
        .await?;

        for (position, lead_id) in group.member_ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO duplicate_group_member (group_id, lead_id, position) \
                 VALUES ($1, $2, $3)",
            )
            .bind(group.group_id)
            .bind(lead_id)
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, tenant_id: Uuid, group_id: Uuid) -> Result<Option<DuplicateGroup>> {
        let row = sqlx::query(
            "SELECT id, tenant_id, primary_lead_id, candidates, resolved, \
                    resolution_method, created_at \
             FROM duplicate_group WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let members = self.member_ids(group_id).await?;
                Ok(Some(Self::row_to_group(&row, members)?))
            }
            None => Ok(None),
        }
    }

    async fn update(&self, group: &DuplicateGroup) -> Result<()> {
        let result = sqlx::query(
            "UPDATE duplicate_group \
             SET resolved = $3, resolution_method = $4, primary_lead_id = $5 \
             WHERE tenant_id = $1 AND id = $2",
        )
        .bind(group.tenant_id)
        .bind(group.group_id)
        .bind(group.resolved)
        .bind(group.resolution_method.map(|m| m.as_str()))
        .bind(group.primary_lead_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::GroupNotFound(group.group_id));
        }
        Ok(())
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        resolved: Option<bool>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DuplicateGroup>> {
        let rows = match resolved {
            Some(resolved) => {
                sqlx::query(
                    "SELECT id, tenant_id, primary_lead_id, candidates, resolved, \
                            resolution_method, created_at \
                     FROM duplicate_group \
                     WHERE tenant_id = $1 AND resolved = $2 \
                     ORDER BY created_at DESC LIMIT $3 OFFSET $4",
                )
                .bind(tenant_id)
                .bind(resolved)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, tenant_id, primary_lead_id, candidates, resolved, \
                            resolution_method, created_at \
                     FROM duplicate_group \
                     WHERE tenant_id = $1 \
                     ORDER BY created_at DESC LIMIT $2 OFFSET $3",
                )
                .bind(tenant_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut groups = Vec::with_capacity(rows.len());
        for row in &rows {
            let group_id: Uuid = row.try_get("id")?;
            let members = self.member_ids(group_id).await?;
            groups.push(Self::row_to_group(row, members)?);
        }
        Ok(groups)
    }

    async fn delete(&self, tenant_id: Uuid, group_id: Uuid) -> Result<()> {
        // Members cascade.
        let result = sqlx::query("DELETE FROM duplicate_group WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(group_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::GroupNotFound(group_id));
        }
        Ok(())
    }
}
