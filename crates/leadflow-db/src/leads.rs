//! Lead repository implementation.
//!
//! Lookups run against normalized columns maintained alongside the JSONB
//! payload, so cross-representation duplicates ("12 34 56 78" vs
//! "+45 12 34 56 78") hit the same index key. Writes are conditional on
//! the version the caller observed; zero affected rows means the guard did
//! not hold and surfaces as Conflict.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use leadflow_core::{
    defaults, Error, LeadLookup, LeadRecord, LeadStatus, LeadWriter, Result,
};
use leadflow_match::NormalizedAttributes;

/// PostgreSQL implementation of LeadLookup and LeadWriter.
pub struct PgLeadRepository {
    pool: PgPool,
}

const LEAD_COLUMNS: &str =
    "id, tenant_id, payload, status, merged_into, version, created_at, updated_at";

impl PgLeadRepository {
    /// Create a new PgLeadRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_lead(row: &PgRow) -> Result<LeadRecord> {
        let status: String = row.try_get("status")?;
        Ok(LeadRecord {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            payload: row.try_get("payload")?,
            status: status.parse::<LeadStatus>()?,
            merged_into: row.try_get("merged_into")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Map an attribute name onto its normalized column, rejecting
    /// anything outside the whitelist so field names can never reach the
    /// query text unchecked.
    fn normalized_column(field: &str) -> Result<&'static str> {
        match field {
            "email" => Ok("email_norm"),
            "phone" => Ok("phone_norm"),
            "name" => Ok("name_norm"),
            "address" => Ok("address_norm"),
            "postal_code" => Ok("postal_norm"),
            other => Err(Error::InvalidInput(format!(
                "no normalized lookup column for field: {other}"
            ))),
        }
    }

    async fn find_by_column(
        &self,
        tenant_id: Uuid,
        field: &str,
        value: &str,
        limit: Option<i64>,
    ) -> Result<Vec<LeadRecord>> {
        let column = Self::normalized_column(field)?;
        let mut query = format!(
            "SELECT {LEAD_COLUMNS} FROM lead \
             WHERE tenant_id = $1 AND {column} = $2 AND status = 'active' \
             ORDER BY created_at DESC"
        );
        if limit.is_some() {
            query.push_str(" LIMIT $3");
        }

        let mut q = sqlx::query(&query).bind(tenant_id).bind(value);
        if let Some(limit) = limit {
            q = q.bind(limit);
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_lead).collect()
    }
}

/// Normalized column values recomputed from a payload.
fn normalized_bindings(payload: &JsonValue) -> NormalizedAttributes {
    NormalizedAttributes::from_payload(payload)
}

#[async_trait]
impl LeadLookup for PgLeadRepository {
    async fn find_by_id(&self, tenant_id: Uuid, lead_id: Uuid) -> Result<Option<LeadRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {LEAD_COLUMNS} FROM lead WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(lead_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_lead).transpose()
    }

    async fn find_by_exact_field(
        &self,
        tenant_id: Uuid,
        field: &str,
        value: &str,
    ) -> Result<Vec<LeadRecord>> {
        self.find_by_column(tenant_id, field, value, None).await
    }

    async fn find_by_field(
        &self,
        tenant_id: Uuid,
        field: &str,
        value: &str,
    ) -> Result<Vec<LeadRecord>> {
        self.find_by_column(
            tenant_id,
            field,
            value,
            Some(defaults::CANDIDATE_POOL_LIMIT as i64),
        )
        .await
    }
}

#[async_trait]
impl LeadWriter for PgLeadRepository {
    async fn update_merged_payload(
        &self,
        target_id: Uuid,
        payload: &JsonValue,
        expected_version: i64,
    ) -> Result<()> {
        let norms = normalized_bindings(payload);
        let result = sqlx::query(
            "UPDATE lead SET payload = $2, \
                 email_norm = $3, phone_norm = $4, name_norm = $5, \
                 address_norm = $6, postal_norm = $7, \
                 version = version + 1, updated_at = now() \
             WHERE id = $1 AND version = $8 AND status = 'active'",
        )
        .bind(target_id)
        .bind(payload)
        .bind(&norms.email)
        .bind(&norms.phone)
        .bind(&norms.name)
        .bind(&norms.address)
        .bind(&norms.postal_code)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::Conflict(format!(
                "conditional payload update on {target_id} did not apply"
            )));
        }
        Ok(())
    }

    async fn mark_merged(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        expected_version: i64,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE lead SET status = 'merged', merged_into = $2, \
                 version = version + 1, updated_at = now() \
             WHERE id = $1 AND version = $3 AND status = 'active'",
        )
        .bind(source_id)
        .bind(target_id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::Conflict(format!(
                "source lead {source_id} is no longer active at the expected version"
            )));
        }
        Ok(())
    }

    async fn commit_merge(
        &self,
        target_id: Uuid,
        payload: &JsonValue,
        target_version: i64,
        source_id: Uuid,
        source_version: i64,
    ) -> Result<()> {
        let norms = normalized_bindings(payload);
        let mut tx = self.pool.begin().await?;

        let target_update = sqlx::query(
            "UPDATE lead SET payload = $2, \
                 email_norm = $3, phone_norm = $4, name_norm = $5, \
                 address_norm = $6, postal_norm = $7, \
                 version = version + 1, updated_at = now() \
             WHERE id = $1 AND version = $8 AND status = 'active'",
        )
        .bind(target_id)
        .bind(payload)
        .bind(&norms.email)
        .bind(&norms.phone)
        .bind(&norms.name)
        .bind(&norms.address)
        .bind(&norms.postal_code)
        .bind(target_version)
        .execute(&mut *tx)
        .await?;

        if target_update.rows_affected() == 0 {
            // Dropping the transaction rolls it back.
            return Err(Error::Conflict(format!(
                "conditional payload update on {target_id} did not apply"
            )));
        }

        let source_update = sqlx::query(
            "UPDATE lead SET status = 'merged', merged_into = $2, \
                 version = version + 1, updated_at = now() \
             WHERE id = $1 AND version = $3 AND status = 'active'",
        )
        .bind(source_id)
        .bind(target_id)
        .bind(source_version)
        .execute(&mut *tx)
        .await?;

        if source_update.rows_affected() == 0 {
            return Err(Error::Conflict(format!(
                "source lead {source_id} is no longer active at the expected version"
            )));
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalized_column_whitelist() {
        assert_eq!(PgLeadRepository::normalized_column("email").unwrap(), "email_norm");
        assert_eq!(PgLeadRepository::normalized_column("phone").unwrap(), "phone_norm");
        assert_eq!(
            PgLeadRepository::normalized_column("postal_code").unwrap(),
            "postal_norm"
        );
        // Arbitrary field names must never reach the query text.
        assert!(PgLeadRepository::normalized_column("payload; DROP TABLE lead").is_err());
        assert!(PgLeadRepository::normalized_column("company").is_err());
    }

    #[test]
    fn test_normalized_bindings_follow_payload() {
        let norms = normalized_bindings(&json!({
            "email": " Jane@Firm.DK ",
            "phone": "12 34 56 78",
            "postal_code": "dk-2100",
        }));
        assert_eq!(norms.email.as_deref(), Some("jane@firm.dk"));
        assert_eq!(norms.phone.as_deref(), Some("+4512345678"));
        assert_eq!(norms.postal_code.as_deref(), Some("DK-2100"));
        assert_eq!(norms.name, None);
    }
}
