//! Tenant settings store: duplicate detection configuration.
//!
//! Configs are stored as one JSON value per tenant under a fixed key and
//! replaced whole on update, so concurrent readers never observe a partial
//! config.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use tracing::warn;
use uuid::Uuid;

use leadflow_core::{defaults, ConfigStore, DuplicateDetectionConfig, Result};

/// PostgreSQL implementation of ConfigStore.
pub struct PgConfigStore {
    pool: PgPool,
}

impl PgConfigStore {
    /// Create a new PgConfigStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConfigStore for PgConfigStore {
    async fn get_duplicate_config(&self, tenant_id: Uuid) -> Result<DuplicateDetectionConfig> {
        let row = sqlx::query(
            "SELECT value FROM tenant_setting WHERE tenant_id = $1 AND key = $2",
        )
        .bind(tenant_id)
        .bind(defaults::CONFIG_SETTINGS_KEY)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(DuplicateDetectionConfig::default());
        };

        let value: JsonValue = row.try_get("value")?;
        match serde_json::from_value(value) {
            Ok(config) => Ok(config),
            Err(e) => {
                // A malformed stored config must not take detection down.
                warn!(
                    subsystem = "db",
                    component = "settings",
                    %tenant_id,
                    error = %e,
                    "Stored detection config does not parse, using defaults"
                );
                Ok(DuplicateDetectionConfig::default())
            }
        }
    }

    async fn put_duplicate_config(
        &self,
        tenant_id: Uuid,
        config: &DuplicateDetectionConfig,
    ) -> Result<()> {
        let value = serde_json::to_value(config)?;
        sqlx::query(
            "INSERT INTO tenant_setting (tenant_id, key, value, updated_at) \
             VALUES ($1, $2, $3, now()) \
             ON CONFLICT (tenant_id, key) \
             DO UPDATE SET value = EXCLUDED.value, updated_at = now()",
        )
        .bind(tenant_id)
        .bind(defaults::CONFIG_SETTINGS_KEY)
        .bind(&value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
