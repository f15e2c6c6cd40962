//! Idempotent schema bootstrap.
//!
//! Four tables: leads (with normalized lookup columns), duplicate groups
//! plus their members, tenant settings, and the append-only merge audit
//! log. `ensure_schema` is safe to run on every startup.

use sqlx::PgPool;
use tracing::info;

use leadflow_core::Result;

const DDL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS lead (
        id UUID PRIMARY KEY,
        tenant_id UUID NOT NULL,
        payload JSONB NOT NULL DEFAULT '{}'::jsonb,
        status TEXT NOT NULL DEFAULT 'active',
        merged_into UUID,
        version BIGINT NOT NULL DEFAULT 1,
        email_norm TEXT,
        phone_norm TEXT,
        name_norm TEXT,
        address_norm TEXT,
        postal_norm TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_lead_tenant_email
        ON lead (tenant_id, email_norm) WHERE status = 'active'
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_lead_tenant_phone
        ON lead (tenant_id, phone_norm) WHERE status = 'active'
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_lead_tenant_postal
        ON lead (tenant_id, postal_norm) WHERE status = 'active'
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS duplicate_group (
        id UUID PRIMARY KEY,
        tenant_id UUID NOT NULL,
        primary_lead_id UUID NOT NULL,
        candidates JSONB NOT NULL DEFAULT '[]'::jsonb,
        resolved BOOLEAN NOT NULL DEFAULT false,
        resolution_method TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_duplicate_group_tenant
        ON duplicate_group (tenant_id, resolved, created_at DESC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS duplicate_group_member (
        group_id UUID NOT NULL REFERENCES duplicate_group(id) ON DELETE CASCADE,
        lead_id UUID NOT NULL,
        position INT NOT NULL DEFAULT 0,
        PRIMARY KEY (group_id, lead_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tenant_setting (
        tenant_id UUID NOT NULL,
        key TEXT NOT NULL,
        value JSONB NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (tenant_id, key)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS merge_audit_event (
        id BIGSERIAL PRIMARY KEY,
        occurred_at TIMESTAMPTZ NOT NULL,
        action TEXT NOT NULL,
        actor TEXT NOT NULL,
        details JSONB NOT NULL DEFAULT '{}'::jsonb
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_merge_audit_occurred
        ON merge_audit_event (occurred_at)
    "#,
];

/// Create all tables and indexes if they don't exist.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in DDL {
        sqlx::query(statement).execute(pool).await?;
    }
    info!(
        subsystem = "db",
        component = "schema",
        op = "ensure_schema",
        statement_count = DDL.len(),
        "Schema bootstrap complete"
    );
    Ok(())
}
