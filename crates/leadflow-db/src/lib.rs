//! # leadflow-db
//!
//! PostgreSQL persistence adapters for the leadflow dedup engine.
//!
//! This crate provides:
//! - Connection pool management
//! - The lead repository (normalized-column lookups, conditional merge
//!   writes guarded by versions)
//! - Duplicate group storage
//! - Tenant settings (detection configuration)
//! - The append-only merge audit log
//!
//! ## Example
//!
//! ```rust,ignore
//! use leadflow_db::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/leadflow").await?;
//!     db.ensure_schema().await?;
//!
//!     let lead = db.leads.find_by_id(tenant_id, lead_id).await?;
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod groups;
pub mod leads;
pub mod pool;
pub mod schema;
pub mod settings;

// Re-export core types
pub use leadflow_core::*;

pub use audit::PgAuditSink;
pub use groups::PgGroupStore;
pub use leads::PgLeadRepository;
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use schema::ensure_schema;
pub use settings::PgConfigStore;

use std::sync::Arc;

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::PgPool,
    /// Lead repository (lookup + conditional writes).
    pub leads: Arc<PgLeadRepository>,
    /// Duplicate group store.
    pub groups: Arc<PgGroupStore>,
    /// Tenant settings store (detection config).
    pub settings: Arc<PgConfigStore>,
    /// Append-only merge audit sink.
    pub audit: Arc<PgAuditSink>,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            leads: Arc::new(PgLeadRepository::new(pool.clone())),
            groups: Arc::new(PgGroupStore::new(pool.clone())),
            settings: Arc::new(PgConfigStore::new(pool.clone())),
            audit: Arc::new(PgAuditSink::new(pool.clone())),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Connect with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Create all tables and indexes if they don't exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        schema::ensure_schema(&self.pool).await
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            leads: self.leads.clone(),
            groups: self.groups.clone(),
            settings: self.settings.clone(),
            audit: self.audit.clone(),
        }
    }
}
