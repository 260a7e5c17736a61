mod memory;
mod models;
mod postgres;

pub use memory::MemoryStore;
pub use models::*;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The unique index on `certificates.verification_id` rejected the insert.
    #[error("verification id already exists")]
    DuplicateVerificationId,

    /// A conditional update found the row changed since it was read.
    #[error("certificate was modified concurrently")]
    Conflict,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Persistence for institutions, certificates and the activity log.
///
/// `update_certificate` writes metadata and status only, and only while the
/// stored `updated_at` still equals `expected_updated_at`; otherwise it fails
/// with `StoreError::Conflict`. Verification id, content hash, owning
/// institution and artifact are fixed at insert.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_institution(&self, institution: &Institution) -> Result<(), StoreError>;

    async fn get_institution(&self, id: Uuid) -> Result<Option<Institution>, StoreError>;

    async fn insert_certificate(&self, cert: &Certificate) -> Result<(), StoreError>;

    async fn get_certificate(&self, id: Uuid) -> Result<Option<Certificate>, StoreError>;

    async fn find_by_verification_id(
        &self,
        verification_id: &str,
    ) -> Result<Option<Certificate>, StoreError>;

    async fn update_certificate(
        &self,
        cert: &Certificate,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn list_certificates(&self, institution_id: Uuid) -> Result<Vec<Certificate>, StoreError>;

    async fn append_activity(&self, entry: &ActivityLog) -> Result<(), StoreError>;

    async fn list_activity(&self, institution_id: Uuid) -> Result<Vec<ActivityLog>, StoreError>;
}

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
