//! Relationship store.
//!
//! Discovery reads the schema snapshot and writes relationships through the
//! repository traits defined here. [`SqliteStore`] implements all of them on
//! a single SQLite database (`~/.ontology/store.db` by default).
//!
//! # Contract
//!
//! - `(source_column_id, target_column_id)` is the natural key of a schema
//!   relationship; upserts converge on it.
//! - An upsert never rewrites a relationship whose type is `manual`.

mod sqlite;

pub use sqlite::{RelationshipDetail, SqliteStore};

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::model::{
    DiscoveryMetrics, EntityRelationship, SchemaColumn, SchemaRelationship, SchemaTable,
};

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to determine store directory")]
    NoStoreDir,

    #[error("store schema version {found} is not supported (expected {expected})")]
    IncompatibleVersion { found: i32, expected: i32 },

    #[error("invalid stored value: {0}")]
    InvalidData(String),

    #[error("store connection lock poisoned")]
    Poisoned,

    #[error("not found: {0}")]
    NotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Schema snapshot and schema-relationship persistence.
#[async_trait]
pub trait SchemaRepository: Send + Sync {
    /// Tables of a datasource, ordered by schema and table name.
    async fn list_tables(&self, datasource_id: Uuid) -> StoreResult<Vec<SchemaTable>>;

    /// Columns of a datasource with their features attached.
    async fn list_columns(&self, datasource_id: Uuid) -> StoreResult<Vec<SchemaColumn>>;

    /// All schema relationships recorded for a datasource.
    async fn list_existing_relationships(
        &self,
        datasource_id: Uuid,
    ) -> StoreResult<Vec<SchemaRelationship>>;

    /// Insert or update a relationship by column pair.
    async fn upsert_relationship(&self, relationship: &SchemaRelationship) -> StoreResult<()>;

    /// Insert or update a relationship and attach its discovery metrics.
    async fn upsert_relationship_with_metrics(
        &self,
        relationship: &SchemaRelationship,
        metrics: &DiscoveryMetrics,
    ) -> StoreResult<()>;
}

/// Entity-level relationship persistence.
#[async_trait]
pub trait EntityRelationshipRepository: Send + Sync {
    async fn create(&self, relationship: &EntityRelationship) -> StoreResult<()>;

    async fn delete(&self, id: Uuid) -> StoreResult<()>;

    /// Persist a forward/reverse pair.
    ///
    /// The default writes forward then reverse and deletes the forward row
    /// again if the reverse write fails. Stores with transactions should
    /// override this.
    async fn create_pair(
        &self,
        forward: &EntityRelationship,
        reverse: &EntityRelationship,
    ) -> StoreResult<()> {
        self.create(forward).await?;
        if let Err(err) = self.create(reverse).await {
            if let Err(cleanup) = self.delete(forward.id).await {
                warn!(
                    relationship_id = %forward.id,
                    error = %cleanup,
                    "failed to remove forward relationship after reverse write failed"
                );
            }
            return Err(err);
        }
        Ok(())
    }
}

/// Per-project settings consulted by discovery.
#[async_trait]
pub trait ProjectSettings: Send + Sync {
    /// Whether the project still uses `_id`-suffix heuristics.
    async fn use_legacy_pattern_matching(&self, project_id: Uuid) -> StoreResult<bool>;
}
