//! # Ontology Engine
//!
//! Deterministic relationship discovery over customer database schemas.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │            Schema snapshot (tables, columns,            │
//! │            column features, declared FKs)               │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [phase 1: FkResolver]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Declared constraints + resolved column features       │
//! │   → validated relationships (cardinality from data)     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [phase 2: PkMatchDiscoverer]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Candidate filter → join validation → acceptance       │
//! │   → inferred relationships + discovery metrics          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [store: upsert on column pair]
//! ┌─────────────────────────────────────────────────────────┐
//! │                  Relationship store                     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Join statistics always come from a [`datasource::JoinValidator`]; the
//! engine never reads customer data itself.

pub mod config;
pub mod datasource;
pub mod discovery;
pub mod model;
pub mod report;
pub mod store;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::datasource::{JoinAnalysis, JoinPair, JoinValidator, SqliteDatasource};
    pub use crate::discovery::{
        BidirectionalBuilder, CandidateConfig, CandidateFilter, DiscoveryError, DiscoveryReport,
        DiscoveryResult, FkDiscoveryResult, PkMatchResult, RelationshipDiscovery,
    };
    pub use crate::model::{
        Cardinality, ColumnFeatures, ColumnPurpose, ColumnRole, DiscoveryMetrics,
        EntityRelationship, InferenceMethod, RelationshipType, SchemaColumn, SchemaRelationship,
        SchemaTable,
    };
    pub use crate::store::{
        EntityRelationshipRepository, ProjectSettings, SchemaRepository, SqliteStore,
    };
}
