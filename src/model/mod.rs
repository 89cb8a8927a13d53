//! Schema snapshot and relationship types.

pub mod cardinality;
pub mod relationship;
pub mod schema;

pub use cardinality::Cardinality;
pub use relationship::{
    ColumnRef, DetectionMethod, DiscoveryMetrics, EntityRelationship, InferenceMethod,
    RelationshipStatus, RelationshipType, SchemaRelationship,
};
pub use schema::{ColumnFeatures, ColumnPurpose, ColumnRole, SchemaColumn, SchemaTable};
