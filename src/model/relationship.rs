//! Relationship types produced by discovery.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cardinality, SchemaColumn};

/// Kind of a schema relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    /// Declared database FK constraint
    Fk,
    /// Authored by a user; never rewritten by discovery
    Manual,
    /// Inferred from features or statistics
    Inferred,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Fk => "fk",
            RelationshipType::Manual => "manual",
            RelationshipType::Inferred => "inferred",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fk" => Some(RelationshipType::Fk),
            "manual" => Some(RelationshipType::Manual),
            "inferred" => Some(RelationshipType::Inferred),
            _ => None,
        }
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evidence that produced a relationship.
///
/// This is the closed set of discovery origins. Matching on it is how the
/// phases decide which rows they own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceMethod {
    /// Database FK constraint
    ForeignKey,
    /// FK target resolved by upstream column-feature extraction
    ColumnFeatures,
    /// Blind statistical PK match
    PkMatch,
}

impl InferenceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            InferenceMethod::ForeignKey => "foreign_key",
            InferenceMethod::ColumnFeatures => "column_features",
            InferenceMethod::PkMatch => "pk_match",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "foreign_key" => Some(InferenceMethod::ForeignKey),
            "column_features" => Some(InferenceMethod::ColumnFeatures),
            "pk_match" => Some(InferenceMethod::PkMatch),
            _ => None,
        }
    }

    /// The relationship type rows with this origin are stored as.
    pub fn relationship_type(&self) -> RelationshipType {
        match self {
            InferenceMethod::ForeignKey => RelationshipType::Fk,
            InferenceMethod::ColumnFeatures | InferenceMethod::PkMatch => {
                RelationshipType::Inferred
            }
        }
    }

    /// Origins handled by the FK resolver (phase 1).
    pub fn is_resolver_origin(&self) -> bool {
        match self {
            InferenceMethod::ForeignKey | InferenceMethod::ColumnFeatures => true,
            InferenceMethod::PkMatch => false,
        }
    }
}

impl std::fmt::Display for InferenceMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unidirectional edge between two columns.
///
/// The `(source_column_id, target_column_id)` pair is the natural key; the
/// store upserts on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRelationship {
    pub id: Uuid,
    pub datasource_id: Uuid,
    pub source_table_id: Uuid,
    pub source_column_id: Uuid,
    pub target_table_id: Uuid,
    pub target_column_id: Uuid,
    pub relationship_type: RelationshipType,
    /// `None` for manual rows
    pub inference_method: Option<InferenceMethod>,
    /// Confidence score (0.0 to 1.0)
    pub confidence: f64,
    pub cardinality: Cardinality,
    pub is_validated: bool,
}

impl SchemaRelationship {
    /// Build a validated relationship discovered from `source` to `target`.
    pub fn discovered(
        datasource_id: Uuid,
        source: &SchemaColumn,
        target: &SchemaColumn,
        method: InferenceMethod,
        confidence: f64,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            datasource_id,
            source_table_id: source.table_id,
            source_column_id: source.id,
            target_table_id: target.table_id,
            target_column_id: target.id,
            relationship_type: method.relationship_type(),
            inference_method: Some(method),
            confidence: confidence.clamp(0.0, 1.0),
            cardinality,
            is_validated: true,
        }
    }

    pub fn is_manual(&self) -> bool {
        self.relationship_type == RelationshipType::Manual
    }

    /// Natural key of this edge.
    pub fn column_pair(&self) -> (Uuid, Uuid) {
        (self.source_column_id, self.target_column_id)
    }

    pub fn is_self_referential(&self) -> bool {
        self.source_table_id == self.target_table_id
    }
}

/// Audit evidence stored alongside a pk-match relationship.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryMetrics {
    pub match_rate: f64,
    pub source_distinct: i64,
    pub target_distinct: i64,
    pub matched_count: i64,
}

/// `schema.table.column` triple identifying one end of an entity relationship.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub schema: String,
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(
        schema: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            column: column.into(),
        }
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.schema, self.table, self.column)
    }
}

/// How an entity relationship was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    ForeignKey,
    ColumnFeatures,
    PkMatch,
    Manual,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::ForeignKey => "foreign_key",
            DetectionMethod::ColumnFeatures => "column_features",
            DetectionMethod::PkMatch => "pk_match",
            DetectionMethod::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "foreign_key" => Some(DetectionMethod::ForeignKey),
            "column_features" => Some(DetectionMethod::ColumnFeatures),
            "pk_match" => Some(DetectionMethod::PkMatch),
            "manual" => Some(DetectionMethod::Manual),
            _ => None,
        }
    }
}

impl From<InferenceMethod> for DetectionMethod {
    fn from(method: InferenceMethod) -> Self {
        match method {
            InferenceMethod::ForeignKey => DetectionMethod::ForeignKey,
            InferenceMethod::ColumnFeatures => DetectionMethod::ColumnFeatures,
            InferenceMethod::PkMatch => DetectionMethod::PkMatch,
        }
    }
}

/// Review state of an entity relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStatus {
    #[default]
    Pending,
    Confirmed,
    Rejected,
}

impl RelationshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipStatus::Pending => "pending",
            RelationshipStatus::Confirmed => "confirmed",
            RelationshipStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RelationshipStatus::Pending),
            "confirmed" => Some(RelationshipStatus::Confirmed),
            "rejected" => Some(RelationshipStatus::Rejected),
            _ => None,
        }
    }
}

/// A relationship between two business entities.
///
/// Created in forward/reverse pairs so the ontology can be navigated in both
/// directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRelationship {
    pub id: Uuid,
    pub ontology_id: Uuid,
    pub source_entity_id: Uuid,
    pub target_entity_id: Uuid,
    pub source_column: ColumnRef,
    pub target_column: ColumnRef,
    pub source_column_id: Option<Uuid>,
    pub target_column_id: Option<Uuid>,
    pub detection_method: DetectionMethod,
    pub confidence: f64,
    pub cardinality: Cardinality,
    pub status: RelationshipStatus,
    /// Human-readable description, filled by enrichment
    pub description: Option<String>,
    /// Short association label (e.g. "placed_by")
    pub association: Option<String>,
}

impl EntityRelationship {
    /// The navigation mirror of this relationship.
    ///
    /// Endpoints are swapped and cardinality inverted. The mirror gets a fresh
    /// id and no description or association; enrichment fills those later.
    pub fn reversed(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            ontology_id: self.ontology_id,
            source_entity_id: self.target_entity_id,
            target_entity_id: self.source_entity_id,
            source_column: self.target_column.clone(),
            target_column: self.source_column.clone(),
            source_column_id: self.target_column_id,
            target_column_id: self.source_column_id,
            detection_method: self.detection_method,
            confidence: self.confidence,
            cardinality: self.cardinality.reverse(),
            status: self.status,
            description: None,
            association: None,
        }
    }
}
