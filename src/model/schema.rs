//! Schema snapshot types.
//!
//! Tables and columns are produced by an upstream schema scan and are
//! read-only to the discovery engine. Column features are attached by an
//! upstream feature-extraction pass and travel with the column as metadata.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A table in a datasource's schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaTable {
    /// Table identifier
    pub id: Uuid,
    /// Owning datasource
    pub datasource_id: Uuid,
    /// Schema name (e.g. `public`, `main`)
    pub schema_name: String,
    /// Table name
    pub table_name: String,
    /// Estimated row count, when known
    pub row_count: Option<i64>,
}

impl SchemaTable {
    /// `schema.table` form used in logs and reports.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema_name, self.table_name)
    }

    /// Match a possibly schema-qualified table reference, case-insensitively.
    pub fn matches_reference(&self, reference: &str) -> bool {
        match reference.split_once('.') {
            Some((schema, table)) => {
                self.schema_name.eq_ignore_ascii_case(schema)
                    && self.table_name.eq_ignore_ascii_case(table)
            }
            None => self.table_name.eq_ignore_ascii_case(reference),
        }
    }
}

/// Semantic purpose of a column, as classified by feature extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnPurpose {
    /// Keys and references
    Identifier,
    /// Counts, ratings, scores, amounts
    Measure,
    /// Free text
    Text,
    /// Dates and times
    Temporal,
    /// Boolean-like flags
    Flag,
    /// Small closed value sets
    Enum,
    /// Anything else
    Other,
}

/// Structural role of a column, as classified by feature extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    PrimaryKey,
    ForeignKey,
    Attribute,
    Other,
}

/// Features attached to a column by upstream extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnFeatures {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<ColumnPurpose>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ColumnRole>,

    /// Resolved FK target table (`table` or `schema.table`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fk_target_table: Option<String>,

    /// Resolved FK target column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fk_target_column: Option<String>,

    /// Confidence of the resolved FK target (0.0 to 1.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fk_confidence: Option<f64>,
}

impl ColumnFeatures {
    /// Whether extraction resolved a concrete FK target for this column.
    pub fn has_resolved_fk(&self) -> bool {
        self.fk_target_table.is_some() && self.fk_confidence.is_some()
    }
}

/// A column in a datasource's schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaColumn {
    /// Column identifier
    pub id: Uuid,
    /// Owning table identifier
    pub table_id: Uuid,
    /// Column name
    pub column_name: String,
    /// Raw database type string (e.g. `varchar(255)`)
    pub data_type: String,
    /// Position within the table (1-based)
    pub ordinal_position: i32,
    /// Whether the column is (part of) the primary key
    pub is_primary_key: bool,
    /// Joinability from the data scan: `None` means not yet determined
    pub is_joinable: Option<bool>,
    /// Number of distinct values, when sampled
    pub distinct_count: Option<i64>,
    /// Upstream feature classification
    pub features: Option<ColumnFeatures>,
}

impl SchemaColumn {
    pub fn purpose(&self) -> Option<ColumnPurpose> {
        self.features.as_ref().and_then(|f| f.purpose)
    }

    pub fn role(&self) -> Option<ColumnRole> {
        self.features.as_ref().and_then(|f| f.role)
    }

    /// Column classified as an identifier.
    pub fn is_identifier(&self) -> bool {
        self.purpose() == Some(ColumnPurpose::Identifier)
    }

    /// Column classified as a numeric measure (count, rating, score).
    pub fn is_measure(&self) -> bool {
        self.purpose() == Some(ColumnPurpose::Measure)
    }

    /// Column classified with the foreign-key role.
    pub fn is_foreign_key_role(&self) -> bool {
        self.role() == Some(ColumnRole::ForeignKey)
    }

    /// Column name ends in `_id` (case-insensitive).
    pub fn has_id_suffix(&self) -> bool {
        self.column_name.to_ascii_lowercase().ends_with("_id")
    }

    /// Confidence of an upstream-resolved FK target, if any.
    pub fn resolved_fk_confidence(&self) -> Option<f64> {
        self.features
            .as_ref()
            .filter(|f| f.has_resolved_fk())
            .and_then(|f| f.fk_confidence)
    }

    /// Feature hint naming the table this column probably references.
    pub fn fk_target_hint(&self) -> Option<&str> {
        self.features
            .as_ref()
            .and_then(|f| f.fk_target_table.as_deref())
    }
}
