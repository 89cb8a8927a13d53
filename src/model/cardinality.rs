//! Relationship cardinality.

use serde::{Deserialize, Serialize};

/// Cardinality of a relationship, read from source to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Cardinality {
    /// One-to-one relationship
    #[serde(rename = "1:1")]
    OneToOne,
    /// One-to-many relationship
    #[serde(rename = "1:N")]
    OneToMany,
    /// Many-to-one relationship
    #[serde(rename = "N:1")]
    ManyToOne,
    /// Many-to-many relationship
    #[serde(rename = "N:M")]
    ManyToMany,
    /// Unknown cardinality (no usable join statistics)
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl Cardinality {
    /// Reverse the cardinality (swap source/target sides).
    pub fn reverse(self) -> Self {
        match self {
            Cardinality::OneToMany => Cardinality::ManyToOne,
            Cardinality::ManyToOne => Cardinality::OneToMany,
            Cardinality::OneToOne => Cardinality::OneToOne,
            Cardinality::ManyToMany => Cardinality::ManyToMany,
            Cardinality::Unknown => Cardinality::Unknown,
        }
    }

    /// Determine cardinality from whether each side repeats in the join.
    ///
    /// `source_repeats` means a single target row is reached from several
    /// source rows; `target_repeats` means a single source row reaches several
    /// target rows.
    pub fn from_repetition(source_repeats: bool, target_repeats: bool) -> Self {
        match (source_repeats, target_repeats) {
            (false, false) => Cardinality::OneToOne,
            (true, false) => Cardinality::ManyToOne,
            (false, true) => Cardinality::OneToMany,
            (true, true) => Cardinality::ManyToMany,
        }
    }

    /// Returns true if the cardinality is known (not Unknown).
    pub fn is_known(&self) -> bool {
        !matches!(self, Cardinality::Unknown)
    }

    /// Symbolic form used in storage and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Cardinality::OneToOne => "1:1",
            Cardinality::OneToMany => "1:N",
            Cardinality::ManyToOne => "N:1",
            Cardinality::ManyToMany => "N:M",
            Cardinality::Unknown => "unknown",
        }
    }

    /// Parse the symbolic form. Unrecognised input yields `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "1:1" => Some(Cardinality::OneToOne),
            "1:N" => Some(Cardinality::OneToMany),
            "N:1" => Some(Cardinality::ManyToOne),
            "N:M" | "N:N" | "M:N" => Some(Cardinality::ManyToMany),
            "UNKNOWN" | "?:?" => Some(Cardinality::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
