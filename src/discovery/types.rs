//! Column type compatibility.
//!
//! Raw database type strings are normalized (lower-cased, length/precision
//! suffix stripped) and then compared by family rather than by exact text,
//! so `varchar(255)` joins `text` and `INT(11)` joins `INTEGER`.

/// Join-relevant family of a column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeFamily {
    /// UUIDs and the string types that commonly hold them
    UuidLike,
    /// Whole-number types
    Integer,
    /// Dates, times, intervals
    Temporal,
    Boolean,
    /// Binary and large-object types
    Binary,
    /// Structured documents (JSON, XML)
    Document,
    /// Spatial types
    Geometry,
    /// Anything else (numeric, decimal, custom)
    Other,
}

const UUID_LIKE: &[&str] = &["uuid", "text", "varchar", "character varying"];

const INTEGER: &[&str] = &[
    "int", "int2", "int4", "int8", "integer", "bigint", "smallint", "serial", "bigserial",
];

const TEMPORAL: &[&str] = &[
    "date",
    "time",
    "timetz",
    "timestamp",
    "timestamptz",
    "datetime",
    "datetime2",
    "datetimeoffset",
    "smalldatetime",
    "interval",
    "time with time zone",
    "time without time zone",
    "timestamp with time zone",
    "timestamp without time zone",
];

const BOOLEAN: &[&str] = &["bool", "boolean", "bit"];

const BINARY: &[&str] = &[
    "bytea",
    "blob",
    "binary",
    "varbinary",
    "longblob",
    "mediumblob",
    "tinyblob",
    "image",
    "clob",
    "nclob",
    "oid",
];

const DOCUMENT: &[&str] = &["json", "jsonb", "xml"];

const GEOMETRY: &[&str] = &[
    "geometry",
    "geography",
    "point",
    "line",
    "lseg",
    "box",
    "path",
    "polygon",
    "circle",
];

/// MySQL display modifiers that do not change the stored value family.
const INTEGER_MODIFIERS: &[&str] = &["unsigned", "signed", "zerofill"];

/// Lower-case a type and strip any parenthesized suffix and MySQL sign
/// modifiers.
///
/// `varchar(255)` → `varchar`, `NUMERIC(10, 2)` → `numeric`,
/// `timestamp(3) with time zone` → `timestamp with time zone`,
/// `int(11) unsigned` → `int`.
pub fn normalize_type(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    let stripped = match (lower.find('('), lower.rfind(')')) {
        (Some(open), Some(close)) if close > open => {
            format!("{}{}", &lower[..open], &lower[close + 1..])
        }
        _ => lower,
    };
    stripped
        .split_whitespace()
        .filter(|word| !INTEGER_MODIFIERS.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

impl TypeFamily {
    /// Classify a raw type string.
    pub fn of(raw: &str) -> Self {
        let normalized = normalize_type(raw);
        let t = normalized.as_str();
        if UUID_LIKE.contains(&t) {
            TypeFamily::UuidLike
        } else if INTEGER.contains(&t) {
            TypeFamily::Integer
        } else if TEMPORAL.contains(&t) {
            TypeFamily::Temporal
        } else if BOOLEAN.contains(&t) {
            TypeFamily::Boolean
        } else if BINARY.contains(&t) {
            TypeFamily::Binary
        } else if DOCUMENT.contains(&t) {
            TypeFamily::Document
        } else if GEOMETRY.contains(&t) {
            TypeFamily::Geometry
        } else {
            TypeFamily::Other
        }
    }

    /// Families that never hold foreign keys.
    pub fn is_excluded(&self) -> bool {
        matches!(
            self,
            TypeFamily::Temporal
                | TypeFamily::Boolean
                | TypeFamily::Binary
                | TypeFamily::Document
                | TypeFamily::Geometry
        )
    }
}

/// Whether a column type can never participate in a join.
pub fn is_excluded_type(raw: &str) -> bool {
    TypeFamily::of(raw).is_excluded()
}

/// Whether two column types can be joined.
///
/// Compatible when identical after normalization, or when both are in the
/// UUID-like family, or both are in the integer family.
pub fn are_types_compatible(source_type: &str, target_type: &str) -> bool {
    let source = normalize_type(source_type);
    let target = normalize_type(target_type);
    if source == target {
        return true;
    }

    let both_in = |family: &[&str]| {
        family.contains(&source.as_str()) && family.contains(&target.as_str())
    };
    both_in(UUID_LIKE) || both_in(INTEGER)
}
