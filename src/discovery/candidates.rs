//! Candidate selection for PK matching.
//!
//! Decides which columns may act as FK sources and which as join targets,
//! and orders them so the likeliest FKs are validated first.

use std::collections::HashSet;

use uuid::Uuid;

use super::snapshot::SchemaSnapshot;
use super::thresholds;
use super::types::is_excluded_type;
use crate::model::{SchemaColumn, SchemaTable};

/// Settings for the candidate filter.
///
/// Passed explicitly so the filter never consults global project state.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateConfig {
    /// Project uses the legacy `_id`-suffix heuristics.
    pub legacy_pattern_matching: bool,
    /// Absolute distinct-count floor for non-identifier columns.
    pub min_distinct_count: i64,
    /// Minimum distinct/row ratio for non-exempt columns.
    pub min_cardinality_ratio: f64,
    /// Upstream FK confidence above which a column is left to phase 1.
    pub high_confidence_fk: f64,
    /// Minimum distinct/row ratio for a non-PK column to be a join target.
    pub target_uniqueness_ratio: f64,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            legacy_pattern_matching: false,
            min_distinct_count: thresholds::candidate::MIN_DISTINCT_COUNT,
            min_cardinality_ratio: thresholds::candidate::MIN_CARDINALITY_RATIO,
            high_confidence_fk: thresholds::candidate::HIGH_CONFIDENCE_FK,
            target_uniqueness_ratio: thresholds::candidate::TARGET_UNIQUENESS_RATIO,
        }
    }
}

impl CandidateConfig {
    /// Builder: toggle legacy pattern matching.
    pub fn with_legacy_pattern_matching(mut self, enabled: bool) -> Self {
        self.legacy_pattern_matching = enabled;
        self
    }
}

/// Why a column was not taken as an FK candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExclusionReason {
    /// Temporal, boolean, binary, document or spatial type
    ExcludedType,
    /// Marked non-joinable, or joinability unknown
    NotJoinable,
    /// Sole primary key of its table
    PrimaryKey,
    /// Below the absolute distinct-count floor
    LowDistinctCount,
    /// Distinct/row ratio below the minimum
    LowCardinalityRatio,
    /// Classified as a measure
    Measure,
    /// Name matches a legacy non-FK pattern
    ExcludedName(&'static str),
    /// Already the source of a phase-1 or manual relationship
    AlreadyRelated,
    /// Upstream resolved its FK target with high confidence
    ResolvedUpstream,
}

impl std::fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExcludedType => write!(f, "excluded data type"),
            Self::NotJoinable => write!(f, "not joinable"),
            Self::PrimaryKey => write!(f, "sole primary key"),
            Self::LowDistinctCount => write!(f, "distinct count below floor"),
            Self::LowCardinalityRatio => write!(f, "cardinality ratio below minimum"),
            Self::Measure => write!(f, "measure column"),
            Self::ExcludedName(pattern) => write!(f, "name matches '{}'", pattern),
            Self::AlreadyRelated => write!(f, "already related"),
            Self::ResolvedUpstream => write!(f, "resolved by column features"),
        }
    }
}

#[derive(Debug, Clone)]
enum PatternMatcher {
    /// Column name ends with suffix.
    EndsWith(&'static str),
    /// Column name starts with prefix.
    StartsWith(&'static str),
    /// Column name matches any of these.
    AnyOf(&'static [&'static str]),
}

impl PatternMatcher {
    fn matches(&self, name_lower: &str) -> bool {
        match self {
            Self::EndsWith(suffix) => name_lower.ends_with(suffix),
            Self::StartsWith(prefix) => name_lower.starts_with(prefix),
            Self::AnyOf(options) => options.contains(&name_lower),
        }
    }
}

/// A named legacy pattern for columns that are never FKs.
#[derive(Debug, Clone)]
struct ExclusionPattern {
    name: &'static str,
    matcher: PatternMatcher,
}

fn legacy_exclusion_patterns() -> Vec<ExclusionPattern> {
    vec![
        // === Timestamp columns ===
        ExclusionPattern {
            name: "timestamp_suffix",
            matcher: PatternMatcher::EndsWith("_at"),
        },
        ExclusionPattern {
            name: "date_suffix",
            matcher: PatternMatcher::EndsWith("_date"),
        },
        ExclusionPattern {
            name: "time_suffix",
            matcher: PatternMatcher::EndsWith("_time"),
        },
        ExclusionPattern {
            name: "common_timestamps",
            matcher: PatternMatcher::AnyOf(&["created", "updated", "modified", "deleted"]),
        },
        // === Technical columns ===
        ExclusionPattern {
            name: "hash_suffix",
            matcher: PatternMatcher::EndsWith("_hash"),
        },
        ExclusionPattern {
            name: "version",
            matcher: PatternMatcher::AnyOf(&["version", "revision"]),
        },
        // === Counters and measures ===
        ExclusionPattern {
            name: "count_suffix",
            matcher: PatternMatcher::EndsWith("_count"),
        },
        ExclusionPattern {
            name: "num_prefix",
            matcher: PatternMatcher::StartsWith("num_"),
        },
        ExclusionPattern {
            name: "total_suffix",
            matcher: PatternMatcher::EndsWith("_total"),
        },
        ExclusionPattern {
            name: "amount_suffix",
            matcher: PatternMatcher::EndsWith("_amount"),
        },
        ExclusionPattern {
            name: "measures",
            matcher: PatternMatcher::AnyOf(&[
                "count", "amount", "total", "quantity", "price", "rating", "score", "level",
            ]),
        },
        // === Flags ===
        ExclusionPattern {
            name: "flag_prefix",
            matcher: PatternMatcher::StartsWith("is_"),
        },
        ExclusionPattern {
            name: "has_prefix",
            matcher: PatternMatcher::StartsWith("has_"),
        },
    ]
}

/// An FK candidate and the table that owns it.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub column: &'a SchemaColumn,
    pub table: &'a SchemaTable,
}

/// Ordered FK candidates and join targets for one datasource.
#[derive(Debug, Default)]
pub struct CandidateSet<'a> {
    /// FK candidates, `foreign_key`-role columns first.
    pub sources: Vec<Candidate<'a>>,
    /// Join targets, primary keys first.
    pub targets: Vec<Candidate<'a>>,
    /// Columns rejected as FK sources, with the reason.
    pub excluded: Vec<(Uuid, ExclusionReason)>,
}

/// Applies the FK-candidate and target-candidate rules.
#[derive(Debug, Clone)]
pub struct CandidateFilter {
    config: CandidateConfig,
    name_patterns: Vec<ExclusionPattern>,
}

impl CandidateFilter {
    pub fn new(config: CandidateConfig) -> Self {
        let name_patterns = if config.legacy_pattern_matching {
            legacy_exclusion_patterns()
        } else {
            Vec::new()
        };
        Self {
            config,
            name_patterns,
        }
    }

    pub fn config(&self) -> &CandidateConfig {
        &self.config
    }

    /// Check a column against every FK-candidate rule.
    ///
    /// `pk_count` is the number of primary key columns in the owning table;
    /// `related_sources` holds columns already owned by phase 1 or a user.
    pub fn check_fk_candidate(
        &self,
        column: &SchemaColumn,
        table: &SchemaTable,
        pk_count: usize,
        related_sources: &HashSet<Uuid>,
    ) -> Result<(), ExclusionReason> {
        let legacy = self.config.legacy_pattern_matching;
        let identifier = column.is_identifier();
        let id_suffix = column.has_id_suffix();

        if is_excluded_type(&column.data_type) {
            return Err(ExclusionReason::ExcludedType);
        }

        let joinable = match column.is_joinable {
            Some(flag) => flag,
            None => legacy && id_suffix,
        };
        if !joinable {
            return Err(ExclusionReason::NotJoinable);
        }

        // A single-column PK identifies its own rows; composite PK members
        // are usually references (link tables).
        if column.is_primary_key && pk_count == 1 && !column.is_foreign_key_role() {
            return Err(ExclusionReason::PrimaryKey);
        }

        if column.is_measure() {
            return Err(ExclusionReason::Measure);
        }

        if legacy && !identifier {
            let name_lower = column.column_name.to_lowercase();
            if let Some(pattern) = self
                .name_patterns
                .iter()
                .find(|p| p.matcher.matches(&name_lower))
            {
                return Err(ExclusionReason::ExcludedName(pattern.name));
            }
        }

        if !identifier {
            match column.distinct_count {
                Some(distinct) if distinct >= self.config.min_distinct_count => {}
                _ => return Err(ExclusionReason::LowDistinctCount),
            }
        }

        let ratio_exempt = identifier || (legacy && id_suffix);
        if !ratio_exempt {
            if let (Some(distinct), Some(rows)) = (column.distinct_count, table.row_count) {
                if rows > 0 && (distinct as f64 / rows as f64) < self.config.min_cardinality_ratio
                {
                    return Err(ExclusionReason::LowCardinalityRatio);
                }
            }
        }

        if related_sources.contains(&column.id) {
            return Err(ExclusionReason::AlreadyRelated);
        }

        if column
            .resolved_fk_confidence()
            .is_some_and(|confidence| confidence > self.config.high_confidence_fk)
        {
            return Err(ExclusionReason::ResolvedUpstream);
        }

        Ok(())
    }

    /// Whether a column may be a join target.
    ///
    /// Purpose is deliberately ignored: a primary key is always a valid
    /// target even when it looks like a count.
    pub fn is_target_candidate(&self, column: &SchemaColumn, table: &SchemaTable) -> bool {
        if is_excluded_type(&column.data_type) || column.is_joinable == Some(false) {
            return false;
        }
        if column.is_primary_key {
            return true;
        }

        let Some(distinct) = column.distinct_count else {
            return false;
        };
        if distinct < self.config.min_distinct_count {
            return false;
        }
        match table.row_count {
            Some(rows) if rows > 0 => {
                distinct as f64 / rows as f64 >= self.config.target_uniqueness_ratio
            }
            _ => true,
        }
    }

    /// Select and order FK candidates and join targets.
    pub fn select<'a>(
        &self,
        snapshot: &'a SchemaSnapshot,
        related_sources: &HashSet<Uuid>,
    ) -> CandidateSet<'a> {
        let mut set = CandidateSet::default();

        for column in snapshot.columns() {
            let Some(table) = snapshot.table_of(column) else {
                continue;
            };
            let candidate = Candidate { column, table };

            match self.check_fk_candidate(
                column,
                table,
                snapshot.primary_key_count(table.id),
                related_sources,
            ) {
                Ok(()) => set.sources.push(candidate),
                Err(reason) => set.excluded.push((column.id, reason)),
            }

            if self.is_target_candidate(column, table) {
                set.targets.push(candidate);
            }
        }

        // Stable sorts keep snapshot order within each group.
        set.sources.sort_by_key(|c| !c.column.is_foreign_key_role());
        set.targets.sort_by_key(|c| !c.column.is_primary_key);
        set
    }
}
