//! Acceptance rules for a validated join.
//!
//! A pk-match candidate is only accepted when the live data supports it:
//! every source value must exist in the target, the source must reference a
//! meaningful share of the target, and a narrow integer range must not be
//! matched into a large unrelated key sequence.

use super::thresholds::acceptance as limits;
use crate::datasource::JoinAnalysis;

/// Tunable limits for [`AcceptanceConfig::evaluate`].
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptanceConfig {
    pub max_reverse_orphan_ratio: f64,
    pub small_integer_max: i64,
    pub lookup_table_max_distinct: i64,
}

impl Default for AcceptanceConfig {
    fn default() -> Self {
        Self {
            max_reverse_orphan_ratio: limits::MAX_REVERSE_ORPHAN_RATIO,
            small_integer_max: limits::SMALL_INTEGER_MAX,
            lookup_table_max_distinct: limits::LOOKUP_TABLE_MAX_DISTINCT,
        }
    }
}

/// Why a join was not accepted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    /// No source row resolved in the target.
    NoMatch,
    /// Source rows whose value is missing from the target.
    Orphans(i64),
    /// Small source values against a target that is not a lookup table.
    SmallInteger { max_value: i64, target_distinct: i64 },
    /// Share of target rows the source never references.
    ReverseOrphans(f64),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::NoMatch => write!(f, "no matching values"),
            Rejection::Orphans(count) => write!(f, "{} orphaned source rows", count),
            Rejection::SmallInteger {
                max_value,
                target_distinct,
            } => write!(
                f,
                "small integer range (max {}) against {} target rows",
                max_value, target_distinct
            ),
            Rejection::ReverseOrphans(ratio) => {
                write!(f, "{:.0}% of target rows unreferenced", ratio * 100.0)
            }
        }
    }
}

impl AcceptanceConfig {
    /// Accept or reject a join.
    ///
    /// Rules are checked in order: no match, orphans, small-integer guard,
    /// reverse-orphan bound.
    pub fn evaluate(&self, analysis: &JoinAnalysis) -> Result<(), Rejection> {
        if analysis.source_matched <= 0 {
            return Err(Rejection::NoMatch);
        }

        if analysis.orphan_count > 0 {
            return Err(Rejection::Orphans(analysis.orphan_count));
        }

        if let Some(max_value) = analysis.max_source_value {
            let target_distinct = analysis.target_distinct();
            let small = max_value <= self.small_integer_max && max_value < target_distinct;
            let lookup = target_distinct <= self.lookup_table_max_distinct;
            if small && !lookup {
                return Err(Rejection::SmallInteger {
                    max_value,
                    target_distinct,
                });
            }
        }

        let ratio = analysis.reverse_orphan_ratio();
        if ratio > self.max_reverse_orphan_ratio {
            return Err(Rejection::ReverseOrphans(ratio));
        }

        Ok(())
    }
}
