//! Deterministic relationship discovery.
//!
//! Infers foreign-key relationships between the tables of one datasource and
//! writes them to the relationship store.
//!
//! # Architecture
//!
//! Discovery runs in two sequential phases over a [`SchemaSnapshot`]:
//!
//! 1. **FK resolution** ([`FkResolver`]) - turns evidence that already names
//!    a target (declared constraints, resolved column features) into
//!    validated relationships. The join validator is only asked for
//!    cardinality.
//! 2. **PK matching** ([`PkMatchDiscoverer`]) - blind search over the
//!    remaining columns. Every candidate pair is validated against live data
//!    and only accepted when every source value resolves.
//!
//! Both phases upsert on `(source column, target column)`, so re-runs
//! converge instead of duplicating.
//!
//! # Example
//!
//! ```ignore
//! use ontology_engine::discovery::RelationshipDiscovery;
//!
//! let discovery = RelationshipDiscovery::new(store, datasource);
//! let report = discovery.run(project_id, datasource_id, &cancel).await?;
//! ```

pub mod acceptance;
pub mod bidirectional;
pub mod candidates;
pub mod cardinality;
mod engine;
pub mod fk_resolver;
pub mod metrics;
pub mod pk_match;
pub mod snapshot;
pub mod types;

pub use acceptance::{AcceptanceConfig, Rejection};
pub use bidirectional::BidirectionalBuilder;
pub use candidates::{CandidateConfig, CandidateFilter, CandidateSet, ExclusionReason};
pub use cardinality::infer_cardinality;
pub use engine::{DiscoveryReport, RelationshipDiscovery};
pub use fk_resolver::FkResolver;
pub use metrics::MetricsRecorder;
pub use pk_match::PkMatchDiscoverer;
pub use snapshot::SchemaSnapshot;
pub use types::{are_types_compatible, is_excluded_type, normalize_type, TypeFamily};

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::datasource::{DatasourceResult, JoinAnalysis, JoinPair, JoinValidator};
use crate::store::StoreError;

/// Named thresholds used across discovery.
pub mod thresholds {
    /// FK and target candidate selection.
    pub mod candidate {
        /// Absolute distinct-count floor for non-identifier FK candidates.
        pub const MIN_DISTINCT_COUNT: i64 = 20;
        /// Minimum distinct/row ratio for FK candidates.
        pub const MIN_CARDINALITY_RATIO: f64 = 0.05;
        /// Upstream FK confidence above which phase 2 leaves a column alone.
        pub const HIGH_CONFIDENCE_FK: f64 = 0.8;
        /// Minimum distinct/row ratio for a non-PK join target.
        pub const TARGET_UNIQUENESS_RATIO: f64 = 0.95;
    }

    /// Join acceptance.
    pub mod acceptance {
        /// Maximum share of target rows the source may leave unreferenced.
        pub const MAX_REVERSE_ORPHAN_RATIO: f64 = 0.5;
        /// Source values at or below this are "small integers".
        pub const SMALL_INTEGER_MAX: i64 = 20;
        /// Targets with at most this many rows are lookup tables.
        pub const LOOKUP_TABLE_MAX_DISTINCT: i64 = 50;
    }

    /// Cardinality inference.
    pub mod cardinality {
        /// Rows per matched value above which a side counts as repeated.
        pub const REPETITION_TOLERANCE: f64 = 1.1;
    }

    /// Confidence scores.
    pub mod confidence {
        /// Starting confidence for a validated pk-match.
        pub const PK_MATCH_BASE: f64 = 0.70;
        /// Target is a primary key.
        pub const PRIMARY_KEY_BOOST: f64 = 0.15;
        /// Source column is classified as a foreign key.
        pub const FK_ROLE_BOOST: f64 = 0.05;
        /// Upstream features named the target table.
        pub const HINT_BOOST: f64 = 0.05;
        /// Source references most of the target.
        pub const COVERAGE_BOOST: f64 = 0.05;
        /// Target coverage that earns [`COVERAGE_BOOST`].
        pub const COVERAGE_THRESHOLD: f64 = 0.8;
        /// Inferred relationships are never certain.
        pub const INFERENCE_CAP: f64 = 0.95;
        /// Declared constraints are certain.
        pub const DB_CONSTRAINT: f64 = 1.0;
    }
}

/// Errors that abort a discovery run.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Reading or writing the relationship store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The run was cancelled.
    #[error("discovery cancelled")]
    Cancelled,
}

impl DiscoveryError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type for discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Outcome of phase 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FkDiscoveryResult {
    /// Relationships written by this phase.
    pub fk_relationships: usize,
    /// Of which came from resolved column features.
    pub from_column_features: usize,
    /// Of which came from declared constraints.
    pub from_constraints: usize,
    /// Join validator failures that fell back to N:1.
    pub cardinality_fallbacks: usize,
    /// Evidence left alone because a user owns the pair.
    pub skipped_manual: usize,
    /// Feature hints naming a table or column not in the snapshot.
    pub skipped_unresolved: usize,
}

/// Why candidate pairs were rejected in phase 2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RejectionCounts {
    pub orphans: usize,
    pub reverse_orphans: usize,
    pub small_integer: usize,
    pub no_match: usize,
    pub validator_error: usize,
}

impl RejectionCounts {
    pub fn total(&self) -> usize {
        self.orphans + self.reverse_orphans + self.small_integer + self.no_match + self.validator_error
    }
}

/// Outcome of phase 2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PkMatchResult {
    /// Relationships written by this phase.
    pub inferred_relationships: usize,
    /// FK candidates that passed the filter.
    pub candidates_evaluated: usize,
    /// Join validator calls made.
    pub pairs_tested: usize,
    pub rejections: RejectionCounts,
}

/// Receives progress updates from a running phase.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, current: usize, total: usize, message: &str);
}

/// Discards progress updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _current: usize, _total: usize, _message: &str) {}
}

/// Emits progress updates as `tracing` debug events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn report(&self, current: usize, total: usize, message: &str) {
        tracing::debug!(current, total, "{}", message);
    }
}

/// Fail with [`DiscoveryError::Cancelled`] once the token has fired.
pub(crate) fn ensure_active(cancel: &CancellationToken) -> DiscoveryResult<()> {
    if cancel.is_cancelled() {
        return Err(DiscoveryError::Cancelled);
    }
    Ok(())
}

/// Run one join analysis, racing it against cancellation.
///
/// The outer result carries cancellation only; validator failures are
/// returned in the inner result for the caller's phase-specific recovery.
pub(crate) async fn analyze_join<V>(
    validator: &V,
    pair: &JoinPair,
    cancel: &CancellationToken,
) -> DiscoveryResult<DatasourceResult<JoinAnalysis>>
where
    V: JoinValidator + ?Sized,
{
    ensure_active(cancel)?;
    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
        result = validator.analyze_join(pair, cancel) => result,
    };
    match outcome {
        Err(err) if err.is_cancelled() => Err(DiscoveryError::Cancelled),
        other => Ok(other),
    }
}
