//! Datasource collaborators.
//!
//! Discovery never computes join statistics itself. A datasource-specific
//! [`JoinValidator`] runs the statistics queries against the customer's live
//! database and hands back a [`JoinAnalysis`].
//!
//! ```text
//! ┌──────────────────────┐   JoinPair    ┌──────────────────────────┐
//! │ RelationshipDiscovery│ ────────────▶ │ JoinValidator            │
//! │  (phase 1 / phase 2) │ ◀──────────── │  - SqliteDatasource      │
//! └──────────────────────┘  JoinAnalysis │  - (other drivers)       │
//!                                        └──────────────────────────┘
//! ```

mod error;
pub mod sqlite;

pub use error::{DatasourceError, DatasourceResult};
pub use sqlite::{SchemaScan, SqliteDatasource};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::model::ColumnRef;

/// A candidate join between two columns, named physically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinPair {
    pub source: ColumnRef,
    pub target: ColumnRef,
}

impl JoinPair {
    pub fn new(source: ColumnRef, target: ColumnRef) -> Self {
        Self { source, target }
    }
}

impl std::fmt::Display for JoinPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

/// Join statistics for a source/target column pair.
///
/// Source-side counts are non-null source rows; target-side counts are
/// non-null target rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinAnalysis {
    /// Rows produced by the inner join.
    pub join_count: i64,
    /// Source rows whose value exists in the target.
    pub source_matched: i64,
    /// Target rows referenced by at least one source row.
    pub target_matched: i64,
    /// Source rows whose value is absent from the target.
    pub orphan_count: i64,
    /// Target rows never referenced by the source.
    pub reverse_orphan_count: i64,
    /// Largest integer value on the source side, when the column is integral.
    pub max_source_value: Option<i64>,
}

impl JoinAnalysis {
    /// Source rows considered (matched plus orphaned).
    pub fn source_distinct(&self) -> i64 {
        self.source_matched + self.orphan_count
    }

    /// Target rows considered (referenced plus unreferenced).
    pub fn target_distinct(&self) -> i64 {
        self.target_matched + self.reverse_orphan_count
    }

    /// Fraction of source rows that resolve in the target.
    pub fn match_rate(&self) -> f64 {
        let total = self.source_distinct();
        if total == 0 {
            return 0.0;
        }
        self.source_matched as f64 / total as f64
    }

    /// Fraction of target rows never referenced by the source.
    pub fn reverse_orphan_ratio(&self) -> f64 {
        let total = self.target_distinct();
        if total == 0 {
            return 0.0;
        }
        self.reverse_orphan_count as f64 / total as f64
    }

    /// Fraction of target rows referenced by the source.
    pub fn target_coverage(&self) -> f64 {
        let total = self.target_distinct();
        if total == 0 {
            return 0.0;
        }
        self.target_matched as f64 / total as f64
    }
}

/// Computes join statistics against a live datasource.
///
/// Implementations must honour `cancel`: once it fires, the in-flight query
/// should be abandoned and [`DatasourceError::Cancelled`] returned.
#[async_trait]
pub trait JoinValidator: Send + Sync {
    async fn analyze_join(
        &self,
        pair: &JoinPair,
        cancel: &CancellationToken,
    ) -> DatasourceResult<JoinAnalysis>;
}
