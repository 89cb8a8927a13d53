//! Audit metrics for accepted relationships.

use crate::datasource::JoinAnalysis;
use crate::model::{DiscoveryMetrics, SchemaRelationship};
use crate::store::{SchemaRepository, StoreResult};

impl DiscoveryMetrics {
    /// Evidence recorded for a join accepted by pk matching.
    pub fn from_analysis(analysis: &JoinAnalysis) -> Self {
        Self {
            match_rate: analysis.match_rate(),
            source_distinct: analysis.source_distinct(),
            target_distinct: analysis.target_matched,
            matched_count: analysis.source_matched,
        }
    }
}

/// Persists relationships together with their join evidence.
pub struct MetricsRecorder<'a, R: ?Sized> {
    repository: &'a R,
}

impl<'a, R> MetricsRecorder<'a, R>
where
    R: SchemaRepository + ?Sized,
{
    pub fn new(repository: &'a R) -> Self {
        Self { repository }
    }

    /// Upsert `relationship` and store the metrics derived from `analysis`.
    pub async fn record(
        &self,
        relationship: &SchemaRelationship,
        analysis: &JoinAnalysis,
    ) -> StoreResult<DiscoveryMetrics> {
        let metrics = DiscoveryMetrics::from_analysis(analysis);
        self.repository
            .upsert_relationship_with_metrics(relationship, &metrics)
            .await?;
        Ok(metrics)
    }
}
