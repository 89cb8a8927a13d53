//! Phase 2: blind PK matching.
//!
//! Proposes `candidate -> target` pairs the FK resolver did not cover and
//! validates each against live data. Candidates are evaluated in a fixed
//! order and the first accepted target wins, so re-runs over an unchanged
//! schema make the same choices.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::acceptance::{AcceptanceConfig, Rejection};
use super::candidates::{Candidate, CandidateFilter};
use super::cardinality::infer_cardinality;
use super::metrics::MetricsRecorder;
use super::snapshot::SchemaSnapshot;
use super::thresholds::confidence;
use super::types::are_types_compatible;
use super::{analyze_join, ensure_active, DiscoveryResult, PkMatchResult, RejectionCounts};
use super::{NoopProgress, ProgressReporter};
use crate::datasource::{JoinAnalysis, JoinPair, JoinValidator};
use crate::model::{InferenceMethod, SchemaRelationship};
use crate::store::SchemaRepository;

/// Discovers relationships by validating candidate pairs against live data.
pub struct PkMatchDiscoverer<'a, R: ?Sized, V: ?Sized> {
    repository: &'a R,
    validator: &'a V,
    filter: CandidateFilter,
    acceptance: AcceptanceConfig,
    progress: &'a dyn ProgressReporter,
}

impl<'a, R, V> PkMatchDiscoverer<'a, R, V>
where
    R: SchemaRepository + ?Sized,
    V: JoinValidator + ?Sized,
{
    pub fn new(repository: &'a R, validator: &'a V, filter: CandidateFilter) -> Self {
        Self {
            repository,
            validator,
            filter,
            acceptance: AcceptanceConfig::default(),
            progress: &NoopProgress,
        }
    }

    /// Builder: override the acceptance limits.
    pub fn with_acceptance(mut self, acceptance: AcceptanceConfig) -> Self {
        self.acceptance = acceptance;
        self
    }

    /// Builder: report progress per candidate.
    pub fn with_progress(mut self, progress: &'a dyn ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Load the datasource's snapshot and run PK matching over it.
    pub async fn discover(
        &self,
        datasource_id: Uuid,
        cancel: &CancellationToken,
    ) -> DiscoveryResult<PkMatchResult> {
        ensure_active(cancel)?;
        let tables = self.repository.list_tables(datasource_id).await?;
        let columns = self.repository.list_columns(datasource_id).await?;
        let existing = self
            .repository
            .list_existing_relationships(datasource_id)
            .await?;

        let snapshot = SchemaSnapshot::new(tables, columns);
        self.discover_snapshot(datasource_id, &snapshot, &existing, cancel)
            .await
    }

    /// Run PK matching over an already-loaded snapshot.
    ///
    /// `existing` must include everything phase 1 wrote; their source
    /// columns are not re-examined.
    pub async fn discover_snapshot(
        &self,
        datasource_id: Uuid,
        snapshot: &SchemaSnapshot,
        existing: &[SchemaRelationship],
        cancel: &CancellationToken,
    ) -> DiscoveryResult<PkMatchResult> {
        let mut result = PkMatchResult::default();

        let related_sources: HashSet<Uuid> = existing
            .iter()
            .filter(|r| {
                r.is_manual()
                    || r
                        .inference_method
                        .is_some_and(|method| method.is_resolver_origin())
            })
            .map(|r| r.source_column_id)
            .collect();

        let candidates = self.filter.select(snapshot, &related_sources);
        for (column_id, reason) in &candidates.excluded {
            if let Some(column) = snapshot.column(*column_id) {
                debug!(column = %column.column_name, reason = %reason, "not a candidate");
            }
        }

        info!(
            datasource_id = %datasource_id,
            candidates = candidates.sources.len(),
            targets = candidates.targets.len(),
            "matching candidate columns against keys"
        );

        let recorder = MetricsRecorder::new(self.repository);
        let total = candidates.sources.len();

        for (index, source) in candidates.sources.iter().enumerate() {
            ensure_active(cancel)?;
            result.candidates_evaluated += 1;

            let Some(source_ref) = snapshot.column_ref(source.column) else {
                continue;
            };
            self.progress
                .report(index + 1, total, &source_ref.to_string());

            let hint = source
                .column
                .fk_target_hint()
                .and_then(|reference| snapshot.find_table(reference))
                .map(|table| table.id);

            for target in ordered_targets(source, &candidates.targets, hint) {
                let Some(target_ref) = snapshot.column_ref(target.column) else {
                    continue;
                };
                let pair = JoinPair::new(source_ref.clone(), target_ref);
                result.pairs_tested += 1;

                let analysis = match analyze_join(self.validator, &pair, cancel).await? {
                    Ok(analysis) => analysis,
                    Err(err) => {
                        debug!(pair = %pair, error = %err, "join analysis failed, skipping pair");
                        result.rejections.validator_error += 1;
                        continue;
                    }
                };

                if let Err(rejection) = self.acceptance.evaluate(&analysis) {
                    debug!(pair = %pair, reason = %rejection, "rejected");
                    count_rejection(&mut result.rejections, &rejection);
                    continue;
                }

                let hinted = hint == Some(target.table.id);
                let cardinality = infer_cardinality(&analysis);
                let relationship = SchemaRelationship::discovered(
                    datasource_id,
                    source.column,
                    target.column,
                    InferenceMethod::PkMatch,
                    score(source, target, hinted, &analysis),
                    cardinality,
                );
                recorder.record(&relationship, &analysis).await?;

                debug!(
                    pair = %pair,
                    cardinality = %cardinality,
                    confidence = relationship.confidence,
                    "accepted"
                );
                result.inferred_relationships += 1;
                break;
            }
        }

        info!(
            datasource_id = %datasource_id,
            relationships = result.inferred_relationships,
            pairs_tested = result.pairs_tested,
            rejected = result.rejections.total(),
            "pk matching complete"
        );
        Ok(result)
    }
}

/// Targets to try for `source`, in evaluation order.
///
/// Targets in the hinted table come first; otherwise the candidate set's
/// order (primary keys first) is kept. The source column itself and
/// type-incompatible targets are dropped.
fn ordered_targets<'c, 's>(
    source: &Candidate<'s>,
    targets: &'c [Candidate<'s>],
    hint: Option<Uuid>,
) -> Vec<&'c Candidate<'s>> {
    let mut ordered: Vec<&Candidate<'s>> = targets
        .iter()
        .filter(|t| t.column.id != source.column.id)
        .filter(|t| are_types_compatible(&source.column.data_type, &t.column.data_type))
        .collect();
    if hint.is_some() {
        ordered.sort_by_key(|t| Some(t.table.id) != hint);
    }
    ordered
}

/// Confidence for an accepted pk-match.
fn score(source: &Candidate<'_>, target: &Candidate<'_>, hinted: bool, analysis: &JoinAnalysis) -> f64 {
    let mut score = confidence::PK_MATCH_BASE;
    if target.column.is_primary_key {
        score += confidence::PRIMARY_KEY_BOOST;
    }
    if source.column.is_foreign_key_role() {
        score += confidence::FK_ROLE_BOOST;
    }
    if hinted {
        score += confidence::HINT_BOOST;
    }
    if analysis.target_coverage() >= confidence::COVERAGE_THRESHOLD {
        score += confidence::COVERAGE_BOOST;
    }
    score.min(confidence::INFERENCE_CAP)
}

fn count_rejection(counts: &mut RejectionCounts, rejection: &Rejection) {
    match rejection {
        Rejection::NoMatch => counts.no_match += 1,
        Rejection::Orphans(_) => counts.orphans += 1,
        Rejection::SmallInteger { .. } => counts.small_integer += 1,
        Rejection::ReverseOrphans(_) => counts.reverse_orphans += 1,
    }
}
