//! Phase 1: resolve relationships whose target is already known.
//!
//! Two evidence sources name a target outright: declared FK constraints
//! (existing `foreign_key` relationships) and column features whose
//! extraction resolved an FK target. Existence is not in question for
//! either, so the join validator is only consulted for cardinality and a
//! failed call falls back to N:1.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::cardinality::infer_cardinality;
use super::snapshot::SchemaSnapshot;
use super::{analyze_join, ensure_active, DiscoveryResult, FkDiscoveryResult};
use super::{NoopProgress, ProgressReporter};
use crate::datasource::{JoinPair, JoinValidator};
use crate::model::{Cardinality, InferenceMethod, SchemaColumn, SchemaRelationship};
use crate::store::SchemaRepository;

/// Cardinality assumed when the join validator cannot answer.
const FALLBACK_CARDINALITY: Cardinality = Cardinality::ManyToOne;

/// A relationship whose source and target are already known.
struct ResolvedFk<'s> {
    method: InferenceMethod,
    source: &'s SchemaColumn,
    target: &'s SchemaColumn,
    confidence: f64,
    /// Row being re-validated, for declared constraints.
    existing: Option<&'s SchemaRelationship>,
}

impl ResolvedFk<'_> {
    fn into_relationship(self, datasource_id: Uuid, cardinality: Cardinality) -> SchemaRelationship {
        match self.existing {
            Some(existing) => SchemaRelationship {
                cardinality,
                is_validated: true,
                ..existing.clone()
            },
            None => SchemaRelationship::discovered(
                datasource_id,
                self.source,
                self.target,
                self.method,
                self.confidence,
                cardinality,
            ),
        }
    }
}

/// Resolves declared and feature-derived FKs into validated relationships.
pub struct FkResolver<'a, R: ?Sized, V: ?Sized> {
    repository: &'a R,
    validator: &'a V,
    progress: &'a dyn ProgressReporter,
}

impl<'a, R, V> FkResolver<'a, R, V>
where
    R: SchemaRepository + ?Sized,
    V: JoinValidator + ?Sized,
{
    pub fn new(repository: &'a R, validator: &'a V) -> Self {
        Self {
            repository,
            validator,
            progress: &NoopProgress,
        }
    }

    /// Builder: report progress per evidence item.
    pub fn with_progress(mut self, progress: &'a dyn ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Load the datasource's snapshot and resolve all FK evidence.
    pub async fn resolve(
        &self,
        datasource_id: Uuid,
        cancel: &CancellationToken,
    ) -> DiscoveryResult<FkDiscoveryResult> {
        ensure_active(cancel)?;
        let tables = self.repository.list_tables(datasource_id).await?;
        let columns = self.repository.list_columns(datasource_id).await?;
        let existing = self
            .repository
            .list_existing_relationships(datasource_id)
            .await?;

        let snapshot = SchemaSnapshot::new(tables, columns);
        self.resolve_snapshot(datasource_id, &snapshot, &existing, cancel)
            .await
    }

    /// Resolve FK evidence over an already-loaded snapshot.
    pub async fn resolve_snapshot(
        &self,
        datasource_id: Uuid,
        snapshot: &SchemaSnapshot,
        existing: &[SchemaRelationship],
        cancel: &CancellationToken,
    ) -> DiscoveryResult<FkDiscoveryResult> {
        let mut result = FkDiscoveryResult::default();

        let manual_pairs: HashSet<(Uuid, Uuid)> = existing
            .iter()
            .filter(|r| r.is_manual())
            .map(|r| r.column_pair())
            .collect();

        let mut evidence = Vec::new();
        collect_feature_evidence(snapshot, &mut evidence, &mut result);
        collect_constraint_evidence(snapshot, existing, &mut evidence, &mut result);

        evidence.retain(|fk| {
            let manual = manual_pairs.contains(&(fk.source.id, fk.target.id));
            if manual {
                debug!(
                    source = %fk.source.column_name,
                    target = %fk.target.column_name,
                    "pair is user-managed, leaving it alone"
                );
                result.skipped_manual += 1;
            }
            !manual
        });

        info!(
            datasource_id = %datasource_id,
            evidence = evidence.len(),
            "resolving foreign keys"
        );

        let total = evidence.len();
        for (index, fk) in evidence.into_iter().enumerate() {
            ensure_active(cancel)?;

            let (Some(source_ref), Some(target_ref)) =
                (snapshot.column_ref(fk.source), snapshot.column_ref(fk.target))
            else {
                result.skipped_unresolved += 1;
                continue;
            };
            let pair = JoinPair::new(source_ref, target_ref);
            self.progress.report(index + 1, total, &pair.to_string());

            let cardinality = match analyze_join(self.validator, &pair, cancel).await? {
                Ok(analysis) => infer_cardinality(&analysis),
                Err(err) => {
                    warn!(
                        pair = %pair,
                        error = %err,
                        "join analysis failed, assuming N:1"
                    );
                    result.cardinality_fallbacks += 1;
                    FALLBACK_CARDINALITY
                }
            };

            let method = fk.method;
            let relationship = fk.into_relationship(datasource_id, cardinality);
            self.repository.upsert_relationship(&relationship).await?;

            debug!(
                pair = %pair,
                method = %method,
                cardinality = %cardinality,
                "resolved foreign key"
            );
            result.fk_relationships += 1;
            match method {
                InferenceMethod::ColumnFeatures => result.from_column_features += 1,
                InferenceMethod::ForeignKey => result.from_constraints += 1,
                InferenceMethod::PkMatch => {}
            }
        }

        info!(
            datasource_id = %datasource_id,
            relationships = result.fk_relationships,
            fallbacks = result.cardinality_fallbacks,
            "foreign key resolution complete"
        );
        Ok(result)
    }
}

/// Columns whose features resolved an FK target present in the snapshot.
fn collect_feature_evidence<'s>(
    snapshot: &'s SchemaSnapshot,
    evidence: &mut Vec<ResolvedFk<'s>>,
    result: &mut FkDiscoveryResult,
) {
    for source in snapshot.columns() {
        let Some(features) = source.features.as_ref().filter(|f| f.has_resolved_fk()) else {
            continue;
        };
        let (Some(table_ref), Some(confidence)) =
            (features.fk_target_table.as_deref(), features.fk_confidence)
        else {
            continue;
        };

        let Some(table) = snapshot.find_table(table_ref) else {
            debug!(
                column = %source.column_name,
                target_table = table_ref,
                "feature target table not in snapshot"
            );
            result.skipped_unresolved += 1;
            continue;
        };

        let target = match features.fk_target_column.as_deref() {
            Some(name) => snapshot.find_column(table.id, name),
            None => snapshot.single_primary_key(table.id),
        };
        let Some(target) = target.filter(|t| t.id != source.id) else {
            debug!(
                column = %source.column_name,
                target_table = table_ref,
                "feature target column not resolvable"
            );
            result.skipped_unresolved += 1;
            continue;
        };

        evidence.push(ResolvedFk {
            method: InferenceMethod::ColumnFeatures,
            source,
            target,
            confidence,
            existing: None,
        });
    }
}

/// Declared constraints recorded as `foreign_key` relationships.
fn collect_constraint_evidence<'s>(
    snapshot: &'s SchemaSnapshot,
    existing: &'s [SchemaRelationship],
    evidence: &mut Vec<ResolvedFk<'s>>,
    result: &mut FkDiscoveryResult,
) {
    let declared = existing
        .iter()
        .filter(|r| !r.is_manual() && r.inference_method == Some(InferenceMethod::ForeignKey));

    for relationship in declared {
        let (Some(source), Some(target)) = (
            snapshot.column(relationship.source_column_id),
            snapshot.column(relationship.target_column_id),
        ) else {
            result.skipped_unresolved += 1;
            continue;
        };

        evidence.push(ResolvedFk {
            method: InferenceMethod::ForeignKey,
            source,
            target,
            confidence: relationship.confidence,
            existing: Some(relationship),
        });
    }
}
