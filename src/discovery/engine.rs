//! Discovery facade running both phases in order.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use super::acceptance::AcceptanceConfig;
use super::candidates::{CandidateConfig, CandidateFilter};
use super::fk_resolver::FkResolver;
use super::pk_match::PkMatchDiscoverer;
use super::{DiscoveryResult, FkDiscoveryResult, NoopProgress, PkMatchResult, ProgressReporter};
use crate::datasource::JoinValidator;
use crate::store::{ProjectSettings, SchemaRepository};

/// Outcome of a full discovery run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    pub fk: FkDiscoveryResult,
    pub pk_match: PkMatchResult,
    pub legacy_pattern_matching: bool,
    pub elapsed_ms: u64,
}

impl DiscoveryReport {
    /// Relationships written across both phases.
    pub fn total_relationships(&self) -> usize {
        self.fk.fk_relationships + self.pk_match.inferred_relationships
    }
}

/// Relationship discovery over one store and one join validator.
///
/// Phase 1 ([`FkResolver`]) must run before phase 2 ([`PkMatchDiscoverer`]);
/// [`RelationshipDiscovery::run`] does both. Runs for the same datasource
/// must not overlap.
pub struct RelationshipDiscovery<S, V> {
    store: Arc<S>,
    validator: Arc<V>,
    candidates: CandidateConfig,
    acceptance: AcceptanceConfig,
    progress: Arc<dyn ProgressReporter>,
    legacy_override: Option<bool>,
}

impl<S, V> RelationshipDiscovery<S, V>
where
    S: SchemaRepository,
    V: JoinValidator,
{
    pub fn new(store: Arc<S>, validator: Arc<V>) -> Self {
        Self {
            store,
            validator,
            candidates: CandidateConfig::default(),
            acceptance: AcceptanceConfig::default(),
            progress: Arc::new(NoopProgress),
            legacy_override: None,
        }
    }

    /// Builder: candidate thresholds. The legacy flag is still taken from
    /// project settings by [`run`](Self::run) unless overridden.
    pub fn with_candidate_config(mut self, config: CandidateConfig) -> Self {
        self.candidates = config;
        self
    }

    pub fn with_acceptance(mut self, config: AcceptanceConfig) -> Self {
        self.acceptance = config;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Builder: use this legacy mode for [`run`](Self::run) instead of the
    /// project setting. The setting itself is left unchanged.
    pub fn with_legacy_pattern_matching(mut self, enabled: bool) -> Self {
        self.legacy_override = Some(enabled);
        self
    }

    /// Phase 1: resolve declared and feature-derived FKs.
    pub async fn discover_fk_relationships(
        &self,
        datasource_id: Uuid,
        cancel: &CancellationToken,
    ) -> DiscoveryResult<FkDiscoveryResult> {
        FkResolver::new(self.store.as_ref(), self.validator.as_ref())
            .with_progress(self.progress.as_ref())
            .resolve(datasource_id, cancel)
            .await
    }

    /// Phase 2: PK matching with explicit legacy mode.
    pub async fn discover_pk_matches(
        &self,
        datasource_id: Uuid,
        legacy_pattern_matching: bool,
        cancel: &CancellationToken,
    ) -> DiscoveryResult<PkMatchResult> {
        let config = self
            .candidates
            .clone()
            .with_legacy_pattern_matching(legacy_pattern_matching);

        PkMatchDiscoverer::new(
            self.store.as_ref(),
            self.validator.as_ref(),
            CandidateFilter::new(config),
        )
        .with_acceptance(self.acceptance.clone())
        .with_progress(self.progress.as_ref())
        .discover(datasource_id, cancel)
        .await
    }
}

impl<S, V> RelationshipDiscovery<S, V>
where
    S: SchemaRepository + ProjectSettings,
    V: JoinValidator,
{
    /// Run phase 1 then phase 2 for a datasource of `project_id`.
    pub async fn run(
        &self,
        project_id: Uuid,
        datasource_id: Uuid,
        cancel: &CancellationToken,
    ) -> DiscoveryResult<DiscoveryReport> {
        let started = Instant::now();
        let legacy = match self.legacy_override {
            Some(enabled) => enabled,
            None => self.store.use_legacy_pattern_matching(project_id).await?,
        };

        info!(
            project_id = %project_id,
            datasource_id = %datasource_id,
            legacy_pattern_matching = legacy,
            "starting relationship discovery"
        );

        let fk = self.discover_fk_relationships(datasource_id, cancel).await?;
        let pk_match = self
            .discover_pk_matches(datasource_id, legacy, cancel)
            .await?;

        let report = DiscoveryReport {
            fk,
            pk_match,
            legacy_pattern_matching: legacy,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            datasource_id = %datasource_id,
            relationships = report.total_relationships(),
            elapsed_ms = report.elapsed_ms,
            "relationship discovery complete"
        );
        Ok(report)
    }
}
