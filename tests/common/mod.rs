//! Shared fixtures for discovery integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ontology_engine::datasource::{
    DatasourceError, DatasourceResult, JoinAnalysis, JoinPair, JoinValidator, SchemaScan,
};
use ontology_engine::model::{
    Cardinality, ColumnFeatures, ColumnPurpose, ColumnRole, DiscoveryMetrics, InferenceMethod,
    RelationshipType, SchemaColumn, SchemaRelationship, SchemaTable,
};
use ontology_engine::store::{
    ProjectSettings, SchemaRepository, SqliteStore, StoreError, StoreResult,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// =============================================================================
// Schema fixture
// =============================================================================

/// A datasource registered in an in-memory store, built up table by table.
pub struct Fixture {
    pub store: Arc<SqliteStore>,
    pub project_id: Uuid,
    pub datasource_id: Uuid,
    pub tables: Vec<SchemaTable>,
    pub columns: Vec<SchemaColumn>,
    pub foreign_keys: Vec<SchemaRelationship>,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let project_id = Uuid::new_v4();
        let datasource_id = store
            .register_datasource("fixture", project_id, "sqlite", ":memory:")
            .unwrap();
        Self {
            store,
            project_id,
            datasource_id,
            tables: Vec::new(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn table(&mut self, name: &str, rows: Option<i64>) -> SchemaTable {
        let table = SchemaTable {
            id: Uuid::new_v4(),
            datasource_id: self.datasource_id,
            schema_name: "public".to_string(),
            table_name: name.to_string(),
            row_count: rows,
        };
        self.tables.push(table.clone());
        table
    }

    /// Add a column; ordinal follows insertion order within the table.
    pub fn column(&mut self, column: SchemaColumn) -> SchemaColumn {
        let ordinal = self
            .columns
            .iter()
            .filter(|c| c.table_id == column.table_id)
            .count() as i32
            + 1;
        let column = SchemaColumn {
            ordinal_position: ordinal,
            ..column
        };
        self.columns.push(column.clone());
        column
    }

    /// Record a declared FK constraint, as a schema scan would.
    pub fn declare_fk(&mut self, source: &SchemaColumn, target: &SchemaColumn) -> SchemaRelationship {
        let fk = SchemaRelationship {
            id: Uuid::new_v4(),
            datasource_id: self.datasource_id,
            source_table_id: source.table_id,
            source_column_id: source.id,
            target_table_id: target.table_id,
            target_column_id: target.id,
            relationship_type: RelationshipType::Fk,
            inference_method: Some(InferenceMethod::ForeignKey),
            confidence: 1.0,
            cardinality: Cardinality::Unknown,
            is_validated: false,
        };
        self.foreign_keys.push(fk.clone());
        fk
    }

    /// Persist tables, columns and declared FKs.
    pub fn save(&self) {
        self.store
            .save_snapshot(self.datasource_id, &SchemaScan {
                tables: self.tables.clone(),
                columns: self.columns.clone(),
                foreign_keys: self.foreign_keys.clone(),
            })
            .unwrap();
    }

    /// A user-authored relationship between two columns.
    pub async fn add_manual(&self, source: &SchemaColumn, target: &SchemaColumn) -> SchemaRelationship {
        let manual = SchemaRelationship {
            id: Uuid::new_v4(),
            datasource_id: self.datasource_id,
            source_table_id: source.table_id,
            source_column_id: source.id,
            target_table_id: target.table_id,
            target_column_id: target.id,
            relationship_type: RelationshipType::Manual,
            inference_method: None,
            confidence: 1.0,
            cardinality: Cardinality::OneToOne,
            is_validated: false,
        };
        self.store.upsert_relationship(&manual).await.unwrap();
        manual
    }

    pub async fn relationships(&self) -> Vec<SchemaRelationship> {
        self.store
            .list_existing_relationships(self.datasource_id)
            .await
            .unwrap()
    }

    /// Stored relationship for a column pair.
    pub async fn relationship(
        &self,
        source: &SchemaColumn,
        target: &SchemaColumn,
    ) -> Option<SchemaRelationship> {
        self.relationships()
            .await
            .into_iter()
            .find(|r| r.column_pair() == (source.id, target.id))
    }
}

/// A joinable column with 100 distinct values.
pub fn col(table: &SchemaTable, name: &str, data_type: &str) -> SchemaColumn {
    SchemaColumn {
        id: Uuid::new_v4(),
        table_id: table.id,
        column_name: name.to_string(),
        data_type: data_type.to_string(),
        ordinal_position: 0,
        is_primary_key: false,
        is_joinable: Some(true),
        distinct_count: Some(100),
        features: None,
    }
}

pub fn pk(table: &SchemaTable, name: &str, data_type: &str, distinct: i64) -> SchemaColumn {
    SchemaColumn {
        is_primary_key: true,
        distinct_count: Some(distinct),
        ..col(table, name, data_type)
    }
}

pub fn with_distinct(column: SchemaColumn, distinct: Option<i64>) -> SchemaColumn {
    SchemaColumn {
        distinct_count: distinct,
        ..column
    }
}

pub fn with_purpose(mut column: SchemaColumn, purpose: ColumnPurpose) -> SchemaColumn {
    column.features.get_or_insert_with(ColumnFeatures::default).purpose = Some(purpose);
    column
}

pub fn with_role(mut column: SchemaColumn, role: ColumnRole) -> SchemaColumn {
    column.features.get_or_insert_with(ColumnFeatures::default).role = Some(role);
    column
}

/// Attach an upstream-resolved FK target.
pub fn with_fk_hint(
    mut column: SchemaColumn,
    table: &str,
    target_column: Option<&str>,
    confidence: f64,
) -> SchemaColumn {
    let features = column.features.get_or_insert_with(ColumnFeatures::default);
    features.fk_target_table = Some(table.to_string());
    features.fk_target_column = target_column.map(str::to_string);
    features.fk_confidence = Some(confidence);
    column
}

// =============================================================================
// Join statistics
// =============================================================================

/// Join statistics with no integer extreme.
pub fn stats(
    join_count: i64,
    source_matched: i64,
    target_matched: i64,
    orphan_count: i64,
    reverse_orphan_count: i64,
) -> JoinAnalysis {
    JoinAnalysis {
        join_count,
        source_matched,
        target_matched,
        orphan_count,
        reverse_orphan_count,
        max_source_value: None,
    }
}

#[derive(Clone)]
enum Script {
    Stats(JoinAnalysis),
    Fail,
    /// Cancel the run and never answer.
    CancelRun(CancellationToken),
}

/// A join validator answering from a script keyed by `table.column` pairs.
///
/// Unscripted pairs return empty statistics (no matches).
#[derive(Default)]
pub struct ScriptedValidator {
    scripts: Mutex<HashMap<(String, String), Script>>,
    calls: Mutex<Vec<String>>,
}

fn key(pair: &JoinPair) -> (String, String) {
    (
        format!("{}.{}", pair.source.table, pair.source.column),
        format!("{}.{}", pair.target.table, pair.target.column),
    )
}

impl ScriptedValidator {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self, source: &str, target: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert((source.to_string(), target.to_string()), script);
    }

    /// Answer `source -> target` (both `table.column`) with `analysis`.
    pub fn on(&self, source: &str, target: &str, analysis: JoinAnalysis) {
        self.script(source, target, Script::Stats(analysis));
    }

    /// Fail `source -> target` with a query error.
    pub fn fail(&self, source: &str, target: &str) {
        self.script(source, target, Script::Fail);
    }

    /// Cancel `token` while `source -> target` is being analyzed.
    pub fn cancel_during(&self, source: &str, target: &str, token: &CancellationToken) {
        self.script(source, target, Script::CancelRun(token.clone()));
    }

    /// Pairs analyzed so far, as `table.column -> table.column`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn was_called_for_source(&self, source: &str) -> bool {
        let prefix = format!("{} ->", source);
        self.calls().iter().any(|c| c.starts_with(&prefix))
    }
}

#[async_trait]
impl JoinValidator for ScriptedValidator {
    async fn analyze_join(
        &self,
        pair: &JoinPair,
        _cancel: &CancellationToken,
    ) -> DatasourceResult<JoinAnalysis> {
        let (source, target) = key(pair);
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} -> {}", source, target));

        let script = self.scripts.lock().unwrap().get(&(source, target)).cloned();
        match script {
            Some(Script::Stats(analysis)) => Ok(analysis),
            Some(Script::Fail) => Err(DatasourceError::UnknownObject(pair.to_string())),
            Some(Script::CancelRun(token)) => {
                token.cancel();
                std::future::pending().await
            }
            None => Ok(JoinAnalysis::default()),
        }
    }
}

// =============================================================================
// Failing store
// =============================================================================

/// Delegates reads to a real store and fails every write.
pub struct ReadOnlyStore<'a> {
    pub inner: &'a SqliteStore,
}

#[async_trait]
impl SchemaRepository for ReadOnlyStore<'_> {
    async fn list_tables(&self, datasource_id: Uuid) -> StoreResult<Vec<SchemaTable>> {
        self.inner.list_tables(datasource_id).await
    }

    async fn list_columns(&self, datasource_id: Uuid) -> StoreResult<Vec<SchemaColumn>> {
        self.inner.list_columns(datasource_id).await
    }

    async fn list_existing_relationships(
        &self,
        datasource_id: Uuid,
    ) -> StoreResult<Vec<SchemaRelationship>> {
        self.inner.list_existing_relationships(datasource_id).await
    }

    async fn upsert_relationship(&self, _relationship: &SchemaRelationship) -> StoreResult<()> {
        Err(StoreError::InvalidData("store is read-only".to_string()))
    }

    async fn upsert_relationship_with_metrics(
        &self,
        _relationship: &SchemaRelationship,
        _metrics: &DiscoveryMetrics,
    ) -> StoreResult<()> {
        Err(StoreError::InvalidData("store is read-only".to_string()))
    }
}

#[async_trait]
impl ProjectSettings for ReadOnlyStore<'_> {
    async fn use_legacy_pattern_matching(&self, project_id: Uuid) -> StoreResult<bool> {
        self.inner.use_legacy_pattern_matching(project_id).await
    }
}
