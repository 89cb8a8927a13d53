//! SQLite-backed relationship store.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction};
use serde::Serialize;
use uuid::Uuid;

use super::{
    EntityRelationshipRepository, ProjectSettings, SchemaRepository, StoreError, StoreResult,
};
use crate::datasource::SchemaScan;
use crate::model::{
    Cardinality, ColumnFeatures, ColumnRef, DetectionMethod, DiscoveryMetrics,
    EntityRelationship, InferenceMethod, RelationshipStatus, RelationshipType, SchemaColumn,
    SchemaRelationship, SchemaTable,
};

/// Current store schema version. Bump this when the table layout changes.
const STORE_VERSION: i32 = 1;

const RELATIONSHIP_COLUMNS: &str = "r.id, r.datasource_id, r.source_table_id, r.source_column_id, \
     r.target_table_id, r.target_column_id, r.relationship_type, r.inference_method, \
     r.confidence, r.cardinality, r.is_validated";

/// A relationship with the physical names of both ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipDetail {
    pub relationship: SchemaRelationship,
    pub source: ColumnRef,
    pub target: ColumnRef,
    pub metrics: Option<DiscoveryMetrics>,
}

/// SQLite relationship store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the store database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Default store location, `~/.ontology/store.db`.
    pub fn default_path() -> StoreResult<PathBuf> {
        let base = dirs::home_dir().ok_or(StoreError::NoStoreDir)?;
        Ok(base.join(".ontology").join("store.db"))
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS project_settings (
                project_id TEXT PRIMARY KEY,
                use_legacy_pattern_matching INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS datasources (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                project_id TEXT NOT NULL,
                driver TEXT NOT NULL,
                connection_string TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS schema_tables (
                id TEXT PRIMARY KEY,
                datasource_id TEXT NOT NULL,
                schema_name TEXT NOT NULL,
                table_name TEXT NOT NULL,
                row_count INTEGER,
                UNIQUE (datasource_id, schema_name, table_name)
            );

            CREATE TABLE IF NOT EXISTS schema_columns (
                id TEXT PRIMARY KEY,
                table_id TEXT NOT NULL REFERENCES schema_tables (id) ON DELETE CASCADE,
                column_name TEXT NOT NULL,
                data_type TEXT NOT NULL,
                ordinal_position INTEGER NOT NULL,
                is_primary_key INTEGER NOT NULL,
                is_joinable INTEGER,
                distinct_count INTEGER,
                features TEXT,
                UNIQUE (table_id, column_name)
            );

            CREATE TABLE IF NOT EXISTS schema_relationships (
                id TEXT PRIMARY KEY,
                datasource_id TEXT NOT NULL,
                source_table_id TEXT NOT NULL,
                source_column_id TEXT NOT NULL,
                target_table_id TEXT NOT NULL,
                target_column_id TEXT NOT NULL,
                relationship_type TEXT NOT NULL,
                inference_method TEXT,
                confidence REAL NOT NULL,
                cardinality TEXT NOT NULL,
                is_validated INTEGER NOT NULL,
                metrics TEXT,
                UNIQUE (source_column_id, target_column_id)
            );

            CREATE TABLE IF NOT EXISTS entity_relationships (
                id TEXT PRIMARY KEY,
                ontology_id TEXT NOT NULL,
                source_entity_id TEXT NOT NULL,
                target_entity_id TEXT NOT NULL,
                source_schema TEXT NOT NULL,
                source_table TEXT NOT NULL,
                source_column TEXT NOT NULL,
                target_schema TEXT NOT NULL,
                target_table TEXT NOT NULL,
                target_column TEXT NOT NULL,
                source_column_id TEXT,
                target_column_id TEXT,
                detection_method TEXT NOT NULL,
                confidence REAL NOT NULL,
                cardinality TEXT NOT NULL,
                status TEXT NOT NULL,
                description TEXT,
                association TEXT
            );
            ",
        )?;

        let stored_version: Option<String> = conn
            .query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| {
                row.get(0)
            })
            .optional()?;

        match stored_version {
            Some(v) => {
                let found: i32 = v
                    .parse()
                    .map_err(|_| StoreError::InvalidData(format!("store version '{}'", v)))?;
                if found != STORE_VERSION {
                    return Err(StoreError::IncompatibleVersion {
                        found,
                        expected: STORE_VERSION,
                    });
                }
            }
            None => {
                conn.execute(
                    "INSERT INTO meta (key, value) VALUES ('version', ?)",
                    params![STORE_VERSION.to_string()],
                )?;
            }
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    // =========================================================================
    // Datasources and project settings
    // =========================================================================

    /// Register a datasource by name, returning its identifier.
    ///
    /// Re-registering a known name updates its connection details and keeps
    /// the identifier.
    pub fn register_datasource(
        &self,
        name: &str,
        project_id: Uuid,
        driver: &str,
        connection_string: &str,
    ) -> StoreResult<Uuid> {
        let conn = self.conn()?;
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM datasources WHERE name = ?",
                params![name],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(id) => {
                conn.execute(
                    "UPDATE datasources SET project_id = ?, driver = ?, connection_string = ?
                     WHERE id = ?",
                    params![project_id.to_string(), driver, connection_string, id],
                )?;
                parse_stored_uuid(&id)
            }
            None => {
                let id = Uuid::new_v4();
                conn.execute(
                    "INSERT INTO datasources (id, name, project_id, driver, connection_string)
                     VALUES (?, ?, ?, ?, ?)",
                    params![
                        id.to_string(),
                        name,
                        project_id.to_string(),
                        driver,
                        connection_string
                    ],
                )?;
                Ok(id)
            }
        }
    }

    /// Look up a registered datasource: `(id, project_id)`.
    pub fn find_datasource(&self, name: &str) -> StoreResult<Option<(Uuid, Uuid)>> {
        let conn = self.conn()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT id, project_id FROM datasources WHERE name = ?",
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match row {
            Some((id, project)) => Ok(Some((
                parse_stored_uuid(&id)?,
                parse_stored_uuid(&project)?,
            ))),
            None => Ok(None),
        }
    }

    /// Record the initial legacy mode of a project. Has no effect once the
    /// project has a setting.
    pub fn init_project_settings(&self, project_id: Uuid, legacy: bool) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO project_settings (project_id, use_legacy_pattern_matching) VALUES (?, ?)
             ON CONFLICT (project_id) DO NOTHING",
            params![project_id.to_string(), legacy],
        )?;
        Ok(())
    }

    pub fn set_legacy_pattern_matching(&self, project_id: Uuid, enabled: bool) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO project_settings (project_id, use_legacy_pattern_matching) VALUES (?, ?)
             ON CONFLICT (project_id) DO UPDATE SET
                use_legacy_pattern_matching = excluded.use_legacy_pattern_matching",
            params![project_id.to_string(), enabled],
        )?;
        Ok(())
    }

    // =========================================================================
    // Schema snapshot
    // =========================================================================

    /// Store a scanned schema as the current state of a datasource.
    ///
    /// Tables and columns are updated in place by id; declared FK constraints
    /// are added only when their column pair is not already known. Tables,
    /// columns and declared constraints missing from the scan are removed,
    /// together with every non-manual relationship on a removed column.
    pub fn save_snapshot(&self, datasource_id: Uuid, scan: &SchemaScan) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        prune_snapshot(&tx, datasource_id, scan)?;

        for table in &scan.tables {
            tx.execute(
                "INSERT INTO schema_tables (id, datasource_id, schema_name, table_name, row_count)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT (id) DO UPDATE SET row_count = excluded.row_count",
                params![
                    table.id.to_string(),
                    table.datasource_id.to_string(),
                    table.schema_name,
                    table.table_name,
                    table.row_count
                ],
            )?;
        }

        for column in &scan.columns {
            let features = column
                .features
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            tx.execute(
                "INSERT INTO schema_columns (id, table_id, column_name, data_type, ordinal_position,
                                             is_primary_key, is_joinable, distinct_count, features)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (id) DO UPDATE SET
                    data_type = excluded.data_type,
                    ordinal_position = excluded.ordinal_position,
                    is_primary_key = excluded.is_primary_key,
                    is_joinable = excluded.is_joinable,
                    distinct_count = excluded.distinct_count,
                    features = excluded.features",
                params![
                    column.id.to_string(),
                    column.table_id.to_string(),
                    column.column_name,
                    column.data_type,
                    column.ordinal_position,
                    column.is_primary_key,
                    column.is_joinable,
                    column.distinct_count,
                    features
                ],
            )?;
        }

        for fk in &scan.foreign_keys {
            tx.execute(
                "INSERT INTO schema_relationships (id, datasource_id, source_table_id,
                    source_column_id, target_table_id, target_column_id, relationship_type,
                    inference_method, confidence, cardinality, is_validated)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (source_column_id, target_column_id) DO NOTHING",
                params_from_iter(relationship_params(fk).iter()),
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Replace the features attached to a column.
    pub fn set_column_features(
        &self,
        column_id: Uuid,
        features: Option<&ColumnFeatures>,
    ) -> StoreResult<()> {
        let json = features.map(serde_json::to_string).transpose()?;
        let updated = self.conn()?.execute(
            "UPDATE schema_columns SET features = ? WHERE id = ?",
            params![json, column_id.to_string()],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("column {}", column_id)));
        }
        Ok(())
    }

    fn query_tables(&self, datasource_id: Uuid) -> StoreResult<Vec<SchemaTable>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, datasource_id, schema_name, table_name, row_count
             FROM schema_tables WHERE datasource_id = ?
             ORDER BY schema_name, table_name",
        )?;
        let rows = stmt.query_map(params![datasource_id.to_string()], |row| {
            Ok(SchemaTable {
                id: uuid_at(row, 0)?,
                datasource_id: uuid_at(row, 1)?,
                schema_name: row.get(2)?,
                table_name: row.get(3)?,
                row_count: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn query_columns(&self, datasource_id: Uuid) -> StoreResult<Vec<SchemaColumn>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.table_id, c.column_name, c.data_type, c.ordinal_position,
                    c.is_primary_key, c.is_joinable, c.distinct_count, c.features
             FROM schema_columns c
             JOIN schema_tables t ON t.id = c.table_id
             WHERE t.datasource_id = ?
             ORDER BY t.schema_name, t.table_name, c.ordinal_position",
        )?;
        let rows = stmt.query_map(params![datasource_id.to_string()], |row| {
            Ok(SchemaColumn {
                id: uuid_at(row, 0)?,
                table_id: uuid_at(row, 1)?,
                column_name: row.get(2)?,
                data_type: row.get(3)?,
                ordinal_position: row.get(4)?,
                is_primary_key: row.get(5)?,
                is_joinable: row.get(6)?,
                distinct_count: row.get(7)?,
                features: json_at(row, 8)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // =========================================================================
    // Schema relationships
    // =========================================================================

    fn query_relationships(&self, datasource_id: Uuid) -> StoreResult<Vec<SchemaRelationship>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM schema_relationships r WHERE r.datasource_id = ? ORDER BY r.rowid",
            RELATIONSHIP_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![datasource_id.to_string()], relationship_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn write_relationship(
        &self,
        relationship: &SchemaRelationship,
        metrics: Option<&DiscoveryMetrics>,
    ) -> StoreResult<()> {
        let metrics = metrics.map(serde_json::to_string).transpose()?;
        let mut values = relationship_params(relationship);
        values.push(Box::new(metrics));

        self.conn()?.execute(
            "INSERT INTO schema_relationships (id, datasource_id, source_table_id,
                source_column_id, target_table_id, target_column_id, relationship_type,
                inference_method, confidence, cardinality, is_validated, metrics)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (source_column_id, target_column_id) DO UPDATE SET
                relationship_type = excluded.relationship_type,
                inference_method = excluded.inference_method,
                confidence = excluded.confidence,
                cardinality = excluded.cardinality,
                is_validated = excluded.is_validated,
                metrics = COALESCE(excluded.metrics, schema_relationships.metrics)
             WHERE schema_relationships.relationship_type <> 'manual'",
            params_from_iter(values.iter()),
        )?;
        Ok(())
    }

    /// Relationships of a datasource with table and column names joined in,
    /// ordered by source then target.
    pub fn list_relationship_details(
        &self,
        datasource_id: Uuid,
    ) -> StoreResult<Vec<RelationshipDetail>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {},
                    st.schema_name, st.table_name, sc.column_name,
                    tt.schema_name, tt.table_name, tc.column_name,
                    r.metrics
             FROM schema_relationships r
             JOIN schema_tables st ON st.id = r.source_table_id
             JOIN schema_columns sc ON sc.id = r.source_column_id
             JOIN schema_tables tt ON tt.id = r.target_table_id
             JOIN schema_columns tc ON tc.id = r.target_column_id
             WHERE r.datasource_id = ?
             ORDER BY st.schema_name, st.table_name, sc.column_name,
                      tt.schema_name, tt.table_name, tc.column_name",
            RELATIONSHIP_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![datasource_id.to_string()], |row| {
            Ok(RelationshipDetail {
                relationship: relationship_from_row(row)?,
                source: ColumnRef::new(
                    row.get::<_, String>(11)?,
                    row.get::<_, String>(12)?,
                    row.get::<_, String>(13)?,
                ),
                target: ColumnRef::new(
                    row.get::<_, String>(14)?,
                    row.get::<_, String>(15)?,
                    row.get::<_, String>(16)?,
                ),
                metrics: json_at(row, 17)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Discovery metrics stored for a column pair, if any.
    pub fn relationship_metrics(
        &self,
        source_column_id: Uuid,
        target_column_id: Uuid,
    ) -> StoreResult<Option<DiscoveryMetrics>> {
        let conn = self.conn()?;
        let json: Option<Option<String>> = conn
            .query_row(
                "SELECT metrics FROM schema_relationships
                 WHERE source_column_id = ? AND target_column_id = ?",
                params![source_column_id.to_string(), target_column_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match json.flatten() {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Entity relationships
    // =========================================================================

    /// Entity relationships of an ontology in creation order.
    pub fn list_entity_relationships(
        &self,
        ontology_id: Uuid,
    ) -> StoreResult<Vec<EntityRelationship>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, ontology_id, source_entity_id, target_entity_id,
                    source_schema, source_table, source_column,
                    target_schema, target_table, target_column,
                    source_column_id, target_column_id, detection_method, confidence,
                    cardinality, status, description, association
             FROM entity_relationships WHERE ontology_id = ? ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![ontology_id.to_string()], |row| {
            Ok(EntityRelationship {
                id: uuid_at(row, 0)?,
                ontology_id: uuid_at(row, 1)?,
                source_entity_id: uuid_at(row, 2)?,
                target_entity_id: uuid_at(row, 3)?,
                source_column: ColumnRef::new(
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ),
                target_column: ColumnRef::new(
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, String>(9)?,
                ),
                source_column_id: optional_uuid_at(row, 10)?,
                target_column_id: optional_uuid_at(row, 11)?,
                detection_method: parsed_at(row, 12, DetectionMethod::parse)?,
                confidence: row.get(13)?,
                cardinality: parsed_at(row, 14, Cardinality::parse)?,
                status: parsed_at(row, 15, RelationshipStatus::parse)?,
                description: row.get(16)?,
                association: row.get(17)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn insert_entity_relationship(conn: &Connection, rel: &EntityRelationship) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO entity_relationships (id, ontology_id, source_entity_id, target_entity_id,
            source_schema, source_table, source_column, target_schema, target_table,
            target_column, source_column_id, target_column_id, detection_method, confidence,
            cardinality, status, description, association)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            rel.id.to_string(),
            rel.ontology_id.to_string(),
            rel.source_entity_id.to_string(),
            rel.target_entity_id.to_string(),
            rel.source_column.schema,
            rel.source_column.table,
            rel.source_column.column,
            rel.target_column.schema,
            rel.target_column.table,
            rel.target_column.column,
            rel.source_column_id.map(|id| id.to_string()),
            rel.target_column_id.map(|id| id.to_string()),
            rel.detection_method.as_str(),
            rel.confidence,
            rel.cardinality.as_str(),
            rel.status.as_str(),
            rel.description,
            rel.association
        ],
    )?;
    Ok(())
}

#[async_trait]
impl SchemaRepository for SqliteStore {
    async fn list_tables(&self, datasource_id: Uuid) -> StoreResult<Vec<SchemaTable>> {
        self.query_tables(datasource_id)
    }

    async fn list_columns(&self, datasource_id: Uuid) -> StoreResult<Vec<SchemaColumn>> {
        self.query_columns(datasource_id)
    }

    async fn list_existing_relationships(
        &self,
        datasource_id: Uuid,
    ) -> StoreResult<Vec<SchemaRelationship>> {
        self.query_relationships(datasource_id)
    }

    async fn upsert_relationship(&self, relationship: &SchemaRelationship) -> StoreResult<()> {
        self.write_relationship(relationship, None)
    }

    async fn upsert_relationship_with_metrics(
        &self,
        relationship: &SchemaRelationship,
        metrics: &DiscoveryMetrics,
    ) -> StoreResult<()> {
        self.write_relationship(relationship, Some(metrics))
    }
}

#[async_trait]
impl EntityRelationshipRepository for SqliteStore {
    async fn create(&self, relationship: &EntityRelationship) -> StoreResult<()> {
        let conn = self.conn()?;
        insert_entity_relationship(&conn, relationship)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.conn()?.execute(
            "DELETE FROM entity_relationships WHERE id = ?",
            params![id.to_string()],
        )?;
        Ok(())
    }

    async fn create_pair(
        &self,
        forward: &EntityRelationship,
        reverse: &EntityRelationship,
    ) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        insert_entity_relationship(&tx, forward)?;
        insert_entity_relationship(&tx, reverse)?;
        tx.commit()?;
        Ok(())
    }
}

#[async_trait]
impl ProjectSettings for SqliteStore {
    async fn use_legacy_pattern_matching(&self, project_id: Uuid) -> StoreResult<bool> {
        let enabled: Option<bool> = self
            .conn()?
            .query_row(
                "SELECT use_legacy_pattern_matching FROM project_settings WHERE project_id = ?",
                params![project_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(enabled.unwrap_or(false))
    }
}

// =============================================================================
// Snapshot pruning
// =============================================================================

/// Delete what a re-scan no longer reports.
///
/// Manual relationships are kept even when their columns disappear.
fn prune_snapshot(tx: &Transaction<'_>, datasource_id: Uuid, scan: &SchemaScan) -> StoreResult<()> {
    let datasource = datasource_id.to_string();
    let scanned_tables: HashSet<String> = scan.tables.iter().map(|t| t.id.to_string()).collect();
    let scanned_columns: HashSet<String> = scan.columns.iter().map(|c| c.id.to_string()).collect();
    let declared: HashSet<(String, String)> = scan
        .foreign_keys
        .iter()
        .map(|fk| (fk.source_column_id.to_string(), fk.target_column_id.to_string()))
        .collect();

    let stale_columns: Vec<String> = {
        let mut stmt = tx.prepare(
            "SELECT c.id FROM schema_columns c
             JOIN schema_tables t ON t.id = c.table_id
             WHERE t.datasource_id = ?",
        )?;
        let ids = stmt.query_map(params![datasource], |row| row.get::<_, String>(0))?;
        let stale = ids
            .filter(|id| !matches!(id, Ok(id) if scanned_columns.contains(id)))
            .collect::<rusqlite::Result<_>>()?;
        stale
    };
    for column_id in &stale_columns {
        tx.execute(
            "DELETE FROM schema_relationships
             WHERE relationship_type <> 'manual'
               AND (source_column_id = ?1 OR target_column_id = ?1)",
            params![column_id],
        )?;
        tx.execute("DELETE FROM schema_columns WHERE id = ?", params![column_id])?;
    }

    let stale_tables: Vec<String> = {
        let mut stmt = tx.prepare("SELECT id FROM schema_tables WHERE datasource_id = ?")?;
        let ids = stmt.query_map(params![datasource], |row| row.get::<_, String>(0))?;
        let stale = ids
            .filter(|id| !matches!(id, Ok(id) if scanned_tables.contains(id)))
            .collect::<rusqlite::Result<_>>()?;
        stale
    };
    for table_id in &stale_tables {
        tx.execute("DELETE FROM schema_tables WHERE id = ?", params![table_id])?;
    }

    let stale_constraints: Vec<String> = {
        let mut stmt = tx.prepare(
            "SELECT id, source_column_id, target_column_id FROM schema_relationships
             WHERE datasource_id = ?
               AND relationship_type <> 'manual'
               AND inference_method = 'foreign_key'",
        )?;
        let rows = stmt.query_map(params![datasource], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut stale = Vec::new();
        for row in rows {
            let (id, source, target) = row?;
            if !declared.contains(&(source, target)) {
                stale.push(id);
            }
        }
        stale
    };
    for relationship_id in &stale_constraints {
        tx.execute(
            "DELETE FROM schema_relationships WHERE id = ?",
            params![relationship_id],
        )?;
    }

    Ok(())
}

// =============================================================================
// Row helpers
// =============================================================================

fn relationship_params(rel: &SchemaRelationship) -> Vec<Box<dyn rusqlite::ToSql>> {
    vec![
        Box::new(rel.id.to_string()),
        Box::new(rel.datasource_id.to_string()),
        Box::new(rel.source_table_id.to_string()),
        Box::new(rel.source_column_id.to_string()),
        Box::new(rel.target_table_id.to_string()),
        Box::new(rel.target_column_id.to_string()),
        Box::new(rel.relationship_type.as_str()),
        Box::new(rel.inference_method.map(|m| m.as_str())),
        Box::new(rel.confidence),
        Box::new(rel.cardinality.as_str()),
        Box::new(rel.is_validated),
    ]
}

fn relationship_from_row(row: &Row<'_>) -> rusqlite::Result<SchemaRelationship> {
    let inference_method: Option<String> = row.get(7)?;
    let inference_method = match inference_method {
        Some(text) => Some(
            InferenceMethod::parse(&text).ok_or_else(|| unknown_value(7, &text))?,
        ),
        None => None,
    };

    Ok(SchemaRelationship {
        id: uuid_at(row, 0)?,
        datasource_id: uuid_at(row, 1)?,
        source_table_id: uuid_at(row, 2)?,
        source_column_id: uuid_at(row, 3)?,
        target_table_id: uuid_at(row, 4)?,
        target_column_id: uuid_at(row, 5)?,
        relationship_type: parsed_at(row, 6, RelationshipType::parse)?,
        inference_method,
        confidence: row.get(8)?,
        cardinality: parsed_at(row, 9, Cardinality::parse)?,
        is_validated: row.get(10)?,
    })
}

fn parse_stored_uuid(text: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(text).map_err(|_| StoreError::InvalidData(format!("uuid '{}'", text)))
}

fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        Uuid::parse_str(&t)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn parsed_at<T>(row: &Row<'_>, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    parse(&text).ok_or_else(|| unknown_value(idx, &text))
}

fn json_at<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        serde_json::from_str(&t)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn unknown_value(idx: usize, text: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("unknown value '{}'", text).into(),
    )
}
