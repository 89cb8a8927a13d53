//! SQLite datasource.
//!
//! Provides join statistics ([`JoinValidator`]) and a schema scan for SQLite
//! databases. Queries run on the blocking pool; when the cancellation token
//! fires, the connection's interrupt handle aborts the running statement.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, InterruptHandle, OpenFlags};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::{DatasourceError, DatasourceResult, JoinAnalysis, JoinPair, JoinValidator};
use crate::discovery::thresholds::confidence;
use crate::discovery::types::is_excluded_type;
use crate::model::{
    Cardinality, InferenceMethod, RelationshipType, SchemaColumn, SchemaRelationship, SchemaTable,
};

/// SQLite attaches the primary database under this schema name.
const MAIN_SCHEMA: &str = "main";

/// Result of scanning a SQLite database's schema.
#[derive(Debug, Clone, Default)]
pub struct SchemaScan {
    pub tables: Vec<SchemaTable>,
    pub columns: Vec<SchemaColumn>,
    /// Declared FK constraints, as unvalidated `foreign_key` relationships.
    pub foreign_keys: Vec<SchemaRelationship>,
}

impl SchemaScan {
    /// Re-key this scan onto identifiers already known to the store.
    ///
    /// Tables are matched by `(schema, table)` and columns by
    /// `(table, column)`, case-insensitively. Matched columns keep their
    /// existing features when the scan carries none.
    pub fn reuse_ids(&mut self, existing_tables: &[SchemaTable], existing_columns: &[SchemaColumn]) {
        let table_ids: HashMap<(String, String), Uuid> = existing_tables
            .iter()
            .map(|t| {
                (
                    (t.schema_name.to_lowercase(), t.table_name.to_lowercase()),
                    t.id,
                )
            })
            .collect();

        let mut table_remap: HashMap<Uuid, Uuid> = HashMap::new();
        for table in &mut self.tables {
            let key = (
                table.schema_name.to_lowercase(),
                table.table_name.to_lowercase(),
            );
            if let Some(&known) = table_ids.get(&key) {
                table_remap.insert(table.id, known);
                table.id = known;
            }
        }

        let known_columns: HashMap<(Uuid, String), &SchemaColumn> = existing_columns
            .iter()
            .map(|c| ((c.table_id, c.column_name.to_lowercase()), c))
            .collect();

        let mut column_remap: HashMap<Uuid, Uuid> = HashMap::new();
        for column in &mut self.columns {
            if let Some(&table_id) = table_remap.get(&column.table_id) {
                column.table_id = table_id;
            }
            let key = (column.table_id, column.column_name.to_lowercase());
            if let Some(known) = known_columns.get(&key) {
                column_remap.insert(column.id, known.id);
                column.id = known.id;
                if column.features.is_none() {
                    column.features = known.features.clone();
                }
            }
        }

        for fk in &mut self.foreign_keys {
            remap(&mut fk.source_table_id, &table_remap);
            remap(&mut fk.target_table_id, &table_remap);
            remap(&mut fk.source_column_id, &column_remap);
            remap(&mut fk.target_column_id, &column_remap);
        }
    }
}

fn remap(id: &mut Uuid, mapping: &HashMap<Uuid, Uuid>) {
    if let Some(&known) = mapping.get(id) {
        *id = known;
    }
}

/// A SQLite database acting as a discovery datasource.
pub struct SqliteDatasource {
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
}

impl SqliteDatasource {
    /// Open a database file read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> DatasourceResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an existing connection (fixtures, in-memory databases).
    pub fn from_connection(conn: Connection) -> Self {
        let interrupt = Arc::new(conn.get_interrupt_handle());
        Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt,
        }
    }

    /// Run `f` against the connection on the blocking pool, interrupting it
    /// if `cancel` fires first.
    async fn run_blocking<T, F>(&self, cancel: &CancellationToken, f: F) -> DatasourceResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> DatasourceResult<T> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(DatasourceError::Cancelled);
        }

        let conn = Arc::clone(&self.conn);
        let token = cancel.clone();
        let task = tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| DatasourceError::Task("connection lock poisoned".to_string()))?;
            // Interrupting only reaches a running statement.
            if token.is_cancelled() {
                return Err(DatasourceError::Cancelled);
            }
            f(&guard)
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.interrupt.interrupt();
                Err(DatasourceError::Cancelled)
            }
            joined = task => {
                let result = joined?;
                match result {
                    Err(err) if err.is_cancelled() => Err(DatasourceError::Cancelled),
                    other => other,
                }
            }
        }
    }

    /// Scan tables, columns and declared FK constraints.
    ///
    /// Every scanned object gets a fresh identifier; use
    /// [`SchemaScan::reuse_ids`] to align it with a stored snapshot.
    pub async fn scan_schema(
        &self,
        datasource_id: Uuid,
        cancel: &CancellationToken,
    ) -> DatasourceResult<SchemaScan> {
        self.run_blocking(cancel, move |conn| scan(conn, datasource_id))
            .await
    }
}

#[async_trait]
impl JoinValidator for SqliteDatasource {
    async fn analyze_join(
        &self,
        pair: &JoinPair,
        cancel: &CancellationToken,
    ) -> DatasourceResult<JoinAnalysis> {
        let sql = join_statistics_sql(pair);
        debug!(pair = %pair, "analyzing join");
        self.run_blocking(cancel, move |conn| {
            let analysis = conn.query_row(&sql, [], |row| {
                Ok(JoinAnalysis {
                    join_count: row.get(0)?,
                    source_matched: row.get(1)?,
                    orphan_count: row.get(2)?,
                    target_matched: row.get(3)?,
                    reverse_orphan_count: row.get(4)?,
                    max_source_value: row.get(5)?,
                })
            })?;
            Ok(analysis)
        })
        .await
    }
}

/// Quote an identifier for SQLite.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn qualified(schema: &str, table: &str) -> String {
    if schema.is_empty() {
        quote_ident(table)
    } else {
        format!("{}.{}", quote_ident(schema), quote_ident(table))
    }
}

/// Single statement computing every [`JoinAnalysis`] field.
fn join_statistics_sql(pair: &JoinPair) -> String {
    let s = qualified(&pair.source.schema, &pair.source.table);
    let t = qualified(&pair.target.schema, &pair.target.table);
    let sc = quote_ident(&pair.source.column);
    let tc = quote_ident(&pair.target.column);

    format!(
        "SELECT \
           (SELECT COUNT(*) FROM {s} AS s JOIN {t} AS t ON s.{sc} = t.{tc}), \
           (SELECT COUNT(*) FROM {s} AS s WHERE s.{sc} IS NOT NULL \
              AND EXISTS (SELECT 1 FROM {t} AS t WHERE t.{tc} = s.{sc})), \
           (SELECT COUNT(*) FROM {s} AS s WHERE s.{sc} IS NOT NULL \
              AND NOT EXISTS (SELECT 1 FROM {t} AS t WHERE t.{tc} = s.{sc})), \
           (SELECT COUNT(*) FROM {t} AS t WHERE t.{tc} IS NOT NULL \
              AND EXISTS (SELECT 1 FROM {s} AS s WHERE s.{sc} = t.{tc})), \
           (SELECT COUNT(*) FROM {t} AS t WHERE t.{tc} IS NOT NULL \
              AND NOT EXISTS (SELECT 1 FROM {s} AS s WHERE s.{sc} = t.{tc})), \
           (SELECT MAX(s.{sc}) FROM {s} AS s WHERE typeof(s.{sc}) = 'integer')"
    )
}

fn scan(conn: &Connection, datasource_id: Uuid) -> DatasourceResult<SchemaScan> {
    let mut out = SchemaScan::default();

    let table_names: Vec<String> = {
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        names
    };

    // (table name lowercase, column name lowercase) -> (table id, column id)
    let mut column_index: HashMap<(String, String), (Uuid, Uuid)> = HashMap::new();
    // table name lowercase -> primary key column ids
    let mut primary_keys: HashMap<String, Vec<(Uuid, Uuid)>> = HashMap::new();

    for table_name in &table_names {
        let table_ref = qualified(MAIN_SCHEMA, table_name);
        let row_count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {table_ref}"), [], |row| {
                row.get(0)
            })?;

        let table = SchemaTable {
            id: Uuid::new_v4(),
            datasource_id,
            schema_name: MAIN_SCHEMA.to_string(),
            table_name: table_name.clone(),
            row_count: Some(row_count),
        };

        let mut stmt =
            conn.prepare("SELECT cid, name, type, pk FROM pragma_table_info(?1) ORDER BY cid")?;
        let raw_columns = stmt
            .query_map(params![table_name], |row| {
                Ok((
                    row.get::<_, i32>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i32>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        for (cid, name, data_type, pk) in raw_columns {
            let distinct: i64 = conn.query_row(
                &format!(
                    "SELECT COUNT(DISTINCT {}) FROM {table_ref}",
                    quote_ident(&name)
                ),
                [],
                |row| row.get(0),
            )?;

            let is_joinable = !is_excluded_type(&data_type) && distinct > 0;
            let column = SchemaColumn {
                id: Uuid::new_v4(),
                table_id: table.id,
                column_name: name.clone(),
                data_type,
                ordinal_position: cid + 1,
                is_primary_key: pk > 0,
                is_joinable: Some(is_joinable),
                distinct_count: Some(distinct),
                features: None,
            };

            let key = (table_name.to_lowercase(), name.to_lowercase());
            column_index.insert(key, (table.id, column.id));
            if column.is_primary_key {
                primary_keys
                    .entry(table_name.to_lowercase())
                    .or_default()
                    .push((table.id, column.id));
            }
            out.columns.push(column);
        }

        out.tables.push(table);
    }

    for table_name in &table_names {
        let mut stmt =
            conn.prepare("SELECT \"table\", \"from\", \"to\" FROM pragma_foreign_key_list(?1)")?;
        let constraints = stmt
            .query_map(params![table_name], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        for (parent, from, to) in constraints {
            let source = column_index.get(&(table_name.to_lowercase(), from.to_lowercase()));
            let target = match to {
                Some(to) => column_index
                    .get(&(parent.to_lowercase(), to.to_lowercase()))
                    .copied(),
                // FK without a column list references the parent's primary key
                None => match primary_keys.get(&parent.to_lowercase()) {
                    Some(pks) if pks.len() == 1 => Some(pks[0]),
                    _ => None,
                },
            };

            let (Some(&(source_table_id, source_column_id)), Some((target_table_id, target_column_id))) =
                (source, target)
            else {
                debug!(table = %table_name, column = %from, parent = %parent, "skipping unresolvable FK constraint");
                continue;
            };

            out.foreign_keys.push(SchemaRelationship {
                id: Uuid::new_v4(),
                datasource_id,
                source_table_id,
                source_column_id,
                target_table_id,
                target_column_id,
                relationship_type: RelationshipType::Fk,
                inference_method: Some(InferenceMethod::ForeignKey),
                confidence: confidence::DB_CONSTRAINT,
                cardinality: Cardinality::Unknown,
                is_validated: false,
            });
        }
    }

    Ok(out)
}
