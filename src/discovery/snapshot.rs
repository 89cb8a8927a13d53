//! Indexed view over a datasource's tables and columns.

use std::collections::HashMap;

use uuid::Uuid;

use crate::model::{ColumnRef, SchemaColumn, SchemaTable};

/// Pre-computed lookup structures for one discovery run.
///
/// Built in a single pass. Columns are kept in a deterministic order: by the
/// position of their table in the table list, then by ordinal position.
#[derive(Debug, Default)]
pub struct SchemaSnapshot {
    tables: Vec<SchemaTable>,
    columns: Vec<SchemaColumn>,
    table_index: HashMap<Uuid, usize>,
    column_index: HashMap<Uuid, usize>,
    pk_counts: HashMap<Uuid, usize>,
}

impl SchemaSnapshot {
    pub fn new(tables: Vec<SchemaTable>, mut columns: Vec<SchemaColumn>) -> Self {
        let table_index: HashMap<Uuid, usize> = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id, i))
            .collect();

        // Columns of tables missing from the snapshot sort last.
        columns.sort_by_key(|c| {
            (
                table_index.get(&c.table_id).copied().unwrap_or(usize::MAX),
                c.ordinal_position,
            )
        });

        let column_index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id, i))
            .collect();

        let mut pk_counts: HashMap<Uuid, usize> = HashMap::new();
        for column in columns.iter().filter(|c| c.is_primary_key) {
            *pk_counts.entry(column.table_id).or_insert(0) += 1;
        }

        Self {
            tables,
            columns,
            table_index,
            column_index,
            pk_counts,
        }
    }

    pub fn tables(&self) -> &[SchemaTable] {
        &self.tables
    }

    pub fn columns(&self) -> &[SchemaColumn] {
        &self.columns
    }

    pub fn table(&self, id: Uuid) -> Option<&SchemaTable> {
        self.table_index.get(&id).map(|&i| &self.tables[i])
    }

    pub fn column(&self, id: Uuid) -> Option<&SchemaColumn> {
        self.column_index.get(&id).map(|&i| &self.columns[i])
    }

    /// Table owning `column`.
    pub fn table_of(&self, column: &SchemaColumn) -> Option<&SchemaTable> {
        self.table(column.table_id)
    }

    /// Find a table by `table` or `schema.table` reference (case-insensitive).
    pub fn find_table(&self, reference: &str) -> Option<&SchemaTable> {
        self.tables.iter().find(|t| t.matches_reference(reference))
    }

    /// Find a column of a table by name (case-insensitive).
    pub fn find_column(&self, table_id: Uuid, name: &str) -> Option<&SchemaColumn> {
        self.columns_of(table_id)
            .find(|c| c.column_name.eq_ignore_ascii_case(name))
    }

    /// Columns of a table in ordinal order.
    pub fn columns_of(&self, table_id: Uuid) -> impl Iterator<Item = &SchemaColumn> {
        self.columns.iter().filter(move |c| c.table_id == table_id)
    }

    /// The single primary key column of a table, if it has exactly one.
    pub fn single_primary_key(&self, table_id: Uuid) -> Option<&SchemaColumn> {
        if self.primary_key_count(table_id) != 1 {
            return None;
        }
        self.columns_of(table_id).find(|c| c.is_primary_key)
    }

    /// Number of primary key columns in a table.
    pub fn primary_key_count(&self, table_id: Uuid) -> usize {
        self.pk_counts.get(&table_id).copied().unwrap_or(0)
    }

    /// Physical `schema.table.column` reference for a column.
    pub fn column_ref(&self, column: &SchemaColumn) -> Option<ColumnRef> {
        let table = self.table_of(column)?;
        Some(ColumnRef::new(
            &table.schema_name,
            &table.table_name,
            &column.column_name,
        ))
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
