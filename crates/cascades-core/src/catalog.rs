//! # Catalog Interface
//!
//! The optimizer reads table metadata and statistics through [`Catalog`] and never
//! writes to it. Implementations are shared across concurrent optimizations, so they
//! must be `Send + Sync`; the simplest way to get there is an immutable snapshot behind
//! an `Arc`, which is how the HTTP front end uses [`InMemoryCatalog`].

use crate::expr::{ColumnRef, TableRef};
use crate::stats::{ColumnStatistics, Statistics};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub trait Catalog: Send + Sync {
    fn get_table_stats(&self, table: &TableRef) -> Option<Statistics>;
    fn get_table_columns(&self, table: &TableRef) -> Option<Vec<ColumnRef>>;

    fn get_column_stats(&self, table: &TableRef, column: &str) -> Option<ColumnStatistics> {
        self.get_table_stats(table)?.column_stats.get(column).cloned()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableEntry {
    pub columns: Vec<ColumnRef>,
    pub stats: Statistics,
}

/// Catalog populated programmatically or from JSON.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    tables: HashMap<TableRef, TableEntry>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: &TableRef, columns: Vec<ColumnRef>, stats: Statistics) {
        self.tables.insert(table.clone(), TableEntry { columns, stats });
    }

    pub fn with_table(mut self, table: &TableRef, columns: Vec<ColumnRef>, stats: Statistics) -> Self {
        self.add_table(table, columns, stats);
        self
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Tables sorted by qualified name.
    pub fn tables(&self) -> Vec<&TableRef> {
        let mut names: Vec<&TableRef> = self.tables.keys().collect();
        names.sort();
        names
    }
}

impl Catalog for InMemoryCatalog {
    fn get_table_stats(&self, table: &TableRef) -> Option<Statistics> {
        self.tables.get(table).map(|t| t.stats.clone())
    }

    fn get_table_columns(&self, table: &TableRef) -> Option<Vec<ColumnRef>> {
        self.tables.get(table).map(|t| t.columns.clone())
    }
}
