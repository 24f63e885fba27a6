//! An in-memory database for tests.
//!
//! Implements [`Inspect`] and [`Ddl`] over a mutex-held table map, with
//! the same contracts as the real driver: creating something that exists
//! is success, mutating a table that failed to come up is an error, and a
//! foreign key to a missing table is rejected. Every method yields to the
//! scheduler first so concurrent passes actually interleave.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Mutex;

use crate::catalog::Inspect;
use crate::execute::Ddl;
use crate::schema::{Column, ForeignKey, Index, Table};
use crate::{Error, Result};

#[derive(Default)]
pub(crate) struct FakeDb {
    tables: Mutex<BTreeMap<String, Table>>,
    fail: HashSet<String>,
    catalog_down: bool,
}

impl FakeDb {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Start with these tables already in place.
    pub(crate) fn with_tables(tables: impl IntoIterator<Item = Table>) -> Self {
        let map = tables.into_iter().map(|t| (t.name.clone(), t)).collect();
        Self {
            tables: Mutex::new(map),
            ..Self::default()
        }
    }

    /// Every DDL statement touching this table fails.
    pub(crate) fn fail_table(mut self, name: &str) -> Self {
        self.fail.insert(name.to_string());
        self
    }

    /// Every catalog read fails, as if the database were unreachable.
    pub(crate) fn catalog_down(mut self) -> Self {
        self.catalog_down = true;
        self
    }

    pub(crate) fn table_names(&self) -> Vec<String> {
        self.tables.lock().unwrap().keys().cloned().collect()
    }

    fn check_reachable(&self) -> Result<()> {
        if self.catalog_down {
            return Err(Error::CatalogUnavailable(
                "connection refused (injected)".to_string(),
            ));
        }
        Ok(())
    }

    fn check_ddl_allowed(&self, table: &str) -> Result<()> {
        if self.fail.contains(table) {
            return Err(Error::Ddl(format!("injected failure for {table}")));
        }
        Ok(())
    }
}

impl Inspect for FakeDb {
    async fn list_tables(&self, _schema: &str) -> Result<BTreeSet<String>> {
        tokio::task::yield_now().await;
        self.check_reachable()?;
        Ok(self.tables.lock().unwrap().keys().cloned().collect())
    }

    async fn describe_table(&self, _schema: &str, table: &str) -> Result<Option<Table>> {
        tokio::task::yield_now().await;
        self.check_reachable()?;
        Ok(self.tables.lock().unwrap().get(table).cloned())
    }
}

impl Ddl for FakeDb {
    async fn create_table(&self, table: &Table) -> Result<()> {
        tokio::task::yield_now().await;
        self.check_ddl_allowed(&table.name)?;
        let mut tables = self.tables.lock().unwrap();
        // CREATE TABLE IF NOT EXISTS: a loser of the race keeps what the
        // winner made. Indices and keys arrive as their own statements.
        tables.entry(table.name.clone()).or_insert_with(|| Table {
            name: table.name.clone(),
            columns: table.columns.clone(),
            foreign_keys: Vec::new(),
            indices: Vec::new(),
        });
        Ok(())
    }

    async fn add_column(&self, table: &str, column: &Column) -> Result<()> {
        tokio::task::yield_now().await;
        self.check_ddl_allowed(table)?;
        let mut tables = self.tables.lock().unwrap();
        let Some(t) = tables.get_mut(table) else {
            return Err(Error::Ddl(format!("table {table} does not exist")));
        };
        if !t.columns.iter().any(|c| c.name == column.name) {
            t.columns.push(column.clone());
        }
        Ok(())
    }

    async fn create_index(&self, table: &str, index: &Index) -> Result<()> {
        tokio::task::yield_now().await;
        self.check_ddl_allowed(table)?;
        let mut tables = self.tables.lock().unwrap();
        let Some(t) = tables.get_mut(table) else {
            return Err(Error::Ddl(format!("table {table} does not exist")));
        };
        if !t.indices.iter().any(|i| i.columns == index.columns) {
            t.indices.push(index.clone());
        }
        Ok(())
    }

    async fn add_foreign_key(&self, table: &str, fk: &ForeignKey) -> Result<()> {
        tokio::task::yield_now().await;
        self.check_ddl_allowed(table)?;
        let mut tables = self.tables.lock().unwrap();
        if !tables.contains_key(&fk.references_table) {
            return Err(Error::Ddl(format!(
                "referenced table {} does not exist",
                fk.references_table
            )));
        }
        let Some(t) = tables.get_mut(table) else {
            return Err(Error::Ddl(format!("table {table} does not exist")));
        };
        let present = t.foreign_keys.iter().any(|f| {
            f.column == fk.column
                && f.references_table == fk.references_table
                && f.references_column == fk.references_column
        });
        if !present {
            t.foreign_keys.push(fk.clone());
        }
        Ok(())
    }
}
