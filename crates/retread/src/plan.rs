//! Plan building - diff the declared schema against the observed one.
//!
//! The output is additive by construction: [`Op`] has no drop, rename, or
//! alter variant. An existing object whose definition differs from the
//! declared one becomes a [`DriftWarning`] and is otherwise left alone.

use std::collections::{BTreeMap, BTreeSet};

use crate::schema::{
    Column, ForeignKey, Index, Schema, SqlType, Table, add_column_sql, add_foreign_key_sql,
    create_index_sql,
};
use crate::{Error, Result};

/// A single additive schema operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Create a table with its full column set.
    CreateTable(Table),
    /// Add a missing column to an existing table.
    AddColumn { column: Column },
    /// Create a missing index.
    AddIndex { index: Index },
    /// Add a missing foreign key constraint.
    AddForeignKey { fk: ForeignKey },
}

impl Op {
    /// Render the operation as SQL against the given table.
    pub fn to_sql(&self, table: &str) -> String {
        match self {
            Op::CreateTable(t) => t.to_create_table_sql(),
            Op::AddColumn { column } => add_column_sql(table, column),
            Op::AddIndex { index } => create_index_sql(table, index),
            Op::AddForeignKey { fk } => add_foreign_key_sql(table, fk),
        }
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Op::CreateTable(t) => write!(f, "+ table {}", t.name),
            Op::AddColumn { column } => {
                let nullable = if column.nullable { " (nullable)" } else { "" };
                write!(f, "+ {}: {}{}", column.name, column.sql_type, nullable)
            }
            Op::AddIndex { index } => {
                write!(f, "+ INDEX {} ({})", index.name, index.columns.join(", "))
            }
            Op::AddForeignKey { fk } => {
                write!(
                    f,
                    "+ FOREIGN KEY ({}) -> {}.{}",
                    fk.column, fk.references_table, fk.references_column
                )
            }
        }
    }
}

/// The operations for one table, in application order:
/// create, then columns, then indices, then foreign keys.
#[derive(Debug, Clone)]
pub struct TablePlan {
    /// Table name.
    pub table: String,
    /// Pending operations; empty when the table is already in shape.
    pub ops: Vec<Op>,
}

/// Everything a reconciliation pass intends to do.
///
/// Tables appear in foreign-key dependency order. A table that needs
/// nothing still gets an (empty) entry so the executor can report it.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// Per-table operations, in dependency order.
    pub tables: Vec<TablePlan>,
    /// Differences that are reported but never auto-corrected.
    pub warnings: Vec<DriftWarning>,
}

impl Plan {
    /// True if no operations are pending. Warnings do not count: drift is
    /// not something a pass will act on.
    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(|t| t.ops.is_empty())
    }

    /// Count pending operations.
    pub fn op_count(&self) -> usize {
        self.tables.iter().map(|t| t.ops.len()).sum()
    }

    /// Generate the SQL for all pending operations.
    pub fn to_sql(&self) -> String {
        let mut sql = String::new();
        for tp in &self.tables {
            if tp.ops.is_empty() {
                continue;
            }
            sql.push_str(&format!("-- {}\n", tp.table));
            for op in &tp.ops {
                sql.push_str(&op.to_sql(&tp.table));
                sql.push('\n');
            }
            sql.push('\n');
        }
        sql.trim_end().to_string()
    }
}

/// An existing object whose definition differs from the declared one.
///
/// Reported, never resolved: rewriting a live column is exactly the kind of
/// destructive surprise this crate exists to avoid.
#[derive(Debug, Clone, PartialEq)]
pub struct DriftWarning {
    /// Table the object belongs to.
    pub table: String,
    /// Column or index name.
    pub object: String,
    /// Human-readable description of the mismatch.
    pub detail: String,
}

impl std::fmt::Display for DriftWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}: {}", self.table, self.object, self.detail)
    }
}

/// Order tables so every foreign-key target comes before its referrer.
///
/// Ties break by declaration order, which keeps the backup tables (no
/// foreign keys by design) right after the tables they shadow. A declared
/// cycle is a configuration bug and fails before any DDL runs, as does a
/// reference to a table that is not declared at all.
pub fn dependency_order(schema: &Schema) -> Result<Vec<usize>> {
    let n = schema.tables.len();
    let index_of: BTreeMap<&str, usize> = schema
        .tables
        .iter()
        .enumerate()
        .map(|(i, t)| (t.name.as_str(), i))
        .collect();

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut indegree: Vec<usize> = vec![0; n];
    for (i, table) in schema.tables.iter().enumerate() {
        let mut seen = BTreeSet::new();
        for fk in &table.foreign_keys {
            if fk.references_table == table.name {
                continue; // self-references don't affect creation order
            }
            let Some(&target) = index_of.get(fk.references_table.as_str()) else {
                return Err(Error::MissingReference {
                    table: table.name.clone(),
                    references: fk.references_table.clone(),
                });
            };
            if seen.insert(target) {
                dependents[target].push(i);
                indegree[i] += 1;
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &j in &dependents[i] {
            indegree[j] -= 1;
            if indegree[j] == 0 {
                ready.insert(j);
            }
        }
    }

    if order.len() != n {
        let placed: BTreeSet<usize> = order.iter().copied().collect();
        let stuck = schema
            .tables
            .iter()
            .enumerate()
            .find(|(i, _)| !placed.contains(i))
            .map(|(_, t)| t.name.clone())
            .unwrap_or_default();
        return Err(Error::DependencyCycle(stuck));
    }

    Ok(order)
}

/// Diff the declared schema against the observed tables and produce the
/// minimal additive plan.
pub fn build_plan(desired: &Schema, observed: &BTreeMap<String, Table>) -> Result<Plan> {
    let order = dependency_order(desired)?;

    let mut plan = Plan::default();
    for i in order {
        let table = &desired.tables[i];
        let ops = match observed.get(&table.name) {
            None => creation_ops(table),
            Some(current) => diff_table(table, current, &mut plan.warnings),
        };
        plan.tables.push(TablePlan {
            table: table.name.clone(),
            ops,
        });
    }

    Ok(plan)
}

/// All operations needed for a table that does not exist yet.
///
/// Single source of truth for table creation, so indices and foreign keys
/// can't be forgotten when a new table is declared.
fn creation_ops(table: &Table) -> Vec<Op> {
    let mut ops = Vec::with_capacity(1 + table.indices.len() + table.foreign_keys.len());

    ops.push(Op::CreateTable(table.clone()));

    for index in &table.indices {
        ops.push(Op::AddIndex {
            index: index.clone(),
        });
    }

    for fk in &table.foreign_keys {
        ops.push(Op::AddForeignKey { fk: fk.clone() });
    }

    ops
}

/// Diff one declared table against its observed counterpart.
fn diff_table(desired: &Table, current: &Table, warnings: &mut Vec<DriftWarning>) -> Vec<Op> {
    let mut ops = Vec::new();

    // Columns are matched by name; missing ones are added with their
    // declared default so the statement succeeds on a populated table.
    for column in &desired.columns {
        match current.columns.iter().find(|c| c.name == column.name) {
            None => ops.push(Op::AddColumn {
                column: column.clone(),
            }),
            Some(existing) => {
                if let Some(detail) = column_drift(column, existing) {
                    warnings.push(DriftWarning {
                        table: desired.name.clone(),
                        object: column.name.clone(),
                        detail,
                    });
                }
            }
        }
    }

    // Indices match by column list, not name: index naming has been
    // inconsistent across prior runs of the legacy scripts.
    for index in &desired.indices {
        match current.indices.iter().find(|i| i.columns == index.columns) {
            None => ops.push(Op::AddIndex {
                index: index.clone(),
            }),
            Some(existing) if existing.unique != index.unique => {
                warnings.push(DriftWarning {
                    table: desired.name.clone(),
                    object: index.name.clone(),
                    detail: format!(
                        "index on ({}) is {} in the database",
                        index.columns.join(", "),
                        if existing.unique { "unique" } else { "non-unique" }
                    ),
                });
            }
            Some(_) => {}
        }
    }

    for fk in &desired.foreign_keys {
        let found = current.foreign_keys.iter().find(|f| {
            f.column == fk.column
                && f.references_table == fk.references_table
                && f.references_column == fk.references_column
        });
        match found {
            None => ops.push(Op::AddForeignKey { fk: fk.clone() }),
            Some(existing) if existing.on_delete != fk.on_delete => {
                warnings.push(DriftWarning {
                    table: desired.name.clone(),
                    object: fk.column.clone(),
                    detail: format!(
                        "foreign key to {}.{} has a different delete rule in the database",
                        fk.references_table, fk.references_column
                    ),
                });
            }
            Some(_) => {}
        }
    }

    ops
}

fn column_drift(desired: &Column, observed: &Column) -> Option<String> {
    if let Some(detail) = type_drift(&desired.sql_type, &observed.sql_type) {
        return Some(detail);
    }
    if desired.nullable != observed.nullable {
        return Some(
            if desired.nullable {
                "declared nullable, NOT NULL in the database"
            } else {
                "declared NOT NULL, nullable in the database"
            }
            .to_string(),
        );
    }
    None
}

fn type_drift(desired: &SqlType, observed: &SqlType) -> Option<String> {
    match (desired, observed) {
        (a, b) if a == b => None,
        // Enumerated columns are stored as TEXT; reading TEXT back is the
        // expected round trip, not drift.
        (SqlType::Enum(_), SqlType::Text) => None,
        (a, b) => Some(format!("declared {}, {} in the database", a, b)),
    }
}
