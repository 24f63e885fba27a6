//! Plan execution - apply additive DDL, one unit of work at a time.
//!
//! Each operation stands alone: a failure is recorded against its table and
//! the pass moves on, so one broken table never blocks the rest of startup.
//! Several process instances may run the same plan concurrently (rolling
//! deploys); every operation re-checks existence right before applying and
//! the driver implementation treats "already exists" answers from the
//! database as success, so the losers of a race still finish cleanly.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Instant;

use tokio_postgres::Client;
use tokio_postgres::error::SqlState;

use crate::catalog::Inspect;
use crate::plan::{DriftWarning, Op, Plan, TablePlan};
use crate::schema::{
    Column, ForeignKey, Index, Table, add_column_sql, add_foreign_key_sql, create_index_sql,
};
use crate::Result;

/// Write access to the schema.
///
/// Implementations must be idempotent: applying an operation that another
/// instance already applied is success, not failure.
pub trait Ddl: Send + Sync {
    fn create_table(&self, table: &Table) -> impl Future<Output = Result<()>> + Send;

    fn add_column(&self, table: &str, column: &Column) -> impl Future<Output = Result<()>> + Send;

    fn create_index(&self, table: &str, index: &Index) -> impl Future<Output = Result<()>> + Send;

    fn add_foreign_key(
        &self,
        table: &str,
        fk: &ForeignKey,
    ) -> impl Future<Output = Result<()>> + Send;
}

impl Ddl for Client {
    async fn create_table(&self, table: &Table) -> Result<()> {
        exec_ddl(self, &table.to_create_table_sql()).await
    }

    async fn add_column(&self, table: &str, column: &Column) -> Result<()> {
        exec_ddl(self, &add_column_sql(table, column)).await
    }

    async fn create_index(&self, table: &str, index: &Index) -> Result<()> {
        exec_ddl(self, &create_index_sql(table, index)).await
    }

    async fn add_foreign_key(&self, table: &str, fk: &ForeignKey) -> Result<()> {
        exec_ddl(self, &add_foreign_key_sql(table, fk)).await
    }
}

async fn exec_ddl(client: &Client, sql: &str) -> Result<()> {
    match client.batch_execute(sql).await {
        Ok(()) => Ok(()),
        // Another instance got there first; the object we wanted exists.
        Err(e) if is_duplicate_object(&e) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn is_duplicate_object(e: &tokio_postgres::Error) -> bool {
    matches!(
        e.code(),
        Some(code)
            if *code == SqlState::DUPLICATE_TABLE
                || *code == SqlState::DUPLICATE_COLUMN
                || *code == SqlState::DUPLICATE_OBJECT
    )
}

/// What happened to one table during a pass.
#[derive(Debug, Clone, PartialEq)]
pub enum TableStatus {
    /// The table was created from scratch.
    Created,
    /// The table was already in the declared shape.
    AlreadyExists,
    /// The table existed and missing pieces were added.
    Patched,
    /// At least one operation failed for a reason other than "already
    /// exists". The table may be partially reconciled.
    Failed { reason: String },
}

impl std::fmt::Display for TableStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableStatus::Created => write!(f, "created"),
            TableStatus::AlreadyExists => write!(f, "already exists"),
            TableStatus::Patched => write!(f, "patched"),
            TableStatus::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Per-table outcome of a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TableOutcome {
    pub table: String,
    pub status: TableStatus,
}

/// The aggregated outcome of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// One outcome per planned table, in execution order. Shorter than the
    /// plan when the pass timed out.
    pub tables: Vec<TableOutcome>,
    /// Drift carried over from the plan.
    pub warnings: Vec<DriftWarning>,
    /// The deadline cut the pass short.
    pub timed_out: bool,
}

impl ReconcileReport {
    /// True only if every table was handled and none failed.
    pub fn success(&self) -> bool {
        !self.timed_out
            && self
                .tables
                .iter()
                .all(|t| !matches!(t.status, TableStatus::Failed { .. }))
    }

    pub fn failed_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| matches!(t.status, TableStatus::Failed { .. }))
            .map(|t| t.table.as_str())
            .collect()
    }
}

impl std::fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for outcome in &self.tables {
            writeln!(f, "  {}: {}", outcome.table, outcome.status)?;
        }
        for warning in &self.warnings {
            writeln!(f, "  drift: {}", warning)?;
        }
        if self.timed_out {
            writeln!(f, "  (stopped at the deadline)")?;
        }
        Ok(())
    }
}

fn past(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

/// Apply a plan. Catalog reads go through `Inspect` so every mutating
/// operation can re-check existence immediately before running; failures
/// land in the report, they are never raised.
pub async fn execute<D>(
    db: &D,
    plan: &Plan,
    schema: &str,
    deadline: Option<Instant>,
) -> ReconcileReport
where
    D: Inspect + Ddl,
{
    let mut report = ReconcileReport {
        tables: Vec::with_capacity(plan.tables.len()),
        warnings: plan.warnings.clone(),
        timed_out: false,
    };

    for table_plan in &plan.tables {
        if past(deadline) {
            report.timed_out = true;
            break;
        }
        let (status, cut_short) = apply_table(db, schema, table_plan, deadline).await;
        report.tables.push(TableOutcome {
            table: table_plan.table.clone(),
            status,
        });
        if cut_short {
            report.timed_out = true;
            break;
        }
    }

    report
}

/// Run one table's operations. Returns the table's status and whether the
/// deadline stopped the pass.
async fn apply_table<D>(
    db: &D,
    schema: &str,
    table_plan: &TablePlan,
    deadline: Option<Instant>,
) -> (TableStatus, bool)
where
    D: Inspect + Ddl,
{
    let mut failure: Option<String> = None;
    let mut created = false;
    let mut applied = 0usize;

    for op in &table_plan.ops {
        if past(deadline) {
            return (resolve(failure, created, applied), true);
        }

        match op {
            Op::CreateTable(table) => {
                match db.describe_table(schema, &table.name).await {
                    // Another instance created it between planning and now.
                    Ok(Some(_)) => {}
                    Ok(None) => match db.create_table(table).await {
                        Ok(()) => {
                            created = true;
                            applied += 1;
                        }
                        Err(e) => {
                            // Without the table, its indices and keys are
                            // hopeless; skip them and move to the next table.
                            failure = Some(e.to_string());
                            break;
                        }
                    },
                    Err(e) => {
                        failure = Some(e.to_string());
                        break;
                    }
                }
            }
            Op::AddColumn { column } => {
                let current = match observed_now(db, schema, &table_plan.table).await {
                    Ok(t) => t,
                    Err(reason) => {
                        record(&mut failure, reason);
                        continue;
                    }
                };
                if current.columns.contains(&column.name) {
                    continue;
                }
                match db.add_column(&table_plan.table, column).await {
                    Ok(()) => applied += 1,
                    Err(e) => record(&mut failure, e.to_string()),
                }
            }
            Op::AddIndex { index } => {
                let current = match observed_now(db, schema, &table_plan.table).await {
                    Ok(t) => t,
                    Err(reason) => {
                        record(&mut failure, reason);
                        continue;
                    }
                };
                if current.index_columns.contains(&index.columns) {
                    continue;
                }
                match db.create_index(&table_plan.table, index).await {
                    Ok(()) => applied += 1,
                    Err(e) => record(&mut failure, e.to_string()),
                }
            }
            Op::AddForeignKey { fk } => {
                let current = match observed_now(db, schema, &table_plan.table).await {
                    Ok(t) => t,
                    Err(reason) => {
                        record(&mut failure, reason);
                        continue;
                    }
                };
                let key = fk_key(fk);
                if current.fk_keys.contains(&key) {
                    continue;
                }
                match db.add_foreign_key(&table_plan.table, fk).await {
                    Ok(()) => applied += 1,
                    Err(e) => record(&mut failure, e.to_string()),
                }
            }
        }
    }

    (resolve(failure, created, applied), false)
}

/// Keep the first failure; later ones on the same table are usually noise
/// from the same root cause.
fn record(failure: &mut Option<String>, reason: String) {
    if failure.is_none() {
        *failure = Some(reason);
    }
}

fn resolve(failure: Option<String>, created: bool, applied: usize) -> TableStatus {
    match failure {
        Some(reason) => TableStatus::Failed { reason },
        None if created => TableStatus::Created,
        None if applied > 0 => TableStatus::Patched,
        None => TableStatus::AlreadyExists,
    }
}

/// A snapshot of the parts of a table the existence re-checks care about.
struct CurrentShape {
    columns: BTreeSet<String>,
    index_columns: BTreeSet<Vec<String>>,
    fk_keys: BTreeSet<String>,
}

fn fk_key(fk: &ForeignKey) -> String {
    format!(
        "{}->{}.{}",
        fk.column, fk.references_table, fk.references_column
    )
}

async fn observed_now<D: Inspect>(
    db: &D,
    schema: &str,
    table: &str,
) -> std::result::Result<CurrentShape, String> {
    match db.describe_table(schema, table).await {
        Ok(Some(t)) => Ok(CurrentShape {
            columns: t.columns.into_iter().map(|c| c.name).collect(),
            index_columns: t.indices.into_iter().map(|i| i.columns).collect(),
            fk_keys: t.foreign_keys.iter().map(fk_key).collect(),
        }),
        // The table is gone; let the statement run and report its own error.
        Ok(None) => Ok(CurrentShape {
            columns: BTreeSet::new(),
            index_columns: BTreeSet::new(),
            fk_keys: BTreeSet::new(),
        }),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeDb;
    use crate::plan::build_plan;
    use crate::tables;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    async fn plan_against(db: &FakeDb, desired: &crate::Schema) -> Plan {
        let observed = crate::reconcile::observe(db, desired, "public")
            .await
            .unwrap();
        build_plan(desired, &observed).unwrap()
    }

    #[tokio::test]
    async fn empty_database_reports_seven_created() {
        let db = FakeDb::new();
        let desired = tables::startup();
        let plan = plan_against(&db, &desired).await;

        let report = execute(&db, &plan, "public", None).await;

        assert!(report.success());
        assert_eq!(report.tables.len(), 7);
        assert!(
            report
                .tables
                .iter()
                .all(|t| t.status == TableStatus::Created)
        );
        assert_eq!(db.table_names().len(), 7);
    }

    #[tokio::test]
    async fn existing_tables_report_already_exists() {
        let desired = tables::startup();
        let db = FakeDb::with_tables([desired.tables[0].clone(), desired.tables[1].clone()]);
        let plan = plan_against(&db, &desired).await;

        let report = execute(&db, &plan, "public", None).await;

        assert!(report.success());
        let by_status = |status: &TableStatus| {
            report
                .tables
                .iter()
                .filter(|t| &t.status == status)
                .map(|t| t.table.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(by_status(&TableStatus::AlreadyExists), ["users", "vehicles"]);
        assert_eq!(by_status(&TableStatus::Created).len(), 5);
    }

    #[tokio::test]
    async fn missing_column_patches_and_re_diff_is_empty() {
        let desired = tables::startup();
        let mut seeded: Vec<Table> = desired.tables.clone();
        for table in &mut seeded {
            if table.name == "requests" {
                table.columns.retain(|c| c.name != "orderNotes");
            }
        }
        let db = FakeDb::with_tables(seeded);

        let plan = plan_against(&db, &desired).await;
        assert_eq!(plan.op_count(), 1);

        let report = execute(&db, &plan, "public", None).await;
        assert!(report.success());
        let requests = report
            .tables
            .iter()
            .find(|t| t.table == "requests")
            .unwrap();
        assert_eq!(requests.status, TableStatus::Patched);

        let replanned = plan_against(&db, &desired).await;
        assert!(replanned.is_empty());
    }

    #[tokio::test]
    async fn one_broken_table_does_not_stop_the_others() {
        let db = FakeDb::new().fail_table("supplier");
        let desired = tables::startup();
        let plan = plan_against(&db, &desired).await;

        let report = execute(&db, &plan, "public", None).await;

        assert!(!report.success());
        assert_eq!(report.failed_tables(), ["supplier"]);
        // Tables planned both before and after the failure still ran.
        for table in ["users", "vehicles", "requests", "request_images_backup"] {
            let outcome = report.tables.iter().find(|t| t.table == table).unwrap();
            assert_eq!(outcome.status, TableStatus::Created, "{table}");
        }
    }

    #[tokio::test]
    async fn failed_dependency_fails_referrers_but_nothing_else() {
        // users never comes up, so every foreign key into it must fail,
        // while the unrelated tables still reconcile.
        let db = FakeDb::new().fail_table("users");
        let desired = tables::startup();
        let plan = plan_against(&db, &desired).await;

        let report = execute(&db, &plan, "public", None).await;

        assert!(!report.success());
        assert_eq!(report.failed_tables(), ["users", "vehicles", "requests"]);
        for table in [
            "supplier",
            "request_images",
            "requestbackup",
            "request_images_backup",
        ] {
            let outcome = report.tables.iter().find(|t| t.table == table).unwrap();
            assert_eq!(outcome.status, TableStatus::Created, "{table}");
        }
    }

    #[tokio::test]
    async fn concurrent_passes_both_succeed_with_one_copy_of_each_table() {
        let db = Arc::new(FakeDb::new());
        let desired = tables::startup();
        let plan = plan_against(&db, &desired).await;

        let left = tokio::spawn({
            let db = Arc::clone(&db);
            let plan = plan.clone();
            async move { execute(&*db, &plan, "public", None).await }
        });
        let right = tokio::spawn({
            let db = Arc::clone(&db);
            let plan = plan.clone();
            async move { execute(&*db, &plan, "public", None).await }
        });

        let (left, right) = (left.await.unwrap(), right.await.unwrap());

        assert!(left.success(), "left failed: {left}");
        assert!(right.success(), "right failed: {right}");
        assert_eq!(db.table_names().len(), 7);

        let replanned = plan_against(&db, &desired).await;
        assert!(replanned.is_empty());
    }

    #[tokio::test]
    async fn an_expired_deadline_stops_the_pass() {
        let db = FakeDb::new();
        let desired = tables::startup();
        let plan = plan_against(&db, &desired).await;

        let deadline = Instant::now() - Duration::from_secs(1);
        let report = execute(&db, &plan, "public", Some(deadline)).await;

        assert!(report.timed_out);
        assert!(!report.success());
        assert!(report.tables.is_empty());
        assert!(db.table_names().is_empty());
    }

    #[tokio::test]
    async fn empty_plan_reports_every_table_untouched() {
        let desired = tables::startup();
        let db = FakeDb::with_tables(desired.tables.clone());
        let plan = build_plan(
            &desired,
            &desired
                .tables
                .iter()
                .map(|t| (t.name.clone(), t.clone()))
                .collect::<BTreeMap<_, _>>(),
        )
        .unwrap();
        assert!(plan.is_empty());

        let report = execute(&db, &plan, "public", None).await;
        assert!(report.success());
        assert_eq!(report.tables.len(), 7);
        assert!(
            report
                .tables
                .iter()
                .all(|t| t.status == TableStatus::AlreadyExists)
        );
    }
}
