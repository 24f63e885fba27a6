//! Startup coordination: observe, plan, execute, report.
//!
//! The host calls [`reconcile`] once at boot. Whatever the outcome, the
//! process keeps running: a broken schema degrades the endpoints that
//! touch the broken tables, it does not take down health checks.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::catalog::Inspect;
use crate::execute::{Ddl, ReconcileReport, TableStatus, execute};
use crate::plan::build_plan;
use crate::schema::{Schema, Table};
use crate::Result;

/// Options for one reconciliation pass.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Schema the catalog queries filter on. Must match the connection's
    /// default schema, since the DDL itself is unqualified.
    pub schema_name: String,
    /// Overall budget for the pass. Once spent, no further operations are
    /// issued and the partial report comes back with `timed_out` set.
    pub timeout: Option<Duration>,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            schema_name: "public".to_string(),
            timeout: None,
        }
    }
}

/// Read the current shape of every declared table.
///
/// Observation is always fresh: nothing is cached between passes, since
/// drift detection has to reflect what is true right now.
pub async fn observe<D: Inspect>(
    db: &D,
    desired: &Schema,
    schema_name: &str,
) -> Result<BTreeMap<String, Table>> {
    let existing = db.list_tables(schema_name).await?;

    let mut observed = BTreeMap::new();
    for table in &desired.tables {
        if !existing.contains(&table.name) {
            continue;
        }
        if let Some(current) = db.describe_table(schema_name, &table.name).await? {
            observed.insert(table.name.clone(), current);
        }
    }

    Ok(observed)
}

/// Run one reconciliation pass: observe the catalog, build the additive
/// plan, apply it, and log the per-table outcome.
///
/// An unreachable catalog or a bad declaration (cycle, undeclared
/// reference) returns `Err` before any DDL runs. Everything past that
/// point returns `Ok`: per-operation failures are recorded in the report,
/// and retrying is the next process start's job, not this pass's.
pub async fn reconcile<D>(db: &D, desired: &Schema, opts: &ReconcileOptions) -> Result<ReconcileReport>
where
    D: Inspect + Ddl,
{
    let deadline = opts.timeout.map(|t| Instant::now() + t);

    let observed = observe(db, desired, &opts.schema_name).await?;
    let plan = build_plan(desired, &observed)?;

    for warning in &plan.warnings {
        warn!(table = %warning.table, "schema drift: {}", warning);
    }

    if plan.is_empty() {
        debug!("schema already up to date");
    } else {
        info!(operations = plan.op_count(), "applying schema changes");
    }

    let report = execute(db, &plan, &opts.schema_name, deadline).await;

    for outcome in &report.tables {
        match &outcome.status {
            TableStatus::Failed { reason } => {
                warn!(table = %outcome.table, %reason, "table not reconciled");
            }
            status => {
                info!(table = %outcome.table, "{}", status);
            }
        }
    }
    if report.timed_out {
        warn!("reconciliation hit its deadline; remaining tables untouched");
    }

    Ok(report)
}
