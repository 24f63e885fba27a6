//! Additive schema reconciliation for the tyre-management database.
//!
//! The host application calls [`reconcile`] once at startup: the live
//! catalog is inspected, the tables declared in [`tables`] are diffed
//! against it, and whatever is missing is created with additive DDL only.
//! Nothing is ever dropped or rewritten in place; an existing object whose
//! definition differs from the declared one is reported as drift instead of
//! being "fixed".
//!
//! ```ignore
//! let (client, _driver) = retread::connect(&options).await?;
//! let desired = retread::tables::startup();
//! let report = retread::reconcile(&client, &desired, &ReconcileOptions::default()).await?;
//! if !report.success() {
//!     tracing::warn!("running with incomplete schema:\n{report}");
//! }
//! ```
//!
//! A failed reconciliation is not fatal: the report says which tables are
//! broken, and the caller keeps serving whatever still works. The same pass
//! may run concurrently from several process instances (rolling deploys);
//! every operation tolerates having been applied by somebody else first.

mod catalog;
mod connect;
mod error;
mod execute;
mod plan;
mod reconcile;
pub mod schema;
pub mod tables;

#[cfg(test)]
mod fake;

pub use catalog::Inspect;
pub use connect::{ConnectOptions, TlsMode, connect};
pub use error::Error;
pub use execute::{Ddl, ReconcileReport, TableOutcome, TableStatus, execute};
pub use plan::{DriftWarning, Op, Plan, TablePlan, build_plan, dependency_order};
pub use reconcile::{ReconcileOptions, observe, reconcile};
pub use schema::{Column, ForeignKey, Index, OnDelete, Schema, SqlType, Table};

/// Quote a SQL identifier.
///
/// Always quotes to avoid issues with reserved words and with the
/// mixed-case column names the tyre schema inherited (`vehicleNumber`,
/// `CostCenter`, ...). Doubles any embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Result type for retread operations.
pub type Result<T> = std::result::Result<T, Error>;
