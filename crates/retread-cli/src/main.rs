//! Command-line entry point for schema reconciliation.
//!
//! `retread reconcile` is what the deployment runs at boot, ahead of the
//! application server. It exits 0 whatever happens: a broken schema
//! degrades the endpoints that need the broken tables, it must not keep
//! the process (and its health checks) from coming up.

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use retread::{ConnectOptions, ReconcileOptions, Schema, TlsMode, tables};
use retread_config::DbConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "retread", version, about = "Schema reconciler for the tyre-management database")]
struct Cli {
    /// Include the provisioning tables (suppliers, requestimages,
    /// tiredetails) as well as the startup set.
    #[arg(long, global = true)]
    full: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Bring the database schema up to the declared shape (the default).
    Reconcile {
        /// Stop issuing operations after this many seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Show the operations a reconcile run would apply, without applying.
    Plan,
    /// Print the declared schema as SQL.
    Schema,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env if present; the deployment injects real env vars instead.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let desired = if cli.full {
        tables::full()
    } else {
        tables::startup()
    };

    match cli.command.unwrap_or(Command::Reconcile { timeout_secs: None }) {
        Command::Schema => {
            println!("{}", desired.to_sql());
            ExitCode::SUCCESS
        }
        Command::Plan => match run_plan(&desired).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(error = %e, "plan failed");
                ExitCode::FAILURE
            }
        },
        Command::Reconcile { timeout_secs } => {
            // Exit 0 no matter what: reconciliation failure is a degraded
            // start, not a failed one.
            if let Err(e) = run_reconcile(&desired, timeout_secs).await {
                tracing::error!(error = %e, "schema reconciliation failed; continuing without it");
            }
            ExitCode::SUCCESS
        }
    }
}

async fn run_reconcile(desired: &Schema, timeout_secs: Option<u64>) -> anyhow::Result<()> {
    let config = DbConfig::from_env()?;
    let (client, _driver) = retread::connect(&connect_options(&config)).await?;

    let opts = ReconcileOptions {
        schema_name: config.schema.clone(),
        timeout: timeout_secs.map(Duration::from_secs),
    };
    let report = retread::reconcile(&client, desired, &opts).await?;

    if report.success() {
        tracing::info!("schema reconciliation complete");
    } else {
        tracing::warn!(
            failed = ?report.failed_tables(),
            "schema reconciliation incomplete\n{report}"
        );
    }
    Ok(())
}

async fn run_plan(desired: &Schema) -> anyhow::Result<()> {
    let config = DbConfig::from_env()?;
    let (client, _driver) = retread::connect(&connect_options(&config)).await?;

    let observed = retread::observe(&client, desired, &config.schema).await?;
    let plan = retread::build_plan(desired, &observed)?;

    for warning in &plan.warnings {
        tracing::warn!("schema drift: {warning}");
    }
    if plan.is_empty() {
        println!("schema is up to date");
    } else {
        println!("{}", plan.to_sql());
    }
    Ok(())
}

fn connect_options(config: &DbConfig) -> ConnectOptions {
    ConnectOptions {
        host: config.host.clone(),
        port: config.port,
        user: config.user.clone(),
        password: config.password.clone(),
        dbname: config.database.clone(),
        tls: if config.ssl {
            TlsMode::RequireInsecure
        } else {
            TlsMode::Disabled
        },
    }
}
