//! Verification Status Reconcile CLI
//!
//! Recomputes the expected verification status from form records and stage
//! timestamps, reports drift, and (unless `--dry-run`) repairs non-terminal
//! drift with a logged system correction.
//!
//! Usage:
//!   cargo run --features cli --bin fieldforce_reconcile -- \
//!     --actor 6f1c... --dry-run
//!
//! Examples:
//!   # Report drift across every marketer, change nothing
//!   cargo run --features cli --bin fieldforce_reconcile -- --actor $MASTER --dry-run
//!
//!   # Repair one marketer
//!   cargo run --features cli --bin fieldforce_reconcile -- \
//!     --actor $MASTER --marketer 0b2e...
//!
//!   # Machine-readable sweep report
//!   cargo run --features cli --bin fieldforce_reconcile -- --actor $MASTER --json

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use uuid::Uuid;

use fieldforce_kyc::store::{PgStore, VerificationStore};
use fieldforce_kyc::{
    CoreConfig, ReconcileOutcome, ReconcileReport, Role, StatusReconciler, TracingNotifier,
};

/// Reconcile stored verification statuses against the facts
#[derive(Parser, Debug)]
#[command(name = "fieldforce_reconcile")]
#[command(about = "Detect and repair verification status drift")]
struct Args {
    /// Master admin performing the reconciliation
    #[arg(long, short = 'a', env = "FIELDFORCE_ACTOR_ID")]
    actor: Uuid,

    /// Reconcile a single marketer instead of sweeping all of them
    #[arg(long, short = 'm')]
    marketer: Option<Uuid>,

    /// Report drift without writing anything
    #[arg(long, short = 'n')]
    dry_run: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// YAML config file (defaults to environment variables)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Apply the bundled schema before running
    #[arg(long)]
    migrate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => CoreConfig::from_yaml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => CoreConfig::from_env().context("loading config from environment")?,
    };
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set")?;

    let pool = sqlx::PgPool::connect(database_url)
        .await
        .context("connecting to database")?;
    let store = Arc::new(PgStore::new(pool));
    if args.migrate {
        store.migrate().await.context("applying schema")?;
    }

    let actor_user = store
        .get_user(args.actor)
        .await?
        .with_context(|| format!("actor {} not found", args.actor))?;
    if actor_user.role != Role::MasterAdmin {
        bail!(
            "actor {} is a {}, reconciliation needs a master admin",
            actor_user.id,
            actor_user.role
        );
    }
    let actor = actor_user.actor();

    let reconciler = StatusReconciler::new(store.clone(), Arc::new(TracingNotifier));

    match args.marketer {
        Some(marketer_id) => run_single(&reconciler, &args, marketer_id, actor).await,
        None => {
            let report = reconciler.reconcile_all(actor, args.dry_run).await?;
            print_report(&report, args.json)?;
            if !report.failures.is_empty() {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

async fn run_single(
    reconciler: &StatusReconciler,
    args: &Args,
    marketer_id: Uuid,
    actor: fieldforce_kyc::Actor,
) -> Result<()> {
    if args.dry_run {
        let expected = reconciler.compute_expected_status(marketer_id).await?;
        let drift = reconciler.detect_drift(marketer_id).await?;
        if args.json {
            println!(
                "{}",
                serde_json::json!({
                    "marketer_id": marketer_id,
                    "expected": expected,
                    "drift": drift,
                })
            );
            return Ok(());
        }
        match drift {
            Some(d) => println!("{} {}", "DRIFT".yellow().bold(), d),
            None => println!("{} marketer {} is {}", "OK".green(), marketer_id, expected),
        }
        return Ok(());
    }

    let outcome = reconciler.reconcile(marketer_id, actor).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }
    match outcome {
        ReconcileOutcome::Consistent(s) => {
            println!("{} submission {} is {}", "OK".green(), s.submission_id, s.status)
        }
        ReconcileOutcome::Corrected {
            submission,
            previous,
        } => println!(
            "{} submission {}: {} → {}",
            "FIXED".green().bold(),
            submission.submission_id,
            previous,
            submission.status
        ),
        ReconcileOutcome::TerminalHeld {
            submission,
            expected,
        } => println!(
            "{} submission {} stays {} (facts say {}); needs manual review",
            "HELD".yellow().bold(),
            submission.submission_id,
            submission.status,
            expected
        ),
        ReconcileOutcome::BackwardHeld {
            submission,
            expected,
        } => println!(
            "{} submission {} stays {} (facts say {}); not moving it back",
            "HELD".yellow().bold(),
            submission.submission_id,
            submission.status,
            expected
        ),
    }
    Ok(())
}

fn print_report(report: &ReconcileReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let mode = if report.dry_run { " (dry run)" } else { "" };
    println!("\n{}{}", "Reconcile sweep".cyan().bold(), mode);
    println!("{} {}", "Scanned:".cyan(), report.scanned);

    for drift in &report.drifted {
        println!("  {} {}", "DRIFT".yellow(), drift);
    }
    for id in &report.corrected {
        println!("  {} {}", "FIXED".green(), id);
    }
    for drift in &report.held {
        println!("  {} {}", "HELD".yellow().bold(), drift);
    }
    for failure in &report.failures {
        println!(
            "  {} marketer {}: {}",
            "FAIL".red(),
            failure.marketer_id,
            failure.error.red()
        );
    }

    if report.is_clean() {
        println!("{}", "No drift found".green().bold());
    }
    Ok(())
}
