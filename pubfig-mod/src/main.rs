//! pubfig-mod - Moderation engine service entry point
//!
//! Operator CLI for the revision & moderation engine: database
//! initialization, batch scoring passes, stale-claim reaping and audit log
//! review. The presentation layer consumes the same engine through the
//! library API.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pubfig_common::{config, db::init_database};
use pubfig_mod::engine::FixedScorer;
use pubfig_mod::ModerationEngine;
use tracing::info;

/// Command-line arguments for pubfig-mod
#[derive(Parser, Debug)]
#[command(name = "pubfig-mod")]
#[command(about = "Revision & moderation engine for pubfig")]
#[command(version)]
struct Args {
    /// Root folder containing the pubfig database
    #[arg(short, long, env = "PUBFIG_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or open the database and initialize the schema
    Init,
    /// Run one batch scoring pass over the pending queue
    ProcessBatch {
        /// Maximum revisions to claim
        #[arg(long, default_value = "10")]
        limit: u32,

        /// Score the stub scorer assigns to every revision
        #[arg(long, default_value = "50.0")]
        score: f64,
    },
    /// Return stale processing claims to the pending queue
    Reap,
    /// Print recent audit log entries
    Audit {
        /// Maximum entries to print
        #[arg(long, default_value = "20")]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    info!("Starting pubfig-mod v{}", env!("CARGO_PKG_VERSION"));

    let root_folder = config::resolve_root_folder(args.root_folder.as_deref(), "PUBFIG_ROOT_FOLDER");
    config::ensure_root_folder(&root_folder)?;

    let db_path = config::database_path(&root_folder);
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .context("Failed to initialize database")?;
    let engine = ModerationEngine::new(pool);

    match args.command {
        Command::Init => {
            info!("Database initialized");
        }
        Command::ProcessBatch { limit, score } => {
            let scorer = FixedScorer { score };
            let report = engine.process_batch(&scorer, limit).await?;
            println!(
                "Batch complete: {} claimed, {} approved, {} held, {} failed",
                report.claimed(),
                report.approved(),
                report.held(),
                report.failed()
            );
            for outcome in &report.outcomes {
                println!("  {}", serde_json::to_string(outcome)?);
            }
        }
        Command::Reap => {
            let reaped = engine.reap_stale_claims().await?;
            println!("Reclaimed {} stale revision(s)", reaped);
        }
        Command::Audit { limit } => {
            let entries = pubfig_mod::db::audit::recent(engine.pool(), limit).await?;
            for entry in entries {
                println!(
                    "[{}] {} by {}: {}",
                    entry.created_at, entry.action, entry.actor, entry.details
                );
            }
        }
    }

    Ok(())
}
