//! `ratchet-cli` — the operational command surface.
//!
//! The surface is a thin boundary over the scheduler crate: applications
//! embed it by parsing [`Cli`] in their own `main` and calling [`execute`]
//! with the registry their code built. The bundled `ratchet` binary wires
//! an empty registry, which is enough for `install`, `status`, and `prune`.

use std::path::Path;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing::info;

use ratchet_core::{RatchetConfig, SystemClock};
use ratchet_scheduler::{db, Pruner, Registry, SchedulerEngine, WorkerLoop};

#[derive(Debug, Parser)]
#[command(name = "ratchet", about = "Cron scheduler and work queue over a shared store")]
pub struct Cli {
    /// Path to ratchet.toml (default: ~/.ratchet/ratchet.toml).
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the jobs schema (idempotent).
    Install,
    /// Report defined/running/idle counts and per-job detail.
    Status {
        /// Emit the report as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Run a single collection pass.
    Collect,
    /// Run collection passes until SIGINT/SIGTERM.
    Work {
        /// Idle sleep between empty passes, in seconds.
        #[arg(long)]
        sleep: Option<u64>,
    },
    /// Remove job rows unseen past the retention window.
    Prune {
        /// Retention window in days.
        #[arg(long)]
        days: Option<u32>,
    },
}

/// Run one CLI command against the given registry.
pub async fn execute(cli: Cli, registry: Registry) -> anyhow::Result<()> {
    let config = RatchetConfig::load(cli.config.as_deref())?;
    let conn = open_database(&config.database.path)?;

    match cli.command {
        Command::Install => {
            db::init_db(&conn)?;
            info!(path = %config.database.path, "schema installed");
            println!("schema installed at {}", config.database.path);
        }
        Command::Status { json } => {
            let engine = build_engine(conn, registry, &config)?;
            let report = engine.status()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_status(&report);
            }
        }
        Command::Collect => {
            let engine = build_engine(conn, registry, &config)?;
            let executed = engine.run(config.worker.batch_size)?;
            println!("executed {executed} job(s)");
        }
        Command::Work { sleep } => {
            let engine = build_engine(conn, registry, &config)?;
            let worker = WorkerLoop::new(engine, config.worker.batch_size);
            worker
                .forever(sleep.unwrap_or(config.worker.sleep_secs))
                .await?;
        }
        Command::Prune { days } => {
            db::init_db(&conn)?;
            let pruner = Pruner::new(&conn, Arc::new(SystemClock));
            let removed = pruner.prune(days.unwrap_or(config.prune.retention_days))?;
            println!("pruned {removed} job row(s)");
        }
    }
    Ok(())
}

fn build_engine(
    conn: Connection,
    registry: Registry,
    config: &RatchetConfig,
) -> anyhow::Result<SchedulerEngine> {
    let engine = SchedulerEngine::new(conn, registry, Arc::new(SystemClock))?
        .with_lock_ttl(config.locks.ttl_secs);
    Ok(engine)
}

fn open_database(path: &str) -> anyhow::Result<Connection> {
    if let Some(parent) = Path::new(path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

fn print_status(report: &ratchet_scheduler::StatusReport) {
    println!(
        "defined: {}  running: {}  idle: {}",
        report.defined, report.running, report.idle
    );
    if report.jobs.is_empty() {
        return;
    }
    println!(
        "{:<28} {:<10} {:>5} {:>8} {:<20} {:<20}",
        "NAME", "STATE", "FAILS", "ATTEMPTS", "LAST RUN", "NEXT RUN"
    );
    for job in &report.jobs {
        let state = if job.running {
            "running"
        } else if job.enqueued {
            "queued"
        } else {
            "idle"
        };
        println!(
            "{:<28} {:<10} {:>5} {:>8} {:<20} {:<20}",
            job.name,
            state,
            job.fail_count,
            job.attempts,
            job.last_run.as_deref().unwrap_or("-"),
            job.next_run.as_deref().unwrap_or("-"),
        );
    }
}
