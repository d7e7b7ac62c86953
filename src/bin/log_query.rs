//! log_query - Search and summarise the violation log
//!
//! All output is JSON on stdout.

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::IsTerminal;
use std::time::Duration;

use ppe_sentinel::storage::DEFAULT_SEARCH_LIMIT;
use ppe_sentinel::{now_ms, LogQuery, SqliteViolationLogStore, ViolationLogStore};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(name = "log_query", about = "Query the PPE violation log")]
struct Args {
    /// Path to the violation log SQLite DB
    #[arg(long, env = "SENTINEL_DB_PATH", default_value = "ppe_sentinel.db")]
    db_path: String,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Violations matching all given filters, newest first
    Search {
        #[arg(long)]
        person_id: Option<u32>,
        /// Inclusive lower bound, epoch ms
        #[arg(long)]
        start_ms: Option<u64>,
        /// Inclusive upper bound, epoch ms
        #[arg(long)]
        end_ms: Option<u64>,
        /// Gear name present in either the detected or missing list
        #[arg(long)]
        equipment: Option<String>,
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
    /// Per-gear counts of detected and missing equipment
    Summary,
    /// Total number of stored violations
    Stats,
    /// Delete violations older than the retention period
    Prune {
        #[arg(long, env = "SENTINEL_RETENTION_SECS", default_value_t = 60 * 60 * 24 * 30)]
        retention_secs: u64,
    },
}

#[derive(Serialize)]
struct StatsOutput {
    total_violations: u64,
}

#[derive(Serialize)]
struct PruneOutput {
    removed: usize,
    remaining: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let mut store = {
        let _stage = ui.stage("Open database");
        SqliteViolationLogStore::open(&args.db_path)?
    };

    let output = match args.command {
        Command::Search {
            person_id,
            start_ms,
            end_ms,
            equipment,
            limit,
        } => {
            let _stage = ui.stage("Search violations");
            let query = LogQuery {
                person_id,
                start_ms,
                end_ms,
                equipment: equipment.map(|e| e.trim().to_lowercase()),
                limit,
            };
            serde_json::to_string_pretty(&store.search(&query)?)?
        }
        Command::Summary => {
            let _stage = ui.stage("Summarise equipment");
            serde_json::to_string_pretty(&store.summary()?)?
        }
        Command::Stats => serde_json::to_string_pretty(&StatsOutput {
            total_violations: store.count()?,
        })?,
        Command::Prune { retention_secs } => {
            let _stage = ui.stage("Prune violations");
            let removed = store.enforce_retention(Duration::from_secs(retention_secs), now_ms()?)?;
            log::info!("pruned {} violation logs", removed);
            serde_json::to_string_pretty(&PruneOutput {
                removed,
                remaining: store.count()?,
            })?
        }
    };
    println!("{}", output);
    Ok(())
}
