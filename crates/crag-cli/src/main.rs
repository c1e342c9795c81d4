use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use crag_core::UserId;
use crag_scrape::{ChromeSessionFactory, ScrapeConfig};
use crag_storage::RecordStore;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "crag")]
#[command(about = "Climbing-profile harvester: scrape captures, then parse them")]
struct Cli {
    /// Log verbosity: debug, info, warning or error.
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch profile and ascent pages for a range of identifiers.
    Scrape {
        /// Path of the SQLite database holding the exception ledger.
        db_path: PathBuf,
        /// First identifier, inclusive.
        #[arg(short, long, default_value_t = 1)]
        start: UserId,
        /// End of the range, exclusive.
        #[arg(short, long, default_value_t = 65000)]
        end: UserId,
        /// Directory the captured pages are written to.
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
        /// Number of concurrent browser sessions.
        #[arg(short = 'n', long, default_value_t = 1)]
        workers: usize,
    },
    /// Parse captured pages into the record database.
    Parse {
        /// Directory holding the captured pages.
        input: PathBuf,
        /// Path of the destination SQLite database.
        db_path: PathBuf,
    },
}

fn init_tracing(level: &str) {
    // "warning" is accepted as a spelling of the warn level.
    let level = match level {
        "warning" => "warn",
        other => other,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Scrape {
            db_path,
            start,
            end,
            output,
            workers,
        } => {
            let store = RecordStore::open(&db_path).await?;
            store.ensure_schema().await?;
            let config = ScrapeConfig {
                start,
                end,
                output_dir: output,
                workers,
            };
            crag_scrape::run_scrape(config, ChromeSessionFactory, store).await?;
        }
        Commands::Parse { input, db_path } => {
            let store = RecordStore::open(&db_path).await?;
            store.ensure_schema().await?;
            let summary = crag_ingest::run_ingest(&input, &store).await?;
            println!(
                "parse complete: profiles={} ascent_lists={} skipped={} unrecognized={} failed={}",
                summary.profiles,
                summary.ascent_lists,
                summary.skipped,
                summary.unrecognized,
                summary.failed
            );
        }
    }

    Ok(())
}
