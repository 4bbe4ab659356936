mod config;
mod loader;
mod mirror;
mod models;
mod normalizer;
mod payload;
mod pipeline;
mod storage;
mod sync;
mod utils;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::AppConfig;
use crate::loader::load_csv;
use crate::payload::{SOURCES, schema_for};
use crate::pipeline::Pipeline;
use crate::storage::Repository;

#[derive(Parser)]
#[command(name = "listing-sync", about = "Property listing normalization and sync", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Deliver pending listings to the valuation API
    Push {
        /// Only rows scraped on this date (YYYY-MM-DD); all pending rows by default
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Limit to one source table (table name, sheet name or label)
        #[arg(short, long)]
        table: Option<String>,
    },

    /// Append newly scraped listings to the spreadsheet mirror
    Mirror {
        /// Scrape date to mirror (YYYY-MM-DD); today by default
        #[arg(short, long)]
        date: Option<NaiveDate>,

        #[arg(short, long)]
        table: Option<String>,
    },

    /// Import crawler CSV output into a source table
    Import {
        /// Target source table (table name, sheet name or label)
        #[arg(short, long)]
        table: String,

        /// CSV file to import
        file: PathBuf,
    },

    /// Show database statistics
    Stats,

    /// Apply schema migrations without loading data
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "listing_sync=info,warn",
        1 => "listing_sync=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;
    let today = Local::now().date_naive();

    match cli.command {
        Command::Push { date, table } => {
            let _t = utils::Timer::start("Push");
            let counters = Pipeline::new(config).push(table.as_deref(), date, today).await?;
            info!("Done: {}", counters);
        }

        Command::Mirror { date, table } => {
            let _t = utils::Timer::start("Mirror");
            let reports = Pipeline::new(config)
                .mirror(table.as_deref(), date.unwrap_or(today))
                .await?;
            for (label, r) in &reports {
                info!(
                    "{}: {} appended, {} already present, {} without id",
                    label, r.appended, r.already_present, r.missing_id
                );
            }
        }

        Command::Import { table, file } => {
            let _t = utils::Timer::start("CSV import");
            let schema = schema_for(&table).with_context(|| format!("Unknown source table '{}'", table))?;
            let repo = Repository::open(&config.storage.db_path)?;
            repo.run_migrations()?;

            let (rows, stats) = load_csv(&file, schema, today)?;
            let inserted = repo.insert_rows(schema, &rows)?;
            info!(
                "Done: {} inserted, {} already stored, {} duplicates in file, {} without id, {} malformed",
                inserted,
                rows.len() - inserted,
                stats.duplicates,
                stats.missing_id,
                stats.malformed
            );
        }

        Command::Stats => {
            let repo = Repository::open(&config.storage.db_path)?;
            println!("─────────────────────────────────────────────");
            println!("  Listing Sync — Database Stats");
            println!("─────────────────────────────────────────────");
            for schema in SOURCES.iter() {
                let (pending, delivered) = repo.status_counts(schema).unwrap_or((0, 0));
                let (min, max) = repo.scrape_date_range(schema).unwrap_or((None, None));
                println!("  {:<18}: {} pending | {} delivered", schema.label, utils::fmt_number(pending), utils::fmt_number(delivered));
                println!(
                    "  {:<18}  scraped {} → {}",
                    "",
                    min.map(|d| d.to_string()).unwrap_or("—".into()),
                    max.map(|d| d.to_string()).unwrap_or("—".into())
                );
            }
            println!("─────────────────────────────────────────────");
            match repo.last_run().ok().flatten() {
                Some(run) => {
                    println!("  Last run #{} ({}) : {}", run.id, run.command, run.status);
                    println!("  Started : {}", run.started_at.format("%Y-%m-%d %H:%M:%S"));
                    println!(
                        "  Finished: {}",
                        run.finished_at
                            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                            .unwrap_or("—".into())
                    );
                    println!("  Counters: {}", run.counters);
                    if let Some(msg) = run.error_msg {
                        println!("  Error   : {}", msg);
                    }
                }
                None => println!("  No runs yet — run `listing-sync push` first."),
            }
            println!("─────────────────────────────────────────────");
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}
