//! Adds columns introduced since the legacy schema and fills them from the
//! columns they replace. Safe to run more than once.

use anyhow::{Context, Result};
use clap::Parser;
use skillmetrics::database::{legacy_backfills, run_backfills};
use sqlx::SqlitePool;

#[derive(Parser, Debug)]
#[command(name = "backfill_columns", about = "Backfill columns added since the legacy schema")]
struct Args {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let pool = SqlitePool::connect(&args.database_url)
        .await
        .with_context(|| format!("Failed to connect to {}", args.database_url))?;

    let outcomes = run_backfills(&pool, &legacy_backfills()).await?;

    for outcome in &outcomes {
        let target = format!("{}.{}", outcome.table, outcome.column);
        match &outcome.skipped {
            Some(reason) => println!("    {:<40} skipped: {}", target, reason),
            None => println!(
                "    {:<40} added: {:<5} rows backfilled: {}",
                target, outcome.added, outcome.rows_backfilled
            ),
        }
    }

    let changed = outcomes
        .iter()
        .filter(|o| o.added || o.rows_backfilled > 0)
        .count();
    println!("{} of {} backfills changed the database", changed, outcomes.len());

    pool.close().await;
    Ok(())
}
