//! Removes a skill template together with every row that references it.

use anyhow::{Context, Result};
use clap::Parser;
use skillmetrics::db::delete_skill_template;
use sqlx::SqlitePool;

#[derive(Parser, Debug)]
#[command(name = "delete_skill_template", about = "Delete a skill template and its dependents")]
struct Args {
    /// Id of the template to delete.
    template_id: i64,

    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let pool = SqlitePool::connect(&args.database_url)
        .await
        .with_context(|| format!("Failed to connect to {}", args.database_url))?;

    let report = delete_skill_template(&pool, args.template_id)
        .await
        .with_context(|| format!("Failed to delete skill template {}", args.template_id))?;

    println!(
        "Deleted skill template {} ({})",
        report.template_id, report.template_name
    );
    println!("    notifications:   {}", report.notifications_removed);
    println!("    endorsements:    {}", report.endorsements_removed);
    println!("    pending updates: {}", report.pending_updates_removed);
    println!("    user skills:     {}", report.user_skills_removed);
    println!("    project skills:  {}", report.project_skills_removed);
    for skipped in &report.skipped {
        println!("    skipped: {}", skipped);
    }

    pool.close().await;
    Ok(())
}
