//! Structural diff of two SQLite databases, or of one database against a
//! schema file. Exits non-zero when the change from left to right is
//! destructive.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use skillmetrics::database::{compare_snapshots, snapshot_database, snapshot_schema_sql};

#[derive(Parser, Debug)]
#[command(name = "compare_schemas", about = "Compare the schemas of two SQLite databases")]
struct Args {
    /// Left-hand database, usually the legacy one.
    left: String,

    /// Right-hand database. Omit when passing --schema-file.
    right: Option<String>,

    /// Compare against this schema instead of a second database.
    #[arg(long, value_name = "FILE", conflicts_with = "right")]
    schema_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let left = snapshot_database(&args.left)
        .await
        .with_context(|| format!("Failed to read {}", args.left))?;

    let (right_label, right) = match (&args.right, &args.schema_file) {
        (Some(url), _) => (
            url.clone(),
            snapshot_database(url)
                .await
                .with_context(|| format!("Failed to read {}", url))?,
        ),
        (None, Some(path)) => {
            let sql = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            (
                path.display().to_string(),
                snapshot_schema_sql(&sql)
                    .await
                    .context("Failed to apply schema file")?,
            )
        }
        (None, None) => anyhow::bail!("Pass a second database URL or --schema-file"),
    };

    let diff = compare_snapshots(&args.left, &left, &right_label, &right);
    if diff.is_empty() {
        println!("Schemas match ✓");
        return Ok(ExitCode::SUCCESS);
    }

    println!("{}", diff);
    if diff.is_destructive() {
        println!("Destructive changes detected");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
