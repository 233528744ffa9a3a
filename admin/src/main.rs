use anyhow::Result;
use clap::{Parser, Subcommand};
use reel_admin::{backfill, collect_inputs, read_records, reconcile, seed};
use reel_core::posts::Posts;
use reel_core::{ClientConfig, DocumentStoreClient, SledStore};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "reel-admin")]
#[command(about = "Seed, inspect and repair a reel document store", long_about = None)]
struct Cli {
    /// Store directory
    #[arg(long, global = true, default_value = "./data")]
    data: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load users and posts from JSON/JSONL files or a directory of them
    Seed {
        #[arg(long)]
        input: String,
    },
    /// Prefix search over post titles and creator names
    Search {
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Check every post's likerIds against its Like records
    Reconcile {
        /// Repair diverged posts instead of only reporting them
        #[arg(long, default_value_t = false)]
        apply: bool,
        /// Also write the report to this file
        #[arg(long)]
        report: Option<String>,
    },
    /// Recompute stale lower-cased shadow fields
    Backfill,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    let store = Arc::new(SledStore::open(&cli.data)?);
    let client = DocumentStoreClient::with_config(store.clone(), ClientConfig::from_env()?);

    match cli.command {
        Commands::Seed { input } => {
            let mut records = Vec::new();
            for file in collect_inputs(Path::new(&input)) {
                records.extend(read_records(&file)?);
            }
            let report = seed(&client, records).await?;
            println!("{}", serde_json::to_string(&report)?);
        }
        Commands::Search { query, limit } => {
            for post in Posts::new(client).search(&query).await?.into_iter().take(limit) {
                println!("{}", serde_json::to_string(&post)?);
            }
        }
        Commands::Reconcile { apply, report } => {
            let summary = reconcile(&client, apply).await?;
            let json = serde_json::to_string_pretty(&summary)?;
            if let Some(path) = report {
                std::fs::write(&path, &json)?;
                tracing::info!(%path, "report written");
            }
            println!("{json}");
        }
        Commands::Backfill => {
            let rewritten = backfill(&client).await?;
            println!("{rewritten} documents rewritten");
        }
    }

    store.flush()?;
    Ok(())
}
