//! Applies a seed batch and prints the resulting report as JSON.
//!
//! Without a path the configured seed file is used. `--dry-run` applies the
//! batch to an in-memory store so a batch can be checked without touching
//! MongoDB.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::fmt::init;

use courseware_api::{
    config::Config,
    services::{
        content_service::ContentService,
        seed_service::{load_batch, SeedRunner},
    },
    store::{ContentStore, MemoryStore, MongoStore},
    utils::retry::{retry_async_with_config, RetryConfig},
};

#[derive(Debug, Parser)]
#[command(name = "seed")]
#[command(version, about = "Apply a course content seed batch", long_about = None)]
struct Cli {
    /// Seed batch JSON file (defaults to the configured seed file)
    path: Option<PathBuf>,

    /// Abort on the first invalid record instead of skipping it
    #[arg(long)]
    strict: bool,

    /// Apply to an in-memory store and only print the report
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();

    let args = Cli::parse();
    let config = Config::load().context("Failed to load configuration")?;

    let path = args
        .path
        .or_else(|| config.seed.file.clone())
        .context("No seed file given and none configured")?;
    let strict = args.strict || config.seed.strict;
    let batch = load_batch(&path).await?;

    let store: Arc<dyn ContentStore> = if args.dry_run {
        tracing::info!("Dry run: applying {} to an in-memory store", path.display());
        Arc::new(MemoryStore::new())
    } else {
        let mongo_client = mongodb::Client::with_uri_str(&config.mongo_uri)
            .await
            .context("Failed to connect to MongoDB")?;
        let store = MongoStore::new(mongo_client.database(&config.mongo_database));
        retry_async_with_config(RetryConfig::startup(), || store.ensure_indexes())
            .await
            .context("Failed to create content indexes")?;
        Arc::new(store)
    };

    let report = SeedRunner::new(ContentService::new(store), strict)
        .apply(&batch)
        .await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
