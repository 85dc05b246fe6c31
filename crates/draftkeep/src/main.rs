use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use draftkeep_history::HistoryConfig;
use draftkeep_store::{
    Collection, HistoryLog, HistoryLogKind, ObjectStore, RedbStore, SharedStore,
    SnapshotAccessor, TaskAccessor, CURRENT_SCHEMA_VERSION,
};

/// Inspect and maintain a draftkeep data directory.
#[derive(Parser, Debug)]
#[command(name = "draftkeep", version, about)]
struct Cli {
    /// Data directory to open. Defaults to the configured one.
    #[arg(long = "data-dir", global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the store location, schema version and record counts.
    Info,
    /// Print the persisted project snapshot.
    Snapshot,
    /// List all tasks.
    Tasks,
    /// List repo history, newest first.
    RepoHistory,
    /// List article history, newest first.
    ArticleHistory,
    /// Delete a task by id.
    RemoveTask { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // An explicit directory is inspected read-only; only the default one gets a config file.
    let config = match &cli.data_dir {
        Some(dir) => HistoryConfig::load_from_dir(dir),
        None => HistoryConfig::load_or_create(&HistoryConfig::config_path()),
    };

    let redb = RedbStore::open(&config.data_dir, CURRENT_SCHEMA_VERSION)
        .await
        .with_context(|| format!("failed to open store in {}", config.data_dir.display()))?;
    let path = redb.path().to_path_buf();
    let store: SharedStore = Arc::new(redb);

    let output = match cli.command {
        Command::Info => info(&store, &path).await?,
        Command::Snapshot => {
            let snapshot: Option<serde_json::Value> = SnapshotAccessor::new(store)
                .load_snapshot(&config.snapshot_key)
                .await?;
            snapshot.unwrap_or(serde_json::Value::Null)
        }
        Command::Tasks => serde_json::to_value(TaskAccessor::new(store).list_all().await?)?,
        Command::RepoHistory => history(store, HistoryLogKind::Repo).await?,
        Command::ArticleHistory => history(store, HistoryLogKind::Article).await?,
        Command::RemoveTask { id } => {
            let removed = TaskAccessor::new(store).remove_by_id(&id).await?;
            tracing::info!(%id, removed, "remove task");
            serde_json::json!({ "id": id, "removed": removed })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn info(store: &SharedStore, path: &std::path::Path) -> Result<serde_json::Value> {
    let mut counts = serde_json::Map::new();
    for collection in Collection::ALL {
        let records = store.read_all(collection).await?;
        counts.insert(collection.name().to_string(), records.len().into());
    }
    Ok(serde_json::json!({
        "path": path.display().to_string(),
        "schema_version": store.schema_version(),
        "collections": counts,
    }))
}

async fn history(store: SharedStore, kind: HistoryLogKind) -> Result<serde_json::Value> {
    let items = HistoryLog::new(store, kind)
        .list_all_sorted_by_date_desc()
        .await?;
    Ok(serde_json::to_value(items)?)
}
