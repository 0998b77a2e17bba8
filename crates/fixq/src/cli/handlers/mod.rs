//! CLI command handlers that bridge between `clap` and `fixq-core`

mod fix;
mod groups;
mod queue;
mod scan;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context as _, Result};
use clap::ArgMatches;
use fixq_core::{config::Config, GroupingEngine, QueueManager, QueueStore, SqliteStore};

use crate::output::Report;

/// Everything a handler needs, built once per invocation.
pub struct Context {
    pub root: PathBuf,
    pub config: Config,
    pub store: Arc<dyn QueueStore>,
}

impl Context {
    /// Load config and open the queue database.
    pub async fn open(matches: &ArgMatches) -> Result<Self> {
        let root = std::env::current_dir().context("Failed to get current directory")?;
        let explicit = matches.get_one::<PathBuf>("config").map(PathBuf::as_path);
        let config = fixq_core::config::load_config(&root, explicit)?;

        let db_path = matches
            .get_one::<PathBuf>("db")
            .map(|path| absolute(&root, path))
            .unwrap_or_else(|| config.database_path(&root));
        tracing::debug!(db = %db_path.display(), "opening queue");
        let store: Arc<dyn QueueStore> = Arc::new(SqliteStore::open(&db_path).await?);

        Ok(Self {
            root,
            config,
            store,
        })
    }

    pub fn queue(&self) -> QueueManager {
        QueueManager::new(Arc::clone(&self.store))
    }

    pub fn groups(&self) -> GroupingEngine {
        GroupingEngine::new(Arc::clone(&self.store))
    }

    /// Normalize a user-supplied test path to an absolute one.
    pub fn test_path(&self, file: &str) -> String {
        if file.trim().is_empty() {
            return file.to_string();
        }
        absolute(&self.root, Path::new(file))
            .to_string_lossy()
            .into_owned()
    }
}

fn absolute(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Full command name, e.g. `groups dequeue`.
pub fn command_name(matches: &ArgMatches) -> String {
    let mut parts = Vec::new();
    let mut current = matches;
    while let Some((name, sub)) = current.subcommand() {
        parts.push(name);
        current = sub;
    }
    parts.join(" ")
}

/// Run the selected command and close the store afterwards.
///
/// A command error wins over a close error; the latter is only logged then.
pub async fn run(matches: &ArgMatches) -> Result<Report> {
    let ctx = Context::open(matches).await?;
    let result = dispatch(&ctx, matches).await;
    finish(result, ctx.store.close().await)
}

fn finish(result: Result<Report>, closed: fixq_core::Result<()>) -> Result<Report> {
    match (result, closed) {
        (Ok(report), Ok(())) => Ok(report),
        (Ok(_), Err(close_err)) => Err(close_err.into()),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            tracing::warn!(error = %close_err, "failed to close queue store");
            Err(err)
        }
    }
}

async fn dispatch(ctx: &Context, matches: &ArgMatches) -> Result<Report> {
    match matches.subcommand() {
        Some(("groups", sub_m)) => groups::handle(ctx, sub_m).await,
        Some(("scan", sub_m)) => scan::handle(ctx, sub_m).await,
        Some(("fix", sub_m)) => fix::handle(ctx, sub_m).await,
        Some((name, sub_m)) => queue::handle(ctx, name, sub_m).await,
        None => anyhow::bail!("Unknown command. Run 'fixq --help' for usage."),
    }
}
