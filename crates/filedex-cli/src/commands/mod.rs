//! Subcommands and the engine session they share

pub mod browse;
pub mod config;
pub mod create;
pub mod recycle;
pub mod relocate;
pub mod sync;

use std::path::{Component, Path};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use filedex_audit::{AuditLogger, FileEventLog};
use filedex_cache::{DatabasePool, SqliteIndexRepository, SqliteRecycleRepository};
use filedex_core::config::Config;
use filedex_core::domain::{Actor, Entry, EntryId};
use filedex_core::{CoreError, Index, PathResolver};
use filedex_sync::{ItemOutcome, LocalFileSystemAdapter, RecycleBin, TreeOperations};
use tracing::{debug, info};

use crate::output::{entry_line, get_formatter, to_json, OutputFormat, OutputFormatter};

/// Engine, acting identity and output settings for one invocation
pub struct Session {
    pub ops: TreeOperations,
    pub actor: Actor,
    pub format: OutputFormat,
}

impl Session {
    /// Opens the index and wires the engine described by `config`
    ///
    /// Creates the storage root and the database directory when missing.
    pub async fn open(config: &Config, actor: Actor, format: OutputFormat) -> Result<Self> {
        std::fs::create_dir_all(&config.storage.root).with_context(|| {
            format!("Failed to create storage root {}", config.storage.root.display())
        })?;
        if let Some(parent) = config.database.path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let pool = DatabasePool::new(&config.database.path)
            .await
            .context("Failed to open database")?;
        let index = Index::new(Arc::new(SqliteIndexRepository::new(pool.pool().clone())));
        let bin = RecycleBin::new(
            Arc::new(SqliteRecycleRepository::new(pool.pool().clone())),
            config.storage.trash_dir_name.clone(),
        );
        let audit = Arc::new(AuditLogger::new(Arc::new(FileEventLog::new(
            config.events.log_dir.clone(),
        ))));

        let ops = TreeOperations::new(
            index,
            PathResolver::new(&config.storage.root),
            Arc::new(LocalFileSystemAdapter::new()),
            bin,
            audit,
            config.workers.max_concurrent_operations,
        );
        debug!(root = %config.storage.root.display(), actor = %actor.id(), "Session opened");
        Ok(Self { ops, actor, format })
    }

    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.is_json())
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Resolves a command-line target to an entry id
    ///
    /// Accepts an entry id, or a path relative to the storage root.
    pub async fn resolve(&self, target: &str) -> Result<EntryId> {
        if let Ok(id) = EntryId::from_str(target) {
            return Ok(id);
        }
        let relative = relative_path(target)?;
        let path = self.ops.storage_root().join(relative);
        match self.ops.index().find_by_path(&path).await? {
            Some(entry) => Ok(entry.id()),
            None => Err(CoreError::NotFound(format!("no entry at {target}")).into()),
        }
    }

    /// Like [`resolve`](Self::resolve), with `None` and `/` naming the root
    /// level
    pub async fn resolve_folder(&self, target: Option<&str>) -> Result<Option<EntryId>> {
        match target {
            None => Ok(None),
            Some(t) if t.trim_matches('/').is_empty() => Ok(None),
            Some(t) => Ok(Some(self.resolve(t).await?)),
        }
    }

    pub async fn resolve_all(&self, targets: &[String]) -> Result<Vec<EntryId>> {
        let mut ids = Vec::with_capacity(targets.len());
        for target in targets {
            ids.push(self.resolve(target).await?);
        }
        Ok(ids)
    }

    /// Prints a single entry result
    pub fn print_entry(&self, verb: &str, entry: &Entry) {
        let formatter = self.formatter();
        if self.is_json() {
            formatter.print_json(&to_json(entry));
        } else {
            formatter.success(&format!("{verb} {}", entry.path().display()));
            formatter.info(&entry_line(entry));
        }
    }

    /// Prints every per-id outcome of a batch
    ///
    /// Returns the first failure so the process exit code reflects it.
    pub fn report_outcomes(&self, verb: &str, outcomes: Vec<ItemOutcome<Entry>>) -> Result<()> {
        let formatter = self.formatter();
        if self.is_json() {
            let items: Vec<serde_json::Value> = outcomes
                .iter()
                .map(|o| match &o.result {
                    Ok(entry) => serde_json::json!({"id": o.id, "success": true, "entry": entry}),
                    Err(e) => serde_json::json!({
                        "id": o.id,
                        "success": false,
                        "kind": e.kind(),
                        "error": e.to_string(),
                    }),
                })
                .collect();
            formatter.print_json(&serde_json::Value::Array(items));
        } else {
            for outcome in &outcomes {
                match &outcome.result {
                    Ok(entry) => formatter.success(&format!("{verb} {}", entry.path().display())),
                    Err(e) => formatter.warn(&format!("{}: {e}", outcome.id)),
                }
            }
        }

        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        info!(total = outcomes.len(), failed, "Batch finished");
        match outcomes.into_iter().find_map(|o| o.result.err()) {
            Some(first) => Err(first.into()),
            None => Ok(()),
        }
    }
}

/// Validates a user-supplied path below the storage root
pub fn relative_path(raw: &str) -> Result<&Path> {
    let path = Path::new(raw.trim_start_matches('/'));
    if path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(CoreError::InvalidOperation(format!("{raw} is not a path below the storage root")).into());
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path() {
        assert_eq!(relative_path("/Work/plan.txt").unwrap(), Path::new("Work/plan.txt"));
        assert_eq!(relative_path("Work").unwrap(), Path::new("Work"));
        assert!(relative_path("../etc").is_err());
        assert!(relative_path("Work/../../x").is_err());
    }

    #[tokio::test]
    async fn test_resolve_by_id_and_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.root = dir.path().join("storage");
        config.database.path = dir.path().join("db/filedex.db");
        config.events.log_dir = dir.path().join("events");

        let actor = Actor::user("alice".parse().unwrap());
        let session = Session::open(&config, actor.clone(), OutputFormat::Json).await.unwrap();
        let work = session.ops.create_folder(&actor, "Work", None).await.unwrap();

        assert_eq!(session.resolve(&work.id().to_string()).await.unwrap(), work.id());
        assert_eq!(session.resolve("/Work").await.unwrap(), work.id());
        assert_eq!(session.resolve_folder(Some("/")).await.unwrap(), None);

        let err = session.resolve("Missing").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<CoreError>(), Some(CoreError::NotFound(_))));
    }
}
