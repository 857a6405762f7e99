//! rm, restore, purge and bin

use anyhow::{Context, Result};
use clap::Args;
use filedex_core::domain::RecycleId;

use super::Session;
use crate::output::{recycle_line, to_json};

fn parse_item(raw: &str) -> Result<RecycleId> {
    raw.parse()
        .with_context(|| format!("{raw:?} is not a recycle bin item id"))
}

/// Move an entry to the recycle bin
#[derive(Debug, Args)]
pub struct RmCommand {
    /// Entry id or path
    pub target: String,
}

impl RmCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        let formatter = session.formatter();
        let id = session.resolve(&self.target).await?;
        let item = session.ops.soft_delete(&session.actor, id).await?;

        if session.is_json() {
            formatter.print_json(&to_json(&item));
        } else {
            formatter.success(&format!("Moved {} to the recycle bin", item.original_path().display()));
            formatter.info(&format!("Restore with: filedex restore {}", item.id()));
        }
        Ok(())
    }
}

/// Restore a recycle bin item
#[derive(Debug, Args)]
pub struct RestoreCommand {
    /// Recycle bin item id (see `filedex bin`)
    pub item: String,

    /// Move an entry occupying the name to the recycle bin first
    #[arg(long)]
    pub replace: bool,
}

impl RestoreCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        let item = parse_item(&self.item)?;
        let entry = session
            .ops
            .restore(&session.actor, item, self.replace)
            .await?;
        session.print_entry("Restored", &entry);
        Ok(())
    }
}

/// Permanently delete a recycle bin item (privileged)
#[derive(Debug, Args)]
pub struct PurgeCommand {
    /// Recycle bin item id
    pub item: String,
}

impl PurgeCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        let formatter = session.formatter();
        let item = parse_item(&self.item)?;
        let removed = session.ops.permanent_delete(&session.actor, item).await?;

        if session.is_json() {
            formatter.print_json(&serde_json::json!({"removed": removed}));
        } else {
            formatter.success(&format!("Purged {} record(s)", removed.len()));
        }
        Ok(())
    }
}

/// List the recycle bin
#[derive(Debug, Args)]
pub struct BinCommand {
    /// Include items nested under deleted folders
    #[arg(long)]
    pub all: bool,
}

impl BinCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        let formatter = session.formatter();
        let items = if self.all {
            session.ops.recycle_bin().list_all().await?
        } else {
            session.ops.list_recycle_bin().await?
        };

        if session.is_json() {
            formatter.print_json(&to_json(&items));
        } else if items.is_empty() {
            formatter.info("Recycle bin is empty");
        } else {
            for item in &items {
                formatter.info(&recycle_line(item));
            }
        }
        Ok(())
    }
}
