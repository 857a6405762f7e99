//! rename, mv, cp and star

use anyhow::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::Session;

/// Rename an entry in place
#[derive(Debug, Args)]
pub struct RenameCommand {
    /// Entry id or path
    pub target: String,

    /// New name
    pub new_name: String,
}

impl RenameCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        let id = session.resolve(&self.target).await?;
        let entry = session
            .ops
            .rename(&session.actor, id, &self.new_name)
            .await?;
        session.print_entry("Renamed to", &entry);
        Ok(())
    }
}

/// Move entries into a folder
#[derive(Debug, Args)]
pub struct MvCommand {
    /// Entry ids or paths to move
    #[arg(required = true)]
    pub targets: Vec<String>,

    /// Destination folder (root when omitted)
    #[arg(long)]
    pub to: Option<String>,
}

impl MvCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        let ids = session.resolve_all(&self.targets).await?;
        let dest = session.resolve_folder(self.to.as_deref()).await?;
        let outcomes = session.ops.move_entries(&session.actor, &ids, dest).await;
        session.report_outcomes("Moved to", outcomes)
    }
}

/// Copy entries into a folder
///
/// Ctrl-C stops the copy at the next node; what was copied so far stays.
#[derive(Debug, Args)]
pub struct CpCommand {
    /// Entry ids or paths to copy
    #[arg(required = true)]
    pub targets: Vec<String>,

    /// Destination folder (root when omitted)
    #[arg(long)]
    pub to: Option<String>,
}

impl CpCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        let ids = session.resolve_all(&self.targets).await?;
        let dest = session.resolve_folder(self.to.as_deref()).await?;

        let cancel = CancellationToken::new();
        let interrupt = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, stopping copy");
                    cancel.cancel();
                }
            })
        };
        let outcomes = session
            .ops
            .copy_entries_with_cancel(&session.actor, &ids, dest, &cancel)
            .await;
        interrupt.abort();

        session.report_outcomes("Copied to", outcomes)
    }
}

/// Star, unstar or toggle an entry
#[derive(Debug, Args)]
pub struct StarCommand {
    /// Entry id or path
    pub target: String,

    /// Set the flag instead of toggling it
    #[arg(long, conflicts_with = "off")]
    pub on: bool,

    /// Clear the flag instead of toggling it
    #[arg(long)]
    pub off: bool,
}

impl StarCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        let id = session.resolve(&self.target).await?;
        let entry = match (self.on, self.off) {
            (true, _) => session.ops.set_starred(&session.actor, id, true).await?,
            (_, true) => session.ops.set_starred(&session.actor, id, false).await?,
            _ => session.ops.star(&session.actor, id).await?,
        };
        let verb = if entry.is_starred() { "Starred" } else { "Unstarred" };
        session.print_entry(verb, &entry);
        Ok(())
    }
}
