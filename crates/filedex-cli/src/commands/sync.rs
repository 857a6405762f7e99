//! Sync command - reconcile the index with the storage directory

use anyhow::Result;
use clap::Args;

use super::Session;
use crate::output::to_json;

/// Index objects created outside FileDex and report missing ones
#[derive(Debug, Args)]
pub struct SyncCommand {}

impl SyncCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        let formatter = session.formatter();
        let report = session.ops.reconcile(&session.actor).await?;

        if session.is_json() {
            formatter.print_json(&to_json(&report));
            return Ok(());
        }

        if report.is_clean() {
            formatter.success("Index matches disk");
        } else {
            formatter.success(&format!(
                "Reconciled: {} indexed, {} missing, {} skipped",
                report.created_count,
                report.missing.len(),
                report.skipped.len()
            ));
        }
        for path in &report.missing {
            formatter.warn(&format!("missing on disk: {}", path.display()));
        }
        for skipped in &report.skipped {
            formatter.warn(&format!("skipped {}: {}", skipped.path.display(), skipped.reason));
        }
        formatter.info(&format!("Took {} ms", report.duration_ms));
        Ok(())
    }
}
