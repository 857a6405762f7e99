//! Recursive copy
//!
//! The source subtree is snapshotted parent-first before anything is
//! created, so copying a folder into its own subtree terminates. Each node
//! is then created on disk and inserted into the index before any of its
//! children. A failure stops that id's copy where it happened; the part
//! already copied stays in place, indexed, and the error names the path at
//! which the copy stopped.

use std::collections::HashMap;
use std::path::PathBuf;

use filedex_core::domain::{Actor, Entry, EntryId, EntryKind};
use filedex_core::CoreError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{ItemOutcome, TreeOperations};
use crate::locks::LockRequest;

impl TreeOperations {
    /// Copies each entry into `dest` (root level for `None`)
    ///
    /// Returns the top-level copy per id.
    pub async fn copy_entries(
        &self,
        actor: &Actor,
        ids: &[EntryId],
        dest: Option<EntryId>,
    ) -> Vec<ItemOutcome<Entry>> {
        self.copy_entries_with_cancel(actor, ids, dest, &CancellationToken::new())
            .await
    }

    /// Like [`copy_entries`](Self::copy_entries), checking `cancel` before
    /// every node
    ///
    /// A cancelled copy reports `Cancelled` for the id in progress and for
    /// every id not started yet.
    pub async fn copy_entries_with_cancel(
        &self,
        actor: &Actor,
        ids: &[EntryId],
        dest: Option<EntryId>,
        cancel: &CancellationToken,
    ) -> Vec<ItemOutcome<Entry>> {
        let mut outcomes = Vec::with_capacity(ids.len());
        for &id in ids {
            let result = self.copy_one(actor, id, dest, cancel).await;
            if let Err(e) = &result {
                warn!(entry_id = %id, error = %e, "Copy failed");
            }
            outcomes.push(ItemOutcome { id, result });
        }
        outcomes
    }

    #[instrument(skip(self, actor, cancel), fields(actor = %actor.id()))]
    async fn copy_one(
        &self,
        actor: &Actor,
        id: EntryId,
        dest: Option<EntryId>,
        cancel: &CancellationToken,
    ) -> Result<Entry, CoreError> {
        let _permit = self.permit().await?;
        let _locks = self
            .lock(
                LockRequest::new()
                    .read_folder(Some(id))
                    .read_folder(dest)
                    .write_node(dest),
            )
            .await?;

        let dest_entry = self.index.require_folder(dest).await?;
        let source = self.index.get(id).await?;
        let snapshot = self.index.subtree(&source).await?;

        let dest_dir = self.dir_of(dest_entry.as_ref());
        let top_name = self
            .free_name(dest, &dest_dir, source.name(), source.kind())
            .await?;

        // source id -> (copy id, copy path)
        let mut placed: HashMap<EntryId, (EntryId, PathBuf)> = HashMap::new();
        let mut top: Option<Entry> = None;

        for node in &snapshot {
            let (parent, name, path) = if node.id() == source.id() {
                (dest, top_name.clone(), dest_dir.join(&top_name))
            } else {
                let parent_id = node
                    .parent_id()
                    .and_then(|p| placed.get(&p))
                    .ok_or(CoreError::BrokenChain(node.id()))?;
                let (copy_parent, parent_path) = parent_id;
                (
                    Some(*copy_parent),
                    node.name().to_string(),
                    parent_path.join(node.name()),
                )
            };

            if cancel.is_cancelled() {
                info!(path = %path.display(), "Copy cancelled");
                return Err(CoreError::Cancelled { path });
            }

            let size = match node.kind() {
                EntryKind::Folder => {
                    self.fs.mkdir(&path).await.map_err(|e| CoreError::io(&path, e.to_string()))?;
                    0
                }
                EntryKind::File => self
                    .fs
                    .copy_file(node.path(), &path)
                    .await
                    .map_err(|e| CoreError::io(&path, e.to_string()))?,
            };

            let copy = Entry::with_kind(node.kind(), name, parent, path.clone(), size, actor.id().clone());
            if let Err(e) = self.index.insert(&copy).await {
                let cause = CoreError::io(&path, format!("copied on disk but not indexed: {e}"));
                return Err(self.compensate(cause, &path, self.fs.remove_tree(&path)).await);
            }

            self.audit.log_copied(actor.id(), node, &copy).await;
            debug!(from = %node.path().display(), to = %path.display(), "Node copied");
            placed.insert(node.id(), (copy.id(), path));
            if top.is_none() {
                top = Some(copy);
            }
        }

        let top = top.ok_or(CoreError::BrokenChain(source.id()))?;
        info!(
            entry_id = %id,
            copy_id = %top.id(),
            nodes = snapshot.len(),
            to = %top.path().display(),
            "Subtree copied"
        );
        Ok(top)
    }
}
