//! Rename and move
//!
//! Both change where a subtree lives on disk with a single `move_path`, then
//! commit the subtree root and every rewritten descendant path in one index
//! transaction.

use std::path::{Path, PathBuf};

use filedex_core::domain::{Actor, Entry, EntryId};
use filedex_core::naming::{name_key, validate_name};
use filedex_core::CoreError;
use tracing::{info, instrument, warn};

use super::{ItemOutcome, TreeOperations};
use crate::locks::LockRequest;

impl TreeOperations {
    // ========================================================================
    // Rename
    // ========================================================================

    /// Renames an entry in place
    ///
    /// Renaming to the current name is a no-op. Changing only the case of a
    /// name is allowed.
    #[instrument(skip(self, actor), fields(actor = %actor.id()))]
    pub async fn rename(&self, actor: &Actor, id: EntryId, new_name: &str) -> Result<Entry, CoreError> {
        validate_name(new_name, self.bin.trash_dir_name())?;

        let _permit = self.permit().await?;
        let _locks = self
            .lock(
                LockRequest::new()
                    .read_parents_of(id)
                    .write_node(Some(id))
                    .write_sibling_slot(id, name_key(new_name)),
            )
            .await?;

        let mut entry = self.index.get(id).await?;
        if entry.name() == new_name {
            return Ok(entry);
        }
        let case_only = entry.name_key() == name_key(new_name);
        if !case_only {
            self.index
                .ensure_name_free(entry.parent_id(), new_name, Some(id))
                .await?;
        }

        let parent = self.index.require_folder(entry.parent_id()).await?;
        let old_name = entry.name().to_string();
        let old_path = entry.path().to_path_buf();
        let new_path = self.resolver.child_path(parent.as_ref(), new_name);

        if case_only {
            self.move_via_scratch(&old_path, &new_path, id).await?;
        } else {
            self.fs.move_path(&old_path, &new_path).await?;
        }

        entry.rename(new_name);
        entry.set_path(new_path.clone());
        if let Err(e) = self.commit_subtree(&entry, &old_path).await {
            return Err(self
                .compensate(e, &new_path, self.fs.move_path(&new_path, &old_path))
                .await);
        }

        if entry.is_folder() {
            self.repoint_bin(&old_path, &new_path).await;
        }
        self.audit.log_renamed(actor.id(), &entry, &old_name).await;
        info!(entry_id = %id, from = %old_name, to = %new_name, "Entry renamed");
        Ok(entry)
    }

    /// Moves `from` to `to` through a temporary sibling, for renames that
    /// only change case on filesystems that fold case
    async fn move_via_scratch(&self, from: &Path, to: &Path, id: EntryId) -> Result<(), CoreError> {
        let scratch = from.with_file_name(format!(".filedex-rename-{id}"));
        self.fs.move_path(from, &scratch).await?;
        if let Err(e) = self.fs.move_path(&scratch, to).await {
            if let Err(undo) = self.fs.move_path(&scratch, from).await {
                return Err(self.diverged(
                    &scratch,
                    format!("rename stalled at a temporary name ({e}) and could not be undone ({undo})"),
                ));
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Commits `root` (already carrying its new path) together with its
    /// rewritten descendants
    async fn commit_subtree(&self, root: &Entry, old_path: &Path) -> Result<(), CoreError> {
        let mut batch = vec![root.clone()];
        batch.extend(
            self.resolver
                .propagate_path_change(&self.index, root, old_path, root.path())
                .await?,
        );
        self.index.commit(&batch).await
    }

    // ========================================================================
    // Move
    // ========================================================================

    /// Moves each entry into `dest` (root level for `None`)
    ///
    /// Every id is processed on its own and reported in its own
    /// [`ItemOutcome`]. A name already taken in `dest` gets a `_copyN`
    /// suffix.
    pub async fn move_entries(
        &self,
        actor: &Actor,
        ids: &[EntryId],
        dest: Option<EntryId>,
    ) -> Vec<ItemOutcome<Entry>> {
        let mut outcomes = Vec::with_capacity(ids.len());
        for &id in ids {
            let result = self.move_one(actor, id, dest).await;
            if let Err(e) = &result {
                warn!(entry_id = %id, error = %e, "Move failed");
            }
            outcomes.push(ItemOutcome { id, result });
        }
        outcomes
    }

    #[instrument(skip(self, actor), fields(actor = %actor.id()))]
    async fn move_one(&self, actor: &Actor, id: EntryId, dest: Option<EntryId>) -> Result<Entry, CoreError> {
        let _permit = self.permit().await?;
        let _locks = self
            .lock(
                LockRequest::new()
                    .read_parents_of(id)
                    .write_node(Some(id))
                    .read_folder(dest)
                    .write_node(dest),
            )
            .await?;

        if let Some(dest_id) = dest {
            if dest_id == id || self.index.is_within(dest_id, id).await? {
                return Err(CoreError::InvalidOperation(
                    "cannot move a folder into itself or one of its descendants".to_string(),
                ));
            }
        }
        let dest_entry = self.index.require_folder(dest).await?;
        let mut entry = self.index.get(id).await?;
        if entry.parent_id() == dest {
            return Ok(entry);
        }

        let dest_dir = self.dir_of(dest_entry.as_ref());
        let name = self
            .free_name(dest, &dest_dir, entry.name(), entry.kind())
            .await?;
        let old_path = entry.path().to_path_buf();
        let new_path: PathBuf = dest_dir.join(&name);

        self.fs.move_path(&old_path, &new_path).await?;

        entry.relocate(dest, name, new_path.clone());
        if let Err(e) = self.commit_subtree(&entry, &old_path).await {
            return Err(self
                .compensate(e, &new_path, self.fs.move_path(&new_path, &old_path))
                .await);
        }

        if entry.is_folder() {
            self.repoint_bin(&old_path, &new_path).await;
        }
        self.audit.log_moved(actor.id(), &entry, &old_path).await;
        info!(
            entry_id = %id,
            from = %old_path.display(),
            to = %new_path.display(),
            "Entry moved"
        );
        Ok(entry)
    }
}
