//! Soft delete, restore and purge
//!
//! A soft delete moves the subtree root into its parent directory's trash
//! container with one `move_path` and replaces the subtree's index entries
//! with recycle records: one top-level item for the root, one nested item
//! per descendant. Restore reverses the move into the best surviving parent
//! and rebuilds the entries with fresh ids.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::Utc;
use filedex_core::domain::{Actor, Entry, EntryId, RecycleId, RecycleItem};
use filedex_core::naming::name_key;
use filedex_core::ports::FsError;
use filedex_core::CoreError;
use tracing::{debug, info, instrument, warn};

use super::TreeOperations;
use crate::locks::{LockKey, LockRequest, LockSet};

/// Attempts at pinning a recycle item's container before giving up
const RECYCLE_LOCK_ATTEMPTS: usize = 3;

/// Locks held while restoring or purging one recycle item
struct RecycleGuard {
    _locks: LockSet,
    item: RecycleItem,
    top: RecycleItem,
    target: Option<EntryId>,
}

impl TreeOperations {
    // ========================================================================
    // Soft delete
    // ========================================================================

    /// Moves an entry and its subtree to the recycle bin
    ///
    /// Returns the top-level recycle item.
    #[instrument(skip(self, actor), fields(actor = %actor.id()))]
    pub async fn soft_delete(&self, actor: &Actor, id: EntryId) -> Result<RecycleItem, CoreError> {
        let _permit = self.permit().await?;
        let _locks = self
            .lock(
                LockRequest::new()
                    .read_parents_of(id)
                    .write_node(Some(id))
                    .write_sibling_slot(id, name_key(self.bin.trash_dir_name())),
            )
            .await?;

        let entry = self.index.get(id).await?;
        self.do_soft_delete(actor, &entry).await
    }

    /// Soft-deletes `entry`; the caller holds its locks
    async fn do_soft_delete(&self, actor: &Actor, entry: &Entry) -> Result<RecycleItem, CoreError> {
        let subtree = self.index.subtree(entry).await?;
        let parent = self.index.require_folder(entry.parent_id()).await?;
        let dir = self.dir_of(parent.as_ref());
        let relocated = self
            .bin
            .relocation_target(self.fs.as_ref(), &dir, entry.name(), entry.id())
            .await?;

        self.fs.move_path(entry.path(), &relocated).await?;

        let deleted_at = Utc::now();
        let mut placed: HashMap<EntryId, (RecycleId, PathBuf)> = HashMap::new();
        let mut items = Vec::with_capacity(subtree.len());
        for node in &subtree {
            let (parent_item, path) = if node.id() == entry.id() {
                (None, relocated.clone())
            } else {
                let (parent_item, parent_path) = node
                    .parent_id()
                    .and_then(|p| placed.get(&p))
                    .ok_or(CoreError::BrokenChain(node.id()))?;
                (Some(*parent_item), parent_path.join(node.name()))
            };
            let item = RecycleItem::from_entry(
                RecycleId::new(),
                node,
                actor.id().clone(),
                deleted_at,
                path.clone(),
                parent_item,
            );
            placed.insert(node.id(), (item.id(), path));
            items.push(item);
        }
        let top = items[0].clone();

        if let Err(e) = self.bin.insert(&items).await {
            return Err(self
                .compensate(e, entry.path(), self.fs.move_path(&relocated, entry.path()))
                .await);
        }

        let removed: Vec<EntryId> = subtree.iter().rev().map(Entry::id).collect();
        if let Err(e) = self.index.remove(&removed).await {
            let undo = async {
                if let Err(bin_err) = self.bin.remove(&top).await {
                    warn!(item_id = %top.id(), error = %bin_err, "Could not drop recycle records");
                }
                self.fs.move_path(&relocated, entry.path()).await
            };
            return Err(self.compensate(e, entry.path(), undo).await);
        }

        if entry.is_folder() {
            self.repoint_bin(entry.path(), &relocated).await;
        }
        self.audit.log_deleted(actor.id(), entry, &removed).await;
        info!(
            entry_id = %entry.id(),
            item_id = %top.id(),
            nodes = removed.len(),
            to = %relocated.display(),
            "Entry moved to recycle bin"
        );
        Ok(top)
    }

    // ========================================================================
    // Restore
    // ========================================================================

    /// Restores a top-level recycle item and everything nested below it
    ///
    /// The entry returns to its former parent when that folder still exists,
    /// else to the folder now at its former parent path, else to the root
    /// level. An occupied name is a `Conflict` unless `replace` is set, in
    /// which case the occupant is soft-deleted first. Restored entries get
    /// fresh ids.
    #[instrument(skip(self, actor), fields(actor = %actor.id()))]
    pub async fn restore(&self, actor: &Actor, recycle_id: RecycleId, replace: bool) -> Result<Entry, CoreError> {
        let item = self.bin.get(recycle_id).await?;
        if item.parent_item().is_some() {
            return Err(CoreError::InvalidOperation(format!(
                "{} was deleted as part of a folder; restore the folder instead",
                item.name()
            )));
        }

        let _permit = self.permit().await?;
        let guard = self.lock_recycle(recycle_id, true).await?;
        let item = guard.item.clone();
        let target = guard.target;
        let target_entry = self.index.require_folder(target).await?;
        let dest = self.resolver.child_path(target_entry.as_ref(), item.name());

        if let Some(occupant) = self.index.child_named(target, item.name()).await? {
            if !replace {
                return Err(CoreError::Conflict(format!(
                    "an entry named {:?} already exists at {}",
                    occupant.name(),
                    dest.display()
                )));
            }
            info!(entry_id = %occupant.id(), "Replacing occupant of restore target");
            self.do_soft_delete(actor, &occupant).await?;
        } else if self.fs.exists(&dest).await? {
            return Err(CoreError::Conflict(format!(
                "{} is occupied by an unindexed object",
                dest.display()
            )));
        }

        self.fs.move_path(item.relocated_path(), &dest).await?;

        let mut restored: Vec<(Entry, EntryId)> = Vec::new();
        let mut placed: HashMap<RecycleId, (EntryId, PathBuf)> = HashMap::new();
        for record in self.bin.subtree(&item).await? {
            let (parent, path) = match record.parent_item() {
                None => (target, dest.clone()),
                Some(parent_item) => match placed.get(&parent_item) {
                    Some((parent_id, parent_path)) => (Some(*parent_id), parent_path.join(record.name())),
                    None => {
                        warn!(item_id = %record.id(), name = %record.name(), "Parent not restored, skipping");
                        continue;
                    }
                },
            };
            if record.parent_item().is_some() && !self.fs.exists(&path).await? {
                warn!(path = %path.display(), "Recycled data missing on disk, skipping");
                continue;
            }

            let entry = Entry::with_kind(
                record.kind(),
                record.name(),
                parent,
                path.clone(),
                record.size(),
                record.owner_id().clone(),
            );
            placed.insert(record.id(), (entry.id(), path));
            restored.push((entry, record.entry_id()));
        }

        let entries: Vec<Entry> = restored.iter().map(|(e, _)| e.clone()).collect();
        if let Err(e) = self.index.insert_all(&entries).await {
            return Err(self
                .compensate(e, &dest, self.fs.move_path(&dest, item.relocated_path()))
                .await);
        }

        if let Err(e) = self.bin.remove(&item).await {
            warn!(item_id = %item.id(), error = %e, "Restored, but recycle records remain");
        }
        if item.kind().is_folder() {
            self.repoint_bin(item.relocated_path(), &dest).await;
        }

        for (entry, original_id) in &restored {
            self.audit.log_restored(actor.id(), entry, *original_id).await;
        }
        let (top, _) = restored
            .into_iter()
            .next()
            .ok_or(CoreError::NotFound(format!("recycle bin item {recycle_id}")))?;
        info!(
            item_id = %recycle_id,
            entry_id = %top.id(),
            nodes = entries.len(),
            to = %dest.display(),
            "Entry restored"
        );
        Ok(top)
    }

    /// Folder a top-level item should return to
    async fn restore_parent(&self, item: &RecycleItem) -> Result<Option<EntryId>, CoreError> {
        if let Some(hint) = item.parent_hint() {
            if let Some(parent) = self.index.find(hint).await? {
                if parent.is_folder() {
                    return Ok(Some(parent.id()));
                }
            }
        }
        let Some(parent_path) = item.original_path().parent() else {
            return Ok(None);
        };
        if parent_path == self.resolver.root() {
            return Ok(None);
        }
        match self.index.find_by_path(parent_path).await? {
            Some(folder) if folder.is_folder() => {
                debug!(path = %parent_path.display(), "Restoring into folder at former parent path");
                Ok(Some(folder.id()))
            }
            _ => {
                debug!(item_id = %item.id(), "Former parent is gone, restoring at root level");
                Ok(None)
            }
        }
    }

    // ========================================================================
    // Purge
    // ========================================================================

    /// Permanently deletes a recycle item, its nested items and their data
    ///
    /// Requires a privileged actor. Returns the removed record ids.
    #[instrument(skip(self, actor), fields(actor = %actor.id()))]
    pub async fn permanent_delete(&self, actor: &Actor, recycle_id: RecycleId) -> Result<Vec<RecycleId>, CoreError> {
        if !actor.is_privileged() {
            return Err(CoreError::Unauthorized(format!(
                "{} may not permanently delete items",
                actor.id()
            )));
        }

        if self.bin.find(recycle_id).await?.is_none() {
            let as_entry = EntryId::from_uuid(*recycle_id.as_uuid());
            if self.index.find(as_entry).await?.is_some() {
                return Err(CoreError::InvalidOperation(format!(
                    "{recycle_id} is a live entry; move it to the recycle bin first"
                )));
            }
            return Err(CoreError::NotFound(format!("recycle bin item {recycle_id}")));
        }

        let _permit = self.permit().await?;
        let guard = self.lock_recycle(recycle_id, false).await?;
        let item = &guard.item;

        let purged: HashSet<RecycleId> = self.bin.subtree(item).await?.iter().map(RecycleItem::id).collect();
        let rescued = self.rescue_stashed(item, &guard.top, &purged).await?;

        match self.fs.remove_tree(item.relocated_path()).await {
            Ok(()) | Err(FsError::NotFound(_)) => {}
            Err(e) => return Err(CoreError::io(item.relocated_path(), e.to_string())),
        }
        let removed = self.bin.remove(item).await?;
        info!(item_id = %recycle_id, records = removed.len(), rescued, "Recycle item purged");
        Ok(removed)
    }

    /// Moves earlier deletions stored inside `item`'s data out of the way
    ///
    /// A folder takes its trash container along when it is deleted, so the
    /// data of unrelated top-level items can sit below `item`. They move into
    /// the container holding `top` and keep their records.
    async fn rescue_stashed(
        &self,
        item: &RecycleItem,
        top: &RecycleItem,
        purged: &HashSet<RecycleId>,
    ) -> Result<usize, CoreError> {
        let stashed = self.bin.stashed_under(item.relocated_path(), purged).await?;
        if stashed.is_empty() {
            return Ok(0);
        }
        let dir = top
            .relocated_path()
            .parent()
            .and_then(Path::parent)
            .ok_or_else(|| CoreError::io(top.relocated_path(), "recycle item is not inside a trash container"))?;

        let mut rescued = 0;
        for other in &stashed {
            let target = self
                .bin
                .relocation_target(self.fs.as_ref(), dir, other.name(), other.entry_id())
                .await?;
            match self.fs.move_path(other.relocated_path(), &target).await {
                Ok(()) => {}
                Err(FsError::NotFound(_)) => {
                    warn!(item_id = %other.id(), path = %other.relocated_path().display(), "Stashed data missing, leaving record");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
            if let Err(e) = self.bin.repoint(other.relocated_path(), &target).await {
                return Err(self
                    .compensate(e, other.relocated_path(), self.fs.move_path(&target, other.relocated_path()))
                    .await);
            }
            debug!(
                item_id = %other.id(),
                from = %other.relocated_path().display(),
                to = %target.display(),
                "Moved stashed deletion out of purged data"
            );
            rescued += 1;
        }
        Ok(rescued)
    }

    // ========================================================================
    // Recycle locks
    // ========================================================================

    /// Locks the trash container holding `recycle_id`, and the restore
    /// target when `restoring`
    ///
    /// The live folder owning the container is held shared and the
    /// container slot exclusive, so the data cannot move while it is read or
    /// removed. Owner and target are read before locking and again once the
    /// locks are held; the plan is rebuilt when either changed or a planned
    /// folder vanished.
    async fn lock_recycle(&self, recycle_id: RecycleId, restoring: bool) -> Result<RecycleGuard, CoreError> {
        let trash_key = name_key(self.bin.trash_dir_name());
        for attempt in 1..=RECYCLE_LOCK_ATTEMPTS {
            let item = self.bin.get(recycle_id).await?;
            let top = self.bin.top_level_of(recycle_id).await?;
            let (owner, target) = match self.recycle_plan(&item, &top, restoring).await {
                Ok(plan) => plan,
                Err(CoreError::NotFound(reason)) => {
                    debug!(attempt, %reason, "Recycle lock plan went stale, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let mut request = LockRequest::new()
                .read_folder(owner)
                .write_slot(owner, trash_key.clone())
                .write(LockKey::Recycle(top.id()));
            if restoring {
                request = request.read_folder(target).write_node(target);
            }
            let locks = match self.lock(request).await {
                Ok(locks) => locks,
                Err(CoreError::NotFound(reason)) => {
                    debug!(attempt, %reason, "Folder vanished while locking, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            };

            // purged, restored or moved while we waited
            let item = self.bin.get(recycle_id).await?;
            let top_now = self.bin.top_level_of(recycle_id).await?;
            if top_now == top {
                if let Ok(planned) = self.recycle_plan(&item, &top_now, restoring).await {
                    if planned == (owner, target) {
                        return Ok(RecycleGuard {
                            _locks: locks,
                            item,
                            top: top_now,
                            target,
                        });
                    }
                }
            }
            debug!(attempt, item_id = %recycle_id, "Recycle item moved while locking, retrying");
        }
        Err(CoreError::Conflict(format!(
            "recycle bin item {recycle_id} kept moving; retry the operation"
        )))
    }

    /// Container owner of `top` and, when `restoring`, the folder `item`
    /// returns to
    async fn recycle_plan(
        &self,
        item: &RecycleItem,
        top: &RecycleItem,
        restoring: bool,
    ) -> Result<(Option<EntryId>, Option<EntryId>), CoreError> {
        let owner = self.container_owner(top.relocated_path()).await?;
        let target = if restoring {
            self.restore_parent(item).await?
        } else {
            None
        };
        Ok((owner, target))
    }

    /// Live folder whose trash container holds `relocated`
    async fn container_owner(&self, relocated: &Path) -> Result<Option<EntryId>, CoreError> {
        let root = self.resolver.root();
        let dir = self
            .bin
            .owner_dir(root, relocated)
            .ok_or_else(|| CoreError::io(relocated, "recycled data is outside every trash container"))?;
        if dir == root {
            return Ok(None);
        }
        match self.index.find_by_path(&dir).await? {
            Some(folder) if folder.is_folder() => Ok(Some(folder.id())),
            _ => Err(CoreError::NotFound(format!(
                "folder owning the trash container at {}",
                dir.display()
            ))),
        }
    }

    /// Top-level recycle items, oldest deletion first
    pub async fn list_recycle_bin(&self) -> Result<Vec<RecycleItem>, CoreError> {
        self.bin.list().await
    }
}
