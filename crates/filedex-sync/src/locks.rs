//! Hierarchical lock table for tree operations
//!
//! Every operation describes what it touches as a [`LockRequest`]. The
//! request is resolved against the index into a [`LockPlan`]: shared locks on
//! the tree root and every ancestor of the targets, exclusive locks where the
//! operation mutates. Holding a shared lock on every ancestor means an
//! exclusive lock on a folder excludes all work anywhere in its subtree.
//!
//! ## Design Notes
//!
//! - Keys are taken in the total order of [`LockKey`], so two plans can never
//!   wait on each other in a cycle.
//! - Locks are `tokio::sync::RwLock`s kept in a `DashMap` and pruned when the
//!   last holder lets go, so the table only grows with live contention.
//! - Ancestor chains are read before locking. After the locks are held the
//!   chains are read again; if a concurrent move changed them the locks are
//!   released and the plan rebuilt.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use filedex_core::domain::{EntryId, RecycleId};
use filedex_core::{CoreError, Index};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, warn};

/// Attempts at building a stable plan before giving up with `Conflict`
const MAX_PLAN_ATTEMPTS: usize = 3;

// ============================================================================
// Keys and modes
// ============================================================================

/// A lockable resource
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    /// A folder or entry; `None` is the tree root
    Node(Option<EntryId>),
    /// A child name (by key) inside a folder, for creations and renames
    Slot(Option<EntryId>, String),
    /// A top-level recycle bin item and everything nested in it
    Recycle(RecycleId),
}

/// Access mode for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockMode {
    Shared,
    Exclusive,
}

// ============================================================================
// LockPlan
// ============================================================================

/// Ordered set of keys with the strongest mode requested for each
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockPlan {
    keys: BTreeMap<LockKey, LockMode>,
}

impl LockPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `key`, upgrading an existing shared request to exclusive
    pub fn add(&mut self, key: LockKey, mode: LockMode) {
        let slot = self.keys.entry(key).or_insert(mode);
        *slot = (*slot).max(mode);
    }

    pub fn shared(mut self, key: LockKey) -> Self {
        self.add(key, LockMode::Shared);
        self
    }

    pub fn exclusive(mut self, key: LockKey) -> Self {
        self.add(key, LockMode::Exclusive);
        self
    }

    /// Mode planned for `key`, if any
    pub fn mode(&self, key: &LockKey) -> Option<LockMode> {
        self.keys.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

// ============================================================================
// LockRequest
// ============================================================================

/// What an operation touches, before it is resolved against the index
#[derive(Debug, Clone, Default)]
pub struct LockRequest {
    /// Folders held shared together with their ancestors
    folders: Vec<Option<EntryId>>,
    /// Entries whose ancestors (not the entry itself) are held shared
    parents_of: Vec<EntryId>,
    /// Name slots in the current parent of an entry
    sibling_slots: Vec<(EntryId, String)>,
    /// Keys held exclusively
    exclusive: Vec<LockKey>,
}

impl LockRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared lock on `folder` and each of its ancestors
    pub fn read_folder(mut self, folder: Option<EntryId>) -> Self {
        self.folders.push(folder);
        self
    }

    /// Shared lock on every ancestor of `entry`
    pub fn read_parents_of(mut self, entry: EntryId) -> Self {
        self.parents_of.push(entry);
        self
    }

    /// Exclusive lock on `key`
    pub fn write(mut self, key: LockKey) -> Self {
        self.exclusive.push(key);
        self
    }

    /// Exclusive lock on the node `id`
    pub fn write_node(self, id: Option<EntryId>) -> Self {
        self.write(LockKey::Node(id))
    }

    /// Exclusive lock on the name `key` inside `parent`
    pub fn write_slot(self, parent: Option<EntryId>, key: impl Into<String>) -> Self {
        self.write(LockKey::Slot(parent, key.into()))
    }

    /// Exclusive lock on the name `key` next to `entry`, wherever `entry`
    /// currently lives
    pub fn write_sibling_slot(mut self, entry: EntryId, key: impl Into<String>) -> Self {
        self.sibling_slots.push((entry, key.into()));
        self
    }

    /// Reads the current ancestor chains and builds the plan
    ///
    /// The tree root is always part of the plan, shared at least, so a
    /// whole-tree exclusive lock excludes every other plan.
    pub async fn resolve(&self, index: &Index) -> Result<LockPlan, CoreError> {
        let mut plan = LockPlan::new().shared(LockKey::Node(None));

        for folder in &self.folders {
            for id in index.ancestor_ids(*folder).await? {
                plan.add(LockKey::Node(Some(id)), LockMode::Shared);
            }
        }
        for entry_id in &self.parents_of {
            let entry = index.get(*entry_id).await?;
            for ancestor in index.ancestors(&entry).await? {
                plan.add(LockKey::Node(Some(ancestor.id())), LockMode::Shared);
            }
        }
        for (entry_id, key) in &self.sibling_slots {
            let entry = index.get(*entry_id).await?;
            plan.add(LockKey::Slot(entry.parent_id(), key.clone()), LockMode::Exclusive);
        }
        for key in &self.exclusive {
            plan.add(key.clone(), LockMode::Exclusive);
        }
        Ok(plan)
    }
}

// ============================================================================
// LockManager
// ============================================================================

enum HeldGuard {
    Shared(#[allow(dead_code)] OwnedRwLockReadGuard<()>),
    Exclusive(#[allow(dead_code)] OwnedRwLockWriteGuard<()>),
}

/// Locks held by one operation; released on drop
pub struct LockSet {
    table: Arc<DashMap<LockKey, Arc<RwLock<()>>>>,
    held: Vec<(LockKey, HeldGuard)>,
}

impl LockSet {
    /// Number of keys held
    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Returns true if `key` is held exclusively by this set
    pub fn holds_exclusive(&self, key: &LockKey) -> bool {
        self.held
            .iter()
            .any(|(k, g)| k == key && matches!(g, HeldGuard::Exclusive(_)))
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        for (key, guard) in self.held.drain(..).rev() {
            drop(guard);
            self.table
                .remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}

/// Table of per-key reader/writer locks
#[derive(Clone, Default)]
pub struct LockManager {
    table: Arc<DashMap<LockKey, Arc<RwLock<()>>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently in the table
    pub fn active_keys(&self) -> usize {
        self.table.len()
    }

    /// Acquires every key of `plan` in key order
    pub async fn acquire(&self, plan: &LockPlan) -> LockSet {
        let mut set = LockSet {
            table: Arc::clone(&self.table),
            held: Vec::with_capacity(plan.len()),
        };
        for (key, mode) in &plan.keys {
            let lock = self
                .table
                .entry(key.clone())
                .or_insert_with(|| Arc::new(RwLock::new(())))
                .clone();
            let guard = match mode {
                LockMode::Shared => HeldGuard::Shared(lock.read_owned().await),
                LockMode::Exclusive => HeldGuard::Exclusive(lock.write_owned().await),
            };
            set.held.push((key.clone(), guard));
        }
        set
    }

    /// Resolves `request`, acquires the plan, and checks that the ancestor
    /// chains did not move while waiting
    ///
    /// # Errors
    /// Resolution errors (`NotFound`, `BrokenChain`), or `Conflict` when the
    /// tree keeps changing under the request
    pub async fn lock(&self, index: &Index, request: &LockRequest) -> Result<LockSet, CoreError> {
        for attempt in 1..=MAX_PLAN_ATTEMPTS {
            let plan = request.resolve(index).await?;
            let set = self.acquire(&plan).await;
            if request.resolve(index).await? == plan {
                debug!(keys = plan.len(), attempt, "Lock plan acquired");
                return Ok(set);
            }
            warn!(attempt, "Tree changed while acquiring locks, retrying");
        }
        Err(CoreError::Conflict(
            "the tree changed concurrently; retry the operation".to_string(),
        ))
    }

    /// Exclusive lock on the whole tree
    pub async fn lock_tree(&self) -> LockSet {
        self.acquire(&LockPlan::new().exclusive(LockKey::Node(None)))
            .await
    }
}

// ============================================================================
// Unit tests
// ============================================================================
