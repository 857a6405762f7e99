//! Storage-root watching and debounced change queue
//!
//! [`FileWatcher`] wraps the `notify` crate and turns raw OS events under the
//! storage root into [`ChangeEvent`] values. [`DebouncedChangeQueue`] holds
//! them until a path has been quiet for the debounce window, so a burst of
//! writes yields one reconciliation instead of hundreds.
//!
//! ## Architecture
//!
//! ```text
//! inotify / kqueue
//!       │
//!       ▼
//!  FileWatcher ──→ mpsc::channel ──→ ReconcileScheduler ──→ SyncReconciler
//!                                           │
//!                                  DebouncedChangeQueue
//! ```
//!
//! Changes made by FileDex itself are observed too. Reconciliation is
//! idempotent, so the extra run only confirms the index.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Capacity of the watcher → scheduler channel
const CHANGE_CHANNEL_CAPACITY: usize = 1024;

// ============================================================================
// ChangeEvent
// ============================================================================

/// A change observed below the storage root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A file or directory appeared
    Created(PathBuf),
    /// Content or metadata changed
    Modified(PathBuf),
    /// A file or directory disappeared
    Deleted(PathBuf),
    /// A file or directory was renamed or moved
    Renamed {
        /// Path before the rename
        old: PathBuf,
        /// Path after the rename
        new: PathBuf,
    },
}

impl ChangeEvent {
    /// Returns the primary path of the event
    ///
    /// For renames this is the destination.
    pub fn path(&self) -> &Path {
        match self {
            ChangeEvent::Created(p) | ChangeEvent::Modified(p) | ChangeEvent::Deleted(p) => p,
            ChangeEvent::Renamed { new, .. } => new,
        }
    }

    /// Returns true if every path of the event passes through a directory
    /// called `component`
    ///
    /// Used to drop events that happen inside trash containers. A rename
    /// out of a container still counts, since the destination is live.
    pub fn is_inside(&self, component: &str) -> bool {
        let inside = |path: &Path| {
            path.components()
                .any(|c| matches!(c, Component::Normal(n) if n == OsStr::new(component)))
        };
        match self {
            ChangeEvent::Renamed { old, new } => inside(old) && inside(new),
            other => inside(other.path()),
        }
    }
}

// ============================================================================
// FileWatcher
// ============================================================================

/// Watches a directory tree with the OS-native mechanism
///
/// ```ignore
/// let (mut watcher, rx) = FileWatcher::new()?;
/// let _handle = watcher.watch(config.storage.root.as_path())?;
/// ```
pub struct FileWatcher {
    watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Creates a watcher and the receiver its events arrive on
    ///
    /// # Errors
    /// Returns an error if the OS watcher cannot be created
    pub fn new() -> Result<(Self, mpsc::Receiver<ChangeEvent>)> {
        let (event_tx, event_rx) = mpsc::channel::<ChangeEvent>(CHANGE_CHANNEL_CAPACITY);

        info!("Initializing file watcher");

        let watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if let Some(change) = map_notify_event(&event) {
                        if let Err(e) = event_tx.blocking_send(change) {
                            warn!(error = %e, "Failed to send change event (receiver dropped)");
                        }
                    }
                }
                Err(err) => {
                    error!(error = %err, "File watcher error");
                }
            },
            notify::Config::default(),
        )
        .context("Failed to create file watcher")?;

        Ok((Self { watcher }, event_rx))
    }

    /// Starts watching `path` recursively
    ///
    /// # Errors
    /// Returns an error if the path cannot be watched (missing, no
    /// permission, or the inotify watch limit is reached)
    pub fn watch(&mut self, path: &Path) -> Result<WatchHandle> {
        info!(path = %path.display(), "Starting recursive watch");

        self.watcher
            .watch(path, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch path: {}", path.display()))?;

        Ok(WatchHandle {
            path: path.to_path_buf(),
        })
    }

    /// Stops watching `path`
    pub fn unwatch(&mut self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "Stopping watch");

        self.watcher
            .unwatch(path)
            .with_context(|| format!("Failed to unwatch path: {}", path.display()))
    }
}

/// Record of an active watch
#[derive(Debug)]
pub struct WatchHandle {
    path: PathBuf,
}

impl WatchHandle {
    /// Returns the watched path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ============================================================================
// Event mapping
// ============================================================================

/// Converts a `notify::Event` into a [`ChangeEvent`]
///
/// Access events and events without paths are dropped.
fn map_notify_event(event: &notify::Event) -> Option<ChangeEvent> {
    let paths = &event.paths;

    match &event.kind {
        EventKind::Create(_) => Some(ChangeEvent::Created(paths.first()?.clone())),

        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() >= 2 => {
            Some(ChangeEvent::Renamed {
                old: paths[0].clone(),
                new: paths[1].clone(),
            })
        }

        EventKind::Modify(_) => Some(ChangeEvent::Modified(paths.first()?.clone())),

        EventKind::Remove(_) => Some(ChangeEvent::Deleted(paths.first()?.clone())),

        _ => {
            debug!(kind = ?event.kind, "Ignoring event kind");
            None
        }
    }
}

// ============================================================================
// DebouncedChangeQueue
// ============================================================================

/// Coalesces rapid changes per path
///
/// A new event for a pending path replaces the old one and restarts its
/// quiet period. [`poll`](DebouncedChangeQueue::poll) hands out only the
/// events whose quiet period has elapsed.
pub struct DebouncedChangeQueue {
    pending: HashMap<PathBuf, (ChangeEvent, Instant)>,
    debounce_delay: Duration,
}

impl DebouncedChangeQueue {
    /// Creates an empty queue
    pub fn new(debounce_delay: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            debounce_delay,
        }
    }

    /// Inserts or replaces the pending event for the event's path
    pub fn push(&mut self, event: ChangeEvent) {
        let path = event.path().to_path_buf();
        debug!(path = %path.display(), event = ?event, "Enqueuing change event");
        self.pending.insert(path, (event, Instant::now()));
    }

    /// Removes and returns every event that has settled
    pub fn poll(&mut self) -> Vec<ChangeEvent> {
        let now = Instant::now();
        let delay = self.debounce_delay;
        let settled_paths: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, (_, at))| now.duration_since(*at) >= delay)
            .map(|(path, _)| path.clone())
            .collect();

        let settled: Vec<ChangeEvent> = settled_paths
            .iter()
            .filter_map(|path| self.pending.remove(path).map(|(event, _)| event))
            .collect();

        if !settled.is_empty() {
            debug!(count = settled.len(), "Polled settled change events");
        }
        settled
    }

    /// Drops every pending event and returns how many there were
    pub fn drain(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    /// Number of unsettled events
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

// ============================================================================
// Unit tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};

    fn event(kind: EventKind, paths: &[&str]) -> notify::Event {
        let mut event = notify::Event::new(kind);
        for p in paths {
            event = event.add_path(PathBuf::from(p));
        }
        event
    }

    // ------------------------------------------------------------------
    // ChangeEvent
    // ------------------------------------------------------------------

    #[test]
    fn test_renamed_path_is_destination() {
        let event = ChangeEvent::Renamed {
            old: PathBuf::from("/srv/old.txt"),
            new: PathBuf::from("/srv/new.txt"),
        };
        assert_eq!(event.path(), Path::new("/srv/new.txt"));
    }

    #[test]
    fn test_is_inside_trash_container() {
        let trash = ".filedex-trash";
        assert!(ChangeEvent::Created(PathBuf::from("/srv/Work/.filedex-trash/plan.txt")).is_inside(trash));
        assert!(!ChangeEvent::Created(PathBuf::from("/srv/Work/plan.txt")).is_inside(trash));
        assert!(!ChangeEvent::Created(PathBuf::from("/srv/Work/.filedex-trash-old")).is_inside(trash));

        let restored = ChangeEvent::Renamed {
            old: PathBuf::from("/srv/.filedex-trash/Work"),
            new: PathBuf::from("/srv/Work"),
        };
        assert!(!restored.is_inside(trash));
    }

    // ------------------------------------------------------------------
    // map_notify_event
    // ------------------------------------------------------------------

    #[test]
    fn test_map_create_and_remove() {
        let created = map_notify_event(&event(EventKind::Create(CreateKind::File), &["/srv/a"]));
        assert_eq!(created, Some(ChangeEvent::Created(PathBuf::from("/srv/a"))));

        let removed = map_notify_event(&event(EventKind::Remove(RemoveKind::Folder), &["/srv/d"]));
        assert_eq!(removed, Some(ChangeEvent::Deleted(PathBuf::from("/srv/d"))));
    }

    #[test]
    fn test_map_rename_both() {
        let mapped = map_notify_event(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/srv/a", "/srv/b"],
        ));
        assert_eq!(
            mapped,
            Some(ChangeEvent::Renamed {
                old: PathBuf::from("/srv/a"),
                new: PathBuf::from("/srv/b"),
            })
        );
    }

    #[test]
    fn test_map_single_path_rename_is_modification() {
        let mapped = map_notify_event(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/srv/a"],
        ));
        assert_eq!(mapped, Some(ChangeEvent::Modified(PathBuf::from("/srv/a"))));

        let data = map_notify_event(&event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/srv/a"],
        ));
        assert_eq!(data, Some(ChangeEvent::Modified(PathBuf::from("/srv/a"))));
    }

    #[test]
    fn test_map_ignores_access_and_empty() {
        assert!(map_notify_event(&event(EventKind::Access(notify::event::AccessKind::Any), &["/srv/a"])).is_none());
        assert!(map_notify_event(&event(EventKind::Create(CreateKind::Any), &[])).is_none());
    }

    // ------------------------------------------------------------------
    // DebouncedChangeQueue
    // ------------------------------------------------------------------

    #[test]
    fn test_push_coalesces_same_path() {
        let mut queue = DebouncedChangeQueue::new(Duration::from_millis(100));
        queue.push(ChangeEvent::Created(PathBuf::from("/a.txt")));
        queue.push(ChangeEvent::Modified(PathBuf::from("/a.txt")));
        queue.push(ChangeEvent::Created(PathBuf::from("/b.txt")));
        assert_eq!(queue.pending_count(), 2);
    }

    #[test]
    fn test_poll_keeps_latest_event() {
        let mut queue = DebouncedChangeQueue::new(Duration::from_millis(0));
        queue.push(ChangeEvent::Created(PathBuf::from("/a.txt")));
        queue.push(ChangeEvent::Deleted(PathBuf::from("/a.txt")));

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(queue.poll(), vec![ChangeEvent::Deleted(PathBuf::from("/a.txt"))]);
        assert!(queue.is_empty());
        assert!(queue.poll().is_empty());
    }

    #[test]
    fn test_poll_holds_recent_events() {
        let mut queue = DebouncedChangeQueue::new(Duration::from_secs(60));
        queue.push(ChangeEvent::Created(PathBuf::from("/a.txt")));
        assert!(queue.poll().is_empty());
        assert_eq!(queue.pending_count(), 1);
    }

    #[test]
    fn test_poll_partial_settlement() {
        let mut queue = DebouncedChangeQueue::new(Duration::from_millis(50));
        queue.push(ChangeEvent::Created(PathBuf::from("/old.txt")));
        std::thread::sleep(Duration::from_millis(70));
        queue.push(ChangeEvent::Created(PathBuf::from("/new.txt")));

        assert_eq!(queue.poll(), vec![ChangeEvent::Created(PathBuf::from("/old.txt"))]);
        assert_eq!(queue.pending_count(), 1);
    }

    #[test]
    fn test_drain() {
        let mut queue = DebouncedChangeQueue::new(Duration::from_secs(60));
        queue.push(ChangeEvent::Created(PathBuf::from("/a.txt")));
        queue.push(ChangeEvent::Created(PathBuf::from("/b.txt")));
        assert_eq!(queue.drain(), 2);
        assert!(queue.is_empty());
    }
}
