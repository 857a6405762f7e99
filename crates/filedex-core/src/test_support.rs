//! In-memory repository used by the unit tests of this crate

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::{Entry, EntryId};
use crate::ports::{IIndexRepository, RepositoryError};

#[derive(Default)]
pub(crate) struct MemoryIndexRepository {
    entries: Mutex<HashMap<EntryId, Entry>>,
}

impl MemoryIndexRepository {
    /// Stores an entry without any constraint checks
    pub(crate) fn force_insert(&self, entry: Entry) {
        self.entries.lock().unwrap().insert(entry.id(), entry);
    }

    fn check(map: &HashMap<EntryId, Entry>, entry: &Entry) -> Result<(), RepositoryError> {
        if let Some(parent) = entry.parent_id() {
            if !map.contains_key(&parent) {
                return Err(RepositoryError::MissingParent(parent.to_string()));
            }
        }
        let clash = map.values().any(|e| {
            e.id() != entry.id()
                && e.parent_id() == entry.parent_id()
                && e.name_key() == entry.name_key()
        });
        if clash {
            return Err(RepositoryError::Duplicate(entry.name().to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl IIndexRepository for MemoryIndexRepository {
    async fn insert_entry(&self, entry: &Entry) -> Result<(), RepositoryError> {
        self.insert_entries(std::slice::from_ref(entry)).await
    }

    async fn insert_entries(&self, entries: &[Entry]) -> Result<(), RepositoryError> {
        let mut map = self.entries.lock().unwrap();
        let mut staged = map.clone();
        for entry in entries {
            if staged.contains_key(&entry.id()) {
                return Err(RepositoryError::Duplicate(entry.id().to_string()));
            }
            Self::check(&staged, entry)?;
            staged.insert(entry.id(), entry.clone());
        }
        *map = staged;
        Ok(())
    }

    async fn update_entries(&self, entries: &[Entry]) -> Result<(), RepositoryError> {
        let mut map = self.entries.lock().unwrap();
        let mut staged = map.clone();
        for entry in entries {
            staged.insert(entry.id(), entry.clone());
        }
        for entry in entries {
            Self::check(&staged, entry)?;
        }
        *map = staged;
        Ok(())
    }

    async fn get_entry(&self, id: EntryId) -> Result<Option<Entry>, RepositoryError> {
        Ok(self.entries.lock().unwrap().get(&id).cloned())
    }

    async fn get_child_by_name(
        &self,
        parent: Option<EntryId>,
        name_key: &str,
    ) -> Result<Option<Entry>, RepositoryError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .values()
            .find(|e| e.parent_id() == parent && e.name_key() == name_key)
            .cloned())
    }

    async fn list_children(&self, parent: Option<EntryId>) -> Result<Vec<Entry>, RepositoryError> {
        let mut children: Vec<Entry> = self
            .entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.parent_id() == parent)
            .cloned()
            .collect();
        children.sort_by(|a, b| a.name_key().cmp(b.name_key()));
        Ok(children)
    }

    async fn get_entry_by_path(&self, path: &Path) -> Result<Option<Entry>, RepositoryError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .values()
            .find(|e| e.path() == path)
            .cloned())
    }

    async fn delete_entries(&self, ids: &[EntryId]) -> Result<(), RepositoryError> {
        let mut map = self.entries.lock().unwrap();
        for id in ids {
            map.remove(id);
        }
        Ok(())
    }

    async fn search(&self, needle: &str) -> Result<Vec<Entry>, RepositoryError> {
        let needle = needle.to_lowercase();
        let mut hits: Vec<Entry> = self
            .entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.name_key().contains(&needle))
            .cloned()
            .collect();
        hits.sort_by(|a, b| {
            b.is_starred()
                .cmp(&a.is_starred())
                .then_with(|| a.name_key().cmp(b.name_key()))
        });
        Ok(hits)
    }

    async fn list_all(&self) -> Result<Vec<Entry>, RepositoryError> {
        Ok(self.entries.lock().unwrap().values().cloned().collect())
    }
}
