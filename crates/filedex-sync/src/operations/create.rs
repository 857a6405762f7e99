//! Folder, empty file and upload creation

use filedex_core::domain::{Actor, Entry, EntryId, EntryKind};
use filedex_core::naming::{name_key, validate_name};
use filedex_core::CoreError;
use tokio::io::AsyncRead;
use tracing::{debug, instrument};

use super::TreeOperations;
use crate::locks::LockRequest;

/// What to put on disk for a new entry
enum Content<'a> {
    Folder,
    Empty,
    Stream(&'a mut (dyn AsyncRead + Unpin + Send)),
}

impl TreeOperations {
    /// Creates an empty folder
    pub async fn create_folder(
        &self,
        actor: &Actor,
        name: &str,
        parent: Option<EntryId>,
    ) -> Result<Entry, CoreError> {
        self.create_entry(actor, name, parent, Content::Folder).await
    }

    /// Creates an empty file
    pub async fn create_file(
        &self,
        actor: &Actor,
        name: &str,
        parent: Option<EntryId>,
    ) -> Result<Entry, CoreError> {
        self.create_entry(actor, name, parent, Content::Empty).await
    }

    /// Creates a file from a byte stream
    ///
    /// The recorded size is the number of bytes written. An existing name
    /// is a `Conflict`; uploads never overwrite.
    pub async fn upload(
        &self,
        actor: &Actor,
        parent: Option<EntryId>,
        name: &str,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<Entry, CoreError> {
        self.create_entry(actor, name, parent, Content::Stream(source))
            .await
    }

    #[instrument(skip(self, actor, content), fields(actor = %actor.id()))]
    async fn create_entry(
        &self,
        actor: &Actor,
        name: &str,
        parent: Option<EntryId>,
        content: Content<'_>,
    ) -> Result<Entry, CoreError> {
        validate_name(name, self.bin.trash_dir_name())?;

        let _permit = self.permit().await?;
        let _locks = self
            .lock(
                LockRequest::new()
                    .read_folder(parent)
                    .write_slot(parent, name_key(name)),
            )
            .await?;

        let parent_entry = self.index.require_folder(parent).await?;
        self.index.ensure_name_free(parent, name, None).await?;
        let path = self.resolver.child_path(parent_entry.as_ref(), name);

        let (kind, size, uploaded) = match content {
            Content::Folder => {
                self.fs.mkdir(&path).await?;
                (EntryKind::Folder, 0, false)
            }
            Content::Empty => {
                self.fs.touch(&path).await?;
                (EntryKind::File, 0, false)
            }
            Content::Stream(source) => {
                let written = self.fs.write_new(&path, source).await?;
                (EntryKind::File, written, true)
            }
        };

        let entry = Entry::with_kind(kind, name, parent, path, size, actor.id().clone());
        if let Err(e) = self.index.insert(&entry).await {
            return Err(self
                .compensate(e, entry.path(), self.fs.remove_tree(entry.path()))
                .await);
        }

        if uploaded {
            self.audit.log_uploaded(actor.id(), &entry).await;
        } else {
            self.audit.log_created(actor.id(), &entry).await;
        }
        debug!(entry_id = %entry.id(), path = %entry.path().display(), "Entry created");
        Ok(entry)
    }
}
