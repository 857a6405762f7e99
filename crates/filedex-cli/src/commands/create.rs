//! mkdir, touch and upload

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tokio::io::AsyncRead;
use tracing::info;

use super::Session;

/// Create a folder
#[derive(Debug, Args)]
pub struct MkdirCommand {
    /// Name of the new folder
    pub name: String,

    /// Parent folder (entry id or path; root when omitted)
    #[arg(long, short)]
    pub parent: Option<String>,
}

impl MkdirCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        let parent = session.resolve_folder(self.parent.as_deref()).await?;
        let entry = session
            .ops
            .create_folder(&session.actor, &self.name, parent)
            .await?;
        session.print_entry("Created", &entry);
        Ok(())
    }
}

/// Create an empty file
#[derive(Debug, Args)]
pub struct TouchCommand {
    /// Name of the new file
    pub name: String,

    /// Parent folder (entry id or path; root when omitted)
    #[arg(long, short)]
    pub parent: Option<String>,
}

impl TouchCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        let parent = session.resolve_folder(self.parent.as_deref()).await?;
        let entry = session
            .ops
            .create_file(&session.actor, &self.name, parent)
            .await?;
        session.print_entry("Created", &entry);
        Ok(())
    }
}

/// Upload a local file (or stdin) as a new file
#[derive(Debug, Args)]
pub struct UploadCommand {
    /// Local file to read, or `-` for stdin
    pub source: PathBuf,

    /// Parent folder (entry id or path; root when omitted)
    #[arg(long, short)]
    pub parent: Option<String>,

    /// Name of the new file (defaults to the source file name)
    #[arg(long, short)]
    pub name: Option<String>,
}

impl UploadCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        let from_stdin = self.source.as_os_str() == "-";
        let name = match (&self.name, from_stdin) {
            (Some(name), _) => name.clone(),
            (None, false) => self
                .source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .context("Source has no file name; pass --name")?,
            (None, true) => anyhow::bail!("--name is required when uploading from stdin"),
        };
        let parent = session.resolve_folder(self.parent.as_deref()).await?;

        let mut source: Box<dyn AsyncRead + Unpin + Send> = if from_stdin {
            Box::new(tokio::io::stdin())
        } else {
            Box::new(
                tokio::fs::File::open(&self.source)
                    .await
                    .with_context(|| format!("Failed to open {}", self.source.display()))?,
            )
        };

        info!(source = %self.source.display(), name = %name, "Uploading");
        let entry = session
            .ops
            .upload(&session.actor, parent, &name, source.as_mut())
            .await?;
        session.print_entry("Uploaded", &entry);
        Ok(())
    }
}
