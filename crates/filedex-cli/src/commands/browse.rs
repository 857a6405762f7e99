//! Read-only commands: ls, search, props, download, log

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{relative_path, Session};
use crate::output::{entry_line, format_size, to_json};

/// List a folder
#[derive(Debug, Args)]
pub struct LsCommand {
    /// Folder to list (entry id or path; root when omitted)
    pub folder: Option<String>,

    /// List the directory on disk instead of the index
    #[arg(long)]
    pub disk: bool,

    /// Page number for --disk listings (1-based)
    #[arg(long, default_value = "1")]
    pub page: usize,

    /// Page size for --disk listings
    #[arg(long, default_value = "50")]
    pub limit: usize,
}

impl LsCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        if self.disk {
            return self.execute_disk(session).await;
        }

        let formatter = session.formatter();
        let folder = session.resolve_folder(self.folder.as_deref()).await?;
        let children = session.ops.list_children(folder).await?;

        if session.is_json() {
            formatter.print_json(&to_json(&children));
        } else if children.is_empty() {
            formatter.info("(empty)");
        } else {
            for child in &children {
                formatter.info(&entry_line(child));
            }
        }
        Ok(())
    }

    async fn execute_disk(&self, session: &Session) -> Result<()> {
        let formatter = session.formatter();
        let relative = relative_path(self.folder.as_deref().unwrap_or(""))?;
        let page = session
            .ops
            .list_directory(relative, self.page, self.limit)
            .await?;

        if session.is_json() {
            formatter.print_json(&to_json(&page));
        } else {
            for item in &page.items {
                let marker = if item.is_dir { "/" } else { "" };
                formatter.info(&format!(
                    "{:<40} {:>10}",
                    format!("{}{}", item.name, marker),
                    if item.is_dir { "-".to_string() } else { format_size(item.size) }
                ));
            }
            formatter.info(&format!(
                "page {}/{} ({} items)",
                page.page,
                page.pages.max(1),
                page.total
            ));
        }
        Ok(())
    }
}

/// Search entries by name
#[derive(Debug, Args)]
pub struct SearchCommand {
    /// Case-insensitive substring to look for
    pub text: String,
}

impl SearchCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        let formatter = session.formatter();
        let found = session.ops.search(&self.text).await?;

        if session.is_json() {
            formatter.print_json(&to_json(&found));
        } else if found.is_empty() {
            formatter.info(&format!("No entries match {:?}", self.text));
        } else {
            for entry in &found {
                formatter.info(&format!("{}  {}", entry_line(entry), entry.path().display()));
            }
        }
        Ok(())
    }
}

/// Show disk metadata of an entry
#[derive(Debug, Args)]
pub struct PropsCommand {
    /// Entry id or path
    pub target: String,
}

impl PropsCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        let formatter = session.formatter();
        let id = session.resolve(&self.target).await?;
        let props = session.ops.properties(id).await?;

        if session.is_json() {
            let mut value = to_json(&props);
            value["permissions"] = serde_json::Value::String(props.permissions());
            formatter.print_json(&value);
        } else {
            formatter.success(&props.name);
            formatter.info(&format!("Id:          {}", props.id));
            formatter.info(&format!("Kind:        {}", props.kind));
            formatter.info(&format!("Path:        {}", props.path.display()));
            formatter.info(&format!("Size:        {} ({} bytes)", format_size(props.size), props.size));
            formatter.info(&format!("Owner:       {}", props.owner_id));
            formatter.info(&format!("Permissions: {}", props.permissions()));
            formatter.info(&format!("Starred:     {}", if props.starred { "yes" } else { "no" }));
            formatter.info(&format!("Created:     {}", props.created_at.to_rfc3339()));
            formatter.info(&format!("Modified:    {}", props.modified_at.to_rfc3339()));
            if let Some(accessed) = props.accessed_at {
                formatter.info(&format!("Accessed:    {}", accessed.to_rfc3339()));
            }
        }
        Ok(())
    }
}

/// Write a file's content to a local file or stdout
#[derive(Debug, Args)]
pub struct DownloadCommand {
    /// Entry id or path of the file
    pub target: String,

    /// Local destination (stdout when omitted)
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

impl DownloadCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        let id = session.resolve(&self.target).await?;

        let mut sink: Box<dyn AsyncWrite + Unpin + Send> = match &self.output {
            Some(path) => Box::new(
                tokio::fs::File::create(path)
                    .await
                    .with_context(|| format!("Failed to create {}", path.display()))?,
            ),
            None => Box::new(tokio::io::stdout()),
        };
        let bytes = session.ops.download(&session.actor, id, sink.as_mut()).await?;
        sink.flush().await.context("Failed to flush output")?;

        // stdout carries the content; only report when writing to a file
        if let Some(path) = &self.output {
            let formatter = session.formatter();
            if session.is_json() {
                formatter.print_json(&serde_json::json!({
                    "id": id,
                    "bytes": bytes,
                    "output": path,
                }));
            } else {
                formatter.success(&format!("Wrote {} to {}", format_size(bytes), path.display()));
            }
        }
        Ok(())
    }
}

/// Show the event log of an entry
#[derive(Debug, Args)]
pub struct LogCommand {
    /// Entry id or path
    pub target: String,
}

impl LogCommand {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        let formatter = session.formatter();
        let id = session.resolve(&self.target).await?;
        let lines = session.ops.entry_log(id).await?;

        if session.is_json() {
            formatter.print_json(&serde_json::json!({"id": id, "events": lines}));
        } else if lines.is_empty() {
            formatter.info("(no events)");
        } else {
            for line in &lines {
                println!("{line}");
            }
        }
        Ok(())
    }
}
