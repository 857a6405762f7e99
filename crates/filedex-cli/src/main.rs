//! FileDex CLI - Command-line interface for the FileDex file index
//!
//! Provides commands for:
//! - Creating, uploading and downloading files
//! - Renaming, moving, copying and starring entries
//! - Managing the recycle bin
//! - Reconciling the index with the storage directory
//! - Viewing and validating configuration

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use filedex_core::config::Config;
use filedex_core::domain::{Actor, ActorId};
use filedex_core::CoreError;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    browse::{DownloadCommand, LogCommand, LsCommand, PropsCommand, SearchCommand},
    config::ConfigCommand,
    create::{MkdirCommand, TouchCommand, UploadCommand},
    recycle::{BinCommand, PurgeCommand, RestoreCommand, RmCommand},
    relocate::{CpCommand, MvCommand, RenameCommand, StarCommand},
    sync::SyncCommand,
    Session,
};
use output::{get_formatter, OutputFormat};

#[derive(Debug, Parser)]
#[command(name = "filedex", version, about = "Hierarchical file index over a local directory")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Identity recorded as owner and in the event log
    #[arg(long, global = true)]
    actor: Option<String>,

    /// Act with privileges (required to purge recycle bin items)
    #[arg(long, global = true)]
    privileged: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a folder
    Mkdir(MkdirCommand),
    /// Create an empty file
    Touch(TouchCommand),
    /// Upload a local file
    Upload(UploadCommand),
    /// List a folder
    Ls(LsCommand),
    /// Rename an entry
    Rename(RenameCommand),
    /// Move entries into a folder
    Mv(MvCommand),
    /// Copy entries into a folder
    Cp(CpCommand),
    /// Move an entry to the recycle bin
    Rm(RmCommand),
    /// Restore a recycle bin item
    Restore(RestoreCommand),
    /// Permanently delete a recycle bin item
    Purge(PurgeCommand),
    /// Star or unstar an entry
    Star(StarCommand),
    /// Search entries by name
    Search(SearchCommand),
    /// Show entry properties
    Props(PropsCommand),
    /// Write a file's content out
    Download(DownloadCommand),
    /// Show an entry's event log
    Log(LogCommand),
    /// Reconcile the index with the storage directory
    Sync(SyncCommand),
    /// List the recycle bin
    Bin(BinCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match run(cli, format).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let formatter = get_formatter(matches!(format, OutputFormat::Json));
            let code = match e.downcast_ref::<CoreError>() {
                Some(core) => {
                    if matches!(format, OutputFormat::Json) {
                        formatter.print_json(&serde_json::json!({
                            "success": false,
                            "kind": core.kind(),
                            "error": core.to_string(),
                        }));
                    } else {
                        formatter.error(&core.to_string());
                    }
                    core.kind().exit_code()
                }
                None => {
                    if matches!(format, OutputFormat::Json) {
                        formatter.print_json(&serde_json::json!({
                            "success": false,
                            "error": format!("{e:#}"),
                        }));
                    } else {
                        formatter.error(&format!("{e:#}"));
                    }
                    1
                }
            };
            ExitCode::from(code as u8)
        }
    }
}

async fn run(cli: Cli, format: OutputFormat) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);

    // Setup tracing; stdout is reserved for command output
    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!(config_path = %config_path.display(), "Loaded configuration");

    if let Commands::Config(cmd) = &cli.command {
        return cmd.execute(&config_path, format).await;
    }

    let actor_name = cli.actor.clone().unwrap_or_else(whoami::username);
    let actor_id = ActorId::new(&actor_name)
        .with_context(|| format!("Invalid actor {actor_name:?}"))?;
    let session = Session::open(&config, Actor::new(actor_id, cli.privileged), format).await?;

    match cli.command {
        Commands::Mkdir(cmd) => cmd.execute(&session).await,
        Commands::Touch(cmd) => cmd.execute(&session).await,
        Commands::Upload(cmd) => cmd.execute(&session).await,
        Commands::Ls(cmd) => cmd.execute(&session).await,
        Commands::Rename(cmd) => cmd.execute(&session).await,
        Commands::Mv(cmd) => cmd.execute(&session).await,
        Commands::Cp(cmd) => cmd.execute(&session).await,
        Commands::Rm(cmd) => cmd.execute(&session).await,
        Commands::Restore(cmd) => cmd.execute(&session).await,
        Commands::Purge(cmd) => cmd.execute(&session).await,
        Commands::Star(cmd) => cmd.execute(&session).await,
        Commands::Search(cmd) => cmd.execute(&session).await,
        Commands::Props(cmd) => cmd.execute(&session).await,
        Commands::Download(cmd) => cmd.execute(&session).await,
        Commands::Log(cmd) => cmd.execute(&session).await,
        Commands::Sync(cmd) => cmd.execute(&session).await,
        Commands::Bin(cmd) => cmd.execute(&session).await,
        Commands::Config(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_move_with_global_flags() {
        let cli = Cli::try_parse_from([
            "filedex", "mv", "Work/a.txt", "Work/b.txt", "--to", "Archive", "--json", "--actor", "bob",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.actor.as_deref(), Some("bob"));
        match cli.command {
            Commands::Mv(cmd) => {
                assert_eq!(cmd.targets, vec!["Work/a.txt", "Work/b.txt"]);
                assert_eq!(cmd.to.as_deref(), Some("Archive"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_star_flags_conflict() {
        assert!(Cli::try_parse_from(["filedex", "star", "x", "--on", "--off"]).is_err());
    }
}
