//! FileDex Daemon - Background reconciliation service
//!
//! This binary keeps the index in step with the storage directory:
//! - Reconciles once at startup
//! - Watches the storage root and reconciles after changes settle
//! - Serves reconcile requests from divergence reports
//! - Shuts down gracefully on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon wires the engine, then hands the [`ReconcileScheduler`] the
//! watcher's change receiver. The scheduler is the only task that runs
//! reconciliation passes; a `CancellationToken` triggered by SIGTERM or
//! SIGINT stops it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use filedex_audit::{AuditLogger, FileEventLog};
use filedex_cache::{DatabasePool, SqliteIndexRepository, SqliteRecycleRepository};
use filedex_core::config::Config;
use filedex_core::{Index, PathResolver};
use filedex_sync::{
    FileWatcher, LocalFileSystemAdapter, ReconcileHandle, ReconcileReason, ReconcileScheduler,
    RecycleBin, TreeOperations,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// DaemonService
// ============================================================================

/// Main daemon service that owns the engine and the reconcile scheduler
struct DaemonService {
    /// Application configuration loaded from YAML
    config: Config,
    /// Token for signalling graceful shutdown to all async tasks
    shutdown: CancellationToken,
}

impl DaemonService {
    fn new(config: Config, shutdown: CancellationToken) -> Self {
        Self { config, shutdown }
    }

    /// Opens the database and wires the tree operations
    async fn build_engine(&self) -> Result<TreeOperations> {
        let root = &self.config.storage.root;
        tokio::fs::create_dir_all(root)
            .await
            .with_context(|| format!("Failed to create storage root {}", root.display()))?;
        if let Some(parent) = self.config.database.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let pool = DatabasePool::new(&self.config.database.path)
            .await
            .context("Failed to open database")?;
        info!(db = %self.config.database.path.display(), "Database opened");

        let index = Index::new(Arc::new(SqliteIndexRepository::new(pool.pool().clone())));
        let bin = RecycleBin::new(
            Arc::new(SqliteRecycleRepository::new(pool.pool().clone())),
            self.config.storage.trash_dir_name.clone(),
        );
        let audit = Arc::new(AuditLogger::new(Arc::new(FileEventLog::new(
            self.config.events.log_dir.clone(),
        ))));

        Ok(TreeOperations::new(
            index,
            PathResolver::new(root),
            Arc::new(LocalFileSystemAdapter::new()),
            bin,
            audit,
            self.config.workers.max_concurrent_operations,
        ))
    }

    /// Runs until shutdown
    ///
    /// 1. Wires the engine
    /// 2. Starts the watcher when enabled
    /// 3. Requests a startup pass
    /// 4. Runs the scheduler until the shutdown token fires
    async fn run(&self) -> Result<()> {
        let ops = self.build_engine().await?;

        let mut watcher = None;
        let change_rx = if self.config.watcher.enabled {
            match start_watcher(&self.config.storage.root) {
                Ok((w, rx)) => {
                    watcher = Some(w);
                    Some(rx)
                }
                Err(e) => {
                    // Polling still runs; external changes wait for a request
                    warn!(error = %format!("{e:#}"), "File watching unavailable");
                    None
                }
            }
        } else {
            info!("File watching disabled");
            None
        };

        let (mut scheduler, handle) = ReconcileScheduler::new(
            ops.reconciler(),
            change_rx,
            Duration::from_millis(self.config.watcher.debounce_ms),
            Duration::from_millis(self.config.watcher.poll_interval_ms),
            self.config.storage.trash_dir_name.clone(),
        );
        let ops = ops.with_reconcile_handle(handle.clone());

        request_startup_pass(&handle);
        scheduler.run(self.shutdown.clone()).await;

        drop(watcher);
        drop(ops);
        Ok(())
    }
}

fn start_watcher(
    root: &std::path::Path,
) -> Result<(FileWatcher, tokio::sync::mpsc::Receiver<filedex_sync::ChangeEvent>)> {
    let (mut watcher, rx) = FileWatcher::new()?;
    let handle = watcher.watch(root)?;
    info!(path = %handle.path().display(), "Watching storage root");
    Ok((watcher, rx))
}

fn request_startup_pass(handle: &ReconcileHandle) {
    if !handle.request(ReconcileReason::Requested) {
        error!("Scheduler rejected the startup reconciliation");
    }
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

fn init_tracing(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);

    init_tracing(&config);
    info!(config_path = %config_path.display(), "FileDex daemon starting (filedexd)");

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!(field = %e.field, "{}", e.message);
        }
        anyhow::bail!("Invalid configuration in {}", config_path.display());
    }

    let shutdown_token = CancellationToken::new();

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::new(config, shutdown_token);
    let result = service.run().await;

    match &result {
        Ok(()) => info!("FileDex daemon shut down gracefully"),
        Err(e) => error!(error = %e, "FileDex daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
