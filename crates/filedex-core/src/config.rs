//! Configuration module for FileDex.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for FileDex.
///
/// Every section is optional in the YAML file; missing sections and fields
/// take their default values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub events: EventsConfig,
    pub workers: WorkersConfig,
    pub watcher: WatcherConfig,
    pub logging: LoggingConfig,
}

/// Physical storage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory under which all indexed files and folders live.
    pub root: PathBuf,
    /// Name of the per-folder trash container holding soft-deleted data.
    pub trash_dir_name: String,
}

/// Index database settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
}

/// Per-entry event log settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Directory holding one log file per entry.
    pub log_dir: PathBuf,
}

/// Worker pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// Maximum number of mutating operations running at once.
    pub max_concurrent_operations: usize,
}

/// Filesystem watcher and background reconciliation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Whether the daemon watches the storage root for out-of-band changes.
    pub enabled: bool,
    /// Quiet period (in milliseconds) before a burst of changes is reconciled.
    pub debounce_ms: u64,
    /// Milliseconds between scheduler ticks.
    pub poll_interval_ms: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON-formatted log lines.
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Write the configuration as YAML to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/filedex/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("filedex")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("filedex")
}

/// Default trash container name.
pub const DEFAULT_TRASH_DIR_NAME: &str = ".filedex-trash";

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: data_dir().join("storage"),
            trash_dir_name: DEFAULT_TRASH_DIR_NAME.to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: data_dir().join("index.db"),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            log_dir: data_dir().join("file_logs"),
        }
    }
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            max_concurrent_operations: 8,
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 500,
            poll_interval_ms: 250,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"workers.max_concurrent_operations"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid. The storage root
    /// is not required to exist; binaries create it on startup.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- storage ---
        if !self.storage.root.is_absolute() {
            errors.push(ValidationError {
                field: "storage.root".into(),
                message: format!("must be an absolute path: {}", self.storage.root.display()),
            });
        }
        let trash = &self.storage.trash_dir_name;
        if trash.is_empty() || trash == "." || trash == ".." || trash.contains(['/', '\\']) {
            errors.push(ValidationError {
                field: "storage.trash_dir_name".into(),
                message: format!("must be a single path component, got '{trash}'"),
            });
        }

        // --- database / events ---
        if self.database.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "database.path".into(),
                message: "must not be empty".into(),
            });
        }
        if self.events.log_dir.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "events.log_dir".into(),
                message: "must not be empty".into(),
            });
        }
        if self.events.log_dir.starts_with(&self.storage.root) {
            errors.push(ValidationError {
                field: "events.log_dir".into(),
                message: "must not live inside storage.root".into(),
            });
        }

        // --- workers ---
        if self.workers.max_concurrent_operations == 0 || self.workers.max_concurrent_operations > 256 {
            errors.push(ValidationError {
                field: "workers.max_concurrent_operations".into(),
                message: "must be in range 1..=256".into(),
            });
        }

        // --- watcher ---
        if self.watcher.debounce_ms == 0 {
            errors.push(ValidationError {
                field: "watcher.debounce_ms".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.watcher.poll_interval_ms == 0 {
            errors.push(ValidationError {
                field: "watcher.poll_interval_ms".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use filedex_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .storage_root(PathBuf::from("/srv/filedex"))
///     .max_concurrent_operations(4)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- storage ---

    pub fn storage_root(mut self, root: PathBuf) -> Self {
        self.config.storage.root = root;
        self
    }

    pub fn trash_dir_name(mut self, name: impl Into<String>) -> Self {
        self.config.storage.trash_dir_name = name.into();
        self
    }

    // --- database / events ---

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.config.database.path = path;
        self
    }

    pub fn events_log_dir(mut self, dir: PathBuf) -> Self {
        self.config.events.log_dir = dir;
        self
    }

    // --- workers ---

    pub fn max_concurrent_operations(mut self, n: usize) -> Self {
        self.config.workers.max_concurrent_operations = n;
        self
    }

    // --- watcher ---

    pub fn watcher_enabled(mut self, enabled: bool) -> Self {
        self.config.watcher.enabled = enabled;
        self
    }

    pub fn watcher_debounce_ms(mut self, ms: u64) -> Self {
        self.config.watcher.debounce_ms = ms;
        self
    }

    pub fn watcher_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.watcher.poll_interval_ms = ms;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
