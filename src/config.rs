//! Configuration for the indexing engine.
//!
//! A layered configuration system: defaults, then a TOML file, then
//! environment variables. This is the Rust realization of the "Creation
//! options" described in §6, with the addition of file-based loading for
//! long-lived consumers that want to configure an embedded engine without
//! recompiling.
//!
//! # Environment variables
//!
//! Prefixed with `IDXSTOREDB_`, double underscores separate nested levels:
//! - `IDXSTOREDB_INDEXING__WORKER_THREADS=8` sets `indexing.worker_threads`
//! - `IDXSTOREDB_WATCH__ENABLE_OUT_OF_DATE=false` sets `watch.enable_out_of_date`

use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Top-level creation options for [`crate::system::IndexSystem::create`]
/// (§6 "Creation options").
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Raw index-store directory (unit + record files), `storePath` in §6.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// KV store directory, `databasePath` in §6.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Initial LMDB map size in bytes, overriding the 64 MiB default (§4.1).
    #[serde(default)]
    pub initial_db_size: Option<usize>,

    /// `useExplicitOutputUnits` (§4.7, §6).
    #[serde(default)]
    pub use_explicit_output_units: bool,

    /// `wait`: block `create` until the initial scan completes (§4.8, §6).
    #[serde(default)]
    pub wait: bool,

    /// `readonly`: no workers, no watcher, queries only (§4.8, §6).
    #[serde(default)]
    pub readonly: bool,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexingConfig {
    /// Size of the ingestion worker pool (§4.8, §5: "modest fixed size").
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Map-size doubling cap; `None` means unbounded doubling.
    #[serde(default)]
    pub max_db_size: Option<usize>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// `enableOutOfDateFileWatching` (§4.8, §6).
    #[serde(default = "default_true")]
    pub enable_out_of_date: bool,

    /// `listenToUnitEvents`: subscribe to the reader's push channel (§6).
    #[serde(default)]
    pub listen_to_unit_events: bool,

    /// Debounce window for filesystem change events, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,

    #[serde(default)]
    pub modules: std::collections::HashMap<String, String>,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".indexstoredb/store")
}
fn default_database_path() -> PathBuf {
    PathBuf::from(".indexstoredb/db")
}
fn default_worker_threads() -> usize {
    num_cpus::get().clamp(1, 4)
}
fn default_debounce_ms() -> u64 {
    200
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            database_path: default_database_path(),
            initial_db_size: None,
            use_explicit_output_units: false,
            wait: false,
            readonly: false,
            indexing: IndexingConfig::default(),
            watch: WatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self { worker_threads: default_worker_threads(), max_db_size: None }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enable_out_of_date: default_true(),
            listen_to_unit_events: false,
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { default: default_log_level(), modules: std::collections::HashMap::new() }
    }
}

impl Settings {
    /// Load configuration from all sources: defaults, then an optional
    /// TOML file, then `IDXSTOREDB_`-prefixed environment variables.
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("IDXSTOREDB_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
    }
}
