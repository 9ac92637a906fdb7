//! Error types for the indexing engine.
//!
//! Structured, `thiserror`-based error enums per layer: one enum per
//! concern, `#[from]` conversions where a lower layer's error can simply
//! bubble up, and a general catch-all variant for the long tail. Per §7,
//! query methods never fail after a successful `create`; only `create`
//! and explicit mutation calls return a `Result`.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::IDCode;

/// Errors from the KV store's open/close protocol and transactions (§4.1, §7).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to open database environment at '{path}': {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: heed::Error,
    },

    #[error("lmdb environment error: {0}")]
    Lmdb(#[from] heed::Error),

    #[error("io error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("dangling IDCode {0:?} referenced a table with no matching interned entry")]
    DanglingCode(IDCode),

    #[error("a write transaction is already in progress for this database")]
    WriterBusy,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from ingestion (reading raw units/records and importing them).
///
/// Per §7, a `RecordReadFailed` is logged and the offending provider is
/// skipped; the unit is still imported best-effort. This type exists so
/// the ingestion worker can carry the reason into its logging, not so
/// callers see it (delegate callbacks never receive an `Err`).
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("raw index reader failed to read unit '{unit}': {reason}")]
    UnitReadFailed { unit: String, reason: String },

    #[error("raw index reader failed to read record '{record}': {reason}")]
    RecordReadFailed { record: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Top-level error returned by [`crate::system::IndexSystem::create`].
///
/// Per §7: this is essentially the only user-visible failure surface.
/// Everything after successful creation is best-effort and silent (empty
/// results rather than an `Err`).
#[derive(Error, Debug)]
pub enum IndexSystemError {
    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to start file watcher: {reason}")]
    WatcherInit { reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type IndexSystemResult<T> = Result<T, IndexSystemError>;

/// Adds short context to a lower-level error without losing its `source`.
pub trait ErrorContext<T> {
    fn with_path(self, path: &std::path::Path) -> Result<T, StoreError>;
}

impl<T> ErrorContext<T> for Result<T, std::io::Error> {
    fn with_path(self, path: &std::path::Path) -> Result<T, StoreError> {
        self.map_err(|source| StoreError::Io { path: path.to_path_buf(), source })
    }
}
