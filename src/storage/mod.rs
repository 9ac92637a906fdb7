//! The KV store: a transactional, memory-mapped, multi-table database
//! over a single LMDB environment (§4.1).
//!
//! Sub-modules:
//! - [`codec`]: key/value byte encodings shared by every table.
//! - [`tables`]: the logical table set and their creation.
//! - [`env`]: the crash-safe directory protocol (`saved/`, `p<PID>-<UUID>/`,
//!   `corrupted/`, dead-directory sweep) and process-wide registry.
//! - [`txn`]: read/write transaction wrappers and the map-size growth
//!   barrier.

pub mod codec;
pub mod env;
pub mod tables;
pub mod txn;

pub use env::{Database, DatabaseRegistry};
pub use tables::Tables;
pub use txn::{ReadTxn, WriteTxn};

/// Current on-disk layout version. Bumped on any table/encoding change;
/// stores written by a different version are left untouched on disk (§4.1,
/// §9 open question: only v13-equivalent layout is implemented here).
pub const DATABASE_FORMAT_VERSION: u32 = 13;

/// Initial LMDB map size when the caller doesn't specify one (§4.1).
pub const DEFAULT_INITIAL_MAP_SIZE: usize = 64 * 1024 * 1024;
