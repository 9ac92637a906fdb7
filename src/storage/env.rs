//! Crash-safe directory protocol for the LMDB environment (§4.1).
//!
//! On-disk layout under the configured `databasePath`:
//!
//! ```text
//! <databasePath>/v13/
//!   saved/              -- the last cleanly-closed store, if any
//!   p<pid>-<uuid>/       -- a store currently open by a live process
//!   corrupted/           -- a `saved/` that failed to open, kept for inspection
//! ```
//!
//! Opening renames `saved/` to a fresh `p<pid>-<uuid>/` working directory
//! (so a crash leaves evidence of exactly which process touched it last,
//! and a concurrent opener never shares our mmap). Closing renames the
//! working directory back to `saved/`. A background sweep looks for
//! `p<pid>-<uuid>/` directories whose pid is no longer alive and removes
//! them.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use sysinfo::{Pid, System};
use uuid::Uuid;

use crate::error::{ErrorContext, StoreError, StoreResult};

use super::tables::Tables;
use super::txn::{MapGrowthBarrier, ReadTxn, WriteTxn};
use super::{DATABASE_FORMAT_VERSION, DEFAULT_INITIAL_MAP_SIZE};

/// An open KV store: one LMDB environment plus its table handles.
///
/// Cheap to clone (everything inside is reference-counted); clones share
/// the same underlying environment and map-size barrier, matching the
/// spec's "process-uniqueness" guarantee (§4.1) once routed through
/// [`DatabaseRegistry`].
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    env: heed::Env,
    tables: Tables,
    working_dir: PathBuf,
    versioned_root: PathBuf,
    barrier: MapGrowthBarrier,
}

impl Database {
    /// Opens (or creates) the store rooted at `database_path`, following
    /// the open protocol in §4.1. `initial_map_size` is the minimum map
    /// size to request; the larger of this and the existing data file's
    /// size is used so re-opening a grown store never shrinks its map.
    pub fn open(database_path: &Path, initial_map_size: Option<usize>) -> StoreResult<Self> {
        let versioned_root = database_path.join(format!("v{DATABASE_FORMAT_VERSION}"));
        std::fs::create_dir_all(&versioned_root).with_path(&versioned_root)?;

        let working_dir = claim_working_directory(&versioned_root)?;
        let map_size = initial_map_size.unwrap_or(DEFAULT_INITIAL_MAP_SIZE);

        match open_environment(&working_dir, map_size) {
            Ok(env) => {
                let tables = Tables::open_all(&env)?;
                schedule_background_sweep(versioned_root.clone());
                Ok(Database {
                    inner: Arc::new(DatabaseInner {
                        env,
                        tables,
                        working_dir,
                        versioned_root,
                        barrier: MapGrowthBarrier::new(map_size),
                    }),
                })
            }
            Err(open_err) => {
                // The `saved/` snapshot we just claimed doesn't open; quarantine it
                // and retry once against an empty working directory (§4.1 "Open
                // protocol", corruption handling).
                quarantine_as_corrupted(&versioned_root, &working_dir)?;
                let fresh_dir = claim_working_directory(&versioned_root)?;
                let env = open_environment(&fresh_dir, map_size).map_err(|source| StoreError::OpenFailed {
                    path: fresh_dir.clone(),
                    source,
                })?;
                tracing::warn!(error = %open_err, path = %fresh_dir.display(), "recovered from corrupted database directory");
                let tables = Tables::open_all(&env)?;
                schedule_background_sweep(versioned_root.clone());
                Ok(Database {
                    inner: Arc::new(DatabaseInner {
                        env,
                        tables,
                        working_dir: fresh_dir,
                        versioned_root,
                        barrier: MapGrowthBarrier::new(map_size),
                    }),
                })
            }
        }
    }

    pub fn tables(&self) -> &Tables {
        &self.inner.tables
    }

    pub fn env(&self) -> &heed::Env {
        &self.inner.env
    }

    pub fn read_txn(&self) -> StoreResult<ReadTxn<'_>> {
        ReadTxn::new(self)
    }

    pub fn write_txn(&self) -> StoreResult<WriteTxn<'_>> {
        WriteTxn::new(self)
    }

    pub(super) fn barrier(&self) -> &MapGrowthBarrier {
        &self.inner.barrier
    }

    /// Current map size, as last set by `open` or `increase_map_size`.
    pub fn map_size(&self) -> usize {
        self.inner.barrier.current_size()
    }

    /// Grows the environment's map size, serialized against all in-flight
    /// transactions via [`MapGrowthBarrier`] (§4.1, §9 dispatch_group analogy).
    pub fn increase_map_size(&self, new_size: usize) -> StoreResult<()> {
        let _exclusive = self.inner.barrier.begin_resize(new_size);
        unsafe {
            self.inner.env.resize(new_size)?;
        }
        Ok(())
    }

    /// Closes the store cleanly: renames the working directory back to
    /// `saved/`, moving any pre-existing `saved/` aside first (§4.1 "Close
    /// protocol"). `Drop` does not perform this rename; an un-closed
    /// `Database` is a crash-equivalent state, which the next `open` call
    /// handles via PID-liveness sweeping.
    pub fn close(self) -> StoreResult<()> {
        let root = &self.inner.versioned_root;
        let saved = root.join("saved");
        if saved.exists() {
            let dead = root.join(format!("saved-dead-{}", Uuid::new_v4()));
            std::fs::rename(&saved, &dead).with_path(&saved)?;
            std::fs::remove_dir_all(&dead).with_path(&dead)?;
        }
        std::fs::rename(&self.inner.working_dir, &saved).with_path(&self.inner.working_dir)?;
        Ok(())
    }
}

fn claim_working_directory(versioned_root: &Path) -> StoreResult<PathBuf> {
    let saved = versioned_root.join("saved");
    let working_dir = versioned_root.join(format!("p{}-{}", std::process::id(), Uuid::new_v4()));

    if saved.exists() {
        match std::fs::rename(&saved, &working_dir) {
            Ok(()) => return Ok(working_dir),
            Err(err) => {
                tracing::warn!(error = %err, "failed to claim saved/ directory, starting fresh");
            }
        }
    }

    std::fs::create_dir_all(&working_dir).with_path(&working_dir)?;
    Ok(working_dir)
}

fn quarantine_as_corrupted(versioned_root: &Path, working_dir: &Path) -> StoreResult<()> {
    let corrupted = versioned_root.join(format!("corrupted-{}", Uuid::new_v4()));
    std::fs::rename(working_dir, &corrupted).with_path(working_dir)?;
    Ok(())
}

/// Fire-and-forget dead-directory sweep (§4.1 step 6: "Schedule a
/// background sweep..."), run on a detached thread so `open` itself never
/// blocks on it. Errors are logged, never surfaced: a failed sweep just
/// means this version's directories get another chance on the next open.
fn schedule_background_sweep(versioned_root: PathBuf) {
    std::thread::spawn(move || match sweep_dead_directories(&versioned_root) {
        Ok(0) => {}
        Ok(removed) => tracing::debug!(removed, path = %versioned_root.display(), "swept dead database directories"),
        Err(err) => tracing::warn!(error = %err, path = %versioned_root.display(), "background directory sweep failed"),
    });
}

fn open_environment(working_dir: &Path, map_size: usize) -> Result<heed::Env, heed::Error> {
    let existing_size = data_file_size(working_dir);
    let size = map_size.max(existing_size);
    unsafe { Tables::env_open_options().map_size(size).max_readers(126).open(working_dir) }
}

fn data_file_size(working_dir: &Path) -> usize {
    std::fs::metadata(working_dir.join("data.mdb")).map(|m| m.len() as usize).unwrap_or(0)
}

/// Removes `p<pid>-<uuid>/` directories under `version_root` whose owning
/// process is no longer alive. Safe to run concurrently with other
/// processes opening/closing stores, since a live process's directory is
/// never touched and a dead one's directory was, by definition, never
/// cleanly closed.
pub fn sweep_dead_directories(versioned_root: &Path) -> StoreResult<usize> {
    let mut system = System::new();
    system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
    let mut removed = 0;

    let entries = match std::fs::read_dir(versioned_root) {
        Ok(entries) => entries,
        Err(_) => return Ok(0),
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };

        // Any directory explicitly marked `-dead` (left behind by a close()
        // whose cleanup rename succeeded but whose removal didn't) is
        // unconditionally stale; no liveness check needed.
        if name.contains("-dead") {
            if std::fs::remove_dir_all(&path).is_ok() {
                removed += 1;
                tracing::debug!(dir = %path.display(), "removed dead-marked directory");
            }
            continue;
        }

        let Some(pid) = parse_working_dir_pid(name) else { continue };

        if pid == std::process::id() {
            continue;
        }
        if system.process(Pid::from_u32(pid)).is_some() {
            continue;
        }

        if std::fs::remove_dir_all(&path).is_ok() {
            removed += 1;
            tracing::debug!(dir = %path.display(), pid, "removed dead working directory");
        }
    }

    Ok(removed)
}

fn parse_working_dir_pid(name: &str) -> Option<u32> {
    let rest = name.strip_prefix('p')?;
    let (pid_str, _uuid) = rest.split_once('-')?;
    pid_str.parse().ok()
}

/// Process-wide path -> [`Database`] registry, giving "at most one open
/// environment per absolute path within this process" (§4.1
/// process-uniqueness). Entries are weak so a fully-dropped `Database` is
/// reclaimed rather than kept alive by the registry itself.
#[derive(Default)]
pub struct DatabaseRegistry {
    entries: DashMap<PathBuf, Weak<DatabaseInner>>,
}

impl DatabaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the already-open `Database` for `database_path` if one is
    /// live in this process, otherwise opens a new one and registers it.
    pub fn open(&self, database_path: &Path, initial_map_size: Option<usize>) -> StoreResult<Database> {
        let canonical = std::fs::canonicalize(database_path).unwrap_or_else(|_| database_path.to_path_buf());

        if let Some(existing) = self.entries.get(&canonical).and_then(|weak| weak.upgrade()) {
            return Ok(Database { inner: existing });
        }

        let db = Database::open(&canonical, initial_map_size)?;
        self.entries.insert(canonical, Arc::downgrade(&db.inner));
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_versioned_and_working_directories() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path(), None).unwrap();
        let versioned_root = dir.path().join(format!("v{DATABASE_FORMAT_VERSION}"));
        assert!(versioned_root.exists());
        assert!(db.inner.working_dir.exists());
        assert!(db.inner.working_dir.starts_with(&versioned_root));
    }

    #[test]
    fn close_then_reopen_reuses_saved_directory() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path(), None).unwrap();
        db.close().unwrap();

        let versioned_root = dir.path().join(format!("v{DATABASE_FORMAT_VERSION}"));
        assert!(versioned_root.join("saved").exists());

        let db2 = Database::open(dir.path(), None).unwrap();
        assert!(!versioned_root.join("saved").exists());
        db2.close().unwrap();
        assert!(versioned_root.join("saved").exists());
    }

    #[test]
    fn registry_returns_same_database_for_same_path() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DatabaseRegistry::new();
        let a = registry.open(dir.path(), None).unwrap();
        let b = registry.open(dir.path(), None).unwrap();
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
    }

    #[test]
    fn sweep_ignores_current_process_directory() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path(), None).unwrap();
        let versioned_root = dir.path().join(format!("v{DATABASE_FORMAT_VERSION}"));
        let removed = sweep_dead_directories(&versioned_root).unwrap();
        assert_eq!(removed, 0);
        assert!(db.inner.working_dir.exists());
    }

    #[test]
    fn parse_working_dir_pid_rejects_other_names() {
        assert_eq!(parse_working_dir_pid("p123-abc-def"), Some(123));
        assert_eq!(parse_working_dir_pid("saved"), None);
        assert_eq!(parse_working_dir_pid("corrupted-xyz"), None);
    }
}
