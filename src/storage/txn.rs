//! Read/write transaction wrappers and the map-size growth barrier.
//!
//! LMDB forbids resizing a memory map while any transaction (read or
//! write) is open against it. This models the coordination as a
//! dispatch_group-style barrier (§9): readers join the group for the
//! duration of their transaction, and a resize waits for the group to
//! drain before proceeding exclusively. `parking_lot::RwLock` gives us
//! exactly that shape for free: every transaction holds the shared side,
//! a resize takes the exclusive side.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::StoreResult;

use super::env::Database;
use super::tables::Tables;

pub struct MapGrowthBarrier {
    current_size: RwLock<usize>,
}

impl MapGrowthBarrier {
    pub fn new(initial_size: usize) -> Self {
        Self { current_size: RwLock::new(initial_size) }
    }

    fn begin_txn(&self) -> RwLockReadGuard<'_, usize> {
        self.current_size.read()
    }

    /// Takes the exclusive side of the barrier and records the new size.
    /// The returned guard must be held for the duration of the underlying
    /// `mdb_env_set_mapsize` call.
    pub fn begin_resize(&self, new_size: usize) -> RwLockWriteGuard<'_, usize> {
        let mut guard = self.current_size.write();
        *guard = new_size;
        guard
    }

    pub fn current_size(&self) -> usize {
        *self.current_size.read()
    }
}

/// A read-only transaction bundled with the table handles needed to query
/// through it.
pub struct ReadTxn<'db> {
    pub(crate) txn: heed::RoTxn<'db>,
    tables: &'db Tables,
    _barrier: RwLockReadGuard<'db, usize>,
}

impl<'db> ReadTxn<'db> {
    pub(super) fn new(db: &'db Database) -> StoreResult<Self> {
        let barrier = db.barrier().begin_txn();
        let txn = db.env().read_txn()?;
        Ok(Self { txn, tables: db.tables(), _barrier: barrier })
    }

    pub fn tables(&self) -> &'db Tables {
        self.tables
    }
}

/// A read-write transaction bundled with the table handles needed to
/// mutate through it. Only one `WriteTxn` may be live at a time per
/// environment; `heed` enforces this at the `heed::Env` level.
pub struct WriteTxn<'db> {
    pub txn: heed::RwTxn<'db>,
    tables: &'db Tables,
    _barrier: RwLockReadGuard<'db, usize>,
}

impl<'db> WriteTxn<'db> {
    pub(super) fn new(db: &'db Database) -> StoreResult<Self> {
        let barrier = db.barrier().begin_txn();
        let txn = db.env().write_txn()?;
        Ok(Self { txn, tables: db.tables(), _barrier: barrier })
    }

    pub fn tables(&self) -> &'db Tables {
        self.tables
    }

    pub fn commit(self) -> StoreResult<()> {
        self.txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_resize_updates_current_size() {
        let barrier = MapGrowthBarrier::new(1024);
        assert_eq!(barrier.current_size(), 1024);
        {
            let _guard = barrier.begin_resize(2048);
        }
        assert_eq!(barrier.current_size(), 2048);
    }

    #[test]
    fn write_then_read_roundtrips_through_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path(), None).unwrap();

        {
            let mut wtxn = db.write_txn().unwrap();
            wtxn.tables().directories.put(&mut wtxn.txn, b"dircode", b"/usr/include").unwrap();
            wtxn.commit().unwrap();
        }

        let rtxn = db.read_txn().unwrap();
        let value = rtxn.tables().directories.get(&rtxn.txn, b"dircode").unwrap();
        assert_eq!(value, Some(&b"/usr/include"[..]));
    }
}
