//! The ingestion worker pool, scanner, and `IndexDatastore` handle (§4.8).
//!
//! A bounded worker pool fed through a `crossbeam-channel`, plain OS
//! threads rather than an async runtime, driving unit import against the
//! KV store.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use dashmap::{DashMap, DashSet};
use parking_lot::{Condvar, Mutex, RwLock};

use crate::error::{IngestError, IngestResult, StoreError};
use crate::file_index::FilePathIndex;
use crate::provider::RawIndexReader;
use crate::storage::codec::{bytes_to_code, code_to_bytes, pair_key};
use crate::storage::tables::decode_unit_info;
use crate::storage::Database;
use crate::symbol::SymbolIndex;
use crate::types::IDCode;
use crate::visibility::VisibilityChecker;

use super::outofdate::OutOfDateWatcher;
use super::{import, IndexDelegate, StoreUnitInfo, UnitState};

/// Tuning knobs for [`IndexDatastore::create`], distilled from §6's
/// "Creation options" down to what the worker pool itself needs (store
/// path, database path, and the explicit-output-units flag are handled
/// one layer up, by the facade that owns the `RawIndexReader` and
/// `VisibilityChecker`).
pub struct IndexDatastoreOptions {
    pub worker_threads: usize,
    /// Block `create` until the initial scan has fully drained.
    pub wait: bool,
    /// No workers, no watcher: queries only (§4.8).
    pub readonly: bool,
    /// Map-size doubling cap; `None` means unbounded doubling.
    pub max_db_size: Option<usize>,
    pub enable_out_of_date_watching: bool,
    pub debounce: std::time::Duration,
}

impl Default for IndexDatastoreOptions {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            wait: false,
            readonly: false,
            max_db_size: None,
            enable_out_of_date_watching: true,
            debounce: std::time::Duration::from_millis(200),
        }
    }
}

enum Job {
    ImportUnit(Box<str>),
    Shutdown,
}

struct Inner {
    db: Database,
    symbol_index: SymbolIndex,
    file_index: FilePathIndex,
    reader: Arc<dyn RawIndexReader>,
    visibility: Arc<VisibilityChecker>,
    delegates: Arc<RwLock<Vec<Arc<dyn IndexDelegate>>>>,
    known_units: DashMap<Box<str>, UnitState>,
    queued: DashSet<Box<str>>,
    sender: crossbeam_channel::Sender<Job>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    readonly: bool,
    max_db_size: Option<usize>,
    completed: AtomicU64,
    in_flight: Mutex<u64>,
    drained: Condvar,
    watcher: Mutex<Option<OutOfDateWatcher>>,
}

/// A running ingestion pipeline over one [`Database`] (§4.8). Cheap to
/// clone; clones share the same worker pool and in-memory state.
#[derive(Clone)]
pub struct IndexDatastore {
    inner: Arc<Inner>,
}

impl IndexDatastore {
    /// `wait=true` mirrors `create(..., wait: true)` (§6): the initial
    /// directory scan has fully drained by the time this returns.
    pub fn create(
        db: Database,
        reader: Arc<dyn RawIndexReader>,
        visibility: Arc<VisibilityChecker>,
        options: IndexDatastoreOptions,
    ) -> IngestResult<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();

        let inner = Arc::new(Inner {
            symbol_index: SymbolIndex::new(db.clone()),
            file_index: FilePathIndex::new(db.clone()),
            db,
            reader,
            visibility,
            delegates: Arc::new(RwLock::new(Vec::new())),
            known_units: DashMap::new(),
            queued: DashSet::new(),
            sender,
            workers: Mutex::new(Vec::new()),
            readonly: options.readonly,
            max_db_size: options.max_db_size,
            completed: AtomicU64::new(0),
            in_flight: Mutex::new(0),
            drained: Condvar::new(),
            watcher: Mutex::new(None),
        });

        let datastore = Self { inner: inner.clone() };

        if options.readonly {
            return Ok(datastore);
        }

        let worker_count = options.worker_threads.max(1);
        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let worker_inner = inner.clone();
            let worker_receiver = receiver.clone();
            handles.push(std::thread::spawn(move || worker_loop(worker_inner, worker_receiver)));
        }
        *inner.workers.lock() = handles;

        datastore.scan_and_enqueue_all()?;

        if options.wait {
            datastore.wait_for_drain();
        }

        if options.enable_out_of_date_watching {
            let dirs = collect_watch_directories(&inner.db)?;
            match OutOfDateWatcher::start(inner.db.clone(), inner.delegates.clone(), dirs, options.debounce) {
                Ok(watcher) => *inner.watcher.lock() = Some(watcher),
                Err(err) => tracing::warn!(error = %err, "failed to start out-of-date file watcher"),
            }
        }

        Ok(datastore)
    }

    /// `addDelegate` (§6): registers another observer of ingestion events.
    pub fn add_delegate(&self, delegate: Arc<dyn IndexDelegate>) {
        self.inner.delegates.write().push(delegate);
    }

    pub fn unit_state(&self, unit_name: &str) -> Option<UnitState> {
        self.inner.known_units.get(unit_name).map(|e| *e)
    }

    /// `pollForUnitChangesAndWait` (§4.8, §6): re-lists units from the raw
    /// reader, enqueues any not already known, and blocks until the
    /// resulting work has drained.
    pub fn poll_for_unit_changes_and_wait(&self) -> IngestResult<()> {
        if self.inner.readonly {
            return Ok(());
        }
        self.scan_and_enqueue_all()?;
        self.wait_for_drain();
        Ok(())
    }

    /// Removes `unit-info`/`unit-by-file`/`unit-by-unit` rows for units the
    /// raw reader no longer reports. Symbol rows contributed by a stale
    /// unit's providers are left in place: reclaiming them needs a
    /// reference count per USR across units, which this table set doesn't
    /// carry; a future format revision would add one.
    pub fn purge_stale(&self) -> IngestResult<usize> {
        let current: HashSet<String> = self.inner.reader.list_units()?.into_iter().collect();

        struct Stale {
            unit_code: IDCode,
            unit_name: Box<str>,
            file_deps: Vec<IDCode>,
            unit_deps: Vec<IDCode>,
        }

        let mut stale = Vec::new();
        {
            let rtxn = self.inner.db.read_txn()?;
            let tables = rtxn.tables();
            let mut iter = tables.unit_info.iter(&rtxn.txn).map_err(StoreError::from)?;
            while let Some(entry) = iter.next() {
                let (key, value) = entry.map_err(StoreError::from)?;
                let info = decode_unit_info(value);
                if !current.contains(&*info.unit_name) {
                    stale.push(Stale {
                        unit_code: bytes_to_code(key),
                        unit_name: info.unit_name,
                        file_deps: info.file_deps,
                        unit_deps: info.unit_deps,
                    });
                }
            }
        }

        if stale.is_empty() {
            return Ok(0);
        }

        let mut wtxn = self.inner.db.write_txn()?;
        let tables = wtxn.tables().clone();
        for entry in &stale {
            tables.unit_info.delete(&mut wtxn.txn, &code_to_bytes(entry.unit_code)).map_err(StoreError::from)?;
            for file_code in &entry.file_deps {
                tables
                    .unit_by_file
                    .delete(&mut wtxn.txn, &pair_key(*file_code, entry.unit_code))
                    .map_err(StoreError::from)?;
            }
            for dep_unit in &entry.unit_deps {
                tables
                    .unit_by_unit
                    .delete(&mut wtxn.txn, &pair_key(*dep_unit, entry.unit_code))
                    .map_err(StoreError::from)?;
            }
        }
        wtxn.commit()?;

        for entry in &stale {
            self.inner.known_units.insert(entry.unit_name.clone(), UnitState::Stale);
        }
        Ok(stale.len())
    }

    /// Sends a shutdown job per worker and joins them. Not run on `Drop`
    /// (each worker thread holds its own `Arc<Inner>` clone, so `Inner`
    /// would never actually drop while they block in `recv`); an owning
    /// facade calls this explicitly, mirroring `Database::close`.
    pub fn shutdown(&self) {
        let mut workers = self.inner.workers.lock();
        for _ in 0..workers.len() {
            let _ = self.inner.sender.send(Job::Shutdown);
        }
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
        if let Some(watcher) = self.inner.watcher.lock().take() {
            watcher.stop();
        }
    }

    fn scan_and_enqueue_all(&self) -> IngestResult<()> {
        let units = self.inner.reader.list_units()?;

        let mut new_units: Vec<Box<str>> = Vec::new();
        let mut changed_units: Vec<Box<str>> = Vec::new();
        for name in units {
            let name: Box<str> = Box::from(name);
            if !self.inner.known_units.contains_key(&name) {
                new_units.push(name);
            } else if self.unit_content_changed(&name)? {
                changed_units.push(name);
            }
        }

        for delegate in self.inner.delegates.read().iter() {
            delegate.initial_pending_units(new_units.len());
        }

        for unit_name in new_units.iter().chain(changed_units.iter()) {
            self.enqueue_unit(unit_name.clone());
        }

        if !new_units.is_empty() {
            for delegate in self.inner.delegates.read().iter() {
                delegate.processing_added_pending(new_units.len());
            }
        }

        Ok(())
    }

    /// Compares the raw reader's currently-reported mtime for an already-known
    /// unit against the mtime recorded in `unit-info` at its last import,
    /// marking the unit `Stale` (§4.8, "updated when its mtime advances") when
    /// the reader's mtime has moved forward.
    fn unit_content_changed(&self, unit_name: &str) -> IngestResult<bool> {
        let unit_code = IDCode::of(unit_name);
        let stored_mtime = {
            let rtxn = self.inner.db.read_txn()?;
            let tables = rtxn.tables();
            tables
                .unit_info
                .get(&rtxn.txn, &code_to_bytes(unit_code))
                .map_err(StoreError::from)?
                .map(|raw| decode_unit_info(raw).mtime)
        };
        let Some(stored_mtime) = stored_mtime else { return Ok(false) };

        let current_mtime = self.inner.reader.read_unit(unit_name)?.mtime;
        if current_mtime > stored_mtime {
            self.inner.known_units.insert(Box::from(unit_name), UnitState::Stale);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn enqueue_unit(&self, unit_name: Box<str>) {
        if self.inner.readonly {
            return;
        }
        if !self.inner.queued.insert(unit_name.clone()) {
            return;
        }
        self.inner.known_units.insert(unit_name.clone(), UnitState::Queued);
        *self.inner.in_flight.lock() += 1;
        self.inner.visibility.note_unit_pending();
        let _ = self.inner.sender.send(Job::ImportUnit(unit_name));
    }

    fn wait_for_drain(&self) {
        let mut guard = self.inner.in_flight.lock();
        while *guard > 0 {
            self.inner.drained.wait(&mut guard);
        }
    }
}

fn worker_loop(inner: Arc<Inner>, receiver: crossbeam_channel::Receiver<Job>) {
    while let Ok(job) = receiver.recv() {
        let unit_name = match job {
            Job::Shutdown => break,
            Job::ImportUnit(name) => name,
        };

        inner.queued.remove(&unit_name);
        inner.known_units.insert(unit_name.clone(), UnitState::Reading);
        inner.known_units.insert(unit_name.clone(), UnitState::Importing);

        match import_with_growth(&inner, &unit_name) {
            Ok(info) => {
                inner.known_units.insert(unit_name.clone(), UnitState::Ready);
                let store_unit = StoreUnitInfo { unit_name: unit_name.clone(), info };
                for delegate in inner.delegates.read().iter() {
                    delegate.processed_store_unit(&store_unit);
                }
            }
            Err(err) => {
                tracing::warn!(unit = %unit_name, error = %err, "failed to import unit");
                inner.known_units.insert(unit_name.clone(), UnitState::Failed);
            }
        }

        inner.visibility.note_unit_processed();
        let completed = inner.completed.fetch_add(1, Ordering::SeqCst) + 1;
        for delegate in inner.delegates.read().iter() {
            delegate.processing_completed(completed as usize);
        }

        let mut guard = inner.in_flight.lock();
        *guard = guard.saturating_sub(1);
        if *guard == 0 {
            inner.drained.notify_all();
        }
    }
}

/// Imports a unit, doubling the environment's map size and retrying on
/// `MDB_MAP_FULL` (§4.1's growth path, triggered here rather than by a
/// query since only writers can hit it).
fn import_with_growth(inner: &Inner, unit_name: &str) -> IngestResult<crate::types::UnitInfo> {
    loop {
        let result = import::import_unit(&inner.db, &inner.symbol_index, &inner.file_index, &inner.reader, unit_name);
        match result {
            Err(IngestError::Store(StoreError::Lmdb(heed::Error::Mdb(heed::MdbError::MapFull)))) => {
                let current = inner.db.map_size();
                let cap = inner.max_db_size.unwrap_or(usize::MAX);
                if current >= cap {
                    return result;
                }
                let next = (current.saturating_mul(2)).min(cap);
                tracing::warn!(from = current, to = next, "database map full, growing");
                inner.db.increase_map_size(next)?;
            }
            other => return other,
        }
    }
}

fn collect_watch_directories(db: &Database) -> IngestResult<Vec<PathBuf>> {
    let rtxn = db.read_txn()?;
    let tables = rtxn.tables();
    let mut dirs = HashSet::new();

    let mut iter = tables.unit_info.iter(&rtxn.txn).map_err(StoreError::from)?;
    while let Some(entry) = iter.next() {
        let (_key, value) = entry.map_err(StoreError::from)?;
        let info = decode_unit_info(value);
        let Some(main_file_code) = info.main_file() else { continue };
        let Some(raw) = tables.filenames.get(&rtxn.txn, &code_to_bytes(main_file_code)).map_err(StoreError::from)?
        else {
            continue;
        };
        let path = PathBuf::from(crate::storage::codec::bytes_to_str(raw));
        if let Some(parent) = path.parent() {
            dirs.insert(parent.to_path_buf());
        }
    }
    Ok(dirs.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::reader::{RawDependencyKind, RawSymbolEntry, RawUnitDependency, RawUnitInfo};
    use crate::types::{Language, ProviderKind, SymbolInfo, SymbolKind, SymbolProperty, SymbolRole};
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    struct FakeReader {
        units: StdMutex<HashMap<String, RawUnitInfo>>,
        records: StdMutex<HashMap<String, Vec<RawSymbolEntry>>>,
    }

    impl RawIndexReader for FakeReader {
        fn list_units(&self) -> IngestResult<Vec<String>> {
            Ok(self.units.lock().unwrap().keys().cloned().collect())
        }
        fn read_unit(&self, unit_name: &str) -> IngestResult<RawUnitInfo> {
            self.units.lock().unwrap().get(unit_name).cloned().ok_or_else(|| IngestError::UnitReadFailed {
                unit: unit_name.to_string(),
                reason: "missing".into(),
            })
        }
        fn read_record(&self, record_name: &str) -> IngestResult<Vec<RawSymbolEntry>> {
            Ok(self.records.lock().unwrap().get(record_name).cloned().unwrap_or_default())
        }
    }

    fn one_unit_reader() -> Arc<FakeReader> {
        let mut records = HashMap::new();
        records.insert(
            "/repo/a.swift.record".to_string(),
            vec![RawSymbolEntry {
                usr: "s:a".into(),
                name: "a".into(),
                info: SymbolInfo {
                    kind: SymbolKind::Function,
                    sub_kind: 0,
                    properties: SymbolProperty::empty(),
                    language: Language::Swift,
                },
                roles: SymbolRole::DEFINITION,
                related_roles: SymbolRole::empty(),
                occurrences: vec![],
            }],
        );
        let mut units = HashMap::new();
        units.insert(
            "u1".to_string(),
            RawUnitInfo {
                main_file: Some("/repo/a.swift".into()),
                output_file: "/out/a.o".into(),
                module_name: None,
                target: None,
                sysroot: None,
                provider_kind: ProviderKind::Swift,
                is_system: false,
                mtime: 1,
                deps: vec![RawUnitDependency {
                    kind: RawDependencyKind::Record,
                    name: "/repo/a.swift.record".into(),
                    module_name: None,
                    is_system: false,
                    line: None,
                }],
            },
        );
        Arc::new(FakeReader { units: StdMutex::new(units), records: StdMutex::new(records) })
    }

    #[derive(Default)]
    struct CountingDelegate {
        processed: AtomicUsize,
    }

    impl IndexDelegate for CountingDelegate {
        fn processed_store_unit(&self, _unit: &StoreUnitInfo) {
            self.processed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn create_with_wait_drains_initial_scan() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path(), None).unwrap();
        let reader: Arc<dyn RawIndexReader> = one_unit_reader();
        let visibility = Arc::new(VisibilityChecker::new(false));
        let delegate = Arc::new(CountingDelegate::default());

        let options = IndexDatastoreOptions { wait: true, enable_out_of_date_watching: false, ..Default::default() };
        let datastore = IndexDatastore::create(db.clone(), reader, visibility, options).unwrap();
        datastore.add_delegate(delegate.clone());

        assert_eq!(datastore.unit_state("u1"), Some(UnitState::Ready));

        let symbol_index = SymbolIndex::new(db);
        let occs = symbol_index.occurrences_by_usr("s:a", SymbolRole::empty()).unwrap();
        assert_eq!(occs.len(), 1);

        datastore.shutdown();
    }

    #[test]
    fn purge_stale_removes_units_reader_no_longer_reports() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path(), None).unwrap();
        let reader_impl = one_unit_reader();
        let reader: Arc<dyn RawIndexReader> = reader_impl.clone();
        let visibility = Arc::new(VisibilityChecker::new(false));

        let options = IndexDatastoreOptions { wait: true, enable_out_of_date_watching: false, ..Default::default() };
        let datastore = IndexDatastore::create(db, reader, visibility, options).unwrap();

        reader_impl.units.lock().unwrap().clear();
        let purged = datastore.purge_stale().unwrap();
        assert_eq!(purged, 1);

        datastore.shutdown();
    }
}
