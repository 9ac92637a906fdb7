//! Out-of-date detection (§4.8): compares on-disk file mtimes against the
//! unit timestamps recorded at import time, both synchronously (for a
//! caller checking one file) and continuously via a filesystem watcher.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecursiveMode, Watcher};
use parking_lot::RwLock;

use crate::error::{ErrorContext, IndexSystemError, StoreResult};
use crate::storage::codec::{code_to_bytes, split_pair_key};
use crate::storage::tables::decode_unit_info;
use crate::storage::Database;
use crate::types::IDCode;

use super::{IndexDelegate, StoreUnitInfo};

/// `checkUnitContainingFileIsOutOfDate` (§4.8): compares `file`'s on-disk
/// mtime against the mtime recorded for every unit that contains it,
/// propagating transitively through `unit-by-unit`: a stale header makes
/// every unit that (directly or transitively) depends on its including
/// unit stale too (§9 "cascading staleness"). Returns the first stale
/// unit found along with the on-disk mtime that triggered it.
pub fn check_unit_containing_file_is_out_of_date(
    db: &Database,
    file: &Path,
) -> StoreResult<Option<(Box<str>, i64)>> {
    let on_disk_mtime = file_mtime(file)?;
    let file_code = IDCode::of(&file.to_string_lossy());

    let rtxn = db.read_txn()?;
    let tables = rtxn.tables();

    let mut stack = Vec::new();
    let mut iter = tables.unit_by_file.prefix_iter(&rtxn.txn, &code_to_bytes(file_code))?;
    while let Some(entry) = iter.next() {
        let (key, _) = entry?;
        let (_file, unit_code) = split_pair_key(key);
        stack.push(unit_code);
    }
    drop(iter);

    let mut seen = HashSet::new();
    while let Some(unit_code) = stack.pop() {
        if !seen.insert(unit_code) {
            continue;
        }
        let Some(raw) = tables.unit_info.get(&rtxn.txn, &code_to_bytes(unit_code))? else { continue };
        let info = decode_unit_info(raw);
        if on_disk_mtime > info.mtime {
            return Ok(Some((info.unit_name, on_disk_mtime)));
        }

        let mut dep_iter = tables.unit_by_unit.prefix_iter(&rtxn.txn, &code_to_bytes(unit_code))?;
        while let Some(entry) = dep_iter.next() {
            let (key, _) = entry?;
            let (_dep, dependent_unit) = split_pair_key(key);
            stack.push(dependent_unit);
        }
    }

    Ok(None)
}

fn file_mtime(file: &Path) -> StoreResult<i64> {
    let meta = std::fs::metadata(file).with_path(file)?;
    let modified = meta.modified().with_path(file)?;
    Ok(modified.duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs() as i64)
}

/// A background `notify` watcher plus the debounce thread that turns raw
/// filesystem events into `unitIsOutOfDate` delegate callbacks (§4.8,
/// §6). Construction is best-effort: a directory that no longer exists
/// is simply skipped rather than failing the whole watcher, since the
/// set of directories to watch is inferred from already-imported units
/// and can include paths a since-deleted source tree no longer has.
pub struct OutOfDateWatcher {
    /// Never read directly; kept alive so its `Drop` unregisters the OS
    /// watches when this value (or the whole watcher) goes away.
    #[allow(dead_code)]
    watcher: notify::RecommendedWatcher,
    stop: crossbeam_channel::Sender<()>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl OutOfDateWatcher {
    pub fn start(
        db: Database,
        delegates: Arc<RwLock<Vec<Arc<dyn IndexDelegate>>>>,
        watch_dirs: Vec<PathBuf>,
        debounce: Duration,
    ) -> Result<Self, IndexSystemError> {
        let (event_tx, event_rx) = crossbeam_channel::unbounded::<notify::Event>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = event_tx.send(event);
            }
        })
        .map_err(|err| IndexSystemError::WatcherInit { reason: err.to_string() })?;

        for dir in &watch_dirs {
            if let Err(err) = watcher.watch(dir, RecursiveMode::NonRecursive) {
                tracing::warn!(dir = %dir.display(), error = %err, "skipping unwatchable directory");
            }
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let thread = std::thread::spawn(move || debounce_loop(db, delegates, event_rx, stop_rx, debounce));

        Ok(Self { watcher, stop: stop_tx, thread: Some(thread) })
    }

    /// Stops the debounce thread and drops the underlying `notify` watcher.
    pub fn stop(mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

fn debounce_loop(
    db: Database,
    delegates: Arc<RwLock<Vec<Arc<dyn IndexDelegate>>>>,
    events: crossbeam_channel::Receiver<notify::Event>,
    stop: crossbeam_channel::Receiver<()>,
    debounce: Duration,
) {
    let mut pending: HashSet<PathBuf> = HashSet::new();
    loop {
        crossbeam_channel::select! {
            recv(events) -> event => {
                if let Ok(event) = event {
                    pending.extend(event.paths);
                }
            }
            recv(stop) -> _ => return,
            default(debounce) => {
                if pending.is_empty() {
                    continue;
                }
                for path in pending.drain() {
                    report_if_out_of_date(&db, &delegates, &path);
                }
            }
        }
    }
}

fn report_if_out_of_date(db: &Database, delegates: &RwLock<Vec<Arc<dyn IndexDelegate>>>, path: &Path) {
    let Ok(Some((unit_name, mtime))) = check_unit_containing_file_is_out_of_date(db, path) else { return };
    let Ok(rtxn) = db.read_txn() else { return };
    let unit_code = IDCode::of(&unit_name);
    let Ok(Some(raw)) = rtxn.tables().unit_info.get(&rtxn.txn, &code_to_bytes(unit_code)) else { return };
    let info = decode_unit_info(raw);
    let store_unit = StoreUnitInfo { unit_name, info };

    for delegate in delegates.read().iter() {
        delegate.unit_is_out_of_date(&store_unit, mtime, path, "source file modified", false);
    }
}
