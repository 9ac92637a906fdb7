//! File Visibility Checker (§4.7): gates unit visibility when a client
//! drives the index with an explicit set of build output files rather
//! than trusting every unit the raw reader reports.

use std::collections::HashSet;

use parking_lot::{Condvar, Mutex, RwLock};

use crate::types::IDCode;

/// Tracks the set of `outFileCode`s a client has explicitly accepted, and
/// whether that gating is even active. When inactive (the default),
/// every unit is visible: `useExplicitOutputUnits` is an opt-in mode.
pub struct VisibilityChecker {
    explicit_mode: bool,
    accepted: RwLock<HashSet<IDCode>>,
    drain: Mutex<DrainState>,
    drain_changed: Condvar,
}

#[derive(Default)]
struct DrainState {
    /// Number of units added under the explicit-output set that have not
    /// yet finished ingestion; `remove_unit_out_file_paths` and
    /// `add_unit_out_file_paths(wait_for_processing=true)` block on this
    /// reaching zero.
    pending: u64,
}

impl VisibilityChecker {
    pub fn new(use_explicit_output_units: bool) -> Self {
        Self {
            explicit_mode: use_explicit_output_units,
            accepted: RwLock::new(HashSet::new()),
            drain: Mutex::new(DrainState::default()),
            drain_changed: Condvar::new(),
        }
    }

    pub fn use_explicit_output_units(&self) -> bool {
        self.explicit_mode
    }

    /// Whether a unit with this `out_file_code` is currently visible to
    /// queries. Always true when explicit-output mode is off (§4.7, §8
    /// visibility-gating property only constrains the explicit-mode case).
    pub fn is_visible(&self, out_file_code: IDCode) -> bool {
        if !self.explicit_mode {
            return true;
        }
        self.accepted.read().contains(&out_file_code)
    }

    /// `addUnitOutFilePaths` (§4.7): adds output files to the accepted
    /// set under the exclusive lock. When `wait_for_processing` is set,
    /// blocks until ingestion of any newly-visible units has drained.
    /// Callers signal drain progress via [`VisibilityChecker::note_unit_pending`]
    /// / [`VisibilityChecker::note_unit_processed`].
    pub fn add_unit_out_file_paths(&self, out_file_codes: &[IDCode], wait_for_processing: bool) {
        {
            let mut accepted = self.accepted.write();
            accepted.extend(out_file_codes.iter().copied());
        }
        if wait_for_processing {
            self.wait_for_drain();
        }
    }

    /// `removeUnitOutFilePaths` (§4.7): removes output files from the
    /// accepted set; queries stop seeing their units immediately.
    pub fn remove_unit_out_file_paths(&self, out_file_codes: &[IDCode], wait_for_processing: bool) {
        {
            let mut accepted = self.accepted.write();
            for code in out_file_codes {
                accepted.remove(code);
            }
        }
        if wait_for_processing {
            self.wait_for_drain();
        }
    }

    /// Called by the ingestion worker pool when a unit enters the queue
    /// under explicit-output gating.
    pub fn note_unit_pending(&self) {
        let mut state = self.drain.lock();
        state.pending += 1;
    }

    /// Called by the ingestion worker pool when a unit's import commits
    /// or fails; wakes any `wait_for_processing` caller once the count
    /// returns to zero.
    pub fn note_unit_processed(&self) {
        let mut state = self.drain.lock();
        state.pending = state.pending.saturating_sub(1);
        if state.pending == 0 {
            self.drain_changed.notify_all();
        }
    }

    fn wait_for_drain(&self) {
        let mut state = self.drain.lock();
        while state.pending > 0 {
            self.drain_changed.wait(&mut state);
        }
    }
}
