//! `UnitInfo`: the per-unit record stored in the `unit-info` table.
//!
//! Kept as plain `serde`-derived data (the table itself owns the packed
//! on-disk encoding via `bincode`-free manual framing in
//! [`crate::store::tables`]); this module is just the logical shape.

use serde::{Deserialize, Serialize};

use super::{IDCode, ProviderKind};

/// `(unitName, unitCode, mtime, outFileCode, mainFileCode, sysrootCode,
/// targetCode, hasMainFile, hasSysroot, isSystem, hasTestSymbols,
/// providerKind, fileDeps[], unitDeps[], providerDeps[])` per §3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitInfo {
    pub unit_name: Box<str>,
    pub unit_code: IDCode,
    pub mtime: i64,
    pub out_file_code: IDCode,
    pub main_file_code: Option<IDCode>,
    pub sysroot_code: Option<IDCode>,
    pub target_code: Option<IDCode>,
    pub has_main_file: bool,
    pub has_sysroot: bool,
    pub is_system: bool,
    pub has_test_symbols: bool,
    pub provider_kind: ProviderKind,
    pub file_deps: Vec<IDCode>,
    pub unit_deps: Vec<IDCode>,
    pub provider_deps: Vec<IDCode>,
}

impl UnitInfo {
    /// Main file path code, if this unit has one (§4.6).
    pub fn main_file(&self) -> Option<IDCode> {
        self.has_main_file.then_some(self.main_file_code).flatten()
    }
}
