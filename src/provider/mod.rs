//! Symbol Data Provider & Store Symbol Record.
//!
//! A provider exposes four iteration operations, each visitor-driven so a
//! caller can stop early without materializing the whole record. Two
//! concrete implementations are expected ever to exist: the record-backed
//! [`StoreSymbolRecord`] that ships here, and test fakes built by callers.

mod record;
pub mod reader;

pub use record::StoreSymbolRecord;
pub use reader::{
    FilesystemIndexReader, RawDependencyKind, RawIndexReader, RawOccurrence, RawRelation, RawSymbolEntry,
    RawUnitDependency, RawUnitInfo,
};

use std::path::PathBuf;

use crate::path_cache::CanonicalFilePathRef;
use crate::types::{SymbolInfo, SymbolRole};

/// Result of a visitor callback: whether iteration should continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Continue,
    Stop,
}

impl Visit {
    pub fn should_stop(self) -> bool {
        matches!(self, Visit::Stop)
    }
}

/// One unique symbol definition inside a record, as emitted by
/// `foreachCoreSymbolData`.
#[derive(Debug, Clone)]
pub struct CoreSymbolData {
    pub usr: Box<str>,
    pub name: Box<str>,
    pub info: SymbolInfo,
    pub roles: SymbolRole,
    pub related_roles: SymbolRole,
}

/// The file-level context a provider's occurrences share: a record is the
/// index artifact for exactly one source file (the glossary term "Record"
/// names the index artifact containing symbol occurrences from one source
/// file), so path/module/mtime/sysroot are constant across every
/// occurrence the provider yields and are supplied once at construction
/// rather than repeated per occurrence.
#[derive(Debug, Clone)]
pub struct ProviderLocationContext {
    pub file_path: CanonicalFilePathRef,
    pub module_name: Option<Box<str>>,
    pub mtime: i64,
    pub sysroot: Option<PathBuf>,
}

/// One occurrence inside a record, carrying the USR it occurs for plus
/// line/column and relation data, as emitted by `foreachSymbolOccurrence`.
/// File-level location data lives on the owning provider's
/// [`ProviderLocationContext`], not here (see that type's doc comment).
#[derive(Debug, Clone)]
pub struct ProviderOccurrence {
    pub usr: Box<str>,
    pub roles: SymbolRole,
    pub line: u32,
    pub column: u32,
    pub relations: Vec<(SymbolRole, Box<str>)>,
}

/// Abstract source of occurrence records for one unit-dependency.
pub trait SymbolDataProvider {
    /// Stable identifier for this provider (its record name); `IDCode` of
    /// this string becomes the `providerCode` used throughout the store.
    fn identifier(&self) -> &str;

    fn is_system(&self) -> bool;

    fn location(&self) -> &ProviderLocationContext;

    /// Emits one item per unique symbol in the record.
    fn foreach_core_symbol_data(&self, visitor: &mut dyn FnMut(&CoreSymbolData) -> Visit);

    /// Emits every occurrence with location, roles, relations.
    fn foreach_symbol_occurrence(&self, visitor: &mut dyn FnMut(&ProviderOccurrence) -> Visit);

    /// Filtered variant of `foreach_symbol_occurrence`: only occurrences
    /// whose usr is in `usrs` and whose roles overlap `role_set`.
    fn foreach_symbol_occurrence_by_usr(
        &self,
        usrs: &[&str],
        role_set: SymbolRole,
        visitor: &mut dyn FnMut(&ProviderOccurrence) -> Visit,
    ) {
        self.foreach_symbol_occurrence(&mut |occ| {
            if usrs.contains(&&*occ.usr) && occ.roles.intersects(role_set) {
                visitor(occ)
            } else {
                Visit::Continue
            }
        });
    }

    /// Emits occurrences that relate to any USR in `usrs` with roles
    /// overlapping `role_set`.
    fn foreach_related_symbol_occurrence_by_usr(
        &self,
        usrs: &[&str],
        role_set: SymbolRole,
        visitor: &mut dyn FnMut(&ProviderOccurrence) -> Visit,
    ) {
        self.foreach_symbol_occurrence(&mut |occ| {
            let matches = occ
                .relations
                .iter()
                .any(|(roles, related_usr)| usrs.contains(&&**related_usr) && roles.intersects(role_set));
            if matches { visitor(occ) } else { Visit::Continue }
        });
    }

    /// Emits only occurrences of symbols carrying the `UnitTest` property.
    fn foreach_unit_test_symbol_occurrence(&self, visitor: &mut dyn FnMut(&ProviderOccurrence) -> Visit) {
        let mut test_usrs = std::collections::HashSet::new();
        self.foreach_core_symbol_data(&mut |data| {
            if data.info.properties.contains(crate::types::SymbolProperty::UNIT_TEST) {
                test_usrs.insert(data.usr.clone());
            }
            Visit::Continue
        });

        self.foreach_symbol_occurrence(&mut |occ| {
            if test_usrs.contains(&occ.usr) { visitor(occ) } else { Visit::Continue }
        });
    }
}
