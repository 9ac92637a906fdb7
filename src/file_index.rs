//! File Path Index: the upper query layer for file-centric queries (§4.6).
//!
//! Builds on the same tables the Symbol Index reads, but keyed by file and
//! unit rather than by USR: main-file resolution, the include graph, and
//! filename pattern search.

use std::collections::HashSet;
use std::path::Path;

use crate::error::StoreResult;
use crate::storage::codec::{code_to_bytes, pair_key, split_pair_key, split_triple_key};
use crate::storage::tables::decode_unit_info;
use crate::storage::Database;
use crate::symbol::matches_pattern;
use crate::types::{IDCode, Language, ProviderKind};

/// Thin handle over a [`Database`], mirroring [`crate::symbol::SymbolIndex`]:
/// every query opens its own short-lived read transaction.
#[derive(Clone)]
pub struct FilePathIndex {
    db: Database,
}

impl FilePathIndex {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// `mainFilesContainingFile(file, crossLanguage)` (§4.6): resolve
    /// `file` to its interned code, enumerate the units that reference it,
    /// and yield each unit's main file. When `cross_language` is false,
    /// units whose provider kind doesn't match `file`'s inferred language
    /// are skipped.
    pub fn main_files_containing_file(&self, file: &Path, cross_language: bool) -> StoreResult<Vec<IDCode>> {
        let file_code = IDCode::of(&file.to_string_lossy());
        let wanted_language = infer_provider_kind(file);

        let rtxn = self.db.read_txn()?;
        let tables = rtxn.tables();

        let mut out = Vec::new();
        let mut iter = tables.unit_by_file.prefix_iter(&rtxn.txn, &code_to_bytes(file_code))?;
        while let Some(entry) = iter.next() {
            let (key, _) = entry?;
            let (_file, unit_code) = split_pair_key(key);

            let Some(raw) = tables.unit_info.get(&rtxn.txn, &code_to_bytes(unit_code))? else { continue };
            let info = decode_unit_info(raw);

            if !cross_language {
                if let Some(wanted) = wanted_language {
                    if info.provider_kind != wanted {
                        continue;
                    }
                }
            }

            if let Some(main_file_code) = info.main_file() {
                out.push(main_file_code);
            }
        }
        Ok(out)
    }

    /// `filesIncludedByFile(source)` (§4.6): files that `source` includes,
    /// driven by the `includes-by-source` table.
    pub fn files_included_by_file(&self, source: &Path) -> StoreResult<Vec<IDCode>> {
        self.include_neighbors(source, IncludeDirection::Source)
    }

    /// `filesIncludingFile(target)` (§4.6): files that include `target`.
    pub fn files_including_file(&self, target: &Path) -> StoreResult<Vec<IDCode>> {
        self.include_neighbors(target, IncludeDirection::Target)
    }

    fn include_neighbors(&self, anchor: &Path, direction: IncludeDirection) -> StoreResult<Vec<IDCode>> {
        let anchor_code = IDCode::of(&anchor.to_string_lossy());
        let rtxn = self.db.read_txn()?;
        let tables = rtxn.tables();
        let table = match direction {
            IncludeDirection::Source => &tables.includes_by_source,
            IncludeDirection::Target => &tables.includes_by_target,
        };

        let mut out = Vec::new();
        let mut iter = table.prefix_iter(&rtxn.txn, &code_to_bytes(anchor_code))?;
        while let Some(entry) = iter.next() {
            let (key, _) = entry?;
            let (_anchor, other_code, _unit_code) = split_triple_key(key);
            out.push(other_code);
        }
        Ok(out)
    }

    /// Records one `(sourceFile, targetFile, line)` include edge for
    /// `unit_code`, populating both directions of the include graph (§4.6).
    /// Called by the ingestion worker while importing a unit's `File`-kind
    /// dependencies.
    pub fn record_include(
        &self,
        txn: &mut crate::storage::WriteTxn<'_>,
        source_file: IDCode,
        target_file: IDCode,
        unit_code: IDCode,
        line: u32,
    ) -> StoreResult<()> {
        let tables = txn.tables().clone();
        tables.includes_by_source.put(
            &mut txn.txn,
            &crate::storage::codec::triple_key(source_file, target_file, unit_code),
            &line.to_be_bytes(),
        )?;
        tables.includes_by_target.put(
            &mut txn.txn,
            &crate::storage::codec::triple_key(target_file, source_file, unit_code),
            &line.to_be_bytes(),
        )?;
        Ok(())
    }

    /// `foreachFileOfUnit(unitName, followDependencies, visitor)` (§4.6):
    /// direct `fileDeps` only, or a DFS through `unit-by-unit` when
    /// `follow_dependencies` is set, de-duplicating by file code.
    pub fn files_of_unit(&self, unit_name: &str, follow_dependencies: bool) -> StoreResult<Vec<IDCode>> {
        let rtxn = self.db.read_txn()?;
        let tables = rtxn.tables();

        let root_code = IDCode::of(unit_name);
        let mut seen_files = HashSet::new();
        let mut out = Vec::new();

        if !follow_dependencies {
            if let Some(raw) = tables.unit_info.get(&rtxn.txn, &code_to_bytes(root_code))? {
                for file_code in decode_unit_info(raw).file_deps {
                    if seen_files.insert(file_code) {
                        out.push(file_code);
                    }
                }
            }
            return Ok(out);
        }

        // DFS over `UnitInfo.unit_deps` (the forward dependency edges each
        // unit carries directly; `unit-by-unit` is the reverse index of
        // this and isn't needed here). A visited-set on unit codes prevents
        // infinite recursion on cyclic unit references (§9: cyclic-unit-
        // reference design note).
        let mut seen_units = HashSet::new();
        let mut stack = vec![root_code];
        while let Some(unit_code) = stack.pop() {
            if !seen_units.insert(unit_code) {
                continue;
            }
            let Some(raw) = tables.unit_info.get(&rtxn.txn, &code_to_bytes(unit_code))? else { continue };
            let info = decode_unit_info(raw);
            for file_code in &info.file_deps {
                if seen_files.insert(*file_code) {
                    out.push(*file_code);
                }
            }
            stack.extend(info.unit_deps.iter().copied());
        }

        Ok(out)
    }

    /// `foreachFilenameContainingPattern` (§4.6): full-scan `filenames`,
    /// filter by [`matches_pattern`] against the filename component only.
    pub fn filenames_containing_pattern(
        &self,
        pattern: &str,
        anchor_start: bool,
        anchor_end: bool,
        subsequence: bool,
        ignore_case: bool,
    ) -> StoreResult<Vec<Box<str>>> {
        let rtxn = self.db.read_txn()?;
        let tables = rtxn.tables();

        let mut out = Vec::new();
        let mut iter = tables.filenames.iter(&rtxn.txn)?;
        while let Some(entry) = iter.next() {
            let (_key, value) = entry?;
            let full_path = crate::storage::codec::bytes_to_str(value);
            let filename = Path::new(full_path).file_name().and_then(|n| n.to_str()).unwrap_or(full_path);
            if matches_pattern(filename, pattern, anchor_start, anchor_end, subsequence, ignore_case) {
                out.push(Box::from(full_path));
            }
        }
        Ok(out)
    }

    /// `isKnownFile` (§4.6): whether `file` has an interned entry in
    /// `filenames`.
    pub fn is_known_file(&self, file: &Path) -> StoreResult<bool> {
        let file_code = IDCode::of(&file.to_string_lossy());
        let rtxn = self.db.read_txn()?;
        let value = rtxn.tables().filenames.get(&rtxn.txn, &code_to_bytes(file_code))?;
        Ok(value.is_some())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IncludeDirection {
    Source,
    Target,
}

/// Infers the provider kind a file's extension implies, for the
/// `crossLanguage=false` restriction in `mainFilesContainingFile` (§4.6).
/// Returns `None` for extensions that don't map unambiguously (in which
/// case the caller treats the file as matching any unit).
fn infer_provider_kind(file: &Path) -> Option<ProviderKind> {
    match file.extension().and_then(|e| e.to_str())? {
        "swift" => Some(ProviderKind::Swift),
        "c" | "cc" | "cpp" | "cxx" | "h" | "hpp" | "m" | "mm" => Some(ProviderKind::Clang),
        _ => None,
    }
}

/// Infers the [`Language`] a file's extension implies. Not used by the
/// file index itself (provider kind is the coarser distinction queries
/// need) but kept alongside `infer_provider_kind` since both read the same
/// extension table; exposed for callers building `Location` values from
/// bare paths.
pub fn infer_language(file: &Path) -> Option<Language> {
    match file.extension().and_then(|e| e.to_str())? {
        "swift" => Some(Language::Swift),
        "c" => Some(Language::C),
        "cc" | "cpp" | "cxx" => Some(Language::Cxx),
        "m" => Some(Language::ObjC),
        "mm" => Some(Language::ObjCxx),
        _ => None,
    }
}
