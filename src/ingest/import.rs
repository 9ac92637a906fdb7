//! The per-unit import transaction (§4.8 worker step, §4.5 `importSymbols`
//! fan-out): read a unit's metadata and its dependent record files, then
//! write everything into one write transaction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::IngestResult;
use crate::file_index::FilePathIndex;
use crate::path_cache;
use crate::provider::reader::{RawDependencyKind, RawIndexReader, RawUnitDependency};
use crate::provider::{ProviderLocationContext, StoreSymbolRecord};
use crate::storage::codec::{code_to_bytes, pair_key};
use crate::storage::tables::{encode_unit_info, intern_file_path};
use crate::storage::Database;
use crate::symbol::SymbolIndex;
use crate::types::{IDCode, UnitInfo};

/// A record dependency's identifier is conventionally its source file's
/// path with a `.record` suffix appended (mirroring the upstream project's
/// `<unit>.swiftsourceinfo`-style naming). The exact wire shape of a
/// record's owning file is left to the raw-index reader (§6), so this is
/// the documented convention for this crate's own
/// [`crate::provider::reader::FilesystemIndexReader`] fixtures.
fn record_source_file(record_name: &str) -> &str {
    record_name.strip_suffix(".record").unwrap_or(record_name)
}

/// Reads `unit_name` via `reader`, constructs one provider per `Record`
/// dependency, imports every provider's symbols, records the unit's
/// include edges, and writes the `unit-info` row plus reverse-index
/// edges (`unit-by-file`, `unit-by-unit`), all within one write
/// transaction, matching §4.8's "opens a single write transaction ...
/// commits" description of a worker's unit of work.
pub fn import_unit(
    db: &Database,
    symbol_index: &SymbolIndex,
    file_index: &FilePathIndex,
    reader: &Arc<dyn RawIndexReader>,
    unit_name: &str,
) -> IngestResult<UnitInfo> {
    let raw = reader.read_unit(unit_name)?;

    let unit_code = IDCode::of(unit_name);
    let out_file_code = IDCode::of(&raw.output_file);
    let main_file_code = raw.main_file.as_deref().map(IDCode::of);
    let sysroot_code = raw.sysroot.as_deref().map(IDCode::of);
    let target_code = raw.target.as_deref().map(IDCode::of);

    let mut file_deps = Vec::new();
    let mut unit_deps = Vec::new();
    let mut provider_deps = Vec::new();
    let mut record_deps: Vec<&RawUnitDependency> = Vec::new();
    let mut file_include_deps: Vec<&RawUnitDependency> = Vec::new();

    for dep in &raw.deps {
        match dep.kind {
            RawDependencyKind::Unit => unit_deps.push(IDCode::of(&dep.name)),
            RawDependencyKind::Record => {
                provider_deps.push(IDCode::of(&dep.name));
                record_deps.push(dep);
            }
            RawDependencyKind::File => {
                file_deps.push(IDCode::of(&dep.name));
                file_include_deps.push(dep);
            }
        }
    }

    let mut wtxn = db.write_txn()?;
    let tables = wtxn.tables().clone();

    for dep in &file_include_deps {
        intern_file_path(&tables, &mut wtxn.txn, Path::new(&dep.name))?;
    }
    if let Some(main_file) = &raw.main_file {
        intern_file_path(&tables, &mut wtxn.txn, Path::new(main_file))?;
    }

    if let Some(sysroot) = &raw.sysroot {
        intern_file_path(&tables, &mut wtxn.txn, Path::new(sysroot))?;
    }
    if let Some(target) = &raw.target {
        tables
            .target_names
            .put(&mut wtxn.txn, &code_to_bytes(IDCode::of(target)), target.as_bytes())
            .map_err(crate::error::StoreError::from)?;
    }

    // §7: "Raw record read errors: logged, that provider is skipped, the
    // unit is still imported with remaining providers; unit is marked as
    // loaded (best-effort semantics)." A failing record dependency must
    // not abort the whole unit's import.
    for dep in &record_deps {
        let source_file = record_source_file(&dep.name);
        let location = ProviderLocationContext {
            file_path: path_cache::global().get_canonical_path(Path::new(source_file), None),
            module_name: dep.module_name.as_deref().map(Into::into),
            mtime: raw.mtime,
            sysroot: raw.sysroot.as_deref().map(PathBuf::from),
        };
        if let Some(module_name) = &location.module_name {
            tables
                .module_names
                .put(&mut wtxn.txn, &code_to_bytes(IDCode::of(module_name)), module_name.as_bytes())
                .map_err(crate::error::StoreError::from)?;
        }
        let provider = StoreSymbolRecord::new(dep.name.as_str(), dep.is_system, location, Arc::clone(reader));
        if let Err(err) = provider.ensure_loaded() {
            tracing::warn!(record = %dep.name, error = %err, "skipping unreadable record, importing unit best-effort");
            continue;
        }
        symbol_index.import_symbols(&mut wtxn, &provider, unit_code)?;
    }

    for dep in &file_include_deps {
        if let Some(main_file) = &raw.main_file {
            let source_code = IDCode::of(main_file);
            let target_code = IDCode::of(&dep.name);
            file_index.record_include(&mut wtxn, source_code, target_code, unit_code, dep.line.unwrap_or(0))?;
        }
    }

    let mut has_test_symbols = false;
    for provider_code in &provider_deps {
        if tables
            .providers_with_test_symbols
            .get(&wtxn.txn, &code_to_bytes(*provider_code))
            .map_err(crate::error::StoreError::from)?
            .is_some()
        {
            has_test_symbols = true;
            break;
        }
    }

    let info = UnitInfo {
        unit_name: unit_name.into(),
        unit_code,
        mtime: raw.mtime,
        out_file_code,
        main_file_code,
        sysroot_code,
        target_code,
        has_main_file: raw.main_file.is_some(),
        has_sysroot: raw.sysroot.is_some(),
        is_system: raw.is_system,
        has_test_symbols,
        provider_kind: raw.provider_kind,
        file_deps: file_deps.clone(),
        unit_deps: unit_deps.clone(),
        provider_deps,
    };

    tables
        .unit_info
        .put(&mut wtxn.txn, &code_to_bytes(unit_code), &encode_unit_info(&info))
        .map_err(crate::error::StoreError::from)?;
    for file_code in &file_deps {
        tables
            .unit_by_file
            .put(&mut wtxn.txn, &pair_key(*file_code, unit_code), &[])
            .map_err(crate::error::StoreError::from)?;
    }
    for dep_unit_code in &unit_deps {
        tables
            .unit_by_unit
            .put(&mut wtxn.txn, &pair_key(*dep_unit_code, unit_code), &[])
            .map_err(crate::error::StoreError::from)?;
    }

    wtxn.commit()?;
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::reader::{RawSymbolEntry, RawUnitInfo};
    use crate::types::{Language, ProviderKind, SymbolInfo, SymbolKind, SymbolProperty, SymbolRole};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeReader {
        units: HashMap<String, RawUnitInfo>,
        records: Mutex<HashMap<String, Vec<RawSymbolEntry>>>,
        unreadable_records: std::collections::HashSet<String>,
    }

    impl RawIndexReader for FakeReader {
        fn list_units(&self) -> IngestResult<Vec<String>> {
            Ok(self.units.keys().cloned().collect())
        }
        fn read_unit(&self, unit_name: &str) -> IngestResult<RawUnitInfo> {
            self.units
                .get(unit_name)
                .cloned()
                .ok_or_else(|| crate::error::IngestError::UnitReadFailed {
                    unit: unit_name.to_string(),
                    reason: "not found".into(),
                })
        }
        fn read_record(&self, record_name: &str) -> IngestResult<Vec<RawSymbolEntry>> {
            if self.unreadable_records.contains(record_name) {
                return Err(crate::error::IngestError::RecordReadFailed {
                    record: record_name.to_string(),
                    reason: "simulated corruption".into(),
                });
            }
            Ok(self.records.lock().unwrap().get(record_name).cloned().unwrap_or_default())
        }
    }

    fn function_entry(usr: &str, name: &str, roles: SymbolRole) -> RawSymbolEntry {
        RawSymbolEntry {
            usr: usr.into(),
            name: name.into(),
            info: SymbolInfo {
                kind: SymbolKind::Function,
                sub_kind: 0,
                properties: SymbolProperty::empty(),
                language: Language::Swift,
            },
            roles,
            related_roles: SymbolRole::empty(),
            occurrences: vec![],
        }
    }

    #[test]
    fn imports_unit_with_one_record_dependency() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path(), None).unwrap();
        let symbol_index = SymbolIndex::new(db.clone());
        let file_index = FilePathIndex::new(db.clone());

        let mut records = HashMap::new();
        records.insert(
            "/repo/main.swift.record".to_string(),
            vec![function_entry("s:4main1cyyF", "c", SymbolRole::DEFINITION)],
        );
        let mut units = HashMap::new();
        units.insert(
            "u1".to_string(),
            RawUnitInfo {
                main_file: Some("/repo/main.swift".into()),
                output_file: "/out/main.o".into(),
                module_name: Some("main".into()),
                target: None,
                sysroot: None,
                provider_kind: ProviderKind::Swift,
                is_system: false,
                mtime: 1000,
                deps: vec![RawUnitDependency {
                    kind: RawDependencyKind::Record,
                    name: "/repo/main.swift.record".into(),
                    module_name: Some("main".into()),
                    is_system: false,
                    line: None,
                }],
            },
        );
        let reader: Arc<dyn RawIndexReader> = Arc::new(FakeReader { units, records: Mutex::new(records), unreadable_records: Default::default() });

        let info = import_unit(&db, &symbol_index, &file_index, &reader, "u1").unwrap();
        assert_eq!(info.provider_deps.len(), 1);

        let occs = symbol_index.occurrences_by_usr("s:4main1cyyF", SymbolRole::empty()).unwrap();
        assert_eq!(occs.len(), 1);
    }

    #[test]
    fn reimporting_same_unit_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path(), None).unwrap();
        let symbol_index = SymbolIndex::new(db.clone());
        let file_index = FilePathIndex::new(db.clone());

        let mut records = HashMap::new();
        records.insert("/repo/a.swift.record".to_string(), vec![function_entry("s:a", "a", SymbolRole::DEFINITION)]);
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
                mtime: 5,
                deps: vec![RawUnitDependency {
                    kind: RawDependencyKind::Record,
                    name: "/repo/a.swift.record".into(),
                    module_name: None,
                    is_system: false,
                    line: None,
                }],
            },
        );
        let reader: Arc<dyn RawIndexReader> = Arc::new(FakeReader { units, records: Mutex::new(records), unreadable_records: Default::default() });

        import_unit(&db, &symbol_index, &file_index, &reader, "u1").unwrap();
        import_unit(&db, &symbol_index, &file_index, &reader, "u1").unwrap();

        let occs = symbol_index.occurrences_by_usr("s:a", SymbolRole::empty()).unwrap();
        assert_eq!(occs.len(), 1, "re-import must not duplicate rows");
    }

    #[test]
    fn unreadable_record_is_skipped_but_unit_still_imports() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path(), None).unwrap();
        let symbol_index = SymbolIndex::new(db.clone());
        let file_index = FilePathIndex::new(db.clone());

        let mut records = HashMap::new();
        records.insert("/repo/b.swift.record".to_string(), vec![function_entry("s:b", "b", SymbolRole::DEFINITION)]);
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
                mtime: 5,
                deps: vec![
                    RawUnitDependency {
                        kind: RawDependencyKind::Record,
                        name: "/repo/a.swift.record".into(),
                        module_name: None,
                        is_system: false,
                        line: None,
                    },
                    RawUnitDependency {
                        kind: RawDependencyKind::Record,
                        name: "/repo/b.swift.record".into(),
                        module_name: None,
                        is_system: false,
                        line: None,
                    },
                ],
            },
        );
        let reader: Arc<dyn RawIndexReader> = Arc::new(FakeReader {
            units,
            records: Mutex::new(records),
            unreadable_records: ["/repo/a.swift.record".to_string()].into_iter().collect(),
        });

        let info = import_unit(&db, &symbol_index, &file_index, &reader, "u1").unwrap();
        assert_eq!(info.provider_deps.len(), 2, "both deps are still recorded on the unit");

        assert!(symbol_index.occurrences_by_usr("s:a", SymbolRole::empty()).unwrap().is_empty());
        assert_eq!(symbol_index.occurrences_by_usr("s:b", SymbolRole::empty()).unwrap().len(), 1);
    }
}
