//! Index System: the top-level facade composing the KV store, the two
//! query layers, the visibility gate, and the ingestion pipeline into the
//! one handle a consumer constructs.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Settings;
use crate::error::{ErrorContext, IndexSystemError, IndexSystemResult};
use crate::file_index::FilePathIndex;
use crate::ingest::{IndexDatastore, IndexDatastoreOptions, IndexDelegate};
use crate::provider::{FilesystemIndexReader, RawIndexReader};
use crate::storage::codec::{code_to_bytes, split_triple_key};
use crate::storage::Database;
use crate::symbol::{SymbolIndex, SymbolOccurrenceRef};
use crate::types::{GlobalSymbolKind, IDCode};
use crate::visibility::VisibilityChecker;

/// Top-level creation options. [`CreationOptions::from_settings`]
/// adapts a loaded [`Settings`] into this shape for callers that configure
/// the engine via [`crate::config`] rather than constructing this directly.
pub struct CreationOptions {
    pub store_path: PathBuf,
    pub database_path: PathBuf,
    pub initial_db_size: Option<usize>,
    pub use_explicit_output_units: bool,
    pub wait: bool,
    pub readonly: bool,
    pub enable_out_of_date_file_watching: bool,
    pub listen_to_unit_events: bool,
    pub worker_threads: usize,
    pub max_db_size: Option<usize>,
    pub debounce_ms: u64,
}

impl CreationOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            store_path: settings.store_path.clone(),
            database_path: settings.database_path.clone(),
            initial_db_size: settings.initial_db_size,
            use_explicit_output_units: settings.use_explicit_output_units,
            wait: settings.wait,
            readonly: settings.readonly,
            enable_out_of_date_file_watching: settings.watch.enable_out_of_date,
            listen_to_unit_events: settings.watch.listen_to_unit_events,
            worker_threads: settings.indexing.worker_threads,
            max_db_size: settings.indexing.max_db_size,
            debounce_ms: settings.watch.debounce_ms,
        }
    }
}

/// The composed engine handle. Queries are forwarded to
/// [`SymbolIndex`]/[`FilePathIndex`] and filtered through the
/// [`VisibilityChecker`] when `useExplicitOutputUnits` is on; mutation and
/// lifecycle calls (`addDelegate`, `pollForUnitChangesAndWait`, `close`)
/// forward to the [`IndexDatastore`].
pub struct IndexSystem {
    db: Database,
    symbol_index: SymbolIndex,
    file_index: FilePathIndex,
    visibility: Arc<VisibilityChecker>,
    datastore: IndexDatastore,
    reader: Arc<dyn RawIndexReader>,
}

impl IndexSystem {
    /// `create` against an arbitrary [`RawIndexReader`]: the seam test
    /// code and embedders with a non-filesystem raw store use instead of
    /// [`IndexSystem::create_with_filesystem_reader`].
    pub fn create(options: CreationOptions, reader: Arc<dyn RawIndexReader>) -> IndexSystemResult<Self> {
        std::fs::create_dir_all(&options.database_path).with_path(&options.database_path)?;
        let db = Database::open(&options.database_path, options.initial_db_size)?;

        let symbol_index = SymbolIndex::new(db.clone());
        let file_index = FilePathIndex::new(db.clone());
        let visibility = Arc::new(VisibilityChecker::new(options.use_explicit_output_units));

        let datastore_options = IndexDatastoreOptions {
            worker_threads: options.worker_threads.max(1),
            wait: options.wait,
            readonly: options.readonly,
            max_db_size: options.max_db_size,
            enable_out_of_date_watching: options.enable_out_of_date_file_watching && !options.readonly,
            debounce: std::time::Duration::from_millis(options.debounce_ms),
        };
        let datastore = IndexDatastore::create(db.clone(), reader.clone(), visibility.clone(), datastore_options)
            .map_err(|err| IndexSystemError::Config { reason: err.to_string() })?;

        Ok(Self { db, symbol_index, file_index, visibility, datastore, reader })
    }

    /// `create` over the filesystem-fixture [`FilesystemIndexReader`],
    /// reading units/records from `options.store_path`.
    pub fn create_with_filesystem_reader(options: CreationOptions) -> IndexSystemResult<Self> {
        let reader: Arc<dyn RawIndexReader> = Arc::new(FilesystemIndexReader::new(options.store_path.clone()));
        Self::create(options, reader)
    }

    pub fn symbol_index(&self) -> &SymbolIndex {
        &self.symbol_index
    }

    pub fn file_index(&self) -> &FilePathIndex {
        &self.file_index
    }

    pub fn visibility(&self) -> &VisibilityChecker {
        &self.visibility
    }

    /// `occurrencesByUSR`, filtered by visibility: an occurrence survives
    /// if at least one unit referencing its provider has a visible
    /// `outFileCode`.
    pub fn occurrences_by_usr(
        &self,
        usr: &str,
        role_set: crate::types::SymbolRole,
    ) -> crate::error::StoreResult<Vec<SymbolOccurrenceRef>> {
        let all = self.symbol_index.occurrences_by_usr(usr, role_set)?;
        if !self.visibility.use_explicit_output_units() {
            return Ok(all);
        }
        let mut out = Vec::with_capacity(all.len());
        for occ in all {
            if self.provider_is_visible(occ.provider_code)? {
                out.push(occ);
            }
        }
        Ok(out)
    }

    /// `canonicalOccurrencesByUSR`, filtered by visibility the same way as
    /// [`IndexSystem::occurrences_by_usr`].
    pub fn canonical_occurrences_by_usr(
        &self,
        usr: &str,
    ) -> crate::error::StoreResult<Option<SymbolOccurrenceRef>> {
        let Some(occ) = self.symbol_index.canonical_occurrences_by_usr(usr)? else { return Ok(None) };
        if !self.visibility.use_explicit_output_units() || self.provider_is_visible(occ.provider_code)? {
            Ok(Some(occ))
        } else {
            Ok(None)
        }
    }

    pub fn usrs_with_global_kind(&self, kind: GlobalSymbolKind) -> crate::error::StoreResult<Vec<IDCode>> {
        self.symbol_index.usrs_with_global_kind(kind)
    }

    /// Full `occurrencesByUSR`, filtered by visibility the same way as
    /// [`IndexSystem::occurrences_by_usr`] but returning complete
    /// [`crate::types::SymbolOccurrence`] values (location, relations)
    /// re-materialized from the owning providers' record files.
    pub fn full_occurrences_by_usr(
        &self,
        usr: &str,
        role_set: crate::types::SymbolRole,
    ) -> crate::error::StoreResult<Vec<crate::types::SymbolOccurrence>> {
        let canonical = self.symbol_index.resolve_canonical(usr)?;
        let mut out = Vec::new();
        for occ_ref in self.occurrences_by_usr(usr, role_set)? {
            out.extend(self.symbol_index.materialize_provider_occurrences(
                usr,
                occ_ref.provider_code,
                role_set,
                &self.reader,
                canonical.as_ref(),
            )?);
        }
        Ok(out)
    }

    /// Full [`IndexSystem::canonical_occurrences_by_usr`], returning a
    /// complete [`crate::types::SymbolOccurrence`] rather than the coarse
    /// provider/role reference.
    pub fn full_canonical_occurrence_by_usr(
        &self,
        usr: &str,
    ) -> crate::error::StoreResult<Option<crate::types::SymbolOccurrence>> {
        // Re-resolve visibility on the coarse pick before materializing, same
        // as `canonical_occurrences_by_usr`, but keep the `(ref, wanted role)`
        // pair so the re-read occurrence can be marked canonical.
        let Some((canonical, wanted)) = self.symbol_index.resolve_canonical(usr)? else { return Ok(None) };
        if self.visibility.use_explicit_output_units() && !self.provider_is_visible(canonical.provider_code)? {
            return Ok(None);
        }
        let mut occs = self.symbol_index.materialize_provider_occurrences(
            usr,
            canonical.provider_code,
            crate::types::SymbolRole::empty(),
            &self.reader,
            Some(&(canonical, wanted)),
        )?;
        let canonical_index = occs.iter().position(|o| o.roles.contains(crate::types::SymbolRole::CANONICAL));
        Ok(match canonical_index {
            Some(i) => Some(occs.swap_remove(i)),
            None => occs.into_iter().next(),
        })
    }

    /// Full `occurrencesRelatedToUSR`, filtered by visibility the same way
    /// as [`IndexSystem::occurrences_by_usr`]. Scans every known provider
    /// (there's no relation index to narrow the search), skipping
    /// providers that aren't visible before re-reading their records.
    pub fn occurrences_related_to_usr(
        &self,
        usr: &str,
        role_set: crate::types::SymbolRole,
    ) -> crate::error::StoreResult<Vec<crate::types::SymbolOccurrence>> {
        let effective_roles = if role_set.is_empty() { crate::types::SymbolRole::all() } else { role_set };
        let mut out = Vec::new();
        for provider_code in self.symbol_index.provider_codes()? {
            if self.visibility.use_explicit_output_units() && !self.provider_is_visible(provider_code)? {
                continue;
            }
            out.extend(self.symbol_index.materialize_related_provider_occurrences(
                usr,
                provider_code,
                effective_roles,
                &self.reader,
            )?);
        }
        Ok(out)
    }

    /// Whether any unit referencing `provider_code` (via `provider-files`)
    /// has a visible `outFileCode`. The facade-level visibility check
    /// queries don't carry in their own `SymbolOccurrenceRef`, since a
    /// provider's owning unit lives one join away in `provider-files`.
    fn provider_is_visible(&self, provider_code: IDCode) -> crate::error::StoreResult<bool> {
        let rtxn = self.db.read_txn()?;
        let tables = rtxn.tables();
        let mut iter = tables.provider_files.prefix_iter(&rtxn.txn, &code_to_bytes(provider_code))?;
        while let Some(entry) = iter.next() {
            let (key, _) = entry?;
            let (_provider, _file, unit_code) = split_triple_key(key);
            let Some(raw) = tables.unit_info.get(&rtxn.txn, &code_to_bytes(unit_code))? else { continue };
            let info = crate::storage::tables::decode_unit_info(raw);
            if self.visibility.is_visible(info.out_file_code) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// `addDelegate`.
    pub fn add_delegate(&self, delegate: Arc<dyn IndexDelegate>) {
        self.datastore.add_delegate(delegate);
    }

    /// `pollForUnitChangesAndWait`.
    pub fn poll_for_unit_changes_and_wait(&self) -> IndexSystemResult<()> {
        self.datastore.poll_for_unit_changes_and_wait().map_err(|err| IndexSystemError::Config { reason: err.to_string() })
    }

    /// Closes the ingestion pipeline and the underlying store. Not run on
    /// `Drop`; see [`Database::close`]'s doc comment and
    /// [`IndexDatastore::shutdown`]'s for why an explicit call is required
    /// rather than relying on destructors.
    pub fn close(self) -> IndexSystemResult<()> {
        self.datastore.shutdown();
        self.db.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::reader::{RawDependencyKind, RawSymbolEntry, RawUnitDependency, RawUnitInfo};
    use crate::types::{Language, ProviderKind, SymbolInfo, SymbolKind, SymbolProperty, SymbolRole};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeReader {
        units: HashMap<String, RawUnitInfo>,
        records: Mutex<HashMap<String, Vec<RawSymbolEntry>>>,
    }

    impl RawIndexReader for FakeReader {
        fn list_units(&self) -> crate::error::IngestResult<Vec<String>> {
            Ok(self.units.keys().cloned().collect())
        }
        fn read_unit(&self, unit_name: &str) -> crate::error::IngestResult<RawUnitInfo> {
            self.units.get(unit_name).cloned().ok_or_else(|| crate::error::IngestError::UnitReadFailed {
                unit: unit_name.to_string(),
                reason: "missing".into(),
            })
        }
        fn read_record(&self, record_name: &str) -> crate::error::IngestResult<Vec<RawSymbolEntry>> {
            Ok(self.records.lock().unwrap().get(record_name).cloned().unwrap_or_default())
        }
    }

    fn sample_reader() -> Arc<dyn RawIndexReader> {
        let mut records = HashMap::new();
        records.insert(
            "/repo/main.swift.record".to_string(),
            vec![RawSymbolEntry {
                usr: "s:4main1cyyF".into(),
                name: "c".into(),
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
                main_file: Some("/repo/main.swift".into()),
                output_file: "/out/main.o".into(),
                module_name: Some("main".into()),
                target: None,
                sysroot: None,
                provider_kind: ProviderKind::Swift,
                is_system: false,
                mtime: 1,
                deps: vec![RawUnitDependency {
                    kind: RawDependencyKind::Record,
                    name: "/repo/main.swift.record".into(),
                    module_name: Some("main".into()),
                    is_system: false,
                    line: None,
                }],
            },
        );
        Arc::new(FakeReader { units, records: Mutex::new(records) })
    }

    #[test]
    fn create_then_query_finds_imported_symbol() {
        let dir = tempfile::tempdir().unwrap();
        let options = CreationOptions {
            store_path: dir.path().to_path_buf(),
            database_path: dir.path().join("db"),
            initial_db_size: None,
            use_explicit_output_units: false,
            wait: true,
            readonly: false,
            enable_out_of_date_file_watching: false,
            listen_to_unit_events: false,
            worker_threads: 1,
            max_db_size: None,
            debounce_ms: 50,
        };
        let system = IndexSystem::create(options, sample_reader()).unwrap();

        let occs = system.occurrences_by_usr("s:4main1cyyF", SymbolRole::empty()).unwrap();
        assert_eq!(occs.len(), 1);

        system.close().unwrap();
    }

    #[test]
    fn explicit_output_units_hides_unaccepted_units() {
        let dir = tempfile::tempdir().unwrap();
        let options = CreationOptions {
            store_path: dir.path().to_path_buf(),
            database_path: dir.path().join("db"),
            initial_db_size: None,
            use_explicit_output_units: true,
            wait: true,
            readonly: false,
            enable_out_of_date_file_watching: false,
            listen_to_unit_events: false,
            worker_threads: 1,
            max_db_size: None,
            debounce_ms: 50,
        };
        let system = IndexSystem::create(options, sample_reader()).unwrap();

        let hidden = system.occurrences_by_usr("s:4main1cyyF", SymbolRole::empty()).unwrap();
        assert!(hidden.is_empty());

        system.visibility().add_unit_out_file_paths(&[IDCode::of("/out/main.o")], false);
        let visible = system.occurrences_by_usr("s:4main1cyyF", SymbolRole::empty()).unwrap();
        assert_eq!(visible.len(), 1);

        system.close().unwrap();
    }
}
