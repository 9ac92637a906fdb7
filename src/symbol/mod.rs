//! Symbol Index: the upper query layer over the KV store (§4.5).
//!
//! Implements `importSymbols` (the write path every provider goes
//! through during ingestion) and the USR-, name-, kind-, and
//! pattern-based read queries, including canonical-occurrence selection.

mod pattern;

pub use pattern::matches_pattern;

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::StoreResult;
use crate::path_cache::CanonicalFilePathRef;
use crate::provider::reader::RawIndexReader;
use crate::provider::{ProviderLocationContext, StoreSymbolRecord, SymbolDataProvider, Visit};
use crate::storage::codec::{
    bytes_to_code, bytes_to_str, code_to_bytes, kind_key, pair_key, split_kind_key, split_pair_key, split_triple_key,
    triple_key,
};
use crate::storage::tables::{
    decode_provider_file_entry, decode_symbol_info_entry, decode_unit_info, decode_usr_row, encode_provider_file_entry,
    encode_symbol_info_entry, encode_usr_row, intern_file_path, ProviderFileEntry, UsrRow,
};
use crate::storage::{Database, WriteTxn};
use crate::types::{
    GlobalSymbolKind, IDCode, Location, ProviderKind, Symbol, SymbolInfo, SymbolKind, SymbolOccurrence,
    SymbolProperty, SymbolRelation, SymbolRole,
};

/// Thin handle over a [`Database`]; all query methods open their own
/// short-lived read transaction (§5: "Query calls are synchronous; they
/// acquire a read transaction... otherwise never block on writers").
#[derive(Clone)]
pub struct SymbolIndex {
    db: Database,
}

impl SymbolIndex {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Imports one provider's symbol data into the store within the given
    /// write transaction (§4.5, steps 1-4). Callers batch many providers
    /// per unit into one transaction per §4.8. `unit_code` is the owning
    /// unit's code, needed to key the `provider-files` entry written in
    /// step 3.
    pub fn import_symbols(
        &self,
        txn: &mut WriteTxn<'_>,
        provider: &dyn SymbolDataProvider,
        unit_code: IDCode,
    ) -> StoreResult<()> {
        let provider_code = IDCode::of(provider.identifier());
        let tables = txn.tables().clone();

        tables.providers.put(&mut txn.txn, &code_to_bytes(provider_code), provider.identifier().as_bytes())?;

        // Step 3: this provider's one file (§4.4's `ProviderLocationContext`
        // is constant across every occurrence) gets a `provider-files` row.
        let location = provider.location();
        let file_code = intern_file_path(&tables, &mut txn.txn, &location.file_path)?;
        let sysroot_code = match &location.sysroot {
            Some(sysroot) => Some(intern_file_path(&tables, &mut txn.txn, sysroot)?),
            None => None,
        };
        let module_name_code = match &location.module_name {
            Some(module_name) => {
                let code = IDCode::of(module_name);
                tables.module_names.put(&mut txn.txn, &code_to_bytes(code), module_name.as_bytes())?;
                Some(code)
            }
            None => None,
        };
        let entry = ProviderFileEntry {
            mtime: location.mtime,
            sysroot_code,
            is_system: provider.is_system(),
            module_name_code,
        };
        tables.provider_files.put(
            &mut txn.txn,
            &triple_key(provider_code, file_code, unit_code),
            &encode_provider_file_entry(&entry),
        )?;

        let mut has_test_symbols = false;
        let mut collect_err: Option<crate::error::StoreError> = None;

        provider.foreach_core_symbol_data(&mut |data| {
            if collect_err.is_some() {
                return crate::provider::Visit::Stop;
            }
            let usr_code = IDCode::of(&data.usr);

            let is_new_usr = tables
                .usrs
                .get(&txn.txn, &pair_key(usr_code, provider_code))
                .map(|v| v.is_none())
                .unwrap_or(true);

            let row = UsrRow { roles: data.roles, related_roles: data.related_roles };
            macro_rules! try_put {
                ($expr:expr) => {
                    if let Err(err) = $expr {
                        collect_err = Some(err.into());
                        return crate::provider::Visit::Stop;
                    }
                };
            }

            try_put!(tables.usrs.put(&mut txn.txn, &pair_key(usr_code, provider_code), &encode_usr_row(row)));
            try_put!(tables.usrs_by_code.put(&mut txn.txn, &code_to_bytes(usr_code), data.usr.as_bytes()));
            try_put!(tables.symbol_info.put(
                &mut txn.txn,
                &code_to_bytes(usr_code),
                &encode_symbol_info_entry(&data.name, data.info),
            ));

            if is_new_usr {
                let name_hash = IDCode::of(&data.name);
                try_put!(tables.symbol_names.put(&mut txn.txn, &pair_key(name_hash, usr_code), &[]));
                try_put!(tables.names_by_code.put(&mut txn.txn, &code_to_bytes(name_hash), data.name.as_bytes()));

                if let Some(global_kind) = data.info.kind.global_kind() {
                    try_put!(tables.symbol_kinds.put(&mut txn.txn, &kind_key(global_kind.to_u8(), usr_code), &[]));
                }
            }

            if data.info.properties.contains(SymbolProperty::UNIT_TEST) {
                has_test_symbols = true;
            }

            crate::provider::Visit::Continue
        });

        if let Some(err) = collect_err {
            return Err(err);
        }

        if has_test_symbols {
            tables.providers_with_test_symbols.put(&mut txn.txn, &code_to_bytes(provider_code), &[])?;
        }

        Ok(())
    }

    /// `occurrencesByUSR(usr, roleSet)` (§4.5, §8 round-trip property).
    pub fn occurrences_by_usr(&self, usr: &str, role_set: SymbolRole) -> StoreResult<Vec<SymbolOccurrenceRef>> {
        let usr_code = IDCode::of(usr);
        let rtxn = self.db.read_txn()?;
        let tables = rtxn.tables();

        let mut out = Vec::new();
        let prefix = code_to_bytes(usr_code);
        let mut iter = tables.usrs.prefix_iter(&rtxn.txn, &prefix)?;
        while let Some(entry) = iter.next() {
            let (key, value) = entry?;
            let (_usr, provider_code) = split_pair_key(key);
            let row = decode_usr_row(value);
            if !row.roles.intersects(role_set) && role_set != SymbolRole::empty() {
                continue;
            }
            out.push(SymbolOccurrenceRef { usr_code, provider_code, roles: row.roles });
        }
        Ok(out)
    }

    /// `canonicalOccurrencesByUSR(usr)` (§4.5 canonical selection, §8
    /// canonical-uniqueness property): at most one occurrence, chosen
    /// among Declaration/Definition candidates by `preferDeclarationAsCanonical`.
    pub fn canonical_occurrences_by_usr(&self, usr: &str) -> StoreResult<Option<SymbolOccurrenceRef>> {
        Ok(self.resolve_canonical(usr)?.map(|(mut c, _wanted)| {
            c.roles |= SymbolRole::CANONICAL;
            c
        }))
    }

    /// Shared canonical-selection rule behind `canonical_occurrences_by_usr`
    /// and the full-occurrence queries: the chosen coarse occurrence
    /// reference (without the `CANONICAL` bit set) plus the role
    /// (`DECLARATION` or `DEFINITION`) that made it the winner, so full-
    /// occurrence materialization can mark the matching individual
    /// occurrence rather than just the provider-level aggregate.
    pub(crate) fn resolve_canonical(&self, usr: &str) -> StoreResult<Option<(SymbolOccurrenceRef, SymbolRole)>> {
        let candidates = self.occurrences_by_usr(usr, SymbolRole::DECL_OR_DEF)?;
        if candidates.is_empty() {
            return Ok(None);
        }

        let info = self.symbol_info(IDCode::of(usr))?;
        let prefer_decl = info.map(|(_, i)| i.kind.prefer_declaration_as_canonical()).unwrap_or(false);
        let wanted = if prefer_decl { SymbolRole::DECLARATION } else { SymbolRole::DEFINITION };

        let chosen = candidates
            .iter()
            .find(|c| c.roles.contains(wanted))
            .or_else(|| candidates.first())
            .cloned();

        Ok(chosen.map(|c| (c, wanted)))
    }

    /// `usr code -> (name, info)` lookup via the `symbol-info` sidecar
    /// table, the only place a USR's kind can be recovered without
    /// re-reading a provider's record.
    pub fn symbol_info(&self, usr_code: IDCode) -> StoreResult<Option<(Box<str>, SymbolInfo)>> {
        let rtxn = self.db.read_txn()?;
        let value = rtxn.tables().symbol_info.get(&rtxn.txn, &code_to_bytes(usr_code))?;
        Ok(value.map(decode_symbol_info_entry))
    }

    /// `name → usrs` lookup, the basis for pattern queries (§4.5).
    pub fn usrs_with_name_hash(&self, name_hash: IDCode) -> StoreResult<Vec<IDCode>> {
        let rtxn = self.db.read_txn()?;
        let tables = rtxn.tables();
        let mut out = Vec::new();
        let mut iter = tables.symbol_names.prefix_iter(&rtxn.txn, &code_to_bytes(name_hash))?;
        while let Some(entry) = iter.next() {
            let (key, _) = entry?;
            let (_hash, usr_code) = split_pair_key(key);
            out.push(usr_code);
        }
        Ok(out)
    }

    /// `canonicalOccurrencesContaining(pattern, ...)` (§4.5, §8 scenario 2):
    /// full scan of `names-by-code`, filtered by [`matches_pattern`], then
    /// canonicalized per USR.
    pub fn canonical_occurrences_containing(
        &self,
        pattern: &str,
        anchor_start: bool,
        anchor_end: bool,
        subsequence: bool,
        ignore_case: bool,
    ) -> StoreResult<Vec<(Box<str>, SymbolOccurrenceRef)>> {
        let rtxn = self.db.read_txn()?;
        let tables = rtxn.tables();

        let mut matching_names = Vec::new();
        let mut iter = tables.names_by_code.iter(&rtxn.txn)?;
        while let Some(entry) = iter.next() {
            let (key, value) = entry?;
            let name = crate::storage::codec::bytes_to_str(value);
            if matches_pattern(name, pattern, anchor_start, anchor_end, subsequence, ignore_case) {
                matching_names.push(bytes_to_code(key));
            }
        }
        drop(iter);
        drop(rtxn);

        let mut out = Vec::new();
        for name_hash in matching_names {
            for usr_code in self.usrs_with_name_hash(name_hash)? {
                if let Some((usr, info)) = self.symbol_info(usr_code)? {
                    if let Some(occ) = self.canonical_occurrences_by_usr(&usr)? {
                        let _ = info;
                        out.push((usr, occ));
                    }
                }
            }
        }
        Ok(out)
    }

    /// Enumerates USRs for a [`GlobalSymbolKind`] (§4.5 `symbol-kinds`).
    pub fn usrs_with_global_kind(&self, kind: GlobalSymbolKind) -> StoreResult<Vec<IDCode>> {
        let rtxn = self.db.read_txn()?;
        let tables = rtxn.tables();
        let mut out = Vec::new();
        let mut iter = tables.symbol_kinds.prefix_iter(&rtxn.txn, &[kind.to_u8()])?;
        while let Some(entry) = iter.next() {
            let (key, _) = entry?;
            let (_kind, usr_code) = split_kind_key(key);
            out.push(usr_code);
        }
        Ok(out)
    }

    /// Full `occurrencesByUSR(usr, roleSet)`: resolves candidate providers
    /// via [`Self::occurrences_by_usr`], then re-opens each one's record
    /// through `reader` to recover the line/column/relation data the
    /// `usrs` table doesn't carry (it's provider-granular, not
    /// occurrence-granular). A provider whose record can't be read is
    /// logged and skipped rather than failing the whole call, matching
    /// the same best-effort posture import uses for unreadable records.
    pub fn full_occurrences_by_usr(
        &self,
        usr: &str,
        role_set: SymbolRole,
        reader: &Arc<dyn RawIndexReader>,
    ) -> StoreResult<Vec<SymbolOccurrence>> {
        let canonical = self.resolve_canonical(usr)?;
        let mut out = Vec::new();
        for occ_ref in self.occurrences_by_usr(usr, role_set)? {
            out.extend(self.materialize_provider_occurrences(
                usr,
                occ_ref.provider_code,
                role_set,
                reader,
                canonical.as_ref(),
            )?);
        }
        Ok(out)
    }

    /// Full-location variant of [`Self::canonical_occurrences_by_usr`]:
    /// the same canonical-selection rule, but re-reading the winning
    /// provider's record for a complete [`SymbolOccurrence`], with the
    /// `CANONICAL` bit set on the returned occurrence.
    pub fn full_canonical_occurrence_by_usr(
        &self,
        usr: &str,
        reader: &Arc<dyn RawIndexReader>,
    ) -> StoreResult<Option<SymbolOccurrence>> {
        let Some((canonical, wanted)) = self.resolve_canonical(usr)? else {
            return Ok(None);
        };
        let mut occs = self.materialize_provider_occurrences(
            usr,
            canonical.provider_code,
            SymbolRole::empty(),
            reader,
            Some(&(canonical, wanted)),
        )?;
        let canonical_index = occs.iter().position(|o| o.roles.contains(SymbolRole::CANONICAL));
        Ok(match canonical_index {
            Some(i) => Some(occs.swap_remove(i)),
            None => occs.into_iter().next(),
        })
    }

    /// `occurrencesRelatedToUSR(usr, roleSet)`: occurrences elsewhere in
    /// the store that carry a relation back to `usr` with roles
    /// overlapping `role_set`. The table set has no relation index, and
    /// a relation is only visible by re-reading the record that contains
    /// it, so this scans every known provider and asks each one directly
    /// via `foreach_related_symbol_occurrence_by_usr`. Callers querying
    /// this at corpus scale should expect it to be the slowest operation
    /// in this module.
    pub fn occurrences_related_to_usr(
        &self,
        usr: &str,
        role_set: SymbolRole,
        reader: &Arc<dyn RawIndexReader>,
    ) -> StoreResult<Vec<SymbolOccurrence>> {
        let effective_roles = if role_set.is_empty() { SymbolRole::all() } else { role_set };

        let mut out = Vec::new();
        for provider_code in self.provider_codes()? {
            out.extend(self.materialize_related_provider_occurrences(usr, provider_code, effective_roles, reader)?);
        }
        Ok(out)
    }

    /// Every interned provider code, the basis for full-scan queries like
    /// [`Self::occurrences_related_to_usr`] that have no index to narrow
    /// the search.
    pub(crate) fn provider_codes(&self) -> StoreResult<Vec<IDCode>> {
        let rtxn = self.db.read_txn()?;
        let tables = rtxn.tables();
        let mut out = Vec::new();
        let mut iter = tables.providers.iter(&rtxn.txn)?;
        while let Some(entry) = iter.next() {
            let (key, _) = entry?;
            out.push(bytes_to_code(key));
        }
        Ok(out)
    }

    /// Shared provider-metadata resolution used by every full-occurrence
    /// query: given a provider code, reloads its provider-files rows
    /// (path, module, sysroot, owning unit's provider kind/target) so the
    /// caller can open a [`StoreSymbolRecord`] and reconstruct
    /// `Location`/`SymbolOccurrence` values from it.
    fn provider_usages(&self, provider_code: IDCode) -> StoreResult<Option<(Box<str>, Vec<ProviderUsage>)>> {
        let rtxn = self.db.read_txn()?;
        let tables = rtxn.tables();

        let Some(name_bytes) = tables.providers.get(&rtxn.txn, &code_to_bytes(provider_code))? else {
            return Ok(None);
        };
        let provider_name: Box<str> = bytes_to_str(name_bytes).into();

        let mut usages = Vec::new();
        let mut iter = tables.provider_files.prefix_iter(&rtxn.txn, &code_to_bytes(provider_code))?;
        while let Some(entry) = iter.next() {
            let (key, value) = entry?;
            let (_provider, file_code, unit_code) = split_triple_key(key);
            let Some(path_bytes) = tables.filenames.get(&rtxn.txn, &code_to_bytes(file_code))? else { continue };
            let file_entry = decode_provider_file_entry(value);

            let module_name = match file_entry.module_name_code {
                Some(code) => {
                    tables.module_names.get(&rtxn.txn, &code_to_bytes(code))?.map(|b| Box::from(bytes_to_str(b)))
                }
                None => None,
            };
            let sysroot = match file_entry.sysroot_code {
                Some(code) => {
                    tables.filenames.get(&rtxn.txn, &code_to_bytes(code))?.map(|b| PathBuf::from(bytes_to_str(b)))
                }
                None => None,
            };
            let (provider_kind, target) = match tables.unit_info.get(&rtxn.txn, &code_to_bytes(unit_code))? {
                Some(raw) => {
                    let info = decode_unit_info(raw);
                    let target = match info.target_code {
                        Some(code) => tables
                            .target_names
                            .get(&rtxn.txn, &code_to_bytes(code))?
                            .map(|b| Box::from(bytes_to_str(b))),
                        None => None,
                    };
                    (info.provider_kind, target)
                }
                None => (ProviderKind::Clang, None),
            };

            usages.push(ProviderUsage {
                path: PathBuf::from(bytes_to_str(path_bytes)),
                module_name,
                mtime: file_entry.mtime,
                sysroot,
                is_system: file_entry.is_system,
                provider_kind,
                target,
            });
        }

        Ok(Some((provider_name, usages)))
    }

    fn open_record(&self, provider_name: &str, usage: &ProviderUsage, reader: &Arc<dyn RawIndexReader>) -> StoreSymbolRecord {
        let location_ctx = ProviderLocationContext {
            file_path: CanonicalFilePathRef::from(usage.path.as_path()),
            module_name: usage.module_name.clone(),
            mtime: usage.mtime,
            sysroot: usage.sysroot.clone(),
        };
        StoreSymbolRecord::new(provider_name, usage.is_system, location_ctx, Arc::clone(reader))
    }

    fn resolve_relations(&self, relations: &[(SymbolRole, Box<str>)]) -> StoreResult<Vec<SymbolRelation>> {
        let mut out = Vec::new();
        for (roles, related_usr) in relations {
            if let Some((name, info)) = self.symbol_info(IDCode::of(related_usr))? {
                out.push(SymbolRelation { roles: *roles, symbol: Symbol { usr: related_usr.clone(), name, info } });
            }
        }
        Ok(out)
    }

    /// `canonical`, when given, is `(the SymbolIndex-wide canonical
    /// occurrence reference, the role that made it the winner)` from
    /// [`Self::resolve_canonical`]. The first materialized occurrence for
    /// `usr` under a matching provider whose roles contain that role gets
    /// `SymbolRole::CANONICAL` OR'd in, so full-location queries surface the
    /// same `{Definition,Canonical}`/`{Declaration,Canonical}` pairing the
    /// coarse `canonical_occurrences_by_usr` query already reports.
    pub(crate) fn materialize_provider_occurrences(
        &self,
        usr: &str,
        provider_code: IDCode,
        role_set: SymbolRole,
        reader: &Arc<dyn RawIndexReader>,
        canonical: Option<&(SymbolOccurrenceRef, SymbolRole)>,
    ) -> StoreResult<Vec<SymbolOccurrence>> {
        let Some((provider_name, usages)) = self.provider_usages(provider_code)? else {
            return Ok(Vec::new());
        };
        let effective_roles = if role_set.is_empty() { SymbolRole::all() } else { role_set };
        let Some((name, info)) = self.symbol_info(IDCode::of(usr))? else {
            return Ok(Vec::new());
        };
        let wanted_role = canonical.filter(|(c, _)| c.provider_code == provider_code).map(|(_, wanted)| *wanted);
        let mut canonical_marked = false;

        let mut out = Vec::new();
        for usage in &usages {
            let record = self.open_record(&provider_name, usage, reader);
            if let Err(err) = record.ensure_loaded() {
                tracing::warn!(provider = %provider_name, error = %err, "skipping unreadable record during query");
                continue;
            }

            let mut provider_occs = Vec::new();
            record.foreach_symbol_occurrence_by_usr(&[usr], effective_roles, &mut |occ| {
                provider_occs.push(occ.clone());
                Visit::Continue
            });

            for occ in provider_occs {
                let relations = self.resolve_relations(&occ.relations)?;
                let mut roles = occ.roles;
                if !canonical_marked {
                    if let Some(wanted) = wanted_role {
                        if roles.contains(wanted) {
                            roles |= SymbolRole::CANONICAL;
                            canonical_marked = true;
                        }
                    }
                }
                out.push(SymbolOccurrence {
                    symbol: Symbol { usr: usr.into(), name: name.clone(), info },
                    roles,
                    location: Location {
                        path: usage.path.clone(),
                        module_name: usage.module_name.clone(),
                        mtime: usage.mtime,
                        is_system: usage.is_system,
                        sysroot: usage.sysroot.clone(),
                        line: occ.line,
                        column: occ.column,
                    },
                    provider_kind: usage.provider_kind,
                    target: usage.target.clone(),
                    relations,
                });
            }
        }
        Ok(out)
    }

    pub(crate) fn materialize_related_provider_occurrences(
        &self,
        usr: &str,
        provider_code: IDCode,
        role_set: SymbolRole,
        reader: &Arc<dyn RawIndexReader>,
    ) -> StoreResult<Vec<SymbolOccurrence>> {
        let Some((provider_name, usages)) = self.provider_usages(provider_code)? else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        for usage in &usages {
            let record = self.open_record(&provider_name, usage, reader);
            if let Err(err) = record.ensure_loaded() {
                tracing::warn!(provider = %provider_name, error = %err, "skipping unreadable record during query");
                continue;
            }

            let mut provider_occs = Vec::new();
            record.foreach_related_symbol_occurrence_by_usr(&[usr], role_set, &mut |occ| {
                provider_occs.push(occ.clone());
                Visit::Continue
            });

            for occ in provider_occs {
                let Some((name, info)) = self.symbol_info(IDCode::of(&occ.usr))? else { continue };
                let relations = self.resolve_relations(&occ.relations)?;
                out.push(SymbolOccurrence {
                    symbol: Symbol { usr: occ.usr.clone(), name, info },
                    roles: occ.roles,
                    location: Location {
                        path: usage.path.clone(),
                        module_name: usage.module_name.clone(),
                        mtime: usage.mtime,
                        is_system: usage.is_system,
                        sysroot: usage.sysroot.clone(),
                        line: occ.line,
                        column: occ.column,
                    },
                    provider_kind: usage.provider_kind,
                    target: usage.target.clone(),
                    relations,
                });
            }
        }
        Ok(out)
    }
}

/// Resolved per-provider-file metadata needed to reconstruct a
/// [`Location`] and reopen a [`StoreSymbolRecord`] at query time.
struct ProviderUsage {
    path: PathBuf,
    module_name: Option<Box<str>>,
    mtime: i64,
    sysroot: Option<PathBuf>,
    is_system: bool,
    provider_kind: ProviderKind,
    target: Option<Box<str>>,
}

/// A resolved occurrence reference: enough to look up the full
/// [`SymbolOccurrence`] (name, location, relations) via the owning
/// provider, without re-materializing it eagerly on every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolOccurrenceRef {
    pub usr_code: IDCode,
    pub provider_code: IDCode,
    pub roles: SymbolRole,
}

/// Assembles a full [`SymbolOccurrence`] for display/consumption. Kept as
/// a free function (rather than a method pulling in the raw reader) so
/// callers choose how they source provider data: directly from a
/// still-open provider during import, or by re-reading the record file by
/// name via `providers[provider_code]` at query time.
pub fn build_symbol_occurrence(
    symbol: Symbol,
    location: Location,
    roles: SymbolRole,
    provider_kind: crate::types::ProviderKind,
    target: Option<Box<str>>,
    relations: Vec<SymbolRelation>,
) -> SymbolOccurrence {
    SymbolOccurrence { symbol, roles, location, provider_kind, target, relations }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path_cache::CanonicalFilePathRef;
    use crate::provider::{CoreSymbolData, ProviderLocationContext, ProviderOccurrence, Visit};
    use crate::types::{Language, SymbolKind};
    use std::path::Path;
    use std::sync::Arc;

    struct FakeProvider {
        identifier: Box<str>,
        is_system: bool,
        location: ProviderLocationContext,
        symbols: Vec<CoreSymbolData>,
        occurrences: Vec<ProviderOccurrence>,
    }

    impl SymbolDataProvider for FakeProvider {
        fn identifier(&self) -> &str {
            &self.identifier
        }
        fn is_system(&self) -> bool {
            self.is_system
        }
        fn location(&self) -> &ProviderLocationContext {
            &self.location
        }
        fn foreach_core_symbol_data(&self, visitor: &mut dyn FnMut(&CoreSymbolData) -> Visit) {
            for s in &self.symbols {
                if visitor(s).should_stop() {
                    return;
                }
            }
        }
        fn foreach_symbol_occurrence(&self, visitor: &mut dyn FnMut(&ProviderOccurrence) -> Visit) {
            for o in &self.occurrences {
                if visitor(o).should_stop() {
                    return;
                }
            }
        }
    }

    fn test_location() -> ProviderLocationContext {
        ProviderLocationContext {
            file_path: CanonicalFilePathRef::from(Path::new("/repo/main.swift")),
            module_name: Some("main".into()),
            mtime: 1,
            sysroot: None,
        }
    }

    fn function_symbol(usr: &str, name: &str, roles: SymbolRole) -> CoreSymbolData {
        CoreSymbolData {
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
        }
    }

    #[test]
    fn import_then_query_roundtrips_usr() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path(), None).unwrap();
        let index = SymbolIndex::new(db.clone());

        let provider = FakeProvider {
            identifier: "main.swift.record".into(),
            is_system: false,
            location: test_location(),
            symbols: vec![function_symbol("s:4main1cyyF", "c", SymbolRole::DEFINITION)],
            occurrences: vec![],
        };

        {
            let mut wtxn = db.write_txn().unwrap();
            index.import_symbols(&mut wtxn, &provider, IDCode::of("u1")).unwrap();
            wtxn.commit().unwrap();
        }

        let occs = index.occurrences_by_usr("s:4main1cyyF", SymbolRole::empty()).unwrap();
        assert_eq!(occs.len(), 1);
        assert!(occs[0].roles.contains(SymbolRole::DEFINITION));

        let info = index.symbol_info(IDCode::of("s:4main1cyyF")).unwrap().unwrap();
        assert_eq!(&*info.0, "c");
    }

    #[test]
    fn canonical_occurrence_prefers_definition_for_functions() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path(), None).unwrap();
        let index = SymbolIndex::new(db.clone());

        let provider = FakeProvider {
            identifier: "p1".into(),
            is_system: false,
            location: test_location(),
            symbols: vec![function_symbol("s:decl", "f", SymbolRole::DECLARATION)],
            occurrences: vec![],
        };
        let provider2 = FakeProvider {
            identifier: "p2".into(),
            is_system: false,
            location: test_location(),
            symbols: vec![function_symbol("s:decl", "f", SymbolRole::DEFINITION)],
            occurrences: vec![],
        };

        {
            let mut wtxn = db.write_txn().unwrap();
            index.import_symbols(&mut wtxn, &provider, IDCode::of("u1")).unwrap();
            index.import_symbols(&mut wtxn, &provider2, IDCode::of("u1")).unwrap();
            wtxn.commit().unwrap();
        }

        let canonical = index.canonical_occurrences_by_usr("s:decl").unwrap().unwrap();
        assert!(canonical.roles.contains(SymbolRole::DEFINITION));
        assert!(canonical.roles.contains(SymbolRole::CANONICAL));
    }

    #[test]
    fn reimport_updates_roles_without_duplicating_provider_row() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path(), None).unwrap();
        let index = SymbolIndex::new(db.clone());

        let v1 = FakeProvider {
            identifier: "p".into(),
            is_system: false,
            location: test_location(),
            symbols: vec![function_symbol("s:x", "x", SymbolRole::DECLARATION)],
            occurrences: vec![],
        };
        {
            let mut wtxn = db.write_txn().unwrap();
            index.import_symbols(&mut wtxn, &v1, IDCode::of("u1")).unwrap();
            wtxn.commit().unwrap();
        }

        let v2 = FakeProvider {
            identifier: "p".into(),
            is_system: false,
            location: test_location(),
            symbols: vec![function_symbol("s:x", "x", SymbolRole::DEFINITION)],
            occurrences: vec![],
        };
        {
            let mut wtxn = db.write_txn().unwrap();
            index.import_symbols(&mut wtxn, &v2, IDCode::of("u1")).unwrap();
            wtxn.commit().unwrap();
        }

        let occs = index.occurrences_by_usr("s:x", SymbolRole::empty()).unwrap();
        assert_eq!(occs.len(), 1, "re-import must update in place, not duplicate");
        assert!(occs[0].roles.contains(SymbolRole::DEFINITION));
        assert!(!occs[0].roles.contains(SymbolRole::DECLARATION));
    }
}
