//! `StoreSymbolRecord`: the lazy concrete provider over one record file
//! from the raw index store. It opens (reads) the file on first
//! use, is identified by the raw record name, and is flagged `isSystem`
//! based on the owning unit rather than anything in the record itself.

use std::sync::{Arc, OnceLock};

use crate::error::IngestError;

use super::reader::RawIndexReader;
use super::{CoreSymbolData, ProviderLocationContext, ProviderOccurrence, SymbolDataProvider, Visit};

pub struct StoreSymbolRecord {
    record_name: Box<str>,
    is_system: bool,
    location: ProviderLocationContext,
    reader: Arc<dyn RawIndexReader>,
    entries: OnceLock<Vec<super::RawSymbolEntry>>,
}

impl StoreSymbolRecord {
    pub fn new(
        record_name: impl Into<Box<str>>,
        is_system: bool,
        location: ProviderLocationContext,
        reader: Arc<dyn RawIndexReader>,
    ) -> Self {
        Self { record_name: record_name.into(), is_system, location, reader, entries: OnceLock::new() }
    }

    /// Reads the record file on first call; subsequent calls reuse the
    /// cached result. A read failure here means the ingestion worker logs
    /// and skips this provider entirely, since it is not wired through the
    /// `SymbolDataProvider` trait's infallible iteration API.
    pub fn ensure_loaded(&self) -> Result<(), IngestError> {
        if self.entries.get().is_some() {
            return Ok(());
        }
        let entries = self.reader.read_record(&self.record_name)?;
        let _ = self.entries.set(entries);
        Ok(())
    }

    fn entries(&self) -> &[super::RawSymbolEntry] {
        self.entries.get().map(Vec::as_slice).unwrap_or(&[])
    }
}

impl SymbolDataProvider for StoreSymbolRecord {
    fn identifier(&self) -> &str {
        &self.record_name
    }

    fn is_system(&self) -> bool {
        self.is_system
    }

    fn location(&self) -> &ProviderLocationContext {
        &self.location
    }

    fn foreach_core_symbol_data(&self, visitor: &mut dyn FnMut(&CoreSymbolData) -> Visit) {
        for entry in self.entries() {
            let data = CoreSymbolData {
                usr: entry.usr.as_str().into(),
                name: entry.name.as_str().into(),
                info: entry.info,
                roles: entry.roles,
                related_roles: entry.related_roles,
            };
            if visitor(&data).should_stop() {
                return;
            }
        }
    }

    fn foreach_symbol_occurrence(&self, visitor: &mut dyn FnMut(&ProviderOccurrence) -> Visit) {
        for entry in self.entries() {
            for occ in &entry.occurrences {
                let relations =
                    occ.relations.iter().map(|r| (r.roles, r.usr.as_str().into())).collect::<Vec<(_, Box<str>)>>();
                let provider_occ = ProviderOccurrence {
                    usr: entry.usr.as_str().into(),
                    roles: occ.roles,
                    line: occ.line,
                    column: occ.column,
                    relations,
                };
                if visitor(&provider_occ).should_stop() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::reader::{RawOccurrence, RawRelation, RawSymbolEntry};
    use crate::types::{Language, SymbolInfo, SymbolKind, SymbolProperty, SymbolRole};
    use std::path::Path;
    use std::sync::Arc as StdArc;

    fn sample_location() -> ProviderLocationContext {
        ProviderLocationContext {
            file_path: StdArc::from(Path::new("/repo/main.swift")),
            module_name: Some("main".into()),
            mtime: 1000,
            sysroot: None,
        }
    }

    struct FakeReader {
        entries: Vec<RawSymbolEntry>,
    }

    impl RawIndexReader for FakeReader {
        fn list_units(&self) -> Result<Vec<String>, IngestError> {
            Ok(vec![])
        }
        fn read_unit(&self, _unit_name: &str) -> Result<super::super::RawUnitInfo, IngestError> {
            unimplemented!("not exercised by this test")
        }
        fn read_record(&self, _record_name: &str) -> Result<Vec<RawSymbolEntry>, IngestError> {
            Ok(self.entries.clone())
        }
    }

    fn sample_entry() -> RawSymbolEntry {
        RawSymbolEntry {
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
            occurrences: vec![RawOccurrence {
                roles: SymbolRole::DEFINITION,
                line: 3,
                column: 6,
                relations: vec![RawRelation { roles: SymbolRole::RELATION_CALLED_BY, usr: "s:4main1ayyF".into() }],
            }],
        }
    }

    #[test]
    fn loads_lazily_and_caches() {
        let reader = Arc::new(FakeReader { entries: vec![sample_entry()] });
        let record = StoreSymbolRecord::new("main.swift.record", false, sample_location(), reader);

        let mut seen = Vec::new();
        record.foreach_core_symbol_data(&mut |data| {
            seen.push(data.usr.clone());
            Visit::Continue
        });
        assert!(seen.is_empty(), "entries should be empty before ensure_loaded");

        record.ensure_loaded().unwrap();
        record.foreach_core_symbol_data(&mut |data| {
            seen.push(data.usr.clone());
            Visit::Continue
        });
        assert_eq!(seen.len(), 1);
        assert_eq!(&*seen[0], "s:4main1cyyF");
    }

    #[test]
    fn visitor_stop_short_circuits() {
        let reader = Arc::new(FakeReader { entries: vec![sample_entry(), sample_entry()] });
        let record = StoreSymbolRecord::new("r", false, sample_location(), reader);
        record.ensure_loaded().unwrap();

        let mut count = 0;
        record.foreach_core_symbol_data(&mut |_| {
            count += 1;
            Visit::Stop
        });
        assert_eq!(count, 1);
    }
}
