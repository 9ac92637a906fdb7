//! The raw-index reader contract: an abstract producer that, given a
//! unit name, yields unit metadata + dependencies, and given a record
//! name, yields occurrence records. The real upstream format is produced
//! by clang/swiftc and stays out of scope; this module defines the
//! trait boundary plus one concrete adapter, [`FilesystemIndexReader`],
//! over a small documented JSON layout used by this crate's own fixtures
//! and tests.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::types::{ProviderKind, SymbolInfo, SymbolRole};

/// One dependency edge out of a unit, as yielded by `readUnit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawUnitDependency {
    pub kind: RawDependencyKind,
    pub name: String,
    pub module_name: Option<String>,
    pub is_system: bool,
    pub line: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawDependencyKind {
    Unit,
    Record,
    File,
}

/// `readUnit(unitName)` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawUnitInfo {
    pub main_file: Option<String>,
    pub output_file: String,
    pub module_name: Option<String>,
    pub target: Option<String>,
    pub sysroot: Option<String>,
    pub provider_kind: ProviderKind,
    pub is_system: bool,
    pub mtime: i64,
    pub deps: Vec<RawUnitDependency>,
}

/// One relation entry inside a raw occurrence: the related roles plus the
/// USR of the symbol it relates to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRelation {
    pub roles: SymbolRole,
    pub usr: String,
}

/// One occurrence inside a raw record: `occurrences:[(roles, line,
/// column, relations)]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOccurrence {
    pub roles: SymbolRole,
    pub line: u32,
    pub column: u32,
    pub relations: Vec<RawRelation>,
}

/// One symbol entry inside a raw record, as yielded by `readRecord`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSymbolEntry {
    pub usr: String,
    pub name: String,
    pub info: SymbolInfo,
    pub roles: SymbolRole,
    pub related_roles: SymbolRole,
    pub occurrences: Vec<RawOccurrence>,
}

/// The abstract raw-index reader. One concrete adapter
/// ([`FilesystemIndexReader`]) ships with this crate; a test fake living
/// at the call site is the other intended implementation, so `dyn
/// RawIndexReader` is expected to have exactly those two kinds of users.
pub trait RawIndexReader: Send + Sync {
    fn list_units(&self) -> Result<Vec<String>, IngestError>;
    fn read_unit(&self, unit_name: &str) -> Result<RawUnitInfo, IngestError>;
    fn read_record(&self, record_name: &str) -> Result<Vec<RawSymbolEntry>, IngestError>;

    /// Optional push channel for newly available units. Default: no
    /// subscription (callers rely on `pollForUnitChangesAndWait` instead).
    fn subscribe_unit_events(&self, _handler: Box<dyn Fn(Vec<String>) + Send + Sync>) {}
}

/// Reads units and records from `<storePath>/units/<name>.json` and
/// `<storePath>/records/<name>.json`. This is a fixture format for this
/// crate's own tests, not the real clang/swiftc on-disk layout.
pub struct FilesystemIndexReader {
    store_path: PathBuf,
}

impl FilesystemIndexReader {
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self { store_path: store_path.into() }
    }

    fn units_dir(&self) -> PathBuf {
        self.store_path.join("units")
    }

    fn records_dir(&self) -> PathBuf {
        self.store_path.join("records")
    }
}

impl RawIndexReader for FilesystemIndexReader {
    fn list_units(&self) -> Result<Vec<String>, IngestError> {
        let dir = self.units_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(IngestError::UnitReadFailed {
                    unit: dir.display().to_string(),
                    reason: err.to_string(),
                });
            }
        };

        let mut units = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    units.push(stem.to_string());
                }
            }
        }
        units.sort();
        Ok(units)
    }

    fn read_unit(&self, unit_name: &str) -> Result<RawUnitInfo, IngestError> {
        let path = unit_path(&self.units_dir(), unit_name);
        let text = fs::read_to_string(&path).map_err(|err| IngestError::UnitReadFailed {
            unit: unit_name.to_string(),
            reason: err.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|err| IngestError::UnitReadFailed {
            unit: unit_name.to_string(),
            reason: err.to_string(),
        })
    }

    fn read_record(&self, record_name: &str) -> Result<Vec<RawSymbolEntry>, IngestError> {
        let path = unit_path(&self.records_dir(), record_name);
        let text = fs::read_to_string(&path).map_err(|err| IngestError::RecordReadFailed {
            record: record_name.to_string(),
            reason: err.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|err| IngestError::RecordReadFailed {
            record: record_name.to_string(),
            reason: err.to_string(),
        })
    }
}

fn unit_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_units_is_empty_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let reader = FilesystemIndexReader::new(dir.path());
        assert!(reader.list_units().unwrap().is_empty());
    }

    #[test]
    fn read_unit_roundtrips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let units_dir = dir.path().join("units");
        std::fs::create_dir_all(&units_dir).unwrap();

        let info = RawUnitInfo {
            main_file: Some("main.swift".into()),
            output_file: "main.o".into(),
            module_name: Some("main".into()),
            target: Some("x86_64-apple-macosx".into()),
            sysroot: None,
            provider_kind: ProviderKind::Swift,
            is_system: false,
            mtime: 100,
            deps: vec![RawUnitDependency {
                kind: RawDependencyKind::Record,
                name: "main.swift.record".into(),
                module_name: None,
                is_system: false,
                line: None,
            }],
        };
        std::fs::write(units_dir.join("main.swift.o.json"), serde_json::to_string(&info).unwrap()).unwrap();

        let reader = FilesystemIndexReader::new(dir.path());
        assert_eq!(reader.list_units().unwrap(), vec!["main.swift.o".to_string()]);
        let read_back = reader.read_unit("main.swift.o").unwrap();
        assert_eq!(read_back.output_file, "main.o");
        assert_eq!(read_back.deps.len(), 1);
    }

    #[test]
    fn read_unit_missing_file_is_an_ingest_error() {
        let dir = tempfile::tempdir().unwrap();
        let reader = FilesystemIndexReader::new(dir.path());
        assert!(reader.read_unit("missing").is_err());
    }
}
