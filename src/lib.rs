pub mod config;
pub mod error;
pub mod file_index;
pub mod ingest;
pub mod logging;
pub mod path_cache;
pub mod provider;
pub mod storage;
pub mod symbol;
pub mod system;
pub mod types;
pub mod visibility;

pub use config::Settings;
pub use error::{IndexSystemError, IndexSystemResult, IngestError, IngestResult, StoreError, StoreResult};
pub use file_index::FilePathIndex;
pub use ingest::{IndexDatastore, IndexDatastoreOptions, IndexDelegate, StoreUnitInfo, UnitState};
pub use provider::{FilesystemIndexReader, RawIndexReader};
pub use storage::{Database, DatabaseRegistry};
pub use symbol::{SymbolIndex, SymbolOccurrenceRef};
pub use system::{CreationOptions, IndexSystem};
pub use types::{
    GlobalSymbolKind, IDCode, Language, Location, ProviderKind, Symbol, SymbolInfo, SymbolKind, SymbolOccurrence,
    SymbolProperty, SymbolRelation, SymbolRole, UnitInfo,
};
pub use visibility::VisibilityChecker;
