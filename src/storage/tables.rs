//! The logical table set (§3) realized as typed `heed` databases over one
//! environment. Every table stores raw bytes; [`super::codec`] defines the
//! key layout and this module defines the value layouts.

use heed::types::Bytes;
use heed::{Database as HeedDatabase, EnvOpenOptions};

use crate::error::StoreError;
use crate::types::{IDCode, ProviderKind, SymbolRole, UnitInfo};

use super::codec::{bytes_to_code, bytes_to_str, code_to_bytes, str_to_bytes};

pub type RawTable = HeedDatabase<Bytes, Bytes>;

/// The full set of logical tables described in §3.
#[derive(Clone)]
pub struct Tables {
    /// `usr code ++ provider code -> (roles, relatedRoles)`.
    pub usrs: RawTable,
    /// `usr code -> usr string` (interning partner for `usrs`).
    pub usrs_by_code: RawTable,
    /// `provider code -> name string`.
    pub providers: RawTable,
    /// `provider code -> ()` set membership.
    pub providers_with_test_symbols: RawTable,
    /// `name hash ++ usr code -> ()`.
    pub symbol_names: RawTable,
    /// `name hash -> name string` (interning partner for `symbol_names`).
    pub names_by_code: RawTable,
    /// `globalKind(u8) ++ usr code -> ()`.
    pub symbol_kinds: RawTable,
    /// `dir code -> dir string`.
    pub directories: RawTable,
    /// `filename code -> filename string`.
    pub filenames: RawTable,
    /// `dir code ++ filename code -> ()`.
    pub filepaths_by_directory: RawTable,
    /// `provider code ++ file code ++ unit code -> ProviderFileEntry`.
    pub provider_files: RawTable,
    /// `unit code -> packed UnitInfo`.
    pub unit_info: RawTable,
    /// `file code ++ unit code -> ()`.
    pub unit_by_file: RawTable,
    /// `dep unit code ++ unit code -> ()`.
    pub unit_by_unit: RawTable,
    /// `target code -> target string`.
    pub target_names: RawTable,
    /// `module code -> module string`.
    pub module_names: RawTable,
    /// `source file code ++ target file code ++ unit code -> line(u32)`.
    pub includes_by_source: RawTable,
    /// `target file code ++ source file code ++ unit code -> line(u32)`.
    pub includes_by_target: RawTable,
    /// `usr code -> (name string, SymbolInfo)` packed. Not one of the
    /// tables §3 enumerates directly, but `occurrencesByUSR` (§4.5) must
    /// reconstruct a full `Symbol` for a bare USR, and nothing in the
    /// core table set maps a USR back to its name/kind without re-scanning
    /// every provider that mentions it. This sidecar is populated
    /// alongside `usrs` during `importSymbols` and kept in lockstep with it.
    pub symbol_info: RawTable,
}

const TABLE_NAMES: &[&str] = &[
    "usrs",
    "usrs-by-code",
    "providers",
    "providers-with-test-symbols",
    "symbol-names",
    "names-by-code",
    "symbol-kinds",
    "directories",
    "filenames",
    "filepaths-by-directory",
    "provider-files",
    "unit-info",
    "unit-by-file",
    "unit-by-unit",
    "target-names",
    "module-names",
    "includes-by-source",
    "includes-by-target",
    "symbol-info",
];

impl Tables {
    /// Open (creating if absent) every logical table within one write
    /// transaction, matching §4.1 step 5 ("Open all logical tables; commit
    /// the creation transaction.").
    pub fn open_all(env: &heed::Env) -> Result<Self, StoreError> {
        let mut wtxn = env.write_txn()?;
        let mut db = |name: &str| -> Result<RawTable, StoreError> {
            Ok(env.create_database(&mut wtxn, Some(name))?)
        };

        let tables = Tables {
            usrs: db(TABLE_NAMES[0])?,
            usrs_by_code: db(TABLE_NAMES[1])?,
            providers: db(TABLE_NAMES[2])?,
            providers_with_test_symbols: db(TABLE_NAMES[3])?,
            symbol_names: db(TABLE_NAMES[4])?,
            names_by_code: db(TABLE_NAMES[5])?,
            symbol_kinds: db(TABLE_NAMES[6])?,
            directories: db(TABLE_NAMES[7])?,
            filenames: db(TABLE_NAMES[8])?,
            filepaths_by_directory: db(TABLE_NAMES[9])?,
            provider_files: db(TABLE_NAMES[10])?,
            unit_info: db(TABLE_NAMES[11])?,
            unit_by_file: db(TABLE_NAMES[12])?,
            unit_by_unit: db(TABLE_NAMES[13])?,
            target_names: db(TABLE_NAMES[14])?,
            module_names: db(TABLE_NAMES[15])?,
            includes_by_source: db(TABLE_NAMES[16])?,
            includes_by_target: db(TABLE_NAMES[17])?,
            symbol_info: db(TABLE_NAMES[18])?,
        };
        wtxn.commit()?;
        Ok(tables)
    }

    pub fn env_open_options() -> EnvOpenOptions {
        let mut opts = EnvOpenOptions::new();
        opts.max_dbs(TABLE_NAMES.len() as u32);
        opts
    }
}

/// `(providerCode, roles, relatedRoles)` value stored in `usrs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsrRow {
    pub roles: SymbolRole,
    pub related_roles: SymbolRole,
}

pub fn encode_usr_row(row: UsrRow) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&row.roles.bits().to_be_bytes());
    out[8..].copy_from_slice(&row.related_roles.bits().to_be_bytes());
    out
}

pub fn decode_usr_row(bytes: &[u8]) -> UsrRow {
    let roles = u64::from_be_bytes(bytes[..8].try_into().unwrap());
    let related = u64::from_be_bytes(bytes[8..16].try_into().unwrap());
    UsrRow {
        roles: SymbolRole::from_bits_truncate(roles),
        related_roles: SymbolRole::from_bits_truncate(related),
    }
}

/// `symbol-info` sidecar value: a symbol's name plus its `SymbolInfo`.
pub fn encode_symbol_info_entry(name: &str, info: crate::types::SymbolInfo) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + name.len());
    out.push(info.kind.to_u8());
    out.extend_from_slice(&info.sub_kind.to_be_bytes());
    out.extend_from_slice(&info.properties.bits().to_be_bytes());
    out.push(info.language.to_u8());
    out.extend_from_slice(&(name.len() as u32).to_be_bytes());
    out.extend_from_slice(name.as_bytes());
    out
}

pub fn decode_symbol_info_entry(bytes: &[u8]) -> (Box<str>, crate::types::SymbolInfo) {
    use crate::types::{Language, SymbolInfo, SymbolKind, SymbolProperty};

    let kind = SymbolKind::from_u8(bytes[0]);
    let sub_kind = u16::from_be_bytes(bytes[1..3].try_into().unwrap());
    let properties = SymbolProperty::from_bits_truncate(u32::from_be_bytes(bytes[3..7].try_into().unwrap()));
    let language = Language::from_u8(bytes[7]);
    let name_len = u32::from_be_bytes(bytes[8..12].try_into().unwrap()) as usize;
    let name: Box<str> = bytes_to_str(&bytes[12..12 + name_len]).into();
    (name, SymbolInfo { kind, sub_kind, properties, language })
}

/// `(fileCode, unitCode, mtime, sysroot, isSystem, moduleName)` minus the
/// key fields (fileCode/unitCode live in the composite key).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFileEntry {
    pub mtime: i64,
    pub sysroot_code: Option<IDCode>,
    pub is_system: bool,
    pub module_name_code: Option<IDCode>,
}

pub fn encode_provider_file_entry(entry: &ProviderFileEntry) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + 1 + 9 + 1);
    out.extend_from_slice(&entry.mtime.to_be_bytes());
    out.push(entry.is_system as u8);
    match entry.sysroot_code {
        Some(c) => {
            out.push(1);
            out.extend_from_slice(&code_to_bytes(c));
        }
        None => out.push(0),
    }
    match entry.module_name_code {
        Some(c) => {
            out.push(1);
            out.extend_from_slice(&code_to_bytes(c));
        }
        None => out.push(0),
    }
    out
}

pub fn decode_provider_file_entry(bytes: &[u8]) -> ProviderFileEntry {
    let mtime = i64::from_be_bytes(bytes[0..8].try_into().unwrap());
    let is_system = bytes[8] != 0;
    let mut pos = 9;
    let sysroot_code = if bytes[pos] != 0 {
        pos += 1;
        let c = bytes_to_code(&bytes[pos..pos + 8]);
        pos += 8;
        Some(c)
    } else {
        pos += 1;
        None
    };
    let module_name_code = if bytes[pos] != 0 {
        pos += 1;
        Some(bytes_to_code(&bytes[pos..pos + 8]))
    } else {
        None
    };
    ProviderFileEntry { mtime, sysroot_code, is_system, module_name_code }
}

/// Packs a [`UnitInfo`] into a fixed-prefix + variable-length-list layout,
/// deliberately independent of `serde`/`bincode` framing so the wire shape
/// doesn't shift under us when unrelated derive attributes change (§3:
/// "Stored as a packed binary record").
pub fn encode_unit_info(info: &UnitInfo) -> Vec<u8> {
    let mut out = Vec::new();
    let name_bytes = info.unit_name.as_bytes();
    out.extend_from_slice(&(name_bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(name_bytes);
    out.extend_from_slice(&code_to_bytes(info.unit_code));
    out.extend_from_slice(&info.mtime.to_be_bytes());
    out.extend_from_slice(&code_to_bytes(info.out_file_code));
    push_option_code(&mut out, info.main_file_code);
    push_option_code(&mut out, info.sysroot_code);
    push_option_code(&mut out, info.target_code);
    let mut flags = 0u8;
    if info.has_main_file {
        flags |= 1 << 0;
    }
    if info.has_sysroot {
        flags |= 1 << 1;
    }
    if info.is_system {
        flags |= 1 << 2;
    }
    if info.has_test_symbols {
        flags |= 1 << 3;
    }
    out.push(flags);
    out.push(info.provider_kind as u8);
    push_code_list(&mut out, &info.file_deps);
    push_code_list(&mut out, &info.unit_deps);
    push_code_list(&mut out, &info.provider_deps);
    out
}

pub fn decode_unit_info(bytes: &[u8]) -> UnitInfo {
    let mut pos = 0usize;
    let name_len = read_u32(bytes, &mut pos) as usize;
    let unit_name: Box<str> = bytes_to_str(&bytes[pos..pos + name_len]).into();
    pos += name_len;
    let unit_code = read_code(bytes, &mut pos);
    let mtime = read_i64(bytes, &mut pos);
    let out_file_code = read_code(bytes, &mut pos);
    let main_file_code = read_option_code(bytes, &mut pos);
    let sysroot_code = read_option_code(bytes, &mut pos);
    let target_code = read_option_code(bytes, &mut pos);
    let flags = bytes[pos];
    pos += 1;
    let provider_kind = match bytes[pos] {
        1 => ProviderKind::Swift,
        _ => ProviderKind::Clang,
    };
    pos += 1;
    let file_deps = read_code_list(bytes, &mut pos);
    let unit_deps = read_code_list(bytes, &mut pos);
    let provider_deps = read_code_list(bytes, &mut pos);

    UnitInfo {
        unit_name,
        unit_code,
        mtime,
        out_file_code,
        main_file_code,
        sysroot_code,
        target_code,
        has_main_file: flags & (1 << 0) != 0,
        has_sysroot: flags & (1 << 1) != 0,
        is_system: flags & (1 << 2) != 0,
        has_test_symbols: flags & (1 << 3) != 0,
        provider_kind,
        file_deps,
        unit_deps,
        provider_deps,
    }
}

fn push_option_code(out: &mut Vec<u8>, code: Option<IDCode>) {
    match code {
        Some(c) => {
            out.push(1);
            out.extend_from_slice(&code_to_bytes(c));
        }
        None => out.push(0),
    }
}

fn read_option_code(bytes: &[u8], pos: &mut usize) -> Option<IDCode> {
    let present = bytes[*pos];
    *pos += 1;
    if present != 0 {
        Some(read_code(bytes, pos))
    } else {
        None
    }
}

fn push_code_list(out: &mut Vec<u8>, codes: &[IDCode]) {
    out.extend_from_slice(&(codes.len() as u32).to_be_bytes());
    for code in codes {
        out.extend_from_slice(&code_to_bytes(*code));
    }
}

fn read_code_list(bytes: &[u8], pos: &mut usize) -> Vec<IDCode> {
    let len = read_u32(bytes, pos) as usize;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(read_code(bytes, pos));
    }
    out
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> u32 {
    let v = u32::from_be_bytes(bytes[*pos..*pos + 4].try_into().unwrap());
    *pos += 4;
    v
}

fn read_i64(bytes: &[u8], pos: &mut usize) -> i64 {
    let v = i64::from_be_bytes(bytes[*pos..*pos + 8].try_into().unwrap());
    *pos += 8;
    v
}

fn read_code(bytes: &[u8], pos: &mut usize) -> IDCode {
    let c = bytes_to_code(&bytes[*pos..*pos + 8]);
    *pos += 8;
    c
}

pub fn str_value(s: &str) -> &[u8] {
    str_to_bytes(s)
}

/// Interns `path` into `directories`/`filenames`/`filepaths-by-directory`,
/// splitting it into a parent-directory string and a filename string.
/// Shared by symbol import (`provider-files`) and unit import
/// (`unit-info`/`unit-by-file`), the two places §3's file tables are
/// populated from.
pub fn intern_file_path(tables: &Tables, txn: &mut heed::RwTxn<'_>, path: &std::path::Path) -> Result<IDCode, StoreError> {
    let file_code = IDCode::of(&path.to_string_lossy());
    if tables.filenames.get(txn, &code_to_bytes(file_code))?.is_some() {
        return Ok(file_code);
    }

    let dir = path.parent().unwrap_or_else(|| std::path::Path::new(""));
    let dir_str = dir.to_string_lossy();
    let dir_code = IDCode::of(&dir_str);

    tables.directories.put(txn, &code_to_bytes(dir_code), dir_str.as_bytes())?;
    tables.filenames.put(txn, &code_to_bytes(file_code), path.to_string_lossy().as_bytes())?;
    tables.filepaths_by_directory.put(txn, &pair_key_for_dir(dir_code, file_code), &[])?;

    Ok(file_code)
}

fn pair_key_for_dir(dir_code: IDCode, file_code: IDCode) -> [u8; 16] {
    crate::storage::codec::pair_key(dir_code, file_code)
}
