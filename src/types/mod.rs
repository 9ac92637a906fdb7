//! Core data model: IDCode interning, symbol/location types, role bitsets,
//! and the packed unit-info record.
//!
//! Every table in the KV store (see [`crate::store`]) is keyed or valued by
//! [`IDCode`] rather than by raw strings; this module is where a string
//! first becomes a code, and where the bit-packed `SymbolRole`/`Properties`
//! sets live.

use std::path::PathBuf;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

mod idcode;
mod unit_info;

pub use idcode::IDCode;
pub use unit_info::UnitInfo;

/// A compiler-emitted unique symbol reference, e.g. `s:4main1cyyF`.
pub type Usr = str;

bitflags! {
    /// Bits of [`SymbolRole`] that describe how an occurrence participates
    /// in the source, plus the synthetic `CANONICAL` bit that only the
    /// index layer ever sets (never the producer).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct SymbolRole: u64 {
        const DECLARATION          = 1 << 0;
        const DEFINITION           = 1 << 1;
        const REFERENCE            = 1 << 2;
        const READ                 = 1 << 3;
        const WRITE                = 1 << 4;
        const CALL                 = 1 << 5;
        const DYNAMIC              = 1 << 6;
        const ADDRESS_OF           = 1 << 7;
        const IMPLICIT             = 1 << 8;

        const RELATION_CHILD_OF         = 1 << 16;
        const RELATION_BASE_OF          = 1 << 17;
        const RELATION_OVERRIDE_OF      = 1 << 18;
        const RELATION_RECEIVED_BY      = 1 << 19;
        const RELATION_CALLED_BY        = 1 << 20;
        const RELATION_EXTENDED_BY      = 1 << 21;
        const RELATION_ACCESSOR_OF      = 1 << 22;
        const RELATION_CONTAINED_BY     = 1 << 23;
        const RELATION_IB_TYPE_OF       = 1 << 24;
        const RELATION_SPECIALIZATION_OF = 1 << 25;

        /// Set only by [`crate::symbol::SymbolIndex`] at query time; never
        /// persisted and never emitted by a provider.
        const CANONICAL = 1 << 63;
    }
}

impl SymbolRole {
    /// Roles considered when selecting the canonical occurrence (§4.5).
    pub const DECL_OR_DEF: SymbolRole =
        SymbolRole::from_bits_truncate(SymbolRole::DECLARATION.bits() | SymbolRole::DEFINITION.bits());
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct SymbolProperty: u32 {
        const UNIT_TEST          = 1 << 0;
        const SWIFT_ASYNC        = 1 << 1;
        const IB_ANNOTATED       = 1 << 2;
        const GENERIC            = 1 << 3;
        const LOCAL              = 1 << 4;
        const PROTOCOL_INTERFACE = 1 << 5;
    }
}

/// Source-construct kind carried by a [`Symbol`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SymbolKind {
    Function,
    InstanceMethod,
    ClassMethod,
    StaticMethod,
    Class,
    Struct,
    Protocol,
    Enum,
    EnumConstant,
    Extension,
    TypeAlias,
    Variable,
    InstanceProperty,
    ClassProperty,
    Constructor,
    Destructor,
    Parameter,
    Field,
    Module,
    Macro,
    CommentTag,
    Concept,
    Union,
}

/// The subset of [`SymbolKind`]s that participate in the `symbol-kinds`
/// table: only class-like, function, and variable-like global kinds.
/// Methods, properties, macros and others are deliberately excluded.
/// This exclusion is preserved on purpose and must not be "fixed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GlobalSymbolKind {
    Enum,
    Struct,
    Class,
    Protocol,
    Union,
    TypeAlias,
    Function,
    Variable,
    Concept,
    CommentTag,
}

impl SymbolKind {
    /// Maps to the kind-enumeration table, or `None` if this kind doesn't
    /// participate in name-by-kind queries at all (§4.5).
    pub fn global_kind(self) -> Option<GlobalSymbolKind> {
        match self {
            SymbolKind::Enum => Some(GlobalSymbolKind::Enum),
            SymbolKind::Struct => Some(GlobalSymbolKind::Struct),
            SymbolKind::Class => Some(GlobalSymbolKind::Class),
            SymbolKind::Protocol => Some(GlobalSymbolKind::Protocol),
            SymbolKind::Union => Some(GlobalSymbolKind::Union),
            SymbolKind::TypeAlias => Some(GlobalSymbolKind::TypeAlias),
            SymbolKind::Function => Some(GlobalSymbolKind::Function),
            SymbolKind::Variable => Some(GlobalSymbolKind::Variable),
            SymbolKind::Concept => Some(GlobalSymbolKind::Concept),
            SymbolKind::CommentTag => Some(GlobalSymbolKind::CommentTag),
            _ => None,
        }
    }

    /// ObjC-style kinds where the canonical occurrence prefers the
    /// declaration over the definition (§4.5 canonical-occurrence rules).
    pub fn prefer_declaration_as_canonical(self) -> bool {
        matches!(
            self,
            SymbolKind::Class | SymbolKind::Extension | SymbolKind::InstanceProperty | SymbolKind::ClassProperty
        )
    }

    /// Stable discriminant for on-disk encoding (`symbol-info` sidecar
    /// table). Order must never change without a `DATABASE_FORMAT_VERSION`
    /// bump (§3 invariant on `SymbolProviderKind`-style stable values).
    pub fn to_u8(self) -> u8 {
        match self {
            SymbolKind::Function => 0,
            SymbolKind::InstanceMethod => 1,
            SymbolKind::ClassMethod => 2,
            SymbolKind::StaticMethod => 3,
            SymbolKind::Class => 4,
            SymbolKind::Struct => 5,
            SymbolKind::Protocol => 6,
            SymbolKind::Enum => 7,
            SymbolKind::EnumConstant => 8,
            SymbolKind::Extension => 9,
            SymbolKind::TypeAlias => 10,
            SymbolKind::Variable => 11,
            SymbolKind::InstanceProperty => 12,
            SymbolKind::ClassProperty => 13,
            SymbolKind::Constructor => 14,
            SymbolKind::Destructor => 15,
            SymbolKind::Parameter => 16,
            SymbolKind::Field => 17,
            SymbolKind::Module => 18,
            SymbolKind::Macro => 19,
            SymbolKind::CommentTag => 20,
            SymbolKind::Concept => 21,
            SymbolKind::Union => 22,
        }
    }

    pub fn from_u8(byte: u8) -> Self {
        match byte {
            0 => SymbolKind::Function,
            1 => SymbolKind::InstanceMethod,
            2 => SymbolKind::ClassMethod,
            3 => SymbolKind::StaticMethod,
            4 => SymbolKind::Class,
            5 => SymbolKind::Struct,
            6 => SymbolKind::Protocol,
            7 => SymbolKind::Enum,
            8 => SymbolKind::EnumConstant,
            9 => SymbolKind::Extension,
            10 => SymbolKind::TypeAlias,
            11 => SymbolKind::Variable,
            12 => SymbolKind::InstanceProperty,
            13 => SymbolKind::ClassProperty,
            14 => SymbolKind::Constructor,
            15 => SymbolKind::Destructor,
            16 => SymbolKind::Parameter,
            17 => SymbolKind::Field,
            18 => SymbolKind::Module,
            19 => SymbolKind::Macro,
            20 => SymbolKind::CommentTag,
            21 => SymbolKind::Concept,
            _ => SymbolKind::Union,
        }
    }
}

impl GlobalSymbolKind {
    pub fn to_u8(self) -> u8 {
        match self {
            GlobalSymbolKind::Enum => 0,
            GlobalSymbolKind::Struct => 1,
            GlobalSymbolKind::Class => 2,
            GlobalSymbolKind::Protocol => 3,
            GlobalSymbolKind::Union => 4,
            GlobalSymbolKind::TypeAlias => 5,
            GlobalSymbolKind::Function => 6,
            GlobalSymbolKind::Variable => 7,
            GlobalSymbolKind::Concept => 8,
            GlobalSymbolKind::CommentTag => 9,
        }
    }

    pub fn from_u8(byte: u8) -> Self {
        match byte {
            0 => GlobalSymbolKind::Enum,
            1 => GlobalSymbolKind::Struct,
            2 => GlobalSymbolKind::Class,
            3 => GlobalSymbolKind::Protocol,
            4 => GlobalSymbolKind::Union,
            5 => GlobalSymbolKind::TypeAlias,
            6 => GlobalSymbolKind::Function,
            7 => GlobalSymbolKind::Variable,
            8 => GlobalSymbolKind::Concept,
            _ => GlobalSymbolKind::CommentTag,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    C,
    Cxx,
    ObjC,
    ObjCxx,
    Swift,
}

impl Language {
    pub fn to_u8(self) -> u8 {
        match self {
            Language::C => 0,
            Language::Cxx => 1,
            Language::ObjC => 2,
            Language::ObjCxx => 3,
            Language::Swift => 4,
        }
    }

    pub fn from_u8(byte: u8) -> Self {
        match byte {
            0 => Language::C,
            1 => Language::Cxx,
            2 => Language::ObjC,
            3 => Language::ObjCxx,
            _ => Language::Swift,
        }
    }
}

/// `(Kind, SubKind, Properties, Language)` as described in §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub kind: SymbolKind,
    pub sub_kind: u16,
    pub properties: SymbolProperty,
    pub language: Language,
}

impl SymbolInfo {
    pub fn prefer_declaration_as_canonical(&self) -> bool {
        self.kind.prefer_declaration_as_canonical()
    }
}

/// `(usr, name, SymbolInfo)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub usr: Box<str>,
    pub name: Box<str>,
    pub info: SymbolInfo,
}

/// Concrete source of a [`SymbolOccurrence`], mirroring `SymbolProviderKind`
/// in §3. Values are stable and must not be renumbered without bumping
/// `DATABASE_FORMAT_VERSION` (§3 invariants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProviderKind {
    Clang = 0,
    Swift = 1,
}

/// `(CanonicalFilePath, moduleName, mtime, isSystem, sysroot, line, column)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub path: PathBuf,
    pub module_name: Option<Box<str>>,
    pub mtime: i64,
    pub is_system: bool,
    pub sysroot: Option<PathBuf>,
    pub line: u32,
    pub column: u32,
}

/// A back-reference to another symbol carrying relation-only roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRelation {
    pub roles: SymbolRole,
    pub symbol: Symbol,
}

/// `(Symbol, RoleSet, Location, ProviderKind, Target, [SymbolRelation])`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolOccurrence {
    pub symbol: Symbol,
    pub roles: SymbolRole,
    pub location: Location,
    pub provider_kind: ProviderKind,
    pub target: Option<Box<str>>,
    pub relations: Vec<SymbolRelation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_kind_excludes_methods_and_properties() {
        assert_eq!(SymbolKind::InstanceMethod.global_kind(), None);
        assert_eq!(SymbolKind::Field.global_kind(), None);
        assert_eq!(SymbolKind::Macro.global_kind(), None);
        assert_eq!(SymbolKind::Function.global_kind(), Some(GlobalSymbolKind::Function));
    }

    #[test]
    fn canonical_bit_is_highest_bit() {
        assert_eq!(SymbolRole::CANONICAL.bits(), 1u64 << 63);
    }

    #[test]
    fn objc_kinds_prefer_declaration() {
        assert!(SymbolKind::Class.prefer_declaration_as_canonical());
        assert!(SymbolKind::InstanceProperty.prefer_declaration_as_canonical());
        assert!(!SymbolKind::Function.prefer_declaration_as_canonical());
    }
}
