//! Byte encodings shared by every table.
//!
//! Every table uses raw `heed::types::Bytes` for both key and value, and
//! this module owns the encode/decode logic. Composite keys are simply
//! big-endian-encoded fields concatenated in order, which gives LMDB's
//! natural lexicographic key order the same meaning as a grouped/sorted
//! multimap. This emulates a custom dup-sort by reading-then-writing on
//! conflict, applied one level up: group membership is expressed as a
//! shared key prefix instead of as a DUP_SORT value list, so a plain
//! `put` at an existing composite key is already the upsert required (a
//! provider's row in `usrs`, or a `(fileCode, unitCode)` row in
//! `provider-files`, is simply overwritten in place).

use crate::types::IDCode;

pub fn code_to_bytes(code: IDCode) -> [u8; 8] {
    code.raw().to_be_bytes()
}

pub fn bytes_to_code(bytes: &[u8]) -> IDCode {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    IDCode::from_raw(u64::from_be_bytes(buf))
}

/// Two codes concatenated, giving a key ordered first by `a` then by `b`.
pub fn pair_key(a: IDCode, b: IDCode) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&code_to_bytes(a));
    out[8..].copy_from_slice(&code_to_bytes(b));
    out
}

pub fn split_pair_key(bytes: &[u8]) -> (IDCode, IDCode) {
    (bytes_to_code(&bytes[..8]), bytes_to_code(&bytes[8..16]))
}

/// Three codes concatenated (used by `provider-files` and the include graph).
pub fn triple_key(a: IDCode, b: IDCode, c: IDCode) -> [u8; 24] {
    let mut out = [0u8; 24];
    out[..8].copy_from_slice(&code_to_bytes(a));
    out[8..16].copy_from_slice(&code_to_bytes(b));
    out[16..].copy_from_slice(&code_to_bytes(c));
    out
}

pub fn split_triple_key(bytes: &[u8]) -> (IDCode, IDCode, IDCode) {
    (bytes_to_code(&bytes[..8]), bytes_to_code(&bytes[8..16]), bytes_to_code(&bytes[16..24]))
}

/// A key keyed by a `u8` discriminant followed by a code, used by
/// `symbol-kinds` (`globalKind` is a small closed enum, not a full code).
pub fn kind_key(kind: u8, usr_code: IDCode) -> [u8; 9] {
    let mut out = [0u8; 9];
    out[0] = kind;
    out[1..].copy_from_slice(&code_to_bytes(usr_code));
    out
}

pub fn split_kind_key(bytes: &[u8]) -> (u8, IDCode) {
    (bytes[0], bytes_to_code(&bytes[1..9]))
}

pub fn str_to_bytes(s: &str) -> &[u8] {
    s.as_bytes()
}

pub fn bytes_to_str(bytes: &[u8]) -> &str {
    std::str::from_utf8(bytes).expect("interned strings are always valid utf-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_roundtrips() {
        let a = IDCode::of("a");
        let b = IDCode::of("b");
        let (ra, rb) = split_pair_key(&pair_key(a, b));
        assert_eq!((ra, rb), (a, b));
    }

    #[test]
    fn pair_key_orders_by_first_field_then_second() {
        let a = IDCode::from_raw(1);
        let b1 = IDCode::from_raw(10);
        let b2 = IDCode::from_raw(20);
        assert!(pair_key(a, b1) < pair_key(a, b2));
        let a2 = IDCode::from_raw(2);
        assert!(pair_key(a, b2) < pair_key(a2, b1));
    }
}
