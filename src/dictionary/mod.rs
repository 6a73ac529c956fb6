//! Compression dictionaries: a sorted, deduplicated, code-addressable view
//! of a column's distinct values, and the builder that assembles one while
//! a compressed page is still being accumulated.

use crate::comparator::{compare_values, ComparisonOp};
use crate::error::{BlockKind, Result, StorageError};
use crate::types::{Type, Value};
use std::cmp::Ordering;

/// A sorted, code→value mapping backed by a flat memory region.
///
/// Fixed-length types (`Int`, `Long`, `Float`, `Double`, `Char(n)`) are
/// stored as `num_codes * width` contiguous bytes; the variable-length type
/// (`VarChar(n)`) is stored as `num_codes + 1` offsets into a trailing blob
/// of concatenated value bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum CompressionDictionary {
    Fixed {
        ty: Type,
        width: usize,
        /// `num_codes * width` bytes, values in ascending order.
        values: Vec<u8>,
    },
    Variable {
        ty: Type,
        /// `num_codes + 1` entries; the last is one-past-the-end of `blob`.
        offsets: Vec<u32>,
        blob: Vec<u8>,
    },
}

impl CompressionDictionary {
    pub fn ty(&self) -> Type {
        match self {
            CompressionDictionary::Fixed { ty, .. } => *ty,
            CompressionDictionary::Variable { ty, .. } => *ty,
        }
    }

    pub fn num_codes(&self) -> u32 {
        match self {
            CompressionDictionary::Fixed { width, values, .. } => {
                if *width == 0 {
                    0
                } else {
                    (values.len() / width) as u32
                }
            }
            CompressionDictionary::Variable { offsets, .. } => offsets.len().saturating_sub(1) as u32,
        }
    }

    /// `ceil(log2(num_codes + 1))`, rounded up to a byte width of 1, 2, or 4.
    pub fn code_bit_width(&self) -> u8 {
        code_byte_width(self.num_codes()) as u8 * 8
    }

    /// The byte width (1, 2, or 4) a code for this dictionary needs.
    pub fn code_byte_width(&self) -> usize {
        code_byte_width(self.num_codes())
    }

    fn nth_value(&self, code: u32) -> &[u8] {
        match self {
            CompressionDictionary::Fixed { width, values, .. } => {
                let start = code as usize * width;
                &values[start..start + width]
            }
            CompressionDictionary::Variable { offsets, blob, .. } => {
                let start = offsets[code as usize] as usize;
                let end = offsets[code as usize + 1] as usize;
                &blob[start..end]
            }
        }
    }

    /// O(1) lookup of the value for `code`. Fails with `CodeOutOfRange` if
    /// `code >= num_codes()`.
    pub fn value_for(&self, code: u32) -> Result<Value> {
        if code >= self.num_codes() {
            return Err(StorageError::code_out_of_range(code, self.num_codes()));
        }
        Ok(decode_value(self.ty(), self.nth_value(code)))
    }

    fn value_ordering(&self, code: u32, probe: &Value) -> Ordering {
        let stored = decode_value(self.ty(), self.nth_value(code));
        compare_values(&stored, probe).unwrap_or(Ordering::Less)
    }

    /// First code whose value is not-less-than `probe`.
    pub fn lower_bound(&self, probe: &Value) -> u32 {
        let n = self.num_codes();
        let (mut lo, mut hi) = (0u32, n);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.value_ordering(mid, probe) == Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// First code whose value is strictly-greater-than `probe`.
    pub fn upper_bound(&self, probe: &Value) -> u32 {
        let n = self.num_codes();
        let (mut lo, mut hi) = (0u32, n);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.value_ordering(mid, probe) == Ordering::Greater {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        lo
    }

    /// Binary search for an exact match; returns `num_codes()` (the
    /// not-found sentinel) if `value` is not present.
    pub fn code_for(&self, value: &Value) -> u32 {
        let lb = self.lower_bound(value);
        if lb < self.num_codes() && self.value_ordering(lb, value) == Ordering::Equal {
            lb
        } else {
            self.num_codes()
        }
    }

    /// The code range `[lo, hi)` whose values satisfy `value OP literal`.
    /// `NotEqual` is not handled here; callers answer it as the complement
    /// of `Equal`.
    pub fn limit_codes(&self, op: ComparisonOp, literal: &Value) -> (u32, u32) {
        let n = self.num_codes();
        match op {
            ComparisonOp::Equal => {
                let lo = self.lower_bound(literal);
                if lo < n && self.value_ordering(lo, literal) == Ordering::Equal {
                    (lo, lo + 1)
                } else {
                    (n, n)
                }
            }
            ComparisonOp::NotEqual => {
                unreachable!("NotEqual is answered as the complement of Equal by the caller")
            }
            ComparisonOp::Less => (0, self.lower_bound(literal)),
            ComparisonOp::LessOrEqual => (0, self.upper_bound(literal)),
            ComparisonOp::Greater => (self.upper_bound(literal), n),
            ComparisonOp::GreaterOrEqual => (self.lower_bound(literal), n),
        }
    }

    /// Serialize to the on-disk layout described in the external
    /// interfaces (all integers little-endian).
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.num_codes().to_le_bytes());
        match self {
            CompressionDictionary::Fixed { values, .. } => out.extend_from_slice(values),
            CompressionDictionary::Variable { offsets, blob, .. } => {
                for off in offsets {
                    out.extend_from_slice(&off.to_le_bytes());
                }
                out.extend_from_slice(blob);
            }
        }
        out
    }

    pub fn decode(ty: Type, bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(StorageError::malformed_block(
                "compression dictionary shorter than its num_codes header",
            ));
        }
        let num_codes = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if ty.is_variable_length() {
            let offsets_bytes = (num_codes as usize + 1) * 4;
            if bytes.len() < 4 + offsets_bytes {
                return Err(StorageError::malformed_block(
                    "compression dictionary offsets truncated",
                ));
            }
            let mut offsets = Vec::with_capacity(num_codes as usize + 1);
            let mut cursor = 4;
            for _ in 0..=num_codes {
                offsets.push(u32::from_le_bytes([
                    bytes[cursor],
                    bytes[cursor + 1],
                    bytes[cursor + 2],
                    bytes[cursor + 3],
                ]));
                cursor += 4;
            }
            let blob_len = *offsets.last().unwrap() as usize;
            if bytes.len() < cursor + blob_len {
                return Err(StorageError::malformed_block(
                    "compression dictionary value blob truncated",
                ));
            }
            let blob = bytes[cursor..cursor + blob_len].to_vec();
            Ok(CompressionDictionary::Variable { ty, offsets, blob })
        } else {
            let width = ty.natural_width_bytes();
            let needed = 4 + num_codes as usize * width;
            if bytes.len() < needed {
                return Err(StorageError::malformed_block(
                    "fixed-length compression dictionary truncated",
                ));
            }
            let values = bytes[4..needed].to_vec();
            Ok(CompressionDictionary::Fixed { ty, width, values })
        }
    }
}

pub(crate) fn code_byte_width(num_codes: u32) -> usize {
    let limit = num_codes as u64 + 1;
    let mut bits = 0u32;
    while (1u64 << bits) < limit {
        bits += 1;
    }
    match bits {
        0..=8 => 1,
        9..=16 => 2,
        _ => 4,
    }
}

pub(crate) fn encode_value(ty: Type, value: &Value) -> Vec<u8> {
    match (ty, value) {
        (Type::Int, Value::Int(v)) => v.to_le_bytes().to_vec(),
        (Type::Long, Value::Long(v)) => v.to_le_bytes().to_vec(),
        (Type::Float, Value::Float(v)) => v.to_le_bytes().to_vec(),
        (Type::Double, Value::Double(v)) => v.to_le_bytes().to_vec(),
        (Type::Char(n), Value::Char(bytes)) => {
            let mut buf = bytes.clone();
            buf.resize(n, 0);
            buf
        }
        (Type::VarChar(_), Value::VarChar(bytes)) => {
            let mut buf = bytes.clone();
            buf.push(0);
            buf
        }
        _ => panic!("value {value:?} does not match dictionary type {ty:?}"),
    }
}

pub(crate) fn decode_value(ty: Type, bytes: &[u8]) -> Value {
    match ty {
        Type::Int => Value::Int(i32::from_le_bytes(bytes.try_into().unwrap())),
        Type::Long => Value::Long(i64::from_le_bytes(bytes.try_into().unwrap())),
        Type::Float => Value::Float(f32::from_le_bytes(bytes.try_into().unwrap())),
        Type::Double => Value::Double(f64::from_le_bytes(bytes.try_into().unwrap())),
        Type::Char(_) => Value::Char(bytes.to_vec()),
        Type::VarChar(_) => {
            let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            Value::VarChar(bytes[..len].to_vec())
        }
    }
}

/// Accumulates candidate values for one attribute while a compressed page
/// is still being built. Maintains a sorted, deduplicated set so that
/// `seal()` can emit an already-ordered dictionary directly.
#[derive(Debug, Clone)]
pub struct DictionaryBuilder {
    ty: Type,
    values: Vec<Value>,
}

impl DictionaryBuilder {
    pub fn new(ty: Type) -> Self {
        Self {
            ty,
            values: Vec::new(),
        }
    }

    pub fn ty(&self) -> Type {
        self.ty
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn position_of(&self, value: &Value) -> std::result::Result<usize, usize> {
        self.values
            .binary_search_by(|probe| compare_values(probe, value).unwrap_or(Ordering::Less))
    }

    /// Inserts `value` if it is not already present. Returns `true` if the
    /// builder's state changed (so the caller can undo it on rollback).
    pub fn try_insert(&mut self, value: &Value) -> bool {
        match self.position_of(value) {
            Ok(_) => false,
            Err(pos) => {
                self.values.insert(pos, value.clone());
                true
            }
        }
    }

    /// Reverses a `try_insert` that returned `true`. Must be called with
    /// the same value, before any other mutation, to preserve the sorted
    /// set's invariants.
    pub fn undo_insert(&mut self, value: &Value) {
        if let Ok(pos) = self.position_of(value) {
            self.values.remove(pos);
        }
    }

    /// The number of bytes a fixed-width dictionary built from the current
    /// contents would occupy, including its 4-byte header.
    pub fn fixed_encoded_bytes(&self) -> usize {
        4 + self.values.len() * self.ty.natural_width_bytes()
    }

    /// The number of bytes a variable-width dictionary built from the
    /// current contents would occupy, including header and offsets.
    pub fn variable_encoded_bytes(&self) -> usize {
        let blob_bytes: usize = self
            .values
            .iter()
            .map(|v| encode_value(self.ty, v).len())
            .sum();
        4 + (self.values.len() + 1) * 4 + blob_bytes
    }

    /// The dictionary's projected encoded size for the current contents,
    /// using whichever physical layout this builder's type requires.
    pub fn encoded_bytes(&self) -> usize {
        if self.ty.is_variable_length() {
            self.variable_encoded_bytes()
        } else {
            self.fixed_encoded_bytes()
        }
    }

    /// Consume the builder and emit the sealed dictionary.
    pub fn seal(self) -> CompressionDictionary {
        if self.ty.is_variable_length() {
            let mut offsets = Vec::with_capacity(self.values.len() + 1);
            let mut blob = Vec::new();
            offsets.push(0u32);
            for value in &self.values {
                blob.extend_from_slice(&encode_value(self.ty, value));
                offsets.push(blob.len() as u32);
            }
            CompressionDictionary::Variable {
                ty: self.ty,
                offsets,
                blob,
            }
        } else {
            let width = self.ty.natural_width_bytes();
            let mut values = Vec::with_capacity(self.values.len() * width);
            for value in &self.values {
                values.extend_from_slice(&encode_value(self.ty, value));
            }
            CompressionDictionary::Fixed {
                ty: self.ty,
                width,
                values,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seal_ints(vals: &[i32]) -> CompressionDictionary {
        let mut b = DictionaryBuilder::new(Type::Int);
        for v in vals {
            b.try_insert(&Value::Int(*v));
        }
        b.seal()
    }

    #[test]
    fn round_trip_and_ordering() {
        let dict = seal_ints(&[30, 10, 20, 10]);
        assert_eq!(dict.num_codes(), 3);
        for c in 0..dict.num_codes() {
            let v = dict.value_for(c).unwrap();
            assert_eq!(dict.code_for(&v), c);
        }
        for c1 in 0..dict.num_codes() {
            for c2 in (c1 + 1)..dict.num_codes() {
                let v1 = dict.value_for(c1).unwrap();
                let v2 = dict.value_for(c2).unwrap();
                assert_eq!(compare_values(&v1, &v2), Some(Ordering::Less));
            }
        }
    }

    #[test]
    fn code_out_of_range() {
        let dict = seal_ints(&[1, 2, 3]);
        assert!(dict.value_for(3).is_err());
    }

    #[test]
    fn limit_codes_equal_and_range() {
        let dict = seal_ints(&[10, 20, 30]);
        assert_eq!(dict.limit_codes(ComparisonOp::Equal, &Value::Int(20)), (1, 2));
        assert_eq!(dict.limit_codes(ComparisonOp::Equal, &Value::Int(25)), (3, 3));
        assert_eq!(dict.limit_codes(ComparisonOp::LessOrEqual, &Value::Int(20)), (0, 2));
        assert_eq!(dict.limit_codes(ComparisonOp::Greater, &Value::Int(20)), (2, 3));
    }

    #[test]
    fn builder_rollback_restores_state() {
        let mut b = DictionaryBuilder::new(Type::Int);
        b.try_insert(&Value::Int(1));
        let before = b.encoded_bytes();
        let changed = b.try_insert(&Value::Int(2));
        assert!(changed);
        b.undo_insert(&Value::Int(2));
        assert_eq!(b.encoded_bytes(), before);
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn variable_length_dictionary_round_trips_through_bytes() {
        let mut b = DictionaryBuilder::new(Type::VarChar(8));
        for s in ["apple", "banana", "cherry"] {
            b.try_insert(&Value::VarChar(s.as_bytes().to_vec()));
        }
        let dict = b.seal();
        let bytes = dict.encode();
        let decoded = CompressionDictionary::decode(Type::VarChar(8), &bytes).unwrap();
        assert_eq!(decoded.num_codes(), 3);
        assert_eq!(decoded.value_for(0).unwrap(), Value::VarChar(b"apple".to_vec()));
        assert_eq!(decoded.value_for(2).unwrap(), Value::VarChar(b"cherry".to_vec()));
    }
}
