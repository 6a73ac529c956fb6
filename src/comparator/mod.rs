//! Comparator algebra.
//!
//! Exposes `can_compare`/`make_comparator`, the only place in the crate
//! where type checking of a comparison occurs. Every other component —
//! the sorted column-store page, the compression dictionary, the CSB+-tree
//! — consumes an already-constructed `UncheckedComparator` and performs no
//! further type checking on its hot path.
//!
//! The original design generates one concrete comparator per
//! `(left_type, left_nullable, right_type, right_nullable, op)` tuple. This
//! crate collapses the numeric half of that Cartesian product into a single
//! generic comparator over `f64` magnitude, and the string half into a
//! single adjusted-strncmp comparator; both still type-check once at
//! construction and dispatch branch-free afterward per comparison.

use crate::error::{Result, StorageError};
use crate::types::{Type, Value};
use std::cmp::Ordering;

/// The six basic comparisons. Comparing against NULL always yields `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl ComparisonOp {
    /// Evaluate this operator given the three-way ordering of two
    /// non-null operands.
    pub fn apply_ordering(&self, ord: Ordering) -> bool {
        match self {
            ComparisonOp::Equal => ord == Ordering::Equal,
            ComparisonOp::NotEqual => ord != Ordering::Equal,
            ComparisonOp::Less => ord == Ordering::Less,
            ComparisonOp::LessOrEqual => ord != Ordering::Greater,
            ComparisonOp::Greater => ord == Ordering::Greater,
            ComparisonOp::GreaterOrEqual => ord != Ordering::Less,
        }
    }

    /// The complement of this operator, e.g. `Less` negated is
    /// `GreaterOrEqual`. Used to answer `NotEqual` as the complement of
    /// `Equal` at call sites that only natively support the other five.
    pub fn negate(&self) -> ComparisonOp {
        match self {
            ComparisonOp::Equal => ComparisonOp::NotEqual,
            ComparisonOp::NotEqual => ComparisonOp::Equal,
            ComparisonOp::Less => ComparisonOp::GreaterOrEqual,
            ComparisonOp::LessOrEqual => ComparisonOp::Greater,
            ComparisonOp::Greater => ComparisonOp::LessOrEqual,
            ComparisonOp::GreaterOrEqual => ComparisonOp::Less,
        }
    }
}

/// A comparator which can compare two values without re-checking their
/// types. Comparing against `Value::Null` always returns `false`.
pub trait UncheckedComparator: Send + Sync {
    fn compare(&self, left: &Value, right: &Value) -> bool;
}

struct NumericComparator {
    op: ComparisonOp,
}

impl UncheckedComparator for NumericComparator {
    fn compare(&self, left: &Value, right: &Value) -> bool {
        match (left.as_f64(), right.as_f64()) {
            (Some(l), Some(r)) => match l.partial_cmp(&r) {
                Some(ord) => self.op.apply_ordering(ord),
                None => false,
            },
            _ => false,
        }
    }
}

/// Compares `Char`/`VarChar` byte buffers with an adjusted `strncmp`: when
/// one buffer is a strict prefix of the other, the longer buffer compares
/// greater (rather than stopping at a NUL/length boundary as plain
/// `strncmp` would for an unterminated fixed-length field).
struct StringComparator {
    op: ComparisonOp,
}

impl UncheckedComparator for StringComparator {
    fn compare(&self, left: &Value, right: &Value) -> bool {
        match (left.as_bytes(), right.as_bytes()) {
            (Some(l), Some(r)) => {
                let trimmed_l = trim_trailing_padding(l);
                let trimmed_r = trim_trailing_padding(r);
                self.op.apply_ordering(trimmed_l.cmp(trimmed_r))
            }
            _ => false,
        }
    }
}

/// `Char(n)` fields may be space-padded or non-terminated; `VarChar`
/// values stored in memory already exclude their terminator. Trimming
/// trailing NUL/space bytes before comparing makes both representations
/// compare consistently with the type's logical (unpadded) value.
fn trim_trailing_padding(bytes: &[u8]) -> &[u8] {
    let mut end = bytes.len();
    while end > 0 && (bytes[end - 1] == 0 || bytes[end - 1] == b' ') {
        end -= 1;
    }
    &bytes[..end]
}

/// Directly orders two values without constructing an `UncheckedComparator`.
/// Used internally by the compression dictionary and the sorted
/// column-store page, which need a plain `Ordering` rather than a single
/// operator's boolean answer. Returns `None` for `Null` operands or
/// operands that are not mutually comparable (numeric vs. string).
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
        return l.partial_cmp(&r);
    }
    if let (Some(l), Some(r)) = (left.as_bytes(), right.as_bytes()) {
        return Some(trim_trailing_padding(l).cmp(trim_trailing_padding(r)));
    }
    None
}

/// Whether `left` and `right` can be compared by any of the six basic
/// comparisons: both numeric, or both string-like.
pub fn can_compare(left: &Type, right: &Type) -> bool {
    (left.is_numeric() && right.is_numeric()) || (left.is_string() && right.is_string())
}

/// Construct an `UncheckedComparator` for a pair of types and a comparison
/// operator. Fails with `TypeMismatch` if the types cannot be compared.
pub fn make_comparator(
    op: ComparisonOp,
    left: &Type,
    right: &Type,
) -> Result<Box<dyn UncheckedComparator>> {
    if !can_compare(left, right) {
        return Err(StorageError::type_mismatch(left.to_string(), right.to_string()));
    }
    if left.is_numeric() {
        Ok(Box::new(NumericComparator { op }))
    } else {
        Ok(Box::new(StringComparator { op }))
    }
}

/// Compares two little-endian unsigned integer codes of the given byte
/// width (1, 2, or 4). This is the narrow waist used by the compressed
/// page reader and the CSB+-tree when comparing coded keys directly,
/// without ever materializing the decoded value.
pub fn compare_le_bytes(width: usize, left: &[u8], right: &[u8]) -> Ordering {
    debug_assert!(width == 1 || width == 2 || width == 4);
    let l = read_le_u32(left, width);
    let r = read_le_u32(right, width);
    l.cmp(&r)
}

fn read_le_u32(bytes: &[u8], width: usize) -> u32 {
    match width {
        1 => bytes[0] as u32,
        2 => u16::from_le_bytes([bytes[0], bytes[1]]) as u32,
        4 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        _ => unreachable!("code width must be 1, 2, or 4 bytes"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_cross_type_comparison() {
        let cmp = make_comparator(ComparisonOp::Less, &Type::Int, &Type::Double).unwrap();
        assert!(cmp.compare(&Value::Int(3), &Value::Double(3.5)));
        assert!(!cmp.compare(&Value::Int(4), &Value::Double(3.5)));
    }

    #[test]
    fn null_never_compares_true() {
        let cmp = make_comparator(ComparisonOp::Equal, &Type::Int, &Type::Int).unwrap();
        assert!(!cmp.compare(&Value::Null, &Value::Int(1)));
        assert!(!cmp.compare(&Value::Int(1), &Value::Null));
        assert!(!cmp.compare(&Value::Null, &Value::Null));
    }

    #[test]
    fn string_comparison_treats_longer_prefix_as_greater() {
        let cmp = make_comparator(ComparisonOp::Less, &Type::VarChar(8), &Type::VarChar(8)).unwrap();
        assert!(cmp.compare(&Value::VarChar(b"ab".to_vec()), &Value::VarChar(b"abc".to_vec())));
    }

    #[test]
    fn incompatible_types_are_rejected() {
        let err = make_comparator(ComparisonOp::Equal, &Type::Int, &Type::VarChar(8));
        assert!(err.is_err());
    }

    #[test]
    fn le_byte_code_ordering() {
        assert_eq!(compare_le_bytes(2, &300u16.to_le_bytes(), &10u16.to_le_bytes()), Ordering::Greater);
    }
}
