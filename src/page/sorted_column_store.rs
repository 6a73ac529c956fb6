//! Sorted Column-Store Page: a fixed-schema, fully sorted page with
//! parallel per-attribute column stripes, no compression, no
//! variable-length or nullable attributes.

use crate::comparator::{compare_values, ComparisonOp};
use crate::dictionary::{decode_value, encode_value};
use crate::error::{BlockKind, Result, StorageError};
use crate::predicate::Comparison;
use crate::types::{Relation, Tuple, TupleId, Value};
use std::cmp::Ordering;

const HEADER_BYTES: usize = 4;

/// A sorted column-store page over an owned block of memory.
pub struct SortedColumnStorePage {
    relation: Relation,
    sort_attribute_index: usize,
    bytes: Vec<u8>,
    max_tuples: usize,
    num_tuples: usize,
    sorted: bool,
    stripe_offsets: Vec<usize>,
    attr_widths: Vec<usize>,
}

impl SortedColumnStorePage {
    /// Creates a new page over a block of `block_bytes` bytes. `relation`
    /// must have no variable-length or nullable attributes — this is a
    /// precondition of this page layout, not a recoverable error.
    pub fn new(relation: Relation, sort_attribute_id: u32, block_bytes: usize) -> Result<Self> {
        assert!(
            !relation.is_variable_length(),
            "sorted column-store page does not support variable-length attributes"
        );
        assert!(
            relation.attributes().iter().all(|a| !a.nullable),
            "sorted column-store page does not support nullable attributes"
        );
        let sort_attribute_index = relation
            .attributes()
            .iter()
            .position(|a| a.id == sort_attribute_id)
            .expect("sort attribute id must exist in the relation");

        let attr_widths: Vec<usize> = relation
            .attributes()
            .iter()
            .map(|a| a.ty.natural_width_bytes())
            .collect();
        let fixed_tuple_bytes: usize = attr_widths.iter().sum();
        if block_bytes <= HEADER_BYTES || fixed_tuple_bytes == 0 {
            return Err(StorageError::block_memory_too_small(
                BlockKind::SortedColumnStorePage,
                HEADER_BYTES + fixed_tuple_bytes,
                block_bytes,
            ));
        }
        let max_tuples = (block_bytes - HEADER_BYTES) / fixed_tuple_bytes;
        if max_tuples == 0 {
            return Err(StorageError::block_memory_too_small(
                BlockKind::SortedColumnStorePage,
                HEADER_BYTES + fixed_tuple_bytes,
                block_bytes,
            ));
        }

        let mut stripe_offsets = Vec::with_capacity(attr_widths.len());
        let mut cursor = HEADER_BYTES;
        for width in &attr_widths {
            stripe_offsets.push(cursor);
            cursor += width * max_tuples;
        }

        let mut bytes = vec![0u8; block_bytes];
        bytes[0..4].copy_from_slice(&0i32.to_le_bytes());

        Ok(Self {
            relation,
            sort_attribute_index,
            bytes,
            max_tuples,
            num_tuples: 0,
            sorted: true,
            stripe_offsets,
            attr_widths,
        })
    }

    pub fn num_tuples(&self) -> usize {
        self.num_tuples
    }

    pub fn max_tuples(&self) -> usize {
        self.max_tuples
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    fn write_header(&mut self) {
        self.bytes[0..4].copy_from_slice(&(self.num_tuples as i32).to_le_bytes());
    }

    fn slot_bytes(&self, attr: usize, tuple_id: usize) -> &[u8] {
        let width = self.attr_widths[attr];
        let base = self.stripe_offsets[attr] + tuple_id * width;
        &self.bytes[base..base + width]
    }

    fn slot_bytes_mut(&mut self, attr: usize, tuple_id: usize) -> &mut [u8] {
        let width = self.attr_widths[attr];
        let base = self.stripe_offsets[attr] + tuple_id * width;
        &mut self.bytes[base..base + width]
    }

    /// O(1) pointer into the stripe.
    pub fn get(&self, tuple_id: TupleId, attr: usize) -> Value {
        let ty = self.relation.attributes()[attr].ty;
        decode_value(ty, self.slot_bytes(attr, tuple_id as usize))
    }

    fn write_tuple_at(&mut self, pos: usize, tuple: &Tuple) {
        for (attr, value) in tuple.values.iter().enumerate() {
            let ty = self.relation.attributes()[attr].ty;
            let encoded = encode_value(ty, value);
            self.slot_bytes_mut(attr, pos).copy_from_slice(&encoded);
        }
    }

    /// Shifts stripe contents in `[from, to)` right by one slot, in every
    /// stripe, to make room at `from`.
    fn shift_right(&mut self, from: usize, to: usize) {
        for attr in 0..self.attr_widths.len() {
            let width = self.attr_widths[attr];
            let base = self.stripe_offsets[attr];
            self.bytes
                .copy_within(base + from * width..base + to * width, base + (from + 1) * width);
        }
    }

    /// Shifts stripe contents in `[from, to)` left by one slot, in every
    /// stripe, closing the gap left by a deletion at `from - 1`.
    fn shift_left(&mut self, from: usize, to: usize) {
        for attr in 0..self.attr_widths.len() {
            let width = self.attr_widths[attr];
            let base = self.stripe_offsets[attr];
            self.bytes
                .copy_within(base + from * width..base + to * width, base + (from - 1) * width);
        }
    }

    fn sort_attribute_ordering(&self, tuple_id: usize, probe: &Value) -> Ordering {
        let value = self.get(tuple_id as TupleId, self.sort_attribute_index);
        compare_values(&value, probe).unwrap_or(Ordering::Less)
    }

    /// Binary-searches the sort-attribute stripe for the upper-bound
    /// insertion position among the first `self.num_tuples` entries.
    fn upper_bound_position(&self, probe: &Value) -> usize {
        let (mut lo, mut hi) = (0usize, self.num_tuples);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.sort_attribute_ordering(mid, probe) == Ordering::Greater {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        lo
    }

    /// Inserts `tuple`, keeping the page sorted on the sort attribute.
    /// Fails with `Full` when the page has no room.
    pub fn insert(&mut self, tuple: &Tuple) -> Result<TupleId> {
        if self.num_tuples == self.max_tuples {
            return Err(StorageError::full(BlockKind::SortedColumnStorePage));
        }
        let sort_value = tuple.get(self.sort_attribute_index);
        let pos = self.upper_bound_position(sort_value);
        if pos < self.num_tuples {
            self.shift_right(pos, self.num_tuples);
        }
        self.write_tuple_at(pos, tuple);
        self.num_tuples += 1;
        self.write_header();
        Ok(pos as TupleId)
    }

    /// Appends `tuple` at the end without maintaining sort order; the page
    /// is marked unsorted until the next `rebuild()`.
    pub fn insert_batch(&mut self, tuple: &Tuple) -> Result<TupleId> {
        if self.num_tuples == self.max_tuples {
            return Err(StorageError::full(BlockKind::SortedColumnStorePage));
        }
        let pos = self.num_tuples;
        self.write_tuple_at(pos, tuple);
        self.num_tuples += 1;
        self.sorted = false;
        self.write_header();
        Ok(pos as TupleId)
    }

    /// Deletes the tuple at `tuple_id`, shifting subsequent tuples left.
    pub fn delete(&mut self, tuple_id: TupleId) -> Result<()> {
        let tuple_id = tuple_id as usize;
        assert!(tuple_id < self.num_tuples, "delete of out-of-range tuple id");
        if tuple_id + 1 < self.num_tuples {
            self.shift_left(tuple_id + 1, self.num_tuples);
        }
        self.num_tuples -= 1;
        self.write_header();
        Ok(())
    }

    /// If `predicate` targets the sort attribute, binary-searches for the
    /// matching contiguous range; otherwise falls back to a full scan.
    pub fn matches(&self, predicate: &Comparison) -> Vec<TupleId> {
        if predicate.attribute_index == self.sort_attribute_index && self.sorted {
            let (lo, hi) = match predicate.op {
                ComparisonOp::Equal => {
                    let lo = self.lower_bound_position(&predicate.literal);
                    let hi = self.upper_bound_position(&predicate.literal);
                    (lo, hi)
                }
                ComparisonOp::NotEqual => {
                    // Falls back to a full scan: the matching set is not contiguous.
                    return self.scan_fallback(predicate);
                }
                ComparisonOp::Less => (0, self.lower_bound_position(&predicate.literal)),
                ComparisonOp::LessOrEqual => (0, self.upper_bound_position(&predicate.literal)),
                ComparisonOp::Greater => (self.upper_bound_position(&predicate.literal), self.num_tuples),
                ComparisonOp::GreaterOrEqual => {
                    (self.lower_bound_position(&predicate.literal), self.num_tuples)
                }
            };
            (lo as TupleId..hi as TupleId).collect()
        } else {
            self.scan_fallback(predicate)
        }
    }

    fn lower_bound_position(&self, probe: &Value) -> usize {
        let (mut lo, mut hi) = (0usize, self.num_tuples);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.sort_attribute_ordering(mid, probe) == Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    fn scan_fallback(&self, predicate: &Comparison) -> Vec<TupleId> {
        let mut out = Vec::new();
        for tid in 0..self.num_tuples {
            let value = self.get(tid as TupleId, predicate.attribute_index);
            let matched = match compare_values(&value, &predicate.literal) {
                Some(ord) => predicate.op.apply_ordering(ord),
                None => false,
            };
            if matched {
                out.push(tid as TupleId);
            }
        }
        out
    }

    /// Sorts the page on the sort attribute if it is not already sorted.
    /// Returns `false` if no work was needed. Preserves the longest
    /// already-sorted prefix to minimize the amount of data copied.
    pub fn rebuild(&mut self) -> bool {
        if self.sorted {
            return false;
        }
        let mut ordering: Vec<(Value, usize)> = (0..self.num_tuples)
            .map(|tid| (self.get(tid as TupleId, self.sort_attribute_index), tid))
            .collect();
        ordering.sort_by(|a, b| compare_values(&a.0, &b.0).unwrap_or(Ordering::Equal));

        let mut prefix = 0;
        while prefix < ordering.len() && ordering[prefix].1 == prefix {
            prefix += 1;
        }

        let tail_len = self.num_tuples - prefix;
        if tail_len > 0 {
            for attr in 0..self.attr_widths.len() {
                let width = self.attr_widths[attr];
                let mut scratch = vec![0u8; tail_len * width];
                for (i, (_, original_tid)) in ordering[prefix..].iter().enumerate() {
                    let src = self.slot_bytes(attr, *original_tid);
                    scratch[i * width..(i + 1) * width].copy_from_slice(src);
                }
                let base = self.stripe_offsets[attr] + prefix * width;
                self.bytes[base..base + tail_len * width].copy_from_slice(&scratch);
            }
        }
        self.sorted = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Attribute, Type};

    fn schema() -> Relation {
        Relation::new(
            "t",
            vec![
                Attribute::new(0, Type::Int, false),
                Attribute::new(1, Type::Int, false),
            ],
        )
    }

    #[test]
    fn scenario_sorted_insert() {
        let mut page = SortedColumnStorePage::new(schema(), 0, 4096).unwrap();
        page.insert(&Tuple::new(vec![Value::Int(3), Value::Int(30)])).unwrap();
        page.insert(&Tuple::new(vec![Value::Int(1), Value::Int(10)])).unwrap();
        page.insert(&Tuple::new(vec![Value::Int(2), Value::Int(20)])).unwrap();

        assert_eq!(page.get(0, 0), Value::Int(1));
        assert_eq!(page.get(1, 0), Value::Int(2));
        assert_eq!(page.get(2, 0), Value::Int(3));
        assert_eq!(page.get(0, 1), Value::Int(10));
        assert_eq!(page.get(1, 1), Value::Int(20));
        assert_eq!(page.get(2, 1), Value::Int(30));
    }

    #[test]
    fn full_when_at_capacity() {
        let mut page = SortedColumnStorePage::new(schema(), 0, 4 + 8 * 2).unwrap();
        assert_eq!(page.max_tuples(), 2);
        page.insert(&Tuple::new(vec![Value::Int(1), Value::Int(1)])).unwrap();
        page.insert(&Tuple::new(vec![Value::Int(2), Value::Int(2)])).unwrap();
        assert!(page.insert(&Tuple::new(vec![Value::Int(3), Value::Int(3)])).is_err());
    }

    #[test]
    fn rebuild_sorts_batch_inserted_tuples() {
        let mut page = SortedColumnStorePage::new(schema(), 0, 4096).unwrap();
        for v in [5, 3, 4, 1, 2] {
            page.insert_batch(&Tuple::new(vec![Value::Int(v), Value::Int(v * 10)])).unwrap();
        }
        assert!(!page.is_sorted());
        assert!(page.rebuild());
        for i in 0..page.num_tuples() as TupleId {
            assert_eq!(page.get(i, 0), Value::Int(i as i32 + 1));
        }
        assert!(!page.rebuild());
    }

    #[test]
    fn matches_sort_attribute_uses_binary_search() {
        let mut page = SortedColumnStorePage::new(schema(), 0, 4096).unwrap();
        for v in 0..10 {
            page.insert(&Tuple::new(vec![Value::Int(v), Value::Int(v)])).unwrap();
        }
        let hits = page.matches(&Comparison::new(0, ComparisonOp::Less, Value::Int(3)));
        assert_eq!(hits, vec![0, 1, 2]);
        let hits = page.matches(&Comparison::new(0, ComparisonOp::Equal, Value::Int(5)));
        assert_eq!(hits, vec![5]);
    }

    #[test]
    fn delete_shifts_subsequent_tuples() {
        let mut page = SortedColumnStorePage::new(schema(), 0, 4096).unwrap();
        for v in 0..5 {
            page.insert(&Tuple::new(vec![Value::Int(v), Value::Int(v)])).unwrap();
        }
        page.delete(1).unwrap();
        assert_eq!(page.num_tuples(), 4);
        assert_eq!(page.get(1, 0), Value::Int(2));
    }
}
