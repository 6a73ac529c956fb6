//! Interprets a sealed compressed page: decodes individual values and
//! answers single-attribute predicates by pushing the comparison down
//! onto coded values wherever the coding allows it.

use crate::comparator::{compare_le_bytes, ComparisonOp};
use crate::dictionary::{decode_value, CompressionDictionary};
use crate::error::{Result, StorageError};
use crate::page::compressed::descriptor::PageDescriptor;
use crate::page::compressed::truncation::{truncated_decision, TruncatedDecision};
use crate::page::compressed::{Coding, Layout};
use crate::predicate::Comparison;
use crate::types::{Relation, TupleId, Type, Value};

const HEADER_BYTES: usize = 4;

#[derive(Clone)]
pub struct CompressedPageReader {
    relation: Relation,
    layout: Layout,
    bytes: Vec<u8>,
    num_tuples: usize,
    codings: Vec<Coding>,
    dictionaries: Vec<CompressionDictionary>,
    /// `Some(index into dictionaries)` for attributes coded `Dictionary`.
    dict_index_for_attr: Vec<Option<usize>>,
    /// Byte offset of attribute `i`'s code within a row (`PackedRowStore`)
    /// or the start of its stripe (`ColumnStore`).
    attr_offsets: Vec<usize>,
    row_width: usize,
    max_tuples: usize,
}

impl CompressedPageReader {
    /// Interprets `bytes` as a sealed compressed page for `relation` using
    /// the coding choices recorded in `descriptor`, under the given
    /// `layout`. `layout` is not recoverable from `bytes` itself and must
    /// be supplied by the caller.
    pub fn attach(
        bytes: Vec<u8>,
        relation: Relation,
        descriptor: PageDescriptor,
        layout: Layout,
    ) -> Result<Self> {
        if descriptor.attributes.len() != relation.num_attributes() {
            return Err(StorageError::malformed_block(
                "compressed page descriptor attribute count does not match relation",
            ));
        }
        if bytes.len() < HEADER_BYTES {
            return Err(StorageError::malformed_block(
                "compressed page shorter than its header",
            ));
        }
        let num_tuples = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;

        let descriptor_bytes = descriptor.attributes.len() * 8;
        let mut cursor = HEADER_BYTES + descriptor_bytes;
        let mut dictionaries = Vec::new();
        let mut dict_index_for_attr = Vec::with_capacity(descriptor.attributes.len());
        let mut codings = Vec::with_capacity(descriptor.attributes.len());

        for (attr, attr_descriptor) in relation.attributes().iter().zip(&descriptor.attributes) {
            let width = attr_descriptor.attribute_size_bytes as usize;
            if attr_descriptor.dictionary_size_bytes > 0 {
                let dict_len = attr_descriptor.dictionary_size_bytes as usize;
                if bytes.len() < cursor + dict_len {
                    return Err(StorageError::malformed_block(
                        "compressed page dictionary region truncated",
                    ));
                }
                let dict = CompressionDictionary::decode(attr.ty, &bytes[cursor..cursor + dict_len])?;
                cursor += dict_len;
                dict_index_for_attr.push(Some(dictionaries.len()));
                codings.push(Coding::Dictionary { width, dict_index: dictionaries.len() });
                dictionaries.push(dict);
            } else if width == attr.ty.natural_width_bytes() {
                dict_index_for_attr.push(None);
                codings.push(Coding::Raw { width });
            } else if attr.ty.is_integer() && matches!(width, 1 | 2 | 4) {
                dict_index_for_attr.push(None);
                codings.push(Coding::Truncated { width });
            } else {
                return Err(StorageError::malformed_block(
                    "compressed page attribute width does not match any known coding",
                ));
            }
        }

        let row_width: usize = codings.iter().map(Coding::width).sum();
        let payload_start = cursor;
        let max_tuples = if row_width == 0 {
            num_tuples
        } else {
            (bytes.len().saturating_sub(payload_start)) / row_width
        };
        if num_tuples > max_tuples {
            return Err(StorageError::malformed_block(
                "compressed page header claims more tuples than its payload can hold",
            ));
        }

        let mut attr_offsets = Vec::with_capacity(codings.len());
        match layout {
            Layout::PackedRowStore => {
                let mut offset = 0usize;
                for coding in &codings {
                    attr_offsets.push(offset);
                    offset += coding.width();
                }
            }
            Layout::ColumnStore { .. } => {
                let mut offset = payload_start;
                for coding in &codings {
                    attr_offsets.push(offset);
                    offset += coding.width() * max_tuples;
                }
            }
        }

        Ok(Self {
            relation,
            layout,
            bytes,
            num_tuples,
            codings,
            dictionaries,
            dict_index_for_attr,
            attr_offsets,
            row_width,
            max_tuples,
        })
    }

    pub fn num_tuples(&self) -> usize {
        self.num_tuples
    }

    pub fn max_tuples(&self) -> usize {
        self.max_tuples
    }

    fn code_slice(&self, tuple_index: usize, attr_index: usize) -> &[u8] {
        let width = self.codings[attr_index].width();
        let start = match self.layout {
            Layout::PackedRowStore => {
                HEADER_BYTES
                    + self.relation.num_attributes() * 8
                    + tuple_index * self.row_width
                    + self.attr_offsets[attr_index]
            }
            Layout::ColumnStore { .. } => self.attr_offsets[attr_index] + tuple_index * width,
        };
        &self.bytes[start..start + width]
    }

    fn code_as_u64(&self, tuple_index: usize, attr_index: usize) -> u64 {
        let slice = self.code_slice(tuple_index, attr_index);
        let mut buf = [0u8; 8];
        buf[..slice.len()].copy_from_slice(slice);
        u64::from_le_bytes(buf)
    }

    /// The decoded value of `tuple_index`'s `attr_index`th attribute.
    pub fn get(&self, tuple_index: usize, attr_index: usize) -> Value {
        let attr = &self.relation.attributes()[attr_index];
        match self.codings[attr_index] {
            Coding::Raw { .. } => decode_value(attr.ty, self.code_slice(tuple_index, attr_index)),
            Coding::Truncated { .. } => {
                let v = self.code_as_u64(tuple_index, attr_index);
                match attr.ty {
                    Type::Int => Value::Int(v as i32),
                    Type::Long => Value::Long(v as i64),
                    _ => unreachable!("truncation coding only occurs on integer attributes"),
                }
            }
            Coding::Dictionary { dict_index, .. } => {
                let code = self.code_as_u64(tuple_index, attr_index) as u32;
                self.dictionaries[dict_index]
                    .value_for(code)
                    .expect("a sealed page's codes always index its own dictionary")
            }
        }
    }

    /// Tuple ids satisfying `comparison`, pushing the comparison down onto
    /// coded values without decoding every row when the coding allows it.
    pub fn matches(&self, comparison: &Comparison) -> Vec<TupleId> {
        let attr_index = comparison.attribute_index;
        match self.codings[attr_index] {
            Coding::Dictionary { dict_index, .. } => self.matches_dictionary(comparison, dict_index),
            Coding::Truncated { width } => self.matches_truncated(comparison, width),
            Coding::Raw { .. } => self.matches_raw(comparison),
        }
    }

    fn matches_dictionary(&self, comparison: &Comparison, dict_index: usize) -> Vec<TupleId> {
        let dict = &self.dictionaries[dict_index];
        let in_range: Box<dyn Fn(u32) -> bool> = if comparison.op == ComparisonOp::NotEqual {
            let (lo, hi) = dict.limit_codes(ComparisonOp::Equal, &comparison.literal);
            Box::new(move |code| code < lo || code >= hi)
        } else {
            let (lo, hi) = dict.limit_codes(comparison.op, &comparison.literal);
            Box::new(move |code| code >= lo && code < hi)
        };
        (0..self.num_tuples)
            .filter(|&t| in_range(self.code_as_u64(t, comparison.attribute_index) as u32))
            .map(|t| t as TupleId)
            .collect()
    }

    fn matches_truncated(&self, comparison: &Comparison, width: usize) -> Vec<TupleId> {
        let literal = match comparison.literal.as_f64() {
            Some(v) => v,
            None => return Vec::new(),
        };
        match truncated_decision(comparison.op, literal, width) {
            TruncatedDecision::AlwaysTrue => (0..self.num_tuples as TupleId).collect(),
            TruncatedDecision::AlwaysFalse => Vec::new(),
            TruncatedDecision::Bounded(bound) => (0..self.num_tuples)
                .filter(|&t| {
                    let code = self.code_as_u64(t, comparison.attribute_index) as u32;
                    comparison.op.apply_ordering(code.cmp(&bound))
                })
                .map(|t| t as TupleId)
                .collect(),
        }
    }

    fn matches_raw(&self, comparison: &Comparison) -> Vec<TupleId> {
        (0..self.num_tuples)
            .filter(|&t| {
                let value = self.get(t, comparison.attribute_index);
                crate::comparator::compare_values(&value, &comparison.literal)
                    .map(|ord| comparison.op.apply_ordering(ord))
                    .unwrap_or(false)
            })
            .map(|t| t as TupleId)
            .collect()
    }
}

/// Compares two raw codes of the same width directly, without decoding —
/// used by callers (e.g. the CSB+-tree) that already hold coded keys.
pub fn compare_codes(width: usize, left: &[u8], right: &[u8]) -> std::cmp::Ordering {
    compare_le_bytes(width, left, right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::compressed::builder::CompressedPageBuilder;
    use crate::types::{Attribute, Tuple};

    fn relation() -> Relation {
        Relation::new(
            "events",
            vec![
                Attribute::new(0, Type::Long, false),
                Attribute::new(1, Type::VarChar(16), false),
            ],
        )
    }

    fn build_and_attach(rows: &[(i64, &str)], layout: Layout) -> CompressedPageReader {
        let relation = relation();
        let mut builder = CompressedPageBuilder::new(relation.clone(), 4096);
        for (n, s) in rows {
            builder
                .add_tuple(&Tuple::new(vec![Value::Long(*n), Value::VarChar(s.as_bytes().to_vec())]))
                .unwrap();
        }
        let (bytes, descriptor) = builder.seal(layout).unwrap();
        CompressedPageReader::attach(bytes, relation, descriptor, layout).unwrap()
    }

    #[test]
    fn truncated_predicate_matches_without_full_decode() {
        let reader = build_and_attach(
            &[(1, "a"), (2, "b"), (3, "c"), (4, "d")],
            Layout::PackedRowStore,
        );
        let found = reader.matches(&Comparison::new(0, ComparisonOp::LessOrEqual, Value::Long(2)));
        assert_eq!(found, vec![0, 1]);
    }

    #[test]
    fn dictionary_predicate_handles_not_equal() {
        let reader = build_and_attach(
            &[(1, "red"), (2, "blue"), (3, "red")],
            Layout::PackedRowStore,
        );
        let found = reader.matches(&Comparison::new(
            1,
            ComparisonOp::NotEqual,
            Value::VarChar(b"red".to_vec()),
        ));
        assert_eq!(found, vec![1]);
    }

    #[test]
    fn get_round_trips_all_rows() {
        let reader = build_and_attach(&[(10, "x"), (20, "y")], Layout::PackedRowStore);
        assert_eq!(reader.get(0, 0), Value::Long(10));
        assert_eq!(reader.get(1, 1), Value::VarChar(b"y".to_vec()));
    }

    #[test]
    fn column_store_layout_round_trips() {
        let reader = build_and_attach(
            &[(3, "c"), (1, "a"), (2, "b")],
            Layout::ColumnStore { sort_attribute_index: 0 },
        );
        assert_eq!(reader.num_tuples(), 3);
    }
}
