//! Builds a compressed page by watching the tuples as they arrive,
//! tracking per-attribute dictionaries and integer ranges, and picking
//! whichever coding is cheapest once the page is sealed.

use crate::dictionary::DictionaryBuilder;
use crate::error::{BlockKind, Result, StorageError};
use crate::page::compressed::descriptor::{AttributeDescriptor, PageDescriptor};
use crate::page::compressed::truncation::truncation_width_for_max;
use crate::page::compressed::{Coding, Layout};
use crate::types::{Relation, Tuple, Type, Value};

const HEADER_BYTES: usize = 4;

/// Tracks the non-negative range of an `Int`/`Long` column to decide
/// whether truncation coding is available for it. A column that has seen
/// any negative value can never use truncation, since truncated codes
/// are unsigned.
#[derive(Debug, Clone, Copy)]
struct IntTracker {
    max_nonneg: i64,
    seen_negative: bool,
    seen_any: bool,
}

impl IntTracker {
    fn new() -> Self {
        Self { max_nonneg: 0, seen_negative: false, seen_any: false }
    }

    fn observe(&mut self, v: i64) {
        self.seen_any = true;
        if v < 0 {
            self.seen_negative = true;
        } else if v > self.max_nonneg {
            self.max_nonneg = v;
        }
    }

    fn truncated_width(&self) -> Option<usize> {
        if self.seen_negative {
            return None;
        }
        if !self.seen_any {
            return Some(1);
        }
        truncation_width_for_max(self.max_nonneg as u64)
    }
}

struct AttributeState {
    dictionary: DictionaryBuilder,
    int_tracker: Option<IntTracker>,
}

pub struct CompressedPageBuilder {
    relation: Relation,
    block_bytes: usize,
    attributes: Vec<AttributeState>,
    tuples: Vec<Tuple>,
}

impl CompressedPageBuilder {
    pub fn new(relation: Relation, block_bytes: usize) -> Self {
        for attr in relation.attributes() {
            assert!(!attr.nullable, "compressed pages do not encode null values");
        }
        let attributes = relation
            .attributes()
            .iter()
            .map(|attr| AttributeState {
                dictionary: DictionaryBuilder::new(attr.ty),
                int_tracker: if attr.ty.is_integer() { Some(IntTracker::new()) } else { None },
            })
            .collect();
        Self { relation, block_bytes, attributes, tuples: Vec::new() }
    }

    pub fn num_tuples(&self) -> usize {
        self.tuples.len()
    }

    /// The smallest total byte cost (not just code width) of coding this
    /// attribute across `num_tuples` rows: raw, truncated (if available),
    /// or dictionary (whose cost includes the dictionary's own encoded
    /// bytes, not just its per-row code width) — per §4.4's "smaller total
    /// bytes" rule, not a width-only comparison.
    fn best_coding_bytes(ty: Type, state: &AttributeState, num_tuples: usize) -> usize {
        let mut best = ty.natural_width_bytes() * num_tuples;
        if let Some(tracker) = state.int_tracker.as_ref() {
            if let Some(w) = tracker.truncated_width() {
                best = best.min(w * num_tuples);
            }
        }
        if state.dictionary.len() > 0 {
            let dict_bytes = state.dictionary.encoded_bytes();
            let width = crate::dictionary::code_byte_width(state.dictionary.len() as u32);
            best = best.min(dict_bytes + width * num_tuples);
        }
        best
    }

    /// A conservative estimate of the page's encoded size if sealed with
    /// the tentative per-attribute state as it stands right now: each
    /// column at its currently cheapest total byte cost (an overestimate
    /// here only makes the builder declare `Full` earlier than strictly
    /// necessary, never later).
    fn projected_size(&self, num_tuples: usize) -> usize {
        let mut total = 0usize;
        for (attr, state) in self.relation.attributes().iter().zip(&self.attributes) {
            total += Self::best_coding_bytes(attr.ty, state, num_tuples);
        }
        let descriptor_bytes = self.relation.num_attributes() * 8;
        HEADER_BYTES + descriptor_bytes + total
    }

    /// Attempts to add a tuple. On success the tuple becomes part of the
    /// sealed page; on overflow every tentative dictionary/tracker change
    /// made while evaluating this tuple is rolled back and the builder is
    /// left exactly as it was before the call.
    pub fn add_tuple(&mut self, tuple: &Tuple) -> Result<()> {
        let mut newly_inserted = Vec::with_capacity(self.attributes.len());
        let mut tracker_snapshots = Vec::with_capacity(self.attributes.len());

        for (attr, state) in self.relation.attributes().iter().zip(self.attributes.iter_mut()) {
            let value = tuple.get(attr.id as usize);
            newly_inserted.push(state.dictionary.try_insert(value));
            tracker_snapshots.push(state.int_tracker);
            if let Some(tracker) = state.int_tracker.as_mut() {
                match value {
                    Value::Int(v) => tracker.observe(*v as i64),
                    Value::Long(v) => tracker.observe(*v),
                    _ => {}
                }
            }
        }

        if self.projected_size(self.tuples.len() + 1) > self.block_bytes {
            for (((attr, state), added), snapshot) in self
                .relation
                .attributes()
                .iter()
                .zip(self.attributes.iter_mut())
                .zip(newly_inserted.into_iter())
                .zip(tracker_snapshots.into_iter())
            {
                if added {
                    state.dictionary.undo_insert(tuple.get(attr.id as usize));
                }
                state.int_tracker = snapshot;
            }
            return Err(StorageError::full(BlockKind::CompressedPage));
        }

        self.tuples.push(tuple.clone());
        Ok(())
    }

    /// Chooses the cheapest coding for one attribute by total encoded
    /// bytes across `num_tuples` rows (§4.4), not by code width alone: a
    /// dictionary's own encoded bytes count against it, so a narrower code
    /// width does not automatically win.
    fn choose_coding(attr_ty: Type, state: &AttributeState, num_tuples: usize, dict_index: &mut usize) -> Coding {
        let raw_width = attr_ty.natural_width_bytes();
        let mut best = Coding::Raw { width: raw_width };
        let mut best_bytes = raw_width * num_tuples;

        if let Some(w) = state.int_tracker.as_ref().and_then(|t| t.truncated_width()) {
            let bytes = w * num_tuples;
            if bytes < best_bytes {
                best_bytes = bytes;
                best = Coding::Truncated { width: w };
            }
        }
        if state.dictionary.len() > 0 {
            let dict_bytes = state.dictionary.encoded_bytes();
            let width = crate::dictionary::code_byte_width(state.dictionary.len() as u32);
            if dict_bytes + width * num_tuples < best_bytes {
                let idx = *dict_index;
                best = Coding::Dictionary { width, dict_index: idx };
            }
        }
        if matches!(best, Coding::Dictionary { .. }) {
            *dict_index += 1;
        }
        best
    }

    /// Consumes the builder, producing the sealed page's bytes and the
    /// descriptor that lets a reader interpret them.
    pub fn seal(self, layout: Layout) -> Result<(Vec<u8>, PageDescriptor)> {
        let num_attrs = self.relation.num_attributes();
        let mut codings = Vec::with_capacity(num_attrs);
        let mut next_dict_index = 0usize;
        let num_tuples = self.tuples.len();
        for (attr, state) in self.relation.attributes().iter().zip(&self.attributes) {
            let coding = Self::choose_coding(attr.ty, state, num_tuples, &mut next_dict_index);
            log::debug!("attribute {} ({:?}) sealed with coding {:?}", attr.id, attr.ty, coding);
            codings.push(coding);
        }

        // Seal a dictionary for every attribute whose final coding chose
        // one, in dict_index order (the order `choose_coding` assigned
        // indices in, i.e. relation attribute order).
        let mut dictionaries = Vec::new();
        for (state, coding) in self.attributes.iter().zip(&codings) {
            if matches!(coding, Coding::Dictionary { .. }) {
                dictionaries.push(state.dictionary.clone().seal());
            }
        }

        let row_width: usize = codings.iter().map(Coding::width).sum();
        let descriptor_bytes = num_attrs * 8;
        let dictionary_bytes: usize = dictionaries.iter().map(|d| d.encode().len()).sum();
        let available = self.block_bytes.saturating_sub(HEADER_BYTES + descriptor_bytes + dictionary_bytes);
        let max_tuples = if row_width == 0 { self.tuples.len() } else { available / row_width };
        if self.tuples.len() > max_tuples {
            return Err(StorageError::block_memory_too_small(
                BlockKind::CompressedPage,
                HEADER_BYTES + descriptor_bytes + dictionary_bytes + row_width * self.tuples.len(),
                self.block_bytes,
            ));
        }

        let mut attribute_descriptors = Vec::with_capacity(num_attrs);
        for coding in &codings {
            let dictionary_size_bytes = match coding {
                Coding::Dictionary { dict_index, .. } => dictionaries[*dict_index].encode().len() as i32,
                _ => 0,
            };
            attribute_descriptors.push(AttributeDescriptor {
                attribute_size_bytes: coding.width() as i32,
                dictionary_size_bytes,
            });
        }
        let descriptor = PageDescriptor::new(attribute_descriptors);

        let mut bytes = vec![0u8; self.block_bytes];
        bytes[0..4].copy_from_slice(&(self.tuples.len() as u32).to_le_bytes());
        let descriptor_encoded = descriptor.encode();
        bytes[HEADER_BYTES..HEADER_BYTES + descriptor_encoded.len()].copy_from_slice(&descriptor_encoded);

        let mut cursor = HEADER_BYTES + descriptor_bytes;
        for dict in &dictionaries {
            let encoded = dict.encode();
            bytes[cursor..cursor + encoded.len()].copy_from_slice(&encoded);
            cursor += encoded.len();
        }

        let payload_start = cursor;
        let encode_code = |attr_index: usize, value: &Value, coding: &Coding| -> Vec<u8> {
            match coding {
                Coding::Raw { .. } => crate::dictionary::encode_value(self.relation.attributes()[attr_index].ty, value),
                Coding::Truncated { width } => {
                    let v: u64 = match value {
                        Value::Int(v) => *v as u64,
                        Value::Long(v) => *v as u64,
                        _ => unreachable!("truncation coding is only chosen for integer attributes"),
                    };
                    v.to_le_bytes()[..*width].to_vec()
                }
                Coding::Dictionary { dict_index, width } => {
                    let code = dictionaries[*dict_index].code_for(value);
                    code.to_le_bytes()[..*width].to_vec()
                }
            }
        };

        match layout {
            Layout::PackedRowStore => {
                let mut offset = payload_start;
                for tuple in &self.tuples {
                    for (attr_index, coding) in codings.iter().enumerate() {
                        let code = encode_code(attr_index, tuple.get(attr_index), coding);
                        bytes[offset..offset + code.len()].copy_from_slice(&code);
                        offset += code.len();
                    }
                }
            }
            Layout::ColumnStore { sort_attribute_index } => {
                let mut order: Vec<usize> = (0..self.tuples.len()).collect();
                order.sort_by(|&a, &b| {
                    crate::comparator::compare_values(
                        self.tuples[a].get(sort_attribute_index),
                        self.tuples[b].get(sort_attribute_index),
                    )
                    .unwrap_or(std::cmp::Ordering::Equal)
                });

                let mut stripe_offset = payload_start;
                for (attr_index, coding) in codings.iter().enumerate() {
                    let mut offset = stripe_offset;
                    for &row in &order {
                        let code = encode_code(attr_index, self.tuples[row].get(attr_index), coding);
                        bytes[offset..offset + code.len()].copy_from_slice(&code);
                        offset += code.len();
                    }
                    stripe_offset += coding.width() * max_tuples;
                }
            }
        }

        Ok((bytes, descriptor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Attribute;

    fn two_column_relation() -> Relation {
        Relation::new(
            "t",
            vec![
                Attribute::new(0, Type::Int, false),
                Attribute::new(1, Type::VarChar(16), false),
            ],
        )
    }

    #[test]
    fn small_integer_column_picks_truncation_over_raw() {
        let relation = Relation::new("ints", vec![Attribute::new(0, Type::Long, false)]);
        let mut builder = CompressedPageBuilder::new(relation, 4096);
        for v in [1i64, 2, 3, 4, 5] {
            builder.add_tuple(&Tuple::new(vec![Value::Long(v)])).unwrap();
        }
        let (_, descriptor) = builder.seal(Layout::PackedRowStore).unwrap();
        assert_eq!(descriptor.attributes[0].attribute_size_bytes, 1);
    }

    #[test]
    fn near_unique_fixed_length_column_picks_raw_over_dictionary() {
        // 4 distinct Char(8) values: a dictionary code would only need 1
        // byte (narrower than the 8-byte raw width), but the dictionary's
        // own encoded bytes (header + 4*8 value bytes = 36) outweigh the
        // 8-byte-per-row raw encoding (8*4 = 32) once total bytes are
        // compared, so raw must win.
        let relation = Relation::new("chars", vec![Attribute::new(0, Type::Char(8), false)]);
        let mut builder = CompressedPageBuilder::new(relation, 4096);
        for s in ["aaaaaaaa", "bbbbbbbb", "cccccccc", "dddddddd"] {
            builder
                .add_tuple(&Tuple::new(vec![Value::Char(s.as_bytes().to_vec())]))
                .unwrap();
        }
        let (_, descriptor) = builder.seal(Layout::PackedRowStore).unwrap();
        assert_eq!(descriptor.attributes[0].dictionary_size_bytes, 0);
        assert_eq!(descriptor.attributes[0].attribute_size_bytes, 8);
    }

    #[test]
    fn repeated_strings_pick_dictionary_coding() {
        let relation = two_column_relation();
        let mut builder = CompressedPageBuilder::new(relation, 4096);
        for (i, s) in ["red", "green", "red", "blue", "red"].iter().enumerate() {
            builder
                .add_tuple(&Tuple::new(vec![Value::Int(i as i32), Value::VarChar(s.as_bytes().to_vec())]))
                .unwrap();
        }
        let (_, descriptor) = builder.seal(Layout::PackedRowStore).unwrap();
        assert!(descriptor.attributes[1].dictionary_size_bytes > 0);
        assert!((descriptor.attributes[1].attribute_size_bytes as usize) < Type::VarChar(16).natural_width_bytes());
    }

    #[test]
    fn overflow_is_rejected_and_rolled_back() {
        let relation = Relation::new("ints", vec![Attribute::new(0, Type::Long, false)]);
        let mut builder = CompressedPageBuilder::new(relation, 32);
        let mut inserted = 0;
        loop {
            match builder.add_tuple(&Tuple::new(vec![Value::Long(inserted as i64)])) {
                Ok(()) => inserted += 1,
                Err(_) => break,
            }
        }
        assert!(inserted > 0);
        let num_before = builder.num_tuples();
        assert!(builder
            .add_tuple(&Tuple::new(vec![Value::Long(999_999)]))
            .is_err());
        assert_eq!(builder.num_tuples(), num_before);
    }

    #[test]
    fn column_store_layout_sorts_by_designated_attribute() {
        let relation = two_column_relation();
        let mut builder = CompressedPageBuilder::new(relation.clone(), 4096);
        for (key, s) in [(3, "c"), (1, "a"), (2, "b")] {
            builder
                .add_tuple(&Tuple::new(vec![Value::Int(key), Value::VarChar(s.as_bytes().to_vec())]))
                .unwrap();
        }
        let (bytes, descriptor) = builder
            .seal(Layout::ColumnStore { sort_attribute_index: 0 })
            .unwrap();
        let reader = super::super::reader::CompressedPageReader::attach(
            bytes,
            relation,
            descriptor,
            Layout::ColumnStore { sort_attribute_index: 0 },
        )
        .unwrap();
        assert_eq!(reader.get(0, 0), Value::Int(1));
        assert_eq!(reader.get(1, 0), Value::Int(2));
        assert_eq!(reader.get(2, 0), Value::Int(3));
    }
}
