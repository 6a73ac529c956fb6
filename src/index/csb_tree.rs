//! The cache-sensitive B+-tree index: an ordinary B+-tree whose internal
//! nodes replace per-child pointers with a single pointer to a contiguous
//! **node group** holding all of that node's children. Leaves repurpose
//! the same field as a sibling-chain pointer.
//!
//! Node-group ids are never persisted negative except for the three
//! reserved sentinels below; `-3` only ever appears transiently in a
//! diagnostic and is never written into a sealed sub-block.

use crate::comparator::{compare_le_bytes, compare_values, ComparisonOp};
use crate::dictionary::decode_value;
use crate::error::{BlockKind, Result, StorageError};
use crate::index::bitmap::GroupBitmap;
use crate::predicate::Comparison;
use crate::types::{Type, TupleId, TUPLE_ID_BYTES};
use std::cmp::Ordering;

/// This leaf is the rightmost leaf in the tree.
pub const GROUP_NONE: i32 = -1;
/// This leaf's right sibling is the next slot within its own node group.
pub const GROUP_NEXT_LEAF: i32 = -2;
/// Transient marker used only while computing allocation requirements;
/// never written into a node.
pub const GROUP_FULL: i32 = -3;

const NODE_HEADER_BYTES: usize = 7; // num_keys(2) + is_leaf(1) + node_group_reference(4)

/// How a key is derived and compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    /// Concatenated raw bytes of several attributes; compared lexically.
    Composite,
    /// A single attribute's compressed code (truncated or dictionary);
    /// compared as an unsigned little-endian integer.
    Compressed { width: usize },
    /// A single attribute's natural (uncompressed) encoding; compared by
    /// decoding and using the shared value comparator.
    Uncompressed { ty: Type },
}

impl KeyMode {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self {
            KeyMode::Composite => a.cmp(b),
            KeyMode::Compressed { width } => compare_le_bytes(*width, a, b),
            KeyMode::Uncompressed { ty } => {
                compare_values(&decode_value(*ty, a), &decode_value(*ty, b)).unwrap_or(Ordering::Equal)
            }
        }
    }
}

fn split_sizes(total: usize, insert_position: usize) -> (usize, usize) {
    let small = total.div_ceil(2);
    let large = total - small;
    if insert_position < small {
        (small, large)
    } else {
        (large, small)
    }
}

#[derive(Clone)]
pub struct CsbTree {
    key_mode: KeyMode,
    key_length_bytes: usize,
    node_size: usize,
    max_keys_internal: usize,
    max_keys_leaf: usize,
    node_group_bytes: usize,
    header_bytes: usize,
    bytes: Vec<u8>,
    bitmap: GroupBitmap,
    group_len: Vec<usize>,
    root_group: u32,
}

impl CsbTree {
    pub fn new(key_mode: KeyMode, key_length_bytes: usize, node_size: usize, capacity_groups: usize) -> Result<Self> {
        let max_keys_internal = (node_size - NODE_HEADER_BYTES) / key_length_bytes;
        let max_keys_leaf = (node_size - NODE_HEADER_BYTES) / (key_length_bytes + TUPLE_ID_BYTES);
        if max_keys_internal < 2 || max_keys_leaf < 2 {
            return Err(StorageError::key_too_large(key_length_bytes, node_size));
        }
        let node_group_bytes = node_size * (max_keys_internal + 1);
        let bitmap = GroupBitmap::new(capacity_groups);
        let header_bytes = 4 + bitmap.encode().len();
        let mut tree = Self {
            key_mode,
            key_length_bytes,
            node_size,
            max_keys_internal,
            max_keys_leaf,
            node_group_bytes,
            header_bytes,
            bytes: vec![0u8; header_bytes + capacity_groups * node_group_bytes],
            bitmap,
            group_len: vec![0; capacity_groups],
            root_group: 0,
        };
        let root_group = tree.bitmap.allocate().expect("a freshly sized bitmap has room for the root group") as u32;
        tree.root_group = root_group;
        tree.group_len[root_group as usize] = 1;
        tree.write_node_header(root_group, 0, 0, true, GROUP_NONE);
        log::debug!("allocated node group {root_group} as the initial root ({capacity_groups} groups total)");
        Ok(tree)
    }

    pub fn max_keys_internal(&self) -> usize {
        self.max_keys_internal
    }

    pub fn max_keys_leaf(&self) -> usize {
        self.max_keys_leaf
    }

    fn node_offset(&self, group: u32, slot: usize) -> usize {
        self.header_bytes + group as usize * self.node_group_bytes + slot * self.node_size
    }

    fn num_keys(&self, group: u32, slot: usize) -> usize {
        let o = self.node_offset(group, slot);
        u16::from_le_bytes([self.bytes[o], self.bytes[o + 1]]) as usize
    }

    fn is_leaf(&self, group: u32, slot: usize) -> bool {
        self.bytes[self.node_offset(group, slot) + 2] != 0
    }

    fn group_ref(&self, group: u32, slot: usize) -> i32 {
        let o = self.node_offset(group, slot) + 3;
        i32::from_le_bytes(self.bytes[o..o + 4].try_into().unwrap())
    }

    fn write_node_header(&mut self, group: u32, slot: usize, num_keys: u16, is_leaf: bool, reference: i32) {
        let o = self.node_offset(group, slot);
        self.bytes[o..o + 2].copy_from_slice(&num_keys.to_le_bytes());
        self.bytes[o + 2] = is_leaf as u8;
        self.bytes[o + 3..o + 7].copy_from_slice(&reference.to_le_bytes());
    }

    fn set_num_keys(&mut self, group: u32, slot: usize, num_keys: usize) {
        let o = self.node_offset(group, slot);
        self.bytes[o..o + 2].copy_from_slice(&(num_keys as u16).to_le_bytes());
    }

    fn set_group_ref(&mut self, group: u32, slot: usize, reference: i32) {
        let o = self.node_offset(group, slot) + 3;
        self.bytes[o..o + 4].copy_from_slice(&reference.to_le_bytes());
    }

    // --- internal-node key array ---

    fn internal_key(&self, group: u32, slot: usize, i: usize) -> &[u8] {
        let o = self.node_offset(group, slot) + NODE_HEADER_BYTES + i * self.key_length_bytes;
        &self.bytes[o..o + self.key_length_bytes]
    }

    fn write_internal_key(&mut self, group: u32, slot: usize, i: usize, key: &[u8]) {
        let o = self.node_offset(group, slot) + NODE_HEADER_BYTES + i * self.key_length_bytes;
        self.bytes[o..o + self.key_length_bytes].copy_from_slice(key);
    }

    fn internal_keys_vec(&self, group: u32, slot: usize) -> Vec<Vec<u8>> {
        (0..self.num_keys(group, slot))
            .map(|i| self.internal_key(group, slot, i).to_vec())
            .collect()
    }

    // --- leaf entry array ---

    fn leaf_entry_bytes(&self) -> usize {
        self.key_length_bytes + TUPLE_ID_BYTES
    }

    fn leaf_entry(&self, group: u32, slot: usize, i: usize) -> (&[u8], TupleId) {
        let entry_bytes = self.leaf_entry_bytes();
        let o = self.node_offset(group, slot) + NODE_HEADER_BYTES + i * entry_bytes;
        let key = &self.bytes[o..o + self.key_length_bytes];
        let tid = i32::from_le_bytes(self.bytes[o + self.key_length_bytes..o + entry_bytes].try_into().unwrap());
        (key, tid)
    }

    fn leaf_entries_vec(&self, group: u32, slot: usize) -> Vec<(Vec<u8>, TupleId)> {
        (0..self.num_keys(group, slot))
            .map(|i| {
                let (k, t) = self.leaf_entry(group, slot, i);
                (k.to_vec(), t)
            })
            .collect()
    }

    fn write_leaf_entries(&mut self, group: u32, slot: usize, entries: &[(Vec<u8>, TupleId)]) {
        let entry_bytes = self.leaf_entry_bytes();
        let base = self.node_offset(group, slot) + NODE_HEADER_BYTES;
        for (i, (key, tid)) in entries.iter().enumerate() {
            let o = base + i * entry_bytes;
            self.bytes[o..o + self.key_length_bytes].copy_from_slice(key);
            self.bytes[o + self.key_length_bytes..o + entry_bytes].copy_from_slice(&tid.to_le_bytes());
        }
    }

    // --- whole-node byte blobs, for moving/placing nodes ---

    fn read_node_bytes(&self, group: u32, slot: usize) -> Vec<u8> {
        let o = self.node_offset(group, slot);
        self.bytes[o..o + self.node_size].to_vec()
    }

    fn write_node_bytes(&mut self, group: u32, slot: usize, node: &[u8]) {
        let o = self.node_offset(group, slot);
        self.bytes[o..o + self.node_size].copy_from_slice(node);
    }

    fn make_leaf_bytes(&self, entries: &[(Vec<u8>, TupleId)], sibling_ref: i32) -> Vec<u8> {
        let mut node = vec![0u8; self.node_size];
        node[0..2].copy_from_slice(&(entries.len() as u16).to_le_bytes());
        node[2] = 1;
        node[3..7].copy_from_slice(&sibling_ref.to_le_bytes());
        let entry_bytes = self.leaf_entry_bytes();
        for (i, (key, tid)) in entries.iter().enumerate() {
            let o = NODE_HEADER_BYTES + i * entry_bytes;
            node[o..o + self.key_length_bytes].copy_from_slice(key);
            node[o + self.key_length_bytes..o + entry_bytes].copy_from_slice(&tid.to_le_bytes());
        }
        node
    }

    fn make_internal_bytes(&self, keys: &[Vec<u8>], children_group: u32) -> Vec<u8> {
        let mut node = vec![0u8; self.node_size];
        node[0..2].copy_from_slice(&(keys.len() as u16).to_le_bytes());
        node[2] = 0;
        node[3..7].copy_from_slice(&(children_group as i32).to_le_bytes());
        for (i, key) in keys.iter().enumerate() {
            let o = NODE_HEADER_BYTES + i * self.key_length_bytes;
            node[o..o + self.key_length_bytes].copy_from_slice(key);
        }
        node
    }

    // --- navigation ---

    /// Path from the root to the leaf that would host `key`, as
    /// `(group, slot)` pairs, root first.
    fn descend_path(&self, key: &[u8]) -> Vec<(u32, usize)> {
        let mut path = vec![(self.root_group, 0usize)];
        loop {
            let (group, slot) = *path.last().unwrap();
            if self.is_leaf(group, slot) {
                break;
            }
            let num_keys = self.num_keys(group, slot);
            let mut child_index = num_keys;
            for i in 0..num_keys {
                let cmp = self.key_mode.compare(key, self.internal_key(group, slot, i));
                if cmp == Ordering::Less || cmp == Ordering::Equal {
                    child_index = i;
                    break;
                }
            }
            let children_group = self.group_ref(group, slot) as u32;
            path.push((children_group, child_index));
        }
        path
    }

    pub fn find_leaf(&self, key: &[u8]) -> (u32, usize) {
        *self.descend_path(key).last().unwrap()
    }

    // --- insert ---

    fn required_groups_for_insert(&self, path: &[(u32, usize)]) -> usize {
        let mut needed = 0usize;
        let (leaf_group, leaf_slot) = *path.last().unwrap();
        let mut group_full = self.group_len[leaf_group as usize] == self.max_keys_internal + 1;
        if self.num_keys(leaf_group, leaf_slot) == self.max_keys_leaf && group_full {
            needed += 1;
        }
        for &(group, slot) in path[..path.len() - 1].iter().rev() {
            if !group_full {
                break;
            }
            group_full = self.group_len[group as usize] == self.max_keys_internal + 1;
            let this_full = self.num_keys(group, slot) == self.max_keys_internal;
            if this_full {
                needed += 1;
            } else {
                break;
            }
        }
        needed + 1 // headroom for a possible root promotion
    }

    /// Inserts `(key, tid)`. Duplicate keys are always permitted.
    pub fn insert(&mut self, key: &[u8], tid: TupleId) -> Result<()> {
        debug_assert_eq!(key.len(), self.key_length_bytes);
        let path = self.descend_path(key);
        let (leaf_group, leaf_slot) = *path.last().unwrap();

        if self.num_keys(leaf_group, leaf_slot) < self.max_keys_leaf {
            let mut entries = self.leaf_entries_vec(leaf_group, leaf_slot);
            let pos = entries.partition_point(|(k, _)| self.key_mode.compare(k, key) != Ordering::Greater);
            entries.insert(pos, (key.to_vec(), tid));
            self.write_leaf_entries(leaf_group, leaf_slot, &entries);
            self.set_num_keys(leaf_group, leaf_slot, entries.len());
            return Ok(());
        }

        if self.required_groups_for_insert(&path) > self.bitmap.free_count() {
            return Err(StorageError::full(BlockKind::CsbTreeNodeGroup));
        }

        let (promoted_key, new_leaf_bytes) = self.split_leaf(leaf_group, leaf_slot, key, tid);
        let ancestors = &path[..path.len() - 1];
        let (final_group, final_slot) = self.propagate_insert(ancestors, promoted_key, new_leaf_bytes)?;

        let old_sibling = self.group_ref(leaf_group, leaf_slot);
        let new_sibling_ref = if final_group == leaf_group && final_slot == leaf_slot + 1 {
            GROUP_NEXT_LEAF
        } else {
            final_group as i32
        };
        self.set_group_ref(leaf_group, leaf_slot, new_sibling_ref);
        let _ = old_sibling; // the new leaf already carries it forward (set in split_leaf)
        Ok(())
    }

    fn split_leaf(&mut self, group: u32, slot: usize, key: &[u8], tid: TupleId) -> (Vec<u8>, Vec<u8>) {
        let mut entries = self.leaf_entries_vec(group, slot);
        let position = entries.partition_point(|(k, _)| self.key_mode.compare(k, key) != Ordering::Greater);
        entries.insert(position, (key.to_vec(), tid));

        let (left_len, _right_len) = split_sizes(entries.len(), position);
        let (left, right) = entries.split_at(left_len);
        let old_sibling = self.group_ref(group, slot);

        self.write_leaf_entries(group, slot, left);
        self.set_num_keys(group, slot, left.len());

        let new_leaf = self.make_leaf_bytes(right, old_sibling);
        let promoted_key = right[0].0.clone();
        (promoted_key, new_leaf)
    }

    /// Places `new_child` (a fully-formed `node_size`-byte node, either
    /// leaf or internal) as a sibling under the chain of `ancestors`,
    /// splitting nodes upward as needed and promoting a new root if the
    /// split reaches the top. Returns the final `(group, slot)` the
    /// supplied child ended up at.
    fn propagate_insert(
        &mut self,
        ancestors: &[(u32, usize)],
        key: Vec<u8>,
        new_child: Vec<u8>,
    ) -> Result<(u32, usize)> {
        match ancestors.last() {
            None => self.promote_new_root(key, new_child),
            Some(&(parent_group, parent_slot)) => {
                match self.add_child(parent_group, parent_slot, key, new_child)? {
                    AddChildOutcome::Placed(group, slot) => Ok((group, slot)),
                    AddChildOutcome::Split { promoted_key, right_bytes, placed_at } => {
                        self.propagate_insert(&ancestors[..ancestors.len() - 1], promoted_key, right_bytes)?;
                        Ok(placed_at)
                    }
                }
            }
        }
    }

    fn promote_new_root(&mut self, key: Vec<u8>, right_child: Vec<u8>) -> Result<(u32, usize)> {
        let old_root_group = self.root_group;
        // The old root's own group has capacity max_keys_internal+1 and
        // so far holds only the root itself: reuse slot 1 for the new
        // right sibling.
        let right_slot = 1;
        self.write_node_bytes(old_root_group, right_slot, &right_child);
        self.group_len[old_root_group as usize] += 1;

        let new_root_group = self
            .bitmap
            .allocate()
            .ok_or_else(|| StorageError::full(BlockKind::CsbTreeNodeGroup))? as u32;
        let new_root_bytes = self.make_internal_bytes(&[key], old_root_group);
        self.write_node_bytes(new_root_group, 0, &new_root_bytes);
        self.group_len[new_root_group as usize] = 1;
        self.root_group = new_root_group;
        log::debug!("root split: promoted node group {new_root_group} as the new root over old root group {old_root_group}");
        Ok((old_root_group, right_slot))
    }

    fn add_child(&mut self, parent_group: u32, parent_slot: usize, key: Vec<u8>, child: Vec<u8>) -> Result<AddChildOutcome> {
        let num_keys = self.num_keys(parent_group, parent_slot);
        let children_group = self.group_ref(parent_group, parent_slot) as u32;
        let old_keys = self.internal_keys_vec(parent_group, parent_slot);
        let position = old_keys.partition_point(|k| self.key_mode.compare(k, &key) != Ordering::Greater);

        if num_keys < self.max_keys_internal {
            let mut keys = old_keys;
            keys.insert(position, key);
            for i in (position + 1..=num_keys).rev() {
                let bytes = self.read_node_bytes(children_group, i);
                self.write_node_bytes(children_group, i + 1, &bytes);
            }
            self.write_node_bytes(children_group, position + 1, &child);
            for (i, k) in keys.iter().enumerate() {
                self.write_internal_key(parent_group, parent_slot, i, k);
            }
            self.set_num_keys(parent_group, parent_slot, keys.len());
            self.group_len[children_group as usize] += 1;
            return Ok(AddChildOutcome::Placed(children_group, position + 1));
        }

        // Parent's children group is at capacity: split the parent.
        let mut combined_keys = Vec::with_capacity(old_keys.len() + 1);
        if position >= 1 {
            combined_keys.extend_from_slice(&old_keys[0..position - 1]);
            combined_keys.push(key.clone());
            combined_keys.extend_from_slice(&old_keys[position - 1..]);
        } else {
            combined_keys.push(key.clone());
            combined_keys.extend_from_slice(&old_keys);
        }

        let old_children: Vec<Vec<u8>> = (0..=num_keys).map(|i| self.read_node_bytes(children_group, i)).collect();
        let mut combined_children = old_children;
        combined_children.insert(position, child);

        let (left_len, right_len) = split_sizes(combined_children.len(), position);
        let (left_children, right_children) = combined_children.split_at(left_len);
        let promoted_key = combined_keys[left_len - 1].clone();
        let left_keys = &combined_keys[0..left_len - 1];
        let right_keys = &combined_keys[left_len..];

        for (i, node) in left_children.iter().enumerate() {
            self.write_node_bytes(children_group, i, node);
        }
        self.group_len[children_group as usize] = left_len;
        for (i, k) in left_keys.iter().enumerate() {
            self.write_internal_key(parent_group, parent_slot, i, k);
        }
        self.set_num_keys(parent_group, parent_slot, left_keys.len());

        let right_group = self
            .bitmap
            .allocate()
            .ok_or_else(|| StorageError::full(BlockKind::CsbTreeNodeGroup))? as u32;
        for (i, node) in right_children.iter().enumerate() {
            self.write_node_bytes(right_group, i, node);
        }
        self.group_len[right_group as usize] = right_len;

        let placed_at = if position < left_len {
            (children_group, position)
        } else {
            (right_group, position - left_len)
        };
        let right_bytes = self.make_internal_bytes(right_keys, right_group);
        Ok(AddChildOutcome::Split { promoted_key, right_bytes, placed_at })
    }

    // --- remove ---

    /// Removes the first `(key, tid)` entry found by walking the sibling
    /// chain rightward from the lower-bound leaf. Panics if no matching
    /// entry exists — removing a tuple id that was never indexed is a
    /// precondition violation, not a recoverable error.
    pub fn remove(&mut self, key: &[u8], tid: TupleId) {
        let (mut group, mut slot) = self.find_leaf(key);
        loop {
            let entries = self.leaf_entries_vec(group, slot);
            if let Some(pos) = entries.iter().position(|(k, t)| k.as_slice() == key && *t == tid) {
                let mut remaining = entries;
                remaining.remove(pos);
                self.write_leaf_entries(group, slot, &remaining);
                self.set_num_keys(group, slot, remaining.len());
                return;
            }
            match self.group_ref(group, slot) {
                GROUP_NONE => panic!("removed a (key, tuple_id) pair that was never indexed"),
                GROUP_NEXT_LEAF => slot += 1,
                next_group => {
                    group = next_group as u32;
                    slot = 0;
                }
            }
        }
    }

    // --- predicate evaluation ---

    /// Evaluates a single-attribute comparison whose literal has already
    /// been translated into this index's key space (raw code bytes for a
    /// compressed key, the natural encoding for an uncompressed one).
    /// `attribute_index` in `comparison` is ignored; the index only ever
    /// indexes one logical key.
    pub fn matches(&self, comparison: &Comparison, literal_key: &[u8]) -> Vec<TupleId> {
        match comparison.op {
            ComparisonOp::Less | ComparisonOp::LessOrEqual => self.scan_less(literal_key, comparison.op),
            ComparisonOp::Greater | ComparisonOp::GreaterOrEqual => self.scan_greater(literal_key, comparison.op),
            ComparisonOp::Equal => self.scan_equal(literal_key),
            ComparisonOp::NotEqual => {
                let mut out = self.scan_less(literal_key, ComparisonOp::Less);
                out.extend(self.scan_greater(literal_key, ComparisonOp::Greater));
                out
            }
        }
    }

    fn leftmost_leaf(&self) -> (u32, usize) {
        let mut loc = (self.root_group, 0usize);
        while !self.is_leaf(loc.0, loc.1) {
            let children_group = self.group_ref(loc.0, loc.1) as u32;
            loc = (children_group, 0);
        }
        loc
    }

    fn next_leaf(&self, group: u32, slot: usize) -> Option<(u32, usize)> {
        match self.group_ref(group, slot) {
            GROUP_NONE => None,
            GROUP_NEXT_LEAF => Some((group, slot + 1)),
            next_group => Some((next_group as u32, 0)),
        }
    }

    fn scan_less(&self, literal_key: &[u8], op: ComparisonOp) -> Vec<TupleId> {
        // Duplicates equal to `literal_key` can straddle the boundary leaf
        // into its right siblings (descend_path always takes the left
        // child on equality), so once the boundary leaf is reached the scan
        // must keep walking siblings, comparing entry by entry, until the
        // first non-matching key rather than stopping after one leaf.
        let (bound_group, bound_slot) = self.find_leaf(literal_key);
        let mut out = Vec::new();
        let mut loc = Some(self.leftmost_leaf());
        let mut in_boundary = false;
        while let Some((group, slot)) = loc {
            in_boundary = in_boundary || (group, slot) == (bound_group, bound_slot);
            if in_boundary {
                let mut hit_mismatch = false;
                for (k, t) in self.leaf_entries_vec(group, slot) {
                    if op.apply_ordering(self.key_mode.compare(&k, literal_key)) {
                        out.push(t);
                    } else {
                        hit_mismatch = true;
                        break;
                    }
                }
                if hit_mismatch {
                    break;
                }
            } else {
                for (_, t) in self.leaf_entries_vec(group, slot) {
                    out.push(t);
                }
            }
            loc = self.next_leaf(group, slot);
        }
        out
    }

    fn scan_greater(&self, literal_key: &[u8], op: ComparisonOp) -> Vec<TupleId> {
        let (bound_group, bound_slot) = self.find_leaf(literal_key);
        let mut out = Vec::new();
        let mut loc = Some((bound_group, bound_slot));
        let mut first = true;
        while let Some((group, slot)) = loc {
            if first {
                for (k, t) in self.leaf_entries_vec(group, slot) {
                    if op.apply_ordering(self.key_mode.compare(&k, literal_key)) {
                        out.push(t);
                    }
                }
                first = false;
            } else {
                for (_, t) in self.leaf_entries_vec(group, slot) {
                    out.push(t);
                }
            }
            loc = self.next_leaf(group, slot);
        }
        out
    }

    fn scan_equal(&self, literal_key: &[u8]) -> Vec<TupleId> {
        let (mut group, mut slot) = self.find_leaf(literal_key);
        let mut out = Vec::new();
        'outer: loop {
            for (k, t) in self.leaf_entries_vec(group, slot) {
                match self.key_mode.compare(&k, literal_key) {
                    Ordering::Equal => out.push(t),
                    Ordering::Greater => break 'outer,
                    Ordering::Less => {}
                }
            }
            match self.next_leaf(group, slot) {
                Some((g, s)) => {
                    group = g;
                    slot = s;
                }
                None => break,
            }
        }
        out
    }

    // --- rebuild ---

    fn leaves_per_group(&self) -> usize {
        self.max_keys_internal + 1
    }

    /// Returns the minimum number of node groups a bulk rebuild of
    /// `num_entries` entries would require: one leaf-group per
    /// `max_keys_leaf * leaves_per_group` entries, plus as many internal
    /// levels as needed to cover those leaf groups, plus the root.
    fn required_groups_for_rebuild(&self, num_entries: usize) -> usize {
        if num_entries == 0 {
            return 1;
        }
        let mut level_groups = (num_entries).div_ceil(self.max_keys_leaf * self.leaves_per_group()).max(1);
        let mut total = level_groups;
        while level_groups > 1 {
            level_groups = level_groups.div_ceil(self.leaves_per_group());
            total += level_groups;
        }
        total + 1 // the top root group
    }

    /// Rebuilds the index from scratch given every `(key, tuple_id)` pair
    /// it should contain. Entries need not be pre-sorted.
    pub fn rebuild(&mut self, mut entries: Vec<(Vec<u8>, TupleId)>) -> Result<()> {
        let required = self.required_groups_for_rebuild(entries.len());
        log::info!("rebuilding CSB+-tree: {} entries, an estimated {required} node groups", entries.len());
        if required > self.bitmap.capacity() {
            return Err(StorageError::full(BlockKind::CsbTreeNodeGroup));
        }
        entries.sort_by(|a, b| self.key_mode.compare(&a.0, &b.0));

        self.bitmap.clear_all();
        self.group_len.iter_mut().for_each(|g| *g = 0);
        self.bytes.iter_mut().for_each(|b| *b = 0);

        if entries.is_empty() {
            let root_group = self.bitmap.allocate().unwrap() as u32;
            self.root_group = root_group;
            self.group_len[root_group as usize] = 1;
            self.write_node_header(root_group, 0, 0, true, GROUP_NONE);
            return Ok(());
        }

        let leaves_per_group = self.leaves_per_group();
        let mut leaf_chunks: Vec<Vec<(Vec<u8>, TupleId)>> =
            entries.chunks(self.max_keys_leaf).map(|c| c.to_vec()).collect();
        // Rebalance an underfull final leaf so every leaf but the last one
        // stays maximally packed (invariant I1).
        if leaf_chunks.len() >= 2 {
            let (small, _) = split_sizes(self.max_keys_leaf + 1, 0);
            let last_len = leaf_chunks.last().unwrap().len();
            if last_len < small {
                let deficit = small - last_len;
                let prev_idx = leaf_chunks.len() - 2;
                let borrow = leaf_chunks[prev_idx].split_off(leaf_chunks[prev_idx].len() - deficit);
                let last_idx = leaf_chunks.len() - 1;
                let mut merged = borrow;
                merged.extend(leaf_chunks[last_idx].clone());
                leaf_chunks[last_idx] = merged;
            }
        }

        // Step 1: materialize leaf groups, each holding up to
        // `leaves_per_group` leaves, linked into one continuous sibling
        // chain across group boundaries.
        let mut leaf_groups: Vec<(u32, usize, Vec<u8>)> = Vec::new(); // (group, leaf count, least key)
        for chunk_group in leaf_chunks.chunks(leaves_per_group) {
            let group = self.bitmap.allocate().ok_or_else(|| StorageError::full(BlockKind::CsbTreeNodeGroup))? as u32;
            for (slot, chunk) in chunk_group.iter().enumerate() {
                let sibling = if slot + 1 < chunk_group.len() { GROUP_NEXT_LEAF } else { GROUP_NONE };
                let bytes = self.make_leaf_bytes(chunk, sibling);
                self.write_node_bytes(group, slot, &bytes);
            }
            self.group_len[group as usize] = chunk_group.len();
            leaf_groups.push((group, chunk_group.len(), chunk_group[0][0].0.clone()));
        }
        for i in 0..leaf_groups.len().saturating_sub(1) {
            let (group, count, _) = leaf_groups[i];
            self.set_group_ref(group, count - 1, leaf_groups[i + 1].0 as i32);
        }

        // Special case: the whole tree fits in a single leaf. The root is
        // that leaf directly, matching the empty-tree convention in `new`.
        if leaf_groups.len() == 1 && leaf_groups[0].1 == 1 {
            self.root_group = leaf_groups[0].0;
            return Ok(());
        }

        // Step 2: build internal levels bottom-up. `current` holds the
        // not-yet-placed nodes of one level, each paired with its least
        // key; it starts as one internal node per leaf group.
        let mut current: Vec<(Vec<u8>, Vec<u8>)> = leaf_groups
            .iter()
            .map(|&(group, count, ref least_key)| {
                let keys: Vec<Vec<u8>> =
                    (1..count).map(|i| self.leaf_entry(group, i, 0).0.to_vec()).collect();
                (least_key.clone(), self.make_internal_bytes(&keys, group))
            })
            .collect();

        loop {
            if current.len() == 1 {
                let root_group = self.bitmap.allocate().ok_or_else(|| StorageError::full(BlockKind::CsbTreeNodeGroup))? as u32;
                self.write_node_bytes(root_group, 0, &current[0].1);
                self.group_len[root_group as usize] = 1;
                self.root_group = root_group;
                return Ok(());
            }
            let mut next = Vec::new();
            for chunk in current.chunks(leaves_per_group) {
                let group = self.bitmap.allocate().ok_or_else(|| StorageError::full(BlockKind::CsbTreeNodeGroup))? as u32;
                for (slot, (_, bytes)) in chunk.iter().enumerate() {
                    self.write_node_bytes(group, slot, bytes);
                }
                self.group_len[group as usize] = chunk.len();
                let keys: Vec<Vec<u8>> = chunk[1..].iter().map(|(least_key, _)| least_key.clone()).collect();
                next.push((chunk[0].0.clone(), self.make_internal_bytes(&keys, group)));
            }
            current = next;
        }
    }
}

enum AddChildOutcome {
    Placed(u32, usize),
    Split { promoted_key: Vec<u8>, right_bytes: Vec<u8>, placed_at: (u32, usize) },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::encode_value;
    use crate::types::Value;

    fn small_tree() -> CsbTree {
        // node_size=40, key_length=8 (Long) => max_keys_leaf=2, max_keys_internal=4:
        // small enough to exercise splits with a handful of insertions.
        CsbTree::new(KeyMode::Uncompressed { ty: Type::Long }, 8, 40, 64).unwrap()
    }

    fn key(n: i64) -> Vec<u8> {
        encode_value(Type::Long, &Value::Long(n))
    }

    fn equal(n: i64) -> Comparison {
        Comparison::new(0, ComparisonOp::Equal, Value::Long(n))
    }

    #[test]
    fn construction_rejects_node_sizes_too_small_for_two_keys() {
        assert!(CsbTree::new(KeyMode::Uncompressed { ty: Type::Long }, 8, 8, 4).is_err());
    }

    #[test]
    fn insert_then_find_survives_repeated_splits() {
        let mut tree = small_tree();
        for n in 0..40i64 {
            tree.insert(&key(n), n as TupleId).unwrap();
        }
        for n in 0..40i64 {
            let found = tree.matches(&equal(n), &key(n));
            assert_eq!(found, vec![n as TupleId], "missing key {n}");
        }
    }

    #[test]
    fn duplicate_keys_are_all_retained() {
        let mut tree = small_tree();
        for tid in 0..6 {
            tree.insert(&key(7), tid).unwrap();
        }
        let mut found = tree.matches(&equal(7), &key(7));
        found.sort_unstable();
        assert_eq!(found, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn range_predicates_scan_sibling_chain_in_order() {
        let mut tree = small_tree();
        for n in 0..20i64 {
            tree.insert(&key(n), n as TupleId).unwrap();
        }
        let mut less = tree.matches(&Comparison::new(0, ComparisonOp::Less, Value::Long(5)), &key(5));
        less.sort_unstable();
        assert_eq!(less, (0..5).collect::<Vec<_>>());

        let mut geq = tree.matches(&Comparison::new(0, ComparisonOp::GreaterOrEqual, Value::Long(15)), &key(15));
        geq.sort_unstable();
        assert_eq!(geq, (15..20).collect::<Vec<_>>());
    }

    #[test]
    fn remove_deletes_exact_key_tid_pair_only() {
        let mut tree = small_tree();
        for n in 0..10i64 {
            tree.insert(&key(n), n as TupleId).unwrap();
            tree.insert(&key(n), (n + 100) as TupleId).unwrap();
        }
        tree.remove(&key(3), 3);
        let mut remaining = tree.matches(&equal(3), &key(3));
        remaining.sort_unstable();
        assert_eq!(remaining, vec![103]);
    }

    #[test]
    #[should_panic]
    fn remove_panics_on_unindexed_pair() {
        let mut tree = small_tree();
        tree.insert(&key(1), 1).unwrap();
        tree.remove(&key(1), 999);
    }

    #[test]
    fn rebuild_reproduces_the_same_lookups_as_incremental_insert() {
        let mut inserted = small_tree();
        let mut entries = Vec::new();
        for n in 0..30i64 {
            inserted.insert(&key(n), n as TupleId).unwrap();
            entries.push((key(n), n as TupleId));
        }

        let mut rebuilt = small_tree();
        rebuilt.rebuild(entries).unwrap();

        for n in 0..30i64 {
            assert_eq!(rebuilt.matches(&equal(n), &key(n)), vec![n as TupleId]);
        }
    }

    #[test]
    fn rebuild_of_empty_entry_set_yields_an_empty_root_leaf() {
        let mut tree = small_tree();
        tree.rebuild(Vec::new()).unwrap();
        assert!(tree.matches(&equal(0), &key(0)).is_empty());
    }

    #[test]
    fn descending_inserts_survive_middle_of_group_child_placement() {
        // Inserting in descending order forces add_child to open a hole in
        // the middle of a node group's children, rather than only ever
        // appending at the end — the case the ascending-order test above
        // cannot exercise.
        let mut tree = small_tree();
        for n in (0..40i64).rev() {
            tree.insert(&key(n), n as TupleId).unwrap();
        }
        for n in 0..40i64 {
            assert_eq!(tree.matches(&equal(n), &key(n)), vec![n as TupleId], "missing key {n}");
        }
    }

    #[test]
    fn shuffled_inserts_survive_middle_of_group_child_placement() {
        let mut tree = small_tree();
        let order: Vec<i64> = (0..40i64)
            .map(|n| (n * 17 + 5) % 40)
            .collect();
        for &n in &order {
            tree.insert(&key(n), n as TupleId).unwrap();
        }
        for n in 0..40i64 {
            assert_eq!(tree.matches(&equal(n), &key(n)), vec![n as TupleId], "missing key {n}");
        }
    }

    #[test]
    fn less_or_equal_matches_duplicates_that_straddle_sibling_leaves() {
        // With max_keys_leaf=2, five copies of the same key span at least
        // three leaves; a `<=` scan must keep walking siblings past the
        // boundary leaf instead of stopping after the first one.
        let mut tree = small_tree();
        for n in 0..3i64 {
            tree.insert(&key(n), n as TupleId).unwrap();
        }
        for tid in 100..105 {
            tree.insert(&key(5), tid).unwrap();
        }
        tree.insert(&key(9), 9).unwrap();

        let mut found = tree.matches(&Comparison::new(0, ComparisonOp::LessOrEqual, Value::Long(5)), &key(5));
        found.sort_unstable();
        let mut expected: Vec<TupleId> = (0..3).collect();
        expected.extend(100..105);
        assert_eq!(found, expected);
    }
}
