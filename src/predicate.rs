//! A single-attribute comparison predicate — the only predicate shape the
//! core's pushdown paths (sorted column-store page, compressed page
//! reader, CSB+-tree) understand. Anything richer is the query executor
//! shell's concern, and falls back to row-by-row evaluation here.

use crate::comparator::ComparisonOp;
use crate::types::Value;

/// `attribute OP literal`, e.g. `a < 5`.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub attribute_index: usize,
    pub op: ComparisonOp,
    pub literal: Value,
}

impl Comparison {
    pub fn new(attribute_index: usize, op: ComparisonOp, literal: Value) -> Self {
        Self {
            attribute_index,
            op,
            literal,
        }
    }
}
