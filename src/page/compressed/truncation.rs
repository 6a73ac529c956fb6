//! Integer truncation: width selection for the compressed page builder,
//! and comparison saturation for the compressed page reader. Both sides
//! share this module so that the same definition of `U` (the largest
//! representable truncated value at a given width) is used consistently,
//! per the design's note about the 4-byte-width edge case.

use crate::comparator::ComparisonOp;

/// The largest value representable in a truncated code of `width` bytes.
/// At 4 bytes, `u32::MAX` itself is reserved and not a valid truncated
/// value — a `Long` column whose maximum happens to be exactly
/// `u32::MAX` therefore cannot use 4-byte truncation and must fall back
/// to dictionary or raw coding.
pub fn max_truncated_value(width: usize) -> u64 {
    match width {
        1 => u8::MAX as u64,
        2 => u16::MAX as u64,
        4 => u32::MAX as u64 - 1,
        _ => panic!("truncated code width must be 1, 2, or 4 bytes"),
    }
}

/// The smallest of `{1, 2, 4}` whose unsigned range holds `max_nonneg`, or
/// `None` if no width suffices (only possible at exactly `u32::MAX`).
pub fn truncation_width_for_max(max_nonneg: u64) -> Option<usize> {
    [1usize, 2, 4]
        .into_iter()
        .find(|&w| max_nonneg <= max_truncated_value(w))
}

/// The outcome of evaluating a comparison against a truncated column
/// without decoding every row: either the whole column trivially
/// satisfies or fails the predicate, or comparing the raw code against
/// `Bounded` decides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncatedDecision {
    AlwaysTrue,
    AlwaysFalse,
    Bounded(u32),
}

/// Applies the truncated-comparison saturation rules: given the literal's
/// real-valued magnitude and the column's truncation width, decide
/// whether the comparison can be answered without inspecting any row, or
/// else produce the integer bound to compare each row's raw code against
/// (using the same operator).
pub fn truncated_decision(op: ComparisonOp, literal: f64, width: usize) -> TruncatedDecision {
    if literal.is_nan() {
        return TruncatedDecision::AlwaysFalse;
    }
    let u = max_truncated_value(width) as f64;
    let fractional = literal.fract() != 0.0;
    match op {
        ComparisonOp::Equal => {
            if literal < 0.0 || literal > u || fractional {
                TruncatedDecision::AlwaysFalse
            } else {
                TruncatedDecision::Bounded(literal as u32)
            }
        }
        ComparisonOp::NotEqual => {
            if literal < 0.0 || literal > u || fractional {
                TruncatedDecision::AlwaysTrue
            } else {
                TruncatedDecision::Bounded(literal as u32)
            }
        }
        ComparisonOp::Less => {
            if literal > u {
                TruncatedDecision::AlwaysTrue
            } else if literal <= 0.0 {
                TruncatedDecision::AlwaysFalse
            } else {
                TruncatedDecision::Bounded(literal.ceil() as u32)
            }
        }
        ComparisonOp::GreaterOrEqual => {
            if literal <= 0.0 {
                TruncatedDecision::AlwaysTrue
            } else if literal > u {
                TruncatedDecision::AlwaysFalse
            } else {
                TruncatedDecision::Bounded(literal.ceil() as u32)
            }
        }
        ComparisonOp::LessOrEqual => {
            if literal >= u {
                TruncatedDecision::AlwaysTrue
            } else if literal < 0.0 {
                TruncatedDecision::AlwaysFalse
            } else {
                TruncatedDecision::Bounded(literal.floor() as u32)
            }
        }
        ComparisonOp::Greater => {
            if literal < 0.0 {
                TruncatedDecision::AlwaysTrue
            } else if literal >= u {
                TruncatedDecision::AlwaysFalse
            } else {
                TruncatedDecision::Bounded(literal.floor() as u32)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_selection_respects_u32_max_edge_case() {
        assert_eq!(truncation_width_for_max(200), Some(1));
        assert_eq!(truncation_width_for_max(70_000), Some(4));
        assert_eq!(truncation_width_for_max(u32::MAX as u64 - 1), Some(4));
        assert_eq!(truncation_width_for_max(u32::MAX as u64), None);
    }

    #[test]
    fn saturation_table_matches_spec() {
        let width = 1; // U = 255
        assert_eq!(truncated_decision(ComparisonOp::Less, 300.0, width), TruncatedDecision::AlwaysTrue);
        assert_eq!(truncated_decision(ComparisonOp::Less, -1.0, width), TruncatedDecision::AlwaysFalse);
        assert_eq!(truncated_decision(ComparisonOp::Equal, -5.0, width), TruncatedDecision::AlwaysFalse);
        assert_eq!(truncated_decision(ComparisonOp::NotEqual, -5.0, width), TruncatedDecision::AlwaysTrue);
        assert_eq!(truncated_decision(ComparisonOp::Less, 3.5, width), TruncatedDecision::Bounded(4));
        assert_eq!(truncated_decision(ComparisonOp::LessOrEqual, 3.5, width), TruncatedDecision::Bounded(3));
        assert_eq!(truncated_decision(ComparisonOp::Greater, 3.5, width), TruncatedDecision::Bounded(3));
        assert_eq!(truncated_decision(ComparisonOp::GreaterOrEqual, 3.5, width), TruncatedDecision::Bounded(4));
    }
}
