//! Seeded synthetic data generation for the harness's four benchmark
//! schemas. Every generation pass reseeds from the same constant so that
//! repeated harness runs over an identical configuration are reproducible.

use crate::config::TableChoice;
use crate::types::{Attribute, Relation, Tuple, Type, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// The harness's fixed PRNG seed (§5 of the design notes this binary
/// follows): every pass starts from this seed, not a time-derived one.
pub const SEED: u64 = 42;

pub fn relation_for(table_choice: TableChoice) -> Relation {
    match table_choice {
        TableChoice::NarrowE | TableChoice::NarrowU => Relation::new(
            "narrow",
            vec![Attribute::new(0, Type::Long, false), Attribute::new(1, Type::Int, false)],
        ),
        TableChoice::WideE => Relation::new(
            "wide",
            vec![
                Attribute::new(0, Type::Long, false),
                Attribute::new(1, Type::Int, false),
                Attribute::new(2, Type::Double, false),
                Attribute::new(3, Type::VarChar(32), false),
            ],
        ),
        TableChoice::Strings => Relation::new(
            "strings",
            vec![Attribute::new(0, Type::Long, false), Attribute::new(1, Type::VarChar(64), false)],
        ),
    }
}

/// Generates `num_tuples` rows for `table_choice`, reseeded from
/// [`SEED`] on every call.
pub fn generate(table_choice: TableChoice, num_tuples: u64) -> Vec<Tuple> {
    let mut rng = StdRng::seed_from_u64(SEED);
    (0..num_tuples)
        .map(|i| match table_choice {
            TableChoice::NarrowE => {
                Tuple::new(vec![Value::Long(i as i64), Value::Int(rng.gen_range(0..1_000_000))])
            }
            TableChoice::NarrowU => {
                // Clustered around a handful of hot values, to give the
                // dictionary coder something to exploit.
                let cluster = rng.gen_range(0..8);
                Tuple::new(vec![Value::Long(i as i64), Value::Int(cluster * 37)])
            }
            TableChoice::WideE => Tuple::new(vec![
                Value::Long(i as i64),
                Value::Int(rng.gen_range(0..1_000_000)),
                Value::Double(rng.gen_range(0.0..1_000.0)),
                Value::VarChar(random_string(&mut rng, 8, 32)),
            ]),
            TableChoice::Strings => {
                Tuple::new(vec![Value::Long(i as i64), Value::VarChar(random_string(&mut rng, 4, 64))])
            }
        })
        .collect()
}

fn random_string(rng: &mut StdRng, min_len: usize, max_len: usize) -> Vec<u8> {
    let len = rng.gen_range(min_len..=max_len);
    (0..len).map(|_| rng.gen_range(b'a'..=b'z')).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reseeding_makes_successive_passes_reproducible() {
        let first = generate(TableChoice::NarrowE, 50);
        let second = generate(TableChoice::NarrowE, 50);
        assert_eq!(first, second);
    }

    #[test]
    fn narrow_u_clusters_its_second_column() {
        let tuples = generate(TableChoice::NarrowU, 200);
        let distinct: std::collections::HashSet<_> =
            tuples.iter().map(|t| format!("{:?}", t.get(1))).collect();
        assert!(distinct.len() <= 8);
    }

    #[test]
    fn strings_schema_produces_varchar_within_bounds() {
        let tuples = generate(TableChoice::Strings, 20);
        for t in &tuples {
            if let Value::VarChar(bytes) = t.get(1) {
                assert!(bytes.len() >= 4 && bytes.len() <= 64);
            } else {
                panic!("expected VarChar");
            }
        }
    }
}
