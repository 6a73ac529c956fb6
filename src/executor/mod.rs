//! A small thread-parallel query executor shell: workers pull input
//! blocks from a shared dispenser, evaluate a single-attribute predicate
//! (via an index when one covers the predicate column, otherwise
//! directly on the page), optionally sort the resulting tuple-id
//! sequence, and stream a projection of the matches into a per-worker
//! result page.

use crate::index::CsbTree;
use crate::page::compressed::CompressedPageReader;
use crate::page::sorted_column_store::SortedColumnStorePage;
use crate::predicate::Comparison;
use crate::types::{TupleId, Value};
use parking_lot::Mutex;
use std::sync::Arc;

/// One scannable unit of input. A worker claims a whole partition at a
/// time from the shared dispenser; there is no finer-grained splitting.
pub enum Partition {
    SortedColumnStore(SortedColumnStorePage),
    Compressed(CompressedPageReader),
}

impl Partition {
    fn matches(&self, predicate: &Comparison) -> Vec<TupleId> {
        match self {
            Partition::SortedColumnStore(page) => page.matches(predicate),
            Partition::Compressed(page) => page.matches(predicate),
        }
    }

    fn get(&self, tuple_id: TupleId, attr: usize) -> Value {
        match self {
            Partition::SortedColumnStore(page) => page.get(tuple_id, attr),
            Partition::Compressed(page) => page.get(tuple_id as usize, attr),
        }
    }
}

/// Hands out whole partitions to worker threads one at a time, under a
/// single shared mutex.
struct Dispenser {
    partitions: Mutex<std::vec::IntoIter<(usize, Arc<Partition>)>>,
}

impl Dispenser {
    fn new(partitions: Vec<Arc<Partition>>) -> Self {
        let indexed: Vec<_> = partitions.into_iter().enumerate().collect();
        Self { partitions: Mutex::new(indexed.into_iter()) }
    }

    fn next(&self) -> Option<(usize, Arc<Partition>)> {
        self.partitions.lock().next()
    }
}

/// A single worker's streamed output: one row per matched tuple,
/// projected to `projection_width` leading attribute values.
pub struct ResultPage {
    pub rows: Vec<Vec<Value>>,
}

/// The number of trailing partitions a partitioned scan sweeps, given an
/// expected selectivity: `⌈selectivity × num_partitions⌉`.
pub fn swept_partition_count(selectivity: f32, num_partitions: usize) -> usize {
    ((selectivity as f64) * num_partitions as f64).ceil() as usize
}

pub struct ExecutorRequest {
    pub predicate: Comparison,
    /// Index covering `predicate.attribute_index`, if one is to be used.
    pub index: Option<(Arc<CsbTree>, Vec<u8>)>,
    pub projection_attrs: Vec<usize>,
    pub sort_matches: bool,
}

/// Runs `request` over `partitions` using `num_threads` workers, and
/// returns one [`ResultPage`] per worker in no particular order.
pub fn run(partitions: Vec<Partition>, request: &ExecutorRequest, num_threads: usize) -> Vec<ResultPage> {
    let partitions: Vec<Arc<Partition>> = partitions.into_iter().map(Arc::new).collect();
    let dispenser = Arc::new(Dispenser::new(partitions));
    let num_threads = num_threads.max(1);

    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(num_threads);
        for _ in 0..num_threads {
            let dispenser = Arc::clone(&dispenser);
            handles.push(scope.spawn(move || worker_loop(dispenser, request)));
        }
        handles.into_iter().map(|h| h.join().expect("executor worker panicked")).collect()
    })
}

fn worker_loop(dispenser: Arc<Dispenser>, request: &ExecutorRequest) -> ResultPage {
    let mut rows = Vec::new();
    while let Some((_partition_index, partition)) = dispenser.next() {
        let mut matched = if let Some((index, literal_key)) = &request.index {
            index.matches(&request.predicate, literal_key)
        } else {
            partition.matches(&request.predicate)
        };
        if request.sort_matches {
            matched.sort_unstable();
        }
        for tuple_id in matched {
            let row = request.projection_attrs.iter().map(|&attr| partition.get(tuple_id, attr)).collect();
            rows.push(row);
        }
    }
    ResultPage { rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::ComparisonOp;
    use crate::page::compressed::{CompressedPageBuilder, Layout};
    use crate::types::{Attribute, Relation, Tuple, Type};

    fn relation() -> Relation {
        Relation::new("t", vec![Attribute::new(0, Type::Long, false), Attribute::new(1, Type::Int, false)])
    }

    fn compressed_partition(rows: &[(i64, i32)]) -> Partition {
        let relation = relation();
        let mut builder = CompressedPageBuilder::new(relation.clone(), 4096);
        for (a, b) in rows {
            builder.add_tuple(&Tuple::new(vec![Value::Long(*a), Value::Int(*b)])).unwrap();
        }
        let (bytes, descriptor) = builder.seal(Layout::PackedRowStore).unwrap();
        Partition::Compressed(CompressedPageReader::attach(bytes, relation, descriptor, Layout::PackedRowStore).unwrap())
    }

    #[test]
    fn runs_a_predicate_and_projects_matches_across_partitions() {
        let partitions =
            vec![compressed_partition(&[(1, 10), (2, 20), (3, 30)]), compressed_partition(&[(4, 40), (5, 50)])];
        let request = ExecutorRequest {
            predicate: Comparison::new(0, ComparisonOp::GreaterOrEqual, Value::Long(3)),
            index: None,
            projection_attrs: vec![1],
            sort_matches: true,
        };
        let results = run(partitions, &request, 2);
        let mut projected: Vec<i32> = results
            .iter()
            .flat_map(|r| r.rows.iter())
            .map(|row| match row[0] {
                Value::Int(v) => v,
                _ => unreachable!(),
            })
            .collect();
        projected.sort_unstable();
        assert_eq!(projected, vec![30, 40, 50]);
    }

    #[test]
    fn swept_partition_count_rounds_up() {
        assert_eq!(swept_partition_count(0.1, 10), 1);
        assert_eq!(swept_partition_count(0.25, 10), 3);
        assert_eq!(swept_partition_count(0.0, 10), 0);
    }
}
