//! Experiment harness CLI.
//!
//! Usage:
//!   storage_bench <config.json>
//!
//! Loads the configuration, builds the requested schema and storage
//! layout, optionally builds a CSB+-tree index, and runs the configured
//! predicate/projection passes across the configured thread count,
//! logging per-run timing. Exits 1 on any error.

use csb_storage_core::comparator::ComparisonOp;
use csb_storage_core::config::HarnessConfig;
use csb_storage_core::dictionary::encode_value;
use csb_storage_core::executor::{self, ExecutorRequest, Partition};
use csb_storage_core::generator;
use csb_storage_core::index::{CsbTree, KeyMode};
use csb_storage_core::page::compressed::{CompressedPageBuilder, CompressedPageReader, Layout};
use csb_storage_core::predicate::Comparison;
use csb_storage_core::timer::RunTimer;
use csb_storage_core::types::{TupleId, Value};
use std::env;
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: storage_bench <config.json>");
        exit(1);
    }

    if let Err(e) = run(PathBuf::from(&args[1])) {
        eprintln!("ERROR: {}", e);
        exit(1);
    }
}

fn run(config_path: PathBuf) -> csb_storage_core::Result<()> {
    let config = HarnessConfig::load(&config_path)?;
    log::info!("loaded harness config from {}", config_path.display());

    if config.measure_cache_misses {
        log::warn!("hardware cache-miss counters are unavailable in this process; degrading to zero counters");
    }

    let relation = generator::relation_for(config.table_choice);
    let tuples = generator::generate(config.table_choice, config.num_tuples);
    log::info!("generated {} tuples for table_choice={:?}", tuples.len(), config.table_choice);

    let index_attr = config.index_column as usize;

    let mut builder =
        CompressedPageBuilder::new(relation.clone(), (1usize << 20).max(tuples.len() * 64));
    for tuple in &tuples {
        builder.add_tuple(tuple)?;
    }
    let layout = if config.use_column_store {
        Layout::ColumnStore { sort_attribute_index: config.column_store_sort_column as usize }
    } else {
        Layout::PackedRowStore
    };
    let (bytes, descriptor) = builder.seal(layout)?;
    let page = CompressedPageReader::attach(bytes, relation.clone(), descriptor, layout)?;
    log::info!("sealed a compressed page with {} tuples", page.num_tuples());

    let index: Option<CsbTree> = if config.use_index {
        let attr_ty = relation
            .attribute(index_attr as u32)
            .ok_or_else(|| csb_storage_core::StorageError::malformed_block("index_column out of range"))?
            .ty;
        let key_length = attr_ty.natural_width_bytes();
        let mut tree = CsbTree::new(KeyMode::Uncompressed { ty: attr_ty }, key_length, 512, tuples.len() + 16)
            .map_err(|_| csb_storage_core::StorageError::malformed_block("index key too large for configured node size"))?;
        let entries: Vec<_> = tuples
            .iter()
            .enumerate()
            .map(|(tid, tuple)| (encode_value(attr_ty, tuple.get(index_attr)), tid as TupleId))
            .collect();
        tree.rebuild(entries)?;
        log::info!("built a CSB+-tree index over attribute {index_attr}");
        Some(tree)
    } else {
        None
    };

    for run_index in 0..config.num_runs {
        let timer = RunTimer::start();
        for params in &config.test_params {
            let predicate_attr = params.predicate_column as usize;
            let literal = tuples.first().map(|t| t.get(predicate_attr).clone()).unwrap_or(Value::Null);
            let comparison = Comparison::new(predicate_attr, ComparisonOp::GreaterOrEqual, literal.clone());

            let index_arg = if params.use_index && predicate_attr == index_attr {
                index.as_ref().map(|tree| {
                    let attr_ty = relation.attribute(index_attr as u32).unwrap().ty;
                    (Arc::new(tree.clone()), encode_value(attr_ty, &literal))
                })
            } else {
                None
            };

            let request = ExecutorRequest {
                predicate: comparison,
                index: index_arg,
                projection_attrs: (0..params.projection_width.max(1) as usize).collect(),
                sort_matches: params.sort_matches,
            };
            let partitions = vec![Partition::Compressed(page.clone())];
            let _results = executor::run(partitions, &request, config.num_threads as usize);
        }
        let elapsed = timer.elapsed();
        log::info!(
            "run {run_index}: {:.3}s ({:.0} tuples/sec)",
            elapsed.as_secs_f64(),
            timer.tuples_per_sec(config.num_tuples)
        );
    }

    Ok(())
}
