//! Page layouts: the sorted, uncompressed column-store page and the
//! compressed page (builder + reader, row- and column-layout).

pub mod compressed;
pub mod sorted_column_store;

pub use sorted_column_store::SortedColumnStorePage;

/// Default size, in bytes, of the memory region backing one page when the
/// harness does not otherwise specify one. Tests that exercise
/// `Full`/`BlockMemoryTooSmall` paths directly use smaller, explicit sizes.
pub const DEFAULT_BLOCK_BYTES: usize = 1 << 20;
