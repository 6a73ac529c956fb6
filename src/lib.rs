//! # Analytical storage core
//!
//! A cache-conscious storage and indexing core for read-mostly analytical
//! workloads: sorted column-store pages, a compressed page format with
//! per-column dictionary and truncation coding, and a cache-sensitive
//! B+-tree (CSB+-tree) index over a single logical key.
//!
//! ## Architecture
//!
//! - **Types** (`types`): the relational type system, values, tuples and
//!   relations shared by every layer above it.
//! - **Comparator** (`comparator`): type-driven value comparison, used both
//!   for in-memory sorting and for predicate evaluation.
//! - **Dictionary** (`dictionary`): fixed- and variable-length compression
//!   dictionaries, and the builder that assembles one incrementally.
//! - **Page** (`page`): the sorted column-store page and the compressed
//!   page builder/reader pair.
//! - **Index** (`index`): the CSB+-tree and its node-group free bitmap.
//! - **Predicate** (`predicate`): the single-attribute comparison type
//!   pages and indexes evaluate.
//! - **Executor** (`executor`): a thread-parallel scan/project shell tying
//!   pages and indexes together.
//! - **Catalog** (`catalog`): a thin in-memory relation registry.
//! - **Config**, **Generator**, **Timer**: the harness binary's supporting
//!   cast (§10 of the design notes this crate follows).

pub mod catalog;
pub mod comparator;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod executor;
pub mod generator;
pub mod index;
pub mod page;
pub mod predicate;
pub mod timer;
pub mod types;

pub use error::{Result, StorageError};
