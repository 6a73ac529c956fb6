//! Cache-sensitive B+-tree indexing over a single logical key.

pub mod bitmap;
pub mod csb_tree;

pub use bitmap::GroupBitmap;
pub use csb_tree::{CsbTree, KeyMode, GROUP_FULL, GROUP_NEXT_LEAF, GROUP_NONE};
