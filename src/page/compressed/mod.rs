//! The compressed page: a builder that decides per-column coding from
//! observed value distribution, and a reader that interprets a sealed
//! page (row- or column-layout), including predicate pushdown on coded
//! values.

pub mod builder;
pub mod descriptor;
pub mod reader;
pub mod truncation;

pub use builder::CompressedPageBuilder;
pub use descriptor::{AttributeDescriptor, PageDescriptor};
pub use reader::CompressedPageReader;

/// Which physical layout the coded payload uses. This is not recorded in
/// the page's own bytes — per the design's closed tagged variant for
/// storage layouts, the layout is supplied by whatever higher-level
/// variant (column-store vs. row-store) is attaching to the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Rows stored row-major with per-attribute coded widths.
    PackedRowStore,
    /// One contiguous stripe per attribute.
    ColumnStore { sort_attribute_index: usize },
}

/// How one attribute's values are physically represented in a sealed
/// compressed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coding {
    /// Stored uncompressed at the type's natural width.
    Raw { width: usize },
    /// Stored as a little-endian unsigned integer of the given byte width
    /// (1, 2, or 4); only ever chosen for `Int`/`Long` attributes.
    Truncated { width: usize },
    /// Stored as a little-endian unsigned code indexing into a
    /// compression dictionary, identified by its index in the reader's
    /// dictionary list.
    Dictionary { width: usize, dict_index: usize },
}

impl Coding {
    pub fn width(&self) -> usize {
        match self {
            Coding::Raw { width } => *width,
            Coding::Truncated { width } => *width,
            Coding::Dictionary { width, .. } => *width,
        }
    }
}
