//! A layout algebra for nested, variable-shape, heterogeneous columnar arrays.
//!
//! Data lives in flat, contiguous numeric buffers; structure is recovered by auxiliary
//! index buffers and a recursive tree of layout nodes. Every value is a [`Content`]
//! node, one of a closed set of variants: flat leaves ([`NumpyArray`]), rectangular and
//! jagged list layers ([`RegularArray`], [`ListOffsetArray`], [`ListArray`]), gathers
//! ([`IndexedArray`]), missing-value wrappers ([`IndexedOptionArray`],
//! [`ByteMaskedArray`], [`BitMaskedArray`], [`UnmaskedArray`]), structs
//! ([`RecordArray`]) and tagged unions ([`UnionArray`]).
//!
//! All operations traverse the tree and emit new trees sharing the original buffers
//! wherever no recomputation is required. The two central subsystems are the slice
//! protocol (`getitem_next` / `getitem_next_jagged`, driven by [`Slice`]) and
//! structural simplification (`simplify_optiontype` / `simplify_uniontype`).
//!
//! ```
//! use ragged_array::{Content, ListOffsetArray, NumpyArray, Slice, SliceItem};
//! use ragged_buffer::buffer;
//!
//! // [[1, 2], [], [3, 4, 5]]
//! let layout = ListOffsetArray::try_new(
//!     buffer![0i64, 2, 2, 5].into(),
//!     NumpyArray::from_buffer(buffer![1i64, 2, 3, 4, 5]).into_ref(),
//! )
//! .unwrap();
//!
//! let row = layout.to_content().getitem(&Slice::new(vec![SliceItem::at(2)]).unwrap()).unwrap();
//! assert_eq!(row.as_array().unwrap().to_json().unwrap().to_string(), "[3,4,5]");
//! ```

pub use content::*;
pub use identities::*;
pub use index::*;
pub use item::*;
pub use json::*;
pub use reduce::*;
pub use slice::*;

pub use arrays::*;

mod arrays;
mod content;
mod identities;
mod index;
mod item;
mod json;
pub mod kernels;
mod reduce;
mod slice;
