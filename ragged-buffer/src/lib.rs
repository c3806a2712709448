#![deny(missing_docs)]

//! Aligned buffers of sized values.
//!
//! The crate is built around `bytes::Bytes` and therefore supports zero-copy cloning and
//! slicing, but differs in that it can define and maintain a custom alignment.
//!
//! * [`Buffer<T>`] and [`BufferMut<T>`] provide immutable and mutable wrappers around
//!   `bytes::Bytes` and `bytes::BytesMut` respectively.
//! * [`ByteBuffer`] and [`ByteBufferMut`] are type aliases for `u8` buffers.
//! * The [`buffer!`] macro has the same syntax as the builtin `vec!` macro for inline
//!   construction of buffers.
//!
//! Array nodes hold `Buffer<T>` handles: cloning a buffer or slicing a sub-range shares
//! the underlying allocation, which is what lets layout operations return new trees
//! without copying the data they did not touch.

pub use alignment::*;
pub use buffer::*;
pub use buffer_mut::*;

mod alignment;
mod buffer;
mod buffer_mut;
mod debug;
mod macros;

/// An immutable buffer of u8.
pub type ByteBuffer = Buffer<u8>;

/// A mutable buffer of u8.
pub type ByteBufferMut = BufferMut<u8>;
