//! The numeric kernel seam: pure index-loop functions behind the layout algebra.
//!
//! Kernels never allocate nodes and never recurse; they take flat slices, do one tight
//! loop, and either return fresh vectors or a [`KernelError`] attributing the failure
//! to an element. Nodes wrap kernel failures with their class name (and identity path
//! when identities are attached) before surfacing them.

pub use getitem::*;
pub use identities::*;
pub use operations::*;

mod getitem;
mod identities;
mod operations;

use ragged_error::RaggedError;

/// A kernel failure: a static message plus the element it is attributed to, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelError {
    /// What went wrong.
    pub message: &'static str,
    /// The offending element, when the kernel attributes the failure to one.
    pub element: Option<i64>,
}

impl KernelError {
    /// A failure not attributed to a particular element.
    pub fn new(message: &'static str) -> Self {
        Self {
            message,
            element: None,
        }
    }

    /// A failure attributed to element `element`.
    pub fn at(message: &'static str, element: i64) -> Self {
        Self {
            message,
            element: Some(element),
        }
    }

    /// Wrap into a [`RaggedError`], naming the node class that invoked the kernel.
    pub fn into_error(self, class: &str) -> RaggedError {
        RaggedError::Kernel {
            class: class.to_string(),
            message: self.message.to_string(),
            element: self.element,
        }
    }
}

/// The result type of every kernel.
pub type KernelResult<T> = Result<T, KernelError>;
