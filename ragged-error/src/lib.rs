#![deny(missing_docs)]

//! Error handling for the ragged workspace.
//!
//! Every fallible operation in the workspace returns a [`RaggedResult`]. Errors are
//! constructed with the [`ragged_err!`] and [`ragged_bail!`] macros, which select one of
//! the error kinds of [`RaggedError`] and accept `format!`-style arguments.

pub use ext::*;

mod ext;

use std::fmt::Display;

/// The top-level error type for the workspace.
///
/// The first four variants correspond to the failure categories of the layout algebra:
/// out-of-domain indexes, structurally incompatible operands, broken construction
/// invariants, and (node kind, operation) pairs that are not defined. `Kernel` wraps a
/// failure reported by an index-loop kernel with the node that invoked it, and `Context`
/// chains an outer message onto any other error.
#[derive(Debug, thiserror::Error)]
pub enum RaggedError {
    /// An element index, slice bound, axis, or field ordinal outside its valid domain.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// Operands whose structure or element types are incompatible.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// A constructed or received node violates a structural invariant.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The operation is not defined for this node kind.
    #[error("undefined operation: {0}")]
    UndefinedOperation(String),

    /// A kernel failure, annotated with the class name of the node that invoked it and,
    /// when identities were attached, the path of the offending element.
    #[error("{class}: {message}{}", .element.map(|e| format!(" at i={e}")).unwrap_or_default())]
    Kernel {
        /// Class name of the node that invoked the kernel.
        class: String,
        /// The kernel's failure message.
        message: String,
        /// The offending element, when the kernel attributes the failure to one.
        element: Option<i64>,
    },

    /// An error wrapped with additional context.
    #[error("{0}: {1}")]
    Context(String, Box<RaggedError>),
}

impl RaggedError {
    /// Wrap this error with an outer context message.
    pub fn with_context<T: Display>(self, msg: T) -> Self {
        RaggedError::Context(msg.to_string(), Box::new(self))
    }
}

/// The result type returned by all fallible operations in the workspace.
pub type RaggedResult<T> = Result<T, RaggedError>;

/// Construct a [`RaggedError`], selecting the kind with a leading `Kind:` token.
///
/// ```
/// use ragged_error::{ragged_err, RaggedError};
///
/// let err = ragged_err!(OutOfRange: "index {} out of range for length {}", 4, 3);
/// assert!(matches!(err, RaggedError::OutOfRange(_)));
/// let err = ragged_err!("offsets must be monotonic");
/// assert!(matches!(err, RaggedError::InvariantViolation(_)));
/// ```
#[macro_export]
macro_rules! ragged_err {
    (OutOfRange: $($fmt:tt)*) => {
        $crate::RaggedError::OutOfRange(format!($($fmt)*))
    };
    (TypeMismatch: $($fmt:tt)*) => {
        $crate::RaggedError::TypeMismatch(format!($($fmt)*))
    };
    (UndefinedOperation: $($fmt:tt)*) => {
        $crate::RaggedError::UndefinedOperation(format!($($fmt)*))
    };
    ($($fmt:tt)*) => {
        $crate::RaggedError::InvariantViolation(format!($($fmt)*))
    };
}

/// Return early with a [`RaggedError`]; same syntax as [`ragged_err!`].
#[macro_export]
macro_rules! ragged_bail {
    ($($tt:tt)*) => {
        return Err($crate::ragged_err!($($tt)*))
    };
}

/// Panic with a formatted message, for conditions that indicate a bug in this
/// workspace rather than bad caller input.
#[macro_export]
macro_rules! ragged_panic {
    ($($fmt:tt)*) => {
        panic!("{}", format!($($fmt)*))
    };
}

/// Extension trait adding a message to `expect`-style unwraps of results.
pub trait RaggedExpect {
    /// The value produced on success.
    type Output;

    /// Unwrap, panicking with the given message and the underlying error on failure.
    fn ragged_expect(self, msg: &str) -> Self::Output;
}

impl<T> RaggedExpect for RaggedResult<T> {
    type Output = T;

    fn ragged_expect(self, msg: &str) -> T {
        self.unwrap_or_else(|e| ragged_panic!("{msg}: {e}"))
    }
}

impl<T> RaggedExpect for Option<T> {
    type Output = T;

    fn ragged_expect(self, msg: &str) -> T {
        self.unwrap_or_else(|| ragged_panic!("{msg}"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn err_kinds() {
        assert!(matches!(
            ragged_err!(OutOfRange: "oops"),
            RaggedError::OutOfRange(_)
        ));
        assert!(matches!(
            ragged_err!(TypeMismatch: "oops"),
            RaggedError::TypeMismatch(_)
        ));
        assert!(matches!(
            ragged_err!(UndefinedOperation: "oops"),
            RaggedError::UndefinedOperation(_)
        ));
        assert!(matches!(ragged_err!("oops"), RaggedError::InvariantViolation(_)));
    }

    #[test]
    fn context_display() {
        let err = ragged_err!(OutOfRange: "index 7 out of range").with_context("carry");
        assert_eq!(err.to_string(), "carry: out of range: index 7 out of range");
    }

    #[test]
    fn bail() {
        fn inner() -> RaggedResult<()> {
            ragged_bail!(TypeMismatch: "cannot merge {} with {}", "a", "b");
        }
        assert_eq!(
            inner().unwrap_err().to_string(),
            "type mismatch: cannot merge a with b"
        );
    }
}
