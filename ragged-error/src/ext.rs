use crate::RaggedResult;

/// Extension trait for [`RaggedResult`].
pub trait ResultExt<T>: private::Sealed {
    /// Flatten a nested [`RaggedResult`]. Helper function until <https://github.com/rust-lang/rust/issues/70142> is stabilized.
    fn flatten(self) -> RaggedResult<T>;
}

mod private {
    use crate::RaggedResult;

    pub trait Sealed {}

    impl<T> Sealed for RaggedResult<RaggedResult<T>> {}
}

impl<T> ResultExt<T> for RaggedResult<RaggedResult<T>> {
    fn flatten(self) -> RaggedResult<T> {
        match self {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) | Err(e) => Err(e),
        }
    }
}
