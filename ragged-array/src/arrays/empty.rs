use std::sync::Arc;

use ragged_dtype::Parameters;

use crate::{Content, ContentRef, Identities};

/// A length-0 array of unspecified type: the identity under merge and concatenation.
#[derive(Debug, Clone, Default)]
pub struct EmptyArray {
    pub(crate) identities: Option<Arc<Identities>>,
    pub(crate) parameters: Parameters,
}

impl EmptyArray {
    /// A new empty array.
    pub fn new() -> Self {
        Self::default()
    }

    /// Same node with the given parameters.
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// This node as a [`Content`].
    pub fn to_content(&self) -> Content {
        Content::Empty(self.clone())
    }

    /// This node as a shared [`ContentRef`].
    pub fn into_ref(self) -> ContentRef {
        Arc::new(Content::Empty(self))
    }
}

#[cfg(test)]
mod test {
    use crate::{Content, EmptyArray};

    #[test]
    fn always_empty() {
        let empty = EmptyArray::new().to_content();
        assert_eq!(empty.len(), 0);
        assert!(empty.getitem_at(0).is_err());
        assert_eq!(empty.getitem_range(None, None).unwrap().len(), 0);
    }

    #[test]
    fn merge_identity() {
        let empty = EmptyArray::new().to_content();
        let other = crate::NumpyArray::from_vec(vec![1i64, 2]).to_content();
        let merged = empty.merge(&other).unwrap();
        assert_eq!(merged.len(), 2);
        assert!(matches!(&merged, Content::Numpy(_)));
    }
}
