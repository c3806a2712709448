use std::sync::Arc;

use ragged_dtype::Parameters;
use ragged_error::RaggedResult;

use crate::{
    Content, ContentRef, Identities, Index64, IndexedOptionArray, Item, SliceItem,
};

/// An option-typed wrapper asserting that no element is missing; purely structural,
/// for type-system unity with the other option wrappers.
#[derive(Debug, Clone)]
pub struct UnmaskedArray {
    pub(crate) identities: Option<Arc<Identities>>,
    pub(crate) parameters: Parameters,
    content: ContentRef,
}

impl UnmaskedArray {
    /// Wrap `content` as trivially-valid option data.
    pub fn new(content: ContentRef) -> Self {
        Self {
            identities: None,
            parameters: Parameters::new(),
            content,
        }
    }

    /// Same node with the given parameters.
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// The inner array.
    pub fn content(&self) -> &ContentRef {
        &self.content
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Whether there are no elements.
    pub fn is_empty(&self) -> bool {
        self.content.len() == 0
    }

    /// The equivalent option gather with an identity index.
    pub fn to_indexed_option64(&self) -> RaggedResult<IndexedOptionArray> {
        let mut out = IndexedOptionArray::try_new(
            Index64::arange(self.len()).into(),
            self.content.clone(),
        )?;
        out.identities = self.identities.clone();
        out.parameters = self.parameters.clone();
        Ok(out)
    }

    /// An unmasked wrapper over option-bearing content collapses to the content.
    pub fn simplify_optiontype(&self) -> RaggedResult<ContentRef> {
        match self.content.as_ref() {
            Content::Indexed(_)
            | Content::IndexedOption(_)
            | Content::ByteMasked(_)
            | Content::BitMasked(_)
            | Content::Unmasked(_) => Ok(self.content.clone()),
            _ => Ok(Content::Unmasked(self.clone()).into()),
        }
    }

    pub(crate) fn item_at(&self, at: usize) -> RaggedResult<Item> {
        self.content.getitem_at_nowrap(at as i64)
    }

    pub(crate) fn range_nowrap(&self, start: usize, stop: usize) -> RaggedResult<Self> {
        let identities = self
            .identities
            .as_ref()
            .map(|ids| Arc::new(ids.slice(start, stop)));
        Ok(Self {
            identities,
            parameters: self.parameters.clone(),
            content: self.content.getitem_range_nowrap(start as i64, stop as i64)?,
        })
    }

    pub(crate) fn carry(&self, carry: &Index64) -> RaggedResult<Content> {
        let identities = self
            .identities
            .as_ref()
            .map(|ids| ids.carry(carry).map(Arc::new))
            .transpose()?;
        Ok(Content::Unmasked(Self {
            identities,
            parameters: self.parameters.clone(),
            content: self.content.carry(carry)?,
        }))
    }

    pub(crate) fn getitem_next_structural(
        &self,
        head: &SliceItem,
        tail: &[SliceItem],
        advanced: &Index64,
    ) -> RaggedResult<ContentRef> {
        let out = self.content.getitem_next(Some(head), tail, advanced)?;
        Self {
            identities: self.identities.clone(),
            parameters: self.parameters.clone(),
            content: out,
        }
        .simplify_optiontype()
    }

    pub(crate) fn getitem_next_jagged(
        &self,
        slicestarts: &Index64,
        slicestops: &Index64,
        slicecontent: &SliceItem,
        tail: &[SliceItem],
    ) -> RaggedResult<ContentRef> {
        let out = self
            .content
            .getitem_next_jagged(slicestarts, slicestops, slicecontent, tail)?;
        Self {
            identities: self.identities.clone(),
            parameters: self.parameters.clone(),
            content: out,
        }
        .simplify_optiontype()
    }

    pub(crate) fn validity_error(&self, path: &str) -> Option<String> {
        self.content.validity_error(&format!("{path}.content"))
    }

    pub(crate) fn tostring_part(&self, indent: &str, pre: &str, post: &str) -> String {
        let mut out = format!("{indent}{pre}<UnmaskedArray>\n");
        out.push_str(&self.content.tostring_part(&format!("{indent}    "), "<content>", "</content>\n"));
        out.push_str(&format!("{indent}</UnmaskedArray>{post}"));
        out
    }

    /// This node as a [`Content`].
    pub fn to_content(&self) -> Content {
        Content::Unmasked(self.clone())
    }

    /// This node as a shared [`ContentRef`].
    pub fn into_ref(self) -> ContentRef {
        Arc::new(Content::Unmasked(self))
    }
}

impl From<UnmaskedArray> for Content {
    fn from(a: UnmaskedArray) -> Self {
        Content::Unmasked(a)
    }
}

#[cfg(test)]
mod test {
    use crate::{Content, Index64, IndexedOptionArray, NumpyArray, UnmaskedArray};

    #[test]
    fn transparent_access() {
        let a = UnmaskedArray::new(NumpyArray::from_vec(vec![1i64, 2]).into_ref());
        assert_eq!(a.len(), 2);
        assert_eq!(a.to_content().to_json().unwrap().to_string(), "[1,2]");
        assert!(!a.item_at(0).unwrap().is_null());
    }

    #[test]
    fn collapses_over_option_content() {
        let inner = IndexedOptionArray::try_new(
            Index64::from(vec![0i64, -1]).into(),
            NumpyArray::from_vec(vec![5i64]).into_ref(),
        )
        .unwrap();
        let wrapped = UnmaskedArray::new(inner.into_ref());
        let simplified = wrapped.simplify_optiontype().unwrap();
        assert!(matches!(simplified.as_ref(), Content::IndexedOption(_)));
    }

    #[test]
    fn stays_over_plain_content() {
        let wrapped = UnmaskedArray::new(NumpyArray::from_vec(vec![5i64]).into_ref());
        let simplified = wrapped.simplify_optiontype().unwrap();
        assert!(matches!(simplified.as_ref(), Content::Unmasked(_)));
    }
}
