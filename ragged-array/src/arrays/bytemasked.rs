use std::sync::Arc;

use ragged_dtype::Parameters;
use ragged_error::{RaggedResult, ragged_bail};

use crate::{
    Content, ContentRef, Identities, Index64, Index8, IndexedOptionArray, Item, NumpyArray,
    Reducer, SliceItem,
};

/// Per-element validity by byte: element `i` is present iff
/// `(mask[i] != 0) == valid_when`.
#[derive(Debug, Clone)]
pub struct ByteMaskedArray {
    pub(crate) identities: Option<Arc<Identities>>,
    pub(crate) parameters: Parameters,
    mask: Index8,
    content: ContentRef,
    valid_when: bool,
}

impl ByteMaskedArray {
    /// A byte-masked wrapper; the content must cover every masked slot.
    pub fn try_new(mask: Index8, content: ContentRef, valid_when: bool) -> RaggedResult<Self> {
        if content.len() < mask.len() {
            ragged_bail!(
                "ByteMaskedArray content of length {} is shorter than its mask of length {}",
                content.len(),
                mask.len()
            );
        }
        Ok(Self {
            identities: None,
            parameters: Parameters::new(),
            mask,
            content,
            valid_when,
        })
    }

    /// Same node with the given parameters.
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// The byte mask.
    pub fn mask(&self) -> &Index8 {
        &self.mask
    }

    /// The inner array.
    pub fn content(&self) -> &ContentRef {
        &self.content
    }

    /// The mask sense: whether non-zero bytes mark valid elements.
    pub fn valid_when(&self) -> bool {
        self.valid_when
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.mask.len()
    }

    /// Whether there are no elements.
    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    /// Whether element `i` is present.
    pub fn is_valid(&self, at: usize) -> bool {
        (self.mask.get(at) != 0) == self.valid_when
    }

    /// The equivalent option gather, sharing the content.
    pub fn to_indexed_option64(&self) -> RaggedResult<IndexedOptionArray> {
        let index: Vec<i64> = (0..self.len())
            .map(|i| if self.is_valid(i) { i as i64 } else { -1 })
            .collect();
        let mut out =
            IndexedOptionArray::try_new(Index64::from(index).into(), self.content.clone())?;
        out.identities = self.identities.clone();
        out.parameters = self.parameters.clone();
        Ok(out)
    }

    /// Materialize the valid elements, dropping the missing slots.
    pub fn project(&self) -> RaggedResult<ContentRef> {
        self.to_indexed_option64()?.project()
    }

    /// Collapse with an option-bearing content, or keep the mask as-is.
    pub fn simplify_optiontype(&self) -> RaggedResult<ContentRef> {
        match self.content.as_ref() {
            Content::Indexed(_)
            | Content::IndexedOption(_)
            | Content::ByteMasked(_)
            | Content::BitMasked(_)
            | Content::Unmasked(_) => self.to_indexed_option64()?.simplify_optiontype(),
            _ => Ok(Content::ByteMasked(self.clone()).into()),
        }
    }

    pub(crate) fn item_at(&self, at: usize) -> RaggedResult<Item> {
        if self.is_valid(at) {
            self.content.getitem_at_nowrap(at as i64)
        } else {
            Ok(Item::Null)
        }
    }

    pub(crate) fn range_nowrap(&self, start: usize, stop: usize) -> RaggedResult<Self> {
        let identities = self
            .identities
            .as_ref()
            .map(|ids| Arc::new(ids.slice(start, stop)));
        Ok(Self {
            identities,
            parameters: self.parameters.clone(),
            mask: self.mask.slice(start, stop),
            content: self.content.getitem_range_nowrap(start as i64, stop as i64)?,
            valid_when: self.valid_when,
        })
    }

    pub(crate) fn carry(&self, carry: &Index64) -> RaggedResult<Content> {
        let mut nextmask = Vec::with_capacity(carry.len());
        for &c in carry.as_slice() {
            if c < 0 || c as usize >= self.len() {
                ragged_bail!(OutOfRange: "carry index {c} out of range for length {}", self.len());
            }
            nextmask.push(self.mask.get(c as usize));
        }
        let identities = self
            .identities
            .as_ref()
            .map(|ids| ids.carry(carry).map(Arc::new))
            .transpose()?;
        Ok(Content::ByteMasked(Self {
            identities,
            parameters: self.parameters.clone(),
            mask: Index8::from(nextmask),
            content: self.content.carry(carry)?,
            valid_when: self.valid_when,
        }))
    }

    pub(crate) fn getitem_next_structural(
        &self,
        head: &SliceItem,
        tail: &[SliceItem],
        advanced: &Index64,
    ) -> RaggedResult<ContentRef> {
        self.to_indexed_option64()?
            .getitem_next_structural(head, tail, advanced)
    }

    pub(crate) fn getitem_next_jagged(
        &self,
        slicestarts: &Index64,
        slicestops: &Index64,
        slicecontent: &SliceItem,
        tail: &[SliceItem],
    ) -> RaggedResult<ContentRef> {
        self.to_indexed_option64()?
            .getitem_next_jagged(slicestarts, slicestops, slicecontent, tail)
    }

    pub(crate) fn is_none(&self, axis: i64, depth: i64) -> RaggedResult<Content> {
        let toaxis = Content::ByteMasked(self.clone()).wrap_axis(axis, depth)?;
        if toaxis == depth {
            let mask: Vec<bool> = (0..self.len()).map(|i| !self.is_valid(i)).collect();
            Ok(Content::Numpy(NumpyArray::from_bools(&mask)))
        } else {
            self.to_indexed_option64()?.is_none(axis, depth)
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn reduce_next(
        &self,
        reducer: &dyn Reducer,
        negaxis: i64,
        starts: &Index64,
        parents: &Index64,
        outlength: i64,
        mask: bool,
        keepdims: bool,
    ) -> RaggedResult<Content> {
        self.to_indexed_option64()?
            .reduce_next(reducer, negaxis, starts, parents, outlength, mask, keepdims)
    }

    pub(crate) fn validity_error(&self, path: &str) -> Option<String> {
        if self.content.len() < self.mask.len() {
            return Some(format!(
                "at {path} (ByteMaskedArray): len(content) < len(mask)"
            ));
        }
        self.content.validity_error(&format!("{path}.content"))
    }

    pub(crate) fn tostring_part(&self, indent: &str, pre: &str, post: &str) -> String {
        let mut out = format!(
            "{indent}{pre}<ByteMaskedArray valid_when=\"{}\">\n",
            self.valid_when
        );
        out.push_str(&format!("{indent}    <mask>{}</mask>\n", self.mask));
        out.push_str(&self.content.tostring_part(&format!("{indent}    "), "<content>", "</content>\n"));
        out.push_str(&format!("{indent}</ByteMaskedArray>{post}"));
        out
    }

    /// This node as a [`Content`].
    pub fn to_content(&self) -> Content {
        Content::ByteMasked(self.clone())
    }

    /// This node as a shared [`ContentRef`].
    pub fn into_ref(self) -> ContentRef {
        Arc::new(Content::ByteMasked(self))
    }
}

impl From<ByteMaskedArray> for Content {
    fn from(a: ByteMaskedArray) -> Self {
        Content::ByteMasked(a)
    }
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;

    use crate::{ByteMaskedArray, Index8, NumpyArray};

    fn sample() -> ByteMaskedArray {
        ByteMaskedArray::try_new(
            Index8::new(buffer![1i8, 0, 1, 0]),
            NumpyArray::from_vec(vec![10i64, 20, 30, 40]).into_ref(),
            true,
        )
        .unwrap()
    }

    #[test]
    fn masked_elements_are_null() {
        assert_eq!(
            sample().to_content().to_json().unwrap().to_string(),
            "[10,null,30,null]"
        );
    }

    #[test]
    fn valid_when_flips() {
        let flipped = ByteMaskedArray::try_new(
            Index8::new(buffer![1i8, 0, 1, 0]),
            NumpyArray::from_vec(vec![10i64, 20, 30, 40]).into_ref(),
            false,
        )
        .unwrap();
        assert_eq!(
            flipped.to_content().to_json().unwrap().to_string(),
            "[null,20,null,40]"
        );
    }

    #[test]
    fn converts_to_option() {
        let opt = sample().to_indexed_option64().unwrap();
        assert_eq!(opt.index().to64().as_slice(), &[0, -1, 2, -1]);
    }

    #[test]
    fn is_none_mask() {
        let out = sample().is_none(0, 0).unwrap();
        assert_eq!(out.to_json().unwrap().to_string(), "[false,true,false,true]");
    }
}
