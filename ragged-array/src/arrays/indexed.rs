use std::sync::Arc;

use ragged_dtype::Parameters;
use ragged_error::{RaggedResult, ragged_bail};

use crate::kernels;
use crate::{
    AnyIndex, Content, ContentRef, Identities, Index64, Item, NumpyArray, Reducer, SliceItem,
    UnionArray,
};

/// A pure gather: element `i` is `content[index[i]]`.
#[derive(Debug, Clone)]
pub struct IndexedArray {
    pub(crate) identities: Option<Arc<Identities>>,
    pub(crate) parameters: Parameters,
    index: AnyIndex,
    content: ContentRef,
}

/// A gather with missing values: a negative `index[i]` marks element `i` missing.
#[derive(Debug, Clone)]
pub struct IndexedOptionArray {
    pub(crate) identities: Option<Arc<Identities>>,
    pub(crate) parameters: Parameters,
    index: AnyIndex,
    content: ContentRef,
}

impl IndexedArray {
    /// A gather of `content` by `index`.
    pub fn try_new(index: AnyIndex, content: ContentRef) -> RaggedResult<Self> {
        Ok(Self {
            identities: None,
            parameters: Parameters::new(),
            index,
            content,
        })
    }

    /// Same node with the given parameters.
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// The gather index.
    pub fn index(&self) -> &AnyIndex {
        &self.index
    }

    /// The inner array.
    pub fn content(&self) -> &ContentRef {
        &self.content
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether there are no elements.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Materialize the gather.
    pub fn project(&self) -> RaggedResult<ContentRef> {
        self.content.carry(&self.index.to64())
    }

    /// Collapse an index-of-index (or index-of-option) chain into a single layer.
    pub fn simplify_optiontype(&self) -> RaggedResult<ContentRef> {
        simplify_index_chain(
            &self.index.to64(),
            false,
            &self.content,
            &self.identities,
            &self.parameters,
        )
    }

    pub(crate) fn item_at(&self, at: usize) -> RaggedResult<Item> {
        let idx = self.index.get(at);
        if idx < 0 || idx >= self.content.len() as i64 {
            ragged_bail!(OutOfRange: "index {idx} out of range for content of length {}", self.content.len());
        }
        self.content.getitem_at_nowrap(idx)
    }

    pub(crate) fn range_nowrap(&self, start: usize, stop: usize) -> RaggedResult<Self> {
        let identities = self
            .identities
            .as_ref()
            .map(|ids| Arc::new(ids.slice(start, stop)));
        Ok(Self {
            identities,
            parameters: self.parameters.clone(),
            index: self.index.slice(start, stop),
            content: self.content.clone(),
        })
    }

    pub(crate) fn carry(&self, carry: &Index64) -> RaggedResult<Content> {
        let index = self.index.to64();
        let next = kernels::index_carry_nocheck(index.as_slice(), carry.as_slice())
            .map_err(|e| e.into_error("IndexedArray"))?;
        let identities = self
            .identities
            .as_ref()
            .map(|ids| ids.carry(carry).map(Arc::new))
            .transpose()?;
        Ok(Content::Indexed(Self {
            identities,
            parameters: self.parameters.clone(),
            index: Index64::from(next).into(),
            content: self.content.clone(),
        }))
    }

    pub(crate) fn getitem_next_structural(
        &self,
        head: &SliceItem,
        tail: &[SliceItem],
        advanced: &Index64,
    ) -> RaggedResult<ContentRef> {
        let index = self.index.to64();
        let nextcarry = kernels::index_carry(
            index.as_slice(),
            Index64::arange(index.len()).as_slice(),
            self.content.len() as i64,
        )
        .map_err(|e| e.into_error("IndexedArray"))?;
        let next = self.content.carry(&Index64::from(nextcarry))?;
        next.getitem_next(Some(head), tail, advanced)
    }

    pub(crate) fn getitem_next_jagged(
        &self,
        slicestarts: &Index64,
        slicestops: &Index64,
        slicecontent: &SliceItem,
        tail: &[SliceItem],
    ) -> RaggedResult<ContentRef> {
        self.project()?
            .getitem_next_jagged(slicestarts, slicestops, slicecontent, tail)
    }

    pub(crate) fn validity_error(&self, path: &str) -> Option<String> {
        let index = self.index.to64();
        if let Err(e) = kernels::index_validity(index.as_slice(), self.content.len() as i64, false)
        {
            return Some(format!(
                "at {path} (IndexedArray): {}{}",
                e.message,
                e.element.map(|i| format!(" at i={i}")).unwrap_or_default()
            ));
        }
        self.content.validity_error(&format!("{path}.content"))
    }

    pub(crate) fn tostring_part(&self, indent: &str, pre: &str, post: &str) -> String {
        let mut out = format!("{indent}{pre}<IndexedArray>\n");
        out.push_str(&format!("{indent}    <index>{}</index>\n", self.index));
        out.push_str(&self.content.tostring_part(&format!("{indent}    "), "<content>", "</content>\n"));
        out.push_str(&format!("{indent}</IndexedArray>{post}"));
        out
    }

    /// Concatenation where this node is appended after `other`.
    pub(crate) fn reverse_merge(&self, other: &Content) -> RaggedResult<Content> {
        reverse_merge_index(&self.index.to64(), false, &self.content, other)
    }

    /// This node as a [`Content`].
    pub fn to_content(&self) -> Content {
        Content::Indexed(self.clone())
    }

    /// This node as a shared [`ContentRef`].
    pub fn into_ref(self) -> ContentRef {
        Arc::new(Content::Indexed(self))
    }
}

impl IndexedOptionArray {
    /// A gather of `content` by `index`, negative entries missing. The index width
    /// must be signed.
    pub fn try_new(index: AnyIndex, content: ContentRef) -> RaggedResult<Self> {
        if !index.is_signed() {
            ragged_bail!(
                "IndexedOptionArray index must have a signed width to mark missing values, got {}",
                index.width_name()
            );
        }
        Ok(Self {
            identities: None,
            parameters: Parameters::new(),
            index,
            content,
        })
    }

    /// Same node with the given parameters.
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// The gather index; negative entries mark missing elements.
    pub fn index(&self) -> &AnyIndex {
        &self.index
    }

    /// The inner array.
    pub fn content(&self) -> &ContentRef {
        &self.content
    }

    /// Number of elements, missing included.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether there are no elements.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// The per-element missingness as bytes (1 = missing).
    pub fn bytemask(&self) -> Vec<i8> {
        self.index.iter64().map(|i| (i < 0) as i8).collect()
    }

    /// Materialize the non-missing elements, dropping the missing slots.
    pub fn project(&self) -> RaggedResult<ContentRef> {
        let index = self.index.to64();
        let (nextcarry, _) =
            kernels::option_nextcarry_outindex(index.as_slice(), self.content.len() as i64)
                .map_err(|e| e.into_error("IndexedOptionArray"))?;
        self.content.carry(&Index64::from(nextcarry))
    }

    /// Collapse an option-of-option (or option-of-index) chain into a single layer.
    pub fn simplify_optiontype(&self) -> RaggedResult<ContentRef> {
        simplify_index_chain(
            &self.index.to64(),
            true,
            &self.content,
            &self.identities,
            &self.parameters,
        )
    }

    /// Route the missing slots around `f`, which receives the projected content, and
    /// re-wrap its result.
    fn route<F>(&self, f: F) -> RaggedResult<Content>
    where
        F: FnOnce(ContentRef) -> RaggedResult<Content>,
    {
        let index = self.index.to64();
        let (nextcarry, outindex) =
            kernels::option_nextcarry_outindex(index.as_slice(), self.content.len() as i64)
                .map_err(|e| e.into_error("IndexedOptionArray"))?;
        let next = self.content.carry(&Index64::from(nextcarry))?;
        let out = f(next)?;
        let wrapped = Self::try_new(Index64::from(outindex).into(), out.into())?
            .with_parameters(self.parameters.clone());
        Ok(wrapped.simplify_optiontype()?.as_ref().clone())
    }

    pub(crate) fn item_at(&self, at: usize) -> RaggedResult<Item> {
        let idx = self.index.get(at);
        if idx < 0 {
            return Ok(Item::Null);
        }
        if idx >= self.content.len() as i64 {
            ragged_bail!(OutOfRange: "index {idx} out of range for content of length {}", self.content.len());
        }
        self.content.getitem_at_nowrap(idx)
    }

    pub(crate) fn range_nowrap(&self, start: usize, stop: usize) -> RaggedResult<Self> {
        let identities = self
            .identities
            .as_ref()
            .map(|ids| Arc::new(ids.slice(start, stop)));
        Ok(Self {
            identities,
            parameters: self.parameters.clone(),
            index: self.index.slice(start, stop),
            content: self.content.clone(),
        })
    }

    pub(crate) fn carry(&self, carry: &Index64) -> RaggedResult<Content> {
        let index = self.index.to64();
        let next = kernels::index_carry_nocheck(index.as_slice(), carry.as_slice())
            .map_err(|e| e.into_error("IndexedOptionArray"))?;
        let identities = self
            .identities
            .as_ref()
            .map(|ids| ids.carry(carry).map(Arc::new))
            .transpose()?;
        Ok(Content::IndexedOption(Self {
            identities,
            parameters: self.parameters.clone(),
            index: Index64::from(next).into(),
            content: self.content.clone(),
        }))
    }

    pub(crate) fn getitem_next_structural(
        &self,
        head: &SliceItem,
        tail: &[SliceItem],
        advanced: &Index64,
    ) -> RaggedResult<ContentRef> {
        let index = self.index.to64();
        let (nextcarry, outindex) =
            kernels::option_nextcarry_outindex(index.as_slice(), self.content.len() as i64)
                .map_err(|e| e.into_error("IndexedOptionArray"))?;
        let next = self.content.carry(&Index64::from(nextcarry))?;
        let out = next.getitem_next(Some(head), tail, advanced)?;
        let wrapped = Self::try_new(Index64::from(outindex).into(), out)?
            .with_parameters(self.parameters.clone());
        wrapped.simplify_optiontype()
    }

    pub(crate) fn getitem_next_jagged(
        &self,
        slicestarts: &Index64,
        slicestops: &Index64,
        slicecontent: &SliceItem,
        tail: &[SliceItem],
    ) -> RaggedResult<ContentRef> {
        let index = self.index.to64();
        let (reducedstarts, reducedstops) = kernels::option_project_jagged(
            index.as_slice(),
            slicestarts.as_slice(),
            slicestops.as_slice(),
        )
        .map_err(|e| e.into_error("IndexedOptionArray"))?;
        let (nextcarry, outindex) =
            kernels::option_nextcarry_outindex(index.as_slice(), self.content.len() as i64)
                .map_err(|e| e.into_error("IndexedOptionArray"))?;
        let next = self.content.carry(&Index64::from(nextcarry))?;
        let out = next.getitem_next_jagged(
            &Index64::from(reducedstarts),
            &Index64::from(reducedstops),
            slicecontent,
            tail,
        )?;
        let wrapped = Self::try_new(Index64::from(outindex).into(), out)?
            .with_parameters(self.parameters.clone());
        wrapped.simplify_optiontype()
    }

    pub(crate) fn num(&self, axis: i64, depth: i64) -> RaggedResult<Content> {
        self.route(|next| next.num_at(axis, depth))
    }

    pub(crate) fn offsets_and_flattened(
        &self,
        axis: i64,
        depth: i64,
    ) -> RaggedResult<(Index64, Content)> {
        // Flattening drops the missing elements of this layer.
        let (offsets, flattened) = self.project()?.offsets_and_flattened(axis, depth)?;
        Ok((offsets, flattened))
    }

    pub(crate) fn fillna(&self, value: &ContentRef) -> RaggedResult<Content> {
        if value.len() != 1 {
            ragged_bail!(TypeMismatch:
                "fillna value length is {}, but it must be broadcastable as length 1",
                value.len());
        }
        let index = self.index.to64();
        let (tags, outindex) = kernels::union_fillna(index.as_slice());
        let union = UnionArray::try_new(
            crate::Index8::from(tags).into(),
            Index64::from(outindex).into(),
            vec![self.content.clone(), value.clone()],
        )?;
        Ok(union.simplify_uniontype(true)?.as_ref().clone())
    }

    pub(crate) fn is_none(&self, axis: i64, depth: i64) -> RaggedResult<Content> {
        let toaxis = Content::IndexedOption(self.clone()).wrap_axis(axis, depth)?;
        if toaxis == depth {
            let mask: Vec<bool> = self.index.iter64().map(|i| i < 0).collect();
            Ok(Content::Numpy(NumpyArray::from_bools(&mask)))
        } else {
            self.route(|next| next.is_none_at(axis, depth))
        }
    }

    pub(crate) fn rpad(
        &self,
        target: i64,
        axis: i64,
        depth: i64,
        clip: bool,
    ) -> RaggedResult<Content> {
        let toaxis = Content::IndexedOption(self.clone()).wrap_axis(axis, depth)?;
        if toaxis == depth {
            return Content::IndexedOption(self.clone()).rpad_axis0(target, clip);
        }
        self.route(|next| next.rpad_at(target, axis, depth, clip))
    }

    pub(crate) fn localindex(&self, axis: i64, depth: i64) -> RaggedResult<Content> {
        self.route(|next| next.localindex_at(axis, depth))
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn combinations(
        &self,
        n: usize,
        replacement: bool,
        recordlookup: Option<Vec<String>>,
        parameters: &Parameters,
        axis: i64,
        depth: i64,
    ) -> RaggedResult<Content> {
        self.route(|next| next.combinations_at(n, replacement, recordlookup, parameters, axis, depth))
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
        // Missing elements simply do not contribute to their group.
        let index = self.index.to64();
        let mut nextcarry = Vec::with_capacity(index.len());
        let mut nextparents = Vec::with_capacity(index.len());
        for (i, idx) in index.iter64().enumerate() {
            if idx >= 0 {
                nextcarry.push(idx);
                nextparents.push(parents.get(i));
            }
        }
        let next = self.content.carry(&Index64::from(nextcarry))?;
        next.reduce_next(
            reducer,
            negaxis,
            starts,
            &Index64::from(nextparents),
            outlength,
            mask,
            keepdims,
        )
    }

    pub(crate) fn validity_error(&self, path: &str) -> Option<String> {
        let index = self.index.to64();
        if let Err(e) = kernels::index_validity(index.as_slice(), self.content.len() as i64, true) {
            return Some(format!(
                "at {path} (IndexedOptionArray): {}{}",
                e.message,
                e.element.map(|i| format!(" at i={i}")).unwrap_or_default()
            ));
        }
        self.content.validity_error(&format!("{path}.content"))
    }

    pub(crate) fn tostring_part(&self, indent: &str, pre: &str, post: &str) -> String {
        let mut out = format!("{indent}{pre}<IndexedOptionArray>\n");
        out.push_str(&format!("{indent}    <index>{}</index>\n", self.index));
        out.push_str(&self.content.tostring_part(&format!("{indent}    "), "<content>", "</content>\n"));
        out.push_str(&format!("{indent}</IndexedOptionArray>{post}"));
        out
    }

    /// Concatenation where this node is appended after `other`.
    pub(crate) fn reverse_merge(&self, other: &Content) -> RaggedResult<Content> {
        reverse_merge_index(&self.index.to64(), true, &self.content, other)
    }

    /// This node as a [`Content`].
    pub fn to_content(&self) -> Content {
        Content::IndexedOption(self.clone())
    }

    /// This node as a shared [`ContentRef`].
    pub fn into_ref(self) -> ContentRef {
        Arc::new(Content::IndexedOption(self))
    }
}

impl From<IndexedArray> for Content {
    fn from(a: IndexedArray) -> Self {
        Content::Indexed(a)
    }
}

impl From<IndexedOptionArray> for Content {
    fn from(a: IndexedOptionArray) -> Self {
        Content::IndexedOption(a)
    }
}

/// The option/index collapse shared by [`IndexedArray`] and [`IndexedOptionArray`]:
/// compose with an index-bearing content into a single layer, missing if either layer
/// is missing.
fn simplify_index_chain(
    index: &Index64,
    outer_option: bool,
    content: &ContentRef,
    identities: &Option<Arc<Identities>>,
    parameters: &Parameters,
) -> RaggedResult<ContentRef> {
    let inner: Option<(Index64, bool, ContentRef)> = match content.as_ref() {
        Content::Indexed(x) => Some((x.index.to64(), false, x.content.clone())),
        Content::IndexedOption(x) => Some((x.index.to64(), true, x.content.clone())),
        Content::ByteMasked(x) => {
            let opt = x.to_indexed_option64()?;
            Some((opt.index.to64(), true, opt.content.clone()))
        }
        Content::BitMasked(x) => {
            let opt = x.to_byte_masked()?.to_indexed_option64()?;
            Some((opt.index.to64(), true, opt.content.clone()))
        }
        Content::Unmasked(x) => Some((
            Index64::arange(x.content().len()),
            true,
            x.content().clone(),
        )),
        _ => None,
    };

    let Some((inner_index, inner_option, inner_content)) = inner else {
        let node = if outer_option {
            Content::IndexedOption(IndexedOptionArray {
                identities: identities.clone(),
                parameters: parameters.clone(),
                index: index.clone().into(),
                content: content.clone(),
            })
        } else {
            Content::Indexed(IndexedArray {
                identities: identities.clone(),
                parameters: parameters.clone(),
                index: index.clone().into(),
                content: content.clone(),
            })
        };
        return Ok(node.into());
    };

    let mut composed = Vec::with_capacity(index.len());
    for idx in index.iter64() {
        if idx < 0 {
            composed.push(-1);
        } else {
            if idx as usize >= inner_index.len() {
                ragged_bail!(OutOfRange:
                    "index {idx} out of range for inner index of length {}",
                    inner_index.len());
            }
            composed.push(inner_index.get(idx as usize));
        }
    }
    let option = outer_option || inner_option;
    let node = if option {
        Content::IndexedOption(IndexedOptionArray {
            identities: identities.clone(),
            parameters: parameters.clone(),
            index: Index64::from(composed).into(),
            content: inner_content,
        })
    } else {
        Content::Indexed(IndexedArray {
            identities: identities.clone(),
            parameters: parameters.clone(),
            index: Index64::from(composed).into(),
            content: inner_content,
        })
    };
    Ok(node.into())
}

/// Concatenate an index layer after `other` (reverse) keeping the gather lazy.
fn reverse_merge_index(
    my_index: &Index64,
    my_option: bool,
    my_content: &ContentRef,
    other: &Content,
) -> RaggedResult<Content> {
    let theirlength = other.len() as i64;
    let content: ContentRef = other.merge(my_content.as_ref())?.into();
    let mut index = Vec::with_capacity(theirlength as usize + my_index.len());
    index.extend(0..theirlength);
    for idx in my_index.iter64() {
        index.push(if idx < 0 { -1 } else { idx + theirlength });
    }
    let node = if my_option {
        Content::IndexedOption(IndexedOptionArray::try_new(
            Index64::from(index).into(),
            content,
        )?)
    } else {
        Content::Indexed(IndexedArray::try_new(Index64::from(index).into(), content)?)
    };
    Ok(node)
}

/// Concatenate an index layer before `other`, keeping the gather lazy.
pub(crate) fn merge_index(
    my_index: &Index64,
    my_option: bool,
    my_content: &ContentRef,
    other: &Content,
) -> RaggedResult<Content> {
    let mylength = my_index.len();
    let base = my_content.len() as i64;
    let (their_index, their_option, their_content): (Index64, bool, Option<ContentRef>) =
        match other {
            Content::Indexed(x) => (x.index.to64(), false, Some(x.content.clone())),
            Content::IndexedOption(x) => (x.index.to64(), true, Some(x.content.clone())),
            _ => (Index64::arange(other.len()), false, None),
        };
    let content: ContentRef = match &their_content {
        Some(inner) => my_content.merge(inner.as_ref())?.into(),
        None => my_content.merge(other)?.into(),
    };
    let mut index = Vec::with_capacity(mylength + their_index.len());
    index.extend(my_index.iter64());
    for idx in their_index.iter64() {
        index.push(if idx < 0 { -1 } else { idx + base });
    }
    let node = if my_option || their_option {
        Content::IndexedOption(IndexedOptionArray::try_new(
            Index64::from(index).into(),
            content,
        )?)
    } else {
        Content::Indexed(IndexedArray::try_new(Index64::from(index).into(), content)?)
    };
    Ok(node)
}

#[cfg(test)]
mod test {
    use crate::{Content, Index64, IndexedOptionArray, NumpyArray};

    fn option_sample() -> IndexedOptionArray {
        IndexedOptionArray::try_new(
            Index64::from(vec![0i64, -1, 1]).into(),
            IndexedOptionArray::try_new(
                Index64::from(vec![-1i64, 2]).into(),
                NumpyArray::from_vec(vec![100i64, 200, 300]).into_ref(),
            )
            .unwrap()
            .into_ref(),
        )
        .unwrap()
    }

    #[test]
    fn option_of_option_collapses() {
        let simplified = option_sample().simplify_optiontype().unwrap();
        let Content::IndexedOption(flat) = simplified.as_ref() else {
            panic!("expected a single option layer");
        };
        assert_eq!(flat.index().to64().as_slice(), &[-1, -1, 2]);
        assert!(matches!(flat.content().as_ref(), Content::Numpy(_)));
    }

    #[test]
    fn collapse_is_idempotent() {
        let once = option_sample().simplify_optiontype().unwrap();
        let Content::IndexedOption(once_node) = once.as_ref() else {
            panic!("expected an option layer");
        };
        let twice = once_node.simplify_optiontype().unwrap();
        assert_eq!(
            once.to_json().unwrap().to_string(),
            twice.to_json().unwrap().to_string()
        );
    }

    #[test]
    fn missing_is_observable() {
        let sample = option_sample();
        assert!(sample.item_at(0).unwrap().is_null()); // routes to inner -1
        assert!(sample.item_at(1).unwrap().is_null());
        assert_eq!(
            sample.item_at(2).unwrap().as_scalar().unwrap().as_i64().unwrap(),
            300
        );
    }

    #[test]
    fn is_none_after_collapse() {
        let out = option_sample().is_none(0, 0).unwrap();
        assert_eq!(out.to_json().unwrap().to_string(), "[true,true,false]");
    }

    #[test]
    fn all_missing_iterates_as_none() {
        let all_missing = IndexedOptionArray::try_new(
            Index64::from(vec![-1i64, -1]).into(),
            NumpyArray::from_vec(vec![1i64]).into_ref(),
        )
        .unwrap();
        assert_eq!(
            all_missing.to_content().to_json().unwrap().to_string(),
            "[null,null]"
        );
    }

    #[test]
    fn fillna_replaces_missing() {
        let filled = option_sample()
            .simplify_optiontype()
            .unwrap()
            .fillna(&NumpyArray::from_vec(vec![999i64]).into_ref())
            .unwrap();
        assert_eq!(filled.to_json().unwrap().to_string(), "[999,999,300]");
    }
}
