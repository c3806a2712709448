use std::sync::Arc;

use ragged_dtype::Parameters;
use ragged_error::{RaggedResult, ragged_bail, ragged_err};

use crate::kernels;
use crate::{
    AnyIndex, Content, ContentRef, Identities, Index64, IndexedOptionArray, Item, ListArray,
    NumpyArray, RecordArray, Reducer, RegularArray, SliceItem,
};

/// Variable-length lists encoded by a monotone offsets index: list `i` spans
/// `[offsets[i], offsets[i+1])` of the content.
#[derive(Debug, Clone)]
pub struct ListOffsetArray {
    pub(crate) identities: Option<Arc<Identities>>,
    pub(crate) parameters: Parameters,
    offsets: AnyIndex,
    content: ContentRef,
}

impl ListOffsetArray {
    /// A jagged layer over `content`; `offsets` must have at least one entry.
    pub fn try_new(offsets: AnyIndex, content: ContentRef) -> RaggedResult<Self> {
        if offsets.is_empty() {
            ragged_bail!("ListOffsetArray offsets must have at least one entry, [0] for an empty array");
        }
        Ok(Self {
            identities: None,
            parameters: Parameters::new(),
            offsets,
            content,
        })
    }

    /// Same node with the given parameters.
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// The offsets index.
    pub fn offsets(&self) -> &AnyIndex {
        &self.offsets
    }

    /// The inner array.
    pub fn content(&self) -> &ContentRef {
        &self.content
    }

    /// Number of lists.
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Whether there are no lists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-list start positions, sharing the offsets buffer.
    pub fn starts(&self) -> AnyIndex {
        self.offsets.slice(0, self.offsets.len() - 1)
    }

    /// Per-list stop positions, sharing the offsets buffer.
    pub fn stops(&self) -> AnyIndex {
        self.offsets.slice(1, self.offsets.len())
    }

    /// The equivalent generalized list layer, sharing the offsets buffer.
    pub fn to_list(&self) -> ListArray {
        let mut out = ListArray::new_unchecked(self.starts(), self.stops(), self.content.clone());
        out.identities = self.identities.clone();
        out.parameters = self.parameters.clone();
        out
    }

    /// Canonical 64-bit form. When `start_at_zero`, the first offset is rebased to 0
    /// and the content trimmed to the covered range.
    pub fn to_listoffset64(&self, start_at_zero: bool) -> RaggedResult<Self> {
        let offsets = self.offsets.to64();
        let off0 = offsets.get(0);
        if !start_at_zero || off0 == 0 {
            let mut out = Self::try_new(offsets.into(), self.content.clone())?;
            out.identities = self.identities.clone();
            out.parameters = self.parameters.clone();
            return Ok(out);
        }
        let shifted: Index64 = offsets.iter64().map(|o| o - off0).collect::<Vec<_>>().into();
        let last = offsets.get(offsets.len() - 1);
        let trimmed = self.content.getitem_range_nowrap(off0, last)?;
        let mut out = Self::try_new(shifted.into(), trimmed)?;
        out.identities = self.identities.clone();
        out.parameters = self.parameters.clone();
        Ok(out)
    }

    pub(crate) fn item_at(&self, at: usize) -> RaggedResult<Item> {
        let start = self.offsets.get(at);
        let stop = self.offsets.get(at + 1);
        Ok(Item::Array(self.content.getitem_range_nowrap(start, stop)?))
    }

    pub(crate) fn range_nowrap(&self, start: usize, stop: usize) -> RaggedResult<Self> {
        let identities = self
            .identities
            .as_ref()
            .map(|ids| Arc::new(ids.slice(start, stop)));
        Ok(Self {
            identities,
            parameters: self.parameters.clone(),
            offsets: self.offsets.slice(start, stop + 1),
            content: self.content.clone(),
        })
    }

    pub(crate) fn carry(&self, carry: &Index64) -> RaggedResult<Content> {
        self.to_list().carry(carry)
    }

    pub(crate) fn getitem_next_structural(
        &self,
        head: &SliceItem,
        tail: &[SliceItem],
        advanced: &Index64,
    ) -> RaggedResult<ContentRef> {
        self.to_list().getitem_next_structural(head, tail, advanced)
    }

    pub(crate) fn getitem_next_jagged(
        &self,
        slicestarts: &Index64,
        slicestops: &Index64,
        slicecontent: &SliceItem,
        tail: &[SliceItem],
    ) -> RaggedResult<ContentRef> {
        self.to_list()
            .getitem_next_jagged(slicestarts, slicestops, slicecontent, tail)
    }

    pub(crate) fn num(&self, axis: i64, depth: i64) -> RaggedResult<Content> {
        let toaxis = Content::ListOffset(self.clone()).wrap_axis(axis, depth)?;
        let offsets = self.offsets.to64();
        if toaxis == depth + 1 {
            let counts = kernels::list_num(
                &offsets.as_slice()[..self.len()],
                &offsets.as_slice()[1..],
            );
            Ok(Content::Numpy(NumpyArray::from_vec(counts)))
        } else {
            let inner = self.content.num_at(axis, depth + 1)?;
            Ok(Content::ListOffset(Self::try_new(
                self.offsets.clone(),
                inner.into(),
            )?))
        }
    }

    pub(crate) fn offsets_and_flattened(
        &self,
        axis: i64,
        depth: i64,
    ) -> RaggedResult<(Index64, Content)> {
        let toaxis = Content::ListOffset(self.clone()).wrap_axis(axis, depth)?;
        if toaxis == depth {
            ragged_bail!(OutOfRange: "axis=0 not allowed for flatten");
        }
        let compact = self.to_listoffset64(true)?;
        let offsets = compact.offsets.to64();
        if toaxis == depth + 1 {
            let covered = offsets.get(offsets.len() - 1);
            let trimmed = compact.content.getitem_range_nowrap(0, covered)?;
            Ok((offsets, trimmed.as_ref().clone()))
        } else {
            let (inner_offsets, flattened) =
                compact.content.offsets_and_flattened(axis, depth + 1)?;
            if inner_offsets.is_empty() {
                Ok((
                    Index64::empty(),
                    Content::ListOffset(Self::try_new(offsets.into(), flattened.into())?),
                ))
            } else {
                // The child flattened its own axis away, so its offsets fold into this
                // level: list i now spans the flattened elements of its former lists.
                let folded: Vec<i64> = offsets
                    .iter64()
                    .map(|o| inner_offsets.get(o as usize))
                    .collect();
                Ok((
                    Index64::empty(),
                    Content::ListOffset(Self::try_new(
                        Index64::from(folded).into(),
                        flattened.into(),
                    )?),
                ))
            }
        }
    }

    pub(crate) fn fillna(&self, value: &ContentRef) -> RaggedResult<Content> {
        Ok(Content::ListOffset(Self {
            identities: self.identities.clone(),
            parameters: self.parameters.clone(),
            offsets: self.offsets.clone(),
            content: self.content.fillna(value)?.into(),
        }))
    }

    pub(crate) fn is_none(&self, axis: i64, depth: i64) -> RaggedResult<Content> {
        let toaxis = Content::ListOffset(self.clone()).wrap_axis(axis, depth)?;
        if toaxis == depth {
            Ok(Content::Numpy(NumpyArray::from_bools(&vec![false; self.len()])))
        } else {
            let inner = self.content.is_none_at(axis, depth + 1)?;
            Ok(Content::ListOffset(Self::try_new(
                self.offsets.clone(),
                inner.into(),
            )?))
        }
    }

    pub(crate) fn rpad(
        &self,
        target: i64,
        axis: i64,
        depth: i64,
        clip: bool,
    ) -> RaggedResult<Content> {
        let toaxis = Content::ListOffset(self.clone()).wrap_axis(axis, depth)?;
        if toaxis == depth {
            return Content::ListOffset(self.clone()).rpad_axis0(target, clip);
        }
        if toaxis == depth + 1 {
            let offsets = self.offsets.to64();
            let (outoffsets, index) = kernels::list_rpad(
                &offsets.as_slice()[..self.len()],
                &offsets.as_slice()[1..],
                target,
                clip,
            );
            let option =
                IndexedOptionArray::try_new(Index64::from(index).into(), self.content.clone())?;
            let inner = Content::IndexedOption(option).simplify_optiontype()?;
            Ok(Content::ListOffset(Self::try_new(
                Index64::from(outoffsets).into(),
                inner,
            )?))
        } else {
            let inner = self.content.rpad_at(target, axis, depth + 1, clip)?;
            Ok(Content::ListOffset(Self::try_new(
                self.offsets.clone(),
                inner.into(),
            )?))
        }
    }

    pub(crate) fn localindex(&self, axis: i64, depth: i64) -> RaggedResult<Content> {
        let toaxis = Content::ListOffset(self.clone()).wrap_axis(axis, depth)?;
        if toaxis == depth + 1 {
            let offsets = self.offsets.to64();
            let (outoffsets, local) = kernels::list_localindex(
                &offsets.as_slice()[..self.len()],
                &offsets.as_slice()[1..],
            );
            Ok(Content::ListOffset(Self::try_new(
                Index64::from(outoffsets).into(),
                NumpyArray::from_vec(local).into_ref(),
            )?))
        } else {
            let inner = self.content.localindex_at(axis, depth + 1)?;
            Ok(Content::ListOffset(Self::try_new(
                self.offsets.clone(),
                inner.into(),
            )?))
        }
    }

    pub(crate) fn combinations(
        &self,
        n: usize,
        replacement: bool,
        recordlookup: Option<Vec<String>>,
        parameters: &Parameters,
        axis: i64,
        depth: i64,
    ) -> RaggedResult<Content> {
        let toaxis = Content::ListOffset(self.clone()).wrap_axis(axis, depth)?;
        if toaxis == depth + 1 {
            let offsets = self.offsets.to64();
            let (outoffsets, columns) = kernels::list_combinations(
                &offsets.as_slice()[..self.len()],
                &offsets.as_slice()[1..],
                n,
                replacement,
            );
            let total = *outoffsets.last().unwrap_or(&0);
            let contents: Vec<ContentRef> = columns
                .into_iter()
                .map(|col| self.content.carry(&Index64::from(col)))
                .collect::<RaggedResult<_>>()?;
            let record = RecordArray::try_new(contents, recordlookup, total as usize)?
                .with_parameters(parameters.clone());
            Ok(Content::ListOffset(Self::try_new(
                Index64::from(outoffsets).into(),
                record.into_ref(),
            )?))
        } else {
            let inner = self
                .content
                .combinations_at(n, replacement, recordlookup, parameters, axis, depth + 1)?;
            Ok(Content::ListOffset(Self::try_new(
                self.offsets.clone(),
                inner.into(),
            )?))
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
        let (branch, content_depth) = self.content.branch_depth();
        let own_depth = content_depth + 1;
        if !branch && negaxis >= own_depth {
            // Reducing this list axis itself requires rectangular rows.
            let regular = self.to_regular_array().map_err(|_| {
                ragged_err!(TypeMismatch:
                    "cannot reduce (call '{}' on) a ragged axis; pad the lists first",
                    reducer.name())
            })?;
            return regular.reduce_next(reducer, negaxis, starts, parents, outlength, mask, keepdims);
        }
        let compact = self.to_listoffset64(true)?;
        let offsets = compact.offsets.to64();
        let len = compact.len();
        let mut nextparents = vec![0i64; offsets.get(len) as usize];
        for i in 0..len {
            for k in offsets.get(i)..offsets.get(i + 1) {
                nextparents[k as usize] = i as i64;
            }
        }
        let trimmed = compact.content.getitem_range_nowrap(0, offsets.get(len))?;
        let nextstarts: Index64 = (0..len).map(|i| offsets.get(i)).collect::<Vec<_>>().into();
        let out = trimmed.reduce_next(
            reducer,
            negaxis,
            &nextstarts,
            &Index64::from(nextparents),
            len as i64,
            mask,
            keepdims,
        )?;
        let outoffsets = kernels::reduce_outoffsets(parents.as_slice(), outlength);
        Ok(Content::ListOffset(Self::try_new(
            Index64::from(outoffsets).into(),
            out.into(),
        )?))
    }

    /// The equivalent rectangular layer, or an error when row lengths differ.
    pub fn to_regular_array(&self) -> RaggedResult<RegularArray> {
        let offsets = self.offsets.to64();
        let len = self.len();
        let size = if len == 0 {
            0
        } else {
            offsets.get(1) - offsets.get(0)
        };
        for i in 0..len {
            if offsets.get(i + 1) - offsets.get(i) != size {
                ragged_bail!(TypeMismatch: "lists of unequal length cannot be regular");
            }
        }
        let compact = self.to_listoffset64(true)?;
        let trimmed = compact
            .content
            .getitem_range_nowrap(0, size * len as i64)?;
        let mut out = RegularArray::try_new(trimmed, size)?;
        out.identities = self.identities.clone();
        out.parameters = self.parameters.clone();
        Ok(out)
    }

    pub(crate) fn validity_error(&self, path: &str) -> Option<String> {
        let offsets = self.offsets.to64();
        if let Err(e) = kernels::offsets_validity(offsets.as_slice(), self.content.len() as i64) {
            return Some(format!(
                "at {path} (ListOffsetArray): {}{}",
                e.message,
                e.element.map(|i| format!(" at i={i}")).unwrap_or_default()
            ));
        }
        self.content.validity_error(&format!("{path}.content"))
    }

    pub(crate) fn tostring_part(&self, indent: &str, pre: &str, post: &str) -> String {
        let mut out = format!("{indent}{pre}<ListOffsetArray>\n");
        if let Some(ids) = &self.identities {
            out.push_str(&format!("{indent}    {ids}\n"));
        }
        out.push_str(&format!("{indent}    <offsets>{}</offsets>\n", self.offsets));
        out.push_str(&self.content.tostring_part(&format!("{indent}    "), "<content>", "</content>\n"));
        out.push_str(&format!("{indent}</ListOffsetArray>{post}"));
        out
    }

    /// This node as a [`Content`].
    pub fn to_content(&self) -> Content {
        Content::ListOffset(self.clone())
    }

    /// This node as a shared [`ContentRef`].
    pub fn into_ref(self) -> ContentRef {
        Arc::new(Content::ListOffset(self))
    }
}

impl From<ListOffsetArray> for Content {
    fn from(a: ListOffsetArray) -> Self {
        Content::ListOffset(a)
    }
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;

    use crate::{Content, Index64, ListOffsetArray, NumpyArray, Slice, SliceItem};

    fn sample() -> ListOffsetArray {
        // [[1, 2], [], [3, 4, 5]]
        ListOffsetArray::try_new(
            buffer![0i64, 2, 2, 5].into(),
            NumpyArray::from_buffer(buffer![1i64, 2, 3, 4, 5]).into_ref(),
        )
        .unwrap()
    }

    #[test]
    fn rows() {
        let a = sample();
        assert_eq!(a.len(), 3);
        assert_eq!(
            a.item_at(0).unwrap().as_array().unwrap().to_json().unwrap().to_string(),
            "[1,2]"
        );
        assert_eq!(
            a.item_at(1).unwrap().as_array().unwrap().to_json().unwrap().to_string(),
            "[]"
        );
    }

    #[test]
    fn range_shares_offsets() {
        let a = sample().range_nowrap(1, 3).unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a.to_content().to_json().unwrap().to_string(), "[[],[3,4,5]]");
    }

    #[test]
    fn carry_reorders_rows() {
        let carried = sample().carry(&Index64::from(vec![2i64, 0])).unwrap();
        assert_eq!(carried.to_json().unwrap().to_string(), "[[3,4,5],[1,2]]");
    }

    #[test]
    fn num_counts_rows() {
        let counts = sample().num(1, 0).unwrap();
        assert_eq!(counts.to_json().unwrap().to_string(), "[2,0,3]");
    }

    #[test]
    fn flatten_inner_axis() {
        let (offsets, flattened) = sample().offsets_and_flattened(1, 0).unwrap();
        assert_eq!(offsets.as_slice(), &[0, 2, 2, 5]);
        assert_eq!(flattened.to_json().unwrap().to_string(), "[1,2,3,4,5]");
    }

    #[test]
    fn rpad_marks_missing() {
        let padded = sample().rpad(3, 1, 0, false).unwrap();
        assert_eq!(
            padded.to_json().unwrap().to_string(),
            "[[1,2,null],[null,null,null],[3,4,5]]"
        );
        let clipped = sample().rpad(2, 1, 0, true).unwrap();
        assert_eq!(
            clipped.to_json().unwrap().to_string(),
            "[[1,2],[null,null],[3,4]]"
        );
    }

    #[test]
    fn getitem_at_range() {
        let a = sample().to_content();
        let row = a
            .getitem(&Slice::new(vec![SliceItem::at(2), SliceItem::range(1, None)]).unwrap())
            .unwrap();
        assert_eq!(row.as_array().unwrap().to_json().unwrap().to_string(), "[4,5]");
    }

    #[test]
    fn ragged_reduce_requires_padding() {
        let a = sample();
        // reducing across the list axis itself (axis=0) is only defined for
        // rectangular rows
        assert!(a
            .reduce_next(
                &crate::Sum,
                2,
                &Index64::from(vec![0i64]),
                &Index64::zeroed(3),
                1,
                false,
                false,
            )
            .is_err());
    }
}
