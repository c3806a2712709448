use std::sync::Arc;

use ragged_dtype::Parameters;
use ragged_error::{RaggedResult, ragged_bail, ragged_err};

use crate::kernels;
use crate::{
    AnyIndex, Content, ContentRef, Identities, Index64, IndexedOptionArray, Item,
    ListOffsetArray, NumpyArray, RecordArray, Reducer, SliceItem,
};

/// Generalized variable-length lists: list `i` spans `[starts[i], stops[i])` of the
/// content, allowing overlap, gaps and reordering.
#[derive(Debug, Clone)]
pub struct ListArray {
    pub(crate) identities: Option<Arc<Identities>>,
    pub(crate) parameters: Parameters,
    starts: AnyIndex,
    stops: AnyIndex,
    content: ContentRef,
}

impl ListArray {
    /// A generalized list layer; `stops` must be at least as long as `starts`.
    pub fn try_new(starts: AnyIndex, stops: AnyIndex, content: ContentRef) -> RaggedResult<Self> {
        if stops.len() < starts.len() {
            ragged_bail!("ListArray stops must not be shorter than its starts");
        }
        Ok(Self {
            identities: None,
            parameters: Parameters::new(),
            starts,
            stops,
            content,
        })
    }

    pub(crate) fn new_unchecked(starts: AnyIndex, stops: AnyIndex, content: ContentRef) -> Self {
        Self {
            identities: None,
            parameters: Parameters::new(),
            starts,
            stops,
            content,
        }
    }

    /// Same node with the given parameters.
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Per-list start positions.
    pub fn starts(&self) -> &AnyIndex {
        &self.starts
    }

    /// Per-list stop positions.
    pub fn stops(&self) -> &AnyIndex {
        &self.stops
    }

    /// The inner array.
    pub fn content(&self) -> &ContentRef {
        &self.content
    }

    /// Number of lists.
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    /// Whether there are no lists.
    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// Rewrite as a compact offsets-based layer, gathering the content so lists become
    /// adjacent.
    pub fn broadcast_tooffsets64(&self) -> RaggedResult<ListOffsetArray> {
        let starts = self.starts.to64();
        let stops = self.stops.to64();
        let mut offsets = Vec::with_capacity(self.len() + 1);
        let mut nextcarry = Vec::new();
        offsets.push(0);
        for i in 0..self.len() {
            let (start, stop) = (starts.get(i), stops.get(i));
            if stop < start {
                ragged_bail!("ListArray stops[{i}] < starts[{i}]");
            }
            nextcarry.extend(start..stop);
            offsets.push(nextcarry.len() as i64);
        }
        let content = self.content.carry(&Index64::from(nextcarry))?;
        let mut out = ListOffsetArray::try_new(Index64::from(offsets).into(), content)?;
        out.identities = self.identities.clone();
        out.parameters = self.parameters.clone();
        Ok(out)
    }

    pub(crate) fn item_at(&self, at: usize) -> RaggedResult<Item> {
        let start = self.starts.get(at);
        let stop = self.stops.get(at);
        if stop < start {
            ragged_bail!("ListArray stops[{at}] < starts[{at}]");
        }
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
            starts: self.starts.slice(start, stop),
            stops: self.stops.slice(start, stop),
            content: self.content.clone(),
        })
    }

    pub(crate) fn carry(&self, carry: &Index64) -> RaggedResult<Content> {
        let starts = self.starts.to64();
        let stops = self.stops.to64();
        let mut nextstarts = Vec::with_capacity(carry.len());
        let mut nextstops = Vec::with_capacity(carry.len());
        for &c in carry.as_slice() {
            if c < 0 || c as usize >= self.len() {
                ragged_bail!(OutOfRange: "carry index {c} out of range for length {}", self.len());
            }
            nextstarts.push(starts.get(c as usize));
            nextstops.push(stops.get(c as usize));
        }
        let identities = self
            .identities
            .as_ref()
            .map(|ids| ids.carry(carry).map(Arc::new))
            .transpose()?;
        Ok(Content::List(Self {
            identities,
            parameters: self.parameters.clone(),
            starts: Index64::from(nextstarts).into(),
            stops: Index64::from(nextstops).into(),
            content: self.content.clone(),
        }))
    }

    pub(crate) fn getitem_next_structural(
        &self,
        head: &SliceItem,
        tail: &[SliceItem],
        advanced: &Index64,
    ) -> RaggedResult<ContentRef> {
        let starts = self.starts.to64();
        let stops = self.stops.to64();
        let (nexthead, nexttail) = (tail.first(), if tail.is_empty() { &[][..] } else { &tail[1..] });
        match head {
            SliceItem::At(at) => {
                let nextcarry =
                    kernels::list_getitem_next_at(starts.as_slice(), stops.as_slice(), *at)
                        .map_err(|e| self.kernel_error(e))?;
                let nextcontent = self.content.carry(&Index64::from(nextcarry))?;
                nextcontent.getitem_next(nexthead, nexttail, advanced)
            }
            SliceItem::Range(range) => {
                let (nextoffsets, nextcarry) = kernels::list_getitem_next_range(
                    starts.as_slice(),
                    stops.as_slice(),
                    range.start(),
                    range.stop(),
                    range.step(),
                );
                let nextcontent = self.content.carry(&Index64::from(nextcarry))?;
                let out = if advanced.is_empty() {
                    nextcontent.getitem_next(nexthead, nexttail, advanced)?
                } else {
                    let total = *nextoffsets.last().unwrap_or(&0);
                    let mut nextadvanced = vec![0i64; total as usize];
                    for i in 0..self.len() {
                        for j in nextoffsets[i]..nextoffsets[i + 1] {
                            nextadvanced[j as usize] = advanced.get(i);
                        }
                    }
                    nextcontent.getitem_next(nexthead, nexttail, &Index64::from(nextadvanced))?
                };
                let mut wrapped =
                    ListOffsetArray::try_new(Index64::from(nextoffsets).into(), out)?;
                wrapped.identities = self.identities.clone();
                wrapped.parameters = self.parameters.clone();
                Ok(Content::ListOffset(wrapped).into())
            }
            SliceItem::Array64(array) => {
                if advanced.is_empty() {
                    let (nextcarry, nextadvanced) = kernels::list_getitem_next_array(
                        starts.as_slice(),
                        stops.as_slice(),
                        array.flat().as_slice(),
                    )
                    .map_err(|e| self.kernel_error(e))?;
                    let nextcontent = self.content.carry(&Index64::from(nextcarry))?;
                    let out = nextcontent.getitem_next(
                        nexthead,
                        nexttail,
                        &Index64::from(nextadvanced),
                    )?;
                    Content::getitem_next_array_wrap(out, array.shape())
                } else {
                    let (nextcarry, nextadvanced) = kernels::list_getitem_next_array_advanced(
                        starts.as_slice(),
                        stops.as_slice(),
                        array.flat().as_slice(),
                        advanced.as_slice(),
                    )
                    .map_err(|e| self.kernel_error(e))?;
                    let nextcontent = self.content.carry(&Index64::from(nextcarry))?;
                    nextcontent.getitem_next(nexthead, nexttail, &Index64::from(nextadvanced))
                }
            }
            SliceItem::Jagged64(jagged) => {
                if !advanced.is_empty() {
                    ragged_bail!(TypeMismatch:
                        "cannot mix jagged slice with NumPy-style advanced indexing");
                }
                if jagged.length() != self.len() as i64 {
                    ragged_bail!(TypeMismatch:
                        "cannot fit jagged slice with length {} into ListArray of length {}",
                        jagged.length(),
                        self.len());
                }
                let offsets = jagged.offsets();
                let slicestarts = offsets.slice(0, offsets.len() - 1);
                let slicestops = offsets.slice(1, offsets.len());
                self.getitem_next_jagged(&slicestarts, &slicestops, jagged.content(), tail)
            }
            other => Err(ragged_err!(UndefinedOperation: "ListArray::getitem_next({other})")),
        }
    }

    pub(crate) fn getitem_next_jagged(
        &self,
        slicestarts: &Index64,
        slicestops: &Index64,
        slicecontent: &SliceItem,
        tail: &[SliceItem],
    ) -> RaggedResult<ContentRef> {
        if slicestarts.len() != self.len() {
            ragged_bail!(TypeMismatch:
                "cannot fit jagged slice with length {} into ListArray of length {}",
                slicestarts.len(),
                self.len());
        }
        let starts = self.starts.to64();
        let stops = self.stops.to64();
        let (nexthead, nexttail) = (tail.first(), if tail.is_empty() { &[][..] } else { &tail[1..] });
        match slicecontent {
            SliceItem::Array64(array) => {
                let (outoffsets, nextcarry) = kernels::list_getitem_jagged_apply(
                    slicestarts.as_slice(),
                    slicestops.as_slice(),
                    array.flat().as_slice(),
                    starts.as_slice(),
                    stops.as_slice(),
                )
                .map_err(|e| self.kernel_error(e))?;
                let nextcontent = self.content.carry(&Index64::from(nextcarry))?;
                let out = nextcontent.getitem_next(nexthead, nexttail, &Index64::empty())?;
                Ok(Content::ListOffset(ListOffsetArray::try_new(
                    Index64::from(outoffsets).into(),
                    out,
                )?)
                .into())
            }
            SliceItem::Missing64(missing) => {
                let SliceItem::Array64(picks) = missing.content() else {
                    ragged_bail!(TypeMismatch:
                        "missing entries of a jagged slice must compact to an array");
                };
                let (outoffsets, outindex, nextcarry) = kernels::list_getitem_jagged_apply_missing(
                    slicestarts.as_slice(),
                    slicestops.as_slice(),
                    missing.index().as_slice(),
                    picks.flat().as_slice(),
                    starts.as_slice(),
                    stops.as_slice(),
                )
                .map_err(|e| self.kernel_error(e))?;
                let nextcontent = self.content.carry(&Index64::from(nextcarry))?;
                let out = nextcontent.getitem_next(nexthead, nexttail, &Index64::empty())?;
                let option =
                    IndexedOptionArray::try_new(Index64::from(outindex).into(), out)?;
                let inner = Content::IndexedOption(option).simplify_optiontype()?;
                Ok(Content::ListOffset(ListOffsetArray::try_new(
                    Index64::from(outoffsets).into(),
                    inner,
                )?)
                .into())
            }
            SliceItem::Jagged64(inner) => {
                let outoffsets = kernels::list_getitem_jagged_descend(
                    slicestarts.as_slice(),
                    slicestops.as_slice(),
                    starts.as_slice(),
                    stops.as_slice(),
                )
                .map_err(|e| self.kernel_error(e))?;
                let sliceoffsets = inner.offsets();
                let down_starts = sliceoffsets.slice(0, sliceoffsets.len() - 1);
                let down_stops = sliceoffsets.slice(1, sliceoffsets.len());
                // Row lengths match exactly, so the content consumes the inner slice
                // rows positionally.
                let down = self.content.getitem_next_jagged(
                    &down_starts,
                    &down_stops,
                    inner.content(),
                    tail,
                )?;
                Ok(Content::ListOffset(ListOffsetArray::try_new(
                    Index64::from(outoffsets).into(),
                    down,
                )?)
                .into())
            }
            other => Err(ragged_err!(UndefinedOperation:
                "ListArray::getitem_next_jagged({other})")),
        }
    }

    fn kernel_error(&self, e: kernels::KernelError) -> ragged_error::RaggedError {
        e.into_error("ListArray")
    }

    pub(crate) fn num(&self, axis: i64, depth: i64) -> RaggedResult<Content> {
        let toaxis = Content::List(self.clone()).wrap_axis(axis, depth)?;
        if toaxis == depth + 1 {
            let starts = self.starts.to64();
            let stops = self.stops.to64();
            let counts = kernels::list_num(starts.as_slice(), stops.as_slice());
            Ok(Content::Numpy(NumpyArray::from_vec(counts)))
        } else {
            self.broadcast_tooffsets64()?.num(axis, depth)
        }
    }

    pub(crate) fn offsets_and_flattened(
        &self,
        axis: i64,
        depth: i64,
    ) -> RaggedResult<(Index64, Content)> {
        self.broadcast_tooffsets64()?.offsets_and_flattened(axis, depth)
    }

    pub(crate) fn fillna(&self, value: &ContentRef) -> RaggedResult<Content> {
        Ok(Content::List(Self {
            identities: self.identities.clone(),
            parameters: self.parameters.clone(),
            starts: self.starts.clone(),
            stops: self.stops.clone(),
            content: self.content.fillna(value)?.into(),
        }))
    }

    pub(crate) fn is_none(&self, axis: i64, depth: i64) -> RaggedResult<Content> {
        let toaxis = Content::List(self.clone()).wrap_axis(axis, depth)?;
        if toaxis == depth {
            Ok(Content::Numpy(NumpyArray::from_bools(&vec![false; self.len()])))
        } else {
            self.broadcast_tooffsets64()?.is_none(axis, depth)
        }
    }

    pub(crate) fn rpad(
        &self,
        target: i64,
        axis: i64,
        depth: i64,
        clip: bool,
    ) -> RaggedResult<Content> {
        let toaxis = Content::List(self.clone()).wrap_axis(axis, depth)?;
        if toaxis == depth {
            return Content::List(self.clone()).rpad_axis0(target, clip);
        }
        if toaxis == depth + 1 {
            let starts = self.starts.to64();
            let stops = self.stops.to64();
            let (outoffsets, index) =
                kernels::list_rpad(starts.as_slice(), stops.as_slice(), target, clip);
            let option =
                IndexedOptionArray::try_new(Index64::from(index).into(), self.content.clone())?;
            let inner = Content::IndexedOption(option).simplify_optiontype()?;
            Ok(Content::ListOffset(ListOffsetArray::try_new(
                Index64::from(outoffsets).into(),
                inner,
            )?))
        } else {
            let inner = self.content.rpad_at(target, axis, depth + 1, clip)?;
            Ok(Content::List(Self {
                identities: self.identities.clone(),
                parameters: self.parameters.clone(),
                starts: self.starts.clone(),
                stops: self.stops.clone(),
                content: inner.into(),
            }))
        }
    }

    pub(crate) fn localindex(&self, axis: i64, depth: i64) -> RaggedResult<Content> {
        let toaxis = Content::List(self.clone()).wrap_axis(axis, depth)?;
        if toaxis == depth + 1 {
            let starts = self.starts.to64();
            let stops = self.stops.to64();
            let (outoffsets, local) = kernels::list_localindex(starts.as_slice(), stops.as_slice());
            Ok(Content::ListOffset(ListOffsetArray::try_new(
                Index64::from(outoffsets).into(),
                NumpyArray::from_vec(local).into_ref(),
            )?))
        } else {
            self.broadcast_tooffsets64()?.localindex(axis, depth)
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
        let toaxis = Content::List(self.clone()).wrap_axis(axis, depth)?;
        if toaxis == depth + 1 {
            let starts = self.starts.to64();
            let stops = self.stops.to64();
            let (outoffsets, columns) =
                kernels::list_combinations(starts.as_slice(), stops.as_slice(), n, replacement);
            let total = *outoffsets.last().unwrap_or(&0);
            let contents: Vec<ContentRef> = columns
                .into_iter()
                .map(|col| self.content.carry(&Index64::from(col)))
                .collect::<RaggedResult<_>>()?;
            let record = RecordArray::try_new(contents, recordlookup, total as usize)?
                .with_parameters(parameters.clone());
            Ok(Content::ListOffset(ListOffsetArray::try_new(
                Index64::from(outoffsets).into(),
                record.into_ref(),
            )?))
        } else {
            self.broadcast_tooffsets64()?
                .combinations(n, replacement, recordlookup, parameters, axis, depth)
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
        self.broadcast_tooffsets64()?
            .reduce_next(reducer, negaxis, starts, parents, outlength, mask, keepdims)
    }

    pub(crate) fn validity_error(&self, path: &str) -> Option<String> {
        let starts = self.starts.to64();
        let stops = self.stops.to64();
        if let Err(e) = kernels::list_validity(
            starts.as_slice(),
            &stops.as_slice()[..starts.len()],
            self.content.len() as i64,
        ) {
            return Some(format!(
                "at {path} (ListArray): {}{}",
                e.message,
                e.element.map(|i| format!(" at i={i}")).unwrap_or_default()
            ));
        }
        self.content.validity_error(&format!("{path}.content"))
    }

    pub(crate) fn tostring_part(&self, indent: &str, pre: &str, post: &str) -> String {
        let mut out = format!("{indent}{pre}<ListArray>\n");
        if let Some(ids) = &self.identities {
            out.push_str(&format!("{indent}    {ids}\n"));
        }
        out.push_str(&format!("{indent}    <starts>{}</starts>\n", self.starts));
        out.push_str(&format!("{indent}    <stops>{}</stops>\n", self.stops));
        out.push_str(&self.content.tostring_part(&format!("{indent}    "), "<content>", "</content>\n"));
        out.push_str(&format!("{indent}</ListArray>{post}"));
        out
    }

    /// This node as a [`Content`].
    pub fn to_content(&self) -> Content {
        Content::List(self.clone())
    }

    /// This node as a shared [`ContentRef`].
    pub fn into_ref(self) -> ContentRef {
        Arc::new(Content::List(self))
    }
}

impl From<ListArray> for Content {
    fn from(a: ListArray) -> Self {
        Content::List(a)
    }
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;

    use crate::{Content, Index64, ListArray, NumpyArray, Slice, SliceItem};

    fn sample() -> ListArray {
        // [[3, 4, 5], [], [1, 2]] over out-of-order, overlapping storage
        ListArray::try_new(
            buffer![2i64, 5, 0].into(),
            buffer![5i64, 5, 2].into(),
            NumpyArray::from_buffer(buffer![1i64, 2, 3, 4, 5]).into_ref(),
        )
        .unwrap()
    }

    #[test]
    fn rows_can_reorder() {
        assert_eq!(
            sample().to_content().to_json().unwrap().to_string(),
            "[[3,4,5],[],[1,2]]"
        );
    }

    #[test]
    fn broadcast_compacts() {
        let compact = sample().broadcast_tooffsets64().unwrap();
        assert_eq!(compact.offsets().to64().as_slice(), &[0, 3, 3, 5]);
        assert_eq!(
            compact.to_content().to_json().unwrap().to_string(),
            "[[3,4,5],[],[1,2]]"
        );
    }

    #[test]
    fn slice_at_negative_wraps_per_row() {
        let out = sample()
            .to_content()
            .getitem(&Slice::new(vec![SliceItem::full_range(), SliceItem::at(-1)]).unwrap());
        // second row is empty, so -1 is out of range there
        assert!(out.is_err());
    }

    #[test]
    fn carry_shares_content() {
        let carried = sample().carry(&Index64::from(vec![0i64, 0])).unwrap();
        assert_eq!(
            carried.to_json().unwrap().to_string(),
            "[[3,4,5],[3,4,5]]"
        );
    }

    #[test]
    fn validity_flags_bad_stops() {
        let bad = ListArray::try_new(
            buffer![0i64, 4].into(),
            buffer![2i64, 3].into(),
            NumpyArray::from_buffer(buffer![1i64, 2, 3]).into_ref(),
        )
        .unwrap();
        let err = bad.validity_error("layout").unwrap();
        assert!(err.contains("stops[i] < starts[i]"));
    }
}
