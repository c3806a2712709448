use std::sync::Arc;

use ragged_dtype::Parameters;
use ragged_error::{RaggedResult, ragged_bail, ragged_err};

use crate::kernels;
use crate::{
    Content, ContentRef, Identities, Index64, IndexedOptionArray, Item, ListOffsetArray,
    RecordArray, Reducer, SliceItem,
};

/// A rectangular list layer: every element is a list of exactly `size` elements of the
/// content, laid out back to back.
#[derive(Debug, Clone)]
pub struct RegularArray {
    pub(crate) identities: Option<Arc<Identities>>,
    pub(crate) parameters: Parameters,
    content: ContentRef,
    size: i64,
}

impl RegularArray {
    /// A rectangular layer of `size`-element lists over `content`.
    pub fn try_new(content: ContentRef, size: i64) -> RaggedResult<Self> {
        if size < 0 {
            ragged_bail!("RegularArray size must be non-negative, got {size}");
        }
        Ok(Self {
            identities: None,
            parameters: Parameters::new(),
            content,
            size,
        })
    }

    /// Same node with the given parameters.
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// The list size.
    pub fn size(&self) -> i64 {
        self.size
    }

    /// The inner array.
    pub fn content(&self) -> &ContentRef {
        &self.content
    }

    /// Number of complete lists.
    pub fn len(&self) -> usize {
        if self.size == 0 {
            0
        } else {
            self.content.len() / self.size as usize
        }
    }

    /// Whether there are no complete lists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The equivalent jagged layer with materialized offsets, content trimmed to the
    /// covered range.
    pub fn to_listoffset64(&self) -> RaggedResult<ListOffsetArray> {
        let len = self.len();
        let offsets: Index64 = (0..=len as i64).map(|i| i * self.size).collect::<Vec<_>>().into();
        let trimmed = self
            .content
            .getitem_range_nowrap(0, (len as i64) * self.size)?;
        let mut out = ListOffsetArray::try_new(offsets.into(), trimmed)?;
        out.identities = self.identities.clone();
        out.parameters = self.parameters.clone();
        Ok(out)
    }

    pub(crate) fn item_at(&self, at: usize) -> RaggedResult<Item> {
        let start = at as i64 * self.size;
        Ok(Item::Array(
            self.content.getitem_range_nowrap(start, start + self.size)?,
        ))
    }

    pub(crate) fn range_nowrap(&self, start: usize, stop: usize) -> RaggedResult<Self> {
        let identities = self
            .identities
            .as_ref()
            .map(|ids| Arc::new(ids.slice(start, stop)));
        let content = self
            .content
            .getitem_range_nowrap(start as i64 * self.size, stop as i64 * self.size)?;
        Ok(Self {
            identities,
            parameters: self.parameters.clone(),
            content,
            size: self.size,
        })
    }

    pub(crate) fn carry(&self, carry: &Index64) -> RaggedResult<Content> {
        let len = self.len() as i64;
        let mut nextcarry = Vec::with_capacity(carry.len() * self.size as usize);
        for &c in carry.as_slice() {
            if c < 0 || c >= len {
                ragged_bail!(OutOfRange: "carry index {c} out of range for length {len}");
            }
            for j in 0..self.size {
                nextcarry.push(c * self.size + j);
            }
        }
        let identities = self
            .identities
            .as_ref()
            .map(|ids| ids.carry(carry).map(Arc::new))
            .transpose()?;
        Ok(Content::Regular(Self {
            identities,
            parameters: self.parameters.clone(),
            content: self.content.carry(&Index64::from(nextcarry))?,
            size: self.size,
        }))
    }

    pub(crate) fn getitem_next_structural(
        &self,
        head: &SliceItem,
        tail: &[SliceItem],
        advanced: &Index64,
    ) -> RaggedResult<ContentRef> {
        let len = self.len() as i64;
        let (nexthead, nexttail) = (tail.first(), if tail.is_empty() { &[][..] } else { &tail[1..] });
        match head {
            SliceItem::At(at) => {
                let regular = if *at < 0 { at + self.size } else { *at };
                if regular < 0 || regular >= self.size {
                    return Err(kernels::KernelError::at("index out of range", *at)
                        .into_error("RegularArray"));
                }
                let nextcarry: Index64 =
                    (0..len).map(|i| i * self.size + regular).collect::<Vec<_>>().into();
                let nextcontent = self.content.carry(&nextcarry)?;
                nextcontent.getitem_next(nexthead, nexttail, advanced)
            }
            SliceItem::Range(range) => {
                let (start, stop) =
                    kernels::regularize_rangeslice(range.start(), range.stop(), range.step(), self.size);
                let nextsize = kernels::rangeslice_count(start, stop, range.step());
                let mut nextcarry = Vec::with_capacity((len * nextsize) as usize);
                for i in 0..len {
                    let mut pos = start;
                    while if range.step() > 0 { pos < stop } else { pos > stop } {
                        nextcarry.push(i * self.size + pos);
                        pos += range.step();
                    }
                }
                let nextcontent = self.content.carry(&Index64::from(nextcarry))?;
                let out = if advanced.is_empty() {
                    nextcontent.getitem_next(nexthead, nexttail, advanced)?
                } else {
                    let mut nextadvanced = Vec::with_capacity((len * nextsize) as usize);
                    for i in 0..len as usize {
                        for _ in 0..nextsize {
                            nextadvanced.push(advanced.get(i));
                        }
                    }
                    nextcontent.getitem_next(nexthead, nexttail, &Index64::from(nextadvanced))?
                };
                Ok(Content::Regular(
                    Self::try_new(out, nextsize)?.with_parameters(self.parameters.clone()),
                )
                .into())
            }
            SliceItem::Array64(array) => {
                let flathead = kernels::regularize_arrayslice(array.flat().as_slice(), self.size)
                    .map_err(|e| e.into_error("RegularArray"))?;
                if advanced.is_empty() {
                    let mut nextcarry = Vec::with_capacity(len as usize * flathead.len());
                    let mut nextadvanced = Vec::with_capacity(len as usize * flathead.len());
                    for i in 0..len {
                        for (j, &idx) in flathead.iter().enumerate() {
                            nextcarry.push(i * self.size + idx);
                            nextadvanced.push(j as i64);
                        }
                    }
                    let nextcontent = self.content.carry(&Index64::from(nextcarry))?;
                    let out = nextcontent.getitem_next(
                        nexthead,
                        nexttail,
                        &Index64::from(nextadvanced),
                    )?;
                    Content::getitem_next_array_wrap(out, array.shape())
                } else {
                    let mut nextcarry = Vec::with_capacity(len as usize);
                    let mut nextadvanced = Vec::with_capacity(len as usize);
                    for i in 0..len as usize {
                        let a = advanced.get(i);
                        if a as usize >= flathead.len() {
                            return Err(kernels::KernelError::at("advanced index out of range", i as i64)
                                .into_error("RegularArray"));
                        }
                        nextcarry.push(i as i64 * self.size + flathead[a as usize]);
                        nextadvanced.push(a);
                    }
                    let nextcontent = self.content.carry(&Index64::from(nextcarry))?;
                    nextcontent.getitem_next(nexthead, nexttail, &Index64::from(nextadvanced))
                }
            }
            SliceItem::Jagged64(jagged) => {
                if !advanced.is_empty() {
                    ragged_bail!(TypeMismatch:
                        "cannot mix jagged slice with NumPy-style advanced indexing");
                }
                if jagged.length() != self.size {
                    ragged_bail!(TypeMismatch:
                        "cannot fit jagged slice with length {} into RegularArray of size {}",
                        jagged.length(),
                        self.size);
                }
                let (multistarts, multistops) = kernels::regular_getitem_jagged_expand(
                    jagged.offsets().as_slice(),
                    self.size,
                    len,
                )
                .map_err(|e| e.into_error("RegularArray"))?;
                let trimmed = self.content.getitem_range_nowrap(0, len * self.size)?;
                let down = trimmed.getitem_next_jagged(
                    &Index64::from(multistarts),
                    &Index64::from(multistops),
                    jagged.content(),
                    tail,
                )?;
                Ok(Content::Regular(Self::try_new(down, self.size)?).into())
            }
            other => Err(ragged_err!(UndefinedOperation:
                "RegularArray::getitem_next({other})")),
        }
    }

    pub(crate) fn getitem_next_jagged(
        &self,
        slicestarts: &Index64,
        slicestops: &Index64,
        slicecontent: &SliceItem,
        tail: &[SliceItem],
    ) -> RaggedResult<ContentRef> {
        self.to_listoffset64()?
            .getitem_next_jagged(slicestarts, slicestops, slicecontent, tail)
    }

    pub(crate) fn num(&self, axis: i64, depth: i64) -> RaggedResult<Content> {
        let toaxis = Content::Regular(self.clone()).wrap_axis(axis, depth)?;
        if toaxis == depth + 1 {
            let counts = vec![self.size; self.len()];
            Ok(Content::Numpy(crate::NumpyArray::from_vec(counts)))
        } else {
            let inner = self.content.num_at(axis, depth + 1)?;
            Ok(Content::Regular(Self::try_new(inner.into(), self.size)?))
        }
    }

    pub(crate) fn offsets_and_flattened(
        &self,
        axis: i64,
        depth: i64,
    ) -> RaggedResult<(Index64, Content)> {
        self.to_listoffset64()?.offsets_and_flattened(axis, depth)
    }

    pub(crate) fn rpad(
        &self,
        target: i64,
        axis: i64,
        depth: i64,
        clip: bool,
    ) -> RaggedResult<Content> {
        let toaxis = Content::Regular(self.clone()).wrap_axis(axis, depth)?;
        if toaxis == depth {
            return Content::Regular(self.clone()).rpad_axis0(target, clip);
        }
        if toaxis == depth + 1 {
            if !clip && target <= self.size {
                return Ok(Content::Regular(self.clone()));
            }
            let outsize = if clip { target } else { target.max(self.size) };
            let mut index = Vec::with_capacity(self.len() * outsize as usize);
            for i in 0..self.len() as i64 {
                for j in 0..outsize {
                    index.push(if j < self.size { i * self.size + j } else { -1 });
                }
            }
            let option = IndexedOptionArray::try_new(
                Index64::from(index).into(),
                self.content.clone(),
            )?;
            let inner = Content::IndexedOption(option).simplify_optiontype()?;
            Ok(Content::Regular(Self::try_new(inner, outsize)?))
        } else {
            let inner = self.content.rpad_at(target, axis, depth + 1, clip)?;
            Ok(Content::Regular(Self::try_new(inner.into(), self.size)?))
        }
    }

    pub(crate) fn localindex(&self, axis: i64, depth: i64) -> RaggedResult<Content> {
        let toaxis = Content::Regular(self.clone()).wrap_axis(axis, depth)?;
        if toaxis == depth + 1 {
            let mut local = Vec::with_capacity(self.len() * self.size as usize);
            for _ in 0..self.len() {
                local.extend(0..self.size);
            }
            Ok(Content::Regular(Self::try_new(
                crate::NumpyArray::from_vec(local).into_ref(),
                self.size,
            )?))
        } else {
            let inner = self.content.localindex_at(axis, depth + 1)?;
            Ok(Content::Regular(Self::try_new(inner.into(), self.size)?))
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
        let toaxis = Content::Regular(self.clone()).wrap_axis(axis, depth)?;
        if toaxis == depth + 1 {
            let starts: Vec<i64> = (0..self.len() as i64).map(|i| i * self.size).collect();
            let stops: Vec<i64> = (0..self.len() as i64).map(|i| (i + 1) * self.size).collect();
            let (offsets, columns) = kernels::list_combinations(&starts, &stops, n, replacement);
            let total = *offsets.last().unwrap_or(&0);
            let per_row = if self.len() == 0 { 0 } else { total / self.len() as i64 };
            let contents: Vec<ContentRef> = columns
                .into_iter()
                .map(|col| self.content.carry(&Index64::from(col)))
                .collect::<RaggedResult<_>>()?;
            let record = RecordArray::try_new(contents, recordlookup, total as usize)?
                .with_parameters(parameters.clone());
            Ok(Content::Regular(Self::try_new(record.into_ref(), per_row)?))
        } else {
            let inner = self
                .content
                .combinations_at(n, replacement, recordlookup, parameters, axis, depth + 1)?;
            Ok(Content::Regular(Self::try_new(inner.into(), self.size)?))
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn reduce_next(
        &self,
        reducer: &dyn Reducer,
        negaxis: i64,
        _starts: &Index64,
        parents: &Index64,
        outlength: i64,
        mask: bool,
        keepdims: bool,
    ) -> RaggedResult<Content> {
        let len = self.len() as i64;
        let (branch, depth) = self.content.branch_depth();
        let own_depth = depth + 1;
        let trimmed = self.content.getitem_range_nowrap(0, len * self.size)?;
        if !branch && negaxis >= own_depth {
            // Reducing this axis itself: combine position j across the lists of each
            // outer group.
            let mut nextparents = Vec::with_capacity((len * self.size) as usize);
            for i in 0..len as usize {
                for j in 0..self.size {
                    nextparents.push(parents.get(i) * self.size + j);
                }
            }
            let nextstarts: Index64 =
                (0..outlength * self.size).collect::<Vec<i64>>().into();
            let out = trimmed.reduce_next(
                reducer,
                negaxis,
                &nextstarts,
                &Index64::from(nextparents),
                outlength * self.size,
                mask,
                keepdims,
            )?;
            Ok(Content::Regular(Self::try_new(out.into(), self.size)?))
        } else {
            let mut nextparents = Vec::with_capacity((len * self.size) as usize);
            for i in 0..len {
                for _ in 0..self.size {
                    nextparents.push(i);
                }
            }
            let nextstarts: Index64 =
                (0..len).map(|i| i * self.size).collect::<Vec<i64>>().into();
            let out = trimmed.reduce_next(
                reducer,
                negaxis,
                &nextstarts,
                &Index64::from(nextparents),
                len,
                mask,
                keepdims,
            )?;
            let outoffsets = kernels::reduce_outoffsets(parents.as_slice(), outlength);
            Ok(Content::ListOffset(ListOffsetArray::try_new(
                Index64::from(outoffsets).into(),
                out.into(),
            )?))
        }
    }

    pub(crate) fn validity_error(&self, path: &str) -> Option<String> {
        self.content.validity_error(&format!("{path}.content"))
    }

    pub(crate) fn tostring_part(&self, indent: &str, pre: &str, post: &str) -> String {
        let mut out = format!("{indent}{pre}<RegularArray size=\"{}\">\n", self.size);
        if let Some(ids) = &self.identities {
            out.push_str(&format!("{indent}    {ids}\n"));
        }
        out.push_str(&self.content.tostring_part(&format!("{indent}    "), "<content>", "</content>\n"));
        out.push_str(&format!("{indent}</RegularArray>{post}"));
        out
    }

    /// This node as a [`Content`].
    pub fn to_content(&self) -> Content {
        Content::Regular(self.clone())
    }

    /// This node as a shared [`ContentRef`].
    pub fn into_ref(self) -> ContentRef {
        Arc::new(Content::Regular(self))
    }
}

impl From<RegularArray> for Content {
    fn from(a: RegularArray) -> Self {
        Content::Regular(a)
    }
}

#[cfg(test)]
mod test {
    use crate::{Content, NumpyArray, RegularArray, SliceItem};

    fn sample() -> RegularArray {
        // [[1, 2, 3], [4, 5, 6]]
        RegularArray::try_new(NumpyArray::from_vec(vec![1i64, 2, 3, 4, 5, 6]).into_ref(), 3)
            .unwrap()
    }

    #[test]
    fn lengths() {
        assert_eq!(sample().len(), 2);
        let empty = RegularArray::try_new(NumpyArray::from_vec(Vec::<i64>::new()).into_ref(), 0)
            .unwrap();
        assert_eq!(empty.len(), 0);
    }

    #[test]
    fn item_is_row() {
        let row = sample().item_at(1).unwrap();
        assert_eq!(row.as_array().unwrap().to_json().unwrap().to_string(), "[4,5,6]");
    }

    #[test]
    fn carry_repeats_rows() {
        let carried = sample().carry(&crate::Index64::from(vec![1i64, 1, 0])).unwrap();
        assert_eq!(
            carried.to_json().unwrap().to_string(),
            "[[4,5,6],[4,5,6],[1,2,3]]"
        );
    }

    #[test]
    fn to_listoffset_preserves_rows() {
        let lo = sample().to_listoffset64().unwrap();
        assert_eq!(lo.offsets().to64().as_slice(), &[0, 3, 6]);
        assert_eq!(lo.to_content().to_json().unwrap().to_string(), "[[1,2,3],[4,5,6]]");
    }

    #[test]
    fn getitem_at_then_range() {
        let out = sample()
            .to_content()
            .getitem(&crate::Slice::new(vec![SliceItem::at(0), SliceItem::range(1, None)]).unwrap())
            .unwrap();
        assert_eq!(out.as_array().unwrap().to_json().unwrap().to_string(), "[2,3]");
    }

    #[test]
    fn localindex_inner_axis() {
        let out = sample().localindex(1, 0).unwrap();
        assert_eq!(out.to_json().unwrap().to_string(), "[[0,1,2],[0,1,2]]");
        assert!(matches!(out, Content::Regular(_)));
    }
}
