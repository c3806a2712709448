use std::sync::Arc;

use itertools::Itertools;
use ragged_dtype::Parameters;
use ragged_error::{RaggedResult, ragged_bail, ragged_err};

use crate::kernels;
use crate::{
    AnyIndex, Content, ContentRef, Identities, Index64, Index8, Item, NumpyArray, Reducer,
    SliceItem,
};

/// The most branches a union may carry; tags are stored as `i8`.
pub const MAX_UNION_BRANCHES: usize = i8::MAX as usize;

/// A tagged union: element `i` is `contents[tags[i]][index[i]]`.
#[derive(Debug, Clone)]
pub struct UnionArray {
    pub(crate) identities: Option<Arc<Identities>>,
    pub(crate) parameters: Parameters,
    tags: Index8,
    index: AnyIndex,
    contents: Vec<ContentRef>,
}

impl UnionArray {
    /// A union over at least one branch; the index must cover the tags.
    pub fn try_new(
        tags: AnyIndex,
        index: AnyIndex,
        contents: Vec<ContentRef>,
    ) -> RaggedResult<Self> {
        let AnyIndex::I8(tags) = tags else {
            ragged_bail!("UnionArray tags must be 8-bit signed, got {}", tags.width_name());
        };
        if contents.is_empty() {
            ragged_bail!("UnionArray must have at least one content");
        }
        if contents.len() > MAX_UNION_BRANCHES {
            ragged_bail!(TypeMismatch:
                "UnionArray cannot have more than {MAX_UNION_BRANCHES} contents, got {}",
                contents.len());
        }
        if index.len() < tags.len() {
            ragged_bail!("UnionArray index must not be shorter than its tags");
        }
        Ok(Self {
            identities: None,
            parameters: Parameters::new(),
            tags,
            index,
            contents,
        })
    }

    /// Same node with the given parameters.
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// The branch selectors.
    pub fn tags(&self) -> &Index8 {
        &self.tags
    }

    /// The within-branch offsets.
    pub fn index(&self) -> &AnyIndex {
        &self.index
    }

    /// The branch contents.
    pub fn contents(&self) -> &[ContentRef] {
        &self.contents
    }

    /// Number of branches.
    pub fn numcontents(&self) -> usize {
        self.contents.len()
    }

    /// Branch `which`.
    pub fn content(&self, which: usize) -> RaggedResult<&ContentRef> {
        self.contents.get(which).ok_or_else(|| {
            ragged_err!(OutOfRange:
                "index {which} out of range for UnionArray with {} contents",
                self.numcontents())
        })
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether there are no elements.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// The identity index `[0, 1, ..., len)`, for unions whose branches are sliced
    /// projections.
    pub fn sparse_index(len: usize) -> Index64 {
        Index64::arange(len)
    }

    /// The per-tag running counter index, which makes each element point at its
    /// position within the projection of its own branch.
    pub fn regular_index(tags: &Index8, numcontents: usize) -> Index64 {
        Index64::from(kernels::union_regular_index(tags.as_slice(), numcontents))
    }

    /// Materialize branch `which`: the elements whose tag selects it, in order.
    pub fn project(&self, which: usize) -> RaggedResult<ContentRef> {
        let content = self.content(which)?;
        let index = self.index.to64();
        if index.len() < self.tags.len() {
            ragged_bail!("len(index) < len(tags)");
        }
        let carry = kernels::union_project(
            self.tags.as_slice(),
            index.as_slice(),
            which as i64,
            content.len() as i64,
        )
        .map_err(|e| e.into_error("UnionArray"))?;
        content.carry(&Index64::from(carry))
    }

    /// Canonicalize: inline nested unions, fold mergeable branches together, and
    /// collapse single-branch unions into a carried content.
    pub fn simplify_uniontype(&self, allow_bool: bool) -> RaggedResult<ContentRef> {
        let len = self.len();
        let outerindex = self.index.to64();
        if outerindex.len() < len {
            ragged_bail!("len(index) < len(tags)");
        }
        let mut tags = vec![0i8; len];
        let mut index = vec![0i64; len];
        let mut contents: Vec<ContentRef> = Vec::new();

        for (i, branch) in self.contents.iter().enumerate() {
            if let Content::Union(inner) = branch.as_ref() {
                let innertags = inner.tags.clone();
                let innerindex = inner.index.to64();
                for (j, innercontent) in inner.contents.iter().enumerate() {
                    let mut unmerged = true;
                    for k in 0..contents.len() {
                        if contents[k].mergeable(innercontent.as_ref(), allow_bool) {
                            kernels::union_simplify_inner(
                                &mut tags,
                                &mut index,
                                self.tags.as_slice(),
                                outerindex.as_slice(),
                                innertags.as_slice(),
                                innerindex.as_slice(),
                                k as i64,
                                j as i64,
                                i as i64,
                                contents[k].len() as i64,
                            );
                            contents[k] = contents[k].merge(innercontent.as_ref())?.into();
                            unmerged = false;
                            break;
                        }
                    }
                    if unmerged {
                        kernels::union_simplify_inner(
                            &mut tags,
                            &mut index,
                            self.tags.as_slice(),
                            outerindex.as_slice(),
                            innertags.as_slice(),
                            innerindex.as_slice(),
                            contents.len() as i64,
                            j as i64,
                            i as i64,
                            0,
                        );
                        contents.push(innercontent.clone());
                    }
                }
            } else {
                let mut unmerged = true;
                for k in 0..contents.len() {
                    if contents[k].mergeable(branch.as_ref(), allow_bool) {
                        kernels::union_simplify_one(
                            &mut tags,
                            &mut index,
                            self.tags.as_slice(),
                            outerindex.as_slice(),
                            k as i64,
                            i as i64,
                            contents[k].len() as i64,
                        );
                        contents[k] = contents[k].merge(branch.as_ref())?.into();
                        unmerged = false;
                        break;
                    }
                }
                if unmerged {
                    kernels::union_simplify_one(
                        &mut tags,
                        &mut index,
                        self.tags.as_slice(),
                        outerindex.as_slice(),
                        contents.len() as i64,
                        i as i64,
                        0,
                    );
                    contents.push(branch.clone());
                }
            }
        }

        if contents.len() > MAX_UNION_BRANCHES {
            ragged_bail!(TypeMismatch:
                "UnionArray cannot have more than {MAX_UNION_BRANCHES} contents after \
                 simplification, got {}",
                contents.len());
        }
        if contents.len() == 1 {
            log::debug!("union collapsed to a single branch of {} elements", len);
            return contents[0].carry(&Index64::from(index)).map(ContentRef::from);
        }
        let mut out = Self::try_new(
            Index8::from(tags).into(),
            Index64::from(index).into(),
            contents,
        )?;
        out.identities = self.identities.clone();
        out.parameters = self.parameters.clone();
        Ok(Content::Union(out).into())
    }

    pub(crate) fn item_at(&self, at: usize) -> RaggedResult<Item> {
        let tag = self.tags.get(at);
        if tag < 0 || tag as usize >= self.numcontents() {
            ragged_bail!("not 0 <= tag[i] < numcontents at i={at}");
        }
        let content = &self.contents[tag as usize];
        let idx = self.index.get(at);
        if idx < 0 || idx >= content.len() as i64 {
            ragged_bail!("index[i] > len(content(tag)) at i={at}");
        }
        content.getitem_at_nowrap(idx)
    }

    pub(crate) fn range_nowrap(&self, start: usize, stop: usize) -> RaggedResult<Self> {
        let identities = self
            .identities
            .as_ref()
            .map(|ids| Arc::new(ids.slice(start, stop)));
        Ok(Self {
            identities,
            parameters: self.parameters.clone(),
            tags: self.tags.slice(start, stop),
            index: self.index.slice(start, stop),
            contents: self.contents.clone(),
        })
    }

    pub(crate) fn carry(&self, carry: &Index64) -> RaggedResult<Content> {
        let mut nexttags = Vec::with_capacity(carry.len());
        for &c in carry.as_slice() {
            if c < 0 || c as usize >= self.len() {
                ragged_bail!(OutOfRange: "carry index {c} out of range for length {}", self.len());
            }
            nexttags.push(self.tags.get(c as usize));
        }
        let index = self.index.to64();
        let nextindex = kernels::index_carry_nocheck(index.as_slice(), carry.as_slice())
            .map_err(|e| e.into_error("UnionArray"))?;
        let identities = self
            .identities
            .as_ref()
            .map(|ids| ids.carry(carry).map(Arc::new))
            .transpose()?;
        Ok(Content::Union(Self {
            identities,
            parameters: self.parameters.clone(),
            tags: Index8::from(nexttags),
            index: Index64::from(nextindex).into(),
            contents: self.contents.clone(),
        }))
    }

    /// Project each field through every branch; field discovery on a union is
    /// set-valued, so the result's parameters start clean.
    pub(crate) fn project_field(&self, key: &str) -> RaggedResult<Content> {
        let contents = self
            .contents
            .iter()
            .map(|c| c.getitem_field(key))
            .collect::<RaggedResult<_>>()?;
        let mut out = Self::try_new(
            AnyIndex::I8(self.tags.clone()),
            self.index.clone(),
            contents,
        )?;
        out.identities = self.identities.clone();
        Ok(Content::Union(out))
    }

    pub(crate) fn project_fields(&self, keys: &[String]) -> RaggedResult<Content> {
        let contents = self
            .contents
            .iter()
            .map(|c| c.getitem_fields(keys))
            .collect::<RaggedResult<_>>()?;
        let mut out = Self::try_new(
            AnyIndex::I8(self.tags.clone()),
            self.index.clone(),
            contents,
        )?;
        out.identities = self.identities.clone();
        Ok(Content::Union(out))
    }

    pub(crate) fn getitem_next_structural(
        &self,
        head: &SliceItem,
        tail: &[SliceItem],
        advanced: &Index64,
    ) -> RaggedResult<ContentRef> {
        let mut outcontents = Vec::with_capacity(self.numcontents());
        for i in 0..self.numcontents() {
            let projection = self.project(i)?;
            outcontents.push(projection.getitem_next(Some(head), tail, advanced)?);
        }
        let outindex = Self::regular_index(&self.tags, self.numcontents());
        let mut out = Self::try_new(
            AnyIndex::I8(self.tags.clone()),
            outindex.into(),
            outcontents,
        )?;
        out.identities = self.identities.clone();
        out.parameters = self.parameters.clone();
        out.simplify_uniontype(false)
    }

    pub(crate) fn getitem_next_jagged(
        &self,
        slicestarts: &Index64,
        slicestops: &Index64,
        slicecontent: &SliceItem,
        tail: &[SliceItem],
    ) -> RaggedResult<ContentRef> {
        let simplified = self.simplify_uniontype(false)?;
        if matches!(simplified.as_ref(), Content::Union(_)) {
            ragged_bail!(TypeMismatch:
                "cannot apply jagged slices to irreducible union arrays");
        }
        simplified.getitem_next_jagged(slicestarts, slicestops, slicecontent, tail)
    }

    /// The field names common to every branch.
    pub fn keys(&self) -> Vec<String> {
        let mut out = match self.contents.first() {
            Some(content) => content.keys(),
            None => return Vec::new(),
        };
        for content in &self.contents[1..] {
            let theirs = content.keys();
            out.retain(|k| theirs.contains(k));
        }
        out
    }

    pub(crate) fn num(&self, axis: i64, depth: i64) -> RaggedResult<Content> {
        let contents = self
            .contents
            .iter()
            .map(|c| c.num_at(axis, depth).map(ContentRef::from))
            .collect::<RaggedResult<_>>()?;
        let out = Self::try_new(
            AnyIndex::I8(self.tags.clone()),
            self.index.clone(),
            contents,
        )?;
        Ok(out.simplify_uniontype(false)?.as_ref().clone())
    }

    pub(crate) fn offsets_and_flattened(
        &self,
        axis: i64,
        depth: i64,
    ) -> RaggedResult<(Index64, Content)> {
        let toaxis = Content::Union(self.clone()).wrap_axis(axis, depth)?;
        if toaxis == depth {
            ragged_bail!(OutOfRange: "axis=0 not allowed for flatten");
        }
        let mut branch_offsets: Vec<Vec<i64>> = Vec::with_capacity(self.numcontents());
        let mut contents: Vec<ContentRef> = Vec::with_capacity(self.numcontents());
        let mut has_offsets = false;
        for content in &self.contents {
            let (offsets, flattened) = content.offsets_and_flattened(axis, depth)?;
            has_offsets = !offsets.is_empty();
            branch_offsets.push(offsets.as_slice().to_vec());
            contents.push(flattened.into());
        }
        if has_offsets {
            let index = self.index.to64();
            let (tooffsets, totags, toindex) = kernels::union_flatten_combine(
                self.tags.as_slice(),
                index.as_slice(),
                &branch_offsets,
            );
            let out = Self::try_new(
                Index8::from(totags).into(),
                Index64::from(toindex).into(),
                contents,
            )?;
            Ok((
                Index64::from(tooffsets),
                out.simplify_uniontype(false)?.as_ref().clone(),
            ))
        } else {
            let out = Self::try_new(
                AnyIndex::I8(self.tags.clone()),
                self.index.clone(),
                contents,
            )?;
            Ok((Index64::empty(), Content::Union(out)))
        }
    }

    pub(crate) fn fillna(&self, value: &ContentRef) -> RaggedResult<Content> {
        let contents: Vec<ContentRef> = self
            .contents
            .iter()
            .map(|c| c.fillna(value).map(ContentRef::from))
            .try_collect()?;
        let mut out = Self::try_new(
            AnyIndex::I8(self.tags.clone()),
            self.index.clone(),
            contents,
        )?;
        out.identities = self.identities.clone();
        out.parameters = self.parameters.clone();
        Ok(out.simplify_uniontype(false)?.as_ref().clone())
    }

    pub(crate) fn is_none(&self, axis: i64, depth: i64) -> RaggedResult<Content> {
        let toaxis = Content::Union(self.clone()).wrap_axis(axis, depth)?;
        if toaxis == depth {
            Ok(Content::Numpy(NumpyArray::from_bools(&vec![false; self.len()])))
        } else {
            let contents = self
                .contents
                .iter()
                .map(|c| c.is_none_at(axis, depth).map(ContentRef::from))
                .collect::<RaggedResult<_>>()?;
            let out = Self::try_new(
                AnyIndex::I8(self.tags.clone()),
                self.index.clone(),
                contents,
            )?;
            Ok(out.simplify_uniontype(false)?.as_ref().clone())
        }
    }

    pub(crate) fn rpad(
        &self,
        target: i64,
        axis: i64,
        depth: i64,
        clip: bool,
    ) -> RaggedResult<Content> {
        let toaxis = Content::Union(self.clone()).wrap_axis(axis, depth)?;
        if toaxis == depth {
            return Content::Union(self.clone()).rpad_axis0(target, clip);
        }
        let contents = self
            .contents
            .iter()
            .map(|c| c.rpad_at(target, axis, depth, clip).map(ContentRef::from))
            .collect::<RaggedResult<_>>()?;
        let mut out = Self::try_new(
            AnyIndex::I8(self.tags.clone()),
            self.index.clone(),
            contents,
        )?;
        out.identities = self.identities.clone();
        out.parameters = self.parameters.clone();
        Ok(out.simplify_uniontype(false)?.as_ref().clone())
    }

    pub(crate) fn localindex(&self, axis: i64, depth: i64) -> RaggedResult<Content> {
        let contents = self
            .contents
            .iter()
            .map(|c| c.localindex_at(axis, depth).map(ContentRef::from))
            .collect::<RaggedResult<_>>()?;
        let mut out = Self::try_new(
            AnyIndex::I8(self.tags.clone()),
            self.index.clone(),
            contents,
        )?;
        out.identities = self.identities.clone();
        Ok(Content::Union(out))
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
        let contents = self
            .contents
            .iter()
            .map(|c| {
                c.combinations_at(n, replacement, recordlookup.clone(), parameters, axis, depth)
                    .map(ContentRef::from)
            })
            .collect::<RaggedResult<_>>()?;
        let mut out = Self::try_new(
            AnyIndex::I8(self.tags.clone()),
            self.index.clone(),
            contents,
        )?;
        out.identities = self.identities.clone();
        Ok(Content::Union(out))
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
        let simplified = self.simplify_uniontype(true)?;
        if matches!(simplified.as_ref(), Content::Union(_)) {
            ragged_bail!(TypeMismatch:
                "cannot reduce (call '{}' on) an irreducible UnionArray",
                reducer.name());
        }
        simplified.reduce_next(reducer, negaxis, starts, parents, outlength, mask, keepdims)
    }

    /// Concatenation where this union is appended after `other`.
    pub(crate) fn reverse_merge(&self, other: &Content) -> RaggedResult<Content> {
        let theirlength = other.len();
        let mylength = self.len();
        let mut tags = Vec::with_capacity(theirlength + mylength);
        let mut index = Vec::with_capacity(theirlength + mylength);
        tags.extend(std::iter::repeat(0i8).take(theirlength));
        index.extend(0..theirlength as i64);
        for i in 0..mylength {
            let tag = self.tags.get(i) + 1;
            tags.push(tag);
            index.push(self.index.get(i));
        }
        let mut contents: Vec<ContentRef> = Vec::with_capacity(self.numcontents() + 1);
        contents.push(other.clone().into());
        contents.extend(self.contents.iter().cloned());
        if contents.len() > MAX_UNION_BRANCHES {
            ragged_bail!(TypeMismatch:
                "UnionArray cannot have more than {MAX_UNION_BRANCHES} contents");
        }
        Ok(Content::Union(Self::try_new(
            Index8::from(tags).into(),
            Index64::from(index).into(),
            contents,
        )?))
    }

    /// Concatenation with anything: branch-wise when `other` is a union, otherwise
    /// `other` becomes one more branch.
    pub(crate) fn merge(&self, other: &Content) -> RaggedResult<Content> {
        if let Content::Empty(_) = other {
            return Ok(Content::Union(self.clone()));
        }
        let mylength = self.len();
        let theirlength = other.len();
        let mut tags = Vec::with_capacity(mylength + theirlength);
        let mut index = Vec::with_capacity(mylength + theirlength);
        for i in 0..mylength {
            tags.push(self.tags.get(i));
            index.push(self.index.get(i));
        }
        let mut contents: Vec<ContentRef> = self.contents.clone();
        match other {
            Content::Union(theirs) => {
                for i in 0..theirlength {
                    tags.push(theirs.tags.get(i) + self.numcontents() as i8);
                    index.push(theirs.index.get(i));
                }
                contents.extend(theirs.contents.iter().cloned());
            }
            _ => {
                tags.extend(std::iter::repeat(self.numcontents() as i8).take(theirlength));
                index.extend(0..theirlength as i64);
                contents.push(other.clone().into());
            }
        }
        if contents.len() > MAX_UNION_BRANCHES {
            ragged_bail!(TypeMismatch:
                "UnionArray cannot have more than {MAX_UNION_BRANCHES} contents");
        }
        Ok(Content::Union(Self::try_new(
            Index8::from(tags).into(),
            Index64::from(index).into(),
            contents,
        )?))
    }

    pub(crate) fn validity_error(&self, path: &str) -> Option<String> {
        let index = self.index.to64();
        let lencontents: Vec<i64> = self.contents.iter().map(|c| c.len() as i64).collect();
        if let Err(e) = kernels::union_validity(
            self.tags.as_slice(),
            index.as_slice(),
            self.numcontents(),
            &lencontents,
        ) {
            return Some(format!(
                "at {path} (UnionArray): {}{}",
                e.message,
                e.element.map(|i| format!(" at i={i}")).unwrap_or_default()
            ));
        }
        for (i, content) in self.contents.iter().enumerate() {
            if let Some(err) = content.validity_error(&format!("{path}.content({i})")) {
                return Some(err);
            }
        }
        None
    }

    pub(crate) fn tostring_part(&self, indent: &str, pre: &str, post: &str) -> String {
        let mut out = format!("{indent}{pre}<UnionArray>\n");
        if let Some(ids) = &self.identities {
            out.push_str(&format!("{indent}    {ids}\n"));
        }
        out.push_str(&format!("{indent}    <tags>{}</tags>\n", self.tags));
        out.push_str(&format!("{indent}    <index>{}</index>\n", self.index));
        for (i, content) in self.contents.iter().enumerate() {
            out.push_str(&format!("{indent}    <content index=\"{i}\">\n"));
            out.push_str(&content.tostring_part(&format!("{indent}        "), "", "\n"));
            out.push_str(&format!("{indent}    </content>\n"));
        }
        out.push_str(&format!("{indent}</UnionArray>{post}"));
        out
    }

    /// This node as a [`Content`].
    pub fn to_content(&self) -> Content {
        Content::Union(self.clone())
    }

    /// This node as a shared [`ContentRef`].
    pub fn into_ref(self) -> ContentRef {
        Arc::new(Content::Union(self))
    }
}

impl From<UnionArray> for Content {
    fn from(a: UnionArray) -> Self {
        Content::Union(a)
    }
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use ragged_dtype::{PType, Parameters};

    use crate::{AnyIndex, Content, Index8, Index64, NumpyArray, UnionArray};

    fn mixed() -> UnionArray {
        UnionArray::try_new(
            Index8::new(buffer![0i8, 1, 0, 1]).into(),
            Index64::from(vec![0i64, 0, 1, 1]).into(),
            vec![
                NumpyArray::from_vec(vec![1i64, 2]).into_ref(),
                NumpyArray::from_vec(vec![3.0f64, 4.0]).into_ref(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn element_dispatch() {
        let u = mixed();
        assert_eq!(u.len(), 4);
        assert_eq!(u.to_content().to_json().unwrap().to_string(), "[1,3.0,2,4.0]");
    }

    #[test]
    fn project_selects_branch() {
        let u = mixed();
        assert_eq!(u.project(0).unwrap().to_json().unwrap().to_string(), "[1,2]");
        assert_eq!(u.project(1).unwrap().to_json().unwrap().to_string(), "[3.0,4.0]");
    }

    #[test]
    fn simplify_merges_numeric_branches() {
        let simplified = mixed().simplify_uniontype(false).unwrap();
        let Content::Numpy(leaf) = simplified.as_ref() else {
            panic!("expected the union to collapse to a promoted leaf");
        };
        assert_eq!(leaf.ptype(), PType::F64);
        assert_eq!(leaf.as_slice::<f64>(), &[1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn simplify_keeps_distinct_parameters_apart() {
        let tagged: Parameters = [("__array__", "tagged")].into_iter().collect();
        let u = UnionArray::try_new(
            Index8::new(buffer![0i8, 1, 0, 1]).into(),
            Index64::from(vec![0i64, 0, 1, 1]).into(),
            vec![
                NumpyArray::from_vec(vec![1i64, 2]).with_parameters(tagged).into_ref(),
                NumpyArray::from_vec(vec![3.0f64, 4.0]).into_ref(),
            ],
        )
        .unwrap();
        let simplified = u.simplify_uniontype(false).unwrap();
        let Content::Union(still) = simplified.as_ref() else {
            panic!("expected the union to keep two branches");
        };
        assert_eq!(still.numcontents(), 2);
    }

    #[test]
    fn single_branch_collapses_to_carry() {
        let u = UnionArray::try_new(
            Index8::new(buffer![0i8, 0, 0]).into(),
            Index64::from(vec![2i64, 0, 1]).into(),
            vec![NumpyArray::from_vec(vec![10i64, 20, 30]).into_ref()],
        )
        .unwrap();
        let simplified = u.simplify_uniontype(false).unwrap();
        assert_eq!(simplified.to_json().unwrap().to_string(), "[30,10,20]");
        assert!(matches!(simplified.as_ref(), Content::Numpy(_)));
    }

    #[test]
    fn union_of_union_inlines() {
        let inner = mixed();
        let u = UnionArray::try_new(
            Index8::new(buffer![0i8, 1, 0]).into(),
            Index64::from(vec![0i64, 0, 1]).into(),
            vec![
                inner.into_ref(),
                NumpyArray::from_bools(&[true]).into_ref(),
            ],
        )
        .unwrap();
        let simplified = u.simplify_uniontype(false).unwrap();
        let Content::Union(out) = simplified.as_ref() else {
            panic!("expected a flat union");
        };
        for content in out.contents() {
            assert!(!matches!(content.as_ref(), Content::Union(_)));
        }
        assert_eq!(out.to_content().to_json().unwrap().to_string(), "[1.0,true,3.0]");
    }

    #[test]
    fn field_discovery_is_intersection() {
        let rec_ab = crate::RecordArray::try_new(
            vec![
                NumpyArray::from_vec(vec![1i64]).into_ref(),
                NumpyArray::from_vec(vec![2i64]).into_ref(),
            ],
            Some(vec!["a".to_string(), "b".to_string()]),
            1,
        )
        .unwrap();
        let rec_bc = crate::RecordArray::try_new(
            vec![
                NumpyArray::from_vec(vec![3i64]).into_ref(),
                NumpyArray::from_vec(vec![4i64]).into_ref(),
            ],
            Some(vec!["b".to_string(), "c".to_string()]),
            1,
        )
        .unwrap();
        let u = UnionArray::try_new(
            Index8::new(buffer![0i8, 1]).into(),
            Index64::from(vec![0i64, 0]).into(),
            vec![rec_ab.into_ref(), rec_bc.into_ref()],
        )
        .unwrap();
        assert_eq!(u.keys(), vec!["b"]);
        assert!(u.to_content().fieldindex("b").is_err());
    }

    #[test]
    fn tags_must_be_i8() {
        assert!(UnionArray::try_new(
            AnyIndex::from(Index64::from(vec![0i64])),
            Index64::from(vec![0i64]).into(),
            vec![NumpyArray::from_vec(vec![1i64]).into_ref()],
        )
        .is_err());
    }

    #[test]
    fn index_must_cover_tags() {
        assert!(UnionArray::try_new(
            Index8::new(buffer![0i8, 0]).into(),
            Index64::from(vec![0i64]).into(),
            vec![NumpyArray::from_vec(vec![1i64]).into_ref()],
        )
        .is_err());
    }
}
