use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use ragged_dtype::{PType, Parameters};
use ragged_error::{RaggedExpect, RaggedResult, ragged_bail, ragged_err};

use crate::kernels;
use crate::{
    BitMaskedArray, ByteMaskedArray, EmptyArray, Identities, Index64, Index8, IndexedArray,
    IndexedOptionArray, Item, JsonBuilder, ListArray, ListOffsetArray, NumpyArray, RecordArray,
    Reducer, RegularArray, Slice, SliceItem, SliceJagged64, SliceMissing64, UnionArray,
    UnmaskedArray,
};
use crate::arrays::merge_index;

/// A shared, immutable handle to a layout node; trees are DAGs of these.
pub type ContentRef = Arc<Content>;

/// A recursive array layout: one of the closed set of node kinds.
///
/// Every operation traverses the tree and returns a new tree referencing the original
/// buffers wherever no recomputation is required.
#[derive(Debug, Clone)]
pub enum Content {
    /// A length-0 array of unspecified type.
    Empty(EmptyArray),
    /// A typed flat buffer viewed as a row-major tensor.
    Numpy(NumpyArray),
    /// A rectangular list layer.
    Regular(RegularArray),
    /// Variable-length lists by monotone offsets.
    ListOffset(ListOffsetArray),
    /// Variable-length lists by arbitrary starts/stops.
    List(ListArray),
    /// A pure gather.
    Indexed(IndexedArray),
    /// A gather with missing values.
    IndexedOption(IndexedOptionArray),
    /// Per-element validity by byte.
    ByteMasked(ByteMaskedArray),
    /// Per-element validity by packed bits.
    BitMasked(BitMaskedArray),
    /// An option-typed wrapper asserting nothing is missing.
    Unmasked(UnmaskedArray),
    /// A struct-of-arrays.
    Record(RecordArray),
    /// A tagged union.
    Union(UnionArray),
}

/// Wrap a negative axis against the tree's depth at the current recursion step.
pub(crate) fn wrap_axis_value(
    axis: i64,
    depth: i64,
    purelist_depth: i64,
) -> RaggedResult<i64> {
    if axis >= 0 {
        return Ok(axis);
    }
    if purelist_depth < 0 {
        ragged_bail!(OutOfRange:
            "negative axis cannot be resolved on a structure whose branches disagree on depth");
    }
    let wrapped = depth + purelist_depth + axis;
    if wrapped < 0 {
        ragged_bail!(OutOfRange:
            "axis {axis} exceeds the depth {} of this array", depth + purelist_depth);
    }
    Ok(wrapped)
}

impl Content {
    /// The class name used in error messages and dumps.
    pub fn class_name(&self) -> &'static str {
        match self {
            Content::Empty(_) => "EmptyArray",
            Content::Numpy(_) => "NumpyArray",
            Content::Regular(_) => "RegularArray",
            Content::ListOffset(_) => "ListOffsetArray",
            Content::List(_) => "ListArray",
            Content::Indexed(_) => "IndexedArray",
            Content::IndexedOption(_) => "IndexedOptionArray",
            Content::ByteMasked(_) => "ByteMaskedArray",
            Content::BitMasked(_) => "BitMaskedArray",
            Content::Unmasked(_) => "UnmaskedArray",
            Content::Record(_) => "RecordArray",
            Content::Union(_) => "UnionArray",
        }
    }

    /// Total outer-axis length.
    pub fn len(&self) -> usize {
        match self {
            Content::Empty(_) => 0,
            Content::Numpy(x) => x.len(),
            Content::Regular(x) => x.len(),
            Content::ListOffset(x) => x.len(),
            Content::List(x) => x.len(),
            Content::Indexed(x) => x.len(),
            Content::IndexedOption(x) => x.len(),
            Content::ByteMasked(x) => x.len(),
            Content::BitMasked(x) => x.len(),
            Content::Unmasked(x) => x.len(),
            Content::Record(x) => x.len(),
            Content::Union(x) => x.len(),
        }
    }

    /// Whether the outer axis is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The node's parameter map.
    pub fn parameters(&self) -> &Parameters {
        match self {
            Content::Empty(x) => &x.parameters,
            Content::Numpy(x) => &x.parameters,
            Content::Regular(x) => &x.parameters,
            Content::ListOffset(x) => &x.parameters,
            Content::List(x) => &x.parameters,
            Content::Indexed(x) => &x.parameters,
            Content::IndexedOption(x) => &x.parameters,
            Content::ByteMasked(x) => &x.parameters,
            Content::BitMasked(x) => &x.parameters,
            Content::Unmasked(x) => &x.parameters,
            Content::Record(x) => &x.parameters,
            Content::Union(x) => &x.parameters,
        }
    }

    /// One parameter, if set.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters().get(key)
    }

    /// Whether both nodes carry exactly the same parameters.
    pub fn parameters_equal(&self, other: &Content) -> bool {
        self.parameters() == other.parameters()
    }

    /// The parameter as seen through pure list layers and wrappers.
    pub fn purelist_parameter(&self, key: &str) -> Option<String> {
        if let Some(v) = self.parameter(key) {
            return Some(v.to_string());
        }
        match self {
            Content::Regular(x) => x.content().purelist_parameter(key),
            Content::ListOffset(x) => x.content().purelist_parameter(key),
            Content::List(x) => x.content().purelist_parameter(key),
            Content::Indexed(x) => x.content().purelist_parameter(key),
            Content::IndexedOption(x) => x.content().purelist_parameter(key),
            Content::ByteMasked(x) => x.content().purelist_parameter(key),
            Content::BitMasked(x) => x.content().purelist_parameter(key),
            Content::Unmasked(x) => x.content().purelist_parameter(key),
            Content::Union(x) => {
                let mut out: Option<String> = None;
                for (i, content) in x.contents().iter().enumerate() {
                    let theirs = content.purelist_parameter(key);
                    if i == 0 {
                        out = theirs;
                    } else if out != theirs {
                        return None;
                    }
                }
                out
            }
            _ => None,
        }
    }

    /// The node's identity table, if assigned.
    pub fn identities(&self) -> Option<&Arc<Identities>> {
        match self {
            Content::Empty(x) => x.identities.as_ref(),
            Content::Numpy(x) => x.identities.as_ref(),
            Content::Regular(x) => x.identities.as_ref(),
            Content::ListOffset(x) => x.identities.as_ref(),
            Content::List(x) => x.identities.as_ref(),
            Content::Indexed(x) => x.identities.as_ref(),
            Content::IndexedOption(x) => x.identities.as_ref(),
            Content::ByteMasked(x) => x.identities.as_ref(),
            Content::BitMasked(x) => x.identities.as_ref(),
            Content::Unmasked(x) => x.identities.as_ref(),
            Content::Record(x) => x.identities.as_ref(),
            Content::Union(x) => x.identities.as_ref(),
        }
    }

    /// Guard shared before iterating: an identity table shorter than the array is a
    /// broken invariant.
    pub fn check_for_iteration(&self) -> RaggedResult<()> {
        if let Some(ids) = self.identities() {
            if ids.len() < self.len() {
                ragged_bail!("len(identities) < len(array)");
            }
        }
        Ok(())
    }

    /// Depth of this tree counting only pure list layers; `-1` when union branches
    /// disagree.
    pub fn purelist_depth(&self) -> i64 {
        match self {
            Content::Empty(_) => 1,
            Content::Numpy(x) => x.ndim() as i64,
            Content::Regular(x) => {
                let inner = x.content().purelist_depth();
                if inner < 0 { -1 } else { inner + 1 }
            }
            Content::ListOffset(x) => {
                let inner = x.content().purelist_depth();
                if inner < 0 { -1 } else { inner + 1 }
            }
            Content::List(x) => {
                let inner = x.content().purelist_depth();
                if inner < 0 { -1 } else { inner + 1 }
            }
            Content::Indexed(x) => x.content().purelist_depth(),
            Content::IndexedOption(x) => x.content().purelist_depth(),
            Content::ByteMasked(x) => x.content().purelist_depth(),
            Content::BitMasked(x) => x.content().purelist_depth(),
            Content::Unmasked(x) => x.content().purelist_depth(),
            Content::Record(_) => 1,
            Content::Union(x) => {
                let mut out = -1;
                for (i, content) in x.contents().iter().enumerate() {
                    let theirs = content.purelist_depth();
                    if i == 0 {
                        out = theirs;
                    } else if out != theirs {
                        return -1;
                    }
                }
                out
            }
        }
    }

    /// Whether every list layer down to the leaves is rectangular.
    pub fn purelist_isregular(&self) -> bool {
        match self {
            Content::Empty(_) | Content::Numpy(_) | Content::Record(_) => true,
            Content::Regular(x) => x.content().purelist_isregular(),
            Content::ListOffset(_) | Content::List(_) => false,
            Content::Indexed(x) => x.content().purelist_isregular(),
            Content::IndexedOption(x) => x.content().purelist_isregular(),
            Content::ByteMasked(x) => x.content().purelist_isregular(),
            Content::BitMasked(x) => x.content().purelist_isregular(),
            Content::Unmasked(x) => x.content().purelist_isregular(),
            Content::Union(x) => x.contents().iter().all(|c| c.purelist_isregular()),
        }
    }

    /// Minimum and maximum depth across branches.
    pub fn minmax_depth(&self) -> (i64, i64) {
        match self {
            Content::Empty(_) => (1, 1),
            Content::Numpy(x) => (x.ndim() as i64, x.ndim() as i64),
            Content::Regular(x) => {
                let (min, max) = x.content().minmax_depth();
                (min + 1, max + 1)
            }
            Content::ListOffset(x) => {
                let (min, max) = x.content().minmax_depth();
                (min + 1, max + 1)
            }
            Content::List(x) => {
                let (min, max) = x.content().minmax_depth();
                (min + 1, max + 1)
            }
            Content::Indexed(x) => x.content().minmax_depth(),
            Content::IndexedOption(x) => x.content().minmax_depth(),
            Content::ByteMasked(x) => x.content().minmax_depth(),
            Content::BitMasked(x) => x.content().minmax_depth(),
            Content::Unmasked(x) => x.content().minmax_depth(),
            Content::Record(x) => {
                if x.contents().is_empty() {
                    return (0, 0);
                }
                let mut min = i64::MAX;
                let mut max = 0;
                for content in x.contents() {
                    let (a, b) = content.minmax_depth();
                    min = min.min(a);
                    max = max.max(b);
                }
                (min, max)
            }
            Content::Union(x) => {
                if x.contents().is_empty() {
                    return (0, 0);
                }
                let mut min = i64::MAX;
                let mut max = 0;
                for content in x.contents() {
                    let (a, b) = content.minmax_depth();
                    min = min.min(a);
                    max = max.max(b);
                }
                (min, max)
            }
        }
    }

    /// Whether any branching occurs below, and the minimum depth.
    pub fn branch_depth(&self) -> (bool, i64) {
        match self {
            Content::Empty(_) => (false, 1),
            Content::Numpy(x) => (false, x.ndim() as i64),
            Content::Regular(x) => {
                let (b, d) = x.content().branch_depth();
                (b, d + 1)
            }
            Content::ListOffset(x) => {
                let (b, d) = x.content().branch_depth();
                (b, d + 1)
            }
            Content::List(x) => {
                let (b, d) = x.content().branch_depth();
                (b, d + 1)
            }
            Content::Indexed(x) => x.content().branch_depth(),
            Content::IndexedOption(x) => x.content().branch_depth(),
            Content::ByteMasked(x) => x.content().branch_depth(),
            Content::BitMasked(x) => x.content().branch_depth(),
            Content::Unmasked(x) => x.content().branch_depth(),
            Content::Record(x) => {
                if x.contents().is_empty() {
                    return (false, 1);
                }
                let mut anybranch = false;
                let mut mindepth = -1;
                for content in x.contents() {
                    let (b, d) = content.branch_depth();
                    if mindepth == -1 {
                        mindepth = d;
                    }
                    if b || mindepth != d {
                        anybranch = true;
                    }
                    mindepth = mindepth.min(d);
                }
                (anybranch, mindepth)
            }
            Content::Union(x) => {
                let mut anybranch = false;
                let mut mindepth = -1;
                for content in x.contents() {
                    let (b, d) = content.branch_depth();
                    if mindepth == -1 {
                        mindepth = d;
                    }
                    if b || mindepth != d {
                        anybranch = true;
                    }
                    mindepth = mindepth.min(d);
                }
                (anybranch, mindepth)
            }
        }
    }

    /// Wrap a negative `axis` against this node's depth at recursion depth `depth`.
    pub fn wrap_axis(&self, axis: i64, depth: i64) -> RaggedResult<i64> {
        wrap_axis_value(axis, depth, self.purelist_depth())
    }

    /// Number of record fields; zero for anything without fields.
    pub fn numfields(&self) -> usize {
        match self {
            Content::Record(x) => x.numfields(),
            Content::Union(x) => x.keys().len(),
            Content::Regular(x) => x.content().numfields(),
            Content::ListOffset(x) => x.content().numfields(),
            Content::List(x) => x.content().numfields(),
            Content::Indexed(x) => x.content().numfields(),
            Content::IndexedOption(x) => x.content().numfields(),
            Content::ByteMasked(x) => x.content().numfields(),
            Content::BitMasked(x) => x.content().numfields(),
            Content::Unmasked(x) => x.content().numfields(),
            _ => 0,
        }
    }

    /// The ordinal of a record field; forbidden on unions because the branch mapping
    /// is not one-to-one.
    pub fn fieldindex(&self, key: &str) -> RaggedResult<usize> {
        match self {
            Content::Record(x) => x.fieldindex(key),
            Content::Union(_) => Err(ragged_err!(UndefinedOperation:
                "UnionArray breaks the one-to-one relationship between fieldindexes and keys")),
            Content::Regular(x) => x.content().fieldindex(key),
            Content::ListOffset(x) => x.content().fieldindex(key),
            Content::List(x) => x.content().fieldindex(key),
            Content::Indexed(x) => x.content().fieldindex(key),
            Content::IndexedOption(x) => x.content().fieldindex(key),
            Content::ByteMasked(x) => x.content().fieldindex(key),
            Content::BitMasked(x) => x.content().fieldindex(key),
            Content::Unmasked(x) => x.content().fieldindex(key),
            other => Err(ragged_err!(TypeMismatch:
                "{} has no fields to look up {key:?}", other.class_name())),
        }
    }

    /// The name of a record field; forbidden on unions.
    pub fn key(&self, fieldindex: usize) -> RaggedResult<String> {
        match self {
            Content::Record(x) => x.key(fieldindex),
            Content::Union(_) => Err(ragged_err!(UndefinedOperation:
                "UnionArray breaks the one-to-one relationship between fieldindexes and keys")),
            Content::Regular(x) => x.content().key(fieldindex),
            Content::ListOffset(x) => x.content().key(fieldindex),
            Content::List(x) => x.content().key(fieldindex),
            Content::Indexed(x) => x.content().key(fieldindex),
            Content::IndexedOption(x) => x.content().key(fieldindex),
            Content::ByteMasked(x) => x.content().key(fieldindex),
            Content::BitMasked(x) => x.content().key(fieldindex),
            Content::Unmasked(x) => x.content().key(fieldindex),
            other => Err(ragged_err!(TypeMismatch:
                "{} has no fields", other.class_name())),
        }
    }

    /// Whether `key` names a field.
    pub fn haskey(&self, key: &str) -> bool {
        self.keys().iter().any(|k| k == key)
    }

    /// All field names; for unions, the intersection of branch keys.
    pub fn keys(&self) -> Vec<String> {
        match self {
            Content::Record(x) => x.keys(),
            Content::Union(x) => x.keys(),
            Content::Regular(x) => x.content().keys(),
            Content::ListOffset(x) => x.content().keys(),
            Content::List(x) => x.content().keys(),
            Content::Indexed(x) => x.content().keys(),
            Content::IndexedOption(x) => x.content().keys(),
            Content::ByteMasked(x) => x.content().keys(),
            Content::BitMasked(x) => x.content().keys(),
            Content::Unmasked(x) => x.content().keys(),
            _ => Vec::new(),
        }
    }

    /// The element at `at`, wrapping negative positions and bounds-checking.
    pub fn getitem_at(&self, at: i64) -> RaggedResult<Item> {
        let len = self.len() as i64;
        let regular = if at < 0 { at + len } else { at };
        if regular < 0 || regular >= len {
            ragged_bail!(OutOfRange:
                "index {at} out of range for {} of length {len}", self.class_name());
        }
        self.getitem_at_nowrap(regular)
    }

    /// The element at `at` without wrapping; `0 <= at < len` is a precondition.
    pub fn getitem_at_nowrap(&self, at: i64) -> RaggedResult<Item> {
        let at = at as usize;
        match self {
            Content::Empty(_) => Err(ragged_err!(OutOfRange:
                "index {at} out of range for EmptyArray of length 0")),
            Content::Numpy(x) => x.item_at(at),
            Content::Regular(x) => x.item_at(at),
            Content::ListOffset(x) => x.item_at(at),
            Content::List(x) => x.item_at(at),
            Content::Indexed(x) => x.item_at(at),
            Content::IndexedOption(x) => x.item_at(at),
            Content::ByteMasked(x) => x.item_at(at),
            Content::BitMasked(x) => x.item_at(at),
            Content::Unmasked(x) => x.item_at(at),
            Content::Record(x) => x.item_at(at),
            Content::Union(x) => x.item_at(at),
        }
    }

    /// The range `[start, stop)` with Python slice conventions for the bounds.
    pub fn getitem_range(
        &self,
        start: Option<i64>,
        stop: Option<i64>,
    ) -> RaggedResult<ContentRef> {
        let (start, stop) = kernels::regularize_rangeslice(start, stop, 1, self.len() as i64);
        self.getitem_range_nowrap(start, stop)
    }

    /// The range `[start, stop)`; `0 <= start <= stop <= len` is a precondition.
    pub fn getitem_range_nowrap(&self, start: i64, stop: i64) -> RaggedResult<ContentRef> {
        if start < 0 || stop < start || stop > self.len() as i64 {
            ragged_bail!(OutOfRange:
                "range [{start}, {stop}) out of range for {} of length {}",
                self.class_name(),
                self.len());
        }
        let (start, stop) = (start as usize, stop as usize);
        Ok(match self {
            Content::Empty(x) => Content::Empty(x.clone()).into(),
            Content::Numpy(x) => Content::Numpy(x.range_nowrap(start, stop)?).into(),
            Content::Regular(x) => Content::Regular(x.range_nowrap(start, stop)?).into(),
            Content::ListOffset(x) => Content::ListOffset(x.range_nowrap(start, stop)?).into(),
            Content::List(x) => Content::List(x.range_nowrap(start, stop)?).into(),
            Content::Indexed(x) => Content::Indexed(x.range_nowrap(start, stop)?).into(),
            Content::IndexedOption(x) => {
                Content::IndexedOption(x.range_nowrap(start, stop)?).into()
            }
            Content::ByteMasked(x) => Content::ByteMasked(x.range_nowrap(start, stop)?).into(),
            Content::BitMasked(x) => x.range_nowrap(start, stop)?.into(),
            Content::Unmasked(x) => Content::Unmasked(x.range_nowrap(start, stop)?).into(),
            Content::Record(x) => Content::Record(x.range_nowrap(start, stop)?).into(),
            Content::Union(x) => Content::Union(x.range_nowrap(start, stop)?).into(),
        })
    }

    /// An empty view with the same type structure.
    pub fn getitem_nothing(&self) -> RaggedResult<ContentRef> {
        self.getitem_range_nowrap(0, 0)
    }

    /// Project one record field through this node.
    pub fn getitem_field(&self, key: &str) -> RaggedResult<ContentRef> {
        Ok(match self {
            Content::Record(x) => x.field(key)?.getitem_range_nowrap(0, x.len() as i64)?,
            Content::Union(x) => x.project_field(key)?.into(),
            Content::Regular(x) => {
                let mut out = RegularArray::try_new(x.content().getitem_field(key)?, x.size())?;
                out.identities = x.identities.clone();
                Content::Regular(out).into()
            }
            Content::ListOffset(x) => {
                let mut out =
                    ListOffsetArray::try_new(x.offsets().clone(), x.content().getitem_field(key)?)?;
                out.identities = x.identities.clone();
                Content::ListOffset(out).into()
            }
            Content::List(x) => {
                let mut out = ListArray::try_new(
                    x.starts().clone(),
                    x.stops().clone(),
                    x.content().getitem_field(key)?,
                )?;
                out.identities = x.identities.clone();
                Content::List(out).into()
            }
            Content::Indexed(x) => {
                let mut out =
                    IndexedArray::try_new(x.index().clone(), x.content().getitem_field(key)?)?;
                out.identities = x.identities.clone();
                Content::Indexed(out).into()
            }
            Content::IndexedOption(x) => {
                let mut out = IndexedOptionArray::try_new(
                    x.index().clone(),
                    x.content().getitem_field(key)?,
                )?;
                out.identities = x.identities.clone();
                Content::IndexedOption(out).into()
            }
            Content::ByteMasked(x) => {
                let mut out = ByteMaskedArray::try_new(
                    x.mask().clone(),
                    x.content().getitem_field(key)?,
                    x.valid_when(),
                )?;
                out.identities = x.identities.clone();
                Content::ByteMasked(out).into()
            }
            Content::BitMasked(x) => {
                let mut out = BitMaskedArray::try_new(
                    x.mask().clone(),
                    x.content().getitem_field(key)?,
                    x.valid_when(),
                    x.len(),
                    x.lsb_order(),
                )?;
                out.identities = x.identities.clone();
                Content::BitMasked(out).into()
            }
            Content::Unmasked(x) => {
                let mut out = UnmaskedArray::new(x.content().getitem_field(key)?);
                out.identities = x.identities.clone();
                Content::Unmasked(out).into()
            }
            other => {
                ragged_bail!(TypeMismatch:
                    "cannot slice {} by field name {key:?}", other.class_name())
            }
        })
    }

    /// Project several record fields through this node.
    pub fn getitem_fields(&self, keys: &[String]) -> RaggedResult<ContentRef> {
        Ok(match self {
            Content::Record(x) => Content::Record(x.project_fields(keys)?).into(),
            Content::Union(x) => x.project_fields(keys)?.into(),
            Content::Regular(x) => Content::Regular(RegularArray::try_new(
                x.content().getitem_fields(keys)?,
                x.size(),
            )?)
            .into(),
            Content::ListOffset(x) => Content::ListOffset(ListOffsetArray::try_new(
                x.offsets().clone(),
                x.content().getitem_fields(keys)?,
            )?)
            .into(),
            Content::List(x) => Content::List(ListArray::try_new(
                x.starts().clone(),
                x.stops().clone(),
                x.content().getitem_fields(keys)?,
            )?)
            .into(),
            Content::Indexed(x) => Content::Indexed(IndexedArray::try_new(
                x.index().clone(),
                x.content().getitem_fields(keys)?,
            )?)
            .into(),
            Content::IndexedOption(x) => Content::IndexedOption(IndexedOptionArray::try_new(
                x.index().clone(),
                x.content().getitem_fields(keys)?,
            )?)
            .into(),
            Content::ByteMasked(x) => Content::ByteMasked(ByteMaskedArray::try_new(
                x.mask().clone(),
                x.content().getitem_fields(keys)?,
                x.valid_when(),
            )?)
            .into(),
            Content::BitMasked(x) => Content::BitMasked(BitMaskedArray::try_new(
                x.mask().clone(),
                x.content().getitem_fields(keys)?,
                x.valid_when(),
                x.len(),
                x.lsb_order(),
            )?)
            .into(),
            Content::Unmasked(x) => {
                Content::Unmasked(UnmaskedArray::new(x.content().getitem_fields(keys)?)).into()
            }
            other => {
                ragged_bail!(TypeMismatch:
                    "cannot slice {} by field names", other.class_name())
            }
        })
    }

    /// Advanced indexing: an array of `carry.len()` elements where element `i` is
    /// `self[carry[i]]`, pushed down to child buffers without materializing where
    /// possible.
    pub fn carry(&self, carry: &Index64) -> RaggedResult<ContentRef> {
        Ok(match self {
            Content::Empty(x) => {
                if carry.is_empty() {
                    Content::Empty(x.clone()).into()
                } else {
                    ragged_bail!(OutOfRange: "carry index out of range for EmptyArray")
                }
            }
            Content::Numpy(x) => x.carry(carry)?.into(),
            Content::Regular(x) => x.carry(carry)?.into(),
            Content::ListOffset(x) => x.carry(carry)?.into(),
            Content::List(x) => x.carry(carry)?.into(),
            Content::Indexed(x) => x.carry(carry)?.into(),
            Content::IndexedOption(x) => x.carry(carry)?.into(),
            Content::ByteMasked(x) => x.carry(carry)?.into(),
            Content::BitMasked(x) => x.carry(carry)?.into(),
            Content::Unmasked(x) => x.carry(carry)?.into(),
            Content::Record(x) => x.carry(carry)?.into(),
            Content::Union(x) => x.carry(carry)?.into(),
        })
    }

    /// Apply a whole slice expression: the public entrypoint of the slice protocol.
    pub fn getitem(&self, slice: &Slice) -> RaggedResult<Item> {
        self.check_for_iteration()?;
        let next = RegularArray::try_new(Arc::new(self.clone()), self.len() as i64)?;
        let out = Content::Regular(next).getitem_next(
            slice.head(),
            slice.tail(),
            &Index64::empty(),
        )?;
        if out.len() == 0 {
            Ok(Item::Array(out.getitem_nothing()?))
        } else {
            out.getitem_at_nowrap(0)
        }
    }

    /// One step of the recursive descent: consume `head` at the current axis and
    /// recurse with `tail`; `advanced` carries the accumulated advanced index.
    pub fn getitem_next(
        &self,
        head: Option<&SliceItem>,
        tail: &[SliceItem],
        advanced: &Index64,
    ) -> RaggedResult<ContentRef> {
        let Some(item) = head else {
            return Ok(self.clone().into());
        };
        let (nexthead, nexttail) = (tail.first(), tail.get(1..).unwrap_or(&[]));
        match item {
            SliceItem::Ellipsis => self.getitem_next_ellipsis(tail, advanced),
            SliceItem::NewAxis => {
                let out = self.getitem_next(nexthead, nexttail, advanced)?;
                Ok(Content::Regular(RegularArray::try_new(out, 1)?).into())
            }
            SliceItem::Field(key) => {
                let next = self.getitem_field(key)?;
                next.getitem_next(nexthead, nexttail, advanced)
            }
            SliceItem::Fields(keys) => {
                let next = self.getitem_fields(keys)?;
                next.getitem_next(nexthead, nexttail, advanced)
            }
            SliceItem::Missing64(missing) => self.getitem_next_missing(missing, tail, advanced),
            SliceItem::At(_) | SliceItem::Range(_) | SliceItem::Array64(_)
            | SliceItem::Jagged64(_) => match self {
                Content::Empty(_) => match item {
                    SliceItem::At(at) => Err(ragged_err!(OutOfRange:
                        "index {at} out of range for EmptyArray of length 0")),
                    SliceItem::Range(_) => Ok(self.clone().into()),
                    SliceItem::Array64(a) if a.flat().is_empty() => Ok(self.clone().into()),
                    SliceItem::Array64(_) => Err(ragged_err!(OutOfRange:
                        "index out of range for EmptyArray of length 0")),
                    _ => Err(ragged_err!(TypeMismatch:
                        "cannot fit jagged slice into EmptyArray")),
                },
                Content::Numpy(x) => {
                    if x.ndim() > 1 {
                        x.to_regular()?.getitem_next(head, tail, advanced)
                    } else {
                        Err(ragged_err!(TypeMismatch: "too many dimensions in slice"))
                    }
                }
                Content::Regular(x) => x.getitem_next_structural(item, tail, advanced),
                Content::ListOffset(x) => x.getitem_next_structural(item, tail, advanced),
                Content::List(x) => x.getitem_next_structural(item, tail, advanced),
                Content::Indexed(x) => x.getitem_next_structural(item, tail, advanced),
                Content::IndexedOption(x) => x.getitem_next_structural(item, tail, advanced),
                Content::ByteMasked(x) => x.getitem_next_structural(item, tail, advanced),
                Content::BitMasked(x) => x.getitem_next_structural(item, tail, advanced),
                Content::Unmasked(x) => x.getitem_next_structural(item, tail, advanced),
                Content::Record(x) => x.getitem_next_structural(item, tail, advanced),
                Content::Union(x) => x.getitem_next_structural(item, tail, advanced),
            },
        }
    }

    fn getitem_next_ellipsis(
        &self,
        tail: &[SliceItem],
        advanced: &Index64,
    ) -> RaggedResult<ContentRef> {
        let (mindepth, maxdepth) = self.minmax_depth();
        let tail_dims = crate::slice::dimlength(tail);
        if tail.is_empty() || (mindepth - 1 == tail_dims && maxdepth - 1 == tail_dims) {
            self.getitem_next(tail.first(), tail.get(1..).unwrap_or(&[]), advanced)
        } else if mindepth - 1 > tail_dims && maxdepth - 1 > tail_dims {
            let mut items = Vec::with_capacity(tail.len() + 1);
            items.push(SliceItem::Ellipsis);
            items.extend_from_slice(tail);
            self.getitem_next(Some(&SliceItem::full_range()), &items, advanced)
        } else {
            Err(ragged_err!(TypeMismatch:
                "ellipsis (...) can't be used on a data structure of different depths"))
        }
    }

    fn getitem_next_missing(
        &self,
        missing: &SliceMissing64,
        tail: &[SliceItem],
        advanced: &Index64,
    ) -> RaggedResult<ContentRef> {
        if !advanced.is_empty() {
            ragged_bail!(TypeMismatch:
                "cannot mix missing values in slice with NumPy-style advanced indexing");
        }
        let out = self.getitem_next(Some(missing.content()), tail, advanced)?;
        match out.as_ref() {
            Content::Regular(r) => Ok(missing_wrap_regular(missing, r)?.into()),
            Content::Record(rec) => {
                let mut contents = Vec::with_capacity(rec.contents().len());
                for content in rec.contents() {
                    let Content::Regular(r) = content.as_ref() else {
                        ragged_bail!(
                            "getitem_next(missing) expected a regular layer in every record field"
                        );
                    };
                    contents.push(ContentRef::from(missing_wrap_regular(missing, r)?));
                }
                Ok(Content::Record(RecordArray::try_new_auto_length(
                    contents,
                    rec.recordlookup().map(|l| l.to_vec()),
                )?)
                .into())
            }
            other => Err(ragged_err!(
                "getitem_next(missing) expected a regular layer, got {}",
                other.class_name()
            )),
        }
    }

    /// Jagged descent: apply per-row `[slicestarts, slicestops)` windows of
    /// `slicecontent` at the current axis.
    pub fn getitem_next_jagged(
        &self,
        slicestarts: &Index64,
        slicestops: &Index64,
        slicecontent: &SliceItem,
        tail: &[SliceItem],
    ) -> RaggedResult<ContentRef> {
        match self {
            Content::Empty(_) => {
                if slicestarts.is_empty() {
                    Ok(self.clone().into())
                } else {
                    Err(ragged_err!(TypeMismatch:
                        "cannot fit jagged slice with length {} into EmptyArray",
                        slicestarts.len()))
                }
            }
            Content::Numpy(x) => {
                if x.ndim() > 1 {
                    x.to_regular()?
                        .getitem_next_jagged(slicestarts, slicestops, slicecontent, tail)
                } else {
                    Err(ragged_err!(TypeMismatch:
                        "too many jagged slice dimensions for array"))
                }
            }
            Content::Regular(x) => {
                x.getitem_next_jagged(slicestarts, slicestops, slicecontent, tail)
            }
            Content::ListOffset(x) => {
                x.getitem_next_jagged(slicestarts, slicestops, slicecontent, tail)
            }
            Content::List(x) => x.getitem_next_jagged(slicestarts, slicestops, slicecontent, tail),
            Content::Indexed(x) => {
                x.getitem_next_jagged(slicestarts, slicestops, slicecontent, tail)
            }
            Content::IndexedOption(x) => {
                x.getitem_next_jagged(slicestarts, slicestops, slicecontent, tail)
            }
            Content::ByteMasked(x) => {
                x.getitem_next_jagged(slicestarts, slicestops, slicecontent, tail)
            }
            Content::BitMasked(x) => {
                x.getitem_next_jagged(slicestarts, slicestops, slicecontent, tail)
            }
            Content::Unmasked(x) => {
                x.getitem_next_jagged(slicestarts, slicestops, slicecontent, tail)
            }
            Content::Record(x) => {
                x.getitem_next_jagged(slicestarts, slicestops, slicecontent, tail)
            }
            Content::Union(x) => x.getitem_next_jagged(slicestarts, slicestops, slicecontent, tail),
        }
    }

    /// Wrap an advanced-index result back through the slice array's shape.
    pub(crate) fn getitem_next_array_wrap(
        out: ContentRef,
        shape: &[i64],
    ) -> RaggedResult<ContentRef> {
        let mut content = Content::Regular(RegularArray::try_new(
            out,
            shape[shape.len() - 1],
        )?);
        for &dim in shape[..shape.len() - 1].iter().rev() {
            content = Content::Regular(RegularArray::try_new(content.into(), dim)?);
        }
        Ok(content.into())
    }

    /// A copy of the node sharing all buffers.
    pub fn shallow_copy(&self) -> Content {
        self.clone()
    }

    /// Canonicalize one option layer; non-option nodes pass through.
    pub fn simplify_optiontype(&self) -> RaggedResult<ContentRef> {
        match self {
            Content::Indexed(x) => x.simplify_optiontype(),
            Content::IndexedOption(x) => x.simplify_optiontype(),
            Content::ByteMasked(x) => x.simplify_optiontype(),
            Content::BitMasked(x) => x.simplify_optiontype(),
            Content::Unmasked(x) => x.simplify_optiontype(),
            _ => Ok(self.clone().into()),
        }
    }

    /// Canonicalize one union layer; non-union nodes pass through.
    pub fn simplify_uniontype(&self, allow_bool: bool) -> RaggedResult<ContentRef> {
        match self {
            Content::Union(x) => x.simplify_uniontype(allow_bool),
            _ => Ok(self.clone().into()),
        }
    }

    /// Canonicalize whichever of the two simplifications applies at this node.
    pub fn shallow_simplify(&self) -> RaggedResult<ContentRef> {
        match self {
            Content::Union(_) => self.simplify_uniontype(false),
            _ => self.simplify_optiontype(),
        }
    }

    /// Structural compatibility for concatenation without promotion to a union.
    pub fn mergeable(&self, other: &Content, allow_bool: bool) -> bool {
        if !self.parameters_equal(other) {
            return false;
        }
        match self {
            Content::Empty(_) => true,
            Content::Union(_) => true,
            Content::Indexed(x) => x.content().mergeable(other, allow_bool),
            Content::IndexedOption(x) => x.content().mergeable(other, allow_bool),
            Content::ByteMasked(x) => x.content().mergeable(other, allow_bool),
            Content::BitMasked(x) => x.content().mergeable(other, allow_bool),
            Content::Unmasked(x) => x.content().mergeable(other, allow_bool),
            _ => match other {
                Content::Empty(_) | Content::Union(_) => true,
                Content::Indexed(y) => self.mergeable(y.content(), allow_bool),
                Content::IndexedOption(y) => self.mergeable(y.content(), allow_bool),
                Content::ByteMasked(y) => self.mergeable(y.content(), allow_bool),
                Content::BitMasked(y) => self.mergeable(y.content(), allow_bool),
                Content::Unmasked(y) => self.mergeable(y.content(), allow_bool),
                _ => self.mergeable_same(other, allow_bool),
            },
        }
    }

    fn mergeable_same(&self, other: &Content, allow_bool: bool) -> bool {
        match (self, other) {
            (Content::Numpy(a), Content::Numpy(b)) => {
                if a.ndim() != b.ndim() {
                    return false;
                }
                match (a.ptype() == PType::Bool, b.ptype() == PType::Bool) {
                    (true, true) => true,
                    (false, false) => true,
                    _ => allow_bool,
                }
            }
            (
                Content::Regular(_) | Content::ListOffset(_) | Content::List(_),
                Content::Regular(_) | Content::ListOffset(_) | Content::List(_),
            ) => {
                let mine = self.list_content().ragged_expect("list nodes have content");
                let theirs = other.list_content().ragged_expect("list nodes have content");
                mine.mergeable(theirs.as_ref(), allow_bool)
            }
            (Content::Record(a), Content::Record(b)) => {
                if a.is_tuple() != b.is_tuple() {
                    return false;
                }
                if a.is_tuple() {
                    if a.numfields() != b.numfields() {
                        return false;
                    }
                    (0..a.numfields()).all(|i| {
                        a.contents()[i].mergeable(b.contents()[i].as_ref(), allow_bool)
                    })
                } else {
                    let mut mine = a.keys();
                    let mut theirs = b.keys();
                    mine.sort();
                    theirs.sort();
                    if mine != theirs {
                        return false;
                    }
                    mine.iter().all(|key| {
                        match (a.field(key), b.field(key)) {
                            (Ok(x), Ok(y)) => x.mergeable(y.as_ref(), allow_bool),
                            _ => false,
                        }
                    })
                }
            }
            _ => false,
        }
    }

    fn list_content(&self) -> Option<ContentRef> {
        match self {
            Content::Regular(x) => Some(x.content().clone()),
            Content::ListOffset(x) => Some(x.content().clone()),
            Content::List(x) => Some(x.content().clone()),
            _ => None,
        }
    }

    fn as_list_parts(&self) -> RaggedResult<Option<(Index64, Index64, ContentRef)>> {
        Ok(match self {
            Content::Regular(x) => {
                let lo = x.to_listoffset64()?;
                let offsets = lo.offsets().to64();
                Some((
                    offsets.slice(0, offsets.len() - 1),
                    offsets.slice(1, offsets.len()),
                    lo.content().clone(),
                ))
            }
            Content::ListOffset(x) => {
                let offsets = x.offsets().to64();
                Some((
                    offsets.slice(0, offsets.len() - 1),
                    offsets.slice(1, offsets.len()),
                    x.content().clone(),
                ))
            }
            Content::List(x) => Some((x.starts().to64(), x.stops().to64(), x.content().clone())),
            _ => None,
        })
    }

    /// Concatenation preserving order: `self` then `other`.
    pub fn merge(&self, other: &Content) -> RaggedResult<Content> {
        if !self.parameters_equal(other) {
            return self.merge_as_union(other);
        }
        if let Content::Numpy(x) = self {
            if x.ndim() > 1 {
                return x.to_regular()?.merge(other);
            }
        }
        if let Content::Numpy(y) = other {
            if y.ndim() > 1 {
                return self.merge(&y.to_regular()?);
            }
        }
        match self {
            Content::Empty(_) => Ok(other.clone()),
            Content::Indexed(x) => {
                if matches!(other, Content::Empty(_)) {
                    return Ok(self.clone());
                }
                if let Content::Union(u) = other {
                    return u.reverse_merge(self);
                }
                merge_index(&x.index().to64(), false, x.content(), other)
            }
            Content::IndexedOption(x) => {
                if matches!(other, Content::Empty(_)) {
                    return Ok(self.clone());
                }
                if let Content::Union(u) = other {
                    return u.reverse_merge(self);
                }
                merge_index(&x.index().to64(), true, x.content(), other)
            }
            Content::ByteMasked(x) => x.to_indexed_option64()?.to_content().merge(other),
            Content::BitMasked(x) => x.to_byte_masked()?.to_content().merge(other),
            Content::Unmasked(x) => x.to_indexed_option64()?.to_content().merge(other),
            Content::Union(x) => x.merge(other),
            _ => match other {
                Content::Empty(_) => Ok(self.clone()),
                Content::Indexed(y) => y.reverse_merge(self),
                Content::IndexedOption(y) => y.reverse_merge(self),
                Content::ByteMasked(y) => y.to_indexed_option64()?.reverse_merge(self),
                Content::BitMasked(y) => {
                    y.to_byte_masked()?.to_indexed_option64()?.reverse_merge(self)
                }
                Content::Unmasked(y) => y.to_indexed_option64()?.reverse_merge(self),
                Content::Union(y) => y.reverse_merge(self),
                _ => self.merge_same(other),
            },
        }
    }

    fn merge_same(&self, other: &Content) -> RaggedResult<Content> {
        if let (Content::Numpy(a), Content::Numpy(b)) = (self, other) {
            return Ok(Content::Numpy(a.merge_numpy(b)?));
        }
        if let (Some((mystarts, mystops, mycontent)), Some((theirstarts, theirstops, theircontent))) =
            (self.as_list_parts()?, other.as_list_parts()?)
        {
            let base = mycontent.len() as i64;
            let mut starts = Vec::with_capacity(mystarts.len() + theirstarts.len());
            let mut stops = Vec::with_capacity(mystops.len() + theirstops.len());
            starts.extend(mystarts.iter64());
            stops.extend(mystops.iter64());
            starts.extend(theirstarts.iter64().map(|s| s + base));
            stops.extend(theirstops.iter64().map(|s| s + base));
            let content = mycontent.merge(theircontent.as_ref())?;
            return Ok(Content::List(ListArray::try_new(
                Index64::from(starts).into(),
                Index64::from(stops).into(),
                content.into(),
            )?));
        }
        if let (Content::Record(a), Content::Record(b)) = (self, other) {
            if a.is_tuple() == b.is_tuple() && a.numfields() == 0 && b.numfields() == 0 {
                return Ok(Content::Record(RecordArray::try_new(
                    Vec::new(),
                    None,
                    a.len() + b.len(),
                )?));
            }
            let mergeable_records = self.mergeable_same(other, false);
            if !mergeable_records {
                ragged_bail!(TypeMismatch:
                    "cannot merge records or tuples with different fields");
            }
            let mut contents = Vec::with_capacity(a.numfields());
            for key in a.keys() {
                let mine = a.field(&key)?.getitem_range_nowrap(0, a.len() as i64)?;
                let theirs = b.field(&key)?.getitem_range_nowrap(0, b.len() as i64)?;
                contents.push(ContentRef::from(mine.merge(theirs.as_ref())?));
            }
            return Ok(Content::Record(RecordArray::try_new_auto_length(
                contents,
                a.recordlookup().map(|l| l.to_vec()),
            )?));
        }
        Err(ragged_err!(TypeMismatch:
            "cannot merge {} with {}", self.class_name(), other.class_name()))
    }

    /// The fallback concatenation: a two-branch union of `self` and `other`.
    pub fn merge_as_union(&self, other: &Content) -> RaggedResult<Content> {
        let mylength = self.len();
        let theirlength = other.len();
        let mut tags = Vec::with_capacity(mylength + theirlength);
        let mut index = Vec::with_capacity(mylength + theirlength);
        tags.extend(std::iter::repeat(0i8).take(mylength));
        index.extend(0..mylength as i64);
        tags.extend(std::iter::repeat(1i8).take(theirlength));
        index.extend(0..theirlength as i64);
        Ok(Content::Union(UnionArray::try_new(
            Index8::from(tags).into(),
            Index64::from(index).into(),
            vec![self.clone().into(), other.clone().into()],
        )?))
    }

    /// Concatenation with `self` appended after `other`; defined on the nodes that
    /// carry an outer index.
    pub fn reverse_merge(&self, other: &Content) -> RaggedResult<Content> {
        match self {
            Content::Indexed(x) => x.reverse_merge(other),
            Content::IndexedOption(x) => x.reverse_merge(other),
            Content::ByteMasked(x) => x.to_indexed_option64()?.reverse_merge(other),
            Content::BitMasked(x) => {
                x.to_byte_masked()?.to_indexed_option64()?.reverse_merge(other)
            }
            Content::Unmasked(x) => x.to_indexed_option64()?.reverse_merge(other),
            Content::Union(x) => x.reverse_merge(other),
            _ => Err(ragged_err!(UndefinedOperation:
                "{}::reverse_merge", self.class_name())),
        }
    }

    /// Length of axis `axis`: a scalar (or record of scalars) at axis 0, per-element
    /// counts below.
    pub fn num(&self, axis: i64) -> RaggedResult<Item> {
        let toaxis = self.wrap_axis(axis, 0)?;
        if toaxis == 0 {
            return match self {
                Content::Record(x) => {
                    let single = NumpyArray::from_vec(vec![x.len() as i64]).into_ref();
                    let contents = vec![single; x.numfields()];
                    let record = RecordArray::try_new(
                        contents,
                        x.recordlookup().map(|l| l.to_vec()),
                        1,
                    )?;
                    Content::Record(record).getitem_at_nowrap(0)
                }
                _ => Ok(Item::Scalar(ragged_dtype::PValue::I64(self.len() as i64))),
            };
        }
        Ok(Item::Array(self.num_at(toaxis, 0)?.into()))
    }

    /// `num` below axis 0; every node recursion goes through this form.
    pub(crate) fn num_at(&self, axis: i64, depth: i64) -> RaggedResult<Content> {
        match self {
            Content::Empty(_) => Err(ragged_err!(OutOfRange:
                "axis {axis} exceeds the depth of this array")),
            Content::Numpy(x) => {
                if x.ndim() > 1 {
                    x.to_regular()?.num_at(axis, depth)
                } else {
                    Err(ragged_err!(OutOfRange:
                        "axis {axis} exceeds the depth of this array"))
                }
            }
            Content::Regular(x) => x.num(axis, depth),
            Content::ListOffset(x) => x.num(axis, depth),
            Content::List(x) => x.num(axis, depth),
            Content::Indexed(x) => x.project()?.num_at(axis, depth),
            Content::IndexedOption(x) => x.num(axis, depth),
            Content::ByteMasked(x) => x.to_indexed_option64()?.num(axis, depth),
            Content::BitMasked(x) => x.to_indexed_option64()?.num(axis, depth),
            Content::Unmasked(x) => Ok(Content::Unmasked(UnmaskedArray::new(
                x.content().num_at(axis, depth)?.into(),
            ))),
            Content::Record(x) => x.num(axis, depth),
            Content::Union(x) => x.num(axis, depth),
        }
    }

    /// The offsets-plus-content pair behind `flatten`.
    pub fn offsets_and_flattened(&self, axis: i64, depth: i64) -> RaggedResult<(Index64, Content)> {
        match self {
            Content::Empty(_) => {
                let toaxis = self.wrap_axis(axis, depth)?;
                if toaxis == depth {
                    ragged_bail!(OutOfRange: "axis=0 not allowed for flatten");
                }
                Ok((Index64::empty(), self.clone()))
            }
            Content::Numpy(x) => {
                let toaxis = self.wrap_axis(axis, depth)?;
                if toaxis == depth {
                    ragged_bail!(OutOfRange: "axis=0 not allowed for flatten");
                }
                if x.ndim() > 1 {
                    x.to_regular()?.offsets_and_flattened(axis, depth)
                } else {
                    Err(ragged_err!(OutOfRange:
                        "axis {axis} exceeds the depth of this array"))
                }
            }
            Content::Regular(x) => x.offsets_and_flattened(axis, depth),
            Content::ListOffset(x) => x.offsets_and_flattened(axis, depth),
            Content::List(x) => x.offsets_and_flattened(axis, depth),
            Content::Indexed(x) => x.project()?.offsets_and_flattened(axis, depth),
            Content::IndexedOption(x) => x.offsets_and_flattened(axis, depth),
            Content::ByteMasked(x) => x.to_indexed_option64()?.offsets_and_flattened(axis, depth),
            Content::BitMasked(x) => x.to_indexed_option64()?.offsets_and_flattened(axis, depth),
            Content::Unmasked(x) => {
                let (offsets, flattened) = x.content().offsets_and_flattened(axis, depth)?;
                if offsets.is_empty() {
                    Ok((
                        Index64::empty(),
                        Content::Unmasked(UnmaskedArray::new(flattened.into())),
                    ))
                } else {
                    Ok((offsets, flattened))
                }
            }
            Content::Record(x) => x.offsets_and_flattened(axis, depth),
            Content::Union(x) => x.offsets_and_flattened(axis, depth),
        }
    }

    /// Remove one list level at `axis`.
    pub fn flatten(&self, axis: i64) -> RaggedResult<Content> {
        let (_, flattened) = self.offsets_and_flattened(axis, 0)?;
        Ok(flattened)
    }

    /// Replace every missing slot with `value` (a length-1 array).
    pub fn fillna(&self, value: &ContentRef) -> RaggedResult<Content> {
        match self {
            Content::Empty(x) => Ok(Content::Empty(x.clone())),
            Content::Numpy(x) => Ok(Content::Numpy(x.clone())),
            Content::Regular(x) => Ok(Content::Regular(RegularArray::try_new(
                x.content().fillna(value)?.into(),
                x.size(),
            )?)),
            Content::ListOffset(x) => x.fillna(value),
            Content::List(x) => x.fillna(value),
            Content::Indexed(x) => {
                let projected = x.project()?;
                projected.fillna(value)
            }
            Content::IndexedOption(x) => x.fillna(value),
            Content::ByteMasked(x) => x.to_indexed_option64()?.fillna(value),
            Content::BitMasked(x) => x.to_indexed_option64()?.fillna(value),
            Content::Unmasked(x) => x.content().fillna(value),
            Content::Record(x) => x.fillna(value),
            Content::Union(x) => x.fillna(value),
        }
    }

    /// The boolean missingness mask at `axis`.
    pub fn is_none(&self, axis: i64) -> RaggedResult<Content> {
        self.is_none_at(axis, 0)
    }

    pub(crate) fn is_none_at(&self, axis: i64, depth: i64) -> RaggedResult<Content> {
        match self {
            Content::Empty(_) => Ok(Content::Numpy(NumpyArray::from_bools(&[]))),
            Content::Numpy(x) => {
                let toaxis = self.wrap_axis(axis, depth)?;
                if toaxis == depth {
                    Ok(Content::Numpy(NumpyArray::from_bools(&vec![false; x.len()])))
                } else if x.ndim() > 1 {
                    x.to_regular()?.is_none_at(axis, depth)
                } else {
                    Err(ragged_err!(OutOfRange:
                        "axis {axis} exceeds the depth of this array"))
                }
            }
            Content::Regular(x) => {
                let toaxis = self.wrap_axis(axis, depth)?;
                if toaxis == depth {
                    Ok(Content::Numpy(NumpyArray::from_bools(&vec![false; x.len()])))
                } else {
                    Ok(Content::Regular(RegularArray::try_new(
                        x.content().is_none_at(axis, depth + 1)?.into(),
                        x.size(),
                    )?))
                }
            }
            Content::ListOffset(x) => x.is_none(axis, depth),
            Content::List(x) => x.is_none(axis, depth),
            Content::Indexed(x) => x.project()?.is_none_at(axis, depth),
            Content::IndexedOption(x) => x.is_none(axis, depth),
            Content::ByteMasked(x) => x.is_none(axis, depth),
            Content::BitMasked(x) => x.to_byte_masked()?.is_none(axis, depth),
            Content::Unmasked(x) => {
                let toaxis = self.wrap_axis(axis, depth)?;
                if toaxis == depth {
                    Ok(Content::Numpy(NumpyArray::from_bools(&vec![false; x.len()])))
                } else {
                    Ok(Content::Unmasked(UnmaskedArray::new(
                        x.content().is_none_at(axis, depth)?.into(),
                    )))
                }
            }
            Content::Record(x) => x.is_none(axis, depth),
            Content::Union(x) => x.is_none(axis, depth),
        }
    }

    /// Pad every list at `axis` to at least `target` elements with missing markers.
    pub fn pad(&self, target: i64, axis: i64) -> RaggedResult<Content> {
        self.rpad_at(target, axis, 0, false)
    }

    /// Pad and truncate every list at `axis` to exactly `target` elements.
    pub fn pad_and_clip(&self, target: i64, axis: i64) -> RaggedResult<Content> {
        self.rpad_at(target, axis, 0, true)
    }

    pub(crate) fn rpad_at(
        &self,
        target: i64,
        axis: i64,
        depth: i64,
        clip: bool,
    ) -> RaggedResult<Content> {
        match self {
            Content::Empty(_) => {
                let toaxis = self.wrap_axis(axis, depth)?;
                if toaxis == depth {
                    self.rpad_axis0(target, clip)
                } else {
                    Err(ragged_err!(OutOfRange:
                        "axis {axis} exceeds the depth of this array"))
                }
            }
            Content::Numpy(x) => {
                let toaxis = self.wrap_axis(axis, depth)?;
                if toaxis == depth {
                    self.rpad_axis0(target, clip)
                } else if x.ndim() > 1 {
                    x.to_regular()?.rpad_at(target, axis, depth, clip)
                } else {
                    Err(ragged_err!(OutOfRange:
                        "axis {axis} exceeds the depth of this array"))
                }
            }
            Content::Regular(x) => x.rpad(target, axis, depth, clip),
            Content::ListOffset(x) => x.rpad(target, axis, depth, clip),
            Content::List(x) => x.rpad(target, axis, depth, clip),
            Content::Indexed(x) => x.project()?.rpad_at(target, axis, depth, clip),
            Content::IndexedOption(x) => x.rpad(target, axis, depth, clip),
            Content::ByteMasked(x) => x.to_indexed_option64()?.rpad(target, axis, depth, clip),
            Content::BitMasked(x) => x.to_indexed_option64()?.rpad(target, axis, depth, clip),
            Content::Unmasked(x) => {
                let toaxis = self.wrap_axis(axis, depth)?;
                if toaxis == depth {
                    self.rpad_axis0(target, clip)
                } else {
                    Ok(Content::Unmasked(UnmaskedArray::new(
                        x.content().rpad_at(target, axis, depth, clip)?.into(),
                    )))
                }
            }
            Content::Record(x) => x.rpad(target, axis, depth, clip),
            Content::Union(x) => x.rpad(target, axis, depth, clip),
        }
    }

    /// Pad the outermost axis by appending missing markers.
    pub(crate) fn rpad_axis0(&self, target: i64, clip: bool) -> RaggedResult<Content> {
        if !clip && target <= self.len() as i64 {
            return Ok(self.clone());
        }
        let index = kernels::index_rpad_axis0(self.len() as i64, target, clip);
        let option =
            IndexedOptionArray::try_new(Index64::from(index).into(), self.clone().into())?;
        Ok(Content::IndexedOption(option)
            .simplify_optiontype()?
            .as_ref()
            .clone())
    }

    /// Per-element indexes at `axis`.
    pub fn local_index(&self, axis: i64) -> RaggedResult<Content> {
        let toaxis = self.wrap_axis(axis, 0)?;
        if toaxis == 0 {
            return Ok(self.localindex_axis0());
        }
        self.localindex_at(toaxis, 0)
    }

    pub(crate) fn localindex_axis0(&self) -> Content {
        Content::Numpy(NumpyArray::from_vec(
            (0..self.len() as i64).collect::<Vec<_>>(),
        ))
    }

    pub(crate) fn localindex_at(&self, axis: i64, depth: i64) -> RaggedResult<Content> {
        match self {
            Content::Empty(_) => Err(ragged_err!(OutOfRange:
                "axis {axis} exceeds the depth of this array")),
            Content::Numpy(x) => {
                if x.ndim() > 1 {
                    x.to_regular()?.localindex_at(axis, depth)
                } else {
                    Err(ragged_err!(OutOfRange:
                        "axis {axis} exceeds the depth of this array"))
                }
            }
            Content::Regular(x) => x.localindex(axis, depth),
            Content::ListOffset(x) => x.localindex(axis, depth),
            Content::List(x) => x.localindex(axis, depth),
            Content::Indexed(x) => x.project()?.localindex_at(axis, depth),
            Content::IndexedOption(x) => x.localindex(axis, depth),
            Content::ByteMasked(x) => x.to_indexed_option64()?.localindex(axis, depth),
            Content::BitMasked(x) => x.to_indexed_option64()?.localindex(axis, depth),
            Content::Unmasked(x) => Ok(Content::Unmasked(UnmaskedArray::new(
                x.content().localindex_at(axis, depth)?.into(),
            ))),
            Content::Record(x) => x.localindex(axis, depth),
            Content::Union(x) => x.localindex(axis, depth),
        }
    }

    /// All n-combinations of elements at `axis`, as records of picked elements.
    pub fn combinations(
        &self,
        n: usize,
        replacement: bool,
        recordlookup: Option<Vec<String>>,
        parameters: &Parameters,
        axis: i64,
    ) -> RaggedResult<Content> {
        if n < 1 {
            ragged_bail!(OutOfRange: "in combinations, 'n' must be at least 1");
        }
        if let Some(lookup) = &recordlookup {
            if lookup.len() != n {
                ragged_bail!(TypeMismatch:
                    "recordlookup of {} names cannot label {n}-combinations", lookup.len());
            }
        }
        let toaxis = self.wrap_axis(axis, 0)?;
        if toaxis == 0 {
            return self.combinations_axis0(n, replacement, recordlookup, parameters);
        }
        self.combinations_at(n, replacement, recordlookup, parameters, toaxis, 0)
    }

    pub(crate) fn combinations_axis0(
        &self,
        n: usize,
        replacement: bool,
        recordlookup: Option<Vec<String>>,
        parameters: &Parameters,
    ) -> RaggedResult<Content> {
        let columns = kernels::axis0_combinations(self.len() as i64, n, replacement);
        let total = columns.first().map(|c| c.len()).unwrap_or(0);
        let contents: Vec<ContentRef> = columns
            .into_iter()
            .map(|col| self.carry(&Index64::from(col)))
            .collect::<RaggedResult<_>>()?;
        Ok(Content::Record(
            RecordArray::try_new(contents, recordlookup, total)?
                .with_parameters(parameters.clone()),
        ))
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn combinations_at(
        &self,
        n: usize,
        replacement: bool,
        recordlookup: Option<Vec<String>>,
        parameters: &Parameters,
        axis: i64,
        depth: i64,
    ) -> RaggedResult<Content> {
        match self {
            Content::Empty(_) => Err(ragged_err!(OutOfRange:
                "axis {axis} exceeds the depth of this array")),
            Content::Numpy(x) => {
                if x.ndim() > 1 {
                    x.to_regular()?
                        .combinations_at(n, replacement, recordlookup, parameters, axis, depth)
                } else {
                    Err(ragged_err!(OutOfRange:
                        "axis {axis} exceeds the depth of this array"))
                }
            }
            Content::Regular(x) => {
                x.combinations(n, replacement, recordlookup, parameters, axis, depth)
            }
            Content::ListOffset(x) => {
                x.combinations(n, replacement, recordlookup, parameters, axis, depth)
            }
            Content::List(x) => {
                x.combinations(n, replacement, recordlookup, parameters, axis, depth)
            }
            Content::Indexed(x) => x
                .project()?
                .combinations_at(n, replacement, recordlookup, parameters, axis, depth),
            Content::IndexedOption(x) => {
                x.combinations(n, replacement, recordlookup, parameters, axis, depth)
            }
            Content::ByteMasked(x) => x
                .to_indexed_option64()?
                .combinations(n, replacement, recordlookup, parameters, axis, depth),
            Content::BitMasked(x) => x
                .to_indexed_option64()?
                .combinations(n, replacement, recordlookup, parameters, axis, depth),
            Content::Unmasked(x) => Ok(Content::Unmasked(UnmaskedArray::new(
                x.content()
                    .combinations_at(n, replacement, recordlookup, parameters, axis, depth)?
                    .into(),
            ))),
            Content::Record(x) => {
                x.combinations(n, replacement, recordlookup, parameters, axis, depth)
            }
            Content::Union(x) => {
                x.combinations(n, replacement, recordlookup, parameters, axis, depth)
            }
        }
    }

    /// Reduce along `axis` with the given reducer.
    pub fn reduce(
        &self,
        reducer: &dyn Reducer,
        axis: i64,
        mask: bool,
        keepdims: bool,
    ) -> RaggedResult<Item> {
        let (branch, depth) = self.branch_depth();
        if branch {
            ragged_bail!(TypeMismatch:
                "cannot reduce a structure whose branches disagree on depth");
        }
        let toaxis = self.wrap_axis(axis, 0)?;
        if toaxis >= depth {
            ragged_bail!(OutOfRange:
                "axis {axis} exceeds the depth of this array ({depth})");
        }
        let negaxis = depth - toaxis;
        let starts = Index64::from(vec![0i64]);
        let parents = Index64::zeroed(self.len());
        let out = self.reduce_next(reducer, negaxis, &starts, &parents, 1, mask, keepdims)?;
        out.getitem_at_nowrap(0)
    }

    /// The recursive reducer protocol: `starts`/`parents` encode parent groupings for
    /// segment-reduction into `outlength` groups.
    #[allow(clippy::too_many_arguments)]
    pub fn reduce_next(
        &self,
        reducer: &dyn Reducer,
        negaxis: i64,
        starts: &Index64,
        parents: &Index64,
        outlength: i64,
        mask: bool,
        keepdims: bool,
    ) -> RaggedResult<Content> {
        match self {
            Content::Empty(_) => Content::Numpy(NumpyArray::from_vec(Vec::<f64>::new()))
                .reduce_next(reducer, negaxis, starts, parents, outlength, mask, keepdims),
            Content::Numpy(x) => {
                if x.ndim() > 1 {
                    return x.to_regular()?.reduce_next(
                        reducer, negaxis, starts, parents, outlength, mask, keepdims,
                    );
                }
                let contiguous = x.to_contiguous();
                let out = reducer.apply(&contiguous, parents, outlength)?;
                let mut result = Content::Numpy(out);
                if mask {
                    let mut counts = vec![0i64; outlength as usize];
                    for &p in parents.as_slice() {
                        counts[p as usize] += 1;
                    }
                    let maskbytes: Vec<i8> = counts.iter().map(|&c| (c == 0) as i8).collect();
                    result = Content::ByteMasked(ByteMaskedArray::try_new(
                        Index8::from(maskbytes),
                        result.into(),
                        false,
                    )?);
                }
                if keepdims {
                    result = Content::Regular(RegularArray::try_new(result.into(), 1)?);
                }
                Ok(result)
            }
            Content::Regular(x) => {
                x.reduce_next(reducer, negaxis, starts, parents, outlength, mask, keepdims)
            }
            Content::ListOffset(x) => {
                x.reduce_next(reducer, negaxis, starts, parents, outlength, mask, keepdims)
            }
            Content::List(x) => {
                x.reduce_next(reducer, negaxis, starts, parents, outlength, mask, keepdims)
            }
            Content::Indexed(x) => x.project()?.reduce_next(
                reducer, negaxis, starts, parents, outlength, mask, keepdims,
            ),
            Content::IndexedOption(x) => {
                x.reduce_next(reducer, negaxis, starts, parents, outlength, mask, keepdims)
            }
            Content::ByteMasked(x) => {
                x.reduce_next(reducer, negaxis, starts, parents, outlength, mask, keepdims)
            }
            Content::BitMasked(x) => x.to_byte_masked()?.reduce_next(
                reducer, negaxis, starts, parents, outlength, mask, keepdims,
            ),
            Content::Unmasked(x) => x.content().reduce_next(
                reducer, negaxis, starts, parents, outlength, mask, keepdims,
            ),
            Content::Record(x) => {
                x.reduce_next(reducer, negaxis, starts, parents, outlength, mask, keepdims)
            }
            Content::Union(x) => {
                x.reduce_next(reducer, negaxis, starts, parents, outlength, mask, keepdims)
            }
        }
    }

    /// A validity sweep: `None` when the whole tree satisfies its invariants, or a
    /// path-prefixed message.
    pub fn validity_error(&self, path: &str) -> Option<String> {
        match self {
            Content::Empty(_) | Content::Numpy(_) => None,
            Content::Regular(x) => x.validity_error(path),
            Content::ListOffset(x) => x.validity_error(path),
            Content::List(x) => x.validity_error(path),
            Content::Indexed(x) => x.validity_error(path),
            Content::IndexedOption(x) => x.validity_error(path),
            Content::ByteMasked(x) => x.validity_error(path),
            Content::BitMasked(x) => x.validity_error(path),
            Content::Unmasked(x) => x.validity_error(path),
            Content::Record(x) => x.validity_error(path),
            Content::Union(x) => x.validity_error(path),
        }
    }

    /// Emit this array's JSON events.
    pub fn tojson_part(
        &self,
        builder: &mut JsonBuilder,
        include_beginendlist: bool,
    ) -> RaggedResult<()> {
        self.check_for_iteration()?;
        match self {
            Content::Numpy(x) => x.tojson_part(builder, include_beginendlist),
            Content::Record(x) => x.tojson_part(builder, include_beginendlist),
            _ => {
                if include_beginendlist {
                    builder.begin_list();
                }
                for i in 0..self.len() {
                    self.getitem_at_nowrap(i as i64)?.tojson_part(builder)?;
                }
                if include_beginendlist {
                    builder.end_list()?;
                }
                Ok(())
            }
        }
    }

    /// This array as a JSON value: `null` for missing, arrays and objects for lists
    /// and records.
    pub fn to_json(&self) -> RaggedResult<serde_json::Value> {
        let mut builder = JsonBuilder::new();
        self.tojson_part(&mut builder, true)?;
        builder.finish()
    }

    /// A human-readable XML-ish dump.
    pub fn tostring_part(&self, indent: &str, pre: &str, post: &str) -> String {
        match self {
            Content::Empty(_) => format!("{indent}{pre}<EmptyArray/>{post}"),
            Content::Numpy(x) => x.tostring_part(indent, pre, post),
            Content::Regular(x) => x.tostring_part(indent, pre, post),
            Content::ListOffset(x) => x.tostring_part(indent, pre, post),
            Content::List(x) => x.tostring_part(indent, pre, post),
            Content::Indexed(x) => x.tostring_part(indent, pre, post),
            Content::IndexedOption(x) => x.tostring_part(indent, pre, post),
            Content::ByteMasked(x) => x.tostring_part(indent, pre, post),
            Content::BitMasked(x) => x.tostring_part(indent, pre, post),
            Content::Unmasked(x) => x.tostring_part(indent, pre, post),
            Content::Record(x) => x.tostring_part(indent, pre, post),
            Content::Union(x) => x.tostring_part(indent, pre, post),
        }
    }

    /// Reinterpret this array as a slice item: integer leaves become array slices,
    /// option-of-integer becomes a missing slice, list-of-integer becomes a jagged
    /// slice, boolean leaves become the positions of their set elements.
    pub fn as_slice_item(&self) -> RaggedResult<SliceItem> {
        match self {
            Content::Empty(_) => Ok(SliceItem::array(Vec::new())),
            Content::Numpy(x) => {
                if x.ndim() != 1 {
                    let regular = x.to_regular()?;
                    return regular.as_slice_item();
                }
                if x.ptype() == PType::Bool {
                    let positions: Vec<i64> = (0..x.len())
                        .filter(|&i| x.pvalue_at(i) == ragged_dtype::PValue::Bool(true))
                        .map(|i| i as i64)
                        .collect();
                    return Ok(SliceItem::array(positions));
                }
                if !x.ptype().is_int() {
                    ragged_bail!(TypeMismatch:
                        "cannot use a {} leaf as a slice", x.ptype());
                }
                let values: Vec<i64> = (0..x.len())
                    .map(|i| x.pvalue_at(i).as_i64())
                    .collect::<RaggedResult<_>>()?;
                Ok(SliceItem::array(values))
            }
            Content::Regular(x) => x.to_listoffset64()?.to_content().as_slice_item(),
            Content::ListOffset(x) => {
                let compact = x.to_listoffset64(true)?;
                let offsets = compact.offsets().to64();
                let inner = compact.content().as_slice_item()?;
                Ok(SliceItem::Jagged64(SliceJagged64::try_new(offsets, inner)?))
            }
            Content::List(x) => x.broadcast_tooffsets64()?.to_content().as_slice_item(),
            Content::Indexed(x) => x.project()?.as_slice_item(),
            Content::IndexedOption(x) => {
                let values: Vec<Option<i64>> = (0..x.len())
                    .map(|i| match x.item_at(i)? {
                        Item::Null => Ok(None),
                        Item::Scalar(v) => v.as_i64().map(Some),
                        _ => Err(ragged_err!(TypeMismatch:
                            "cannot use missing non-integer values as a slice")),
                    })
                    .collect::<RaggedResult<_>>()?;
                Ok(SliceItem::missing(&values))
            }
            Content::ByteMasked(x) => {
                x.to_indexed_option64()?.to_content().as_slice_item()
            }
            Content::BitMasked(x) => x.to_indexed_option64()?.to_content().as_slice_item(),
            Content::Unmasked(x) => x.content().as_slice_item(),
            Content::Union(x) => {
                let simplified = x.simplify_uniontype(false)?;
                if matches!(simplified.as_ref(), Content::Union(_)) {
                    ragged_bail!(TypeMismatch:
                        "cannot use a union of different types as a slice");
                }
                simplified.as_slice_item()
            }
            Content::Record(_) => Err(ragged_err!(TypeMismatch:
                "cannot use records as a slice")),
        }
    }

    /// Total bytes of the distinct buffers reachable from this tree.
    pub fn nbytes(&self) -> usize {
        let mut extents: BTreeMap<usize, usize> = BTreeMap::new();
        self.nbytes_part(&mut extents);
        extents.values().sum()
    }

    fn record_extent(extents: &mut BTreeMap<usize, usize>, extent: (usize, usize)) {
        let (addr, bytes) = extent;
        let entry = extents.entry(addr).or_insert(0);
        *entry = (*entry).max(bytes);
    }

    fn nbytes_part(&self, extents: &mut BTreeMap<usize, usize>) {
        if let Some(ids) = self.identities() {
            Self::record_extent(
                extents,
                (
                    ids.data().as_slice().as_ptr() as usize,
                    ids.data().len() * size_of::<i64>(),
                ),
            );
        }
        match self {
            Content::Empty(_) => {}
            Content::Numpy(x) => {
                Self::record_extent(
                    extents,
                    (x.data().as_slice().as_ptr() as usize, x.data().len()),
                );
            }
            Content::Regular(x) => x.content().nbytes_part(extents),
            Content::ListOffset(x) => {
                Self::record_extent(extents, x.offsets().data_extent());
                x.content().nbytes_part(extents);
            }
            Content::List(x) => {
                Self::record_extent(extents, x.starts().data_extent());
                Self::record_extent(extents, x.stops().data_extent());
                x.content().nbytes_part(extents);
            }
            Content::Indexed(x) => {
                Self::record_extent(extents, x.index().data_extent());
                x.content().nbytes_part(extents);
            }
            Content::IndexedOption(x) => {
                Self::record_extent(extents, x.index().data_extent());
                x.content().nbytes_part(extents);
            }
            Content::ByteMasked(x) => {
                Self::record_extent(extents, x.mask().data_extent());
                x.content().nbytes_part(extents);
            }
            Content::BitMasked(x) => {
                Self::record_extent(extents, x.mask().data_extent());
                x.content().nbytes_part(extents);
            }
            Content::Unmasked(x) => x.content().nbytes_part(extents),
            Content::Record(x) => {
                for content in x.contents() {
                    content.nbytes_part(extents);
                }
            }
            Content::Union(x) => {
                Self::record_extent(extents, x.tags().data_extent());
                Self::record_extent(extents, x.index().data_extent());
                for content in x.contents() {
                    content.nbytes_part(extents);
                }
            }
        }
    }
}

impl Content {
    /// Rebuild the tree with the given identity table assigned at the root and
    /// compatible child tables derived down every branch (or cleared where provenance
    /// cannot be kept unique). Passing `None` clears identities everywhere.
    pub fn with_identities(&self, identities: Option<Identities>) -> RaggedResult<Content> {
        if let Some(ids) = &identities {
            if ids.len() != self.len() {
                ragged_bail!("content and its identities must have the same length");
            }
        }
        self.rebuild_identities(identities.map(Arc::new))
    }

    /// Seed a fresh root identity table (`row i = [i]`) and propagate it.
    pub fn assign_identities(&self) -> RaggedResult<Content> {
        self.with_identities(Some(Identities::new_arange(self.len())))
    }

    fn child_with_identities(
        child: &ContentRef,
        derived: Option<Identities>,
    ) -> RaggedResult<ContentRef> {
        match derived {
            Some(ids) if ids.len() == child.len() => Ok(child.with_identities(Some(ids))?.into()),
            Some(_) | None => {
                log::debug!("identity propagation dropped at a {}", child.class_name());
                Ok(child.with_identities(None)?.into())
            }
        }
    }

    fn rebuild_identities(&self, ids: Option<Arc<Identities>>) -> RaggedResult<Content> {
        Ok(match self {
            Content::Empty(x) => {
                let mut out = x.clone();
                out.identities = ids;
                Content::Empty(out)
            }
            Content::Numpy(x) => {
                let mut out = x.clone();
                out.identities = ids;
                Content::Numpy(out)
            }
            Content::Regular(x) => {
                let derived = ids.as_ref().and_then(|parent| {
                    kernels::identities_from_regular(
                        parent,
                        x.size() as usize,
                        x.content().len(),
                    )
                });
                let child = Self::child_with_identities(x.content(), derived)?;
                let mut out = RegularArray::try_new(child, x.size())?;
                out.parameters = x.parameters.clone();
                out.identities = ids;
                Content::Regular(out)
            }
            Content::ListOffset(x) => {
                let offsets = x.offsets().to64();
                let derived = ids.as_ref().and_then(|parent| {
                    kernels::identities_from_list(
                        parent,
                        &offsets.as_slice()[..x.len()],
                        &offsets.as_slice()[1..],
                        x.content().len(),
                    )
                });
                let child = Self::child_with_identities(x.content(), derived)?;
                let mut out = ListOffsetArray::try_new(x.offsets().clone(), child)?;
                out.parameters = x.parameters.clone();
                out.identities = ids;
                Content::ListOffset(out)
            }
            Content::List(x) => {
                let starts = x.starts().to64();
                let stops = x.stops().to64();
                let derived = ids.as_ref().and_then(|parent| {
                    kernels::identities_from_list(
                        parent,
                        starts.as_slice(),
                        &stops.as_slice()[..starts.len()],
                        x.content().len(),
                    )
                });
                let child = Self::child_with_identities(x.content(), derived)?;
                let mut out =
                    ListArray::try_new(x.starts().clone(), x.stops().clone(), child)?;
                out.parameters = x.parameters.clone();
                out.identities = ids;
                Content::List(out)
            }
            Content::Indexed(x) => {
                let index = x.index().to64();
                let derived = ids.as_ref().and_then(|parent| {
                    kernels::identities_from_indexed(parent, index.as_slice(), x.content().len())
                });
                let child = Self::child_with_identities(x.content(), derived)?;
                let mut out = IndexedArray::try_new(x.index().clone(), child)?;
                out.parameters = x.parameters.clone();
                out.identities = ids;
                Content::Indexed(out)
            }
            Content::IndexedOption(x) => {
                let index = x.index().to64();
                let derived = ids.as_ref().and_then(|parent| {
                    kernels::identities_from_indexed(parent, index.as_slice(), x.content().len())
                });
                let child = Self::child_with_identities(x.content(), derived)?;
                let mut out = IndexedOptionArray::try_new(x.index().clone(), child)?;
                out.parameters = x.parameters.clone();
                out.identities = ids;
                Content::IndexedOption(out)
            }
            Content::ByteMasked(x) => {
                let aligned = Index64::arange(x.len());
                let derived = ids.as_ref().and_then(|parent| {
                    kernels::identities_from_indexed(parent, aligned.as_slice(), x.content().len())
                });
                let child = Self::child_with_identities(x.content(), derived)?;
                let mut out = ByteMaskedArray::try_new(x.mask().clone(), child, x.valid_when())?;
                out.parameters = x.parameters.clone();
                out.identities = ids;
                Content::ByteMasked(out)
            }
            Content::BitMasked(x) => {
                let aligned = Index64::arange(x.len());
                let derived = ids.as_ref().and_then(|parent| {
                    kernels::identities_from_indexed(parent, aligned.as_slice(), x.content().len())
                });
                let child = Self::child_with_identities(x.content(), derived)?;
                let mut out = BitMaskedArray::try_new(
                    x.mask().clone(),
                    child,
                    x.valid_when(),
                    x.len(),
                    x.lsb_order(),
                )?;
                out.parameters = x.parameters.clone();
                out.identities = ids;
                Content::BitMasked(out)
            }
            Content::Unmasked(x) => {
                let aligned = Index64::arange(x.len());
                let derived = ids.as_ref().and_then(|parent| {
                    kernels::identities_from_indexed(parent, aligned.as_slice(), x.content().len())
                });
                let child = Self::child_with_identities(x.content(), derived)?;
                let mut out = UnmaskedArray::new(child);
                out.parameters = x.parameters.clone();
                out.identities = ids;
                Content::Unmasked(out)
            }
            Content::Record(x) => {
                let mut contents = Vec::with_capacity(x.numfields());
                for (key, content) in x.field_items() {
                    let derived = ids
                        .as_ref()
                        .map(|parent| kernels::identities_for_field(parent, &key));
                    contents.push(Self::child_with_identities(&content, derived)?);
                }
                let mut out = RecordArray::try_new(
                    contents,
                    x.recordlookup().map(|l| l.to_vec()),
                    x.len(),
                )?;
                out.parameters = x.parameters.clone();
                out.identities = ids;
                Content::Record(out)
            }
            Content::Union(x) => {
                let index = x.index().to64();
                let mut contents = Vec::with_capacity(x.numcontents());
                for (which, content) in x.contents().iter().enumerate() {
                    let derived = ids.as_ref().and_then(|parent| {
                        kernels::identities_from_union(
                            parent,
                            x.tags().as_slice(),
                            index.as_slice(),
                            which as i64,
                            content.len(),
                        )
                    });
                    contents.push(Self::child_with_identities(content, derived)?);
                }
                let mut out = UnionArray::try_new(
                    crate::AnyIndex::I8(x.tags().clone()),
                    x.index().clone(),
                    contents,
                )?;
                out.parameters = x.parameters.clone();
                out.identities = ids;
                Content::Union(out)
            }
        })
    }

    /// A copy of the tree; `copy_arrays` copies leaf data buffers, `copy_indexes`
    /// copies index buffers, `copy_identities` copies identity tables.
    pub fn deep_copy(
        &self,
        copy_arrays: bool,
        copy_indexes: bool,
        copy_identities: bool,
    ) -> RaggedResult<Content> {
        let copy_index = |index: &crate::AnyIndex| {
            if copy_indexes {
                index.deep_copy()
            } else {
                index.clone()
            }
        };
        let copy_ids = |ids: &Option<Arc<Identities>>| {
            ids.as_ref().map(|i| {
                if copy_identities {
                    Arc::new(i.as_ref().deep_copy())
                } else {
                    i.clone()
                }
            })
        };
        Ok(match self {
            Content::Empty(x) => {
                let mut out = x.clone();
                out.identities = copy_ids(&x.identities);
                Content::Empty(out)
            }
            Content::Numpy(x) => {
                let mut out = if copy_arrays { x.deep_copy_data() } else { x.clone() };
                out.identities = copy_ids(&x.identities);
                Content::Numpy(out)
            }
            Content::Regular(x) => {
                let child = x.content().deep_copy(copy_arrays, copy_indexes, copy_identities)?;
                let mut out = RegularArray::try_new(child.into(), x.size())?;
                out.parameters = x.parameters.clone();
                out.identities = copy_ids(&x.identities);
                Content::Regular(out)
            }
            Content::ListOffset(x) => {
                let child = x.content().deep_copy(copy_arrays, copy_indexes, copy_identities)?;
                let mut out = ListOffsetArray::try_new(copy_index(x.offsets()), child.into())?;
                out.parameters = x.parameters.clone();
                out.identities = copy_ids(&x.identities);
                Content::ListOffset(out)
            }
            Content::List(x) => {
                let child = x.content().deep_copy(copy_arrays, copy_indexes, copy_identities)?;
                let mut out = ListArray::try_new(
                    copy_index(x.starts()),
                    copy_index(x.stops()),
                    child.into(),
                )?;
                out.parameters = x.parameters.clone();
                out.identities = copy_ids(&x.identities);
                Content::List(out)
            }
            Content::Indexed(x) => {
                let child = x.content().deep_copy(copy_arrays, copy_indexes, copy_identities)?;
                let mut out = IndexedArray::try_new(copy_index(x.index()), child.into())?;
                out.parameters = x.parameters.clone();
                out.identities = copy_ids(&x.identities);
                Content::Indexed(out)
            }
            Content::IndexedOption(x) => {
                let child = x.content().deep_copy(copy_arrays, copy_indexes, copy_identities)?;
                let mut out = IndexedOptionArray::try_new(copy_index(x.index()), child.into())?;
                out.parameters = x.parameters.clone();
                out.identities = copy_ids(&x.identities);
                Content::IndexedOption(out)
            }
            Content::ByteMasked(x) => {
                let child = x.content().deep_copy(copy_arrays, copy_indexes, copy_identities)?;
                let mask = if copy_indexes { x.mask().deep_copy() } else { x.mask().clone() };
                let mut out = ByteMaskedArray::try_new(mask, child.into(), x.valid_when())?;
                out.parameters = x.parameters.clone();
                out.identities = copy_ids(&x.identities);
                Content::ByteMasked(out)
            }
            Content::BitMasked(x) => {
                let child = x.content().deep_copy(copy_arrays, copy_indexes, copy_identities)?;
                let mask = if copy_indexes { x.mask().deep_copy() } else { x.mask().clone() };
                let mut out = BitMaskedArray::try_new(
                    mask,
                    child.into(),
                    x.valid_when(),
                    x.len(),
                    x.lsb_order(),
                )?;
                out.parameters = x.parameters.clone();
                out.identities = copy_ids(&x.identities);
                Content::BitMasked(out)
            }
            Content::Unmasked(x) => {
                let child = x.content().deep_copy(copy_arrays, copy_indexes, copy_identities)?;
                let mut out = UnmaskedArray::new(child.into());
                out.parameters = x.parameters.clone();
                out.identities = copy_ids(&x.identities);
                Content::Unmasked(out)
            }
            Content::Record(x) => {
                let contents = x
                    .contents()
                    .iter()
                    .map(|c| {
                        c.deep_copy(copy_arrays, copy_indexes, copy_identities)
                            .map(ContentRef::from)
                    })
                    .collect::<RaggedResult<_>>()?;
                let mut out = RecordArray::try_new(
                    contents,
                    x.recordlookup().map(|l| l.to_vec()),
                    x.len(),
                )?;
                out.parameters = x.parameters.clone();
                out.identities = copy_ids(&x.identities);
                Content::Record(out)
            }
            Content::Union(x) => {
                let contents = x
                    .contents()
                    .iter()
                    .map(|c| {
                        c.deep_copy(copy_arrays, copy_indexes, copy_identities)
                            .map(ContentRef::from)
                    })
                    .collect::<RaggedResult<_>>()?;
                let tags = if copy_indexes {
                    x.tags().deep_copy()
                } else {
                    x.tags().clone()
                };
                let mut out = UnionArray::try_new(
                    crate::AnyIndex::I8(tags),
                    copy_index(x.index()),
                    contents,
                )?;
                out.parameters = x.parameters.clone();
                out.identities = copy_ids(&x.identities);
                Content::Union(out)
            }
        })
    }
}

/// Tile a missing-slice's option routing across the rows of a regular result and wrap
/// the option at the picked axis.
fn missing_wrap_regular(
    missing: &SliceMissing64,
    regular: &RegularArray,
) -> RaggedResult<Content> {
    let rows = regular.len() as i64;
    let picks_per_row = regular.size();
    let mut index = Vec::with_capacity((rows as usize) * missing.index().len());
    for row in 0..rows {
        for m in missing.index().iter64() {
            index.push(if m < 0 { -1 } else { m + row * picks_per_row });
        }
    }
    let option =
        IndexedOptionArray::try_new(Index64::from(index).into(), regular.content().clone())?;
    let inner = Content::IndexedOption(option).simplify_optiontype()?;
    Ok(Content::Regular(RegularArray::try_new(
        inner,
        missing.index().len() as i64,
    )?))
}

impl Display for Content {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tostring_part("", "", ""))
    }
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;

    use crate::*;

    fn list_of_records() -> Content {
        // [[{x:1,y:10},{x:2,y:20}], [], [{x:3,y:30},{x:4,y:40},{x:5,y:50}]]
        let record = RecordArray::try_new(
            vec![
                NumpyArray::from_buffer(buffer![1i64, 2, 3, 4, 5]).into_ref(),
                NumpyArray::from_buffer(buffer![10i64, 20, 30, 40, 50]).into_ref(),
            ],
            Some(vec!["x".to_string(), "y".to_string()]),
            5,
        )
        .unwrap();
        Content::ListOffset(
            ListOffsetArray::try_new(buffer![0i64, 2, 2, 5].into(), record.into_ref()).unwrap(),
        )
    }

    #[test]
    fn slice_through_list_of_records() {
        let out = list_of_records()
            .getitem(&Slice::new(vec![SliceItem::at(2), SliceItem::field("y")]).unwrap())
            .unwrap();
        assert_eq!(
            out.as_array().unwrap().to_json().unwrap().to_string(),
            "[30,40,50]"
        );
    }

    #[test]
    fn range_round_trip() {
        let layout = list_of_records();
        let all = layout.getitem_range(None, None).unwrap();
        assert_eq!(
            all.to_json().unwrap().to_string(),
            layout.to_json().unwrap().to_string()
        );
    }

    #[test]
    fn carry_permutes_elements() {
        let layout = list_of_records();
        let idx = Index64::from(vec![2i64, 0]);
        let carried = layout.carry(&idx).unwrap();
        assert_eq!(carried.len(), idx.len());
        for (i, &j) in idx.as_slice().iter().enumerate() {
            assert_eq!(
                carried.getitem_at(i as i64).unwrap().to_json().unwrap(),
                layout.getitem_at(j).unwrap().to_json().unwrap()
            );
        }
    }

    #[test]
    fn jagged_slice() {
        // [[10,20,30],[],[40,50]] sliced by [[0,2],[],[0]]
        let layout = Content::ListOffset(
            ListOffsetArray::try_new(
                buffer![0i64, 3, 3, 5].into(),
                NumpyArray::from_buffer(buffer![10i64, 20, 30, 40, 50]).into_ref(),
            )
            .unwrap(),
        );
        let jagged = SliceItem::Jagged64(
            SliceJagged64::try_new(
                Index64::from(vec![0i64, 2, 2, 3]),
                SliceItem::array(vec![0, 2, 0]),
            )
            .unwrap(),
        );
        let out = layout.getitem(&Slice::new(vec![jagged]).unwrap()).unwrap();
        assert_eq!(
            out.as_array().unwrap().to_json().unwrap().to_string(),
            "[[10,30],[],[40]]"
        );
    }

    #[test]
    fn missing_slice_wraps_option() {
        let layout = Content::Numpy(NumpyArray::from_buffer(buffer![10i64, 20, 30]));
        let out = layout
            .getitem(&Slice::new(vec![SliceItem::missing(&[Some(0), None, Some(2)])]).unwrap())
            .unwrap();
        assert_eq!(
            out.as_array().unwrap().to_json().unwrap().to_string(),
            "[10,null,30]"
        );
    }

    #[test]
    fn ellipsis_expands() {
        let layout = Content::ListOffset(
            ListOffsetArray::try_new(
                buffer![0i64, 2, 5].into(),
                NumpyArray::from_buffer(buffer![1i64, 2, 3, 4, 5]).into_ref(),
            )
            .unwrap(),
        );
        let out = layout
            .getitem(&Slice::new(vec![SliceItem::Ellipsis, SliceItem::at(0)]).unwrap())
            .unwrap();
        assert_eq!(
            out.as_array().unwrap().to_json().unwrap().to_string(),
            "[1,3]"
        );
    }

    #[test]
    fn newaxis_inserts_regular() {
        let layout = Content::Numpy(NumpyArray::from_buffer(buffer![1i64, 2]));
        let out = layout
            .getitem(
                &Slice::new(vec![SliceItem::NewAxis, SliceItem::full_range()]).unwrap(),
            )
            .unwrap();
        assert_eq!(
            out.as_array().unwrap().to_json().unwrap().to_string(),
            "[[1,2]]"
        );
    }

    #[test]
    fn advanced_array_slice() {
        let layout = Content::Numpy(NumpyArray::from_buffer(buffer![10i64, 20, 30, 40]));
        let out = layout
            .getitem(&Slice::new(vec![SliceItem::array(vec![3, 0, 3])]).unwrap())
            .unwrap();
        assert_eq!(
            out.as_array().unwrap().to_json().unwrap().to_string(),
            "[40,10,40]"
        );
    }

    #[test]
    fn merge_associativity() {
        let a = Content::Numpy(NumpyArray::from_vec(vec![1i64, 2]));
        let b = Content::Numpy(NumpyArray::from_vec(vec![3i64]));
        let c = Content::Numpy(NumpyArray::from_vec(vec![4i64, 5]));
        let left = a.merge(&b).unwrap().merge(&c).unwrap();
        let right = a.merge(&b.merge(&c).unwrap()).unwrap();
        assert_eq!(
            left.to_json().unwrap().to_string(),
            right.to_json().unwrap().to_string()
        );
    }

    #[test]
    fn merge_as_union_on_parameter_mismatch() {
        let tagged: ragged_dtype::Parameters =
            [("__array__", "tagged")].into_iter().collect();
        let a = Content::Numpy(NumpyArray::from_vec(vec![1i64]).with_parameters(tagged));
        let b = Content::Numpy(NumpyArray::from_vec(vec![2i64]));
        let merged = a.merge(&b).unwrap();
        assert!(matches!(merged, Content::Union(_)));
        assert_eq!(merged.to_json().unwrap().to_string(), "[1,2]");
    }

    #[test]
    fn validity_is_transitive() {
        let layout = list_of_records();
        assert_eq!(layout.validity_error("layout"), None);
        let Content::ListOffset(list) = &layout else {
            panic!("expected a list");
        };
        assert_eq!(list.content().validity_error("layout.content"), None);
    }

    #[test]
    fn empty_propagates() {
        let empty = EmptyArray::new().to_content();
        assert!(empty.getitem_range(None, None).is_ok());
        assert!(empty.fillna(&NumpyArray::from_vec(vec![0i64]).into_ref()).is_ok());
        assert_eq!(empty.to_json().unwrap().to_string(), "[]");
        assert!(empty.pad(3, 0).unwrap().len() == 3);
    }

    #[test]
    fn num_axis0_is_scalar() {
        let layout = list_of_records();
        let n = layout.num(0).unwrap();
        assert_eq!(n.as_scalar().unwrap().as_i64().unwrap(), 3);
        let counts = layout.num(1).unwrap();
        assert_eq!(
            counts.as_array().unwrap().to_json().unwrap().to_string(),
            "[2,0,3]"
        );
    }

    #[test]
    fn reduce_innermost_axis() {
        let layout = Content::ListOffset(
            ListOffsetArray::try_new(
                buffer![0i64, 2, 2, 5].into(),
                NumpyArray::from_buffer(buffer![1i64, 2, 3, 4, 5]).into_ref(),
            )
            .unwrap(),
        );
        let sums = layout.reduce(&Sum, 1, false, false).unwrap();
        assert_eq!(
            sums.as_array().unwrap().to_json().unwrap().to_string(),
            "[3,0,12]"
        );
    }

    #[test]
    fn reduce_outer_axis_of_regular() {
        let layout = Content::Regular(
            RegularArray::try_new(
                NumpyArray::from_buffer(buffer![1i64, 2, 3, 4, 5, 6]).into_ref(),
                3,
            )
            .unwrap(),
        );
        let sums = layout.reduce(&Sum, 0, false, false).unwrap();
        assert_eq!(
            sums.as_array().unwrap().to_json().unwrap().to_string(),
            "[5,7,9]"
        );
    }

    #[test]
    fn boolean_leaf_as_slice() {
        let mask = Content::Numpy(NumpyArray::from_bools(&[true, false, true, false]));
        let item = mask.as_slice_item().unwrap();
        let layout = Content::Numpy(NumpyArray::from_buffer(buffer![10i64, 20, 30, 40]));
        let out = layout.getitem(&Slice::new(vec![item]).unwrap()).unwrap();
        assert_eq!(
            out.as_array().unwrap().to_json().unwrap().to_string(),
            "[10,30]"
        );
    }

    #[test]
    fn nbytes_deduplicates_shared_buffers() {
        let leaf = NumpyArray::from_buffer(buffer![1i64, 2, 3, 4]).into_ref();
        let record = RecordArray::try_new(vec![leaf.clone(), leaf], None, 4).unwrap();
        // both fields share one 32-byte buffer
        assert_eq!(record.to_content().nbytes(), 32);
    }
}
