use std::fmt::{Display, Formatter};

use ragged_error::{RaggedResult, ragged_bail};

use crate::Index64;

/// A Python-style range with optional bounds and a non-zero step.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceRange {
    start: Option<i64>,
    stop: Option<i64>,
    step: i64,
}

impl SliceRange {
    /// A range with the given bounds and step 1.
    pub fn new(start: Option<i64>, stop: Option<i64>) -> Self {
        Self {
            start,
            stop,
            step: 1,
        }
    }

    /// A range with an explicit step.
    pub fn with_step(start: Option<i64>, stop: Option<i64>, step: i64) -> RaggedResult<Self> {
        if step == 0 {
            ragged_bail!("slice step cannot be zero");
        }
        Ok(Self { start, stop, step })
    }

    /// The full range `[:]`.
    pub fn full() -> Self {
        Self::new(None, None)
    }

    /// The start bound, if given.
    pub fn start(&self) -> Option<i64> {
        self.start
    }

    /// The stop bound, if given.
    pub fn stop(&self) -> Option<i64> {
        self.stop
    }

    /// The step; never zero.
    pub fn step(&self) -> i64 {
        self.step
    }

    /// Whether this is the untouched full range with step 1.
    pub fn is_full(&self) -> bool {
        self.start.is_none() && self.stop.is_none() && self.step == 1
    }
}

/// An integer-array index expression, flat row-major with an explicit shape.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceArray64 {
    index: Index64,
    shape: Vec<i64>,
}

impl SliceArray64 {
    /// Wrap a flat index with its shape; the index length must equal the shape product.
    pub fn try_new(index: Index64, shape: Vec<i64>) -> RaggedResult<Self> {
        if shape.is_empty() {
            ragged_bail!("array slice must have at least one dimension");
        }
        if shape.iter().any(|&d| d < 0) {
            ragged_bail!("array slice shape cannot have negative dimensions: {shape:?}");
        }
        let numel: i64 = shape.iter().product();
        if numel != index.len() as i64 {
            ragged_bail!(
                "array slice of shape {shape:?} needs {numel} entries, got {}",
                index.len()
            );
        }
        Ok(Self { index, shape })
    }

    /// A one-dimensional array slice.
    pub fn from_vec(index: Vec<i64>) -> Self {
        let shape = vec![index.len() as i64];
        Self {
            index: Index64::from(index),
            shape,
        }
    }

    /// The flat (raveled) index.
    pub fn flat(&self) -> &Index64 {
        &self.index
    }

    /// The shape of the index expression.
    pub fn shape(&self) -> &[i64] {
        &self.shape
    }

    /// Outer length of the index expression.
    pub fn length(&self) -> i64 {
        self.shape[0]
    }
}

/// An index expression with missing entries: `index` maps each output position to a
/// position among the non-missing picks (or `-1`), and `content` is the compacted
/// expression of the picks themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceMissing64 {
    index: Index64,
    content: Box<SliceItem>,
}

impl SliceMissing64 {
    /// Wrap an already-compacted missing expression.
    pub fn new(index: Index64, content: SliceItem) -> Self {
        Self {
            index,
            content: Box::new(content),
        }
    }

    /// Build from an option-valued index vector, compacting the non-missing picks.
    pub fn from_options(values: &[Option<i64>]) -> Self {
        let mut index = Vec::with_capacity(values.len());
        let mut picks = Vec::new();
        for v in values {
            match v {
                None => index.push(-1),
                Some(pick) => {
                    index.push(picks.len() as i64);
                    picks.push(*pick);
                }
            }
        }
        Self::new(
            Index64::from(index),
            SliceItem::Array64(SliceArray64::from_vec(picks)),
        )
    }

    /// The output-position to pick-position map, `-1` marking missing.
    pub fn index(&self) -> &Index64 {
        &self.index
    }

    /// The compacted picks.
    pub fn content(&self) -> &SliceItem {
        &self.content
    }

    /// Number of output positions, missing included.
    pub fn length(&self) -> i64 {
        self.index.len() as i64
    }
}

/// A jagged index expression: `offsets` split `content` into one inner expression per
/// row of the array being sliced.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceJagged64 {
    offsets: Index64,
    content: Box<SliceItem>,
}

impl SliceJagged64 {
    /// Wrap jagged offsets over an inner expression.
    pub fn try_new(offsets: Index64, content: SliceItem) -> RaggedResult<Self> {
        if offsets.is_empty() {
            ragged_bail!("jagged slice offsets must have at least one entry");
        }
        Ok(Self {
            offsets,
            content: Box::new(content),
        })
    }

    /// The per-row offsets; length is one more than the number of rows.
    pub fn offsets(&self) -> &Index64 {
        &self.offsets
    }

    /// The inner expression, addressed through the offsets.
    pub fn content(&self) -> &SliceItem {
        &self.content
    }

    /// Number of rows.
    pub fn length(&self) -> i64 {
        self.offsets.len() as i64 - 1
    }
}

/// One head symbol of the indexing DSL.
#[derive(Debug, Clone, PartialEq)]
pub enum SliceItem {
    /// Select a single element at this axis, dropping the axis.
    At(i64),
    /// Narrow this axis to a range.
    Range(SliceRange),
    /// Gather by an integer array (NumPy-style advanced indexing).
    Array64(SliceArray64),
    /// Expand to as many full ranges as needed to match the array's depth.
    Ellipsis,
    /// Insert a new regular axis of size 1.
    NewAxis,
    /// Project one record field; does not consume an axis.
    Field(String),
    /// Project several record fields; does not consume an axis.
    Fields(Vec<String>),
    /// An array index expression with missing entries.
    Missing64(SliceMissing64),
    /// A jagged (per-row variable-length) index expression.
    Jagged64(SliceJagged64),
}

impl SliceItem {
    /// Select element `at`.
    pub fn at(at: i64) -> Self {
        Self::At(at)
    }

    /// The range `[start:stop]`.
    pub fn range(start: impl Into<Option<i64>>, stop: impl Into<Option<i64>>) -> Self {
        Self::Range(SliceRange::new(start.into(), stop.into()))
    }

    /// The full range `[:]`.
    pub fn full_range() -> Self {
        Self::Range(SliceRange::full())
    }

    /// A one-dimensional integer-array index.
    pub fn array(index: Vec<i64>) -> Self {
        Self::Array64(SliceArray64::from_vec(index))
    }

    /// A field projection.
    pub fn field(key: impl Into<String>) -> Self {
        Self::Field(key.into())
    }

    /// A multi-field projection.
    pub fn fields<I: IntoIterator<Item = S>, S: Into<String>>(keys: I) -> Self {
        Self::Fields(keys.into_iter().map(Into::into).collect())
    }

    /// An option-valued integer-array index; `None` marks missing output slots.
    pub fn missing(values: &[Option<i64>]) -> Self {
        Self::Missing64(SliceMissing64::from_options(values))
    }

    /// Number of array axes this item consumes during descent.
    pub fn dimlength(&self) -> i64 {
        match self {
            Self::At(_) | Self::Range(_) | Self::Jagged64(_) | Self::Missing64(_) => 1,
            Self::Array64(a) => a.shape().len() as i64,
            Self::Ellipsis | Self::NewAxis | Self::Field(_) | Self::Fields(_) => 0,
        }
    }

    /// Whether applying this item keeps the element type of the array it is applied to
    /// (used to decide whether node parameters survive).
    pub fn preserves_type(&self, advanced: &Index64) -> bool {
        match self {
            Self::At(_) => false,
            Self::Range(_) | Self::Ellipsis | Self::NewAxis | Self::Jagged64(_) => true,
            Self::Array64(_) | Self::Missing64(_) => advanced.is_empty(),
            Self::Field(_) | Self::Fields(_) => false,
        }
    }
}

impl Display for SliceItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::At(at) => write!(f, "{at}"),
            Self::Range(r) => {
                if let Some(start) = r.start() {
                    write!(f, "{start}")?;
                }
                write!(f, ":")?;
                if let Some(stop) = r.stop() {
                    write!(f, "{stop}")?;
                }
                if r.step() != 1 {
                    write!(f, ":{}", r.step())?;
                }
                Ok(())
            }
            Self::Array64(a) => write!(f, "array{:?}", a.flat().as_slice()),
            Self::Ellipsis => write!(f, "..."),
            Self::NewAxis => write!(f, "newaxis"),
            Self::Field(key) => write!(f, "{key:?}"),
            Self::Fields(keys) => write!(f, "{keys:?}"),
            Self::Missing64(m) => write!(f, "missing{:?}", m.index().as_slice()),
            Self::Jagged64(j) => write!(f, "jagged{:?}", j.offsets().as_slice()),
        }
    }
}

/// An ordered sequence of slice items, applied left-to-right across the axes of a tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    items: Vec<SliceItem>,
}

impl Slice {
    /// Validate and seal a sequence of items. At most one ellipsis is allowed.
    pub fn new(items: Vec<SliceItem>) -> RaggedResult<Self> {
        let ellipses = items
            .iter()
            .filter(|i| matches!(i, SliceItem::Ellipsis))
            .count();
        if ellipses > 1 {
            ragged_bail!("a slice can contain at most one ellipsis");
        }
        Ok(Self { items })
    }

    /// The items, in application order.
    pub fn items(&self) -> &[SliceItem] {
        &self.items
    }

    /// The first item, if any.
    pub fn head(&self) -> Option<&SliceItem> {
        self.items.first()
    }

    /// Everything after the first item.
    pub fn tail(&self) -> &[SliceItem] {
        if self.items.is_empty() {
            &[]
        } else {
            &self.items[1..]
        }
    }

    /// Number of array axes the whole slice consumes.
    pub fn dimlength(&self) -> i64 {
        self.items.iter().map(SliceItem::dimlength).sum()
    }
}

impl Display for Slice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (n, item) in self.items.iter().enumerate() {
            if n != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{item}")?;
        }
        write!(f, "]")
    }
}

/// Number of array axes the remaining items consume; free function so the descent can
/// call it on bare item slices.
pub(crate) fn dimlength(items: &[SliceItem]) -> i64 {
    items.iter().map(SliceItem::dimlength).sum()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn one_ellipsis_only() {
        assert!(Slice::new(vec![SliceItem::Ellipsis, SliceItem::at(0)]).is_ok());
        assert!(Slice::new(vec![SliceItem::Ellipsis, SliceItem::Ellipsis]).is_err());
    }

    #[test]
    fn missing_compaction() {
        let SliceItem::Missing64(m) = SliceItem::missing(&[Some(0), None, Some(2)]) else {
            panic!("expected missing item");
        };
        assert_eq!(m.index().as_slice(), &[0, -1, 1]);
        let SliceItem::Array64(picks) = m.content() else {
            panic!("expected array content");
        };
        assert_eq!(picks.flat().as_slice(), &[0, 2]);
    }

    #[test]
    fn dimlengths() {
        let slice = Slice::new(vec![
            SliceItem::at(0),
            SliceItem::full_range(),
            SliceItem::field("x"),
            SliceItem::NewAxis,
            SliceItem::array(vec![1, 2]),
        ])
        .unwrap();
        assert_eq!(slice.dimlength(), 3);
    }

    #[test]
    fn zero_step_rejected() {
        assert!(SliceRange::with_step(None, None, 0).is_err());
    }

    #[test]
    fn display() {
        let slice = Slice::new(vec![SliceItem::at(2), SliceItem::range(1, None)]).unwrap();
        assert_eq!(slice.to_string(), "[2, 1:]");
    }
}
