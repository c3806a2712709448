use std::fmt::{Debug, Display, Formatter};

use num_traits::AsPrimitive;
use ragged_buffer::Buffer;
use ragged_dtype::NativePType;

/// Marker trait for the element types an [`Index`] may have.
pub trait IndexType: NativePType + AsPrimitive<i64> {
    /// Short name used in dumps and error messages.
    const NAME: &'static str;
}

macro_rules! index_type {
    ($T:ty, $name:literal) => {
        impl IndexType for $T {
            const NAME: &'static str = $name;
        }
    };
}

index_type!(i8, "i8");
index_type!(u8, "u8");
index_type!(i32, "i32");
index_type!(u32, "u32");
index_type!(i64, "i64");

/// A typed, offsettable view over a shared numeric buffer, used as an index vector.
///
/// Slicing produces a new `Index` sharing the buffer. Indexes are immutable.
#[derive(Clone, PartialEq)]
pub struct Index<T> {
    data: Buffer<T>,
}

/// Index of 8-bit signed integers (union tags, byte masks).
pub type Index8 = Index<i8>;
/// Index of 8-bit unsigned integers (packed bit masks).
pub type IndexU8 = Index<u8>;
/// Index of 32-bit signed integers.
pub type Index32 = Index<i32>;
/// Index of 32-bit unsigned integers.
pub type IndexU32 = Index<u32>;
/// Index of 64-bit signed integers; the working form of every algorithm.
pub type Index64 = Index<i64>;

impl<T: IndexType> Index<T> {
    /// Wrap a buffer as an index.
    pub fn new(data: Buffer<T>) -> Self {
        Self { data }
    }

    /// An empty index.
    pub fn empty() -> Self {
        Self::new(Buffer::empty())
    }

    /// An index of `len` zeros.
    pub fn zeroed(len: usize) -> Self {
        Self::new(Buffer::zeroed(len))
    }

    /// An index of `len` copies of `value`.
    pub fn full(value: T, len: usize) -> Self {
        Self::new(Buffer::full(value, len))
    }

    /// Number of elements.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the index has no elements.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The element at `at`.
    ///
    /// # Panics
    ///
    /// Panics when `at` is out of bounds; callers bounds-check first.
    #[inline(always)]
    pub fn get(&self, at: usize) -> T {
        self.data.as_slice()[at]
    }

    /// The elements as a native slice.
    #[inline(always)]
    pub fn as_slice(&self) -> &[T] {
        self.data.as_slice()
    }

    /// The backing buffer.
    pub fn buffer(&self) -> &Buffer<T> {
        &self.data
    }

    /// Zero-copy sub-view of `[start, stop)`.
    pub fn slice(&self, start: usize, stop: usize) -> Self {
        Self::new(self.data.slice(start..stop))
    }

    /// Widen to a 64-bit index, copying unless `T` is already `i64`.
    pub fn to64(&self) -> Index64 {
        Index64::new(self.data.iter().map(|v| v.as_()).collect())
    }

    /// Iterate the elements widened to `i64`.
    pub fn iter64(&self) -> impl Iterator<Item = i64> + '_ {
        self.data.iter().map(|v| v.as_())
    }

    /// Size of the underlying view in bytes.
    pub fn nbytes(&self) -> usize {
        self.len() * size_of::<T>()
    }

    /// Address and byte extent of the underlying view, for shared-buffer accounting.
    pub fn data_extent(&self) -> (usize, usize) {
        (self.data.as_slice().as_ptr() as usize, self.nbytes())
    }

    /// A copy into a fresh buffer.
    pub fn deep_copy(&self) -> Self {
        Self::new(Buffer::copy_from(self.as_slice()))
    }
}

impl Index64 {
    /// The identity index `[0, 1, ..., len)`.
    pub fn arange(len: usize) -> Self {
        Self::new((0..len as i64).collect())
    }
}

impl<T: IndexType> From<Buffer<T>> for Index<T> {
    fn from(data: Buffer<T>) -> Self {
        Self::new(data)
    }
}

impl<T: IndexType> From<Vec<T>> for Index<T> {
    fn from(data: Vec<T>) -> Self {
        Self::new(Buffer::copy_from(data))
    }
}

impl<T: IndexType> FromIterator<T> for Index<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<T: IndexType + Debug> Debug for Index<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Index<{}>{:?}", T::NAME, self.data.as_slice())
    }
}

impl<T: IndexType + Display> Display for Index<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let slice = self.data.as_slice();
        if slice.len() <= 12 {
            let items: Vec<String> = slice.iter().map(|v| v.to_string()).collect();
            write!(f, "[{}]", items.join(" "))
        } else {
            let head: Vec<String> = slice[..6].iter().map(|v| v.to_string()).collect();
            let tail: Vec<String> = slice[slice.len() - 3..].iter().map(|v| v.to_string()).collect();
            write!(f, "[{} ... {}]", head.join(" "), tail.join(" "))
        }
    }
}

/// An index whose element width is erased, as stored by layout nodes.
///
/// List offsets, starts/stops, gather indexes and union indexes may arrive in any of
/// these widths; algorithms widen with [`AnyIndex::to64`] and canonical outputs are
/// 64-bit.
#[derive(Clone, Debug, PartialEq)]
pub enum AnyIndex {
    /// 8-bit signed elements
    I8(Index8),
    /// 8-bit unsigned elements
    U8(IndexU8),
    /// 32-bit signed elements
    I32(Index32),
    /// 32-bit unsigned elements
    U32(IndexU32),
    /// 64-bit signed elements
    I64(Index64),
}

impl AnyIndex {
    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::I8(i) => i.len(),
            Self::U8(i) => i.len(),
            Self::I32(i) => i.len(),
            Self::U32(i) => i.len(),
            Self::I64(i) => i.len(),
        }
    }

    /// Whether the index has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element at `at`, widened to `i64`.
    ///
    /// # Panics
    ///
    /// Panics when `at` is out of bounds; callers bounds-check first.
    #[inline]
    pub fn get(&self, at: usize) -> i64 {
        match self {
            Self::I8(i) => i.get(at).as_(),
            Self::U8(i) => i.get(at).as_(),
            Self::I32(i) => i.get(at).as_(),
            Self::U32(i) => i.get(at).as_(),
            Self::I64(i) => i.get(at),
        }
    }

    /// Zero-copy sub-view of `[start, stop)`, keeping the element width.
    pub fn slice(&self, start: usize, stop: usize) -> Self {
        match self {
            Self::I8(i) => Self::I8(i.slice(start, stop)),
            Self::U8(i) => Self::U8(i.slice(start, stop)),
            Self::I32(i) => Self::I32(i.slice(start, stop)),
            Self::U32(i) => Self::U32(i.slice(start, stop)),
            Self::I64(i) => Self::I64(i.slice(start, stop)),
        }
    }

    /// Widen to the 64-bit working form; zero-copy when already 64-bit.
    pub fn to64(&self) -> Index64 {
        match self {
            Self::I8(i) => i.to64(),
            Self::U8(i) => i.to64(),
            Self::I32(i) => i.to64(),
            Self::U32(i) => i.to64(),
            Self::I64(i) => i.clone(),
        }
    }

    /// Whether the element width can represent negative (missing) entries.
    pub fn is_signed(&self) -> bool {
        matches!(self, Self::I8(_) | Self::I32(_) | Self::I64(_))
    }

    /// Short name of the element width.
    pub fn width_name(&self) -> &'static str {
        match self {
            Self::I8(_) => i8::NAME,
            Self::U8(_) => u8::NAME,
            Self::I32(_) => i32::NAME,
            Self::U32(_) => u32::NAME,
            Self::I64(_) => i64::NAME,
        }
    }

    /// Size of the underlying view in bytes.
    pub fn nbytes(&self) -> usize {
        match self {
            Self::I8(i) => i.nbytes(),
            Self::U8(i) => i.nbytes(),
            Self::I32(i) => i.nbytes(),
            Self::U32(i) => i.nbytes(),
            Self::I64(i) => i.nbytes(),
        }
    }

    /// Address and byte extent of the underlying view, for shared-buffer accounting.
    pub fn data_extent(&self) -> (usize, usize) {
        match self {
            Self::I8(i) => i.data_extent(),
            Self::U8(i) => i.data_extent(),
            Self::I32(i) => i.data_extent(),
            Self::U32(i) => i.data_extent(),
            Self::I64(i) => i.data_extent(),
        }
    }

    /// A copy into a fresh buffer, keeping the element width.
    pub fn deep_copy(&self) -> Self {
        match self {
            Self::I8(i) => Self::I8(i.deep_copy()),
            Self::U8(i) => Self::U8(i.deep_copy()),
            Self::I32(i) => Self::I32(i.deep_copy()),
            Self::U32(i) => Self::U32(i.deep_copy()),
            Self::I64(i) => Self::I64(i.deep_copy()),
        }
    }

    /// Iterate the elements widened to `i64`.
    pub fn iter64(&self) -> Box<dyn Iterator<Item = i64> + '_> {
        match self {
            Self::I8(i) => Box::new(i.iter64()),
            Self::U8(i) => Box::new(i.iter64()),
            Self::I32(i) => Box::new(i.iter64()),
            Self::U32(i) => Box::new(i.iter64()),
            Self::I64(i) => Box::new(i.iter64()),
        }
    }
}

impl Display for AnyIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::I8(i) => Display::fmt(i, f),
            Self::U8(i) => Display::fmt(i, f),
            Self::I32(i) => Display::fmt(i, f),
            Self::U32(i) => Display::fmt(i, f),
            Self::I64(i) => Display::fmt(i, f),
        }
    }
}

impl From<Index8> for AnyIndex {
    fn from(i: Index8) -> Self {
        Self::I8(i)
    }
}

impl From<IndexU8> for AnyIndex {
    fn from(i: IndexU8) -> Self {
        Self::U8(i)
    }
}

impl From<Index32> for AnyIndex {
    fn from(i: Index32) -> Self {
        Self::I32(i)
    }
}

impl From<IndexU32> for AnyIndex {
    fn from(i: IndexU32) -> Self {
        Self::U32(i)
    }
}

impl From<Index64> for AnyIndex {
    fn from(i: Index64) -> Self {
        Self::I64(i)
    }
}

impl From<Buffer<i64>> for AnyIndex {
    fn from(data: Buffer<i64>) -> Self {
        Self::I64(Index64::new(data))
    }
}

impl From<Buffer<i32>> for AnyIndex {
    fn from(data: Buffer<i32>) -> Self {
        Self::I32(Index32::new(data))
    }
}

impl From<Buffer<u32>> for AnyIndex {
    fn from(data: Buffer<u32>) -> Self {
        Self::U32(IndexU32::new(data))
    }
}

impl From<Vec<i64>> for AnyIndex {
    fn from(data: Vec<i64>) -> Self {
        Self::I64(Index64::from(data))
    }
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;

    use super::*;

    #[test]
    fn slice_shares_buffer() {
        let index = Index64::from(vec![0i64, 2, 2, 5]);
        let sliced = index.slice(1, 3);
        assert_eq!(sliced.as_slice(), &[2, 2]);
    }

    #[test]
    fn widen() {
        let narrow = Index32::new(buffer![0i32, 1, -1, 3]);
        assert_eq!(narrow.to64().as_slice(), &[0i64, 1, -1, 3]);
    }

    #[test]
    fn any_index_widths() {
        let any = AnyIndex::from(IndexU32::new(buffer![7u32, 8]));
        assert_eq!(any.len(), 2);
        assert_eq!(any.get(1), 8);
        assert!(!any.is_signed());
        assert_eq!(any.width_name(), "u32");
        assert_eq!(any.to64().as_slice(), &[7i64, 8]);
    }

    #[test]
    fn arange() {
        assert_eq!(Index64::arange(4).as_slice(), &[0, 1, 2, 3]);
    }
}
