use std::sync::Arc;

use num_traits::NumCast;
use ragged_buffer::{Alignment, Buffer, BufferMut, ByteBuffer};
use ragged_dtype::{NativePType, PType, PValue, Parameters, match_each_native_ptype};
use ragged_error::{RaggedResult, ragged_bail};

use crate::{Content, ContentRef, Identities, Index64, Item, JsonBuilder, RegularArray};

/// A typed flat buffer viewed as an N-dimensional row-major tensor.
///
/// The one-dimensional contiguous form is the working form of every algorithm;
/// multi-dimensional and strided views are rewritten through [`NumpyArray::to_regular`]
/// or [`NumpyArray::to_contiguous`] before structural work.
#[derive(Debug, Clone)]
pub struct NumpyArray {
    pub(crate) identities: Option<Arc<Identities>>,
    pub(crate) parameters: Parameters,
    data: ByteBuffer,
    byte_offset: usize,
    shape: Vec<usize>,
    strides: Vec<usize>,
    ptype: PType,
}

impl NumpyArray {
    /// View `data` as a tensor of `ptype` elements with the given shape and byte
    /// strides, starting at `byte_offset`.
    pub fn try_new(
        data: ByteBuffer,
        ptype: PType,
        shape: Vec<usize>,
        strides: Vec<usize>,
        byte_offset: usize,
    ) -> RaggedResult<Self> {
        if shape.is_empty() {
            ragged_bail!("NumpyArray must have at least one dimension");
        }
        if strides.len() != shape.len() {
            ragged_bail!(
                "NumpyArray shape has {} dimensions but strides has {}",
                shape.len(),
                strides.len()
            );
        }
        if shape.iter().all(|&d| d > 0) {
            let itemsize = ptype.byte_width();
            let furthest: usize = byte_offset
                + shape
                    .iter()
                    .zip(strides.iter())
                    .map(|(&d, &s)| (d - 1) * s)
                    .sum::<usize>()
                + itemsize;
            if furthest > data.len() {
                ragged_bail!(
                    "NumpyArray of shape {shape:?} and strides {strides:?} reaches byte \
                     {furthest} of a {}-byte buffer",
                    data.len()
                );
            }
        }
        Ok(Self {
            identities: None,
            parameters: Parameters::new(),
            data,
            byte_offset,
            shape,
            strides,
            ptype,
        })
    }

    /// A one-dimensional contiguous leaf over a typed buffer.
    pub fn from_buffer<T: NativePType>(buffer: Buffer<T>) -> Self {
        let len = buffer.len();
        Self {
            identities: None,
            parameters: Parameters::new(),
            data: buffer.into_byte_buffer(),
            byte_offset: 0,
            shape: vec![len],
            strides: vec![size_of::<T>()],
            ptype: T::PTYPE,
        }
    }

    /// A one-dimensional contiguous leaf copied from a vector.
    pub fn from_vec<T: NativePType>(values: Vec<T>) -> Self {
        Self::from_buffer(Buffer::copy_from(values))
    }

    /// A one-dimensional boolean leaf, stored one byte per element.
    pub fn from_bools(values: &[bool]) -> Self {
        let bytes: Vec<u8> = values.iter().map(|&b| b as u8).collect();
        let mut out = Self::from_vec(bytes);
        out.ptype = PType::Bool;
        out
    }

    /// Same data viewed with a different element type of equal width (used to restore
    /// `Bool` after operating on its `u8` storage).
    pub fn with_ptype(mut self, ptype: PType) -> Self {
        debug_assert_eq!(ptype.byte_width(), self.ptype.byte_width());
        self.ptype = ptype;
        self
    }

    /// Same node with the given parameters.
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// The element type.
    pub fn ptype(&self) -> PType {
        self.ptype
    }

    /// The tensor shape; the outer dimension is the node's length.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// The per-dimension byte strides.
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Outer-dimension length.
    pub fn len(&self) -> usize {
        self.shape[0]
    }

    /// Whether the outer dimension is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The raw backing buffer.
    pub fn data(&self) -> &ByteBuffer {
        &self.data
    }

    /// Total number of elements across all dimensions.
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Whether the view is row-major contiguous.
    pub fn is_contiguous(&self) -> bool {
        let mut expected = self.ptype.byte_width();
        for (d, s) in self.shape.iter().zip(self.strides.iter()).rev() {
            if *d > 1 && *s != expected {
                return false;
            }
            expected *= *d;
        }
        true
    }

    /// The elements as a native slice; requires a contiguous view over the storage
    /// type of `T`.
    ///
    /// # Panics
    ///
    /// Panics when the view is not contiguous or `T` does not match the storage width.
    pub fn as_slice<T: NativePType>(&self) -> &[T] {
        assert!(self.is_contiguous(), "as_slice requires a contiguous view");
        assert_eq!(
            size_of::<T>(),
            self.ptype.byte_width(),
            "as_slice element width does not match the ptype"
        );
        let bytes = &self.data.as_slice()[self.byte_offset..];
        assert_eq!(bytes.as_ptr().align_offset(align_of::<T>()), 0);
        // SAFETY: alignment checked above; extent checked at construction
        unsafe { std::slice::from_raw_parts(bytes.as_ptr().cast(), self.numel()) }
    }

    /// The raw bytes of a contiguous view, `numel * itemsize` long.
    fn contiguous_bytes(&self) -> &[u8] {
        debug_assert!(self.is_contiguous());
        let extent = self.numel() * self.ptype.byte_width();
        &self.data.as_slice()[self.byte_offset..self.byte_offset + extent]
    }

    fn read_at<T: NativePType>(&self, byte: usize) -> T {
        let ptr = self.data.as_slice()[byte..].as_ptr() as *const T;
        // SAFETY: extent checked at construction; read_unaligned tolerates any offset
        unsafe { ptr.read_unaligned() }
    }

    /// The element at flat outer position `at` of a one-dimensional view.
    pub fn pvalue_at(&self, at: usize) -> PValue {
        debug_assert_eq!(self.ndim(), 1);
        let byte = self.byte_offset + at * self.strides[0];
        if self.ptype == PType::Bool {
            return PValue::Bool(self.read_at::<u8>(byte) != 0);
        }
        match_each_native_ptype!(self.ptype, |$T| {
            PValue::from(self.read_at::<$T>(byte))
        })
    }

    pub(crate) fn item_at(&self, at: usize) -> RaggedResult<Item> {
        if self.ndim() == 1 {
            Ok(Item::Scalar(self.pvalue_at(at)))
        } else {
            let sub = Self {
                identities: None,
                parameters: self.parameters.clone(),
                data: self.data.clone(),
                byte_offset: self.byte_offset + at * self.strides[0],
                shape: self.shape[1..].to_vec(),
                strides: self.strides[1..].to_vec(),
                ptype: self.ptype,
            };
            Ok(Item::Array(sub.into_ref()))
        }
    }

    pub(crate) fn range_nowrap(&self, start: usize, stop: usize) -> RaggedResult<Self> {
        let identities = self
            .identities
            .as_ref()
            .map(|ids| Arc::new(ids.slice(start, stop)));
        let mut shape = self.shape.clone();
        shape[0] = stop - start;
        Ok(Self {
            identities,
            parameters: self.parameters.clone(),
            data: self.data.clone(),
            byte_offset: self.byte_offset + start * self.strides[0],
            shape,
            strides: self.strides.clone(),
            ptype: self.ptype,
        })
    }

    /// A contiguous row-major copy, or this view unchanged if already contiguous.
    pub fn to_contiguous(&self) -> Self {
        if self.is_contiguous() && self.byte_offset % self.ptype.byte_width() == 0 {
            return self.clone();
        }
        let itemsize = self.ptype.byte_width();
        let mut bytes = BufferMut::<u8>::with_capacity_aligned(self.numel() * itemsize, Alignment::new(8));
        let mut index = vec![0usize; self.ndim()];
        'outer: loop {
            let byte = self.byte_offset
                + index
                    .iter()
                    .zip(self.strides.iter())
                    .map(|(&i, &s)| i * s)
                    .sum::<usize>();
            if self.numel() > 0 {
                bytes.extend_from_slice(&self.data.as_slice()[byte..byte + itemsize]);
            }
            if self.numel() == 0 {
                break;
            }
            for dim in (0..self.ndim()).rev() {
                index[dim] += 1;
                if index[dim] < self.shape[dim] {
                    continue 'outer;
                }
                index[dim] = 0;
                if dim == 0 {
                    break 'outer;
                }
            }
        }
        let mut strides = vec![itemsize; self.ndim()];
        for dim in (0..self.ndim().saturating_sub(1)).rev() {
            strides[dim] = strides[dim + 1] * self.shape[dim + 1];
        }
        Self {
            identities: self.identities.clone(),
            parameters: self.parameters.clone(),
            data: bytes.freeze(),
            byte_offset: 0,
            shape: self.shape.clone(),
            strides,
            ptype: self.ptype,
        }
    }

    /// A contiguous copy into a fresh buffer, regardless of the current layout.
    pub(crate) fn deep_copy_data(&self) -> Self {
        let contiguous = self.to_contiguous();
        let mut out = contiguous.clone();
        out.data = ragged_buffer::Buffer::copy_from(contiguous.contiguous_bytes());
        out.byte_offset = 0;
        out
    }

    /// Rewrite a multi-dimensional view as regular layers over a one-dimensional
    /// contiguous leaf; a one-dimensional view is returned unchanged.
    pub fn to_regular(&self) -> RaggedResult<Content> {
        if self.ndim() == 1 {
            return Ok(Content::Numpy(self.clone()));
        }
        let contiguous = self.to_contiguous();
        let mut leaf = Self {
            identities: None,
            parameters: Parameters::new(),
            data: contiguous.data.clone(),
            byte_offset: 0,
            shape: vec![contiguous.numel()],
            strides: vec![contiguous.ptype.byte_width()],
            ptype: contiguous.ptype,
        }
        .to_content();
        for dim in (1..self.ndim()).rev() {
            leaf = Content::Regular(RegularArray::try_new(
                Arc::new(leaf),
                self.shape[dim] as i64,
            )?);
        }
        let Content::Regular(mut outer) = leaf else {
            ragged_bail!("to_regular on a multidimensional view must produce a regular layer");
        };
        outer.identities = self.identities.clone();
        outer.parameters = self.parameters.clone();
        Ok(Content::Regular(outer))
    }

    pub(crate) fn carry(&self, carry: &Index64) -> RaggedResult<Content> {
        if self.ndim() != 1 {
            return self.to_regular()?.carry(carry).map(|c| c.as_ref().clone());
        }
        let contiguous = self.to_contiguous();
        let len = contiguous.len() as i64;
        let itemsize = self.ptype.byte_width();
        let mut bytes = BufferMut::<u8>::with_capacity_aligned(carry.len() * itemsize, Alignment::new(8));
        for &c in carry.as_slice() {
            if c < 0 || c >= len {
                ragged_bail!(OutOfRange: "carry index {c} out of range for length {len}");
            }
            let byte = c as usize * itemsize;
            bytes.extend_from_slice(&contiguous.contiguous_bytes()[byte..byte + itemsize]);
        }
        let identities = self
            .identities
            .as_ref()
            .map(|ids| ids.carry(carry).map(Arc::new))
            .transpose()?;
        Ok(Content::Numpy(Self {
            identities,
            parameters: self.parameters.clone(),
            data: bytes.freeze(),
            byte_offset: 0,
            shape: vec![carry.len()],
            strides: vec![itemsize],
            ptype: self.ptype,
        }))
    }

    /// A contiguous copy with the elements converted to `ptype`.
    pub fn cast_to(&self, ptype: PType) -> Self {
        if ptype == self.ptype {
            return self.to_contiguous();
        }
        let contiguous = self.to_contiguous();
        match_each_native_ptype!(contiguous.ptype, |$S| {
            let values = contiguous.as_slice::<$S>();
            match_each_native_ptype!(ptype, |$D| {
                let out: Vec<$D> = values
                    .iter()
                    .map(|&v| <$D as NumCast>::from(v).unwrap_or_default())
                    .collect();
                let mut array = Self::from_vec(out);
                array.ptype = ptype;
                array.parameters = self.parameters.clone();
                array
            })
        })
    }

    /// Concatenate with another leaf, promoting the element type.
    pub(crate) fn merge_numpy(&self, other: &NumpyArray) -> RaggedResult<Self> {
        let promoted = self.ptype.promote(other.ptype);
        let mine = self.cast_to(promoted);
        let theirs = other.cast_to(promoted);
        let itemsize = promoted.byte_width();
        let mut bytes =
            BufferMut::<u8>::with_capacity_aligned((mine.numel() + theirs.numel()) * itemsize, Alignment::new(8));
        bytes.extend_from_slice(mine.contiguous_bytes());
        bytes.extend_from_slice(theirs.contiguous_bytes());
        let len = mine.len() + theirs.len();
        Ok(Self {
            identities: None,
            parameters: self.parameters.clone(),
            data: bytes.freeze(),
            byte_offset: 0,
            shape: vec![len],
            strides: vec![itemsize],
            ptype: promoted,
        })
    }

    pub(crate) fn tojson_part(
        &self,
        builder: &mut JsonBuilder,
        include_beginendlist: bool,
    ) -> RaggedResult<()> {
        if include_beginendlist {
            builder.begin_list();
        }
        for i in 0..self.len() {
            self.item_at(i)?.tojson_part(builder)?;
        }
        if include_beginendlist {
            builder.end_list()?;
        }
        Ok(())
    }

    pub(crate) fn tostring_part(&self, indent: &str, pre: &str, post: &str) -> String {
        let mut out = format!(
            "{indent}{pre}<NumpyArray ptype=\"{}\" shape=\"{:?}\">",
            self.ptype, self.shape
        );
        if self.ndim() == 1 && self.len() <= 12 {
            let values: Vec<String> = (0..self.len())
                .map(|i| self.pvalue_at(i).to_string())
                .collect();
            out.push_str(&values.join(" "));
        } else {
            out.push_str("...");
        }
        out.push_str(&format!("</NumpyArray>{post}"));
        out
    }

    /// This node as a [`Content`].
    pub fn to_content(&self) -> Content {
        Content::Numpy(self.clone())
    }

    /// This node as a shared [`ContentRef`].
    pub fn into_ref(self) -> ContentRef {
        Arc::new(Content::Numpy(self))
    }
}

impl From<NumpyArray> for Content {
    fn from(a: NumpyArray) -> Self {
        Content::Numpy(a)
    }
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use ragged_dtype::{PType, PValue};

    use super::*;

    #[test]
    fn one_dimensional_access() {
        let a = NumpyArray::from_buffer(buffer![10i64, 20, 30]);
        assert_eq!(a.len(), 3);
        assert_eq!(a.pvalue_at(1), PValue::I64(20));
        let sliced = a.range_nowrap(1, 3).unwrap();
        assert_eq!(sliced.len(), 2);
        assert_eq!(sliced.pvalue_at(0), PValue::I64(20));
    }

    #[test]
    fn two_dimensional_to_regular() {
        // [[1, 2, 3], [4, 5, 6]]
        let a = NumpyArray::try_new(
            Buffer::copy_from([1i32, 2, 3, 4, 5, 6]).into_byte_buffer(),
            PType::I32,
            vec![2, 3],
            vec![12, 4],
            0,
        )
        .unwrap();
        assert_eq!(a.len(), 2);
        let regular = a.to_regular().unwrap();
        assert_eq!(regular.len(), 2);
        assert_eq!(
            regular.to_json().unwrap().to_string(),
            "[[1,2,3],[4,5,6]]"
        );
    }

    #[test]
    fn strided_view_reads_through() {
        // every second element of [0, 1, 2, 3, 4, 5]
        let a = NumpyArray::try_new(
            Buffer::copy_from([0i64, 1, 2, 3, 4, 5]).into_byte_buffer(),
            PType::I64,
            vec![3],
            vec![16],
            0,
        )
        .unwrap();
        assert!(!a.is_contiguous());
        assert_eq!(a.pvalue_at(2), PValue::I64(4));
        assert_eq!(a.to_contiguous().as_slice::<i64>(), &[0, 2, 4]);
    }

    #[test]
    fn carry_gathers() {
        let a = NumpyArray::from_vec(vec![1.5f64, 2.5, 3.5]);
        let carried = a.carry(&Index64::from(vec![2i64, 0, 0])).unwrap();
        let Content::Numpy(carried) = carried else {
            panic!("expected a leaf");
        };
        assert_eq!(carried.as_slice::<f64>(), &[3.5, 1.5, 1.5]);
        assert!(a.carry(&Index64::from(vec![3i64])).is_err());
    }

    #[test]
    fn merge_promotes() {
        let ints = NumpyArray::from_vec(vec![1i64, 2]);
        let floats = NumpyArray::from_vec(vec![3.0f64, 4.0]);
        let merged = ints.merge_numpy(&floats).unwrap();
        assert_eq!(merged.ptype(), PType::F64);
        assert_eq!(merged.as_slice::<f64>(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn bools_round_trip() {
        let a = NumpyArray::from_bools(&[true, false, true]);
        assert_eq!(a.ptype(), PType::Bool);
        assert_eq!(a.pvalue_at(0), PValue::Bool(true));
        assert_eq!(a.to_content().to_json().unwrap().to_string(), "[true,false,true]");
    }

    #[test]
    fn bad_extent_rejected() {
        let result = NumpyArray::try_new(
            Buffer::copy_from([1i64, 2]).into_byte_buffer(),
            PType::I64,
            vec![3],
            vec![8],
            0,
        );
        assert!(result.is_err());
    }
}
