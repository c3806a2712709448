use std::sync::Arc;

use ragged_dtype::Parameters;
use ragged_error::{RaggedResult, ragged_bail};

use crate::kernels;
use crate::{
    ByteMaskedArray, Content, ContentRef, Identities, Index64, Index8, IndexU8,
    IndexedOptionArray, Item, SliceItem,
};

/// Per-element validity by packed bits, with an explicit element count and bit order.
#[derive(Debug, Clone)]
pub struct BitMaskedArray {
    pub(crate) identities: Option<Arc<Identities>>,
    pub(crate) parameters: Parameters,
    mask: IndexU8,
    content: ContentRef,
    valid_when: bool,
    length: usize,
    lsb_order: bool,
}

impl BitMaskedArray {
    /// A bit-masked wrapper over `length` elements; the mask must hold at least
    /// `length` bits and the content at least `length` elements.
    pub fn try_new(
        mask: IndexU8,
        content: ContentRef,
        valid_when: bool,
        length: usize,
        lsb_order: bool,
    ) -> RaggedResult<Self> {
        if length > mask.len() * 8 {
            ragged_bail!(
                "BitMaskedArray of length {length} needs {} mask bytes, got {}",
                length.div_ceil(8),
                mask.len()
            );
        }
        if content.len() < length {
            ragged_bail!(
                "BitMaskedArray content of length {} is shorter than its length {length}",
                content.len()
            );
        }
        Ok(Self {
            identities: None,
            parameters: Parameters::new(),
            mask,
            content,
            valid_when,
            length,
            lsb_order,
        })
    }

    /// Same node with the given parameters.
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// The packed mask bytes.
    pub fn mask(&self) -> &IndexU8 {
        &self.mask
    }

    /// The inner array.
    pub fn content(&self) -> &ContentRef {
        &self.content
    }

    /// The mask sense: whether set bits mark valid elements.
    pub fn valid_when(&self) -> bool {
        self.valid_when
    }

    /// Whether bit 0 of each byte is the first element (LSB order) rather than bit 7.
    pub fn lsb_order(&self) -> bool {
        self.lsb_order
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.length
    }

    /// Whether there are no elements.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The equivalent byte-masked wrapper, bits expanded one byte per element.
    pub fn to_byte_masked(&self) -> RaggedResult<ByteMaskedArray> {
        let bytes = kernels::bytemask_from_bits(self.mask.as_slice(), self.length, self.lsb_order);
        let mut out = ByteMaskedArray::try_new(
            Index8::from(bytes),
            self.content.getitem_range_nowrap(0, self.length as i64)?,
            self.valid_when,
        )?;
        out.identities = self.identities.clone();
        out.parameters = self.parameters.clone();
        Ok(out)
    }

    /// The equivalent option gather.
    pub fn to_indexed_option64(&self) -> RaggedResult<IndexedOptionArray> {
        self.to_byte_masked()?.to_indexed_option64()
    }

    /// Collapse with an option-bearing content, or expand to the byte-masked form.
    pub fn simplify_optiontype(&self) -> RaggedResult<ContentRef> {
        match self.content.as_ref() {
            Content::Indexed(_)
            | Content::IndexedOption(_)
            | Content::ByteMasked(_)
            | Content::BitMasked(_)
            | Content::Unmasked(_) => self.to_indexed_option64()?.simplify_optiontype(),
            _ => Ok(Content::BitMasked(self.clone()).into()),
        }
    }

    pub(crate) fn item_at(&self, at: usize) -> RaggedResult<Item> {
        let byte = self.mask.get(at / 8) as u8;
        let bit = if self.lsb_order {
            (byte >> (at % 8)) & 1
        } else {
            (byte >> (7 - at % 8)) & 1
        };
        if (bit != 0) == self.valid_when {
            self.content.getitem_at_nowrap(at as i64)
        } else {
            Ok(Item::Null)
        }
    }

    pub(crate) fn range_nowrap(&self, start: usize, stop: usize) -> RaggedResult<Content> {
        // Bit boundaries rarely fall on bytes, so ranges drop to the byte-masked form.
        Ok(Content::ByteMasked(
            self.to_byte_masked()?.range_nowrap(start, stop)?,
        ))
    }

    pub(crate) fn carry(&self, carry: &Index64) -> RaggedResult<Content> {
        self.to_byte_masked()?.carry(carry)
    }

    pub(crate) fn getitem_next_structural(
        &self,
        head: &SliceItem,
        tail: &[SliceItem],
        advanced: &Index64,
    ) -> RaggedResult<ContentRef> {
        self.to_byte_masked()?
            .getitem_next_structural(head, tail, advanced)
    }

    pub(crate) fn getitem_next_jagged(
        &self,
        slicestarts: &Index64,
        slicestops: &Index64,
        slicecontent: &SliceItem,
        tail: &[SliceItem],
    ) -> RaggedResult<ContentRef> {
        self.to_byte_masked()?
            .getitem_next_jagged(slicestarts, slicestops, slicecontent, tail)
    }

    pub(crate) fn validity_error(&self, path: &str) -> Option<String> {
        if self.length > self.mask.len() * 8 {
            return Some(format!(
                "at {path} (BitMaskedArray): len(mask) * 8 < length"
            ));
        }
        if self.content.len() < self.length {
            return Some(format!(
                "at {path} (BitMaskedArray): len(content) < length"
            ));
        }
        self.content.validity_error(&format!("{path}.content"))
    }

    pub(crate) fn tostring_part(&self, indent: &str, pre: &str, post: &str) -> String {
        let mut out = format!(
            "{indent}{pre}<BitMaskedArray valid_when=\"{}\" length=\"{}\" lsb_order=\"{}\">\n",
            self.valid_when, self.length, self.lsb_order
        );
        out.push_str(&format!("{indent}    <mask>{}</mask>\n", self.mask));
        out.push_str(&self.content.tostring_part(&format!("{indent}    "), "<content>", "</content>\n"));
        out.push_str(&format!("{indent}</BitMaskedArray>{post}"));
        out
    }

    /// This node as a [`Content`].
    pub fn to_content(&self) -> Content {
        Content::BitMasked(self.clone())
    }

    /// This node as a shared [`ContentRef`].
    pub fn into_ref(self) -> ContentRef {
        Arc::new(Content::BitMasked(self))
    }
}

impl From<BitMaskedArray> for Content {
    fn from(a: BitMaskedArray) -> Self {
        Content::BitMasked(a)
    }
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;

    use crate::{BitMaskedArray, IndexU8, NumpyArray};

    #[test]
    fn lsb_order_expansion() {
        let a = BitMaskedArray::try_new(
            IndexU8::new(buffer![0b0000_0101u8]),
            NumpyArray::from_vec(vec![1i64, 2, 3]).into_ref(),
            true,
            3,
            true,
        )
        .unwrap();
        assert_eq!(a.to_content().to_json().unwrap().to_string(), "[1,null,3]");
    }

    #[test]
    fn msb_order_expansion() {
        let a = BitMaskedArray::try_new(
            IndexU8::new(buffer![0b1010_0000u8]),
            NumpyArray::from_vec(vec![1i64, 2, 3]).into_ref(),
            true,
            3,
            false,
        )
        .unwrap();
        assert_eq!(a.to_content().to_json().unwrap().to_string(), "[1,null,3]");
    }

    #[test]
    fn length_must_fit_mask() {
        assert!(BitMaskedArray::try_new(
            IndexU8::new(buffer![0u8]),
            NumpyArray::from_vec(vec![0i64; 9]).into_ref(),
            true,
            9,
            true,
        )
        .is_err());
    }
}
