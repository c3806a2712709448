use std::fmt::{Display, Formatter};
use std::sync::Arc;

use ragged_buffer::{Buffer, BufferMut};
use ragged_error::{RaggedResult, ragged_bail};

use crate::Index64;

/// The field-path annotation of an identity table: `(column, label)` pairs recording
/// which record fields were traversed between the numbered columns.
pub type FieldLoc = Vec<(usize, String)>;

/// Optional per-element provenance: row `i` records the path from the root of the
/// original tree to element `i` as a fixed-width tuple of indexes, with record field
/// names interleaved via the [`FieldLoc`].
///
/// Identity tables are derived, never authoritative: operations either compute a
/// compatible child table or drop identities entirely. A `-1` entry marks a slot whose
/// provenance could not be preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct Identities {
    data: Buffer<i64>,
    width: usize,
    length: usize,
    field_loc: FieldLoc,
}

impl Identities {
    /// Wrap a row-major `length x width` matrix as an identity table.
    pub fn try_new(
        data: Buffer<i64>,
        width: usize,
        length: usize,
        field_loc: FieldLoc,
    ) -> RaggedResult<Self> {
        if data.len() != width * length {
            ragged_bail!(
                "identities data of {} entries cannot be a {length} x {width} table",
                data.len()
            );
        }
        Ok(Self {
            data,
            width,
            length,
            field_loc,
        })
    }

    /// A fresh root table: width 1, row `i` = `[i]`.
    pub fn new_arange(length: usize) -> Self {
        Self {
            data: (0..length as i64).collect(),
            width: 1,
            length,
            field_loc: FieldLoc::new(),
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.length
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Number of columns per row.
    pub fn width(&self) -> usize {
        self.width
    }

    /// The field-path annotation.
    pub fn field_loc(&self) -> &FieldLoc {
        &self.field_loc
    }

    /// The raw row-major data.
    pub fn data(&self) -> &Buffer<i64> {
        &self.data
    }

    /// Row `i` as a slice of `width` entries.
    pub fn row(&self, i: usize) -> &[i64] {
        &self.data.as_slice()[i * self.width..(i + 1) * self.width]
    }

    /// Same table with a different field-path annotation.
    pub fn with_field_loc(&self, field_loc: FieldLoc) -> Self {
        Self {
            data: self.data.clone(),
            width: self.width,
            length: self.length,
            field_loc,
        }
    }

    /// Rows `[start, stop)`, sharing the data buffer.
    pub fn slice(&self, start: usize, stop: usize) -> Self {
        Self {
            data: self.data.slice(start * self.width..stop * self.width),
            width: self.width,
            length: stop - start,
            field_loc: self.field_loc.clone(),
        }
    }

    /// Gather rows by `carry`; a negative carry entry yields a row of `-1`.
    pub fn carry(&self, carry: &Index64) -> RaggedResult<Self> {
        let mut data = BufferMut::<i64>::with_capacity(carry.len() * self.width);
        for &c in carry.as_slice() {
            if c < 0 {
                data.extend_from_slice(&vec![-1; self.width]);
            } else if (c as usize) < self.length {
                data.extend_from_slice(self.row(c as usize));
            } else {
                ragged_bail!(OutOfRange: "identity carry index {c} out of range for {} rows", self.length);
            }
        }
        Ok(Self {
            data: data.freeze(),
            width: self.width,
            length: carry.len(),
            field_loc: self.field_loc.clone(),
        })
    }

    /// Format row `i` as a path like `0,2,"field"`, resolving field labels.
    pub fn location_at(&self, i: usize) -> String {
        let mut parts: Vec<String> = Vec::new();
        for (col, value) in self.row(i).iter().enumerate() {
            for (at, label) in &self.field_loc {
                if *at == col {
                    parts.push(format!("{label:?}"));
                }
            }
            parts.push(value.to_string());
        }
        for (at, label) in &self.field_loc {
            if *at == self.width {
                parts.push(format!("{label:?}"));
            }
        }
        parts.join(",")
    }

    /// Shared handle for attaching to a node.
    pub fn into_arc(self) -> Arc<Identities> {
        Arc::new(self)
    }

    /// A copy into a fresh buffer.
    pub fn deep_copy(&self) -> Self {
        Self {
            data: Buffer::copy_from(self.data.as_slice()),
            width: self.width,
            length: self.length,
            field_loc: self.field_loc.clone(),
        }
    }
}

impl Display for Identities {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "<Identities width=\"{}\" length=\"{}\">", self.width, self.length)?;
        let shown = self.length.min(9);
        for i in 0..shown {
            writeln!(f, "    [{}]", self.location_at(i))?;
        }
        if shown < self.length {
            writeln!(f, "    ... {} more", self.length - shown)?;
        }
        write!(f, "</Identities>")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arange_rows() {
        let ids = Identities::new_arange(3);
        assert_eq!(ids.len(), 3);
        assert_eq!(ids.width(), 1);
        assert_eq!(ids.row(2), &[2]);
    }

    #[test]
    fn slice_and_carry() {
        let ids = Identities::new_arange(5);
        let sliced = ids.slice(1, 4);
        assert_eq!(sliced.len(), 3);
        assert_eq!(sliced.row(0), &[1]);

        let carried = ids.carry(&Index64::from(vec![4i64, -1, 0])).unwrap();
        assert_eq!(carried.row(0), &[4]);
        assert_eq!(carried.row(1), &[-1]);
        assert_eq!(carried.row(2), &[0]);
    }

    #[test]
    fn carry_out_of_range() {
        let ids = Identities::new_arange(2);
        assert!(ids.carry(&Index64::from(vec![2i64])).is_err());
    }

    #[test]
    fn location_with_field() {
        let ids = Identities::try_new(
            Buffer::copy_from([0i64, 1]),
            2,
            1,
            vec![(1, "x".to_string())],
        )
        .unwrap();
        assert_eq!(ids.location_at(0), "0,\"x\",1");
    }
}
