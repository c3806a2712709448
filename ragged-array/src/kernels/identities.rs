//! Kernels that derive child identity tables from a parent table.
//!
//! Each derivation returns `None` when provenance cannot be preserved uniquely (an
//! element reachable from two parents has no single origin path); callers then clear
//! the child's identities.

use ragged_buffer::BufferMut;

use crate::{FieldLoc, Identities};

/// Child identities of a list layer: each content element in `[starts[i], stops[i])`
/// extends row `i` with its local position. Elements covered twice lose uniqueness.
pub fn identities_from_list(
    parent: &Identities,
    starts: &[i64],
    stops: &[i64],
    len_content: usize,
) -> Option<Identities> {
    let width = parent.width() + 1;
    let mut data = vec![-1i64; len_content * width];
    let mut claimed = vec![false; len_content];
    for i in 0..starts.len() {
        for pos in starts[i]..stops[i] {
            let pos = pos as usize;
            if pos >= len_content {
                return None;
            }
            if claimed[pos] {
                return None;
            }
            claimed[pos] = true;
            let row = &mut data[pos * width..(pos + 1) * width];
            row[..width - 1].copy_from_slice(parent.row(i));
            row[width - 1] = pos as i64 - starts[i];
        }
    }
    let mut buffer = BufferMut::<i64>::with_capacity(data.len());
    buffer.extend_from_slice(&data);
    Identities::try_new(buffer.freeze(), width, len_content, parent.field_loc().clone()).ok()
}

/// Child identities of a regular layer of the given size.
pub fn identities_from_regular(
    parent: &Identities,
    size: usize,
    len_content: usize,
) -> Option<Identities> {
    let starts: Vec<i64> = (0..parent.len()).map(|i| (i * size) as i64).collect();
    let stops: Vec<i64> = (0..parent.len()).map(|i| ((i + 1) * size) as i64).collect();
    identities_from_list(parent, &starts, &stops, len_content)
}

/// Child identities of a gather: content element `index[i]` inherits row `i`.
/// Negative (missing) entries claim nothing; duplicate gathers lose uniqueness.
pub fn identities_from_indexed(
    parent: &Identities,
    index: &[i64],
    len_content: usize,
) -> Option<Identities> {
    let width = parent.width();
    let mut data = vec![-1i64; len_content * width];
    let mut claimed = vec![false; len_content];
    for (i, &idx) in index.iter().enumerate() {
        if idx < 0 {
            continue;
        }
        let pos = idx as usize;
        if pos >= len_content || claimed[pos] {
            return None;
        }
        claimed[pos] = true;
        data[pos * width..(pos + 1) * width].copy_from_slice(parent.row(i));
    }
    let mut buffer = BufferMut::<i64>::with_capacity(data.len());
    buffer.extend_from_slice(&data);
    Identities::try_new(buffer.freeze(), width, len_content, parent.field_loc().clone()).ok()
}

/// Child identities of one union branch: branch elements inherit the rows whose tag
/// selects them. Duplicate selections lose uniqueness.
pub fn identities_from_union(
    parent: &Identities,
    tags: &[i8],
    index: &[i64],
    which: i64,
    len_content: usize,
) -> Option<Identities> {
    let width = parent.width();
    let mut data = vec![-1i64; len_content * width];
    let mut claimed = vec![false; len_content];
    for i in 0..tags.len() {
        if tags[i] as i64 != which {
            continue;
        }
        let pos = index[i] as usize;
        if pos >= len_content || claimed[pos] {
            return None;
        }
        claimed[pos] = true;
        data[pos * width..(pos + 1) * width].copy_from_slice(parent.row(i));
    }
    let mut buffer = BufferMut::<i64>::with_capacity(data.len());
    buffer.extend_from_slice(&data);
    Identities::try_new(buffer.freeze(), width, len_content, parent.field_loc().clone()).ok()
}

/// Child identities of a record field: the parent rows with the field label appended
/// to the path annotation.
pub fn identities_for_field(parent: &Identities, label: &str) -> Identities {
    let mut field_loc: FieldLoc = parent.field_loc().clone();
    field_loc.push((parent.width(), label.to_string()));
    parent.with_field_loc(field_loc)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn list_children_extend_rows() {
        let parent = Identities::new_arange(2);
        let child = identities_from_list(&parent, &[0, 2], &[2, 3], 3).unwrap();
        assert_eq!(child.width(), 2);
        assert_eq!(child.row(0), &[0, 0]);
        assert_eq!(child.row(1), &[0, 1]);
        assert_eq!(child.row(2), &[1, 0]);
    }

    #[test]
    fn overlapping_lists_are_not_unique() {
        let parent = Identities::new_arange(2);
        assert!(identities_from_list(&parent, &[0, 1], &[2, 3], 3).is_none());
    }

    #[test]
    fn indexed_children() {
        let parent = Identities::new_arange(3);
        let child = identities_from_indexed(&parent, &[2, -1, 0], 3).unwrap();
        assert_eq!(child.row(0), &[2]);
        assert_eq!(child.row(1), &[-1]); // unreferenced
        assert_eq!(child.row(2), &[0]);
    }

    #[test]
    fn duplicate_gather_is_not_unique() {
        let parent = Identities::new_arange(2);
        assert!(identities_from_indexed(&parent, &[0, 0], 2).is_none());
    }

    #[test]
    fn field_label_appended() {
        let parent = Identities::new_arange(1);
        let child = identities_for_field(&parent, "x");
        assert_eq!(child.field_loc(), &vec![(1, "x".to_string())]);
    }
}
