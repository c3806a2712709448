//! Kernels behind the structural operations: counting, flattening, padding, local
//! indexes, combinations, union rewrites and validity sweeps.

use crate::kernels::{KernelError, KernelResult};

/// Per-list lengths of a list layer.
pub fn list_num(starts: &[i64], stops: &[i64]) -> Vec<i64> {
    starts
        .iter()
        .zip(stops.iter())
        .map(|(&a, &b)| b - a)
        .collect()
}

/// Pad-right a length-`length` axis to `target`: the axis-0 option index.
pub fn index_rpad_axis0(length: i64, target: i64, clip: bool) -> Vec<i64> {
    let out_length = if clip { target } else { target.max(length) };
    (0..out_length)
        .map(|i| if i < length { i } else { -1 })
        .collect()
}

/// Pad-right every list of a list layer to `target` elements, marking the padding
/// missing. Returns the new offsets and the option index into the untouched content.
pub fn list_rpad(
    starts: &[i64],
    stops: &[i64],
    target: i64,
    clip: bool,
) -> (Vec<i64>, Vec<i64>) {
    let mut offsets = Vec::with_capacity(starts.len() + 1);
    let mut index = Vec::new();
    offsets.push(0);
    for i in 0..starts.len() {
        let rowlen = stops[i] - starts[i];
        let outlen = if clip { target } else { target.max(rowlen) };
        for j in 0..outlen {
            if j < rowlen {
                index.push(starts[i] + j);
            } else {
                index.push(-1);
            }
        }
        offsets.push(index.len() as i64);
    }
    (offsets, index)
}

/// Per-element local indexes of a list layer, with compact offsets.
pub fn list_localindex(starts: &[i64], stops: &[i64]) -> (Vec<i64>, Vec<i64>) {
    let mut offsets = Vec::with_capacity(starts.len() + 1);
    let mut local = Vec::new();
    offsets.push(0);
    for i in 0..starts.len() {
        let rowlen = stops[i] - starts[i];
        local.extend(0..rowlen);
        offsets.push(local.len() as i64);
    }
    (offsets, local)
}

/// All n-combinations of `[0, count)` appended column-wise onto `columns`, absolute
/// positions offset by `start`.
fn combinations_row(
    columns: &mut [Vec<i64>],
    n: usize,
    replacement: bool,
    start: i64,
    count: i64,
) {
    let mut stack: Vec<i64> = Vec::with_capacity(n);
    fn recurse(
        columns: &mut [Vec<i64>],
        stack: &mut Vec<i64>,
        n: usize,
        replacement: bool,
        start: i64,
        count: i64,
        from: i64,
    ) {
        if stack.len() == n {
            for (col, &pick) in columns.iter_mut().zip(stack.iter()) {
                col.push(start + pick);
            }
            return;
        }
        let mut j = from;
        while j < count {
            stack.push(j);
            let next = if replacement { j } else { j + 1 };
            recurse(columns, stack, n, replacement, start, count, next);
            stack.pop();
            j += 1;
        }
    }
    recurse(columns, &mut stack, n, replacement, start, count, 0);
}

/// All n-combinations within each list of a list layer. Returns per-list offsets and
/// one gather column per combination slot.
pub fn list_combinations(
    starts: &[i64],
    stops: &[i64],
    n: usize,
    replacement: bool,
) -> (Vec<i64>, Vec<Vec<i64>>) {
    let mut offsets = Vec::with_capacity(starts.len() + 1);
    let mut columns: Vec<Vec<i64>> = vec![Vec::new(); n];
    offsets.push(0);
    for i in 0..starts.len() {
        combinations_row(&mut columns, n, replacement, starts[i], stops[i] - starts[i]);
        offsets.push(columns[0].len() as i64);
    }
    (offsets, columns)
}

/// All n-combinations of a whole axis of length `length`: one gather column per slot.
pub fn axis0_combinations(length: i64, n: usize, replacement: bool) -> Vec<Vec<i64>> {
    let mut columns: Vec<Vec<i64>> = vec![Vec::new(); n];
    combinations_row(&mut columns, n, replacement, 0, length);
    columns
}

/// The running per-tag counter index that makes a union's index the identity over each
/// projected branch.
pub fn union_regular_index(tags: &[i8], numcontents: usize) -> Vec<i64> {
    let mut current = vec![0i64; numcontents];
    tags.iter()
        .map(|&t| {
            let out = current[t as usize];
            current[t as usize] += 1;
            out
        })
        .collect()
}

/// The positions of branch `which` inside a union's content, in element order.
pub fn union_project(
    tags: &[i8],
    index: &[i64],
    which: i64,
    len_content: i64,
) -> KernelResult<Vec<i64>> {
    let mut out = Vec::new();
    for i in 0..tags.len() {
        if tags[i] as i64 == which {
            let idx = index[i];
            if idx < 0 || idx >= len_content {
                return Err(KernelError::at("index out of range", i as i64));
            }
            out.push(idx);
        }
    }
    Ok(out)
}

/// One pass of union simplification for a non-union branch: every element tagged
/// `fromwhich` is re-tagged `towhich` with its index rebased by `base`.
pub fn union_simplify_one(
    totags: &mut [i8],
    toindex: &mut [i64],
    fromtags: &[i8],
    fromindex: &[i64],
    towhich: i64,
    fromwhich: i64,
    base: i64,
) {
    for i in 0..fromtags.len() {
        if fromtags[i] as i64 == fromwhich {
            totags[i] = towhich as i8;
            toindex[i] = base + fromindex[i];
        }
    }
}

/// One pass of union simplification for a branch that is itself a union: elements
/// tagged `outerwhich` whose inner tag is `innerwhich` are re-tagged `towhich` with
/// the inner index rebased by `base`.
#[allow(clippy::too_many_arguments)]
pub fn union_simplify_inner(
    totags: &mut [i8],
    toindex: &mut [i64],
    outertags: &[i8],
    outerindex: &[i64],
    innertags: &[i8],
    innerindex: &[i64],
    towhich: i64,
    innerwhich: i64,
    outerwhich: i64,
    base: i64,
) {
    for i in 0..outertags.len() {
        if outertags[i] as i64 == outerwhich {
            let inner = outerindex[i] as usize;
            if innertags[inner] as i64 == innerwhich {
                totags[i] = towhich as i8;
                toindex[i] = base + innerindex[inner];
            }
        }
    }
}

/// Validity sweep of a union: tags in range and every gathered index inside its
/// branch's content.
pub fn union_validity(
    tags: &[i8],
    index: &[i64],
    numcontents: usize,
    lencontents: &[i64],
) -> KernelResult<()> {
    if index.len() < tags.len() {
        return Err(KernelError::new("len(index) < len(tags)"));
    }
    for i in 0..tags.len() {
        let tag = tags[i];
        if tag < 0 || tag as usize >= numcontents {
            return Err(KernelError::at("tags[i] >= len(contents)", i as i64));
        }
        let idx = index[i];
        if idx < 0 || idx >= lencontents[tag as usize] {
            return Err(KernelError::at("index[i] >= len(content(tags[i]))", i as i64));
        }
    }
    Ok(())
}

/// Combine per-branch flatten offsets through a union's tags/index: the union-level
/// offsets plus the element-order tags/index over the flattened branches.
pub fn union_flatten_combine(
    tags: &[i8],
    index: &[i64],
    branch_offsets: &[Vec<i64>],
) -> (Vec<i64>, Vec<i8>, Vec<i64>) {
    let mut tooffsets = Vec::with_capacity(tags.len() + 1);
    let mut totags = Vec::new();
    let mut toindex = Vec::new();
    tooffsets.push(0);
    for i in 0..tags.len() {
        let tag = tags[i] as usize;
        let offsets = &branch_offsets[tag];
        let at = index[i] as usize;
        let (start, stop) = (offsets[at], offsets[at + 1]);
        for j in start..stop {
            totags.push(tags[i]);
            toindex.push(j);
        }
        tooffsets.push(totags.len() as i64);
    }
    (tooffsets, totags, toindex)
}

/// Offsets grouping reduction rows by their (nondecreasing) parents: group `p` spans
/// the rows whose parent is `p`.
pub fn reduce_outoffsets(parents: &[i64], outlength: i64) -> Vec<i64> {
    let mut counts = vec![0i64; outlength as usize];
    for &p in parents {
        counts[p as usize] += 1;
    }
    let mut offsets = Vec::with_capacity(outlength as usize + 1);
    offsets.push(0);
    for c in counts {
        offsets.push(offsets.last().copied().unwrap_or(0) + c);
    }
    offsets
}

/// The two-branch union routing used by `fillna`: missing elements select branch 1
/// element 0, everything else keeps its position in branch 0.
pub fn union_fillna(index: &[i64]) -> (Vec<i8>, Vec<i64>) {
    let mut tags = Vec::with_capacity(index.len());
    let mut outindex = Vec::with_capacity(index.len());
    for &idx in index {
        if idx < 0 {
            tags.push(1);
            outindex.push(0);
        } else {
            tags.push(0);
            outindex.push(idx);
        }
    }
    (tags, outindex)
}

/// Expand a packed bit mask into one byte per element.
pub fn bytemask_from_bits(bits: &[u8], length: usize, lsb_order: bool) -> Vec<i8> {
    (0..length)
        .map(|i| {
            let byte = bits[i / 8];
            let bit = if lsb_order {
                (byte >> (i % 8)) & 1
            } else {
                (byte >> (7 - i % 8)) & 1
            };
            bit as i8
        })
        .collect()
}

/// Validity sweep of a list layer: every list within `[0, len_content]`, stops after
/// starts.
pub fn list_validity(starts: &[i64], stops: &[i64], len_content: i64) -> KernelResult<()> {
    for i in 0..starts.len() {
        if stops[i] < starts[i] {
            return Err(KernelError::at("stops[i] < starts[i]", i as i64));
        }
        if starts[i] < 0 {
            return Err(KernelError::at("starts[i] < 0", i as i64));
        }
        if starts[i] != stops[i] && stops[i] > len_content {
            return Err(KernelError::at("stops[i] > len(content)", i as i64));
        }
    }
    Ok(())
}

/// Validity sweep of list offsets: monotone nondecreasing and inside the content.
pub fn offsets_validity(offsets: &[i64], len_content: i64) -> KernelResult<()> {
    if offsets.is_empty() {
        return Err(KernelError::new("offsets must have at least one entry"));
    }
    if offsets[0] < 0 {
        return Err(KernelError::new("offsets[0] < 0"));
    }
    for i in 0..offsets.len() - 1 {
        if offsets[i + 1] < offsets[i] {
            return Err(KernelError::at("offsets are not monotonically increasing", i as i64));
        }
    }
    if offsets[offsets.len() - 1] > len_content {
        return Err(KernelError::new("offsets beyond the length of the content"));
    }
    Ok(())
}

/// Validity sweep of a gather index: in bounds, negatives allowed iff `allow_missing`.
pub fn index_validity(index: &[i64], len_content: i64, allow_missing: bool) -> KernelResult<()> {
    for (i, &idx) in index.iter().enumerate() {
        if idx < 0 && !allow_missing {
            return Err(KernelError::at("index[i] < 0", i as i64));
        }
        if idx >= len_content {
            return Err(KernelError::at("index[i] >= len(content)", i as i64));
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rpad_rows() {
        // rows of lengths [2, 3, 0] padded to 3
        let (offsets, index) = list_rpad(&[0, 2, 5], &[2, 5, 5], 3, false);
        assert_eq!(offsets, vec![0, 3, 6, 9]);
        assert_eq!(index, vec![0, 1, -1, 2, 3, 4, -1, -1, -1]);
    }

    #[test]
    fn rpad_clip_truncates() {
        let (offsets, index) = list_rpad(&[0, 2], &[2, 5], 2, true);
        assert_eq!(offsets, vec![0, 2, 4]);
        assert_eq!(index, vec![0, 1, 2, 3]);
    }

    #[test]
    fn combinations_pairs() {
        let (offsets, columns) = list_combinations(&[0, 3], &[3, 5], 2, false);
        assert_eq!(offsets, vec![0, 3, 4]);
        assert_eq!(columns[0], vec![0, 0, 1, 3]);
        assert_eq!(columns[1], vec![1, 2, 2, 4]);
    }

    #[test]
    fn combinations_with_replacement() {
        let columns = axis0_combinations(2, 2, true);
        assert_eq!(columns[0], vec![0, 0, 1]);
        assert_eq!(columns[1], vec![0, 1, 1]);
    }

    #[test]
    fn regular_index_counts_per_tag() {
        let out = union_regular_index(&[0, 1, 0, 1, 1], 2);
        assert_eq!(out, vec![0, 0, 1, 1, 2]);
    }

    #[test]
    fn bit_expansion_orders() {
        assert_eq!(bytemask_from_bits(&[0b0000_0101], 3, true), vec![1, 0, 1]);
        assert_eq!(bytemask_from_bits(&[0b1010_0000], 3, false), vec![1, 0, 1]);
    }

    #[test]
    fn offsets_must_be_monotone() {
        assert!(offsets_validity(&[0, 2, 1], 5).is_err());
        assert!(offsets_validity(&[0, 2, 5], 5).is_ok());
        assert!(offsets_validity(&[0, 2, 6], 5).is_err());
    }
}
