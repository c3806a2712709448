//! Kernels behind the slice protocol: range regularization, gather-index construction,
//! and the jagged apply/descend/expand loops.

use crate::kernels::{KernelError, KernelResult};

/// Regularize a Python-style range against `length`: wrap negative bounds, clamp, and
/// substitute the step-appropriate defaults for absent bounds. Returns `(start, stop)`
/// positions for iteration `start, start+step, ...` while `step > 0 ? i < stop :
/// i > stop`.
pub fn regularize_rangeslice(
    start: Option<i64>,
    stop: Option<i64>,
    step: i64,
    length: i64,
) -> (i64, i64) {
    debug_assert!(step != 0);
    if step > 0 {
        let mut s = start.unwrap_or(0);
        if s < 0 {
            s += length;
        }
        let mut e = stop.unwrap_or(length);
        if e < 0 {
            e += length;
        }
        s = s.clamp(0, length);
        e = e.clamp(s, length);
        (s, e)
    } else {
        let mut s = start.unwrap_or(length - 1);
        if s < 0 {
            s += length;
        }
        s = s.clamp(-1, length - 1);
        let mut e = match stop {
            None => -1,
            Some(e) if e < 0 => (e + length).max(-1),
            Some(e) => e.min(length - 1),
        };
        if e > s {
            e = s;
        }
        (s, e)
    }
}

/// Number of positions a regularized `(start, stop, step)` triple visits.
pub fn rangeslice_count(start: i64, stop: i64, step: i64) -> i64 {
    if step > 0 {
        (stop - start + step - 1).div_euclid(step).max(0)
    } else {
        (stop - start + step + 1).div_euclid(step).max(0)
    }
}

/// Wrap negative entries of a flat array-slice against `length` and bounds-check.
pub fn regularize_arrayslice(flat: &[i64], length: i64) -> KernelResult<Vec<i64>> {
    let mut out = Vec::with_capacity(flat.len());
    for (i, &raw) in flat.iter().enumerate() {
        let idx = if raw < 0 { raw + length } else { raw };
        if idx < 0 || idx >= length {
            return Err(KernelError::at("index out of range", i as i64));
        }
        out.push(idx);
    }
    Ok(out)
}

/// Gather positions through an index with bounds checks; used by `carry` on gathers.
pub fn index_carry(index: &[i64], carry: &[i64], len_content: i64) -> KernelResult<Vec<i64>> {
    let mut out = Vec::with_capacity(carry.len());
    for (i, &c) in carry.iter().enumerate() {
        if c < 0 || c as usize >= index.len() {
            return Err(KernelError::at("index out of range", i as i64));
        }
        let idx = index[c as usize];
        if idx >= len_content {
            return Err(KernelError::at("index out of range", i as i64));
        }
        out.push(idx);
    }
    Ok(out)
}

/// Gather positions through an index without bounds checks on the gathered values;
/// used where negative (missing) entries must flow through untouched.
pub fn index_carry_nocheck(index: &[i64], carry: &[i64]) -> KernelResult<Vec<i64>> {
    let mut out = Vec::with_capacity(carry.len());
    for (i, &c) in carry.iter().enumerate() {
        if c < 0 || c as usize >= index.len() {
            return Err(KernelError::at("index out of range", i as i64));
        }
        out.push(index[c as usize]);
    }
    Ok(out)
}

/// `SliceAt` on a list layer: one gather position per list.
pub fn list_getitem_next_at(starts: &[i64], stops: &[i64], at: i64) -> KernelResult<Vec<i64>> {
    let mut nextcarry = Vec::with_capacity(starts.len());
    for i in 0..starts.len() {
        let length = stops[i] - starts[i];
        let regular = if at < 0 { at + length } else { at };
        if regular < 0 || regular >= length {
            return Err(KernelError::at("index out of range", i as i64));
        }
        nextcarry.push(starts[i] + regular);
    }
    Ok(nextcarry)
}

/// `SliceRange` on a list layer: per-list narrowed offsets plus the gather index.
pub fn list_getitem_next_range(
    starts: &[i64],
    stops: &[i64],
    start: Option<i64>,
    stop: Option<i64>,
    step: i64,
) -> (Vec<i64>, Vec<i64>) {
    let mut nextoffsets = Vec::with_capacity(starts.len() + 1);
    let mut nextcarry = Vec::new();
    nextoffsets.push(0);
    for i in 0..starts.len() {
        let length = stops[i] - starts[i];
        let (s, e) = regularize_rangeslice(start, stop, step, length);
        let mut pos = s;
        while if step > 0 { pos < e } else { pos > e } {
            nextcarry.push(starts[i] + pos);
            pos += step;
        }
        nextoffsets.push(nextcarry.len() as i64);
    }
    (nextoffsets, nextcarry)
}

/// `SliceArray64` on a list layer with no advanced index in flight: the full outer
/// product of lists and picks, plus the broadcast advanced index.
pub fn list_getitem_next_array(
    starts: &[i64],
    stops: &[i64],
    flathead: &[i64],
) -> KernelResult<(Vec<i64>, Vec<i64>)> {
    let mut nextcarry = Vec::with_capacity(starts.len() * flathead.len());
    let mut nextadvanced = Vec::with_capacity(starts.len() * flathead.len());
    for i in 0..starts.len() {
        let length = stops[i] - starts[i];
        for (j, &raw) in flathead.iter().enumerate() {
            let idx = if raw < 0 { raw + length } else { raw };
            if idx < 0 || idx >= length {
                return Err(KernelError::at("index out of range", i as i64));
            }
            nextcarry.push(starts[i] + idx);
            nextadvanced.push(j as i64);
        }
    }
    Ok((nextcarry, nextadvanced))
}

/// `SliceArray64` on a list layer with an advanced index in flight: one pick per list,
/// selected by the advanced index.
pub fn list_getitem_next_array_advanced(
    starts: &[i64],
    stops: &[i64],
    flathead: &[i64],
    advanced: &[i64],
) -> KernelResult<(Vec<i64>, Vec<i64>)> {
    let mut nextcarry = Vec::with_capacity(starts.len());
    let mut nextadvanced = Vec::with_capacity(starts.len());
    for i in 0..starts.len() {
        let length = stops[i] - starts[i];
        let a = advanced[i];
        if a as usize >= flathead.len() {
            return Err(KernelError::at("advanced index out of range", i as i64));
        }
        let raw = flathead[a as usize];
        let idx = if raw < 0 { raw + length } else { raw };
        if idx < 0 || idx >= length {
            return Err(KernelError::at("index out of range", i as i64));
        }
        nextcarry.push(starts[i] + idx);
        nextadvanced.push(a);
    }
    Ok((nextcarry, nextadvanced))
}

/// Tile jagged-slice offsets across the rows of a regular layer.
pub fn regular_getitem_jagged_expand(
    offsets: &[i64],
    size: i64,
    length: i64,
) -> KernelResult<(Vec<i64>, Vec<i64>)> {
    if offsets.len() as i64 != size + 1 {
        return Err(KernelError::new(
            "jagged slice length does not fit the regular size",
        ));
    }
    let mut multistarts = Vec::with_capacity((length * size) as usize);
    let mut multistops = Vec::with_capacity((length * size) as usize);
    for _ in 0..length {
        for j in 0..size as usize {
            multistarts.push(offsets[j]);
            multistops.push(offsets[j + 1]);
        }
    }
    Ok((multistarts, multistops))
}

/// Apply a jagged array-slice to a list layer: per-row picks regularized against the
/// row length, producing compact offsets and the gather index.
pub fn list_getitem_jagged_apply(
    slicestarts: &[i64],
    slicestops: &[i64],
    sliceindex: &[i64],
    starts: &[i64],
    stops: &[i64],
) -> KernelResult<(Vec<i64>, Vec<i64>)> {
    let mut outoffsets = Vec::with_capacity(slicestarts.len() + 1);
    let mut nextcarry = Vec::new();
    outoffsets.push(0);
    for i in 0..slicestarts.len() {
        if slicestops[i] < slicestarts[i] {
            return Err(KernelError::at("jagged slice's stops[i] < starts[i]", i as i64));
        }
        let rowlen = stops[i] - starts[i];
        for s in slicestarts[i]..slicestops[i] {
            let raw = sliceindex[s as usize];
            let idx = if raw < 0 { raw + rowlen } else { raw };
            if idx < 0 || idx >= rowlen {
                return Err(KernelError::at("index out of range in jagged slice", i as i64));
            }
            nextcarry.push(starts[i] + idx);
        }
        outoffsets.push(nextcarry.len() as i64);
    }
    Ok((outoffsets, nextcarry))
}

/// Apply a jagged missing-slice to a list layer: like [`list_getitem_jagged_apply`]
/// but the per-row expression may mark output slots missing. Returns compact offsets
/// over the full (missing-included) output, the option routing index, and the gather
/// index of the non-missing picks.
pub fn list_getitem_jagged_apply_missing(
    slicestarts: &[i64],
    slicestops: &[i64],
    missingindex: &[i64],
    picks: &[i64],
    starts: &[i64],
    stops: &[i64],
) -> KernelResult<(Vec<i64>, Vec<i64>, Vec<i64>)> {
    let mut outoffsets = Vec::with_capacity(slicestarts.len() + 1);
    let mut outindex = Vec::new();
    let mut nextcarry = Vec::new();
    outoffsets.push(0);
    for i in 0..slicestarts.len() {
        if slicestops[i] < slicestarts[i] {
            return Err(KernelError::at("jagged slice's stops[i] < starts[i]", i as i64));
        }
        let rowlen = stops[i] - starts[i];
        for s in slicestarts[i]..slicestops[i] {
            let m = missingindex[s as usize];
            if m < 0 {
                outindex.push(-1);
                continue;
            }
            let raw = picks[m as usize];
            let idx = if raw < 0 { raw + rowlen } else { raw };
            if idx < 0 || idx >= rowlen {
                return Err(KernelError::at("index out of range in jagged slice", i as i64));
            }
            outindex.push(nextcarry.len() as i64);
            nextcarry.push(starts[i] + idx);
        }
        outoffsets.push(outindex.len() as i64);
    }
    Ok((outoffsets, outindex, nextcarry))
}

/// Descend a jagged-of-jagged slice one level: row lengths must match exactly.
pub fn list_getitem_jagged_descend(
    slicestarts: &[i64],
    slicestops: &[i64],
    starts: &[i64],
    stops: &[i64],
) -> KernelResult<Vec<i64>> {
    let mut outoffsets = Vec::with_capacity(slicestarts.len() + 1);
    outoffsets.push(0);
    for i in 0..slicestarts.len() {
        let slicecount = slicestops[i] - slicestarts[i];
        let count = stops[i] - starts[i];
        if slicecount != count {
            return Err(KernelError::at(
                "jagged slice inner length differs from array inner length",
                i as i64,
            ));
        }
        outoffsets.push(outoffsets[i as usize] + count);
    }
    Ok(outoffsets)
}

/// Count the missing entries of an option index.
pub fn option_numnull(index: &[i64]) -> usize {
    index.iter().filter(|&&i| i < 0).count()
}

/// Split an option index into the gather of its non-missing positions plus the routing
/// index that reassembles the option after a recursion.
pub fn option_nextcarry_outindex(
    index: &[i64],
    len_content: i64,
) -> KernelResult<(Vec<i64>, Vec<i64>)> {
    let mut nextcarry = Vec::with_capacity(index.len());
    let mut outindex = Vec::with_capacity(index.len());
    for (i, &idx) in index.iter().enumerate() {
        if idx < 0 {
            outindex.push(-1);
        } else if idx >= len_content {
            return Err(KernelError::at("index out of range", i as i64));
        } else {
            outindex.push(nextcarry.len() as i64);
            nextcarry.push(idx);
        }
    }
    Ok((nextcarry, outindex))
}

/// Drop the jagged-slice rows that correspond to missing elements of an option index.
pub fn option_project_jagged(
    index: &[i64],
    slicestarts: &[i64],
    slicestops: &[i64],
) -> KernelResult<(Vec<i64>, Vec<i64>)> {
    if slicestarts.len() != index.len() {
        return Err(KernelError::new(
            "jagged slice length differs from array length",
        ));
    }
    let mut reducedstarts = Vec::with_capacity(index.len());
    let mut reducedstops = Vec::with_capacity(index.len());
    for (i, &idx) in index.iter().enumerate() {
        if idx >= 0 {
            reducedstarts.push(slicestarts[i]);
            reducedstops.push(slicestops[i]);
        }
    }
    Ok((reducedstarts, reducedstops))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn regularize_positive_step() {
        assert_eq!(regularize_rangeslice(None, None, 1, 5), (0, 5));
        assert_eq!(regularize_rangeslice(Some(-2), None, 1, 5), (3, 5));
        assert_eq!(regularize_rangeslice(Some(1), Some(-1), 1, 5), (1, 4));
        assert_eq!(regularize_rangeslice(Some(7), Some(9), 1, 5), (5, 5));
    }

    #[test]
    fn regularize_negative_step() {
        assert_eq!(regularize_rangeslice(None, None, -1, 5), (4, -1));
        assert_eq!(regularize_rangeslice(Some(3), Some(0), -1, 5), (3, 0));
        assert_eq!(rangeslice_count(4, -1, -1), 5);
        assert_eq!(rangeslice_count(3, 0, -1), 3);
    }

    #[test]
    fn range_counts() {
        assert_eq!(rangeslice_count(0, 5, 2), 3);
        assert_eq!(rangeslice_count(0, 5, 1), 5);
        assert_eq!(rangeslice_count(2, 2, 1), 0);
    }

    #[test]
    fn at_kernel_wraps_and_checks() {
        let starts = [0i64, 2, 2];
        let stops = [2i64, 2, 5];
        assert!(list_getitem_next_at(&starts, &stops, 0).is_err()); // row 1 is empty
        let ok = list_getitem_next_at(&[0, 2], &[2, 5], -1).unwrap();
        assert_eq!(ok, vec![1, 4]);
    }

    #[test]
    fn jagged_apply() {
        // rows [10,20,30], [], [40,50] picked by [[0,2],[],[0]]
        let (offsets, carry) = list_getitem_jagged_apply(
            &[0, 2, 2],
            &[2, 2, 3],
            &[0, 2, 0],
            &[0, 3, 3],
            &[3, 3, 5],
        )
        .unwrap();
        assert_eq!(offsets, vec![0, 2, 2, 3]);
        assert_eq!(carry, vec![0, 2, 3]);
    }

    #[test]
    fn jagged_descend_requires_equal_rows() {
        assert!(list_getitem_jagged_descend(&[0, 2], &[2, 4], &[0, 3], &[3, 5]).is_err());
        let offsets =
            list_getitem_jagged_descend(&[0, 2], &[2, 4], &[0, 2], &[2, 4]).unwrap();
        assert_eq!(offsets, vec![0, 2, 4]);
    }

    #[test]
    fn outindex_routing() {
        let (nextcarry, outindex) = option_nextcarry_outindex(&[0, -1, 2, -1], 3).unwrap();
        assert_eq!(nextcarry, vec![0, 2]);
        assert_eq!(outindex, vec![0, -1, 1, -1]);
        assert_eq!(option_numnull(&[0, -1, 2, -1]), 2);
    }
}
