//! The reducer protocol: abstract segment-aggregation operators applied through
//! `reduce_next`.
//!
//! A reducer sees only flat leaves: `apply` aggregates the elements of a contiguous
//! one-dimensional leaf into `outlength` groups keyed by `parents`. The recursive part
//! of a reduction (rearranging parents through list layers, projecting options,
//! distributing over record fields) lives on the nodes.

use num_traits::{Bounded, NumCast};
use ragged_dtype::{PType, match_each_native_ptype};
use ragged_error::{RaggedResult, ragged_err};

use crate::{Index64, NumpyArray};

/// An abstract segment-aggregation operator.
pub trait Reducer: Send + Sync {
    /// The operator's name, used in error messages.
    fn name(&self) -> &'static str;

    /// The element type of the reduction of a leaf of type `given`.
    fn return_ptype(&self, given: PType) -> PType;

    /// Aggregate a contiguous one-dimensional leaf into `outlength` groups keyed by
    /// `parents` (one entry per element). Groups with no elements yield the
    /// operator's identity.
    fn apply(
        &self,
        leaf: &NumpyArray,
        parents: &Index64,
        outlength: i64,
    ) -> RaggedResult<NumpyArray>;
}

fn check_parents(leaf: &NumpyArray, parents: &Index64, outlength: i64) -> RaggedResult<()> {
    if parents.len() != leaf.len() {
        return Err(
            ragged_err!("reducer parents length {} differs from leaf length {}",
                parents.len(),
                leaf.len()),
        );
    }
    for &p in parents.as_slice() {
        if p < 0 || p >= outlength {
            return Err(ragged_err!(OutOfRange: "reducer parent {p} out of range for {outlength} groups"));
        }
    }
    Ok(())
}

/// The number of elements in each group.
pub struct Count;

impl Reducer for Count {
    fn name(&self) -> &'static str {
        "count"
    }

    fn return_ptype(&self, _given: PType) -> PType {
        PType::I64
    }

    fn apply(
        &self,
        leaf: &NumpyArray,
        parents: &Index64,
        outlength: i64,
    ) -> RaggedResult<NumpyArray> {
        check_parents(leaf, parents, outlength)?;
        let mut acc = vec![0i64; outlength as usize];
        for &p in parents.as_slice() {
            acc[p as usize] += 1;
        }
        Ok(NumpyArray::from_vec(acc))
    }
}

/// The number of non-zero elements in each group.
pub struct CountNonzero;

impl Reducer for CountNonzero {
    fn name(&self) -> &'static str {
        "count_nonzero"
    }

    fn return_ptype(&self, _given: PType) -> PType {
        PType::I64
    }

    fn apply(
        &self,
        leaf: &NumpyArray,
        parents: &Index64,
        outlength: i64,
    ) -> RaggedResult<NumpyArray> {
        check_parents(leaf, parents, outlength)?;
        let mut acc = vec![0i64; outlength as usize];
        match_each_native_ptype!(leaf.ptype(), |$T| {
            let values = leaf.as_slice::<$T>();
            for (i, &p) in parents.as_slice().iter().enumerate() {
                if values[i] != <$T>::default() {
                    acc[p as usize] += 1;
                }
            }
        });
        Ok(NumpyArray::from_vec(acc))
    }
}

/// The accumulator type of an arithmetic reduction over a leaf of `given` elements:
/// floats widen to `f64`, unsigned integers to `u64`, everything else (signed
/// integers and bools) to `i64`.
fn arithmetic_return_ptype(given: PType) -> PType {
    if given.is_float() {
        PType::F64
    } else if given.is_unsigned_int() {
        PType::U64
    } else {
        PType::I64
    }
}

/// Segment-fold a leaf into `f64` accumulators.
fn fold_f64(
    leaf: &NumpyArray,
    parents: &Index64,
    outlength: i64,
    init: f64,
    op: fn(f64, f64) -> f64,
) -> NumpyArray {
    let mut acc = vec![init; outlength as usize];
    match_each_native_ptype!(leaf.ptype(), |$T| {
        let values = leaf.as_slice::<$T>();
        for (i, &p) in parents.as_slice().iter().enumerate() {
            let v: f64 = NumCast::from(values[i]).unwrap_or(f64::NAN);
            acc[p as usize] = op(acc[p as usize], v);
        }
    });
    NumpyArray::from_vec(acc)
}

/// Segment-fold an unsigned integer leaf into `u64` accumulators. Integer leaves fold
/// in native integer arithmetic; a detour through f64 would lose exactness past 2^53.
fn fold_u64(
    leaf: &NumpyArray,
    parents: &Index64,
    outlength: i64,
    init: u64,
    op: fn(u64, u64) -> u64,
) -> NumpyArray {
    let mut acc = vec![init; outlength as usize];
    match_each_native_ptype!(leaf.ptype(), |$T| {
        let values = leaf.as_slice::<$T>();
        for (i, &p) in parents.as_slice().iter().enumerate() {
            let v: u64 = NumCast::from(values[i]).unwrap_or_default();
            acc[p as usize] = op(acc[p as usize], v);
        }
    });
    NumpyArray::from_vec(acc)
}

/// Segment-fold a signed integer (or bool) leaf into `i64` accumulators, exactly.
fn fold_i64(
    leaf: &NumpyArray,
    parents: &Index64,
    outlength: i64,
    init: i64,
    op: fn(i64, i64) -> i64,
) -> NumpyArray {
    let mut acc = vec![init; outlength as usize];
    match_each_native_ptype!(leaf.ptype(), |$T| {
        let values = leaf.as_slice::<$T>();
        for (i, &p) in parents.as_slice().iter().enumerate() {
            let v: i64 = NumCast::from(values[i]).unwrap_or_default();
            acc[p as usize] = op(acc[p as usize], v);
        }
    });
    NumpyArray::from_vec(acc)
}

/// The sum of each group; empty groups yield zero.
pub struct Sum;

impl Reducer for Sum {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn return_ptype(&self, given: PType) -> PType {
        arithmetic_return_ptype(given)
    }

    fn apply(
        &self,
        leaf: &NumpyArray,
        parents: &Index64,
        outlength: i64,
    ) -> RaggedResult<NumpyArray> {
        check_parents(leaf, parents, outlength)?;
        Ok(match self.return_ptype(leaf.ptype()) {
            PType::F64 => fold_f64(leaf, parents, outlength, 0.0, |a, b| a + b),
            PType::U64 => fold_u64(leaf, parents, outlength, 0, |a, b| a + b),
            _ => fold_i64(leaf, parents, outlength, 0, |a, b| a + b),
        })
    }
}

/// The product of each group; empty groups yield one.
pub struct Prod;

impl Reducer for Prod {
    fn name(&self) -> &'static str {
        "prod"
    }

    fn return_ptype(&self, given: PType) -> PType {
        arithmetic_return_ptype(given)
    }

    fn apply(
        &self,
        leaf: &NumpyArray,
        parents: &Index64,
        outlength: i64,
    ) -> RaggedResult<NumpyArray> {
        check_parents(leaf, parents, outlength)?;
        Ok(match self.return_ptype(leaf.ptype()) {
            PType::F64 => fold_f64(leaf, parents, outlength, 1.0, |a, b| a * b),
            PType::U64 => fold_u64(leaf, parents, outlength, 1, |a, b| a * b),
            _ => fold_i64(leaf, parents, outlength, 1, |a, b| a * b),
        })
    }
}

/// Whether any element of each group is non-zero; empty groups yield `false`.
pub struct Any;

impl Reducer for Any {
    fn name(&self) -> &'static str {
        "any"
    }

    fn return_ptype(&self, _given: PType) -> PType {
        PType::Bool
    }

    fn apply(
        &self,
        leaf: &NumpyArray,
        parents: &Index64,
        outlength: i64,
    ) -> RaggedResult<NumpyArray> {
        check_parents(leaf, parents, outlength)?;
        let mut acc = vec![false; outlength as usize];
        match_each_native_ptype!(leaf.ptype(), |$T| {
            let values = leaf.as_slice::<$T>();
            for (i, &p) in parents.as_slice().iter().enumerate() {
                if values[i] != <$T>::default() {
                    acc[p as usize] = true;
                }
            }
        });
        Ok(NumpyArray::from_bools(&acc))
    }
}

/// Whether every element of each group is non-zero; empty groups yield `true`.
pub struct All;

impl Reducer for All {
    fn name(&self) -> &'static str {
        "all"
    }

    fn return_ptype(&self, _given: PType) -> PType {
        PType::Bool
    }

    fn apply(
        &self,
        leaf: &NumpyArray,
        parents: &Index64,
        outlength: i64,
    ) -> RaggedResult<NumpyArray> {
        check_parents(leaf, parents, outlength)?;
        let mut acc = vec![true; outlength as usize];
        match_each_native_ptype!(leaf.ptype(), |$T| {
            let values = leaf.as_slice::<$T>();
            for (i, &p) in parents.as_slice().iter().enumerate() {
                if values[i] == <$T>::default() {
                    acc[p as usize] = false;
                }
            }
        });
        Ok(NumpyArray::from_bools(&acc))
    }
}

/// Segment-fold a leaf in its own element type, keeping the extremum selected by
/// `keep`; empty groups yield `init`.
fn fold_extremum<T: ragged_dtype::NativePType>(
    values: &[T],
    parents: &Index64,
    outlength: i64,
    init: T,
    keep: fn(T, T) -> bool,
) -> Vec<T> {
    let mut acc = vec![init; outlength as usize];
    for (i, &p) in parents.as_slice().iter().enumerate() {
        if keep(values[i], acc[p as usize]) {
            acc[p as usize] = values[i];
        }
    }
    acc
}

/// The smallest element of each group; empty groups yield the type's maximum.
pub struct Min;

impl Reducer for Min {
    fn name(&self) -> &'static str {
        "min"
    }

    fn return_ptype(&self, given: PType) -> PType {
        given
    }

    fn apply(
        &self,
        leaf: &NumpyArray,
        parents: &Index64,
        outlength: i64,
    ) -> RaggedResult<NumpyArray> {
        check_parents(leaf, parents, outlength)?;
        match_each_native_ptype!(leaf.ptype(), |$T| {
            let acc = fold_extremum(
                leaf.as_slice::<$T>(),
                parents,
                outlength,
                <$T as Bounded>::max_value(),
                |v, best| v < best,
            );
            // Bool is stored as u8, so restore the element type.
            Ok(NumpyArray::from_vec(acc).with_ptype(leaf.ptype()))
        })
    }
}

/// The largest element of each group; empty groups yield the type's minimum.
pub struct Max;

impl Reducer for Max {
    fn name(&self) -> &'static str {
        "max"
    }

    fn return_ptype(&self, given: PType) -> PType {
        given
    }

    fn apply(
        &self,
        leaf: &NumpyArray,
        parents: &Index64,
        outlength: i64,
    ) -> RaggedResult<NumpyArray> {
        check_parents(leaf, parents, outlength)?;
        match_each_native_ptype!(leaf.ptype(), |$T| {
            let acc = fold_extremum(
                leaf.as_slice::<$T>(),
                parents,
                outlength,
                <$T as Bounded>::min_value(),
                |v, best| v > best,
            );
            // Bool is stored as u8, so restore the element type.
            Ok(NumpyArray::from_vec(acc).with_ptype(leaf.ptype()))
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn leaf() -> NumpyArray {
        NumpyArray::from_vec(vec![1i64, 2, 3, 4, 5])
    }

    fn parents() -> Index64 {
        Index64::from(vec![0i64, 0, 1, 1, 1])
    }

    #[test]
    fn sum_segments() {
        let out = Sum.apply(&leaf(), &parents(), 3).unwrap();
        assert_eq!(out.as_slice::<i64>(), &[3, 12, 0]);
    }

    #[test]
    fn count_segments() {
        let out = Count.apply(&leaf(), &parents(), 2).unwrap();
        assert_eq!(out.as_slice::<i64>(), &[2, 3]);
    }

    #[test]
    fn min_max_segments() {
        let out = Min.apply(&leaf(), &parents(), 2).unwrap();
        assert_eq!(out.as_slice::<i64>(), &[1, 3]);
        let out = Max.apply(&leaf(), &parents(), 2).unwrap();
        assert_eq!(out.as_slice::<i64>(), &[2, 5]);
    }

    #[test]
    fn large_integer_sums_are_exact() {
        // 2^53 + 1 is not representable in f64
        let big = 9_007_199_254_740_993i64;
        let out = Sum
            .apply(
                &NumpyArray::from_vec(vec![big, 0, 1]),
                &Index64::from(vec![0i64, 0, 1]),
                2,
            )
            .unwrap();
        assert_eq!(out.as_slice::<i64>(), &[big, 1]);

        let big = 18_446_744_073_709_551_615u64; // u64::MAX
        let out = Sum
            .apply(
                &NumpyArray::from_vec(vec![big, 0]),
                &Index64::from(vec![0i64, 0]),
                1,
            )
            .unwrap();
        assert_eq!(out.as_slice::<u64>(), &[big]);
    }

    #[test]
    fn float_sum_promotes() {
        let out = Sum
            .apply(&NumpyArray::from_vec(vec![1.5f32, 2.5]), &Index64::from(vec![0i64, 0]), 1)
            .unwrap();
        assert_eq!(out.ptype(), PType::F64);
        assert_eq!(out.as_slice::<f64>(), &[4.0]);
    }

    #[test]
    fn any_all_empty_groups() {
        let out = Any
            .apply(&NumpyArray::from_vec(Vec::<i64>::new()), &Index64::empty(), 2)
            .unwrap();
        assert_eq!(out.as_slice::<u8>(), &[0, 0]);
        let out = All
            .apply(&NumpyArray::from_vec(Vec::<i64>::new()), &Index64::empty(), 2)
            .unwrap();
        assert_eq!(out.as_slice::<u8>(), &[1, 1]);
    }

    #[test]
    fn bad_parents_rejected() {
        assert!(Sum.apply(&leaf(), &Index64::from(vec![0i64, 0, 1, 1, 9]), 2).is_err());
    }
}
