// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Some helper mathematics.


use itertools::Itertools;
use marlu::c64;
use num_traits::Float;

/// Complex exponential. The argument is assumed to be purely imaginary.
///
/// This function doesn't actually use complex numbers; it just returns the real
/// and imag components from Euler's formula (i.e. e^{ix} = cos{x} + i sin{x}).
///
/// # Examples
///
/// `assert_abs_diff_eq!(cexp(PI), c64::new(-1.0, 0.0));`
#[inline]
pub(crate) fn cexp(x: f64) -> c64 {
    let (im, re) = x.sin_cos();
    c64::new(re, im)
}

/// The unnormalised sinc function, sin(x) / x, with sinc(0) = 1 exactly.
#[inline]
pub(crate) fn sinc<F: Float>(x: F) -> F {
    if x == F::zero() {
        F::one()
    } else {
        x.sin() / x
    }
}

/// Convert an `f64` into another float type. Infallible for the float types
/// used in this crate.
#[inline]
pub(crate) fn cast<F: Float>(x: f64) -> F {
    F::from(x).expect("f64 is representable in the target float type")
}

/// The number of cross-correlation baselines formed by `num_stations`
/// stations.
#[inline]
pub(crate) fn num_cross_baselines(num_stations: usize) -> usize {
    num_stations * num_stations.saturating_sub(1) / 2
}

/// All station pairs (i, j) with i < j, in baseline order: (0,1), (0,2), ...,
/// (1,2), ... The index of a pair in this sequence is its baseline index.
pub(crate) fn baseline_pairs(num_stations: usize) -> Vec<(usize, usize)> {
    (0..num_stations).tuple_combinations().collect()
}
