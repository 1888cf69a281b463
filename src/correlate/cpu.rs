// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Host correlator kernels.
//!
//! Each baseline's accumulation is independent, so baselines are fanned out
//! over a rayon pool. The per-baseline source sum is evaluated strictly in
//! index order, which makes the result identical to a sequential evaluation
//! regardless of how baselines are scheduled. Arithmetic stays in the
//! precision of the input buffers.

use marlu::Jones;
use num_complex::Complex;
use num_traits::Float;
use rayon::prelude::*;

use super::CorrelatorOptions;
use crate::{
    constants::PI,
    math::{cast, sinc},
};

/// Per-baseline geometry shared by the scalar and matrix kernels: the
/// baseline (u, v) in wavelengths and the bandwidth-smearing prefactors.
/// Returns `None` if the baseline fails the UV-length filter.
#[inline]
fn baseline_terms<F: Float>(
    u_p: F,
    v_p: F,
    u_q: F,
    v_q: F,
    options: &CorrelatorOptions,
) -> Option<(F, F)> {
    let inv_wavelength = cast::<F>(options.inv_wavelength);
    let uu = (u_p - u_q) * inv_wavelength;
    let vv = (v_p - v_q) * inv_wavelength;
    let uv_len = (uu * uu + vv * vv).sqrt();
    if uv_len < cast(options.uv_min_lambda) || uv_len > cast(options.uv_max_lambda) {
        return None;
    }
    let pi_frac_bw = cast::<F>(PI) * cast(options.frac_bandwidth);
    Some((uu * pi_frac_bw, vv * pi_frac_bw))
}

#[allow(clippy::too_many_arguments)]
pub(super) fn correlate_scalar<F: Float + Send + Sync>(
    num_sources: usize,
    baselines: &[(usize, usize)],
    jones: &[Complex<F>],
    source_i: &[F],
    source_l: &[F],
    source_m: &[F],
    station_u: &[F],
    station_v: &[F],
    options: &CorrelatorOptions,
    vis: &mut [Complex<F>],
) {
    vis.par_iter_mut()
        .zip(baselines.par_iter())
        .for_each(|(vis, &(p, q))| {
            let Some((bw_u, bw_v)) =
                baseline_terms(station_u[p], station_v[p], station_u[q], station_v[q], options)
            else {
                return;
            };

            let mut sum = Complex::new(F::zero(), F::zero());
            for k in 0..num_sources {
                let smear = sinc(bw_u * source_l[k] + bw_v * source_m[k]);
                let j_p = jones[p * num_sources + k];
                let j_q = jones[q * num_sources + k];
                sum = sum + j_p * j_q.conj() * (source_i[k] * smear);
            }
            *vis += sum;
        });
}

#[allow(clippy::too_many_arguments)]
pub(super) fn correlate_matrix<F: Float + Send + Sync>(
    num_sources: usize,
    baselines: &[(usize, usize)],
    jones: &[Jones<F>],
    source_i: &[F],
    source_l: &[F],
    source_m: &[F],
    station_u: &[F],
    station_v: &[F],
    options: &CorrelatorOptions,
    vis: &mut [Jones<F>],
) {
    vis.par_iter_mut()
        .zip(baselines.par_iter())
        .for_each(|(vis, &(p, q))| {
            let Some((bw_u, bw_v)) =
                baseline_terms(station_u[p], station_v[p], station_u[q], station_v[q], options)
            else {
                return;
            };

            // The unpolarised brightness matrix is I times the identity, so
            // the per-source product collapses to (J_p J_q^H) scaled by the
            // smeared flux density.
            let mut sum = Jones::from([Complex::new(F::zero(), F::zero()); 4]);
            for k in 0..num_sources {
                let smear = sinc(bw_u * source_l[k] + bw_v * source_m[k]);
                let j_p = jones[p * num_sources + k];
                let j_q = jones[q * num_sources + k];
                sum += (j_p * j_q.h()) * (source_i[k] * smear);
            }
            *vis += sum;
        });
}
