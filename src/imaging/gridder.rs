// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Convolutional gridding of visibility samples.
//!
//! Coordinates and cell arithmetic are always double precision; only the
//! visibility amplitudes and the grid itself take the caller's precision.
//! Kernel taps are selected by nearest oversample bin. A visibility whose
//! whole support box does not fit on the grid is skipped and counted; there
//! is no wraparound and no clamping.

use num_complex::Complex;
use num_traits::Float;
use thiserror::Error;

use super::kernel::{ConvKernel, WKernelSet};
use crate::math::cast;

#[derive(Error, Debug)]
pub enum GridError {
    #[error("Expected {expected} {what}, but {got} were supplied")]
    ArrayLength {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("The grid has {got} elements, but an image size of {image_size} needs {expected}")]
    GridSize {
        image_size: usize,
        expected: usize,
        got: usize,
    },
}

fn check_lengths<F, C>(
    uu: &[f64],
    vv: &[f64],
    vis: &[Complex<F>],
    image_size: usize,
    grid: &[C],
) -> Result<(), GridError> {
    for (what, len) in [("u coordinates", uu.len()), ("v coordinates", vv.len())] {
        if len != vis.len() {
            return Err(GridError::ArrayLength {
                what,
                expected: vis.len(),
                got: len,
            });
        }
    }
    if grid.len() != image_size * image_size {
        return Err(GridError::GridSize {
            image_size,
            expected: image_size * image_size,
            got: grid.len(),
        });
    }
    Ok(())
}

/// Grid visibilities with a separable 1-D real kernel.
///
/// `uu` and `vv` are in wavelengths. `num_skipped` and `norm` are
/// accumulated, not reset; `norm` gains the sum of every kernel-tap product
/// actually applied.
#[allow(clippy::too_many_arguments)]
pub fn grid_1d_real<F: Float>(
    kernel: &ConvKernel,
    uu: &[f64],
    vv: &[f64],
    vis: &[Complex<F>],
    cell_size_rad: f64,
    image_size: usize,
    num_skipped: &mut usize,
    norm: &mut f64,
    grid: &mut [Complex<F>],
) -> Result<(), GridError> {
    check_lengths(uu, vv, vis, image_size, grid)?;

    let support = kernel.support();
    let oversample = kernel.oversample();
    let conv = kernel.values();
    let grid_size = image_size as i32;
    let g_centre = grid_size / 2;
    let scale = image_size as f64 * cell_size_rad;

    for i in 0..vis.len() {
        // The u axis is mirrored so that image east points left.
        let pos_u = -uu[i] * scale + g_centre as f64;
        let pos_v = vv[i] * scale + g_centre as f64;
        let grid_u = pos_u.round() as i32;
        let grid_v = pos_v.round() as i32;

        if grid_u - support < 0
            || grid_u + support >= grid_size
            || grid_v - support < 0
            || grid_v + support >= grid_size
        {
            *num_skipped += 1;
            continue;
        }

        let off_u = ((grid_u as f64 - pos_u) * oversample as f64).round() as i32;
        let off_v = ((grid_v as f64 - pos_v) * oversample as f64).round() as i32;

        let mut sum = 0.0;
        for j in -support..=support {
            let c1 = conv[(off_v + j * oversample).unsigned_abs() as usize];
            for k in -support..=support {
                let c2 = c1 * conv[(off_u + k * oversample).unsigned_abs() as usize];
                sum += c2;
                let p = ((grid_v + j) * grid_size + grid_u + k) as usize;
                grid[p] = grid[p] + vis[i].scale(cast(c2));
            }
        }
        *norm += sum;
    }
    Ok(())
}

/// Grid visibilities with separable complex W-projection kernels.
///
/// As [`grid_1d_real`], but each visibility selects the kernel of its nearest
/// W-plane, conjugated for negative `ww`. `norm` gains the real part of every
/// applied tap product.
#[allow(clippy::too_many_arguments)]
pub fn grid_wproj<F: Float>(
    wkernels: &WKernelSet,
    uu: &[f64],
    vv: &[f64],
    ww: &[f64],
    vis: &[Complex<F>],
    cell_size_rad: f64,
    image_size: usize,
    num_skipped: &mut usize,
    norm: &mut f64,
    grid: &mut [Complex<F>],
) -> Result<(), GridError> {
    check_lengths(uu, vv, vis, image_size, grid)?;
    if ww.len() != vis.len() {
        return Err(GridError::ArrayLength {
            what: "w coordinates",
            expected: vis.len(),
            got: ww.len(),
        });
    }

    let oversample = wkernels.oversample();
    let grid_size = image_size as i32;
    let g_centre = grid_size / 2;
    let scale = image_size as f64 * cell_size_rad;

    for i in 0..vis.len() {
        let plane = wkernels.plane_for_w(ww[i]);
        let support = wkernels.support(plane);
        let conv = wkernels.kernel(plane);
        let conjugate = ww[i] < 0.0;

        let pos_u = -uu[i] * scale + g_centre as f64;
        let pos_v = vv[i] * scale + g_centre as f64;
        let grid_u = pos_u.round() as i32;
        let grid_v = pos_v.round() as i32;

        if grid_u - support < 0
            || grid_u + support >= grid_size
            || grid_v - support < 0
            || grid_v + support >= grid_size
        {
            *num_skipped += 1;
            continue;
        }

        let off_u = ((grid_u as f64 - pos_u) * oversample as f64).round() as i32;
        let off_v = ((grid_v as f64 - pos_v) * oversample as f64).round() as i32;

        let mut sum = 0.0;
        for j in -support..=support {
            let c1 = conv[(off_v + j * oversample).unsigned_abs() as usize];
            for k in -support..=support {
                let mut c2 = c1 * conv[(off_u + k * oversample).unsigned_abs() as usize];
                if conjugate {
                    c2 = c2.conj();
                }
                sum += c2.re;
                let p = ((grid_v + j) * grid_size + grid_u + k) as usize;
                let tap = Complex::new(cast::<F>(c2.re), cast::<F>(c2.im));
                grid[p] = grid[p] + vis[i] * tap;
            }
        }
        *norm += sum;
    }
    Ok(())
}
