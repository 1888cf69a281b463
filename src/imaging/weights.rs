// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Weight-density grids for uniform weighting.
//!
//! Uniform weighting needs to know the total weight landing in each grid
//! cell before any amplitude is gridded, so the imager first accumulates a
//! weights grid from coordinates alone, then divides each visibility's
//! weight by its cell's density on the second pass. Both passes round to the
//! nearest cell; no convolution is involved.

/// Accumulate `weight` into the nearest grid cell of each (u, v) sample.
/// Samples outside the grid are counted in `num_skipped` and dropped.
pub(crate) fn grid_weights_write(
    uu: &[f64],
    vv: &[f64],
    weight: &[f64],
    cell_size_rad: f64,
    image_size: usize,
    num_skipped: &mut usize,
    weights_grid: &mut [f64],
) {
    let grid_size = image_size as i32;
    let g_centre = grid_size / 2;
    let scale = image_size as f64 * cell_size_rad;

    for i in 0..uu.len() {
        let grid_u = (-uu[i] * scale + g_centre as f64).round() as i32;
        let grid_v = (vv[i] * scale + g_centre as f64).round() as i32;
        if grid_u < 0 || grid_u >= grid_size || grid_v < 0 || grid_v >= grid_size {
            *num_skipped += 1;
            continue;
        }
        weights_grid[(grid_v * grid_size + grid_u) as usize] += weight[i];
    }
}

/// Divide each sample's weight by the density its cell accumulated during
/// the [`grid_weights_write`] pass, writing the result to `out`. Samples
/// outside the grid, or in a cell that never received weight, get zero.
#[allow(clippy::too_many_arguments)]
pub(crate) fn grid_weights_read(
    uu: &[f64],
    vv: &[f64],
    weight: &[f64],
    cell_size_rad: f64,
    image_size: usize,
    weights_grid: &[f64],
    out: &mut Vec<f64>,
) {
    let grid_size = image_size as i32;
    let g_centre = grid_size / 2;
    let scale = image_size as f64 * cell_size_rad;

    out.clear();
    out.reserve(uu.len());
    for i in 0..uu.len() {
        let grid_u = (-uu[i] * scale + g_centre as f64).round() as i32;
        let grid_v = (vv[i] * scale + g_centre as f64).round() as i32;
        let w = if grid_u < 0 || grid_u >= grid_size || grid_v < 0 || grid_v >= grid_size {
            0.0
        } else {
            let density = weights_grid[(grid_v * grid_size + grid_u) as usize];
            if density > 0.0 {
                weight[i] / density
            } else {
                0.0
            }
        };
        out.push(w);
    }
}
