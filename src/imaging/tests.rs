// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use marlu::{c64, RADec};
use vec1::vec1;

use super::*;
use crate::imaging::fft::fftshift as fftshift_test;

fn centre_pixel(size: usize) -> usize {
    (size / 2) * size + size / 2
}

// ---------------------------------------------------------------------------
// Kernels
// ---------------------------------------------------------------------------

#[test]
fn test_exponential_kernel_shape() {
    let k = ConvKernel::new(ConvKernelType::Exponential, 3, 100);
    let v = k.values();
    assert_eq!(v.len(), 400);
    assert_abs_diff_eq!(v[0], 1.0);
    // Monotonically decreasing, always positive.
    for w in v.windows(2) {
        assert!(w[1] <= w[0]);
        assert!(w[1] > 0.0);
    }
    assert_abs_diff_eq!(v[100], (-1.0_f64).exp());
}

#[test]
fn test_pillbox_kernel_is_one_cell() {
    let k = ConvKernel::new(ConvKernelType::Pillbox, 1, 4);
    assert_eq!(k.values(), &[1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
}

#[test]
fn test_grid_correction_is_unity_at_centre() {
    let k = ConvKernel::new(ConvKernelType::Exponential, 3, 100);
    let corr = k.grid_correction(64);
    assert_abs_diff_eq!(corr[32], 1.0, epsilon = 1e-12);
    // The correction rolls off towards the image edge but stays positive for
    // this kernel.
    assert!(corr[0] < corr[32]);
    assert!(corr[0] > 0.0);
}

#[test]
fn test_wkernel_plane_selection() {
    let wk = WKernelSet::new(8, 4, 100.0, 1e-4, 256);
    assert_eq!(wk.num_planes(), 8);
    assert_eq!(wk.plane_for_w(0.0), 0);
    assert_eq!(wk.plane_for_w(100.0), 7);
    assert_eq!(wk.plane_for_w(-100.0), 7);
    // Beyond the generated range, clamp to the last plane.
    assert_eq!(wk.plane_for_w(1e6), 7);
    // Supports grow with |w|.
    assert!(wk.support(7) >= wk.support(0));
}

#[test]
fn test_wkernel_axis_sum_is_normalised() {
    let wk = WKernelSet::new(4, 4, 50.0, 1e-4, 256);
    for plane in 0..wk.num_planes() {
        let support = wk.support(plane);
        let k = wk.kernel(plane);
        let sum: c64 = (-support..=support)
            .map(|j| k[(j * wk.oversample()).unsigned_abs() as usize])
            .sum();
        assert_abs_diff_eq!(sum.re, 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(sum.im, 0.0, epsilon = 1e-10);
    }
}

// ---------------------------------------------------------------------------
// Gridders
// ---------------------------------------------------------------------------

#[test]
fn test_grid_centre_visibility_norm_and_energy() {
    let kernel = ConvKernel::new(ConvKernelType::Exponential, 3, 100);
    let size = 64;
    let mut grid = vec![c64::default(); size * size];
    let mut num_skipped = 0;
    let mut norm = 0.0;

    grid_1d_real(
        &kernel,
        &[0.0],
        &[0.0],
        &[c64::new(2.0, 0.0)],
        1e-4,
        size,
        &mut num_skipped,
        &mut norm,
        &mut grid,
    )
    .unwrap();

    assert_eq!(num_skipped, 0);

    // At the exact grid centre the tap offsets are zero, so the applied
    // weights are the kernel at integer cells and the normalisation is their
    // separable product.
    let axis_sum: f64 = (-3..=3_i32)
        .map(|j| kernel.values()[(j * 100).unsigned_abs() as usize])
        .sum();
    assert_abs_diff_eq!(norm, axis_sum * axis_sum, epsilon = 1e-12);

    // Peak at the centre cell, scaled by the central tap (1.0) squared.
    let c = centre_pixel(size);
    assert_abs_diff_eq!(grid[c].re, 2.0, epsilon = 1e-12);
    // Total gridded energy is amp * norm.
    let total: f64 = grid.iter().map(|v| v.re).sum();
    assert_abs_diff_eq!(total, 2.0 * norm, epsilon = 1e-9);
}

#[test]
fn test_grid_out_of_range_visibility_is_skipped_whole() {
    let kernel = ConvKernel::new(ConvKernelType::Exponential, 3, 100);
    let size = 64;
    let mut grid = vec![c64::default(); size * size];
    let mut num_skipped = 0;
    let mut norm = 0.0;

    // fov = size * cell = 64e-4 rad, so u in wavelengths beyond
    // (size/2) / fov lands off the grid.
    let u_off_grid = (size as f64 / 2.0 + 10.0) / 64e-4;
    grid_1d_real(
        &kernel,
        &[u_off_grid],
        &[0.0],
        &[c64::new(1.0, 0.0)],
        1e-4,
        size,
        &mut num_skipped,
        &mut norm,
        &mut grid,
    )
    .unwrap();

    assert_eq!(num_skipped, 1);
    assert_eq!(norm, 0.0);
    assert!(grid.iter().all(|v| *v == c64::default()));
}

#[test]
fn test_grid_visibility_on_the_margin_is_skipped() {
    // A visibility whose centre cell is in range but whose support box pokes
    // over the edge is also skipped whole; no taps are clamped or wrapped.
    let kernel = ConvKernel::new(ConvKernelType::Exponential, 3, 100);
    let size = 64;
    let cell = 1e-4;
    let scale = size as f64 * cell;
    // Grid position size-2: in range, but support 3 exceeds the edge.
    let u = -((size - 2) as f64 - (size / 2) as f64) / scale;
    let mut grid = vec![c64::default(); size * size];
    let mut num_skipped = 0;
    let mut norm = 0.0;
    grid_1d_real(
        &kernel,
        &[u],
        &[0.0],
        &[c64::new(1.0, 0.0)],
        cell,
        size,
        &mut num_skipped,
        &mut norm,
        &mut grid,
    )
    .unwrap();
    assert_eq!(num_skipped, 1);
    assert!(grid.iter().all(|v| *v == c64::default()));
}

#[test]
fn test_grid_single_precision_amps_with_double_cell_arithmetic() {
    // Single-precision amplitudes and grid, but cell positioning stays in
    // f64: a fractional position on a large grid lands on the right cell.
    let kernel = ConvKernel::new(ConvKernelType::Exponential, 3, 100);
    let size = 1024;
    let mut grid = vec![marlu::c32::default(); size * size];
    let mut num_skipped = 0;
    let mut norm = 0.0;

    let cell = 1e-5;
    let scale = size as f64 * cell;
    // Grid position 612.4: nearest cell 612, sub-cell offset -0.4.
    let u = -(100.4 / scale);
    grid_1d_real(
        &kernel,
        &[u],
        &[0.0],
        &[marlu::c32::new(1.0, 0.0)],
        cell,
        size,
        &mut num_skipped,
        &mut norm,
        &mut grid,
    )
    .unwrap();
    assert_eq!(num_skipped, 0);
    let row = size / 2;
    let near = grid[row * size + 612].re;
    let far = grid[row * size + 613].re;
    assert_abs_diff_eq!(near, (-0.16_f32).exp(), epsilon = 1e-6);
    assert!(near > far);
    assert!(norm > 0.0);
}

#[test]
fn test_grid_wproj_zero_w_concentrates_at_centre() {
    let wk = WKernelSet::new(4, 4, 100.0, 1e-4, 64);
    let size = 64;
    let mut grid = vec![c64::default(); size * size];
    let mut num_skipped = 0;
    let mut norm = 0.0;

    grid_wproj(
        &wk,
        &[0.0],
        &[0.0],
        &[0.0],
        &[c64::new(1.0, 0.0)],
        1e-4,
        size,
        &mut num_skipped,
        &mut norm,
        &mut grid,
    )
    .unwrap();

    assert_eq!(num_skipped, 0);
    // The kernel's central taps sum to 1 per axis, so the full tap sum is 1.
    assert_abs_diff_eq!(norm, 1.0, epsilon = 1e-9);
    let total: c64 = grid.iter().sum();
    assert_abs_diff_eq!(total.re, 1.0, epsilon = 1e-9);
}

#[test]
fn test_grid_wproj_counts_out_of_grid() {
    let wk = WKernelSet::new(4, 4, 100.0, 1e-4, 64);
    let size = 64;
    let mut grid = vec![c64::default(); size * size];
    let mut num_skipped = 0;
    let mut norm = 0.0;
    grid_wproj(
        &wk,
        &[1e6],
        &[0.0],
        &[10.0],
        &[c64::new(1.0, 0.0)],
        1e-4,
        size,
        &mut num_skipped,
        &mut norm,
        &mut grid,
    )
    .unwrap();
    assert_eq!(num_skipped, 1);
    assert_eq!(norm, 0.0);
}

// ---------------------------------------------------------------------------
// FFT helpers
// ---------------------------------------------------------------------------

#[test]
fn test_fftshift_is_its_own_inverse() {
    let size = 8;
    let mut data: Vec<c64> = (0..size * size).map(|i| c64::new(i as f64, 0.0)).collect();
    let original = data.clone();
    fftshift_test(&mut data, size);
    assert_ne!(data, original);
    fftshift_test(&mut data, size);
    assert_eq!(data, original);
}

#[test]
fn test_fft_impulse_gives_flat_response() {
    let size = 16;
    let fft = fft::Fft2d::new(size);
    let mut data = vec![c64::default(); size * size];
    data[0] = c64::new(1.0, 0.0);
    fft.exec(&mut data, rustfft::FftDirection::Inverse);
    for v in &data {
        assert_abs_diff_eq!(v.re, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(v.im, 0.0, epsilon = 1e-12);
    }
}

#[test]
fn test_fft_round_trip() {
    let size = 16;
    let fft = fft::Fft2d::new(size);
    let mut data: Vec<c64> = (0..size * size)
        .map(|i| c64::new((i as f64 * 0.37).sin(), (i as f64 * 0.11).cos()))
        .collect();
    let original = data.clone();
    fft.exec(&mut data, rustfft::FftDirection::Forward);
    fft.exec(&mut data, rustfft::FftDirection::Inverse);
    let n = (size * size) as f64;
    for (v, o) in data.iter().zip(&original) {
        assert_abs_diff_eq!(v.re / n, o.re, epsilon = 1e-12);
        assert_abs_diff_eq!(v.im / n, o.im, epsilon = 1e-12);
    }
}

// ---------------------------------------------------------------------------
// Weights
// ---------------------------------------------------------------------------

#[test]
fn test_uniform_weight_density_round_trip() {
    let size = 32;
    let mut wgrid = vec![0.0; size * size];
    let mut skipped = 0;
    let uu = [0.0, 0.0, 100.0];
    let vv = [0.0, 0.0, 100.0];
    let w = [1.0, 3.0, 2.0];
    weights::grid_weights_write(&uu, &vv, &w, 1e-4, size, &mut skipped, &mut wgrid);
    assert_eq!(skipped, 0);

    let mut out = vec![];
    weights::grid_weights_read(&uu, &vv, &w, 1e-4, size, &wgrid, &mut out);
    // The first two samples share a cell with total weight 4; the third is
    // alone in its cell.
    assert_abs_diff_eq!(out[0], 1.0 / 4.0);
    assert_abs_diff_eq!(out[1], 3.0 / 4.0);
    assert_abs_diff_eq!(out[2], 1.0);
}

#[test]
fn test_weights_outside_the_grid_are_dropped() {
    let size = 16;
    let mut wgrid = vec![0.0; size * size];
    let mut skipped = 0;
    weights::grid_weights_write(&[1e9], &[0.0], &[1.0], 1e-4, size, &mut skipped, &mut wgrid);
    assert_eq!(skipped, 1);
    assert!(wgrid.iter().all(|w| *w == 0.0));

    let mut out = vec![];
    weights::grid_weights_read(&[1e9], &[0.0], &[1.0], 1e-4, size, &wgrid, &mut out);
    assert_eq!(out, &[0.0]);
}

// ---------------------------------------------------------------------------
// The imager
// ---------------------------------------------------------------------------

fn centred_chunk<'a>(
    uu: &'a [f64],
    vv: &'a [f64],
    ww: &'a [f64],
    amps: &'a [c64],
) -> VisChunk<'a> {
    VisChunk {
        time_index: 0,
        uu_metres: uu,
        vv_metres: vv,
        ww_metres: ww,
        amps,
        weights: None,
    }
}

#[test]
fn test_reset_cache_is_safe_on_a_fresh_imager() {
    let mut imager = Imager::new();
    imager.reset_cache();
    imager.reset_cache();
    assert_eq!(imager.num_planes(), 0);
    assert_eq!(imager.num_vis_processed(), 0);
}

#[test]
fn test_update_without_frequencies_fails() {
    let mut imager = Imager::new();
    let chunk = centred_chunk(&[0.0], &[0.0], &[0.0], &[c64::new(1.0, 0.0)]);
    assert!(matches!(imager.update(&chunk), Err(ImagerError::NoFrequencies)));
}

#[test]
fn test_frequency_selection_can_empty_out() {
    let mut imager = Imager::new();
    imager.set_vis_frequencies(vec1![150e6]);
    imager.set_freq_range(200e6, 300e6);
    let chunk = centred_chunk(&[0.0], &[0.0], &[0.0], &[c64::new(1.0, 0.0)]);
    assert!(matches!(imager.update(&chunk), Err(ImagerError::EmptySelection)));
}

#[test]
fn test_point_source_images_to_unit_peak() {
    let mut imager = Imager::new();
    imager.set_image_size(64).unwrap();
    imager.set_fov_deg(1.0).unwrap();
    imager.set_vis_frequencies(vec1![150e6]);

    // One visibility of 1 Jy at the uv origin: a flat grid response whose
    // image is 1 Jy at the phase centre.
    let chunk = centred_chunk(&[0.0], &[0.0], &[0.0], &[c64::new(1.0, 0.0)]);
    imager.update(&chunk).unwrap();
    assert_eq!(imager.num_vis_processed(), 1);
    assert_eq!(imager.num_planes(), 1);

    let planes = imager.finalise().unwrap();
    assert_eq!(planes.len(), 1);
    let image = planes[0].data.as_real64().unwrap();
    let c = centre_pixel(64);
    assert_abs_diff_eq!(image[c], 1.0, epsilon = 1e-9);
}

#[test]
fn test_update_after_finalise_is_rejected() {
    let mut imager = Imager::new();
    imager.set_image_size(16).unwrap();
    imager.set_vis_frequencies(vec1![150e6]);
    let chunk = centred_chunk(&[0.0], &[0.0], &[0.0], &[c64::new(1.0, 0.0)]);
    imager.update(&chunk).unwrap();
    imager.finalise().unwrap();
    assert!(matches!(imager.update(&chunk), Err(ImagerError::Finalised)));

    // A reset is the documented way out.
    imager.reset_cache();
    assert_eq!(imager.num_vis_processed(), 0);
    imager.update(&chunk).unwrap();
    assert_eq!(imager.num_vis_processed(), 1);
}

#[test]
fn test_finalise_without_data_is_rejected() {
    let mut imager = Imager::new();
    assert!(matches!(imager.finalise(), Err(ImagerError::NoData)));
}

#[test]
fn test_channel_snapshots_make_one_plane_per_channel() {
    let mut imager = Imager::new();
    imager.set_image_size(16).unwrap();
    imager.set_vis_frequencies(vec1![100e6, 150e6, 200e6]);
    imager.set_channel_snapshots(true);

    let amps = vec![c64::new(1.0, 0.0); 3];
    let chunk = centred_chunk(&[0.0], &[0.0], &[0.0], &amps);
    imager.update(&chunk).unwrap();
    assert_eq!(imager.num_planes(), 3);

    let planes = imager.finalise().unwrap();
    assert_eq!(planes.len(), 3);
    assert_abs_diff_eq!(planes[0].freq_hz, 100e6);
    assert_abs_diff_eq!(planes[2].freq_hz, 200e6);
}

#[test]
fn test_shape_affecting_setter_invalidates_the_cache() {
    let mut imager = Imager::new();
    imager.set_image_size(16).unwrap();
    imager.set_vis_frequencies(vec1![150e6]);
    let chunk = centred_chunk(&[0.0], &[0.0], &[0.0], &[c64::new(1.0, 0.0)]);
    imager.update(&chunk).unwrap();
    assert_eq!(imager.num_planes(), 1);

    imager.set_image_size(32).unwrap();
    assert_eq!(imager.num_planes(), 0);
    assert_eq!(imager.num_vis_processed(), 0);

    // Accumulation restarts cleanly at the new shape.
    imager.update(&chunk).unwrap();
    let planes = imager.finalise().unwrap();
    assert_eq!(planes[0].size, 32);
}

#[test]
fn test_uniform_weighting_two_pass() {
    let mut imager = Imager::new();
    imager.set_image_size(32).unwrap();
    imager.set_vis_frequencies(vec1![150e6]);
    imager.set_weighting(Weighting::Uniform);

    let uu = [0.0, 0.0];
    let vv = [0.0, 0.0];
    let ww = [0.0, 0.0];
    let amps = [c64::new(1.0, 0.0), c64::new(1.0, 0.0)];
    let chunk = centred_chunk(&uu, &vv, &ww, &amps);

    // Coordinate pass, then data pass.
    imager.set_coords_only(true);
    imager.update(&chunk).unwrap();
    assert_eq!(imager.num_vis_processed(), 0);
    imager.set_coords_only(false);
    imager.update(&chunk).unwrap();
    assert_eq!(imager.num_vis_processed(), 2);

    let planes = imager.finalise().unwrap();
    // Both samples share one cell; uniform weighting halves each, so the
    // image peak is the weighted sum over the tap-sum normalisation.
    let image = planes[0].data.as_real64().unwrap();
    assert_abs_diff_eq!(image[centre_pixel(32)], 0.5, epsilon = 1e-9);
}

#[test]
fn test_wprojection_point_source() {
    let mut imager = Imager::new();
    imager.set_image_size(64).unwrap();
    imager.set_fov_deg(0.5).unwrap();
    imager.set_vis_frequencies(vec1![150e6]);
    imager.set_algorithm(Algorithm::WProjection);
    imager.set_num_w_planes(8);

    let wavelength = VEL_C / 150e6;
    let chunk = VisChunk {
        time_index: 0,
        uu_metres: &[0.0],
        vv_metres: &[0.0],
        ww_metres: &[5.0 * wavelength],
        amps: &[c64::new(1.0, 0.0)],
        weights: None,
    };
    imager.update(&chunk).unwrap();
    let planes = imager.finalise().unwrap();
    let image = planes[0].data.as_real64().unwrap();
    // The W-kernel redistributes energy but the normalised peak stays near
    // the phase centre.
    let c = centre_pixel(64);
    let peak = image.iter().cloned().fold(f64::MIN, f64::max);
    assert!(image[c] > 0.5, "centre pixel is {}", image[c]);
    assert!((peak - image[c]).abs() < 0.5 * peak.abs());
}

#[test]
fn test_phase_rotation_recentres_an_offset_source() {
    // A source away from the visibility phase centre: pointing the image at
    // the source must move its peak to the image centre.
    let mut imager = Imager::new();
    imager.set_image_size(64).unwrap();
    imager.set_fov_deg(2.0).unwrap();
    imager.set_vis_frequencies(vec1![150e6]);

    let vis_centre = RADec::from_radians(0.0, -0.5);
    // Offset in declination by a quarter of the field of view.
    let source = RADec::from_radians(0.0, -0.5 + 0.25 * 2.0_f64.to_radians());
    imager.set_vis_phase_centre(vis_centre);
    imager.set_direction(source);

    // Visibilities of the offset source on a few baselines, phased to
    // vis_centre: V(u,v) = exp(2 pi i (u l + v m + w (n-1))).
    let lmn = source.to_lmn(vis_centre);
    let wavelength = VEL_C / 150e6;
    let uu_m: Vec<f64> = vec![0.0, 20.0, -40.0, 60.0];
    let vv_m: Vec<f64> = vec![0.0, 30.0, 10.0, -50.0];
    let ww_m: Vec<f64> = vec![0.0; 4];
    let amps: Vec<c64> = uu_m
        .iter()
        .zip(&vv_m)
        .map(|(u_m, v_m)| {
            let u = u_m / wavelength;
            let v = v_m / wavelength;
            let phase =
                2.0 * std::f64::consts::PI * (u * lmn.l + v * lmn.m);
            c64::new(phase.cos(), phase.sin())
        })
        .collect();

    let chunk = centred_chunk(&uu_m, &vv_m, &ww_m, &amps);
    imager.update(&chunk).unwrap();
    let planes = imager.finalise().unwrap();
    let image = planes[0].data.as_real64().unwrap();

    // After rotation all visibilities are 1 + 0i, so the peak is exactly at
    // the image centre.
    let c = centre_pixel(64);
    let peak_idx = image
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .unwrap()
        .0;
    assert_eq!(peak_idx, c);
    assert_abs_diff_eq!(image[c], 1.0, epsilon = 1e-6);
}
