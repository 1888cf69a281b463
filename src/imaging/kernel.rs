// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Gridding convolution kernels.
//!
//! The FFT algorithm uses a 1-D real, separable kernel tabulated on an
//! oversampled grid; W-projection uses one separable complex kernel per
//! W-plane, derived from the analytic Fresnel response of a Gaussian-tapered
//! field. Both kinds are looked up by nearest oversample bin during gridding,
//! never interpolated.

use marlu::c64;
use strum_macros::{Display, EnumIter, EnumString};

use crate::constants::PI;

/// The shape of the 1-D real gridding kernel.
#[derive(Debug, Display, EnumIter, EnumString, Clone, Copy, PartialEq, Eq)]
pub enum ConvKernelType {
    /// Top-hat over one grid cell. Nearest-cell gridding.
    #[strum(serialize = "pillbox")]
    Pillbox,

    /// exp(-x^2) with x in grid cells.
    #[strum(serialize = "exponential")]
    Exponential,
}

/// A 1-D real convolution kernel tabulated at `oversample` samples per grid
/// cell out to `support + 1` cells. Sample `i` holds the kernel value at
/// radius `i / oversample` cells.
#[derive(Debug, Clone)]
pub struct ConvKernel {
    kind: ConvKernelType,
    support: i32,
    oversample: i32,
    values: Vec<f64>,
}

impl ConvKernel {
    pub fn new(kind: ConvKernelType, support: i32, oversample: i32) -> ConvKernel {
        // An oversample of at least 2 keeps the worst-case bin lookup
        // (half-cell offset at the outermost tap) inside the table.
        let oversample = oversample.max(2);
        let n = (oversample * (support + 1)) as usize;
        let values = (0..n)
            .map(|i| {
                let x = i as f64 / oversample as f64;
                match kind {
                    ConvKernelType::Pillbox => {
                        if x < 0.5 {
                            1.0
                        } else {
                            0.0
                        }
                    }
                    ConvKernelType::Exponential => (-x * x).exp(),
                }
            })
            .collect();
        ConvKernel {
            kind,
            support,
            oversample,
            values,
        }
    }

    pub fn kind(&self) -> ConvKernelType {
        self.kind
    }

    pub fn support(&self) -> i32 {
        self.support
    }

    pub fn oversample(&self) -> i32 {
        self.oversample
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The kernel's image-domain response along one axis, evaluated by direct
    /// DFT of the integer-cell kernel samples and normalised to 1 at the
    /// image centre. Dividing the image by the outer product of this function
    /// with itself undoes the kernel's taper.
    pub fn grid_correction(&self, image_size: usize) -> Vec<f64> {
        let centre = (image_size / 2) as f64;
        let taps: Vec<f64> = (-self.support..=self.support)
            .map(|j| self.values[(j * self.oversample).unsigned_abs() as usize])
            .collect();
        let peak: f64 = taps.iter().sum();
        (0..image_size)
            .map(|x| {
                let arg = 2.0 * PI * (x as f64 - centre) / image_size as f64;
                let c: f64 = taps
                    .iter()
                    .zip(-self.support..=self.support)
                    .map(|(t, j)| t * (arg * j as f64).cos())
                    .sum();
                c / peak
            })
            .collect()
    }
}

/// Separable complex W-projection kernels, one per W-plane.
///
/// Plane `i` corresponds to `w_i = i^2 / w_scale` wavelengths; kernels for
/// negative w are the conjugates of their positive-w counterparts. Each plane
/// stores a 1-D complex array with the same oversampled layout as
/// [`ConvKernel`]; the 2-D kernel is the outer product of the array with
/// itself. Each plane is normalised so that the sum of its taps at zero
/// sub-cell offset is one.
#[derive(Debug, Clone)]
pub struct WKernelSet {
    num_planes: usize,
    w_scale: f64,
    oversample: i32,
    supports: Vec<i32>,
    kernels: Vec<Vec<c64>>,
}

impl WKernelSet {
    /// Generate kernels for w in [0, `max_w_lambda`] over a field of view of
    /// `image_size * cell_size_rad` radians.
    pub fn new(
        num_planes: usize,
        oversample: i32,
        max_w_lambda: f64,
        cell_size_rad: f64,
        image_size: usize,
    ) -> WKernelSet {
        let num_planes = num_planes.max(1);
        let oversample = oversample.max(2);
        let w_scale = if num_planes > 1 && max_w_lambda > 0.0 {
            ((num_planes - 1) * (num_planes - 1)) as f64 / max_w_lambda
        } else {
            0.0
        };

        // Gaussian taper width in direction cosines, and the uv-cell size in
        // wavelengths.
        let fov_rad = image_size as f64 * cell_size_rad;
        let taper_width = fov_rad / 3.0;
        let cell_uv = 1.0 / (image_size as f64 * cell_size_rad);
        let max_support = (image_size as i32 / 4).max(1);

        let mut supports = Vec::with_capacity(num_planes);
        let mut kernels = Vec::with_capacity(num_planes);
        for plane in 0..num_planes {
            let w = if w_scale > 0.0 {
                (plane * plane) as f64 / w_scale
            } else {
                0.0
            };
            // The tapered Fresnel screen exp(-beta r^2) has the closed-form
            // transform sqrt(pi/beta) exp(-pi^2 q^2 / beta) per axis.
            let beta = c64::new(1.0 / (taper_width * taper_width), -PI * w);
            let amp = (c64::new(PI, 0.0) / beta).sqrt();

            // Half-width at which the kernel envelope drops to ~1e-3.
            let envelope_rate = PI * PI * (1.0 / beta).re;
            let q_cut = (1000.0_f64.ln() / envelope_rate.max(f64::EPSILON)).sqrt();
            let support = (((q_cut / cell_uv).ceil() as i32) + 1).clamp(1, max_support);

            let n = (oversample * (support + 1)) as usize;
            let mut k1d: Vec<c64> = (0..n)
                .map(|i| {
                    let q = (i as f64 / oversample as f64) * cell_uv;
                    amp * (-(PI * PI * q * q) * (1.0 / beta)).exp()
                })
                .collect();

            // Normalise so the taps applied at zero sub-cell offset sum to 1
            // along each axis.
            let axis_sum: c64 = (-support..=support)
                .map(|j| k1d[(j * oversample).unsigned_abs() as usize])
                .sum();
            if axis_sum.norm() > 0.0 {
                for v in &mut k1d {
                    *v /= axis_sum;
                }
            }

            supports.push(support);
            kernels.push(k1d);
        }

        WKernelSet {
            num_planes,
            w_scale,
            oversample,
            supports,
            kernels,
        }
    }

    pub fn num_planes(&self) -> usize {
        self.num_planes
    }

    pub fn oversample(&self) -> i32 {
        self.oversample
    }

    /// Which plane serves a visibility at `w_lambda` wavelengths.
    pub fn plane_for_w(&self, w_lambda: f64) -> usize {
        ((w_lambda.abs() * self.w_scale).sqrt().round() as usize).min(self.num_planes - 1)
    }

    pub fn support(&self, plane: usize) -> i32 {
        self.supports[plane]
    }

    pub fn kernel(&self, plane: usize) -> &[c64] {
        &self.kernels[plane]
    }

    /// The largest support over all planes.
    pub fn max_support(&self) -> i32 {
        self.supports.iter().copied().max().unwrap_or(1)
    }
}
