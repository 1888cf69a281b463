// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! 2-D FFTs for grid-to-image transforms.
//!
//! Plans are built once per image size and live in the imager's cache, so a
//! cache reset frees them. Transforms are unnormalised; the imager divides by
//! the accumulated gridding normalisation instead.

use std::sync::Arc;

use marlu::c64;
use ndarray::ArrayViewMut2;
use rustfft::{Fft, FftDirection, FftPlanner};

/// Cached 2-D complex-to-complex FFT plans for one grid size.
pub(crate) struct Fft2d {
    size: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl std::fmt::Debug for Fft2d {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fft2d").field("size", &self.size).finish()
    }
}

impl Fft2d {
    pub(crate) fn new(size: usize) -> Fft2d {
        let mut planner = FftPlanner::new();
        Fft2d {
            size,
            forward: planner.plan_fft_forward(size),
            inverse: planner.plan_fft_inverse(size),
        }
    }

    /// Transform a row-major `size` x `size` grid in place.
    pub(crate) fn exec(&self, data: &mut [c64], direction: FftDirection) {
        debug_assert_eq!(data.len(), self.size * self.size);
        let plan = match direction {
            FftDirection::Forward => &self.forward,
            FftDirection::Inverse => &self.inverse,
        };
        // Rows, then columns via a transpose sandwich.
        plan.process(data);
        transpose_square(data, self.size);
        plan.process(data);
        transpose_square(data, self.size);
    }
}

fn transpose_square(data: &mut [c64], n: usize) {
    let mut view = ArrayViewMut2::from_shape((n, n), data).expect("slice length is n*n");
    for i in 0..n {
        for j in (i + 1)..n {
            view.swap((i, j), (j, i));
        }
    }
}

/// Swap quadrants so the grid centre moves to element (0, 0) and back. Its
/// own inverse for even sizes, which the imager enforces.
pub(crate) fn fftshift(data: &mut [c64], size: usize) {
    debug_assert_eq!(size % 2, 0);
    let half = size / 2;
    for y in 0..half {
        for x in 0..size {
            let a = y * size + x;
            let b = (y + half) * size + (x + half) % size;
            data.swap(a, b);
        }
    }
}
