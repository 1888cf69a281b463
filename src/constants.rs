// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

All constants *must* be double precision. `skysim` should do as many
calculations as possible in double precision before converting to a lower
precision, if it is ever required.
 */

pub use std::f64::consts::{FRAC_PI_2, PI, TAU};

pub use marlu::constants::VEL_C;

/// Seconds per day.
pub const DAYSEC: f64 = 86400.0;

/// Default convolution-kernel support radius used for FFT imaging.
pub const DEFAULT_CONV_SUPPORT: i32 = 3;

/// Default convolution-kernel oversample factor (values per grid cell).
pub const DEFAULT_CONV_OVERSAMPLE: i32 = 100;

/// Default oversample factor for W-projection kernels.
pub const DEFAULT_WPROJ_OVERSAMPLE: i32 = 4;

/// Default number of W-projection planes.
pub const DEFAULT_NUM_W_PLANES: usize = 16;
