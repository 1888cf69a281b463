// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Simulation of radio-interferometer observations and FFT-based imaging of the
results.
 */

pub mod cli;
pub mod constants;
pub mod coord;
pub mod correlate;
mod error;
pub mod imaging;
pub mod io;
pub mod jones;
pub(crate) mod math;
pub mod mem;
pub mod srclist;
pub mod telescope;
pub mod vis;

// Re-exports.
pub use cli::Skysim;
pub use error::SkysimError;

use crossbeam_utils::atomic::AtomicCell;

lazy_static::lazy_static! {
    /// Are progress bars being drawn? The CLI sets this exactly once.
    pub(crate) static ref PROGRESS_BARS: AtomicCell<bool> = AtomicCell::new(false);
}
