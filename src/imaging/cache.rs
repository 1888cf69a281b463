// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The imager's cached working state.
//!
//! Everything the imager builds lazily lives in one owned [`Cache`] struct,
//! and `Cache::reset` destructures it exhaustively: adding a field without
//! deciding its reset rule is a compile error, not a leak waiting to happen.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use marlu::{c32, c64};

use crate::{
    imaging::{fft::Fft2d, kernel::ConvKernel, kernel::WKernelSet},
    io::binary::BinFileWriter,
    mem::Mem,
};

/// One image plane: a complex grid for a (time, channel, polarisation)
/// output, its accumulated gridding normalisation, and (for uniform
/// weighting) its weight-density grid.
#[derive(Debug)]
pub(crate) struct Plane {
    pub(crate) grid: Mem,
    pub(crate) norm: f64,
    pub(crate) weights: Option<Mem>,
}

#[derive(Debug, Default)]
pub(crate) struct Cache {
    /// Set once the plane list and kernels have been built.
    pub(crate) init: bool,
    /// Set once `finalise` has turned the grids into images.
    pub(crate) finalised: bool,
    pub(crate) num_vis_processed: u64,

    /// Input channel frequencies admitted by the frequency selection.
    pub(crate) sel_freqs: Vec<f64>,
    /// One frequency per image channel.
    pub(crate) im_freqs: Vec<f64>,
    /// Input channel index -> image channel index, `None` if filtered out.
    pub(crate) chan_map: Vec<Option<usize>>,

    pub(crate) planes: Vec<Plane>,
    pub(crate) fft: Option<Fft2d>,
    /// 1-D grid-correction function; the image is divided by its outer
    /// product with itself.
    pub(crate) corr_func: Option<Vec<f64>>,
    pub(crate) conv_kernel: Option<ConvKernel>,
    pub(crate) w_kernels: Option<WKernelSet>,
    /// Largest |w| (wavelengths) seen during a coords-only pass.
    pub(crate) max_abs_w: f64,

    // Per-chunk staging, kept allocated between chunks. Coordinates and
    // amplitudes are staged in double precision; `vis_tmp` holds the
    // demotion for single-precision grids.
    pub(crate) uu_im: Vec<f64>,
    pub(crate) vv_im: Vec<f64>,
    pub(crate) ww_im: Vec<f64>,
    pub(crate) vis_im: Vec<c64>,
    pub(crate) vis_tmp: Vec<c32>,
    pub(crate) weight_im: Vec<f64>,
    pub(crate) weight_tmp: Vec<f64>,

    pub(crate) output: Option<BinFileWriter>,
    pub(crate) output_path: Option<PathBuf>,
}

impl Cache {
    /// Free every cached resource, collapse the staging buffers without
    /// giving up their allocations, and zero the counters. Idempotent.
    pub(crate) fn reset(&mut self) {
        let Cache {
            init,
            finalised,
            num_vis_processed,
            sel_freqs,
            im_freqs,
            chan_map,
            planes,
            fft,
            corr_func,
            conv_kernel,
            w_kernels,
            max_abs_w,
            uu_im,
            vv_im,
            ww_im,
            vis_im,
            vis_tmp,
            weight_im,
            weight_tmp,
            output,
            output_path,
        } = self;

        *init = false;
        *finalised = false;
        *num_vis_processed = 0;
        *sel_freqs = Vec::new();
        *im_freqs = Vec::new();
        *chan_map = Vec::new();
        *planes = Vec::new();
        *fft = None;
        *corr_func = None;
        *conv_kernel = None;
        *w_kernels = None;
        *max_abs_w = 0.0;
        // Collapse, don't free: the next run reuses these allocations.
        uu_im.clear();
        vv_im.clear();
        ww_im.clear();
        vis_im.clear();
        vis_tmp.clear();
        weight_im.clear();
        weight_tmp.clear();
        // Dropping the writer closes the file.
        *output = None;
        *output_path = None;
    }
}

/// A pausable accumulating timer.
#[derive(Debug, Default)]
pub(crate) struct Timer {
    accumulated: Duration,
    started: Option<Instant>,
}

impl Timer {
    pub(crate) fn start(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    pub(crate) fn pause(&mut self) {
        if let Some(started) = self.started.take() {
            self.accumulated += started.elapsed();
        }
    }

    pub(crate) fn reset(&mut self) {
        self.accumulated = Duration::ZERO;
        self.started = None;
    }

    pub(crate) fn restart(&mut self) {
        self.accumulated = Duration::ZERO;
        self.started = Some(Instant::now());
    }

    pub(crate) fn elapsed(&self) -> Duration {
        match self.started {
            Some(started) => self.accumulated + started.elapsed(),
            None => self.accumulated,
        }
    }
}

/// Stage timers for one imaging run.
#[derive(Debug, Default)]
pub(crate) struct Timers {
    pub(crate) overall: Timer,
    pub(crate) init: Timer,
    pub(crate) select_scale: Timer,
    pub(crate) filter: Timer,
    pub(crate) rotate: Timer,
    pub(crate) weights_grid: Timer,
    pub(crate) weights_lookup: Timer,
    pub(crate) grid_update: Timer,
    pub(crate) grid_finalise: Timer,
    pub(crate) write: Timer,
}

impl Timers {
    pub(crate) fn new() -> Timers {
        let mut timers = Timers::default();
        timers.overall.start();
        timers
    }

    /// Zero every stage timer; the overall timer restarts instead so that
    /// aggregate statistics stay meaningful across a cache reset.
    pub(crate) fn reset_all_but_overall(&mut self) {
        let Timers {
            overall,
            init,
            select_scale,
            filter,
            rotate,
            weights_grid,
            weights_lookup,
            grid_update,
            grid_finalise,
            write,
        } = self;
        overall.restart();
        init.reset();
        select_scale.reset();
        filter.reset();
        rotate.reset();
        weights_grid.reset();
        weights_lookup.reset();
        grid_update.reset();
        grid_finalise.reset();
        write.reset();
    }
}
