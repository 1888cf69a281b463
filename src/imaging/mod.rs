// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The imager: convolutional gridding, FFTs and the results cache.

An [`Imager`] moves through five states: freshly constructed (nothing
cached), configured (setters called, still nothing cached), accumulating
(planes allocated lazily on the first [`Imager::update`], visibilities being
gridded), finalising ([`Imager::finalise`] FFTs and normalises every plane)
and output (planes handed back and optionally written). A cache reset
returns it to the configured state from any of the others, and every
shape-affecting setter performs one implicitly.

Uniform weighting and W-projection want a first pass over the coordinates
alone; callers switch that on with [`Imager::set_coords_only`], feed every
chunk, switch it off and feed the chunks again.
 */

mod cache;
mod fft;
pub mod gridder;
pub mod kernel;
#[cfg(test)]
mod tests;
mod weights;

pub use gridder::{grid_1d_real, grid_wproj, GridError};
pub use kernel::{ConvKernel, ConvKernelType, WKernelSet};

use std::path::PathBuf;

use log::{debug, info};
use marlu::{c32, c64, RADec};
use rayon::prelude::*;
use rustfft::FftDirection;
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;
use vec1::Vec1;

use crate::{
    constants::{
        DEFAULT_CONV_OVERSAMPLE, DEFAULT_CONV_SUPPORT, DEFAULT_NUM_W_PLANES,
        DEFAULT_WPROJ_OVERSAMPLE, VEL_C,
    },
    coord::phase_rotate_c64,
    imaging::cache::{Cache, Plane, Timers},
    imaging::fft::{fftshift, Fft2d},
    io::{binary::BinFileWriter, IoError, MetaSink, MetaValue},
    mem::{Mem, MemError, MemLocation, MemType, Precision},
};

/// How visibilities are placed onto the grid.
#[derive(Debug, Display, EnumIter, EnumString, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Separable real-kernel gridding and a 2-D FFT.
    #[strum(serialize = "fft")]
    Fft,

    /// W-projection: per-W-plane complex kernels correct for the non-coplanar
    /// baseline term during gridding.
    #[strum(serialize = "wprojection")]
    WProjection,
}

/// How visibility weights are interpreted.
#[derive(Debug, Display, EnumIter, EnumString, Clone, Copy, PartialEq, Eq)]
pub enum Weighting {
    #[strum(serialize = "natural")]
    Natural,

    #[strum(serialize = "uniform")]
    Uniform,
}

#[derive(Error, Debug)]
pub enum ImagerError {
    #[error("The image size must be an even number of at least 4 pixels, not {0}")]
    BadImageSize(usize),

    #[error("The field of view must be a positive number of degrees, not {0}")]
    BadFov(f64),

    #[error("No visibility frequencies have been set")]
    NoFrequencies,

    #[error("The frequency selection excludes every visibility channel")]
    EmptySelection,

    #[error("Time index {got} is out of range; the imager was configured for {num_times} timesteps")]
    BadTimeIndex { got: usize, num_times: usize },

    #[error("Expected {expected} {what}, but {got} were supplied")]
    ArrayLength {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("The imager has been finalised; reset the cache before gridding more data")]
    Finalised,

    #[error("Nothing has been gridded; there is nothing to finalise")]
    NoData,

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Mem(#[from] MemError),

    #[error(transparent)]
    Io(#[from] IoError),
}

/// One chunk of visibilities to grid: a single timestep, all channels.
/// Amplitudes are Stokes I, channel-major (`[channel][sample]`), and the
/// coordinates are in metres.
#[derive(Debug, Clone, Copy)]
pub struct VisChunk<'a> {
    pub time_index: usize,
    pub uu_metres: &'a [f64],
    pub vv_metres: &'a [f64],
    pub ww_metres: &'a [f64],
    pub amps: &'a [c64],
    pub weights: Option<&'a [f64]>,
}

/// A finished image plane.
#[derive(Debug)]
pub struct ImagePlane {
    pub time_index: usize,
    pub channel_index: usize,
    pub freq_hz: f64,
    pub size: usize,
    /// Real pixel values, row-major, in the configured precision.
    pub data: Mem,
}

#[derive(Debug)]
pub struct Imager {
    image_size: usize,
    fov_deg: f64,
    algorithm: Algorithm,
    weighting: Weighting,
    precision: Precision,
    kernel_type: ConvKernelType,
    support: i32,
    oversample: i32,
    num_w_planes: usize,
    chan_snapshots: bool,
    time_snapshots: bool,
    num_times: usize,
    freq_min_hz: f64,
    freq_max_hz: f64,
    uv_filter_min: f64,
    uv_filter_max: f64,
    vis_freqs: Option<Vec1<f64>>,
    vis_phase_centre: Option<RADec>,
    image_centre: Option<RADec>,
    coords_only: bool,
    output_path: Option<PathBuf>,

    cache: Cache,
    timers: Timers,
}

impl Default for Imager {
    fn default() -> Imager {
        Imager::new()
    }
}

impl Imager {
    pub fn new() -> Imager {
        Imager {
            image_size: 256,
            fov_deg: 2.0,
            algorithm: Algorithm::Fft,
            weighting: Weighting::Natural,
            precision: Precision::Double,
            kernel_type: ConvKernelType::Exponential,
            support: DEFAULT_CONV_SUPPORT,
            oversample: DEFAULT_CONV_OVERSAMPLE,
            num_w_planes: DEFAULT_NUM_W_PLANES,
            chan_snapshots: false,
            time_snapshots: false,
            num_times: 1,
            freq_min_hz: 0.0,
            freq_max_hz: f64::MAX,
            uv_filter_min: 0.0,
            uv_filter_max: f64::MAX,
            vis_freqs: None,
            vis_phase_centre: None,
            image_centre: None,
            coords_only: false,
            output_path: None,
            cache: Cache::default(),
            timers: Timers::new(),
        }
    }

    // Configuration setters. None of these touches the cache contents except
    // through `reset_cache`, which the shape-affecting ones call.

    pub fn set_image_size(&mut self, size: usize) -> Result<(), ImagerError> {
        if size < 4 || size % 2 != 0 {
            return Err(ImagerError::BadImageSize(size));
        }
        self.image_size = size;
        self.reset_cache();
        Ok(())
    }

    pub fn set_fov_deg(&mut self, fov_deg: f64) -> Result<(), ImagerError> {
        if !(fov_deg > 0.0) {
            return Err(ImagerError::BadFov(fov_deg));
        }
        self.fov_deg = fov_deg;
        self.reset_cache();
        Ok(())
    }

    pub fn set_algorithm(&mut self, algorithm: Algorithm) {
        self.algorithm = algorithm;
        self.reset_cache();
    }

    pub fn set_weighting(&mut self, weighting: Weighting) {
        self.weighting = weighting;
        self.reset_cache();
    }

    pub fn set_precision(&mut self, precision: Precision) {
        self.precision = precision;
        self.reset_cache();
    }

    pub fn set_kernel(&mut self, kind: ConvKernelType, support: i32, oversample: i32) {
        self.kernel_type = kind;
        self.support = support.max(1);
        self.oversample = oversample.max(1);
        self.reset_cache();
    }

    pub fn set_num_w_planes(&mut self, num_w_planes: usize) {
        self.num_w_planes = num_w_planes.max(1);
        self.reset_cache();
    }

    pub fn set_channel_snapshots(&mut self, snapshots: bool) {
        self.chan_snapshots = snapshots;
        self.reset_cache();
    }

    pub fn set_time_snapshots(&mut self, snapshots: bool) {
        self.time_snapshots = snapshots;
        self.reset_cache();
    }

    pub fn set_num_times(&mut self, num_times: usize) {
        self.num_times = num_times.max(1);
        self.reset_cache();
    }

    pub fn set_freq_range(&mut self, min_hz: f64, max_hz: f64) {
        self.freq_min_hz = min_hz;
        self.freq_max_hz = max_hz;
        self.reset_cache();
    }

    /// UV-length acceptance window in wavelengths. Purely a per-chunk filter;
    /// the cache is untouched.
    pub fn set_uv_filter(&mut self, min_lambda: f64, max_lambda: f64) {
        self.uv_filter_min = min_lambda;
        self.uv_filter_max = max_lambda;
    }

    pub fn set_vis_frequencies(&mut self, freqs: Vec1<f64>) {
        self.vis_freqs = Some(freqs);
        self.reset_cache();
    }

    pub fn set_vis_phase_centre(&mut self, phase_centre: RADec) {
        self.vis_phase_centre = Some(phase_centre);
        self.reset_cache();
    }

    /// Point the image somewhere other than the visibility phase centre;
    /// chunks are phase-rotated on the way in.
    pub fn set_direction(&mut self, direction: RADec) {
        self.image_centre = Some(direction);
        self.reset_cache();
    }

    /// In coords-only mode, `update` accumulates weight-density grids and
    /// scans the W range, but grids no amplitudes.
    pub fn set_coords_only(&mut self, coords_only: bool) {
        self.coords_only = coords_only;
    }

    pub fn set_output_path(&mut self, path: PathBuf) {
        self.output_path = Some(path);
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    /// Image-domain pixel size in radians.
    pub fn cell_size_rad(&self) -> f64 {
        self.fov_deg.to_radians() / self.image_size as f64
    }

    pub fn num_planes(&self) -> usize {
        self.cache.planes.len()
    }

    pub fn num_vis_processed(&self) -> u64 {
        self.cache.num_vis_processed
    }

    /// Drop every cached resource and return to the configured state. Safe
    /// and idempotent in any state, including on a fresh imager.
    pub fn reset_cache(&mut self) {
        self.cache.reset();
        self.timers.reset_all_but_overall();
    }

    /// Lazily build the plane list, kernels and FFT plans.
    fn check_init(&mut self) -> Result<(), ImagerError> {
        if self.cache.init {
            return Ok(());
        }
        let vis_freqs = self.vis_freqs.as_ref().ok_or(ImagerError::NoFrequencies)?;
        self.timers.init.start();

        // Frequency selection and the input-channel to image-channel map.
        let mut sel_freqs = vec![];
        let mut chan_map = vec![];
        for &freq in vis_freqs.iter() {
            if freq >= self.freq_min_hz && freq <= self.freq_max_hz {
                let im_chan = if self.chan_snapshots { sel_freqs.len() } else { 0 };
                sel_freqs.push(freq);
                chan_map.push(Some(im_chan));
            } else {
                chan_map.push(None);
            }
        }
        if sel_freqs.is_empty() {
            self.timers.init.pause();
            return Err(ImagerError::EmptySelection);
        }
        let im_freqs = if self.chan_snapshots {
            sel_freqs.clone()
        } else {
            vec![sel_freqs.iter().sum::<f64>() / sel_freqs.len() as f64]
        };

        let num_im_times = if self.time_snapshots { self.num_times } else { 1 };
        let num_planes = num_im_times * im_freqs.len();
        let grid_type = match self.precision {
            Precision::Single => MemType::Complex32,
            Precision::Double => MemType::Complex64,
        };
        let num_cells = self.image_size * self.image_size;
        let mut planes = Vec::with_capacity(num_planes);
        for _ in 0..num_planes {
            let weights = match self.weighting {
                Weighting::Uniform => {
                    Some(Mem::new(MemType::Real64, MemLocation::Host, num_cells)?)
                }
                Weighting::Natural => None,
            };
            planes.push(Plane {
                grid: Mem::new(grid_type, MemLocation::Host, num_cells)?,
                norm: 0.0,
                weights,
            });
        }
        debug!(
            "Imager cache: {num_planes} plane(s) of {0}x{0} {grid_type} cells",
            self.image_size
        );

        self.cache.sel_freqs = sel_freqs;
        self.cache.im_freqs = im_freqs;
        self.cache.chan_map = chan_map;
        self.cache.planes = planes;
        self.cache.fft = Some(Fft2d::new(self.image_size));
        if self.algorithm == Algorithm::Fft {
            let kernel = ConvKernel::new(self.kernel_type, self.support, self.oversample);
            self.cache.corr_func = Some(kernel.grid_correction(self.image_size));
            self.cache.conv_kernel = Some(kernel);
        }
        // W-kernels need the W range, so they are built on the first gridding
        // pass instead.
        self.cache.init = true;
        self.timers.init.pause();
        Ok(())
    }

    fn plane_index(&self, time_index: usize, im_chan: usize) -> usize {
        let time_plane = if self.time_snapshots { time_index } else { 0 };
        time_plane * self.cache.im_freqs.len() + im_chan
    }

    /// Grid one chunk of visibilities (or, in coords-only mode, account for
    /// their coordinates).
    pub fn update(&mut self, chunk: &VisChunk) -> Result<(), ImagerError> {
        if self.cache.finalised {
            return Err(ImagerError::Finalised);
        }
        self.check_init()?;

        let num_coords = chunk.uu_metres.len();
        for (what, len) in [
            ("v coordinates", chunk.vv_metres.len()),
            ("w coordinates", chunk.ww_metres.len()),
        ] {
            if len != num_coords {
                return Err(ImagerError::ArrayLength {
                    what,
                    expected: num_coords,
                    got: len,
                });
            }
        }
        let num_channels = self.cache.chan_map.len();
        if !self.coords_only && chunk.amps.len() != num_channels * num_coords {
            return Err(ImagerError::ArrayLength {
                what: "amplitudes",
                expected: num_channels * num_coords,
                got: chunk.amps.len(),
            });
        }
        if let Some(weights) = chunk.weights {
            if weights.len() != num_coords {
                return Err(ImagerError::ArrayLength {
                    what: "weights",
                    expected: num_coords,
                    got: weights.len(),
                });
            }
        }
        if self.time_snapshots && chunk.time_index >= self.num_times {
            return Err(ImagerError::BadTimeIndex {
                got: chunk.time_index,
                num_times: self.num_times,
            });
        }

        // W-projection kernels are sized from the largest |w| seen so far:
        // either the coords-only prepass recorded it, or this chunk sets it.
        if self.algorithm == Algorithm::WProjection
            && !self.coords_only
            && self.cache.w_kernels.is_none()
        {
            let max_freq = self
                .cache
                .sel_freqs
                .iter()
                .fold(0.0_f64, |acc, f| acc.max(*f));
            let chunk_max_w = chunk
                .ww_metres
                .iter()
                .fold(0.0_f64, |acc, w| acc.max(w.abs()))
                * max_freq
                / VEL_C;
            let max_w = self.cache.max_abs_w.max(chunk_max_w);
            debug!("Building {} W-kernels out to |w| = {max_w:.1} wavelengths", self.num_w_planes);
            self.cache.w_kernels = Some(WKernelSet::new(
                self.num_w_planes,
                DEFAULT_WPROJ_OVERSAMPLE,
                max_w,
                self.cell_size_rad(),
                self.image_size,
            ));
        }

        // Phase-rotation offsets towards the image direction, if any.
        let deltas = match (self.image_centre, self.vis_phase_centre) {
            (Some(im), Some(vis)) if im.ra != vis.ra || im.dec != vis.dec => {
                let lmn = im.to_lmn(vis);
                Some((lmn.l, lmn.m, lmn.n - 1.0))
            }
            _ => None,
        };

        let cell_size_rad = self.cell_size_rad();
        let image_size = self.image_size;
        let uv_min = self.uv_filter_min;
        let uv_max = self.uv_filter_max;
        let uv_filter_active = uv_min > 0.0 || uv_max < f64::MAX;
        let coords_only = self.coords_only;
        let weighting = self.weighting;
        let precision = self.precision;
        let time_index = chunk.time_index;

        let mut total_skipped = 0_usize;
        for chan in 0..num_channels {
            let Some(im_chan) = self.cache.chan_map[chan] else {
                continue;
            };
            let plane_idx = self.plane_index(time_index, im_chan);
            let freq = self.vis_freqs.as_ref().expect("checked in check_init")[chan];
            let inv_wavelength = freq / VEL_C;

            // Split the cache so the staging buffers and the planes can be
            // borrowed together.
            let Cache {
                planes,
                uu_im,
                vv_im,
                ww_im,
                vis_im,
                vis_tmp,
                weight_im,
                weight_tmp,
                w_kernels,
                conv_kernel,
                max_abs_w,
                num_vis_processed,
                ..
            } = &mut self.cache;
            let plane = &mut planes[plane_idx];

            // Scale coordinates to wavelengths, stage amplitudes and weights,
            // and apply the UV filter while doing so.
            self.timers.select_scale.start();
            uu_im.clear();
            vv_im.clear();
            ww_im.clear();
            vis_im.clear();
            weight_im.clear();
            let amp_block: &[c64] = if coords_only {
                &[]
            } else {
                &chunk.amps[chan * num_coords..(chan + 1) * num_coords]
            };
            for i in 0..num_coords {
                let u = chunk.uu_metres[i] * inv_wavelength;
                let v = chunk.vv_metres[i] * inv_wavelength;
                let w = chunk.ww_metres[i] * inv_wavelength;
                if uv_filter_active {
                    let uv_len = (u * u + v * v).sqrt();
                    if uv_len < uv_min || uv_len > uv_max {
                        continue;
                    }
                }
                uu_im.push(u);
                vv_im.push(v);
                ww_im.push(w);
                if !coords_only {
                    vis_im.push(amp_block[i]);
                }
                weight_im.push(chunk.weights.map_or(1.0, |w| w[i]));
            }
            self.timers.select_scale.pause();

            if coords_only {
                // Weight-density accumulation and W scan only.
                self.timers.weights_grid.start();
                for w in ww_im.iter() {
                    *max_abs_w = max_abs_w.max(w.abs());
                }
                if let Some(wgrid) = plane.weights.as_mut() {
                    let mut skipped = 0;
                    weights::grid_weights_write(
                        uu_im,
                        vv_im,
                        weight_im,
                        cell_size_rad,
                        image_size,
                        &mut skipped,
                        wgrid.as_real64_mut()?,
                    );
                    total_skipped += skipped;
                }
                self.timers.weights_grid.pause();
                continue;
            }

            // Phase-rotate the staged amplitudes to the image direction.
            if let Some((dl, dm, dn)) = deltas {
                self.timers.rotate.start();
                phase_rotate_c64(uu_im, vv_im, ww_im, vis_im, dl, dm, dn);
                self.timers.rotate.pause();
            }

            // Resolve weights, then fold them into the staged amplitudes.
            self.timers.weights_lookup.start();
            match (weighting, plane.weights.as_ref()) {
                (Weighting::Uniform, Some(wgrid)) => {
                    weights::grid_weights_read(
                        uu_im,
                        vv_im,
                        weight_im,
                        cell_size_rad,
                        image_size,
                        wgrid.as_real64()?,
                        weight_tmp,
                    );
                    for (v, w) in vis_im.iter_mut().zip(weight_tmp.iter()) {
                        *v *= *w;
                    }
                }
                _ => {
                    for (v, w) in vis_im.iter_mut().zip(weight_im.iter()) {
                        *v *= *w;
                    }
                }
            }
            self.timers.weights_lookup.pause();

            // Grid.
            self.timers.grid_update.start();
            let mut skipped = 0;
            let mut norm = 0.0;
            match (self.algorithm, precision) {
                (Algorithm::Fft, Precision::Double) => {
                    let kernel = conv_kernel.as_ref().expect("built in check_init");
                    gridder::grid_1d_real(
                        kernel,
                        uu_im,
                        vv_im,
                        vis_im,
                        cell_size_rad,
                        image_size,
                        &mut skipped,
                        &mut norm,
                        plane.grid.as_complex64_mut()?,
                    )?;
                }
                (Algorithm::Fft, Precision::Single) => {
                    let kernel = conv_kernel.as_ref().expect("built in check_init");
                    vis_tmp.clear();
                    vis_tmp.extend(vis_im.iter().map(|v| c32::new(v.re as f32, v.im as f32)));
                    gridder::grid_1d_real(
                        kernel,
                        uu_im,
                        vv_im,
                        vis_tmp,
                        cell_size_rad,
                        image_size,
                        &mut skipped,
                        &mut norm,
                        plane.grid.as_complex32_mut()?,
                    )?;
                }
                (Algorithm::WProjection, Precision::Double) => {
                    let wk = w_kernels.as_ref().expect("built above");
                    gridder::grid_wproj(
                        wk,
                        uu_im,
                        vv_im,
                        ww_im,
                        vis_im,
                        cell_size_rad,
                        image_size,
                        &mut skipped,
                        &mut norm,
                        plane.grid.as_complex64_mut()?,
                    )?;
                }
                (Algorithm::WProjection, Precision::Single) => {
                    let wk = w_kernels.as_ref().expect("built above");
                    vis_tmp.clear();
                    vis_tmp.extend(vis_im.iter().map(|v| c32::new(v.re as f32, v.im as f32)));
                    gridder::grid_wproj(
                        wk,
                        uu_im,
                        vv_im,
                        ww_im,
                        vis_tmp,
                        cell_size_rad,
                        image_size,
                        &mut skipped,
                        &mut norm,
                        plane.grid.as_complex32_mut()?,
                    )?;
                }
            }
            plane.norm += norm;
            total_skipped += skipped;
            *num_vis_processed += vis_im.len() as u64;
            self.timers.grid_update.pause();
        }

        if total_skipped > 0 {
            debug!("{total_skipped} visibilities fell outside the grid and were skipped");
        }
        Ok(())
    }

    /// FFT, normalise and correct every plane, write them to the configured
    /// output and hand them back.
    pub fn finalise(&mut self) -> Result<Vec<ImagePlane>, ImagerError> {
        if self.cache.finalised {
            return Err(ImagerError::Finalised);
        }
        if !self.cache.init {
            return Err(ImagerError::NoData);
        }

        self.timers.grid_finalise.start();
        let image_size = self.image_size;
        let num_im_chans = self.cache.im_freqs.len();
        let fft = self.cache.fft.as_ref().expect("built in check_init");
        let corr_func = self.cache.corr_func.as_deref();

        let images: Vec<Vec<f64>> = self
            .cache
            .planes
            .par_iter()
            .map(|plane| finalise_plane(plane, fft, corr_func, image_size))
            .collect::<Result<_, MemError>>()?;
        self.timers.grid_finalise.pause();

        // Package and optionally write the planes.
        self.timers.write.start();
        if let (Some(path), None) = (self.output_path.as_ref(), self.cache.output.as_ref()) {
            info!("Writing image planes to {}", path.display());
            let mut writer = BinFileWriter::create(path)?;
            writer.write_meta("image/size", MetaValue::U64(image_size as u64))?;
            writer.write_meta("image/fov_deg", MetaValue::F64(self.fov_deg))?;
            writer.write_meta("image/algorithm", MetaValue::Str(self.algorithm.to_string()))?;
            writer.write_meta(
                "image/num_planes",
                MetaValue::U64(self.cache.planes.len() as u64),
            )?;
            self.cache.output = Some(writer);
            self.cache.output_path = Some(path.clone());
        }

        let mut planes_out = Vec::with_capacity(images.len());
        for (idx, pixels) in images.into_iter().enumerate() {
            let time_index = idx / num_im_chans;
            let channel_index = idx % num_im_chans;
            let freq_hz = self.cache.im_freqs[channel_index];
            let data = match self.precision {
                Precision::Double => {
                    let mut m = Mem::new(MemType::Real64, MemLocation::Host, pixels.len())?;
                    m.as_real64_mut()?.copy_from_slice(&pixels);
                    m
                }
                Precision::Single => {
                    let mut m = Mem::new(MemType::Real32, MemLocation::Host, pixels.len())?;
                    for (dst, src) in m.as_real32_mut()?.iter_mut().zip(&pixels) {
                        *dst = *src as f32;
                    }
                    m
                }
            };
            if let Some(writer) = self.cache.output.as_mut() {
                let key = format!("image/plane_t{time_index}_c{channel_index}");
                writer.write_meta(&format!("{key}/freq_hz"), MetaValue::F64(freq_hz))?;
                writer.write_payload(&key, &data)?;
            }
            planes_out.push(ImagePlane {
                time_index,
                channel_index,
                freq_hz,
                size: image_size,
                data,
            });
        }
        if let Some(writer) = self.cache.output.as_mut() {
            writer.flush()?;
        }
        self.timers.write.pause();

        self.cache.finalised = true;
        debug!(
            "Imaging finished: {} plane(s), {} visibilities, {:.3} s overall{}",
            planes_out.len(),
            self.cache.num_vis_processed,
            self.timers.overall.elapsed().as_secs_f64(),
            match self.cache.output_path.as_ref() {
                Some(path) => format!(", written to {}", path.display()),
                None => String::new(),
            },
        );
        Ok(planes_out)
    }
}

/// Transform one plane's grid to the image domain and return the corrected
/// real pixels in double precision. The grid itself is left untouched; the
/// transform runs on a promoted copy.
fn finalise_plane(
    plane: &Plane,
    fft: &Fft2d,
    corr_func: Option<&[f64]>,
    image_size: usize,
) -> Result<Vec<f64>, MemError> {
    // Promote single-precision grids for the transform.
    let mut scratch: Vec<c64> = match plane.grid.mem_type() {
        MemType::Complex64 => plane.grid.as_complex64()?.to_vec(),
        _ => plane
            .grid
            .as_complex32()?
            .iter()
            .map(|v| c64::new(v.re as f64, v.im as f64))
            .collect(),
    };

    fftshift(&mut scratch, image_size);
    fft.exec(&mut scratch, FftDirection::Inverse);
    fftshift(&mut scratch, image_size);

    let norm = if plane.norm != 0.0 { plane.norm } else { 1.0 };
    let mut pixels = Vec::with_capacity(scratch.len());
    for (idx, value) in scratch.iter().enumerate() {
        let mut pixel = value.re / norm;
        if let Some(corr) = corr_func {
            let x = idx % image_size;
            let y = idx / image_size;
            let c = corr[x] * corr[y];
            if c.abs() > 1e-8 {
                pixel /= c;
            }
        }
        pixels.push(pixel);
    }
    Ok(pixels)
}
