// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Make images from a visibility file.

use std::{path::PathBuf, str::FromStr};

use clap::Args;
use log::{debug, info};
use marlu::RADec;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vec1::Vec1;

use crate::{
    imaging::{Algorithm, ConvKernelType, Imager, ImagerError, VisChunk, Weighting},
    io::{binary::BinFileReader, IoError},
    mem::Precision,
    vis::{VisError, VisSet},
};

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("No {0} was supplied")]
    MissingArg(&'static str),

    #[error("Unknown imaging algorithm '{0}'; expected 'fft' or 'wprojection'")]
    UnknownAlgorithm(String),

    #[error("Unknown weighting scheme '{0}'; expected 'natural' or 'uniform'")]
    UnknownWeighting(String),

    #[error("Unknown convolution kernel '{0}'; expected 'pillbox' or 'exponential'")]
    UnknownKernel(String),

    #[error("The visibility file contains no channels")]
    NoChannels,

    #[error("Couldn't read the arguments file {}: {err}", .path.display())]
    ArgsRead {
        path: PathBuf,
        err: std::io::Error,
    },

    #[error("Couldn't parse {} as toml: {err}", .path.display())]
    TomlParse {
        path: PathBuf,
        err: toml::de::Error,
    },

    #[error("Couldn't parse {} as json: {err}", .path.display())]
    JsonParse {
        path: PathBuf,
        err: serde_json::Error,
    },

    #[error("Unrecognised arguments-file extension on {}; expected .toml or .json", .0.display())]
    UnknownArgsFileExt(PathBuf),

    #[error(transparent)]
    Vis(#[from] VisError),

    #[error(transparent)]
    Imager(#[from] ImagerError),

    #[error(transparent)]
    Io(#[from] IoError),
}

/// Arguments for image. Everything except the visibility and arguments files
/// can also come from a TOML or JSON file; CLI flags win.
#[derive(Debug, Clone, Default, Args, Serialize, Deserialize)]
pub(crate) struct ImageArgs {
    /// Path to the visibility file to image.
    #[clap(name = "VIS_FILE")]
    #[serde(skip)]
    pub(crate) data: Option<PathBuf>,

    /// Path to the output image file.
    #[clap(short, long)]
    pub(crate) output: Option<PathBuf>,

    /// Image side length [pixels]. Must be even.
    #[clap(short = 'n', long)]
    pub(crate) size: Option<usize>,

    /// Image field of view [degrees].
    #[clap(short, long)]
    pub(crate) fov_deg: Option<f64>,

    /// Imaging algorithm: fft or wprojection.
    #[clap(short, long)]
    pub(crate) algorithm: Option<String>,

    /// Visibility weighting: natural or uniform.
    #[clap(short, long)]
    pub(crate) weighting: Option<String>,

    /// Gridding kernel for the fft algorithm: pillbox or exponential.
    #[clap(long)]
    pub(crate) kernel: Option<String>,

    /// Gridding kernel support radius [cells].
    #[clap(long)]
    pub(crate) support: Option<i32>,

    /// Gridding kernel oversample factor.
    #[clap(long)]
    pub(crate) oversample: Option<i32>,

    /// Number of W-projection planes.
    #[clap(long)]
    pub(crate) num_w_planes: Option<usize>,

    /// Image each channel separately instead of averaging them into one
    /// plane.
    #[clap(long)]
    #[serde(default)]
    pub(crate) channel_snapshots: bool,

    /// Image each timestep separately instead of averaging them into one
    /// plane.
    #[clap(long)]
    #[serde(default)]
    pub(crate) time_snapshots: bool,

    /// Only image channels at or above this frequency [MHz].
    #[clap(long)]
    pub(crate) freq_min_mhz: Option<f64>,

    /// Only image channels at or below this frequency [MHz].
    #[clap(long)]
    pub(crate) freq_max_mhz: Option<f64>,

    /// Minimum accepted UV length [wavelengths].
    #[clap(long)]
    pub(crate) uv_min_lambda: Option<f64>,

    /// Maximum accepted UV length [wavelengths].
    #[clap(long)]
    pub(crate) uv_max_lambda: Option<f64>,

    /// Image centre right ascension [degrees]; defaults to the visibility
    /// phase centre.
    #[clap(long)]
    pub(crate) centre_ra_deg: Option<f64>,

    /// Image centre declination [degrees]; defaults to the visibility phase
    /// centre.
    #[clap(long)]
    pub(crate) centre_dec_deg: Option<f64>,

    /// Grid in single precision.
    #[clap(long)]
    #[serde(default)]
    pub(crate) single_precision: bool,

    /// All of the arguments above may be specified in a toml or json file;
    /// CLI arguments override parameters set in the file.
    #[clap(name = "ARGUMENTS_FILE")]
    #[serde(skip)]
    pub(crate) args_file: Option<PathBuf>,
}

impl ImageArgs {
    /// Fold an arguments file (if any) underneath the CLI arguments.
    pub(crate) fn merge(self) -> Result<ImageArgs, ImageError> {
        let Some(path) = &self.args_file else {
            return Ok(self);
        };
        debug!("Merging arguments from {}", path.display());
        let contents = std::fs::read_to_string(path).map_err(|err| ImageError::ArgsRead {
            path: path.clone(),
            err,
        })?;
        let mut merged: ImageArgs = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&contents).map_err(|err| ImageError::TomlParse {
                path: path.clone(),
                err,
            })?,
            Some("json") => serde_json::from_str(&contents).map_err(|err| ImageError::JsonParse {
                path: path.clone(),
                err,
            })?,
            _ => return Err(ImageError::UnknownArgsFileExt(path.clone())),
        };

        macro_rules! overlay {
            ($($field:ident),+ $(,)?) => {
                $(
                    if self.$field.is_some() {
                        merged.$field = self.$field.clone();
                    }
                )+
            };
        }
        overlay!(
            output,
            size,
            fov_deg,
            algorithm,
            weighting,
            kernel,
            support,
            oversample,
            num_w_planes,
            freq_min_mhz,
            freq_max_mhz,
            uv_min_lambda,
            uv_max_lambda,
            centre_ra_deg,
            centre_dec_deg,
        );
        merged.channel_snapshots |= self.channel_snapshots;
        merged.time_snapshots |= self.time_snapshots;
        merged.single_precision |= self.single_precision;
        merged.data = self.data.clone();
        merged.args_file = None;
        Ok(merged)
    }

    pub(crate) fn run(self, dry_run: bool) -> Result<(), ImageError> {
        let data = self.data.clone().ok_or(ImageError::MissingArg("visibility file"))?;
        let algorithm = match &self.algorithm {
            Some(s) => {
                Algorithm::from_str(s).map_err(|_| ImageError::UnknownAlgorithm(s.clone()))?
            }
            None => Algorithm::Fft,
        };
        let weighting = match &self.weighting {
            Some(s) => {
                Weighting::from_str(s).map_err(|_| ImageError::UnknownWeighting(s.clone()))?
            }
            None => Weighting::Natural,
        };
        let kernel = match &self.kernel {
            Some(s) => {
                ConvKernelType::from_str(s).map_err(|_| ImageError::UnknownKernel(s.clone()))?
            }
            None => ConvKernelType::Exponential,
        };
        let output = self.output.clone().unwrap_or_else(|| PathBuf::from("image.skb"));

        info!("Reading visibilities from {}", data.display());
        let mut reader = BinFileReader::open(&data)?;
        let vis_set = VisSet::read(&mut reader)?;
        info!(
            "{} timestep(s), {} channel(s), {} baseline(s), {} polarisation(s)",
            vis_set.num_times(),
            vis_set.num_channels(),
            vis_set.num_baselines(),
            vis_set.num_pols()
        );

        let mut imager = Imager::new();
        imager.set_image_size(self.size.unwrap_or(256))?;
        imager.set_fov_deg(self.fov_deg.unwrap_or(2.0))?;
        imager.set_algorithm(algorithm);
        imager.set_weighting(weighting);
        imager.set_kernel(kernel, self.support.unwrap_or(3), self.oversample.unwrap_or(100));
        if let Some(n) = self.num_w_planes {
            imager.set_num_w_planes(n);
        }
        imager.set_channel_snapshots(self.channel_snapshots);
        imager.set_time_snapshots(self.time_snapshots);
        imager.set_num_times(vis_set.num_times());
        imager.set_precision(if self.single_precision {
            Precision::Single
        } else {
            Precision::Double
        });
        imager.set_freq_range(
            self.freq_min_mhz.map_or(0.0, |f| f * 1e6),
            self.freq_max_mhz.map_or(f64::MAX, |f| f * 1e6),
        );
        imager.set_uv_filter(
            self.uv_min_lambda.unwrap_or(0.0),
            self.uv_max_lambda.unwrap_or(f64::MAX),
        );
        imager.set_vis_phase_centre(vis_set.phase_centre());
        if let (Some(ra), Some(dec)) = (self.centre_ra_deg, self.centre_dec_deg) {
            imager.set_direction(RADec::from_degrees(ra, dec));
        }
        let freqs: Vec<f64> = (0..vis_set.num_channels()).map(|c| vis_set.freq_hz(c)).collect();
        imager.set_vis_frequencies(Vec1::try_from_vec(freqs).map_err(|_| ImageError::NoChannels)?);
        imager.set_output_path(output.clone());

        info!(
            "Imaging {0}x{0} pixels over {1} deg with {algorithm} gridding, {weighting} weighting",
            self.size.unwrap_or(256),
            self.fov_deg.unwrap_or(2.0),
        );
        if dry_run {
            info!("Dry run -- not imaging");
            return Ok(());
        }

        let amps = vis_set.stokes_i_amps()?;
        let block = vis_set.num_channels() * vis_set.num_baselines();

        // Uniform weighting and W-projection want the coordinates up front.
        if weighting == Weighting::Uniform || algorithm == Algorithm::WProjection {
            debug!("Coordinate pass");
            imager.set_coords_only(true);
            for t in 0..vis_set.num_times() {
                let (uu, vv, ww) = vis_set.uvw_metres(t)?;
                imager.update(&VisChunk {
                    time_index: t,
                    uu_metres: uu,
                    vv_metres: vv,
                    ww_metres: ww,
                    amps: &[],
                    weights: None,
                })?;
            }
            imager.set_coords_only(false);
        }

        for t in 0..vis_set.num_times() {
            let (uu, vv, ww) = vis_set.uvw_metres(t)?;
            imager.update(&VisChunk {
                time_index: t,
                uu_metres: uu,
                vv_metres: vv,
                ww_metres: ww,
                amps: &amps[t * block..(t + 1) * block],
                weights: None,
            })?;
        }

        let planes = imager.finalise()?;
        info!(
            "Imaged {} visibilities into {} plane(s); written to {}",
            imager.num_vis_processed(),
            planes.len(),
            output.display()
        );
        Ok(())
    }
}
