// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Simulate visibilities for a station layout and a sky-model source list.
//!
//! Simulation and collection run on separate threads over a bounded channel;
//! the visibility file is written once the set is complete.

use std::{
    path::PathBuf,
    thread::{self, ScopedJoinHandle},
};

use clap::Args;
use crossbeam_channel::bounded;
use crossbeam_utils::atomic::AtomicCell;
use hifitime::{Duration, Epoch};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info};
use marlu::{
    pos::xyz::{xyzs_to_cross_uvws, xyzs_to_uvws},
    LmnRime, RADec, XyzGeodetic, UVW,
};
use scopeguard::defer_on_unwind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    constants::{DAYSEC, TAU, VEL_C},
    coord::mjd_ut1_to_era,
    correlate::{correlate, CorrelateError, CorrelatorOptions},
    io::{binary::BinFileWriter, IoError},
    jones::{JonesError, JonesSet},
    math::num_cross_baselines,
    mem::{Mem, MemError, MemLocation, MemType, Precision},
    srclist::{read_source_list_file, SourceList, SrclistError},
    telescope::{read_station_layout_file, TelescopeFileError},
    vis::{VisError, VisSet},
    PROGRESS_BARS,
};

#[derive(Error, Debug)]
pub enum VisSimulateError {
    #[error("No {0} was supplied")]
    MissingArg(&'static str),

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
    Telescope(#[from] TelescopeFileError),

    #[error(transparent)]
    Srclist(#[from] SrclistError),

    #[error(transparent)]
    Vis(#[from] VisError),

    #[error(transparent)]
    Correlate(#[from] CorrelateError),

    #[error(transparent)]
    Jones(#[from] JonesError),

    #[error(transparent)]
    Mem(#[from] MemError),

    #[error(transparent)]
    Io(#[from] IoError),
}

/// Arguments for vis-simulate. Everything except the arguments file itself
/// can also come from a TOML or JSON file; CLI flags win.
#[derive(Debug, Clone, Default, Args, Serialize, Deserialize)]
pub(crate) struct VisSimulateArgs {
    /// Path to the station layout file (one "x y z" row per station, in
    /// metres).
    #[clap(short = 's', long)]
    pub(crate) station_layout: Option<PathBuf>,

    /// Path to the sky-model source list (one "name ra_deg dec_deg flux_jy"
    /// row per source).
    #[clap(short = 'c', long)]
    pub(crate) source_list: Option<PathBuf>,

    /// Path to the output visibility file.
    #[clap(short, long)]
    pub(crate) output: Option<PathBuf>,

    /// Phase centre right ascension [degrees].
    #[clap(short, long)]
    pub(crate) ra_deg: Option<f64>,

    /// Phase centre declination [degrees].
    #[clap(short, long)]
    pub(crate) dec_deg: Option<f64>,

    /// Array longitude [degrees], used to convert Earth rotation angle to
    /// local sidereal time.
    #[clap(long)]
    pub(crate) longitude_deg: Option<f64>,

    /// The number of timesteps to simulate.
    #[clap(long)]
    pub(crate) num_timesteps: Option<usize>,

    /// Integration time per timestep [seconds].
    #[clap(long)]
    pub(crate) int_time_sec: Option<f64>,

    /// Start of the observation as MJD(UTC).
    #[clap(long)]
    pub(crate) start_mjd_utc: Option<f64>,

    /// UT1 - UTC [seconds].
    #[clap(long)]
    pub(crate) dut1_sec: Option<f64>,

    /// The number of frequency channels.
    #[clap(long)]
    pub(crate) num_channels: Option<usize>,

    /// Frequency of the first channel [MHz].
    #[clap(long)]
    pub(crate) freq_start_mhz: Option<f64>,

    /// Channel frequency resolution [kHz].
    #[clap(long)]
    pub(crate) freq_res_khz: Option<f64>,

    /// Channel bandwidth divided by frequency, for bandwidth smearing. 0
    /// disables smearing.
    #[clap(long)]
    pub(crate) frac_bandwidth: Option<f64>,

    /// Minimum accepted baseline UV length [wavelengths].
    #[clap(long)]
    pub(crate) uv_min_lambda: Option<f64>,

    /// Maximum accepted baseline UV length [wavelengths].
    #[clap(long)]
    pub(crate) uv_max_lambda: Option<f64>,

    /// Simulate full 2x2 polarised visibilities instead of Stokes-I scalars.
    #[clap(long)]
    #[serde(default)]
    pub(crate) polarised: bool,

    /// Simulate in single precision.
    #[clap(long)]
    #[serde(default)]
    pub(crate) single_precision: bool,

    /// All of the arguments above may be specified in a toml or json file;
    /// CLI arguments override parameters set in the file.
    #[clap(name = "ARGUMENTS_FILE")]
    #[serde(skip)]
    pub(crate) args_file: Option<PathBuf>,
}

impl VisSimulateArgs {
    /// Fold an arguments file (if any) underneath the CLI arguments.
    pub(crate) fn merge(self) -> Result<VisSimulateArgs, VisSimulateError> {
        let Some(path) = &self.args_file else {
            return Ok(self);
        };
        debug!("Merging arguments from {}", path.display());
        let contents = std::fs::read_to_string(path).map_err(|err| VisSimulateError::ArgsRead {
            path: path.clone(),
            err,
        })?;
        let mut merged: VisSimulateArgs = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&contents).map_err(|err| VisSimulateError::TomlParse {
                path: path.clone(),
                err,
            })?,
            Some("json") => {
                serde_json::from_str(&contents).map_err(|err| VisSimulateError::JsonParse {
                    path: path.clone(),
                    err,
                })?
            }
            _ => return Err(VisSimulateError::UnknownArgsFileExt(path.clone())),
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
            station_layout,
            source_list,
            output,
            ra_deg,
            dec_deg,
            longitude_deg,
            num_timesteps,
            int_time_sec,
            start_mjd_utc,
            dut1_sec,
            num_channels,
            freq_start_mhz,
            freq_res_khz,
            frac_bandwidth,
            uv_min_lambda,
            uv_max_lambda,
        );
        merged.polarised |= self.polarised;
        merged.single_precision |= self.single_precision;
        merged.args_file = None;
        Ok(merged)
    }

    pub(crate) fn run(self, dry_run: bool) -> Result<(), VisSimulateError> {
        let params = VisSimulateParams::try_from(self)?;
        params.log_summary();
        if dry_run {
            info!("Dry run -- not simulating");
            return Ok(());
        }
        params.run()
    }
}

struct VisSimulateParams {
    stations: Vec<XyzGeodetic>,
    sources: SourceList,
    phase_centre: RADec,
    longitude_rad: f64,
    num_timesteps: usize,
    int_time_sec: f64,
    start_mjd_utc: f64,
    dut1_sec: f64,
    num_channels: usize,
    freq_start_hz: f64,
    freq_inc_hz: f64,
    frac_bandwidth: f64,
    uv_min_lambda: f64,
    uv_max_lambda: f64,
    polarised: bool,
    precision: Precision,
    output: PathBuf,
}

impl TryFrom<VisSimulateArgs> for VisSimulateParams {
    type Error = VisSimulateError;

    fn try_from(args: VisSimulateArgs) -> Result<VisSimulateParams, VisSimulateError> {
        let station_layout = args
            .station_layout
            .ok_or(VisSimulateError::MissingArg("station layout file"))?;
        let source_list = args
            .source_list
            .ok_or(VisSimulateError::MissingArg("source list file"))?;
        let ra_deg = args.ra_deg.ok_or(VisSimulateError::MissingArg("phase centre RA"))?;
        let dec_deg = args.dec_deg.ok_or(VisSimulateError::MissingArg("phase centre Dec"))?;

        Ok(VisSimulateParams {
            stations: read_station_layout_file(station_layout)?,
            sources: read_source_list_file(source_list)?,
            phase_centre: RADec::from_degrees(ra_deg, dec_deg),
            longitude_rad: args.longitude_deg.unwrap_or(0.0).to_radians(),
            num_timesteps: args.num_timesteps.unwrap_or(10).max(1),
            int_time_sec: args.int_time_sec.unwrap_or(8.0),
            start_mjd_utc: args.start_mjd_utc.unwrap_or(57754.0),
            dut1_sec: args.dut1_sec.unwrap_or(0.0),
            num_channels: args.num_channels.unwrap_or(8).max(1),
            freq_start_hz: args.freq_start_mhz.unwrap_or(150.0) * 1e6,
            freq_inc_hz: args.freq_res_khz.unwrap_or(80.0) * 1e3,
            frac_bandwidth: args.frac_bandwidth.unwrap_or(0.0),
            uv_min_lambda: args.uv_min_lambda.unwrap_or(0.0),
            uv_max_lambda: args.uv_max_lambda.unwrap_or(f64::MAX),
            polarised: args.polarised,
            precision: if args.single_precision {
                Precision::Single
            } else {
                Precision::Double
            },
            output: args.output.unwrap_or_else(|| PathBuf::from("vis.skb")),
        })
    }
}

/// One timestep's worth of simulated data in flight between the simulation
/// and collection threads.
struct TimestepBlock {
    time_index: usize,
    cross_uvws: Vec<UVW>,
    channel_amps: Vec<Mem>,
}

impl VisSimulateParams {
    fn log_summary(&self) {
        let num_stations = self.stations.len();
        info!(
            "Simulating {} station(s), {} baseline(s), {} source(s)",
            num_stations,
            num_cross_baselines(num_stations),
            self.sources.len()
        );
        info!(
            "{} timestep(s) of {} s from MJD(UTC) {}",
            self.num_timesteps, self.int_time_sec, self.start_mjd_utc
        );
        info!(
            "{} channel(s) from {:.3} MHz every {:.1} kHz",
            self.num_channels,
            self.freq_start_hz / 1e6,
            self.freq_inc_hz / 1e3
        );
        info!(
            "Phase centre: RA {:.4} deg, Dec {:.4} deg; {} {} precision",
            self.phase_centre.ra.to_degrees(),
            self.phase_centre.dec.to_degrees(),
            if self.polarised { "polarised," } else { "unpolarised," },
            self.precision,
        );
    }

    fn run(&self) -> Result<(), VisSimulateError> {
        let num_stations = self.stations.len();
        let num_baselines = num_cross_baselines(num_stations);
        let num_sources = self.sources.len();

        let (jones_type, num_pols) = match (self.polarised, self.precision) {
            (false, Precision::Double) => (MemType::Complex64, 1),
            (false, Precision::Single) => (MemType::Complex32, 1),
            (true, Precision::Double) => (MemType::Matrix64, 4),
            (true, Precision::Single) => (MemType::Matrix32, 4),
        };
        let real_type = jones_type.real_type();

        // Per-source values, fixed over the whole observation.
        let mut lmns_rime = Vec::with_capacity(num_sources);
        let mut ls = Vec::with_capacity(num_sources);
        let mut ms = Vec::with_capacity(num_sources);
        let mut fluxes = Vec::with_capacity(num_sources);
        for source in self.sources.values() {
            let lmn = source.radec.to_lmn(self.phase_centre);
            lmns_rime.push(lmn.prepare_for_rime());
            ls.push(lmn.l);
            ms.push(lmn.m);
            fluxes.push(source.flux_i_jy);
        }
        let source_i = real_mem_from(real_type, &fluxes)?;
        let source_l = real_mem_from(real_type, &ls)?;
        let source_m = real_mem_from(real_type, &ms)?;

        let (tx, rx) = bounded(3);
        let error = AtomicCell::new(false);
        let error = &error;

        let vis_set = thread::scope(|scope| -> Result<VisSet, VisSimulateError> {
            // Simulation thread: correlate every (time, channel) block.
            let params = &*self;
            let source_i = &source_i;
            let source_l = &source_l;
            let source_m = &source_m;
            let lmns_rime: &[LmnRime] = &lmns_rime;
            let sim_handle: ScopedJoinHandle<Result<(), VisSimulateError>> =
                thread::Builder::new()
                    .name("simulate".to_string())
                    .spawn_scoped(scope, move || {
                        defer_on_unwind! { error.store(true); }

                        let mut jones =
                            JonesSet::new(jones_type, MemLocation::Host, num_stations, num_sources)?;
                        let mut scratch = Mem::new(jones_type, MemLocation::Host, num_baselines)?;
                        let mut station_u = Mem::new(real_type, MemLocation::Host, num_stations)?;
                        let mut station_v = Mem::new(real_type, MemLocation::Host, num_stations)?;

                        for t in 0..params.num_timesteps {
                            if error.load() {
                                return Ok(());
                            }

                            // Mid-point of the integration, as UT1.
                            let epoch = Epoch::from_mjd_utc(params.start_mjd_utc)
                                + Duration::from_seconds((t as f64 + 0.5) * params.int_time_sec);
                            let mjd_ut1 = epoch.to_mjd_utc_days() + params.dut1_sec / DAYSEC;
                            let lst = (mjd_ut1_to_era(mjd_ut1) + params.longitude_rad)
                                .rem_euclid(TAU);
                            let hadec = params.phase_centre.to_hadec(lst);
                            let station_uvws = xyzs_to_uvws(&params.stations, hadec);
                            let cross_uvws = xyzs_to_cross_uvws(&params.stations, hadec);

                            fill_real_mem(&mut station_u, station_uvws.iter().map(|uvw| uvw.u))?;
                            fill_real_mem(&mut station_v, station_uvws.iter().map(|uvw| uvw.v))?;

                            let mut channel_amps = Vec::with_capacity(params.num_channels);
                            for c in 0..params.num_channels {
                                let freq = params.freq_start_hz + c as f64 * params.freq_inc_hz;
                                let inv_wavelength = freq / VEL_C;
                                jones.set_phase_terms(&station_uvws, lmns_rime, inv_wavelength)?;

                                scratch.fill_zero();
                                let options = CorrelatorOptions {
                                    uv_min_lambda: params.uv_min_lambda,
                                    uv_max_lambda: params.uv_max_lambda,
                                    inv_wavelength,
                                    frac_bandwidth: params.frac_bandwidth,
                                };
                                correlate(
                                    &jones, source_i, source_l, source_m, &station_u, &station_v,
                                    &options, &mut scratch,
                                )?;
                                channel_amps.push(scratch.clone());
                            }

                            // The receiver hanging up means it hit an error;
                            // it will be reported from that thread.
                            if tx
                                .send(TimestepBlock {
                                    time_index: t,
                                    cross_uvws,
                                    channel_amps,
                                })
                                .is_err()
                            {
                                return Ok(());
                            }
                        }
                        Ok(())
                    })
                    .expect("OS can create threads");

            // Collection thread: fill the visibility set.
            let collect_handle: ScopedJoinHandle<Result<VisSet, VisSimulateError>> =
                thread::Builder::new()
                    .name("collect".to_string())
                    .spawn_scoped(scope, move || {
                        defer_on_unwind! { error.store(true); }

                        let multi_progress =
                            MultiProgress::with_draw_target(if PROGRESS_BARS.load() {
                                ProgressDrawTarget::stdout()
                            } else {
                                ProgressDrawTarget::hidden()
                            });
                        let pb = ProgressBar::new(params.num_timesteps as u64)
                            .with_style(
                                ProgressStyle::default_bar()
                                    .template("{msg:16}: [{wide_bar:.blue}] {pos:3}/{len:3} timesteps ({elapsed_precise}<{eta_precise})")
                                    .unwrap()
                                    .progress_chars("=> "),
                            )
                            .with_position(0)
                            .with_message("Simulating");
                        let pb = multi_progress.add(pb);

                        let mut vis_set = VisSet::new(
                            params.precision,
                            num_pols,
                            params.num_timesteps,
                            params.num_channels,
                            num_stations,
                            params.freq_start_hz,
                            params.freq_inc_hz,
                            params.start_mjd_utc,
                            params.int_time_sec,
                            params.phase_centre,
                        )?;

                        while let Ok(block) = rx.recv() {
                            vis_set.set_baseline_uvws(block.time_index, &block.cross_uvws)?;
                            for (c, amps) in block.channel_amps.iter().enumerate() {
                                vis_set.insert_amps(block.time_index, c, amps)?;
                            }
                            pb.inc(1);
                        }
                        pb.finish_with_message("Simulated");
                        Ok(vis_set)
                    })
                    .expect("OS can create threads");

            let sim_result = sim_handle.join().expect("simulation thread didn't panic");
            let collect_result = collect_handle.join().expect("collection thread didn't panic");
            sim_result?;
            collect_result
        })?;

        info!("Writing visibilities to {}", self.output.display());
        let mut writer = BinFileWriter::create(&self.output)?;
        vis_set.write(&mut writer)?;
        Ok(())
    }
}

fn real_mem_from(real_type: MemType, values: &[f64]) -> Result<Mem, MemError> {
    let mut mem = Mem::new(real_type, MemLocation::Host, values.len())?;
    fill_real_mem(&mut mem, values.iter().copied())?;
    Ok(mem)
}

fn fill_real_mem(
    mem: &mut Mem,
    values: impl Iterator<Item = f64>,
) -> Result<(), MemError> {
    match mem.mem_type() {
        MemType::Real64 => {
            for (dst, src) in mem.as_real64_mut()?.iter_mut().zip(values) {
                *dst = src;
            }
        }
        _ => {
            for (dst, src) in mem.as_real32_mut()?.iter_mut().zip(values) {
                *dst = src as f32;
            }
        }
    }
    Ok(())
}
