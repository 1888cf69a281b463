// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The visibility set: everything one simulation run produces.

Amplitudes are indexed by (time, channel, baseline) with either one
polarisation (complex scalars) or four (Jones matrices) per sample, and are
paired with per-(time, baseline) UVW coordinates in metres. Baseline
coordinates are always double precision; only the amplitudes follow the
requested precision. Dimensions are fixed at allocation and the set is
filled incrementally, one time/channel block at a time.
 */


use marlu::{c64, RADec, UVW};
use thiserror::Error;

use crate::{
    io::{meta_f64, meta_u64, IoError, MetaSink, MetaSource, MetaValue},
    math::num_cross_baselines,
    mem::{Mem, MemError, MemLocation, MemType, Precision},
};

#[derive(Error, Debug)]
pub enum VisError {
    #[error("A visibility set holds 1 or 4 polarisations, not {0}")]
    BadPolCount(usize),

    #[error("A visibility set needs at least 2 stations, but {0} were given")]
    TooFewStations(usize),

    #[error("Expected {expected} {what}, but {got} were supplied")]
    ArrayLength {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{what} index {got} is out of range ({max} available)")]
    IndexOutOfRange {
        what: &'static str,
        got: usize,
        max: usize,
    },

    #[error("The visibility records in this file are inconsistent: {0}")]
    InconsistentRecords(&'static str),

    #[error(transparent)]
    Mem(#[from] MemError),

    #[error(transparent)]
    Io(#[from] IoError),
}

/// Axis metadata and payload buffers for one observation.
#[derive(Debug, Clone)]
pub struct VisSet {
    num_times: usize,
    num_channels: usize,
    num_stations: usize,
    num_pols: usize,
    freq_start_hz: f64,
    freq_inc_hz: f64,
    time_start_mjd_utc: f64,
    time_inc_sec: f64,
    phase_centre: RADec,
    /// (time, channel, baseline), scalar or matrix.
    amps: Mem,
    /// (time, baseline), metres.
    uu: Mem,
    vv: Mem,
    ww: Mem,
}

impl VisSet {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        precision: Precision,
        num_pols: usize,
        num_times: usize,
        num_channels: usize,
        num_stations: usize,
        freq_start_hz: f64,
        freq_inc_hz: f64,
        time_start_mjd_utc: f64,
        time_inc_sec: f64,
        phase_centre: RADec,
    ) -> Result<VisSet, VisError> {
        let amp_type = match (num_pols, precision) {
            (1, Precision::Single) => MemType::Complex32,
            (1, Precision::Double) => MemType::Complex64,
            (4, Precision::Single) => MemType::Matrix32,
            (4, Precision::Double) => MemType::Matrix64,
            (n, _) => return Err(VisError::BadPolCount(n)),
        };
        if num_stations < 2 {
            return Err(VisError::TooFewStations(num_stations));
        }
        let num_baselines = num_cross_baselines(num_stations);
        let amps = Mem::new(
            amp_type,
            MemLocation::Host,
            num_times * num_channels * num_baselines,
        )?;
        let uu = Mem::new(MemType::Real64, MemLocation::Host, num_times * num_baselines)?;
        let vv = Mem::new(MemType::Real64, MemLocation::Host, num_times * num_baselines)?;
        let ww = Mem::new(MemType::Real64, MemLocation::Host, num_times * num_baselines)?;
        Ok(VisSet {
            num_times,
            num_channels,
            num_stations,
            num_pols,
            freq_start_hz,
            freq_inc_hz,
            time_start_mjd_utc,
            time_inc_sec,
            phase_centre,
            amps,
            uu,
            vv,
            ww,
        })
    }

    pub fn num_times(&self) -> usize {
        self.num_times
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn num_stations(&self) -> usize {
        self.num_stations
    }

    pub fn num_baselines(&self) -> usize {
        num_cross_baselines(self.num_stations)
    }

    pub fn num_pols(&self) -> usize {
        self.num_pols
    }

    pub fn phase_centre(&self) -> RADec {
        self.phase_centre
    }

    pub fn freq_hz(&self, channel: usize) -> f64 {
        self.freq_start_hz + channel as f64 * self.freq_inc_hz
    }

    pub fn time_mjd_utc(&self, time: usize) -> f64 {
        self.time_start_mjd_utc + time as f64 * self.time_inc_sec / 86400.0
    }

    pub fn amps(&self) -> &Mem {
        &self.amps
    }

    pub fn amps_mut(&mut self) -> &mut Mem {
        &mut self.amps
    }

    fn check_indices(&self, time: usize, channel: usize) -> Result<(), VisError> {
        if time >= self.num_times {
            return Err(VisError::IndexOutOfRange {
                what: "time",
                got: time,
                max: self.num_times,
            });
        }
        if channel >= self.num_channels {
            return Err(VisError::IndexOutOfRange {
                what: "channel",
                got: channel,
                max: self.num_channels,
            });
        }
        Ok(())
    }

    /// Copy one (time, channel) block of baseline amplitudes into the set.
    /// The block must have the set's amplitude type and one element per
    /// baseline.
    pub fn insert_amps(&mut self, time: usize, channel: usize, block: &Mem) -> Result<(), VisError> {
        self.check_indices(time, channel)?;
        let nb = self.num_baselines();
        if block.len() != nb {
            return Err(VisError::ArrayLength {
                what: "baseline amplitudes",
                expected: nb,
                got: block.len(),
            });
        }
        let offset = (time * self.num_channels + channel) * nb;
        match self.amps.mem_type() {
            MemType::Complex64 => self.amps.as_complex64_mut()?[offset..offset + nb]
                .copy_from_slice(block.as_complex64()?),
            MemType::Complex32 => self.amps.as_complex32_mut()?[offset..offset + nb]
                .copy_from_slice(block.as_complex32()?),
            MemType::Matrix64 => self.amps.as_matrix64_mut()?[offset..offset + nb]
                .copy_from_slice(block.as_matrix64()?),
            MemType::Matrix32 => self.amps.as_matrix32_mut()?[offset..offset + nb]
                .copy_from_slice(block.as_matrix32()?),
            _ => unreachable!("amplitude buffers are always complex"),
        }
        Ok(())
    }

    /// Store one timestep's baseline UVWs, in metres.
    pub fn set_baseline_uvws(&mut self, time: usize, uvws: &[UVW]) -> Result<(), VisError> {
        self.check_indices(time, 0)?;
        let nb = self.num_baselines();
        if uvws.len() != nb {
            return Err(VisError::ArrayLength {
                what: "baseline UVWs",
                expected: nb,
                got: uvws.len(),
            });
        }
        let offset = time * nb;
        let uu = self.uu.as_real64_mut()?;
        for (dst, uvw) in uu[offset..offset + nb].iter_mut().zip(uvws) {
            *dst = uvw.u;
        }
        let vv = self.vv.as_real64_mut()?;
        for (dst, uvw) in vv[offset..offset + nb].iter_mut().zip(uvws) {
            *dst = uvw.v;
        }
        let ww = self.ww.as_real64_mut()?;
        for (dst, uvw) in ww[offset..offset + nb].iter_mut().zip(uvws) {
            *dst = uvw.w;
        }
        Ok(())
    }

    /// One timestep's baseline coordinates, in metres.
    pub fn uvw_metres(&self, time: usize) -> Result<(&[f64], &[f64], &[f64]), VisError> {
        self.check_indices(time, 0)?;
        let nb = self.num_baselines();
        let range = time * nb..(time + 1) * nb;
        Ok((
            &self.uu.as_real64()?[range.clone()],
            &self.vv.as_real64()?[range.clone()],
            &self.ww.as_real64()?[range],
        ))
    }

    /// All amplitudes reduced to Stokes I in double precision, in (time,
    /// channel, baseline) order: scalar sets are promoted as-is, matrix sets
    /// become (XX + YY) / 2.
    pub fn stokes_i_amps(&self) -> Result<Vec<c64>, VisError> {
        let out = match self.amps.mem_type() {
            MemType::Complex64 => self.amps.as_complex64()?.to_vec(),
            MemType::Complex32 => self
                .amps
                .as_complex32()?
                .iter()
                .map(|v| c64::new(v.re as f64, v.im as f64))
                .collect(),
            MemType::Matrix64 => self
                .amps
                .as_matrix64()?
                .iter()
                .map(|j| (j[0] + j[3]) * 0.5)
                .collect(),
            MemType::Matrix32 => self
                .amps
                .as_matrix32()?
                .iter()
                .map(|j| {
                    let xx = j[0];
                    let yy = j[3];
                    c64::new(
                        0.5 * (xx.re as f64 + yy.re as f64),
                        0.5 * (xx.im as f64 + yy.im as f64),
                    )
                })
                .collect(),
            _ => unreachable!("amplitude buffers are always complex"),
        };
        Ok(out)
    }

    /// Write the whole set into a record sink.
    pub fn write(&self, sink: &mut dyn MetaSink) -> Result<(), VisError> {
        sink.write_meta("vis/num_times", MetaValue::U64(self.num_times as u64))?;
        sink.write_meta("vis/num_channels", MetaValue::U64(self.num_channels as u64))?;
        sink.write_meta("vis/num_stations", MetaValue::U64(self.num_stations as u64))?;
        sink.write_meta("vis/num_pols", MetaValue::U64(self.num_pols as u64))?;
        sink.write_meta("vis/freq_start_hz", MetaValue::F64(self.freq_start_hz))?;
        sink.write_meta("vis/freq_inc_hz", MetaValue::F64(self.freq_inc_hz))?;
        sink.write_meta(
            "vis/time_start_mjd_utc",
            MetaValue::F64(self.time_start_mjd_utc),
        )?;
        sink.write_meta("vis/time_inc_sec", MetaValue::F64(self.time_inc_sec))?;
        sink.write_meta("vis/phase_centre_ra_rad", MetaValue::F64(self.phase_centre.ra))?;
        sink.write_meta("vis/phase_centre_dec_rad", MetaValue::F64(self.phase_centre.dec))?;
        sink.write_payload("vis/uu_metres", &self.uu)?;
        sink.write_payload("vis/vv_metres", &self.vv)?;
        sink.write_payload("vis/ww_metres", &self.ww)?;
        sink.write_payload("vis/amps", &self.amps)?;
        sink.flush()?;
        Ok(())
    }

    /// Read a set back from a record source.
    pub fn read(source: &mut dyn MetaSource) -> Result<VisSet, VisError> {
        let num_times = meta_u64(source, "vis/num_times")? as usize;
        let num_channels = meta_u64(source, "vis/num_channels")? as usize;
        let num_stations = meta_u64(source, "vis/num_stations")? as usize;
        let num_pols = meta_u64(source, "vis/num_pols")? as usize;
        let freq_start_hz = meta_f64(source, "vis/freq_start_hz")?;
        let freq_inc_hz = meta_f64(source, "vis/freq_inc_hz")?;
        let time_start_mjd_utc = meta_f64(source, "vis/time_start_mjd_utc")?;
        let time_inc_sec = meta_f64(source, "vis/time_inc_sec")?;
        let ra = meta_f64(source, "vis/phase_centre_ra_rad")?;
        let dec = meta_f64(source, "vis/phase_centre_dec_rad")?;

        let amps = source.read_payload("vis/amps")?;
        let uu = source.read_payload("vis/uu_metres")?;
        let vv = source.read_payload("vis/vv_metres")?;
        let ww = source.read_payload("vis/ww_metres")?;

        let expected_amp_type = match (num_pols, amps.mem_type().precision()) {
            (1, Precision::Single) => MemType::Complex32,
            (1, Precision::Double) => MemType::Complex64,
            (4, Precision::Single) => MemType::Matrix32,
            (4, Precision::Double) => MemType::Matrix64,
            (n, _) => return Err(VisError::BadPolCount(n)),
        };
        if amps.mem_type() != expected_amp_type {
            return Err(VisError::InconsistentRecords(
                "the amplitude payload type does not match the polarisation count",
            ));
        }
        let num_baselines = num_cross_baselines(num_stations);
        if amps.len() != num_times * num_channels * num_baselines {
            return Err(VisError::InconsistentRecords(
                "the amplitude payload length does not match the axis dimensions",
            ));
        }
        for coord in [&uu, &vv, &ww] {
            if coord.mem_type() != MemType::Real64 || coord.len() != num_times * num_baselines {
                return Err(VisError::InconsistentRecords(
                    "a baseline coordinate payload has the wrong type or length",
                ));
            }
        }

        Ok(VisSet {
            num_times,
            num_channels,
            num_stations,
            num_pols,
            freq_start_hz,
            freq_inc_hz,
            time_start_mjd_utc,
            time_inc_sec,
            phase_centre: RADec::from_radians(ra, dec),
            amps,
            uu,
            vv,
            ww,
        })
    }
}
