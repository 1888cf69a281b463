// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The visibility correlator.

Given one joined Jones term per (station, source), per-source Stokes-I flux
densities and direction cosines, and station (u, v) coordinates, form one
complex visibility (or 2x2 visibility matrix) per cross-correlation baseline:
the per-source products `J_i B J_j^H`, attenuated by bandwidth smearing,
summed over sources and accumulated in place. Baselines whose UV length falls
outside the acceptance window contribute nothing; that is a counted filter,
not an error.
 */

mod cpu;

use thiserror::Error;

use crate::{
    jones::JonesSet,
    math::{baseline_pairs, num_cross_baselines},
    mem::{Mem, MemError, MemType},
};

#[derive(Error, Debug)]
pub enum CorrelateError {
    #[error("A Jones set of type {jones} cannot accumulate into a visibility buffer of type {vis}")]
    InconsistentTypes { jones: MemType, vis: MemType },

    #[error("{what} must have type {expected}, but has {got}")]
    BadArrayType {
        what: &'static str,
        expected: MemType,
        got: MemType,
    },

    #[error("Expected {expected} {what}, but {got} were supplied")]
    ArrayLength {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error(transparent)]
    Mem(#[from] MemError),
}

/// Scalar configuration for a correlator call.
#[derive(Debug, Clone, Copy)]
pub struct CorrelatorOptions {
    /// Minimum accepted baseline UV length, in wavelengths.
    pub uv_min_lambda: f64,
    /// Maximum accepted baseline UV length, in wavelengths.
    pub uv_max_lambda: f64,
    /// One over the observing wavelength, in inverse metres.
    pub inv_wavelength: f64,
    /// Channel bandwidth divided by the observing frequency.
    pub frac_bandwidth: f64,
}

impl CorrelatorOptions {
    /// Options with the UV filter wide open and no bandwidth smearing, for a
    /// given wavelength in metres.
    pub fn for_wavelength(wavelength_m: f64) -> CorrelatorOptions {
        CorrelatorOptions {
            uv_min_lambda: 0.0,
            uv_max_lambda: f64::MAX,
            inv_wavelength: 1.0 / wavelength_m,
            frac_bandwidth: 0.0,
        }
    }
}

/// Accumulate visibilities for every cross-correlation baseline.
///
/// `jones` holds the joined station-source terms. `source_i` is the per-source
/// Stokes-I flux density in Jy; `source_l` and `source_m` are the per-source
/// direction cosines from the phase centre. `station_u` and `station_v` are
/// per-station coordinates in metres. All real arrays must match the Jones
/// set's precision, and every buffer must be co-located with it. `vis` must
/// hold one element per baseline: complex scalars for a scalar Jones set,
/// matrices for a matrix set. Visibilities are read-modify-write so that
/// repeated calls accumulate.
///
/// Mismatched dimensions or types are rejected before anything is written.
#[allow(clippy::too_many_arguments)]
pub fn correlate(
    jones: &JonesSet,
    source_i: &Mem,
    source_l: &Mem,
    source_m: &Mem,
    station_u: &Mem,
    station_v: &Mem,
    options: &CorrelatorOptions,
    vis: &mut Mem,
) -> Result<(), CorrelateError> {
    let num_stations = jones.num_stations();
    let num_sources = jones.num_sources();
    let num_baselines = num_cross_baselines(num_stations);
    let jones_type = jones.mem().mem_type();
    let real_type = jones_type.real_type();

    for (what, mem, expected_len) in [
        ("source flux densities", source_i, num_sources),
        ("source l coordinates", source_l, num_sources),
        ("source m coordinates", source_m, num_sources),
        ("station u coordinates", station_u, num_stations),
        ("station v coordinates", station_v, num_stations),
    ] {
        if mem.mem_type() != real_type {
            return Err(CorrelateError::BadArrayType {
                what,
                expected: real_type,
                got: mem.mem_type(),
            });
        }
        if mem.len() != expected_len {
            return Err(CorrelateError::ArrayLength {
                what,
                expected: expected_len,
                got: mem.len(),
            });
        }
        if mem.location() != jones.mem().location() {
            return Err(CorrelateError::Mem(MemError::LocationMismatch));
        }
    }

    let expected_vis_type = match jones_type {
        MemType::Complex32 | MemType::Complex64 => jones_type,
        MemType::Matrix32 | MemType::Matrix64 => jones_type,
        // A JonesSet can't be constructed with a real type.
        t => return Err(CorrelateError::InconsistentTypes { jones: t, vis: vis.mem_type() }),
    };
    if vis.mem_type() != expected_vis_type {
        return Err(CorrelateError::InconsistentTypes {
            jones: jones_type,
            vis: vis.mem_type(),
        });
    }
    if vis.len() != num_baselines {
        return Err(CorrelateError::ArrayLength {
            what: "baseline visibilities",
            expected: num_baselines,
            got: vis.len(),
        });
    }
    if vis.location() != jones.mem().location() {
        return Err(CorrelateError::Mem(MemError::LocationMismatch));
    }

    let baselines = baseline_pairs(num_stations);
    match jones_type {
        MemType::Complex64 => cpu::correlate_scalar(
            num_sources,
            &baselines,
            jones.mem().as_complex64()?,
            source_i.as_real64()?,
            source_l.as_real64()?,
            source_m.as_real64()?,
            station_u.as_real64()?,
            station_v.as_real64()?,
            options,
            vis.as_complex64_mut()?,
        ),
        MemType::Complex32 => cpu::correlate_scalar(
            num_sources,
            &baselines,
            jones.mem().as_complex32()?,
            source_i.as_real32()?,
            source_l.as_real32()?,
            source_m.as_real32()?,
            station_u.as_real32()?,
            station_v.as_real32()?,
            options,
            vis.as_complex32_mut()?,
        ),
        MemType::Matrix64 => cpu::correlate_matrix(
            num_sources,
            &baselines,
            jones.mem().as_matrix64()?,
            source_i.as_real64()?,
            source_l.as_real64()?,
            source_m.as_real64()?,
            station_u.as_real64()?,
            station_v.as_real64()?,
            options,
            vis.as_matrix64_mut()?,
        ),
        MemType::Matrix32 => cpu::correlate_matrix(
            num_sources,
            &baselines,
            jones.mem().as_matrix32()?,
            source_i.as_real32()?,
            source_l.as_real32()?,
            source_m.as_real32()?,
            station_u.as_real32()?,
            station_v.as_real32()?,
            options,
            vis.as_matrix32_mut()?,
        ),
        _ => unreachable!("JonesSet types are always complex"),
    }
    Ok(())
}
