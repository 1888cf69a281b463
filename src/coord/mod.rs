// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Coordinate and phase-rotation utilities.

Everything here is a pure function over buffers: visibility phase rotation
for shifting the effective phase centre (Cornwell & Perley 1992), evaluation
of image pixel grids in celestial coordinates, and UT1-to-Earth-rotation-angle
conversion (IAU 2000).
 */


use marlu::c32;
use num_traits::Float;
use thiserror::Error;

use crate::{
    constants::TAU,
    math::{cast, cexp},
    mem::{Mem, MemError, MemLocation, MemType},
};

#[derive(Error, Debug)]
pub enum CoordError {
    #[error("Phase rotation requires complex amplitudes, not {0}")]
    NotComplex(MemType),

    #[error("Coordinate array length {got} does not match the number of amplitudes {expected}")]
    ArrayLength { expected: usize, got: usize },

    #[error(transparent)]
    Mem(#[from] MemError),
}

/// Convert MJD(UT1) to the Earth Rotation Angle in radians (IAU 2000 model).
pub fn mjd_ut1_to_era(mjd_ut1: f64) -> f64 {
    let t = mjd_ut1 - 51544.5;
    // Fractional part of the UT1 Julian day (JD = MJD + 2400000.5).
    let f = mjd_ut1.fract() + 0.5;
    (TAU * (f + 0.779_057_273_264_0 + 0.002_737_811_911_354_48 * t)).rem_euclid(TAU)
}

/// Shift the effective phase centre of a set of visibilities by multiplying
/// each amplitude by `exp(-2 pi i (u dl + v dm + w dn))`, in place. The
/// coordinates are in wavelengths and must match the amplitudes' precision;
/// the phase itself is always evaluated in double precision. Works on scalar
/// and matrix amplitude layouts.
pub fn phase_rotate(
    uu: &Mem,
    vv: &Mem,
    ww: &Mem,
    amps: &mut Mem,
    delta_l: f64,
    delta_m: f64,
    delta_n: f64,
) -> Result<(), CoordError> {
    let num_vis = amps.len();
    for coord in [uu, vv, ww] {
        if coord.len() != num_vis {
            return Err(CoordError::ArrayLength {
                expected: num_vis,
                got: coord.len(),
            });
        }
    }

    let phase_of = |u: f64, v: f64, w: f64| -TAU * (u * delta_l + v * delta_m + w * delta_n);

    match amps.mem_type() {
        MemType::Complex64 => {
            let (uu, vv, ww) = (uu.as_real64()?, vv.as_real64()?, ww.as_real64()?);
            phase_rotate_c64(uu, vv, ww, amps.as_complex64_mut()?, delta_l, delta_m, delta_n);
        }
        MemType::Matrix64 => {
            let (uu, vv, ww) = (uu.as_real64()?, vv.as_real64()?, ww.as_real64()?);
            for (i, a) in amps.as_matrix64_mut()?.iter_mut().enumerate() {
                *a = *a * cexp(phase_of(uu[i], vv[i], ww[i]));
            }
        }
        MemType::Complex32 => {
            let (uu, vv, ww) = (uu.as_real32()?, vv.as_real32()?, ww.as_real32()?);
            for (i, a) in amps.as_complex32_mut()?.iter_mut().enumerate() {
                let p = cexp(phase_of(uu[i] as f64, vv[i] as f64, ww[i] as f64));
                *a *= c32::new(p.re as f32, p.im as f32);
            }
        }
        MemType::Matrix32 => {
            let (uu, vv, ww) = (uu.as_real32()?, vv.as_real32()?, ww.as_real32()?);
            for (i, a) in amps.as_matrix32_mut()?.iter_mut().enumerate() {
                let p = cexp(phase_of(uu[i] as f64, vv[i] as f64, ww[i] as f64));
                *a = *a * c32::new(p.re as f32, p.im as f32);
            }
        }
        t => return Err(CoordError::NotComplex(t)),
    }
    Ok(())
}

/// Slice-level double-precision phase rotation; the buffer-level
/// [`phase_rotate`] and the imager both funnel through this.
pub(crate) fn phase_rotate_c64(
    uu: &[f64],
    vv: &[f64],
    ww: &[f64],
    amps: &mut [marlu::c64],
    delta_l: f64,
    delta_m: f64,
    delta_n: f64,
) {
    for (i, a) in amps.iter_mut().enumerate() {
        let phase = -TAU * (uu[i] * delta_l + vv[i] * delta_m + ww[i] * delta_n);
        *a *= cexp(phase);
    }
}

/// Evaluate a regular image pixel grid in (longitude, latitude), row-major
/// with l increasing along a row and m increasing down the image, through the
/// inverse orthographic projection centred on (`lon0_rad`, `lat0_rad`). The
/// output buffers are grown to `size_l * size_m` elements if they are
/// shorter, and are staged through host memory when they live elsewhere.
#[allow(clippy::too_many_arguments)]
pub fn lon_lat_grid(
    lon: &mut Mem,
    lat: &mut Mem,
    size_l: usize,
    size_m: usize,
    fov_l_rad: f64,
    fov_m_rad: f64,
    lon0_rad: f64,
    lat0_rad: f64,
) -> Result<(), CoordError> {
    let num_pixels = size_l * size_m;
    let mem_type = lon.mem_type();

    if lon.location() != MemLocation::Host {
        // Stage through exactly-sized host buffers, then bridge across.
        let mut lon_cpu = Mem::new(mem_type, MemLocation::Host, num_pixels)?;
        let mut lat_cpu = Mem::new(mem_type, MemLocation::Host, num_pixels)?;
        eval_lon_lat(
            &mut lon_cpu, &mut lat_cpu, size_l, size_m, fov_l_rad, fov_m_rad, lon0_rad, lat0_rad,
        )?;
        lon.resize(num_pixels);
        lat.resize(num_pixels);
        lon.copy_from(&lon_cpu)?;
        lat.copy_from(&lat_cpu)?;
        return Ok(());
    }

    if lon.len() < num_pixels {
        lon.resize(num_pixels);
    }
    if lat.len() < num_pixels {
        lat.resize(num_pixels);
    }
    eval_lon_lat(lon, lat, size_l, size_m, fov_l_rad, fov_m_rad, lon0_rad, lat0_rad)
}

#[allow(clippy::too_many_arguments)]
fn eval_lon_lat(
    lon: &mut Mem,
    lat: &mut Mem,
    size_l: usize,
    size_m: usize,
    fov_l_rad: f64,
    fov_m_rad: f64,
    lon0_rad: f64,
    lat0_rad: f64,
) -> Result<(), CoordError> {
    match lon.mem_type() {
        MemType::Real64 => eval_lon_lat_inner(
            lon.as_real64_mut()?,
            lat.as_real64_mut()?,
            size_l,
            size_m,
            fov_l_rad,
            fov_m_rad,
            lon0_rad,
            lat0_rad,
        ),
        _ => eval_lon_lat_inner(
            lon.as_real32_mut()?,
            lat.as_real32_mut()?,
            size_l,
            size_m,
            fov_l_rad,
            fov_m_rad,
            lon0_rad,
            lat0_rad,
        ),
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn eval_lon_lat_inner<F: Float>(
    lon: &mut [F],
    lat: &mut [F],
    size_l: usize,
    size_m: usize,
    fov_l_rad: f64,
    fov_m_rad: f64,
    lon0_rad: f64,
    lat0_rad: f64,
) {
    let l_max = (0.5 * fov_l_rad).sin();
    let m_max = (0.5 * fov_m_rad).sin();
    let (sin_lat0, cos_lat0) = lat0_rad.sin_cos();

    let centred = |i: usize, size: usize, extent: f64| -> f64 {
        if size < 2 {
            0.0
        } else {
            extent * (2.0 * i as f64 / (size - 1) as f64 - 1.0)
        }
    };

    for j in 0..size_m {
        let m = centred(j, size_m, m_max);
        for i in 0..size_l {
            let l = centred(i, size_l, l_max);
            let n = (1.0 - l * l - m * m).max(0.0).sqrt();
            let lat_rad = (n * sin_lat0 + m * cos_lat0).asin();
            let lon_rad = lon0_rad + l.atan2(cos_lat0 * n - m * sin_lat0);
            let p = j * size_l + i;
            lon[p] = cast(lon_rad);
            lat[p] = cast(lat_rad);
        }
    }
}
