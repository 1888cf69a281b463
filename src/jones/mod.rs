// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Jones-set algebra.

A [`JonesSet`] is a buffer of per-(station, source) complex scalars or 2x2
Jones matrices, stored station-major. Sets are combined with multiply-joins;
a station's full response is the join of its individual terms (beam, element,
interferometric phase, ...), and the correlator then only ever sees one set.
 */

#[cfg(test)]
mod tests;

use marlu::{c32, c64, Jones, LmnRime, UVW};
use thiserror::Error;

use crate::{
    math::cexp,
    mem::{Mem, MemError, MemLocation, MemType},
};

#[derive(Error, Debug)]
pub enum JonesError {
    #[error("A Jones set must hold complex scalars or matrices, not {0}")]
    NotComplex(MemType),

    #[error("Jones sets of types {a} and {b} cannot be joined")]
    IncompatibleTypes { a: MemType, b: MemType },

    #[error("Jones sets have mismatched extents: {a_stations}x{a_sources} vs {b_stations}x{b_sources}")]
    DimensionMismatch {
        a_stations: usize,
        a_sources: usize,
        b_stations: usize,
        b_sources: usize,
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

/// A set of per-(station, source) Jones terms.
#[derive(Debug, Clone)]
pub struct JonesSet {
    mem: Mem,
    num_stations: usize,
    num_sources: usize,
}

impl JonesSet {
    /// Create a zeroed set. The type must be complex (scalar or matrix).
    pub fn new(
        mem_type: MemType,
        location: MemLocation,
        num_stations: usize,
        num_sources: usize,
    ) -> Result<JonesSet, JonesError> {
        if !mem_type.is_complex() {
            return Err(JonesError::NotComplex(mem_type));
        }
        let mem = Mem::new(mem_type, location, num_stations * num_sources)?;
        Ok(JonesSet {
            mem,
            num_stations,
            num_sources,
        })
    }

    /// Create a set where every term is the multiplicative identity.
    pub fn identity(
        mem_type: MemType,
        location: MemLocation,
        num_stations: usize,
        num_sources: usize,
    ) -> Result<JonesSet, JonesError> {
        let mut set = JonesSet::new(mem_type, location, num_stations, num_sources)?;
        match set.mem.mem_type() {
            MemType::Complex32 => set.mem.as_complex32_mut()?.fill(c32::new(1.0, 0.0)),
            MemType::Complex64 => set.mem.as_complex64_mut()?.fill(c64::new(1.0, 0.0)),
            MemType::Matrix32 => set.mem.as_matrix32_mut()?.fill(Jones::identity()),
            MemType::Matrix64 => set.mem.as_matrix64_mut()?.fill(Jones::identity()),
            _ => unreachable!("constructor rejects real types"),
        }
        Ok(set)
    }

    pub fn mem(&self) -> &Mem {
        &self.mem
    }

    pub fn mem_mut(&mut self) -> &mut Mem {
        &mut self.mem
    }

    pub fn num_stations(&self) -> usize {
        self.num_stations
    }

    pub fn num_sources(&self) -> usize {
        self.num_sources
    }

    fn check_extents(&self, other: &JonesSet) -> Result<(), JonesError> {
        if self.num_stations != other.num_stations || self.num_sources != other.num_sources {
            return Err(JonesError::DimensionMismatch {
                a_stations: self.num_stations,
                a_sources: self.num_sources,
                b_stations: other.num_stations,
                b_sources: other.num_sources,
            });
        }
        if self.mem.location() != other.mem.location() {
            return Err(JonesError::Mem(MemError::LocationMismatch));
        }
        Ok(())
    }

    /// In-place multiply-join: every term becomes `self * other`. Matrix sets
    /// may be joined with matrix or scalar sets of the same precision; scalar
    /// sets only with scalar sets.
    pub fn join_from_right(&mut self, other: &JonesSet) -> Result<(), JonesError> {
        self.check_extents(other)?;
        match (self.mem.mem_type(), other.mem.mem_type()) {
            (MemType::Matrix64, MemType::Matrix64) => {
                for (a, b) in self.mem.as_matrix64_mut()?.iter_mut().zip(other.mem.as_matrix64()?) {
                    *a = *a * *b;
                }
            }
            (MemType::Matrix32, MemType::Matrix32) => {
                for (a, b) in self.mem.as_matrix32_mut()?.iter_mut().zip(other.mem.as_matrix32()?) {
                    *a = *a * *b;
                }
            }
            (MemType::Matrix64, MemType::Complex64) => {
                for (a, b) in self.mem.as_matrix64_mut()?.iter_mut().zip(other.mem.as_complex64()?) {
                    *a = *a * *b;
                }
            }
            (MemType::Matrix32, MemType::Complex32) => {
                for (a, b) in self.mem.as_matrix32_mut()?.iter_mut().zip(other.mem.as_complex32()?) {
                    *a = *a * *b;
                }
            }
            (MemType::Complex64, MemType::Complex64) => {
                for (a, b) in self.mem.as_complex64_mut()?.iter_mut().zip(other.mem.as_complex64()?) {
                    *a *= *b;
                }
            }
            (MemType::Complex32, MemType::Complex32) => {
                for (a, b) in self.mem.as_complex32_mut()?.iter_mut().zip(other.mem.as_complex32()?) {
                    *a *= *b;
                }
            }
            (a, b) => return Err(JonesError::IncompatibleTypes { a, b }),
        }
        Ok(())
    }

    /// Out-of-place multiply-join: `out = a * b`, element by element. `out`
    /// must be a matrix set if either input is, and must match the inputs'
    /// precision and extents.
    pub fn join(out: &mut JonesSet, a: &JonesSet, b: &JonesSet) -> Result<(), JonesError> {
        a.check_extents(b)?;
        a.check_extents(out)?;
        match (out.mem.mem_type(), a.mem.mem_type(), b.mem.mem_type()) {
            (MemType::Matrix64, MemType::Matrix64, MemType::Matrix64) => {
                for ((o, x), y) in out
                    .mem
                    .as_matrix64_mut()?
                    .iter_mut()
                    .zip(a.mem.as_matrix64()?)
                    .zip(b.mem.as_matrix64()?)
                {
                    *o = *x * *y;
                }
            }
            (MemType::Matrix32, MemType::Matrix32, MemType::Matrix32) => {
                for ((o, x), y) in out
                    .mem
                    .as_matrix32_mut()?
                    .iter_mut()
                    .zip(a.mem.as_matrix32()?)
                    .zip(b.mem.as_matrix32()?)
                {
                    *o = *x * *y;
                }
            }
            (MemType::Matrix64, MemType::Matrix64, MemType::Complex64) => {
                for ((o, x), y) in out
                    .mem
                    .as_matrix64_mut()?
                    .iter_mut()
                    .zip(a.mem.as_matrix64()?)
                    .zip(b.mem.as_complex64()?)
                {
                    *o = *x * *y;
                }
            }
            (MemType::Matrix32, MemType::Matrix32, MemType::Complex32) => {
                for ((o, x), y) in out
                    .mem
                    .as_matrix32_mut()?
                    .iter_mut()
                    .zip(a.mem.as_matrix32()?)
                    .zip(b.mem.as_complex32()?)
                {
                    *o = *x * *y;
                }
            }
            (MemType::Matrix64, MemType::Complex64, MemType::Matrix64) => {
                for ((o, x), y) in out
                    .mem
                    .as_matrix64_mut()?
                    .iter_mut()
                    .zip(a.mem.as_complex64()?)
                    .zip(b.mem.as_matrix64()?)
                {
                    *o = *y * *x;
                }
            }
            (MemType::Matrix32, MemType::Complex32, MemType::Matrix32) => {
                for ((o, x), y) in out
                    .mem
                    .as_matrix32_mut()?
                    .iter_mut()
                    .zip(a.mem.as_complex32()?)
                    .zip(b.mem.as_matrix32()?)
                {
                    *o = *y * *x;
                }
            }
            (MemType::Complex64, MemType::Complex64, MemType::Complex64) => {
                for ((o, x), y) in out
                    .mem
                    .as_complex64_mut()?
                    .iter_mut()
                    .zip(a.mem.as_complex64()?)
                    .zip(b.mem.as_complex64()?)
                {
                    *o = *x * *y;
                }
            }
            (MemType::Complex32, MemType::Complex32, MemType::Complex32) => {
                for ((o, x), y) in out
                    .mem
                    .as_complex32_mut()?
                    .iter_mut()
                    .zip(a.mem.as_complex32()?)
                    .zip(b.mem.as_complex32()?)
                {
                    *o = *x * *y;
                }
            }
            (_, a_type, b_type) => {
                return Err(JonesError::IncompatibleTypes { a: a_type, b: b_type })
            }
        }
        Ok(())
    }

    /// Fill this set with interferometric phase terms (the K-Jones):
    /// `exp(i / lambda * (u*l + v*m + w*(n-1)))` per (station, source), with
    /// station UVWs in metres and [`LmnRime`] direction cosines (which carry
    /// the 2 pi factor). Scalar sets get the bare phasor; matrix sets get the
    /// phasor on the diagonal.
    pub fn set_phase_terms(
        &mut self,
        station_uvws: &[UVW],
        lmns: &[LmnRime],
        inv_wavelength: f64,
    ) -> Result<(), JonesError> {
        if station_uvws.len() != self.num_stations {
            return Err(JonesError::ArrayLength {
                what: "station UVWs",
                expected: self.num_stations,
                got: station_uvws.len(),
            });
        }
        if lmns.len() != self.num_sources {
            return Err(JonesError::ArrayLength {
                what: "source direction cosines",
                expected: self.num_sources,
                got: lmns.len(),
            });
        }

        let num_sources = self.num_sources;
        let mem_type = self.mem.mem_type();
        let phasor_for = |uvw: &UVW, lmn: &LmnRime| -> c64 {
            let UVW { u, v, w } = *uvw * inv_wavelength;
            cexp(u * lmn.l + v * lmn.m + w * lmn.n)
        };
        match mem_type {
            MemType::Complex64 => {
                let data = self.mem.as_complex64_mut()?;
                for (s, uvw) in station_uvws.iter().enumerate() {
                    for (k, lmn) in lmns.iter().enumerate() {
                        data[s * num_sources + k] = phasor_for(uvw, lmn);
                    }
                }
            }
            MemType::Complex32 => {
                let data = self.mem.as_complex32_mut()?;
                for (s, uvw) in station_uvws.iter().enumerate() {
                    for (k, lmn) in lmns.iter().enumerate() {
                        let p = phasor_for(uvw, lmn);
                        data[s * num_sources + k] = c32::new(p.re as f32, p.im as f32);
                    }
                }
            }
            MemType::Matrix64 => {
                let data = self.mem.as_matrix64_mut()?;
                for (s, uvw) in station_uvws.iter().enumerate() {
                    for (k, lmn) in lmns.iter().enumerate() {
                        data[s * num_sources + k] = Jones::identity() * phasor_for(uvw, lmn);
                    }
                }
            }
            MemType::Matrix32 => {
                let data = self.mem.as_matrix32_mut()?;
                for (s, uvw) in station_uvws.iter().enumerate() {
                    for (k, lmn) in lmns.iter().enumerate() {
                        let p = phasor_for(uvw, lmn);
                        data[s * num_sources + k] =
                            Jones::identity() * c32::new(p.re as f32, p.im as f32);
                    }
                }
            }
            t => return Err(JonesError::NotComplex(t)),
        }
        Ok(())
    }
}
