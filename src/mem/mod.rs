// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Typed, location-tagged numeric buffers.

A [`Mem`] owns a flat array of one of six element types (real or complex
scalars, or complex 2x2 Jones matrices, in single or double precision) and
carries a memory-location tag. The element type and location are fixed when
the buffer is created; only the length may change afterwards. Borrowed slices
take the place of aliased sub-buffers; the borrow checker guarantees an alias
cannot outlive its owner.
 */


use marlu::{c32, c64, Jones};
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;

// The binary IO code assumes these layouts when flattening buffers to floats.
static_assertions::assert_eq_size!(c32, [f32; 2]);
static_assertions::assert_eq_size!(c64, [f64; 2]);
static_assertions::assert_eq_size!(Jones<f32>, [f32; 8]);
static_assertions::assert_eq_size!(Jones<f64>, [f64; 8]);

/// Floating-point precision of a buffer's elements.
#[derive(Debug, Display, EnumString, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    #[strum(serialize = "single")]
    Single,

    #[strum(serialize = "double")]
    Double,
}

/// The element type of a [`Mem`] buffer.
#[derive(Debug, Display, EnumIter, EnumString, Clone, Copy, PartialEq, Eq)]
pub enum MemType {
    #[strum(serialize = "real32")]
    Real32,
    #[strum(serialize = "real64")]
    Real64,
    #[strum(serialize = "complex32")]
    Complex32,
    #[strum(serialize = "complex64")]
    Complex64,
    #[strum(serialize = "matrix32")]
    Matrix32,
    #[strum(serialize = "matrix64")]
    Matrix64,
}

impl MemType {
    pub fn precision(self) -> Precision {
        match self {
            MemType::Real32 | MemType::Complex32 | MemType::Matrix32 => Precision::Single,
            MemType::Real64 | MemType::Complex64 | MemType::Matrix64 => Precision::Double,
        }
    }

    pub fn is_complex(self) -> bool {
        !matches!(self, MemType::Real32 | MemType::Real64)
    }

    pub fn is_matrix(self) -> bool {
        matches!(self, MemType::Matrix32 | MemType::Matrix64)
    }

    /// How many float values (of this type's precision) one element holds.
    pub fn floats_per_element(self) -> usize {
        match self {
            MemType::Real32 | MemType::Real64 => 1,
            MemType::Complex32 | MemType::Complex64 => 2,
            MemType::Matrix32 | MemType::Matrix64 => 8,
        }
    }

    /// The real scalar type of the same precision.
    pub fn real_type(self) -> MemType {
        match self.precision() {
            Precision::Single => MemType::Real32,
            Precision::Double => MemType::Real64,
        }
    }

    /// The complex scalar type of the same precision.
    pub fn complex_type(self) -> MemType {
        match self.precision() {
            Precision::Single => MemType::Complex32,
            Precision::Double => MemType::Complex64,
        }
    }
}

/// Where a buffer's storage lives.
///
/// This build of `skysim` has no device backend compiled in; asking for a
/// [`MemLocation::Device`] allocation yields [`MemError::NoDeviceCompiled`].
/// The tag still participates in every co-location check so that operations
/// keep the same contract when a device backend is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemLocation {
    Host,
    Device,
}

#[derive(Error, Debug)]
pub enum MemError {
    #[error("Requested a device buffer, but no device support was compiled into this build")]
    NoDeviceCompiled,

    #[error("Buffer has data type {got}, but {expected} was required")]
    BadDataType { expected: &'static str, got: MemType },

    #[error("Buffers are in different memory locations but must be co-located for this operation")]
    LocationMismatch,

    #[error("Buffer length {got} does not match the required length {expected}")]
    LengthMismatch { expected: usize, got: usize },
}

#[derive(Debug, Clone)]
enum MemData {
    Real32(Vec<f32>),
    Real64(Vec<f64>),
    Complex32(Vec<c32>),
    Complex64(Vec<c64>),
    Matrix32(Vec<Jones<f32>>),
    Matrix64(Vec<Jones<f64>>),
}

/// A typed, location-tagged numeric buffer.
#[derive(Debug, Clone)]
pub struct Mem {
    data: MemData,
    location: MemLocation,
}

macro_rules! mem_accessors {
    ($imm:ident, $mutable:ident, $variant:ident, $t:ty, $expected:literal) => {
        pub fn $imm(&self) -> Result<&[$t], MemError> {
            match &self.data {
                MemData::$variant(v) => Ok(v),
                _ => Err(MemError::BadDataType {
                    expected: $expected,
                    got: self.mem_type(),
                }),
            }
        }

        pub fn $mutable(&mut self) -> Result<&mut [$t], MemError> {
            match &mut self.data {
                MemData::$variant(v) => Ok(v),
                got => Err(MemError::BadDataType {
                    expected: $expected,
                    got: match got {
                        MemData::Real32(_) => MemType::Real32,
                        MemData::Real64(_) => MemType::Real64,
                        MemData::Complex32(_) => MemType::Complex32,
                        MemData::Complex64(_) => MemType::Complex64,
                        MemData::Matrix32(_) => MemType::Matrix32,
                        MemData::Matrix64(_) => MemType::Matrix64,
                    },
                }),
            }
        }
    };
}

impl Mem {
    /// Create a zero-initialised buffer of `len` elements.
    pub fn new(mem_type: MemType, location: MemLocation, len: usize) -> Result<Mem, MemError> {
        if location == MemLocation::Device {
            return Err(MemError::NoDeviceCompiled);
        }
        let data = match mem_type {
            MemType::Real32 => MemData::Real32(vec![0.0; len]),
            MemType::Real64 => MemData::Real64(vec![0.0; len]),
            MemType::Complex32 => MemData::Complex32(vec![c32::default(); len]),
            MemType::Complex64 => MemData::Complex64(vec![c64::default(); len]),
            MemType::Matrix32 => MemData::Matrix32(vec![Jones::default(); len]),
            MemType::Matrix64 => MemData::Matrix64(vec![Jones::default(); len]),
        };
        Ok(Mem { data, location })
    }

    pub fn mem_type(&self) -> MemType {
        match &self.data {
            MemData::Real32(_) => MemType::Real32,
            MemData::Real64(_) => MemType::Real64,
            MemData::Complex32(_) => MemType::Complex32,
            MemData::Complex64(_) => MemType::Complex64,
            MemData::Matrix32(_) => MemType::Matrix32,
            MemData::Matrix64(_) => MemType::Matrix64,
        }
    }

    pub fn location(&self) -> MemLocation {
        self.location
    }

    pub fn len(&self) -> usize {
        match &self.data {
            MemData::Real32(v) => v.len(),
            MemData::Real64(v) => v.len(),
            MemData::Complex32(v) => v.len(),
            MemData::Complex64(v) => v.len(),
            MemData::Matrix32(v) => v.len(),
            MemData::Matrix64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grow or shrink the buffer to `len` elements. New elements are zero.
    pub fn resize(&mut self, len: usize) {
        match &mut self.data {
            MemData::Real32(v) => v.resize(len, 0.0),
            MemData::Real64(v) => v.resize(len, 0.0),
            MemData::Complex32(v) => v.resize(len, c32::default()),
            MemData::Complex64(v) => v.resize(len, c64::default()),
            MemData::Matrix32(v) => v.resize(len, Jones::default()),
            MemData::Matrix64(v) => v.resize(len, Jones::default()),
        }
    }

    /// Set the length to zero while keeping the allocation. This is the
    /// "collapse" used by the imager's cache reset to avoid allocation churn
    /// on the next run.
    pub fn clear(&mut self) {
        match &mut self.data {
            MemData::Real32(v) => v.clear(),
            MemData::Real64(v) => v.clear(),
            MemData::Complex32(v) => v.clear(),
            MemData::Complex64(v) => v.clear(),
            MemData::Matrix32(v) => v.clear(),
            MemData::Matrix64(v) => v.clear(),
        }
    }

    /// Set every element to zero, keeping the length.
    pub fn fill_zero(&mut self) {
        match &mut self.data {
            MemData::Real32(v) => v.fill(0.0),
            MemData::Real64(v) => v.fill(0.0),
            MemData::Complex32(v) => v.fill(c32::default()),
            MemData::Complex64(v) => v.fill(c64::default()),
            MemData::Matrix32(v) => v.fill(Jones::default()),
            MemData::Matrix64(v) => v.fill(Jones::default()),
        }
    }

    /// Copy the contents of `src` into this buffer. The types and lengths
    /// must match exactly; this is also the bridge between memory locations.
    pub fn copy_from(&mut self, src: &Mem) -> Result<(), MemError> {
        if self.mem_type() != src.mem_type() {
            return Err(MemError::BadDataType {
                expected: "an identical data type",
                got: src.mem_type(),
            });
        }
        if self.len() != src.len() {
            return Err(MemError::LengthMismatch {
                expected: self.len(),
                got: src.len(),
            });
        }
        match (&mut self.data, &src.data) {
            (MemData::Real32(d), MemData::Real32(s)) => d.copy_from_slice(s),
            (MemData::Real64(d), MemData::Real64(s)) => d.copy_from_slice(s),
            (MemData::Complex32(d), MemData::Complex32(s)) => d.copy_from_slice(s),
            (MemData::Complex64(d), MemData::Complex64(s)) => d.copy_from_slice(s),
            (MemData::Matrix32(d), MemData::Matrix32(s)) => d.copy_from_slice(s),
            (MemData::Matrix64(d), MemData::Matrix64(s)) => d.copy_from_slice(s),
            _ => unreachable!("types were checked above"),
        }
        Ok(())
    }

    mem_accessors!(as_real32, as_real32_mut, Real32, f32, "real32");
    mem_accessors!(as_real64, as_real64_mut, Real64, f64, "real64");
    mem_accessors!(as_complex32, as_complex32_mut, Complex32, c32, "complex32");
    mem_accessors!(as_complex64, as_complex64_mut, Complex64, c64, "complex64");
    mem_accessors!(as_matrix32, as_matrix32_mut, Matrix32, Jones<f32>, "matrix32");
    mem_accessors!(as_matrix64, as_matrix64_mut, Matrix64, Jones<f64>, "matrix64");
}
