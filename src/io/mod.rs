// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Abstract record IO.

The numeric core never sees a file format; it writes named metadata values
and numeric payloads into a [`MetaSink`] and reads them back from a
[`MetaSource`]. [`binary`] provides the on-disk implementation,
[`MemorySink`] an in-memory one.
 */

pub mod binary;
#[cfg(test)]
mod tests;

use indexmap::IndexMap;
use thiserror::Error;

use crate::mem::{Mem, MemError};

#[derive(Error, Debug)]
pub enum IoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Not a skysim binary file (bad magic bytes)")]
    BadMagic,

    #[error("Unsupported binary file version {0}")]
    BadVersion(u16),

    #[error("Record '{0}' was not found")]
    MissingKey(String),

    #[error("Record '{key}' holds a different kind of value than requested")]
    WrongValueKind { key: String },

    #[error("Unknown record tag {0}")]
    BadTag(u8),

    #[error("Unknown buffer type code {0}")]
    BadTypeCode(u8),

    #[error(transparent)]
    Mem(#[from] MemError),
}

/// A metadata value attached to a named record.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    U64(u64),
    F64(f64),
    Str(String),
}

/// Something that accepts named metadata and numeric payloads.
pub trait MetaSink {
    fn write_meta(&mut self, key: &str, value: MetaValue) -> Result<(), IoError>;
    fn write_payload(&mut self, key: &str, mem: &Mem) -> Result<(), IoError>;
    fn flush(&mut self) -> Result<(), IoError> {
        Ok(())
    }
}

/// Something that serves named metadata and numeric payloads.
pub trait MetaSource {
    fn read_meta(&mut self, key: &str) -> Result<MetaValue, IoError>;
    fn read_payload(&mut self, key: &str) -> Result<Mem, IoError>;
}

pub(crate) fn meta_u64(source: &mut dyn MetaSource, key: &str) -> Result<u64, IoError> {
    match source.read_meta(key)? {
        MetaValue::U64(v) => Ok(v),
        _ => Err(IoError::WrongValueKind { key: key.to_string() }),
    }
}

pub(crate) fn meta_f64(source: &mut dyn MetaSource, key: &str) -> Result<f64, IoError> {
    match source.read_meta(key)? {
        MetaValue::F64(v) => Ok(v),
        _ => Err(IoError::WrongValueKind { key: key.to_string() }),
    }
}

/// An in-memory sink/source pair, mostly for tests and staging.
#[derive(Debug, Default)]
pub struct MemorySink {
    metas: IndexMap<String, MetaValue>,
    payloads: IndexMap<String, Mem>,
}

impl MemorySink {
    pub fn new() -> MemorySink {
        MemorySink::default()
    }

    pub fn meta_keys(&self) -> impl Iterator<Item = &str> {
        self.metas.keys().map(|k| k.as_str())
    }
}

impl MetaSink for MemorySink {
    fn write_meta(&mut self, key: &str, value: MetaValue) -> Result<(), IoError> {
        self.metas.insert(key.to_string(), value);
        Ok(())
    }

    fn write_payload(&mut self, key: &str, mem: &Mem) -> Result<(), IoError> {
        self.payloads.insert(key.to_string(), mem.clone());
        Ok(())
    }
}

impl MetaSource for MemorySink {
    fn read_meta(&mut self, key: &str) -> Result<MetaValue, IoError> {
        self.metas
            .get(key)
            .cloned()
            .ok_or_else(|| IoError::MissingKey(key.to_string()))
    }

    fn read_payload(&mut self, key: &str) -> Result<Mem, IoError> {
        self.payloads
            .get(key)
            .cloned()
            .ok_or_else(|| IoError::MissingKey(key.to_string()))
    }
}
