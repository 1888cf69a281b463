// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The skysim tagged binary format.
//!
//! A file is a magic header followed by a flat sequence of records, each a
//! length-prefixed key, a tag byte, and a little-endian payload. Readers load
//! the whole record index up front so lookups are by name, not position.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use indexmap::IndexMap;
use marlu::{c32, c64, Jones};

use super::{IoError, MetaSink, MetaSource, MetaValue};
use crate::mem::{Mem, MemLocation, MemType};

const MAGIC: &[u8; 8] = b"SKYSIMB\0";
const FORMAT_VERSION: u16 = 1;

const TAG_U64: u8 = 0;
const TAG_F64: u8 = 1;
const TAG_STR: u8 = 2;
const TAG_MEM: u8 = 3;

fn mem_type_code(t: MemType) -> u8 {
    match t {
        MemType::Real32 => 0,
        MemType::Real64 => 1,
        MemType::Complex32 => 2,
        MemType::Complex64 => 3,
        MemType::Matrix32 => 4,
        MemType::Matrix64 => 5,
    }
}

fn mem_type_from_code(code: u8) -> Result<MemType, IoError> {
    Ok(match code {
        0 => MemType::Real32,
        1 => MemType::Real64,
        2 => MemType::Complex32,
        3 => MemType::Complex64,
        4 => MemType::Matrix32,
        5 => MemType::Matrix64,
        other => return Err(IoError::BadTypeCode(other)),
    })
}

/// Streaming writer for the binary format.
#[derive(Debug)]
pub struct BinFileWriter {
    writer: BufWriter<File>,
}

impl BinFileWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<BinFileWriter, IoError> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(MAGIC)?;
        writer.write_u16::<LittleEndian>(FORMAT_VERSION)?;
        Ok(BinFileWriter { writer })
    }

    fn write_key(&mut self, key: &str) -> Result<(), IoError> {
        let bytes = key.as_bytes();
        self.writer.write_u16::<LittleEndian>(bytes.len() as u16)?;
        self.writer.write_all(bytes)?;
        Ok(())
    }
}

impl MetaSink for BinFileWriter {
    fn write_meta(&mut self, key: &str, value: MetaValue) -> Result<(), IoError> {
        self.write_key(key)?;
        match value {
            MetaValue::U64(v) => {
                self.writer.write_u8(TAG_U64)?;
                self.writer.write_u64::<LittleEndian>(v)?;
            }
            MetaValue::F64(v) => {
                self.writer.write_u8(TAG_F64)?;
                self.writer.write_f64::<LittleEndian>(v)?;
            }
            MetaValue::Str(s) => {
                self.writer.write_u8(TAG_STR)?;
                let bytes = s.as_bytes();
                self.writer.write_u32::<LittleEndian>(bytes.len() as u32)?;
                self.writer.write_all(bytes)?;
            }
        }
        Ok(())
    }

    fn write_payload(&mut self, key: &str, mem: &Mem) -> Result<(), IoError> {
        self.write_key(key)?;
        self.writer.write_u8(TAG_MEM)?;
        self.writer.write_u8(mem_type_code(mem.mem_type()))?;
        self.writer.write_u64::<LittleEndian>(mem.len() as u64)?;
        match mem.mem_type() {
            MemType::Real32 => {
                for v in mem.as_real32()? {
                    self.writer.write_f32::<LittleEndian>(*v)?;
                }
            }
            MemType::Real64 => {
                for v in mem.as_real64()? {
                    self.writer.write_f64::<LittleEndian>(*v)?;
                }
            }
            MemType::Complex32 => {
                for v in mem.as_complex32()? {
                    self.writer.write_f32::<LittleEndian>(v.re)?;
                    self.writer.write_f32::<LittleEndian>(v.im)?;
                }
            }
            MemType::Complex64 => {
                for v in mem.as_complex64()? {
                    self.writer.write_f64::<LittleEndian>(v.re)?;
                    self.writer.write_f64::<LittleEndian>(v.im)?;
                }
            }
            MemType::Matrix32 => {
                for j in mem.as_matrix32()? {
                    for pol in 0..4 {
                        self.writer.write_f32::<LittleEndian>(j[pol].re)?;
                        self.writer.write_f32::<LittleEndian>(j[pol].im)?;
                    }
                }
            }
            MemType::Matrix64 => {
                for j in mem.as_matrix64()? {
                    for pol in 0..4 {
                        self.writer.write_f64::<LittleEndian>(j[pol].re)?;
                        self.writer.write_f64::<LittleEndian>(j[pol].im)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), IoError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Reader for the binary format. The whole record index is loaded at open.
#[derive(Debug)]
pub struct BinFileReader {
    metas: IndexMap<String, MetaValue>,
    payloads: IndexMap<String, Mem>,
}

impl BinFileReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<BinFileReader, IoError> {
        let mut reader = BufReader::new(File::open(path)?);

        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(IoError::BadMagic);
        }
        let version = reader.read_u16::<LittleEndian>()?;
        if version != FORMAT_VERSION {
            return Err(IoError::BadVersion(version));
        }

        let mut metas = IndexMap::new();
        let mut payloads = IndexMap::new();
        loop {
            let mut len_buf = [0u8; 2];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => (),
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(IoError::Io(e)),
            }
            let key_len = u16::from_le_bytes(len_buf) as usize;
            let mut key_bytes = vec![0u8; key_len];
            reader.read_exact(&mut key_bytes)?;
            let key = String::from_utf8_lossy(&key_bytes).into_owned();

            match reader.read_u8()? {
                TAG_U64 => {
                    metas.insert(key, MetaValue::U64(reader.read_u64::<LittleEndian>()?));
                }
                TAG_F64 => {
                    metas.insert(key, MetaValue::F64(reader.read_f64::<LittleEndian>()?));
                }
                TAG_STR => {
                    let len = reader.read_u32::<LittleEndian>()? as usize;
                    let mut bytes = vec![0u8; len];
                    reader.read_exact(&mut bytes)?;
                    metas.insert(key, MetaValue::Str(String::from_utf8_lossy(&bytes).into_owned()));
                }
                TAG_MEM => {
                    let mem = read_mem(&mut reader)?;
                    payloads.insert(key, mem);
                }
                other => return Err(IoError::BadTag(other)),
            }
        }

        Ok(BinFileReader { metas, payloads })
    }
}

fn read_mem(reader: &mut impl Read) -> Result<Mem, IoError> {
    let mem_type = mem_type_from_code(reader.read_u8()?)?;
    let len = reader.read_u64::<LittleEndian>()? as usize;
    let mut mem = Mem::new(mem_type, MemLocation::Host, len)?;
    match mem_type {
        MemType::Real32 => {
            for v in mem.as_real32_mut()? {
                *v = reader.read_f32::<LittleEndian>()?;
            }
        }
        MemType::Real64 => {
            for v in mem.as_real64_mut()? {
                *v = reader.read_f64::<LittleEndian>()?;
            }
        }
        MemType::Complex32 => {
            for v in mem.as_complex32_mut()? {
                let re = reader.read_f32::<LittleEndian>()?;
                let im = reader.read_f32::<LittleEndian>()?;
                *v = c32::new(re, im);
            }
        }
        MemType::Complex64 => {
            for v in mem.as_complex64_mut()? {
                let re = reader.read_f64::<LittleEndian>()?;
                let im = reader.read_f64::<LittleEndian>()?;
                *v = c64::new(re, im);
            }
        }
        MemType::Matrix32 => {
            for j in mem.as_matrix32_mut()? {
                let mut pols = [c32::default(); 4];
                for pol in &mut pols {
                    let re = reader.read_f32::<LittleEndian>()?;
                    let im = reader.read_f32::<LittleEndian>()?;
                    *pol = c32::new(re, im);
                }
                *j = Jones::from(pols);
            }
        }
        MemType::Matrix64 => {
            for j in mem.as_matrix64_mut()? {
                let mut pols = [c64::default(); 4];
                for pol in &mut pols {
                    let re = reader.read_f64::<LittleEndian>()?;
                    let im = reader.read_f64::<LittleEndian>()?;
                    *pol = c64::new(re, im);
                }
                *j = Jones::from(pols);
            }
        }
    }
    Ok(mem)
}

impl MetaSource for BinFileReader {
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
