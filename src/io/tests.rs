// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use marlu::{c64, Jones};
use tempfile::tempdir;

use super::{binary::BinFileReader, binary::BinFileWriter, *};
use crate::mem::{MemLocation, MemType};

#[test]
fn test_memory_sink_round_trip() {
    let mut sink = MemorySink::new();
    sink.write_meta("num_things", MetaValue::U64(42)).unwrap();
    sink.write_meta("scale", MetaValue::F64(1.5)).unwrap();
    let mut mem = Mem::new(MemType::Real64, MemLocation::Host, 3).unwrap();
    mem.as_real64_mut().unwrap().copy_from_slice(&[1.0, 2.0, 3.0]);
    sink.write_payload("data", &mem).unwrap();

    assert_eq!(meta_u64(&mut sink, "num_things").unwrap(), 42);
    assert_eq!(meta_f64(&mut sink, "scale").unwrap(), 1.5);
    let back = sink.read_payload("data").unwrap();
    assert_eq!(back.as_real64().unwrap(), &[1.0, 2.0, 3.0]);
}

#[test]
fn test_missing_and_mismatched_keys() {
    let mut sink = MemorySink::new();
    sink.write_meta("x", MetaValue::U64(1)).unwrap();
    assert!(matches!(sink.read_meta("y"), Err(IoError::MissingKey(_))));
    assert!(matches!(meta_f64(&mut sink, "x"), Err(IoError::WrongValueKind { .. })));
}

#[test]
fn test_binary_file_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.skb");

    {
        let mut writer = BinFileWriter::create(&path).unwrap();
        writer.write_meta("count", MetaValue::U64(7)).unwrap();
        writer.write_meta("freq_hz", MetaValue::F64(150e6)).unwrap();
        writer
            .write_meta("name", MetaValue::Str("point source".to_string()))
            .unwrap();

        let mut amps = Mem::new(MemType::Complex64, MemLocation::Host, 2).unwrap();
        amps.as_complex64_mut()
            .unwrap()
            .copy_from_slice(&[c64::new(1.0, -2.0), c64::new(0.25, 0.75)]);
        writer.write_payload("amps", &amps).unwrap();

        let mut jones = Mem::new(MemType::Matrix32, MemLocation::Host, 1).unwrap();
        jones.as_matrix32_mut().unwrap()[0] = Jones::identity();
        writer.write_payload("jones", &jones).unwrap();
        writer.flush().unwrap();
    }

    let mut reader = BinFileReader::open(&path).unwrap();
    assert_eq!(reader.read_meta("count").unwrap(), MetaValue::U64(7));
    assert_eq!(reader.read_meta("freq_hz").unwrap(), MetaValue::F64(150e6));
    assert_eq!(
        reader.read_meta("name").unwrap(),
        MetaValue::Str("point source".to_string())
    );

    let amps = reader.read_payload("amps").unwrap();
    assert_eq!(amps.mem_type(), MemType::Complex64);
    assert_eq!(
        amps.as_complex64().unwrap(),
        &[c64::new(1.0, -2.0), c64::new(0.25, 0.75)]
    );

    let jones = reader.read_payload("jones").unwrap();
    assert_eq!(jones.mem_type(), MemType::Matrix32);
    assert_eq!(jones.as_matrix32().unwrap()[0], Jones::identity());
}

#[test]
fn test_binary_file_bad_magic() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("not_skysim.bin");
    std::fs::write(&path, b"something else entirely").unwrap();
    assert!(matches!(BinFileReader::open(&path), Err(IoError::BadMagic)));
}

#[test]
fn test_binary_file_missing_key() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.skb");
    {
        let mut writer = BinFileWriter::create(&path).unwrap();
        writer.flush().unwrap();
    }
    let mut reader = BinFileReader::open(&path).unwrap();
    assert!(matches!(reader.read_meta("anything"), Err(IoError::MissingKey(_))));
}
