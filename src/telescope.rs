// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Station layouts. One `x y z` row per station in metres, geocentric axes
//! local to the array, `#` comments allowed.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use marlu::XyzGeodetic;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelescopeFileError {
    #[error("Couldn't read the station layout {}: {err}", .path.display())]
    Read {
        path: PathBuf,
        err: std::io::Error,
    },

    #[error("Station layout line {line}: expected 'x y z' in metres, got '{text}'")]
    Parse { line: usize, text: String },

    #[error("A station layout needs at least 2 stations, but {} has {got}", .path.display())]
    TooFewStations { path: PathBuf, got: usize },
}

/// Read station positions from a text file.
pub fn read_station_layout_file<P: AsRef<Path>>(
    path: P,
) -> Result<Vec<XyzGeodetic>, TelescopeFileError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| TelescopeFileError::Read {
        path: path.to_path_buf(),
        err,
    })?;

    let mut stations = vec![];
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line_num = i + 1;
        let line = line.map_err(|err| TelescopeFileError::Read {
            path: path.to_path_buf(),
            err,
        })?;
        let text = line.split('#').next().unwrap_or("").trim();
        if text.is_empty() {
            continue;
        }

        let parse_err = || TelescopeFileError::Parse {
            line: line_num,
            text: text.to_string(),
        };
        let fields: Vec<&str> = text.split_whitespace().collect();
        let [x, y, z] = fields.as_slice() else {
            return Err(parse_err());
        };
        stations.push(XyzGeodetic {
            x: x.parse().map_err(|_| parse_err())?,
            y: y.parse().map_err(|_| parse_err())?,
            z: z.parse().map_err(|_| parse_err())?,
        });
    }

    if stations.len() < 2 {
        return Err(TelescopeFileError::TooFewStations {
            path: path.to_path_buf(),
            got: stations.len(),
        });
    }
    Ok(stations)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use approx::assert_abs_diff_eq;
    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_read_layout() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "# station positions").unwrap();
        writeln!(f, "0.0 0.0 0.0").unwrap();
        writeln!(f, "120.5 -30.25 2.0 # east arm").unwrap();
        f.flush().unwrap();

        let stations = read_station_layout_file(f.path()).unwrap();
        assert_eq!(stations.len(), 2);
        assert_abs_diff_eq!(stations[1].x, 120.5);
        assert_abs_diff_eq!(stations[1].y, -30.25);
        assert_abs_diff_eq!(stations[1].z, 2.0);
    }

    #[test]
    fn test_single_station_is_rejected() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "0.0 0.0 0.0").unwrap();
        f.flush().unwrap();
        assert!(matches!(
            read_station_layout_file(f.path()),
            Err(TelescopeFileError::TooFewStations { got: 1, .. })
        ));
    }

    #[test]
    fn test_bad_row() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "0.0 0.0 0.0").unwrap();
        writeln!(f, "1.0 2.0").unwrap();
        f.flush().unwrap();
        assert!(matches!(
            read_station_layout_file(f.path()),
            Err(TelescopeFileError::Parse { line: 2, .. })
        ));
    }
}
