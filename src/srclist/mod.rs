// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Sky-model source lists.

The correlator itself only consumes flat arrays; this module supplies the
minimal point-source model the simulator feeds it with, read from a plain
text format: one `name ra_deg dec_deg flux_jy` row per source, `#` comments.
 */

use std::{
    fs::File,
    io::{BufRead, BufReader},
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use marlu::RADec;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SrclistError {
    #[error("Couldn't read the source list {}: {err}", .path.display())]
    Read {
        path: PathBuf,
        err: std::io::Error,
    },

    #[error("Source list line {line}: expected 'name ra_deg dec_deg flux_jy', got '{text}'")]
    Parse { line: usize, text: String },

    #[error("Source list line {line}: declination {dec} is outside [-90, 90] degrees")]
    BadDec { line: usize, dec: f64 },

    #[error("The source list contains no sources")]
    Empty,
}

/// An unpolarised point source.
#[derive(Debug, Clone)]
pub struct Source {
    pub radec: RADec,
    pub flux_i_jy: f64,
}

/// Sources keyed by name, in file order.
#[derive(Debug, Clone, Default)]
pub struct SourceList(IndexMap<String, Source>);

impl SourceList {
    pub fn new() -> SourceList {
        SourceList::default()
    }
}

impl Deref for SourceList {
    type Target = IndexMap<String, Source>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for SourceList {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl FromIterator<(String, Source)> for SourceList {
    fn from_iter<T: IntoIterator<Item = (String, Source)>>(iter: T) -> SourceList {
        SourceList(iter.into_iter().collect())
    }
}

/// Read a source list from a text file.
pub fn read_source_list_file<P: AsRef<Path>>(path: P) -> Result<SourceList, SrclistError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| SrclistError::Read {
        path: path.to_path_buf(),
        err,
    })?;

    let mut sources = SourceList::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line_num = i + 1;
        let line = line.map_err(|err| SrclistError::Read {
            path: path.to_path_buf(),
            err,
        })?;
        let text = line.split('#').next().unwrap_or("").trim();
        if text.is_empty() {
            continue;
        }

        let fields: Vec<&str> = text.split_whitespace().collect();
        let parse_err = || SrclistError::Parse {
            line: line_num,
            text: text.to_string(),
        };
        let [name, ra, dec, flux] = fields.as_slice() else {
            return Err(parse_err());
        };
        let ra_deg: f64 = ra.parse().map_err(|_| parse_err())?;
        let dec_deg: f64 = dec.parse().map_err(|_| parse_err())?;
        let flux_i_jy: f64 = flux.parse().map_err(|_| parse_err())?;
        if !(-90.0..=90.0).contains(&dec_deg) {
            return Err(SrclistError::BadDec {
                line: line_num,
                dec: dec_deg,
            });
        }

        sources.insert(
            name.to_string(),
            Source {
                radec: RADec::from_degrees(ra_deg, dec_deg),
                flux_i_jy,
            },
        );
    }

    if sources.is_empty() {
        return Err(SrclistError::Empty);
    }
    Ok(sources)
}
