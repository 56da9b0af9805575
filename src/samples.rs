// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
//! Sample lookup: where samples live, whether they exist, and decoding them.

use std::{fmt, path::PathBuf};

mod availability;
mod loader;
mod store;

pub use availability::AvailabilityCache;
pub use loader::{decode_file, LoadedSample};
pub use store::{FileStore, MemoryStore, SampleStore};

/// Error types for sample lookup and decoding.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("IO error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Audio file error: {0}")]
    Audio(#[from] symphonia::core::errors::Error),

    #[error("No playable track found in {0}")]
    NoTrack(PathBuf),

    #[error("No audio decoded from {0}")]
    Empty(PathBuf),

    #[error("Sample unavailable: {0}")]
    Unavailable(String),
}

/// The memoization key for sample availability.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SampleKey {
    format: String,
    instrument: String,
    note: u8,
}

impl SampleKey {
    pub fn new(format: &str, instrument: &str, note: u8) -> SampleKey {
        SampleKey {
            format: format.to_string(),
            instrument: instrument.to_string(),
            note,
        }
    }
}

impl fmt::Display for SampleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}.{}", self.instrument, self.note, self.format)
    }
}
