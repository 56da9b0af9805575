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
use serde::Deserialize;

use crate::selector::{Instrument, NoteRange};

/// The instruments shipped with the default asset pack and their playable ranges.
const DEFAULT_INSTRUMENTS: [(&str, u8, u8); 10] = [
    ("Bassoon", 36, 79),
    ("Cellos", 36, 80),
    ("Clarinet", 50, 92),
    ("Flute", 60, 96),
    ("Harp", 36, 96),
    ("Horn", 36, 79),
    ("Oboe", 58, 93),
    ("Piano", 36, 96),
    ("Trumpet", 52, 91),
    ("Violins", 55, 96),
];

/// A YAML representation of an instrument.
#[derive(Deserialize, Clone, Debug)]
pub struct InstrumentConfig {
    name: String,
    min: u8,
    max: u8,
}

impl InstrumentConfig {
    pub fn new(name: &str, min: u8, max: u8) -> InstrumentConfig {
        InstrumentConfig {
            name: name.to_string(),
            min,
            max,
        }
    }

    pub fn to_instrument(&self) -> Instrument {
        Instrument::new(&self.name, NoteRange::new(self.min, self.max))
    }
}

/// Returns the configured instruments, or the default set when none are configured.
pub fn instruments(configured: Option<&Vec<InstrumentConfig>>) -> Vec<Instrument> {
    match configured {
        Some(configured) if !configured.is_empty() => configured
            .iter()
            .map(InstrumentConfig::to_instrument)
            .collect(),
        _ => DEFAULT_INSTRUMENTS
            .iter()
            .map(|(name, min, max)| Instrument::new(name, NoteRange::new(*min, *max)))
            .collect(),
    }
}
