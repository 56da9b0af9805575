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
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;

use crate::selector::{Instrument, NoteRange};

pub mod audio;
pub mod drones;
pub mod error;
pub mod exercise;
pub mod instrument;
pub mod midi;

pub use self::audio::Audio;
pub use self::drones::Drones;
pub use self::error::ConfigError;
pub use self::exercise::{CustomSet, Exercise};
pub use self::instrument::InstrumentConfig;
pub use self::midi::Midi;

const DEFAULT_ASSETS: &str = "assets";
const DEFAULT_FORMAT: &str = "wav";
const DEFAULT_STORAGE: &str = ".pitchtrainer";
const DEFAULT_NOTE_MIN: u8 = 36;
const DEFAULT_NOTE_MAX: u8 = 96;

/// The note range an instrument or exercise is bounded by.
#[derive(Deserialize, Clone, Copy, Debug)]
struct RangeConfig {
    min: u8,
    max: u8,
}

/// The top level trainer configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Trainer {
    /// The root directory of the sample assets.
    assets: Option<String>,

    /// The sample file format (extension). Not exposed to the user.
    format: Option<String>,

    /// The directory used for local storage of the trial log and selections.
    storage: Option<String>,

    /// The full note range. The reduced range is derived from it.
    note_range: Option<RangeConfig>,

    /// The audio output configuration.
    audio: Audio,

    /// The optional MIDI input configuration.
    midi: Option<Midi>,

    /// Exercise settings.
    #[serde(default)]
    exercise: Exercise,

    /// Drone layer settings.
    #[serde(default)]
    drones: Drones,

    /// Instruments and their ranges. Defaults to the standard asset pack.
    instruments: Option<Vec<InstrumentConfig>>,
}

impl Trainer {
    /// Creates a configuration with defaults for everything but the devices.
    pub fn new(audio: Audio, midi: Option<Midi>) -> Trainer {
        Trainer {
            assets: None,
            format: None,
            storage: None,
            note_range: None,
            audio,
            midi,
            exercise: Exercise::default(),
            drones: Drones::default(),
            instruments: None,
        }
    }

    /// Parse a trainer configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Trainer, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Trainer>()?)
    }

    pub fn assets(&self) -> PathBuf {
        PathBuf::from(self.assets.as_deref().unwrap_or(DEFAULT_ASSETS))
    }

    pub fn format(&self) -> &str {
        self.format.as_deref().unwrap_or(DEFAULT_FORMAT)
    }

    pub fn storage(&self) -> PathBuf {
        PathBuf::from(self.storage.as_deref().unwrap_or(DEFAULT_STORAGE))
    }

    /// The full note range (default: 36-96).
    pub fn note_range(&self) -> NoteRange {
        match self.note_range {
            Some(range) => NoteRange::new(range.min, range.max),
            None => NoteRange::new(DEFAULT_NOTE_MIN, DEFAULT_NOTE_MAX),
        }
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn midi(&self) -> Option<&Midi> {
        self.midi.as_ref()
    }

    pub fn exercise(&self) -> &Exercise {
        &self.exercise
    }

    pub fn drones(&self) -> &Drones {
        &self.drones
    }

    pub fn instruments(&self) -> Vec<Instrument> {
        instrument::instruments(self.instruments.as_ref())
    }

    #[cfg(test)]
    pub fn with_storage(mut self, storage: &Path) -> Trainer {
        self.storage = Some(storage.to_string_lossy().to_string());
        self
    }

    #[cfg(test)]
    pub fn with_exercise(mut self, exercise: Exercise) -> Trainer {
        self.exercise = exercise;
        self
    }
}

/// Parses an optional duration string, falling back to the default.
fn parse_duration(
    field: &'static str,
    value: &Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => Ok(DurationString::from_string(value.clone())
            .map_err(|e| ConfigError::Duration {
                field,
                message: e.to_string(),
            })?
            .into()),
        None => Ok(default),
    }
}
