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

const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_CHANNELS: u16 = 2;

/// A YAML representation of the audio output configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Audio {
    /// The audio device. Names starting with "mock" select the mock device.
    device: String,

    /// Output sample rate in Hz (default: 44100). Samples are resampled to this rate on load.
    sample_rate: Option<u32>,

    /// Number of output channels (default: 2).
    channels: Option<u16>,
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: device.to_string(),
            sample_rate: None,
            channels: None,
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the output sample rate (default: 44100).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the number of output channels (default: 2).
    pub fn channels(&self) -> u16 {
        self.channels.unwrap_or(DEFAULT_CHANNELS).max(1)
    }
}
