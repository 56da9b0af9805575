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

/// A YAML representation of the MIDI input configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Midi {
    /// The MIDI device. Names starting with "mock" select the mock device.
    device: String,
}

impl Midi {
    /// New will create a new MIDI configuration.
    pub fn new(device: &str) -> Midi {
        Midi {
            device: device.to_string(),
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }
}
