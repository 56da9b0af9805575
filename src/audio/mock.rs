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
use std::fmt;
#[cfg(test)]
use std::{error::Error, sync::Arc};

use tracing::info;

use super::mixer::AudioMixer;

/// A mock device. Nothing drains the mixer unless `pump` is called.
#[derive(Clone)]
pub struct Device {
    name: String,
    mixer: AudioMixer,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str, num_channels: u16, sample_rate: u32) -> Device {
        info!(device = name, num_channels, sample_rate, "Using mock audio device.");
        Device {
            name: name.to_string(),
            mixer: AudioMixer::new(num_channels, sample_rate),
        }
    }

    /// Pulls frames through the mixer as an output callback would.
    #[cfg(test)]
    pub fn pump(&self, frames: usize) -> Vec<f32> {
        self.mixer.process_frames(frames)
    }

    /// Returns true if anything is playing.
    #[cfg(test)]
    pub fn is_playing(&self) -> bool {
        self.mixer.source_count() > 0
    }
}

impl super::Device for Device {
    fn mixer(&self) -> AudioMixer {
        self.mixer.clone()
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Device>, Box<dyn Error>> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
