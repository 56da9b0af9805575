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
use std::{error::Error, fmt, sync::Arc};

use thiserror::Error;

use crate::config;

pub mod cpal;
pub mod gain;
pub mod mixer;
pub mod mock;

pub use gain::{FadeCurve, Gain};
pub use mixer::{ActiveSource, AudioMixer};

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("sample is at {actual} Hz but the output runs at {expected} Hz")]
    SampleRate { expected: u32, actual: u32 },
}

/// An output device. Playback happens by adding sources to the device's mixer.
pub trait Device: fmt::Display + Send + Sync {
    /// The mixer feeding this device.
    fn mixer(&self) -> AudioMixer;

    fn sample_rate(&self) -> u32 {
        self.mixer().sample_rate()
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Device>, Box<dyn Error>>;
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets a device with the given name.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(
            device,
            config.channels(),
            config.sample_rate(),
        )));
    };

    Ok(Arc::new(cpal::Device::get(config)?))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::samples::LoadedSample;

    #[test]
    fn test_mock_device_from_config() -> Result<(), Box<dyn Error>> {
        let device = get_device(&config::Audio::new("mock-output"))?;
        assert_eq!(44100, device.sample_rate());
        assert_eq!("mock-output (Mock)", device.to_string());

        let mock = device.to_mock()?;
        assert_eq!(2, mock.mixer().num_channels());
        Ok(())
    }

    #[test]
    fn test_mock_device_pumps_mixer() -> Result<(), Box<dyn Error>> {
        let device = get_device(&config::Audio::new("mock-output"))?;
        let mock = device.to_mock()?;
        assert!(!mock.is_playing());

        let sample = LoadedSample::new(vec![0.5; 2], 1, 44100);
        device
            .mixer()
            .add_source(ActiveSource::new(sample, Gain::new(1.0)))?;
        assert!(mock.is_playing());

        // Mono is spread to both channels.
        assert_eq!(vec![0.5, 0.5, 0.5, 0.5], mock.pump(2));
        mock.pump(1);
        assert!(!mock.is_playing());
        Ok(())
    }
}
