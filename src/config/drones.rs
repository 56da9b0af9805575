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
use std::time::Duration;

use serde::Deserialize;

use super::{error::ConfigError, parse_duration};

const DEFAULT_VOLUME: f32 = 0.3;
const DEFAULT_INTERVAL: Duration = Duration::from_secs(8);
const DEFAULT_CROSSFADE: Duration = Duration::from_secs(2);
const DEFAULT_OFFSET: Duration = Duration::from_millis(50);

/// A YAML representation of the drone layer configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Drones {
    /// Whether the drone layer plays at all.
    enabled: Option<bool>,

    /// Gain of the drone layer.
    volume: Option<f32>,

    /// Time between crossfades to a fresh instance.
    interval: Option<String>,

    /// Length of each crossfade.
    crossfade: Option<String>,

    /// How far into the source a fresh instance starts.
    offset: Option<String>,
}

impl Drones {
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }

    pub fn volume(&self) -> f32 {
        self.volume.unwrap_or(DEFAULT_VOLUME).clamp(0.0, 1.0)
    }

    /// The crossfade interval. Must be longer than the crossfade itself so that at most
    /// two instances overlap.
    pub fn interval(&self) -> Result<Duration, ConfigError> {
        let interval = parse_duration("interval", &self.interval, DEFAULT_INTERVAL)?;
        if interval <= self.crossfade()? {
            return Err(ConfigError::Value {
                field: "interval",
                message: "drone interval must be longer than the crossfade".to_string(),
            });
        }
        Ok(interval)
    }

    pub fn crossfade(&self) -> Result<Duration, ConfigError> {
        parse_duration("crossfade", &self.crossfade, DEFAULT_CROSSFADE)
    }

    pub fn offset(&self) -> Result<Duration, ConfigError> {
        parse_duration("offset", &self.offset, DEFAULT_OFFSET)
    }
}
