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
//! A sustained background tone. The drone sample loops, and at every interval a fresh
//! instance takes over through an equal-power crossfade so the loop point is never heard.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::frames_for;
use crate::audio::{ActiveSource, AudioMixer, FadeCurve, Gain};
use crate::chroma::Chroma;
use crate::config;
use crate::samples::LoadedSample;
use crate::scheduler::Scheduler;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DroneSettings {
    pub volume: f32,
    pub interval: Duration,
    pub crossfade: Duration,
    pub offset: Duration,
}

impl DroneSettings {
    pub fn from_config(drones: &config::Drones) -> Result<DroneSettings, config::ConfigError> {
        Ok(DroneSettings {
            volume: drones.volume(),
            interval: drones.interval()?,
            crossfade: drones.crossfade()?,
            offset: drones.offset()?,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum DroneTimer {
    Crossfade,
    Dispose(u64),
}

struct Instance {
    source_id: u64,
    gain: Gain,
}

#[derive(Default)]
struct DroneState {
    chroma: Option<Chroma>,
    sample: Option<LoadedSample>,
    current: Option<Instance>,
    fading: Vec<Instance>,
}

struct Inner {
    mixer: AudioMixer,
    settings: DroneSettings,
    state: Mutex<DroneState>,
    timers: Scheduler<DroneTimer>,
}

/// The drone lane. Independent of the trial engine: it owns its own sources, gains and
/// timers and never touches anything else in the mixer.
pub struct DroneLane {
    inner: Arc<Inner>,
}

impl DroneLane {
    pub fn new(mixer: AudioMixer, settings: DroneSettings) -> DroneLane {
        DroneLane {
            inner: Arc::new(Inner {
                mixer,
                settings,
                state: Mutex::new(DroneState::default()),
                timers: Scheduler::new(),
            }),
        }
    }

    /// Starts droning the given chroma, replacing any current drone.
    pub fn start(&self, chroma: Chroma, sample: LoadedSample) {
        self.stop();

        let gain = Gain::new(self.inner.settings.volume);
        let source = ActiveSource::new(sample.clone(), gain.clone()).looping();
        let source_id = match self.inner.mixer.add_source(source) {
            Ok(source_id) => source_id,
            Err(e) => {
                warn!(chroma = %chroma, err = %e, "Unable to start drone.");
                return;
            }
        };
        info!(chroma = %chroma, "Drone started.");

        {
            let mut state = self.inner.state.lock();
            state.chroma = Some(chroma);
            state.sample = Some(sample);
            state.current = Some(Instance { source_id, gain });
        }
        arm_crossfade(&self.inner);
    }

    /// Removes every drone instance and cancels every drone timer.
    pub fn stop(&self) {
        self.inner.timers.cancel_all();
        let mut state = self.inner.state.lock();
        let ids: Vec<u64> = state
            .current
            .take()
            .into_iter()
            .chain(state.fading.drain(..))
            .map(|instance| instance.source_id)
            .collect();
        if !ids.is_empty() {
            self.inner.mixer.remove_sources(&ids);
            debug!(chroma = ?state.chroma, "Drone stopped.");
        }
        state.chroma = None;
        state.sample = None;
    }

    pub fn chroma(&self) -> Option<Chroma> {
        self.inner.state.lock().chroma
    }

    /// Source IDs of every drone instance in the mixer, current first.
    pub fn source_ids(&self) -> Vec<u64> {
        let state = self.inner.state.lock();
        state
            .current
            .iter()
            .chain(state.fading.iter())
            .map(|instance| instance.source_id)
            .collect()
    }
}

impl Drop for DroneLane {
    fn drop(&mut self) {
        self.stop();
    }
}

fn arm_crossfade(inner: &Arc<Inner>) {
    let weak = Arc::downgrade(inner);
    inner
        .timers
        .arm(DroneTimer::Crossfade, inner.settings.interval, async move {
            crossfade(weak);
        });
}

fn crossfade(weak: Weak<Inner>) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let settings = inner.settings;
    let sample_rate = inner.mixer.sample_rate();
    let window = frames_for(settings.crossfade, sample_rate);

    let old_id = {
        let mut state = inner.state.lock();
        let Some(sample) = state.sample.clone() else {
            return;
        };

        let gain = Gain::new(0.0);
        let offset = frames_for(settings.offset, sample_rate) as usize;
        let source = ActiveSource::new(sample, gain.clone())
            .starting_at(offset)
            .looping();
        let source_id = match inner.mixer.add_source(source) {
            Ok(source_id) => source_id,
            Err(e) => {
                warn!(err = %e, "Unable to start drone crossfade.");
                drop(state);
                arm_crossfade(&inner);
                return;
            }
        };
        gain.ramp_to(settings.volume, window, FadeCurve::EqualPower);

        let old = state.current.replace(Instance { source_id, gain });
        match old {
            Some(old) => {
                old.gain.ramp_to(0.0, window, FadeCurve::EqualPower);
                let old_id = old.source_id;
                state.fading.push(old);
                Some(old_id)
            }
            None => None,
        }
    };
    debug!(old = ?old_id, "Drone crossfade.");

    if let Some(old_id) = old_id {
        let weak = Arc::downgrade(&inner);
        inner
            .timers
            .arm(DroneTimer::Dispose(old_id), settings.crossfade, async move {
                if let Some(inner) = weak.upgrade() {
                    inner
                        .state
                        .lock()
                        .fading
                        .retain(|instance| instance.source_id != old_id);
                    inner.mixer.remove_sources(&[old_id]);
                    inner.timers.cancel(DroneTimer::Dispose(old_id));
                }
            });
    }
    arm_crossfade(&inner);
}
