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
use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::audio::{ActiveSource, AudioMixer, FadeCurve, Gain};
use crate::samples::LoadedSample;
use crate::scheduler::Scheduler;
use crate::selector::Trial;

pub mod drone;

pub use drone::{DroneLane, DroneSettings};

/// Converts a duration to a frame count at the given rate.
pub(crate) fn frames_for(duration: Duration, sample_rate: u32) -> u64 {
    (duration.as_secs_f64() * sample_rate as f64).round() as u64
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum EngineTimer {
    Cleanup,
}

/// The sources of the trial currently sounding. Each source has its own gain, since the
/// mixer advances a ramp once per source per frame.
struct PlaybackSession {
    id: u64,
    source_ids: Vec<u64>,
    gains: Vec<Gain>,
}

#[derive(Default)]
struct EngineState {
    session: Option<PlaybackSession>,
    last_samples: Vec<LoadedSample>,
    next_session_id: u64,
}

/// Plays one trial at a time. Starting a trial tears down whatever was playing before.
pub struct PlaybackEngine {
    mixer: AudioMixer,
    state: Arc<Mutex<EngineState>>,
    timers: Scheduler<EngineTimer>,
}

impl PlaybackEngine {
    pub fn new(mixer: AudioMixer) -> PlaybackEngine {
        PlaybackEngine {
            mixer,
            state: Arc::new(Mutex::new(EngineState::default())),
            timers: Scheduler::new(),
        }
    }

    /// Plays every note of the trial together.
    pub fn play(&self, trial: &Trial) {
        info!(
            note = trial.target_note(),
            instrument = trial.instrument(),
            notes = trial.notes().len(),
            "Playing trial."
        );
        let samples = trial
            .notes()
            .iter()
            .map(|note| note.sample().clone())
            .collect();
        self.start(samples);
    }

    /// Plays the last trial again from the start.
    pub fn replay(&self) {
        let samples = self.state.lock().last_samples.clone();
        if samples.is_empty() {
            debug!("Nothing to replay.");
            return;
        }
        self.start(samples);
    }

    fn start(&self, samples: Vec<LoadedSample>) {
        self.timers.cancel(EngineTimer::Cleanup);

        let mut state = self.state.lock();
        if let Some(previous) = state.session.take() {
            self.mixer.remove_sources(&previous.source_ids);
        }

        let mut source_ids = Vec::with_capacity(samples.len());
        let mut gains = Vec::with_capacity(samples.len());
        for sample in &samples {
            let gain = Gain::new(1.0);
            match self
                .mixer
                .add_source(ActiveSource::new(sample.clone(), gain.clone()))
            {
                Ok(id) => {
                    source_ids.push(id);
                    gains.push(gain);
                }
                Err(e) => warn!(err = %e, "Unable to start trial audio."),
            }
        }

        state.next_session_id += 1;
        state.session = Some(PlaybackSession {
            id: state.next_session_id,
            source_ids,
            gains,
        });
        state.last_samples = samples;
    }

    /// Fades the current trial out linearly, then removes its sources.
    pub fn fade_out(&self, duration: Duration) {
        let session_id = {
            let state = self.state.lock();
            let Some(session) = &state.session else {
                return;
            };
            let frames = frames_for(duration, self.mixer.sample_rate());
            for gain in &session.gains {
                gain.ramp_to(0.0, frames, FadeCurve::Linear);
            }
            session.id
        };

        let state = self.state.clone();
        let mixer = self.mixer.clone();
        self.timers.arm(EngineTimer::Cleanup, duration, async move {
            let mut state = state.lock();
            if state.session.as_ref().map(|s| s.id) == Some(session_id) {
                if let Some(session) = state.session.take() {
                    mixer.remove_sources(&session.source_ids);
                    debug!(session = session_id, "Removed faded trial audio.");
                }
            }
        });
    }

    /// Stops the current trial immediately.
    pub fn stop(&self) {
        self.timers.cancel(EngineTimer::Cleanup);
        if let Some(session) = self.state.lock().session.take() {
            self.mixer.remove_sources(&session.source_ids);
        }
    }

    /// True while any source of the current trial is still in the mixer.
    pub fn is_playing(&self) -> bool {
        self.source_ids()
            .iter()
            .any(|id| self.mixer.has_source(*id))
    }

    pub fn source_ids(&self) -> Vec<u64> {
        self.state
            .lock()
            .session
            .as_ref()
            .map(|session| session.source_ids.clone())
            .unwrap_or_default()
    }

    /// The gain of the current trial's first note, if one is playing.
    pub fn gain(&self) -> Option<Gain> {
        self.gains().into_iter().next()
    }

    /// The gains of every note of the current trial.
    pub fn gains(&self) -> Vec<Gain> {
        self.state
            .lock()
            .session
            .as_ref()
            .map(|session| session.gains.clone())
            .unwrap_or_default()
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        if let Some(session) = self.state.lock().session.take() {
            self.mixer.remove_sources(&session.source_ids);
        }
    }
}
