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
// Core audio mixing logic shared by the cpal device and the mock device.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::gain::Gain;
use super::AudioError;
use crate::samples::LoadedSample;

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a process-wide unique source ID.
pub fn next_source_id() -> u64 {
    NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Core audio mixing logic that's independent of any audio backend.
#[derive(Clone)]
pub struct AudioMixer {
    /// Active audio sources currently playing.
    active_sources: Arc<Mutex<Vec<ActiveSource>>>,
    /// Number of output channels.
    num_channels: u16,
    /// Sample rate.
    sample_rate: u32,
}

/// A decoded sample being played by the mixer.
pub struct ActiveSource {
    id: u64,
    sample: LoadedSample,
    /// The next frame to read.
    position: usize,
    looping: bool,
    gain: Gain,
}

impl ActiveSource {
    pub fn new(sample: LoadedSample, gain: Gain) -> ActiveSource {
        ActiveSource {
            id: next_source_id(),
            sample,
            position: 0,
            looping: false,
            gain,
        }
    }

    /// Starts playback this many frames into the sample.
    pub fn starting_at(mut self, frame: usize) -> ActiveSource {
        self.position = frame.min(self.sample.frames());
        self
    }

    /// Loops the sample until removed.
    pub fn looping(mut self) -> ActiveSource {
        self.looping = true;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    fn is_finished(&self) -> bool {
        !self.looping && self.position >= self.sample.frames()
    }

    /// Mixes up to `frames` frames of this source into the interleaved output.
    fn mix_into(&mut self, output: &mut [f32], num_channels: usize, frames: usize) {
        let source_channels = self.sample.channel_count() as usize;
        let total_frames = self.sample.frames();
        if source_channels == 0 || total_frames == 0 {
            self.position = total_frames;
            return;
        }

        let data = self.sample.data();
        let mut ramp = self.gain.lock();
        for frame in 0..frames {
            if self.position >= total_frames {
                if !self.looping {
                    break;
                }
                self.position = 0;
            }

            let gain = ramp.next_frame();
            let input = &data[self.position * source_channels..(self.position + 1) * source_channels];
            let out = &mut output[frame * num_channels..(frame + 1) * num_channels];
            for (channel, sample) in out.iter_mut().enumerate() {
                // Mono goes to every output; wider sources map channel for channel.
                let value = if source_channels == 1 {
                    input[0]
                } else if channel < source_channels {
                    input[channel]
                } else {
                    continue;
                };
                *sample += value * gain;
            }
            self.position += 1;
        }
    }
}

impl AudioMixer {
    /// Creates a new audio mixer.
    pub fn new(num_channels: u16, sample_rate: u32) -> Self {
        Self {
            active_sources: Arc::new(Mutex::new(Vec::new())),
            num_channels,
            sample_rate,
        }
    }

    /// Adds a new audio source to the mixer. The sample must already be at the mixer's rate.
    pub fn add_source(&self, source: ActiveSource) -> Result<u64, AudioError> {
        if source.sample.sample_rate() != self.sample_rate {
            return Err(AudioError::SampleRate {
                expected: self.sample_rate,
                actual: source.sample.sample_rate(),
            });
        }
        let id = source.id;
        self.active_sources.lock().push(source);
        Ok(id)
    }

    /// Removes sources by ID.
    pub fn remove_sources(&self, source_ids: &[u64]) {
        self.active_sources
            .lock()
            .retain(|source| !source_ids.contains(&source.id));
    }

    pub fn has_source(&self, source_id: u64) -> bool {
        self.active_sources
            .lock()
            .iter()
            .any(|source| source.id == source_id)
    }

    pub fn source_count(&self) -> usize {
        self.active_sources.lock().len()
    }

    /// Mixes `frames` frames into the interleaved output buffer, which is cleared first.
    /// Sources that run out are removed.
    pub fn process_into_output(&self, output: &mut [f32], frames: usize) {
        let num_channels = self.num_channels as usize;
        let frames = frames.min(output.len() / num_channels.max(1));
        output.iter_mut().for_each(|sample| *sample = 0.0);

        let mut sources = self.active_sources.lock();
        sources.retain_mut(|source| {
            source.mix_into(output, num_channels, frames);
            !source.is_finished()
        });
    }

    /// Processes multiple frames of audio mixing.
    pub fn process_frames(&self, num_frames: usize) -> Vec<f32> {
        let mut frames = vec![0.0f32; num_frames * self.num_channels as usize];
        self.process_into_output(&mut frames, num_frames);
        frames
    }

    /// Gets the number of output channels.
    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    /// Gets the sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::gain::FadeCurve;

    #[test]
    fn test_mono_mixing() {
        let mixer = AudioMixer::new(2, 44100);
        let sample = LoadedSample::new(vec![0.5, 0.8], 1, 44100);
        mixer
            .add_source(ActiveSource::new(sample, Gain::new(1.0)))
            .expect("add");

        let frames = mixer.process_frames(3);

        // Mono is duplicated to both outputs.
        assert_eq!(vec![0.5, 0.5, 0.8, 0.8, 0.0, 0.0], frames);
        assert_eq!(0, mixer.source_count());
    }

    #[test]
    fn test_multiple_source_mixing() {
        let mixer = AudioMixer::new(2, 44100);
        let first = LoadedSample::new(vec![0.5, 0.25], 2, 44100);
        let second = LoadedSample::new(vec![0.25, 0.125], 2, 44100);
        mixer
            .add_source(ActiveSource::new(first, Gain::new(1.0)))
            .expect("add");
        mixer
            .add_source(ActiveSource::new(second, Gain::new(0.5)))
            .expect("add");

        assert_eq!(vec![0.625, 0.3125], mixer.process_frames(1));
    }

    #[test]
    fn test_rejects_sample_rate_mismatch() {
        let mixer = AudioMixer::new(2, 48000);
        let sample = LoadedSample::new(vec![0.5], 1, 44100);
        assert!(matches!(
            mixer.add_source(ActiveSource::new(sample, Gain::new(1.0))),
            Err(AudioError::SampleRate {
                expected: 48000,
                actual: 44100
            })
        ));
        assert_eq!(0, mixer.source_count());
    }

    #[test]
    fn test_looping_with_offset() {
        let mixer = AudioMixer::new(1, 44100);
        let sample = LoadedSample::new(vec![0.1, 0.2, 0.3], 1, 44100);
        let id = mixer
            .add_source(
                ActiveSource::new(sample, Gain::new(1.0))
                    .starting_at(1)
                    .looping(),
            )
            .expect("add");

        assert_eq!(vec![0.2, 0.3, 0.1, 0.2, 0.3, 0.1], mixer.process_frames(6));
        assert!(mixer.has_source(id));

        mixer.remove_sources(&[id]);
        assert!(!mixer.has_source(id));
        assert_eq!(vec![0.0, 0.0], mixer.process_frames(2));
    }

    #[test]
    fn test_gain_ramp_is_applied() {
        let mixer = AudioMixer::new(1, 44100);
        let gain = Gain::new(1.0);
        gain.ramp_to(0.0, 2, FadeCurve::Linear);
        let sample = LoadedSample::new(vec![1.0; 4], 1, 44100);
        mixer
            .add_source(ActiveSource::new(sample, gain.clone()))
            .expect("add");

        assert_eq!(vec![1.0, 0.5, 0.0, 0.0], mixer.process_frames(4));
        assert_eq!(0.0, gain.value());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = next_source_id();
        let b = next_source_id();
        assert_ne!(a, b);
    }
}
