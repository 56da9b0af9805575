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
//! Decoding of sample files into memory.
//!
//! Samples are decoded entirely up front so that a prepared trial starts with no latency.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, info};

use super::SampleError;

/// A decoded sample. The data is stored in an Arc so that trials, replays and drone
/// instances can share it.
#[derive(Clone)]
pub struct LoadedSample {
    /// The sample data as f32 samples (interleaved if multi-channel).
    data: Arc<Vec<f32>>,
    /// Number of channels in the sample.
    channel_count: u16,
    /// Sample rate of the audio data.
    sample_rate: u32,
}

impl LoadedSample {
    /// Creates a sample from interleaved data.
    pub fn new(data: Vec<f32>, channel_count: u16, sample_rate: u32) -> LoadedSample {
        LoadedSample {
            data: Arc::new(data),
            channel_count: channel_count.max(1),
            sample_rate,
        }
    }

    /// Returns the interleaved sample data.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Returns the number of channels.
    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the number of frames.
    pub fn frames(&self) -> usize {
        self.data.len() / self.channel_count as usize
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

impl std::fmt::Debug for LoadedSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedSample")
            .field("channels", &self.channel_count)
            .field("sample_rate", &self.sample_rate)
            .field("frames", &self.frames())
            .finish()
    }
}

/// Decodes the given file and resamples it to the target rate.
pub fn decode_file(path: &Path, target_sample_rate: u32) -> Result<LoadedSample, SampleError> {
    let file = File::open(path).map_err(|e| SampleError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    // Help the format registry guess the format.
    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SampleError::NoTrack(path.to_path_buf()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(target_sample_rate);
    let mut channel_count = track
        .codec_params
        .channels
        .map(|channels| channels.count() as u16)
        .unwrap_or(1);

    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;
    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buffer: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Some decoders report a decode error at the end of the stream.
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(path = ?path, err = e, "Decode error, treating as end of stream");
                break;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channel_count = spec.channels.count() as u16;

        let needed = decoded.capacity() * spec.channels.count();
        if sample_buffer
            .as_ref()
            .map_or(true, |buffer| buffer.capacity() < needed)
        {
            sample_buffer = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }
        if let Some(buffer) = sample_buffer.as_mut() {
            buffer.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buffer.samples());
        }
    }

    if samples.is_empty() {
        return Err(SampleError::Empty(path.to_path_buf()));
    }

    let (samples, sample_rate) = if sample_rate != target_sample_rate {
        debug!(
            source_rate = sample_rate,
            target_rate = target_sample_rate,
            "Resampling sample"
        );
        (
            resample(&samples, channel_count, sample_rate, target_sample_rate),
            target_sample_rate,
        )
    } else {
        (samples, sample_rate)
    };

    let loaded = LoadedSample::new(samples, channel_count, sample_rate);
    info!(
        path = ?path,
        channels = channel_count,
        sample_rate = sample_rate,
        duration_ms = loaded.duration().as_millis(),
        memory_kb = loaded.memory_size() / 1024,
        "Sample loaded"
    );
    Ok(loaded)
}

/// Resamples interleaved samples using linear interpolation. Good enough for single notes,
/// and keeps pitch correct when the asset rate differs from the device rate.
pub fn resample(samples: &[f32], channel_count: u16, source_rate: u32, target_rate: u32) -> Vec<f32> {
    let channels = channel_count.max(1) as usize;
    let ratio = target_rate as f64 / source_rate as f64;
    let source_frames = samples.len() / channels;
    let target_frames = (source_frames as f64 * ratio).ceil() as usize;

    let mut output = Vec::with_capacity(target_frames * channels);
    for target_frame in 0..target_frames {
        let source_pos = target_frame as f64 / ratio;
        let source_frame = source_pos.floor() as usize;
        let frac = source_pos.fract() as f32;

        for channel in 0..channels {
            let s0 = samples
                .get(source_frame * channels + channel)
                .copied()
                .unwrap_or(0.0);
            let s1 = samples
                .get((source_frame + 1) * channels + channel)
                .copied()
                .unwrap_or(s0);
            output.push(s0 + (s1 - s0) * frac);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_wav;

    #[test]
    fn test_resample() {
        let source_rate = 44100;
        let target_rate = 48000;
        let source: Vec<f32> = (0..4410)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / source_rate as f32).sin())
            .collect();

        let result = resample(&source, 1, source_rate, target_rate);
        assert_eq!(4800, result.len());
        assert!(result.iter().all(|s| (-1.0..=1.0).contains(s)));

        // Stereo keeps channels interleaved.
        let stereo = vec![1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0];
        let result = resample(&stereo, 2, 22050, 44100);
        assert_eq!(16, result.len());
        for frame in result.chunks(2) {
            assert_eq!(1.0, frame[0]);
            assert_eq!(-1.0, frame[1]);
        }
    }

    #[test]
    fn test_decode_wav() -> Result<(), Box<dyn std::error::Error>> {
        let tempdir = tempfile::tempdir()?;
        let path = tempdir.path().join("60.wav");
        write_wav(path.clone(), vec![vec![0.5f32; 441]], 44100)?;

        let sample = decode_file(&path, 44100)?;
        assert_eq!(1, sample.channel_count());
        assert_eq!(44100, sample.sample_rate());
        assert_eq!(441, sample.frames());
        assert!(sample.data().iter().all(|s| (s - 0.5).abs() < 1e-6));

        let resampled = decode_file(&path, 88200)?;
        assert_eq!(88200, resampled.sample_rate());
        assert_eq!(882, resampled.frames());
        Ok(())
    }

    #[test]
    fn test_decode_missing_file() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let result = decode_file(&tempdir.path().join("missing.wav"), 44100);
        assert!(matches!(result, Err(SampleError::Io { .. })));
    }
}
