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
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::{loader, LoadedSample, SampleError};
use crate::chroma::Chroma;

/// The directory under the asset root that holds drone samples.
const DRONE_DIRECTORY: &str = "Drones";

/// Where samples come from. Implementations are synchronous and are driven from the
/// blocking pool.
pub trait SampleStore: Send + Sync + 'static {
    /// The sample format, part of every availability key.
    fn format(&self) -> &str;

    /// A lightweight existence probe that does not read the sample data.
    fn exists(&self, instrument: &str, note: u8) -> Result<bool, SampleError>;

    /// Fetches and decodes the sample for the given instrument and note.
    fn load(&self, instrument: &str, note: u8) -> Result<LoadedSample, SampleError>;

    /// Fetches and decodes the drone sample for the given chroma.
    fn load_drone(&self, chroma: Chroma) -> Result<LoadedSample, SampleError>;
}

/// Samples laid out on disk as `<root>/<instrument>/<note>.<format>`, with drones at
/// `<root>/Drones/<chroma>.<format>`.
pub struct FileStore {
    root: PathBuf,
    format: String,
    target_sample_rate: u32,
}

impl FileStore {
    pub fn new(root: &Path, format: &str, target_sample_rate: u32) -> FileStore {
        FileStore {
            root: root.to_path_buf(),
            format: format.to_string(),
            target_sample_rate,
        }
    }

    /// The path of the sample for the given instrument and note.
    pub fn sample_path(&self, instrument: &str, note: u8) -> PathBuf {
        self.root
            .join(instrument)
            .join(format!("{}.{}", note, self.format))
    }

    /// The path of the drone sample for the given chroma.
    pub fn drone_path(&self, chroma: Chroma) -> PathBuf {
        self.root
            .join(DRONE_DIRECTORY)
            .join(format!("{}.{}", chroma.ascii_label(), self.format))
    }
}

impl SampleStore for FileStore {
    fn format(&self) -> &str {
        &self.format
    }

    fn exists(&self, instrument: &str, note: u8) -> Result<bool, SampleError> {
        let path = self.sample_path(instrument, note);
        match fs::metadata(&path) {
            Ok(metadata) => Ok(metadata.is_file() && metadata.len() > 0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SampleError::Io { path, source: e }),
        }
    }

    fn load(&self, instrument: &str, note: u8) -> Result<LoadedSample, SampleError> {
        loader::decode_file(
            &self.sample_path(instrument, note),
            self.target_sample_rate,
        )
    }

    fn load_drone(&self, chroma: Chroma) -> Result<LoadedSample, SampleError> {
        loader::decode_file(&self.drone_path(chroma), self.target_sample_rate)
    }
}

/// An in-memory store, used by the mock setup and in tests. Counts probes and loads so
/// that callers can verify memoization.
#[derive(Default)]
pub struct MemoryStore {
    samples: HashMap<(String, u8), LoadedSample>,
    drones: HashMap<Chroma, LoadedSample>,
    /// Keys whose probe reports an error rather than a missing sample.
    failing: HashSet<(String, u8)>,
    /// Keys that probe as present but fail to load.
    broken: HashSet<(String, u8)>,
    probes: AtomicUsize,
    loads: AtomicUsize,
    latency: Mutex<Duration>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Adds a sample for every note in the inclusive range.
    pub fn with_instrument(mut self, instrument: &str, min: u8, max: u8, sample: &LoadedSample) -> Self {
        for note in min..=max {
            self.samples
                .insert((instrument.to_string(), note), sample.clone());
        }
        self
    }

    pub fn with_sample(mut self, instrument: &str, note: u8, sample: &LoadedSample) -> Self {
        self.samples
            .insert((instrument.to_string(), note), sample.clone());
        self
    }

    pub fn with_drone(mut self, chroma: Chroma, sample: &LoadedSample) -> Self {
        self.drones.insert(chroma, sample.clone());
        self
    }

    pub fn with_failing_probe(mut self, instrument: &str, note: u8) -> Self {
        self.failing.insert((instrument.to_string(), note));
        self
    }

    pub fn with_broken_sample(mut self, instrument: &str, note: u8) -> Self {
        self.broken.insert((instrument.to_string(), note));
        self
    }

    /// Makes every load take at least the given time.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::Relaxed)
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }
}

impl SampleStore for MemoryStore {
    fn format(&self) -> &str {
        "memory"
    }

    fn exists(&self, instrument: &str, note: u8) -> Result<bool, SampleError> {
        self.probes.fetch_add(1, Ordering::Relaxed);
        let key = (instrument.to_string(), note);
        if self.failing.contains(&key) {
            return Err(SampleError::Unavailable(format!("{} {}", instrument, note)));
        }
        Ok(self.samples.contains_key(&key) || self.broken.contains(&key))
    }

    fn load(&self, instrument: &str, note: u8) -> Result<LoadedSample, SampleError> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        self.samples
            .get(&(instrument.to_string(), note))
            .cloned()
            .ok_or_else(|| SampleError::Unavailable(format!("{} {}", instrument, note)))
    }

    fn load_drone(&self, chroma: Chroma) -> Result<LoadedSample, SampleError> {
        self.drones
            .get(&chroma)
            .cloned()
            .ok_or_else(|| SampleError::Unavailable(format!("drone {}", chroma)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_wav;

    #[test]
    fn test_file_store_layout() -> Result<(), Box<dyn std::error::Error>> {
        let tempdir = tempfile::tempdir()?;
        let store = FileStore::new(tempdir.path(), "wav", 44100);
        assert_eq!(
            tempdir.path().join("Piano").join("60.wav"),
            store.sample_path("Piano", 60)
        );
        assert_eq!(
            tempdir.path().join("Drones").join("C#.wav"),
            store.drone_path(Chroma::from_note(61))
        );

        assert!(!store.exists("Piano", 60)?);
        std::fs::create_dir_all(tempdir.path().join("Piano"))?;
        write_wav(store.sample_path("Piano", 60), vec![vec![0.25f32; 100]], 44100)?;
        assert!(store.exists("Piano", 60)?);
        assert!(!store.exists("Piano", 61)?);

        let sample = store.load("Piano", 60)?;
        assert_eq!(100, sample.frames());
        assert!(store.load("Piano", 61).is_err());
        assert!(store.load_drone(Chroma::from_note(60)).is_err());
        Ok(())
    }

    #[test]
    fn test_memory_store() -> Result<(), Box<dyn std::error::Error>> {
        let sample = LoadedSample::new(vec![0.0; 10], 1, 44100);
        let store = MemoryStore::new()
            .with_instrument("Piano", 36, 38, &sample)
            .with_failing_probe("Flute", 60)
            .with_broken_sample("Harp", 40);

        assert!(store.exists("Piano", 37)?);
        assert!(!store.exists("Piano", 39)?);
        assert!(store.exists("Flute", 60).is_err());
        assert!(store.exists("Harp", 40)?);
        assert!(store.load("Harp", 40).is_err());
        assert_eq!(4, store.probe_count());
        assert_eq!(1, store.load_count());
        Ok(())
    }
}
