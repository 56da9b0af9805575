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
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::{sync::OnceCell, task::JoinSet};
use tracing::{debug, warn};

use super::{SampleKey, SampleStore};
use crate::selector::Instrument;

/// Memoizes whether a sample exists for an (instrument, note) pair. Each key is probed at
/// most once per session; concurrent first queries share the same probe. Probe failures
/// are remembered as unavailable and never retried.
#[derive(Clone)]
pub struct AvailabilityCache {
    store: Arc<dyn SampleStore>,
    entries: Arc<Mutex<HashMap<SampleKey, Arc<OnceCell<bool>>>>>,
}

impl AvailabilityCache {
    pub fn new(store: Arc<dyn SampleStore>) -> AvailabilityCache {
        AvailabilityCache {
            store,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The store behind this cache.
    pub fn store(&self) -> Arc<dyn SampleStore> {
        self.store.clone()
    }

    fn key(&self, instrument: &str, note: u8) -> SampleKey {
        SampleKey::new(self.store.format(), instrument, note)
    }

    /// Returns true if the sample exists, probing the store on the first query.
    pub async fn exists(&self, instrument: &str, note: u8) -> bool {
        let key = self.key(instrument, note);
        let cell = self.entries.lock().entry(key.clone()).or_default().clone();

        *cell
            .get_or_init(|| async {
                let store = self.store.clone();
                let instrument = instrument.to_string();
                match tokio::task::spawn_blocking(move || store.exists(&instrument, note)).await {
                    Ok(Ok(exists)) => {
                        debug!(key = %key, exists, "Probed sample.");
                        exists
                    }
                    Ok(Err(e)) => {
                        debug!(key = %key, err = %e, "Sample probe failed, caching as unavailable.");
                        false
                    }
                    Err(e) => {
                        warn!(key = %key, err = %e, "Sample probe task failed.");
                        false
                    }
                }
            })
            .await
    }

    /// Records that a sample turned out to be unusable after a successful probe.
    pub fn mark_unavailable(&self, instrument: &str, note: u8) {
        let key = self.key(instrument, note);
        let cell = OnceCell::new_with(Some(false));
        self.entries.lock().insert(key, Arc::new(cell));
    }

    /// Returns the cached answer without probing.
    pub fn cached(&self, instrument: &str, note: u8) -> Option<bool> {
        let key = self.key(instrument, note);
        self.entries
            .lock()
            .get(&key)
            .and_then(|cell| cell.get().copied())
    }

    /// Checks every candidate concurrently and returns the available ones in input order.
    pub async fn available(&self, candidates: &[Instrument], note: u8) -> Vec<Instrument> {
        let mut checks = JoinSet::new();
        for (index, instrument) in candidates.iter().enumerate() {
            let cache = self.clone();
            let name = instrument.name().to_string();
            checks.spawn(async move { (index, cache.exists(&name, note).await) });
        }

        let mut available = vec![false; candidates.len()];
        while let Some(result) = checks.join_next().await {
            match result {
                Ok((index, exists)) => available[index] = exists,
                Err(e) => warn!(err = %e, "Availability check failed."),
            }
        }

        candidates
            .iter()
            .zip(available)
            .filter_map(|(instrument, exists)| exists.then(|| instrument.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::{LoadedSample, MemoryStore};
    use crate::selector::NoteRange;

    fn sample() -> LoadedSample {
        LoadedSample::new(vec![0.0; 16], 1, 44100)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_memoizes_probes() {
        let store = Arc::new(
            MemoryStore::new()
                .with_sample("Piano", 60, &sample())
                .with_failing_probe("Piano", 61),
        );
        let cache = AvailabilityCache::new(store.clone());

        assert_eq!(None, cache.cached("Piano", 60));
        assert!(cache.exists("Piano", 60).await);
        assert!(cache.exists("Piano", 60).await);
        assert_eq!(1, store.probe_count());
        assert_eq!(Some(true), cache.cached("Piano", 60));

        // A failed probe is cached as unavailable and not retried.
        assert!(!cache.exists("Piano", 61).await);
        assert!(!cache.exists("Piano", 61).await);
        assert_eq!(2, store.probe_count());

        assert!(!cache.exists("Piano", 62).await);
        assert_eq!(3, store.probe_count());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_first_queries_share_a_probe() {
        let store = Arc::new(MemoryStore::new().with_sample("Harp", 50, &sample()));
        let cache = AvailabilityCache::new(store.clone());

        let mut set = JoinSet::new();
        for _ in 0..8 {
            let cache = cache.clone();
            set.spawn(async move { cache.exists("Harp", 50).await });
        }
        while let Some(result) = set.join_next().await {
            assert!(result.expect("join"));
        }
        assert_eq!(1, store.probe_count());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_available_keeps_order_and_marks() {
        let store = Arc::new(
            MemoryStore::new()
                .with_sample("Piano", 60, &sample())
                .with_sample("Flute", 60, &sample()),
        );
        let cache = AvailabilityCache::new(store);
        let range = NoteRange::new(36, 96);
        let candidates = vec![
            Instrument::new("Piano", range),
            Instrument::new("Harp", range),
            Instrument::new("Flute", range),
        ];

        let available = cache.available(&candidates, 60).await;
        let names: Vec<&str> = available.iter().map(|i| i.name()).collect();
        assert_eq!(vec!["Piano", "Flute"], names);

        cache.mark_unavailable("Flute", 60);
        assert!(!cache.exists("Flute", 60).await);
        let available = cache.available(&candidates, 60).await;
        assert_eq!(1, available.len());
    }
}
