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
//! Trial selection: picking a playable chroma, note and instrument and preparing its audio.

use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use tracing::{debug, warn};

use crate::chroma::{Chroma, ChromaSet, SetKind};
use crate::samples::{AvailabilityCache, LoadedSample};

/// The number of notes an octave narrows each end of the range by in reduced range mode.
const REDUCED_RANGE_NARROWING: u8 = 12;

/// An inclusive range of note numbers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoteRange {
    min: u8,
    max: u8,
}

impl NoteRange {
    pub fn new(min: u8, max: u8) -> NoteRange {
        NoteRange {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn min(&self) -> u8 {
        self.min
    }

    pub fn max(&self) -> u8 {
        self.max
    }

    pub fn contains(&self, note: u8) -> bool {
        (self.min..=self.max).contains(&note)
    }

    /// The range narrowed by an octave on each side. Collapses to the midpoint when the
    /// range is too small to narrow.
    pub fn reduced(&self) -> NoteRange {
        let min = self.min.saturating_add(REDUCED_RANGE_NARROWING);
        let max = self.max.saturating_sub(REDUCED_RANGE_NARROWING);
        if min > max {
            let mid = self.min + (self.max - self.min) / 2;
            return NoteRange::new(mid, mid);
        }
        NoteRange::new(min, max)
    }

    /// The notes in this range with the given chroma.
    pub fn notes_for(&self, chroma: Chroma) -> Vec<u8> {
        (self.min..=self.max)
            .filter(|note| Chroma::from_note(*note) == chroma)
            .collect()
    }
}

impl fmt::Display for NoteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// A named timbre with the notes it can play.
#[derive(Clone, Debug, PartialEq)]
pub struct Instrument {
    name: String,
    range: NoteRange,
}

impl Instrument {
    pub fn new(name: &str, range: NoteRange) -> Instrument {
        Instrument {
            name: name.to_string(),
            range,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn range(&self) -> NoteRange {
        self.range
    }
}

/// One sounding note of a trial, with its decoded audio.
#[derive(Clone, Debug)]
pub struct TrialNote {
    chroma: Chroma,
    note: u8,
    instrument: String,
    sample: LoadedSample,
}

impl TrialNote {
    pub fn new(chroma: Chroma, note: u8, instrument: &str, sample: LoadedSample) -> TrialNote {
        TrialNote {
            chroma,
            note,
            instrument: instrument.to_string(),
            sample,
        }
    }

    pub fn chroma(&self) -> Chroma {
        self.chroma
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn sample(&self) -> &LoadedSample {
        &self.sample
    }
}

/// One question. The target is the lowest sounding note.
#[derive(Clone, Debug)]
pub struct Trial {
    notes: Vec<TrialNote>,
    target: usize,
}

impl Trial {
    /// Creates a trial from its notes. Returns None if there are no notes.
    pub fn new(notes: Vec<TrialNote>) -> Option<Trial> {
        let target = notes
            .iter()
            .enumerate()
            .min_by_key(|(_, note)| note.note)
            .map(|(index, _)| index)?;
        Some(Trial { notes, target })
    }

    pub fn notes(&self) -> &[TrialNote] {
        &self.notes
    }

    fn target(&self) -> &TrialNote {
        &self.notes[self.target]
    }

    pub fn target_chroma(&self) -> Chroma {
        self.target().chroma
    }

    pub fn target_note(&self) -> u8 {
        self.target().note
    }

    pub fn instrument(&self) -> &str {
        &self.target().instrument
    }
}

/// The settings a selector draws trials under. A new selector is built whenever they change.
#[derive(Clone, Debug)]
pub struct SelectionSettings {
    pub range: NoteRange,
    pub instruments: Vec<Instrument>,
    pub special_exercise: bool,
    pub out_of_set_probability: f64,
    pub max_attempts: usize,
}

/// Picks playable trials for one chroma set and one set of settings.
pub struct TrialSelector {
    chroma_set: ChromaSet,
    settings: SelectionSettings,
    availability: AvailabilityCache,
    rng: Mutex<StdRng>,
}

impl TrialSelector {
    pub fn new(
        chroma_set: ChromaSet,
        settings: SelectionSettings,
        availability: AvailabilityCache,
    ) -> TrialSelector {
        TrialSelector::with_rng(chroma_set, settings, availability, StdRng::from_entropy())
    }

    /// Creates a selector with a deterministic random source.
    pub fn seeded(
        chroma_set: ChromaSet,
        settings: SelectionSettings,
        availability: AvailabilityCache,
        seed: u64,
    ) -> TrialSelector {
        TrialSelector::with_rng(
            chroma_set,
            settings,
            availability,
            StdRng::seed_from_u64(seed),
        )
    }

    fn with_rng(
        chroma_set: ChromaSet,
        settings: SelectionSettings,
        availability: AvailabilityCache,
        rng: StdRng,
    ) -> TrialSelector {
        TrialSelector {
            chroma_set,
            settings,
            availability,
            rng: Mutex::new(rng),
        }
    }

    pub fn chroma_set(&self) -> &ChromaSet {
        &self.chroma_set
    }

    pub fn settings(&self) -> &SelectionSettings {
        &self.settings
    }

    /// True if the special exercise applies to this selector.
    pub fn special_exercise(&self) -> bool {
        self.settings.special_exercise && self.chroma_set.supports_special_exercise()
    }

    /// Selects a playable trial, avoiding `excluded_note` where the chroma has another note
    /// in range. Returns None for an empty chroma set or once the attempt bound is exhausted.
    pub async fn select(&self, excluded_note: Option<u8>) -> Option<Trial> {
        if self.chroma_set.is_empty() {
            return None;
        }

        for attempt in 0..self.settings.max_attempts {
            let chromas = self.pick_chromas();
            if chromas.is_empty() {
                return None;
            }

            let mut notes = Vec::with_capacity(chromas.len());
            for chroma in chromas {
                match self.prepare_note(chroma, excluded_note).await {
                    Some(note) => notes.push(note),
                    None => break,
                }
            }

            if notes.len() == if self.special_exercise() { 2 } else { 1 } {
                return Trial::new(notes);
            }
            debug!(attempt, "No playable trial for this attempt, retrying.");
        }

        warn!(
            chroma_set = self.chroma_set.name(),
            attempts = self.settings.max_attempts,
            "Unable to find a playable trial."
        );
        None
    }

    /// Picks the chroma(s) for one attempt.
    fn pick_chromas(&self) -> Vec<Chroma> {
        let mut rng = self.rng.lock();
        let chromas = self.chroma_set.chromas();

        if self.special_exercise() {
            return chromas.choose_multiple(&mut *rng, 2).copied().collect();
        }

        if let SetKind::Level(_) = self.chroma_set.kind() {
            let complement = self.chroma_set.complement();
            if !complement.is_empty() && rng.gen_bool(self.settings.out_of_set_probability) {
                return complement.choose(&mut *rng).copied().into_iter().collect();
            }
        }

        chromas.choose(&mut *rng).copied().into_iter().collect()
    }

    /// Picks a note for the chroma, avoiding the excluded note when there is an alternative.
    fn pick_note(&self, chroma: Chroma, excluded_note: Option<u8>) -> Option<u8> {
        let notes = self.settings.range.notes_for(chroma);
        let filtered: Vec<u8> = notes
            .iter()
            .copied()
            .filter(|note| Some(*note) != excluded_note)
            .collect();
        let pool = if filtered.is_empty() { notes } else { filtered };
        pool.choose(&mut *self.rng.lock()).copied()
    }

    /// Picks a note and an available instrument and decodes the sample.
    async fn prepare_note(&self, chroma: Chroma, excluded_note: Option<u8>) -> Option<TrialNote> {
        let note = self.pick_note(chroma, excluded_note)?;
        let candidates: Vec<Instrument> = self
            .settings
            .instruments
            .iter()
            .filter(|instrument| instrument.range().contains(note))
            .cloned()
            .collect();

        let available = self.availability.available(&candidates, note).await;
        let instrument = available.choose(&mut *self.rng.lock())?.clone();

        let store = self.availability.store();
        let name = instrument.name().to_string();
        let loaded = tokio::task::spawn_blocking(move || store.load(&name, note)).await;
        match loaded {
            Ok(Ok(sample)) => Some(TrialNote::new(chroma, note, instrument.name(), sample)),
            Ok(Err(e)) => {
                warn!(
                    instrument = instrument.name(),
                    note,
                    err = %e,
                    "Unable to load sample, marking unavailable."
                );
                self.availability.mark_unavailable(instrument.name(), note);
                None
            }
            Err(e) => {
                warn!(err = %e, "Sample load task failed.");
                None
            }
        }
    }
}

impl fmt::Debug for TrialSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrialSelector")
            .field("chroma_set", &self.chroma_set.name())
            .field("range", &self.settings.range)
            .field("special_exercise", &self.special_exercise())
            .finish()
    }
}

/// Builds a shared selector. Used where the caller holds selectors by Arc.
pub fn shared(
    chroma_set: ChromaSet,
    settings: SelectionSettings,
    availability: AvailabilityCache,
    seed: Option<u64>,
) -> Arc<TrialSelector> {
    Arc::new(match seed {
        Some(seed) => TrialSelector::seeded(chroma_set, settings, availability, seed),
        None => TrialSelector::new(chroma_set, settings, availability),
    })
}

#[cfg(test)]
pub(crate) mod test {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;
    use crate::chroma::SetKind;
    use crate::samples::MemoryStore;

    pub fn sample() -> LoadedSample {
        LoadedSample::new(vec![0.1; 64], 1, 44100)
    }

    pub fn settings(instruments: Vec<Instrument>) -> SelectionSettings {
        SelectionSettings {
            range: NoteRange::new(36, 96),
            instruments,
            special_exercise: false,
            out_of_set_probability: 0.5,
            max_attempts: 30,
        }
    }

    pub fn piano() -> Instrument {
        Instrument::new("Piano", NoteRange::new(36, 96))
    }

    pub fn piano_store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new().with_instrument("Piano", 36, 96, &sample()))
    }

    pub fn set(name: &str, indices: &[u8]) -> ChromaSet {
        ChromaSet::new(
            name,
            indices
                .iter()
                .map(|i| Chroma::new(*i).expect("chroma"))
                .collect(),
            name,
            SetKind::Builtin,
        )
        .expect("set")
    }

    #[test]
    fn test_note_range() {
        let range = NoteRange::new(36, 96);
        assert_eq!(NoteRange::new(48, 84), range.reduced());
        assert_eq!(
            vec![36, 48, 60, 72, 84, 96],
            range.notes_for(Chroma::from_note(0))
        );
        assert_eq!(NoteRange::new(60, 60), NoteRange::new(55, 65).reduced());
        assert_eq!(NoteRange::new(40, 50), NoteRange::new(50, 40));
    }

    #[test]
    fn test_trial_target_is_lowest() {
        let trial = Trial::new(vec![
            TrialNote::new(Chroma::from_note(64), 64, "Piano", sample()),
            TrialNote::new(Chroma::from_note(55), 55, "Harp", sample()),
        ])
        .expect("trial");
        assert_eq!(55, trial.target_note());
        assert_eq!(Chroma::from_note(55), trial.target_chroma());
        assert_eq!("Harp", trial.instrument());
        assert!(Trial::new(vec![]).is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_selects_only_set_chromas() {
        let availability = AvailabilityCache::new(piano_store());
        let selector =
            TrialSelector::seeded(set("Thirds", &[0, 4, 8]), settings(vec![piano()]), availability, 7);

        for _ in 0..100 {
            let trial = selector.select(None).await.expect("trial");
            assert!([0, 4, 8].contains(&trial.target_chroma().index()));
            assert!((36..=96).contains(&trial.target_note()));
            assert_eq!("Piano", trial.instrument());
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_excluded_note_is_avoided() {
        let availability = AvailabilityCache::new(piano_store());
        let selector = TrialSelector::seeded(set("C", &[0]), settings(vec![piano()]), availability, 11);

        for _ in 0..100 {
            let trial = selector.select(Some(60)).await.expect("trial");
            assert_ne!(60, trial.target_note());
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_excluded_note_falls_back_when_it_is_the_only_one() {
        let availability = AvailabilityCache::new(piano_store());
        let mut settings = settings(vec![piano()]);
        settings.range = NoteRange::new(55, 65);
        let selector = TrialSelector::seeded(set("C", &[0]), settings, availability, 3);

        let trial = selector.select(Some(60)).await.expect("trial");
        assert_eq!(60, trial.target_note());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_set_yields_none() {
        let store = piano_store();
        let availability = AvailabilityCache::new(store.clone());
        let selector = TrialSelector::seeded(set("Empty", &[]), settings(vec![piano()]), availability, 1);
        assert!(selector.select(None).await.is_none());
        assert_eq!(0, store.probe_count());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_no_samples_yields_none_after_bound() {
        let store = Arc::new(MemoryStore::new());
        let availability = AvailabilityCache::new(store.clone());
        let selector = TrialSelector::seeded(set("C", &[0]), settings(vec![piano()]), availability, 5);

        assert!(selector.select(None).await.is_none());
        // Only six C notes exist in range, and each is probed at most once.
        assert!(store.probe_count() <= 6);
        assert_eq!(0, store.load_count());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_picks_only_available_instruments() {
        let store = Arc::new(
            MemoryStore::new()
                .with_instrument("Flute", 60, 96, &sample())
                .with_failing_probe("Piano", 72),
        );
        let availability = AvailabilityCache::new(store);
        let instruments = vec![piano(), Instrument::new("Flute", NoteRange::new(60, 96))];
        let selector = TrialSelector::seeded(set("C", &[0]), settings(instruments), availability, 9);

        for _ in 0..20 {
            let trial = selector.select(None).await.expect("trial");
            assert_eq!("Flute", trial.instrument());
            assert!(trial.target_note() >= 60);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_broken_sample_is_marked_and_skipped() {
        let store = Arc::new(
            MemoryStore::new()
                .with_broken_sample("Piano", 60)
                .with_sample("Piano", 72, &sample()),
        );
        let availability = AvailabilityCache::new(store);
        let mut settings = settings(vec![piano()]);
        settings.range = NoteRange::new(60, 72);
        let selector = TrialSelector::seeded(set("C", &[0]), settings, availability.clone(), 2);

        for _ in 0..10 {
            let trial = selector.select(None).await.expect("trial");
            assert_eq!(72, trial.target_note());
        }
        assert_eq!(Some(false), availability.cached("Piano", 60));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_special_exercise_plays_two_distinct_chromas() {
        let availability = AvailabilityCache::new(piano_store());
        let mut settings = settings(vec![piano()]);
        settings.special_exercise = true;
        let selector = TrialSelector::seeded(set("Tones", &[0, 2, 4, 6]), settings, availability, 4);
        assert!(selector.special_exercise());

        for _ in 0..50 {
            let trial = selector.select(None).await.expect("trial");
            assert_eq!(2, trial.notes().len());
            assert_ne!(trial.notes()[0].chroma(), trial.notes()[1].chroma());
            let lowest = trial.notes().iter().map(|n| n.note()).min().expect("lowest");
            assert_eq!(lowest, trial.target_note());
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_special_exercise_needs_two_chromas() {
        let availability = AvailabilityCache::new(piano_store());
        let mut settings = settings(vec![piano()]);
        settings.special_exercise = true;
        let selector = TrialSelector::seeded(set("C", &[0]), settings, availability, 4);
        assert!(!selector.special_exercise());
        let trial = selector.select(None).await.expect("trial");
        assert_eq!(1, trial.notes().len());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_level_sets_bias_out_of_set() {
        let availability = AvailabilityCache::new(piano_store());
        let level = ChromaSet::level(2).expect("level");

        let mut always = settings(vec![piano()]);
        always.out_of_set_probability = 1.0;
        let selector = TrialSelector::seeded(level.clone(), always, availability.clone(), 8);
        for _ in 0..30 {
            let trial = selector.select(None).await.expect("trial");
            assert!(!level.contains(trial.target_chroma()));
        }

        let mut never = settings(vec![piano()]);
        never.out_of_set_probability = 0.0;
        let selector = TrialSelector::seeded(level.clone(), never, availability.clone(), 8);
        for _ in 0..30 {
            let trial = selector.select(None).await.expect("trial");
            assert!(level.contains(trial.target_chroma()));
        }

        let selector = TrialSelector::seeded(level.clone(), settings(vec![piano()]), availability, 8);
        let mut seen = HashSet::new();
        for _ in 0..200 {
            let trial = selector.select(None).await.expect("trial");
            seen.insert(level.contains(trial.target_chroma()));
        }
        assert_eq!(2, seen.len());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_builtin_sets_do_not_bias() {
        let availability = AvailabilityCache::new(piano_store());
        let mut biased = settings(vec![piano()]);
        biased.out_of_set_probability = 1.0;
        let tritones = ChromaSet::builtin().remove(0);
        let selector = TrialSelector::seeded(tritones.clone(), biased, availability, 8);
        for _ in 0..30 {
            let trial = selector.select(None).await.expect("trial");
            assert!(tritones.contains(trial.target_chroma()));
        }
    }
}
