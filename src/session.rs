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
//! The answer and scoring loop.
//!
//! A session owns everything a running exercise needs: the active trial, the prefetch
//! queue, the playback engine, the drone lane, the trial log and the feedback timers.
//! Phases move `Idle -> Starting -> AwaitingGuess -> Answered -> Starting ...` and only
//! `AwaitingGuess` accepts answers. Any configuration change returns the session to
//! `Idle` and invalidates whatever was in flight.

use std::{
    fmt,
    sync::{Arc, Weak},
    time::Duration,
};

use midly::{live::LiveEvent, MidiMessage};
use parking_lot::Mutex;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, span, warn, Instrument as _, Level};

use crate::audio::AudioMixer;
use crate::chroma::{Chroma, ChromaError, ChromaSet, LabelStyle, SetKind};
use crate::config::{self, ConfigError};
use crate::playback::{DroneLane, DroneSettings, PlaybackEngine};
use crate::prefetch::PrefetchQueue;
use crate::samples::{AvailabilityCache, SampleStore};
use crate::selector::{self, Instrument, NoteRange, SelectionSettings, Trial, TrialSelector};
use crate::stats::StatsSummary;
use crate::storage::LocalStorage;
use crate::triallog::{self, TrialLog, TrialOutcome, LAST_CHROMA_SET_KEY};

pub use crate::triallog::AUTO_ANSWER_SET;

/// The label of the OUT answer.
pub const OUT_LABEL: &str = "OUT";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("there is no chroma set with index {0}")]
    UnknownChromaSet(usize),
    #[error("there is no chroma set named {0} to use as an answer set")]
    UnknownAnswerSet(String),
    #[error(transparent)]
    Chroma(#[from] ChromaError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Starting,
    AwaitingGuess,
    Answered,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            Phase::Idle => "idle",
            Phase::Starting => "starting",
            Phase::AwaitingGuess => "awaiting guess",
            Phase::Answered => "answered",
        };
        write!(f, "{}", phase)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Answer {
    Chroma(Chroma),
    /// The note heard is not in the chroma set. Level sets only.
    Out,
}

/// The result of the last answer, shown until the feedback timer clears it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Feedback {
    pub correct: bool,
    pub chosen: String,
    pub target: String,
}

/// Everything a front end needs to render the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionStatus {
    pub phase: Phase,
    pub chroma_set: String,
    pub buttons: Vec<String>,
    pub can_replay: bool,
    pub feedback: Option<Feedback>,
    pub reduced_range: bool,
    pub special_exercise: bool,
    pub answer_set: Option<String>,
    pub stats: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum TimerKind {
    FeedbackReset,
    NextTrial,
    Fade,
}

/// Session settings, resolved from configuration.
#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub chroma_sets: Vec<ChromaSet>,
    pub chroma_set: usize,
    pub level: Option<usize>,
    pub range: NoteRange,
    pub instruments: Vec<Instrument>,
    pub reduced_range: bool,
    pub special_exercise: bool,
    pub randomize_buttons: bool,
    pub label_style: LabelStyle,
    pub answer_set: Option<String>,
    pub correct_feedback: Duration,
    pub incorrect_feedback: Duration,
    pub next_trial_delay: Duration,
    pub fade: Duration,
    pub fade_out: bool,
    pub prefetch: usize,
    pub max_attempts: usize,
    pub out_of_set_probability: f64,
    pub recent_window: usize,
    pub drones: Option<DroneSettings>,
    /// Seeds trial selection and button shuffling. Random when unset.
    pub seed: Option<u64>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            chroma_sets: ChromaSet::builtin(),
            chroma_set: 0,
            level: None,
            range: NoteRange::new(36, 96),
            instruments: config::instrument::instruments(None),
            reduced_range: false,
            special_exercise: false,
            randomize_buttons: false,
            label_style: LabelStyle::Standard,
            answer_set: None,
            correct_feedback: Duration::from_millis(400),
            incorrect_feedback: Duration::from_millis(1500),
            next_trial_delay: Duration::ZERO,
            fade: Duration::from_millis(100),
            fade_out: true,
            prefetch: 10,
            max_attempts: 30,
            out_of_set_probability: 0.5,
            recent_window: 1000,
            drones: None,
            seed: None,
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &config::Trainer) -> Result<SessionSettings, ConfigError> {
        let exercise = config.exercise();
        let drones = config.drones();
        Ok(SessionSettings {
            chroma_sets: exercise.chroma_sets()?,
            chroma_set: exercise.chroma_set(),
            level: exercise.level(),
            range: config.note_range(),
            instruments: config.instruments(),
            reduced_range: exercise.reduced_range(),
            special_exercise: exercise.special_exercise(),
            randomize_buttons: exercise.randomize_buttons(),
            label_style: exercise.label_style(),
            answer_set: exercise.answer_set().map(str::to_string),
            correct_feedback: exercise.correct_feedback()?,
            incorrect_feedback: exercise.incorrect_feedback()?,
            next_trial_delay: exercise.next_trial_delay()?,
            fade: exercise.fade()?,
            fade_out: exercise.fade_out(),
            prefetch: exercise.prefetch(),
            max_attempts: exercise.max_attempts(),
            out_of_set_probability: exercise.out_of_set_probability()?,
            recent_window: exercise.recent_window(),
            drones: if drones.enabled() {
                Some(DroneSettings::from_config(drones)?)
            } else {
                None
            },
            seed: None,
        })
    }
}

struct SessionState {
    phase: Phase,
    generation: u64,
    drone_generation: u64,
    chroma_set: ChromaSet,
    reduced_range: bool,
    special_exercise: bool,
    answer_set: Option<String>,
    active: Option<Trial>,
    buttons: Vec<String>,
    feedback: Option<Feedback>,
    rng: StdRng,
}

pub struct Session {
    settings: SessionSettings,
    availability: AvailabilityCache,
    storage: LocalStorage,
    engine: PlaybackEngine,
    drone: Option<DroneLane>,
    queue: PrefetchQueue,
    log: Mutex<TrialLog>,
    state: Mutex<SessionState>,
    timers: crate::scheduler::Scheduler<TimerKind>,
    status_tx: watch::Sender<SessionStatus>,
    weak: Weak<Session>,
}

impl Session {
    /// Creates a session. Must be called from within a tokio runtime when drones are on.
    pub fn new(
        settings: SessionSettings,
        store: Arc<dyn SampleStore>,
        mixer: AudioMixer,
        storage: LocalStorage,
    ) -> Result<Arc<Session>, SessionError> {
        let chroma_set = initial_chroma_set(&settings, &storage)?;
        let special_exercise =
            settings.special_exercise && chroma_set.supports_special_exercise();
        let availability = AvailabilityCache::new(store);
        let log = TrialLog::load(storage.clone());
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut state = SessionState {
            phase: Phase::Idle,
            generation: 0,
            drone_generation: 0,
            chroma_set,
            reduced_range: settings.reduced_range,
            special_exercise,
            answer_set: settings.answer_set.clone(),
            active: None,
            buttons: Vec::new(),
            feedback: None,
            rng,
        };
        if let Some(answer_set) = &state.answer_set {
            if answer_set != AUTO_ANSWER_SET && find_set(&settings, answer_set).is_none() {
                return Err(SessionError::UnknownAnswerSet(answer_set.clone()));
            }
        }
        state.buttons = buttons(&settings, &mut state, false);

        let selector = build_selector(&settings, &availability, &state);
        let queue = PrefetchQueue::new(selector, settings.prefetch);
        let drone = settings
            .drones
            .map(|drone_settings| DroneLane::new(mixer.clone(), drone_settings));
        let (status_tx, _) = watch::channel(SessionStatus {
            phase: Phase::Idle,
            chroma_set: state.chroma_set.label(),
            buttons: state.buttons.clone(),
            can_replay: false,
            feedback: None,
            reduced_range: state.reduced_range,
            special_exercise: state.special_exercise,
            answer_set: state.answer_set.clone(),
            stats: Vec::new(),
        });

        let session = Arc::new_cyclic(|weak| Session {
            engine: PlaybackEngine::new(mixer),
            settings,
            availability,
            storage,
            drone,
            queue,
            log: Mutex::new(log),
            state: Mutex::new(state),
            timers: crate::scheduler::Scheduler::new(),
            status_tx,
            weak: weak.clone(),
        });

        info!(
            chroma_set = session.state.lock().chroma_set.label(),
            "Session created."
        );
        session.restart_drone();
        session.queue.ensure_filled();
        session.publish();
        Ok(session)
    }

    /// Starts the first trial. Ignored unless the session is idle.
    pub async fn start(&self) {
        let Some(generation) = self.begin_trial(Phase::Idle, None) else {
            debug!("Start ignored, session is not idle.");
            return;
        };
        self.start_trial(generation).await;
    }

    /// Moves to `Starting` if the session is still in `from` and, when given, still on the
    /// expected generation. Returns the generation the new trial belongs to.
    fn begin_trial(&self, from: Phase, expected: Option<u64>) -> Option<u64> {
        let generation = {
            let mut state = self.state.lock();
            if state.phase != from || expected.is_some_and(|g| g != state.generation) {
                return None;
            }
            state.phase = Phase::Starting;
            state.active = None;
            state.feedback = None;
            state.generation
        };
        self.publish();
        Some(generation)
    }

    async fn start_trial(&self, generation: u64) {
        let span = span!(Level::INFO, "start trial", generation);
        self.run_trial(generation).instrument(span).await
    }

    async fn run_trial(&self, generation: u64) {
        self.timers.cancel(TimerKind::NextTrial);
        let trial = self.queue.take().await;

        {
            let mut state = self.state.lock();
            if state.generation != generation {
                debug!("Configuration changed while starting, discarding trial.");
                return;
            }

            match trial {
                None => {
                    warn!(
                        chroma_set = state.chroma_set.name(),
                        "No playable trial, returning to idle."
                    );
                    state.phase = Phase::Idle;
                    let selector = build_selector(&self.settings, &self.availability, &state);
                    drop(state);
                    self.queue.clear(selector);
                    self.publish();
                    return;
                }
                Some(trial) => {
                    info!(
                        chroma = %trial.target_chroma(),
                        note = trial.target_note(),
                        instrument = Trial::instrument(&trial),
                        "Trial started."
                    );
                    state.phase = Phase::AwaitingGuess;
                    if self.settings.randomize_buttons {
                        state.buttons = buttons(&self.settings, &mut state, true);
                    }
                    self.engine.play(&trial);
                    state.active = Some(trial);
                }
            }
        }

        self.publish();
        self.queue.ensure_filled();
    }

    /// Parses an answer label in either label style, or "out".
    pub fn submit_label(&self, input: &str) -> bool {
        let input = input.trim();
        if input.eq_ignore_ascii_case(OUT_LABEL) {
            return self.submit_answer(Answer::Out);
        }
        match Chroma::parse_styled(input, self.settings.label_style) {
            Ok(chroma) => self.submit_answer(Answer::Chroma(chroma)),
            Err(e) => {
                debug!(input, err = %e, "Ignoring unrecognized answer.");
                false
            }
        }
    }

    /// Judges an answer for the active trial. Returns false if the answer was ignored.
    pub fn submit_answer(&self, answer: Answer) -> bool {
        let (outcome, generation) = {
            let mut state = self.state.lock();
            if state.phase != Phase::AwaitingGuess {
                debug!(answer = ?answer, phase = %state.phase, "Answer ignored.");
                return false;
            }
            let Some(trial) = state.active.as_ref() else {
                return false;
            };
            let target = trial.target_chroma();

            let correct = match answer {
                Answer::Chroma(chroma) => {
                    if let Some(allowed) = answer_chromas(&self.settings, &state) {
                        if !allowed.contains(&chroma) {
                            debug!(chroma = %chroma, "Answer outside the answer set ignored.");
                            return false;
                        }
                    }
                    chroma == target
                }
                Answer::Out => {
                    if !state.chroma_set.allows_out() {
                        debug!("OUT is not offered for this set.");
                        return false;
                    }
                    !state.chroma_set.contains(target)
                }
            };
            let chosen = match answer {
                Answer::Chroma(chroma) => chroma.label().to_string(),
                Answer::Out => OUT_LABEL.to_string(),
            };

            let outcome = TrialOutcome {
                chroma_set_label: state.chroma_set.label(),
                target_chroma_label: target.label().to_string(),
                midi_note: trial.target_note(),
                instrument: trial.instrument().to_string(),
                user_selected_chroma: chosen.clone(),
                exercise_type: state.chroma_set.exercise_type().to_string(),
                reduced_range_enabled: state.reduced_range,
                special_exercise_enabled: state.special_exercise,
                answer_set: state.answer_set.clone(),
                is_correct: correct,
            };

            state.phase = Phase::Answered;
            state.feedback = Some(Feedback {
                correct,
                chosen,
                target: target.label().to_string(),
            });
            (outcome, state.generation)
        };

        let correct = outcome.is_correct;
        let (entry, write) = self.log.lock().record(outcome);
        if let Some(write) = write {
            tokio::task::spawn_blocking(move || write.write());
        }
        info!(trial = entry.trial_number, correct, "Answer recorded.");

        let feedback = if correct {
            self.settings.correct_feedback
        } else {
            self.settings.incorrect_feedback
        };

        if self.settings.fade_out {
            let fade = self.settings.fade;
            let weak = self.weak.clone();
            self.timers
                .arm(TimerKind::Fade, feedback.saturating_sub(fade), async move {
                    if let Some(session) = weak.upgrade() {
                        session.engine.fade_out(fade);
                    }
                });
        }

        self.queue.ensure_filled();

        let weak = self.weak.clone();
        self.timers
            .arm(TimerKind::FeedbackReset, feedback, async move {
                if let Some(session) = weak.upgrade() {
                    session.state.lock().feedback = None;
                    session.publish();
                }
            });

        let weak = self.weak.clone();
        self.timers.arm(
            TimerKind::NextTrial,
            feedback + self.settings.next_trial_delay,
            async move {
                let Some(session) = weak.upgrade() else {
                    return;
                };
                if let Some(generation) = session.begin_trial(Phase::Answered, Some(generation)) {
                    session.start_trial(generation).await;
                }
            },
        );

        self.publish();
        true
    }

    /// Treats a MIDI note-on as an answer for the note's chroma.
    pub fn submit_midi(&self, raw: &[u8]) -> bool {
        match LiveEvent::parse(raw) {
            Ok(LiveEvent::Midi {
                message: MidiMessage::NoteOn { key, vel },
                ..
            }) if vel.as_int() > 0 => {
                self.submit_answer(Answer::Chroma(Chroma::from_note(key.as_int())))
            }
            Ok(_) => false,
            Err(e) => {
                debug!(err = ?e, "Ignoring unparseable MIDI event.");
                false
            }
        }
    }

    /// Plays the active trial again. Only while awaiting a guess.
    pub fn replay(&self) -> bool {
        if self.state.lock().phase != Phase::AwaitingGuess {
            return false;
        }
        self.engine.replay();
        true
    }

    /// Switches to a configured chroma set and remembers the choice.
    pub fn select_chroma_set(&self, index: usize) -> Result<(), SessionError> {
        let chroma_set = self
            .settings
            .chroma_sets
            .get(index)
            .cloned()
            .ok_or(SessionError::UnknownChromaSet(index))?;
        if let Err(e) = self.storage.set(LAST_CHROMA_SET_KEY, &index) {
            warn!(err = %e, "Unable to save chroma set selection.");
        }
        self.reconfigure(|state| state.chroma_set = chroma_set);
        Ok(())
    }

    /// Switches to an ad hoc custom set.
    pub fn set_custom_chroma_set(&self, name: &str, labels: &[String]) -> Result<(), SessionError> {
        let chroma_set = ChromaSet::custom(name, labels)?;
        self.reconfigure(|state| state.chroma_set = chroma_set);
        Ok(())
    }

    /// Switches to the set for the given level.
    pub fn set_level(&self, level: usize) -> Result<(), SessionError> {
        let chroma_set = ChromaSet::level(level)?;
        self.reconfigure(|state| state.chroma_set = chroma_set);
        Ok(())
    }

    pub fn set_reduced_range(&self, enabled: bool) {
        self.reconfigure(|state| state.reduced_range = enabled);
    }

    /// Enables the two-note exercise. Has no effect for sets with fewer than two chromas.
    pub fn set_special_exercise(&self, enabled: bool) {
        self.reconfigure(|state| state.special_exercise = enabled);
    }

    /// Restricts answers to the named set, "Auto" for the active set, or nothing.
    pub fn set_answer_set(&self, answer_set: Option<&str>) -> Result<(), SessionError> {
        if let Some(name) = answer_set {
            if name != AUTO_ANSWER_SET && find_set(&self.settings, name).is_none() {
                return Err(SessionError::UnknownAnswerSet(name.to_string()));
            }
        }
        let answer_set = answer_set.map(str::to_string);
        self.reconfigure(|state| state.answer_set = answer_set);
        Ok(())
    }

    fn reconfigure<F>(&self, change: F)
    where
        F: FnOnce(&mut SessionState),
    {
        self.timers.cancel_all();
        self.engine.stop();

        let selector = {
            let mut state = self.state.lock();
            let previous_set = state.chroma_set.clone();
            change(&mut state);
            if !state.chroma_set.supports_special_exercise() {
                state.special_exercise = false;
            }
            state.generation += 1;
            state.phase = Phase::Idle;
            state.active = None;
            state.feedback = None;
            state.buttons = buttons(&self.settings, &mut state, false);
            info!(
                chroma_set = state.chroma_set.label(),
                reduced_range = state.reduced_range,
                special_exercise = state.special_exercise,
                "Session reconfigured."
            );
            if previous_set != state.chroma_set {
                drop(state);
                self.restart_drone();
                state = self.state.lock();
            }
            build_selector(&self.settings, &self.availability, &state)
        };

        self.queue.clear(selector);
        self.queue.ensure_filled();
        self.publish();
    }

    /// Stops the current trial and returns to idle.
    pub fn stop(&self) {
        self.timers.cancel_all();
        self.engine.stop();
        {
            let mut state = self.state.lock();
            state.generation += 1;
            state.phase = Phase::Idle;
            state.active = None;
            state.feedback = None;
        }
        info!("Session stopped.");
        self.publish();
    }

    /// Stops everything, including the drone.
    pub fn shutdown(&self) {
        self.stop();
        self.state.lock().drone_generation += 1;
        if let Some(drone) = &self.drone {
            drone.stop();
        }
    }

    /// Restarts the drone on the first chroma of the active set.
    fn restart_drone(&self) {
        let Some(drone) = &self.drone else {
            return;
        };
        drone.stop();

        let (chroma, generation) = {
            let mut state = self.state.lock();
            state.drone_generation += 1;
            (
                state.chroma_set.chromas().first().copied(),
                state.drone_generation,
            )
        };
        let Some(chroma) = chroma else {
            return;
        };

        let store = self.availability.store();
        let weak = self.weak.clone();
        tokio::spawn(async move {
            let loaded = tokio::task::spawn_blocking(move || store.load_drone(chroma)).await;
            let Some(session) = weak.upgrade() else {
                return;
            };
            if session.state.lock().drone_generation != generation {
                return;
            }
            match loaded {
                Ok(Ok(sample)) => {
                    if let Some(drone) = &session.drone {
                        drone.start(chroma, sample);
                    }
                }
                Ok(Err(e)) => warn!(chroma = %chroma, err = %e, "Unable to load drone."),
                Err(e) => warn!(err = %e, "Drone load task failed."),
            }
        });
    }

    pub fn status(&self) -> SessionStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// Stats for the active set's exercise type.
    pub fn stats(&self) -> StatsSummary {
        let exercise_type = self.state.lock().chroma_set.exercise_type().to_string();
        let log = self.log.lock();
        StatsSummary::compute(
            log.entries(),
            &exercise_type,
            &triallog::today(),
            self.settings.recent_window,
        )
    }

    fn publish(&self) {
        let stats = self.stats().lines();
        let status = {
            let state = self.state.lock();
            SessionStatus {
                phase: state.phase,
                chroma_set: state.chroma_set.label(),
                buttons: state.buttons.clone(),
                can_replay: state.phase == Phase::AwaitingGuess,
                feedback: state.feedback.clone(),
                reduced_range: state.reduced_range,
                special_exercise: state.special_exercise,
                answer_set: state.answer_set.clone(),
                stats,
            }
        };
        self.status_tx.send_replace(status);
    }

    #[cfg(test)]
    fn current_target(&self) -> Option<Chroma> {
        self.state
            .lock()
            .active
            .as_ref()
            .map(|trial| trial.target_chroma())
    }

    #[cfg(test)]
    fn chroma_set(&self) -> ChromaSet {
        self.state.lock().chroma_set.clone()
    }

    #[cfg(test)]
    fn entries(&self) -> Vec<triallog::TrialLogEntry> {
        self.log.lock().entries().to_vec()
    }
}

fn find_set<'a>(settings: &'a SessionSettings, name: &str) -> Option<&'a ChromaSet> {
    settings.chroma_sets.iter().find(|set| set.name() == name)
}

/// The set the session opens with: the configured level, else the saved selection, else
/// the configured index.
fn initial_chroma_set(
    settings: &SessionSettings,
    storage: &LocalStorage,
) -> Result<ChromaSet, SessionError> {
    if let Some(level) = settings.level {
        return Ok(ChromaSet::level(level)?);
    }

    let saved = match storage.get::<usize>(LAST_CHROMA_SET_KEY) {
        Ok(saved) => saved,
        Err(e) => {
            debug!(err = %e, "Ignoring saved chroma set.");
            None
        }
    };
    saved
        .and_then(|index| settings.chroma_sets.get(index))
        .or_else(|| settings.chroma_sets.get(settings.chroma_set))
        .cloned()
        .ok_or(SessionError::UnknownChromaSet(settings.chroma_set))
}

/// The chromas that are acceptable answers, when restricted. Level sets offer only their
/// own chromas unless an answer set says otherwise.
fn answer_chromas(settings: &SessionSettings, state: &SessionState) -> Option<Vec<Chroma>> {
    match state.answer_set.as_deref() {
        Some(AUTO_ANSWER_SET) => Some(state.chroma_set.chromas().to_vec()),
        // Validated on the way in; an unknown name would not restrict anything.
        Some(name) => find_set(settings, name).map(|set| set.chromas().to_vec()),
        None if matches!(state.chroma_set.kind(), SetKind::Level(_)) => {
            Some(state.chroma_set.chromas().to_vec())
        }
        None => None,
    }
}

/// The answer button labels in display order.
fn buttons(settings: &SessionSettings, state: &mut SessionState, shuffle: bool) -> Vec<String> {
    let mut chromas =
        answer_chromas(settings, state).unwrap_or_else(|| Chroma::all().collect());
    if shuffle {
        chromas.shuffle(&mut state.rng);
    }

    let mut labels: Vec<String> = chromas
        .into_iter()
        .map(|chroma| chroma.display(settings.label_style).to_string())
        .collect();
    if state.chroma_set.allows_out() {
        labels.push(OUT_LABEL.to_string());
    }
    labels
}

fn build_selector(
    settings: &SessionSettings,
    availability: &AvailabilityCache,
    state: &SessionState,
) -> Arc<TrialSelector> {
    let range = if state.reduced_range {
        settings.range.reduced()
    } else {
        settings.range
    };
    selector::shared(
        state.chroma_set.clone(),
        SelectionSettings {
            range,
            instruments: settings.instruments.clone(),
            special_exercise: state.special_exercise,
            out_of_set_probability: settings.out_of_set_probability,
            max_attempts: settings.max_attempts,
        },
        availability.clone(),
        settings.seed.map(|seed| seed.wrapping_add(state.generation)),
    )
}
