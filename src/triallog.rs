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
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::storage::LocalStorage;

/// The storage key of the trial log.
pub const TRIAL_LOG_KEY: &str = "ppt-trial-log";

/// The storage key of the last selected chroma set.
pub const LAST_CHROMA_SET_KEY: &str = "ppt-last-chroma-set";

/// The answer set value that restricts answers to the active chroma set. Entries recorded
/// with it still count towards accuracy.
pub const AUTO_ANSWER_SET: &str = "Auto";

const DATE_FORMAT: &str = "%d/%m/%Y";

/// Formats a date the way trial dates are stored.
pub fn format_trial_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Today's date in the local timezone, formatted as a trial date.
pub fn today() -> String {
    format_trial_date(Local::now().date_naive())
}

/// One answered trial. Field names match the records written by earlier versions.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrialLogEntry {
    pub chroma_set_label: String,
    pub target_chroma_label: String,
    pub midi_note: u8,
    pub instrument: String,
    pub user_selected_chroma: String,
    pub exercise_type: String,
    pub reduced_range_enabled: bool,
    pub special_exercise_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_set: Option<String>,
    pub is_correct: bool,
    pub trial_number: u64,
    pub trial_date: String,
}

/// What the session knows about an answered trial. Numbering and dating happen on record.
#[derive(Clone, Debug, Default)]
pub struct TrialOutcome {
    pub chroma_set_label: String,
    pub target_chroma_label: String,
    pub midi_note: u8,
    pub instrument: String,
    pub user_selected_chroma: String,
    pub exercise_type: String,
    pub reduced_range_enabled: bool,
    pub special_exercise_enabled: bool,
    pub answer_set: Option<String>,
    pub is_correct: bool,
}

/// The append-only log of answered trials.
pub struct TrialLog {
    storage: LocalStorage,
    entries: Vec<TrialLogEntry>,
    next_trial_number: u64,
    last_written: Arc<Mutex<u64>>,
}

/// A snapshot of the log waiting to be persisted. Writing blocks on the filesystem, so
/// callers on the runtime hand it to `spawn_blocking`.
pub struct LogWrite {
    storage: LocalStorage,
    contents: String,
    trial_number: u64,
    last_written: Arc<Mutex<u64>>,
}

impl LogWrite {
    /// Writes the snapshot unless a newer one has already landed. Failures are logged and
    /// otherwise ignored.
    pub fn write(self) {
        let mut last_written = self.last_written.lock();
        if *last_written >= self.trial_number {
            debug!(trial = self.trial_number, "Skipping stale trial log write.");
            return;
        }
        match self.storage.set_raw(TRIAL_LOG_KEY, &self.contents) {
            Ok(()) => *last_written = self.trial_number,
            Err(e) => warn!(err = %e, "Unable to persist trial log."),
        }
    }
}

impl TrialLog {
    /// Loads the log from storage. Anything unreadable starts a fresh log.
    pub fn load(storage: LocalStorage) -> TrialLog {
        let entries = match storage.get::<serde_json::Value>(TRIAL_LOG_KEY) {
            Ok(Some(serde_json::Value::Array(values))) => values
                .into_iter()
                .filter(|value| value.is_object())
                .filter_map(|value| serde_json::from_value::<TrialLogEntry>(value).ok())
                .collect(),
            Ok(Some(_)) => {
                debug!("Stored trial log is not a list, ignoring it.");
                Vec::new()
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(err = %e, "Unable to read trial log, starting a new one.");
                Vec::new()
            }
        };

        let next_trial_number = entries
            .iter()
            .map(|entry| entry.trial_number)
            .max()
            .unwrap_or(0)
            + 1;
        info!(
            entries = entries.len(),
            next_trial_number, "Loaded trial log."
        );

        TrialLog {
            storage,
            entries,
            next_trial_number,
            last_written: Arc::new(Mutex::new(0)),
        }
    }

    /// Appends the outcome as a new numbered entry. The returned write persists the log
    /// as of this entry.
    pub fn record(&mut self, outcome: TrialOutcome) -> (TrialLogEntry, Option<LogWrite>) {
        self.record_on(outcome, today())
    }

    fn record_on(
        &mut self,
        outcome: TrialOutcome,
        trial_date: String,
    ) -> (TrialLogEntry, Option<LogWrite>) {
        let entry = TrialLogEntry {
            chroma_set_label: outcome.chroma_set_label,
            target_chroma_label: outcome.target_chroma_label,
            midi_note: outcome.midi_note,
            instrument: outcome.instrument,
            user_selected_chroma: outcome.user_selected_chroma,
            exercise_type: outcome.exercise_type,
            reduced_range_enabled: outcome.reduced_range_enabled,
            special_exercise_enabled: outcome.special_exercise_enabled,
            answer_set: outcome.answer_set,
            is_correct: outcome.is_correct,
            trial_number: self.next_trial_number,
            trial_date,
        };
        self.next_trial_number += 1;
        self.entries.push(entry.clone());

        let write = match serde_json::to_string(&self.entries) {
            Ok(contents) => Some(LogWrite {
                storage: self.storage.clone(),
                contents,
                trial_number: entry.trial_number,
                last_written: self.last_written.clone(),
            }),
            Err(e) => {
                warn!(err = %e, "Unable to serialize trial log.");
                None
            }
        };
        (entry, write)
    }

    pub fn entries(&self) -> &[TrialLogEntry] {
        &self.entries
    }

    pub fn next_trial_number(&self) -> u64 {
        self.next_trial_number
    }
}
