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
use crate::chroma::{ChromaSet, LabelStyle};

const DEFAULT_CORRECT_FEEDBACK: Duration = Duration::from_millis(400);
const DEFAULT_INCORRECT_FEEDBACK: Duration = Duration::from_millis(1500);
const DEFAULT_NEXT_TRIAL_DELAY: Duration = Duration::ZERO;
const DEFAULT_FADE: Duration = Duration::from_millis(100);
const DEFAULT_PREFETCH: usize = 10;
const DEFAULT_MAX_ATTEMPTS: usize = 30;
const DEFAULT_OUT_OF_SET_PROBABILITY: f64 = 0.5;
const DEFAULT_RECENT_WINDOW: usize = 1000;

/// A user-defined chroma set.
#[derive(Deserialize, Clone, Debug)]
pub struct CustomSet {
    name: String,
    chromas: Vec<String>,
}

impl CustomSet {
    pub fn new(name: &str, chromas: &[&str]) -> CustomSet {
        CustomSet {
            name: name.to_string(),
            chromas: chromas.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Builds the chroma set, validating the labels.
    pub fn to_chroma_set(&self) -> Result<ChromaSet, ConfigError> {
        Ok(ChromaSet::custom(&self.name, &self.chromas)?)
    }
}

/// A YAML representation of the exercise settings.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Exercise {
    /// Index of the chroma set to start with. Built-in sets come first, then custom sets.
    /// A previously saved selection takes precedence.
    chroma_set: Option<usize>,

    /// Start in level mode at the given level instead of a chroma set.
    level: Option<usize>,

    /// Narrow the note range by an octave on each side.
    reduced_range: Option<bool>,

    /// Play two distinct chromas together; the lowest one is the target.
    special_exercise: Option<bool>,

    /// Shuffle the answer buttons for every trial.
    randomize_buttons: Option<bool>,

    /// How answer labels are shown.
    label_style: Option<LabelStyle>,

    /// How long feedback is shown after a correct answer.
    correct_feedback: Option<String>,

    /// How long feedback is shown after an incorrect answer.
    incorrect_feedback: Option<String>,

    /// Extra delay between the end of feedback and the next trial.
    next_trial_delay: Option<String>,

    /// Duration of the fade applied to trial audio after an answer.
    fade: Option<String>,

    /// Whether trial audio is faded out after an answer at all.
    fade_out: Option<bool>,

    /// Number of prepared trials to keep ahead.
    prefetch: Option<usize>,

    /// Number of selection attempts before giving up on a trial.
    max_attempts: Option<usize>,

    /// Probability of an out-of-set target in level mode.
    out_of_set_probability: Option<f64>,

    /// Number of eligible trials the recent accuracy is computed over.
    recent_window: Option<usize>,

    /// Name of a chroma set whose members are the only acceptable answers.
    answer_set: Option<String>,

    /// User-defined chroma sets.
    custom_sets: Option<Vec<CustomSet>>,
}

impl Exercise {
    pub fn chroma_set(&self) -> usize {
        self.chroma_set.unwrap_or(0)
    }

    pub fn level(&self) -> Option<usize> {
        self.level
    }

    pub fn reduced_range(&self) -> bool {
        self.reduced_range.unwrap_or(false)
    }

    pub fn special_exercise(&self) -> bool {
        self.special_exercise.unwrap_or(false)
    }

    pub fn randomize_buttons(&self) -> bool {
        self.randomize_buttons.unwrap_or(false)
    }

    pub fn label_style(&self) -> LabelStyle {
        self.label_style.unwrap_or_default()
    }

    pub fn correct_feedback(&self) -> Result<Duration, ConfigError> {
        parse_duration(
            "correct_feedback",
            &self.correct_feedback,
            DEFAULT_CORRECT_FEEDBACK,
        )
    }

    pub fn incorrect_feedback(&self) -> Result<Duration, ConfigError> {
        parse_duration(
            "incorrect_feedback",
            &self.incorrect_feedback,
            DEFAULT_INCORRECT_FEEDBACK,
        )
    }

    pub fn next_trial_delay(&self) -> Result<Duration, ConfigError> {
        parse_duration(
            "next_trial_delay",
            &self.next_trial_delay,
            DEFAULT_NEXT_TRIAL_DELAY,
        )
    }

    pub fn fade(&self) -> Result<Duration, ConfigError> {
        parse_duration("fade", &self.fade, DEFAULT_FADE)
    }

    pub fn fade_out(&self) -> bool {
        self.fade_out.unwrap_or(true)
    }

    pub fn prefetch(&self) -> usize {
        self.prefetch.unwrap_or(DEFAULT_PREFETCH).max(1)
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).max(1)
    }

    pub fn out_of_set_probability(&self) -> Result<f64, ConfigError> {
        let probability = self
            .out_of_set_probability
            .unwrap_or(DEFAULT_OUT_OF_SET_PROBABILITY);
        if !(0.0..=1.0).contains(&probability) {
            return Err(ConfigError::Value {
                field: "out_of_set_probability",
                message: format!("{} is not between 0 and 1", probability),
            });
        }
        Ok(probability)
    }

    pub fn recent_window(&self) -> usize {
        self.recent_window.unwrap_or(DEFAULT_RECENT_WINDOW).max(1)
    }

    pub fn answer_set(&self) -> Option<&str> {
        self.answer_set.as_deref()
    }

    /// The custom sets, validated.
    pub fn custom_sets(&self) -> Result<Vec<ChromaSet>, ConfigError> {
        self.custom_sets
            .iter()
            .flatten()
            .map(|set| set.to_chroma_set())
            .collect()
    }

    /// The menu of selectable sets: built-in sets followed by custom sets.
    pub fn chroma_sets(&self) -> Result<Vec<ChromaSet>, ConfigError> {
        let mut sets = ChromaSet::builtin();
        sets.extend(self.custom_sets()?);
        Ok(sets)
    }
}
