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
//! Accuracy figures over the trial log.

use std::fmt;

use crate::triallog::{TrialLogEntry, AUTO_ANSWER_SET};

/// Exercise types recognized from a set label when an entry has no explicit type.
const KNOWN_EXERCISE_TYPES: [&str; 6] = [
    "Tritones",
    "Thirds",
    "Minor thirds",
    "Tones",
    "Special tones",
    "Chromatic",
];

/// True if the entry counts towards accuracy.
pub fn is_eligible(entry: &TrialLogEntry) -> bool {
    match entry.answer_set.as_deref() {
        None => true,
        Some(answer_set) => answer_set == AUTO_ANSWER_SET,
    }
}

/// Percentage of correct answers among eligible entries, rounded. None when no entry is
/// eligible.
pub fn accuracy<'a, I>(entries: I) -> Option<u32>
where
    I: IntoIterator<Item = &'a TrialLogEntry>,
{
    let (eligible, correct) = entries
        .into_iter()
        .filter(|entry| is_eligible(entry))
        .fold((0usize, 0usize), |(eligible, correct), entry| {
            (eligible + 1, correct + usize::from(entry.is_correct))
        });
    if eligible == 0 {
        return None;
    }
    Some((correct as f64 / eligible as f64 * 100.0).round() as u32)
}

/// Accuracy over the last `window` eligible entries. None until that many exist.
pub fn recent_accuracy(entries: &[TrialLogEntry], window: usize) -> Option<u32> {
    let eligible: Vec<&TrialLogEntry> = entries.iter().filter(|e| is_eligible(e)).collect();
    if window == 0 || eligible.len() < window {
        return None;
    }
    accuracy(eligible[eligible.len() - window..].iter().copied())
}

/// The exercise type implied by a set label such as "Minor thirds 2: C, E♭, F♯, A".
pub fn exercise_type_from_label(label: &str) -> &'static str {
    let label = label.trim();
    KNOWN_EXERCISE_TYPES
        .iter()
        .find(|exercise_type| label.starts_with(*exercise_type))
        .copied()
        .unwrap_or("")
}

/// Trims the type and capitalizes "custom".
pub fn normalize_exercise_type(exercise_type: &str) -> String {
    let trimmed = exercise_type.trim();
    if trimmed.eq_ignore_ascii_case("custom") {
        "Custom".to_string()
    } else {
        trimmed.to_string()
    }
}

/// The normalized exercise type of an entry.
pub fn entry_exercise_type(entry: &TrialLogEntry) -> String {
    let explicit = normalize_exercise_type(&entry.exercise_type);
    if !explicit.is_empty() {
        return explicit;
    }
    normalize_exercise_type(exercise_type_from_label(&entry.chroma_set_label))
}

/// Figures for one exercise type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExerciseStats {
    pub exercise_type: String,
    pub total_trials: usize,
    pub overall_accuracy: Option<u32>,
    pub recent_accuracy: Option<u32>,
    pub recent_window: usize,
}

/// Overview figures, plus the current exercise type's when one is selected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatsSummary {
    pub total_trials: usize,
    pub trials_today: usize,
    pub exercise: Option<ExerciseStats>,
}

impl StatsSummary {
    /// Computes the summary. `today` is a formatted trial date.
    pub fn compute(
        entries: &[TrialLogEntry],
        exercise_type: &str,
        today: &str,
        recent_window: usize,
    ) -> StatsSummary {
        let trials_today = entries.iter().filter(|e| e.trial_date == today).count();

        let exercise_type = normalize_exercise_type(exercise_type);
        let exercise = (!exercise_type.is_empty()).then(|| {
            let matching: Vec<TrialLogEntry> = entries
                .iter()
                .filter(|entry| entry_exercise_type(entry) == exercise_type)
                .cloned()
                .collect();
            ExerciseStats {
                total_trials: matching.len(),
                overall_accuracy: accuracy(&matching),
                recent_accuracy: recent_accuracy(&matching, recent_window),
                recent_window,
                exercise_type,
            }
        });

        StatsSummary {
            total_trials: entries.len(),
            trials_today,
            exercise,
        }
    }

    /// The summary as display lines.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Total trials: {}", self.total_trials),
            format!("Total trials today: {}", self.trials_today),
        ];
        match &self.exercise {
            Some(exercise) => {
                lines.push(format!("{}:", exercise.exercise_type));
                lines.push(format!("  Total trials: {}", exercise.total_trials));
                lines.push(format!(
                    "  Overall accuracy: {}",
                    percentage(exercise.overall_accuracy)
                ));
                lines.push(format!(
                    "  Last {} trials accuracy: {}",
                    exercise.recent_window,
                    percentage(exercise.recent_accuracy)
                ));
            }
            None => lines.push("Select a chroma set to view stats.".to_string()),
        }
        lines
    }
}

fn percentage(value: Option<u32>) -> String {
    match value {
        Some(value) => format!("{}%", value),
        None => "-".to_string(),
    }
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lines().join("\n"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn entry(correct: bool) -> TrialLogEntry {
        TrialLogEntry {
            chroma_set_label: "Thirds 1: C, E, A♭".to_string(),
            exercise_type: "Thirds".to_string(),
            is_correct: correct,
            trial_date: "01/02/2026".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_accuracy() {
        assert_eq!(None, accuracy(&[] as &[TrialLogEntry]));
        assert_eq!(Some(67), accuracy(&[entry(true), entry(false), entry(true)]));
        assert_eq!(Some(33), accuracy(&[entry(false), entry(false), entry(true)]));
        assert_eq!(Some(100), accuracy(&[entry(true)]));
    }

    #[test]
    fn test_answer_set_entries_are_not_eligible() {
        let mut restricted = entry(false);
        restricted.answer_set = Some("Naturals".to_string());
        let mut auto = entry(false);
        auto.answer_set = Some("Auto".to_string());

        assert_eq!(None, accuracy(&[restricted.clone()]));
        assert_eq!(Some(50), accuracy(&[restricted, entry(true), auto]));
    }

    #[test]
    fn test_recent_accuracy() {
        let mut entries = vec![entry(false); 3];
        entries.extend(vec![entry(true); 4]);

        assert_eq!(Some(100), recent_accuracy(&entries, 4));
        assert_eq!(Some(80), recent_accuracy(&entries, 5));
        assert_eq!(None, recent_accuracy(&entries, 8));
        assert_eq!(None, recent_accuracy(&entries, 0));
    }

    #[test]
    fn test_exercise_types() {
        assert_eq!("Tritones", exercise_type_from_label("Tritones 3: D, G♯"));
        assert_eq!("Minor thirds", exercise_type_from_label(" Minor thirds 1: C, E♭"));
        assert_eq!("", exercise_type_from_label("Mine: C, D"));
        assert_eq!("Custom", normalize_exercise_type(" custom "));

        let mut unlabeled = entry(true);
        unlabeled.exercise_type = String::new();
        unlabeled.chroma_set_label = "Chromatic: C, C♯".to_string();
        assert_eq!("Chromatic", entry_exercise_type(&unlabeled));
    }

    #[test]
    fn test_summary() {
        let mut other = entry(true);
        other.exercise_type = "custom".to_string();
        other.trial_date = "02/02/2026".to_string();
        let entries = vec![entry(false), entry(false), entry(true), other];

        let summary = StatsSummary::compute(&entries, "Thirds", "01/02/2026", 1000);
        assert_eq!(
            vec![
                "Total trials: 4",
                "Total trials today: 3",
                "Thirds:",
                "  Total trials: 3",
                "  Overall accuracy: 33%",
                "  Last 1000 trials accuracy: -",
            ],
            summary.lines()
        );

        let custom = StatsSummary::compute(&entries, "Custom", "02/02/2026", 1);
        let exercise = custom.exercise.expect("custom stats");
        assert_eq!(1, exercise.total_trials);
        assert_eq!(Some(100), exercise.recent_accuracy);
        assert_eq!(1, custom.trials_today);

        let none = StatsSummary::compute(&[], "", "02/02/2026", 1000);
        assert_eq!(None, none.exercise);
        assert_eq!("Select a chroma set to view stats.", none.lines()[2]);
    }
}
