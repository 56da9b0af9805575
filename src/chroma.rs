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
//! Pitch classes and the sets of them that a training session draws from.

use std::{fmt, str::FromStr};

use serde::Deserialize;

/// The number of distinct chromas.
pub const CHROMA_COUNT: u8 = 12;

/// The highest level available in level mode.
pub const MAX_LEVEL: usize = 12;

/// The exercise type given to user-defined sets.
pub const CUSTOM_EXERCISE: &str = "Custom";

/// The exercise type given to level sets.
pub const LEVEL_EXERCISE: &str = "Level";

const LABELS: [&str; 12] = [
    "C", "C♯", "D", "E♭", "E", "F", "F♯", "G", "A♭", "A", "B♭", "B",
];

const ASCII_LABELS: [&str; 12] = [
    "C", "C#", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B",
];

const CRYPTIC_LABELS: [&str; 12] = [
    "α", "β", "γ", "δ", "ε", "ζ", "η", "θ", "ι", "κ", "λ", "μ",
];

/// The order in which chromas are introduced by level mode.
const APPEARANCE_ORDER: [u8; 12] = [5, 4, 6, 3, 7, 2, 8, 1, 9, 0, 10, 11];

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ChromaError {
    #[error("chroma index {0} is out of range")]
    OutOfRange(u8),
    #[error("unrecognized chroma label '{0}'")]
    UnknownLabel(String),
    #[error("chroma {0} appears more than once in set '{1}'")]
    Duplicate(Chroma, String),
    #[error("chroma set '{0}' must contain between 2 and 12 chromas")]
    Size(String),
    #[error("level {0} is out of range (1-12)")]
    Level(usize),
}

/// A pitch class, independent of octave.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Chroma(u8);

impl Chroma {
    /// Creates a chroma from its index.
    pub fn new(index: u8) -> Result<Chroma, ChromaError> {
        if index >= CHROMA_COUNT {
            return Err(ChromaError::OutOfRange(index));
        }
        Ok(Chroma(index))
    }

    /// The chroma of the given note number.
    pub fn from_note(note: u8) -> Chroma {
        Chroma(note % CHROMA_COUNT)
    }

    /// All twelve chromas in index order.
    pub fn all() -> impl Iterator<Item = Chroma> {
        (0..CHROMA_COUNT).map(Chroma)
    }

    pub fn index(&self) -> u8 {
        self.0
    }

    /// The canonical display label.
    pub fn label(&self) -> &'static str {
        LABELS[self.0 as usize]
    }

    /// A spelling that is safe to use in file names.
    pub fn ascii_label(&self) -> &'static str {
        ASCII_LABELS[self.0 as usize]
    }

    /// The label shown to the user in the given style.
    pub fn display(&self, style: LabelStyle) -> &'static str {
        match style {
            LabelStyle::Standard => self.label(),
            LabelStyle::Cryptic => CRYPTIC_LABELS[self.0 as usize],
        }
    }

    /// Parses a label written in the given style. Standard labels are always accepted.
    pub fn parse_styled(input: &str, style: LabelStyle) -> Result<Chroma, ChromaError> {
        if style == LabelStyle::Cryptic {
            if let Some(index) = CRYPTIC_LABELS.iter().position(|label| *label == input.trim()) {
                return Ok(Chroma(index as u8));
            }
        }
        input.parse()
    }
}

impl FromStr for Chroma {
    type Err = ChromaError;

    /// Parses a letter followed by any number of sharps or flats, e.g. "C", "Db", "D♯", "A#".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        let base: i32 = match chars.next().map(|c| c.to_ascii_uppercase()) {
            Some('C') => 0,
            Some('D') => 2,
            Some('E') => 4,
            Some('F') => 5,
            Some('G') => 7,
            Some('A') => 9,
            Some('B') => 11,
            _ => return Err(ChromaError::UnknownLabel(trimmed.to_string())),
        };

        let mut offset = 0;
        for accidental in chars {
            match accidental {
                '♯' | '#' => offset += 1,
                '♭' | 'b' => offset -= 1,
                _ => return Err(ChromaError::UnknownLabel(trimmed.to_string())),
            }
        }

        Ok(Chroma((base + offset).rem_euclid(CHROMA_COUNT as i32) as u8))
    }
}

impl fmt::Display for Chroma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// How answer labels are presented.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LabelStyle {
    /// Note names.
    #[default]
    Standard,
    /// Opaque glyphs that hide the note names.
    Cryptic,
}

/// Where a chroma set came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetKind {
    Builtin,
    Custom,
    /// A level set. Out-of-set targets and the OUT answer are enabled for these.
    Level(usize),
}

/// An ordered, named set of chromas that are in play for a session.
#[derive(Clone, Debug, PartialEq)]
pub struct ChromaSet {
    name: String,
    chromas: Vec<Chroma>,
    exercise_type: String,
    kind: SetKind,
}

impl ChromaSet {
    /// Creates a chroma set. Empty sets are allowed and simply never produce trials.
    pub fn new(
        name: &str,
        chromas: Vec<Chroma>,
        exercise_type: &str,
        kind: SetKind,
    ) -> Result<ChromaSet, ChromaError> {
        for (i, chroma) in chromas.iter().enumerate() {
            if chromas[..i].contains(chroma) {
                return Err(ChromaError::Duplicate(*chroma, name.to_string()));
            }
        }

        Ok(ChromaSet {
            name: name.to_string(),
            chromas,
            exercise_type: exercise_type.to_string(),
            kind,
        })
    }

    /// Creates a user-defined set from labels.
    pub fn custom(name: &str, labels: &[String]) -> Result<ChromaSet, ChromaError> {
        let chromas = labels
            .iter()
            .map(|label| label.parse())
            .collect::<Result<Vec<Chroma>, ChromaError>>()?;
        if chromas.len() < 2 || chromas.len() > CHROMA_COUNT as usize {
            return Err(ChromaError::Size(name.to_string()));
        }
        ChromaSet::new(name, chromas, CUSTOM_EXERCISE, SetKind::Custom)
    }

    /// The set for the given level: the first `level` chromas of the appearance order.
    pub fn level(level: usize) -> Result<ChromaSet, ChromaError> {
        if level == 0 || level > MAX_LEVEL {
            return Err(ChromaError::Level(level));
        }
        ChromaSet::new(
            &format!("Level {}", level),
            APPEARANCE_ORDER[..level].iter().map(|i| Chroma(*i)).collect(),
            LEVEL_EXERCISE,
            SetKind::Level(level),
        )
    }

    /// The built-in sets, in menu order.
    pub fn builtin() -> Vec<ChromaSet> {
        const SETS: [(&str, &str, &[u8]); 16] = [
            ("Tritones 1", "Tritones", &[0, 6]),
            ("Tritones 2", "Tritones", &[1, 7]),
            ("Tritones 3", "Tritones", &[2, 8]),
            ("Tritones 4", "Tritones", &[3, 9]),
            ("Tritones 5", "Tritones", &[4, 10]),
            ("Tritones 6", "Tritones", &[5, 11]),
            ("Thirds 1", "Thirds", &[0, 4, 8]),
            ("Thirds 2", "Thirds", &[1, 5, 9]),
            ("Thirds 3", "Thirds", &[2, 6, 10]),
            ("Thirds 4", "Thirds", &[3, 7, 11]),
            ("Minor thirds 1", "Minor thirds", &[0, 3, 6, 9]),
            ("Minor thirds 2", "Minor thirds", &[1, 4, 7, 10]),
            ("Minor thirds 3", "Minor thirds", &[2, 5, 8, 11]),
            ("Tones 1", "Tones", &[0, 2, 4, 6, 8, 10]),
            ("Tones 2", "Tones", &[1, 3, 5, 7, 9, 11]),
            (
                "Chromatic",
                "Chromatic",
                &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
            ),
        ];

        SETS.iter()
            .map(|(name, exercise_type, chromas)| ChromaSet {
                name: name.to_string(),
                chromas: chromas.iter().map(|i| Chroma(*i)).collect(),
                exercise_type: exercise_type.to_string(),
                kind: SetKind::Builtin,
            })
            .collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The display label, e.g. "Thirds 1: C, E, A♭".
    pub fn label(&self) -> String {
        format!(
            "{}: {}",
            self.name,
            self.chromas
                .iter()
                .map(|chroma| chroma.label())
                .collect::<Vec<&str>>()
                .join(", ")
        )
    }

    pub fn chromas(&self) -> &[Chroma] {
        &self.chromas
    }

    pub fn exercise_type(&self) -> &str {
        &self.exercise_type
    }

    pub fn kind(&self) -> SetKind {
        self.kind
    }

    pub fn is_empty(&self) -> bool {
        self.chromas.is_empty()
    }

    pub fn contains(&self, chroma: Chroma) -> bool {
        self.chromas.contains(&chroma)
    }

    /// The chromas that are not in this set.
    pub fn complement(&self) -> Vec<Chroma> {
        Chroma::all().filter(|c| !self.contains(*c)).collect()
    }

    /// True if the two-note exercise can be played with this set.
    pub fn supports_special_exercise(&self) -> bool {
        self.chromas.len() >= 2
    }

    /// True if the OUT answer is offered for this set.
    pub fn allows_out(&self) -> bool {
        matches!(self.kind, SetKind::Level(_)) && !self.complement().is_empty()
    }
}

impl fmt::Display for ChromaSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_enharmonics() {
        let cases = [
            ("C", 0),
            ("C♯", 1),
            ("Db", 1),
            ("D", 2),
            ("D♯", 3),
            ("Eb", 3),
            ("E♭", 3),
            ("Gb", 6),
            ("G♭", 6),
            ("G♯", 8),
            ("Ab", 8),
            ("A♯", 10),
            ("Bb", 10),
            ("B", 11),
            ("Cb", 11),
            ("B#", 0),
            (" f# ", 6),
        ];
        for (label, index) in cases {
            assert_eq!(Ok(Chroma(index)), label.parse::<Chroma>(), "{}", label);
        }

        assert!("H".parse::<Chroma>().is_err());
        assert!("Cx".parse::<Chroma>().is_err());
        assert!("".parse::<Chroma>().is_err());
    }

    #[test]
    fn test_labels_round_trip() {
        for chroma in Chroma::all() {
            assert_eq!(Ok(chroma), chroma.label().parse::<Chroma>());
            assert_eq!(Ok(chroma), chroma.ascii_label().parse::<Chroma>());
            assert_eq!(
                Ok(chroma),
                Chroma::parse_styled(chroma.display(LabelStyle::Cryptic), LabelStyle::Cryptic)
            );
        }
        assert!(Chroma::parse_styled("α", LabelStyle::Standard).is_err());
    }

    #[test]
    fn test_from_note() {
        assert_eq!(Chroma(0), Chroma::from_note(60));
        assert_eq!(Chroma(8), Chroma::from_note(68));
        assert_eq!(Chroma(11), Chroma::from_note(95));
        assert_eq!(Err(ChromaError::OutOfRange(12)), Chroma::new(12));
    }

    #[test]
    fn test_builtin_sets() {
        let sets = ChromaSet::builtin();
        assert_eq!(16, sets.len());
        assert_eq!("Tritones 1: C, F♯", sets[0].label());
        assert_eq!("Thirds 1: C, E, A♭", sets[6].label());
        assert_eq!("Minor thirds", sets[10].exercise_type());
        assert_eq!(12, sets[15].chromas().len());
        assert!(sets.iter().all(|set| set.supports_special_exercise()));
        assert!(sets.iter().all(|set| !set.allows_out()));
    }

    #[test]
    fn test_level_sets() {
        let level = ChromaSet::level(3).expect("level");
        assert_eq!("Level 3: F, E, F♯", level.label());
        assert_eq!(LEVEL_EXERCISE, level.exercise_type());
        assert!(level.allows_out());
        assert!(level.supports_special_exercise());
        assert_eq!(9, level.complement().len());

        assert!(!ChromaSet::level(12).expect("level").allows_out());
        assert!(!ChromaSet::level(1).expect("level").supports_special_exercise());
        assert_eq!(Err(ChromaError::Level(0)), ChromaSet::level(0));
        assert_eq!(Err(ChromaError::Level(13)), ChromaSet::level(13));
    }

    #[test]
    fn test_custom_sets() {
        let set = ChromaSet::custom("Mine", &["C".into(), "Eb".into(), "G".into()])
            .expect("custom set");
        assert_eq!("Mine: C, E♭, G", set.label());
        assert_eq!(CUSTOM_EXERCISE, set.exercise_type());

        assert!(matches!(
            ChromaSet::custom("Dup", &["C".into(), "B#".into()]),
            Err(ChromaError::Duplicate(_, _))
        ));
        assert!(matches!(
            ChromaSet::custom("Small", &["C".into()]),
            Err(ChromaError::Size(_))
        ));
        assert!(matches!(
            ChromaSet::custom("Bad", &["C".into(), "Q".into()]),
            Err(ChromaError::UnknownLabel(_))
        ));
    }
}
