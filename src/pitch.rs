use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/*
Pitch Space of the Piano Roll
=============================

The grid exposes 87 pitch rows. Row 0 is the TOP row of the editor and maps
to B7; each row below it is one semitone lower, down to A0 at row 86. The
octave of row i is `7 - i / 12` and the name within the octave walks down
the chromatic scale starting at B.

Frequencies use twelve-tone equal temperament anchored at A4 = 440 Hz
(MIDI note 69):

    f(midi) = 440 * 2^((midi - 69) / 12)

Row height is fixed at 16 logical pixels; column width is supplied by the
caller (it is the zoom level), so everything here that needs horizontal
geometry takes it as a parameter.
*/

/// Number of pitch rows in the grid.
pub const TOTAL_NOTES: u32 = 87;

/// Fixed height of one pitch row in logical pixels.
pub const NOTE_ROW_HEIGHT: f32 = 16.0;

/// Note letters from the top of an octave going down.
const NAMES_DESCENDING: [&str; 12] = [
    "B", "A#", "A", "G#", "G", "F#", "F", "E", "D#", "D", "C#", "C",
];

/// Semitone offset of each natural letter above C.
fn letter_semitone(letter: char) -> Option<u8> {
    match letter {
        'C' => Some(0),
        'D' => Some(2),
        'E' => Some(4),
        'F' => Some(5),
        'G' => Some(7),
        'A' => Some(9),
        'B' => Some(11),
        _ => None,
    }
}

/// A concert pitch such as `C4` or `A#5`.
///
/// Stored as letter + sharp flag + octave so formatting round-trips exactly.
/// Flats are not part of the grid's vocabulary (black rows are spelled with
/// sharps, as the key labels show them).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NoteName {
    letter: char,
    sharp: bool,
    octave: i8,
}

impl NoteName {
    /// A4 = 440 Hz, the tuning reference.
    pub const A4: NoteName = NoteName {
        letter: 'A',
        sharp: false,
        octave: 4,
    };

    pub fn new(letter: char, sharp: bool, octave: i8) -> Option<Self> {
        letter_semitone(letter)?;
        Some(Self {
            letter,
            sharp,
            octave,
        })
    }

    /// MIDI note number (C4 = 60).
    pub fn midi(&self) -> i32 {
        let semitone = letter_semitone(self.letter).unwrap_or(9) as i32
            + if self.sharp { 1 } else { 0 };
        (self.octave as i32 + 1) * 12 + semitone
    }

    /// Frequency in Hz, A4 = 440.
    pub fn frequency(&self) -> f32 {
        440.0 * 2.0_f32.powf((self.midi() - 69) as f32 / 12.0)
    }

    pub fn is_sharp(&self) -> bool {
        self.sharp
    }

    /// True for the C that starts each octave (octave boundaries get a
    /// heavier line in the grid).
    pub fn is_octave_start(&self) -> bool {
        self.letter == 'C' && !self.sharp
    }

    pub fn octave(&self) -> i8 {
        self.octave
    }

    /// Height multiplier of this key in the piano-keys column.
    ///
    /// White keys absorb the rows of their neighbouring black keys: D, G and
    /// A sit between two black keys (x2), the rest between one (x1.5).
    /// Black keys are always exactly one row tall.
    pub fn key_height_multiplier(&self) -> f32 {
        if self.sharp {
            return 1.0;
        }
        match self.letter {
            'D' | 'G' | 'A' => 2.0,
            _ => 1.5,
        }
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sharp {
            write!(f, "{}#{}", self.letter, self.octave)
        } else {
            write!(f, "{}{}", self.letter, self.octave)
        }
    }
}

impl FromStr for NoteName {
    type Err = ParseNoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let letter = chars.next().ok_or(ParseNoteError)?;
        let rest: String = chars.collect();
        let (sharp, octave_str) = match rest.strip_prefix('#') {
            Some(tail) => (true, tail),
            None => (false, rest.as_str()),
        };
        let octave: i8 = octave_str.parse().map_err(|_| ParseNoteError)?;
        NoteName::new(letter.to_ascii_uppercase(), sharp, octave).ok_or(ParseNoteError)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("not a note name")]
pub struct ParseNoteError;

impl TryFrom<String> for NoteName {
    type Error = ParseNoteError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<NoteName> for String {
    fn from(n: NoteName) -> String {
        n.to_string()
    }
}

/// Name of the pitch at grid row `row` (row 0 = B7, descending semitones).
///
/// Out-of-range rows clamp to the nearest edge so callers hit-testing
/// slightly past the canvas still get a sensible key.
pub fn note_for_row(row: u32) -> NoteName {
    let row = row.min(TOTAL_NOTES - 1);
    let octave = 7 - (row / 12) as i8;
    let name = NAMES_DESCENDING[(row % 12) as usize];
    let sharp = name.len() == 2;
    let letter = name.chars().next().unwrap();
    NoteName::new(letter, sharp, octave).unwrap()
}

/// Grid row of a pitch, if it lies inside the 87-row range.
pub fn row_for_note(note: NoteName) -> Option<u32> {
    (0..TOTAL_NOTES).find(|&row| note_for_row(row) == note)
}

/// Frequency of an arbitrary note name string, falling back to A4 when the
/// string does not parse. Matches the forgiving behavior the engines rely
/// on: a bad name plays the reference pitch rather than erroring.
pub fn frequency_of(name: &str) -> f32 {
    name.parse::<NoteName>()
        .map(|n| n.frequency())
        .unwrap_or_else(|_| NoteName::A4.frequency())
}

/// All rows' note names from the top of the grid down.
pub fn all_notes() -> impl Iterator<Item = NoteName> {
    (0..TOTAL_NOTES).map(note_for_row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a440_reference() {
        let a4: NoteName = "A4".parse().unwrap();
        assert_eq!(a4.midi(), 69);
        assert!((a4.frequency() - 440.0).abs() < 1e-3);
    }

    #[test]
    fn middle_c_is_midi_60() {
        let c4: NoteName = "C4".parse().unwrap();
        assert_eq!(c4.midi(), 60);
    }

    #[test]
    fn top_row_is_b7_bottom_row_is_a0() {
        assert_eq!(note_for_row(0).to_string(), "B7");
        assert_eq!(note_for_row(TOTAL_NOTES - 1).to_string(), "A0");
    }

    #[test]
    fn rows_descend_by_semitone() {
        let upper = note_for_row(10);
        let lower = note_for_row(11);
        assert_eq!(upper.midi() - lower.midi(), 1);
    }

    #[test]
    fn octave_rows_are_12_apart() {
        let b7 = note_for_row(0);
        let b6 = note_for_row(12);
        assert_eq!(b7.midi() - b6.midi(), 12);
    }

    #[test]
    fn row_round_trip() {
        for row in 0..TOTAL_NOTES {
            assert_eq!(row_for_note(note_for_row(row)), Some(row));
        }
    }

    #[test]
    fn sharp_parsing_and_display() {
        let fs3: NoteName = "F#3".parse().unwrap();
        assert!(fs3.is_sharp());
        assert_eq!(fs3.to_string(), "F#3");
    }

    #[test]
    fn bad_name_falls_back_to_a440() {
        assert!((frequency_of("notanote") - 440.0).abs() < 1e-3);
    }

    #[test]
    fn octave_start_detection() {
        assert!(note_for_row(11).is_octave_start()); // C7
        assert!(!note_for_row(0).is_octave_start()); // B7
    }

    #[test]
    fn key_height_multipliers() {
        let d: NoteName = "D4".parse().unwrap();
        let e: NoteName = "E4".parse().unwrap();
        assert_eq!(d.key_height_multiplier(), 2.0);
        assert_eq!(e.key_height_multiplier(), 1.5);
    }
}
