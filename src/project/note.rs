use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique id of a note within its owning track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteId(Uuid);

impl NoteId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

/// One note on the piano-roll grid.
///
/// `x` is the start column (one column = one rhythmic subdivision), `y` the
/// pitch row (0 = top of the grid, see [`crate::pitch::note_for_row`]), `w`
/// the duration in columns. Invariants owned by the store and the
/// interaction clamps: `w >= 1`, `x + w <= project.cols`,
/// `y < TOTAL_NOTES`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MidiNote {
    pub id: NoteId,
    pub x: u32,
    pub y: u32,
    pub w: u32,
}

impl MidiNote {
    pub fn new(x: u32, y: u32, w: u32) -> Self {
        Self {
            id: NoteId::new(),
            x,
            y,
            w: w.max(1),
        }
    }

    /// Column one past the end of the note.
    pub fn right(&self) -> u32 {
        self.x + self.w
    }

    /// Does this note sound at `column`? Half-open: a note covers
    /// `[x, x + w)`.
    pub fn covers_column(&self, column: u32) -> bool {
        column >= self.x && column < self.right()
    }
}

/// Partial update applied to a note (drag/resize commits).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoteUpdate {
    pub x: Option<u32>,
    pub y: Option<u32>,
    pub w: Option<u32>,
}
