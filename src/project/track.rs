use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::eq::{default_eq_bands, EqBand};
use super::instrument::InstrumentConfig;
use super::note::MidiNote;

/// Unique id of a track within the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(Uuid);

impl TrackId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TrackId {
    fn default() -> Self {
        Self::new()
    }
}

/// Palette new tracks cycle through; the first color not already in use
/// wins, then it wraps by track count.
pub const TRACK_COLORS: [&str; 8] = [
    "#ef4444", // red
    "#f97316", // orange
    "#eab308", // yellow
    "#22c55e", // green
    "#06b6d4", // cyan
    "#3b82f6", // blue
    "#8b5cf6", // violet
    "#ec4899", // pink
];

/// One track of the project: an instrument, its mixer settings and its
/// notes. Deleting a track cascades to its audio channel and its undo/redo
/// history (the owners of those react to the removal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    pub instrument: InstrumentConfig,
    pub color: String,
    /// 0-100.
    pub volume: u8,
    /// 0-100 wet/dry mix of the shared track reverb.
    pub reverb: u8,
    pub eq_bands: Vec<EqBand>,
    pub muted: bool,
    pub solo: bool,
    /// Stacking position, unique per project.
    pub order: u32,
    pub notes: Vec<MidiNote>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl Track {
    pub fn new(name: String, instrument: InstrumentConfig, color: String, order: u32) -> Self {
        let now = SystemTime::now();
        Self {
            id: TrackId::new(),
            name,
            instrument,
            color,
            volume: 100,
            reverb: 0,
            eq_bands: default_eq_bands(),
            muted: false,
            solo: false,
            order,
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn note(&self, id: super::note::NoteId) -> Option<&MidiNote> {
        self.notes.iter().find(|n| n.id == id)
    }
}
