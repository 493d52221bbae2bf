//! The project document and its store.
//!
//! `TimelineProject` is the single source of truth every other part of the
//! system reads: the interaction composables and the store actions are the
//! only writers, the channel rack reacts to it, the renderers paint it, and
//! the persistence collaborator serializes it wholesale.
//!
//! Every mutation goes through [`ProjectStore::mutate`], which stamps
//! `updated_at` centrally so the invariant holds mechanically instead of by
//! convention in two dozen methods.

pub mod eq;
pub mod instrument;
pub mod note;
pub mod track;

use std::path::Path;
use std::time::SystemTime;

use log::warn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pitch::TOTAL_NOTES;
use eq::{default_eq_bands, EqBand, EqBandId, EQ_GAIN_MAX, EQ_GAIN_MIN};
use instrument::{ConfigUpdate, InstrumentConfig, InstrumentKind};
use note::{MidiNote, NoteId, NoteUpdate};
use track::{Track, TrackId, TRACK_COLORS};

/// Document format version. A loaded document with any other version is
/// discarded and replaced by a fresh project - there is no partial
/// interpretation of older formats.
pub const DOC_VERSION: &str = "1.0";

const DEFAULT_COLS: u32 = 128;
const DEFAULT_TEMPO: f64 = 120.0;
const DEFAULT_VOLUME: u8 = 100;
const DEFAULT_REVERB: u8 = 20;

/// The whole project document. Serialized verbatim on save; runtime-only
/// state (audio nodes, histories, selections) never appears here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineProject {
    pub id: Option<Uuid>,
    pub name: String,
    pub tracks: Vec<Track>,
    /// Timeline length in grid columns.
    pub cols: u32,
    /// Beats per minute.
    pub tempo: f64,
    /// Master volume, 0-100.
    pub volume: u8,
    /// Master reverb mix, 0-100.
    pub reverb: u8,
    pub eq_bands: Vec<EqBand>,
    pub version: String,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl TimelineProject {
    pub fn empty(name: &str) -> Self {
        let now = SystemTime::now();
        Self {
            id: None,
            name: name.to_string(),
            tracks: Vec::new(),
            cols: DEFAULT_COLS,
            tempo: DEFAULT_TEMPO,
            volume: DEFAULT_VOLUME,
            reverb: DEFAULT_REVERB,
            eq_bands: default_eq_bands(),
            version: DOC_VERSION.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn track_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }

    /// Tracks in stacking order.
    pub fn sorted_tracks(&self) -> Vec<&Track> {
        let mut sorted: Vec<&Track> = self.tracks.iter().collect();
        sorted.sort_by_key(|t| t.order);
        sorted
    }

    /// Mute/solo gate, evaluated against CURRENT state: if any track is
    /// soloed only soloed tracks sound, otherwise muted tracks are silent.
    pub fn is_audible(&self, id: TrackId) -> bool {
        let Some(track) = self.track(id) else {
            return false;
        };
        let any_solo = self.tracks.iter().any(|t| t.solo);
        if any_solo {
            track.solo
        } else {
            !track.muted
        }
    }

    /// Notes of `track_id` sounding at `column` (half-open coverage).
    pub fn notes_at_column(&self, track_id: TrackId, column: u32) -> Vec<MidiNote> {
        self.track(track_id)
            .map(|t| {
                t.notes
                    .iter()
                    .filter(|n| n.covers_column(column))
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read project file")]
    Io(#[from] std::io::Error),
    #[error("project document is not valid JSON")]
    Parse(#[from] serde_json::Error),
    #[error("unsupported document version {found:?}")]
    VersionMismatch { found: String },
}

/// Owner of the project document; all mutation funnels through here.
#[derive(Debug)]
pub struct ProjectStore {
    project: TimelineProject,
}

impl Default for ProjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectStore {
    pub fn new() -> Self {
        Self {
            project: TimelineProject::empty("New Project"),
        }
    }

    pub fn project(&self) -> &TimelineProject {
        &self.project
    }

    /// Run a mutation and stamp `updated_at`. Single funnel for all writes.
    pub fn mutate<R>(&mut self, f: impl FnOnce(&mut TimelineProject) -> R) -> R {
        let result = f(&mut self.project);
        self.project.updated_at = SystemTime::now();
        result
    }

    // ------------------------------------------------------------------
    // Tracks
    // ------------------------------------------------------------------

    /// Create a track for `instrument`, auto-naming it and picking the next
    /// free color and stacking slot. Returns the new id.
    pub fn create_track(&mut self, instrument: InstrumentConfig, name: Option<String>) -> TrackId {
        let name = name.unwrap_or_else(|| self.next_track_name(instrument.kind()));
        let color = self.next_track_color().to_string();
        let order = self
            .project
            .tracks
            .iter()
            .map(|t| t.order + 1)
            .max()
            .unwrap_or(0);

        self.mutate(|p| {
            let track = Track::new(name, instrument, color, order);
            let id = track.id;
            p.tracks.push(track);
            id
        })
    }

    /// Remove a track. The caller is responsible for cascading: the channel
    /// rack drops the audio channel on its next sync, the history store is
    /// asked to clear the track's stacks.
    pub fn delete_track(&mut self, id: TrackId) -> bool {
        self.mutate(|p| {
            let before = p.tracks.len();
            p.tracks.retain(|t| t.id != id);
            before != p.tracks.len()
        })
    }

    pub fn rename_track(&mut self, id: TrackId, name: &str) -> bool {
        self.with_track(id, |t| t.name = name.to_string())
    }

    pub fn set_track_muted(&mut self, id: TrackId, muted: bool) -> bool {
        self.with_track(id, |t| t.muted = muted)
    }

    pub fn set_track_solo(&mut self, id: TrackId, solo: bool) -> bool {
        self.with_track(id, |t| t.solo = solo)
    }

    pub fn set_track_volume(&mut self, id: TrackId, volume: u8) -> bool {
        self.with_track(id, |t| t.volume = volume.min(100))
    }

    pub fn set_track_reverb(&mut self, id: TrackId, reverb: u8) -> bool {
        self.with_track(id, |t| t.reverb = reverb.min(100))
    }

    pub fn set_track_eq_gain(&mut self, id: TrackId, band: EqBandId, gain: f32) -> bool {
        if !gain.is_finite() {
            return false;
        }
        self.with_track(id, |t| {
            if let Some(b) = t.eq_bands.iter_mut().find(|b| b.id == band) {
                b.gain = gain.clamp(EQ_GAIN_MIN, EQ_GAIN_MAX);
            }
        })
    }

    pub fn update_track_instrument(&mut self, id: TrackId, update: &ConfigUpdate) -> bool {
        self.with_track(id, |t| t.instrument.merge(update))
    }

    /// Move the track at `from` (in stacking order) to `to`, then renumber
    /// all orders densely.
    pub fn reorder_tracks(&mut self, from: usize, to: usize) -> bool {
        let mut ids: Vec<TrackId> = self.project.sorted_tracks().iter().map(|t| t.id).collect();
        if from >= ids.len() || to >= ids.len() {
            return false;
        }
        let moved = ids.remove(from);
        ids.insert(to, moved);

        self.mutate(|p| {
            for (index, id) in ids.iter().enumerate() {
                if let Some(track) = p.track_mut(*id) {
                    track.order = index as u32;
                }
            }
        });
        true
    }

    // ------------------------------------------------------------------
    // Notes
    // ------------------------------------------------------------------

    /// Add a note, clamping its geometry into the grid. Returns the new id,
    /// or `None` if the track is gone.
    pub fn add_note(&mut self, track_id: TrackId, x: u32, y: u32, w: u32) -> Option<NoteId> {
        let cols = self.project.cols;
        let found = self.mutate(|p| {
            let track = p.track_mut(track_id)?;
            let y = y.min(TOTAL_NOTES - 1);
            let w = w.max(1).min(cols);
            let x = x.min(cols - w);
            let note = MidiNote::new(x, y, w);
            let id = note.id;
            track.notes.push(note);
            track.updated_at = SystemTime::now();
            Some(id)
        });
        if found.is_none() {
            warn!("add_note: no such track {track_id:?}");
        }
        found
    }

    pub fn remove_note(&mut self, track_id: TrackId, note_id: NoteId) -> bool {
        let removed = self.mutate(|p| {
            let Some(track) = p.track_mut(track_id) else {
                return false;
            };
            let before = track.notes.len();
            track.notes.retain(|n| n.id != note_id);
            let removed = before != track.notes.len();
            if removed {
                track.updated_at = SystemTime::now();
            }
            removed
        });
        if !removed {
            warn!("remove_note: {note_id:?} not found on {track_id:?}");
        }
        removed
    }

    pub fn update_note(&mut self, track_id: TrackId, note_id: NoteId, update: NoteUpdate) -> bool {
        self.mutate(|p| {
            let Some(track) = p.track_mut(track_id) else {
                return false;
            };
            let Some(note) = track.notes.iter_mut().find(|n| n.id == note_id) else {
                return false;
            };
            if let Some(x) = update.x {
                note.x = x;
            }
            if let Some(y) = update.y {
                note.y = y;
            }
            if let Some(w) = update.w {
                note.w = w.max(1);
            }
            track.updated_at = SystemTime::now();
            true
        })
    }

    /// Replace a track's whole note array (undo/redo restore path).
    pub fn set_track_notes(&mut self, track_id: TrackId, notes: Vec<MidiNote>) -> bool {
        self.mutate(|p| {
            let Some(track) = p.track_mut(track_id) else {
                return false;
            };
            track.notes = notes;
            track.updated_at = SystemTime::now();
            true
        })
    }

    // ------------------------------------------------------------------
    // Global settings
    // ------------------------------------------------------------------

    pub fn set_tempo(&mut self, tempo: f64) {
        self.mutate(|p| p.tempo = tempo.max(1.0));
    }

    pub fn set_master_volume(&mut self, volume: u8) {
        self.mutate(|p| p.volume = volume.min(100));
    }

    pub fn set_master_reverb(&mut self, reverb: u8) {
        self.mutate(|p| p.reverb = reverb.min(100));
    }

    pub fn set_master_eq_gain(&mut self, band: EqBandId, gain: f32) {
        if !gain.is_finite() {
            return;
        }
        self.mutate(|p| {
            if let Some(b) = p.eq_bands.iter_mut().find(|b| b.id == band) {
                b.gain = gain.clamp(EQ_GAIN_MIN, EQ_GAIN_MAX);
            }
        });
    }

    pub fn rename_project(&mut self, name: &str) {
        self.mutate(|p| p.name = name.to_string());
    }

    // ------------------------------------------------------------------
    // Lifecycle & persistence
    // ------------------------------------------------------------------

    /// Replace the document with a fresh empty project.
    pub fn new_project(&mut self, name: &str) {
        self.project = TimelineProject::empty(name);
    }

    /// Replace the document wholesale with a loaded one. The caller clears
    /// undo/redo histories.
    pub fn install(&mut self, project: TimelineProject) {
        self.project = project;
    }

    /// Serialize the document verbatim.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.project)
    }

    /// Parse and validate a document. Version mismatches are errors; the
    /// caller decides to fall back to a fresh project.
    pub fn parse_document(json: &str) -> Result<TimelineProject, LoadError> {
        let project: TimelineProject = serde_json::from_str(json)?;
        if project.version != DOC_VERSION {
            return Err(LoadError::VersionMismatch {
                found: project.version,
            });
        }
        Ok(project)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), LoadError> {
        let json = self.to_json()?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from `path`, replacing the current document. Any failure (I/O,
    /// parse, version) leaves a fresh empty project instead - the worst
    /// case is losing the stale file, never a half-interpreted document.
    pub fn load_from(&mut self, path: &Path) -> Result<(), LoadError> {
        let result = std::fs::read_to_string(path)
            .map_err(LoadError::from)
            .and_then(|json| Self::parse_document(&json));

        match result {
            Ok(project) => {
                self.install(project);
                Ok(())
            }
            Err(err) => {
                warn!("project load failed, starting fresh: {err}");
                self.new_project("New Project");
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn with_track(&mut self, id: TrackId, f: impl FnOnce(&mut Track)) -> bool {
        let found = self.mutate(|p| {
            let Some(track) = p.track_mut(id) else {
                return false;
            };
            f(track);
            track.updated_at = SystemTime::now();
            true
        });
        if !found {
            warn!("no such track {id:?}");
        }
        found
    }

    fn next_track_name(&self, kind: InstrumentKind) -> String {
        let base = kind.display_name();
        let mut counter = 1;
        loop {
            let candidate = format!("{base} {counter}");
            if !self.project.tracks.iter().any(|t| t.name == candidate) {
                return candidate;
            }
            counter += 1;
        }
    }

    fn next_track_color(&self) -> &'static str {
        let used: Vec<&str> = self.project.tracks.iter().map(|t| t.color.as_str()).collect();
        for color in TRACK_COLORS {
            if !used.contains(&color) {
                return color;
            }
        }
        TRACK_COLORS[self.project.tracks.len() % TRACK_COLORS.len()]
    }
}
