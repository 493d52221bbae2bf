use std::collections::HashMap;
use std::time::SystemTime;

use crate::project::note::MidiNote;
use crate::project::track::TrackId;

/*
Per-Track Undo/Redo
===================

Every mutation of a track's note array can be expressed as a
(notes_before, notes_after) pair, so history entries store exactly that:
two snapshots. Single-shot edits (add one note, delete a selection) push an
entry directly; continuous gestures (drag, resize) bracket the whole thing
with start_batch/end_batch so a hundred pointer-move events collapse into
one undoable unit.

Linear history invariant: pushing a new entry clears the redo stack. Undo
moves the top entry to redo and hands back `notes_before`; redo mirrors it.
Returned arrays are deep copies - live edits after an undo must not be able
to reach into stored snapshots.

History is scoped per track. Deleting a track drops its stacks; loading a
project drops everything.
*/

const MAX_HISTORY_SIZE: usize = 50;

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub timestamp: SystemTime,
    pub description: String,
    pub notes_before: Vec<MidiNote>,
    pub notes_after: Vec<MidiNote>,
}

#[derive(Debug, Default)]
struct TrackHistory {
    undo_stack: Vec<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
}

#[derive(Debug)]
struct PendingBatch {
    track_id: TrackId,
    notes_before: Vec<MidiNote>,
    description: String,
}

#[derive(Debug, Default)]
pub struct HistoryStore {
    histories: HashMap<TrackId, TrackHistory>,
    pending_batch: Option<PendingBatch>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed mutation.
    pub fn push(
        &mut self,
        track_id: TrackId,
        notes_before: &[MidiNote],
        notes_after: &[MidiNote],
        description: &str,
    ) {
        let history = self.histories.entry(track_id).or_default();

        history.undo_stack.push(HistoryEntry {
            timestamp: SystemTime::now(),
            description: description.to_string(),
            notes_before: notes_before.to_vec(),
            notes_after: notes_after.to_vec(),
        });

        if history.undo_stack.len() > MAX_HISTORY_SIZE {
            history.undo_stack.remove(0);
        }

        history.redo_stack.clear();
    }

    /// Open a batch: snapshot the notes as they are before the gesture.
    /// A batch left open when another starts is simply replaced.
    pub fn start_batch(&mut self, track_id: TrackId, notes: &[MidiNote], description: &str) {
        self.pending_batch = Some(PendingBatch {
            track_id,
            notes_before: notes.to_vec(),
            description: description.to_string(),
        });
    }

    /// Close the batch against the notes as they are now. No-op without an
    /// open batch.
    pub fn end_batch(&mut self, notes_after: &[MidiNote]) {
        if let Some(batch) = self.pending_batch.take() {
            self.push(
                batch.track_id,
                &batch.notes_before,
                notes_after,
                &batch.description,
            );
        }
    }

    /// Drop an open batch without recording anything.
    pub fn cancel_batch(&mut self) {
        self.pending_batch = None;
    }

    /// Pop the last change; returns the note array to restore, or `None` if
    /// there is nothing to undo.
    pub fn undo(&mut self, track_id: TrackId) -> Option<Vec<MidiNote>> {
        let history = self.histories.get_mut(&track_id)?;
        let entry = history.undo_stack.pop()?;
        let restored = entry.notes_before.clone();
        history.redo_stack.push(entry);
        Some(restored)
    }

    /// Re-apply the last undone change.
    pub fn redo(&mut self, track_id: TrackId) -> Option<Vec<MidiNote>> {
        let history = self.histories.get_mut(&track_id)?;
        let entry = history.redo_stack.pop()?;
        let restored = entry.notes_after.clone();
        history.undo_stack.push(entry);
        Some(restored)
    }

    pub fn can_undo(&self, track_id: TrackId) -> bool {
        self.histories
            .get(&track_id)
            .is_some_and(|h| !h.undo_stack.is_empty())
    }

    pub fn can_redo(&self, track_id: TrackId) -> bool {
        self.histories
            .get(&track_id)
            .is_some_and(|h| !h.redo_stack.is_empty())
    }

    /// Deleting a track discards its history.
    pub fn clear_track(&mut self, track_id: TrackId) {
        self.histories.remove(&track_id);
        if self
            .pending_batch
            .as_ref()
            .is_some_and(|b| b.track_id == track_id)
        {
            self.pending_batch = None;
        }
    }

    /// Loading a new project discards every track's history.
    pub fn clear_all(&mut self) {
        self.histories.clear();
        self.pending_batch = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(x: u32, y: u32, w: u32) -> MidiNote {
        MidiNote::new(x, y, w)
    }

    #[test]
    fn undo_then_redo_round_trips() {
        let mut history = HistoryStore::new();
        let track = TrackId::new();
        let before = vec![note(0, 0, 1)];
        let after = vec![note(0, 0, 1), note(4, 2, 2)];

        history.push(track, &before, &after, "Add note");

        assert_eq!(history.undo(track), Some(before.clone()));
        assert_eq!(history.redo(track), Some(after));
        assert!(history.can_undo(track));
        assert!(!history.can_redo(track));
    }

    #[test]
    fn push_clears_redo() {
        let mut history = HistoryStore::new();
        let track = TrackId::new();

        history.push(track, &[], &[note(0, 0, 1)], "Add note");
        history.undo(track);
        assert!(history.can_redo(track));

        history.push(track, &[], &[note(1, 1, 1)], "Add note");
        assert!(!history.can_redo(track));
    }

    #[test]
    fn batch_collapses_to_one_entry() {
        let mut history = HistoryStore::new();
        let track = TrackId::new();
        let start = vec![note(0, 0, 1)];

        history.start_batch(track, &start, "Move notes");
        // ... any number of intermediate states happen here ...
        let end = vec![note(5, 3, 1)];
        history.end_batch(&end);

        assert_eq!(history.undo(track), Some(start));
        assert!(!history.can_undo(track));
    }

    #[test]
    fn end_batch_without_start_is_a_no_op() {
        let mut history = HistoryStore::new();
        history.end_batch(&[note(0, 0, 1)]);
        assert!(!history.can_undo(TrackId::new()));
    }

    #[test]
    fn cancel_batch_records_nothing() {
        let mut history = HistoryStore::new();
        let track = TrackId::new();
        history.start_batch(track, &[], "Drag");
        history.cancel_batch();
        history.end_batch(&[note(0, 0, 1)]);
        assert!(!history.can_undo(track));
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let mut history = HistoryStore::new();
        let track = TrackId::new();

        for i in 0..(MAX_HISTORY_SIZE as u32 + 10) {
            history.push(track, &[], &[note(i, 0, 1)], "Add note");
        }

        let mut undone = 0;
        while history.undo(track).is_some() {
            undone += 1;
        }
        assert_eq!(undone, MAX_HISTORY_SIZE);
    }

    #[test]
    fn undo_on_unknown_track_returns_none() {
        let mut history = HistoryStore::new();
        assert_eq!(history.undo(TrackId::new()), None);
    }

    #[test]
    fn clear_track_discards_stacks_and_pending_batch() {
        let mut history = HistoryStore::new();
        let track = TrackId::new();
        history.push(track, &[], &[note(0, 0, 1)], "Add note");
        history.start_batch(track, &[], "Drag");

        history.clear_track(track);
        assert!(!history.can_undo(track));
        history.end_batch(&[note(9, 9, 1)]);
        assert!(!history.can_undo(track));
    }

    #[test]
    fn restored_snapshots_are_independent_copies() {
        let mut history = HistoryStore::new();
        let track = TrackId::new();
        let before = vec![note(0, 0, 1)];
        history.push(track, &before, &[note(2, 0, 1)], "Move");

        let mut restored = history.undo(track).unwrap();
        restored[0].x = 99;

        // The stored snapshot must be unaffected by edits to the restored copy
        let again = history.redo(track).and_then(|_| history.undo(track)).unwrap();
        assert_eq!(again[0].x, 0);
    }
}
