use std::collections::HashMap;

use crate::project::note::{MidiNote, NoteId, NoteUpdate};

use super::drag::NoteCommit;
use super::selection::Selection;

/*
Note Resizing
=============

The width-only sibling of the drag gesture: grabbing the handle at a note's
right edge changes `w`, leaving `x`/`y` alone. Grabbing a selected note's
handle resizes the whole selection by the same delta.

The delta clamp intersects every member's constraints:

    lower bound:  1 - w          (no note shrinks below one column)
    upper bound:  cols - x - w   (no trailing edge leaves the grid)

so a group resize moves every width together or not at all past a limit.
*/

#[derive(Debug)]
pub struct ResizeGesture {
    start_mouse_x: f32,
    has_moved: bool,
    /// (w, x) of every picked-up note at press time.
    initial: HashMap<NoteId, (u32, u32)>,
    preview_dw: i64,
}

impl ResizeGesture {
    pub fn begin(mouse_x: f32, note: &MidiNote, selection: &Selection, notes: &[MidiNote]) -> Self {
        let mut initial = HashMap::new();
        if selection.contains(note.id) {
            for n in notes {
                if selection.contains(n.id) {
                    initial.insert(n.id, (n.w, n.x));
                }
            }
        } else {
            initial.insert(note.id, (note.w, note.x));
        }

        Self {
            start_mouse_x: mouse_x,
            has_moved: false,
            initial,
            preview_dw: 0,
        }
    }

    pub fn update(&mut self, mouse_x: f32, col_width: f32, cols: u32) {
        let raw = ((mouse_x - self.start_mouse_x) / col_width).round() as i64;
        if !self.has_moved && raw != 0 {
            self.has_moved = true;
        }

        let mut min_dw = i64::MIN;
        let mut max_dw = i64::MAX;
        for &(w, x) in self.initial.values() {
            min_dw = min_dw.max(1 - w as i64);
            max_dw = max_dw.min(cols as i64 - x as i64 - w as i64);
        }

        self.preview_dw = raw.clamp(min_dw.min(max_dw), max_dw.max(min_dw));
    }

    pub fn preview_delta(&self) -> i64 {
        self.preview_dw
    }

    pub fn preview_for(&self, id: NoteId) -> Option<(u32, u32)> {
        self.initial
            .get(&id)
            .map(|&(w, x)| (x, (w as i64 + self.preview_dw) as u32))
    }

    pub fn involves(&self, id: NoteId) -> bool {
        self.initial.contains_key(&id)
    }

    pub fn has_moved(&self) -> bool {
        self.has_moved
    }

    pub fn finish(self) -> Option<Vec<NoteCommit>> {
        if !self.has_moved || self.preview_dw == 0 {
            return None;
        }

        Some(
            self.initial
                .into_iter()
                .map(|(note_id, (w, _))| NoteCommit {
                    note_id,
                    update: NoteUpdate {
                        x: None,
                        y: None,
                        w: Some((w as i64 + self.preview_dw) as u32),
                    },
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COL_WIDTH: f32 = 10.0;
    const COLS: u32 = 64;

    #[test]
    fn widens_by_rounded_cells() {
        let n = MidiNote::new(4, 4, 2);
        let mut resize = ResizeGesture::begin(0.0, &n, &Selection::new(), &[n]);
        resize.update(34.0, COL_WIDTH, COLS); // 3.4 cols

        let commits = resize.finish().unwrap();
        assert_eq!(commits[0].update.w, Some(5));
        assert_eq!(commits[0].update.x, None);
    }

    #[test]
    fn minimum_width_is_one_column() {
        let n = MidiNote::new(4, 4, 3);
        let mut resize = ResizeGesture::begin(0.0, &n, &Selection::new(), &[n]);
        resize.update(-200.0, COL_WIDTH, COLS);
        assert_eq!(resize.preview_delta(), -2); // 3 - 2 = 1, the floor

        let commits = resize.finish().unwrap();
        assert_eq!(commits[0].update.w, Some(1));
    }

    #[test]
    fn trailing_edge_cannot_leave_the_grid() {
        let n = MidiNote::new(60, 4, 2); // slack = 64 - 60 - 2 = 2
        let mut resize = ResizeGesture::begin(0.0, &n, &Selection::new(), &[n]);
        resize.update(100.0 * COL_WIDTH, COL_WIDTH, COLS);
        assert_eq!(resize.preview_delta(), 2);
    }

    #[test]
    fn group_resize_intersects_every_slack() {
        let a = MidiNote::new(60, 1, 2); // slack 2
        let b = MidiNote::new(10, 2, 2); // slack 52
        let mut selection = Selection::new();
        selection.insert(a.id);
        selection.insert(b.id);

        let mut resize = ResizeGesture::begin(0.0, &a, &selection, &[a, b]);
        resize.update(10.0 * COL_WIDTH, COL_WIDTH, COLS);

        let commits = resize.finish().unwrap();
        let for_b = commits.iter().find(|c| c.note_id == b.id).unwrap();
        assert_eq!(for_b.update.w, Some(4)); // grew by 2, the group limit
    }

    #[test]
    fn zero_delta_commits_nothing() {
        let n = MidiNote::new(4, 4, 2);
        let mut resize = ResizeGesture::begin(0.0, &n, &Selection::new(), &[n]);
        resize.update(3.0, COL_WIDTH, COLS);
        assert!(resize.finish().is_none());
    }

    #[test]
    fn preview_reports_resized_width() {
        let n = MidiNote::new(4, 4, 2);
        let mut resize = ResizeGesture::begin(0.0, &n, &Selection::new(), &[n]);
        resize.update(20.0, COL_WIDTH, COLS);
        assert_eq!(resize.preview_for(n.id), Some((4, 4)));
    }
}
