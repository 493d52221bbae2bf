use std::collections::HashSet;

use crate::pitch::{note_for_row, NoteName, NOTE_ROW_HEIGHT, TOTAL_NOTES};
use crate::project::note::NoteId;

use super::geometry::GridGeometry;

/*
Grid Renderer
=============

A stateless per-frame painter: given the notes, the sounding rows and the
live selection rectangle, it produces an ordered draw list. Occlusion is by
list order - later ops paint over earlier ones - so the order here IS the
z-order contract:

    black-key row shading
    active-row highlights
    row/column grid lines
    octave boundary lines          (heavier)
    measure lines (every 4 cols)   (heaviest)
    notes, in array order          (with live drag/resize previews applied)
    selection rectangle            (topmost)

The widget that owns a screen turns the ops into pixels or terminal cells;
this module also answers the inverse questions (which note / which resize
handle is under this pixel), against the same preview positions the draw
list shows, so hit-testing always agrees with what is on screen.
*/

/// Width of the resize-handle band at a note's right edge, in pixels.
pub const RESIZE_HANDLE_PX: f32 = 6.0;

/// Columns per measure (the heavier vertical line).
pub const COLS_PER_MEASURE: u32 = 4;

/// Axis-aligned rectangle in grid pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectPx {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// A note as the renderer sees it: committed cell position plus the live
/// preview during a drag/resize, and its visual flags.
#[derive(Debug, Clone, Copy)]
pub struct NoteView {
    pub id: NoteId,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub selected: bool,
    pub dragging: bool,
    pub resizing: bool,
    /// Live (x, y, w) while a gesture is in flight.
    pub preview: Option<(u32, u32, u32)>,
}

impl NoteView {
    /// The position/size hit-testing and painting should use: the preview
    /// if one is active, the committed cell otherwise.
    pub fn effective(&self) -> (u32, u32, u32) {
        self.preview.unwrap_or((self.x, self.y, self.w))
    }
}

/// Ready-to-paint note.
#[derive(Debug, Clone, Copy)]
pub struct NotePaint {
    pub id: NoteId,
    pub rect: RectPx,
    pub row: u32,
    pub label: NoteName,
    pub selected: bool,
    pub dragging: bool,
    pub resizing: bool,
    /// Notes on black-key rows paint slightly darker.
    pub on_black_row: bool,
}

/// One paint operation. Paint them in list order.
#[derive(Debug, Clone, Copy)]
pub enum DrawOp {
    BlackRowBand(RectPx),
    ActiveRowBand(RectPx),
    RowLine { y: f32 },
    ColumnLine { x: f32 },
    OctaveLine { y: f32 },
    MeasureLine { x: f32 },
    Note(NotePaint),
    SelectionRect(RectPx),
}

/// Build the frame's draw list.
pub fn render(
    geometry: GridGeometry,
    notes: &[NoteView],
    active_rows: &HashSet<u32>,
    selection_rect: Option<RectPx>,
) -> Vec<DrawOp> {
    let width = geometry.width();
    let mut ops = Vec::new();

    for row in 0..TOTAL_NOTES {
        if note_for_row(row).is_sharp() {
            ops.push(DrawOp::BlackRowBand(row_band(row, width)));
        }
    }

    for &row in active_rows {
        if row < TOTAL_NOTES {
            ops.push(DrawOp::ActiveRowBand(row_band(row, width)));
        }
    }

    for row in 1..=TOTAL_NOTES {
        ops.push(DrawOp::RowLine {
            y: row as f32 * NOTE_ROW_HEIGHT,
        });
    }
    for col in 1..=geometry.cols {
        ops.push(DrawOp::ColumnLine {
            x: col as f32 * geometry.col_width,
        });
    }

    for row in 0..TOTAL_NOTES {
        if note_for_row(row).is_octave_start() {
            ops.push(DrawOp::OctaveLine {
                y: (row + 1) as f32 * NOTE_ROW_HEIGHT,
            });
        }
    }

    let measures = geometry.cols.div_ceil(COLS_PER_MEASURE);
    for measure in 0..=measures {
        ops.push(DrawOp::MeasureLine {
            x: (measure * COLS_PER_MEASURE) as f32 * geometry.col_width,
        });
    }

    // Array order: later notes occlude earlier ones and any previews below.
    for view in notes {
        let (x, y, w) = view.effective();
        let label = note_for_row(y);
        ops.push(DrawOp::Note(NotePaint {
            id: view.id,
            rect: RectPx {
                x: x as f32 * geometry.col_width,
                y: y as f32 * NOTE_ROW_HEIGHT,
                w: w as f32 * geometry.col_width,
                h: NOTE_ROW_HEIGHT,
            },
            row: y,
            label,
            selected: view.selected,
            dragging: view.dragging,
            resizing: view.resizing,
            on_black_row: label.is_sharp(),
        }));
    }

    if let Some(rect) = selection_rect {
        ops.push(DrawOp::SelectionRect(rect));
    }

    ops
}

fn row_band(row: u32, width: f32) -> RectPx {
    RectPx {
        x: 0.0,
        y: row as f32 * NOTE_ROW_HEIGHT,
        w: width,
        h: NOTE_ROW_HEIGHT,
    }
}

/// The note under pixel (`x`, `y`), or `None`. Scans in REVERSE array order
/// so the visually topmost note wins ties, and tests against preview
/// positions so a mid-drag note is found where it is drawn.
pub fn note_at(geometry: GridGeometry, x: f32, y: f32, notes: &[NoteView]) -> Option<NoteId> {
    let col = geometry.col_at(x);
    let row = geometry.row_at(y).floor();
    if row < 0.0 {
        return None;
    }
    let row = row as u32;

    for view in notes.iter().rev() {
        let (nx, ny, nw) = view.effective();
        if row == ny && col >= nx as f32 && col < (nx + nw) as f32 {
            return Some(view.id);
        }
    }
    None
}

/// Is pixel `x` inside the resize-handle band at the note's right edge?
/// Uses the preview position, so a note being dragged is resize-testable at
/// its current location, not its committed one.
pub fn on_resize_handle(geometry: GridGeometry, x: f32, note: &NoteView) -> bool {
    let (nx, _, nw) = note.effective();
    let right_edge = (nx + nw) as f32 * geometry.col_width;
    x >= right_edge - RESIZE_HANDLE_PX && x <= right_edge
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(x: u32, y: u32, w: u32) -> NoteView {
        NoteView {
            id: NoteId::new(),
            x,
            y,
            w,
            selected: false,
            dragging: false,
            resizing: false,
            preview: None,
        }
    }

    fn geometry() -> GridGeometry {
        GridGeometry::new(64, 20.0)
    }

    #[test]
    fn draw_order_matches_the_occlusion_contract() {
        let notes = [view(0, 3, 2)];
        let ops = render(
            geometry(),
            &notes,
            &HashSet::from([5]),
            Some(RectPx {
                x: 0.0,
                y: 0.0,
                w: 10.0,
                h: 10.0,
            }),
        );

        let position = |f: &dyn Fn(&DrawOp) -> bool| ops.iter().position(|op| f(op)).unwrap();
        let black = position(&|op| matches!(op, DrawOp::BlackRowBand(_)));
        let active = position(&|op| matches!(op, DrawOp::ActiveRowBand(_)));
        let grid = position(&|op| matches!(op, DrawOp::RowLine { .. }));
        let octave = position(&|op| matches!(op, DrawOp::OctaveLine { .. }));
        let measure = position(&|op| matches!(op, DrawOp::MeasureLine { .. }));
        let note = position(&|op| matches!(op, DrawOp::Note(_)));
        let selection = position(&|op| matches!(op, DrawOp::SelectionRect(_)));

        assert!(black < active);
        assert!(active < grid);
        assert!(grid < octave);
        assert!(octave < measure);
        assert!(measure < note);
        assert!(note < selection);
        assert_eq!(selection, ops.len() - 1);
    }

    #[test]
    fn topmost_note_wins_hit_test_ties() {
        let bottom = view(2, 4, 4);
        let top = view(3, 4, 4);
        let notes = [bottom, top];

        let g = geometry();
        // Pixel inside the overlap of both notes
        let hit = note_at(g, 3.5 * g.col_width, 4.5 * NOTE_ROW_HEIGHT, &notes);
        assert_eq!(hit, Some(top.id));
    }

    #[test]
    fn hit_test_is_half_open_on_the_right_edge() {
        let n = view(2, 4, 2);
        let notes = [n];
        let g = geometry();

        let inside = note_at(g, 3.99 * g.col_width, 4.5 * NOTE_ROW_HEIGHT, &notes);
        let outside = note_at(g, 4.0 * g.col_width, 4.5 * NOTE_ROW_HEIGHT, &notes);
        assert_eq!(inside, Some(n.id));
        assert_eq!(outside, None);
    }

    #[test]
    fn hit_test_uses_preview_position() {
        let mut n = view(2, 4, 2);
        n.preview = Some((10, 7, 2));
        let notes = [n];
        let g = geometry();

        assert_eq!(note_at(g, 2.5 * g.col_width, 4.5 * NOTE_ROW_HEIGHT, &notes), None);
        assert_eq!(
            note_at(g, 10.5 * g.col_width, 7.5 * NOTE_ROW_HEIGHT, &notes),
            Some(n.id)
        );
    }

    #[test]
    fn resize_handle_is_a_band_at_the_right_edge() {
        let n = view(2, 4, 2);
        let g = geometry();
        let right = 4.0 * g.col_width;

        assert!(on_resize_handle(g, right - 1.0, &n));
        assert!(on_resize_handle(g, right - RESIZE_HANDLE_PX, &n));
        assert!(!on_resize_handle(g, right - RESIZE_HANDLE_PX - 0.5, &n));
        assert!(!on_resize_handle(g, right + 0.5, &n));
    }

    #[test]
    fn resize_handle_follows_the_preview() {
        let mut n = view(2, 4, 2);
        n.preview = Some((8, 4, 3));
        let g = geometry();
        let preview_right = 11.0 * g.col_width;

        assert!(on_resize_handle(g, preview_right - 1.0, &n));
        assert!(!on_resize_handle(g, 4.0 * g.col_width - 1.0, &n));
    }

    #[test]
    fn note_paint_carries_preview_rect() {
        let mut n = view(0, 0, 1);
        n.preview = Some((5, 6, 2));
        let ops = render(geometry(), &[n], &HashSet::new(), None);

        let paint = ops
            .iter()
            .find_map(|op| match op {
                DrawOp::Note(p) => Some(*p),
                _ => None,
            })
            .unwrap();
        assert_eq!(paint.rect.x, 5.0 * 20.0);
        assert_eq!(paint.rect.y, 6.0 * NOTE_ROW_HEIGHT);
        assert_eq!(paint.rect.w, 2.0 * 20.0);
    }
}
