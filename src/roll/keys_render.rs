use std::collections::HashSet;

use crate::pitch::{all_notes, row_for_note, NoteName, NOTE_ROW_HEIGHT};

use super::grid_render::RectPx;

/*
Piano Keys Renderer
===================

The key column to the left of the grid. White keys are laid out top-down
with per-letter height multipliers (they absorb the rows of the black keys
between them); black keys overlay them at exactly one grid row each, 55% of
the column width. Painting order is all whites, then all blacks; hit-testing
is the reverse - black keys are on top, so they are tested first.
*/

/// Portion of the column width a black key covers.
const BLACK_KEY_WIDTH_RATIO: f32 = 0.55;

#[derive(Debug, Clone, Copy)]
pub struct KeyRect {
    pub note: NoteName,
    pub rect: RectPx,
    pub is_black: bool,
}

/// One paintable key with its live state.
#[derive(Debug, Clone, Copy)]
pub struct KeyPaint {
    pub key: KeyRect,
    pub active: bool,
    pub octave_start: bool,
}

/// Lay out every key for a column of `width` pixels.
pub fn build_key_rects(width: f32) -> Vec<KeyRect> {
    let mut rects = Vec::new();

    // The multiplier stack tiles complete octaves exactly; the partial
    // bottom octave would overhang by half a row, so the last key is
    // clamped to the grid edge.
    let total_height = crate::pitch::TOTAL_NOTES as f32 * NOTE_ROW_HEIGHT;
    let mut top = 0.0;
    for note in all_notes().filter(|n| !n.is_sharp()) {
        let height = (note.key_height_multiplier() * NOTE_ROW_HEIGHT).min(total_height - top);
        rects.push(KeyRect {
            note,
            rect: RectPx {
                x: 0.0,
                y: top,
                w: width,
                h: height,
            },
            is_black: false,
        });
        top += height;
    }

    for note in all_notes().filter(|n| n.is_sharp()) {
        let row = row_for_note(note).unwrap();
        rects.push(KeyRect {
            note,
            rect: RectPx {
                x: 0.0,
                y: row as f32 * NOTE_ROW_HEIGHT,
                w: width * BLACK_KEY_WIDTH_RATIO,
                h: NOTE_ROW_HEIGHT,
            },
            is_black: true,
        });
    }

    rects
}

/// Paint list: whites first, then blacks on top, each flagged with whether
/// its pitch is currently sounding.
pub fn render(rects: &[KeyRect], active: &HashSet<NoteName>) -> Vec<KeyPaint> {
    let mut paints = Vec::with_capacity(rects.len());
    for key in rects.iter().filter(|k| !k.is_black) {
        paints.push(KeyPaint {
            key: *key,
            active: active.contains(&key.note),
            octave_start: key.note.is_octave_start(),
        });
    }
    for key in rects.iter().filter(|k| k.is_black) {
        paints.push(KeyPaint {
            key: *key,
            active: active.contains(&key.note),
            octave_start: false,
        });
    }
    paints
}

/// The key under a pixel; black keys win where they overlap whites.
pub fn key_at(rects: &[KeyRect], x: f32, y: f32) -> Option<NoteName> {
    let hit = |key: &KeyRect| {
        x >= key.rect.x && x < key.rect.x + key.rect.w && y >= key.rect.y && y < key.rect.y + key.rect.h
    };

    rects
        .iter()
        .filter(|k| k.is_black)
        .find(|k| hit(k))
        .or_else(|| rects.iter().filter(|k| !k.is_black).find(|k| hit(k)))
        .map(|k| k.note)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::TOTAL_NOTES;

    #[test]
    fn white_keys_tile_the_full_height() {
        let rects = build_key_rects(80.0);
        let total: f32 = rects
            .iter()
            .filter(|k| !k.is_black)
            .map(|k| k.rect.h)
            .sum();
        assert_eq!(total, TOTAL_NOTES as f32 * NOTE_ROW_HEIGHT);
    }

    #[test]
    fn every_pitch_row_has_a_key() {
        let rects = build_key_rects(80.0);
        assert_eq!(rects.len() as u32, TOTAL_NOTES);
    }

    #[test]
    fn black_key_wins_overlap() {
        let rects = build_key_rects(100.0);
        // Row 1 is A#7, a black key; its band is y in [16, 32).
        let over_black = key_at(&rects, 10.0, 20.0).unwrap();
        assert!(over_black.is_sharp());

        // Past the black key's width the white key underneath takes the hit.
        let over_white = key_at(&rects, 80.0, 20.0).unwrap();
        assert!(!over_white.is_sharp());
    }

    #[test]
    fn out_of_bounds_hits_nothing() {
        let rects = build_key_rects(100.0);
        assert_eq!(key_at(&rects, 10.0, -1.0), None);
        assert_eq!(key_at(&rects, 10.0, 1e6), None);
    }

    #[test]
    fn paint_order_is_whites_then_blacks() {
        let rects = build_key_rects(100.0);
        let paints = render(&rects, &HashSet::new());
        let first_black = paints.iter().position(|p| p.key.is_black).unwrap();
        assert!(paints[..first_black].iter().all(|p| !p.key.is_black));
        assert!(paints[first_black..].iter().all(|p| p.key.is_black));
    }

    #[test]
    fn active_flag_follows_the_set() {
        let rects = build_key_rects(100.0);
        let a4: NoteName = "A4".parse().unwrap();
        let paints = render(&rects, &HashSet::from([a4]));
        let painted = paints.iter().find(|p| p.key.note == a4).unwrap();
        assert!(painted.active);
        assert!(paints.iter().filter(|p| p.active).count() == 1);
    }
}
