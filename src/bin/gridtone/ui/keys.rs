//! Paint the piano-keys column.

use std::collections::HashSet;

use ratatui::buffer::Buffer;
use ratatui::layout::{Position, Rect};
use ratatui::style::{Color, Modifier, Style};

use gridtone::roll::keys_render::{build_key_rects, render as key_paints, KeyPaint};

use crate::app::App;
use crate::ui::{KEYS_WIDTH_PX, PX_PER_CELL_X, PX_PER_CELL_Y};

pub fn render(buf: &mut Buffer, area: Rect, app: &App) {
    let active: HashSet<_> = app.active_note_names().into_iter().collect();
    let rects = build_key_rects(KEYS_WIDTH_PX);

    for paint in key_paints(&rects, &active) {
        draw_key(buf, area, app.scroll.1, &paint);
    }
}

fn draw_key(buf: &mut Buffer, area: Rect, scroll_y: u16, paint: &KeyPaint) {
    let top = (paint.key.rect.y / PX_PER_CELL_Y) as i64 - scroll_y as i64;
    let bottom = ((paint.key.rect.y + paint.key.rect.h) / PX_PER_CELL_Y).ceil() as i64
        - scroll_y as i64;
    let width_cells = (paint.key.rect.w / PX_PER_CELL_X).round() as u16;

    let (bg, fg) = match (paint.key.is_black, paint.active) {
        (false, false) => (Color::Rgb(235, 235, 235), Color::Rgb(120, 120, 120)),
        (false, true) => (Color::Rgb(215, 38, 109), Color::White),
        (true, false) => (Color::Rgb(22, 22, 22), Color::Rgb(110, 110, 110)),
        (true, true) => (Color::Rgb(155, 36, 88), Color::White),
    };

    let label = paint.key.note.to_string();

    for row in top.max(0)..bottom.max(0) {
        if row >= area.height as i64 {
            break;
        }
        let y = area.y + row as u16;
        let last_row = row + 1 == bottom;

        for col in 0..width_cells.min(area.width) {
            let x = area.x + col;
            if let Some(cell) = buf.cell_mut(Position::new(x, y)) {
                cell.set_bg(bg);
                cell.set_char(' ');
                if paint.octave_start {
                    cell.set_style(Style::default().add_modifier(Modifier::UNDERLINED));
                }
            }
        }

        // Label on the key's last row, right-aligned for whites, left for
        // the narrower blacks.
        if last_row {
            let start = if paint.key.is_black {
                area.x
            } else {
                area.x + width_cells.min(area.width).saturating_sub(label.len() as u16)
            };
            for (i, ch) in label.chars().enumerate() {
                let x = start + i as u16;
                if x < area.x + width_cells.min(area.width) {
                    if let Some(cell) = buf.cell_mut(Position::new(x, y)) {
                        cell.set_char(ch).set_fg(fg).set_bg(bg);
                    }
                }
            }
        }
    }
}
