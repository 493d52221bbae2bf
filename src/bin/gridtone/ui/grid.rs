//! Paint the grid draw list into the terminal buffer.

use ratatui::buffer::Buffer;
use ratatui::layout::{Position, Rect};
use ratatui::style::{Color, Modifier, Style};

use gridtone::roll::grid_render::{self, DrawOp, NotePaint, RectPx};

use crate::app::App;
use crate::ui::{color_from_hex, PX_PER_CELL_X, PX_PER_CELL_Y};

pub fn render(buf: &mut Buffer, area: Rect, app: &App) {
    let Some(track_id) = app.active_track else {
        return;
    };
    let track_color = app
        .store
        .project()
        .track(track_id)
        .map(|t| t.color.clone())
        .unwrap_or_default();

    let notes = app.track_notes(track_id);
    let views = app.note_views(&notes);
    let active_rows: std::collections::HashSet<u32> = app.active_rows().into_iter().collect();
    let selection_rect = app.selection.rect().map(|r| r.bounds());

    let ops = grid_render::render(app.geometry(), &views, &active_rows, selection_rect);

    let painter = Painter {
        area,
        scroll: app.scroll,
        color: color_from_hex(&track_color),
    };

    for op in &ops {
        match op {
            DrawOp::BlackRowBand(rect) => painter.fill(buf, rect, |cell| {
                cell.set_bg(Color::Rgb(24, 24, 28));
            }),
            DrawOp::ActiveRowBand(rect) => painter.fill(buf, rect, |cell| {
                cell.set_bg(Color::Rgb(60, 20, 40));
            }),
            // Per-cell grid lines are too dense for terminal resolution;
            // the octave and measure lines carry the orientation.
            DrawOp::RowLine { .. } | DrawOp::ColumnLine { .. } => {}
            DrawOp::OctaveLine { y } => painter.underline_row(buf, *y),
            DrawOp::MeasureLine { x } => painter.measure_column(buf, *x),
            DrawOp::Note(paint) => painter.note(buf, paint),
            DrawOp::SelectionRect(rect) => painter.outline(buf, rect),
        }
    }

    painter.playhead(buf, app);
}

struct Painter {
    area: Rect,
    scroll: (u16, u16),
    color: Color,
}

impl Painter {
    /// Map a pixel rect to the on-screen cell range, clipped to the area.
    fn cells(&self, rect: &RectPx) -> Option<(u16, u16, u16, u16)> {
        let x0 = (rect.x / PX_PER_CELL_X).floor() as i64 - self.scroll.0 as i64;
        let y0 = (rect.y / PX_PER_CELL_Y).floor() as i64 - self.scroll.1 as i64;
        let x1 = ((rect.x + rect.w) / PX_PER_CELL_X).ceil() as i64 - self.scroll.0 as i64;
        let y1 = ((rect.y + rect.h) / PX_PER_CELL_Y).ceil() as i64 - self.scroll.1 as i64;

        let left = (self.area.x as i64 + x0.max(0)).min(self.area.right() as i64);
        let top = (self.area.y as i64 + y0.max(0)).min(self.area.bottom() as i64);
        let right = (self.area.x as i64 + x1.min(self.area.width as i64)).max(left);
        let bottom = (self.area.y as i64 + y1.min(self.area.height as i64)).max(top);

        if left >= right || top >= bottom {
            return None;
        }
        Some((left as u16, top as u16, right as u16, bottom as u16))
    }

    fn fill(&self, buf: &mut Buffer, rect: &RectPx, f: impl Fn(&mut ratatui::buffer::Cell)) {
        let Some((left, top, right, bottom)) = self.cells(rect) else {
            return;
        };
        for y in top..bottom {
            for x in left..right {
                if let Some(cell) = buf.cell_mut(Position::new(x, y)) {
                    f(cell);
                }
            }
        }
    }

    fn underline_row(&self, buf: &mut Buffer, y_px: f32) {
        let row = ((y_px / PX_PER_CELL_Y) as i64 - 1).max(0) as f32;
        let rect = RectPx {
            x: self.scroll.0 as f32 * PX_PER_CELL_X,
            y: row * PX_PER_CELL_Y,
            w: self.area.width as f32 * PX_PER_CELL_X,
            h: PX_PER_CELL_Y,
        };
        self.fill(buf, &rect, |cell| {
            cell.set_style(Style::default().add_modifier(Modifier::UNDERLINED));
        });
    }

    fn measure_column(&self, buf: &mut Buffer, x_px: f32) {
        let col = (x_px / PX_PER_CELL_X) as i64 - self.scroll.0 as i64;
        if col < 0 || col >= self.area.width as i64 {
            return;
        }
        let x = self.area.x + col as u16;
        for y in self.area.y..self.area.bottom() {
            if let Some(cell) = buf.cell_mut(Position::new(x, y)) {
                if cell.symbol() == " " {
                    cell.set_char('┊').set_fg(Color::Rgb(70, 50, 60));
                }
            }
        }
    }

    fn note(&self, buf: &mut Buffer, paint: &NotePaint) {
        let Some((left, top, right, bottom)) = self.cells(&paint.rect) else {
            return;
        };

        let bg = if paint.on_black_row {
            dim(self.color)
        } else {
            self.color
        };
        let label = paint.label.to_string();
        let mut label_chars = label.chars();

        for y in top..bottom {
            for x in left..right {
                if let Some(cell) = buf.cell_mut(Position::new(x, y)) {
                    cell.set_bg(bg);
                    cell.set_fg(Color::Black);
                    let ch = label_chars.next().unwrap_or(' ');
                    cell.set_char(ch);

                    if paint.selected {
                        cell.set_fg(Color::Yellow);
                        cell.set_style(Style::default().add_modifier(Modifier::BOLD));
                        cell.set_bg(bg);
                    }
                    if paint.dragging || paint.resizing {
                        cell.set_style(Style::default().add_modifier(Modifier::DIM));
                    }
                }
            }
        }
    }

    fn outline(&self, buf: &mut Buffer, rect: &RectPx) {
        let Some((left, top, right, bottom)) = self.cells(rect) else {
            return;
        };
        for y in top..bottom {
            for x in left..right {
                let on_edge = y == top || y + 1 == bottom || x == left || x + 1 == right;
                if !on_edge {
                    continue;
                }
                if let Some(cell) = buf.cell_mut(Position::new(x, y)) {
                    cell.set_fg(Color::Yellow);
                    if cell.symbol() == " " {
                        cell.set_char('·');
                    }
                }
            }
        }
    }

    fn playhead(&self, buf: &mut Buffer, app: &App) {
        if !app.transport.is_playing() {
            return;
        }
        let x_px = app.transport.col() as f32 * app.geometry().col_width;
        let col = (x_px / PX_PER_CELL_X) as i64 - self.scroll.0 as i64;
        if col < 0 || col >= self.area.width as i64 {
            return;
        }
        let x = self.area.x + col as u16;
        for y in self.area.y..self.area.bottom() {
            if let Some(cell) = buf.cell_mut(Position::new(x, y)) {
                if cell.symbol() == " " || cell.symbol() == "┊" {
                    cell.set_char('▏').set_fg(Color::Yellow);
                }
            }
        }
    }
}

fn dim(color: Color) -> Color {
    match color {
        Color::Rgb(r, g, b) => Color::Rgb(
            (r as f32 * 0.85) as u8,
            (g as f32 * 0.85) as u8,
            (b as f32 * 0.85) as u8,
        ),
        other => other,
    }
}
