//! Terminal painting for the piano roll.
//!
//! The library renderers hand us pixel-space draw lists; this module maps
//! them onto terminal cells. One grid column is two cells wide, one pitch
//! row is one cell tall, so the pixel-per-cell factors below are fixed by
//! the grid constants.

mod grid;
mod keys;

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use gridtone::engine::EngineState;
use gridtone::pitch::NOTE_ROW_HEIGHT;

use crate::app::App;

/// Grid column width in logical pixels (the zoom level of this frontend).
pub const COL_WIDTH_PX: f32 = 16.0;
/// Pixels per terminal cell, horizontally: one column spans two cells.
pub const PX_PER_CELL_X: f32 = COL_WIDTH_PX / 2.0;
/// Pixels per terminal cell, vertically: one pitch row per cell.
pub const PX_PER_CELL_Y: f32 = NOTE_ROW_HEIGHT;
/// Width of the piano-keys column in logical pixels (10 cells).
pub const KEYS_WIDTH_PX: f32 = 80.0;

pub fn draw(frame: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2), // header
            Constraint::Min(8),   // body
            Constraint::Length(1), // help bar
        ])
        .split(frame.area());

    render_header(frame, chunks[0], app);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(26), // track strip
            Constraint::Length(10), // piano keys
            Constraint::Min(16),    // grid
        ])
        .split(chunks[1]);

    render_tracks(frame, body[0], app);

    app.keys_area = body[1];
    app.grid_area = body[2];
    keys::render(frame.buffer_mut(), body[1], app);
    grid::render(frame.buffer_mut(), body[2], app);

    let help = Paragraph::new(
        " [space] play  [1/2/3] add track  [tab] track  [m/x] mute/solo  [s/o] save/load  [q] quit",
    )
    .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, chunks[2]);
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let project = app.store.project();
    let playing = if app.transport.is_playing() { "▶" } else { "⏸" };

    let line = Line::from(vec![
        Span::styled(
            format!(" {} ", project.name),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("{} bpm  ", project.tempo)),
        Span::raw(format!("{playing} col {:>3}  ", app.transport.col())),
        Span::styled(
            format!("vol {:>3}  rev {:>3}", project.volume, project.reverb),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    frame.render_widget(
        Paragraph::new(line).block(Block::default().borders(Borders::BOTTOM)),
        area,
    );
}

fn render_tracks(frame: &mut Frame, area: Rect, app: &App) {
    let audio = app.audio.lock().unwrap();
    let mut lines = Vec::new();

    for track in app.store.project().sorted_tracks() {
        let is_active = app.active_track == Some(track.id);
        let marker = if is_active { "▶" } else { " " };
        let mute = if track.muted { "M" } else { "·" };
        let solo = if track.solo { "S" } else { "·" };
        let state = match audio.rack.engine_state(track.id) {
            EngineState::Idle => ' ',
            EngineState::Loading => '~',
            EngineState::Ready => '●',
            EngineState::Error => '!',
        };

        lines.push(Line::from(vec![
            Span::raw(format!("{marker} ")),
            Span::styled(
                format!("{:<10.10}", track.name),
                Style::default().fg(color_from_hex(&track.color)),
            ),
            Span::raw(format!(" {mute}{solo} ")),
            Span::styled(
                format!("v{:<3} r{:<3}", track.volume, track.reverb),
                Style::default().fg(Color::DarkGray),
            ),
            Span::raw(format!(" {state}")),
        ]));
    }

    if lines.is_empty() {
        lines.push(Line::from(Span::styled(
            " [1] to add a synth track",
            Style::default().fg(Color::DarkGray),
        )));
    }

    frame.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::RIGHT).title(" Tracks ")),
        area,
    );
}

/// Parse a `#rrggbb` track color; anything else falls back to gray.
pub fn color_from_hex(hex: &str) -> Color {
    let parse = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.strip_prefix('#') {
        Some(rgb) if rgb.len() == 6 => {
            match (parse(&rgb[0..2]), parse(&rgb[2..4]), parse(&rgb[4..6])) {
                (Some(r), Some(g), Some(b)) => Color::Rgb(r, g, b),
                _ => Color::Gray,
            }
        }
        _ => Color::Gray,
    }
}
