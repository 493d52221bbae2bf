use crate::project::note::MidiNote;

use super::drag::{clamp_delta, NoteCommit};
use super::selection::Selection;
use crate::project::note::NoteUpdate;

/*
Keyboard Dispatch
=================

A stateless mapping from modifier+key combinations to editor commands. Key
repeat is whatever the platform delivers - repeated keydown events map to
repeated commands.

    Ctrl/Cmd+Z              undo
    Ctrl/Cmd+Shift+Z, +Y    redo
    Delete, Backspace       delete selection
    Escape                  clear selection
    Ctrl/Cmd+C / V / D      copy / paste / duplicate
    Shift+Arrow             nudge selection one cell
    Ctrl/Cmd+Up/Down        move selection one octave (12 rows)
    plain arrows            reserved (no command)
*/

/// Modifier state; `primary` is Ctrl on most platforms, Cmd on macOS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub primary: bool,
    pub shift: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Up,
    Down,
    Left,
    Right,
    Delete,
    Backspace,
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorCommand {
    Undo,
    Redo,
    DeleteSelection,
    ClearSelection,
    Copy,
    Paste,
    Duplicate,
    /// Move the selection by whole cells (dy < 0 is up/toward row 0).
    Nudge { dx: i64, dy: i64 },
}

/// Map a key event to a command, or `None` when the combination is unbound.
pub fn command_for(key: Key, modifiers: Modifiers) -> Option<EditorCommand> {
    use EditorCommand::*;

    if modifiers.primary {
        return match key {
            Key::Char('z') if !modifiers.shift => Some(Undo),
            Key::Char('z') => Some(Redo),
            Key::Char('y') => Some(Redo),
            Key::Char('c') => Some(Copy),
            Key::Char('v') => Some(Paste),
            Key::Char('d') => Some(Duplicate),
            Key::Up => Some(Nudge { dx: 0, dy: -12 }),
            Key::Down => Some(Nudge { dx: 0, dy: 12 }),
            _ => None,
        };
    }

    match key {
        Key::Delete | Key::Backspace => Some(DeleteSelection),
        Key::Escape => Some(ClearSelection),
        Key::Up if modifiers.shift => Some(Nudge { dx: 0, dy: -1 }),
        Key::Down if modifiers.shift => Some(Nudge { dx: 0, dy: 1 }),
        Key::Left if modifiers.shift => Some(Nudge { dx: -1, dy: 0 }),
        Key::Right if modifiers.shift => Some(Nudge { dx: 1, dy: 0 }),
        _ => None,
    }
}

/// Apply a nudge to the selected notes: the same rigid-group clamp as a
/// drag, committed in one batch. `None` when nothing is selected or the
/// clamp eats the whole delta.
pub fn nudge_selection(
    notes: &[MidiNote],
    selection: &Selection,
    dx: i64,
    dy: i64,
    cols: u32,
) -> Option<Vec<NoteCommit>> {
    let selected: Vec<&MidiNote> = notes.iter().filter(|n| selection.contains(n.id)).collect();
    if selected.is_empty() {
        return None;
    }

    let (dx, dy) = clamp_delta(selected.iter().map(|n| (n.x, n.y, n.w)), dx, dy, cols);
    if dx == 0 && dy == 0 {
        return None;
    }

    Some(
        selected
            .iter()
            .map(|note| NoteCommit {
                note_id: note.id,
                update: NoteUpdate {
                    x: Some((note.x as i64 + dx) as u32),
                    y: Some((note.y as i64 + dy) as u32),
                    w: None,
                },
            })
            .collect(),
    )
}
