//! Application state and event loop.
//!
//! Owns the project store, the history store, the interaction state
//! machines and the audio graph. The audio graph lives behind an
//! `Arc<Mutex<AudioState>>` shared with the cpal callback; the UI thread
//! only takes the lock for short parameter writes and note on/off calls,
//! the callback takes it to render blocks.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use color_eyre::eyre::{eyre, Result, WrapErr};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent,
    MouseEventKind,
};
use log::info;
use ratatui::layout::Rect;
use ratatui::DefaultTerminal;

use gridtone::audio::{AudioBus, ChannelRack};
use gridtone::engine::factory::default_soundfont_root;
use gridtone::engine::DEFAULT_VELOCITY;
use gridtone::history::HistoryStore;
use gridtone::pitch::note_for_row;
use gridtone::project::instrument::{InstrumentConfig, InstrumentKind};
use gridtone::project::note::{MidiNote, NoteId};
use gridtone::project::track::TrackId;
use gridtone::project::ProjectStore;
use gridtone::roll::clipboard::{duplicate, select_pasted, Clipboard};
use gridtone::roll::keyboard::{command_for, nudge_selection, EditorCommand, Key, Modifiers};
use gridtone::roll::{grid_render, keys_render, DragGesture, GridGeometry, NoteCommit, ResizeGesture, Selection};
use gridtone::MAX_BLOCK_SIZE;

use crate::transport::Transport;
use crate::ui;

const PROJECT_FILE: &str = "project.json";

/// Everything the audio callback touches.
pub struct AudioState {
    pub rack: ChannelRack,
    pub bus: AudioBus,
}

pub struct App {
    pub store: ProjectStore,
    pub history: HistoryStore,
    pub selection: Selection,
    pub clipboard: Clipboard,
    pub drag: Option<DragGesture>,
    pub resize: Option<ResizeGesture>,
    pub transport: Transport,

    pub active_track: Option<TrackId>,
    /// Last grid cell under the pointer; paste target.
    pub cursor_cell: (u32, u32),
    /// Viewport offset of the grid, in terminal cells.
    pub scroll: (u16, u16),

    /// Screen areas recorded at draw time for mouse mapping.
    pub grid_area: Rect,
    pub keys_area: Rect,

    pub audio: Arc<Mutex<AudioState>>,
    _stream: cpal::Stream,

    key_preview: Option<NoteId>,
    dirty: bool,
    should_quit: bool,
    project_path: PathBuf,
}

impl App {
    pub fn new() -> Result<Self> {
        let mut store = ProjectStore::new();
        let path = PathBuf::from(PROJECT_FILE);
        if path.exists() {
            // Any load failure already fell back to a fresh project.
            let _ = store.load_from(&path);
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| eyre!("no default output device available"))?;
        let config = device
            .default_output_config()
            .wrap_err("failed to fetch default output config")?;

        let sample_rate = config.sample_rate().0 as f32;
        let channels = config.channels() as usize;
        info!("audio: {sample_rate} Hz, {channels} channels");

        let mut rack = ChannelRack::new(sample_rate, default_soundfont_root());
        let mut bus = AudioBus::new(sample_rate, &store.project().eq_bands);
        bus.apply_project(store.project());
        rack.sync_with_project(store.project());

        let audio = Arc::new(Mutex::new(AudioState { rack, bus }));

        // The render loop mirrors the rack-then-bus order: channels mix
        // into the bus input, the bus master chain shapes the output.
        let state = audio.clone();
        let mut block = vec![0.0f32; MAX_BLOCK_SIZE];
        let stream = device
            .build_output_stream(
                &config.into(),
                move |data: &mut [f32], _| {
                    let mut state = state.lock().unwrap();
                    let total_frames = data.len() / channels;
                    let mut written = 0;

                    while written < total_frames {
                        let frames = (total_frames - written).min(MAX_BLOCK_SIZE);
                        let chunk = &mut block[..frames];
                        chunk.fill(0.0);

                        state.rack.render_block(chunk);
                        state.bus.render_block(chunk);

                        let out_offset = written * channels;
                        for (i, &sample) in chunk.iter().enumerate() {
                            for ch in 0..channels {
                                data[out_offset + i * channels + ch] = sample;
                            }
                        }
                        written += frames;
                    }
                },
                |err| log::error!("audio stream error: {err}"),
                None,
            )
            .wrap_err("failed to build output stream")?;
        // Some platforms deliver no audio until the stream is explicitly
        // started; do it before the first note can possibly play.
        stream.play().wrap_err("failed to start output stream")?;

        let active_track = store.project().sorted_tracks().first().map(|t| t.id);

        Ok(Self {
            store,
            history: HistoryStore::new(),
            selection: Selection::new(),
            clipboard: Clipboard::new(),
            drag: None,
            resize: None,
            transport: Transport::new(),
            active_track,
            cursor_cell: (0, 0),
            scroll: (0, 0),
            grid_area: Rect::default(),
            keys_area: Rect::default(),
            audio,
            _stream: stream,
            key_preview: None,
            dirty: true,
            should_quit: false,
            project_path: path,
        })
    }

    pub fn geometry(&self) -> GridGeometry {
        GridGeometry::new(self.store.project().cols, ui::COL_WIDTH_PX)
    }

    /// Event loop. Repaints are coalesced through the dirty flag: any burst
    /// of events between two frames produces exactly one draw.
    pub fn run(&mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        while !self.should_quit {
            {
                let mut audio = self.audio.lock().unwrap();
                let AudioState { rack, .. } = &mut *audio;
                if self.transport.tick(self.store.project(), rack) {
                    self.dirty = true;
                }
            }

            if self.dirty {
                terminal.draw(|frame| ui::draw(frame, self))?;
                self.dirty = false;
            }

            if event::poll(Duration::from_millis(16))? {
                // Drain the whole burst before the next paint.
                loop {
                    match event::read()? {
                        Event::Key(key) if key.kind == KeyEventKind::Press => {
                            self.handle_key(key)
                        }
                        Event::Mouse(mouse) => self.handle_mouse(mouse),
                        Event::Resize(_, _) => self.dirty = true,
                        _ => {}
                    }
                    if !event::poll(Duration::ZERO)? {
                        break;
                    }
                }
            }
        }

        {
            let mut audio = self.audio.lock().unwrap();
            self.transport.pause(&mut audio.rack);
            audio.rack.dispose();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Keyboard
    // ------------------------------------------------------------------

    fn handle_key(&mut self, key: KeyEvent) {
        self.dirty = true;

        if let Some(command) = Self::editor_command(&key) {
            self.run_command(command);
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char(' ') => {
                let mut audio = self.audio.lock().unwrap();
                self.transport.toggle(&mut audio.rack);
            }
            KeyCode::Char('r') => {
                let mut audio = self.audio.lock().unwrap();
                self.transport.rewind(&mut audio.rack);
            }
            KeyCode::Char('s') => {
                if let Err(err) = self.store.save_to(&self.project_path) {
                    log::error!("save failed: {err}");
                }
            }
            KeyCode::Char('o') => self.load_project(),
            KeyCode::Char('1') => self.add_track(InstrumentKind::Synth),
            KeyCode::Char('2') => self.add_track(InstrumentKind::Sampler),
            KeyCode::Char('3') => self.add_track(InstrumentKind::Sf2),
            KeyCode::Char('D') => self.delete_active_track(),
            KeyCode::Tab => self.cycle_active_track(),
            KeyCode::Char('m') => self.toggle_mute(),
            KeyCode::Char('x') => self.toggle_solo(),
            KeyCode::Char('-') => self.adjust_volume(-10),
            KeyCode::Char('+') | KeyCode::Char('=') => self.adjust_volume(10),
            KeyCode::Char('<') => self.adjust_reverb(-10),
            KeyCode::Char('>') => self.adjust_reverb(10),
            _ => {}
        }
    }

    /// Translate a crossterm key event into the editor's command surface.
    fn editor_command(key: &KeyEvent) -> Option<EditorCommand> {
        let modifiers = Modifiers {
            primary: key.modifiers.contains(KeyModifiers::CONTROL)
                || key.modifiers.contains(KeyModifiers::SUPER),
            shift: key.modifiers.contains(KeyModifiers::SHIFT),
        };
        let mapped = match key.code {
            KeyCode::Char(c) => Key::Char(c.to_ascii_lowercase()),
            KeyCode::Up => Key::Up,
            KeyCode::Down => Key::Down,
            KeyCode::Left => Key::Left,
            KeyCode::Right => Key::Right,
            KeyCode::Delete => Key::Delete,
            KeyCode::Backspace => Key::Backspace,
            KeyCode::Esc => Key::Escape,
            _ => return None,
        };
        command_for(mapped, modifiers)
    }

    fn run_command(&mut self, command: EditorCommand) {
        let Some(track_id) = self.active_track else {
            return;
        };

        match command {
            EditorCommand::Undo => {
                if let Some(notes) = self.history.undo(track_id) {
                    self.store.set_track_notes(track_id, notes);
                }
            }
            EditorCommand::Redo => {
                if let Some(notes) = self.history.redo(track_id) {
                    self.store.set_track_notes(track_id, notes);
                }
            }
            EditorCommand::DeleteSelection => self.delete_selection(track_id),
            EditorCommand::ClearSelection => self.selection.clear(),
            EditorCommand::Copy => {
                let notes = self.track_notes(track_id);
                self.clipboard.copy(&notes, &self.selection);
            }
            EditorCommand::Paste => {
                let shapes =
                    self.clipboard
                        .paste(self.cursor_cell.0, self.cursor_cell.1, self.store.project().cols);
                self.insert_shapes(track_id, &shapes, "Paste notes");
            }
            EditorCommand::Duplicate => {
                let notes = self.track_notes(track_id);
                let shapes = duplicate(&notes, &self.selection, self.store.project().cols);
                self.insert_shapes(track_id, &shapes, "Duplicate notes");
            }
            EditorCommand::Nudge { dx, dy } => {
                let notes = self.track_notes(track_id);
                if let Some(commits) =
                    nudge_selection(&notes, &self.selection, dx, dy, self.store.project().cols)
                {
                    self.apply_commits(track_id, &commits, "Nudge notes");
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Mouse
    // ------------------------------------------------------------------

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        self.dirty = true;

        match mouse.kind {
            MouseEventKind::ScrollUp => self.scroll.1 = self.scroll.1.saturating_sub(2),
            MouseEventKind::ScrollDown => self.scroll.1 = self.scroll.1.saturating_add(2),
            MouseEventKind::ScrollLeft => self.scroll.0 = self.scroll.0.saturating_sub(2),
            MouseEventKind::ScrollRight => self.scroll.0 = self.scroll.0.saturating_add(2),

            MouseEventKind::Down(MouseButton::Left) => {
                if self.keys_area.contains((mouse.column, mouse.row).into()) {
                    self.press_key(mouse);
                } else if self.grid_area.contains((mouse.column, mouse.row).into()) {
                    self.grid_press(mouse);
                }
            }
            MouseEventKind::Drag(MouseButton::Left) => self.grid_drag(mouse),
            MouseEventKind::Up(MouseButton::Left) => self.grid_release(),

            MouseEventKind::Down(MouseButton::Right) => {
                if self.grid_area.contains((mouse.column, mouse.row).into()) {
                    self.grid_right_click(mouse);
                }
            }
            _ => {}
        }

        if self.grid_area.contains((mouse.column, mouse.row).into()) {
            let (px, py) = self.grid_px(mouse.column, mouse.row);
            self.cursor_cell = self.geometry().cell_at(px, py);
        }
    }

    /// Pixel position of a terminal cell inside the grid.
    fn grid_px(&self, column: u16, row: u16) -> (f32, f32) {
        let cx = (column.saturating_sub(self.grid_area.x) + self.scroll.0) as f32;
        let cy = (row.saturating_sub(self.grid_area.y) + self.scroll.1) as f32;
        (cx * ui::PX_PER_CELL_X, cy * ui::PX_PER_CELL_Y)
    }

    fn press_key(&mut self, mouse: MouseEvent) {
        let Some(track_id) = self.active_track else {
            return;
        };
        let px = (mouse.column.saturating_sub(self.keys_area.x)) as f32 * ui::PX_PER_CELL_X;
        let py = (mouse.row.saturating_sub(self.keys_area.y) + self.scroll.1) as f32
            * ui::PX_PER_CELL_Y;

        let rects = keys_render::build_key_rects(ui::KEYS_WIDTH_PX);
        if let Some(note) = keys_render::key_at(&rects, px, py) {
            let preview = NoteId::new();
            let mut audio = self.audio.lock().unwrap();
            audio
                .rack
                .play_note_on_track(self.store.project(), track_id, note, preview, DEFAULT_VELOCITY);
            self.key_preview = Some(preview);
        }
    }

    fn grid_press(&mut self, mouse: MouseEvent) {
        let (px, py) = self.grid_px(mouse.column, mouse.row);
        let Some(track_id) = self.active_track else {
            return;
        };
        let notes = self.track_notes(track_id);
        let views = self.note_views(&notes);
        let geometry = self.geometry();

        if let Some(note_id) = grid_render::note_at(geometry, px, py, &views) {
            let note = *notes.iter().find(|n| n.id == note_id).unwrap();
            let view = views.iter().find(|v| v.id == note_id).unwrap();

            if grid_render::on_resize_handle(geometry, px, view) {
                self.resize = Some(ResizeGesture::begin(px, &note, &self.selection, &notes));
            } else {
                self.drag = Some(DragGesture::begin(px, py, &note, &self.selection, &notes));
            }
        } else {
            self.selection.begin(px, py);
        }
    }

    fn grid_drag(&mut self, mouse: MouseEvent) {
        let (px, py) = self.grid_px(mouse.column, mouse.row);
        let cols = self.store.project().cols;
        let geometry = self.geometry();

        if let Some(drag) = &mut self.drag {
            drag.update(px, py, geometry.col_width, cols);
        } else if let Some(resize) = &mut self.resize {
            resize.update(px, geometry.col_width, cols);
        } else if self.selection.is_selecting() {
            self.selection.update(px, py, geometry);
        }
    }

    fn grid_release(&mut self) {
        if let Some(preview) = self.key_preview.take() {
            if let Some(track_id) = self.active_track {
                let mut audio = self.audio.lock().unwrap();
                audio.rack.stop_note_on_track(track_id, preview);
            }
        }
        let Some(track_id) = self.active_track else {
            self.drag = None;
            self.resize = None;
            return;
        };

        if let Some(drag) = self.drag.take() {
            let clicked = drag.clicked_note();
            let was_selected = drag.was_selected();
            let moved = drag.has_moved();
            if let Some(commits) = drag.finish() {
                self.apply_commits(track_id, &commits, "Move notes");
            }
            if !moved && !was_selected {
                // A plain click selects just that note.
                self.selection.replace([clicked]);
            }
            return;
        }

        if let Some(resize) = self.resize.take() {
            if let Some(commits) = resize.finish() {
                self.apply_commits(track_id, &commits, "Resize notes");
            }
            return;
        }

        if self.selection.is_selecting() {
            let geometry = self.geometry();
            let bounds = self.selection.rect().map(|r| r.bounds());
            let notes = self.track_notes(track_id);
            self.selection.finish(&notes, geometry);

            // A zero-ish rectangle was a plain click on empty canvas:
            // clear, unless a real drag-select just ended.
            if let Some(bounds) = bounds {
                if bounds.w < 2.0 && bounds.h < 2.0 && !self.selection.take_just_finished() {
                    self.selection.clear();
                }
            }
        }
    }

    fn grid_right_click(&mut self, mouse: MouseEvent) {
        let Some(track_id) = self.active_track else {
            return;
        };
        let (px, py) = self.grid_px(mouse.column, mouse.row);
        let notes = self.track_notes(track_id);
        let views = self.note_views(&notes);
        let geometry = self.geometry();

        if let Some(note_id) = grid_render::note_at(geometry, px, py, &views) {
            let before = notes.clone();
            if self.store.remove_note(track_id, note_id) {
                let after = self.track_notes(track_id);
                self.history.push(track_id, &before, &after, "Remove note");
                self.selection.remove(note_id);
            }
        } else {
            let (col, row) = geometry.cell_at(px, py);
            let before = notes;
            if let Some(new_id) = self.store.add_note(track_id, col, row, 1) {
                let after = self.track_notes(track_id);
                self.history.push(track_id, &before, &after, "Add note");
                self.selection.replace([new_id]);
            }
        }
    }

    // ------------------------------------------------------------------
    // Editing helpers
    // ------------------------------------------------------------------

    pub fn track_notes(&self, track_id: TrackId) -> Vec<MidiNote> {
        self.store
            .project()
            .track(track_id)
            .map(|t| t.notes.clone())
            .unwrap_or_default()
    }

    /// Renderer views of the active track's notes, with gesture previews.
    pub fn note_views(&self, notes: &[MidiNote]) -> Vec<grid_render::NoteView> {
        notes
            .iter()
            .map(|note| {
                let dragging = self.drag.as_ref().is_some_and(|d| d.involves(note.id));
                let resizing = self.resize.as_ref().is_some_and(|r| r.involves(note.id));
                let preview = if dragging {
                    self.drag.as_ref().and_then(|d| d.preview_for(note.id))
                } else if resizing {
                    self.resize
                        .as_ref()
                        .and_then(|r| r.preview_for(note.id))
                        .map(|(x, w)| (x, note.y, w))
                } else {
                    None
                };
                grid_render::NoteView {
                    id: note.id,
                    x: note.x,
                    y: note.y,
                    w: note.w,
                    selected: self.selection.contains(note.id),
                    dragging,
                    resizing,
                    preview,
                }
            })
            .collect()
    }

    fn apply_commits(&mut self, track_id: TrackId, commits: &[NoteCommit], description: &str) {
        let before = self.track_notes(track_id);
        self.history.start_batch(track_id, &before, description);
        for commit in commits {
            self.store.update_note(track_id, commit.note_id, commit.update);
        }
        let after = self.track_notes(track_id);
        self.history.end_batch(&after);
    }

    fn delete_selection(&mut self, track_id: TrackId) {
        if self.selection.is_empty() {
            return;
        }
        let before = self.track_notes(track_id);
        self.history.start_batch(track_id, &before, "Delete notes");
        let ids: Vec<NoteId> = self.selection.ids().iter().copied().collect();
        for id in ids {
            self.store.remove_note(track_id, id);
        }
        let after = self.track_notes(track_id);
        self.history.end_batch(&after);
        self.selection.clear();
    }

    fn insert_shapes(
        &mut self,
        track_id: TrackId,
        shapes: &[gridtone::roll::clipboard::PastedNote],
        description: &str,
    ) {
        if shapes.is_empty() {
            return;
        }
        let before = self.track_notes(track_id);
        self.history.start_batch(track_id, &before, description);
        for shape in shapes {
            self.store.add_note(track_id, shape.x, shape.y, shape.w);
        }
        let after = self.track_notes(track_id);
        self.history.end_batch(&after);

        select_pasted(&after, shapes, &mut self.selection);
    }

    // ------------------------------------------------------------------
    // Track management
    // ------------------------------------------------------------------

    fn add_track(&mut self, kind: InstrumentKind) {
        let id = self
            .store
            .create_track(InstrumentConfig::default_for(kind), None);
        self.active_track = Some(id);
        let mut audio = self.audio.lock().unwrap();
        audio.rack.sync_with_project(self.store.project());
    }

    fn delete_active_track(&mut self) {
        let Some(track_id) = self.active_track else {
            return;
        };
        if self.store.delete_track(track_id) {
            // Cascade: audio channel and history go with the track.
            self.history.clear_track(track_id);
            self.selection.clear();
            let mut audio = self.audio.lock().unwrap();
            audio.rack.sync_with_project(self.store.project());
            self.active_track = self.store.project().sorted_tracks().first().map(|t| t.id);
        }
    }

    fn cycle_active_track(&mut self) {
        let sorted = self.store.project().sorted_tracks();
        if sorted.is_empty() {
            self.active_track = None;
            return;
        }
        let next = match self.active_track {
            None => 0,
            Some(current) => sorted
                .iter()
                .position(|t| t.id == current)
                .map(|i| (i + 1) % sorted.len())
                .unwrap_or(0),
        };
        self.active_track = Some(sorted[next].id);
        self.selection.clear();
    }

    fn toggle_mute(&mut self) {
        if let Some(track_id) = self.active_track {
            let muted = self
                .store
                .project()
                .track(track_id)
                .map(|t| t.muted)
                .unwrap_or(false);
            self.store.set_track_muted(track_id, !muted);
        }
    }

    fn toggle_solo(&mut self) {
        if let Some(track_id) = self.active_track {
            let solo = self
                .store
                .project()
                .track(track_id)
                .map(|t| t.solo)
                .unwrap_or(false);
            self.store.set_track_solo(track_id, !solo);
        }
    }

    fn adjust_volume(&mut self, delta: i16) {
        if let Some(track_id) = self.active_track {
            if let Some(track) = self.store.project().track(track_id) {
                let volume = (track.volume as i16 + delta).clamp(0, 100) as u8;
                self.store.set_track_volume(track_id, volume);
                let mut audio = self.audio.lock().unwrap();
                audio.rack.update_track_volume(track_id, volume);
            }
        }
    }

    fn adjust_reverb(&mut self, delta: i16) {
        if let Some(track_id) = self.active_track {
            if let Some(track) = self.store.project().track(track_id) {
                let reverb = (track.reverb as i16 + delta).clamp(0, 100) as u8;
                self.store.set_track_reverb(track_id, reverb);
                let mut audio = self.audio.lock().unwrap();
                audio.rack.update_track_reverb(track_id, reverb);
            }
        }
    }

    fn load_project(&mut self) {
        let _ = self.store.load_from(&self.project_path);
        // A replaced document invalidates every runtime companion.
        self.history.clear_all();
        self.selection.clear();
        self.clipboard = Clipboard::new();
        self.active_track = self.store.project().sorted_tracks().first().map(|t| t.id);

        let mut audio = self.audio.lock().unwrap();
        let AudioState { rack, bus } = &mut *audio;
        self.transport.pause(rack);
        rack.sync_with_project(self.store.project());
        bus.apply_project(self.store.project());
    }

    /// Rows that should light up in the grid (notes sounding at the
    /// playhead on the active track).
    pub fn active_rows(&self) -> Vec<u32> {
        match self.active_track {
            Some(track_id) => self.transport.active_rows(self.store.project(), track_id),
            None => Vec::new(),
        }
    }

    /// Pitch names sounding at the playhead, for the keys column.
    pub fn active_note_names(&self) -> Vec<gridtone::pitch::NoteName> {
        self.active_rows().into_iter().map(note_for_row).collect()
    }
}
