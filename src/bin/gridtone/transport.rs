//! Minimal column-stepping playhead.
//!
//! The real transport is a collaborator outside the core; this one does
//! just enough to hear a project: every beat-length tick it stops the notes
//! that end at the new column and starts the ones that begin there, routed
//! through the channel rack (which applies mute/solo gating per call).

use std::time::Instant;

use gridtone::audio::ChannelRack;
use gridtone::pitch::note_for_row;
use gridtone::project::note::NoteId;
use gridtone::project::track::TrackId;
use gridtone::project::TimelineProject;

pub struct Transport {
    playing: bool,
    col: u32,
    last_step: Option<Instant>,
    /// Notes currently held: (track, note id, end column).
    sounding: Vec<(TrackId, NoteId, u32)>,
}

impl Transport {
    pub fn new() -> Self {
        Self {
            playing: false,
            col: 0,
            last_step: None,
            sounding: Vec::new(),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn col(&self) -> u32 {
        self.col
    }

    pub fn toggle(&mut self, rack: &mut ChannelRack) {
        if self.playing {
            self.pause(rack);
        } else {
            self.playing = true;
            self.last_step = None;
        }
    }

    pub fn pause(&mut self, rack: &mut ChannelRack) {
        self.playing = false;
        self.last_step = None;
        for (track_id, note_id, _) in self.sounding.drain(..) {
            rack.stop_note_on_track(track_id, note_id);
        }
    }

    pub fn rewind(&mut self, rack: &mut ChannelRack) {
        let was_playing = self.playing;
        self.pause(rack);
        self.col = 0;
        self.playing = was_playing;
    }

    /// Advance if a column period elapsed. Returns true when the playhead
    /// moved (the caller repaints).
    pub fn tick(&mut self, project: &TimelineProject, rack: &mut ChannelRack) -> bool {
        if !self.playing {
            return false;
        }

        // One column per beat.
        let col_secs = 60.0 / project.tempo.max(1.0);
        let now = Instant::now();

        let due = match self.last_step {
            None => true,
            Some(last) => now.duration_since(last).as_secs_f64() >= col_secs,
        };
        if !due {
            return false;
        }

        if self.last_step.is_some() {
            self.col += 1;
            if self.col >= project.cols {
                self.col = 0;
            }
        }
        self.last_step = Some(now);
        self.step(project, rack);
        true
    }

    fn step(&mut self, project: &TimelineProject, rack: &mut ChannelRack) {
        let col = self.col;

        // Release notes whose duration ended at this column (or that
        // vanished from the project since they started).
        let mut still_sounding = Vec::with_capacity(self.sounding.len());
        for (track_id, note_id, end) in self.sounding.drain(..) {
            if end <= col || col == 0 {
                rack.stop_note_on_track(track_id, note_id);
            } else {
                still_sounding.push((track_id, note_id, end));
            }
        }
        self.sounding = still_sounding;

        for track in &project.tracks {
            for note in &track.notes {
                if note.x == col {
                    rack.play_note_on_track(
                        project,
                        track.id,
                        note_for_row(note.y),
                        note.id,
                        gridtone::engine::DEFAULT_VELOCITY,
                    );
                    self.sounding.push((track.id, note.id, note.right()));
                }
            }
        }
    }

    /// Rows sounding on `track_id` right now (for the active-row highlight).
    pub fn active_rows(&self, project: &TimelineProject, track_id: TrackId) -> Vec<u32> {
        if !self.playing {
            return Vec::new();
        }
        project
            .notes_at_column(track_id, self.col)
            .iter()
            .map(|n| n.y)
            .collect()
    }
}
