use std::collections::HashMap;
use std::path::PathBuf;

use crate::pitch::NoteName;
use crate::project::instrument::{ConfigUpdate, InstrumentKind};
use crate::project::note::NoteId;

use super::library::{Loader, SampleLibrary, SampledInstrument};
use super::status::{EngineState, StateCell, SubscriptionId};
use super::InstrumentEngine;

const RELEASE_SECONDS: f32 = 0.02;
const SILENCE_FLOOR: f32 = 0.001;

/// Pitched playback of one recorded sample.
///
/// Repitching is linear-interpolation resampling: the read head advances by
/// `target_freq / base_freq` recording-frames per recording-frame, corrected
/// for the recording/output sample-rate ratio. One-shot: the voice is done
/// when the read head runs off the recording.
pub(super) struct SampleVoice {
    frames: std::sync::Arc<Vec<f32>>,
    /// Read-head advance per output sample, premultiplied by the recording
    /// sample rate (divide by the output rate at render time).
    step_hz: f32,
    position: f64,
    done: bool,
}

impl SampleVoice {
    pub(super) fn new(instrument: &SampledInstrument, frequency: f32) -> Self {
        Self {
            frames: instrument.frames.clone(),
            step_hz: frequency / instrument.base_frequency() * instrument.sample_rate,
            position: 0.0,
            done: instrument.frames.len() < 2,
        }
    }

    #[inline]
    pub(super) fn next(&mut self, out_sample_rate: f32) -> f32 {
        if self.done {
            return 0.0;
        }
        let index = self.position as usize;
        if index + 1 >= self.frames.len() {
            self.done = true;
            return 0.0;
        }
        let frac = (self.position - index as f64) as f32;
        let sample = self.frames[index] * (1.0 - frac) + self.frames[index + 1] * frac;

        self.position += (self.step_hz / out_sample_rate) as f64;
        sample
    }

    pub(super) fn is_done(&self) -> bool {
        self.done
    }
}

struct PlainVoice {
    sample: SampleVoice,
    gain: f32,
    released: bool,
}

impl PlainVoice {
    fn render(&mut self, out: &mut [f32], sample_rate: f32) {
        let decay = if self.released {
            (SILENCE_FLOOR.ln() / (RELEASE_SECONDS * sample_rate)).exp()
        } else {
            1.0
        };
        for slot in out.iter_mut() {
            *slot += self.sample.next(sample_rate) * self.gain;
            self.gain *= decay;
        }
    }

    fn is_silent(&self) -> bool {
        self.sample.is_done() || (self.released && self.gain < SILENCE_FLOOR)
    }
}

/// Soundfont sampler: plays one instrument out of an asynchronously loaded
/// sample library. `Ready` only once the library is resident.
pub struct SamplerEngine {
    soundfont: String,
    gain: f32,
    status: StateCell,
    loader: Loader,
    library: Option<SampleLibrary>,
    active: HashMap<NoteId, PlainVoice>,
    fading: Vec<PlainVoice>,
    /// Notes played before the library arrived; flushed on install, dropped
    /// on load failure.
    pending: Vec<(NoteName, NoteId)>,
    disposed: bool,
}

impl SamplerEngine {
    pub fn new(soundfont_root: PathBuf, soundfont: String, gain: f32) -> Self {
        Self {
            soundfont,
            gain,
            status: StateCell::new(EngineState::Idle),
            loader: Loader::new(soundfont_root),
            library: None,
            active: HashMap::new(),
            fading: Vec::new(),
            pending: Vec::new(),
            disposed: false,
        }
    }

    /// Install a finished load, if any, and flush deferred notes.
    pub fn poll(&mut self) {
        if let Some(library) = self.loader.poll(&self.status) {
            self.library = Some(library);
            for (note, note_id) in std::mem::take(&mut self.pending) {
                self.start_voice(note, note_id);
            }
        }
        if self.status.get() == EngineState::Error {
            // The notes that were waiting on this load never sound.
            self.pending.clear();
        }
    }

    fn start_voice(&mut self, note: NoteName, note_id: NoteId) {
        // Clone out of the library first; the frames are Arc-shared, so
        // this is a handle copy, and it frees `self` for the retrigger.
        let Some(instrument) = self
            .library
            .as_ref()
            .and_then(|l| l.instruments.first())
            .cloned()
        else {
            return;
        };
        if self.active.contains_key(&note_id) {
            self.stop_note(note_id);
        }
        self.active.insert(
            note_id,
            PlainVoice {
                sample: SampleVoice::new(&instrument, note.frequency()),
                gain: self.gain,
                released: false,
            },
        );
    }

    #[cfg(test)]
    pub fn active_voice_count(&self) -> usize {
        self.active.len()
    }
}

impl InstrumentEngine for SamplerEngine {
    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Sampler
    }

    fn state(&self) -> EngineState {
        self.status.get()
    }

    fn on_state_change(&self, callback: Box<dyn Fn(EngineState) + Send>) -> SubscriptionId {
        self.status.subscribe(callback)
    }

    fn unsubscribe(&self, subscription: SubscriptionId) {
        self.status.unsubscribe(subscription);
    }

    fn preload(&mut self) {
        if self.disposed || self.status.get() == EngineState::Ready || self.loader.is_loading() {
            return;
        }
        self.loader.begin(&self.soundfont, &self.status);
    }

    fn play_note(&mut self, note: NoteName, note_id: NoteId, _velocity: f32) {
        if self.disposed {
            return;
        }
        self.poll();

        if self.status.get() == EngineState::Ready {
            self.start_voice(note, note_id);
        } else {
            // Fire-and-forget: defer until the (implicitly started) load
            // lands; if it fails the note just never sounds.
            self.pending.push((note, note_id));
            self.preload();
        }
    }

    fn stop_note(&mut self, note_id: NoteId) {
        self.pending.retain(|(_, id)| *id != note_id);
        if let Some(mut voice) = self.active.remove(&note_id) {
            voice.released = true;
            self.fading.push(voice);
        }
    }

    fn stop_all_notes(&mut self) {
        self.pending.clear();
        let ids: Vec<NoteId> = self.active.keys().copied().collect();
        for id in ids {
            self.stop_note(id);
        }
    }

    fn update_config(&mut self, update: &ConfigUpdate) {
        if let Some(gain) = update.gain {
            self.gain = gain;
        }
        if let Some(name) = &update.soundfont {
            if *name != self.soundfont {
                // Library switch invalidates everything currently sounding.
                self.stop_all_notes();
                self.library = None;
                self.soundfont = name.clone();
                self.loader.begin(name, &self.status);
            }
        }
    }

    fn dispose(&mut self) {
        self.active.clear();
        self.fading.clear();
        self.pending.clear();
        self.library = None;
        self.loader.abandon();
        self.status.clear_listeners();
        self.status.set(EngineState::Idle);
        self.disposed = true;
    }

    fn render_block(&mut self, out: &mut [f32], sample_rate: f32) {
        self.poll();
        for voice in self.active.values_mut() {
            voice.render(out, sample_rate);
        }
        for voice in &mut self.fading {
            voice.render(out, sample_rate);
        }
        self.fading.retain(|v| !v.is_silent());
        self.active.retain(|_, v| !v.sample.is_done());
    }
}
