use std::collections::HashMap;
use std::path::PathBuf;

use crate::dsp::envelope::Envelope;
use crate::pitch::NoteName;
use crate::project::instrument::{ConfigUpdate, InstrumentKind};
use crate::project::note::NoteId;

use super::library::{Loader, SampleLibrary};
use super::sampler::SampleVoice;
use super::status::{EngineState, StateCell, SubscriptionId};
use super::InstrumentEngine;

/*
Enveloped Sampler
=================

The specialized sampler variant. Two things set it apart from the plain one:

 1. Every voice is wrapped in an explicit ADSR envelope, so the raw
    recordings can be shaped into pads, plucks or organs from the mixer.
 2. The WHOLE library stays resident, so switching to another instrument
    inside it is instant - stop the sounding voices, move a pointer. Only
    changing to a different library costs a reload.
*/

struct EnvVoice {
    sample: SampleVoice,
    envelope: Envelope,
    gain: f32,
}

impl EnvVoice {
    fn render(&mut self, out: &mut [f32], sample_rate: f32) {
        for slot in out.iter_mut() {
            let level = self.envelope.next_sample(sample_rate);
            *slot += self.sample.next(sample_rate) * level * self.gain;
        }
    }

    fn is_finished(&self) -> bool {
        self.sample.is_done() || !self.envelope.is_active()
    }
}

pub struct EnvelopedEngine {
    library_name: String,
    /// Instrument within the library; empty means "the library's first".
    instrument: String,
    gain: f32,
    attack: f32,
    decay: f32,
    sustain: f32,
    release: f32,

    status: StateCell,
    loader: Loader,
    library: Option<SampleLibrary>,
    active: HashMap<NoteId, EnvVoice>,
    /// Released voices still in their envelope tail.
    releasing: Vec<EnvVoice>,
    pending: Vec<(NoteName, NoteId)>,
    disposed: bool,
}

impl EnvelopedEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        soundfont_root: PathBuf,
        library: String,
        instrument: String,
        gain: f32,
        attack: f32,
        decay: f32,
        sustain: f32,
        release: f32,
    ) -> Self {
        Self {
            library_name: library,
            instrument,
            gain,
            attack,
            decay,
            sustain,
            release,
            status: StateCell::new(EngineState::Idle),
            loader: Loader::new(soundfont_root),
            library: None,
            active: HashMap::new(),
            releasing: Vec::new(),
            pending: Vec::new(),
            disposed: false,
        }
    }

    /// Names of every instrument in the resident library.
    pub fn instrument_names(&self) -> Vec<String> {
        self.library
            .as_ref()
            .map(|l| l.instrument_names())
            .unwrap_or_default()
    }

    pub fn poll(&mut self) {
        if let Some(library) = self.loader.poll(&self.status) {
            if self.instrument.is_empty() {
                if let Some(first) = library.instruments.first() {
                    self.instrument = first.name.clone();
                }
            }
            self.library = Some(library);
            for (note, note_id) in std::mem::take(&mut self.pending) {
                self.start_voice(note, note_id);
            }
        }
        if self.status.get() == EngineState::Error {
            self.pending.clear();
        }
    }

    fn start_voice(&mut self, note: NoteName, note_id: NoteId) {
        // Clone the handle out of the library (frames are Arc-shared) so
        // the retrigger below can take `self` mutably.
        let Some(instrument) = self.library.as_ref().and_then(|library| {
            library
                .instrument(&self.instrument)
                .or_else(|| library.instruments.first())
                .cloned()
        }) else {
            return;
        };

        if self.active.contains_key(&note_id) {
            self.stop_note(note_id);
        }

        let mut envelope = Envelope::adsr(self.attack, self.decay, self.sustain, self.release);
        envelope.note_on();

        self.active.insert(
            note_id,
            EnvVoice {
                sample: SampleVoice::new(&instrument, note.frequency()),
                envelope,
                gain: self.gain,
            },
        );
    }

    /// Switch to another instrument in the resident library. No reload: the
    /// sounding voices stop, the next note uses the new instrument.
    fn switch_instrument(&mut self, name: &str) {
        if name == self.instrument {
            return;
        }
        if let Some(library) = &self.library {
            if library.instrument(name).is_some() {
                self.stop_all_notes();
            }
        }
        self.instrument = name.to_string();
    }

    #[cfg(test)]
    pub fn active_voice_count(&self) -> usize {
        self.active.len()
    }

    #[cfg(test)]
    pub fn current_instrument(&self) -> &str {
        &self.instrument
    }
}

impl InstrumentEngine for EnvelopedEngine {
    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Sf2
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
        self.loader.begin(&self.library_name, &self.status);
    }

    fn play_note(&mut self, note: NoteName, note_id: NoteId, _velocity: f32) {
        if self.disposed {
            return;
        }
        self.poll();

        if self.status.get() == EngineState::Ready {
            self.start_voice(note, note_id);
        } else {
            self.pending.push((note, note_id));
            self.preload();
        }
    }

    fn stop_note(&mut self, note_id: NoteId) {
        self.pending.retain(|(_, id)| *id != note_id);
        if let Some(mut voice) = self.active.remove(&note_id) {
            voice.envelope.note_off();
            self.releasing.push(voice);
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
        if let Some(v) = update.attack {
            self.attack = v;
        }
        if let Some(v) = update.decay {
            self.decay = v;
        }
        if let Some(v) = update.sustain {
            self.sustain = v;
        }
        if let Some(v) = update.release {
            self.release = v;
        }
        if let Some(name) = &update.instrument {
            self.switch_instrument(name);
        }
        if let Some(name) = &update.soundfont {
            if *name != self.library_name {
                self.stop_all_notes();
                self.library = None;
                self.library_name = name.clone();
                self.loader.begin(name, &self.status);
            }
        }
    }

    fn dispose(&mut self) {
        self.active.clear();
        self.releasing.clear();
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
        for voice in &mut self.releasing {
            voice.render(out, sample_rate);
        }
        self.releasing.retain(|v| !v.is_finished());
        self.active.retain(|_, v| !v.is_finished());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::library::test_fixtures::write_library;
    use std::time::Duration;

    const SAMPLE_RATE: f32 = 48_000.0;

    fn engine_with(root: std::path::PathBuf, library: &str) -> EnvelopedEngine {
        EnvelopedEngine::new(
            root,
            library.to_string(),
            String::new(),
            1.0,
            0.0,
            0.0,
            1.0,
            0.3,
        )
    }

    fn wait_settled(engine: &mut EnvelopedEngine) {
        for _ in 0..500 {
            engine.poll();
            match engine.state() {
                EngineState::Ready | EngineState::Error => return,
                _ => std::thread::sleep(Duration::from_millis(2)),
            }
        }
        panic!("engine never settled");
    }

    #[test]
    fn empty_instrument_selects_librarys_first() {
        let root = write_library("env-first", "retro", &["lead", "bass"]);
        let mut engine = engine_with(root, "retro");
        engine.preload();
        wait_settled(&mut engine);
        assert_eq!(engine.current_instrument(), "lead");
        assert_eq!(engine.instrument_names(), vec!["lead", "bass"]);
    }

    #[test]
    fn instrument_switch_does_not_reload() {
        let root = write_library("env-switch", "retro", &["lead", "bass"]);
        let mut engine = engine_with(root, "retro");
        engine.preload();
        wait_settled(&mut engine);

        engine.play_note("C4".parse().unwrap(), NoteId::new(), 100.0);
        assert_eq!(engine.active_voice_count(), 1);

        engine.update_config(&ConfigUpdate {
            instrument: Some("bass".into()),
            ..Default::default()
        });
        // Still ready - no load happened - but sounding voices stopped.
        assert_eq!(engine.state(), EngineState::Ready);
        assert_eq!(engine.current_instrument(), "bass");
        assert_eq!(engine.active_voice_count(), 0);
    }

    #[test]
    fn envelope_shapes_the_voice() {
        let root = write_library("env-shape", "retro", &["lead"]);
        let mut engine = EnvelopedEngine::new(
            root,
            "retro".into(),
            String::new(),
            1.0,
            // Slow attack: early output must be quieter than the raw sample
            0.5,
            0.0,
            1.0,
            0.1,
        );
        engine.preload();
        wait_settled(&mut engine);

        engine.play_note("C4".parse().unwrap(), NoteId::new(), 100.0);
        let mut buffer = vec![0.0; 16];
        engine.render_block(&mut buffer, SAMPLE_RATE);
        // 16 samples into a 0.5 s attack the envelope is ~0.0007
        assert!(buffer.iter().all(|s| s.abs() < 0.01));
    }

    #[test]
    fn released_voice_finishes_after_tail() {
        let root = write_library("env-release", "retro", &["lead"]);
        let mut engine = engine_with(root, "retro");
        engine.preload();
        wait_settled(&mut engine);

        let id = NoteId::new();
        engine.play_note("C4".parse().unwrap(), id, 100.0);
        engine.stop_note(id);
        assert_eq!(engine.active_voice_count(), 0);

        // The release tail drains on its own as blocks render.
        let mut buffer = vec![0.0; 256];
        for _ in 0..80 {
            buffer.fill(0.0);
            engine.render_block(&mut buffer, SAMPLE_RATE);
        }
        buffer.fill(0.0);
        engine.render_block(&mut buffer, SAMPLE_RATE);
        assert!(buffer.iter().all(|s| s.abs() < 0.001));
    }

    #[test]
    fn library_switch_reloads() {
        let root = write_library("env-reload", "one", &["a"]);
        let _ = write_library("env-reload", "two", &["b"]);
        let mut engine = engine_with(root, "one");
        engine.preload();
        wait_settled(&mut engine);

        engine.update_config(&ConfigUpdate {
            soundfont: Some("two".into()),
            ..Default::default()
        });
        assert_eq!(engine.state(), EngineState::Loading);
        wait_settled(&mut engine);
        assert_eq!(engine.state(), EngineState::Ready);
        assert_eq!(engine.instrument_names(), vec!["b"]);
    }
}
