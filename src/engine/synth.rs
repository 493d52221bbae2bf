use std::collections::HashMap;

use crate::dsp::oscillator::{Oscillator, Waveform};
use crate::pitch::NoteName;
use crate::project::instrument::{ConfigUpdate, InstrumentKind};
use crate::project::note::NoteId;

use super::status::{EngineState, StateCell, SubscriptionId};
use super::InstrumentEngine;

/// Seconds a stopped voice takes to fade out. Cutting an oscillator dead
/// produces a click; a short exponential tail does not.
const RELEASE_SECONDS: f32 = 0.02;

/// Level below which a fading voice is considered silent and freed.
const SILENCE_FLOOR: f32 = 0.001;

/// One sounding oscillator voice.
struct SynthVoice {
    oscillator: Oscillator,
    frequency: f32,
    /// Velocity-scaled amplitude; decays per sample once released.
    gain: f32,
    released: bool,
}

impl SynthVoice {
    fn render(&mut self, out: &mut [f32], sample_rate: f32) {
        if !self.released {
            self.oscillator
                .render_add(out, self.frequency, self.gain, sample_rate);
            return;
        }

        // Exponential release: decay the gain every sample.
        let decay = (SILENCE_FLOOR.ln() / (RELEASE_SECONDS * sample_rate)).exp();
        for sample in out.iter_mut() {
            let mut one = 0.0;
            self.oscillator
                .render_add(std::slice::from_mut(&mut one), self.frequency, self.gain, sample_rate);
            *sample += one;
            self.gain *= decay;
        }
    }

    fn is_silent(&self) -> bool {
        self.released && self.gain < SILENCE_FLOOR
    }
}

/// The oscillator synth: zero latency, no resources to load, so it is
/// `Ready` from construction on.
pub struct SynthEngine {
    waveform: Waveform,
    gain: f32,
    status: StateCell,
    /// Held voices, keyed by the note id that started them.
    active: HashMap<NoteId, SynthVoice>,
    /// Released voices fading toward silence; freed once inaudible.
    fading: Vec<SynthVoice>,
    disposed: bool,
}

impl SynthEngine {
    pub fn new(waveform: Waveform, gain: f32) -> Self {
        Self {
            waveform,
            gain,
            status: StateCell::new(EngineState::Ready),
            active: HashMap::new(),
            fading: Vec::new(),
            disposed: false,
        }
    }

    #[cfg(test)]
    pub fn active_voice_count(&self) -> usize {
        self.active.len()
    }
}

impl InstrumentEngine for SynthEngine {
    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Synth
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
        // Nothing to load.
    }

    fn play_note(&mut self, note: NoteName, note_id: NoteId, velocity: f32) {
        if self.disposed {
            return;
        }
        // Retrigger: the old voice goes into its release tail first.
        if self.active.contains_key(&note_id) {
            self.stop_note(note_id);
        }

        let voice = SynthVoice {
            oscillator: Oscillator::new(self.waveform),
            frequency: note.frequency(),
            gain: (velocity / 127.0).clamp(0.0, 1.0) * self.gain,
            released: false,
        };
        self.active.insert(note_id, voice);
    }

    fn stop_note(&mut self, note_id: NoteId) {
        if let Some(mut voice) = self.active.remove(&note_id) {
            voice.released = true;
            self.fading.push(voice);
        }
    }

    fn stop_all_notes(&mut self) {
        let ids: Vec<NoteId> = self.active.keys().copied().collect();
        for id in ids {
            self.stop_note(id);
        }
    }

    fn update_config(&mut self, update: &ConfigUpdate) {
        if let Some(waveform) = update.waveform {
            // Applies to voices started from here on.
            self.waveform = waveform;
        }
        if let Some(gain) = update.gain {
            self.gain = gain;
        }
    }

    fn dispose(&mut self) {
        self.active.clear();
        self.fading.clear();
        self.status.clear_listeners();
        self.status.set(EngineState::Idle);
        self.disposed = true;
    }

    fn render_block(&mut self, out: &mut [f32], sample_rate: f32) {
        for voice in self.active.values_mut() {
            voice.render(out, sample_rate);
        }
        for voice in &mut self.fading {
            voice.render(out, sample_rate);
        }
        self.fading.retain(|v| !v.is_silent());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 48_000.0;

    fn a4() -> NoteName {
        "A4".parse().unwrap()
    }

    fn rms(buffer: &[f32]) -> f32 {
        (buffer.iter().map(|s| s * s).sum::<f32>() / buffer.len() as f32).sqrt()
    }

    #[test]
    fn ready_from_construction() {
        let engine = SynthEngine::new(Waveform::Sine, 1.0);
        assert_eq!(engine.state(), EngineState::Ready);
    }

    #[test]
    fn playing_produces_signal() {
        let mut engine = SynthEngine::new(Waveform::Sine, 1.0);
        engine.play_note(a4(), NoteId::new(), 100.0);

        let mut buffer = vec![0.0; 512];
        engine.render_block(&mut buffer, SAMPLE_RATE);
        assert!(rms(&buffer) > 0.01);
    }

    #[test]
    fn stop_fades_to_silence() {
        let mut engine = SynthEngine::new(Waveform::Sine, 1.0);
        let id = NoteId::new();
        engine.play_note(a4(), id, 100.0);

        let mut buffer = vec![0.0; 256];
        engine.render_block(&mut buffer, SAMPLE_RATE);

        engine.stop_note(id);
        // Render past the 20 ms release window
        for _ in 0..8 {
            buffer.fill(0.0);
            engine.render_block(&mut buffer, SAMPLE_RATE);
        }
        buffer.fill(0.0);
        engine.render_block(&mut buffer, SAMPLE_RATE);
        assert!(rms(&buffer) < 0.001, "voice should have faded out");
    }

    #[test]
    fn retrigger_replaces_the_voice() {
        let mut engine = SynthEngine::new(Waveform::Sine, 1.0);
        let id = NoteId::new();
        engine.play_note(a4(), id, 100.0);
        engine.play_note(a4(), id, 100.0);
        assert_eq!(engine.active_voice_count(), 1);
    }

    #[test]
    fn stop_of_unknown_id_is_a_no_op() {
        let mut engine = SynthEngine::new(Waveform::Sine, 1.0);
        engine.stop_note(NoteId::new());
        assert_eq!(engine.active_voice_count(), 0);
    }

    #[test]
    fn stop_all_releases_every_voice() {
        let mut engine = SynthEngine::new(Waveform::Square, 1.0);
        engine.play_note(a4(), NoteId::new(), 100.0);
        engine.play_note("C3".parse().unwrap(), NoteId::new(), 100.0);
        engine.stop_all_notes();
        assert_eq!(engine.active_voice_count(), 0);
    }

    #[test]
    fn dispose_silences_and_deactivates() {
        let mut engine = SynthEngine::new(Waveform::Sine, 1.0);
        engine.play_note(a4(), NoteId::new(), 100.0);
        engine.dispose();
        assert_eq!(engine.state(), EngineState::Idle);

        engine.play_note(a4(), NoteId::new(), 100.0);
        let mut buffer = vec![0.0; 64];
        engine.render_block(&mut buffer, SAMPLE_RATE);
        assert!(buffer.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn waveform_change_affects_new_voices_only() {
        let mut engine = SynthEngine::new(Waveform::Sine, 1.0);
        engine.update_config(&ConfigUpdate {
            waveform: Some(Waveform::Sawtooth),
            ..Default::default()
        });
        engine.play_note(a4(), NoteId::new(), 100.0);

        let mut buffer = vec![0.0; 64];
        engine.render_block(&mut buffer, SAMPLE_RATE);
        assert!(rms(&buffer) > 0.01);
    }
}
