//! Instrument engines: the polymorphic sound sources behind each track.
//!
//! An engine owns the voices for one track and renders them into the
//! track's channel. Three families exist, mirroring the three
//! [`InstrumentConfig`](crate::project::instrument::InstrumentConfig)
//! variants:
//!
//! - [`synth::SynthEngine`] - oscillator voices, zero latency, always ready
//! - [`sampler::SamplerEngine`] - asynchronously loaded sample library
//! - [`enveloped::EnvelopedEngine`] - sample library with an explicit ADSR
//!   envelope per voice and instrument switching within the library
//!
//! Loading is a state machine, not a blocking call: `idle → loading →
//! ready` or `loading → error`. Playing a note before the engine is ready
//! kicks off the load and defers the note; if the load fails the note
//! silently never sounds. Nothing in here is fatal to the process.

pub mod enveloped;
pub mod factory;
pub mod library;
pub mod sampler;
pub mod status;
pub mod synth;

pub use factory::create_engine;
pub use status::{EngineState, StateCell, SubscriptionId};

use crate::pitch::NoteName;
use crate::project::instrument::{ConfigUpdate, InstrumentKind};
use crate::project::note::NoteId;

/// Default note-on velocity (MIDI-style 0-127).
pub const DEFAULT_VELOCITY: f32 = 100.0;

/// Capability every instrument engine implements.
///
/// Voices are keyed by note id; retriggering an id that is already sounding
/// stops the old voice first, stopping an unknown id is a no-op. After
/// `dispose` the engine is dead and must not be reused.
pub trait InstrumentEngine: Send {
    fn kind(&self) -> InstrumentKind;

    fn state(&self) -> EngineState;

    /// Register a state-transition listener. The callback may fire from the
    /// audio thread (loads complete during rendering).
    fn on_state_change(&self, callback: Box<dyn Fn(EngineState) + Send>) -> SubscriptionId;

    fn unsubscribe(&self, subscription: SubscriptionId);

    /// Kick off (or re-await) loading. Idempotent: ready engines do
    /// nothing, loading engines do not start a second load.
    fn preload(&mut self);

    fn play_note(&mut self, note: NoteName, note_id: NoteId, velocity: f32);

    fn stop_note(&mut self, note_id: NoteId);

    fn stop_all_notes(&mut self);

    /// Merge a partial configuration change. Changing a sampler's library
    /// invalidates all active voices and starts a new load.
    fn update_config(&mut self, update: &ConfigUpdate);

    /// Release every synthesis resource. The engine is unusable afterwards.
    fn dispose(&mut self);

    /// Mix one block of audio into `out` (additive).
    fn render_block(&mut self, out: &mut [f32], sample_rate: f32);
}
