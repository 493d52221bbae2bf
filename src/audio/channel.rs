use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::dsp::biquad::Biquad;
use crate::dsp::convolver::{Convolver, ImpulseResponse};
use crate::dsp::gain::{GainParam, DEFAULT_RAMP_SECONDS};
use crate::engine::{create_engine, EngineState, InstrumentEngine, SubscriptionId};
use crate::pitch::NoteName;
use crate::project::eq::EqBandId;
use crate::project::instrument::ConfigUpdate;
use crate::project::note::NoteId;
use crate::project::track::{Track, TrackId};
use crate::project::TimelineProject;

use super::bus::REVERB_BOOST;

/*
Track Channels
==============

Each track gets a live audio sub-graph mirroring the master bus at track
scope:

    engine ──► track gain ──► [5 EQ bands] ──┬──► dry ──────────────► bus input
                                             └──► wet ──► shared convolver ──► bus input

The rack keeps this runtime state in sync with the declarative track list:
`sync_with_project` diffs the project's track ids against the live channel
ids, tears down channels whose track vanished and builds channels for new
tracks. It runs on structural changes only and is idempotent - property
edits (volume, reverb, EQ, instrument tweaks) go through the dedicated
update methods, which touch node parameters without rebuilding anything.

One convolver is shared by every track's wet send; per-track dry/wet gains
set how much each track feeds it.

Mute/solo is resolved at note-on time against the project's CURRENT state,
not at channel construction: soloing any track silences the others' note-on
calls immediately, and a gated call does not even lazily create a channel.
*/

/// Dry level keeps half of what the wet mix takes, so a fully wet track
/// still carries half its direct signal.
fn dry_level(reverb: u8) -> f32 {
    1.0 - (reverb.min(100) as f32 / 100.0) * 0.5
}

struct TrackChannel {
    gain: GainParam,
    eq: Vec<(EqBandId, Biquad)>,
    dry: GainParam,
    wet: GainParam,
    engine: Box<dyn InstrumentEngine>,
    state_subscription: SubscriptionId,
    scratch: Vec<f32>,
}

pub struct ChannelRack {
    sample_rate: f32,
    soundfont_root: PathBuf,
    channels: HashMap<TrackId, TrackChannel>,
    /// Engine state per track, written by engine listeners (possibly from
    /// the audio thread), read by the UI.
    engine_states: Arc<Mutex<HashMap<TrackId, EngineState>>>,
    convolver: Convolver,
    wet_accum: Vec<f32>,
    conv_buf: Vec<f32>,
}

impl ChannelRack {
    pub fn new(sample_rate: f32, soundfont_root: PathBuf) -> Self {
        let impulse = ImpulseResponse::default_room(sample_rate);
        Self {
            sample_rate,
            soundfont_root,
            channels: HashMap::new(),
            engine_states: Arc::new(Mutex::new(HashMap::new())),
            convolver: Convolver::new(&impulse),
            wet_accum: vec![0.0; crate::MAX_BLOCK_SIZE],
            conv_buf: vec![0.0; crate::MAX_BLOCK_SIZE],
        }
    }

    // ------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------

    /// Bring the live channels in line with the project's track list.
    /// Safe to call repeatedly; call it after adding or removing tracks.
    pub fn sync_with_project(&mut self, project: &TimelineProject) {
        let live: Vec<TrackId> = self.channels.keys().copied().collect();
        for track_id in live {
            if project.track(track_id).is_none() {
                debug!("tearing down channel for removed track {track_id:?}");
                self.remove_channel(track_id);
            }
        }

        for track in &project.tracks {
            if !self.channels.contains_key(&track.id) {
                debug!("building channel for new track {track_id:?}", track_id = track.id);
                self.create_channel(track);
            }
        }
    }

    fn create_channel(&mut self, track: &Track) -> &mut TrackChannel {
        let mut gain = GainParam::new(1.0);
        gain.set_now(track.volume as f32 / 100.0);

        let eq = track
            .eq_bands
            .iter()
            .map(|band| {
                (
                    band.id,
                    Biquad::new(band.shape, band.frequency, band.gain, self.sample_rate),
                )
            })
            .collect();

        let mut dry = GainParam::new(1.0);
        dry.set_now(dry_level(track.reverb));
        let mut wet = GainParam::new(0.0);
        wet.set_now(track.reverb as f32 / 100.0);

        let mut engine = create_engine(&track.instrument, &self.soundfont_root);

        let states = self.engine_states.clone();
        let track_id = track.id;
        states.lock().unwrap().insert(track_id, engine.state());
        let state_subscription = engine.on_state_change(Box::new(move |state| {
            states.lock().unwrap().insert(track_id, state);
        }));

        engine.preload();

        self.channels.entry(track.id).or_insert(TrackChannel {
            gain,
            eq,
            dry,
            wet,
            engine,
            state_subscription,
            scratch: vec![0.0; crate::MAX_BLOCK_SIZE],
        })
    }

    fn remove_channel(&mut self, track_id: TrackId) {
        if let Some(mut channel) = self.channels.remove(&track_id) {
            channel.engine.unsubscribe(channel.state_subscription);
            channel.engine.stop_all_notes();
            channel.engine.dispose();
            self.engine_states.lock().unwrap().remove(&track_id);
        }
    }

    /// Tear down every channel (project unload / shutdown).
    pub fn dispose(&mut self) {
        let ids: Vec<TrackId> = self.channels.keys().copied().collect();
        for id in ids {
            self.remove_channel(id);
        }
    }

    // ------------------------------------------------------------------
    // Note events
    // ------------------------------------------------------------------

    /// Sound a note on a track, gated by the project's current mute/solo
    /// state. A gated or unknown track produces nothing (and no channel).
    pub fn play_note_on_track(
        &mut self,
        project: &TimelineProject,
        track_id: TrackId,
        note: NoteName,
        note_id: NoteId,
        velocity: f32,
    ) {
        let Some(track) = project.track(track_id) else {
            warn!("play_note_on_track: no such track {track_id:?}");
            return;
        };
        if !project.is_audible(track_id) {
            return;
        }

        if !self.channels.contains_key(&track_id) {
            self.create_channel(track);
        }
        if let Some(channel) = self.channels.get_mut(&track_id) {
            channel.engine.play_note(note, note_id, velocity);
        }
    }

    pub fn stop_note_on_track(&mut self, track_id: TrackId, note_id: NoteId) {
        if let Some(channel) = self.channels.get_mut(&track_id) {
            channel.engine.stop_note(note_id);
        }
    }

    pub fn stop_all_notes_on_track(&mut self, track_id: TrackId) {
        if let Some(channel) = self.channels.get_mut(&track_id) {
            channel.engine.stop_all_notes();
        }
    }

    pub fn stop_all_notes(&mut self) {
        for channel in self.channels.values_mut() {
            channel.engine.stop_all_notes();
        }
    }

    // ------------------------------------------------------------------
    // Parameter updates (no topology changes)
    // ------------------------------------------------------------------

    pub fn update_track_volume(&mut self, track_id: TrackId, volume: u8) {
        if let Some(channel) = self.channels.get_mut(&track_id) {
            channel.gain.ramp_to(
                volume.min(100) as f32 / 100.0,
                DEFAULT_RAMP_SECONDS,
                self.sample_rate,
            );
        }
    }

    pub fn update_track_reverb(&mut self, track_id: TrackId, reverb: u8) {
        if let Some(channel) = self.channels.get_mut(&track_id) {
            channel
                .dry
                .ramp_to(dry_level(reverb), DEFAULT_RAMP_SECONDS, self.sample_rate);
            channel.wet.ramp_to(
                reverb.min(100) as f32 / 100.0,
                DEFAULT_RAMP_SECONDS,
                self.sample_rate,
            );
        }
    }

    pub fn update_track_eq_band(&mut self, track_id: TrackId, band: EqBandId, gain_db: f32) {
        if let Some(channel) = self.channels.get_mut(&track_id) {
            if let Some((_, filter)) = channel.eq.iter_mut().find(|(id, _)| *id == band) {
                filter.set_gain_db(gain_db);
            }
        }
    }

    pub fn update_track_instrument(&mut self, track_id: TrackId, update: &ConfigUpdate) {
        if let Some(channel) = self.channels.get_mut(&track_id) {
            channel.engine.update_config(update);
        }
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    pub fn engine_state(&self, track_id: TrackId) -> EngineState {
        self.engine_states
            .lock()
            .unwrap()
            .get(&track_id)
            .copied()
            .unwrap_or(EngineState::Idle)
    }

    pub fn preload_track(&mut self, track_id: TrackId) {
        if let Some(channel) = self.channels.get_mut(&track_id) {
            channel.engine.preload();
        }
    }

    pub fn has_channel(&self, track_id: TrackId) -> bool {
        self.channels.contains_key(&track_id)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Current ramp target of a track's volume gain (mixer UI readback).
    pub fn track_gain_target(&self, track_id: TrackId) -> Option<f32> {
        self.channels.get(&track_id).map(|c| c.gain.target())
    }

    /// Current ramp target of a track's wet send.
    pub fn track_wet_target(&self, track_id: TrackId) -> Option<f32> {
        self.channels.get(&track_id).map(|c| c.wet.target())
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// Mix every channel into `out` (the bus input). Runs each engine, the
    /// per-track gain and EQ chain, the dry/wet split and the shared wet
    /// convolver.
    pub fn render_block(&mut self, out: &mut [f32]) {
        let len = out.len();
        debug_assert!(len <= crate::MAX_BLOCK_SIZE);

        let wet_accum = &mut self.wet_accum[..len];
        wet_accum.fill(0.0);

        for channel in self.channels.values_mut() {
            let scratch = &mut channel.scratch[..len];
            scratch.fill(0.0);
            channel.engine.render_block(scratch, self.sample_rate);

            channel.gain.apply(scratch);
            for (_, filter) in &mut channel.eq {
                filter.render(scratch);
            }

            for ((slot, wet_slot), &sample) in
                out.iter_mut().zip(wet_accum.iter_mut()).zip(scratch.iter())
            {
                *slot += sample * channel.dry.next();
                *wet_slot += sample * channel.wet.next();
            }
        }

        let conv_out = &mut self.conv_buf[..len];
        self.convolver.process(wet_accum, conv_out);
        for (slot, &wet) in out.iter_mut().zip(conv_out.iter()) {
            *slot += wet * REVERB_BOOST;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::instrument::{InstrumentConfig, InstrumentKind};
    use crate::project::ProjectStore;
    use crate::GAIN_EPSILON;

    const SAMPLE_RATE: f32 = 48_000.0;

    fn rack() -> ChannelRack {
        ChannelRack::new(SAMPLE_RATE, PathBuf::from("soundfonts"))
    }

    fn store_with_synth_tracks(n: usize) -> (ProjectStore, Vec<TrackId>) {
        let mut store = ProjectStore::new();
        let ids = (0..n)
            .map(|_| store.create_track(InstrumentConfig::default_for(InstrumentKind::Synth), None))
            .collect();
        (store, ids)
    }

    fn c4() -> NoteName {
        "C4".parse().unwrap()
    }

    fn rms(buffer: &[f32]) -> f32 {
        (buffer.iter().map(|s| s * s).sum::<f32>() / buffer.len() as f32).sqrt()
    }

    #[test]
    fn sync_builds_and_tears_down_channels() {
        let (mut store, ids) = store_with_synth_tracks(2);
        let mut rack = rack();

        rack.sync_with_project(store.project());
        assert_eq!(rack.channel_count(), 2);

        // Idempotent
        rack.sync_with_project(store.project());
        assert_eq!(rack.channel_count(), 2);

        store.delete_track(ids[0]);
        rack.sync_with_project(store.project());
        assert_eq!(rack.channel_count(), 1);
        assert!(!rack.has_channel(ids[0]));
        assert!(rack.has_channel(ids[1]));
    }

    #[test]
    fn play_note_lazily_creates_the_channel() {
        let (store, ids) = store_with_synth_tracks(1);
        let mut rack = rack();

        assert!(!rack.has_channel(ids[0]));
        rack.play_note_on_track(store.project(), ids[0], c4(), NoteId::new(), 100.0);
        assert!(rack.has_channel(ids[0]));

        let mut block = vec![0.0; 512];
        rack.render_block(&mut block);
        assert!(rms(&block) > 0.001);
    }

    #[test]
    fn muted_track_does_not_sound_or_build_a_channel() {
        let (mut store, ids) = store_with_synth_tracks(1);
        store.set_track_muted(ids[0], true);
        let mut rack = rack();

        rack.play_note_on_track(store.project(), ids[0], c4(), NoteId::new(), 100.0);
        assert!(!rack.has_channel(ids[0]));
    }

    #[test]
    fn solo_gates_the_other_tracks() {
        let (mut store, ids) = store_with_synth_tracks(3);
        store.set_track_solo(ids[1], true);
        let mut rack = rack();

        rack.play_note_on_track(store.project(), ids[0], c4(), NoteId::new(), 100.0);
        rack.play_note_on_track(store.project(), ids[1], c4(), NoteId::new(), 100.0);
        rack.play_note_on_track(store.project(), ids[2], c4(), NoteId::new(), 100.0);

        assert!(!rack.has_channel(ids[0]));
        assert!(rack.has_channel(ids[1]));
        assert!(!rack.has_channel(ids[2]));

        let mut block = vec![0.0; 256];
        rack.render_block(&mut block);
        assert!(rms(&block) > 0.001, "the solo track itself must sound");
    }

    #[test]
    fn gating_reflects_current_state_not_construction_state() {
        let (mut store, ids) = store_with_synth_tracks(1);
        let mut rack = rack();
        rack.sync_with_project(store.project());

        rack.play_note_on_track(store.project(), ids[0], c4(), NoteId::new(), 100.0);

        store.set_track_muted(ids[0], true);
        let silent_id = NoteId::new();
        rack.stop_all_notes();
        rack.play_note_on_track(store.project(), ids[0], c4(), silent_id, 100.0);

        // Drain the release tails, then confirm silence.
        let mut block = vec![0.0; 512];
        for _ in 0..8 {
            block.fill(0.0);
            rack.render_block(&mut block);
        }
        block.fill(0.0);
        rack.render_block(&mut block);
        assert!(rms(&block) < 0.001);
    }

    #[test]
    fn volume_zero_ramps_to_epsilon_not_zero() {
        let (mut store, ids) = store_with_synth_tracks(1);
        let mut rack = rack();
        rack.sync_with_project(store.project());

        store.set_track_volume(ids[0], 0);
        rack.update_track_volume(ids[0], 0);

        assert_eq!(rack.track_gain_target(ids[0]), Some(GAIN_EPSILON));
        // The document keeps the user's true zero.
        assert_eq!(store.project().track(ids[0]).unwrap().volume, 0);
    }

    #[test]
    fn reverb_update_moves_dry_and_wet_together() {
        let (store, ids) = store_with_synth_tracks(1);
        let mut rack = rack();
        rack.sync_with_project(store.project());

        rack.update_track_reverb(ids[0], 100);
        assert_eq!(rack.track_wet_target(ids[0]), Some(1.0));
    }

    #[test]
    fn engine_state_is_observable_per_track() {
        let (store, ids) = store_with_synth_tracks(1);
        let mut rack = rack();
        rack.sync_with_project(store.project());
        assert_eq!(rack.engine_state(ids[0]), EngineState::Ready);
        assert_eq!(rack.engine_state(TrackId::new()), EngineState::Idle);
    }

    #[test]
    fn dispose_clears_everything() {
        let (store, _) = store_with_synth_tracks(3);
        let mut rack = rack();
        rack.sync_with_project(store.project());
        assert_eq!(rack.channel_count(), 3);

        rack.dispose();
        assert_eq!(rack.channel_count(), 0);
    }
}
