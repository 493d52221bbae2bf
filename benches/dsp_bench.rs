use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use gridtone::audio::{AudioBus, ChannelRack};
use gridtone::dsp::convolver::{Convolver, ImpulseResponse};
use gridtone::project::eq::default_eq_bands;
use gridtone::project::instrument::{InstrumentConfig, InstrumentKind};
use gridtone::project::note::NoteId;
use gridtone::project::ProjectStore;

const SAMPLE_RATE: f32 = 48_000.0;
const BLOCK: usize = 512;

fn bench_bus(c: &mut Criterion) {
    let mut bus = AudioBus::new(SAMPLE_RATE, &default_eq_bands());
    bus.set_master_reverb(40);
    let mut block = vec![0.1f32; BLOCK];

    c.bench_function("bus_render_block", |b| {
        b.iter(|| {
            bus.render_block(black_box(&mut block));
        })
    });
}

fn bench_rack(c: &mut Criterion) {
    let mut store = ProjectStore::new();
    let mut rack = ChannelRack::new(SAMPLE_RATE, "soundfonts".into());

    for _ in 0..4 {
        let id = store.create_track(InstrumentConfig::default_for(InstrumentKind::Synth), None);
        store.set_track_reverb(id, 30);
    }
    rack.sync_with_project(store.project());
    for track in &store.project().tracks {
        rack.play_note_on_track(
            store.project(),
            track.id,
            "C4".parse().unwrap(),
            NoteId::new(),
            100.0,
        );
    }

    let mut block = vec![0.0f32; BLOCK];
    c.bench_function("rack_render_block_4_tracks", |b| {
        b.iter(|| {
            block.fill(0.0);
            rack.render_block(black_box(&mut block));
        })
    });
}

fn bench_convolver(c: &mut Criterion) {
    let impulse = ImpulseResponse::default_room(SAMPLE_RATE);
    let mut convolver = Convolver::new(&impulse);
    let input = vec![0.1f32; BLOCK];
    let mut output = vec![0.0f32; BLOCK];

    c.bench_function("convolver_3s_tail", |b| {
        b.iter(|| {
            convolver.process(black_box(&input), black_box(&mut output));
        })
    });
}

criterion_group!(benches, bench_bus, bench_rack, bench_convolver);
criterion_main!(benches);
