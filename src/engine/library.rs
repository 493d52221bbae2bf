use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

use log::error;
use serde::Deserialize;

use super::status::{EngineState, StateCell};

/*
Sample Libraries
================

A "soundfont" here is a directory under the soundfont root:

    <root>/<name>/library.json        manifest
    <root>/<name>/<instrument>.f32    raw mono samples, f32 little-endian

The manifest lists one or more instruments, each with a base pitch (the MIDI
note the recording is at) and its own sample rate. Playback repitches by
linear-interpolation resampling, so a single recording covers the whole
grid.

Loading happens on a background thread; the UI observes it only through the
engine's state cell. A load has no cancel: superseding it (changing the
library while one is in flight) bumps the generation counter, and a result
arriving with a stale generation is discarded no matter when it resolves -
the newest request always wins.
*/

#[derive(Debug, Deserialize)]
struct Manifest {
    name: String,
    instruments: Vec<ManifestInstrument>,
}

#[derive(Debug, Deserialize)]
struct ManifestInstrument {
    name: String,
    /// MIDI note the recording is pitched at.
    base_midi: i32,
    /// Sample rate of the recording.
    sample_rate: f32,
    /// Sample file, relative to the library directory.
    file: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("failed to read sample library")]
    Io(#[from] std::io::Error),
    #[error("library manifest is not valid JSON")]
    Manifest(#[from] serde_json::Error),
    #[error("library {0:?} has no instruments")]
    Empty(String),
}

/// One playable recording. Frames are shared so every voice can hold the
/// audio without copying it.
#[derive(Debug, Clone)]
pub struct SampledInstrument {
    pub name: String,
    pub base_midi: i32,
    pub sample_rate: f32,
    pub frames: Arc<Vec<f32>>,
}

impl SampledInstrument {
    pub fn base_frequency(&self) -> f32 {
        440.0 * 2.0_f32.powf((self.base_midi - 69) as f32 / 12.0)
    }
}

#[derive(Debug, Clone)]
pub struct SampleLibrary {
    pub name: String,
    pub instruments: Vec<SampledInstrument>,
}

impl SampleLibrary {
    pub fn load(root: &Path, name: &str) -> Result<Self, LibraryError> {
        let dir = root.join(name);
        let manifest_text = std::fs::read_to_string(dir.join("library.json"))?;
        let manifest: Manifest = serde_json::from_str(&manifest_text)?;

        if manifest.instruments.is_empty() {
            return Err(LibraryError::Empty(manifest.name));
        }

        let mut instruments = Vec::with_capacity(manifest.instruments.len());
        for entry in manifest.instruments {
            let bytes = std::fs::read(dir.join(&entry.file))?;
            let frames: Vec<f32> = bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            instruments.push(SampledInstrument {
                name: entry.name,
                base_midi: entry.base_midi,
                sample_rate: entry.sample_rate,
                frames: Arc::new(frames),
            });
        }

        Ok(Self {
            name: manifest.name,
            instruments,
        })
    }

    pub fn instrument(&self, name: &str) -> Option<&SampledInstrument> {
        self.instruments.iter().find(|i| i.name == name)
    }

    pub fn instrument_names(&self) -> Vec<String> {
        self.instruments.iter().map(|i| i.name.clone()).collect()
    }
}

/// Async library loader shared by the sampler engines.
///
/// Owns the generation counter and the in-flight receive channel. `begin`
/// spawns a loader thread and moves the engine to `Loading`; `poll` (called
/// from play/render) installs a finished result - or drops it if a newer
/// load superseded it - and drives the `Ready`/`Error` transition.
pub struct Loader {
    root: PathBuf,
    generation: u64,
    in_flight: Option<Receiver<(u64, Result<SampleLibrary, LibraryError>)>>,
}

impl Loader {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            generation: 0,
            in_flight: None,
        }
    }

    /// Start loading `name`. Supersedes any load still in flight: the old
    /// thread keeps running but its result will be stale on arrival.
    pub fn begin(&mut self, name: &str, status: &StateCell) {
        self.generation += 1;
        let generation = self.generation;
        let root = self.root.clone();
        let name = name.to_string();

        let (tx, rx) = channel();
        self.in_flight = Some(rx);
        status.set(EngineState::Loading);

        thread::spawn(move || {
            let result = SampleLibrary::load(&root, &name);
            // Receiver may be gone if the engine was disposed; that is fine.
            let _ = tx.send((generation, result));
        });
    }

    /// Check for a finished load. Returns the library when the CURRENT
    /// generation finished successfully; drives the status cell either way.
    pub fn poll(&mut self, status: &StateCell) -> Option<SampleLibrary> {
        let receiver = self.in_flight.as_ref()?;
        match receiver.try_recv() {
            Ok((generation, result)) => {
                if generation != self.generation {
                    // Superseded; a newer load is (or was) in flight.
                    return None;
                }
                self.in_flight = None;
                match result {
                    Ok(library) => {
                        status.set(EngineState::Ready);
                        Some(library)
                    }
                    Err(err) => {
                        error!("sample library load failed: {err}");
                        status.set(EngineState::Error);
                        None
                    }
                }
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.in_flight = None;
                status.set(EngineState::Error);
                None
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn abandon(&mut self) {
        self.in_flight = None;
    }
}
