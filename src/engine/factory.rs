use std::path::{Path, PathBuf};

use crate::project::instrument::{InstrumentConfig, InstrumentKind};

use super::enveloped::EnvelopedEngine;
use super::sampler::SamplerEngine;
use super::synth::SynthEngine;
use super::InstrumentEngine;

/// Default directory sample libraries are resolved against.
pub const DEFAULT_SOUNDFONT_ROOT: &str = "soundfonts";

/// Build the engine variant a stored configuration calls for.
///
/// The choice is the configuration's tag; everything else in the config is
/// handed to the engine as its initial parameters. Sampler engines resolve
/// their libraries against `soundfont_root`.
pub fn create_engine(config: &InstrumentConfig, soundfont_root: &Path) -> Box<dyn InstrumentEngine> {
    match config {
        InstrumentConfig::Synth { waveform, gain } => Box::new(SynthEngine::new(*waveform, *gain)),

        InstrumentConfig::Sampler { soundfont, gain } => Box::new(SamplerEngine::new(
            soundfont_root.to_path_buf(),
            soundfont.clone(),
            *gain,
        )),

        InstrumentConfig::Sf2 {
            library,
            instrument,
            gain,
            attack,
            decay,
            sustain,
            release,
        } => Box::new(EnvelopedEngine::new(
            soundfont_root.to_path_buf(),
            library.clone(),
            instrument.clone(),
            *gain,
            *attack,
            *decay,
            *sustain,
            *release,
        )),
    }
}

/// Default configuration for each engine kind; re-exported here because the
/// factory is where UI code asks "what does a new track of this kind look
/// like".
pub fn default_config(kind: InstrumentKind) -> InstrumentConfig {
    InstrumentConfig::default_for(kind)
}

pub fn default_soundfont_root() -> PathBuf {
    PathBuf::from(DEFAULT_SOUNDFONT_ROOT)
}
