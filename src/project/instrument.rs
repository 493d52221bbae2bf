use serde::{Deserialize, Serialize};

use crate::dsp::oscillator::Waveform;

/// Which engine family a track uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    Synth,
    Sampler,
    Sf2,
}

impl InstrumentKind {
    /// Base name used when auto-naming a new track of this kind.
    pub fn display_name(&self) -> &'static str {
        match self {
            InstrumentKind::Synth => "Synth",
            InstrumentKind::Sampler => "Sampler",
            InstrumentKind::Sf2 => "SF2",
        }
    }
}

/// Stored instrument configuration; one variant per engine family.
///
/// This is the persisted half of the instrument: the engine factory turns it
/// into a live [`crate::engine::InstrumentEngine`], and `merge` applies the
/// partial updates the mixer UI produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InstrumentConfig {
    Synth {
        waveform: Waveform,
        gain: f32,
    },
    Sampler {
        /// Sample-library name, resolved against the soundfont root.
        soundfont: String,
        gain: f32,
    },
    Sf2 {
        library: String,
        /// Instrument within the library; empty selects the library's first.
        instrument: String,
        gain: f32,
        attack: f32,
        decay: f32,
        sustain: f32,
        release: f32,
    },
}

impl InstrumentConfig {
    pub fn kind(&self) -> InstrumentKind {
        match self {
            InstrumentConfig::Synth { .. } => InstrumentKind::Synth,
            InstrumentConfig::Sampler { .. } => InstrumentKind::Sampler,
            InstrumentConfig::Sf2 { .. } => InstrumentKind::Sf2,
        }
    }

    pub fn gain(&self) -> f32 {
        match self {
            InstrumentConfig::Synth { gain, .. }
            | InstrumentConfig::Sampler { gain, .. }
            | InstrumentConfig::Sf2 { gain, .. } => *gain,
        }
    }

    /// Factory defaults per kind.
    pub fn default_for(kind: InstrumentKind) -> Self {
        match kind {
            InstrumentKind::Synth => InstrumentConfig::Synth {
                waveform: Waveform::Sine,
                gain: 1.0,
            },
            InstrumentKind::Sampler => InstrumentConfig::Sampler {
                soundfont: "acoustic_grand_piano".to_string(),
                gain: 1.0,
            },
            InstrumentKind::Sf2 => InstrumentConfig::Sf2 {
                library: "retro".to_string(),
                instrument: String::new(),
                gain: 1.0,
                attack: 0.0,
                decay: 0.0,
                sustain: 1.0,
                release: 0.3,
            },
        }
    }

    /// Merge a partial update, ignoring fields that do not apply to this
    /// variant.
    pub fn merge(&mut self, update: &ConfigUpdate) {
        match self {
            InstrumentConfig::Synth { waveform, gain } => {
                if let Some(w) = update.waveform {
                    *waveform = w;
                }
                if let Some(g) = update.gain {
                    *gain = g;
                }
            }
            InstrumentConfig::Sampler { soundfont, gain } => {
                if let Some(name) = &update.soundfont {
                    *soundfont = name.clone();
                }
                if let Some(g) = update.gain {
                    *gain = g;
                }
            }
            InstrumentConfig::Sf2 {
                library,
                instrument,
                gain,
                attack,
                decay,
                sustain,
                release,
            } => {
                if let Some(name) = &update.soundfont {
                    *library = name.clone();
                }
                if let Some(name) = &update.instrument {
                    *instrument = name.clone();
                }
                if let Some(g) = update.gain {
                    *gain = g;
                }
                if let Some(v) = update.attack {
                    *attack = v;
                }
                if let Some(v) = update.decay {
                    *decay = v;
                }
                if let Some(v) = update.sustain {
                    *sustain = v;
                }
                if let Some(v) = update.release {
                    *release = v;
                }
            }
        }
    }
}

/// Partial instrument update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigUpdate {
    pub waveform: Option<Waveform>,
    /// New sample library (sampler and SF2 engines).
    pub soundfont: Option<String>,
    /// New instrument within the current library (SF2 engine).
    pub instrument: Option<String>,
    pub gain: Option<f32>,
    pub attack: Option<f32>,
    pub decay: Option<f32>,
    pub sustain: Option<f32>,
    pub release: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_only_touches_given_fields() {
        let mut config = InstrumentConfig::default_for(InstrumentKind::Synth);
        config.merge(&ConfigUpdate {
            gain: Some(0.5),
            ..Default::default()
        });
        assert_eq!(
            config,
            InstrumentConfig::Synth {
                waveform: Waveform::Sine,
                gain: 0.5
            }
        );
    }

    #[test]
    fn merge_ignores_foreign_fields() {
        let mut config = InstrumentConfig::default_for(InstrumentKind::Synth);
        let before = config.clone();
        config.merge(&ConfigUpdate {
            soundfont: Some("marimba".into()),
            attack: Some(0.2),
            ..Default::default()
        });
        assert_eq!(config, before);
    }

    #[test]
    fn sf2_merge_switches_instrument() {
        let mut config = InstrumentConfig::default_for(InstrumentKind::Sf2);
        config.merge(&ConfigUpdate {
            instrument: Some("music box".into()),
            ..Default::default()
        });
        match config {
            InstrumentConfig::Sf2 { instrument, .. } => assert_eq!(instrument, "music box"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = InstrumentConfig::default_for(InstrumentKind::Sampler);
        let json = serde_json::to_string(&config).unwrap();
        let back: InstrumentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
