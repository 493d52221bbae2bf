use serde::{Deserialize, Serialize};

use crate::dsp::biquad::FilterShape;

/// EQ band gain range in dB.
pub const EQ_GAIN_MIN: f32 = -18.0;
pub const EQ_GAIN_MAX: f32 = 18.0;

/// The five fixed bands of every equalizer in the project (each track and
/// the master bus). Ids, frequencies and shapes never change; only the gain
/// is user-editable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EqBandId {
    Sub,
    Bass,
    Mid,
    Presence,
    Brilliance,
}

impl EqBandId {
    pub const ALL: [EqBandId; 5] = [
        EqBandId::Sub,
        EqBandId::Bass,
        EqBandId::Mid,
        EqBandId::Presence,
        EqBandId::Brilliance,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            EqBandId::Sub => "Sub",
            EqBandId::Bass => "Bass",
            EqBandId::Mid => "Mid",
            EqBandId::Presence => "Presence",
            EqBandId::Brilliance => "Brilliance",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqBand {
    pub id: EqBandId,
    pub frequency: f32,
    /// dB, clamped to [`EQ_GAIN_MIN`]..=[`EQ_GAIN_MAX`] by the store.
    pub gain: f32,
    pub shape: FilterShape,
}

impl EqBand {
    fn new(id: EqBandId, frequency: f32, shape: FilterShape) -> Self {
        Self {
            id,
            frequency,
            gain: 0.0,
            shape,
        }
    }
}

/// The default flat five-band set: Sub 60 Hz lowshelf, Bass 200 / Mid 1000 /
/// Presence 3000 peaking, Brilliance 10 kHz highshelf.
pub fn default_eq_bands() -> Vec<EqBand> {
    vec![
        EqBand::new(EqBandId::Sub, 60.0, FilterShape::LowShelf),
        EqBand::new(EqBandId::Bass, 200.0, FilterShape::Peaking),
        EqBand::new(EqBandId::Mid, 1_000.0, FilterShape::Peaking),
        EqBand::new(EqBandId::Presence, 3_000.0, FilterShape::Peaking),
        EqBand::new(EqBandId::Brilliance, 10_000.0, FilterShape::HighShelf),
    ]
}
