use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};

/*
EQ Biquad
=========

The equalizer bands are classic second-order IIR sections ("biquads") using
the Audio EQ Cookbook coefficient formulas. Three responses cover the five
bands the mixer exposes:

| shape     | boosts/cuts            | used by               |
| --------- | ---------------------- | --------------------- |
| lowshelf  | everything below f0    | Sub (60 Hz)           |
| peaking   | a bell around f0       | Bass / Mid / Presence |
| highshelf | everything above f0    | Brilliance (10 kHz)   |

Gain changes recompute the coefficients and take effect on the next sample.
No ramp is applied here: band gains are driven by slider drags, which already
arrive as a dense stream of small steps.
*/

/// Frequency response shape of one EQ band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterShape {
    LowShelf,
    Peaking,
    HighShelf,
}

/// Q used for the peaking bands. Shelves use a shelf slope of 1.
const PEAKING_Q: f32 = 1.5;

#[derive(Debug, Clone)]
pub struct Biquad {
    shape: FilterShape,
    frequency: f32,
    gain_db: f32,
    sample_rate: f32,

    // Normalized coefficients
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,

    // Transposed direct form II state
    z1: f32,
    z2: f32,
}

impl Biquad {
    pub fn new(shape: FilterShape, frequency: f32, gain_db: f32, sample_rate: f32) -> Self {
        let mut biquad = Self {
            shape,
            frequency,
            gain_db,
            sample_rate,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
        };
        biquad.recompute();
        biquad
    }

    /// Change the band gain. Takes effect immediately, filter state is kept
    /// so there is no discontinuity in the recursion memory.
    pub fn set_gain_db(&mut self, gain_db: f32) {
        if !gain_db.is_finite() {
            return;
        }
        self.gain_db = gain_db;
        self.recompute();
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    fn recompute(&mut self) {
        let a = 10.0_f32.powf(self.gain_db / 40.0);
        let w0 = TAU * self.frequency / self.sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();

        let (b0, b1, b2, a0, a1, a2) = match self.shape {
            FilterShape::Peaking => {
                let alpha = sin_w0 / (2.0 * PEAKING_Q);
                (
                    1.0 + alpha * a,
                    -2.0 * cos_w0,
                    1.0 - alpha * a,
                    1.0 + alpha / a,
                    -2.0 * cos_w0,
                    1.0 - alpha / a,
                )
            }
            FilterShape::LowShelf => {
                // Shelf slope S = 1
                let alpha = sin_w0 / 2.0 * (a + 1.0 / a).sqrt();
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                    (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
            FilterShape::HighShelf => {
                let alpha = sin_w0 / 2.0 * (a + 1.0 / a).sqrt();
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                    (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
        };

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    #[inline]
    pub fn next_sample(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }

    /// Filter a block in place.
    pub fn render(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.next_sample(*sample);
        }
    }
}
