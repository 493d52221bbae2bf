use crate::GAIN_EPSILON;

/*
Ramped Gain Parameter
=====================

Mixer moves must never jump a gain value between two blocks: the step shows
up as an audible click. Every user-driven level in the graph (master volume,
reverb mix, track volume, dry/wet sends) therefore goes through a GainParam,
which approaches its target along an exponential curve:

    v(t) = v0 * (v1 / v0)^(t / T)

Exponential ramps sound even because our loudness perception is logarithmic,
but they cannot pass through zero - the curve is a ratio of the endpoints.
Both endpoints are clamped to GAIN_EPSILON, so "set volume to 0" ramps down
to 0.001 (about -60 dB, inaudible) while the project document keeps the real
0 the user chose.

The ramp is retargetable mid-flight: a new `ramp_to` starts from wherever the
previous ramp currently is.
*/

/// Default ramp window for user-driven gain moves, in seconds.
pub const DEFAULT_RAMP_SECONDS: f32 = 0.05;

#[derive(Debug, Clone)]
pub struct GainParam {
    value: f32,
    target: f32,
    /// Per-sample multiplier while ramping; 1.0 once settled.
    step: f32,
    remaining: u32,
}

impl GainParam {
    pub fn new(value: f32) -> Self {
        let value = value.max(GAIN_EPSILON);
        Self {
            value,
            target: value,
            step: 1.0,
            remaining: 0,
        }
    }

    /// Jump immediately, no ramp. Only safe before the graph is audible.
    pub fn set_now(&mut self, value: f32) {
        let value = value.max(GAIN_EPSILON);
        self.value = value;
        self.target = value;
        self.step = 1.0;
        self.remaining = 0;
    }

    /// Schedule an exponential ramp from the current value to `target`.
    ///
    /// A target of exactly 0 is clamped to [`GAIN_EPSILON`]; exponential
    /// ramps cannot reach zero.
    pub fn ramp_to(&mut self, target: f32, seconds: f32, sample_rate: f32) {
        let target = target.max(GAIN_EPSILON);
        let samples = (seconds * sample_rate).round().max(1.0) as u32;
        self.target = target;
        self.remaining = samples;
        self.step = (target / self.value).powf(1.0 / samples as f32);
    }

    /// Advance one sample and return the current gain.
    #[inline]
    pub fn next(&mut self) -> f32 {
        if self.remaining > 0 {
            self.value *= self.step;
            self.remaining -= 1;
            if self.remaining == 0 {
                // Land exactly on target; powf accumulates rounding error.
                self.value = self.target;
            }
        }
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }

    /// Multiply a block in place by the (possibly ramping) gain.
    pub fn apply(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample *= self.next();
        }
    }
}
