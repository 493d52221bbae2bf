use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};

/// Waveforms the synth engine can produce.
///
/// Sine is the purest (fundamental only); square and sawtooth are
/// harmonically rich; triangle sits between sine and square.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Default for Waveform {
    fn default() -> Self {
        Waveform::Sine
    }
}

/// Phase-accumulator oscillator. One per active synth voice.
#[derive(Debug, Clone)]
pub struct Oscillator {
    waveform: Waveform,
    /// Phase in [0, 1).
    phase: f32,
}

impl Oscillator {
    pub fn new(waveform: Waveform) -> Self {
        Self {
            waveform,
            phase: 0.0,
        }
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    #[inline]
    fn sample_at(&self, phase: f32) -> f32 {
        match self.waveform {
            Waveform::Sine => (phase * TAU).sin(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * phase - 1.0,
            Waveform::Triangle => {
                if phase < 0.5 {
                    4.0 * phase - 1.0
                } else {
                    3.0 - 4.0 * phase
                }
            }
        }
    }

    /// Add a block of the waveform at `frequency` into `out`.
    pub fn render_add(&mut self, out: &mut [f32], frequency: f32, gain: f32, sample_rate: f32) {
        let increment = frequency / sample_rate;
        for sample in out.iter_mut() {
            *sample += self.sample_at(self.phase) * gain;
            self.phase += increment;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_matches_reference() {
        let sample_rate = 48_000.0;
        let mut osc = Oscillator::new(Waveform::Sine);
        let mut buffer = vec![0.0f32; 128];
        osc.render_add(&mut buffer, 440.0, 1.0, sample_rate);

        let n = 12;
        let expected = (TAU * 440.0 * n as f32 / sample_rate).sin();
        assert!((buffer[n] - expected).abs() < 1e-5);
    }

    #[test]
    fn output_is_bounded() {
        for waveform in [
            Waveform::Sine,
            Waveform::Square,
            Waveform::Sawtooth,
            Waveform::Triangle,
        ] {
            let mut osc = Oscillator::new(waveform);
            let mut buffer = vec![0.0f32; 1024];
            osc.render_add(&mut buffer, 777.0, 1.0, 44_100.0);
            assert!(buffer.iter().all(|s| s.abs() <= 1.0), "{waveform:?} clipped");
        }
    }

    #[test]
    fn square_alternates_sign() {
        let mut osc = Oscillator::new(Waveform::Square);
        let mut buffer = vec![0.0f32; 100];
        // 100 samples at sr=100, f=1 covers exactly one cycle
        osc.render_add(&mut buffer, 1.0, 1.0, 100.0);
        assert!(buffer[..50].iter().all(|&s| s > 0.0));
        assert!(buffer[50..].iter().all(|&s| s < 0.0));
    }

    #[test]
    fn render_accumulates_into_buffer() {
        let mut osc = Oscillator::new(Waveform::Sine);
        let mut buffer = vec![1.0f32; 4];
        osc.render_add(&mut buffer, 0.0, 1.0, 48_000.0);
        // Zero-frequency sine contributes sin(0) = 0, buffer keeps its 1.0
        assert!(buffer.iter().all(|&s| (s - 1.0).abs() < 1e-6));
    }
}
