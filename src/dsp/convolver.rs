use std::collections::VecDeque;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/*
Convolution Reverb
==================

The reverb is a convolution against a synthesized impulse response rather
than a recorded one: exponentially decaying white noise. Short of sampling a
real room, decaying noise is the classic stand-in - it has the dense,
colorless reflection pattern a real tail approaches.

    ir[i] = noise() * (1 - i/len)^decay * amplitude

Direct convolution with a multi-second tail is far too expensive (a 3 s tail
at 48 kHz is ~144k taps), so the Convolver uses uniform partitioned
overlap-save convolution:

  - the impulse response is cut into hop-sized partitions, each FFT'd once;
  - the input is processed in hop-sized chunks over a sliding 2*hop window;
  - the spectra of the last P windows are kept in a ring, and the output
    spectrum is the sum over partitions of (p-hops-old window) x (partition p);
  - one inverse FFT per hop yields the valid last-hop samples.

Per-hop cost is P complex multiply-accumulate passes plus two FFTs,
independent of the tail length in the time domain.

Arbitrary caller block sizes are decoupled from the internal hop with small
input/output FIFOs; a caller that renders in multiples of the hop sees no
added latency.
*/

/// Internal processing hop in samples.
const HOP: usize = 256;

/// A mono impulse response.
#[derive(Debug, Clone)]
pub struct ImpulseResponse {
    pub samples: Vec<f32>,
}

impl ImpulseResponse {
    /// Synthesize the reverb tail: `duration` seconds of noise shaped by
    /// `(1 - t)^decay`, scaled by `amplitude`.
    pub fn synthesize(sample_rate: f32, duration: f32, decay: f32, amplitude: f32) -> Self {
        let len = (sample_rate * duration).max(1.0) as usize;
        let mut rng = 0x9e37_79b9_u32;
        let mut samples = Vec::with_capacity(len);

        for i in 0..len {
            // xorshift32; deterministic so a given graph always sounds the same
            rng ^= rng << 13;
            rng ^= rng >> 17;
            rng ^= rng << 5;
            let noise = (rng as f32 / u32::MAX as f32) * 2.0 - 1.0;

            let envelope = (1.0 - i as f32 / len as f32).powf(decay);
            samples.push(noise * envelope * amplitude);
        }

        Self { samples }
    }

    /// Scale the tail to unit energy. Without this a multi-second noise
    /// tail convolves to a signal tens of times louder than its input; the
    /// graph's wet gains assume an energy-neutral convolver.
    pub fn normalized(mut self) -> Self {
        let energy: f32 = self.samples.iter().map(|s| s * s).sum();
        if energy > 0.0 {
            let scale = 1.0 / energy.sqrt();
            for sample in &mut self.samples {
                *sample *= scale;
            }
        }
        self
    }

    /// The default room used by both the master bus and the track send.
    pub fn default_room(sample_rate: f32) -> Self {
        Self::synthesize(sample_rate, 3.0, 2.5, 0.5).normalized()
    }
}

pub struct Convolver {
    hop: usize,
    fft_size: usize,
    fft_forward: Arc<dyn Fft<f32>>,
    fft_inverse: Arc<dyn Fft<f32>>,

    /// FFT of each hop-sized partition of the impulse response.
    partitions: Vec<Vec<Complex<f32>>>,
    /// Ring of input-window spectra; `ring_head` is the most recent.
    input_spectra: Vec<Vec<Complex<f32>>>,
    ring_head: usize,

    /// Sliding time-domain window of the last `fft_size` input samples.
    window: Vec<f32>,

    scratch: Vec<Complex<f32>>,
    accumulator: Vec<Complex<f32>>,

    pending_in: Vec<f32>,
    ready_out: VecDeque<f32>,
}

impl Convolver {
    pub fn new(ir: &ImpulseResponse) -> Self {
        Self::with_hop(ir, HOP)
    }

    /// Build with an explicit hop size. Tests use small hops to keep the
    /// arithmetic easy to follow; the audio graph uses the default.
    pub fn with_hop(ir: &ImpulseResponse, hop: usize) -> Self {
        assert!(hop.is_power_of_two(), "hop must be a power of two");
        let fft_size = hop * 2;
        let mut planner = FftPlanner::new();
        let fft_forward = planner.plan_fft_forward(fft_size);
        let fft_inverse = planner.plan_fft_inverse(fft_size);

        let mut partitions = Vec::new();
        let taps: &[f32] = if ir.samples.is_empty() {
            &[0.0]
        } else {
            ir.samples.as_slice()
        };
        for chunk in taps.chunks(hop) {
            let mut spectrum: Vec<Complex<f32>> = chunk
                .iter()
                .map(|&s| Complex::new(s, 0.0))
                .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
                .take(fft_size)
                .collect();
            fft_forward.process(&mut spectrum);
            partitions.push(spectrum);
        }

        let input_spectra = vec![vec![Complex::new(0.0, 0.0); fft_size]; partitions.len()];

        Self {
            hop,
            fft_size,
            fft_forward,
            fft_inverse,
            partitions,
            input_spectra,
            ring_head: 0,
            window: vec![0.0; fft_size],
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
            accumulator: vec![Complex::new(0.0, 0.0); fft_size],
            pending_in: Vec::with_capacity(hop),
            ready_out: VecDeque::new(),
        }
    }

    /// Number of impulse-response partitions (for sizing checks).
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Convolve `input` into `output` (same length). Samples not yet covered
    /// by a completed hop come out as 0 and are made up on later calls.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        debug_assert_eq!(input.len(), output.len());

        for &sample in input {
            self.pending_in.push(sample);
            if self.pending_in.len() == self.hop {
                self.process_hop();
            }
        }

        for slot in output.iter_mut() {
            *slot = self.ready_out.pop_front().unwrap_or(0.0);
        }
    }

    fn process_hop(&mut self) {
        // Slide the window: previous hop moves to the front, new hop behind it.
        self.window.copy_within(self.hop.., 0);
        self.window[self.hop..].copy_from_slice(&self.pending_in);
        self.pending_in.clear();

        for (slot, &sample) in self.scratch.iter_mut().zip(self.window.iter()) {
            *slot = Complex::new(sample, 0.0);
        }
        self.fft_forward.process(&mut self.scratch);

        // Most recent spectrum overwrites the oldest ring slot.
        self.ring_head = (self.ring_head + self.input_spectra.len() - 1) % self.input_spectra.len();
        self.input_spectra[self.ring_head].copy_from_slice(&self.scratch);

        self.accumulator.fill(Complex::new(0.0, 0.0));
        for (age, partition) in self.partitions.iter().enumerate() {
            let slot = (self.ring_head + age) % self.input_spectra.len();
            let spectrum = &self.input_spectra[slot];
            for ((acc, &x), &h) in self
                .accumulator
                .iter_mut()
                .zip(spectrum.iter())
                .zip(partition.iter())
            {
                *acc += x * h;
            }
        }

        self.fft_inverse.process(&mut self.accumulator);

        // Overlap-save: only the last hop of the inverse transform is linear
        // convolution; the first hop is circular wrap-around and is discarded.
        let norm = 1.0 / self.fft_size as f32;
        for value in &self.accumulator[self.hop..] {
            self.ready_out.push_back(value.re * norm);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ir_of(samples: &[f32]) -> ImpulseResponse {
        ImpulseResponse {
            samples: samples.to_vec(),
        }
    }

    /// Feed an impulse and return the first `n` output samples.
    fn impulse_response_of(convolver: &mut Convolver, n: usize) -> Vec<f32> {
        let mut out = Vec::new();
        let mut first = true;
        while out.len() < n {
            let input: Vec<f32> = if first {
                first = false;
                std::iter::once(1.0).chain(std::iter::repeat(0.0)).take(8).collect()
            } else {
                vec![0.0; 8]
            };
            let mut output = vec![0.0; 8];
            convolver.process(&input, &mut output);
            out.extend_from_slice(&output);
        }
        out.truncate(n);
        out
    }

    #[test]
    fn identity_impulse_passes_signal() {
        let mut convolver = Convolver::with_hop(&ir_of(&[1.0]), 8);
        let got = impulse_response_of(&mut convolver, 16);
        assert!((got[0] - 1.0).abs() < 1e-4, "impulse lost: {got:?}");
        assert!(got[1..].iter().all(|s| s.abs() < 1e-4));
    }

    #[test]
    fn recovers_impulse_response_shorter_than_hop() {
        let taps = [0.5, -0.25, 0.125];
        let mut convolver = Convolver::with_hop(&ir_of(&taps), 8);
        let got = impulse_response_of(&mut convolver, 8);
        for (i, &tap) in taps.iter().enumerate() {
            assert!((got[i] - tap).abs() < 1e-4, "tap {i}: {got:?}");
        }
    }

    #[test]
    fn recovers_impulse_response_spanning_partitions() {
        // 11 taps across a hop of 4 -> 3 partitions
        let taps: Vec<f32> = (0..11).map(|i| 1.0 / (i + 1) as f32).collect();
        let mut convolver = Convolver::with_hop(&ir_of(&taps), 4);
        assert_eq!(convolver.partition_count(), 3);

        let got = impulse_response_of(&mut convolver, 16);
        for (i, &tap) in taps.iter().enumerate() {
            assert!(
                (got[i] - tap).abs() < 1e-4,
                "tap {i}: expected {tap}, got {}",
                got[i]
            );
        }
        assert!(got[11..].iter().all(|s| s.abs() < 1e-4));
    }

    #[test]
    fn convolution_is_linear() {
        let taps = [0.25, 0.5];
        let mut a = Convolver::with_hop(&ir_of(&taps), 8);
        let mut b = Convolver::with_hop(&ir_of(&taps), 8);

        let input = [1.0, 2.0, -1.0, 0.5, 0.0, 0.0, 0.0, 0.0];
        let doubled: Vec<f32> = input.iter().map(|s| s * 2.0).collect();

        let mut out_a = vec![0.0; 8];
        let mut out_b = vec![0.0; 8];
        a.process(&input, &mut out_a);
        b.process(&doubled, &mut out_b);

        for (x, y) in out_a.iter().zip(out_b.iter()) {
            assert!((y - 2.0 * x).abs() < 1e-4);
        }
    }

    #[test]
    fn synthesized_tail_decays() {
        let ir = ImpulseResponse::synthesize(1_000.0, 1.0, 2.5, 0.5);
        assert_eq!(ir.samples.len(), 1_000);

        let head: f32 = ir.samples[..100].iter().map(|s| s * s).sum();
        let tail: f32 = ir.samples[900..].iter().map(|s| s * s).sum();
        assert!(head > tail * 10.0, "tail should decay: head={head} tail={tail}");
        assert!(ir.samples.iter().all(|s| s.abs() <= 0.5));
    }

    #[test]
    fn default_room_has_unit_energy() {
        let ir = ImpulseResponse::default_room(8_000.0);
        let energy: f32 = ir.samples.iter().map(|s| s * s).sum();
        assert!((energy - 1.0).abs() < 1e-3, "energy = {energy}");
    }

    #[test]
    fn synthesis_is_deterministic() {
        let a = ImpulseResponse::synthesize(1_000.0, 0.5, 2.0, 0.4);
        let b = ImpulseResponse::synthesize(1_000.0, 0.5, 2.0, 0.4);
        assert_eq!(a.samples, b.samples);
    }
}
