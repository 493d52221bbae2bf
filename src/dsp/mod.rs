//! Low-level DSP primitives used by the audio bus and instrument engines.
//!
//! These components are allocation-free after construction and realtime-safe,
//! making them safe to embed directly inside channel and voice structs. They
//! stay focused on the signal-processing math; the `audio` module layers the
//! graph topology on top.

/// Biquad filter with the EQ band responses (shelves and peaking).
pub mod biquad;
/// Partitioned convolution and impulse-response synthesis for the reverb.
pub mod convolver;
/// Attack/decay/sustain/release envelope generator.
pub mod envelope;
/// Scalar gain parameter with exponential ramp scheduling.
pub mod gain;
/// Oscillator waveforms.
pub mod oscillator;

pub use envelope::EnvelopeState;
