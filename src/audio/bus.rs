use crate::dsp::biquad::Biquad;
use crate::dsp::convolver::{Convolver, ImpulseResponse};
use crate::dsp::gain::{GainParam, DEFAULT_RAMP_SECONDS};
use crate::project::eq::{EqBand, EqBandId};
use crate::project::TimelineProject;

/*
Master Bus
==========

The output end of the signal graph, one per running project:

    input ──► [5 EQ bands in series] ──► master gain ──┬──► dry ─────────► out
                                                       └─► convolver ─► boost ─► wet ─► out

Master volume and reverb mix arrive as exponential ramps so slider moves
never step the gain audibly; a requested 0 ramps to the epsilon instead
(the persisted project value stays 0). EQ band gains are assigned directly -
they come from drag events that are already a smooth stream.

The reverb impulse response is synthesized decaying noise, never loaded
from a file.
*/

/// Fixed make-up gain on the reverb return, matching the wet path's
/// perceived loudness to the dry path.
pub const REVERB_BOOST: f32 = 1.5;

pub struct AudioBus {
    sample_rate: f32,
    eq: Vec<(EqBandId, Biquad)>,
    master: GainParam,
    dry: GainParam,
    wet: GainParam,
    convolver: Convolver,
    wet_buf: Vec<f32>,
    conv_buf: Vec<f32>,
}

impl AudioBus {
    pub fn new(sample_rate: f32, eq_bands: &[EqBand]) -> Self {
        let eq = eq_bands
            .iter()
            .map(|band| {
                (
                    band.id,
                    Biquad::new(band.shape, band.frequency, band.gain, sample_rate),
                )
            })
            .collect();

        let impulse = ImpulseResponse::default_room(sample_rate);

        Self {
            sample_rate,
            eq,
            master: GainParam::new(1.0),
            dry: GainParam::new(1.0),
            wet: GainParam::new(0.0),
            convolver: Convolver::new(&impulse),
            wet_buf: vec![0.0; crate::MAX_BLOCK_SIZE],
            conv_buf: vec![0.0; crate::MAX_BLOCK_SIZE],
        }
    }

    /// Snap every parameter to the project's current settings without
    /// ramping. Used right after construction / project load.
    pub fn apply_project(&mut self, project: &TimelineProject) {
        self.master.set_now(project.volume as f32 / 100.0);
        self.wet.set_now(project.reverb as f32 / 100.0);
        for band in &project.eq_bands {
            self.set_eq_gain(band.id, band.gain);
        }
    }

    pub fn set_master_volume(&mut self, volume: u8) {
        self.master.ramp_to(
            volume.min(100) as f32 / 100.0,
            DEFAULT_RAMP_SECONDS,
            self.sample_rate,
        );
    }

    pub fn set_master_reverb(&mut self, reverb: u8) {
        self.wet.ramp_to(
            reverb.min(100) as f32 / 100.0,
            DEFAULT_RAMP_SECONDS,
            self.sample_rate,
        );
    }

    pub fn set_eq_gain(&mut self, band: EqBandId, gain_db: f32) {
        if let Some((_, filter)) = self.eq.iter_mut().find(|(id, _)| *id == band) {
            filter.set_gain_db(gain_db);
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    #[cfg(test)]
    pub fn master_target(&self) -> f32 {
        self.master.target()
    }

    /// Run the master chain over `inout` (the accumulated bus input).
    pub fn render_block(&mut self, inout: &mut [f32]) {
        let len = inout.len();
        debug_assert!(len <= crate::MAX_BLOCK_SIZE);

        for (_, filter) in &mut self.eq {
            filter.render(inout);
        }
        self.master.apply(inout);

        // Split after the master: dry passes through, wet goes through the
        // convolver and its boost.
        let wet_in = &mut self.wet_buf[..len];
        wet_in.copy_from_slice(inout);
        let conv_out = &mut self.conv_buf[..len];
        self.convolver.process(wet_in, conv_out);

        for (sample, &wet) in inout.iter_mut().zip(conv_out.iter()) {
            *sample = *sample * self.dry.next() + wet * REVERB_BOOST * self.wet.next();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::eq::default_eq_bands;
    use crate::GAIN_EPSILON;

    const SAMPLE_RATE: f32 = 48_000.0;

    fn bus() -> AudioBus {
        AudioBus::new(SAMPLE_RATE, &default_eq_bands())
    }

    fn rms(buffer: &[f32]) -> f32 {
        (buffer.iter().map(|s| s * s).sum::<f32>() / buffer.len() as f32).sqrt()
    }

    #[test]
    fn flat_bus_passes_signal_through() {
        let mut bus = bus();
        bus.set_master_reverb(0);
        let mut block: Vec<f32> = (0..512).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
        let input_rms = rms(&block);
        bus.render_block(&mut block);
        let output_rms = rms(&block);
        assert!(
            (output_rms - input_rms).abs() / input_rms < 0.2,
            "flat chain should be roughly transparent: {input_rms} -> {output_rms}"
        );
    }

    #[test]
    fn master_volume_zero_targets_epsilon() {
        let mut bus = bus();
        bus.set_master_volume(0);
        assert_eq!(bus.master_target(), GAIN_EPSILON);
    }

    #[test]
    fn volume_ramp_attenuates_output() {
        let mut bus = bus();
        bus.set_master_volume(0);

        // Past the 50 ms ramp the output must be essentially silent.
        let mut block = vec![0.25; 1024];
        for _ in 0..4 {
            block.iter_mut().for_each(|s| *s = 0.25);
            bus.render_block(&mut block);
        }
        assert!(rms(&block) < 0.001);
    }

    #[test]
    fn reverb_adds_a_tail() {
        let mut bus = bus();
        bus.apply_project(&crate::project::TimelineProject::empty("t")); // reverb 20
        bus.set_master_reverb(80);

        // Excite with a burst, then render silence and look for energy.
        let mut block = vec![0.5; 512];
        bus.render_block(&mut block);

        let mut tail_energy = 0.0;
        for _ in 0..20 {
            let mut silence = vec![0.0; 512];
            bus.render_block(&mut silence);
            tail_energy += silence.iter().map(|s| s * s).sum::<f32>();
        }
        assert!(tail_energy > 1e-4, "expected a reverb tail, got {tail_energy}");
    }

    #[test]
    fn eq_gain_changes_are_applied() {
        let mut bus = bus();
        bus.set_eq_gain(EqBandId::Sub, 18.0);

        // A DC-ish low signal should come out boosted by the low shelf.
        let mut block = vec![0.1; 4096];
        bus.set_master_reverb(0);
        bus.render_block(&mut block);
        assert!(
            block[4095].abs() > 0.15,
            "low shelf boost should raise low-frequency level, got {}",
            block[4095]
        );
    }
}
