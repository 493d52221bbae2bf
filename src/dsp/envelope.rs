use crate::MIN_TIME;

/*
ADSR Envelope
=============

Linear attack/decay/sustain/release amplitude envelope, the state machine
that shapes every sampler voice:

  Level
    1.0 |     /\
        |    /  \___________
    S   |   /               \
        |  /                 \
    0.0 |_/___________________\___ Time
        Attack Decay  Sustain  Release

note_on restarts the attack from zero so repeated notes stay distinct;
note_off starts the release from the CURRENT level, whatever stage we are
in, which is what prevents clicks when a note is released mid-attack.
Release interpolates from a snapshot so it lands exactly on 0.
*/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeState {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

#[derive(Debug, Clone)]
pub struct Envelope {
    attack_time: f32,
    decay_time: f32,
    sustain_level: f32,
    release_time: f32,

    stage: EnvelopeState,
    level: f32,

    release_start_level: f32,
    release_total_samples: u32,
    release_elapsed_samples: u32,
}

impl Envelope {
    pub fn adsr(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack_time: attack.max(MIN_TIME),
            decay_time: decay.max(MIN_TIME),
            sustain_level: sustain.clamp(0.0, 1.0),
            release_time: release.max(MIN_TIME),

            stage: EnvelopeState::Idle,
            level: 0.0,
            release_start_level: 0.0,
            release_total_samples: 1,
            release_elapsed_samples: 0,
        }
    }

    /// Gate high: restart the attack from zero.
    pub fn note_on(&mut self) {
        self.level = 0.0;
        self.stage = EnvelopeState::Attack;
        self.release_elapsed_samples = 0;
    }

    /// Gate low: release from the current level. The release length in
    /// samples is derived at render time, like every other stage, so the
    /// gate-off call needs no sample rate.
    pub fn note_off(&mut self) {
        if self.stage == EnvelopeState::Idle {
            return;
        }

        self.release_start_level = self.level;
        self.release_elapsed_samples = 0;
        self.stage = EnvelopeState::Release;
    }

    /// Advance one sample and return the new level.
    pub fn next_sample(&mut self, sample_rate: f32) -> f32 {
        match self.stage {
            EnvelopeState::Idle => {
                self.level = 0.0;
            }

            EnvelopeState::Attack => {
                self.level += 1.0 / (self.attack_time * sample_rate);
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = EnvelopeState::Decay;
                }
            }

            EnvelopeState::Decay => {
                let drop = 1.0 - self.sustain_level;
                self.level -= drop / (self.decay_time * sample_rate);
                if self.level <= self.sustain_level {
                    self.level = self.sustain_level;
                    self.stage = EnvelopeState::Sustain;
                }
            }

            EnvelopeState::Sustain => {
                self.level = self.sustain_level;
            }

            EnvelopeState::Release => {
                self.release_total_samples =
                    (self.release_time * sample_rate).round().max(1.0) as u32;
                let progress =
                    self.release_elapsed_samples as f32 / self.release_total_samples as f32;
                self.level = (self.release_start_level * (1.0 - progress)).max(0.0);
                self.release_elapsed_samples = self.release_elapsed_samples.saturating_add(1);

                if self.release_elapsed_samples >= self.release_total_samples {
                    self.level = 0.0;
                    self.stage = EnvelopeState::Idle;
                }
            }
        }

        debug_assert!((0.0..=1.0).contains(&self.level));
        self.level
    }

    pub fn is_active(&self) -> bool {
        self.stage != EnvelopeState::Idle
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn state(&self) -> EnvelopeState {
        self.stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 1_000.0;

    fn advance(env: &mut Envelope, samples: usize) {
        for _ in 0..samples {
            env.next_sample(SAMPLE_RATE);
        }
    }

    #[test]
    fn attack_reaches_full_level() {
        let mut env = Envelope::adsr(0.01, 0.1, 0.7, 0.2);
        env.note_on();
        advance(&mut env, (0.01 * SAMPLE_RATE) as usize);

        assert!(env.level() > 0.99);
        assert_ne!(env.state(), EnvelopeState::Attack);
    }

    #[test]
    fn sustain_holds_target_level() {
        let sustain = 0.6;
        let mut env = Envelope::adsr(0.01, 0.05, sustain, 0.2);
        env.note_on();
        advance(&mut env, ((0.01 + 0.05) * SAMPLE_RATE) as usize + 5);

        assert_eq!(env.state(), EnvelopeState::Sustain);
        assert!((env.level() - sustain).abs() < 0.05);
    }

    #[test]
    fn release_falls_back_to_idle() {
        let release = 0.03;
        let mut env = Envelope::adsr(0.01, 0.05, 0.5, release);
        env.note_on();
        advance(&mut env, (0.02 * SAMPLE_RATE) as usize);

        env.note_off();
        advance(&mut env, (release * SAMPLE_RATE) as usize + 2);

        assert!(env.level() <= 0.001);
        assert_eq!(env.state(), EnvelopeState::Idle);
        assert!(!env.is_active());
    }

    #[test]
    fn release_during_attack_starts_from_current_level() {
        let mut env = Envelope::adsr(0.1, 0.05, 0.7, 0.05);
        env.note_on();
        advance(&mut env, 30); // ~30% into the attack
        let level_at_release = env.level();
        assert!(level_at_release < 0.5);

        env.note_off();
        let next = env.next_sample(SAMPLE_RATE);
        assert!(next <= level_at_release, "release must not jump upward");
    }

    #[test]
    fn note_off_while_idle_is_a_no_op() {
        let mut env = Envelope::adsr(0.01, 0.05, 0.7, 0.1);
        env.note_off();
        assert_eq!(env.state(), EnvelopeState::Idle);
    }
}
