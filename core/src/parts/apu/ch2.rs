//! Channel 2: square wave, no sweep.

use gba_arch::Shared;

pub use super::ch1::{Envelope, DUTY};
use super::reg::{Freq, Tone};

/// Channel 2 registers.
#[derive(Debug, Default)]
pub struct Control {
    pub tone: Shared<Tone>,
    pub freq: Shared<Freq>,
}

/// Sound channel 2: pulse.
#[derive(Debug, Default)]
pub struct Channel {
    pub reg: Control,
    ena: bool,
    phase: f32,
    env: Envelope,
    len_remaining: f32,
}

impl Channel {
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.ena
    }

    fn trigger(&mut self) {
        log::debug!("ch2: trigger");
        let tone = *self.reg.tone.borrow();
        self.ena = true;
        self.phase = 0.0;
        self.env.trigger(tone.ivol());
        self.len_remaining = f32::from(64 - tone.len()) / 256.0;
    }

    fn frequency_hz(&self) -> f32 {
        let period = f32::from(self.reg.freq.borrow().period());
        131_072.0 / (2048.0 - period)
    }

    /// Advances by `dt` seconds, returning the DAC output in
    /// `[-1.0, 1.0]`.
    pub fn sample(&mut self, dt: f32) -> f32 {
        if self.reg.freq.borrow().trigger() {
            self.trigger();
            self.reg.freq.borrow_mut().set_trigger(false);
        }

        if self.reg.freq.borrow().length() {
            self.len_remaining -= dt;
            if self.len_remaining <= 0.0 {
                self.ena = false;
            }
        }

        let tone = *self.reg.tone.borrow();
        self.env.advance(dt, tone.pace(), tone.sign());

        let dac_on = tone.ivol() > 0 || tone.sign();
        if !dac_on || !self.ena {
            return -1.0;
        }

        self.phase = (self.phase + self.frequency_hz() * dt).rem_euclid(1.0);
        let step = ((self.phase * 8.0) as usize) & 0x7;
        let level = DUTY[usize::from(tone.duty())][step];
        let out = u32::from(level) * u32::from(self.env.vol);
        (out as f32 / 7.5) - 1.0
    }

    pub fn reset(&mut self) {
        self.ena = false;
        self.phase = 0.0;
        self.env = Envelope::default();
        self.len_remaining = 0.0;
    }
}
