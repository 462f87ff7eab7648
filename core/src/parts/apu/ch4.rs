//! Channel 4: noise, via a selectable 7- or 15-stage LFSR.

use gba_arch::Shared;

pub use super::ch1::Envelope;
use super::reg::{NoiseFreq, NoiseTone};

/// Sound channel 4 registers.
#[derive(Debug, Default)]
pub struct Control {
    pub tone: Shared<NoiseTone>,
    pub freq: Shared<NoiseFreq>,
}

/// Sound channel 4: noise.
#[derive(Debug)]
pub struct Channel {
    pub reg: Control,
    ena: bool,
    env: Envelope,
    len_remaining: f32,
    lfsr: u16,
    acc: f32,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            reg: Control::default(),
            ena: false,
            env: Envelope::default(),
            len_remaining: 0.0,
            lfsr: 0x7fff,
            acc: 0.0,
        }
    }
}

impl Channel {
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.ena
    }

    fn trigger(&mut self) {
        log::debug!("ch4: trigger");
        let tone = *self.reg.tone.borrow();
        self.ena = true;
        self.env.trigger(tone.ivol());
        self.len_remaining = f32::from(64 - tone.len()) / 256.0;
        self.lfsr = 0x7fff;
        self.acc = 0.0;
    }

    /// LFSR clock rate in Hz: `524288 / r / 2^(shift+1)`, with `r = 0.5`
    /// when the divide field is zero.
    fn frequency_hz(&self) -> f32 {
        let freq = *self.reg.freq.borrow();
        let r = if freq.divide() == 0 {
            0.5
        } else {
            f32::from(freq.divide())
        };
        524_288.0 / r / f32::from(1u32 << (freq.shift() + 1))
    }

    /// Advances the shift register by one step, returning the bit shifted
    /// out (the channel's current output level).
    fn shift(&mut self) -> bool {
        let feedback = (self.lfsr & 1) ^ ((self.lfsr >> 1) & 1);
        self.lfsr >>= 1;
        self.lfsr |= feedback << 14;
        if self.reg.freq.borrow().width() {
            self.lfsr &= !(1 << 6);
            self.lfsr |= feedback << 6;
        }
        self.lfsr & 1 == 0
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

        self.acc += self.frequency_hz() * dt;
        let mut level = self.lfsr & 1 == 0;
        while self.acc >= 1.0 {
            self.acc -= 1.0;
            level = self.shift();
        }

        let out = u32::from(level) * u32::from(self.env.vol);
        (out as f32 / 7.5) - 1.0
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
