//! Channel 1: square wave with frequency sweep.

use gba_arch::Shared;

use super::reg::{Freq, Sweep, Tone};

/// Output waveform duty patterns, one bit per eighth of the period.
pub const DUTY: [[u8; 8]; 4] = [
    [0, 0, 0, 0, 0, 0, 0, 1], // 12.5%
    [1, 0, 0, 0, 0, 0, 0, 1], // 25.0%
    [1, 0, 0, 0, 0, 1, 1, 1], // 50.0%
    [0, 1, 1, 1, 1, 1, 1, 0], // 75.0%
];

/// Volume envelope, reused by every PSG channel.
#[derive(Debug, Default)]
pub struct Envelope {
    pub vol: u8,
    acc: f32,
}

impl Envelope {
    pub(super) fn trigger(&mut self, ivol: u8) {
        self.vol = ivol;
        self.acc = 0.0;
    }

    /// Advances by `dt` seconds at the fixed 64 Hz envelope rate.
    pub(super) fn advance(&mut self, dt: f32, pace: u8, sign: bool) {
        if pace == 0 {
            return;
        }
        self.acc += dt;
        let period = f32::from(pace) / 64.0;
        while self.acc >= period {
            self.acc -= period;
            self.vol = if sign {
                self.vol.saturating_add(1).min(0xf)
            } else {
                self.vol.saturating_sub(1)
            };
        }
    }
}

/// Channel 1 registers.
#[derive(Debug, Default)]
pub struct Control {
    pub sweep: Shared<Sweep>,
    pub tone: Shared<Tone>,
    pub freq: Shared<Freq>,
}

/// Sound channel 1: pulse with period sweep.
#[derive(Debug, Default)]
pub struct Channel {
    pub reg: Control,
    ena: bool,
    phase: f32,
    env: Envelope,
    len_remaining: f32,
    sweep_ena: bool,
    sweep_shadow: u16,
    sweep_acc: f32,
}

impl Channel {
    /// Whether the channel is currently producing sound (for `SOUNDCNT_X`
    /// readback).
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.ena
    }

    fn trigger(&mut self) {
        log::debug!("ch1: trigger");
        let tone = *self.reg.tone.borrow();
        let sweep = *self.reg.sweep.borrow();

        self.ena = true;
        self.phase = 0.0;
        self.env.trigger(tone.ivol());
        self.len_remaining = f32::from(64 - tone.len()) / 256.0;
        self.sweep_shadow = self.reg.freq.borrow().period();
        self.sweep_ena = sweep.pace() != 0 || sweep.step() != 0;
        self.sweep_acc = 0.0;

        if sweep.step() != 0 {
            self.overflow_check();
        }
    }

    /// Frequency-sweep overflow check; disables the channel once the
    /// shadow frequency would exceed the 11-bit range.
    fn overflow_check(&mut self) -> Option<u16> {
        let sweep = *self.reg.sweep.borrow();
        let step = self.sweep_shadow >> sweep.step();
        let next = if sweep.sign() {
            self.sweep_shadow.saturating_sub(step)
        } else {
            self.sweep_shadow.saturating_add(step)
        };
        if next > 0x7ff {
            log::debug!("ch1: disable (sweep overflow)");
            self.ena = false;
            None
        } else {
            Some(next)
        }
    }

    fn frequency_hz(&self) -> f32 {
        let period = f32::from(self.reg.freq.borrow().period());
        131_072.0 / (2048.0 - period)
    }

    /// Advances this channel by `dt` seconds (one host sample period) and
    /// returns its DAC output, linearly scaled to `[-1.0, 1.0]`.
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

        let sweep = *self.reg.sweep.borrow();
        if sweep.pace() != 0 && self.sweep_ena {
            self.sweep_acc += dt;
            let period = f32::from(sweep.pace()) / 128.0;
            while self.sweep_acc >= period {
                self.sweep_acc -= period;
                if let Some(next) = self.overflow_check() {
                    if sweep.step() != 0 {
                        self.sweep_shadow = next;
                        self.reg.freq.borrow_mut().set_period(next);
                        self.overflow_check();
                    }
                }
            }
        }

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
        self.sweep_ena = false;
        self.sweep_shadow = 0;
        self.sweep_acc = 0.0;
    }
}
