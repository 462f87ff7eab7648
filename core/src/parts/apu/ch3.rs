//! Channel 3: wave RAM output.
//!
//! The GBA doubles the DMG's single 16-byte wave bank into two banks of
//! 16 bytes (32 4-bit samples each); `dimension` chains them into one
//! 64-sample waveform, `bank` selects which one is currently audible
//! while the other remains writable through the same bus window.

use gba_arch::mem::Memory;
use gba_arch::{Shared, Word};

use super::reg::{Freq, WaveLevel, WaveSelect};

/// One 16-byte wave RAM bank (32 4-bit samples, big-endian nibble order).
#[derive(Debug)]
pub struct Bank {
    bytes: [u8; 16],
}

impl Default for Bank {
    fn default() -> Self {
        Self { bytes: [0u8; 16] }
    }
}

impl Bank {
    fn nibble(&self, idx: u8) -> u8 {
        let byte = self.bytes[usize::from(idx >> 1)];
        if idx & 1 == 0 {
            byte >> 4
        } else {
            byte & 0x0f
        }
    }
}

impl Memory for Bank {
    fn read(&self, addr: Word) -> gba_arch::mem::Result<u8> {
        Ok(self.bytes[addr as usize % 16])
    }

    fn write(&mut self, addr: Word, data: u8) -> gba_arch::mem::Result<()> {
        self.bytes[addr as usize % 16] = data;
        Ok(())
    }
}

/// Wave RAM: two banks, but only one is ever visible through the 16-byte
/// `0x0400_0090..=0x0400_009f` bus window at a time. `SOUND3CNT_L`'s bank
/// bit picks which; the other keeps playing (in 64-sample `dimension`
/// mode) or simply holds its last contents while hidden.
#[derive(Debug)]
pub struct Wave {
    pub banks: [Bank; 2],
    pub select: Shared<WaveSelect>,
}

impl Default for Wave {
    fn default() -> Self {
        Self {
            banks: [Bank::default(), Bank::default()],
            select: Shared::default(),
        }
    }
}

impl Memory for Wave {
    fn read(&self, addr: Word) -> gba_arch::mem::Result<u8> {
        let bank = usize::from(self.select.borrow().bank());
        self.banks[bank].read(addr % 16)
    }

    fn write(&mut self, addr: Word, data: u8) -> gba_arch::mem::Result<()> {
        let bank = usize::from(self.select.borrow().bank());
        self.banks[bank].write(addr % 16, data)
    }
}

/// Channel 3 registers.
#[derive(Debug, Default)]
pub struct Control {
    pub select: Shared<WaveSelect>,
    pub level: Shared<WaveLevel>,
    pub freq: Shared<Freq>,
}

/// Sound channel 3: wave output.
#[derive(Debug, Default)]
pub struct Channel {
    pub reg: Control,
    pub mem: Shared<Wave>,
    ena: bool,
    idx: u8,
    len_remaining: f32,
}

impl Channel {
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.ena
    }

    fn trigger(&mut self) {
        log::debug!("ch3: trigger");
        self.ena = self.reg.select.borrow().dac_power();
        self.idx = 0;
        let len = self.reg.level.borrow().len();
        self.len_remaining = f32::from(256 - u16::from(len)) / 256.0;
    }

    fn frequency_hz(&self) -> f32 {
        let period = f32::from(self.reg.freq.borrow().period());
        // Sample-advance rate: 32 samples complete one 65536/(2048-x) Hz
        // waveform cycle.
        2_097_152.0 / (2048.0 - period)
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

        if !self.reg.select.borrow().dac_power() || !self.ena {
            return -1.0;
        }

        let steps = self.frequency_hz() * dt;
        let dimension = self.reg.select.borrow().dimension();
        let span = if dimension { 64 } else { 32 };
        self.idx = (f32::from(self.idx) + steps).rem_euclid(f32::from(span)) as u8;

        let select = *self.reg.select.borrow();
        let (bank, local) = if dimension {
            (u32::from(self.idx) / 32, (self.idx % 32) as u8)
        } else {
            (u32::from(select.bank()), self.idx)
        };
        let mem = self.mem.borrow();
        let nibble = mem.banks[bank as usize % 2].nibble(local);
        drop(mem);

        let level = *self.reg.level.borrow();
        let out = if level.force75() {
            u32::from(nibble) * 3 / 4
        } else {
            u32::from(nibble) >> ((4 + level.vol()) % 5)
        };
        (out as f32 / 7.5) - 1.0
    }

    pub fn reset(&mut self) {
        self.ena = false;
        self.idx = 0;
        self.len_remaining = 0.0;
    }
}
