//! Sound registers: the four legacy PSG control blocks plus the GBA-added
//! mixer/bias registers.
//!
//! Ground truth: <https://problemkaputt.de/gbatek.htm#gbasoundcontroller>.

use bitfield_struct::bitfield;
use gba_arch::mio::{Bus, Mmio};
use gba_arch::reg::Register;
use gba_arch::{Block, Shared};

/// `SOUND1CNT_L`: channel 1 frequency sweep.
#[bitfield(u16, order = lsb)]
pub struct Sweep {
    #[bits(3)]
    pub step: u8,
    #[bits(1)]
    pub sign: bool,
    #[bits(3)]
    pub pace: u8,
    #[bits(9)]
    __: u16,
}

impl Register for Sweep {
    type Value = u16;
    fn load(&self) -> u16 {
        self.0
    }
    fn store(&mut self, value: u16) {
        self.0 = value;
    }
}

crate::macros::memory_map16!(Sweep);

/// `SOUND1CNT_H`/`SOUND2CNT_L`: length, duty cycle, and volume envelope.
/// Identical layout shared by channels 1 and 2.
#[bitfield(u16, order = lsb)]
pub struct Tone {
    #[bits(6)]
    pub len: u8,
    #[bits(2)]
    pub duty: u8,
    #[bits(3)]
    pub pace: u8,
    #[bits(1)]
    pub sign: bool,
    #[bits(4)]
    pub ivol: u8,
}

impl Register for Tone {
    type Value = u16;
    fn load(&self) -> u16 {
        self.0
    }
    fn store(&mut self, value: u16) {
        self.0 = value;
    }
}

crate::macros::memory_map16!(Tone);

/// `SOUND1CNT_X`/`SOUND2CNT_H`/`SOUND3CNT_X`: 11-bit frequency plus
/// length-enable and trigger. Identical layout shared by channels 1, 2,
/// and 3.
#[bitfield(u16, order = lsb)]
pub struct Freq {
    #[bits(11)]
    pub period: u16,
    #[bits(3)]
    __: u8,
    #[bits(1)]
    pub length: bool,
    #[bits(1)]
    pub trigger: bool,
}

impl Register for Freq {
    type Value = u16;
    fn load(&self) -> u16 {
        self.0
    }
    fn store(&mut self, value: u16) {
        self.0 = value;
    }
}

crate::macros::memory_map16!(Freq);

/// `SOUND3CNT_L`: wave channel DAC power and bank selection.
#[bitfield(u16, order = lsb)]
pub struct WaveSelect {
    #[bits(5)]
    __: u8,
    /// `0`: play only the selected bank (32 4-bit samples); `1`: play both
    /// banks back-to-back (64 samples).
    #[bits(1)]
    pub dimension: bool,
    /// Bank currently selected for playback (the other is exposed for
    /// writes through the wave RAM window).
    #[bits(1)]
    pub bank: bool,
    #[bits(1)]
    pub dac_power: bool,
    #[bits(8)]
    __: u8,
}

impl Register for WaveSelect {
    type Value = u16;
    fn load(&self) -> u16 {
        self.0
    }
    fn store(&mut self, value: u16) {
        self.0 = value;
    }
}

crate::macros::memory_map16!(WaveSelect);

/// `SOUND3CNT_H`: wave channel length and output level.
#[bitfield(u16, order = lsb)]
pub struct WaveLevel {
    #[bits(8)]
    pub len: u8,
    #[bits(5)]
    __: u8,
    /// `0`: mute, `1`: 100%, `2`: 50%, `3`: 25%.
    #[bits(2)]
    pub vol: u8,
    /// Overrides `vol` to a fixed 75% when set.
    #[bits(1)]
    pub force75: bool,
}

impl Register for WaveLevel {
    type Value = u16;
    fn load(&self) -> u16 {
        self.0
    }
    fn store(&mut self, value: u16) {
        self.0 = value;
    }
}

crate::macros::memory_map16!(WaveLevel);

/// `SOUND4CNT_L`: noise channel length and volume envelope.
#[bitfield(u16, order = lsb)]
pub struct NoiseTone {
    #[bits(6)]
    pub len: u8,
    #[bits(2)]
    __: u8,
    #[bits(3)]
    pub pace: u8,
    #[bits(1)]
    pub sign: bool,
    #[bits(4)]
    pub ivol: u8,
}

impl Register for NoiseTone {
    type Value = u16;
    fn load(&self) -> u16 {
        self.0
    }
    fn store(&mut self, value: u16) {
        self.0 = value;
    }
}

crate::macros::memory_map16!(NoiseTone);

/// `SOUND4CNT_H`: noise LFSR divider/shift plus length-enable and trigger.
#[bitfield(u16, order = lsb)]
pub struct NoiseFreq {
    #[bits(3)]
    pub divide: u8,
    /// `false`: 15-stage LFSR, `true`: 7-stage.
    #[bits(1)]
    pub width: bool,
    #[bits(4)]
    pub shift: u8,
    #[bits(6)]
    __: u8,
    #[bits(1)]
    pub length: bool,
    #[bits(1)]
    pub trigger: bool,
}

impl Register for NoiseFreq {
    type Value = u16;
    fn load(&self) -> u16 {
        self.0
    }
    fn store(&mut self, value: u16) {
        self.0 = value;
    }
}

crate::macros::memory_map16!(NoiseFreq);

/// `SOUNDCNT_L`: PSG master volume and per-channel left/right panning.
#[bitfield(u16, order = lsb)]
pub struct MixCtrl {
    #[bits(3)]
    pub vol_r: u8,
    #[bits(1)]
    __: bool,
    #[bits(3)]
    pub vol_l: u8,
    #[bits(1)]
    __: bool,
    #[bits(1)]
    pub ch1_r: bool,
    #[bits(1)]
    pub ch2_r: bool,
    #[bits(1)]
    pub ch3_r: bool,
    #[bits(1)]
    pub ch4_r: bool,
    #[bits(1)]
    pub ch1_l: bool,
    #[bits(1)]
    pub ch2_l: bool,
    #[bits(1)]
    pub ch3_l: bool,
    #[bits(1)]
    pub ch4_l: bool,
}

impl Register for MixCtrl {
    type Value = u16;
    fn load(&self) -> u16 {
        self.0
    }
    fn store(&mut self, value: u16) {
        self.0 = value;
    }
}

crate::macros::memory_map16!(MixCtrl);

/// `SOUNDCNT_H`: PSG/direct-sound volume ratios, panning, and timer
/// linkage for the two FIFO channels.
#[bitfield(u16, order = lsb)]
pub struct DSoundCtrl {
    /// PSG ratio: `0`=25%, `1`=50%, `2`=100%.
    #[bits(2)]
    pub psg_vol: u8,
    /// `false`=50%, `true`=100%.
    #[bits(1)]
    pub a_vol: bool,
    #[bits(1)]
    pub b_vol: bool,
    #[bits(4)]
    __: u8,
    #[bits(1)]
    pub a_right: bool,
    #[bits(1)]
    pub a_left: bool,
    #[bits(1)]
    pub a_timer: bool,
    #[bits(1)]
    pub a_reset: bool,
    #[bits(1)]
    pub b_right: bool,
    #[bits(1)]
    pub b_left: bool,
    #[bits(1)]
    pub b_timer: bool,
    #[bits(1)]
    pub b_reset: bool,
}

impl Register for DSoundCtrl {
    type Value = u16;
    fn load(&self) -> u16 {
        self.0
    }
    fn store(&mut self, value: u16) {
        self.0 = value;
    }
}

crate::macros::memory_map16!(DSoundCtrl);

/// `SOUNDCNT_X`: master enable plus read-only per-channel "is playing"
/// flags.
#[bitfield(u16, order = lsb)]
pub struct MasterCtrl {
    #[bits(1)]
    pub ch1_on: bool,
    #[bits(1)]
    pub ch2_on: bool,
    #[bits(1)]
    pub ch3_on: bool,
    #[bits(1)]
    pub ch4_on: bool,
    #[bits(3)]
    __: u8,
    #[bits(1)]
    pub enable: bool,
    #[bits(8)]
    __: u8,
}

impl Register for MasterCtrl {
    type Value = u16;
    fn load(&self) -> u16 {
        self.0
    }
    fn store(&mut self, value: u16) {
        // Only the enable bit is guest-writable; the on-flags are
        // maintained by the channels themselves.
        let on = self.0 & 0x000f;
        self.0 = (value & 0x0080) | on;
    }
}

crate::macros::memory_map16!(MasterCtrl);

/// `SOUNDBIAS`: PWM bias level and sampling resolution. Decoded for
/// readback only; the soft mixer always produces full-resolution
/// samples regardless of the configured cycle.
#[bitfield(u16, order = lsb)]
pub struct Bias {
    #[bits(1)]
    __: bool,
    #[bits(9)]
    pub level: u16,
    #[bits(4)]
    __: u8,
    #[bits(2)]
    pub cycle: u8,
}

impl Register for Bias {
    type Value = u16;
    fn load(&self) -> u16 {
        self.0
    }
    fn store(&mut self, value: u16) {
        self.0 = value;
    }
}

crate::macros::memory_map16!(Bias);

/// The mixer-level registers (`SOUNDCNT_L/H/X`, `SOUNDBIAS`), shared
/// across all four PSG channels and the two direct-sound FIFOs.
#[derive(Debug, Default)]
pub struct Mixer {
    pub cnt_l: Shared<MixCtrl>,
    pub cnt_h: Shared<DSoundCtrl>,
    pub cnt_x: Shared<MasterCtrl>,
    pub bias: Shared<Bias>,
}

impl Block for Mixer {
    fn reset(&mut self) {
        self.cnt_l.take();
        self.cnt_h.take();
        self.cnt_x.take();
        self.bias.take();
    }
}

impl Mmio for Mixer {
    fn attach(&self, bus: &mut Bus) {
        bus.map(0x0400_0080..=0x0400_0081, self.cnt_l.clone().into());
        bus.map(0x0400_0082..=0x0400_0083, self.cnt_h.clone().into());
        bus.map(0x0400_0084..=0x0400_0085, self.cnt_x.clone().into());
        bus.map(0x0400_0088..=0x0400_0089, self.bias.clone().into());
    }
}
