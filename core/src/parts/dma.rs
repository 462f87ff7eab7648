//! Direct memory access engine: four independent channels capable of
//! copying between any two addresses in the 32-bit space without CPU
//! involvement.
//!
//! Each channel is driven one transfer unit (halfword or word) at a time by
//! [`Dma::step`], mirroring the single-byte-at-a-time OAM DMA state machine
//! this was generalized from, rather than copying a whole block in one
//! call.
//!
//! Ground truth: <https://problemkaputt.de/gbatek.htm#gbadmatransfers>.

use bitfield_struct::bitfield;
use gba_arch::mio::{Bus, Mmio};
use gba_arch::reg::Register;
use gba_arch::{Block, Shared, Word};
use log::{debug, trace, warn};

use crate::parts::pic::{Interrupt, Line};

/// Address-register post-transfer adjustment.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum AddrCtrl {
    Increment,
    Decrement,
    Fixed,
    /// Destination only: increment, reloading to the base address whenever
    /// the channel repeats.
    IncReload,
}

impl From<u8> for AddrCtrl {
    fn from(value: u8) -> Self {
        match value & 0b11 {
            0 => Self::Increment,
            1 => Self::Decrement,
            2 => Self::Fixed,
            _ => Self::IncReload,
        }
    }
}

/// When a channel's transfer is triggered.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Trigger {
    /// The instant `DMAxCNT_H` is written with `enable` freshly set.
    Immediate,
    /// At the start of each VBlank.
    VBlank,
    /// At the start of each HBlank.
    HBlank,
    /// Sound FIFO refill request (channels 1/2 with `special` timing).
    Fifo,
    /// Video-capture HBlank, raised for lines 2..=161 (channel 3 with
    /// `special` timing). `last` marks line 161, the capture's final line.
    VideoCapture { last: bool },
}

/// The raw 2-bit `DMAxCNT_H` timing field, decoded independent of which
/// trigger it ultimately matches (that depends on the channel: `special`
/// means FIFO refill for channels 1/2, video capture for channel 3).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Timing {
    Immediate,
    VBlank,
    HBlank,
    Special,
}

impl From<u8> for Timing {
    fn from(value: u8) -> Self {
        match value & 0b11 {
            0 => Self::Immediate,
            1 => Self::VBlank,
            2 => Self::HBlank,
            _ => Self::Special,
        }
    }
}

/// Per-channel run state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum State {
    /// Waiting for its trigger (or disabled).
    #[default]
    Idle,
    /// Latched and ready; becomes `Running` on the next [`Dma::step`].
    Armed { src: u32, dst: u32, remain: u32 },
    /// Mid-transfer.
    Running { src: u32, dst: u32, remain: u32 },
}

/// A plain 32-bit address latch (`DMAxSAD`/`DMAxDAD`).
///
/// Real hardware is write-only here; this allows readback purely so a
/// debugger front end can inspect the latched address.
#[derive(Debug, Default)]
struct Addr(u32, u32);

impl Addr {
    fn new(mask: u32) -> Self {
        Self(0, mask)
    }
}

impl Register for Addr {
    type Value = u32;

    fn load(&self) -> u32 {
        self.0
    }

    fn store(&mut self, value: u32) {
        self.0 = value & self.1;
    }
}

crate::macros::memory_map32!(Addr);

/// Word count latch (`DMAxCNT_L`).
#[derive(Debug, Default)]
struct Count(u16);

impl Register for Count {
    type Value = u16;

    fn load(&self) -> u16 {
        self.0
    }

    fn store(&mut self, value: u16) {
        self.0 = value;
    }
}

crate::macros::memory_map16!(Count);

/// `DMAxCNT_H`.
#[bitfield(u16, order = msb)]
pub struct Control {
    #[bits(1)]
    enable: bool,
    #[bits(1)]
    irq_enable: bool,
    #[bits(2)]
    timing: u8,
    /// Game Pak DRQ (channel 3 only).
    #[bits(1)]
    drq: bool,
    #[bits(1)]
    word_size32: bool,
    #[bits(1)]
    repeat: bool,
    #[bits(2)]
    src_ctrl: u8,
    #[bits(2)]
    dest_ctrl: u8,
    #[bits(5)]
    __: u16,
}

impl Register for Control {
    type Value = u16;

    fn load(&self) -> u16 {
        self.0
    }

    fn store(&mut self, value: u16) {
        self.0 = value;
    }
}

crate::macros::memory_map16!(Control);

/// A single DMA channel.
#[derive(Debug)]
struct Channel {
    idx: usize,
    src: Shared<Addr>,
    dst: Shared<Addr>,
    count: Shared<Count>,
    ctrl: Shared<Control>,
    state: State,
    /// Set while the in-flight transfer was armed by a video-capture
    /// trigger, so completion doesn't fall into the ordinary repeat-rearm
    /// path (capture re-arms only on the next matching HBlank).
    is_capture: bool,
    /// Set alongside `is_capture` when this is line 161's capture, so
    /// completion also clears `enable`.
    capture_last: bool,
}

impl Channel {
    fn new(idx: usize) -> Self {
        let src_mask = if idx == 0 { 0x07ff_ffff } else { 0x0fff_ffff };
        let dst_mask = if idx == 3 { 0x0fff_ffff } else { 0x07ff_ffff };
        Self {
            idx,
            src: Addr::new(src_mask).into(),
            dst: Addr::new(dst_mask).into(),
            count: Shared::default(),
            ctrl: Shared::default(),
            state: State::Idle,
            is_capture: false,
            capture_last: false,
        }
    }

    /// `DMAxCNT_L` reads back as zero once masked: a value of 0 means "the
    /// maximum transfer length" (0x4000, or 0x1_0000 for channel 3).
    fn count_mask(&self) -> u32 {
        if self.idx == 3 { 0xffff } else { 0x3fff }
    }

    fn latch(&self) -> (u32, u32, u32) {
        let raw = u32::from(self.count.load());
        let count = raw & self.count_mask();
        let count = if count == 0 { self.count_mask() + 1 } else { count };
        (self.src.load(), self.dst.load(), count)
    }

    /// Checks whether `trigger` should arm this channel. `special` timing
    /// means FIFO refill for channels 1/2, video capture for channel 3.
    fn notify(&mut self, trigger: Trigger) {
        if !matches!(self.state, State::Idle) {
            return;
        }
        let ctrl = self.ctrl.borrow();
        if !ctrl.enable() {
            return;
        }
        let matched = match (Timing::from(ctrl.timing()), trigger) {
            (Timing::Immediate, Trigger::Immediate)
            | (Timing::VBlank, Trigger::VBlank)
            | (Timing::HBlank, Trigger::HBlank) => true,
            (Timing::Special, Trigger::Fifo) => self.idx == 1 || self.idx == 2,
            (Timing::Special, Trigger::VideoCapture { .. }) => self.idx == 3,
            _ => false,
        };
        if !matched {
            return;
        }
        drop(ctrl);
        let (src, dst, remain) = self.latch();
        trace!(
            "dma{}: armed ({trigger:?}) src={src:#010x} dst={dst:#010x} count={remain:#x}",
            self.idx
        );
        self.is_capture = matches!(trigger, Trigger::VideoCapture { .. });
        self.capture_last = matches!(trigger, Trigger::VideoCapture { last: true });
        self.state = State::Armed { src, dst, remain };
    }

    /// Runs a single transfer unit. Returns `Some(true)` if the channel
    /// just completed (and should raise its interrupt, if enabled).
    fn step(&mut self, bus: &mut Bus) -> Option<bool> {
        let (src, dst, remain) = match self.state {
            State::Idle => return None,
            State::Armed { src, dst, remain } => {
                self.state = State::Running { src, dst, remain };
                return None;
            }
            State::Running { src, dst, remain } => (src, dst, remain),
        };

        let (word_size32, src_ctrl, dest_ctrl, repeat, timing, irq_enable) = {
            let ctrl = self.ctrl.borrow();
            (
                ctrl.word_size32(),
                ctrl.src_ctrl(),
                ctrl.dest_ctrl(),
                ctrl.repeat(),
                ctrl.timing(),
                ctrl.irq_enable(),
            )
        };
        let unit = if word_size32 { 4 } else { 2 };
        transfer_unit(bus, src, dst, unit);

        let step = |addr: u32, kind: u8| -> u32 {
            match AddrCtrl::from(kind) {
                AddrCtrl::Increment | AddrCtrl::IncReload => addr.wrapping_add(unit),
                AddrCtrl::Decrement => addr.wrapping_sub(unit),
                AddrCtrl::Fixed => addr,
            }
        };
        let src = step(src, src_ctrl);
        let dst = step(dst, dest_ctrl);
        let remain = remain - 1;

        if remain == 0 {
            debug!("dma{}: transfer complete", self.idx);
            if self.is_capture {
                // Re-arms only on the next matching HBlank, not immediately;
                // the enable bit stays set until line 161's line completes.
                if self.capture_last {
                    self.ctrl.borrow_mut().set_enable(false);
                }
                self.is_capture = false;
                self.capture_last = false;
                self.state = State::Idle;
            } else if repeat && Timing::from(timing) != Timing::Immediate {
                let (_latched_src, latched_dst, latched_count) = self.latch();
                let dst = if matches!(AddrCtrl::from(dest_ctrl), AddrCtrl::IncReload) {
                    latched_dst
                } else {
                    dst
                };
                self.state = State::Armed {
                    src,
                    dst,
                    remain: latched_count,
                };
            } else {
                self.ctrl.borrow_mut().set_enable(false);
                self.state = State::Idle;
            }
            Some(irq_enable)
        } else {
            self.state = State::Running { src, dst, remain };
            None
        }
    }
}

fn transfer_unit(bus: &mut Bus, src: u32, dst: u32, unit: u32) {
    use gba_arch::mem::Memory;
    for i in 0..unit {
        let byte = bus.read(src.wrapping_add(i)).unwrap_or_else(|err| {
            warn!("dma source read at {:#010x} failed: {err}", src.wrapping_add(i));
            0
        });
        if let Err(err) = bus.write(dst.wrapping_add(i), byte) {
            warn!("dma destination write at {:#010x} failed: {err}", dst.wrapping_add(i));
        }
    }
}

impl Mmio for Channel {
    fn attach(&self, bus: &mut Bus) {
        let base = 0x0400_00b0 + 0x0c * self.idx as Word;
        bus.map(base..=base + 3, self.src.clone().into());
        bus.map(base + 4..=base + 7, self.dst.clone().into());
        bus.map(base + 8..=base + 9, self.count.clone().into());
        bus.map(base + 10..=base + 11, self.ctrl.clone().into());
    }
}

/// The four-channel DMA engine.
#[derive(Debug)]
pub struct Dma {
    channels: [Channel; 4],
    line: Line,
}

impl Dma {
    /// Constructs a new `Dma`, wired to raise channel-completion
    /// interrupts on `line`.
    #[must_use]
    pub fn new(line: Line) -> Self {
        Self {
            channels: std::array::from_fn(Channel::new),
            line,
        }
    }

    /// Whether any channel currently has a transfer armed or in flight.
    #[must_use]
    pub fn active(&self) -> bool {
        self.channels.iter().any(|ch| !matches!(ch.state, State::Idle))
    }

    /// Notifies every channel of a trigger event (VBlank start, HBlank
    /// start, or a part's special request). Channels not configured for
    /// this timing, or not enabled, ignore it.
    pub fn notify(&mut self, trigger: Trigger) {
        for ch in &mut self.channels {
            ch.notify(trigger);
        }
    }

    /// Called by the MMU immediately after a `DMAxCNT_H` store, to arm any
    /// channel whose timing is [`Trigger::Immediate`].
    pub fn notify_immediate(&mut self) {
        self.notify(Trigger::Immediate);
    }

    /// Steps the highest-priority (lowest channel index) active channel by
    /// one transfer unit. Returns the number of master cycles consumed (0
    /// if no channel needs stepping this call).
    pub fn step(&mut self, bus: &mut Bus) -> u32 {
        for idx in 0..self.channels.len() {
            if matches!(self.channels[idx].state, State::Idle) {
                continue;
            }
            if let Some(raise_irq) = self.channels[idx].step(bus) {
                if raise_irq {
                    self.line.raise(match idx {
                        0 => Interrupt::Dma0,
                        1 => Interrupt::Dma1,
                        2 => Interrupt::Dma2,
                        _ => Interrupt::Dma3,
                    });
                }
            }
            return 2;
        }
        0
    }

    /// Per-channel in-flight state (armed/running source, destination, and
    /// remaining count, plus the video-capture flags), for save-state
    /// serialization. None of this is bus-register-backed, so a save taken
    /// mid-transfer would otherwise lose it silently.
    #[must_use]
    pub(crate) fn scalar_state(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SCALAR_LEN);
        for ch in &self.channels {
            let (tag, src, dst, remain) = match ch.state {
                State::Idle => (0u8, 0u32, 0u32, 0u32),
                State::Armed { src, dst, remain } => (1, src, dst, remain),
                State::Running { src, dst, remain } => (2, src, dst, remain),
            };
            out.push(tag);
            out.extend_from_slice(&src.to_le_bytes());
            out.extend_from_slice(&dst.to_le_bytes());
            out.extend_from_slice(&remain.to_le_bytes());
            out.push(u8::from(ch.is_capture));
            out.push(u8::from(ch.capture_last));
        }
        out
    }

    const SCALAR_LEN: usize = 4 * (1 + 4 + 4 + 4 + 1 + 1);

    /// Restores per-channel in-flight state from [`scalar_state`](Self::scalar_state).
    pub(crate) fn set_scalar_state(&mut self, data: &[u8]) {
        debug_assert_eq!(data.len(), Self::SCALAR_LEN);
        for (ch, bytes) in self.channels.iter_mut().zip(data.chunks_exact(15)) {
            let tag = bytes[0];
            let src = u32::from_le_bytes(bytes[1..5].try_into().unwrap());
            let dst = u32::from_le_bytes(bytes[5..9].try_into().unwrap());
            let remain = u32::from_le_bytes(bytes[9..13].try_into().unwrap());
            ch.state = match tag {
                1 => State::Armed { src, dst, remain },
                2 => State::Running { src, dst, remain },
                _ => State::Idle,
            };
            ch.is_capture = bytes[13] != 0;
            ch.capture_last = bytes[14] != 0;
        }
    }
}

impl Block for Dma {
    fn reset(&mut self) {
        for ch in &mut self.channels {
            // `Addr::take` would also wipe out its per-channel address
            // mask, so just clear the latched value instead.
            ch.src.borrow_mut().0 = 0;
            ch.dst.borrow_mut().0 = 0;
            ch.count.take();
            ch.ctrl.take();
            ch.state = State::Idle;
            ch.is_capture = false;
            ch.capture_last = false;
        }
    }
}

impl Mmio for Dma {
    fn attach(&self, bus: &mut Bus) {
        for ch in &self.channels {
            ch.attach(bus);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gba_arch::mem::Memory;

    fn wire() -> (Dma, Bus) {
        let pic = crate::parts::pic::Pic::new();
        let dma = Dma::new(pic.line());
        let mut bus = Bus::new();
        dma.attach(&mut bus);
        bus.map(0x0200_0000..=0x0203_ffff, Shared::new(vec![0u8; 0x4_0000]).into());
        (dma, bus)
    }

    #[test]
    fn immediate_32bit_transfer_completes() {
        let (mut dma, mut bus) = wire();
        bus.write(0x0200_0000, 0xef).unwrap();
        bus.write(0x0200_0001, 0xbe).unwrap();
        bus.write(0x0200_0002, 0xad).unwrap();
        bus.write(0x0200_0003, 0xde).unwrap();

        // DMA0SAD = 0x0200_0000, little-endian.
        bus.write(0x0400_00b0, 0x00).unwrap();
        bus.write(0x0400_00b1, 0x00).unwrap();
        bus.write(0x0400_00b2, 0x00).unwrap();
        bus.write(0x0400_00b3, 0x02).unwrap();

        // DMA0DAD = 0x0203_0000, little-endian.
        bus.write(0x0400_00b4, 0x00).unwrap();
        bus.write(0x0400_00b5, 0x00).unwrap();
        bus.write(0x0400_00b6, 0x03).unwrap();
        bus.write(0x0400_00b7, 0x02).unwrap();

        bus.write(0x0400_00b8, 0x01).unwrap();
        bus.write(0x0400_00b9, 0x00).unwrap();

        // CNT_H = 0x8400: enable (bit15) + 32-bit transfer (bit10),
        // immediate timing, no repeat.
        bus.write(0x0400_00ba, 0x00).unwrap();
        bus.write(0x0400_00bb, 0x84).unwrap();

        dma.notify_immediate();
        assert!(dma.active());
        while dma.active() {
            dma.step(&mut bus);
        }

        assert_eq!(bus.read(0x0203_0000).unwrap(), 0xef);
        assert_eq!(bus.read(0x0203_0003).unwrap(), 0xde);
    }

    #[test]
    fn disabled_channel_ignores_trigger() {
        let (mut dma, _bus) = wire();
        dma.notify(Trigger::VBlank);
        assert!(!dma.active());
    }

    fn channel3_cnt_h(bus: &mut Bus, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        bus.write(0x0400_00de, lo).unwrap();
        bus.write(0x0400_00df, hi).unwrap();
    }

    fn read_channel3_cnt_h(bus: &Bus) -> u16 {
        u16::from_le_bytes([bus.read(0x0400_00de).unwrap(), bus.read(0x0400_00df).unwrap()])
    }

    #[test]
    fn video_capture_trigger_only_arms_channel_3() {
        let (mut dma, mut bus) = wire();
        bus.write(0x0400_00dc, 0x01).unwrap(); // DMA3CNT_L: 1 unit
        bus.write(0x0400_00dd, 0x00).unwrap();
        channel3_cnt_h(&mut bus, 0xb400); // enable, special timing, 32-bit

        dma.notify(Trigger::Fifo);
        assert!(!dma.active(), "channel 3's special timing means capture, not FIFO");

        dma.notify(Trigger::VideoCapture { last: false });
        assert!(dma.active());
    }

    #[test]
    fn video_capture_rearms_each_line_and_disables_after_the_last() {
        let (mut dma, mut bus) = wire();
        bus.write(0x0400_00dc, 0x01).unwrap(); // DMA3CNT_L: 1 unit
        bus.write(0x0400_00dd, 0x00).unwrap();
        channel3_cnt_h(&mut bus, 0xb400); // enable, special timing, 32-bit

        dma.notify(Trigger::VideoCapture { last: false });
        dma.step(&mut bus); // Armed -> Running
        dma.step(&mut bus); // transfers the one unit, completes
        assert!(!dma.active(), "goes idle between lines rather than self-rearming");
        assert_eq!(
            read_channel3_cnt_h(&bus) & 0x8000,
            0x8000,
            "stays enabled between capture lines"
        );

        dma.notify(Trigger::VideoCapture { last: true });
        dma.step(&mut bus);
        dma.step(&mut bus);
        assert!(!dma.active());
        assert_eq!(read_channel3_cnt_h(&bus) & 0x8000, 0, "auto-disables after the last line");

        dma.notify(Trigger::VideoCapture { last: false });
        assert!(!dma.active(), "a disabled channel ignores further triggers");
    }

    #[test]
    fn scalar_state_round_trips_an_in_flight_transfer() {
        let (mut dma, mut bus) = wire();
        bus.write(0x0400_00b8, 4).unwrap(); // DMA0CNT_L: 4 units
        bus.write(0x0400_00b9, 0).unwrap();
        bus.write(0x0400_00ba, 0x00).unwrap(); // DMA0CNT_H low byte
        bus.write(0x0400_00bb, 0x84).unwrap(); // enable | word32, immediate timing

        dma.step(&mut bus); // Armed -> Running, mid-transfer now

        let state = dma.scalar_state();
        let mut other = Dma::new(crate::parts::pic::Pic::new().line());
        other.set_scalar_state(&state);
        assert!(other.active(), "a running transfer must round-trip as still active");
        assert_eq!(other.channels[0].state, dma.channels[0].state);
    }
}
