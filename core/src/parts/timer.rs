//! Hardware timers: four independent 16-bit counters, each either
//! free-running off a prescaled system clock or cascading from the
//! previous channel's overflow.
//!
//! Ground truth: <https://problemkaputt.de/gbatek.htm#gbatimers>.

use bitfield_struct::bitfield;
use gba_arch::mio::{Bus, Mmio};
use gba_arch::reg::{Port, Register};
use gba_arch::{Block, Shared, Word};
use log::{debug, trace};

use crate::parts::pic::{Interrupt, Line};

/// Timer register select.
#[derive(Clone, Copy, Debug)]
pub enum Select {
    /// `TMxCNT_L`: counter/reload.
    CntL(usize),
    /// `TMxCNT_H`: control.
    CntH(usize),
}

/// Timer reload counter.
///
/// Models the few-cycle delay between a counter overflowing and the
/// reload value actually taking effect, the same shape as the Game Boy's
/// `TIMA` reload delay.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
enum Reload {
    #[default]
    None,
    Wait(u8),
    Now,
}

impl Reload {
    fn sched(&mut self) {
        *self = Self::Wait(1);
    }

    fn tick(&mut self) {
        *self = match self {
            Self::Wait(0) => Self::Now,
            Self::Wait(n) => Self::Wait(*n - 1),
            _ => Self::None,
        };
    }
}

/// `TMxCNT_L`: live counter on read, reload latch on write.
#[derive(Debug, Default)]
struct Counter {
    live: u16,
    reload: u16,
}

impl Register for Counter {
    type Value = u16;

    fn load(&self) -> u16 {
        self.live
    }

    fn store(&mut self, value: u16) {
        self.reload = value;
    }
}

crate::macros::memory_map16!(Counter);

/// `TMxCNT_H`.
#[bitfield(u16, order = lsb)]
pub struct Control {
    #[bits(2)]
    prescaler: u8,
    #[bits(1)]
    cascade: bool,
    #[bits(3)]
    __: u8,
    #[bits(1)]
    irq_enable: bool,
    #[bits(1)]
    enable: bool,
    #[bits(8)]
    __: u8,
}

impl Register for Control {
    type Value = u16;

    fn load(&self) -> u16 {
        self.0
    }

    fn store(&mut self, value: u16) {
        let was_enabled = self.enable();
        self.0 = value;
        if self.enable() && !was_enabled {
            // The live counter itself is loaded from the reload latch in
            // `Channel::cycle`, the next time this channel is stepped;
            // `Control` has no handle to the `Counter` it's paired with.
            trace!("timer enabled");
        }
    }
}

crate::macros::memory_map16!(Control);

fn prescaler_divisor(sel: u8) -> u32 {
    match sel & 0b11 {
        0 => 1,
        1 => 64,
        2 => 256,
        _ => 1024,
    }
}

/// A single 16-bit timer channel.
#[derive(Debug)]
struct Channel {
    idx: usize,
    counter: Shared<Counter>,
    ctrl: Shared<Control>,
    presc_acc: u32,
    rel: Reload,
    line: Line,
    /// Whether this channel was enabled as of the last cycle, to detect the
    /// disabled-to-enabled edge that loads the counter from the reload
    /// latch.
    was_enabled: bool,
}

impl Channel {
    fn new(idx: usize, line: Line) -> Self {
        Self {
            idx,
            counter: Shared::default(),
            ctrl: Shared::default(),
            presc_acc: 0,
            rel: Reload::default(),
            line,
            was_enabled: false,
        }
    }

    fn interrupt(&self) -> Interrupt {
        match self.idx {
            0 => Interrupt::Timer0,
            1 => Interrupt::Timer1,
            2 => Interrupt::Timer2,
            _ => Interrupt::Timer3,
        }
    }

    /// Advances this channel by one master cycle.
    ///
    /// `prev_overflow` is whether the previous (lower-indexed) channel
    /// overflowed this same cycle, consumed only when cascade is enabled.
    /// Returns whether this channel itself overflowed this cycle.
    fn cycle(&mut self, prev_overflow: bool) -> bool {
        let (enabled, cascade, prescaler, irq_enable) = {
            let ctrl = self.ctrl.borrow();
            (
                ctrl.enable(),
                ctrl.cascade(),
                ctrl.prescaler(),
                ctrl.irq_enable(),
            )
        };

        if enabled && !self.was_enabled {
            let reload = self.counter.borrow().reload;
            self.counter.borrow_mut().live = reload;
            self.presc_acc = 0;
            debug!("timer{}: enabled, counter loaded from reload {reload:#06x}", self.idx);
        }
        self.was_enabled = enabled;

        let do_reload = matches!(self.rel, Reload::Now);
        self.rel.tick();
        if do_reload {
            let reload = self.counter.borrow().reload;
            self.counter.borrow_mut().live = reload;
            debug!("timer{}: reloaded to {reload:#06x}", self.idx);
            if irq_enable {
                self.line.raise(self.interrupt());
            }
            // The reload consumes this cycle; normal counting resumes next.
            return false;
        }

        if !enabled {
            return false;
        }

        // Hold at zero while a reload is in flight rather than free-running.
        if !matches!(self.rel, Reload::None) {
            return false;
        }

        let should_tick = if cascade && self.idx > 0 {
            prev_overflow
        } else {
            self.presc_acc += 1;
            let divisor = prescaler_divisor(prescaler);
            if self.presc_acc >= divisor {
                self.presc_acc = 0;
                true
            } else {
                false
            }
        };
        if !should_tick {
            return false;
        }

        let carry = {
            let mut counter = self.counter.borrow_mut();
            let (live, carry) = counter.live.overflowing_add(1);
            counter.live = live;
            carry
        };
        if carry {
            trace!("timer{}: overflow", self.idx);
            self.rel.sched();
        }
        carry
    }

}

impl Mmio for Channel {
    fn attach(&self, bus: &mut Bus) {
        let base = 0x0400_0100 + 4 * self.idx as Word;
        bus.map(base..=base + 1, self.counter.clone().into());
        bus.map(base + 2..=base + 3, self.ctrl.clone().into());
    }
}

/// The four-channel timer block.
#[derive(Debug)]
pub struct Timer {
    channels: [Channel; 4],
    /// Which channels overflowed on the most recently completed cycle, for
    /// the direct-sound FIFOs to sample without going through the bus.
    overflowed: [bool; 4],
}

impl Timer {
    /// Constructs a new `Timer`, wired to raise overflow interrupts on
    /// `line`.
    #[must_use]
    pub fn new(line: Line) -> Self {
        Self {
            channels: std::array::from_fn(|idx| Channel::new(idx, line.clone())),
            overflowed: [false; 4],
        }
    }

    /// Live counter value for channel `idx` (0-3), for the FIFO
    /// audio channels to sample without going through the bus.
    #[must_use]
    pub fn counter(&self, idx: usize) -> u16 {
        self.channels[idx].counter.load()
    }

    /// Whether channel `idx` overflowed on the cycle just completed.
    #[must_use]
    pub fn overflowed(&self, idx: usize) -> bool {
        self.overflowed[idx]
    }

    /// Per-channel prescaler/reload-delay/enable-edge state, for save-state
    /// serialization. None of this is bus-register-backed, so a save taken
    /// mid-prescale or mid-reload-delay would otherwise lose it silently.
    #[must_use]
    pub(crate) fn scalar_state(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SCALAR_LEN);
        for ch in &self.channels {
            out.push(u8::from(ch.was_enabled));
            out.extend_from_slice(&ch.presc_acc.to_le_bytes());
            let (tag, val) = match ch.rel {
                Reload::None => (0u8, 0u8),
                Reload::Wait(n) => (1, n),
                Reload::Now => (2, 0),
            };
            out.push(tag);
            out.push(val);
        }
        out
    }

    const SCALAR_LEN: usize = 4 * (1 + 4 + 1 + 1);

    /// Restores per-channel prescaler/reload-delay/enable-edge state from
    /// [`scalar_state`](Self::scalar_state).
    pub(crate) fn set_scalar_state(&mut self, data: &[u8]) {
        debug_assert_eq!(data.len(), Self::SCALAR_LEN);
        for (ch, bytes) in self.channels.iter_mut().zip(data.chunks_exact(7)) {
            ch.was_enabled = bytes[0] != 0;
            ch.presc_acc = u32::from_le_bytes(bytes[1..5].try_into().unwrap());
            ch.rel = match bytes[5] {
                1 => Reload::Wait(bytes[6]),
                2 => Reload::Now,
                _ => Reload::None,
            };
        }
    }
}

impl Block for Timer {
    /// Advances every channel by one master cycle.
    fn cycle(&mut self) {
        let mut overflow = false;
        for (idx, ch) in self.channels.iter_mut().enumerate() {
            overflow = ch.cycle(overflow);
            self.overflowed[idx] = overflow;
        }
    }

    fn reset(&mut self) {
        for ch in &mut self.channels {
            ch.counter.take();
            ch.ctrl.take();
            ch.presc_acc = 0;
            ch.rel = Reload::None;
            ch.was_enabled = false;
        }
        self.overflowed = [false; 4];
    }
}

impl Mmio for Timer {
    fn attach(&self, bus: &mut Bus) {
        for ch in &self.channels {
            ch.attach(bus);
        }
    }
}

impl Port<u16> for Timer {
    type Select = Select;

    fn load(&self, reg: Self::Select) -> u16 {
        match reg {
            Select::CntL(idx) => self.channels[idx].counter.load(),
            Select::CntH(idx) => self.channels[idx].ctrl.load(),
        }
    }

    fn store(&mut self, reg: Self::Select, value: u16) {
        match reg {
            Select::CntL(idx) => self.channels[idx].counter.store(value),
            Select::CntH(idx) => self.channels[idx].ctrl.store(value),
        }
    }
}
