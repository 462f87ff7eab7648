//! Interrupt handling.
//!
//! Ground truth: <https://problemkaputt.de/gbatek.htm#gbainterruptcontrol>.

use std::fmt::Display;

use gba_arch::mio::{Bus, Mmio};
use gba_arch::reg::{Port, Register as _};
use gba_arch::{Block, Shared};
use log::trace;
use thiserror::Error;

/// Interrupt source.
///
/// Bit position within `IE`/`IF` and the corresponding exception vector
/// offset used by the BIOS's interrupt dispatcher.
#[must_use]
#[rustfmt::skip]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Interrupt {
    VBlank  = 0,
    HBlank  = 1,
    VCount  = 2,
    Timer0  = 3,
    Timer1  = 4,
    Timer2  = 5,
    Timer3  = 6,
    Serial  = 7,
    Dma0    = 8,
    Dma1    = 9,
    Dma2    = 10,
    Dma3    = 11,
    Keypad  = 12,
    GamePak = 13,
}

impl Interrupt {
    /// Mask with only this interrupt's bit set.
    #[must_use]
    pub fn mask(self) -> u16 {
        1 << (self as u16)
    }
}

impl Display for Interrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let repr = match self {
            Self::VBlank => "VBlank",
            Self::HBlank => "HBlank",
            Self::VCount => "VCount",
            Self::Timer0 => "Timer0",
            Self::Timer1 => "Timer1",
            Self::Timer2 => "Timer2",
            Self::Timer3 => "Timer3",
            Self::Serial => "Serial",
            Self::Dma0 => "Dma0",
            Self::Dma1 => "Dma1",
            Self::Dma2 => "Dma2",
            Self::Dma3 => "Dma3",
            Self::Keypad => "Keypad",
            Self::GamePak => "GamePak",
        };
        repr.fmt(f)
    }
}

impl TryFrom<u16> for Interrupt {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value.trailing_zeros() {
            0 => Self::VBlank,
            1 => Self::HBlank,
            2 => Self::VCount,
            3 => Self::Timer0,
            4 => Self::Timer1,
            5 => Self::Timer2,
            6 => Self::Timer3,
            7 => Self::Serial,
            8 => Self::Dma0,
            9 => Self::Dma1,
            10 => Self::Dma2,
            11 => Self::Dma3,
            12 => Self::Keypad,
            13 => Self::GamePak,
            _ => return Err(Error::Unknown),
        })
    }
}

/// Interrupt register select.
#[derive(Clone, Copy, Debug)]
pub enum Select {
    /// `[$0400_0200]`: interrupt enable (IE).
    Ie,
    /// `[$0400_0202]`: interrupt flag (IF), write-1-to-clear.
    If,
    /// `[$0400_0208]`: interrupt master enable (IME).
    Ime,
}

/// Programmable interrupt controller.
#[derive(Debug)]
pub struct Pic {
    reg: Control,
    line: Line,
}

impl Default for Pic {
    fn default() -> Self {
        // `Control` (bus-mapped IE/IF) and `Line` (the handle raised from
        // every interrupt source) must read and write the same underlying
        // storage, or a bus write to IE/IF would never be visible to
        // `pending_mask`/`Line::pending`.
        let enabled = Shared::<Enable>::default();
        let flag = Shared::<Flag>::default();
        let line = Line {
            enabled: enabled.clone(),
            flag: flag.clone(),
        };
        let reg = Control {
            enabled,
            flag,
            ime: Shared::default(),
            ime_hi: Shared::default(),
        };
        Self { reg, line }
    }
}

impl Pic {
    /// Constructs a new `Pic`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interrupt line handle, shared with parts that raise interrupts.
    #[must_use]
    pub fn line(&self) -> Line {
        self.line.clone()
    }

    /// Bitmask of sources simultaneously requested and enabled.
    #[must_use]
    pub fn pending_mask(&self) -> u16 {
        self.line.enabled.load() & self.line.flag.load()
    }

    /// Whether the master enable bit is set.
    #[must_use]
    pub fn master_enable(&self) -> bool {
        self.reg.ime.load() & 1 != 0
    }
}

impl Block for Pic {
    fn reset(&mut self) {
        self.reg.reset();
    }
}

impl Mmio for Pic {
    fn attach(&self, bus: &mut Bus) {
        self.reg.attach(bus);
    }
}

impl Port<u16> for Pic {
    type Select = Select;

    fn load(&self, reg: Self::Select) -> u16 {
        match reg {
            Select::Ie => self.line.enabled.load(),
            Select::If => self.line.flag.load(),
            Select::Ime => self.reg.ime.load(),
        }
    }

    fn store(&mut self, reg: Self::Select, value: u16) {
        match reg {
            Select::Ie => self.line.enabled.store(value),
            Select::If => self.line.ack(value),
            Select::Ime => self.reg.ime.store(value),
        }
    }
}

/// Bus-mapped registers.
///
/// | Address        | Size | Name | Description               |
/// |:--------------:|------|------|---------------------------|
/// | `$0400_0200`   | Half | IE   | Interrupt enable          |
/// | `$0400_0202`   | Half | IF   | Interrupt flag            |
/// | `$0400_0208`   | Word | IME  | Interrupt master enable   |
#[derive(Debug, Default)]
struct Control {
    enabled: Shared<Enable>,
    flag: Shared<Flag>,
    ime: Shared<Ime>,
    /// Unused upper halfword of the IME word; reads as zero.
    ime_hi: Shared<gba_arch::dev::Null>,
}

impl Block for Control {
    fn reset(&mut self) {
        self.enabled.take();
        self.flag.take();
        self.ime.take();
    }
}

impl Mmio for Control {
    fn attach(&self, bus: &mut Bus) {
        bus.map(0x0400_0200..=0x0400_0201, self.enabled.clone().into());
        bus.map(0x0400_0202..=0x0400_0203, self.flag.clone().into());
        bus.map(0x0400_0208..=0x0400_0209, self.ime.clone().into());
        bus.map(0x0400_020a..=0x0400_020b, self.ime_hi.clone().into());
    }
}

const IE_MASK: u16 = 0b0011_1111_1111_1111;

/// `IE`: which sources may assert the CPU's interrupt line.
#[derive(Debug, Default)]
struct Enable(u16);

impl gba_arch::reg::Register for Enable {
    type Value = u16;

    fn load(&self) -> u16 {
        self.0 & IE_MASK
    }

    fn store(&mut self, value: u16) {
        self.0 = value & IE_MASK;
    }
}

crate::macros::memory_map16!(Enable);

/// `IF`: sources currently requesting. Normal loads return the latched
/// value; stores are write-1-to-clear, handled out of band by
/// [`Line::ack`] rather than through the generic [`Register`] store (a
/// plain store would let software set bits, which the hardware forbids).
#[derive(Debug, Default)]
struct Flag(u16);

impl gba_arch::reg::Register for Flag {
    type Value = u16;

    fn load(&self) -> u16 {
        self.0 & IE_MASK
    }

    fn store(&mut self, value: u16) {
        self.0 &= !(value & IE_MASK);
    }
}

crate::macros::memory_map16!(Flag);

impl Flag {
    /// Sets the bits in `mask`, as when a part raises an interrupt.
    fn set(&mut self, mask: u16) {
        self.0 |= mask & IE_MASK;
    }
}

/// `IME`: global interrupt master enable. Only bit 0 is meaningful; the
/// upper half of the hardware's word-sized slot is a separate, unused
/// [`Null`](gba_arch::dev::Null) mapping.
#[derive(Debug, Default)]
struct Ime(u16);

impl gba_arch::reg::Register for Ime {
    type Value = u16;

    fn load(&self) -> u16 {
        self.0 & 1
    }

    fn store(&mut self, value: u16) {
        self.0 = value & 1;
    }
}

crate::macros::memory_map16!(Ime);

/// Interrupt line: a cloneable handle held by every part that can raise an
/// interrupt (PPU, timers, DMA, serial, joypad).
#[derive(Clone, Debug, Default)]
pub struct Line {
    enabled: Shared<Enable>,
    flag: Shared<Flag>,
}

impl Line {
    /// Checks if any enabled interrupt is pending.
    #[must_use]
    pub fn pending(&self) -> bool {
        (self.flag.load() & self.enabled.load()) != 0
    }

    /// Fetches the lowest-numbered pending, enabled interrupt.
    #[must_use]
    pub fn fetch(&self) -> Option<Interrupt> {
        (self.flag.load() & self.enabled.load())
            .try_into()
            .ok()
            .inspect(|int| trace!("interrupt pending: {int}"))
    }

    /// Raises (requests) an interrupt.
    pub fn raise(&mut self, int: Interrupt) {
        self.flag.borrow_mut().set(int.mask());
        trace!("interrupt requested: {int}");
    }

    /// Acknowledges (write-1-to-clear) the bits set in `mask`.
    fn ack(&mut self, mask: u16) {
        self.flag.borrow_mut().store(mask);
    }
}

/// A convenient type alias for [`Result`](std::result::Result).
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error caused by an [interrupt](Interrupt).
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown interrupt.
    #[error("unknown interrupt")]
    Unknown,
}
