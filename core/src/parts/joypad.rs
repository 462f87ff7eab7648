//! Player input device.
//!
//! Ground truth: <https://problemkaputt.de/gbatek.htm#gbakeypadinput>.

use bitfield_struct::bitfield;
use gba_arch::mio::{Bus, Mmio};
use gba_arch::reg::{Port, Register};
use gba_arch::{Block, Shared};
use log::{debug, trace};

use super::pic::{self, Interrupt};
use crate::api::joypad::{Button, Event, Joypad as Api, State};

impl Button {
    /// Bit position within `KEYINPUT`/`KEYCNT`.
    fn bit(self) -> u16 {
        match self {
            Self::A => 0,
            Self::B => 1,
            Self::Select => 2,
            Self::Start => 3,
            Self::Right => 4,
            Self::Left => 5,
            Self::Up => 6,
            Self::Down => 7,
            Self::R => 8,
            Self::L => 9,
        }
    }

    fn mask(self) -> u16 {
        1 << self.bit()
    }
}

/// Joypad register select.
#[derive(Clone, Copy, Debug)]
pub enum Select {
    /// `[$0400_0130]`: `KEYINPUT`, active-low pressed keys.
    KeyInput,
    /// `[$0400_0132]`: `KEYCNT`, interrupt condition select.
    KeyCnt,
}

/// Joypad controller.
#[derive(Debug)]
pub struct Joypad {
    /// Live pressed-key bitmask, shared with the bus-mapped `KEYINPUT`.
    input: Shared<KeyInput>,
    cnt: Shared<Control>,
    line: pic::Line,
}

impl Joypad {
    /// Constructs a new `Joypad`, raising [`Interrupt::Keypad`] on `line`.
    #[must_use]
    pub fn new(line: pic::Line) -> Self {
        Self {
            input: Shared::default(),
            cnt: Shared::default(),
            line,
        }
    }
}

impl Api for Joypad {
    fn recv(&mut self, events: impl IntoIterator<Item = Event>) {
        let mut mask = self.input.borrow().0;
        let mut updated = false;
        for Event { button, state } in events {
            trace!("event: {button:?}, {state:?}");
            let before = mask;
            mask = match state {
                State::Dn => mask | button.mask(),
                State::Up => mask & !button.mask(),
            };
            updated |= before != mask;
        }
        if !updated {
            trace!("received no input events");
            return;
        }
        debug!("updated keys: {mask:#06x}");
        self.input.borrow_mut().0 = mask;

        let (irq_enable, select, and_mode) = {
            let cnt = self.cnt.borrow();
            (cnt.irq_enable(), cnt.select(), cnt.and_mode())
        };
        if irq_enable {
            let selected = mask & select;
            let fires = if and_mode {
                select != 0 && selected == select
            } else {
                selected != 0
            };
            if fires {
                self.line.raise(Interrupt::Keypad);
            }
        }
    }
}

impl Block for Joypad {
    fn reset(&mut self) {
        self.input.take();
        self.cnt.take();
    }
}

impl Mmio for Joypad {
    fn attach(&self, bus: &mut Bus) {
        bus.map(0x0400_0130..=0x0400_0131, self.input.clone().into());
        bus.map(0x0400_0132..=0x0400_0133, self.cnt.clone().into());
    }
}

impl Port<u16> for Joypad {
    type Select = Select;

    fn load(&self, reg: Self::Select) -> u16 {
        match reg {
            Select::KeyInput => self.input.load(),
            Select::KeyCnt => self.cnt.load(),
        }
    }

    fn store(&mut self, reg: Self::Select, value: u16) {
        match reg {
            Select::KeyInput => {} // read-only
            Select::KeyCnt => self.cnt.store(value),
        }
    }
}

/// `KEYINPUT`: active-low, 0 means pressed. The stored value is the
/// pressed mask (active-high); [`Register::load`] inverts it.
#[derive(Clone, Copy, Debug, Default)]
struct KeyInput(u16);

impl Register for KeyInput {
    type Value = u16;

    fn load(&self) -> u16 {
        !self.0 & 0x03ff
    }

    fn store(&mut self, _value: u16) {
        // Read-only: hardware ignores writes.
    }
}

crate::macros::memory_map16!(KeyInput);

/// `KEYCNT`.
#[bitfield(u16, order = lsb)]
pub struct Control {
    #[bits(10)]
    select: u16,
    #[bits(4)]
    __: u8,
    #[bits(1)]
    irq_enable: bool,
    #[bits(1)]
    and_mode: bool,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_and_release_tracked() {
        let pic = crate::parts::pic::Pic::new();
        let mut joypad = Joypad::new(pic.line());
        joypad.recv([Event::from((Button::A, State::Dn))]);
        assert_eq!(joypad.load(Select::KeyInput), !Button::A.mask() & 0x03ff);
        joypad.recv([Event::from((Button::A, State::Up))]);
        assert_eq!(joypad.load(Select::KeyInput), 0x03ff);
    }

    #[test]
    fn or_mode_fires_on_any_selected_key() {
        let mut pic = crate::parts::pic::Pic::new();
        let line = pic.line();
        pic.store(crate::parts::pic::Select::Ie, Interrupt::Keypad.mask());
        let mut joypad = Joypad::new(pic.line());
        {
            let mut cnt = joypad.cnt.borrow_mut();
            cnt.set_select(Button::Start.mask());
            cnt.set_irq_enable(true);
            cnt.set_and_mode(false);
        }
        joypad.recv([Event::from((Button::Start, State::Dn))]);
        assert!(line.pending());
    }

    #[test]
    fn and_mode_requires_all_selected_keys() {
        let mut pic = crate::parts::pic::Pic::new();
        let line = pic.line();
        pic.store(crate::parts::pic::Select::Ie, Interrupt::Keypad.mask());
        let mut joypad = Joypad::new(pic.line());
        let combo = Button::A.mask() | Button::B.mask();
        {
            let mut cnt = joypad.cnt.borrow_mut();
            cnt.set_select(combo);
            cnt.set_irq_enable(true);
            cnt.set_and_mode(true);
        }
        joypad.recv([Event::from((Button::A, State::Dn))]);
        assert!(!line.pending(), "only one of two keys pressed");
        joypad.recv([Event::from((Button::B, State::Dn))]);
        assert!(line.pending(), "both keys now pressed");
    }
}
