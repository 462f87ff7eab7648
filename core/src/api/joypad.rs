//! Joypad API.

/// Joypad support.
pub trait Support {
    /// Joypad interface.
    type Joypad: Joypad;

    /// Gets the core's joypad.
    #[must_use]
    fn joypad(&self) -> &Self::Joypad;

    /// Mutably gets the core's joypad.
    #[must_use]
    fn joypad_mut(&mut self) -> &mut Self::Joypad;
}

/// Joypad interface.
pub trait Joypad {
    /// Receives user input events, forwarding them to `KEYINPUT`/`KEYCNT`.
    fn recv(&mut self, events: impl IntoIterator<Item = Event>);
}

/// The ten physical buttons read through `KEYINPUT`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Button {
    A,
    B,
    Select,
    Start,
    Right,
    Left,
    Up,
    Down,
    R,
    L,
}

/// Joypad button state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    /// Button pressed.
    Dn,
    /// Button released.
    Up,
}

/// Joypad event.
#[derive(Clone, Copy, Debug)]
pub struct Event {
    /// Which button changed.
    pub button: Button,
    /// Its new state.
    pub state: State,
}

impl From<(Button, State)> for Event {
    fn from(value: (Button, State)) -> Self {
        let (button, state) = value;
        Self { button, state }
    }
}
