//! Emulator API.
//!
//! These traits are the collaborator boundary: an ARM7TDMI decoder/executor
//! is assembled separately and drives the board through [`bus::Bus`], while
//! a front end drives it through [`video::Support`], [`audio::Support`] and
//! [`joypad::Support`]. Nothing in this crate implements the processor.

use gba_arch::Block;

pub mod audio;
pub mod bus;
pub mod cart;
pub mod joypad;
pub mod video;

/// Core interface implemented by [`crate::GameBoyAdvance`].
pub trait Core:
    Block + audio::Support + bus::Support + cart::Support + joypad::Support + video::Support
{
}
