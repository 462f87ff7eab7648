//! Game Boy Advance emulator core.

use gba_arch::Block;

use crate::api;
use crate::config::{Config, Error as ConfigError};
use crate::mmu::Mmu;
use crate::parts::apu::Apu;
use crate::parts::cart::Cartridge;
use crate::parts::joypad::Joypad;
use crate::parts::ppu::Ppu;

pub mod save;

/// Game Boy Advance emulator core.
///
/// Owns the single [`Mmu`] that models every piece of hardware besides the
/// ARM7TDMI; a CPU collaborator is assembled separately and drives this
/// through [`api::bus::Bus`].
#[derive(Debug)]
pub struct GameBoyAdvance {
    mmu: Mmu,
}

impl GameBoyAdvance {
    /// Constructs a new `GameBoyAdvance` from a [`Config`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid (e.g. a ROM
    /// too small to contain a header, or a malformed BIOS image).
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        Ok(Self {
            mmu: Mmu::new(config)?,
        })
    }

    /// Serializes the emulator's persisted state into a versioned binary
    /// blob, for the host to write to a save-state file.
    #[must_use]
    pub fn save_state(&self) -> Vec<u8> {
        save::save(&self.mmu)
    }

    /// Restores the emulator's state from a blob previously produced by
    /// [`Self::save_state`].
    ///
    /// # Errors
    ///
    /// Returns [`save::Error`] if the blob's version tag doesn't match, or
    /// if it's truncated/malformed.
    pub fn load_state(&mut self, blob: &[u8]) -> Result<(), save::Error> {
        save::load(&mut self.mmu, blob)
    }

    /// Serializes the cartridge's backup chip contents, for the host to
    /// write to a `.sav` file, or `None` if the cartridge has no backup.
    #[must_use]
    pub fn save_backup(&self) -> Option<Vec<u8>> {
        self.mmu.cart().save()
    }
}

impl Block for GameBoyAdvance {
    fn reset(&mut self) {
        self.mmu.reset();
    }
}

impl api::audio::Support for GameBoyAdvance {
    type Audio = Apu;

    fn audio(&self) -> &Self::Audio {
        self.mmu.audio()
    }

    fn audio_mut(&mut self) -> &mut Self::Audio {
        self.mmu.audio_mut()
    }
}

impl api::bus::Support for GameBoyAdvance {
    type Bus = Mmu;

    fn bus(&self) -> &Self::Bus {
        &self.mmu
    }

    fn bus_mut(&mut self) -> &mut Self::Bus {
        &mut self.mmu
    }
}

impl api::cart::Support for GameBoyAdvance {
    type Cartridge = Cartridge;

    fn cart(&self) -> &Self::Cartridge {
        self.mmu.cart()
    }

    fn cart_mut(&mut self) -> &mut Self::Cartridge {
        self.mmu.cart_mut()
    }
}

impl api::joypad::Support for GameBoyAdvance {
    type Joypad = Joypad;

    fn joypad(&self) -> &Self::Joypad {
        self.mmu.joypad()
    }

    fn joypad_mut(&mut self) -> &mut Self::Joypad {
        self.mmu.joypad_mut()
    }
}

impl api::video::Support for GameBoyAdvance {
    type Video = Ppu;

    fn video(&self) -> &Self::Video {
        self.mmu.video()
    }

    fn video_mut(&mut self) -> &mut Self::Video {
        self.mmu.video_mut()
    }
}

impl api::Core for GameBoyAdvance {}
