//! Boot-time configuration for a [`GameBoyAdvance`](crate::GameBoyAdvance).

use thiserror::Error;

use crate::parts::cart::backup::Kind as BackupKind;

/// Size, in bytes, of the GBA's BIOS ROM.
pub const BIOS_SIZE: usize = 0x4000;

/// Construction-time configuration.
///
/// Mirrors the way the upstream board is assembled from discrete parts: a
/// BIOS image and a cartridge are both required, everything else has a
/// sensible default.
#[derive(Debug, Default)]
pub struct Config {
    /// 16 KiB BIOS ROM image.
    pub bios: Option<Box<[u8; BIOS_SIZE]>>,
    /// Cartridge ROM image, header included.
    pub rom: Vec<u8>,
    /// Overrides the backup type detected from the cartridge header.
    ///
    /// Detection sniffs ASCII signatures ("SRAM_V", "EEPROM_V", "FLASH_V",
    /// "FLASH512_V", "FLASH1M_V") in the ROM image; this lets a front end
    /// skip the heuristic when it already knows better.
    pub force_backup: Option<BackupKind>,
    /// Host audio output sample rate, in Hz, for the software mixer.
    pub sample_rate: u32,
    /// Let the PPU signal `HBlank` during forced-blank/disabled-screen
    /// scanlines rather than withholding the flag. The real hardware still
    /// runs the HBlank/VBlank timer while the screen is forced blank; most
    /// front ends want that so DMA-on-HBlank transfers keep firing.
    pub hblank_interval_free: bool,
}

impl Config {
    /// Creates a configuration for the given cartridge ROM, no BIOS loaded.
    pub fn new(rom: Vec<u8>) -> Self {
        Self {
            rom,
            sample_rate: 32_768,
            hblank_interval_free: true,
            ..Default::default()
        }
    }

    /// Attaches a BIOS image, validating its size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BiosSize`] if `bios` is not exactly
    /// [`BIOS_SIZE`] bytes.
    pub fn with_bios(mut self, bios: Vec<u8>) -> Result<Self, Error> {
        let bios: Box<[u8; BIOS_SIZE]> = bios
            .into_boxed_slice()
            .try_into()
            .map_err(|_| Error::BiosSize)?;
        self.bios = Some(bios);
        Ok(self)
    }
}

/// An error constructing a [`Config`] or the board built from it.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Error {
    /// BIOS image was not exactly [`BIOS_SIZE`] bytes.
    #[error("invalid BIOS size (expected {BIOS_SIZE:#x} bytes)")]
    BiosSize,
    /// Cartridge ROM was too small to contain a header.
    #[error("cartridge image too small to contain a header")]
    RomSize,
}
