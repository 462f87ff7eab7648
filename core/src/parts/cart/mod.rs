//! Game ROM cartridge.
//!
//! Encoded within the ROM is a [header] describing the title and maker,
//! followed by up to 32 MiB of program and asset data. Save data, if any,
//! lives in a [backup] chip mapped into the final 32 MiB of address space.
//!
//! [header]: https://problemkaputt.de/gbatek.htm#gbacartridgeheader
//! [backup]: https://problemkaputt.de/gbatek.htm#gbacartbackup

use gba_arch::mem::{Memory, Result as MemResult};
use gba_arch::mio::{Bus, Mmio};
use gba_arch::{Block, Shared, Word};
use thiserror::Error;

use self::backup::{Backup, Kind as BackupKind};
use self::header::Header;
use crate::api::cart::Cartridge as Api;

pub mod backup;
pub mod header;

/// Game cartridge: a ROM image, its parsed header, and an optional backup
/// storage chip.
#[derive(Debug)]
pub struct Cartridge {
    head: Header,
    rom: Shared<Rom>,
    backup: Backup,
}

impl Cartridge {
    /// Constructs a new `Cartridge` from a ROM image.
    ///
    /// `force_backup` overrides the signature-based backup detection (see
    /// [`BackupKind::detect`]); `backup_image` seeds the backup chip's
    /// contents from a save file, if one was loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the ROM is too small to contain a header.
    pub fn new(
        rom: Vec<u8>,
        force_backup: Option<BackupKind>,
        backup_image: Option<Vec<u8>>,
    ) -> Result<Self> {
        let head = Header::new(&rom).map_err(Error::Header)?;
        let kind = force_backup.unwrap_or_else(|| BackupKind::detect(&rom));
        let backup = Backup::new(kind, backup_image);
        Ok(Self {
            head,
            rom: Shared::new(Rom(rom)),
            backup,
        })
    }

    /// Constructs a blank `Cartridge` with no ROM or backup.
    #[must_use]
    pub fn blank() -> Self {
        Self {
            head: Header::blank(),
            rom: Shared::new(Rom(Vec::new())),
            backup: Backup::None,
        }
    }

    /// Gets the cartridge's header.
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.head
    }

    /// Serializes the backup chip's contents for writing to a save file,
    /// or `None` if the cartridge has no backup chip.
    #[must_use]
    pub fn save(&self) -> Option<Vec<u8>> {
        self.backup.to_bytes()
    }

    /// Restores the backup chip's contents from a previously-[`save`]d
    /// image, e.g. when loading a `.sav` file or a save-state blob.
    ///
    /// [`save`]: Self::save
    pub fn load_backup(&mut self, image: &[u8]) {
        self.backup.load(image);
    }
}

impl Api for Cartridge {
    fn title(&self) -> &str {
        self.head.title.as_deref().unwrap_or("Unknown")
    }
}

impl Block for Cartridge {
    fn reset(&mut self) {
        self.backup.reset();
    }
}

impl Mmio for Cartridge {
    fn attach(&self, bus: &mut Bus) {
        // Wait-state 0 and 1 each mirror the full ROM across 32 MiB.
        bus.map(0x0800_0000..=0x09ff_ffff, self.rom.clone().into());
        bus.map(0x0a00_0000..=0x0bff_ffff, self.rom.clone().into());

        // Wait-state 2's upper half is EEPROM territory on carts that use
        // it; other backup kinds leave the whole 32 MiB to the ROM mirror.
        if matches!(self.backup, Backup::Eeprom(_)) {
            bus.map(0x0c00_0000..=0x0cff_ffff, self.rom.clone().into());
        } else {
            bus.map(0x0c00_0000..=0x0dff_ffff, self.rom.clone().into());
        }

        self.backup.attach(bus);
    }
}

/// Read-only ROM image, mirrored by its own length.
#[derive(Debug)]
struct Rom(Vec<u8>);

impl Memory for Rom {
    fn read(&self, addr: Word) -> MemResult<u8> {
        if self.0.is_empty() {
            return Ok(0);
        }
        Ok(self.0[addr as usize % self.0.len()])
    }

    fn write(&mut self, _addr: Word, _data: u8) -> MemResult<()> {
        // Cartridge ROM is read-only.
        Ok(())
    }
}

/// A convenient type alias for [`Result`](std::result::Result).
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error caused by constructing a [`Cartridge`].
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to parse the cartridge header.
    #[error("failed to parse header")]
    Header(#[source] header::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_with_signature(sig: &[u8]) -> Vec<u8> {
        let mut rom = vec![0u8; 0x200];
        rom[0x100..0x100 + sig.len()].copy_from_slice(sig);
        rom
    }

    #[test]
    fn detects_backup_from_rom() {
        let rom = rom_with_signature(b"SRAM_V");
        let cart = Cartridge::new(rom, None, None).unwrap();
        assert!(matches!(cart.backup, Backup::Sram(_)));
    }

    #[test]
    fn force_backup_overrides_detection() {
        let rom = rom_with_signature(b"SRAM_V");
        let cart = Cartridge::new(rom, Some(BackupKind::Eeprom512), None).unwrap();
        assert!(matches!(cart.backup, Backup::Eeprom(_)));
    }

    #[test]
    fn blank_cartridge_has_no_backup() {
        let cart = Cartridge::blank();
        assert!(matches!(cart.backup, Backup::None));
        assert_eq!(cart.title(), "Unknown");
    }

    #[test]
    fn too_small_rom_is_an_error() {
        assert!(Cartridge::new(vec![0u8; 4], None, None).is_err());
    }
}
