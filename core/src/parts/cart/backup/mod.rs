//! Cartridge save storage: SRAM, EEPROM, or Flash, detected from an ASCII
//! signature embedded somewhere in the ROM image.

use gba_arch::mio::{Bus, Mmio};
use gba_arch::Block;

pub mod eeprom;
pub mod flash;
pub mod sram;

use eeprom::Eeprom;
use flash::{Capacity, Flash};
use sram::Sram;

/// Backup storage kind, detected by scanning the ROM for a signature
/// string, or pinned explicitly via
/// [`Config::force_backup`](crate::config::Config::force_backup).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Kind {
    /// No backup chip present.
    #[default]
    None,
    /// 32 KiB battery-backed SRAM.
    Sram,
    /// 512-byte serial EEPROM.
    Eeprom512,
    /// 8 KiB serial EEPROM.
    Eeprom8k,
    /// 64 KiB flash chip.
    Flash64k,
    /// 128 KiB flash chip (two banks).
    Flash128k,
}

impl Kind {
    /// Scans `rom` for a known signature string.
    ///
    /// `EEPROM_V` only distinguishes the chip family, not its size (both
    /// 512 B and 8 KiB EEPROMs share the signature on real cartridges);
    /// this picks the smaller, more common variant. A front end that knows
    /// better should override via `force_backup`.
    #[must_use]
    pub fn detect(rom: &[u8]) -> Self {
        const SIGNATURES: &[(&[u8], Kind)] = &[
            (b"FLASH1M_V", Kind::Flash128k),
            (b"FLASH512_V", Kind::Flash64k),
            (b"FLASH_V", Kind::Flash64k),
            (b"SRAM_V", Kind::Sram),
            (b"EEPROM_V", Kind::Eeprom512),
        ];
        for &(sig, kind) in SIGNATURES {
            if rom.windows(sig.len()).any(|w| w == sig) {
                return kind;
            }
        }
        Kind::None
    }

    /// Expected save-file size in bytes, or `0` if no backup is present.
    #[must_use]
    pub fn file_size(self) -> usize {
        match self {
            Self::None => 0,
            Self::Sram => sram::SIZE,
            Self::Eeprom512 => 512,
            Self::Eeprom8k => 8 * 1024,
            Self::Flash64k => 64 * 1024,
            Self::Flash128k => 128 * 1024,
        }
    }
}

/// Backup storage device.
#[derive(Debug)]
pub enum Backup {
    /// No backup chip present.
    None,
    /// Battery-backed SRAM.
    Sram(Sram),
    /// Serial EEPROM.
    Eeprom(Eeprom),
    /// Command-driven flash chip.
    Flash(Flash),
}

impl Backup {
    /// Constructs the backup device matching `kind`, loading `image` if
    /// its length matches [`Kind::file_size`].
    #[must_use]
    pub fn new(kind: Kind, image: Option<Vec<u8>>) -> Self {
        match kind {
            Kind::None => Self::None,
            Kind::Sram => Self::Sram(Sram::new(image)),
            Kind::Eeprom512 => Self::Eeprom(Eeprom::new(eeprom::Size::Small, image)),
            Kind::Eeprom8k => Self::Eeprom(Eeprom::new(eeprom::Size::Large, image)),
            Kind::Flash64k => Self::Flash(Flash::new(Capacity::Kb64, image)),
            Kind::Flash128k => Self::Flash(Flash::new(Capacity::Kb128, image)),
        }
    }

    /// Serializes the current contents for writing to a save file, or
    /// `None` if there is no backup chip.
    #[must_use]
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Self::None => None,
            Self::Sram(sram) => Some(sram.to_bytes()),
            Self::Eeprom(eeprom) => Some(eeprom.to_bytes()),
            Self::Flash(flash) => Some(flash.to_bytes()),
        }
    }

    /// The backup kind this device was constructed for.
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Self::None => Kind::None,
            Self::Sram(_) => Kind::Sram,
            Self::Eeprom(eeprom) => match eeprom.size() {
                eeprom::Size::Small => Kind::Eeprom512,
                eeprom::Size::Large => Kind::Eeprom8k,
            },
            Self::Flash(flash) => match flash.capacity() {
                Capacity::Kb64 => Kind::Flash64k,
                Capacity::Kb128 => Kind::Flash128k,
            },
        }
    }

    /// Replaces the chip's contents with `image`, e.g. when restoring a
    /// save-state. Re-seeds the chip fresh rather than patching it in
    /// place, so any in-flight EEPROM/Flash command sequence is reset too.
    pub fn load(&mut self, image: &[u8]) {
        *self = Self::new(self.kind(), Some(image.to_vec()));
    }
}

impl Block for Backup {
    fn reset(&mut self) {
        match self {
            Self::None => {}
            Self::Sram(sram) => sram.reset(),
            Self::Eeprom(eeprom) => eeprom.reset(),
            Self::Flash(flash) => flash.reset(),
        }
    }
}

impl Mmio for Backup {
    fn attach(&self, bus: &mut Bus) {
        match self {
            Self::None => {}
            Self::Sram(sram) => sram.attach(bus),
            Self::Eeprom(eeprom) => eeprom.attach(bus),
            Self::Flash(flash) => flash.attach(bus),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_sram_signature() {
        let mut rom = vec![0u8; 256];
        rom[64..64 + 6].copy_from_slice(b"SRAM_V");
        assert_eq!(Kind::detect(&rom), Kind::Sram);
    }

    #[test]
    fn detects_flash_1m_before_generic_flash() {
        let mut rom = vec![0u8; 256];
        rom[64..64 + 9].copy_from_slice(b"FLASH1M_V");
        assert_eq!(Kind::detect(&rom), Kind::Flash128k);
    }

    #[test]
    fn no_signature_is_none() {
        let rom = vec![0u8; 256];
        assert_eq!(Kind::detect(&rom), Kind::None);
    }

    #[test]
    fn none_backup_has_no_file_size() {
        assert_eq!(Backup::new(Kind::None, None).to_bytes(), None);
    }
}
