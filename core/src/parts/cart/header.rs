//! Game ROM cartridge header.
//!
//! Encoded in the ROM at `[0x00..0xC0]` is the header: entry point, Nintendo
//! logo, title/game-code/maker-code, and a one-byte checksum. Per the
//! cartridge interface, these fields are parsed for logging only — backup
//! detection (see [`super::backup`]) is the only functionally significant
//! part of the header.

use std::str::Utf8Error;

use log::warn;
use thiserror::Error;

/// Header byte range within the ROM image.
const HEADER_LEN: usize = 0xc0;

/// Cartridge header.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Header {
    /// Game title, `[0x0A0..0x0AC)`.
    pub title: Option<String>,
    /// Game code, `[0x0AC..0x0B0)`.
    pub game_code: Option<String>,
    /// Maker code, `[0x0B0..0x0B2)`.
    pub maker_code: Option<String>,
    /// Software version, `[0x0BC]`.
    pub version: u8,
    /// Header checksum, `[0x0BD]`.
    pub checksum: u8,
    /// Whether the header checksum verifies against bytes `[0xA0..0xBD)`.
    pub checksum_ok: bool,
}

impl Header {
    /// Parses a `Header` from a ROM image.
    ///
    /// # Errors
    ///
    /// Returns an error if the ROM is too short to contain a header.
    pub fn new(rom: &[u8]) -> Result<Self> {
        let head: &[u8; HEADER_LEN] = rom
            .get(0x00..HEADER_LEN)
            .ok_or(Error::Missing)?
            .try_into()
            .map_err(|_| Error::Missing)?;

        let title = ascii_field(&head[0xa0..0xac]);
        let game_code = ascii_field(&head[0xac..0xb0]);
        let maker_code = ascii_field(&head[0xb0..0xb2]);
        let version = head[0xbc];
        let checksum = head[0xbd];

        let computed = header_checksum(&head[0xa0..0xbd]);
        let checksum_ok = computed == checksum;
        if !checksum_ok {
            warn!("header checksum mismatch: stored {checksum:#04x}, computed {computed:#04x}");
        }

        Ok(Self {
            title,
            game_code,
            maker_code,
            version,
            checksum,
            checksum_ok,
        })
    }

    /// A blank header for ROM-less construction.
    #[must_use]
    pub fn blank() -> Self {
        Self {
            title: None,
            game_code: None,
            maker_code: None,
            version: 0,
            checksum: 0,
            checksum_ok: false,
        }
    }
}

/// `checksum = -(sum(bytes) + 0x19) & 0xFF`, per the BIOS boot check.
fn header_checksum(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    (!sum.wrapping_add(0x19)).wrapping_add(1)
}

fn ascii_field(bytes: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(bytes).ok()?.trim_end_matches('\0');
    (!text.is_empty()).then(|| text.to_string())
}

/// A convenient type alias for [`Result`](std::result::Result).
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error caused by parsing a [`Header`].
#[derive(Debug, Error)]
pub enum Error {
    /// ROM too short to contain a header.
    #[error("ROM missing header bytes")]
    Missing,
    /// A header field was not valid UTF-8/ASCII.
    #[error("header field was not valid text")]
    Text(#[from] Utf8Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_with_title(title: &[u8]) -> Vec<u8> {
        let mut rom = vec![0u8; HEADER_LEN];
        rom[0xa0..0xa0 + title.len()].copy_from_slice(title);
        let checksum = header_checksum(&rom[0xa0..0xbd]);
        rom[0xbd] = checksum;
        rom
    }

    #[test]
    fn parses_title() {
        let rom = rom_with_title(b"POKEMON RS");
        let head = Header::new(&rom).unwrap();
        assert_eq!(head.title.as_deref(), Some("POKEMON RS"));
        assert!(head.checksum_ok);
    }

    #[test]
    fn flags_bad_checksum() {
        let mut rom = rom_with_title(b"TEST");
        rom[0xbd] ^= 0xff;
        let head = Header::new(&rom).unwrap();
        assert!(!head.checksum_ok);
    }

    #[test]
    fn missing_header_is_an_error() {
        assert!(Header::new(&[0u8; 0x10]).is_err());
    }
}
