//! Save-state serialization: a versioned binary blob capturing enough of
//! [`Mmu`]'s state to resume a halted core later.
//!
//! Covers general-purpose RAM (EWRAM, IWRAM), the full I/O register page
//! (which includes `WAITCNT`, every DMA/timer/PPU/APU register, and
//! `IE`/`IF`/`IME`), palette RAM, VRAM, OAM, the cartridge's backup chip
//! contents, and the non-register-backed runtime state that would
//! otherwise be lost by a save taken mid-frame or mid-transfer: DMA
//! channels' in-flight source/destination/remaining-count, timers'
//! prescaler accumulators and reload-delay state, the PPU's current
//! dot/scanline, and the APU's direct-sound FIFOs and pending mixed-output
//! queue. GPIO is not modeled anywhere in this build, so there is nothing
//! to capture for it; the per-channel EEPROM/Flash command sequence
//! resets on load (see [`Cartridge::load_backup`](crate::parts::cart::Cartridge::load_backup)).
//! The APU's per-channel oscillator phases (duty/envelope/sweep counters
//! internal to `ch1`-`ch4`) are likewise not yet captured.

use thiserror::Error;

use crate::mmu::Mmu;

const MAGIC: &[u8; 4] = b"GBAS";
const VERSION: u8 = 2;

/// An error loading a save-state blob.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Error {
    /// The blob doesn't start with the expected magic number.
    #[error("not a save-state blob")]
    BadMagic,
    /// The blob's version doesn't match what this build writes.
    #[error("save-state version mismatch (found {found}, expected {expected})")]
    Version {
        /// Version tag found in the blob.
        found: u8,
        /// Version tag this build writes and expects.
        expected: u8,
    },
    /// The blob was truncated partway through a fixed-size field.
    #[error("save-state blob truncated")]
    Truncated,
}

/// Appends `bytes` length-prefixed (`u32` little-endian) so [`load`] can
/// skip or validate variable-length sections without hardcoding their size.
fn push_framed(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

/// Serializes `mmu`'s state into a versioned binary blob.
#[must_use]
pub fn save(mmu: &Mmu) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.extend_from_slice(&mmu.ewram_bytes());
    out.extend_from_slice(&mmu.iwram_bytes());
    out.extend_from_slice(&mmu.io_bytes());
    out.extend_from_slice(&mmu.video().vram_bytes());
    out.extend_from_slice(&mmu.video().oam_bytes());
    out.extend_from_slice(&mmu.video().palette_bytes());
    let (dot, line) = mmu.video().timing_state();
    out.extend_from_slice(&dot.to_le_bytes());
    out.extend_from_slice(&line.to_le_bytes());
    push_framed(&mut out, &mmu.dma_scalar_state());
    push_framed(&mut out, &mmu.timer_scalar_state());
    push_framed(&mut out, &mmu.audio().scalar_state());
    match mmu.cart().save() {
        Some(backup) => {
            out.push(1);
            push_framed(&mut out, &backup);
        }
        None => out.push(0),
    }
    out
}

/// Restores `mmu`'s state from a blob previously produced by [`save`].
///
/// # Errors
///
/// Returns [`Error::BadMagic`] or [`Error::Version`] if `blob` wasn't
/// produced by a compatible version of [`save`], or [`Error::Truncated`] if
/// it's shorter than a well-formed blob of that version.
pub fn load(mmu: &mut Mmu, blob: &[u8]) -> Result<(), Error> {
    let mut cursor = blob;

    let magic = take(&mut cursor, 4)?;
    if magic != MAGIC {
        return Err(Error::BadMagic);
    }

    let version = *take(&mut cursor, 1)?.first().ok_or(Error::Truncated)?;
    if version != VERSION {
        return Err(Error::Version {
            found: version,
            expected: VERSION,
        });
    }

    let ewram = take(&mut cursor, 256 * 1024)?.to_vec();
    let iwram = take(&mut cursor, 32 * 1024)?.to_vec();
    let io = take(&mut cursor, 0x400)?.to_vec();
    let vram = take(&mut cursor, 96 * 1024)?.to_vec();
    let oam = take(&mut cursor, 1024)?.to_vec();
    let palette = take(&mut cursor, 1024)?.to_vec();
    let dot = u16::from_le_bytes(take(&mut cursor, 2)?.try_into().unwrap());
    let line = u16::from_le_bytes(take(&mut cursor, 2)?.try_into().unwrap());
    let dma_state = take_framed(&mut cursor)?;
    let timer_state = take_framed(&mut cursor)?;
    let apu_state = take_framed(&mut cursor)?;
    let has_backup = *take(&mut cursor, 1)?.first().ok_or(Error::Truncated)?;

    let backup = if has_backup != 0 { Some(take_framed(&mut cursor)?) } else { None };

    mmu.set_ewram_bytes(&ewram);
    mmu.set_iwram_bytes(&iwram);
    mmu.set_io_bytes(&io);
    mmu.video_mut().set_vram_bytes(&vram);
    mmu.video_mut().set_oam_bytes(&oam);
    mmu.video_mut().set_palette_bytes(&palette);
    mmu.video_mut().set_timing_state((dot, line));
    mmu.set_dma_scalar_state(&dma_state);
    mmu.set_timer_scalar_state(&timer_state);
    mmu.audio_mut().set_scalar_state(&apu_state);
    if let Some(backup) = backup {
        mmu.cart_mut().load_backup(&backup);
    }

    Ok(())
}

/// Reads one [`push_framed`]-encoded section: a `u32` length prefix
/// followed by that many bytes.
fn take_framed(cursor: &mut &[u8]) -> Result<Vec<u8>, Error> {
    let len_bytes = take(cursor, 4)?;
    let len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
    Ok(take(cursor, len)?.to_vec())
}

fn take<'a>(cursor: &mut &'a [u8], len: usize) -> Result<&'a [u8], Error> {
    if cursor.len() < len {
        return Err(Error::Truncated);
    }
    let (head, tail) = cursor.split_at(len);
    *cursor = tail;
    Ok(head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn blank_rom() -> Vec<u8> {
        vec![0u8; 0x200]
    }

    #[test]
    fn round_trips_ram_and_waitcnt() {
        use crate::api::bus::Bus as ApiBus;

        let mut mmu = Mmu::new(Config::new(blank_rom())).unwrap();
        mmu.write8(0x0200_0042, 0x99);
        mmu.write16(0x0400_0204, 0x1234);

        let blob = save(&mmu);

        let mut other = Mmu::new(Config::new(blank_rom())).unwrap();
        load(&mut other, &blob).unwrap();

        assert_eq!(other.read8(0x0200_0042), 0x99);
        assert_eq!(other.read16(0x0400_0204), 0x1234);
    }

    #[test]
    fn round_trips_video_memory_and_timing() {
        use crate::api::bus::Bus as ApiBus;

        let mut mmu = Mmu::new(Config::new(blank_rom())).unwrap();
        mmu.write8(0x0600_0010, 0xab);
        mmu.write8(0x0700_0004, 0xcd);
        mmu.write8(0x0500_0008, 0xef);
        mmu.video_mut().set_timing_state((99, 42));

        let blob = save(&mmu);

        let mut other = Mmu::new(Config::new(blank_rom())).unwrap();
        load(&mut other, &blob).unwrap();

        assert_eq!(other.read8(0x0600_0010), 0xab);
        assert_eq!(other.read8(0x0700_0004), 0xcd);
        assert_eq!(other.read8(0x0500_0008), 0xef);
        assert_eq!(other.video().timing_state(), (99, 42));
    }

    #[test]
    fn rejects_bad_magic() {
        let mmu = Mmu::new(Config::new(blank_rom())).unwrap();
        let mut blob = save(&mmu);
        blob[0] = b'X';
        let mut other = Mmu::new(Config::new(blank_rom())).unwrap();
        assert_eq!(load(&mut other, &blob), Err(Error::BadMagic));
    }

    #[test]
    fn rejects_truncated_blob() {
        let mmu = Mmu::new(Config::new(blank_rom())).unwrap();
        let blob = save(&mmu);
        let mut other = Mmu::new(Config::new(blank_rom())).unwrap();
        assert_eq!(load(&mut other, &blob[..8]), Err(Error::Truncated));
    }
}
