use gba_arch::mem::{Memory, Result};
use gba_arch::{Block, Word};
use log::warn;

/// Unmapped region of the address space.
///
/// Yields a fixed "garbage" fill byte on every read and silently swallows
/// writes, but unlike [`gba_arch::dev::Null`] it logs each access. Real
/// hardware returns open-bus values here; a constant fill is close enough
/// for guest code that only probes for "is anything mapped here".
#[derive(Debug)]
pub struct Unmapped(u8);

impl Unmapped {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for Unmapped {
    fn default() -> Self {
        Self(0x00)
    }
}

impl Block for Unmapped {}

impl Memory for Unmapped {
    fn read(&self, addr: Word) -> Result<u8> {
        warn!("read from unmapped address {addr:#010x}");
        Ok(self.0)
    }

    fn write(&mut self, addr: Word, data: u8) -> Result<()> {
        warn!("write of {data:#04x} to unmapped address {addr:#010x}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_yields_fill_byte() {
        let unmapped = Unmapped::new();
        assert_eq!(unmapped.read(0x0a00_0000).unwrap(), 0x00);
    }

    #[test]
    fn write_is_ignored() {
        let mut unmapped = Unmapped::new();
        unmapped.write(0x0a00_0000, 0xaa).unwrap();
        assert_eq!(unmapped.read(0x0a00_0000).unwrap(), 0x00);
    }
}
