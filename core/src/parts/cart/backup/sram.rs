//! Plain battery-backed SRAM.

use gba_arch::mem::{Memory, Result};
use gba_arch::mio::{Bus, Mmio};
use gba_arch::{Block, Shared, Word};

/// SRAM size: 32 KiB, mirrored across the whole `0x0E`/`0x0F` page.
pub const SIZE: usize = 32 * 1024;

/// Battery-backed static RAM.
#[derive(Debug)]
pub struct Sram {
    data: Shared<Raw>,
}

impl Sram {
    /// Constructs a new `Sram`, loading `image` if it matches [`SIZE`].
    #[must_use]
    pub fn new(image: Option<Vec<u8>>) -> Self {
        let mut raw = Raw(Box::new([0u8; SIZE]));
        if let Some(bytes) = image {
            let len = bytes.len().min(SIZE);
            raw.0[..len].copy_from_slice(&bytes[..len]);
        }
        Self {
            data: Shared::new(raw),
        }
    }

    /// Serializes the current contents for writing to a save file.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.borrow().0.to_vec()
    }
}

impl Block for Sram {
    fn reset(&mut self) {
        self.data.borrow_mut().0.fill(0);
    }
}

impl Memory for Sram {
    fn read(&self, addr: Word) -> Result<u8> {
        self.data.borrow().read(addr)
    }

    fn write(&mut self, addr: Word, data: u8) -> Result<()> {
        self.data.borrow_mut().write(addr, data)
    }
}

impl Mmio for Sram {
    fn attach(&self, bus: &mut Bus) {
        bus.map(0x0e00_0000..=0x0e00_7fff, self.data.clone().into());
    }
}

#[derive(Debug)]
struct Raw(Box<[u8; SIZE]>);

impl Memory for Raw {
    fn read(&self, addr: Word) -> Result<u8> {
        self.0.read(addr % SIZE as Word)
    }

    fn write(&mut self, addr: Word, data: u8) -> Result<()> {
        self.0.write(addr % SIZE as Word, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_round_trip() {
        let mut sram = Sram::new(None);
        sram.write(0x10, 0x42).unwrap();
        assert_eq!(sram.read(0x10).unwrap(), 0x42);
    }

    #[test]
    fn mirrors_past_size() {
        let mut sram = Sram::new(None);
        sram.write(0x10, 0x99).unwrap();
        assert_eq!(sram.read(0x10 + SIZE as Word).unwrap(), 0x99);
    }

    #[test]
    fn loads_image() {
        let mut image = vec![0u8; SIZE];
        image[5] = 0xab;
        let sram = Sram::new(Some(image));
        assert_eq!(sram.read(5).unwrap(), 0xab);
    }
}
