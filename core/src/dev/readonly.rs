use gba_arch::mem::{Memory, Result};
use gba_arch::{Block, Word};
use log::warn;

/// Read-only view of an inner device; writes are logged and dropped.
#[derive(Debug)]
pub struct ReadOnly<M: Memory>(M);

impl<M: Memory> ReadOnly<M> {
    pub fn inner(&self) -> &M {
        &self.0
    }
}

impl<M: Memory> From<M> for ReadOnly<M> {
    fn from(dev: M) -> Self {
        Self(dev)
    }
}

impl<M: Memory + Block> Block for ReadOnly<M> {
    fn reset(&mut self) {
        self.0.reset();
    }
}

impl<M: Memory> Memory for ReadOnly<M> {
    fn read(&self, addr: Word) -> Result<u8> {
        self.0.read(addr)
    }

    fn write(&mut self, addr: Word, data: u8) -> Result<()> {
        warn!("write of {data:#04x} to address {addr:#010x} on a read-only device");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_is_ignored() {
        let mut ronly = ReadOnly::from([0x55; 0x100]);
        ronly.write(0x10, 0xaa).unwrap();
        assert_eq!(ronly.read(0x10).unwrap(), 0x55);
    }
}
