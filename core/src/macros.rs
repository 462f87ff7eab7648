//! Helpers for wiring multi-byte registers onto the byte-addressed
//! [`gba_arch::mio::Bus`].
//!
//! The GBA's I/O registers are mostly 16- or 32-bit, but
//! [`gba_arch::mem::Memory`] is byte-addressed (inherited from the Game
//! Boy's 8-bit bus). These macros implement `Memory` for a register type in
//! terms of its own [`gba_arch::reg::Register::load`]/`store`, splitting
//! the loaded value into little-endian bytes the way real hardware exposes
//! a 16/32-bit register across consecutive byte addresses.

/// Implements byte-addressed [`Memory`](gba_arch::mem::Memory) for a type
/// whose [`Register::Value`](gba_arch::reg::Register::Value) is `u16`.
macro_rules! memory_map16 {
    ($ty:ty) => {
        impl gba_arch::mem::Memory for $ty {
            fn read(&self, addr: gba_arch::Word) -> gba_arch::mem::Result<u8> {
                use gba_arch::reg::Register as _;
                let bytes = self.load().to_le_bytes();
                Ok(bytes[(addr & 0x1) as usize])
            }

            fn write(&mut self, addr: gba_arch::Word, data: u8) -> gba_arch::mem::Result<()> {
                use gba_arch::reg::Register as _;
                let mut bytes = self.load().to_le_bytes();
                bytes[(addr & 0x1) as usize] = data;
                self.store(u16::from_le_bytes(bytes));
                Ok(())
            }
        }
    };
}

/// Implements byte-addressed [`Memory`](gba_arch::mem::Memory) for a type
/// whose [`Register::Value`](gba_arch::reg::Register::Value) is `u32`.
macro_rules! memory_map32 {
    ($ty:ty) => {
        impl gba_arch::mem::Memory for $ty {
            fn read(&self, addr: gba_arch::Word) -> gba_arch::mem::Result<u8> {
                use gba_arch::reg::Register as _;
                let bytes = self.load().to_le_bytes();
                Ok(bytes[(addr & 0x3) as usize])
            }

            fn write(&mut self, addr: gba_arch::Word, data: u8) -> gba_arch::mem::Result<()> {
                use gba_arch::reg::Register as _;
                let mut bytes = self.load().to_le_bytes();
                bytes[(addr & 0x3) as usize] = data;
                self.store(u32::from_le_bytes(bytes));
                Ok(())
            }
        }
    };
}

pub(crate) use memory_map16;
pub(crate) use memory_map32;
