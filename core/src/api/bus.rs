//! Processor-facing bus API.
//!
//! An external ARM7TDMI collaborator reads and writes the 32-bit address
//! space through this trait and learns about pending interrupts through it;
//! it never touches the individual hardware parts directly.

/// Bus support.
pub trait Support {
    /// Bus interface.
    type Bus: Bus;

    /// Gets the core's bus.
    #[must_use]
    fn bus(&self) -> &Self::Bus;

    /// Mutably gets the core's bus.
    #[must_use]
    fn bus_mut(&mut self) -> &mut Self::Bus;
}

/// Processor-facing memory and interrupt interface.
pub trait Bus {
    /// Reads a byte.
    #[must_use]
    fn read8(&mut self, addr: u32) -> u8;

    /// Reads a halfword (address should be 2-aligned; the low bit is
    /// ignored, matching the ARM7TDMI's forced alignment).
    #[must_use]
    fn read16(&mut self, addr: u32) -> u16;

    /// Reads a word (address should be 4-aligned; the low two bits are
    /// ignored).
    #[must_use]
    fn read32(&mut self, addr: u32) -> u32;

    /// Writes a byte.
    fn write8(&mut self, addr: u32, data: u8);

    /// Writes a halfword.
    fn write16(&mut self, addr: u32, data: u16);

    /// Writes a word.
    fn write32(&mut self, addr: u32, data: u32);

    /// Advances every hardware part by `cycles` master clocks.
    ///
    /// The caller (the CPU collaborator) is responsible for deciding how
    /// many cycles an instruction or bus access took; this just lets the
    /// rest of the board catch up.
    fn step(&mut self, cycles: u32);

    /// Bitmask of interrupt sources currently asserted and enabled
    /// (`IE & IF`), for the processor to test against `CPSR.I` / IME.
    #[must_use]
    fn pending_irq_mask(&self) -> u16;

    /// Whether the master interrupt enable (IME) is set.
    #[must_use]
    fn irq_master_enable(&self) -> bool;
}
