//! Memory management unit: the single load/store facade the processor
//! collaborator drives through [`api::bus::Bus`].
//!
//! Owns the address space and every hardware part, wires them onto one
//! [`gba_arch::mio::Bus`], and serializes the per-cycle ordering (PPU, then
//! timers, then DMA) that the rest of the board depends on.

use bitfield_struct::bitfield;
use gba_arch::mem::{Memory, Result};
use gba_arch::mio::{Bus, Mmio};
use gba_arch::reg::Register;
use gba_arch::{Block, Shared, Word};
use log::warn;

use crate::config::{Config, Error as ConfigError, BIOS_SIZE};
use crate::dev::{ReadOnly, Unmapped};
use crate::parts::apu::Apu;
use crate::parts::cart::Cartridge;
use crate::parts::dma::{Dma, Trigger};
use crate::parts::joypad::Joypad;
use crate::parts::pic::Pic;
use crate::parts::ppu::Ppu;
use crate::parts::timer::Timer;

/// Main work RAM: 256 KiB of general-purpose memory, mirrored across the
/// entire 16 MiB `0x0200_0000` page.
#[derive(Debug)]
pub struct Ewram {
    bytes: Box<[u8; Self::SIZE]>,
}

impl Ewram {
    const SIZE: usize = 256 * 1024;
}

impl Default for Ewram {
    fn default() -> Self {
        Self {
            bytes: Box::new([0u8; Self::SIZE]),
        }
    }
}

impl Memory for Ewram {
    fn read(&self, addr: Word) -> Result<u8> {
        Ok(self.bytes[addr as usize % Self::SIZE])
    }

    fn write(&mut self, addr: Word, data: u8) -> Result<()> {
        self.bytes[addr as usize % Self::SIZE] = data;
        Ok(())
    }
}

/// Internal work RAM: 32 KiB, mirrored across the entire `0x0300_0000`
/// page.
#[derive(Debug)]
pub struct Iwram {
    bytes: Box<[u8; Self::SIZE]>,
}

impl Iwram {
    const SIZE: usize = 32 * 1024;
}

impl Default for Iwram {
    fn default() -> Self {
        Self {
            bytes: Box::new([0u8; Self::SIZE]),
        }
    }
}

impl Memory for Iwram {
    fn read(&self, addr: Word) -> Result<u8> {
        Ok(self.bytes[addr as usize % Self::SIZE])
    }

    fn write(&mut self, addr: Word, data: u8) -> Result<()> {
        self.bytes[addr as usize % Self::SIZE] = data;
        Ok(())
    }
}

/// `WAITCNT` (`$0400_0204`): ROM/SRAM wait-state and prefetch-buffer
/// control.
///
/// Decoded for a debugger's benefit and so a guest can read back what it
/// wrote; bit-exact wait-state/prefetch timing is out of scope, so nothing
/// here changes how fast [`Mmu::read8`]/[`Mmu::write8`] actually run.
#[bitfield(u16, order = lsb)]
pub struct WaitCnt {
    #[bits(2)]
    sram_wait: u8,
    #[bits(2)]
    ws0_first: u8,
    #[bits(1)]
    ws0_second: bool,
    #[bits(2)]
    ws1_first: u8,
    #[bits(1)]
    ws1_second: bool,
    #[bits(2)]
    ws2_first: u8,
    #[bits(1)]
    ws2_second: bool,
    #[bits(2)]
    phi: u8,
    #[bits(1)]
    __: bool,
    #[bits(1)]
    prefetch: bool,
}

impl Register for WaitCnt {
    type Value = u16;

    fn load(&self) -> u16 {
        self.0
    }

    fn store(&mut self, value: u16) {
        self.0 = value;
    }
}

crate::macros::memory_map16!(WaitCnt);

/// The memory management unit.
#[derive(Debug)]
pub struct Mmu {
    bus: Bus,
    pic: Pic,
    dma: Dma,
    timer: Timer,
    joypad: Joypad,
    ppu: Ppu,
    apu: Apu,
    cart: Cartridge,
    ewram: Shared<Ewram>,
    iwram: Shared<Iwram>,
    waitcnt: Shared<WaitCnt>,
}

impl Mmu {
    /// Constructs a new `Mmu` from a [`Config`], wiring every hardware
    /// part onto a fresh address space.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::RomSize`] if the ROM is too small to contain
    /// a header.
    pub fn new(config: Config) -> std::result::Result<Self, ConfigError> {
        let cart = Cartridge::new(config.rom, config.force_backup, None)
            .map_err(|_| ConfigError::RomSize)?;

        let pic = Pic::new();
        let dma = Dma::new(pic.line());
        let timer = Timer::new(pic.line());
        let joypad = Joypad::new(pic.line());
        let ppu = Ppu::new(pic.line());
        let apu = Apu::new();
        let ewram = Shared::<Ewram>::default();
        let iwram = Shared::<Iwram>::default();
        let waitcnt = Shared::<WaitCnt>::default();

        let mut bus = Bus::new();

        match config.bios {
            Some(bios) => {
                bus.map(0x0000_0000..=0x0000_3fff, Shared::new(ReadOnly::from(bios)).into());
            }
            None => {
                bus.map(0x0000_0000..=0x0000_3fff, Shared::new(Unmapped::new()).into());
            }
        }

        bus.map(0x0200_0000..=0x02ff_ffff, ewram.clone().into());
        bus.map(0x0300_0000..=0x03ff_ffff, iwram.clone().into());

        pic.attach(&mut bus);
        dma.attach(&mut bus);
        timer.attach(&mut bus);
        joypad.attach(&mut bus);
        ppu.attach(&mut bus);
        apu.attach(&mut bus);
        cart.attach(&mut bus);

        bus.map(0x0400_0204..=0x0400_0205, waitcnt.clone().into());

        // General-purpose serial: out of scope for gameplay, but a real
        // cartridge polls SIOCNT/RCNT, so these stay unmapped-but-logged
        // rather than faulting.
        bus.map(0x0400_0120..=0x0400_012b, Shared::new(Unmapped::new()).into());
        bus.map(0x0400_0134..=0x0400_0159, Shared::new(Unmapped::new()).into());

        Ok(Self {
            bus,
            pic,
            dma,
            timer,
            joypad,
            ppu,
            apu,
            cart,
            ewram,
            iwram,
            waitcnt,
        })
    }

    /// Gets the inserted cartridge.
    #[must_use]
    pub fn cart(&self) -> &Cartridge {
        &self.cart
    }

    /// Mutably gets the inserted cartridge.
    #[must_use]
    pub fn cart_mut(&mut self) -> &mut Cartridge {
        &mut self.cart
    }

    /// Gets the joypad.
    #[must_use]
    pub fn joypad(&self) -> &Joypad {
        &self.joypad
    }

    /// Mutably gets the joypad.
    #[must_use]
    pub fn joypad_mut(&mut self) -> &mut Joypad {
        &mut self.joypad
    }

    /// Gets the picture processing unit.
    #[must_use]
    pub fn video(&self) -> &Ppu {
        &self.ppu
    }

    /// Mutably gets the picture processing unit.
    #[must_use]
    pub fn video_mut(&mut self) -> &mut Ppu {
        &mut self.ppu
    }

    /// Gets the audio processing unit.
    #[must_use]
    pub fn audio(&self) -> &Apu {
        &self.apu
    }

    /// Mutably gets the audio processing unit.
    #[must_use]
    pub fn audio_mut(&mut self) -> &mut Apu {
        &mut self.apu
    }

    /// Raw EWRAM contents, for save-state serialization.
    #[must_use]
    pub(crate) fn ewram_bytes(&self) -> Vec<u8> {
        self.ewram.borrow().bytes.to_vec()
    }

    /// Overwrites EWRAM from a save-state blob.
    pub(crate) fn set_ewram_bytes(&mut self, data: &[u8]) {
        self.ewram.borrow_mut().bytes.copy_from_slice(data);
    }

    /// Raw IWRAM contents, for save-state serialization.
    #[must_use]
    pub(crate) fn iwram_bytes(&self) -> Vec<u8> {
        self.iwram.borrow().bytes.to_vec()
    }

    /// Overwrites IWRAM from a save-state blob.
    pub(crate) fn set_iwram_bytes(&mut self, data: &[u8]) {
        self.iwram.borrow_mut().bytes.copy_from_slice(data);
    }

    /// Raw contents of the 1 KiB I/O register page (`$0400_0000` range),
    /// for save-state serialization. Covers every bus-mapped register
    /// (`DISPCNT`/`WAITCNT`/DMA and timer control/address registers,
    /// `IE`/`IF`/`IME`, sound registers, and so on) uniformly, the same way
    /// the CPU itself would read them back.
    #[must_use]
    pub(crate) fn io_bytes(&self) -> Vec<u8> {
        (0..Self::IO_SIZE).map(|i| self.bus.read(Self::IO_BASE + i as Word).unwrap_or(0)).collect()
    }

    /// Overwrites the I/O register page from a save-state blob.
    pub(crate) fn set_io_bytes(&mut self, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            let _ = self.bus.write(Self::IO_BASE + i as Word, byte);
        }
    }

    const IO_BASE: Word = 0x0400_0000;
    const IO_SIZE: usize = 0x400;

    /// Per-channel DMA in-flight state, for save-state serialization.
    #[must_use]
    pub(crate) fn dma_scalar_state(&self) -> Vec<u8> {
        self.dma.scalar_state()
    }

    /// Restores per-channel DMA in-flight state from
    /// [`dma_scalar_state`](Self::dma_scalar_state).
    pub(crate) fn set_dma_scalar_state(&mut self, data: &[u8]) {
        self.dma.set_scalar_state(data);
    }

    /// Per-channel timer prescaler/reload-delay state, for save-state
    /// serialization.
    #[must_use]
    pub(crate) fn timer_scalar_state(&self) -> Vec<u8> {
        self.timer.scalar_state()
    }

    /// Restores per-channel timer state from
    /// [`timer_scalar_state`](Self::timer_scalar_state).
    pub(crate) fn set_timer_scalar_state(&mut self, data: &[u8]) {
        self.timer.set_scalar_state(data);
    }

    fn read_byte(&mut self, addr: u32) -> u8 {
        self.bus.read(addr).unwrap_or_else(|err| {
            warn!("mmu read at {addr:#010x} failed: {err}");
            0
        })
    }

    fn write_byte(&mut self, addr: u32, data: u8) {
        if let Err(err) = self.bus.write(addr, data) {
            warn!("mmu write of {data:#04x} at {addr:#010x} failed: {err}");
            return;
        }
        // Any byte landing in a DMA channel's control registers may have
        // just armed an immediate-timing transfer.
        if (0x0400_00b0..=0x0400_00df).contains(&addr) {
            self.dma.notify_immediate();
        }
    }
}

impl crate::api::bus::Bus for Mmu {
    fn read8(&mut self, addr: u32) -> u8 {
        self.read_byte(addr)
    }

    fn read16(&mut self, addr: u32) -> u16 {
        let addr = addr & !0x1;
        u16::from_le_bytes([self.read_byte(addr), self.read_byte(addr + 1)])
    }

    fn read32(&mut self, addr: u32) -> u32 {
        let addr = addr & !0x3;
        u32::from_le_bytes([
            self.read_byte(addr),
            self.read_byte(addr + 1),
            self.read_byte(addr + 2),
            self.read_byte(addr + 3),
        ])
    }

    fn write8(&mut self, addr: u32, data: u8) {
        self.write_byte(addr, data);
    }

    fn write16(&mut self, addr: u32, data: u16) {
        let addr = addr & !0x1;
        for (i, byte) in data.to_le_bytes().into_iter().enumerate() {
            self.write_byte(addr + i as u32, byte);
        }
    }

    fn write32(&mut self, addr: u32, data: u32) {
        let addr = addr & !0x3;
        for (i, byte) in data.to_le_bytes().into_iter().enumerate() {
            self.write_byte(addr + i as u32, byte);
        }
    }

    fn step(&mut self, cycles: u32) {
        for _ in 0..cycles {
            self.ppu.cycle();
            if self.ppu.hblank_started() {
                self.dma.notify(Trigger::HBlank);
                let line = self.ppu.scanline();
                if (2..=161).contains(&line) {
                    self.dma.notify(Trigger::VideoCapture { last: line == 161 });
                }
            }
            if self.ppu.vblank_started() {
                self.dma.notify(Trigger::VBlank);
            }
            self.timer.cycle();
            for idx in 0..4 {
                if self.timer.overflowed(idx) {
                    self.apu.notify_timer(idx, &mut self.dma);
                }
            }
            self.dma.step(&mut self.bus);
        }
    }

    fn pending_irq_mask(&self) -> u16 {
        self.pic.pending_mask()
    }

    fn irq_master_enable(&self) -> bool {
        self.pic.master_enable()
    }
}

impl Block for Mmu {
    fn reset(&mut self) {
        self.ewram.borrow_mut().bytes.fill(0);
        self.iwram.borrow_mut().bytes.fill(0);
        self.waitcnt.take();
        self.pic.reset();
        self.dma.reset();
        self.timer.reset();
        self.joypad.reset();
        self.ppu.reset();
        self.apu.reset();
        self.cart.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::bus::Bus as ApiBus;

    fn blank_rom() -> Vec<u8> {
        vec![0u8; 0x200]
    }

    fn mmu() -> Mmu {
        Mmu::new(Config::new(blank_rom())).unwrap()
    }

    #[test]
    fn ewram_mirrors_across_the_whole_page() {
        let mut mmu = mmu();
        mmu.write8(0x0200_0000, 0x42);
        assert_eq!(mmu.read8(0x0200_0000), 0x42);
        assert_eq!(mmu.read8(0x0204_0000), 0x42, "mirrors every 256 KiB");
        assert_eq!(mmu.read8(0x02ff_ffff - (Ewram::SIZE as u32 - 1)), 0x42);
    }

    #[test]
    fn iwram_mirrors_across_the_whole_page() {
        let mut mmu = mmu();
        mmu.write8(0x0300_0000, 0x7a);
        assert_eq!(mmu.read8(0x0300_8000), 0x7a, "mirrors every 32 KiB");
    }

    #[test]
    fn bios_is_unmapped_without_config() {
        let mut mmu = mmu();
        assert_eq!(mmu.read8(0x0000_0000), 0x00);
    }

    #[test]
    fn bios_reads_through_when_configured() {
        let mut bios = vec![0u8; BIOS_SIZE];
        bios[0] = 0xaa;
        let config = Config::new(blank_rom()).with_bios(bios).unwrap();
        let mut mmu = Mmu::new(config).unwrap();
        assert_eq!(mmu.read8(0x0000_0000), 0xaa);
        // Writes to the BIOS are silently dropped.
        mmu.write8(0x0000_0000, 0xff);
        assert_eq!(mmu.read8(0x0000_0000), 0xaa);
    }

    #[test]
    fn waitcnt_round_trips() {
        let mut mmu = mmu();
        mmu.write16(0x0400_0204, 0x4317);
        assert_eq!(mmu.read16(0x0400_0204), 0x4317);
    }

    #[test]
    fn serial_stub_registers_are_logged_but_readable() {
        let mut mmu = mmu();
        assert_eq!(mmu.read16(0x0400_0128), 0x0000);
        mmu.write16(0x0400_0134, 0xffff);
        assert_eq!(mmu.read16(0x0400_0134), 0x0000, "writes are dropped");
    }

    #[test]
    fn read32_assembles_little_endian_word() {
        let mut mmu = mmu();
        mmu.write32(0x0200_0000, 0xdead_beef);
        assert_eq!(mmu.read32(0x0200_0000), 0xdead_beef);
        assert_eq!(mmu.read8(0x0200_0000), 0xef);
        assert_eq!(mmu.read8(0x0200_0003), 0xde);
    }

    #[test]
    fn unaligned_access_is_forced_aligned() {
        let mut mmu = mmu();
        mmu.write32(0x0200_0000, 0x1122_3344);
        assert_eq!(mmu.read16(0x0200_0001), mmu.read16(0x0200_0000));
    }

    #[test]
    fn immediate_dma_write_completes_through_step() {
        let mut mmu = mmu();
        mmu.write32(0x0200_1000, 0xcafe_babe);

        // DMA0SAD = 0x0200_1000.
        mmu.write32(0x0400_00b0, 0x0200_1000);
        // DMA0DAD = 0x0200_2000.
        mmu.write32(0x0400_00b4, 0x0200_2000);
        // DMA0CNT_L = 1 word.
        mmu.write16(0x0400_00b8, 1);
        // DMA0CNT_H = enable | 32-bit | immediate.
        mmu.write16(0x0400_00ba, 0x8400);

        for _ in 0..4 {
            mmu.step(1);
        }

        assert_eq!(mmu.read32(0x0200_2000), 0xcafe_babe);
    }

    #[test]
    fn timer_overflow_drains_direct_sound_fifo_through_mmu() {
        let mut mmu = mmu();
        // SOUNDCNT_X: master enable.
        mmu.write8(0x0400_0084, 0x80);
        // Push a few bytes into FIFO A.
        for b in [1u8, 2, 3, 4, 5, 6] {
            mmu.write8(0x0400_00a0, b);
        }
        // TM0CNT_H: prescaler /1, enabled; FIFO A already defaults to
        // timer 0. Overflow on the very next cycle.
        mmu.write16(0x0400_0102, 0b1000_0000);
        mmu.write16(0x0400_0100, 0xffff);

        mmu.step(1);
        // No assertion beyond "doesn't panic": the timer has not yet
        // overflowed after a single cycle, so this just exercises the
        // `Mmu::step` -> `Apu::notify_timer` wiring without requiring a
        // full 0xffff-cycle run to reach overflow.
        assert!(mmu.audio_mut().drain().is_empty());
    }

    #[test]
    fn pending_irq_mask_forwards_to_pic() {
        let mut mmu = mmu();
        // IE = VBlank.
        mmu.write16(0x0400_0200, 0x0001);
        // IME = 1.
        mmu.write16(0x0400_0208, 0x0001);
        assert!(mmu.irq_master_enable());
        assert_eq!(mmu.pending_irq_mask(), 0x0000, "nothing requested yet");
    }
}
