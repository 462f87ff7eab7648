//! Flash-chip command interface.
//!
//! Ground truth: <https://problemkaputt.de/gbatek.htm#gbacartbackupflashrom>.

use gba_arch::mem::{Memory, Result};
use gba_arch::mio::{Bus, Mmio};
use gba_arch::{Block, Shared, Word};
use log::{debug, warn};

/// Flash chip capacity.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Capacity {
    /// 64 KiB, single bank.
    Kb64,
    /// 128 KiB, two 64 KiB banks.
    Kb128,
}

impl Capacity {
    #[must_use]
    fn bytes(self) -> usize {
        match self {
            Self::Kb64 => BANK_SIZE,
            Self::Kb128 => 2 * BANK_SIZE,
        }
    }

    #[must_use]
    fn banks(self) -> usize {
        self.bytes() / BANK_SIZE
    }

    #[must_use]
    fn device_id(self) -> [u8; 2] {
        match self {
            Self::Kb64 => [0x32, 0x1b],
            Self::Kb128 => [0xc2, 0x09],
        }
    }
}

const BANK_SIZE: usize = 64 * 1024;
const CMD_ADDR_1: Word = 0x5555;
const CMD_ADDR_2: Word = 0x2aaa;
const SECTOR_SIZE: usize = 4 * 1024;

/// Command sequencer state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum Stage {
    #[default]
    Idle,
    Unlock1,
    Unlock2,
    BankSelect,
    EraseUnlock1,
    EraseUnlock2,
    EraseUnlock2Cmd,
}

/// Flash storage chip.
#[derive(Debug)]
pub struct Flash {
    raw: Shared<Raw>,
}

impl Flash {
    /// Constructs a new `Flash`, loading `image` if it matches the
    /// capacity's byte size.
    #[must_use]
    pub fn new(capacity: Capacity, image: Option<Vec<u8>>) -> Self {
        Self {
            raw: Shared::new(Raw::new(capacity, image)),
        }
    }

    /// Serializes the current contents (both banks, if present) for
    /// writing to a save file.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.raw.borrow().data.clone()
    }

    /// This chip's capacity.
    #[must_use]
    pub fn capacity(&self) -> Capacity {
        self.raw.borrow().capacity
    }
}

impl Block for Flash {
    fn reset(&mut self) {
        self.raw.borrow_mut().reset();
    }
}

impl Mmio for Flash {
    fn attach(&self, bus: &mut Bus) {
        bus.map(0x0e00_0000..=0x0e00_ffff, self.raw.clone().into());
    }
}

#[derive(Debug)]
struct Raw {
    capacity: Capacity,
    data: Vec<u8>,
    bank: usize,
    id_mode: bool,
    write_latched: bool,
    stage: Stage,
}

impl Raw {
    fn new(capacity: Capacity, image: Option<Vec<u8>>) -> Self {
        let size = capacity.bytes();
        let mut data = vec![0xffu8; size];
        if let Some(bytes) = image {
            let len = bytes.len().min(size);
            data[..len].copy_from_slice(&bytes[..len]);
        }
        Self {
            capacity,
            data,
            bank: 0,
            id_mode: false,
            write_latched: false,
            stage: Stage::Idle,
        }
    }

    fn reset(&mut self) {
        self.bank = 0;
        self.id_mode = false;
        self.write_latched = false;
        self.stage = Stage::Idle;
    }

    fn offset(&self, local: Word) -> usize {
        self.bank * BANK_SIZE + local as usize
    }

    fn accept_command(&mut self, local: Word, value: u8) {
        self.stage = match (self.stage, local, value) {
            (Stage::Idle, CMD_ADDR_1, 0xaa) => Stage::Unlock1,
            (Stage::Unlock1, CMD_ADDR_2, 0x55) => Stage::Unlock2,
            (Stage::Unlock2, CMD_ADDR_1, cmd) => {
                self.run_command(cmd);
                self.stage_after_command(cmd).unwrap_or(Stage::Idle)
            }
            (Stage::BankSelect, 0x0000, bank) => {
                self.bank = (bank as usize) % self.capacity.banks();
                debug!("flash: switched to bank {}", self.bank);
                Stage::Idle
            }
            (Stage::EraseUnlock1, CMD_ADDR_1, 0xaa) => Stage::EraseUnlock2,
            (Stage::EraseUnlock2, CMD_ADDR_2, 0x55) => Stage::EraseUnlock2Cmd,
            _ => {
                warn!("flash: unexpected write {value:#04x} at {local:#06x} in {:?}", self.stage);
                Stage::Idle
            }
        };
    }

    fn run_command(&mut self, cmd: u8) {
        match cmd {
            0x90 => {
                self.id_mode = true;
                debug!("flash: entered ID mode");
            }
            0xf0 => {
                self.id_mode = false;
                debug!("flash: exited ID mode");
            }
            0xa0 => {
                self.write_latched = true;
                debug!("flash: armed single-byte write");
            }
            0x80 => debug!("flash: erase command primed"),
            0xb0 if self.capacity == Capacity::Kb128 => {
                debug!("flash: bank-select armed");
            }
            0x10 => {
                self.data.fill(0xff);
                debug!("flash: chip erase");
            }
            _ => warn!("flash: unknown command {cmd:#04x}"),
        }
    }

    fn stage_after_command(&self, cmd: u8) -> Option<Stage> {
        match cmd {
            0x80 => Some(Stage::EraseUnlock1),
            0xb0 if self.capacity == Capacity::Kb128 => Some(Stage::BankSelect),
            _ => None,
        }
    }

    fn sector_erase(&mut self, addr: Word) {
        let base = self.offset(addr) & !(SECTOR_SIZE - 1);
        self.data[base..base + SECTOR_SIZE].fill(0xff);
        debug!("flash: erased sector at {base:#06x}");
    }
}

impl Memory for Raw {
    fn read(&self, addr: Word) -> Result<u8> {
        let local = addr % BANK_SIZE as Word;
        if self.id_mode && local < 2 {
            return Ok(self.capacity.device_id()[local as usize]);
        }
        Ok(self.data[self.offset(local)])
    }

    fn write(&mut self, addr: Word, value: u8) -> Result<()> {
        let local = addr % BANK_SIZE as Word;

        if self.write_latched {
            self.write_latched = false;
            let off = self.offset(local);
            self.data[off] = value;
            debug!("flash: wrote {value:#04x} at {addr:#010x}");
            return Ok(());
        }

        if self.stage == Stage::EraseUnlock2Cmd {
            self.stage = Stage::Idle;
            match value {
                0x10 => {
                    self.data.fill(0xff);
                    debug!("flash: chip erase");
                }
                0x30 => self.sector_erase(local),
                cmd => warn!("flash: unknown erase opcode {cmd:#04x}"),
            }
            return Ok(());
        }

        self.accept_command(local, value);
        Ok(())
    }
}
