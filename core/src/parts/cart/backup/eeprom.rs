//! Serial EEPROM, addressed over a one-bit-wide DMA stream rather than a
//! byte-addressed bus.
//!
//! Ground truth: <https://problemkaputt.de/gbatek.htm#gbacartbackupeeprom>.
//!
//! Modeled here as an ordinary bus-mapped [`Memory`] device rather than a
//! DMA-destination side channel: [`Memory::read`] only borrows `&self`, so
//! the output-shifting half of the bitstream state machine needs interior
//! mutability even though the input half does not.

use std::cell::RefCell;

use gba_arch::mem::{Memory, Result};
use gba_arch::mio::{Bus, Mmio};
use gba_arch::{Block, Shared, Word};
use log::{debug, trace};

/// Addressing width, fixed for the lifetime of the device rather than
/// auto-detected from the first DMA transfer's bit count.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Size {
    /// 6-bit address, 512 bytes.
    Small,
    /// 14-bit address, 8 KiB.
    Large,
}

impl Size {
    #[must_use]
    fn addr_bits(self) -> u32 {
        match self {
            Self::Small => 6,
            Self::Large => 14,
        }
    }

    #[must_use]
    fn bytes(self) -> usize {
        match self {
            Self::Small => 512,
            Self::Large => 8 * 1024,
        }
    }
}

const DATA_BITS: u32 = 64;
const DUMMY_BITS: u32 = 4;

#[derive(Clone, Debug, Eq, PartialEq)]
enum Stage {
    Idle,
    Cmd(u8),
    ReadAddr { addr: u32, bits: u32 },
    ReadOut { buf: [u8; 8], bit: u32 },
    WriteAddr { addr: u32, bits: u32 },
    WriteData { addr: usize, buf: [u8; 8], bit: u32 },
    WriteTerm { addr: usize, buf: [u8; 8] },
}

/// Serial EEPROM chip.
#[derive(Debug)]
pub struct Eeprom {
    raw: Shared<Raw>,
}

impl Eeprom {
    /// Constructs a new `Eeprom`, loading `image` if it matches
    /// `size`'s byte length.
    #[must_use]
    pub fn new(size: Size, image: Option<Vec<u8>>) -> Self {
        Self {
            raw: Shared::new(Raw::new(size, image)),
        }
    }

    /// Serializes the current contents for writing to a save file.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.raw.borrow().data.clone()
    }

    /// This chip's addressing width.
    #[must_use]
    pub fn size(&self) -> Size {
        self.raw.borrow().size
    }
}

impl Block for Eeprom {
    fn reset(&mut self) {
        *self.raw.borrow().stage.borrow_mut() = Stage::Idle;
    }
}

impl Mmio for Eeprom {
    fn attach(&self, bus: &mut Bus) {
        bus.map(0x0d00_0000..=0x0dff_ffff, self.raw.clone().into());
    }
}

#[derive(Debug)]
struct Raw {
    size: Size,
    data: Vec<u8>,
    stage: RefCell<Stage>,
}

impl Raw {
    fn new(size: Size, image: Option<Vec<u8>>) -> Self {
        let bytes = size.bytes();
        let mut data = vec![0xffu8; bytes];
        if let Some(img) = image {
            let len = img.len().min(bytes);
            data[..len].copy_from_slice(&img[..len]);
        }
        Self {
            size,
            data,
            stage: RefCell::new(Stage::Idle),
        }
    }
}

impl Memory for Raw {
    /// Every bus read clocks out the next response bit (dummy bits first,
    /// then the 64-bit payload, MSB first); outside [`Stage::ReadOut`] the
    /// line idles high.
    fn read(&self, _addr: Word) -> Result<u8> {
        let mut stage = self.stage.borrow_mut();
        let Stage::ReadOut { buf, bit } = &mut *stage else {
            return Ok(1);
        };
        let out = if *bit < DUMMY_BITS {
            0
        } else {
            let data_bit = *bit - DUMMY_BITS;
            let byte = buf[(data_bit / 8) as usize];
            (byte >> (7 - data_bit % 8)) & 1
        };
        *bit += 1;
        if *bit >= DUMMY_BITS + DATA_BITS {
            trace!("eeprom: finished streaming read");
            *stage = Stage::Idle;
        }
        Ok(out)
    }

    /// Every bus write clocks in one bit of command, address, or payload.
    fn write(&mut self, _addr: Word, value: u8) -> Result<()> {
        let bit = value & 1;
        let mut stage = self.stage.borrow_mut();
        *stage = match std::mem::replace(&mut *stage, Stage::Idle) {
            Stage::Idle => Stage::Cmd(bit),
            Stage::Cmd(first) => match (first << 1) | bit {
                0b11 => Stage::ReadAddr { addr: 0, bits: 0 },
                0b10 => Stage::WriteAddr { addr: 0, bits: 0 },
                opcode => {
                    debug!("eeprom: unrecognized opcode {opcode:#04b}");
                    Stage::Idle
                }
            },
            Stage::ReadAddr {
                addr: prev,
                bits: prev_bits,
            } => {
                let addr = (prev << 1) | u32::from(bit);
                let bits = prev_bits + 1;
                if bits >= self.size.addr_bits() {
                    // This bit is the command's terminator; the address is
                    // already complete. Snapshot the page for streaming out.
                    let base = addr as usize * 8;
                    let mut buf = [0u8; 8];
                    buf.copy_from_slice(&self.data[base..base + 8]);
                    trace!("eeprom: armed read at {addr:#06x}");
                    Stage::ReadOut { buf, bit: 0 }
                } else {
                    Stage::ReadAddr { addr, bits }
                }
            }
            Stage::WriteAddr {
                addr: prev,
                bits: prev_bits,
            } => {
                let addr = (prev << 1) | u32::from(bit);
                let bits = prev_bits + 1;
                if bits >= self.size.addr_bits() {
                    Stage::WriteData {
                        addr: addr as usize,
                        buf: [0u8; 8],
                        bit: 0,
                    }
                } else {
                    Stage::WriteAddr { addr, bits }
                }
            }
            Stage::WriteData {
                addr,
                mut buf,
                bit: prev_bit,
            } => {
                let byte = (prev_bit / 8) as usize;
                let shift = 7 - prev_bit % 8;
                buf[byte] = (buf[byte] & !(1 << shift)) | (bit << shift);
                let bit_idx = prev_bit + 1;
                if bit_idx >= DATA_BITS {
                    Stage::WriteTerm { addr, buf }
                } else {
                    Stage::WriteData {
                        addr,
                        buf,
                        bit: bit_idx,
                    }
                }
            }
            Stage::WriteTerm { addr, buf } => {
                drop(stage);
                self.data[addr * 8..addr * 8 + 8].copy_from_slice(&buf);
                debug!("eeprom: committed 64 bits at {addr:#06x}");
                return Ok(());
            }
            other @ Stage::ReadOut { .. } => other,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send_bits(eeprom: &mut Eeprom, bits: &[u8]) {
        let mut raw = eeprom.raw.borrow_mut();
        for &bit in bits {
            raw.write(0, bit).unwrap();
        }
    }

    fn recv_bits(eeprom: &Eeprom, count: usize) -> Vec<u8> {
        let raw = eeprom.raw.borrow();
        (0..count).map(|_| raw.read(0).unwrap()).collect()
    }

    fn bits_of(value: u64, width: u32) -> Vec<u8> {
        (0..width)
            .rev()
            .map(|i| u8::try_from((value >> i) & 1).unwrap())
            .collect()
    }

    #[test]
    fn write_then_read_round_trips_64_bits() {
        let mut eeprom = Eeprom::new(Size::Small, None);
        let addr = 0x12u32;
        let payload = 0xdead_beef_cafe_f00du64;

        let mut write_seq = vec![1, 0];
        write_seq.extend(bits_of(u64::from(addr), 6));
        write_seq.extend(bits_of(payload, 64));
        write_seq.push(0);
        send_bits(&mut eeprom, &write_seq);

        let mut read_seq = vec![1, 1];
        read_seq.extend(bits_of(u64::from(addr), 6));
        read_seq.push(0);
        send_bits(&mut eeprom, &read_seq);

        let out = recv_bits(&eeprom, (DUMMY_BITS + DATA_BITS) as usize);
        let dummy = &out[..DUMMY_BITS as usize];
        assert!(dummy.iter().all(|&b| b == 0));
        let data_bits = &out[DUMMY_BITS as usize..];
        let expected = bits_of(payload, 64);
        assert_eq!(data_bits, expected.as_slice());
    }

    #[test]
    fn blank_eeprom_reads_all_ones() {
        let eeprom = Eeprom::new(Size::Large, None);
        assert!(eeprom.raw.borrow().data.iter().all(|&b| b == 0xff));
    }
}
