//! BIOS ROM, work RAM and backup RAM

use bincode::{Decode, Encode};
use saturn_common::boxedarray::BoxedByteArray;
use saturn_common::num::{read_u16_be, read_u32_be, write_u16_be, write_u32_be};

pub const BIOS_LEN: usize = 512 * 1024;
pub const WORK_RAM_LEN: usize = 1024 * 1024;

const BIOS_MASK: u32 = (BIOS_LEN - 1) as u32;
const WORK_RAM_MASK: u32 = (WORK_RAM_LEN - 1) as u32;

#[derive(Debug, Clone)]
pub struct Bios(BoxedByteArray<BIOS_LEN>);

impl Bios {
    /// Images shorter than 512KB are mirrored to fill the ROM.
    #[must_use]
    pub fn new(image: &[u8]) -> Self {
        let mut rom = BoxedByteArray::<BIOS_LEN>::new();
        if !image.is_empty() {
            for (i, byte) in rom.iter_mut().enumerate() {
                *byte = image[i % image.len()];
            }
        }
        Self(rom)
    }

    #[inline]
    #[must_use]
    pub fn read_byte(&self, address: u32) -> u8 {
        self.0[(address & BIOS_MASK) as usize]
    }

    #[inline]
    #[must_use]
    pub fn read_word(&self, address: u32) -> u16 {
        read_u16_be(&*self.0, (address & BIOS_MASK & !1) as usize)
    }

    #[inline]
    #[must_use]
    pub fn read_longword(&self, address: u32) -> u32 {
        read_u32_be(&*self.0, (address & BIOS_MASK & !3) as usize)
    }
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct WorkRam(BoxedByteArray<WORK_RAM_LEN>);

impl WorkRam {
    #[must_use]
    pub fn new() -> Self {
        Self(BoxedByteArray::new())
    }

    pub fn clear(&mut self) {
        self.0.fill(0);
    }

    #[inline]
    #[must_use]
    pub fn read_byte(&self, address: u32) -> u8 {
        self.0[(address & WORK_RAM_MASK) as usize]
    }

    #[inline]
    #[must_use]
    pub fn read_word(&self, address: u32) -> u16 {
        read_u16_be(&*self.0, (address & WORK_RAM_MASK & !1) as usize)
    }

    #[inline]
    #[must_use]
    pub fn read_longword(&self, address: u32) -> u32 {
        read_u32_be(&*self.0, (address & WORK_RAM_MASK & !3) as usize)
    }

    #[inline]
    pub fn write_byte(&mut self, address: u32, value: u8) {
        self.0[(address & WORK_RAM_MASK) as usize] = value;
    }

    #[inline]
    pub fn write_word(&mut self, address: u32, value: u16) {
        write_u16_be(&mut *self.0, (address & WORK_RAM_MASK & !1) as usize, value);
    }

    #[inline]
    pub fn write_longword(&mut self, address: u32, value: u32) {
        write_u32_be(&mut *self.0, (address & WORK_RAM_MASK & !3) as usize, value);
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &*self.0
    }
}

/// Battery-backed RAM. Only odd bus addresses are connected, so each stored byte occupies two
/// bytes of address space.
#[derive(Debug, Clone, Encode, Decode)]
pub struct BackupRam {
    data: Vec<u8>,
    dirty: bool,
}

// Header the BIOS expects at the start of a formatted backup RAM, repeated to fill 64 bytes
const FORMAT_HEADER: &[u8; 16] = b"BackUpRam Format";

impl BackupRam {
    #[must_use]
    pub fn new(len: usize, initial: Option<&[u8]>) -> Self {
        let data = match initial {
            Some(initial) if initial.len() == len => initial.to_vec(),
            Some(initial) => {
                log::warn!(
                    "Backup RAM image is {} bytes, expected {len}; formatting a new one",
                    initial.len()
                );
                Self::formatted(len)
            }
            None => Self::formatted(len),
        };
        Self { data, dirty: false }
    }

    fn formatted(len: usize) -> Vec<u8> {
        let mut data = vec![0; len];
        for (i, byte) in data.iter_mut().take(4 * FORMAT_HEADER.len()).enumerate() {
            *byte = FORMAT_HEADER[i % FORMAT_HEADER.len()];
        }
        data
    }

    fn address_mask(&self) -> u32 {
        ((self.data.len() << 1) - 1) as u32
    }

    #[must_use]
    pub fn read_byte(&self, address: u32) -> u8 {
        let address = address & self.address_mask();
        if address & 1 != 0 { self.data[(address >> 1) as usize] } else { 0xFF }
    }

    #[must_use]
    pub fn read_word(&self, address: u32) -> u16 {
        u16::from(self.read_byte(address | 1)) << 8
    }

    /// Combines the two bytes with a logical OR, so the result is always 0 or 1.
    #[must_use]
    pub fn read_longword(&self, address: u32) -> u32 {
        let high = u32::from(self.read_byte(address | 1)) << 8;
        let low = u32::from(self.read_byte(address | 3)) << 16;
        u32::from(high != 0 || low != 0)
    }

    pub fn write_byte(&mut self, address: u32, value: u8) {
        let address = address & self.address_mask();
        if address & 1 != 0 {
            self.data[(address >> 1) as usize] = value;
            self.dirty = true;
        }
    }

    pub fn write_word(&mut self, address: u32, value: u16) {
        self.write_byte(address | 1, (value >> 8) as u8);
    }

    pub fn write_longword(&mut self, address: u32, value: u32) {
        self.write_byte(address | 1, (value >> 8) as u8);
        self.write_byte(address | 3, (value >> 24) as u8);
    }

    #[must_use]
    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    /// Returns whether the RAM was written since the last call.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn short_bios_is_mirrored() {
        let bios = Bios::new(&[0x12, 0x34, 0x56, 0x78]);
        assert_eq!(bios.read_longword(0x0007FFFC), 0x12345678);
        assert_eq!(bios.read_word(0x20000002), 0x5678);
    }

    #[test]
    fn work_ram_mirrors_every_megabyte() {
        let mut ram = WorkRam::new();
        ram.write_longword(0x06000010, 0xDEADBEEF);
        assert_eq!(ram.read_longword(0x06100010), 0xDEADBEEF);
        assert_eq!(ram.read_byte(0x06000013), 0xEF);
        assert_eq!(ram.read_word(0x06000012), 0xBEEF);
    }

    #[test]
    fn backup_ram_uses_odd_addresses() {
        let mut ram = BackupRam::new(0x8000, None);
        assert_eq!(&ram.contents()[..16], FORMAT_HEADER);

        ram.write_byte(0x00180101, 0x5A);
        assert_eq!(ram.read_byte(0x00180101), 0x5A);
        assert_eq!(ram.read_byte(0x00180100), 0xFF);
        assert_eq!(ram.contents()[0x80], 0x5A);
        assert!(ram.take_dirty());
        assert!(!ram.take_dirty());

        // Even-address writes are dropped
        ram.write_byte(0x00180102, 0x77);
        assert!(!ram.take_dirty());

        ram.write_word(0x00180200, 0xAB00);
        assert_eq!(ram.read_word(0x00180200), 0xAB00);
    }

    #[test]
    fn backup_ram_long_reads_are_boolean() {
        let mut ram = BackupRam::new(0x8000, Some(&[0; 0x8000]));
        assert_eq!(ram.read_longword(0x00180400), 0);

        ram.write_longword(0x00180400, 0x11223344);
        assert_eq!(ram.read_byte(0x00180401), 0x33);
        assert_eq!(ram.read_byte(0x00180403), 0x11);
        assert_eq!(ram.read_longword(0x00180400), 1);
    }
}
