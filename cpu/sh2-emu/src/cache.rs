//! SH7604 on-chip cache
//!
//! 4KB split into 64 lines of 4 ways × 16 bytes. Replacement uses the 6-bit pseudo-LRU scheme from
//! the hardware manual. In two-way mode only ways 2 and 3 cache; ways 0 and 1 are left to be used
//! as on-chip RAM through the data array.
//!
//! The cache is write-through: a write updates a hit line and always reaches the bus. Misses on
//! reads fill the whole line from the bus, charging the accessing CPU for the four longword reads.

use crate::bus::BusInterface;
use bincode::{Decode, Encode};
use saturn_common::boxedarray::BoxedByteArray;
use saturn_common::num::GetBit;
use std::array;

const DATA_ARRAY_LEN: usize = 4 * 1024;
const LINES: usize = 64;
const LINE_LEN: u32 = 16;

// LRU bit meanings (a set bit means the second way was used more recently):
//   bit 5: 0/1, bit 4: 0/2, bit 3: 0/3, bit 2: 1/2, bit 1: 1/3, bit 0: 2/3
const LRU_AND_MASKS: [u8; 4] = [!0b111000, !0b000110, !0b000001, !0b000000];
const LRU_OR_MASKS: [u8; 4] = [0b000000, 0b100000, 0b010100, 0b001011];

const fn four_way_victim(lru: u8) -> u8 {
    if lru & 0b111000 == 0b111000 {
        0
    } else if lru & 0b100110 == 0b000110 {
        1
    } else if lru & 0b010101 == 0b000001 {
        2
    } else if lru & 0b001011 == 0b000000 {
        3
    } else {
        // Unreachable through normal replacement, only via address array writes
        0
    }
}

const FOUR_WAY_VICTIMS: [u8; 64] = {
    let mut table = [0; 64];
    let mut lru = 0;
    while lru < 64 {
        table[lru] = four_way_victim(lru as u8);
        lru += 1;
    }
    table
};

saturn_common::define_bit_enum!(CacheMode, [FourWay, TwoWay]);

impl CacheMode {
    fn ways(self) -> std::ops::Range<usize> {
        match self {
            Self::FourWay => 0..4,
            Self::TwoWay => 2..4,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Encode, Decode)]
struct CacheLine {
    // Address bits 10-28 of the cached data, one per way
    tags: [u32; 4],
    // One valid bit per way
    valid: u8,
    lru: u8,
}

impl CacheLine {
    fn way_valid(&self, way: usize) -> bool {
        self.valid.bit(way as u8)
    }

    fn touch(&mut self, way: usize) {
        self.lru = (self.lru & LRU_AND_MASKS[way]) | LRU_OR_MASKS[way];
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct CpuCache {
    data: BoxedByteArray<DATA_ARRAY_LEN>,
    lines: Box<[CacheLine; LINES]>,
    // $FFFFFE92: CCR (Cache control register)
    ccr: u8,
}

impl CpuCache {
    pub fn new() -> Self {
        Self {
            data: BoxedByteArray::new(),
            lines: Box::new(array::from_fn(|_| CacheLine::default())),
            ccr: 0,
        }
    }

    pub fn enabled(&self) -> bool {
        self.ccr.bit(0)
    }

    pub fn mode(&self) -> CacheMode {
        CacheMode::from_bit(self.ccr.bit(3))
    }

    /// Whether a miss should fill a line. Instruction and data replacement can be disabled
    /// separately through CCR bits 1 and 2.
    pub fn should_replace(&self, instruction: bool) -> bool {
        let disable_bit = if instruction { 1 } else { 2 };
        self.enabled() && !self.ccr.bit(disable_bit)
    }

    pub fn ccr(&self) -> u8 {
        self.ccr
    }

    /// Store a CCR value. Returns true if the write requested a purge (bit 4), which the caller
    /// performs through [`Self::invalidate_all`] so that execution cores can be notified.
    pub fn write_ccr(&mut self, value: u8) -> bool {
        // CP always reads back as 0
        self.ccr = value & 0xCF;

        log::trace!("CCR write: {value:02X}");
        log::trace!("  Address array way: {}", value >> 6);
        log::trace!("  Mode: {:?}", CacheMode::from_bit(value.bit(3)));
        log::trace!("  Purge: {}", value.bit(4));
        log::trace!("  Data replacement disabled: {}", value.bit(2));
        log::trace!("  Instruction replacement disabled: {}", value.bit(1));
        log::trace!("  Enabled: {}", value.bit(0));

        value.bit(4)
    }

    /// Clear every tag, valid bit and LRU state without touching the data array.
    pub fn invalidate_all(&mut self) {
        for line in self.lines.iter_mut() {
            *line = CacheLine::default();
        }
    }

    /// Returns the hit way for `address`, updating LRU state on a hit.
    pub fn lookup(&mut self, address: u32) -> Option<usize> {
        let line_idx = line_index(address);
        let tag = tag(address);
        let mode = self.mode();

        let line = &mut self.lines[line_idx];
        let way = mode.ways().find(|&way| line.way_valid(way) && line.tags[way] == tag)?;
        line.touch(way);

        Some(way)
    }

    /// Fill the line containing `address` from the bus and return the way it was placed in.
    pub fn replace(&mut self, address: u32, bus: &mut dyn BusInterface, cycles: &mut u32) -> usize {
        let line_idx = line_index(address);
        let lru = self.lines[line_idx].lru;
        let way = match self.mode() {
            CacheMode::FourWay => usize::from(FOUR_WAY_VICTIMS[usize::from(lru & 0x3F)]),
            CacheMode::TwoWay => {
                if lru.bit(0) {
                    2
                } else {
                    3
                }
            }
        };

        let base = address & !(LINE_LEN - 1);
        let data_addr = data_index(way, line_idx);
        for i in 0..4 {
            let longword = bus.read_longword(base + 4 * i, Some(&mut *cycles));
            let offset = data_addr + 4 * i as usize;
            self.data[offset..offset + 4].copy_from_slice(&longword.to_be_bytes());
        }

        let line = &mut self.lines[line_idx];
        line.tags[way] = tag(address);
        line.valid |= 1 << way;
        line.touch(way);

        way
    }

    pub fn read_u8(&self, way: usize, address: u32) -> u8 {
        self.data[data_index(way, line_index(address)) | (address & 0xF) as usize]
    }

    pub fn read_u16(&self, way: usize, address: u32) -> u16 {
        let idx = data_index(way, line_index(address)) | (address & 0xE) as usize;
        u16::from_be_bytes([self.data[idx], self.data[idx + 1]])
    }

    pub fn read_u32(&self, way: usize, address: u32) -> u32 {
        let idx = data_index(way, line_index(address)) | (address & 0xC) as usize;
        u32::from_be_bytes([
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ])
    }

    pub fn write_through_u8(&mut self, address: u32, value: u8) {
        if let Some(way) = self.lookup(address) {
            let idx = data_index(way, line_index(address)) | (address & 0xF) as usize;
            self.data[idx] = value;
        }
    }

    pub fn write_through_u16(&mut self, address: u32, value: u16) {
        if let Some(way) = self.lookup(address) {
            let idx = data_index(way, line_index(address)) | (address & 0xE) as usize;
            self.data[idx..idx + 2].copy_from_slice(&value.to_be_bytes());
        }
    }

    pub fn write_through_u32(&mut self, address: u32, value: u32) {
        if let Some(way) = self.lookup(address) {
            let idx = data_index(way, line_index(address)) | (address & 0xC) as usize;
            self.data[idx..idx + 4].copy_from_slice(&value.to_be_bytes());
        }
    }

    // $4xxxxxxx: associative purge
    pub fn purge(&mut self, address: u32) {
        let tag = tag(address);
        let line = &mut self.lines[line_index(address)];
        for way in 0..4 {
            if line.tags[way] == tag {
                line.valid &= !(1 << way);
            }
        }
        line.lru = 0;
    }

    // $6xxxxxxx: address array, way selected by CCR bits 6-7
    pub fn read_address_array(&self, address: u32) -> u32 {
        let line = &self.lines[line_index(address)];
        let way = usize::from(self.ccr >> 6);

        (line.tags[way] << 10)
            | (u32::from(line.lru & 0x3F) << 4)
            | (u32::from(line.way_valid(way)) << 2)
    }

    pub fn write_address_array(&mut self, address: u32, value: u32) {
        let way = usize::from(self.ccr >> 6);
        let line = &mut self.lines[line_index(address)];

        line.lru = ((value >> 4) & 0x3F) as u8;
        if address.bit(2) {
            line.tags[way] = tag(address);
            line.valid |= 1 << way;
        } else {
            line.valid &= !(1 << way);
        }
    }

    // $Cxxxxxxx: data array
    pub fn read_data_array_u8(&self, address: u32) -> u8 {
        self.data[data_array_index(address)]
    }

    pub fn read_data_array_u16(&self, address: u32) -> u16 {
        let idx = data_array_index(address) & !1;
        u16::from_be_bytes([self.data[idx], self.data[idx + 1]])
    }

    pub fn read_data_array_u32(&self, address: u32) -> u32 {
        let idx = data_array_index(address) & !3;
        u32::from_be_bytes([
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ])
    }

    pub fn write_data_array_u8(&mut self, address: u32, value: u8) {
        self.data[data_array_index(address)] = value;
    }

    pub fn write_data_array_u16(&mut self, address: u32, value: u16) {
        let idx = data_array_index(address) & !1;
        self.data[idx..idx + 2].copy_from_slice(&value.to_be_bytes());
    }

    pub fn write_data_array_u32(&mut self, address: u32, value: u32) {
        let idx = data_array_index(address) & !3;
        self.data[idx..idx + 4].copy_from_slice(&value.to_be_bytes());
    }
}

impl Default for CpuCache {
    fn default() -> Self {
        Self::new()
    }
}

fn line_index(address: u32) -> usize {
    ((address >> 4) & 0x3F) as usize
}

fn tag(address: u32) -> u32 {
    (address & 0x1FFFFFFF) >> 10
}

fn data_index(way: usize, line_idx: usize) -> usize {
    (way << 10) | (line_idx << 4)
}

fn data_array_index(address: u32) -> usize {
    (address as usize) & (DATA_ARRAY_LEN - 1)
}
