//! SH-2 address space decoding
//!
//! Address bits 29-31 select the access mode:
//! - 0: cached access to the external bus
//! - 1: cache-through access to the external bus (also mirrored at 5)
//! - 2: associative purge
//! - 3: cache address array
//! - 6: cache data array
//! - 7: on-chip peripheral registers at $FFFFFE00 and above

use crate::Sh2;
use crate::bus::BusInterface;

const ONCHIP_BASE: u32 = 0xFFFFFE00;

impl Sh2 {
    /// Returns the cache way holding `address`, filling the line on a miss when replacement is
    /// allowed. `None` means the access should go straight to the bus.
    fn cached_way(
        &mut self,
        address: u32,
        instruction: bool,
        bus: &mut dyn BusInterface,
    ) -> Option<usize> {
        if !self.cache.enabled() || !bus.is_cacheable(address) {
            return None;
        }

        if let Some(way) = self.cache.lookup(address) {
            return Some(way);
        }

        if !self.cache.should_replace(instruction) {
            return None;
        }

        let way = self.cache.replace(address, bus, &mut self.cycles);
        self.write_notify(address & !0xF, 16);
        Some(way)
    }

    fn unmapped_read(&self, width: &str, address: u32) {
        log::warn!("[{}] Unmapped {width} read {address:08X}", self.name());
    }

    fn unmapped_write(&self, width: &str, address: u32, value: u32) {
        log::warn!("[{}] Unmapped {width} write {address:08X} {value:08X}", self.name());
    }

    pub(crate) fn fetch_instruction(&mut self, pc: u32, bus: &mut dyn BusInterface) -> u16 {
        if pc >> 29 == 0 {
            if let Some(way) = self.cached_way(pc, true, bus) {
                return self.cache.read_u16(way, pc);
            }
        }

        self.read_word(pc, bus)
    }

    pub(crate) fn read_byte(&mut self, address: u32, bus: &mut dyn BusInterface) -> u8 {
        match address >> 29 {
            0 => match self.cached_way(address, false, bus) {
                Some(way) => self.cache.read_u8(way, address),
                None => bus.read_byte(address, Some(&mut self.cycles)),
            },
            1 | 5 => bus.read_byte(address, Some(&mut self.cycles)),
            2 => 0xFF,
            6 => self.cache.read_data_array_u8(address),
            7 if address >= ONCHIP_BASE => self.onchip_read_byte(address & 0x1FF),
            _ => {
                self.unmapped_read("byte", address);
                0
            }
        }
    }

    pub(crate) fn read_word(&mut self, address: u32, bus: &mut dyn BusInterface) -> u16 {
        match address >> 29 {
            0 => match self.cached_way(address, false, bus) {
                Some(way) => self.cache.read_u16(way, address),
                None => bus.read_word(address, Some(&mut self.cycles)),
            },
            1 | 5 => bus.read_word(address, Some(&mut self.cycles)),
            2 => 0xFFFF,
            6 => self.cache.read_data_array_u16(address),
            7 if address >= ONCHIP_BASE => self.onchip_read_word(address & 0x1FF),
            _ => {
                self.unmapped_read("word", address);
                0
            }
        }
    }

    pub(crate) fn read_longword(&mut self, address: u32, bus: &mut dyn BusInterface) -> u32 {
        match address >> 29 {
            0 => match self.cached_way(address, false, bus) {
                Some(way) => self.cache.read_u32(way, address),
                None => bus.read_longword(address, Some(&mut self.cycles)),
            },
            1 | 5 => bus.read_longword(address, Some(&mut self.cycles)),
            2 => 0xFFFFFFFF,
            3 => self.cache.read_address_array(address),
            6 => self.cache.read_data_array_u32(address),
            7 if address >= ONCHIP_BASE => self.onchip_read_longword(address & 0x1FF),
            _ => {
                self.unmapped_read("longword", address);
                0
            }
        }
    }

    pub(crate) fn write_byte(&mut self, address: u32, value: u8, bus: &mut dyn BusInterface) {
        match address >> 29 {
            0 | 1 | 5 => {
                if address >> 29 == 0 && self.cache.enabled() {
                    self.cache.write_through_u8(address, value);
                }
                bus.write_byte(address, value, Some(&mut self.cycles));
                self.write_notify(address, 1);
            }
            2 => self.cache.purge(address),
            6 => self.cache.write_data_array_u8(address, value),
            7 if address >= ONCHIP_BASE => self.onchip_write_byte(address & 0x1FF, value),
            _ => self.unmapped_write("byte", address, value.into()),
        }
    }

    pub(crate) fn write_word(&mut self, address: u32, value: u16, bus: &mut dyn BusInterface) {
        match address >> 29 {
            0 | 1 | 5 => {
                if address >> 29 == 0 && self.cache.enabled() {
                    self.cache.write_through_u16(address, value);
                }
                bus.write_word(address, value, Some(&mut self.cycles));
                self.write_notify(address, 2);
            }
            2 => self.cache.purge(address),
            6 => self.cache.write_data_array_u16(address, value),
            7 if address >= ONCHIP_BASE => self.onchip_write_word(address & 0x1FF, value),
            _ => self.unmapped_write("word", address, value.into()),
        }
    }

    pub(crate) fn write_longword(&mut self, address: u32, value: u32, bus: &mut dyn BusInterface) {
        match address >> 29 {
            0 | 1 | 5 => {
                if address >> 29 == 0 && self.cache.enabled() {
                    self.cache.write_through_u32(address, value);
                }
                bus.write_longword(address, value, Some(&mut self.cycles));
                self.write_notify(address, 4);
            }
            2 => self.cache.purge(address),
            3 => self.cache.write_address_array(address, value),
            6 => self.cache.write_data_array_u32(address, value),
            7 if address >= ONCHIP_BASE => self.onchip_write_longword(address & 0x1FF, value, bus),
            _ => self.unmapped_write("longword", address, value),
        }
    }
}
