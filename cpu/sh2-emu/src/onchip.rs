//! On-chip register dispatch for $FFFFFE00-$FFFFFFFF
//!
//! Addresses passed in here are already masked to the low 9 bits. Registers that only accept a
//! particular access width log and ignore accesses of other widths, as do unmapped addresses.

use crate::Sh2;
use crate::bus::BusInterface;
use bincode::{Decode, Encode};

// $FFFFFFE0-$FFFFFFFB: bus state controller
#[derive(Debug, Clone, Encode, Decode)]
pub struct BusStateController {
    // BCR1 bit 15 (MASTER) reflects the CPU's role and is not writable
    pub bcr1: u16,
    pub bcr2: u16,
    pub wcr: u16,
    pub mcr: u16,
    pub rtcsr: u16,
    pub rtcnt: u16,
    pub rtcor: u16,
}

impl BusStateController {
    pub fn new(slave: bool) -> Self {
        Self {
            bcr1: (u16::from(slave) << 15) | 0x03F0,
            bcr2: 0x00FC,
            wcr: 0xAAFF,
            mcr: 0x0000,
            rtcsr: 0x0000,
            rtcnt: 0x0000,
            rtcor: 0x0000,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.bcr1 & 0x8000 != 0);
    }

    fn read(&self, address: u32) -> Option<u16> {
        let value = match address & !3 {
            0x1E0 => self.bcr1,
            0x1E4 => self.bcr2,
            0x1E8 => self.wcr,
            0x1EC => self.mcr,
            0x1F0 => self.rtcsr,
            0x1F4 => self.rtcnt,
            0x1F8 => self.rtcor,
            _ => return None,
        };
        Some(value)
    }

    fn write(&mut self, address: u32, value: u32) -> bool {
        let value = value as u16;
        match address {
            0x1E0 => self.bcr1 = (self.bcr1 & 0x8000) | (value & 0x1FF7),
            0x1E4 => self.bcr2 = value & 0x00FC,
            0x1E8 => self.wcr = value,
            0x1EC => self.mcr = value & 0xFEFC,
            0x1F0 => self.rtcsr = value & 0x00F8,
            0x1F4 => self.rtcnt = value & 0x00FF,
            0x1F8 => self.rtcor = value & 0x00FF,
            _ => return false,
        }
        true
    }
}

// $FFFFFF40-$FFFFFF78: user break controller. Registers are stored but break conditions are not
// evaluated; the debugger provides its own breakpoints.
#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct UserBreakController {
    pub bara: u32,
    pub bamra: u32,
    pub bbra: u16,
    pub barb: u32,
    pub bamrb: u32,
    pub bbrb: u16,
    pub bdrb: u32,
    pub bdmrb: u32,
    pub brcr: u16,
}

impl UserBreakController {
    fn read_word(&self, address: u32) -> Option<u16> {
        match address {
            0x148 => Some(self.bbra),
            0x168 => Some(self.bbrb),
            0x178 => Some(self.brcr),
            _ => None,
        }
    }

    fn read_longword(&self, address: u32) -> Option<u32> {
        match address {
            0x140 => Some(self.bara),
            0x144 => Some(self.bamra),
            0x160 => Some(self.barb),
            0x164 => Some(self.bamrb),
            0x170 => Some(self.bdrb),
            0x174 => Some(self.bdmrb),
            _ => self.read_word(address).map(u32::from),
        }
    }

    fn write_word(&mut self, address: u32, value: u16) -> bool {
        match address {
            0x148 => self.bbra = value & 0x00FF,
            0x168 => self.bbrb = value & 0x00FF,
            0x178 => self.brcr = value & 0xF4DC,
            _ => return false,
        }
        true
    }

    fn write_longword(&mut self, address: u32, value: u32) -> bool {
        match address {
            0x140 => self.bara = value,
            0x144 => self.bamra = value,
            0x160 => self.barb = value,
            0x164 => self.bamrb = value,
            0x170 => self.bdrb = value,
            0x174 => self.bdmrb = value,
            _ => return self.write_word(address, value as u16),
        }
        true
    }
}

fn is_frt_address(address: u32) -> bool {
    (0x10..=0x19).contains(&address)
}

impl Sh2 {
    fn catch_up_frt(&mut self) {
        self.frt.catch_up(self.cycles, &self.intc, &mut self.interrupts);
    }

    fn unhandled_onchip_read(&self, width: &str, address: u32) {
        log::debug!(
            "[{}] Unhandled on-chip {width} read {:08X}",
            self.name(),
            0xFFFFFE00 | address
        );
    }

    fn unhandled_onchip_write(&self, width: &str, address: u32, value: u32) {
        log::debug!(
            "[{}] Unhandled on-chip {width} write {:08X} {value:08X}",
            self.name(),
            0xFFFFFE00 | address
        );
    }

    pub(crate) fn onchip_read_byte(&mut self, address: u32) -> u8 {
        if is_frt_address(address) {
            self.catch_up_frt();
            return self.frt.read_byte(address);
        }

        let value = match address {
            0x00..=0x05 => self.sci.read_byte(address),
            0x71 | 0x72 => self.dmac.read_byte(address),
            0x80..=0x83 => self.wdt.read_byte(address),
            // SBYCR
            0x91 => Some(self.sbycr),
            // CCR
            0x92 => Some(self.cache.ccr()),
            _ => self.intc.read_byte(address),
        };

        value.unwrap_or_else(|| {
            self.unhandled_onchip_read("byte", address);
            0
        })
    }

    pub(crate) fn onchip_read_word(&mut self, address: u32) -> u16 {
        if is_frt_address(address) {
            self.catch_up_frt();
            if let Some(value) = self.frt.read_word(address) {
                return value;
            }
        }

        let value = match address {
            0x60..=0x69 | 0xE0..=0xE5 => self.intc.read_word(address),
            0x140..=0x17F => self.ubc.read_word(address),
            // Word reads of BSC registers return the low half
            0x1E2 | 0x1E6 | 0x1EA | 0x1EE | 0x1F2 | 0x1F6 | 0x1FA => self.bsc.read(address),
            _ => None,
        };

        value.unwrap_or_else(|| {
            self.unhandled_onchip_read("word", address);
            0
        })
    }

    pub(crate) fn onchip_read_longword(&mut self, address: u32) -> u32 {
        let value = match address {
            0x100..=0x13F => self.divu.read_longword(address),
            0x140..=0x17F => self.ubc.read_longword(address),
            0x180..=0x1BF => self.dmac.read_longword(address),
            0x1E0..=0x1FB => self.bsc.read(address).map(u32::from),
            _ => None,
        };

        value.unwrap_or_else(|| {
            self.unhandled_onchip_read("longword", address);
            0
        })
    }

    pub(crate) fn onchip_write_byte(&mut self, address: u32, value: u8) {
        if is_frt_address(address) {
            self.catch_up_frt();
            self.frt.write_byte(address, value, self.cycles, &self.intc, &mut self.interrupts);
            return;
        }

        let handled = match address {
            0x00..=0x05 => self.sci.write_byte(address, value),
            0x71 | 0x72 => self.dmac.write_byte(address, value),
            0x91 => {
                self.sbycr = value & 0xDF;
                log::trace!("[{}] SBYCR write: {value:02X}", self.name());
                true
            }
            0x92 => {
                self.write_ccr(value);
                true
            }
            _ => self.intc.write_byte(address, value),
        };

        if !handled {
            self.unhandled_onchip_write("byte", address, value.into());
        }
    }

    pub(crate) fn onchip_write_word(&mut self, address: u32, value: u16) {
        if is_frt_address(address) {
            // 16-bit FRT registers are written high byte first through the TEMP register
            let [msb, lsb] = value.to_be_bytes();
            self.onchip_write_byte(address & !1, msb);
            self.onchip_write_byte(address | 1, lsb);
            return;
        }

        let handled = match address {
            0x80 | 0x82 => {
                self.wdt.write_word(address, value, &mut self.sbycr);
                true
            }
            0x108 | 0x128 => {
                self.divu.dvcr = u32::from(value & 0x3);
                true
            }
            0x140..=0x17F => self.ubc.write_word(address, value),
            _ => self.intc.write_word(address, value),
        };

        if !handled {
            self.unhandled_onchip_write("word", address, value.into());
        }
    }

    pub(crate) fn onchip_write_longword(
        &mut self,
        address: u32,
        value: u32,
        bus: &mut dyn BusInterface,
    ) {
        let handled = match address {
            0x010 => {
                self.catch_up_frt();
                self.frt.write_tier(value as u8);
                true
            }
            0x060 => {
                self.intc.iprb = (value as u16) & 0xFF00;
                true
            }
            0x100..=0x13F => {
                if self.divu.write_longword(address, value) {
                    self.interrupts.send(self.divu.vector(), self.intc.divu_level());
                }
                true
            }
            0x140..=0x17F => self.ubc.write_longword(address, value),
            0x180..=0x1BF => self.write_dma_register(address, value, bus),
            0x1E0..=0x1FB => self.bsc.write(address, value),
            _ => false,
        };

        if !handled {
            self.unhandled_onchip_write("longword", address, value);
        }
    }

    // $FFFFFE92: CCR (Cache control register)
    fn write_ccr(&mut self, value: u8) {
        let was_enabled = self.cache.enabled();
        let purge = self.cache.write_ccr(value);

        // Turning the cache off also drops its contents
        if purge || (was_enabled && !self.cache.enabled()) {
            self.cache.invalidate_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn bsc_masks_and_master_bit() {
        let mut bsc = BusStateController::new(true);
        assert_eq!(bsc.bcr1, 0x83F0);

        assert!(bsc.write(0x1E0, 0xA55A_FFFF));
        assert_eq!(bsc.bcr1, 0x8000 | 0x1FF7);
        assert!(bsc.write(0x1EC, 0xA55A_FFFF));
        assert_eq!(bsc.mcr, 0xFEFC);
        assert_eq!(bsc.read(0x1EE), Some(0xFEFC));

        bsc.reset();
        assert_eq!(bsc.bcr1, 0x83F0);
        assert_eq!(bsc.wcr, 0xAAFF);
    }

    #[test]
    fn ubc_write_masks() {
        let mut ubc = UserBreakController::default();
        assert!(ubc.write_word(0x178, 0xFFFF));
        assert_eq!(ubc.brcr, 0xF4DC);
        assert!(ubc.write_longword(0x148, 0x1234));
        assert_eq!(ubc.read_longword(0x148), Some(0x34));
        assert!(!ubc.write_word(0x14A, 0));
    }
}
