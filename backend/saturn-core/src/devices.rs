//! Devices emulated outside of this crate: VDP2, SCU, the cartridge slot, the CD block and the
//! ST-V I/O board
//!
//! Each is reached through a trait so that a full implementation can be plugged in. The open bus
//! implementations let the core boot far enough to exercise the CPUs, SCSP, SMPC and VDP1.

use sh2_emu::interrupts::Interrupt;

/// A memory-mapped device. Addresses are passed through unmasked.
pub trait MappedDevice {
    fn name(&self) -> &'static str;

    fn read_byte(&mut self, address: u32) -> u8;

    fn read_word(&mut self, address: u32) -> u16;

    fn read_longword(&mut self, address: u32) -> u32 {
        (u32::from(self.read_word(address)) << 16) | u32::from(self.read_word(address | 2))
    }

    fn write_byte(&mut self, address: u32, value: u8);

    fn write_word(&mut self, address: u32, value: u16);

    fn write_longword(&mut self, address: u32, value: u32) {
        self.write_word(address, (value >> 16) as u16);
        self.write_word(address | 2, value as u16);
    }

    fn reset(&mut self) {}

    /// Opaque state for the save state chunk owned by this device.
    fn save_state(&self) -> Vec<u8> {
        Vec::new()
    }

    fn load_state(&mut self, _state: &[u8]) {}
}

/// Device with nothing behind it. Reads return 0 and writes are dropped.
#[derive(Debug, Clone, Copy)]
pub struct OpenBus {
    name: &'static str,
}

impl OpenBus {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl MappedDevice for OpenBus {
    fn name(&self) -> &'static str {
        self.name
    }

    fn read_byte(&mut self, address: u32) -> u8 {
        log::debug!("{} byte read {address:08X}", self.name);
        0
    }

    fn read_word(&mut self, address: u32) -> u16 {
        log::debug!("{} word read {address:08X}", self.name);
        0
    }

    fn write_byte(&mut self, address: u32, value: u8) {
        log::debug!("{} byte write {address:08X} {value:02X}", self.name);
    }

    fn write_word(&mut self, address: u32, value: u16) {
        log::debug!("{} word write {address:08X} {value:04X}", self.name);
    }
}

/// Interrupt sources routed through the SCU to the master SH-2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScuInterrupt {
    VBlankIn,
    VBlankOut,
    HBlankIn,
    SoundRequest,
    SystemManager,
    SpriteDrawEnd,
}

impl ScuInterrupt {
    #[must_use]
    pub fn vector(self) -> u8 {
        match self {
            Self::VBlankIn => 0x40,
            Self::VBlankOut => 0x41,
            Self::HBlankIn => 0x42,
            Self::SoundRequest => 0x46,
            Self::SystemManager => 0x47,
            Self::SpriteDrawEnd => 0x4D,
        }
    }

    #[must_use]
    pub fn level(self) -> u8 {
        match self {
            Self::VBlankIn => 0xF,
            Self::VBlankOut => 0xE,
            Self::HBlankIn => 0xD,
            Self::SoundRequest => 0x9,
            Self::SystemManager => 0x8,
            Self::SpriteDrawEnd => 0x2,
        }
    }

    // Bit in the SCU interrupt mask register
    fn mask_bit(self) -> u32 {
        match self {
            Self::VBlankIn => 1 << 0,
            Self::VBlankOut => 1 << 1,
            Self::HBlankIn => 1 << 2,
            Self::SoundRequest => 1 << 6,
            Self::SystemManager => 1 << 7,
            Self::SpriteDrawEnd => 1 << 13,
        }
    }
}

pub trait ScuDevice: MappedDevice {
    /// Raise an interrupt source. Returns the interrupt to deliver to the master SH-2, if the
    /// source is not masked.
    fn raise(&mut self, source: ScuInterrupt) -> Option<Interrupt>;
}

// $25FE00A0: IMS (interrupt mask)
const SCU_IMS_ADDRESS: u32 = 0xA0;

/// Minimal SCU: only the interrupt mask register is implemented.
#[derive(Debug, Clone)]
pub struct BasicScu {
    interrupt_mask: u32,
}

impl BasicScu {
    #[must_use]
    pub fn new() -> Self {
        Self { interrupt_mask: 0xBFFF }
    }
}

impl Default for BasicScu {
    fn default() -> Self {
        Self::new()
    }
}

impl MappedDevice for BasicScu {
    fn name(&self) -> &'static str {
        "SCU"
    }

    fn read_byte(&mut self, address: u32) -> u8 {
        let word = self.read_word(address & !1);
        if address & 1 == 0 { (word >> 8) as u8 } else { word as u8 }
    }

    fn read_word(&mut self, address: u32) -> u16 {
        let value = self.read_longword(address & !3);
        if address & 2 == 0 { (value >> 16) as u16 } else { value as u16 }
    }

    fn read_longword(&mut self, address: u32) -> u32 {
        match address & 0xFF {
            SCU_IMS_ADDRESS => self.interrupt_mask,
            _ => {
                log::debug!("Unhandled SCU read {address:08X}");
                0
            }
        }
    }

    fn write_byte(&mut self, address: u32, value: u8) {
        log::debug!("Unhandled SCU byte write {address:08X} {value:02X}");
    }

    fn write_word(&mut self, address: u32, value: u16) {
        log::debug!("Unhandled SCU word write {address:08X} {value:04X}");
    }

    fn write_longword(&mut self, address: u32, value: u32) {
        match address & 0xFF {
            SCU_IMS_ADDRESS => {
                self.interrupt_mask = value & 0xBFFF;
                log::trace!("SCU IMS write: {value:08X}");
            }
            _ => log::debug!("Unhandled SCU longword write {address:08X} {value:08X}"),
        }
    }

    fn reset(&mut self) {
        self.interrupt_mask = 0xBFFF;
    }

    fn save_state(&self) -> Vec<u8> {
        self.interrupt_mask.to_le_bytes().to_vec()
    }

    fn load_state(&mut self, state: &[u8]) {
        if let Ok(bytes) = state.try_into() {
            self.interrupt_mask = u32::from_le_bytes(bytes);
        }
    }
}

impl ScuDevice for BasicScu {
    fn raise(&mut self, source: ScuInterrupt) -> Option<Interrupt> {
        if self.interrupt_mask & source.mask_bit() != 0 {
            log::trace!("SCU interrupt {source:?} masked");
            return None;
        }

        Some(Interrupt { vector: source.vector(), level: source.level() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn scu_interrupts_respect_mask() {
        let mut scu = BasicScu::new();
        assert_eq!(scu.raise(ScuInterrupt::VBlankIn), None);

        scu.write_longword(0x25FE00A0, 0xBFFE);
        assert_eq!(scu.raise(ScuInterrupt::VBlankIn), Some(Interrupt { vector: 0x40, level: 0xF }));
        assert_eq!(scu.raise(ScuInterrupt::SystemManager), None);
        assert_eq!(scu.read_longword(0x25FE00A0), 0xBFFE);

        let state = scu.save_state();
        scu.reset();
        scu.load_state(&state);
        assert_eq!(scu.read_word(0x25FE00A2), 0xBFFE);
    }
}
