//! Pending interrupt queue
//!
//! The SH7604 interrupt controller only reports the highest-priority request, but devices raise
//! and retract requests independently, so pending requests are kept as a queue ordered by level.

use bincode::{Decode, Encode};

pub const MAX_INTERRUPTS: usize = 50;

// NMI is level 16 so that it is accepted regardless of the SR interrupt mask
pub const NMI_VECTOR: u8 = 0x0B;
pub const NMI_LEVEL: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct Interrupt {
    pub vector: u8,
    pub level: u8,
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct InterruptQueue {
    // Sorted by descending level; at most one entry per vector
    pending: Vec<Interrupt>,
}

impl InterruptQueue {
    pub fn new() -> Self {
        Self { pending: Vec::with_capacity(MAX_INTERRUPTS) }
    }

    pub fn send(&mut self, vector: u8, level: u8) {
        if self.pending.iter().any(|interrupt| interrupt.vector == vector) {
            return;
        }

        if self.pending.len() == MAX_INTERRUPTS {
            log::warn!("Interrupt queue full, dropping vector {vector:02X} level {level}");
            return;
        }

        // Insert after any existing entries of the same level so equal-level requests are FIFO
        let idx = self.pending.partition_point(|interrupt| interrupt.level >= level);
        self.pending.insert(idx, Interrupt { vector, level });
    }

    pub fn remove(&mut self, vector: u8, level: u8) {
        self.pending.retain(|interrupt| !(interrupt.vector == vector && interrupt.level == level));
    }

    pub fn highest(&self) -> Option<Interrupt> {
        self.pending.first().copied()
    }

    pub fn pop_highest(&mut self) -> Option<Interrupt> {
        (!self.pending.is_empty()).then(|| self.pending.remove(0))
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn as_slice(&self) -> &[Interrupt] {
        &self.pending
    }

    pub fn replace(&mut self, interrupts: &[Interrupt]) {
        self.clear();
        for interrupt in interrupts {
            self.send(interrupt.vector, interrupt.level);
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

// $FFFFFE60-$FFFFFE69 and $FFFFFEE0-$FFFFFEE5: interrupt controller priority and vector registers
#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct InterruptControl {
    // ICR: bit 15 is the NMI input level, bits 8 and 0 are NMIE and VECMD
    pub icr: u16,
    // IPRA: DIVU [15:12], DMAC [11:8], WDT [7:4]
    pub ipra: u16,
    // IPRB: SCI [15:12], FRT [11:8]
    pub iprb: u16,
    pub vcra: u16,
    pub vcrb: u16,
    // VCRC: FRT input capture [14:8], output compare [6:0]
    pub vcrc: u16,
    // VCRD: FRT overflow [14:8]
    pub vcrd: u16,
    // VCRWDT: WDT interval [14:8], BSC compare match [6:0]
    pub vcrwdt: u16,
}

impl InterruptControl {
    pub fn divu_level(&self) -> u8 {
        ((self.ipra >> 12) & 0xF) as u8
    }

    pub fn dmac_level(&self) -> u8 {
        ((self.ipra >> 8) & 0xF) as u8
    }

    pub fn wdt_level(&self) -> u8 {
        ((self.ipra >> 4) & 0xF) as u8
    }

    pub fn frt_level(&self) -> u8 {
        ((self.iprb >> 8) & 0xF) as u8
    }

    pub fn frt_input_capture_vector(&self) -> u8 {
        ((self.vcrc >> 8) & 0x7F) as u8
    }

    pub fn frt_compare_vector(&self) -> u8 {
        (self.vcrc & 0x7F) as u8
    }

    pub fn frt_overflow_vector(&self) -> u8 {
        ((self.vcrd >> 8) & 0x7F) as u8
    }

    pub fn wdt_vector(&self) -> u8 {
        ((self.vcrwdt >> 8) & 0x7F) as u8
    }

    pub fn read_byte(&self, address: u32) -> Option<u8> {
        let value = match address {
            0x060 => (self.iprb >> 8) as u8,
            0x062 => (self.vcra >> 8) as u8,
            0x063 => self.vcra as u8,
            0x064 => (self.vcrb >> 8) as u8,
            0x065 => self.vcrb as u8,
            0x066 => (self.vcrc >> 8) as u8,
            0x067 => self.vcrc as u8,
            0x068 => (self.vcrd >> 8) as u8,
            0x0E0 => (self.icr >> 8) as u8,
            0x0E1 => self.icr as u8,
            0x0E2 => (self.ipra >> 8) as u8,
            0x0E3 => self.ipra as u8,
            0x0E4 => (self.vcrwdt >> 8) as u8,
            0x0E5 => self.vcrwdt as u8,
            _ => return None,
        };
        Some(value)
    }

    pub fn read_word(&self, address: u32) -> Option<u16> {
        let value = match address {
            0x060 => self.iprb,
            0x062 => self.vcra,
            0x064 => self.vcrb,
            0x066 => self.vcrc,
            0x068 => self.vcrd,
            0x0E0 => self.icr,
            0x0E2 => self.ipra,
            0x0E4 => self.vcrwdt,
            _ => return None,
        };
        Some(value)
    }

    /// Returns false if the address is not an interrupt controller register.
    pub fn write_byte(&mut self, address: u32, value: u8) -> bool {
        let value16 = u16::from(value);
        match address {
            0x060 => self.iprb = value16 << 8,
            // IPRB low byte and VCRD low byte are reserved
            0x061 | 0x069 => {}
            0x062 => self.vcra = ((value16 & 0x7F) << 8) | (self.vcra & 0x00FF),
            0x063 => self.vcra = (self.vcra & 0xFF00) | (value16 & 0x7F),
            0x064 => self.vcrb = ((value16 & 0x7F) << 8) | (self.vcrb & 0x00FF),
            0x065 => self.vcrb = (self.vcrb & 0xFF00) | (value16 & 0x7F),
            0x066 => self.vcrc = ((value16 & 0x7F) << 8) | (self.vcrc & 0x00FF),
            0x067 => self.vcrc = (self.vcrc & 0xFF00) | (value16 & 0x7F),
            0x068 => self.vcrd = (value16 & 0x7F) << 8,
            0x0E0 => self.icr = ((value16 & 0x1) << 8) | (self.icr & 0xFEFF),
            0x0E1 => self.icr = (self.icr & 0xFFFE) | (value16 & 0x1),
            0x0E2 => self.ipra = (value16 << 8) | (self.ipra & 0x00FF),
            0x0E3 => self.ipra = (self.ipra & 0xFF00) | (value16 & 0xF0),
            0x0E4 => self.vcrwdt = ((value16 & 0x7F) << 8) | (self.vcrwdt & 0x00FF),
            0x0E5 => self.vcrwdt = (self.vcrwdt & 0xFF00) | (value16 & 0x7F),
            _ => return false,
        }

        log::trace!("Interrupt controller byte write {address:03X} {value:02X}");
        true
    }

    /// Returns false if the address is not an interrupt controller register.
    pub fn write_word(&mut self, address: u32, value: u16) -> bool {
        match address {
            0x060 => self.iprb = value & 0xFF00,
            0x062 => self.vcra = value & 0x7F7F,
            0x064 => self.vcrb = value & 0x7F7F,
            0x066 => self.vcrc = value & 0x7F7F,
            0x068 => self.vcrd = value & 0x7F7F,
            0x0E0 => self.icr = value & 0x0101,
            0x0E2 => self.ipra = value & 0xFFF0,
            0x0E4 | 0x0E5 => self.vcrwdt = value & 0x7F7F,
            _ => return false,
        }

        log::trace!("Interrupt controller word write {address:03X} {value:04X}");
        true
    }
}
