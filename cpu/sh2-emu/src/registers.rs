use bincode::{Decode, Encode};
use saturn_common::num::GetBit;

pub(crate) const RESET_SR: u32 = 0x000000F0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct StatusRegister {
    // Interrupt levels <= this value are masked
    pub interrupt_mask: u8,
    // Used as a carry/test flag by many instructions
    pub t: bool,
    // Saturation flag for multiply-accumulate instructions
    pub s: bool,
    // Division flags
    pub q: bool,
    pub m: bool,
}

impl Default for StatusRegister {
    fn default() -> Self {
        RESET_SR.into()
    }
}

impl From<u32> for StatusRegister {
    fn from(value: u32) -> Self {
        Self {
            interrupt_mask: ((value >> 4) & 0xF) as u8,
            t: value.bit(0),
            s: value.bit(1),
            q: value.bit(8),
            m: value.bit(9),
        }
    }
}

impl From<StatusRegister> for u32 {
    fn from(value: StatusRegister) -> Self {
        (u32::from(value.m) << 9)
            | (u32::from(value.q) << 8)
            | (u32::from(value.interrupt_mask) << 4)
            | (u32::from(value.s) << 1)
            | u32::from(value.t)
    }
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct Sh2Registers {
    pub gpr: [u32; 16],
    pub sr: StatusRegister,
    pub gbr: u32,
    pub vbr: u32,
    pub mach: u32,
    pub macl: u32,
    // Procedure register (return address)
    pub pr: u32,
    // Address of the next instruction to fetch
    pub pc: u32,
    pub next_pc: u32,
    // Set when next_pc was changed by an instruction with a branch delay slot
    pub next_op_in_delay_slot: bool,
}

impl Sh2Registers {
    pub fn mac(&self) -> i64 {
        (i64::from(self.mach) << 32) | i64::from(self.macl)
    }

    pub fn set_mac(&mut self, value: i64) {
        self.mach = ((value as u64) >> 32) as u32;
        self.macl = value as u32;
    }

    /// Point execution at `pc`, discarding any pending delay slot.
    pub fn jump_to(&mut self, pc: u32) {
        self.pc = pc;
        self.next_pc = pc.wrapping_add(2);
        self.next_op_in_delay_slot = false;
    }
}

/// Flat register snapshot exposed to debuggers and front-ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sh2RegisterSnapshot {
    pub gpr: [u32; 16],
    pub sr: u32,
    pub gbr: u32,
    pub vbr: u32,
    pub mach: u32,
    pub macl: u32,
    pub pr: u32,
    pub pc: u32,
}
