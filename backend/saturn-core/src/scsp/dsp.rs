//! SCSP effects DSP
//!
//! Runs up to 128 microprogram steps per output sample over 24-bit fixed-point data, with a ring
//! buffer in sound RAM addressed by RBP/RBL.

use crate::scsp::SoundRam;
use bincode::{Decode, Encode};
use saturn_common::num::GetBit;

pub const MPRO_LEN: usize = 128;

fn sign_extend(bits: u32, value: u32) -> i32 {
    ((value << (32 - bits)) as i32) >> (32 - bits)
}

/// Decoded 64-bit MPRO instruction.
#[derive(Debug, Clone, Copy)]
struct Instruction(u64);

impl Instruction {
    fn field(self, lsb: u32, len: u32) -> u32 {
        ((self.0 >> lsb) & ((1 << len) - 1)) as u32
    }

    fn flag(self, bit: u32) -> bool {
        self.0.bit(bit as u8)
    }

    // Word 0 (bits 48-63)
    fn tra(self) -> u32 {
        self.field(56, 7)
    }
    fn twt(self) -> bool {
        self.flag(55)
    }
    fn twa(self) -> u32 {
        self.field(48, 7)
    }

    // Word 1 (bits 32-47)
    fn xsel(self) -> bool {
        self.flag(47)
    }
    fn ysel(self) -> u32 {
        self.field(45, 2)
    }
    fn ira(self) -> u32 {
        self.field(38, 6)
    }
    fn iwt(self) -> bool {
        self.flag(37)
    }
    fn iwa(self) -> u32 {
        self.field(32, 5)
    }

    // Word 2 (bits 16-31)
    fn table(self) -> bool {
        self.flag(31)
    }
    fn mwt(self) -> bool {
        self.flag(30)
    }
    fn mrd(self) -> bool {
        self.flag(29)
    }
    fn ewt(self) -> bool {
        self.flag(28)
    }
    fn ewa(self) -> u32 {
        self.field(24, 4)
    }
    fn adrl(self) -> bool {
        self.flag(23)
    }
    fn frcl(self) -> bool {
        self.flag(22)
    }
    fn shift0(self) -> bool {
        self.flag(20)
    }
    fn shift1(self) -> bool {
        self.flag(21)
    }
    fn yrl(self) -> bool {
        self.flag(19)
    }
    fn negb(self) -> bool {
        self.flag(18)
    }
    fn zero(self) -> bool {
        self.flag(17)
    }
    fn bsel(self) -> bool {
        self.flag(16)
    }

    // Word 3 (bits 0-15)
    fn nofl(self) -> bool {
        self.flag(15)
    }
    fn coef(self) -> u32 {
        self.field(9, 6)
    }
    fn masa(self) -> u32 {
        self.field(2, 5)
    }
    fn adreb(self) -> bool {
        self.flag(1)
    }
    fn nxadr(self) -> bool {
        self.flag(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
enum PendingRead {
    #[default]
    None,
    Float,
    Integer,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Dsp {
    pub coef: [u16; 64],
    pub madrs: [u16; 32],
    pub mpro: [u64; MPRO_LEN],
    pub temp: [u32; 128],
    pub mems: [u32; 32],
    pub mixs: [i32; 16],
    pub efreg: [i16; 16],
    pub exts: [i16; 2],
    pub ring_buffer_pointer: u32,
    pub ring_buffer_length: u32,
    pub updated: bool,
    last_step: usize,
    mdec_ct: u32,
    inputs: u32,
    y_reg: u32,
    frc_reg: u16,
    shift_reg: u32,
    adrs_reg: u16,
    product: i64,
    read_pending: PendingRead,
    read_value: u32,
    write_pending: bool,
    write_value: u16,
    io_address: u32,
}

impl Dsp {
    #[must_use]
    pub fn new() -> Self {
        Self {
            coef: [0; 64],
            madrs: [0; 32],
            mpro: [0; MPRO_LEN],
            temp: [0; 128],
            mems: [0; 32],
            mixs: [0; 16],
            efreg: [0; 16],
            exts: [0; 2],
            ring_buffer_pointer: 0,
            ring_buffer_length: 0,
            updated: false,
            last_step: 0,
            mdec_ct: 0,
            inputs: 0,
            y_reg: 0,
            frc_reg: 0,
            shift_reg: 0,
            adrs_reg: 0,
            product: 0,
            read_pending: PendingRead::None,
            read_value: 0,
            write_pending: false,
            write_value: 0,
            io_address: 0,
        }
    }

    /// Runs the microprogram once for the current sample and advances the ring buffer position.
    pub fn run(&mut self, sound_ram: &mut SoundRam) {
        if self.updated {
            self.last_step = self.mpro.iter().rposition(|&inst| inst != 0).map_or(0, |i| i + 1);
            self.updated = false;
        }

        for step in 0..self.last_step {
            self.execute(Instruction(self.mpro[step]), sound_ram);
        }

        if self.mdec_ct == 0 {
            self.mdec_ct = 0x2000 << self.ring_buffer_length;
        }
        self.mdec_ct -= 1;

        self.mixs.fill(0);
    }

    fn execute(&mut self, inst: Instruction, sound_ram: &mut SoundRam) {
        let ira = inst.ira();
        if ira.bit(5) {
            if ira.bit(4) {
                if ira & 0xE == 0 {
                    self.inputs = (i32::from(self.exts[(ira & 1) as usize]) * 256) as u32;
                }
            } else {
                self.inputs = (self.mixs[(ira & 0xF) as usize] * 16) as u32;
            }
        } else {
            self.inputs = self.mems[(ira & 0x1F) as usize];
        }

        let inputs = sign_extend(24, self.inputs);
        let temp_read_address = ((inst.tra() + self.mdec_ct) & 0x7F) as usize;
        let temp = sign_extend(24, self.temp[temp_read_address]);

        let x = if inst.xsel() { inputs } else { temp };
        let y: u16 = match inst.ysel() {
            0 => self.frc_reg,
            1 => self.coef[inst.coef() as usize],
            2 => ((self.y_reg >> 11) & 0x1FFF) as u16,
            _ => ((self.y_reg >> 4) & 0x0FFF) as u16,
        };
        let shifter_input = if inst.bsel() { self.shift_reg } else { temp as u32 };

        if inst.yrl() {
            self.y_reg = (inputs as u32) & 0xFFFFFF;
        }

        let (shift0, shift1) = (inst.shift0(), inst.shift1());
        let mut shifter_output = sign_extend(26, self.shift_reg) << u32::from(shift0 ^ shift1);
        if !shift1 {
            if shifter_output > 0x7FFFFF {
                shifter_output = 0x7FFFFF;
            } else if shifter_output < -0x800000 {
                shifter_output = 0x800000;
            }
        }
        shifter_output &= 0xFFFFFF;

        if inst.ewt() {
            self.efreg[inst.ewa() as usize] = (shifter_output >> 8) as i16;
        }

        if inst.twt() {
            let temp_write_address = ((inst.twa() + self.mdec_ct) & 0x7F) as usize;
            self.temp[temp_write_address] = shifter_output as u32;
        }

        if inst.frcl() {
            self.frc_reg = if shift0 && shift1 {
                (shifter_output & 0xFFF) as u16
            } else {
                (shifter_output >> 11) as u16
            };
        }

        self.product = (i64::from(sign_extend(13, y.into())) * i64::from(x)) >> 12;

        let mut addend = shifter_input;
        if inst.negb() {
            addend = addend.wrapping_neg();
        }
        if inst.zero() {
            addend = 0;
        }
        self.shift_reg = (self.product as u32).wrapping_add(addend) & 0x3FFFFFF;

        if inst.iwt() {
            self.mems[inst.iwa() as usize] = self.read_value;
        }

        let ram_address = self.io_address << 1;
        match self.read_pending {
            PendingRead::None => {
                if self.write_pending {
                    if !self.io_address.bit(18) {
                        sound_ram.write_word_direct(ram_address, self.write_value);
                    }
                    self.write_pending = false;
                }
            }
            pending => {
                let word = sound_ram.read_word_direct(ram_address);
                self.read_value = match pending {
                    PendingRead::Integer => u32::from(word) << 8,
                    _ => float_to_int(word) as u32,
                };
                self.read_pending = PendingRead::None;
            }
        }

        // Address arithmetic wraps at 16 bits
        let mut address = self.madrs[inst.masa() as usize].wrapping_add(inst.nxadr().into());
        if inst.adreb() {
            address = address.wrapping_add(sign_extend(12, self.adrs_reg.into()) as u16);
        }
        if !inst.table() {
            address = address.wrapping_add(self.mdec_ct as u16);
            address &= ((0x2000_u32 << self.ring_buffer_length) - 1) as u16;
        }
        self.io_address = (u32::from(address) + (self.ring_buffer_pointer << 12)) & 0x3FFFF;

        if inst.mrd() {
            self.read_pending =
                if inst.nofl() { PendingRead::Integer } else { PendingRead::Float };
        }
        if inst.mwt() {
            self.write_pending = true;
            self.write_value = if inst.nofl() {
                (shifter_output >> 8) as u16
            } else {
                int_to_float(shifter_output as u32)
            };
        }
        if inst.adrl() {
            self.adrs_reg = if shift0 && shift1 {
                (shifter_output >> 12) as u16
            } else {
                ((inputs >> 16) & 0xFFF) as u16
            };
        }
    }

    pub fn write_mpro_word(&mut self, offset: u32, value: u16) {
        let index = ((offset >> 3) as usize) & (MPRO_LEN - 1);
        let shift = 48 - 16 * ((offset >> 1) & 3);
        self.mpro[index] = (self.mpro[index] & !(0xFFFF << shift)) | (u64::from(value) << shift);
        self.updated = true;
    }

    pub fn write_mpro_byte(&mut self, offset: u32, value: u8) {
        let index = ((offset >> 3) as usize) & (MPRO_LEN - 1);
        let shift = 56 - 8 * (offset & 7);
        self.mpro[index] = (self.mpro[index] & !(0xFF << shift)) | (u64::from(value) << shift);
        self.updated = true;
    }

    #[must_use]
    pub fn read_mpro_word(&self, offset: u32) -> u16 {
        let index = ((offset >> 3) as usize) & (MPRO_LEN - 1);
        let shift = 48 - 16 * ((offset >> 1) & 3);
        (self.mpro[index] >> shift) as u16
    }
}

impl Default for Dsp {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts a 16-bit DSP float (sign, 4-bit exponent, 11-bit mantissa) to a sign-extended
/// 24-bit integer.
#[must_use]
pub fn float_to_int(value: u16) -> i32 {
    let sign = u32::from(value.bit(15));
    let mut exponent = u32::from((value >> 11) & 0xF);
    let mantissa = u32::from(value & 0x7FF);

    let mut result = sign << 31;
    if exponent > 11 {
        exponent = 11;
        result |= sign << 30;
    } else {
        result |= (sign ^ 1) << 30;
    }
    result |= mantissa << 19;

    (result as i32) >> (exponent + 8)
}

/// Converts a 24-bit integer to a 16-bit DSP float.
#[must_use]
pub fn int_to_float(value: u32) -> u16 {
    let negative = value.bit(23);
    let mut value = if negative { !value & 0x7FFFFF } else { value };
    let mut exponent = 0;

    if value <= 0x1FFFF {
        value *= 64;
        exponent += 0x3000;
    }
    if value <= 0xFFFFF {
        value *= 8;
        exponent += 0x1800;
    }
    if value <= 0x3FFFFF {
        value *= 2;
        exponent += 0x800;
    }
    if value <= 0x3FFFFF {
        value *= 2;
        exponent += 0x800;
    }
    if value <= 0x3FFFFF {
        exponent += 0x800;
    }

    let mut result = ((value >> 11) & 0x7FF) | exponent;
    if negative {
        result ^= 0x7FF | 0x8000;
    }
    result as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn float_conversion_known_values() {
        assert_eq!(int_to_float(0), 0x6000);
        assert_eq!(float_to_int(0x6000), 0);

        assert_eq!(int_to_float(0x400000), 0x0000);
        assert_eq!(float_to_int(0x0000), 0x400000);

        assert_eq!(int_to_float(0x7FFFFF), 0x07FF);
        assert_eq!(float_to_int(0x07FF), 0x7FF800);

        assert_eq!(float_to_int(0x8000), -0x800000);
    }

    #[test]
    fn float_round_trip_keeps_high_bits() {
        for _ in 0..1000 {
            let value = rand::random::<u32>() & 0x7FFFFF;
            let converted = float_to_int(int_to_float(value));
            assert!(converted >= 0, "{value:06X} -> {converted:X}");
            // Only the 11 most significant bits below the leading one survive
            assert!((value as i32 - converted).abs() < (value as i32 >> 10).max(1 << 12));
        }
    }

    #[test]
    fn mpro_words_map_high_to_low() {
        let mut dsp = Dsp::new();
        dsp.write_mpro_word(0x08, 0x1234);
        dsp.write_mpro_word(0x0A, 0x5678);
        dsp.write_mpro_word(0x0C, 0x9ABC);
        dsp.write_mpro_word(0x0E, 0xDEF0);
        assert_eq!(dsp.mpro[1], 0x1234_5678_9ABC_DEF0);
        assert!(dsp.updated);
        assert_eq!(dsp.read_mpro_word(0x0C), 0x9ABC);

        dsp.write_mpro_byte(0x0F, 0x11);
        assert_eq!(dsp.mpro[1], 0x1234_5678_9ABC_DE11);
    }

    #[test]
    fn last_step_tracks_final_instruction() {
        let mut dsp = Dsp::new();
        let mut ram = SoundRam::new();
        dsp.write_mpro_word(5 * 8 + 6, 0x0001);
        dsp.run(&mut ram);
        assert_eq!(dsp.last_step, 6);
        assert_eq!(dsp.mdec_ct, 0x1FFF);
    }

    #[test]
    fn efreg_write_from_shifter() {
        let mut dsp = Dsp::new();
        let mut ram = SoundRam::new();

        // Step 0: SHIFT_REG = COEF * INPUTS, where INPUTS = MEMS[0]
        // XSEL=1 (INPUTS), YSEL=1 (COEF), IRA=0, COEF index 0, ZERO=1
        dsp.mems[0] = 0x100000;
        dsp.coef[0] = 0x0800;
        dsp.mpro[0] = (1 << 47) | (1 << 45) | (1 << 17);
        // Step 1: EWT to EFREG[3]
        dsp.mpro[1] = (1 << 28) | (3 << 24);
        dsp.updated = true;

        dsp.run(&mut ram);
        // 0x800 * 0x100000 >> 12 = 0x80000, shifted out >> 8
        assert_eq!(dsp.efreg[3], 0x0800);
    }
}
