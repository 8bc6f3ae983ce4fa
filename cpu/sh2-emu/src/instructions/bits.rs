//! Logic, shift and rotate instructions

use crate::Sh2;
use crate::bus::BusInterface;
use crate::instructions::{rm, rn};
use saturn_common::num::{GetBit, SignBit};

// AND Rm, Rn
pub fn and(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.gpr[rn(opcode)] &= cpu.registers.gpr[rm(opcode)];
}

// OR Rm, Rn
pub fn or(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.gpr[rn(opcode)] |= cpu.registers.gpr[rm(opcode)];
}

// XOR Rm, Rn
pub fn xor(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.gpr[rn(opcode)] ^= cpu.registers.gpr[rm(opcode)];
}

// NOT Rm, Rn
pub fn not(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.gpr[rn(opcode)] = !cpu.registers.gpr[rm(opcode)];
}

// TST Rm, Rn
pub fn tst(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.sr.t = cpu.registers.gpr[rn(opcode)] & cpu.registers.gpr[rm(opcode)] == 0;
}

fn imm(opcode: u16) -> u32 {
    u32::from(opcode & 0xFF)
}

// AND #imm, R0
pub fn and_imm(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.gpr[0] &= imm(opcode);
}

// OR #imm, R0
pub fn or_imm(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.gpr[0] |= imm(opcode);
}

// XOR #imm, R0
pub fn xor_imm(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.gpr[0] ^= imm(opcode);
}

// TST #imm, R0
pub fn tst_imm(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.sr.t = cpu.registers.gpr[0] & imm(opcode) == 0;
}

// Read-modify-write on the byte at (R0 + GBR); 3 cycles
fn gbr_indexed_rmw(
    cpu: &mut Sh2,
    bus: &mut dyn BusInterface,
    op: impl FnOnce(u8) -> u8,
) {
    let address = cpu.registers.gbr.wrapping_add(cpu.registers.gpr[0]);
    let value = cpu.read_byte(address, bus);
    cpu.write_byte(address, op(value), bus);
    cpu.cycles = cpu.cycles.wrapping_add(2);
}

// AND.B #imm, @(R0,GBR)
pub fn and_b_gbr(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    gbr_indexed_rmw(cpu, bus, |value| value & opcode as u8);
}

// OR.B #imm, @(R0,GBR)
pub fn or_b_gbr(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    gbr_indexed_rmw(cpu, bus, |value| value | opcode as u8);
}

// XOR.B #imm, @(R0,GBR)
pub fn xor_b_gbr(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    gbr_indexed_rmw(cpu, bus, |value| value ^ opcode as u8);
}

// TST.B #imm, @(R0,GBR)
pub fn tst_b_gbr(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let address = cpu.registers.gbr.wrapping_add(cpu.registers.gpr[0]);
    let value = cpu.read_byte(address, bus);
    cpu.registers.sr.t = value & (opcode as u8) == 0;
    cpu.cycles = cpu.cycles.wrapping_add(2);
}

// TAS.B @Rn
// Test and set: T = (byte == 0), then set bit 7. The bus is locked for the read-modify-write
pub fn tas(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    // Bypasses the cache
    let address = cpu.registers.gpr[rn(opcode)] | 0x20000000;
    let value = cpu.read_byte(address, bus);
    cpu.registers.sr.t = value == 0;
    cpu.write_byte(address, value | 0x80, bus);
    cpu.cycles = cpu.cycles.wrapping_add(3);
}

// ROTL Rn
pub fn rotl(cpu: &mut Sh2, opcode: u16) {
    let value = cpu.registers.gpr[rn(opcode)];
    cpu.registers.sr.t = value.sign_bit();
    cpu.registers.gpr[rn(opcode)] = value.rotate_left(1);
}

// ROTR Rn
pub fn rotr(cpu: &mut Sh2, opcode: u16) {
    let value = cpu.registers.gpr[rn(opcode)];
    cpu.registers.sr.t = value.bit(0);
    cpu.registers.gpr[rn(opcode)] = value.rotate_right(1);
}

// ROTCL Rn
// Rotate left through T
pub fn rotcl(cpu: &mut Sh2, opcode: u16) {
    let value = cpu.registers.gpr[rn(opcode)];
    cpu.registers.gpr[rn(opcode)] = (value << 1) | u32::from(cpu.registers.sr.t);
    cpu.registers.sr.t = value.sign_bit();
}

// ROTCR Rn
// Rotate right through T
pub fn rotcr(cpu: &mut Sh2, opcode: u16) {
    let value = cpu.registers.gpr[rn(opcode)];
    cpu.registers.gpr[rn(opcode)] = (value >> 1) | (u32::from(cpu.registers.sr.t) << 31);
    cpu.registers.sr.t = value.bit(0);
}

// SHLL Rn / SHAL Rn
pub fn shll(cpu: &mut Sh2, opcode: u16) {
    let value = cpu.registers.gpr[rn(opcode)];
    cpu.registers.sr.t = value.sign_bit();
    cpu.registers.gpr[rn(opcode)] = value << 1;
}

// SHLR Rn
pub fn shlr(cpu: &mut Sh2, opcode: u16) {
    let value = cpu.registers.gpr[rn(opcode)];
    cpu.registers.sr.t = value.bit(0);
    cpu.registers.gpr[rn(opcode)] = value >> 1;
}

// SHAR Rn
pub fn shar(cpu: &mut Sh2, opcode: u16) {
    let value = cpu.registers.gpr[rn(opcode)];
    cpu.registers.sr.t = value.bit(0);
    cpu.registers.gpr[rn(opcode)] = ((value as i32) >> 1) as u32;
}

// SHLL2 / SHLL8 / SHLL16 Rn
pub fn shll_n<const N: u32>(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.gpr[rn(opcode)] <<= N;
}

// SHLR2 / SHLR8 / SHLR16 Rn
pub fn shlr_n<const N: u32>(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.gpr[rn(opcode)] >>= N;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WhichCpu;
    use crate::engine::Sh2CoreId;
    use test_log::test;

    #[test]
    fn rotates_through_t() {
        let mut cpu = Sh2::new(WhichCpu::Master, Sh2CoreId::Interpreter);
        cpu.registers.gpr[4] = 0x8000_0001;
        cpu.registers.sr.t = false;

        rotcl(&mut cpu, 0x0400);
        assert_eq!(cpu.registers.gpr[4], 0x0000_0002);
        assert!(cpu.registers.sr.t);

        rotcr(&mut cpu, 0x0400);
        assert_eq!(cpu.registers.gpr[4], 0x8000_0001);
        assert!(!cpu.registers.sr.t);

        rotr(&mut cpu, 0x0400);
        assert_eq!(cpu.registers.gpr[4], 0xC000_0000);
        assert!(cpu.registers.sr.t);
    }

    #[test]
    fn arithmetic_shift_keeps_sign() {
        let mut cpu = Sh2::new(WhichCpu::Master, Sh2CoreId::Interpreter);
        cpu.registers.gpr[1] = 0x8000_0003;
        shar(&mut cpu, 0x0100);
        assert_eq!(cpu.registers.gpr[1], 0xC000_0001);
        assert!(cpu.registers.sr.t);

        shlr_n::<16>(&mut cpu, 0x0100);
        assert_eq!(cpu.registers.gpr[1], 0xC000);
    }
}
