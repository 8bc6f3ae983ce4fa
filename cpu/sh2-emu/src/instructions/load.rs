//! Data transfer instructions

use crate::Sh2;
use crate::bus::BusInterface;
use crate::instructions::{disp4, disp8, imm8, rm, rn};

fn extend_i8(value: u8) -> u32 {
    value as i8 as u32
}

fn extend_i16(value: u16) -> u32 {
    value as i16 as u32
}

// MOV Rm, Rn
pub fn mov_rm_rn(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.gpr[rn(opcode)] = cpu.registers.gpr[rm(opcode)];
}

// MOV #imm, Rn
pub fn mov_imm_rn(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.gpr[rn(opcode)] = imm8(opcode);
}

// MOVT Rn
pub fn movt(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.gpr[rn(opcode)] = cpu.registers.sr.t.into();
}

// SWAP.B Rm, Rn
// Swap the two lowest bytes
pub fn swap_b(cpu: &mut Sh2, opcode: u16) {
    let value = cpu.registers.gpr[rm(opcode)];
    cpu.registers.gpr[rn(opcode)] =
        (value & 0xFFFF0000) | ((value & 0xFF) << 8) | ((value >> 8) & 0xFF);
}

// SWAP.W Rm, Rn
pub fn swap_w(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.gpr[rn(opcode)] = cpu.registers.gpr[rm(opcode)].rotate_left(16);
}

// XTRCT Rm, Rn
// Middle 32 bits of the 64-bit concatenation Rm:Rn
pub fn xtrct(cpu: &mut Sh2, opcode: u16) {
    let n = rn(opcode);
    cpu.registers.gpr[n] = (cpu.registers.gpr[rm(opcode)] << 16) | (cpu.registers.gpr[n] >> 16);
}

// MOV.B Rm, @Rn
pub fn mov_b_rm_indirect(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let address = cpu.registers.gpr[rn(opcode)];
    cpu.write_byte(address, cpu.registers.gpr[rm(opcode)] as u8, bus);
}

// MOV.W Rm, @Rn
pub fn mov_w_rm_indirect(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let address = cpu.registers.gpr[rn(opcode)];
    cpu.write_word(address, cpu.registers.gpr[rm(opcode)] as u16, bus);
}

// MOV.L Rm, @Rn
pub fn mov_l_rm_indirect(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let address = cpu.registers.gpr[rn(opcode)];
    cpu.write_longword(address, cpu.registers.gpr[rm(opcode)], bus);
}

// MOV.B @Rm, Rn
pub fn mov_b_indirect_rn(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let value = cpu.read_byte(cpu.registers.gpr[rm(opcode)], bus);
    cpu.registers.gpr[rn(opcode)] = extend_i8(value);
}

// MOV.W @Rm, Rn
pub fn mov_w_indirect_rn(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let value = cpu.read_word(cpu.registers.gpr[rm(opcode)], bus);
    cpu.registers.gpr[rn(opcode)] = extend_i16(value);
}

// MOV.L @Rm, Rn
pub fn mov_l_indirect_rn(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let value = cpu.read_longword(cpu.registers.gpr[rm(opcode)], bus);
    cpu.registers.gpr[rn(opcode)] = value;
}

// MOV.x Rm, @-Rn
// The stored value is read before the decrement, which matters when m == n
macro_rules! impl_store_predecrement {
    ($name:ident, $write:ident, $t:ty, $size:expr) => {
        pub fn $name(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
            let value = cpu.registers.gpr[rm(opcode)] as $t;
            let n = rn(opcode);
            let address = cpu.registers.gpr[n].wrapping_sub($size);
            cpu.registers.gpr[n] = address;
            cpu.$write(address, value, bus);
        }
    };
}

impl_store_predecrement!(mov_b_rm_predec, write_byte, u8, 1);
impl_store_predecrement!(mov_w_rm_predec, write_word, u16, 2);
impl_store_predecrement!(mov_l_rm_predec, write_longword, u32, 4);

// MOV.x @Rm+, Rn
// When m == n the loaded value wins over the increment
macro_rules! impl_load_postincrement {
    ($name:ident, $read:ident, $extend:expr, $size:expr) => {
        pub fn $name(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
            let m = rm(opcode);
            let address = cpu.registers.gpr[m];
            let value = cpu.$read(address, bus);
            cpu.registers.gpr[m] = address.wrapping_add($size);
            cpu.registers.gpr[rn(opcode)] = $extend(value);
        }
    };
}

impl_load_postincrement!(mov_b_postinc_rn, read_byte, extend_i8, 1);
impl_load_postincrement!(mov_w_postinc_rn, read_word, extend_i16, 2);
impl_load_postincrement!(mov_l_postinc_rn, read_longword, std::convert::identity, 4);

fn r0_indexed(cpu: &Sh2, register: usize) -> u32 {
    cpu.registers.gpr[0].wrapping_add(cpu.registers.gpr[register])
}

// MOV.B Rm, @(R0,Rn)
pub fn mov_b_rm_r0_indexed(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let address = r0_indexed(cpu, rn(opcode));
    cpu.write_byte(address, cpu.registers.gpr[rm(opcode)] as u8, bus);
}

// MOV.W Rm, @(R0,Rn)
pub fn mov_w_rm_r0_indexed(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let address = r0_indexed(cpu, rn(opcode));
    cpu.write_word(address, cpu.registers.gpr[rm(opcode)] as u16, bus);
}

// MOV.L Rm, @(R0,Rn)
pub fn mov_l_rm_r0_indexed(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let address = r0_indexed(cpu, rn(opcode));
    cpu.write_longword(address, cpu.registers.gpr[rm(opcode)], bus);
}

// MOV.B @(R0,Rm), Rn
pub fn mov_b_r0_indexed_rn(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let address = r0_indexed(cpu, rm(opcode));
    let value = cpu.read_byte(address, bus);
    cpu.registers.gpr[rn(opcode)] = extend_i8(value);
}

// MOV.W @(R0,Rm), Rn
pub fn mov_w_r0_indexed_rn(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let address = r0_indexed(cpu, rm(opcode));
    let value = cpu.read_word(address, bus);
    cpu.registers.gpr[rn(opcode)] = extend_i16(value);
}

// MOV.L @(R0,Rm), Rn
pub fn mov_l_r0_indexed_rn(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let address = r0_indexed(cpu, rm(opcode));
    cpu.registers.gpr[rn(opcode)] = cpu.read_longword(address, bus);
}

// MOV.L Rm, @(disp,Rn)
pub fn mov_l_rm_displacement(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let address = cpu.registers.gpr[rn(opcode)].wrapping_add(disp4(opcode) << 2);
    cpu.write_longword(address, cpu.registers.gpr[rm(opcode)], bus);
}

// MOV.L @(disp,Rm), Rn
pub fn mov_l_displacement_rn(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let address = cpu.registers.gpr[rm(opcode)].wrapping_add(disp4(opcode) << 2);
    cpu.registers.gpr[rn(opcode)] = cpu.read_longword(address, bus);
}

// MOV.B R0, @(disp,Rn)
// Rn is encoded in bits 7-4
pub fn mov_b_r0_displacement(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let address = cpu.registers.gpr[rm(opcode)].wrapping_add(disp4(opcode));
    cpu.write_byte(address, cpu.registers.gpr[0] as u8, bus);
}

// MOV.W R0, @(disp,Rn)
pub fn mov_w_r0_displacement(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let address = cpu.registers.gpr[rm(opcode)].wrapping_add(disp4(opcode) << 1);
    cpu.write_word(address, cpu.registers.gpr[0] as u16, bus);
}

// MOV.B @(disp,Rm), R0
pub fn mov_b_displacement_r0(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let address = cpu.registers.gpr[rm(opcode)].wrapping_add(disp4(opcode));
    let value = cpu.read_byte(address, bus);
    cpu.registers.gpr[0] = extend_i8(value);
}

// MOV.W @(disp,Rm), R0
pub fn mov_w_displacement_r0(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let address = cpu.registers.gpr[rm(opcode)].wrapping_add(disp4(opcode) << 1);
    let value = cpu.read_word(address, bus);
    cpu.registers.gpr[0] = extend_i16(value);
}

fn gbr_displacement(cpu: &Sh2, opcode: u16, shift: u32) -> u32 {
    cpu.registers.gbr.wrapping_add(disp8(opcode) << shift)
}

// MOV.B R0, @(disp,GBR)
pub fn mov_b_r0_gbr(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let address = gbr_displacement(cpu, opcode, 0);
    cpu.write_byte(address, cpu.registers.gpr[0] as u8, bus);
}

// MOV.W R0, @(disp,GBR)
pub fn mov_w_r0_gbr(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let address = gbr_displacement(cpu, opcode, 1);
    cpu.write_word(address, cpu.registers.gpr[0] as u16, bus);
}

// MOV.L R0, @(disp,GBR)
pub fn mov_l_r0_gbr(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let address = gbr_displacement(cpu, opcode, 2);
    cpu.write_longword(address, cpu.registers.gpr[0], bus);
}

// MOV.B @(disp,GBR), R0
pub fn mov_b_gbr_r0(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let address = gbr_displacement(cpu, opcode, 0);
    let value = cpu.read_byte(address, bus);
    cpu.registers.gpr[0] = extend_i8(value);
}

// MOV.W @(disp,GBR), R0
pub fn mov_w_gbr_r0(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let address = gbr_displacement(cpu, opcode, 1);
    let value = cpu.read_word(address, bus);
    cpu.registers.gpr[0] = extend_i16(value);
}

// MOV.L @(disp,GBR), R0
pub fn mov_l_gbr_r0(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let address = gbr_displacement(cpu, opcode, 2);
    cpu.registers.gpr[0] = cpu.read_longword(address, bus);
}

// registers.pc is the instruction address + 2; PC-relative addressing is from address + 4
fn pc_relative_word(cpu: &Sh2, opcode: u16) -> u32 {
    cpu.registers.pc.wrapping_add(2).wrapping_add(disp8(opcode) << 1)
}

fn pc_relative_longword(cpu: &Sh2, opcode: u16) -> u32 {
    (cpu.registers.pc.wrapping_add(2) & !3).wrapping_add(disp8(opcode) << 2)
}

// MOV.W @(disp,PC), Rn
pub fn mov_w_pc_relative_rn(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let address = pc_relative_word(cpu, opcode);
    let value = cpu.read_word(address, bus);
    cpu.registers.gpr[rn(opcode)] = extend_i16(value);
}

// MOV.L @(disp,PC), Rn
pub fn mov_l_pc_relative_rn(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let address = pc_relative_longword(cpu, opcode);
    cpu.registers.gpr[rn(opcode)] = cpu.read_longword(address, bus);
}

// MOVA @(disp,PC), R0
pub fn mova(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.gpr[0] = pc_relative_longword(cpu, opcode);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WhichCpu;
    use crate::engine::Sh2CoreId;
    use test_log::test;

    #[test]
    fn swaps_and_extract() {
        let mut cpu = Sh2::new(WhichCpu::Master, Sh2CoreId::Interpreter);
        cpu.registers.gpr[1] = 0x1234_5678;
        cpu.registers.gpr[2] = 0x9ABC_DEF0;

        // SWAP.B R1, R3
        swap_b(&mut cpu, 0x6318);
        assert_eq!(cpu.registers.gpr[3], 0x1234_7856);

        // SWAP.W R1, R3
        swap_w(&mut cpu, 0x6319);
        assert_eq!(cpu.registers.gpr[3], 0x5678_1234);

        // XTRCT R1, R2
        xtrct(&mut cpu, 0x221D);
        assert_eq!(cpu.registers.gpr[2], 0x5678_9ABC);
    }

    #[test]
    fn immediates_sign_extend() {
        let mut cpu = Sh2::new(WhichCpu::Master, Sh2CoreId::Interpreter);
        // MOV #-1, R5
        mov_imm_rn(&mut cpu, 0xE5FF);
        assert_eq!(cpu.registers.gpr[5], 0xFFFF_FFFF);

        // MOV #0x7F, R5
        mov_imm_rn(&mut cpu, 0xE57F);
        assert_eq!(cpu.registers.gpr[5], 0x7F);
    }

    #[test]
    fn mova_aligns_pc() {
        let mut cpu = Sh2::new(WhichCpu::Master, Sh2CoreId::Interpreter);
        // Executing at 0x06000102
        cpu.registers.pc = 0x06000104;
        // MOVA @(3,PC), R0
        mova(&mut cpu, 0xC703);
        assert_eq!(cpu.registers.gpr[0], 0x06000104 + 12);
    }
}
