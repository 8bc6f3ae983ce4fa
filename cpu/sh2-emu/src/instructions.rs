//! SH-2 instruction decoding and exception-raising instructions
//!
//! Every instruction is charged 1 cycle by the interpreter loop before it executes. Instructions
//! that take longer add the difference themselves, and memory accesses are charged by the bus.

mod alu;
mod bits;
mod branch;
mod load;
mod system;

use crate::Sh2;
use crate::bus::BusInterface;
use std::array;
use std::sync::LazyLock;

pub type OpcodeFn = fn(&mut Sh2, u16, &mut dyn BusInterface);

const ILLEGAL_INSTRUCTION_VECTOR: u8 = 4;
const SLOT_ILLEGAL_INSTRUCTION_VECTOR: u8 = 6;

pub fn decode(opcode: u16) -> OpcodeFn {
    // Indexed by bits 15-12 and 7-0. Opcode groups that also need bits 11-8 (0x8xxx and 0xCxxx)
    // dispatch on them inside the returned function.
    static TABLE: LazyLock<Box<[OpcodeFn; 4096]>> = LazyLock::new(|| {
        Box::new(array::from_fn(|i| {
            let opcode = (i & 0xFF) | ((i & 0xF00) << 4);
            decode_uncached(opcode as u16)
        }))
    });

    TABLE[((opcode & 0xFF) | ((opcode & 0xF000) >> 4)) as usize]
}

macro_rules! cpu {
    ($($name:tt)*) => {
        |cpu, _, _| $($name)*(cpu)
    }
}

macro_rules! cpu_op {
    ($($name:tt)*) => {
        |cpu, opcode, _| $($name)*(cpu, opcode)
    }
}

macro_rules! cpu_op_bus {
    ($($name:tt)*) => {
        |cpu, opcode, bus| $($name)*(cpu, opcode, bus)
    }
}

macro_rules! cpu_bus {
    ($($name:tt)*) => {
        |cpu, _, bus| $($name)*(cpu, bus)
    }
}

fn decode_uncached(opcode: u16) -> OpcodeFn {
    match opcode & 0xF00F {
        0x6003 => cpu_op!(load::mov_rm_rn),
        0x2000 => cpu_op_bus!(load::mov_b_rm_indirect),
        0x2001 => cpu_op_bus!(load::mov_w_rm_indirect),
        0x2002 => cpu_op_bus!(load::mov_l_rm_indirect),
        0x6000 => cpu_op_bus!(load::mov_b_indirect_rn),
        0x6001 => cpu_op_bus!(load::mov_w_indirect_rn),
        0x6002 => cpu_op_bus!(load::mov_l_indirect_rn),
        0x2004 => cpu_op_bus!(load::mov_b_rm_predec),
        0x2005 => cpu_op_bus!(load::mov_w_rm_predec),
        0x2006 => cpu_op_bus!(load::mov_l_rm_predec),
        0x6004 => cpu_op_bus!(load::mov_b_postinc_rn),
        0x6005 => cpu_op_bus!(load::mov_w_postinc_rn),
        0x6006 => cpu_op_bus!(load::mov_l_postinc_rn),
        0x0004 => cpu_op_bus!(load::mov_b_rm_r0_indexed),
        0x0005 => cpu_op_bus!(load::mov_w_rm_r0_indexed),
        0x0006 => cpu_op_bus!(load::mov_l_rm_r0_indexed),
        0x000C => cpu_op_bus!(load::mov_b_r0_indexed_rn),
        0x000D => cpu_op_bus!(load::mov_w_r0_indexed_rn),
        0x000E => cpu_op_bus!(load::mov_l_r0_indexed_rn),
        0x6008 => cpu_op!(load::swap_b),
        0x6009 => cpu_op!(load::swap_w),
        0x200D => cpu_op!(load::xtrct),
        0x300C => cpu_op!(alu::add),
        0x300E => cpu_op!(alu::addc),
        0x300F => cpu_op!(alu::addv),
        0x3008 => cpu_op!(alu::sub),
        0x300A => cpu_op!(alu::subc),
        0x300B => cpu_op!(alu::subv),
        0x600B => cpu_op!(alu::neg),
        0x600A => cpu_op!(alu::negc),
        0x3000 => cpu_op!(alu::cmp_eq),
        0x3002 => cpu_op!(alu::cmp_hs),
        0x3003 => cpu_op!(alu::cmp_ge),
        0x3006 => cpu_op!(alu::cmp_hi),
        0x3007 => cpu_op!(alu::cmp_gt),
        0x200C => cpu_op!(alu::cmp_str),
        0x3004 => cpu_op!(alu::div1),
        0x2007 => cpu_op!(alu::div0s),
        0x300D => cpu_op!(alu::dmuls),
        0x3005 => cpu_op!(alu::dmulu),
        0x0007 => cpu_op!(alu::mul_l),
        0x200F => cpu_op!(alu::muls),
        0x200E => cpu_op!(alu::mulu),
        0x000F => cpu_op_bus!(alu::mac_l),
        0x400F => cpu_op_bus!(alu::mac_w),
        0x600E => cpu_op!(alu::exts_b),
        0x600F => cpu_op!(alu::exts_w),
        0x600C => cpu_op!(alu::extu_b),
        0x600D => cpu_op!(alu::extu_w),
        0x2009 => cpu_op!(bits::and),
        0x200B => cpu_op!(bits::or),
        0x200A => cpu_op!(bits::xor),
        0x2008 => cpu_op!(bits::tst),
        0x6007 => cpu_op!(bits::not),
        _ => match opcode & 0xF0FF {
            0x0029 => cpu_op!(load::movt),
            0x4011 => cpu_op!(alu::cmp_pz),
            0x4015 => cpu_op!(alu::cmp_pl),
            0x4010 => cpu_op!(alu::dt),
            0x401B => cpu_op_bus!(bits::tas),
            0x4004 => cpu_op!(bits::rotl),
            0x4005 => cpu_op!(bits::rotr),
            0x4024 => cpu_op!(bits::rotcl),
            0x4025 => cpu_op!(bits::rotcr),
            // SHAL and SHLL are the same operation
            0x4000 | 0x4020 => cpu_op!(bits::shll),
            0x4001 => cpu_op!(bits::shlr),
            0x4021 => cpu_op!(bits::shar),
            0x4008 => cpu_op!(bits::shll_n::<2>),
            0x4018 => cpu_op!(bits::shll_n::<8>),
            0x4028 => cpu_op!(bits::shll_n::<16>),
            0x4009 => cpu_op!(bits::shlr_n::<2>),
            0x4019 => cpu_op!(bits::shlr_n::<8>),
            0x4029 => cpu_op!(bits::shlr_n::<16>),
            0x0023 => cpu_op!(branch::braf),
            0x0003 => cpu_op!(branch::bsrf),
            0x402B => cpu_op!(branch::jmp),
            0x400B => cpu_op!(branch::jsr),
            0x400E => cpu_op!(system::ldc_sr),
            0x401E => cpu_op!(system::ldc_gbr),
            0x402E => cpu_op!(system::ldc_vbr),
            0x4007 => cpu_op_bus!(system::ldc_l_sr),
            0x4017 => cpu_op_bus!(system::ldc_l_gbr),
            0x4027 => cpu_op_bus!(system::ldc_l_vbr),
            0x400A => cpu_op!(system::lds_mach),
            0x401A => cpu_op!(system::lds_macl),
            0x402A => cpu_op!(system::lds_pr),
            0x4006 => cpu_op_bus!(system::lds_l_mach),
            0x4016 => cpu_op_bus!(system::lds_l_macl),
            0x4026 => cpu_op_bus!(system::lds_l_pr),
            0x0002 => cpu_op!(system::stc_sr),
            0x0012 => cpu_op!(system::stc_gbr),
            0x0022 => cpu_op!(system::stc_vbr),
            0x4003 => cpu_op_bus!(system::stc_l_sr),
            0x4013 => cpu_op_bus!(system::stc_l_gbr),
            0x4023 => cpu_op_bus!(system::stc_l_vbr),
            0x000A => cpu_op!(system::sts_mach),
            0x001A => cpu_op!(system::sts_macl),
            0x002A => cpu_op!(system::sts_pr),
            0x4002 => cpu_op_bus!(system::sts_l_mach),
            0x4012 => cpu_op_bus!(system::sts_l_macl),
            0x4022 => cpu_op_bus!(system::sts_l_pr),
            0x0019 => cpu!(alu::div0u),
            0x000B => cpu!(branch::rts),
            0x002B => cpu_bus!(branch::rte),
            0x0008 => cpu!(system::clrt),
            0x0018 => cpu!(system::sett),
            0x0028 => cpu!(system::clrmac),
            0x0009 => nop,
            0x001B => cpu!(system::sleep),
            _ => match opcode & 0xF000 {
                0xE000 => cpu_op!(load::mov_imm_rn),
                0x9000 => cpu_op_bus!(load::mov_w_pc_relative_rn),
                0xD000 => cpu_op_bus!(load::mov_l_pc_relative_rn),
                0x1000 => cpu_op_bus!(load::mov_l_rm_displacement),
                0x5000 => cpu_op_bus!(load::mov_l_displacement_rn),
                0x7000 => cpu_op!(alu::add_imm),
                0xA000 => cpu_op!(branch::bra),
                0xB000 => cpu_op!(branch::bsr),
                0x8000 => |cpu, opcode, bus| match (opcode >> 8) & 0xF {
                    0x0 => load::mov_b_r0_displacement(cpu, opcode, bus),
                    0x1 => load::mov_w_r0_displacement(cpu, opcode, bus),
                    0x4 => load::mov_b_displacement_r0(cpu, opcode, bus),
                    0x5 => load::mov_w_displacement_r0(cpu, opcode, bus),
                    0x8 => alu::cmp_eq_imm(cpu, opcode),
                    0x9 => branch::bt(cpu, opcode),
                    0xB => branch::bf(cpu, opcode),
                    0xD => branch::bt_s(cpu, opcode),
                    0xF => branch::bf_s(cpu, opcode),
                    _ => illegal_instruction(cpu, opcode, bus),
                },
                0xC000 => |cpu, opcode, bus| match (opcode >> 8) & 0xF {
                    0x0 => load::mov_b_r0_gbr(cpu, opcode, bus),
                    0x1 => load::mov_w_r0_gbr(cpu, opcode, bus),
                    0x2 => load::mov_l_r0_gbr(cpu, opcode, bus),
                    0x3 => branch::trapa(cpu, opcode, bus),
                    0x4 => load::mov_b_gbr_r0(cpu, opcode, bus),
                    0x5 => load::mov_w_gbr_r0(cpu, opcode, bus),
                    0x6 => load::mov_l_gbr_r0(cpu, opcode, bus),
                    0x7 => load::mova(cpu, opcode),
                    0x8 => bits::tst_imm(cpu, opcode),
                    0x9 => bits::and_imm(cpu, opcode),
                    0xA => bits::xor_imm(cpu, opcode),
                    0xB => bits::or_imm(cpu, opcode),
                    0xC => bits::tst_b_gbr(cpu, opcode, bus),
                    0xD => bits::and_b_gbr(cpu, opcode, bus),
                    0xE => bits::xor_b_gbr(cpu, opcode, bus),
                    0xF => bits::or_b_gbr(cpu, opcode, bus),
                    _ => unreachable!("value & 0xF is always <= 0xF"),
                },
                _ => illegal_instruction,
            },
        },
    }
}

/// Instructions that are not allowed in a branch delay slot.
pub fn is_branch(opcode: u16) -> bool {
    match opcode & 0xF000 {
        0xA000 | 0xB000 => true,
        // BT, BF, BT/S, BF/S
        0x8000 => matches!((opcode >> 8) & 0xF, 0x9 | 0xB | 0xD | 0xF),
        // TRAPA
        0xC000 => (opcode >> 8) & 0xF == 0x3,
        _ => matches!(opcode & 0xF0FF, 0x0003 | 0x0023 | 0x400B | 0x402B | 0x000B | 0x002B),
    }
}

fn nop(_cpu: &mut Sh2, _opcode: u16, _bus: &mut dyn BusInterface) {}

fn illegal_instruction(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    // The stacked PC points at the illegal instruction itself
    let pc = cpu.registers.pc.wrapping_sub(2);

    log::error!("[{}] Illegal instruction {opcode:04X} at {pc:08X}", cpu.name());

    cpu.cycles = cpu.cycles.wrapping_add(7);
    cpu.enter_exception(ILLEGAL_INSTRUCTION_VECTOR, pc, bus);
}

/// A branch in a delay slot. `pc` is the address of the offending instruction.
pub fn slot_illegal(cpu: &mut Sh2, pc: u32, opcode: u16, bus: &mut dyn BusInterface) {
    // The stacked PC points at the branch that owns the delay slot
    let branch_pc = pc.wrapping_sub(2);

    log::error!(
        "[{}] Branch {opcode:04X} at {pc:08X} in the delay slot of {branch_pc:08X}",
        cpu.name()
    );

    cpu.cycles = cpu.cycles.wrapping_add(7);
    cpu.enter_exception(SLOT_ILLEGAL_INSTRUCTION_VECTOR, branch_pc, bus);
}

#[inline(always)]
fn rn(opcode: u16) -> usize {
    ((opcode >> 8) & 0xF) as usize
}

#[inline(always)]
fn rm(opcode: u16) -> usize {
    ((opcode >> 4) & 0xF) as usize
}

#[inline(always)]
fn imm8(opcode: u16) -> u32 {
    opcode as i8 as u32
}

#[inline(always)]
fn disp8(opcode: u16) -> u32 {
    u32::from(opcode & 0xFF)
}

#[inline(always)]
fn disp4(opcode: u16) -> u32 {
    u32::from(opcode & 0xF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_classification() {
        // BRA, BSR, BT, BF/S, TRAPA, JMP, JSR, BRAF, BSRF, RTS, RTE
        for opcode in [
            0xA123, 0xB456, 0x8905, 0x8FFE, 0xC320, 0x432B, 0x410B, 0x0223, 0x0303, 0x000B, 0x002B,
        ] {
            assert!(is_branch(opcode), "{opcode:04X}");
        }

        // MOV.B R0, @(disp, Rn), CMP/EQ #imm, NOP, MOV Rm, Rn, MOVA
        for opcode in [0x8012, 0x8834, 0x0009, 0x6123, 0xC710] {
            assert!(!is_branch(opcode), "{opcode:04X}");
        }
    }
}
