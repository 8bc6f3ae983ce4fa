//! Control register transfers and miscellaneous system instructions

use crate::Sh2;
use crate::bus::BusInterface;
use crate::instructions::rn;
use crate::registers::StatusRegister;

// LDC Rm, SR
pub fn ldc_sr(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.sr = StatusRegister::from(cpu.registers.gpr[rn(opcode)]);
}

// LDC Rm, GBR
pub fn ldc_gbr(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.gbr = cpu.registers.gpr[rn(opcode)];
}

// LDC Rm, VBR
pub fn ldc_vbr(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.vbr = cpu.registers.gpr[rn(opcode)];
}

fn pop_longword(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) -> u32 {
    let n = rn(opcode);
    let address = cpu.registers.gpr[n];
    let value = cpu.read_longword(address, bus);
    cpu.registers.gpr[n] = address.wrapping_add(4);
    value
}

fn push_longword(cpu: &mut Sh2, opcode: u16, value: u32, bus: &mut dyn BusInterface) {
    let n = rn(opcode);
    let address = cpu.registers.gpr[n].wrapping_sub(4);
    cpu.registers.gpr[n] = address;
    cpu.write_longword(address, value, bus);
}

// LDC.L @Rm+, SR
pub fn ldc_l_sr(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let value = pop_longword(cpu, opcode, bus);
    cpu.registers.sr = value.into();
    cpu.cycles = cpu.cycles.wrapping_add(2);
}

// LDC.L @Rm+, GBR
pub fn ldc_l_gbr(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    cpu.registers.gbr = pop_longword(cpu, opcode, bus);
    cpu.cycles = cpu.cycles.wrapping_add(2);
}

// LDC.L @Rm+, VBR
pub fn ldc_l_vbr(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    cpu.registers.vbr = pop_longword(cpu, opcode, bus);
    cpu.cycles = cpu.cycles.wrapping_add(2);
}

// LDS Rm, MACH
pub fn lds_mach(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.mach = cpu.registers.gpr[rn(opcode)];
}

// LDS Rm, MACL
pub fn lds_macl(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.macl = cpu.registers.gpr[rn(opcode)];
}

// LDS Rm, PR
pub fn lds_pr(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.pr = cpu.registers.gpr[rn(opcode)];
}

// LDS.L @Rm+, MACH
pub fn lds_l_mach(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    cpu.registers.mach = pop_longword(cpu, opcode, bus);
}

// LDS.L @Rm+, MACL
pub fn lds_l_macl(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    cpu.registers.macl = pop_longword(cpu, opcode, bus);
}

// LDS.L @Rm+, PR
pub fn lds_l_pr(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    cpu.registers.pr = pop_longword(cpu, opcode, bus);
}

// STC SR, Rn
pub fn stc_sr(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.gpr[rn(opcode)] = cpu.registers.sr.into();
}

// STC GBR, Rn
pub fn stc_gbr(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.gpr[rn(opcode)] = cpu.registers.gbr;
}

// STC VBR, Rn
pub fn stc_vbr(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.gpr[rn(opcode)] = cpu.registers.vbr;
}

// STC.L SR, @-Rn
pub fn stc_l_sr(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let sr = cpu.registers.sr.into();
    push_longword(cpu, opcode, sr, bus);
    cpu.cycles = cpu.cycles.wrapping_add(1);
}

// STC.L GBR, @-Rn
pub fn stc_l_gbr(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    push_longword(cpu, opcode, cpu.registers.gbr, bus);
    cpu.cycles = cpu.cycles.wrapping_add(1);
}

// STC.L VBR, @-Rn
pub fn stc_l_vbr(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    push_longword(cpu, opcode, cpu.registers.vbr, bus);
    cpu.cycles = cpu.cycles.wrapping_add(1);
}

// STS MACH, Rn
pub fn sts_mach(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.gpr[rn(opcode)] = cpu.registers.mach;
}

// STS MACL, Rn
pub fn sts_macl(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.gpr[rn(opcode)] = cpu.registers.macl;
}

// STS PR, Rn
pub fn sts_pr(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.gpr[rn(opcode)] = cpu.registers.pr;
}

// STS.L MACH, @-Rn
pub fn sts_l_mach(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    push_longword(cpu, opcode, cpu.registers.mach, bus);
}

// STS.L MACL, @-Rn
pub fn sts_l_macl(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    push_longword(cpu, opcode, cpu.registers.macl, bus);
}

// STS.L PR, @-Rn
pub fn sts_l_pr(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    push_longword(cpu, opcode, cpu.registers.pr, bus);
}

// CLRT
pub fn clrt(cpu: &mut Sh2) {
    cpu.registers.sr.t = false;
}

// SETT
pub fn sett(cpu: &mut Sh2) {
    cpu.registers.sr.t = true;
}

// CLRMAC
pub fn clrmac(cpu: &mut Sh2) {
    cpu.registers.mach = 0;
    cpu.registers.macl = 0;
}

// SLEEP
// Halts instruction execution until an interrupt is accepted
pub fn sleep(cpu: &mut Sh2) {
    log::trace!("[{}] SLEEP at {:08X}", cpu.name(), cpu.registers.pc.wrapping_sub(2));
    cpu.sleeping = true;
    cpu.cycles = cpu.cycles.wrapping_add(2);
}
