//! Branches, calls and exception returns
//!
//! When an instruction executes, `registers.pc` already points at the following instruction, so
//! the architectural PC (instruction address + 4) is `registers.pc + 2`.

use crate::Sh2;
use crate::bus::BusInterface;
use crate::instructions::rn;

const SP: usize = 15;

fn architectural_pc(cpu: &Sh2) -> u32 {
    cpu.registers.pc.wrapping_add(2)
}

fn delayed_jump(cpu: &mut Sh2, target: u32) {
    cpu.registers.next_pc = target;
    cpu.registers.next_op_in_delay_slot = true;
}

// 12-bit signed word displacement, in bytes
fn long_displacement(opcode: u16) -> u32 {
    (((opcode << 4) as i16) >> 3) as u32
}

// 8-bit signed word displacement, in bytes
fn short_displacement(opcode: u16) -> u32 {
    (opcode as i8 as u32) << 1
}

// BRA label
pub fn bra(cpu: &mut Sh2, opcode: u16) {
    let target = architectural_pc(cpu).wrapping_add(long_displacement(opcode));
    delayed_jump(cpu, target);
    cpu.cycles = cpu.cycles.wrapping_add(1);
}

// BSR label
pub fn bsr(cpu: &mut Sh2, opcode: u16) {
    let pc = architectural_pc(cpu);
    cpu.registers.pr = pc;
    delayed_jump(cpu, pc.wrapping_add(long_displacement(opcode)));
    cpu.cycles = cpu.cycles.wrapping_add(1);
}

// BRAF Rm
pub fn braf(cpu: &mut Sh2, opcode: u16) {
    let target = architectural_pc(cpu).wrapping_add(cpu.registers.gpr[rn(opcode)]);
    delayed_jump(cpu, target);
    cpu.cycles = cpu.cycles.wrapping_add(1);
}

// BSRF Rm
pub fn bsrf(cpu: &mut Sh2, opcode: u16) {
    let pc = architectural_pc(cpu);
    cpu.registers.pr = pc;
    delayed_jump(cpu, pc.wrapping_add(cpu.registers.gpr[rn(opcode)]));
    cpu.cycles = cpu.cycles.wrapping_add(1);
}

// JMP @Rm
pub fn jmp(cpu: &mut Sh2, opcode: u16) {
    delayed_jump(cpu, cpu.registers.gpr[rn(opcode)]);
    cpu.cycles = cpu.cycles.wrapping_add(1);
}

// JSR @Rm
pub fn jsr(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.pr = architectural_pc(cpu);
    delayed_jump(cpu, cpu.registers.gpr[rn(opcode)]);
    cpu.cycles = cpu.cycles.wrapping_add(1);
}

// RTS
pub fn rts(cpu: &mut Sh2) {
    delayed_jump(cpu, cpu.registers.pr);
    cpu.cycles = cpu.cycles.wrapping_add(1);
}

// RTE
// Pops PC then SR; the SR write takes effect before the delay slot executes
pub fn rte(cpu: &mut Sh2, bus: &mut dyn BusInterface) {
    let sp = cpu.registers.gpr[SP];
    let pc = cpu.read_longword(sp, bus);
    let sr = cpu.read_longword(sp.wrapping_add(4), bus);
    cpu.registers.gpr[SP] = sp.wrapping_add(8);
    cpu.registers.sr = sr.into();

    delayed_jump(cpu, pc);
    cpu.cycles = cpu.cycles.wrapping_add(3);
}

// BT label / BF label
// Not delayed; a taken branch costs 2 extra cycles
fn conditional_branch(cpu: &mut Sh2, opcode: u16, condition: bool) {
    if condition {
        let target = architectural_pc(cpu).wrapping_add(short_displacement(opcode));
        cpu.registers.jump_to(target);
        cpu.cycles = cpu.cycles.wrapping_add(2);
    }
}

// BT/S label / BF/S label
fn conditional_branch_delayed(cpu: &mut Sh2, opcode: u16, condition: bool) {
    if condition {
        let target = architectural_pc(cpu).wrapping_add(short_displacement(opcode));
        delayed_jump(cpu, target);
        cpu.cycles = cpu.cycles.wrapping_add(1);
    }
}

// BT label
pub fn bt(cpu: &mut Sh2, opcode: u16) {
    conditional_branch(cpu, opcode, cpu.registers.sr.t);
}

// BF label
pub fn bf(cpu: &mut Sh2, opcode: u16) {
    conditional_branch(cpu, opcode, !cpu.registers.sr.t);
}

// BT/S label
pub fn bt_s(cpu: &mut Sh2, opcode: u16) {
    conditional_branch_delayed(cpu, opcode, cpu.registers.sr.t);
}

// BF/S label
pub fn bf_s(cpu: &mut Sh2, opcode: u16) {
    conditional_branch_delayed(cpu, opcode, !cpu.registers.sr.t);
}

// TRAPA #imm
pub fn trapa(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let vector = opcode as u8;
    log::trace!("[{}] TRAPA #{vector:02X} at {:08X}", cpu.name(), cpu.registers.pc.wrapping_sub(2));

    let return_pc = cpu.registers.pc;
    cpu.enter_exception(vector, return_pc, bus);
    cpu.cycles = cpu.cycles.wrapping_add(7);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WhichCpu;
    use crate::engine::Sh2CoreId;
    use test_log::test;

    fn cpu_at(pc: u32) -> Sh2 {
        let mut cpu = Sh2::new(WhichCpu::Master, Sh2CoreId::Interpreter);
        // As seen by an executing instruction at `pc`
        cpu.registers.pc = pc.wrapping_add(2);
        cpu.registers.next_pc = pc.wrapping_add(4);
        cpu
    }

    #[test]
    fn bra_and_bsr_targets() {
        let mut cpu = cpu_at(0x06000100);
        // BRA with displacement -2 words
        bra(&mut cpu, 0xAFFE);
        assert_eq!(cpu.registers.next_pc, 0x06000100);
        assert!(cpu.registers.next_op_in_delay_slot);

        let mut cpu = cpu_at(0x06000100);
        // BSR +0x10 words
        bsr(&mut cpu, 0xB010);
        assert_eq!(cpu.registers.pr, 0x06000104);
        assert_eq!(cpu.registers.next_pc, 0x06000124);
    }

    #[test]
    fn conditional_branches() {
        let mut cpu = cpu_at(0x06000200);
        cpu.registers.sr.t = true;
        // BT -4 words
        bt(&mut cpu, 0x89FC);
        assert_eq!(cpu.registers.pc, 0x060001FC);
        assert!(!cpu.registers.next_op_in_delay_slot);

        let mut cpu = cpu_at(0x06000200);
        cpu.registers.sr.t = true;
        bf(&mut cpu, 0x8B10);
        assert_eq!(cpu.registers.pc, 0x06000202);

        let mut cpu = cpu_at(0x06000200);
        cpu.registers.sr.t = false;
        bf_s(&mut cpu, 0x8F02);
        assert_eq!(cpu.registers.next_pc, 0x06000208);
        assert!(cpu.registers.next_op_in_delay_slot);
    }

    #[test]
    fn far_branches_are_pc_relative() {
        let mut cpu = cpu_at(0x06001000);
        cpu.registers.gpr[3] = 0x100;
        // BSRF R3
        bsrf(&mut cpu, 0x0303);
        assert_eq!(cpu.registers.pr, 0x06001004);
        assert_eq!(cpu.registers.next_pc, 0x06001104);

        // JSR @R3
        jsr(&mut cpu, 0x430B);
        assert_eq!(cpu.registers.next_pc, 0x100);
    }
}
