//! Pluggable SH-2 execution cores
//!
//! A core only decides how instructions are executed. All architectural state lives in [`Sh2`],
//! so switching cores between slices is always safe.

use crate::Sh2;
use crate::bus::BusInterface;
use crate::instructions;
use bincode::{Decode, Encode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Sh2Error {
    #[error("No SH-2 core named '{0}'")]
    UnknownCore(String),
    #[error("Failed to initialize SH-2 core {core}: {reason}")]
    CoreInit { core: &'static str, reason: String },
    #[error("Breakpoint table is full ({0} entries)")]
    BreakpointTableFull(usize),
    #[error("Breakpoint already set at {0:08X}")]
    DuplicateBreakpoint(u32),
    #[error("No breakpoint set at {0:08X}")]
    BreakpointNotFound(u32),
    #[error("Invalid memory breakpoint at {address:08X} with flags {flags:02X}")]
    InvalidMemoryBreakpoint { address: u32, flags: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum Sh2CoreId {
    Dummy,
    #[default]
    Interpreter,
}

pub trait Sh2Core: Sync {
    fn id(&self) -> Sh2CoreId;

    fn name(&self) -> &'static str;

    /// # Errors
    ///
    /// Returns an error if the core cannot be used on this host.
    fn init(&self) -> Result<(), Sh2Error> {
        Ok(())
    }

    fn reset(&self, _cpu: &mut Sh2) {}

    /// Run `cpu` until its cycle counter has advanced by at least `cycles`, or until it stops on a
    /// breakpoint.
    fn execute(&self, cpu: &mut Sh2, cycles: u32, bus: &mut dyn BusInterface);

    /// Memory in `[start, start + len)` was written outside of the CPU's view. Cores that cache
    /// decoded code drop anything in the range.
    fn write_notify(&self, _start: u32, _len: u32) {}
}

/// Burns the cycle budget without executing anything.
pub struct DummyCore;

impl Sh2Core for DummyCore {
    fn id(&self) -> Sh2CoreId {
        Sh2CoreId::Dummy
    }

    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn execute(&self, cpu: &mut Sh2, cycles: u32, _bus: &mut dyn BusInterface) {
        cpu.cycles = cpu.cycles.wrapping_add(cycles);
    }
}

pub struct InterpreterCore;

impl Sh2Core for InterpreterCore {
    fn id(&self) -> Sh2CoreId {
        Sh2CoreId::Interpreter
    }

    fn name(&self) -> &'static str {
        "Interpreter"
    }

    fn execute(&self, cpu: &mut Sh2, cycles: u32, bus: &mut dyn BusInterface) {
        let target = cpu.cycles.wrapping_add(cycles);

        // Signed distance so that the loop ends correctly when the counter wraps
        while (target.wrapping_sub(cpu.cycles) as i32) > 0 {
            let pc = cpu.registers.pc;
            if cpu.debug.should_stop_before(pc, cpu.registers.pr) {
                log::debug!("[{}] Stopped at {pc:08X}", cpu.name());
                break;
            }

            let in_delay_slot = cpu.registers.next_op_in_delay_slot;
            if !in_delay_slot && cpu.accept_interrupt(bus) {
                cpu.sleeping = false;
                continue;
            }

            if cpu.sleeping {
                // Nothing to do until an interrupt arrives
                cpu.cycles = target;
                break;
            }

            let opcode = cpu.fetch_instruction(pc, bus);
            cpu.registers.pc = cpu.registers.next_pc;
            cpu.registers.next_pc = cpu.registers.pc.wrapping_add(2);
            cpu.registers.next_op_in_delay_slot = false;
            cpu.cycles = cpu.cycles.wrapping_add(1);

            if in_delay_slot && instructions::is_branch(opcode) {
                instructions::slot_illegal(cpu, pc, opcode, bus);
                continue;
            }

            instructions::decode(opcode)(cpu, opcode, bus);

            cpu.debug.after_instruction(pc, opcode, cpu.registers.pr);

            if bus.take_input_capture() {
                cpu.input_capture();
                cpu.sleeping = false;
            }

            if let Some((address, flags)) = bus.take_memory_breakpoint_hit() {
                if cpu.debug.record_memory_hit(address, flags) {
                    break;
                }
            }
        }
    }
}

static DUMMY: DummyCore = DummyCore;
static INTERPRETER: InterpreterCore = InterpreterCore;

pub static SH2_CORES: [&'static dyn Sh2Core; 2] = [&DUMMY, &INTERPRETER];

#[must_use]
pub fn core_for(id: Sh2CoreId) -> &'static dyn Sh2Core {
    match id {
        Sh2CoreId::Dummy => &DUMMY,
        Sh2CoreId::Interpreter => &INTERPRETER,
    }
}

/// # Errors
///
/// Returns [`Sh2Error::UnknownCore`] if no core has the given name (case-insensitive).
pub fn find_core_by_name(name: &str) -> Result<&'static dyn Sh2Core, Sh2Error> {
    SH2_CORES
        .iter()
        .copied()
        .find(|core| core.name().eq_ignore_ascii_case(name))
        .ok_or_else(|| Sh2Error::UnknownCore(name.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn lookup_by_name() {
        assert_eq!(find_core_by_name("interpreter").unwrap().id(), Sh2CoreId::Interpreter);
        assert_eq!(find_core_by_name("DUMMY").unwrap().id(), Sh2CoreId::Dummy);
        assert!(matches!(find_core_by_name("jit"), Err(Sh2Error::UnknownCore(_))));
    }

    #[test]
    fn core_table_ids_match() {
        for core in SH2_CORES {
            assert_eq!(core_for(core.id()).name(), core.name());
        }
    }
}
