//! Hitachi SH7604 (SH-2) emulation for the Sega Saturn's master and slave CPUs.

pub mod bus;
pub mod cache;
pub mod debug;
pub mod divu;
pub mod dma;
pub mod engine;
pub mod frt;
mod instructions;
pub mod interrupts;
mod memory;
pub mod onchip;
pub mod registers;
pub mod sci;
pub mod wdt;

use crate::bus::BusInterface;
use crate::cache::CpuCache;
use crate::debug::{BreakpointHit, DebugState, MemoryAccessFlags, MemoryBreakpoint};
use crate::divu::DivisionUnit;
use crate::dma::DmaController;
use crate::engine::{Sh2CoreId, Sh2Error};
use crate::frt::FreeRunTimer;
use crate::interrupts::{Interrupt, InterruptControl, InterruptQueue, NMI_LEVEL, NMI_VECTOR};
use crate::onchip::{BusStateController, UserBreakController};
use crate::registers::{RESET_SR, Sh2RegisterSnapshot, Sh2Registers, StatusRegister};
use crate::sci::SerialInterface;
use crate::wdt::WatchdogTimer;
use bincode::{Decode, Encode};

// R15 is the hardware stack pointer
const SP: usize = 15;

// The slave BIOS parks here while waiting for the master's go-ahead
const SLAVE_HANDSHAKE_ADDRESS: u32 = 0x06000250;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum WhichCpu {
    Master,
    Slave,
}

impl WhichCpu {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Master => "MSH2",
            Self::Slave => "SSH2",
        }
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Sh2 {
    which: WhichCpu,
    registers: Sh2Registers,
    // Wrapping timeline counter; timers measure elapsed time as deltas against it
    cycles: u32,
    sleeping: bool,
    interrupts: InterruptQueue,
    intc: InterruptControl,
    sci: SerialInterface,
    frt: FreeRunTimer,
    wdt: WatchdogTimer,
    divu: DivisionUnit,
    dmac: DmaController,
    cache: CpuCache,
    bsc: BusStateController,
    ubc: UserBreakController,
    // $FFFFFE91: SBYCR (Standby control register)
    sbycr: u8,
    core_id: Sh2CoreId,
    debug: DebugState,
}

impl Sh2 {
    #[must_use]
    pub fn new(which: WhichCpu, core_id: Sh2CoreId) -> Self {
        let mut cpu = Self {
            which,
            registers: Sh2Registers::default(),
            cycles: 0,
            sleeping: false,
            interrupts: InterruptQueue::new(),
            intc: InterruptControl::default(),
            sci: SerialInterface::new(),
            frt: FreeRunTimer::new(),
            wdt: WatchdogTimer::new(),
            divu: DivisionUnit::new(),
            dmac: DmaController::new(),
            cache: CpuCache::new(),
            bsc: BusStateController::new(which == WhichCpu::Slave),
            ubc: UserBreakController::default(),
            sbycr: 0x60,
            core_id,
            debug: DebugState::new(),
        };
        cpu.reset();
        cpu
    }

    /// # Errors
    ///
    /// Propagates the selected core's initialization failure.
    pub fn init_core(&self) -> Result<(), Sh2Error> {
        engine::core_for(self.core_id).init()
    }

    #[must_use]
    pub fn core_id(&self) -> Sh2CoreId {
        self.core_id
    }

    /// # Errors
    ///
    /// Returns an error if the new core fails to initialize; the current core is kept in that case.
    pub fn set_core(&mut self, core_id: Sh2CoreId) -> Result<(), Sh2Error> {
        engine::core_for(core_id).init()?;
        self.core_id = core_id;
        Ok(())
    }

    #[must_use]
    pub fn which(&self) -> WhichCpu {
        self.which
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.which.name()
    }

    #[must_use]
    pub fn is_slave(&self) -> bool {
        self.which == WhichCpu::Slave
    }

    /// Reset registers and on-chip state. PC and SP are not loaded; see [`Self::power_on_reset`].
    pub fn reset(&mut self) {
        self.registers.gpr = [0; 16];
        self.registers.sr = StatusRegister::from(RESET_SR);
        self.registers.gbr = 0;
        self.registers.vbr = 0;
        self.registers.mach = 0;
        self.registers.macl = 0;
        self.registers.pr = 0;
        self.registers.next_op_in_delay_slot = false;
        self.cycles = 0;
        self.sleeping = false;

        self.interrupts.clear();
        self.intc = InterruptControl::default();
        self.sci = SerialInterface::new();
        self.frt.reset(self.cycles);
        self.wdt.reset(self.cycles);
        self.divu = DivisionUnit::new();
        self.dmac.reset();
        self.bsc.reset();
        self.ubc = UserBreakController::default();
        self.sbycr = 0x60;

        self.cache.write_ccr(0);
        self.cache.invalidate_all();

        self.debug.reset();
        if self.is_slave() {
            if let Err(err) = self.debug.add_code_breakpoint(SLAVE_HANDSHAKE_ADDRESS) {
                log::debug!("[{}] Handshake breakpoint not installed: {err}", self.name());
            }
        }

        engine::core_for(self.core_id).reset(self);

        log::debug!("[{}] Reset", self.name());
    }

    /// Load PC and SP from the vector table at VBR.
    pub fn power_on_reset(&mut self, bus: &mut dyn BusInterface) {
        let vbr = self.registers.vbr;
        let pc = self.read_longword(vbr, bus);
        self.registers.gpr[SP] = self.read_longword(vbr.wrapping_add(4), bus);
        self.registers.jump_to(pc);

        log::debug!(
            "[{}] Power-on reset: PC={pc:08X} SP={:08X}",
            self.name(),
            self.registers.gpr[SP]
        );
    }

    /// Run for `cycles` CPU cycles, then bring the timers and DMA controller up to date.
    pub fn exec(&mut self, cycles: u32, bus: &mut dyn BusInterface) {
        engine::core_for(self.core_id).execute(self, cycles, bus);

        self.frt.catch_up(self.cycles, &self.intc, &mut self.interrupts);
        self.wdt.catch_up(self.cycles, &self.intc, &mut self.interrupts);
        self.dma_proc(cycles.min(i32::MAX as u32) as i32, bus);
    }

    #[must_use]
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Charge extra cycles, e.g. for bus contention outside of this CPU's own accesses.
    pub fn add_cycles(&mut self, cycles: u32) {
        self.cycles = self.cycles.wrapping_add(cycles);
    }

    // Accesses as seen by this CPU: through its cache and on-chip registers, charged to its
    // cycle counter

    pub fn read_memory_byte(&mut self, address: u32, bus: &mut dyn BusInterface) -> u8 {
        self.read_byte(address, bus)
    }

    pub fn read_memory_word(&mut self, address: u32, bus: &mut dyn BusInterface) -> u16 {
        self.read_word(address, bus)
    }

    pub fn read_memory_longword(&mut self, address: u32, bus: &mut dyn BusInterface) -> u32 {
        self.read_longword(address, bus)
    }

    pub fn write_memory_byte(&mut self, address: u32, value: u8, bus: &mut dyn BusInterface) {
        self.write_byte(address, value, bus);
    }

    pub fn write_memory_word(&mut self, address: u32, value: u16, bus: &mut dyn BusInterface) {
        self.write_word(address, value, bus);
    }

    pub fn write_memory_longword(&mut self, address: u32, value: u32, bus: &mut dyn BusInterface) {
        self.write_longword(address, value, bus);
    }

    /// Spend a DMA budget without executing instructions.
    pub fn run_dma(&mut self, cycles: i32, bus: &mut dyn BusInterface) {
        self.dma_proc(cycles, bus);
    }

    #[must_use]
    pub fn gpr(&self, register: usize) -> u32 {
        self.registers.gpr[register & 0xF]
    }

    pub fn set_gpr(&mut self, register: usize, value: u32) {
        self.registers.gpr[register & 0xF] = value;
    }

    #[must_use]
    pub fn sr(&self) -> u32 {
        self.registers.sr.into()
    }

    pub fn set_sr(&mut self, value: u32) {
        self.registers.sr = value.into();
    }

    #[must_use]
    pub fn gbr(&self) -> u32 {
        self.registers.gbr
    }

    pub fn set_gbr(&mut self, value: u32) {
        self.registers.gbr = value;
    }

    #[must_use]
    pub fn vbr(&self) -> u32 {
        self.registers.vbr
    }

    pub fn set_vbr(&mut self, value: u32) {
        self.registers.vbr = value;
    }

    #[must_use]
    pub fn mach(&self) -> u32 {
        self.registers.mach
    }

    pub fn set_mach(&mut self, value: u32) {
        self.registers.mach = value;
    }

    #[must_use]
    pub fn macl(&self) -> u32 {
        self.registers.macl
    }

    pub fn set_macl(&mut self, value: u32) {
        self.registers.macl = value;
    }

    #[must_use]
    pub fn pr(&self) -> u32 {
        self.registers.pr
    }

    pub fn set_pr(&mut self, value: u32) {
        self.registers.pr = value;
    }

    #[must_use]
    pub fn pc(&self) -> u32 {
        self.registers.pc
    }

    pub fn set_pc(&mut self, value: u32) {
        self.registers.jump_to(value);
    }

    #[must_use]
    pub fn registers(&self) -> Sh2RegisterSnapshot {
        Sh2RegisterSnapshot {
            gpr: self.registers.gpr,
            sr: self.registers.sr.into(),
            gbr: self.registers.gbr,
            vbr: self.registers.vbr,
            mach: self.registers.mach,
            macl: self.registers.macl,
            pr: self.registers.pr,
            pc: self.registers.pc,
        }
    }

    pub fn set_registers(&mut self, snapshot: &Sh2RegisterSnapshot) {
        self.registers.gpr = snapshot.gpr;
        self.registers.sr = snapshot.sr.into();
        self.registers.gbr = snapshot.gbr;
        self.registers.vbr = snapshot.vbr;
        self.registers.mach = snapshot.mach;
        self.registers.macl = snapshot.macl;
        self.registers.pr = snapshot.pr;
        self.registers.jump_to(snapshot.pc);
    }

    pub fn send_interrupt(&mut self, vector: u8, level: u8) {
        log::trace!("[{}] Interrupt request: vector {vector:02X} level {level}", self.name());
        self.interrupts.send(vector, level);
    }

    pub fn remove_interrupt(&mut self, vector: u8, level: u8) {
        self.interrupts.remove(vector, level);
    }

    pub fn nmi(&mut self) {
        self.intc.icr |= 0x8000;
        self.send_interrupt(NMI_VECTOR, NMI_LEVEL);
    }

    #[must_use]
    pub fn interrupts(&self) -> &[Interrupt] {
        self.interrupts.as_slice()
    }

    pub fn set_interrupts(&mut self, interrupts: &[Interrupt]) {
        self.interrupts.replace(interrupts);
    }

    /// Signal an edge on the FRT input capture pin.
    pub fn input_capture(&mut self) {
        self.frt.input_capture(self.cycles, &self.intc, &mut self.interrupts);
    }

    #[must_use]
    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    /// Resume execution after SLEEP without accepting an interrupt.
    pub fn wake(&mut self) {
        self.sleeping = false;
    }

    /// Notify the execution core that memory in `[start, start + len)` changed.
    pub fn write_notify(&self, start: u32, len: u32) {
        engine::core_for(self.core_id).write_notify(start, len);
    }

    #[must_use]
    pub fn cache_enabled(&self) -> bool {
        self.cache.enabled()
    }

    #[must_use]
    pub fn frt(&self) -> &FreeRunTimer {
        &self.frt
    }

    #[must_use]
    pub fn dmac(&self) -> &DmaController {
        &self.dmac
    }

    #[must_use]
    pub fn interrupt_control(&self) -> &InterruptControl {
        &self.intc
    }

    #[must_use]
    pub fn debug(&self) -> &DebugState {
        &self.debug
    }

    /// # Errors
    ///
    /// See [`DebugState::add_code_breakpoint`].
    pub fn add_code_breakpoint(&mut self, address: u32) -> Result<(), Sh2Error> {
        self.debug.add_code_breakpoint(address)
    }

    /// # Errors
    ///
    /// Returns an error if no breakpoint is set at `address`.
    pub fn remove_code_breakpoint(&mut self, address: u32) -> Result<(), Sh2Error> {
        self.debug.remove_code_breakpoint(address)
    }

    /// # Errors
    ///
    /// Returns an error if the address or flags are invalid, the address is already watched, or
    /// the table is full.
    pub fn add_memory_breakpoint(
        &mut self,
        address: u32,
        flags: MemoryAccessFlags,
    ) -> Result<MemoryBreakpoint, Sh2Error> {
        self.debug.add_memory_breakpoint(address, flags)
    }

    /// # Errors
    ///
    /// Returns an error if no breakpoint is set at `address`.
    pub fn remove_memory_breakpoint(&mut self, address: u32) -> Result<MemoryBreakpoint, Sh2Error> {
        self.debug.remove_memory_breakpoint(address)
    }

    #[must_use]
    pub fn memory_breakpoints(&self) -> &[MemoryBreakpoint] {
        self.debug.memory_breakpoints()
    }

    /// Called by the bus when an access matches a memory breakpoint.
    pub fn memory_breakpoint_hit(&mut self, address: u32, flags: MemoryAccessFlags) {
        self.debug.record_memory_hit(address, flags);
    }

    pub fn take_breakpoint_hit(&mut self) -> Option<BreakpointHit> {
        self.debug.take_hit()
    }

    pub fn set_break_enabled(&mut self, enabled: bool) {
        self.debug.set_break_enabled(enabled);
    }

    pub fn step_into(&mut self) {
        self.debug.step_into();
    }

    pub fn step_over(&mut self, bus: &mut dyn BusInterface) {
        let pc = self.registers.pc;
        let opcode = self.read_word(pc, bus);
        self.debug.step_over(pc, opcode);
    }

    pub fn step_out(&mut self) {
        self.debug.step_out();
    }

    #[must_use]
    pub fn backtrace(&self) -> &[u32] {
        self.debug.backtrace()
    }

    pub fn set_track_infinite_loops(&mut self, enabled: bool) {
        self.debug.set_track_infinite_loops(enabled);
    }

    #[must_use]
    pub fn infinite_loops(&self) -> &[u32] {
        self.debug.infinite_loops()
    }

    /// Accept the highest-priority pending interrupt if its level is above the SR mask.
    fn accept_interrupt(&mut self, bus: &mut dyn BusInterface) -> bool {
        let Some(interrupt) = self.interrupts.highest() else { return false };
        if interrupt.level <= self.registers.sr.interrupt_mask {
            return false;
        }

        self.interrupts.pop_highest();

        log::trace!(
            "[{}] Accepting interrupt vector {:02X} level {} at PC {:08X}",
            self.name(),
            interrupt.vector,
            interrupt.level,
            self.registers.pc
        );

        let return_pc = self.registers.pc;
        self.enter_exception(interrupt.vector, return_pc, bus);
        self.registers.sr.interrupt_mask = interrupt.level.min(15);

        true
    }

    /// Push SR and `return_pc`, then jump through the vector table.
    fn enter_exception(&mut self, vector: u8, return_pc: u32, bus: &mut dyn BusInterface) {
        let sr: u32 = self.registers.sr.into();

        let mut sp = self.registers.gpr[SP].wrapping_sub(4);
        self.write_longword(sp, sr, bus);
        sp = sp.wrapping_sub(4);
        self.write_longword(sp, return_pc, bus);
        self.registers.gpr[SP] = sp;

        let vector_address = self.registers.vbr.wrapping_add(u32::from(vector) << 2);
        let handler = self.read_longword(vector_address, bus);
        self.registers.jump_to(handler);
    }
}

#[cfg(test)]
mod tests;
