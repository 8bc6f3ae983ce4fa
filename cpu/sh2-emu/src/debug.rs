//! Debugger support: code and memory breakpoints, step over/out, backtrace, and a diagnostic that
//! flags tight loops.
//!
//! Breakpoint hits are recorded here and polled by the owner; the SH-2 never calls back into the
//! debugger while it is executing.

use crate::engine::Sh2Error;
use bincode::{Decode, Encode};
use std::collections::HashMap;

pub const MAX_BREAKPOINTS: usize = 10;
pub const MAX_BACKTRACE: usize = 256;

const EMPTY_SLOT: u32 = 0xFFFFFFFF;

// Opcodes that commonly close a polling loop: branch/compare/test forms
const LOOP_OPCODE_MASKS: [(u16, u16); 5] = [
    // BT
    (0xFF00, 0x8900),
    // BF
    (0xFF00, 0x8B00),
    // BT/S
    (0xFF00, 0x8D00),
    // BF/S
    (0xFF00, 0x8F00),
    // BRA
    (0xF000, 0xA000),
];

// Executions of the same backward branch before it is reported
const LOOP_REPORT_THRESHOLD: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct MemoryAccessFlags(u8);

impl MemoryAccessFlags {
    pub const BYTE_READ: Self = Self(0x01);
    pub const WORD_READ: Self = Self(0x02);
    pub const LONG_READ: Self = Self(0x04);
    pub const BYTE_WRITE: Self = Self(0x08);
    pub const WORD_WRITE: Self = Self(0x10);
    pub const LONG_WRITE: Self = Self(0x20);

    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0x3F)
    }

    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for MemoryAccessFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct MemoryBreakpoint {
    pub address: u32,
    pub flags: MemoryAccessFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum BreakpointHit {
    Code { pc: u32 },
    Memory { address: u32, flags: MemoryAccessFlags },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
enum StepMode {
    #[default]
    Off,
    // Stop before the next instruction
    Into,
    // Stop when PC reaches the given address
    Over { stop_pc: u32 },
    // Stop on return to the caller at the current call depth
    Out { depth: i32 },
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct DebugState {
    code_breakpoints: [u32; MAX_BREAKPOINTS],
    memory_breakpoints: Vec<MemoryBreakpoint>,
    // When clear, hits are logged but do not stop execution
    break_enabled: bool,
    // Skip the breakpoint check once after resuming from a hit at the same PC
    skip_breakpoint_once: bool,
    step: StepMode,
    hit: Option<BreakpointHit>,
    backtrace: Vec<u32>,
    track_loops: bool,
    loop_counts: HashMap<u32, u32>,
    reported_loops: Vec<u32>,
}

impl DebugState {
    pub fn new() -> Self {
        Self {
            code_breakpoints: [EMPTY_SLOT; MAX_BREAKPOINTS],
            memory_breakpoints: Vec::with_capacity(MAX_BREAKPOINTS),
            break_enabled: true,
            skip_breakpoint_once: false,
            step: StepMode::Off,
            hit: None,
            backtrace: Vec::with_capacity(MAX_BACKTRACE),
            track_loops: false,
            loop_counts: HashMap::new(),
            reported_loops: Vec::new(),
        }
    }

    pub fn code_breakpoints(&self) -> impl Iterator<Item = u32> + '_ {
        self.code_breakpoints.iter().copied().take_while(|&address| address != EMPTY_SLOT)
    }

    pub fn has_code_breakpoints(&self) -> bool {
        self.code_breakpoints[0] != EMPTY_SLOT
    }

    pub fn add_code_breakpoint(&mut self, address: u32) -> Result<(), Sh2Error> {
        if self.code_breakpoints().any(|existing| existing == address) {
            return Err(Sh2Error::DuplicateBreakpoint(address));
        }

        let Some(slot) = self.code_breakpoints.iter().position(|&slot| slot == EMPTY_SLOT) else {
            return Err(Sh2Error::BreakpointTableFull(MAX_BREAKPOINTS));
        };

        self.code_breakpoints[slot] = address;
        self.code_breakpoints.sort_unstable();

        log::debug!("Added code breakpoint at {address:08X}");

        Ok(())
    }

    pub fn remove_code_breakpoint(&mut self, address: u32) -> Result<(), Sh2Error> {
        let Some(slot) = self.code_breakpoints().position(|existing| existing == address) else {
            return Err(Sh2Error::BreakpointNotFound(address));
        };

        self.code_breakpoints[slot] = EMPTY_SLOT;
        self.code_breakpoints.sort_unstable();

        log::debug!("Removed code breakpoint at {address:08X}");

        Ok(())
    }

    pub fn clear_code_breakpoints(&mut self) {
        self.code_breakpoints = [EMPTY_SLOT; MAX_BREAKPOINTS];
    }

    pub fn memory_breakpoints(&self) -> &[MemoryBreakpoint] {
        &self.memory_breakpoints
    }

    /// Register a memory breakpoint. Only the BIOS/RAM/external bus regions (address bits 29-31 of
    /// 0, 1 or 5) can be watched; the cache-through bits are stripped from the stored address.
    pub fn add_memory_breakpoint(
        &mut self,
        address: u32,
        flags: MemoryAccessFlags,
    ) -> Result<MemoryBreakpoint, Sh2Error> {
        if flags.is_empty() || !matches!(address >> 29, 0 | 1 | 5) {
            return Err(Sh2Error::InvalidMemoryBreakpoint { address, flags: flags.bits() });
        }

        let address = address & 0x0FFFFFFF;
        if self.memory_breakpoints.iter().any(|breakpoint| breakpoint.address == address) {
            return Err(Sh2Error::DuplicateBreakpoint(address));
        }

        if self.memory_breakpoints.len() == MAX_BREAKPOINTS {
            return Err(Sh2Error::BreakpointTableFull(MAX_BREAKPOINTS));
        }

        let breakpoint = MemoryBreakpoint { address, flags };
        self.memory_breakpoints.push(breakpoint);

        log::debug!("Added memory breakpoint at {address:08X} with flags {:02X}", flags.bits());

        Ok(breakpoint)
    }

    pub fn remove_memory_breakpoint(&mut self, address: u32) -> Result<MemoryBreakpoint, Sh2Error> {
        let address = address & 0x0FFFFFFF;
        let idx = self
            .memory_breakpoints
            .iter()
            .position(|breakpoint| breakpoint.address == address)
            .ok_or(Sh2Error::BreakpointNotFound(address))?;

        Ok(self.memory_breakpoints.remove(idx))
    }

    pub fn clear_memory_breakpoints(&mut self) {
        self.memory_breakpoints.clear();
    }

    pub fn set_break_enabled(&mut self, enabled: bool) {
        self.break_enabled = enabled;
    }

    pub fn break_enabled(&self) -> bool {
        self.break_enabled
    }

    pub fn take_hit(&mut self) -> Option<BreakpointHit> {
        self.hit.take()
    }

    pub fn has_pending_hit(&self) -> bool {
        self.hit.is_some()
    }

    /// Record a memory breakpoint hit reported by the bus. Returns whether execution should stop.
    pub fn record_memory_hit(&mut self, address: u32, flags: MemoryAccessFlags) -> bool {
        log::debug!("Memory breakpoint hit at {address:08X} ({:02X})", flags.bits());
        self.hit = Some(BreakpointHit::Memory { address, flags });
        self.break_enabled
    }

    /// Check the code breakpoints and stepping state before the instruction at `pc` executes.
    /// Returns true if execution should stop before it.
    pub(crate) fn should_stop_before(&mut self, pc: u32, pr: u32) -> bool {
        if self.skip_breakpoint_once {
            self.skip_breakpoint_once = false;
            return false;
        }

        let stop_for_step = match self.step {
            StepMode::Off => false,
            StepMode::Into => true,
            StepMode::Over { stop_pc } => pc == stop_pc,
            StepMode::Out { depth } => depth < 0 && pc == pr,
        };
        if stop_for_step {
            self.step = StepMode::Off;
            self.hit = Some(BreakpointHit::Code { pc });
            self.skip_breakpoint_once = true;
            return true;
        }

        if self.has_code_breakpoints() && self.code_breakpoints().any(|address| address == pc) {
            log::debug!("Code breakpoint hit at {pc:08X}");
            self.hit = Some(BreakpointHit::Code { pc });
            if self.break_enabled {
                self.skip_breakpoint_once = true;
                return true;
            }
        }

        false
    }

    pub fn step_into(&mut self) {
        self.step = StepMode::Into;
    }

    /// Step over the instruction at `pc`. Subroutine calls run to the instruction after their delay
    /// slot; anything else is a single step.
    pub fn step_over(&mut self, pc: u32, opcode: u16) {
        self.step = if is_subroutine_call(opcode) {
            StepMode::Over { stop_pc: pc.wrapping_add(4) }
        } else {
            StepMode::Into
        };
    }

    pub fn step_out(&mut self) {
        self.step = StepMode::Out { depth: 0 };
    }

    pub fn stepping(&self) -> bool {
        self.step != StepMode::Off
    }

    /// Update call tracking after executing `opcode`. `pr` is the procedure register afterwards.
    pub(crate) fn after_instruction(&mut self, pc: u32, opcode: u16, pr: u32) {
        if is_subroutine_call(opcode) {
            if self.backtrace.len() == MAX_BACKTRACE {
                self.backtrace.remove(0);
            }
            self.backtrace.push(pr);

            if let StepMode::Out { depth } = &mut self.step {
                *depth += 1;
            }
        } else if opcode == RTS_OPCODE || opcode == RTE_OPCODE {
            if opcode == RTS_OPCODE {
                self.backtrace.pop();
            }

            if let StepMode::Out { depth } = &mut self.step {
                *depth -= 1;
            }
        }

        if self.track_loops {
            self.track_loop(pc, opcode);
        }
    }

    pub fn backtrace(&self) -> &[u32] {
        &self.backtrace
    }

    pub fn clear_backtrace(&mut self) {
        self.backtrace.clear();
    }

    pub fn set_track_infinite_loops(&mut self, enabled: bool) {
        self.track_loops = enabled;
        if !enabled {
            self.loop_counts.clear();
            self.reported_loops.clear();
        }
    }

    /// Addresses of branches that have executed often enough to look like a stuck loop.
    pub fn infinite_loops(&self) -> &[u32] {
        &self.reported_loops
    }

    fn track_loop(&mut self, pc: u32, opcode: u16) {
        if !LOOP_OPCODE_MASKS.iter().any(|&(mask, value)| opcode & mask == value) {
            return;
        }

        // Backward branches only; displacement sign bit
        let backward =
            if opcode & 0xF000 == 0xA000 { opcode & 0x0800 != 0 } else { opcode & 0x80 != 0 };
        if !backward {
            return;
        }

        let count = self.loop_counts.entry(pc).or_insert(0);
        *count += 1;
        if *count == LOOP_REPORT_THRESHOLD && !self.reported_loops.contains(&pc) {
            log::debug!("Possible infinite loop at {pc:08X}");
            self.reported_loops.push(pc);
        }
    }

    pub(crate) fn reset(&mut self) {
        self.backtrace.clear();
        self.step = StepMode::Off;
        self.hit = None;
        self.skip_breakpoint_once = false;
    }
}

impl Default for DebugState {
    fn default() -> Self {
        Self::new()
    }
}

const RTS_OPCODE: u16 = 0x000B;
const RTE_OPCODE: u16 = 0x002B;

/// BSR, BSRF and JSR.
#[must_use]
pub fn is_subroutine_call(opcode: u16) -> bool {
    opcode & 0xF000 == 0xB000 || opcode & 0xF0FF == 0x0003 || opcode & 0xF0FF == 0x400B
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn code_breakpoints_stay_sorted() {
        let mut debug = DebugState::new();
        debug.add_code_breakpoint(0x06004000).unwrap();
        debug.add_code_breakpoint(0x06000100).unwrap();
        debug.add_code_breakpoint(0x06002000).unwrap();

        assert_eq!(debug.code_breakpoints().collect::<Vec<_>>(), vec![
            0x06000100, 0x06002000, 0x06004000
        ]);

        debug.remove_code_breakpoint(0x06002000).unwrap();
        assert_eq!(debug.code_breakpoints().collect::<Vec<_>>(), vec![0x06000100, 0x06004000]);
    }

    #[test]
    fn code_breakpoint_limits() {
        let mut debug = DebugState::new();
        for i in 0..MAX_BREAKPOINTS as u32 {
            debug.add_code_breakpoint(0x06000000 + 2 * i).unwrap();
        }

        assert!(matches!(
            debug.add_code_breakpoint(0x06001000),
            Err(Sh2Error::BreakpointTableFull(MAX_BREAKPOINTS))
        ));
        assert!(matches!(
            debug.add_code_breakpoint(0x06000000),
            Err(Sh2Error::DuplicateBreakpoint(0x06000000))
        ));
        assert!(matches!(
            debug.remove_code_breakpoint(0x06001000),
            Err(Sh2Error::BreakpointNotFound(0x06001000))
        ));
    }

    #[test]
    fn memory_breakpoint_validation() {
        let mut debug = DebugState::new();

        assert!(debug.add_memory_breakpoint(0x06000000, MemoryAccessFlags::default()).is_err());
        assert!(debug.add_memory_breakpoint(0xC0000000, MemoryAccessFlags::BYTE_READ).is_err());

        let breakpoint = debug
            .add_memory_breakpoint(
                0x26000010,
                MemoryAccessFlags::LONG_WRITE | MemoryAccessFlags::WORD_WRITE,
            )
            .unwrap();
        assert_eq!(breakpoint.address, 0x06000010);
        assert!(breakpoint.flags.contains(MemoryAccessFlags::LONG_WRITE));
        assert!(!breakpoint.flags.intersects(MemoryAccessFlags::BYTE_READ));

        assert!(debug.add_memory_breakpoint(0x06000010, MemoryAccessFlags::BYTE_READ).is_err());
        debug.remove_memory_breakpoint(0x26000010).unwrap();
        assert!(debug.memory_breakpoints().is_empty());
    }

    #[test]
    fn hit_is_skipped_once_after_resume() {
        let mut debug = DebugState::new();
        debug.add_code_breakpoint(0x06000100).unwrap();

        assert!(debug.should_stop_before(0x06000100, 0));
        assert_eq!(debug.take_hit(), Some(BreakpointHit::Code { pc: 0x06000100 }));
        assert!(!debug.should_stop_before(0x06000100, 0));
        assert!(debug.should_stop_before(0x06000100, 0));
    }

    #[test]
    fn disabled_break_only_records() {
        let mut debug = DebugState::new();
        debug.add_code_breakpoint(0x06000100).unwrap();
        debug.set_break_enabled(false);

        assert!(!debug.should_stop_before(0x06000100, 0));
        assert!(debug.has_pending_hit());
    }

    #[test]
    fn step_over_call() {
        let mut debug = DebugState::new();
        // BSR
        debug.step_over(0x06000100, 0xB010);
        assert!(!debug.should_stop_before(0x06000124, 0));
        assert!(debug.should_stop_before(0x06000104, 0));

        // Non-call: single step, resuming at the instruction that stopped
        debug.step_over(0x06000104, 0x0009);
        assert!(!debug.should_stop_before(0x06000104, 0));
        assert!(debug.should_stop_before(0x06000106, 0));
    }

    #[test]
    fn step_out_tracks_depth_and_backtrace() {
        let mut debug = DebugState::new();
        debug.step_out();

        // Nested call and return inside the current function
        debug.after_instruction(0x06000200, 0x4F0B, 0x06000204);
        assert_eq!(debug.backtrace(), &[0x06000204]);
        debug.after_instruction(0x06000300, RTS_OPCODE, 0x06000204);
        assert!(debug.backtrace().is_empty());
        assert!(!debug.should_stop_before(0x06000204, 0x06000204));

        // Return from the function being stepped out of
        debug.after_instruction(0x06000210, RTS_OPCODE, 0x06000050);
        assert!(debug.should_stop_before(0x06000050, 0x06000050));
    }

    #[test]
    fn loop_tracking() {
        let mut debug = DebugState::new();
        debug.set_track_infinite_loops(true);

        // BF with a negative displacement
        for _ in 0..LOOP_REPORT_THRESHOLD {
            debug.after_instruction(0x06000400, 0x8BFE, 0);
        }
        // BT forward is ignored
        for _ in 0..LOOP_REPORT_THRESHOLD {
            debug.after_instruction(0x06000500, 0x8905, 0);
        }

        assert_eq!(debug.infinite_loops(), &[0x06000400]);
    }
}
