//! SH-2 external bus interface
//!
//! Addresses are passed through unmasked so that implementations can decode the full 32-bit
//! address. The `cycles` argument is the accessing CPU's cycle counter, which bus handlers charge
//! with per-region access costs; `None` marks an access that is not attributed to a CPU, such as
//! an on-chip DMA transfer.

use crate::debug::MemoryAccessFlags;

pub trait BusInterface {
    fn read_byte(&mut self, address: u32, cycles: Option<&mut u32>) -> u8;

    fn read_word(&mut self, address: u32, cycles: Option<&mut u32>) -> u16;

    fn read_longword(&mut self, address: u32, cycles: Option<&mut u32>) -> u32;

    fn write_byte(&mut self, address: u32, value: u8, cycles: Option<&mut u32>);

    fn write_word(&mut self, address: u32, value: u16, cycles: Option<&mut u32>);

    fn write_longword(&mut self, address: u32, value: u32, cycles: Option<&mut u32>);

    /// Whether the page containing `address` is backed by cacheable memory. Accesses to other
    /// pages through the cached address space go straight to the bus.
    fn is_cacheable(&self, _address: u32) -> bool {
        true
    }

    /// Memory breakpoint matched by an access since the last call, if any. Polled by the
    /// interpreter after every instruction.
    fn take_memory_breakpoint_hit(&mut self) -> Option<(u32, MemoryAccessFlags)> {
        None
    }

    /// Whether an input capture edge aimed at the executing CPU arrived since the last call,
    /// e.g. from the other CPU while it was being caught up. Polled after every instruction.
    fn take_input_capture(&mut self) -> bool {
        false
    }
}
