//! SCSP timers A, B and C

use bincode::{Decode, Encode};

const OVERFLOW: u32 = 0xFF00;

/// Interrupt bits for timers A, B and C.
pub const TIMER_INTERRUPTS: [u16; 3] = [1 << 6, 1 << 7, 1 << 8];

/// Interrupt bit raised once per generated sample.
pub const SAMPLE_INTERRUPT: u16 = 1 << 10;

/// 8-bit up-counters stored with 8 fractional bits. Each sample adds `1 << (8 - TxCTL)`.
#[derive(Debug, Clone, Encode, Decode)]
pub struct Timers {
    counters: [u32; 3],
    prescalers: [u8; 3],
}

impl Timers {
    #[must_use]
    pub fn new() -> Self {
        Self { counters: [OVERFLOW; 3], prescalers: [0; 3] }
    }

    #[must_use]
    pub fn prescaler(&self, timer: usize) -> u8 {
        self.prescalers[timer]
    }

    pub fn set_prescaler(&mut self, timer: usize, value: u8) {
        self.prescalers[timer] = value & 7;
    }

    pub fn set_counter(&mut self, timer: usize, value: u8) {
        self.counters[timer] = u32::from(value) << 8;
    }

    /// Advances all timers by `samples` samples and returns the interrupt bits to raise.
    #[must_use]
    pub fn tick(&mut self, samples: u32) -> u16 {
        let mut interrupts = 0;

        for (timer, interrupt) in TIMER_INTERRUPTS.into_iter().enumerate() {
            self.counters[timer] += samples << (8 - self.prescalers[timer]);
            if self.counters[timer] >= OVERFLOW {
                interrupts |= interrupt;
                self.counters[timer] -= OVERFLOW;
            }
        }

        if samples != 0 {
            interrupts |= SAMPLE_INTERRUPT;
        }

        interrupts
    }
}

impl Default for Timers {
    fn default() -> Self {
        Self::new()
    }
}
