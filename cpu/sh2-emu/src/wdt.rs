//! SH7604 watchdog timer
//!
//! Only interval timer mode is emulated; an overflow in watchdog mode is logged and ignored.

use crate::interrupts::{InterruptControl, InterruptQueue};
use bincode::{Decode, Encode};
use saturn_common::num::GetBit;

fn clock_shift_select(wtcsr: u16) -> u32 {
    match wtcsr & 7 {
        // sysclk/2
        0 => 1,
        // sysclk/64
        1 => 6,
        // sysclk/128
        2 => 7,
        // sysclk/256
        3 => 8,
        // sysclk/512
        4 => 9,
        // sysclk/1024
        5 => 10,
        // sysclk/4096
        6 => 12,
        // sysclk/8192
        7 => 13,
        _ => unreachable!("value & 7 is always <= 7"),
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct WatchdogTimer {
    // $FFFFFE80: WTCSR (Watchdog timer control/status register)
    pub wtcsr: u8,
    // $FFFFFE81: WTCNT (Watchdog timer counter)
    pub wtcnt: u8,
    // $FFFFFE83: RSTCSR (Reset control/status register)
    pub rstcsr: u8,
    enabled: bool,
    interval_mode: bool,
    shift: u32,
    leftover: u32,
    last_cycles: u32,
}

impl WatchdogTimer {
    pub fn new() -> Self {
        Self {
            wtcsr: 0x18,
            wtcnt: 0x00,
            rstcsr: 0x1F,
            enabled: false,
            interval_mode: true,
            shift: 1,
            leftover: 0,
            last_cycles: 0,
        }
    }

    pub fn reset(&mut self, cycles: u32) {
        *self = Self::new();
        self.last_cycles = cycles;
    }

    pub fn catch_up(
        &mut self,
        cycles: u32,
        intc: &InterruptControl,
        interrupts: &mut InterruptQueue,
    ) {
        let elapsed = cycles.wrapping_sub(self.last_cycles);
        self.last_cycles = cycles;

        if !self.enabled || self.wtcsr.bit(7) || self.rstcsr.bit(7) {
            return;
        }

        let mask = (1 << self.shift) - 1;
        let ticks = elapsed.wrapping_add(self.leftover);
        let counter = u32::from(self.wtcnt) + (ticks >> self.shift);
        self.leftover = ticks & mask;

        if counter > 0xFF {
            if self.interval_mode {
                self.wtcsr |= 0x80;
                interrupts.send(intc.wdt_vector(), intc.wdt_level());
            } else {
                log::warn!("Watchdog timer overflowed in watchdog mode; reset not implemented");
            }
        }

        self.wtcnt = counter as u8;
    }

    pub fn read_byte(&self, address: u32) -> Option<u8> {
        match address {
            0x80 => Some(self.wtcsr),
            0x81 => Some(self.wtcnt),
            0x83 => Some(self.rstcsr),
            _ => None,
        }
    }

    /// Enabling the timer through WTCSR also clears the SBY bit in `sbycr`.
    pub fn write_word(&mut self, address: u32, value: u16, sbycr: &mut u8) {
        match address {
            // WTCSR and WTCNT share an address, selected by the upper byte of the written word
            0x80 => match value >> 8 {
                0xA5 => self.write_wtcsr(value, sbycr),
                0x5A => {
                    if self.wtcsr.bit(5) {
                        self.wtcnt = value as u8;
                    }
                }
                _ => log::debug!("Invalid WTCSR/WTCNT write key {value:04X}"),
            },
            0x82 => {
                if value == 0xA500 {
                    // Clear WOVF
                    self.rstcsr &= 0x7F;
                } else if value >> 8 == 0x5A {
                    // RSTE and RSTS
                    self.rstcsr = (self.rstcsr & 0x80) | ((value as u8) & 0x60) | 0x1F;
                }
            }
            _ => log::debug!("Unexpected WDT word write {address:03X} {value:04X}"),
        }
    }

    fn write_wtcsr(&mut self, value: u16, sbycr: &mut u8) {
        self.shift = clock_shift_select(value);
        self.enabled = value.bit(5);
        self.interval_mode = !value.bit(6);

        // Writes always clear OVF
        self.wtcsr = (value as u8) & 0x67;
        if self.enabled {
            *sbycr &= 0x7F;
        } else {
            self.wtcnt = 0;
        }

        log::trace!("WTCSR write: {value:04X}");
        log::trace!("  Enabled: {}", self.enabled);
        log::trace!("  Mode: {}", if self.interval_mode { "Interval" } else { "Watchdog" });
        log::trace!("  Clock divider: {}", 1 << self.shift);
    }
}

impl Default for WatchdogTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn disabled_timer_does_not_count() {
        let intc = InterruptControl::default();
        let mut interrupts = InterruptQueue::new();
        let mut wdt = WatchdogTimer::new();

        wdt.catch_up(10_000, &intc, &mut interrupts);
        assert_eq!(wdt.wtcnt, 0);
    }

    #[test]
    fn interval_overflow_raises_interrupt() {
        let mut intc = InterruptControl::default();
        intc.write_word(0x0E2, 0x0030);
        intc.write_word(0x0E4, 0x4300);

        let mut interrupts = InterruptQueue::new();
        let mut wdt = WatchdogTimer::new();
        let mut sbycr = 0xE0;

        // Enable, interval mode, sysclk/64
        wdt.write_word(0x80, 0xA521, &mut sbycr);
        assert_eq!(sbycr, 0x60);
        wdt.write_word(0x80, 0x5AF0, &mut sbycr);
        assert_eq!(wdt.wtcnt, 0xF0);

        wdt.catch_up(16 * 64, &intc, &mut interrupts);
        assert_eq!(wdt.wtcnt, 0x00);
        assert!(wdt.wtcsr.bit(7));
        assert_eq!(interrupts.highest().map(|i| (i.vector, i.level)), Some((0x43, 3)));
    }

    #[test]
    fn wtcnt_write_requires_enabled_timer() {
        let mut wdt = WatchdogTimer::new();
        let mut sbycr = 0x60;
        wdt.write_word(0x80, 0x5A55, &mut sbycr);
        assert_eq!(wdt.wtcnt, 0);
    }
}
