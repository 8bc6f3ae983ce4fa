//! SH7604 free-running timer (FRT)
//!
//! The counter is not ticked per instruction. Instead it is caught up from the owning CPU's cycle
//! counter whenever a timer register is accessed and at the end of every execution slice.

use crate::interrupts::{InterruptControl, InterruptQueue};
use bincode::{Decode, Encode};
use saturn_common::num::GetBit;

fn clock_shift_select(tcr: u8) -> Option<u32> {
    match tcr & 3 {
        // sysclk/8
        0 => Some(3),
        // sysclk/32
        1 => Some(5),
        // sysclk/128
        2 => Some(7),
        // External clock input
        _ => None,
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct FreeRunTimer {
    // $FFFFFE10: TIER (Timer interrupt enable register)
    pub tier: u8,
    // $FFFFFE11: FTCSR (Free-running timer control/status register)
    pub ftcsr: u8,
    // $FFFFFE12-$FFFFFE13: FRC (Free-running counter)
    pub frc: u16,
    // $FFFFFE14-$FFFFFE15: OCRA/B (Output compare registers), selected by TOCR bit 4
    pub ocra: u16,
    pub ocrb: u16,
    // $FFFFFE16: TCR (Timer control register)
    pub tcr: u8,
    // $FFFFFE17: TOCR (Timer output compare control register)
    pub tocr: u8,
    // $FFFFFE18-$FFFFFE19: FICR (Input capture register)
    pub ficr: u16,
    shift: u32,
    leftover: u32,
    last_cycles: u32,
}

impl FreeRunTimer {
    pub fn new() -> Self {
        Self {
            tier: 0x01,
            ftcsr: 0x00,
            frc: 0x0000,
            ocra: 0xFFFF,
            ocrb: 0xFFFF,
            tcr: 0x00,
            tocr: 0xE0,
            ficr: 0x0000,
            shift: 3,
            leftover: 0,
            last_cycles: 0,
        }
    }

    pub fn reset(&mut self, cycles: u32) {
        *self = Self::new();
        self.last_cycles = cycles;
    }

    pub fn clock_shift(&self) -> u32 {
        self.shift
    }

    /// Advance the counter to `cycles`, raising compare-match and overflow interrupts.
    pub fn catch_up(
        &mut self,
        cycles: u32,
        intc: &InterruptControl,
        interrupts: &mut InterruptQueue,
    ) {
        let elapsed = cycles.wrapping_sub(self.last_cycles);
        self.last_cycles = cycles;

        let old_counter = u32::from(self.frc);
        let mask = (1 << self.shift) - 1;
        let ticks = elapsed.wrapping_add(self.leftover);
        let mut counter = old_counter + (ticks >> self.shift);
        self.leftover = ticks & mask;

        let ocra = u32::from(self.ocra);
        if counter >= ocra && old_counter < ocra {
            if self.tier.bit(3) {
                interrupts.send(intc.frt_compare_vector(), intc.frt_level());
            }

            // CCLRA: clear the counter on compare match A
            if self.ftcsr.bit(0) {
                counter = 0;
                self.leftover = 0;
            }

            self.ftcsr |= 0x08;
        }

        let ocrb = u32::from(self.ocrb);
        if counter >= ocrb && old_counter < ocrb {
            if self.tier.bit(2) {
                interrupts.send(intc.frt_compare_vector(), intc.frt_level());
            }

            self.ftcsr |= 0x04;
        }

        if counter > 0xFFFF {
            if self.tier.bit(1) {
                interrupts.send(intc.frt_overflow_vector(), intc.frt_level());
            }

            self.ftcsr |= 0x02;
        }

        self.frc = counter as u16;
    }

    /// Latch the counter into FICR in response to an edge on the input capture pin.
    pub fn input_capture(
        &mut self,
        cycles: u32,
        intc: &InterruptControl,
        interrupts: &mut InterruptQueue,
    ) {
        self.catch_up(cycles, intc, interrupts);

        self.ftcsr |= 0x80;
        self.ficr = self.frc;

        if self.tier.bit(7) {
            interrupts.send(intc.frt_input_capture_vector(), intc.frt_level());
        }
    }

    fn selected_ocr(&mut self) -> &mut u16 {
        if self.tocr.bit(4) { &mut self.ocrb } else { &mut self.ocra }
    }

    pub fn read_byte(&self, address: u32) -> u8 {
        let ocr = if self.tocr.bit(4) { self.ocrb } else { self.ocra };

        match address {
            0x10 => self.tier,
            0x11 => self.ftcsr,
            0x12 => (self.frc >> 8) as u8,
            0x13 => self.frc as u8,
            0x14 => (ocr >> 8) as u8,
            0x15 => ocr as u8,
            0x16 => self.tcr,
            0x17 => self.tocr,
            0x18 => (self.ficr >> 8) as u8,
            0x19 => self.ficr as u8,
            _ => {
                log::debug!("Unexpected FRT byte read {address:03X}");
                0
            }
        }
    }

    pub fn read_word(&self, address: u32) -> Option<u16> {
        match address {
            0x12 => Some(self.frc),
            0x14 => Some(if self.tocr.bit(4) { self.ocrb } else { self.ocra }),
            _ => None,
        }
    }

    pub fn write_byte(
        &mut self,
        address: u32,
        value: u8,
        cycles: u32,
        intc: &InterruptControl,
        interrupts: &mut InterruptQueue,
    ) {
        match address {
            0x10 => {
                self.write_tier(value);

                // Enabling the input capture interrupt while the flag is already set
                if value.bit(7) && self.ftcsr.bit(7) {
                    interrupts.send(intc.frt_input_capture_vector(), intc.frt_level());
                }
            }
            0x11 => {
                // Flags can only be cleared; CCLRA is read/write
                self.ftcsr = (self.ftcsr & (value & 0xFE)) | (value & 0x01);
                log::trace!("FTCSR write: {value:02X}");
            }
            0x12 => {
                self.frc = (u16::from(value) << 8) | (self.frc & 0x00FF);
                self.last_cycles = cycles;
            }
            0x13 => {
                self.frc = (self.frc & 0xFF00) | u16::from(value);
                self.last_cycles = cycles;
            }
            0x14 => {
                let ocr = self.selected_ocr();
                *ocr = (u16::from(value) << 8) | (*ocr & 0x00FF);
            }
            0x15 => {
                let ocr = self.selected_ocr();
                *ocr = (*ocr & 0xFF00) | u16::from(value);
            }
            0x16 => self.write_tcr(value),
            0x17 => {
                self.tocr = 0xE0 | (value & 0x13);
                log::trace!("TOCR write: {value:02X}");
                log::trace!("  Compare register: {}", if value.bit(4) { "B" } else { "A" });
            }
            _ => log::debug!("Unexpected FRT byte write {address:03X} {value:02X}"),
        }
    }

    // $FFFFFE10: TIER (Timer interrupt enable register)
    pub fn write_tier(&mut self, value: u8) {
        self.tier = (value & 0x8E) | 0x01;

        log::trace!("TIER write: {value:02X}");
        log::trace!("  Input capture interrupt enabled: {}", value.bit(7));
        log::trace!("  Compare match A interrupt enabled: {}", value.bit(3));
        log::trace!("  Compare match B interrupt enabled: {}", value.bit(2));
        log::trace!("  Overflow interrupt enabled: {}", value.bit(1));
    }

    // $FFFFFE16: TCR (Timer control register)
    fn write_tcr(&mut self, value: u8) {
        self.tcr = value & 0x83;

        match clock_shift_select(value) {
            Some(shift) => self.shift = shift,
            None => log::warn!("FRT external clock input selected; not implemented"),
        }

        log::trace!("TCR write: {value:02X}");
        log::trace!("  Clock divider: {}", 1 << self.shift);
    }
}

impl Default for FreeRunTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn counts_with_prescaler_leftover() {
        let intc = InterruptControl::default();
        let mut interrupts = InterruptQueue::new();
        let mut frt = FreeRunTimer::new();

        // 8 cycles per tick by default
        frt.catch_up(20, &intc, &mut interrupts);
        assert_eq!(frt.frc, 2);
        frt.catch_up(24, &intc, &mut interrupts);
        assert_eq!(frt.frc, 3);
    }

    #[test]
    fn compare_match_a_clears_counter_and_interrupts() {
        let mut intc = InterruptControl::default();
        intc.write_word(0x060, 0x0A00);
        intc.write_word(0x066, 0x4142);

        let mut interrupts = InterruptQueue::new();
        let mut frt = FreeRunTimer::new();
        frt.ocra = 0x10;
        frt.write_tier(0x08);
        frt.ftcsr = 0x01;

        frt.catch_up(0x10 * 8, &intc, &mut interrupts);
        assert_eq!(frt.frc, 0);
        assert_eq!(frt.ftcsr & 0x08, 0x08);
        assert_eq!(interrupts.highest().map(|i| (i.vector, i.level)), Some((0x42, 0xA)));
    }

    #[test]
    fn overflow_sets_flag() {
        let intc = InterruptControl::default();
        let mut interrupts = InterruptQueue::new();
        let mut frt = FreeRunTimer::new();
        frt.frc = 0xFFFF;

        frt.catch_up(8, &intc, &mut interrupts);
        assert_eq!(frt.frc, 0);
        assert_eq!(frt.ftcsr & 0x02, 0x02);
        assert!(interrupts.is_empty());
    }

    #[test]
    fn input_capture_latches_counter() {
        let mut intc = InterruptControl::default();
        intc.write_word(0x060, 0x0500);
        intc.write_word(0x066, 0x6400);

        let mut interrupts = InterruptQueue::new();
        let mut frt = FreeRunTimer::new();
        frt.write_tier(0x80);

        frt.input_capture(800, &intc, &mut interrupts);
        assert_eq!(frt.ficr, 100);
        assert_eq!(frt.ftcsr & 0x80, 0x80);
        assert_eq!(interrupts.highest().map(|i| (i.vector, i.level)), Some((0x64, 5)));
    }

    #[test]
    fn ocr_writes_follow_tocr_select() {
        let intc = InterruptControl::default();
        let mut interrupts = InterruptQueue::new();
        let mut frt = FreeRunTimer::new();

        frt.write_byte(0x17, 0x10, 0, &intc, &mut interrupts);
        frt.write_byte(0x14, 0x12, 0, &intc, &mut interrupts);
        frt.write_byte(0x15, 0x34, 0, &intc, &mut interrupts);
        assert_eq!(frt.ocrb, 0x1234);
        assert_eq!(frt.ocra, 0xFFFF);
        assert_eq!(frt.read_word(0x14), Some(0x1234));
    }
}
