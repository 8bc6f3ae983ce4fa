//! SH7604 division unit (DIVU)
//!
//! Division completes instantly on the write that triggers it.

use bincode::{Decode, Encode};

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct DivisionUnit {
    // $FFFFFF00: DVSR (Divisor)
    pub dvsr: u32,
    // $FFFFFF08: DVCR (Division control register); bit 0 is OVF, bit 1 is OVFIE
    pub dvcr: u32,
    // $FFFFFF0C: VCRDIV (Vector number setting register)
    pub vcrdiv: u32,
    // $FFFFFF10: DVDNTH (Dividend high / remainder)
    pub dvdnth: u32,
    // $FFFFFF14: DVDNTL (Dividend low / quotient); $FFFFFF04 DVDNT reads back the same value
    pub dvdntl: u32,
    // $FFFFFF18/$FFFFFF1C: DVDNTUH/DVDNTUL, copies of the result registers
    pub dvdntuh: u32,
    pub dvdntul: u32,
}

impl DivisionUnit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn overflow_interrupt_enabled(&self) -> bool {
        self.dvcr & 0x2 != 0
    }

    pub fn vector(&self) -> u8 {
        (self.vcrdiv & 0x7F) as u8
    }

    /// Registers are mirrored at +$20.
    pub fn read_longword(&self, address: u32) -> Option<u32> {
        let value = match address & !0x20 {
            0x100 => self.dvsr,
            0x104 | 0x114 => self.dvdntl,
            0x108 => self.dvcr,
            0x10C => self.vcrdiv,
            0x110 => self.dvdnth,
            0x118 => self.dvdntuh,
            0x11C => self.dvdntul,
            _ => return None,
        };
        Some(value)
    }

    /// Returns true if the write caused an overflow that should raise the DIVU interrupt.
    pub fn write_longword(&mut self, address: u32, value: u32) -> bool {
        match address & !0x20 {
            0x100 => self.dvsr = value,
            0x104 => return self.divide_32(value),
            0x108 => self.dvcr = value & 0x3,
            0x10C => self.vcrdiv = value & 0xFFFF,
            0x110 => self.dvdnth = value,
            0x114 => return self.divide_64(value),
            0x118 => self.dvdntuh = value,
            0x11C => self.dvdntul = value,
            _ => log::debug!("Unexpected DIVU longword write {address:03X} {value:08X}"),
        }

        false
    }

    // DVDNT write: 32-bit / 32-bit signed division
    fn divide_32(&mut self, dividend: u32) -> bool {
        let divisor = self.dvsr as i32;
        let dividend_signed = dividend as i32;

        let overflowed = if divisor == 0 {
            // The top 3 bits of the dividend leak into the remainder register
            if dividend_signed < 0 {
                self.dvdntl = 0x80000000;
                self.dvdnth = 0xFFFFFFFC | ((dividend >> 29) & 0x3);
            } else {
                self.dvdntl = 0x7FFFFFFF;
                self.dvdnth = dividend >> 29;
            }
            true
        } else {
            match dividend_signed.checked_div(divisor) {
                Some(quotient) => {
                    self.dvdntl = quotient as u32;
                    self.dvdnth = (dividend_signed % divisor) as u32;
                    false
                }
                None => {
                    // i32::MIN / -1
                    self.dvdntl = 0x7FFFFFFF;
                    self.dvdnth = 0xFFFFFFFE;
                    true
                }
            }
        };

        self.finish(overflowed)
    }

    // DVDNTL write: 64-bit / 32-bit signed division using DVDNTH as the high longword
    fn divide_64(&mut self, low: u32) -> bool {
        let divisor = i64::from(self.dvsr as i32);
        let dividend = ((u64::from(self.dvdnth) << 32) | u64::from(low)) as i64;

        let overflowed = if divisor == 0 {
            self.dvdntl = if self.dvdnth & 0x80000000 != 0 { 0x80000000 } else { 0x7FFFFFFF };
            self.dvdnth <<= 3;
            true
        } else {
            let quotient = dividend.wrapping_div(divisor);
            if quotient > i64::from(i32::MAX) {
                self.dvdntl = 0x7FFFFFFF;
                self.dvdnth = 0xFFFFFFFE;
                true
            } else if quotient < i64::from(i32::MIN) {
                self.dvdntl = 0x80000000;
                self.dvdnth = 0xFFFFFFFE;
                true
            } else {
                self.dvdntl = quotient as u32;
                self.dvdnth = dividend.wrapping_rem(divisor) as u32;
                false
            }
        };

        self.finish(overflowed)
    }

    fn finish(&mut self, overflowed: bool) -> bool {
        self.dvdntuh = self.dvdnth;
        self.dvdntul = self.dvdntl;

        log::trace!(
            "DIVU result: quotient {:08X} remainder {:08X} overflow {overflowed}",
            self.dvdntl,
            self.dvdnth
        );

        if overflowed {
            self.dvcr |= 1;
            self.overflow_interrupt_enabled()
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn random_32_bit_division() {
        let mut divu = DivisionUnit::new();

        for _ in 0..1000 {
            let dividend: i32 = rand::random();
            let divisor: i32 = rand::random::<i32>() >> (rand::random::<u32>() % 31);
            if divisor == 0 || (dividend == i32::MIN && divisor == -1) {
                continue;
            }

            divu.write_longword(0x100, divisor as u32);
            assert!(!divu.write_longword(0x104, dividend as u32));
            assert_eq!(divu.read_longword(0x104), Some((dividend / divisor) as u32));
            assert_eq!(divu.read_longword(0x110), Some((dividend % divisor) as u32));
            assert_eq!(divu.dvdntul, divu.dvdntl);
        }
    }

    #[test]
    fn random_64_bit_division() {
        let mut divu = DivisionUnit::new();

        for _ in 0..1000 {
            let quotient: i32 = rand::random::<i32>() >> 4;
            let divisor: i32 = (rand::random::<i32>() >> 8) | 1;
            let remainder = (rand::random::<i32>() % divisor).abs() * quotient.signum();
            let dividend = i64::from(quotient) * i64::from(divisor) + i64::from(remainder);

            divu.write_longword(0x120, divisor as u32);
            divu.write_longword(0x110, ((dividend as u64) >> 32) as u32);
            assert!(!divu.write_longword(0x114, dividend as u32));
            assert_eq!(divu.dvdntl as i32, (dividend / i64::from(divisor)) as i32);
            assert_eq!(divu.dvdnth as i32, (dividend % i64::from(divisor)) as i32);
        }
    }

    #[test]
    fn divide_by_zero_saturates_and_flags() {
        let mut divu = DivisionUnit::new();
        divu.write_longword(0x108, 0x2);
        divu.write_longword(0x100, 0);

        assert!(divu.write_longword(0x104, 0xE000_0000));
        assert_eq!(divu.dvdntl, 0x80000000);
        assert_eq!(divu.dvdnth, 0xFFFFFFFF);
        assert_eq!(divu.dvcr & 1, 1);

        divu.write_longword(0x108, 0x0);
        assert!(!divu.write_longword(0x104, 0x4000_0000));
        assert_eq!(divu.dvdntl, 0x7FFFFFFF);
        assert_eq!(divu.dvdnth, 2);
    }

    #[test]
    fn quotient_overflow_64() {
        let mut divu = DivisionUnit::new();
        divu.write_longword(0x100, 2);
        divu.write_longword(0x110, 0x0000_0001);
        divu.write_longword(0x114, 0);
        assert_eq!(divu.dvdntl, 0x7FFFFFFF);
        assert_eq!(divu.dvcr & 1, 1);
    }
}
