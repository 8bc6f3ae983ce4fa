use std::ops::RangeInclusive;

pub trait GetBit {
    #[must_use]
    fn bit(self, i: u8) -> bool;

    #[must_use]
    fn bits(self, range: RangeInclusive<u8>) -> Self;
}

macro_rules! impl_get_bit {
    ($($t:ty),* $(,)?) => {
        $(
            impl GetBit for $t {
                #[inline]
                fn bit(self, i: u8) -> bool {
                    debug_assert!(i < (<$t>::BITS as u8));
                    self & (1 << i) != 0
                }

                #[inline]
                fn bits(self, range: RangeInclusive<u8>) -> Self {
                    let start = *range.start();
                    let end = *range.end();
                    debug_assert!(end < (<$t>::BITS as u8));

                    let width = u32::from(end - start + 1);
                    if width >= <$t>::BITS {
                        return self >> start;
                    }
                    (self >> start) & ((1 << width) - 1)
                }
            }
        )*
    };
}

impl_get_bit!(u8, u16, u32, u64);

pub trait SignBit: Copy {
    fn sign_bit(self) -> bool;
}

macro_rules! impl_sign_bit {
    ($($t:ty),* $(,)?) => {
        $(
            impl SignBit for $t {
                #[inline]
                fn sign_bit(self) -> bool {
                    self.bit((<$t>::BITS - 1) as u8)
                }
            }
        )*
    };
}

impl_sign_bit!(u8, u16, u32, u64);

pub trait U16Ext {
    fn lsb(self) -> u8;

    fn msb(self) -> u8;

    fn set_lsb(&mut self, value: u8);

    fn set_msb(&mut self, value: u8);
}

impl U16Ext for u16 {
    #[inline(always)]
    fn lsb(self) -> u8 {
        self as u8
    }

    #[inline(always)]
    fn msb(self) -> u8 {
        (self >> 8) as u8
    }

    #[inline(always)]
    fn set_lsb(&mut self, value: u8) {
        *self = (*self & 0xFF00) | u16::from(value);
    }

    #[inline(always)]
    fn set_msb(&mut self, value: u8) {
        *self = (*self & 0x00FF) | (u16::from(value) << 8);
    }
}

/// Binary-coded decimal conversion for the SMPC real-time clock fields.
#[inline]
#[must_use]
pub fn to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

#[inline]
#[must_use]
pub fn from_bcd(value: u8) -> u8 {
    10 * (value >> 4) + (value & 0xF)
}

// Big-endian accessors for byte-addressed guest memory. Callers mask addresses into range.

#[inline]
#[must_use]
pub fn read_u16_be(memory: &[u8], address: usize) -> u16 {
    u16::from_be_bytes([memory[address], memory[address + 1]])
}

#[inline]
#[must_use]
pub fn read_u32_be(memory: &[u8], address: usize) -> u32 {
    u32::from_be_bytes([
        memory[address],
        memory[address + 1],
        memory[address + 2],
        memory[address + 3],
    ])
}

#[inline]
pub fn write_u16_be(memory: &mut [u8], address: usize, value: u16) {
    memory[address..address + 2].copy_from_slice(&value.to_be_bytes());
}

#[inline]
pub fn write_u32_be(memory: &mut [u8], address: usize, value: u32) {
    memory[address..address + 4].copy_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn bcd() {
        for value in 0..100 {
            assert_eq!(from_bcd(to_bcd(value)), value);
        }
        assert_eq!(to_bcd(59), 0x59);
    }

    #[test]
    fn bits_full_width() {
        assert_eq!(0xDEAD_BEEF_u32.bits(0..=31), 0xDEAD_BEEF);
        assert_eq!(0xDEAD_BEEF_u32.bits(8..=15), 0xBE);
    }

    #[test]
    fn big_endian_access() {
        let mut memory = [0_u8; 8];
        write_u32_be(&mut memory, 2, 0x12345678);
        assert_eq!(memory[2..6], [0x12, 0x34, 0x56, 0x78]);
        assert_eq!(read_u16_be(&memory, 4), 0x5678);
        write_u16_be(&mut memory, 0, 0xABCD);
        assert_eq!(read_u32_be(&memory, 0), 0xABCD_1234);
    }
}
