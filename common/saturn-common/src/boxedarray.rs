//! Heap-allocated fixed-size arrays for large guest memories.
//!
//! The derived `bincode::Decode` for `Box<[T; LEN]>` builds the array on the stack before moving it
//! to the heap, which overflows the stack for multi-megabyte work RAM. These wrappers decode
//! directly into a heap allocation.

use bincode::de::read::Reader;
use bincode::de::{BorrowDecoder, Decoder};
use bincode::error::DecodeError;
use bincode::{BorrowDecode, Decode, Encode};
use std::ops::{Deref, DerefMut};

fn boxed_zeroed<T: Copy + Default, const LEN: usize>() -> Box<[T; LEN]> {
    match vec![T::default(); LEN].into_boxed_slice().try_into() {
        Ok(array) => array,
        Err(_) => unreachable!("Vec was created with length LEN"),
    }
}

#[derive(Debug, Clone, Encode)]
pub struct BoxedByteArray<const LEN: usize>(Box<[u8; LEN]>);

impl<const LEN: usize> BoxedByteArray<LEN> {
    #[must_use]
    pub fn new() -> Self {
        Self(boxed_zeroed())
    }

    /// Build from a slice, truncating or zero-padding to `LEN`.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut array = Self::new();
        let len = bytes.len().min(LEN);
        array.0[..len].copy_from_slice(&bytes[..len]);
        array
    }

    pub fn fill(&mut self, value: u8) {
        self.0.fill(value);
    }
}

impl<const LEN: usize> Default for BoxedByteArray<LEN> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const LEN: usize> Deref for BoxedByteArray<LEN> {
    type Target = [u8; LEN];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const LEN: usize> DerefMut for BoxedByteArray<LEN> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<const LEN: usize, Context> Decode<Context> for BoxedByteArray<LEN> {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        let mut array: Box<[u8; LEN]> = boxed_zeroed();
        decoder.reader().read(array.as_mut())?;
        Ok(Self(array))
    }
}

impl<'de, const LEN: usize, Context> BorrowDecode<'de, Context> for BoxedByteArray<LEN> {
    fn borrow_decode<D: BorrowDecoder<'de, Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, DecodeError> {
        let mut array: Box<[u8; LEN]> = boxed_zeroed();
        decoder.reader().read(array.as_mut())?;
        Ok(Self(array))
    }
}

#[derive(Debug, Clone, Encode)]
pub struct BoxedWordArray<const LEN: usize>(Box<[u16; LEN]>);

impl<const LEN: usize> BoxedWordArray<LEN> {
    #[must_use]
    pub fn new() -> Self {
        Self(boxed_zeroed())
    }
}

impl<const LEN: usize> Default for BoxedWordArray<LEN> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const LEN: usize> Deref for BoxedWordArray<LEN> {
    type Target = [u16; LEN];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const LEN: usize> DerefMut for BoxedWordArray<LEN> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<const LEN: usize, Context> Decode<Context> for BoxedWordArray<LEN> {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        let mut array: Box<[u16; LEN]> = boxed_zeroed();
        for value in array.iter_mut() {
            *value = u16::decode(decoder)?;
        }
        Ok(Self(array))
    }
}

impl<'de, const LEN: usize, Context> BorrowDecode<'de, Context> for BoxedWordArray<LEN> {
    fn borrow_decode<D: BorrowDecoder<'de, Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, DecodeError> {
        let mut array: Box<[u16; LEN]> = boxed_zeroed();
        for value in array.iter_mut() {
            *value = u16::decode(decoder)?;
        }
        Ok(Self(array))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn byte_array_survives_bincode() {
        let mut array = BoxedByteArray::<4096>::new();
        array[17] = 0xAB;
        array[4095] = 0x01;

        let config = bincode::config::standard();
        let bytes = bincode::encode_to_vec(&array, config).unwrap();
        let (decoded, _): (BoxedByteArray<4096>, _) =
            bincode::decode_from_slice(&bytes, config).unwrap();

        assert_eq!(decoded[17], 0xAB);
        assert_eq!(decoded[4095], 0x01);
        assert_eq!(decoded[0], 0);
    }

    #[test]
    fn from_slice_pads() {
        let array = BoxedByteArray::<8>::from_slice(&[1, 2, 3]);
        assert_eq!(*array, [1, 2, 3, 0, 0, 0, 0, 0]);
    }
}
