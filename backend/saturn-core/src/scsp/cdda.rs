//! CD-DA ring buffer between the CD block and the SCSP EXTS inputs

use bincode::{Decode, Encode};
use saturn_common::boxedarray::BoxedByteArray;

pub const SECTOR_LEN: usize = 2352;
const BUFFER_SECTORS: usize = 150;
const BUFFER_LEN: usize = SECTOR_LEN * BUFFER_SECTORS;

/// Read speed the CD block should use after delivering a sector, based on how full the buffer is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdReadTiming {
    /// Buffer is at most half full; read ahead faster.
    Boost,
    Normal,
    /// Buffer is more than three quarters full; pause reading.
    Throttle,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct CddaBuffer {
    data: BoxedByteArray<BUFFER_LEN>,
    next_in: usize,
    bytes_left: usize,
}

impl CddaBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self { data: BoxedByteArray::new(), next_in: 0, bytes_left: 0 }
    }

    pub fn clear(&mut self) {
        self.next_in = 0;
        self.bytes_left = 0;
    }

    #[must_use]
    pub fn bytes_left(&self) -> usize {
        self.bytes_left
    }

    /// Queues one raw audio sector (little-endian 16-bit stereo).
    pub fn receive_sector(&mut self, sector: &[u8; SECTOR_LEN]) -> CdReadTiming {
        let timing = if self.bytes_left < BUFFER_LEN / 2 {
            CdReadTiming::Boost
        } else if self.bytes_left > BUFFER_LEN * 3 / 4 {
            CdReadTiming::Throttle
        } else {
            CdReadTiming::Normal
        };

        self.data[self.next_in..self.next_in + SECTOR_LEN].copy_from_slice(sector);
        self.next_in += SECTOR_LEN;
        if self.next_in >= BUFFER_LEN {
            self.next_in = 0;
        }

        self.bytes_left += SECTOR_LEN;
        if self.bytes_left > BUFFER_LEN {
            log::debug!("CDDA buffer overrun");
            self.bytes_left = BUFFER_LEN;
        }

        timing
    }

    /// Pops one stereo sample, or silence if the buffer is empty.
    pub fn next_sample(&mut self) -> (i16, i16) {
        if self.bytes_left == 0 {
            return (0, 0);
        }

        let position = (self.next_in + BUFFER_LEN - self.bytes_left) % BUFFER_LEN;
        let sample_l = i16::from_le_bytes([self.data[position], self.data[position + 1]]);
        let sample_r = i16::from_le_bytes([self.data[position + 2], self.data[position + 3]]);
        self.bytes_left = self.bytes_left.saturating_sub(4);

        (sample_l, sample_r)
    }
}

impl Default for CddaBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn sector(fill: i16) -> [u8; SECTOR_LEN] {
        let mut sector = [0; SECTOR_LEN];
        for (i, chunk) in sector.chunks_exact_mut(2).enumerate() {
            let value = if i % 2 == 0 { fill } else { -fill };
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        sector
    }

    #[test]
    fn samples_come_out_in_order() {
        let mut buffer = CddaBuffer::new();
        assert_eq!(buffer.next_sample(), (0, 0));

        assert_eq!(buffer.receive_sector(&sector(100)), CdReadTiming::Boost);
        assert_eq!(buffer.receive_sector(&sector(200)), CdReadTiming::Boost);

        assert_eq!(buffer.next_sample(), (100, -100));
        for _ in 1..SECTOR_LEN / 4 {
            buffer.next_sample();
        }
        assert_eq!(buffer.next_sample(), (200, -200));
        assert_eq!(buffer.bytes_left(), SECTOR_LEN - 4);
    }

    #[test]
    fn fill_level_drives_read_timing() {
        let mut buffer = CddaBuffer::new();
        for _ in 0..BUFFER_SECTORS / 2 {
            assert_eq!(buffer.receive_sector(&sector(1)), CdReadTiming::Boost);
        }
        assert_eq!(buffer.receive_sector(&sector(1)), CdReadTiming::Normal);

        for _ in 0..BUFFER_SECTORS {
            buffer.receive_sector(&sector(1));
        }
        assert_eq!(buffer.bytes_left(), BUFFER_LEN);
        assert_eq!(buffer.receive_sector(&sector(1)), CdReadTiming::Throttle);
    }
}
