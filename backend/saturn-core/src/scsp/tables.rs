//! Envelope and LFO lookup tables

use bincode::{Decode, Encode};

// Attack shift per envelope step for effective rates 0x30-0x3F; rates below 0x30 use the first row
pub const ATTACK_RATE_TABLE: [[u8; 4]; 16] = [
    [4, 4, 4, 4],
    [3, 4, 4, 4],
    [3, 4, 3, 4],
    [3, 3, 3, 4],
    [3, 3, 3, 3],
    [2, 3, 3, 3],
    [2, 3, 2, 3],
    [2, 2, 2, 3],
    [2, 2, 2, 2],
    [1, 2, 2, 2],
    [1, 2, 1, 2],
    [1, 1, 1, 2],
    [1, 1, 1, 1],
    [1, 1, 1, 1],
    [1, 1, 1, 1],
    [1, 1, 1, 1],
];

// Attenuation increment per envelope step for effective rates 0x30-0x3F
pub const DECAY_RATE_TABLE: [[u8; 4]; 16] = [
    [1, 1, 1, 1],
    [2, 1, 1, 1],
    [2, 1, 2, 1],
    [2, 2, 2, 1],
    [2, 2, 2, 2],
    [4, 2, 2, 2],
    [4, 2, 4, 2],
    [4, 4, 4, 2],
    [4, 4, 4, 4],
    [8, 4, 4, 4],
    [8, 4, 8, 4],
    [8, 8, 8, 4],
    [8, 8, 8, 8],
    [8, 8, 8, 8],
    [8, 8, 8, 8],
    [8, 8, 8, 8],
];

/// Marks the end of a row in [`ENVELOPE_TABLE`]; rows have different lengths.
pub const RATE_END: u16 = 0xFFFF;

const fn envelope_rows(shift: u32) -> [[u16; 8]; 4] {
    const E: u16 = RATE_END;
    [
        [8192 >> shift, 4096 >> shift, 4096 >> shift, E, E, E, E, E],
        [
            8192 >> shift,
            4096 >> shift,
            4096 >> shift,
            4096 >> shift,
            4096 >> shift,
            4096 >> shift,
            4096 >> shift,
            E,
        ],
        [4096 >> shift, E, E, E, E, E, E, E],
        [4096 >> shift, 4096 >> shift, 4096 >> shift, 2048 >> shift, 2048 >> shift, E, E, E],
    ]
}

const fn build_envelope_table() -> [[u16; 8]; 52] {
    let mut table = [[0; 8]; 52];
    let mut shift = 0;
    while shift < 13 {
        let rows = envelope_rows(shift);
        let mut i = 0;
        while i < 4 {
            table[(shift as usize) * 4 + i] = rows[i];
            i += 1;
        }
        shift += 1;
    }
    table
}

/// Samples between envelope steps for effective rates 0x02-0x35, indexed by `rate - 2`. Each row
/// is cycled through until [`RATE_END`].
pub const ENVELOPE_TABLE: [[u16; 8]; 52] = build_envelope_table();

/// Samples per LFO position step, indexed by LFOF.
pub const LFO_STEP_TABLE: [u32; 32] = [
    0x3FC, 0x37C, 0x2FC, 0x27C, 0x1FC, 0x1BC, 0x17C, 0x13C, 0x0FC, 0x0BC, 0x0DC, 0x08C, 0x07C,
    0x06C, 0x05C, 0x04C, 0x03C, 0x034, 0x02C, 0x024, 0x01C, 0x018, 0x014, 0x010, 0x00C, 0x00A,
    0x008, 0x006, 0x004, 0x003, 0x002, 0x001,
];

/// LFO waveforms for pitch (signed) and amplitude (unsigned) modulation. The noise tables are
/// random and regenerated on every reset, so they are part of the saved state.
#[derive(Debug, Clone, Encode, Decode)]
pub struct LfoTables {
    pitch: [[i8; 256]; 4],
    amplitude: [[u8; 256]; 4],
}

impl LfoTables {
    #[must_use]
    pub fn new() -> Self {
        let mut pitch = [[0; 256]; 4];
        let mut amplitude = [[0; 256]; 4];

        for i in 0..256 {
            // Saw
            pitch[0][i] = if i < 128 { i as i8 } else { (i as i32 - 256) as i8 };
            amplitude[0][i] = i as u8;

            // Square
            pitch[1][i] = if i < 128 { 127 } else { -128 };
            amplitude[1][i] = if i < 128 { 0 } else { 0xFF };

            // Triangle
            pitch[2][i] = if i < 64 {
                (i * 2) as i8
            } else if i < 192 {
                (255 - (i as i32) * 2) as i8
            } else {
                ((i as i32) * 2 - 512) as i8
            };
            amplitude[2][i] =
                if i < 128 { (i * 2) as u8 } else { (255 - (i as i32) * 2) as u8 };

            // Noise
            pitch[3][i] = rand::random::<u8>() as i8;
            amplitude[3][i] = rand::random::<u8>();
        }

        Self { pitch, amplitude }
    }

    #[inline]
    #[must_use]
    pub fn pitch(&self, waveform: u8, position: u8) -> i32 {
        self.pitch[(waveform & 3) as usize][position as usize].into()
    }

    #[inline]
    #[must_use]
    pub fn amplitude(&self, waveform: u8, position: u8) -> i32 {
        self.amplitude[(waveform & 3) as usize][position as usize].into()
    }
}

impl Default for LfoTables {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn envelope_rows_repeat_with_larger_shifts() {
        assert_eq!(ENVELOPE_TABLE[0][..4], [8192, 4096, 4096, RATE_END]);
        assert_eq!(ENVELOPE_TABLE[3][..6], [4096, 4096, 4096, 2048, 2048, RATE_END]);
        assert_eq!(ENVELOPE_TABLE[4][0], 4096);
        assert_eq!(ENVELOPE_TABLE[51][..5], [1, 1, 1, 0, 0]);
    }

    #[test]
    fn deterministic_lfo_waveforms() {
        let tables = LfoTables::new();

        assert_eq!(tables.pitch(0, 127), 127);
        assert_eq!(tables.pitch(0, 128), -128);
        assert_eq!(tables.pitch(1, 0), 127);
        assert_eq!(tables.pitch(2, 63), 126);
        assert_eq!(tables.pitch(2, 64), 127);
        assert_eq!(tables.pitch(2, 191), -127);
        assert_eq!(tables.pitch(2, 255), -2);

        assert_eq!(tables.amplitude(1, 200), 0xFF);
        assert_eq!(tables.amplitude(2, 127), 254);
        assert_eq!(tables.amplitude(2, 128), 255);
        assert_eq!(tables.amplitude(2, 255), 1);
    }
}
