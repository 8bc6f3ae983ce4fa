//! SCSP MIDI input and output FIFOs

use bincode::{Decode, Encode};

const FIFO_DEPTH: usize = 4;

pub const INPUT_EMPTY: u8 = 1 << 0;
pub const INPUT_FULL: u8 = 1 << 1;
pub const INPUT_OVERFLOW: u8 = 1 << 2;
pub const OUTPUT_EMPTY: u8 = 1 << 3;
pub const OUTPUT_FULL: u8 = 1 << 4;

/// Interrupt bit for MIDI input data available.
pub const MIDI_INPUT_INTERRUPT: u16 = 1 << 3;
/// Interrupt bit for MIDI output buffer drained.
pub const MIDI_OUTPUT_INTERRUPT: u16 = 1 << 9;

#[derive(Debug, Clone, Default, Encode, Decode)]
struct Fifo {
    data: [u8; FIFO_DEPTH],
    len: usize,
}

impl Fifo {
    fn is_full(&self) -> bool {
        self.len >= FIFO_DEPTH
    }

    fn push(&mut self, value: u8) {
        self.data[self.len] = value;
        self.len += 1;
    }

    fn pop(&mut self) -> u8 {
        let value = self.data[0];
        self.data.copy_within(1.., 0);
        self.len -= 1;
        value
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Midi {
    flags: u8,
    input: Fifo,
    output: Fifo,
}

impl Midi {
    #[must_use]
    pub fn new() -> Self {
        Self { flags: INPUT_EMPTY | OUTPUT_EMPTY, input: Fifo::default(), output: Fifo::default() }
    }

    /// MIFULL/MIOVF/MIEMP/MOFULL/MOEMP status bits.
    #[must_use]
    pub fn flags(&self) -> u8 {
        self.flags
    }

    /// Pushes a byte received from the MIDI port. Returns interrupt bits to raise.
    #[must_use]
    pub fn send_input(&mut self, value: u8) -> u16 {
        let interrupts =
            if self.flags & INPUT_EMPTY != 0 { MIDI_INPUT_INTERRUPT } else { 0 };
        self.flags &= !INPUT_EMPTY;

        if self.input.is_full() {
            self.flags |= INPUT_OVERFLOW;
            log::debug!("MIDI input FIFO overflow, dropping {value:02X}");
            return interrupts;
        }

        self.input.push(value);
        if self.input.is_full() {
            self.flags |= INPUT_FULL;
        }

        interrupts
    }

    /// MIBUF read. Returns the byte (0xFF when empty) and interrupt bits to raise.
    #[must_use]
    pub fn read_input(&mut self) -> (u8, u16) {
        self.flags &= !(INPUT_OVERFLOW | INPUT_FULL);

        if self.input.len == 0 {
            return (0xFF, 0);
        }

        let interrupts = if self.input.len > 1 {
            MIDI_INPUT_INTERRUPT
        } else {
            self.flags |= INPUT_EMPTY;
            0
        };

        (self.input.pop(), interrupts)
    }

    /// MOBUF write.
    pub fn send_output(&mut self, value: u8) {
        self.flags &= !OUTPUT_EMPTY;

        if self.output.is_full() {
            return;
        }

        self.output.push(value);
        if self.output.is_full() {
            self.flags |= OUTPUT_FULL;
        }
    }

    /// Drains one byte from the output buffer, returning it (0xFF when empty) and interrupt bits
    /// to raise.
    #[must_use]
    pub fn read_output(&mut self) -> (u8, u16) {
        self.flags &= !OUTPUT_FULL;

        if self.output.len == 0 {
            return (0xFF, 0);
        }

        let interrupts = if self.output.len == 1 {
            self.flags |= OUTPUT_EMPTY;
            MIDI_OUTPUT_INTERRUPT
        } else {
            0
        };

        (self.output.pop(), interrupts)
    }
}

impl Default for Midi {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn input_fifo_holds_four_bytes() {
        let mut midi = Midi::new();
        assert_eq!(midi.send_input(0x90), MIDI_INPUT_INTERRUPT);
        assert_eq!(midi.send_input(0x3C), 0);
        assert_eq!(midi.send_input(0x7F), 0);
        assert_eq!(midi.flags() & INPUT_FULL, 0);
        assert_eq!(midi.send_input(0x80), 0);
        assert_ne!(midi.flags() & INPUT_FULL, 0);

        assert_eq!(midi.send_input(0x00), 0);
        assert_ne!(midi.flags() & INPUT_OVERFLOW, 0);

        assert_eq!(midi.read_input(), (0x90, MIDI_INPUT_INTERRUPT));
        assert_eq!(midi.flags() & (INPUT_FULL | INPUT_OVERFLOW), 0);
        assert_eq!(midi.read_input(), (0x3C, MIDI_INPUT_INTERRUPT));
        assert_eq!(midi.read_input(), (0x7F, MIDI_INPUT_INTERRUPT));
        assert_eq!(midi.read_input(), (0x80, 0));
        assert_ne!(midi.flags() & INPUT_EMPTY, 0);
        assert_eq!(midi.read_input(), (0xFF, 0));
    }

    #[test]
    fn output_buffer_signals_when_drained() {
        let mut midi = Midi::new();
        midi.send_output(0xF0);
        midi.send_output(0xF7);
        assert_eq!(midi.flags() & OUTPUT_EMPTY, 0);

        assert_eq!(midi.read_output(), (0xF0, 0));
        assert_eq!(midi.read_output(), (0xF7, MIDI_OUTPUT_INTERRUPT));
        assert_ne!(midi.flags() & OUTPUT_EMPTY, 0);
        assert_eq!(midi.read_output(), (0xFF, 0));
    }
}
