//! SH7604 serial communication interface (SCI)
//!
//! Nothing on the Saturn is wired to the SH-2 serial port, so transmitted bytes are dropped and
//! the receiver never fills.

use bincode::{Decode, Encode};
use saturn_common::num::GetBit;

#[derive(Debug, Clone, Encode, Decode)]
pub struct SerialInterface {
    // $FFFFFE00: SMR (Serial mode register)
    pub smr: u8,
    // $FFFFFE01: BRR (Bit rate register)
    pub brr: u8,
    // $FFFFFE02: SCR (Serial control register)
    pub scr: u8,
    // $FFFFFE03: TDR (Transmit data register)
    pub tdr: u8,
    // $FFFFFE04: SSR (Serial status register)
    pub ssr: u8,
    // $FFFFFE05: RDR (Receive data register)
    pub rdr: u8,
}

impl SerialInterface {
    pub fn new() -> Self {
        Self { smr: 0x00, brr: 0xFF, scr: 0x00, tdr: 0xFF, ssr: 0x84, rdr: 0x00 }
    }

    pub fn read_byte(&self, address: u32) -> Option<u8> {
        match address {
            0x00 => Some(self.smr),
            0x01 => Some(self.brr),
            0x02 => Some(self.scr),
            0x03 => Some(self.tdr),
            0x04 => Some(self.ssr),
            0x05 => Some(self.rdr),
            _ => None,
        }
    }

    /// Returns false if the address is not an SCI register.
    pub fn write_byte(&mut self, address: u32, value: u8) -> bool {
        match address {
            0x00 => self.smr = value,
            0x01 => self.brr = value,
            0x02 => {
                // Disabling the transmitter sets TDRE
                if !value.bit(5) {
                    self.ssr |= 0x80;
                }
                self.scr = value;

                log::trace!("SCR write: {value:02X}");
                log::trace!("  TX enabled: {}", value.bit(5));
                log::trace!("  RX enabled: {}", value.bit(4));
            }
            0x03 => self.tdr = value,
            0x04 => {
                // Clearing TDRE with the transmitter enabled starts a transfer
                if self.scr.bit(5) && !value.bit(7) {
                    log::trace!("SCI transmit {:02X} (no receiver attached)", self.tdr);
                }
            }
            _ => return false,
        }

        true
    }
}

impl Default for SerialInterface {
    fn default() -> Self {
        Self::new()
    }
}
