//! Controller port state and the peripheral reports the SMPC returns for it

use bincode::{Decode, Encode};

/// Port status: nothing connected.
pub const PORT_NOT_CONNECTED: u8 = 0xF0;
/// Port status: one peripheral directly connected.
pub const PORT_DIRECT: u8 = 0xF1;
/// Peripheral ID of the standard digital pad (type 0, 2 data bytes).
pub const DIGITAL_PAD_ID: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct SaturnJoypadState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub start: bool,
    pub a: bool,
    pub b: bool,
    pub c: bool,
    pub x: bool,
    pub y: bool,
    pub z: bool,
    pub l: bool,
    pub r: bool,
}

impl SaturnJoypadState {
    /// The two active-low data bytes of a digital pad report.
    #[must_use]
    pub fn to_data_bytes(self) -> [u8; 2] {
        let first = [self.right, self.left, self.down, self.up, self.start, self.a, self.c, self.b]
            .into_iter()
            .fold(0_u8, |acc, pressed| (acc << 1) | u8::from(!pressed));
        let second = [self.r, self.x, self.y, self.z, self.l]
            .into_iter()
            .fold(0_u8, |acc, pressed| (acc << 1) | u8::from(!pressed));

        [first, (second << 3) | 0x07]
    }
}

/// What is plugged into one of the two controller ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum PeripheralPort {
    #[default]
    Disconnected,
    Pad(SaturnJoypadState),
}

impl PeripheralPort {
    /// INTBACK report for this port: port status, then peripheral ID and data if connected.
    #[must_use]
    pub fn report(self) -> Vec<u8> {
        match self {
            Self::Disconnected => vec![PORT_NOT_CONNECTED],
            Self::Pad(state) => {
                let [first, second] = state.to_data_bytes();
                vec![PORT_DIRECT, DIGITAL_PAD_ID, first, second]
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct SaturnInputs {
    pub p1: PeripheralPort,
    pub p2: PeripheralPort,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn pad_report_is_active_low() {
        let idle = PeripheralPort::Pad(SaturnJoypadState::default());
        assert_eq!(idle.report(), vec![PORT_DIRECT, DIGITAL_PAD_ID, 0xFF, 0xFF]);

        let pressed =
            SaturnJoypadState { right: true, b: true, l: true, r: true, ..Default::default() };
        assert_eq!(pressed.to_data_bytes(), [0x7E, 0x77]);

        assert_eq!(PeripheralPort::Disconnected.report(), vec![PORT_NOT_CONNECTED]);
    }
}
