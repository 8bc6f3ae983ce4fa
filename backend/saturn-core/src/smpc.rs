//! SMPC (System Manager and Peripheral Control)
//!
//! Commands are written to COMREG and executed after a delay measured in SH-2 cycles. Side effects
//! on other components are queued as [`SmpcSignal`]s for the system driver to apply.

use crate::input::{DIGITAL_PAD_ID, PORT_DIRECT, PORT_NOT_CONNECTED, PeripheralPort, SaturnInputs};
use bincode::{Decode, Encode};
use saturn_common::define_bit_enum;
use saturn_common::num::{GetBit, to_bcd};
use saturn_common::timeutils::{RtcDateTime, current_unix_seconds};
use saturn_config::{SaturnConfig, SmpcLanguage};

const IREG_LEN: usize = 7;
const OREG_LEN: usize = 32;
const SMEM_LEN: usize = 4;

// INTBACK with peripheral data completes early once the frame reaches this line
const INTBACK_PERIPHERAL_LINE: u32 = 207;
const INTBACK_STATUS_TIMING: i32 = 250;
const INTBACK_PERIPHERAL_TIMING: i32 = 16000;

// PDR port direction modes (DDR & 0x7F)
const DDR_TH_MODE: u8 = 0x40;
const DDR_TH_TR_MODE: u8 = 0x60;
const DDR_STV_SOUND_CONTROL: u8 = 0x18;
const DDR_STV_EEPROM: u8 = 0x3F;

// Input lines read back on the ST-V ports; EEPROM data out idles high
const STV_PDR1_INPUTS: u8 = 0x7F;
const STV_PDR2_INPUTS: u8 = 0x7F;

define_bit_enum!(DotClock, [Dots320, Dots352]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmpcCommand {
    MasterOn,
    SlaveOn,
    SlaveOff,
    SoundOn,
    SoundOff,
    CdOn,
    CdOff,
    SystemReset,
    ClockChange352,
    ClockChange320,
    IntBack,
    SetSmem,
    NmiRequest,
    ResetEnable,
    ResetDisable,
}

impl SmpcCommand {
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::MasterOn),
            0x02 => Some(Self::SlaveOn),
            0x03 => Some(Self::SlaveOff),
            0x06 => Some(Self::SoundOn),
            0x07 => Some(Self::SoundOff),
            0x08 => Some(Self::CdOn),
            0x09 => Some(Self::CdOff),
            0x0D => Some(Self::SystemReset),
            0x0E => Some(Self::ClockChange352),
            0x0F => Some(Self::ClockChange320),
            0x10 => Some(Self::IntBack),
            0x17 => Some(Self::SetSmem),
            0x18 => Some(Self::NmiRequest),
            0x19 => Some(Self::ResetEnable),
            0x1A => Some(Self::ResetDisable),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_byte(self) -> u8 {
        match self {
            Self::MasterOn => 0x00,
            Self::SlaveOn => 0x02,
            Self::SlaveOff => 0x03,
            Self::SoundOn => 0x06,
            Self::SoundOff => 0x07,
            Self::CdOn => 0x08,
            Self::CdOff => 0x09,
            Self::SystemReset => 0x0D,
            Self::ClockChange352 => 0x0E,
            Self::ClockChange320 => 0x0F,
            Self::IntBack => 0x10,
            Self::SetSmem => 0x17,
            Self::NmiRequest => 0x18,
            Self::ResetEnable => 0x19,
            Self::ResetDisable => 0x1A,
        }
    }
}

/// Effects of an SMPC command on the rest of the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum SmpcSignal {
    StartSlave,
    StopSlave,
    StartSoundCpu,
    StopSoundCpu,
    MasterNmi,
    /// Reset VDP1, VDP2, SCU and SCSP, stop the slave SH-2 and switch the dot clock.
    ClockChange(DotClock),
    SystemManagerInterrupt,
}

#[derive(Debug, Clone, Default, Encode, Decode)]
struct PortTransfer {
    data: Vec<u8>,
    offset: usize,
}

impl PortTransfer {
    fn remaining(&self) -> &[u8] {
        &self.data[self.offset.min(self.data.len())..]
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Smpc {
    ireg: [u8; IREG_LEN],
    comreg: u8,
    oreg: [u8; OREG_LEN],
    sr: u8,
    sf: u8,
    pdr: [u8; 2],
    ddr: [u8; 2],
    iosel: u8,
    exle: u8,
    smem: [u8; SMEM_LEN],
    area_code: u8,
    language: u8,
    dot_clock: DotClock,
    master_nmi: bool,
    system_reset: bool,
    sound_reset: bool,
    cd_reset: bool,
    reset_disabled: bool,
    // 0 = no peripheral data pending, 1 = first frame returned, 2 = continuation returned
    first_peripheral: u8,
    peripheral_mode: u8,
    timing: i32,
    wait_for_line: bool,
    transfers: [PortTransfer; 2],
    pdr_readback: [u8; 2],
    inputs: SaturnInputs,
    stv: bool,
    clock_sync: bool,
    base_time: i64,
    frame_counter: u32,
    signals: Vec<SmpcSignal>,
}

impl Smpc {
    #[must_use]
    pub fn new(config: &SaturnConfig) -> Self {
        let base_time =
            config.base_time.filter(|&time| time != 0).unwrap_or_else(current_unix_seconds);

        let mut smpc = Self {
            ireg: [0; IREG_LEN],
            comreg: 0,
            oreg: [0; OREG_LEN],
            sr: 0,
            sf: 0,
            pdr: [0; 2],
            ddr: [0; 2],
            iosel: 0,
            exle: 0,
            smem: [0; SMEM_LEN],
            area_code: config.region.area_code(),
            language: config.language.to_smem(),
            dot_clock: DotClock::default(),
            master_nmi: false,
            system_reset: false,
            sound_reset: false,
            cd_reset: false,
            reset_disabled: true,
            first_peripheral: 0,
            peripheral_mode: 0,
            timing: 0,
            wait_for_line: false,
            transfers: Default::default(),
            pdr_readback: [0; 2],
            inputs: SaturnInputs::default(),
            stv: config.stv,
            clock_sync: config.clock_sync,
            base_time,
            frame_counter: 0,
            signals: Vec::new(),
        };
        smpc.reset();
        smpc
    }

    /// Clears all registers and SMEM, keeping the configured language.
    pub fn reset(&mut self) {
        self.ireg = [0; IREG_LEN];
        self.comreg = 0;
        self.oreg = [0; OREG_LEN];
        self.sr = 0;
        self.sf = 0;
        self.pdr = [0; 2];
        self.ddr = [0; 2];
        self.iosel = 0;
        self.exle = 0;
        self.smem = [0; SMEM_LEN];
        self.smem[3] = (self.smem[3] & 0xF0) | (self.language & 0x0F);

        self.dot_clock = DotClock::Dots320;
        self.master_nmi = false;
        self.system_reset = false;
        self.sound_reset = false;
        self.cd_reset = false;
        self.reset_disabled = true;
        self.first_peripheral = 0;
        self.timing = 0;
        self.wait_for_line = false;
        self.transfers = Default::default();

        self.oreg[31] = SmpcCommand::SystemReset.to_byte();
    }

    #[must_use]
    pub fn dot_clock(&self) -> DotClock {
        self.dot_clock
    }

    /// Language currently stored in SMEM, which the BIOS may have changed.
    #[must_use]
    pub fn language(&self) -> u8 {
        self.language
    }

    #[must_use]
    pub fn language_setting(&self) -> Option<SmpcLanguage> {
        [
            SmpcLanguage::English,
            SmpcLanguage::German,
            SmpcLanguage::French,
            SmpcLanguage::Spanish,
            SmpcLanguage::Italian,
            SmpcLanguage::Japanese,
        ]
        .into_iter()
        .find(|language| language.to_smem() == self.language)
    }

    pub fn set_inputs(&mut self, inputs: SaturnInputs) {
        self.inputs = inputs;
    }

    #[must_use]
    pub fn inputs(&self) -> SaturnInputs {
        self.inputs
    }

    /// Called once per frame; drives the RTC when clock sync is enabled.
    pub fn end_frame(&mut self) {
        self.frame_counter = self.frame_counter.wrapping_add(1);
    }

    #[must_use]
    pub fn command_pending(&self) -> bool {
        self.timing > 0
    }

    pub fn take_signals(&mut self) -> Vec<SmpcSignal> {
        std::mem::take(&mut self.signals)
    }

    /// Front panel reset button. Sends an NMI to the master SH-2 unless resets are disabled.
    pub fn reset_button(&mut self) {
        if !self.reset_disabled {
            self.signals.push(SmpcSignal::MasterNmi);
        }
    }

    /// Advances a pending command by `cycles`. `line` is the current scanline.
    pub fn exec(&mut self, cycles: i32, line: u32) {
        if self.timing <= 0 {
            return;
        }

        if self.wait_for_line && line == INTBACK_PERIPHERAL_LINE {
            self.timing = -1;
            self.wait_for_line = false;
        }

        self.timing -= cycles;
        if self.timing <= 0 {
            self.process_command();
        }
    }

    fn set_timing(&mut self) {
        let Some(command) = SmpcCommand::from_byte(self.comreg) else {
            log::warn!("Unimplemented SMPC command {:02X}", self.comreg);
            self.sf = 0;
            return;
        };

        self.timing = match command {
            SmpcCommand::IntBack => {
                let status = self.ireg[0] == 0x01;
                let peripheral = self.ireg[1].bit(3);
                if self.first_peripheral == 1 || (self.ireg[0] == 0 && peripheral) {
                    self.wait_for_line = true;
                    INTBACK_PERIPHERAL_TIMING
                } else if status {
                    INTBACK_STATUS_TIMING
                } else {
                    1
                }
            }
            _ => 1,
        };
    }

    fn process_command(&mut self) {
        self.wait_for_line = false;
        self.timing = 0;

        let Some(command) = SmpcCommand::from_byte(self.comreg) else {
            log::warn!("Unimplemented SMPC command {:02X}", self.comreg);
            return;
        };

        log::debug!("SMPC command {command:?}");

        match command {
            SmpcCommand::MasterOn => {
                log::debug!("SMPC MSHON is not implemented");
                self.oreg[31] = command.to_byte();
            }
            SmpcCommand::SlaveOn => self.signals.push(SmpcSignal::StartSlave),
            SmpcCommand::SlaveOff => self.signals.push(SmpcSignal::StopSlave),
            SmpcCommand::SoundOn => {
                // On ST-V the 68000 is controlled through PDR2 instead
                if !self.stv {
                    self.signals.push(SmpcSignal::StartSoundCpu);
                }
                self.oreg[31] = command.to_byte();
            }
            SmpcCommand::SoundOff => {
                if !self.stv {
                    self.signals.push(SmpcSignal::StopSoundCpu);
                }
                self.oreg[31] = command.to_byte();
            }
            SmpcCommand::CdOn | SmpcCommand::CdOff => {
                log::debug!("SMPC {command:?} is not implemented");
            }
            SmpcCommand::SystemReset => {
                self.oreg[31] = command.to_byte();
            }
            SmpcCommand::ClockChange352 => self.change_clock(DotClock::Dots352),
            SmpcCommand::ClockChange320 => self.change_clock(DotClock::Dots320),
            SmpcCommand::IntBack => {
                self.intback();
                return;
            }
            SmpcCommand::SetSmem => {
                self.smem.copy_from_slice(&self.ireg[..SMEM_LEN]);
                self.language = self.smem[3];
                self.oreg[31] = command.to_byte();
            }
            SmpcCommand::NmiRequest => {
                self.signals.push(SmpcSignal::MasterNmi);
                self.oreg[31] = command.to_byte();
            }
            SmpcCommand::ResetEnable => {
                self.reset_disabled = false;
                self.oreg[31] = command.to_byte();
            }
            SmpcCommand::ResetDisable => {
                self.reset_disabled = true;
                self.oreg[31] = command.to_byte();
            }
        }

        self.sf = 0;
    }

    fn change_clock(&mut self, dot_clock: DotClock) {
        self.dot_clock = dot_clock;
        self.signals.push(SmpcSignal::MasterNmi);
        self.signals.push(SmpcSignal::ClockChange(dot_clock));
    }

    fn intback(&mut self) {
        let intback = SmpcCommand::IntBack.to_byte();

        if self.first_peripheral == 1 {
            // Continuation of a peripheral transfer
            self.intback_peripheral();
            self.sf = 0;
            self.oreg[31] = intback;
            self.signals.push(SmpcSignal::SystemManagerInterrupt);
            return;
        }

        if self.ireg[0] != 0 {
            self.first_peripheral = u8::from(self.ireg[1].bit(3));
            self.oreg[..OREG_LEN - 1].fill(0xFF);
            self.peripheral_mode = self.ireg[0] >> 4;
            self.intback_status();
            self.sr = 0x40 | (self.first_peripheral << 5);
            self.sf = 0;
            self.signals.push(SmpcSignal::SystemManagerInterrupt);
            return;
        }

        if self.ireg[1].bit(3) {
            self.first_peripheral = 1;
            self.intback_peripheral();
            self.oreg[31] = intback;
            self.signals.push(SmpcSignal::SystemManagerInterrupt);
        } else {
            log::debug!("SMPC INTBACK with nothing requested");
            self.oreg[31] = intback;
        }
        self.sf = 0;
    }

    fn rtc(&self) -> RtcDateTime {
        if self.clock_sync {
            let elapsed = u64::from(self.frame_counter) * 1001 / 60000;
            RtcDateTime::from_unix_seconds(self.base_time.saturating_add(elapsed as i64))
        } else {
            RtcDateTime::now()
        }
    }

    fn intback_status(&mut self) {
        self.oreg[0] = 0x80 | (u8::from(self.reset_disabled) << 6);

        let rtc = self.rtc();
        self.oreg[1] = to_bcd((rtc.year / 100 % 100) as u8);
        self.oreg[2] = to_bcd((rtc.year % 100) as u8);
        self.oreg[3] = (rtc.weekday << 4) | rtc.month;
        self.oreg[4] = to_bcd(rtc.day);
        self.oreg[5] = to_bcd(rtc.hour);
        self.oreg[6] = to_bcd(rtc.minute);
        self.oreg[7] = to_bcd(rtc.second);

        // Cartridge code
        self.oreg[8] = 0;
        self.oreg[9] = self.area_code;

        self.oreg[10] = 0x34
            | (u8::from(self.dot_clock.to_bit()) << 6)
            | (u8::from(self.master_nmi) << 3)
            | (u8::from(self.system_reset) << 1)
            | u8::from(self.sound_reset);
        self.oreg[11] = u8::from(self.cd_reset) << 6;
        self.oreg[12..12 + SMEM_LEN].copy_from_slice(&self.smem);

        self.oreg[31] = SmpcCommand::IntBack.to_byte();
    }

    fn intback_peripheral(&mut self) {
        if self.first_peripheral == 2 {
            self.sr = 0x80 | self.peripheral_mode;
            self.first_peripheral = 0;
        } else {
            self.sr = 0xC0 | self.peripheral_mode;
            self.first_peripheral += 1;
        }

        if self.transfers.iter().all(PortTransfer::is_empty) {
            self.transfers = [
                PortTransfer { data: self.inputs.p1.report(), offset: 0 },
                PortTransfer { data: self.inputs.p2.report(), offset: 0 },
            ];
        }

        let mut oreg_offset = 0;
        for transfer in &mut self.transfers {
            if transfer.is_empty() || oreg_offset >= OREG_LEN {
                continue;
            }

            let space = OREG_LEN - oreg_offset;
            let remaining = transfer.remaining();
            if remaining.len() < space {
                self.oreg[oreg_offset..oreg_offset + remaining.len()].copy_from_slice(remaining);
                oreg_offset += remaining.len();
                *transfer = PortTransfer::default();
            } else {
                self.oreg[oreg_offset..].copy_from_slice(&remaining[..space]);
                oreg_offset = OREG_LEN;
                transfer.offset += space;
            }
        }
    }

    /// `address` is masked to the 128-byte register window.
    pub fn read(&mut self, address: u32) -> u8 {
        let address = address & 0x7F;
        match address {
            0x63 => return self.sf,
            0x75 if self.ddr[0] & 0x7F == DDR_STV_EEPROM => {
                return (STV_PDR1_INPUTS & !self.ddr[0]) | self.pdr_readback[0];
            }
            0x77 if self.ddr[1] & 0x7F == DDR_STV_SOUND_CONTROL => {
                return (STV_PDR2_INPUTS & !self.ddr[1]) | self.pdr_readback[1];
            }
            0x21..=0x5D if self.sf == 1 && self.comreg == SmpcCommand::IntBack.to_byte() => {
                // Output registers read while INTBACK is still pending
                self.process_command();
            }
            _ => {}
        }

        let value = match address >> 1 {
            index @ 0x00..=0x06 => self.ireg[index as usize],
            0x0F => self.comreg,
            index @ 0x10..=0x2F => self.oreg[(index - 0x10) as usize],
            0x30 => self.sr,
            0x31 => self.sf,
            0x3A => self.pdr[0],
            0x3B => self.pdr[1],
            0x3C => self.ddr[0],
            0x3D => self.ddr[1],
            0x3E => self.iosel,
            0x3F => self.exle,
            _ => 0,
        };
        log::trace!("SMPC read {address:02X}: {value:02X}");
        value
    }

    /// Registers only respond at odd addresses.
    pub fn write(&mut self, address: u32, value: u8) {
        if !address.bit(0) {
            return;
        }

        let address = address & 0x7F;
        log::trace!("SMPC write {address:02X}: {value:02X}");

        match address >> 1 {
            index @ 0x00..=0x06 => self.ireg[index as usize] = value,
            0x0F => self.comreg = value & 0x1F,
            index @ 0x10..=0x2F => self.oreg[(index - 0x10) as usize] = value,
            0x30 => self.sr = value,
            0x31 => self.sf = value,
            0x3A => self.pdr[0] = value,
            0x3B => self.pdr[1] = value,
            0x3C => self.ddr[0] = value,
            0x3D => self.ddr[1] = value & 0x7F,
            0x3E => self.iosel = value,
            0x3F => self.exle = value,
            _ => {}
        }

        match address {
            0x01 => self.write_ireg0(),
            0x1F => self.set_timing(),
            0x75 => self.write_pdr1(value),
            0x77 => self.write_pdr2(value),
            0x79 => self.write_ddr1(),
            _ => {}
        }
    }

    // Break or continue a multi-frame INTBACK
    fn write_ireg0(&mut self) {
        if self.first_peripheral == 0 {
            return;
        }

        if self.ireg[0].bit(6) {
            log::debug!("SMPC INTBACK break");
            self.first_peripheral = 0;
            self.sr &= 0x0F;
            self.sf = 0;
        } else if self.ireg[0].bit(7) {
            log::debug!("SMPC INTBACK continue");
            self.set_timing();
            self.sf = 1;
        }
    }

    fn port_bytes(&self, port: usize) -> [u8; 4] {
        let port = if port == 0 { self.inputs.p1 } else { self.inputs.p2 };
        match port.report().as_slice() {
            &[status, id, first, second] => [status, id, first, second],
            _ => [PORT_NOT_CONNECTED, 0xFF, 0xFF, 0xFF],
        }
    }

    // TH/TR handshake reads of the pad data nibbles
    fn th_tr_data(&self, port: usize, value: u8) -> u8 {
        let data = self.port_bytes(port);
        match value & 0x60 {
            0x60 => (value & 0x80) | 0x14 | (data[3] & 0x08),
            0x20 => (value & 0x80) | 0x10 | (data[2] >> 4),
            0x40 => (value & 0x80) | 0x10 | (data[2] & 0x0F),
            _ => (value & 0x80) | 0x10 | (data[3] >> 4),
        }
    }

    fn write_pdr1(&mut self, value: u8) {
        match self.ddr[0] & 0x7F {
            DDR_TH_MODE => {
                let data = self.port_bytes(0);
                self.pdr[0] = if value.bit(6) {
                    0x70 | (data[3] & 0x0C)
                } else {
                    0x30 | (data[2] >> 4)
                };
            }
            DDR_TH_TR_MODE => self.pdr[0] = self.th_tr_data(0, value),
            DDR_STV_EEPROM => {
                // No EEPROM is attached; only the output latch is kept
                self.pdr_readback[0] = value & self.ddr[0] & 0x7F;
                self.pdr[0] = self.pdr_readback[0];
                self.pdr_readback[0] |= value & 0x80;
            }
            mode => log::debug!("SMPC PDR1 control mode {mode:02X} not implemented"),
        }
    }

    fn write_pdr2(&mut self, value: u8) {
        match self.ddr[1] & 0x7F {
            DDR_TH_TR_MODE => self.pdr[1] = self.th_tr_data(1, value),
            DDR_STV_SOUND_CONTROL => {
                self.pdr_readback[1] = value & self.ddr[1] & 0x7F;
                self.signals.push(if self.pdr_readback[1].bit(4) {
                    SmpcSignal::StopSoundCpu
                } else {
                    SmpcSignal::StartSoundCpu
                });
                self.pdr[1] = self.pdr_readback[1];
                self.pdr_readback[1] |= value & 0x80;
            }
            mode => log::debug!("SMPC PDR2 control mode {mode:02X} not implemented"),
        }
    }

    // Peripheral ID nibble for direct-mode detection
    fn write_ddr1(&mut self) {
        if !matches!(self.ddr[0] & 0x7F, 0x00 | DDR_TH_MODE) {
            return;
        }

        let [status, id, ..] = self.port_bytes(0);
        self.pdr[0] = match (status, id) {
            (PORT_NOT_CONNECTED, _) => 0x7F,
            (PORT_DIRECT, DIGITAL_PAD_ID) => 0x7C,
            _ => 0x71,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::SaturnJoypadState;
    use saturn_config::SaturnRegion;
    use test_log::test;

    const IREG0: u32 = 0x01;
    const IREG1: u32 = 0x03;
    const COMREG: u32 = 0x1F;
    const SR: u32 = 0x61;
    const SF: u32 = 0x63;

    fn oreg(index: u32) -> u32 {
        0x21 + 2 * index
    }

    fn new_smpc() -> Smpc {
        Smpc::new(&SaturnConfig {
            region: SaturnRegion::Europe,
            clock_sync: true,
            // 2000-01-01 00:00:00 UTC, a Saturday
            base_time: Some(946_684_800),
            language: SmpcLanguage::French,
            ..SaturnConfig::default()
        })
    }

    fn issue(smpc: &mut Smpc, command: SmpcCommand) {
        smpc.write(SF, 1);
        smpc.write(COMREG, command.to_byte());
    }

    fn run_until_done(smpc: &mut Smpc) {
        for _ in 0..1000 {
            if !smpc.command_pending() {
                return;
            }
            smpc.exec(100, 0);
        }
        panic!("SMPC command did not complete");
    }

    #[test]
    fn reset_state() {
        let mut smpc = new_smpc();
        assert_eq!(smpc.read(oreg(31)), 0x0D);
        assert_eq!(smpc.read(SF), 0);
        assert_eq!(smpc.language(), SmpcLanguage::French.to_smem());
    }

    #[test]
    fn slave_and_sound_commands_emit_signals() {
        let mut smpc = new_smpc();

        issue(&mut smpc, SmpcCommand::SlaveOn);
        assert_eq!(smpc.read(SF), 1);
        smpc.exec(1, 0);
        assert_eq!(smpc.read(SF), 0);

        issue(&mut smpc, SmpcCommand::SoundOn);
        smpc.exec(1, 0);
        assert_eq!(smpc.read(oreg(31)), 0x06);

        assert_eq!(smpc.take_signals(), vec![SmpcSignal::StartSlave, SmpcSignal::StartSoundCpu]);
        assert!(smpc.take_signals().is_empty());
    }

    #[test]
    fn stv_sound_cpu_follows_pdr2() {
        let mut smpc = Smpc::new(&SaturnConfig { stv: true, ..SaturnConfig::default() });

        issue(&mut smpc, SmpcCommand::SoundOn);
        smpc.exec(1, 0);
        assert!(smpc.take_signals().is_empty());

        smpc.write(0x7B, DDR_STV_SOUND_CONTROL);
        smpc.write(0x77, 0x10);
        smpc.write(0x77, 0x00);
        assert_eq!(smpc.take_signals(), vec![SmpcSignal::StopSoundCpu, SmpcSignal::StartSoundCpu]);
    }

    #[test]
    fn unknown_command_clears_sf() {
        let mut smpc = new_smpc();
        smpc.write(SF, 1);
        smpc.write(COMREG, 0x1B);
        assert_eq!(smpc.read(SF), 0);
        assert!(!smpc.command_pending());
    }

    #[test]
    fn clock_change_sends_nmi_first() {
        let mut smpc = new_smpc();
        issue(&mut smpc, SmpcCommand::ClockChange352);
        smpc.exec(1, 0);

        assert_eq!(smpc.dot_clock(), DotClock::Dots352);
        assert_eq!(
            smpc.take_signals(),
            vec![SmpcSignal::MasterNmi, SmpcSignal::ClockChange(DotClock::Dots352)]
        );
    }

    #[test]
    fn intback_status() {
        let mut smpc = new_smpc();
        smpc.write(IREG0, 0x01);
        smpc.write(IREG1, 0x00);
        issue(&mut smpc, SmpcCommand::IntBack);

        smpc.exec(INTBACK_STATUS_TIMING - 1, 0);
        assert!(smpc.command_pending());
        smpc.exec(1, 0);
        assert!(!smpc.command_pending());

        assert_eq!(smpc.read(oreg(0)), 0xC0);
        assert_eq!(smpc.read(oreg(1)), 0x20);
        assert_eq!(smpc.read(oreg(2)), 0x00);
        assert_eq!(smpc.read(oreg(3)), 0x61);
        assert_eq!(smpc.read(oreg(4)), 0x01);
        assert_eq!(smpc.read(oreg(7)), 0x00);
        assert_eq!(smpc.read(oreg(9)), 0x0C);
        assert_eq!(smpc.read(oreg(10)), 0x34);
        assert_eq!(smpc.read(oreg(15)), SmpcLanguage::French.to_smem());
        assert_eq!(smpc.read(oreg(31)), 0x10);
        assert_eq!(smpc.read(SR), 0x40);
        assert_eq!(smpc.read(SF), 0);
        assert_eq!(smpc.take_signals(), vec![SmpcSignal::SystemManagerInterrupt]);
    }

    #[test]
    fn intback_status_then_peripheral_continuation() {
        let mut smpc = new_smpc();
        let pad = SaturnJoypadState { start: true, ..SaturnJoypadState::default() };
        smpc.set_inputs(SaturnInputs {
            p1: PeripheralPort::Pad(pad),
            p2: PeripheralPort::Disconnected,
        });

        smpc.write(IREG0, 0x01);
        smpc.write(IREG1, 0x08);
        issue(&mut smpc, SmpcCommand::IntBack);
        run_until_done(&mut smpc);
        assert_eq!(smpc.read(SR), 0x60);

        // Continue: peripheral data is returned once line 207 is reached
        smpc.write(IREG0, 0x80);
        assert_eq!(smpc.read(SF), 1);
        smpc.exec(1, 100);
        assert!(smpc.command_pending());
        smpc.exec(1, INTBACK_PERIPHERAL_LINE);
        assert!(!smpc.command_pending());

        assert_eq!(smpc.read(SR), 0xC0);
        assert_eq!(smpc.read(oreg(0)), PORT_DIRECT);
        assert_eq!(smpc.read(oreg(1)), DIGITAL_PAD_ID);
        assert_eq!(smpc.read(oreg(2)), 0xF7);
        assert_eq!(smpc.read(oreg(3)), 0xFF);
        assert_eq!(smpc.read(oreg(4)), PORT_NOT_CONNECTED);

        // Break ends the transfer
        smpc.write(IREG0, 0x40);
        assert_eq!(smpc.read(SF), 0);
        assert_eq!(smpc.read(SR), 0x00);
    }

    #[test]
    fn reading_oreg_forces_pending_intback() {
        let mut smpc = new_smpc();
        smpc.write(IREG0, 0x01);
        smpc.write(IREG1, 0x00);
        issue(&mut smpc, SmpcCommand::IntBack);

        assert_eq!(smpc.read(oreg(9)), 0x0C);
        assert!(!smpc.command_pending());
    }

    #[test]
    fn setsmem_updates_language() {
        let mut smpc = new_smpc();
        for (i, value) in [0x11, 0x22, 0x33, 0x05].into_iter().enumerate() {
            smpc.write(IREG0 + 2 * i as u32, value);
        }
        issue(&mut smpc, SmpcCommand::SetSmem);
        smpc.exec(1, 0);

        assert_eq!(smpc.read(oreg(31)), 0x17);
        assert_eq!(smpc.language_setting(), Some(SmpcLanguage::Japanese));
    }

    #[test]
    fn reset_button_respects_resdisa() {
        let mut smpc = new_smpc();
        smpc.reset_button();
        assert!(smpc.take_signals().is_empty());

        issue(&mut smpc, SmpcCommand::ResetEnable);
        smpc.exec(1, 0);
        smpc.reset_button();
        assert_eq!(smpc.take_signals(), vec![SmpcSignal::MasterNmi]);
    }

    #[test]
    fn even_addresses_ignore_writes() {
        let mut smpc = new_smpc();
        smpc.write(0x1E, 0x10);
        assert_eq!(smpc.read(COMREG), 0);
        assert!(!smpc.command_pending());
    }
}
