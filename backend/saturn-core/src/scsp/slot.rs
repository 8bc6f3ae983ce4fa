//! SCSP synthesis slots
//!
//! Every output sample runs 32 pipeline steps. At step N the seven operations are applied to seven
//! different slots (N, N-1, ..., N-6 mod 32), so a slot's modulation read-back sees the sound stack
//! as it was left by the previous sample.

use crate::scsp::SoundRam;
use crate::scsp::tables::{
    ATTACK_RATE_TABLE, DECAY_RATE_TABLE, ENVELOPE_TABLE, LFO_STEP_TABLE, LfoTables, RATE_END,
};
use bincode::{Decode, Encode};
use saturn_common::num::GetBit;

pub const SLOT_COUNT: usize = 32;

/// Attenuation at or above this value silences a slot and skips its pipeline operations.
pub const DECAY_END: u16 = 0x3BF;
pub const MAX_ATTENUATION: u16 = 0x3FF;

const KEY_ON_ATTENUATION: u16 = 0x280;
const PHASE_FRACT_BITS: u32 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum EnvelopePhase {
    Attack,
    Decay1,
    Decay2,
    #[default]
    Release,
}

impl EnvelopePhase {
    /// SGC value reported through the monitor register.
    #[must_use]
    pub fn to_sgc(self) -> u16 {
        match self {
            Self::Attack => 0,
            Self::Decay1 => 1,
            Self::Decay2 => 2,
            Self::Release => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum LoopControl {
    #[default]
    Off,
    Normal,
    Reverse,
    PingPong,
}

impl LoopControl {
    fn from_bits(bits: u16) -> Self {
        match bits & 3 {
            0 => Self::Off,
            1 => Self::Normal,
            2 => Self::Reverse,
            3 => Self::PingPong,
            _ => unreachable!("value & 3 is always <= 3"),
        }
    }

    fn to_bits(self) -> u16 {
        self as u16
    }
}

/// Programmer-visible slot registers.
#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct SlotRegisters {
    pub key_on: bool,
    pub source_bit_control: u8,
    pub source_control: u8,
    pub loop_control: LoopControl,
    pub pcm_8bit: bool,
    pub start_address: u32,
    pub loop_start: u16,
    pub loop_end: u16,
    pub decay2_rate: u8,
    pub decay1_rate: u8,
    pub hold: bool,
    pub attack_rate: u8,
    pub unknown1: bool,
    pub loop_start_link: bool,
    pub key_rate_scaling: u8,
    pub decay_level: u8,
    pub release_rate: u8,
    pub unknown2: u8,
    pub stack_write_inhibit: bool,
    pub sound_direct: bool,
    pub total_level: u8,
    pub modulation_level: u8,
    pub modulation_x_select: u8,
    pub modulation_y_select: u8,
    pub unknown3: bool,
    pub octave: u8,
    pub unknown4: bool,
    pub frequency: u16,
    pub lfo_reset: bool,
    pub lfo_frequency: u8,
    pub pitch_lfo_waveform: u8,
    pub pitch_lfo_sensitivity: u8,
    pub amplitude_lfo_waveform: u8,
    pub amplitude_lfo_sensitivity: u8,
    pub unknown5: bool,
    pub input_select: u8,
    pub input_mix_level: u8,
    pub direct_send_level: u8,
    pub direct_pan: u8,
    pub effect_send_level: u8,
    pub effect_pan: u8,
}

impl SlotRegisters {
    fn set_attack_rate(&mut self, rate: u8) {
        self.attack_rate = rate.max(0x10);
        if self.hold {
            self.attack_rate = 0x1F;
        }
    }
}

/// Runtime slot state.
#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct SlotState {
    pub number: u8,
    pub wave: u16,
    pub backwards: bool,
    pub envelope: EnvelopePhase,
    pub output: i16,
    pub attenuation: u16,
    pub step_count: usize,
    pub sample_counter: u32,
    pub envelope_steps_taken: u32,
    // Fixed point with 18 fractional bits
    pub phase: i32,
    pub sample_offset: i32,
    pub address_pointer: u32,
    pub lfo_counter: u32,
    pub lfo_position: u8,
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct Slot {
    pub regs: SlotRegisters,
    pub state: SlotState,
}

impl Slot {
    #[must_use]
    pub fn new(number: u8) -> Self {
        Self {
            regs: SlotRegisters::default(),
            state: SlotState {
                number,
                attenuation: MAX_ATTENUATION,
                envelope: EnvelopePhase::Release,
                ..SlotState::default()
            },
        }
    }

    fn silent(&self) -> bool {
        self.state.attenuation >= DECAY_END
    }

    fn change_envelope(&mut self, phase: EnvelopePhase) {
        if self.state.envelope != phase {
            self.state.envelope = phase;
            self.state.step_count = 0;
        }
    }

    /// Starts the attack phase. Has no effect unless the slot is released.
    pub fn key_on(&mut self) {
        if self.state.envelope != EnvelopePhase::Release {
            return;
        }

        self.change_envelope(EnvelopePhase::Attack);
        self.state.attenuation = KEY_ON_ATTENUATION;
        self.state.sample_counter = 0;
        self.state.sample_offset = 0;
        self.state.envelope_steps_taken = 0;

        // 16-bit samples must start on a word boundary
        if !self.regs.pcm_8bit && self.regs.start_address.bit(0) {
            self.regs.start_address &= 0xFFFFFE;
        }

        if self.regs.source_control != 0 {
            log::debug!(
                "Slot {} keyed on with unsupported sound source {}",
                self.state.number,
                self.regs.source_control
            );
        }

        log::trace!(
            "Slot {} key on: SA={:05X} LSA={:04X} LEA={:04X}",
            self.state.number,
            self.regs.start_address,
            self.regs.loop_start,
            self.regs.loop_end
        );
    }

    pub fn key_off(&mut self) {
        self.change_envelope(EnvelopePhase::Release);
    }

    /// Phase generator and pitch LFO.
    pub fn op1(&mut self, lfo: &LfoTables) {
        if self.silent() {
            return;
        }

        let octave = u32::from(self.regs.octave ^ 8);
        let frequency = u32::from(self.regs.frequency ^ 0x400);
        let phase_increment = (frequency << octave) as i32;

        if self.state.lfo_counter % LFO_STEP_TABLE[self.regs.lfo_frequency as usize] == 0 {
            self.state.lfo_counter = 0;
            self.state.lfo_position = self.state.lfo_position.wrapping_add(1);
        }

        let pitch_lfo = lfo.pitch(self.regs.pitch_lfo_waveform, self.state.lfo_position);
        let pitch_lfo_shifted = (pitch_lfo * (1 << self.regs.pitch_lfo_sensitivity)) >> 2;

        self.state.phase &= (1 << PHASE_FRACT_BITS) - 1;
        self.state.phase += phase_increment + pitch_lfo_shifted;
    }

    /// Address pointer calculation and modulation data read.
    pub fn op2(&mut self, sound_stack: &[i16; 64]) {
        if self.silent() {
            return;
        }

        let sample_delta = self.state.phase >> PHASE_FRACT_BITS;

        let mut modulation = 0;
        if self.regs.modulation_level != 0 {
            let stack_index = |select: u8| {
                (usize::from(select) + usize::from(self.state.number)) & (SLOT_COUNT - 1)
            };
            let x: i32 = sound_stack[stack_index(self.regs.modulation_x_select)].into();
            let y: i32 = sound_stack[stack_index(self.regs.modulation_y_select)].into();
            modulation = ((x + y) / 2) >> (0xF - self.regs.modulation_level);
        }

        let loop_start: i32 = self.regs.loop_start.into();
        let loop_end: i32 = self.regs.loop_end.into();
        let state = &mut self.state;
        match self.regs.loop_control {
            LoopControl::Off => {
                state.sample_offset += sample_delta;
                if state.sample_offset >= loop_end {
                    state.attenuation = MAX_ATTENUATION;
                }
            }
            LoopControl::Normal => {
                state.sample_offset += sample_delta;
                if state.sample_offset >= loop_end {
                    state.sample_offset = loop_start;
                }
            }
            LoopControl::Reverse => {
                if state.backwards {
                    state.sample_offset -= sample_delta;
                    if state.sample_offset <= loop_start {
                        state.sample_offset = loop_end;
                    }
                } else {
                    state.sample_offset += sample_delta;
                    if state.sample_offset >= loop_end {
                        state.sample_offset = loop_end;
                        state.backwards = true;
                    }
                }
            }
            LoopControl::PingPong => {
                if state.backwards {
                    state.sample_offset -= sample_delta;
                    if state.sample_offset <= loop_start {
                        state.sample_offset = loop_start;
                        state.backwards = false;
                    }
                } else {
                    state.sample_offset += sample_delta;
                    if state.sample_offset >= loop_end {
                        state.sample_offset = loop_end;
                        state.backwards = true;
                    }
                }
            }
        }

        let start_address = self.regs.start_address as i32;
        let sample_index = state.sample_offset + modulation;
        state.address_pointer = if self.regs.pcm_8bit {
            start_address.wrapping_add(sample_index) as u32
        } else {
            start_address.wrapping_add(sample_index.wrapping_mul(2)) as u32
        };
    }

    /// Waveform read from sound RAM.
    pub fn op3(&mut self, sound_ram: &SoundRam) {
        if self.silent() {
            return;
        }

        // External and noise sound sources are not emulated
        if self.regs.source_control != 0 {
            self.state.wave = 0;
            self.state.output = 0;
            return;
        }

        let address = self.state.address_pointer;
        self.state.wave = if self.regs.pcm_8bit {
            u16::from(sound_ram.read_byte(address)) << 8
        } else {
            sound_ram.read_word(address)
        };
        self.state.output = self.state.wave as i16;
    }

    fn effective_rate(&self, rate: u8) -> i32 {
        let rate: i32 = rate.into();
        let result = if self.regs.key_rate_scaling == 0xF {
            rate * 2
        } else {
            let scaled = i32::from(self.regs.key_rate_scaling) * 2
                + rate * 2
                + i32::from(self.regs.frequency.bit(9));
            i32::from(8 ^ self.regs.octave) + (scaled - 8)
        };

        result.clamp(0, 0x3C)
    }

    fn need_envelope_step(&mut self, effective_rate: i32) -> bool {
        let sample_counter = self.state.sample_counter;
        if sample_counter == 0 || effective_rate <= 1 {
            return false;
        }

        if effective_rate >= 0x30 {
            if sample_counter & 1 == 0 {
                self.state.envelope_steps_taken += 1;
                return true;
            }
            return false;
        }

        let row = &ENVELOPE_TABLE[(effective_rate - 2) as usize];
        let interval = u32::from(row[self.state.step_count]).max(1);
        if sample_counter % interval != 0 {
            return false;
        }

        self.state.envelope_steps_taken += 1;
        self.state.step_count += 1;
        if row[self.state.step_count] == RATE_END {
            self.state.step_count = 0;
        }
        true
    }

    fn rate_table_row(effective_rate: i32) -> usize {
        if effective_rate <= 0x30 { 0 } else { (effective_rate - 0x30) as usize }
    }

    fn decay(&mut self, rate: u8) {
        let effective_rate = self.effective_rate(rate);
        let step = (self.state.envelope_steps_taken & 3) as usize;
        let increment = DECAY_RATE_TABLE[Self::rate_table_row(effective_rate)][step];

        if self.need_envelope_step(effective_rate) && self.state.attenuation < DECAY_END {
            self.state.attenuation += u16::from(increment);
        }
    }

    /// Envelope generator.
    pub fn op4(&mut self) {
        if self.silent() {
            return;
        }

        match self.state.envelope {
            EnvelopePhase::Attack => {
                let step = (self.state.envelope_steps_taken & 3) as usize;
                let effective_rate = self.effective_rate(self.regs.attack_rate);
                if self.need_envelope_step(effective_rate) {
                    let shift = ATTACK_RATE_TABLE[Self::rate_table_row(effective_rate)][step];
                    let attenuation = self.state.attenuation;
                    self.state.attenuation = attenuation - ((attenuation >> shift) + 1);

                    if self.state.attenuation == 0 {
                        self.change_envelope(EnvelopePhase::Decay1);
                    }
                }
            }
            EnvelopePhase::Decay1 => {
                self.decay(self.regs.decay1_rate);
                if (self.state.attenuation >> 5) >= u16::from(self.regs.decay_level) {
                    self.change_envelope(EnvelopePhase::Decay2);
                }
            }
            EnvelopePhase::Decay2 => self.decay(self.regs.decay2_rate),
            EnvelopePhase::Release => self.decay(self.regs.release_rate),
        }
    }

    /// Level calculation with the amplitude LFO applied.
    pub fn op5(&mut self, lfo: &LfoTables) {
        if self.silent() {
            self.state.output = 0;
            return;
        }

        let amplitude_lfo =
            lfo.amplitude(self.regs.amplitude_lfo_waveform, self.state.lfo_position);
        let lfo_add = ((amplitude_lfo + 1) >> (7 - self.regs.amplitude_lfo_sensitivity)) << 1;
        let attenuation = i32::from(self.state.attenuation) + lfo_add;
        self.state.output = apply_volume(self.regs.total_level, attenuation, self.state.output);
    }

    /// Sound stack write.
    pub fn op7(&mut self, sound_stack: &mut [i16; 64]) {
        let number = usize::from(self.state.number);
        let previous = sound_stack[number + SLOT_COUNT];
        sound_stack[number + SLOT_COUNT] = self.state.output;
        sound_stack[number] = previous;

        self.state.sample_counter = self.state.sample_counter.wrapping_add(1);
        self.state.lfo_counter = self.state.lfo_counter.wrapping_add(1);
    }

    #[must_use]
    pub fn read_byte(&self, offset: u32) -> u8 {
        let word = self.read_word(offset & !1);
        if offset.bit(0) { word as u8 } else { (word >> 8) as u8 }
    }

    #[must_use]
    pub fn read_word(&self, offset: u32) -> u16 {
        let regs = &self.regs;
        match (offset & 0x1F) >> 1 {
            0 => {
                (u16::from(regs.key_on) << 11)
                    | (u16::from(regs.source_bit_control) << 9)
                    | (u16::from(regs.source_control) << 7)
                    | (regs.loop_control.to_bits() << 5)
                    | (u16::from(regs.pcm_8bit) << 4)
                    | ((regs.start_address >> 16) & 0xF) as u16
            }
            1 => regs.start_address as u16,
            2 => regs.loop_start,
            3 => regs.loop_end,
            4 => {
                (u16::from(regs.decay2_rate) << 11)
                    | (u16::from(regs.decay1_rate) << 6)
                    | (u16::from(regs.hold) << 5)
                    | u16::from(regs.attack_rate)
            }
            5 => {
                (u16::from(regs.unknown1) << 15)
                    | (u16::from(regs.loop_start_link) << 14)
                    | (u16::from(regs.key_rate_scaling) << 10)
                    | (u16::from(regs.decay_level) << 5)
                    | u16::from(regs.release_rate)
            }
            6 => {
                (u16::from(regs.unknown2) << 10)
                    | (u16::from(regs.stack_write_inhibit) << 9)
                    | (u16::from(regs.sound_direct) << 8)
                    | u16::from(regs.total_level)
            }
            7 => {
                (u16::from(regs.modulation_level) << 12)
                    | (u16::from(regs.modulation_x_select) << 6)
                    | u16::from(regs.modulation_y_select)
            }
            8 => {
                (u16::from(regs.unknown3) << 15)
                    | (u16::from(regs.octave) << 11)
                    | (u16::from(regs.unknown4) << 10)
                    | regs.frequency
            }
            9 => {
                (u16::from(regs.lfo_reset) << 15)
                    | (u16::from(regs.lfo_frequency) << 10)
                    | (u16::from(regs.pitch_lfo_waveform) << 8)
                    | (u16::from(regs.pitch_lfo_sensitivity) << 5)
                    | (u16::from(regs.amplitude_lfo_waveform) << 3)
                    | u16::from(regs.amplitude_lfo_sensitivity)
            }
            10 => {
                (u16::from(regs.unknown5) << 7)
                    | (u16::from(regs.input_select) << 3)
                    | u16::from(regs.input_mix_level)
            }
            11 => {
                (u16::from(regs.direct_send_level) << 13)
                    | (u16::from(regs.direct_pan) << 8)
                    | (u16::from(regs.effect_send_level) << 5)
                    | u16::from(regs.effect_pan)
            }
            _ => 0,
        }
    }

    /// Word register write. KYONEX (bit 12 of word 0) is handled by the caller since it applies
    /// to every slot.
    pub fn write_word(&mut self, offset: u32, value: u16) {
        let regs = &mut self.regs;
        match (offset & 0x1F) >> 1 {
            0 => {
                regs.key_on = value.bit(11);
                regs.source_bit_control = ((value >> 9) & 3) as u8;
                regs.source_control = ((value >> 7) & 3) as u8;
                regs.loop_control = LoopControl::from_bits(value >> 5);
                regs.pcm_8bit = value.bit(4);
                regs.start_address =
                    (regs.start_address & 0xFFFF) | (u32::from(value & 0xF) << 16);
            }
            1 => regs.start_address = (regs.start_address & 0xF0000) | u32::from(value),
            2 => regs.loop_start = value,
            3 => regs.loop_end = value,
            4 => {
                regs.decay2_rate = (value >> 11) as u8;
                regs.decay1_rate = ((value >> 6) & 0x1F) as u8;
                regs.hold = value.bit(5);
                regs.set_attack_rate((value & 0x1F) as u8);
            }
            5 => {
                regs.unknown1 = value.bit(15);
                regs.loop_start_link = value.bit(14);
                regs.key_rate_scaling = ((value >> 10) & 0xF) as u8;
                regs.decay_level = ((value >> 5) & 0x1F) as u8;
                regs.release_rate = (value & 0x1F) as u8;
            }
            6 => {
                regs.unknown2 = ((value >> 10) & 3) as u8;
                regs.stack_write_inhibit = value.bit(9);
                regs.sound_direct = value.bit(8);
                regs.total_level = value as u8;
            }
            7 => {
                regs.modulation_level = ((value >> 12) & 0xF) as u8;
                regs.modulation_x_select = ((value >> 6) & 0x3F) as u8;
                regs.modulation_y_select = (value & 0x3F) as u8;
            }
            8 => {
                regs.unknown3 = value.bit(15);
                regs.unknown4 = value.bit(10);
                regs.octave = ((value >> 11) & 0xF) as u8;
                regs.frequency = value & 0x3FF;
            }
            9 => {
                regs.lfo_reset = value.bit(15);
                regs.lfo_frequency = ((value >> 10) & 0x1F) as u8;
                regs.pitch_lfo_waveform = ((value >> 8) & 3) as u8;
                regs.pitch_lfo_sensitivity = ((value >> 5) & 7) as u8;
                regs.amplitude_lfo_waveform = ((value >> 3) & 3) as u8;
                regs.amplitude_lfo_sensitivity = (value & 7) as u8;
            }
            10 => {
                regs.unknown5 = value.bit(7);
                regs.input_select = ((value >> 3) & 0xF) as u8;
                regs.input_mix_level = (value & 7) as u8;
            }
            11 => {
                regs.direct_send_level = ((value >> 13) & 7) as u8;
                regs.direct_pan = ((value >> 8) & 0x1F) as u8;
                regs.effect_send_level = ((value >> 5) & 7) as u8;
                regs.effect_pan = (value & 0x1F) as u8;
            }
            _ => {}
        }
    }

    /// Byte register write. Fields that straddle a byte boundary keep their other half.
    pub fn write_byte(&mut self, offset: u32, value: u8) {
        let regs = &mut self.regs;
        let value16 = u16::from(value);
        match offset & 0x1F {
            0 => {
                regs.key_on = value.bit(3);
                regs.source_bit_control = (value >> 1) & 3;
                regs.source_control = (regs.source_control & 1) | ((value & 1) << 1);
            }
            1 => {
                regs.source_control = (regs.source_control & 2) | (value >> 7);
                regs.loop_control = LoopControl::from_bits(value16 >> 5);
                regs.pcm_8bit = value.bit(4);
                regs.start_address =
                    (regs.start_address & 0xFFFF) | (u32::from(value & 0xF) << 16);
            }
            2 => regs.start_address = (regs.start_address & 0xF00FF) | (u32::from(value) << 8),
            3 => regs.start_address = (regs.start_address & 0xFFF00) | u32::from(value),
            4 => regs.loop_start = (regs.loop_start & 0x00FF) | (value16 << 8),
            5 => regs.loop_start = (regs.loop_start & 0xFF00) | value16,
            6 => regs.loop_end = (regs.loop_end & 0x00FF) | (value16 << 8),
            7 => regs.loop_end = (regs.loop_end & 0xFF00) | value16,
            8 => {
                regs.decay2_rate = (value >> 3) & 0x1F;
                regs.decay1_rate = (regs.decay1_rate & 3) | ((value & 7) << 2);
            }
            9 => {
                regs.decay1_rate = (regs.decay1_rate & 0x1C) | (value >> 6);
                regs.hold = value.bit(5);
                regs.set_attack_rate(value & 0x1F);
            }
            10 => {
                regs.unknown1 = value.bit(7);
                regs.loop_start_link = value.bit(6);
                regs.key_rate_scaling = (value >> 2) & 0xF;
                regs.decay_level = (regs.decay_level & 7) | ((value & 3) << 3);
            }
            11 => {
                regs.decay_level = (regs.decay_level & 0x18) | (value >> 5);
                regs.release_rate = value & 0x1F;
            }
            12 => {
                regs.unknown2 = (value >> 2) & 3;
                regs.stack_write_inhibit = value.bit(1);
                regs.sound_direct = value.bit(0);
            }
            13 => regs.total_level = value,
            14 => {
                regs.modulation_level = value >> 4;
                regs.modulation_x_select = (regs.modulation_x_select & 3) | ((value & 0xF) << 2);
            }
            15 => {
                regs.modulation_x_select = (regs.modulation_x_select & 0x3C) | (value >> 6);
                regs.modulation_y_select = value & 0x3F;
            }
            16 => {
                regs.unknown3 = value.bit(7);
                regs.octave = (value >> 3) & 0xF;
                regs.unknown4 = value.bit(2);
                regs.frequency = (regs.frequency & 0xFF) | (u16::from(value & 3) << 8);
            }
            17 => regs.frequency = (regs.frequency & 0x300) | value16,
            18 => {
                regs.lfo_reset = value.bit(7);
                regs.lfo_frequency = (value >> 2) & 0x1F;
                regs.pitch_lfo_waveform = value & 3;
            }
            19 => {
                regs.pitch_lfo_sensitivity = value >> 5;
                regs.amplitude_lfo_waveform = (value >> 3) & 3;
                regs.amplitude_lfo_sensitivity = value & 7;
            }
            21 => {
                regs.unknown5 = value.bit(7);
                regs.input_select = (value >> 3) & 0xF;
                regs.input_mix_level = value & 7;
            }
            22 => {
                regs.direct_send_level = value >> 5;
                regs.direct_pan = value & 0x1F;
            }
            23 => {
                regs.effect_send_level = value >> 5;
                regs.effect_pan = value & 0x1F;
            }
            _ => {}
        }
    }
}

/// Total level plus envelope attenuation, as 6 bits of mantissa and 4 bits of exponent.
fn apply_volume(total_level: u8, attenuation: i32, sample: i16) -> i16 {
    let level = (i32::from(total_level) * 4 + attenuation).min(0x3FF);
    ((i32::from(sample) * ((level & 0x3F) ^ 0x7F)) >> ((level >> 6) + 7)) as i16
}

/// Right shift for a send level; 0 means the send is muted.
#[must_use]
pub fn send_level_shift(level: u8) -> u32 {
    if level == 0 { 16 } else { u32::from(7 - level) }
}

/// Left and right attenuation shifts for a 5-bit pan value.
#[must_use]
pub fn pan_shifts(pan: u8) -> (u32, u32) {
    if pan.bit(4) { (0, u32::from(pan & 0xF)) } else { (u32::from(pan & 0xF), 0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn key_on_only_from_release() {
        let mut slot = Slot::new(5);
        slot.regs.start_address = 0x1001;
        slot.state.sample_counter = 77;
        slot.state.sample_offset = 12;

        slot.key_on();
        assert_eq!(slot.state.envelope, EnvelopePhase::Attack);
        assert_eq!(slot.state.attenuation, 0x280);
        assert_eq!(slot.state.sample_counter, 0);
        assert_eq!(slot.state.sample_offset, 0);
        assert_eq!(slot.regs.start_address, 0x1000);

        slot.state.attenuation = 0x123;
        slot.state.sample_counter = 9;
        slot.key_on();
        assert_eq!(slot.state.envelope, EnvelopePhase::Attack);
        assert_eq!(slot.state.attenuation, 0x123);
        assert_eq!(slot.state.sample_counter, 9);

        slot.key_off();
        assert_eq!(slot.state.envelope, EnvelopePhase::Release);
        assert_eq!(slot.state.attenuation, 0x123);
    }

    #[test]
    fn ping_pong_reverses_at_loop_points() {
        let mut slot = Slot::new(0);
        slot.regs.loop_control = LoopControl::PingPong;
        slot.regs.loop_start = 0;
        slot.regs.loop_end = 100;
        slot.state.attenuation = 0;
        let stack = [0; 64];

        let mut toggles = 0;
        let mut backwards = slot.state.backwards;
        let mut max_offset = 0;
        for _ in 0..200 {
            slot.state.phase = 1 << PHASE_FRACT_BITS;
            slot.op2(&stack);
            max_offset = max_offset.max(slot.state.sample_offset);
            if slot.state.backwards != backwards {
                toggles += 1;
                backwards = slot.state.backwards;
            }
        }

        assert_eq!(toggles, 2);
        assert_eq!(max_offset, 100);
        assert_eq!(slot.state.sample_offset, 0);
        assert!(!slot.state.backwards);
    }

    #[test]
    fn non_looping_slot_stops_at_loop_end() {
        let mut slot = Slot::new(0);
        slot.regs.loop_end = 3;
        slot.state.attenuation = 0;
        let stack = [0; 64];

        for _ in 0..3 {
            slot.state.phase = 1 << PHASE_FRACT_BITS;
            slot.op2(&stack);
        }

        assert_eq!(slot.state.attenuation, MAX_ATTENUATION);
        assert_eq!(slot.state.address_pointer, 6);
    }

    #[test]
    fn attack_rate_has_floor_and_hold_forces_maximum() {
        let mut slot = Slot::new(0);
        slot.write_word(0x08, 0x0003);
        assert_eq!(slot.regs.attack_rate, 0x10);

        slot.write_word(0x08, 0x0023);
        assert!(slot.regs.hold);
        assert_eq!(slot.regs.attack_rate, 0x1F);
        assert_eq!(slot.read_word(0x08), 0x003F);
    }

    #[test]
    fn byte_writes_merge_split_fields() {
        let mut slot = Slot::new(0);
        slot.write_byte(0x01, 0x35);
        slot.write_byte(0x02, 0x12);
        slot.write_byte(0x03, 0x34);
        assert_eq!(slot.regs.start_address, 0x51234);
        assert_eq!(slot.regs.loop_control, LoopControl::Normal);
        assert!(slot.regs.pcm_8bit);
        assert_eq!(slot.read_byte(0x01), 0x35);

        slot.write_byte(0x0E, 0x53);
        slot.write_byte(0x0F, 0x81);
        assert_eq!(slot.regs.modulation_level, 5);
        assert_eq!(slot.regs.modulation_x_select, 0x0E);
        assert_eq!(slot.regs.modulation_y_select, 0x01);
        assert_eq!(slot.read_word(0x0E), 0x5381);
    }

    #[test]
    fn volume_attenuation_curve() {
        assert_eq!(apply_volume(0, 0, 0x4000), 0x7F00 >> 1);
        assert_eq!(apply_volume(0, 0x40, 0x4000), 0x7F00 >> 2);
        assert_eq!(apply_volume(0xFF, 0x3FF, 0x7FFF), 0);
    }

    #[test]
    fn pan_and_send_levels() {
        assert_eq!(pan_shifts(0x00), (0, 0));
        assert_eq!(pan_shifts(0x05), (5, 0));
        assert_eq!(pan_shifts(0x15), (0, 5));
        assert_eq!(send_level_shift(0), 16);
        assert_eq!(send_level_shift(7), 0);
    }
}
