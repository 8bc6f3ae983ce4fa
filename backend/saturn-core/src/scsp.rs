//! Yamaha YMF292 SCSP (Saturn Custom Sound Processor)
//!
//! Owns sound RAM and the register file shared by the SH-2 bus (`$25A00000`/`$25B00000`) and the
//! 68000 (`$000000`/`$100000`).

pub mod cdda;
pub mod dsp;
pub mod midi;
pub mod slot;
pub mod tables;
pub mod timers;

use crate::scsp::cdda::{CdReadTiming, CddaBuffer, SECTOR_LEN};
use crate::scsp::dsp::Dsp;
use crate::scsp::midi::Midi;
use crate::scsp::slot::{SLOT_COUNT, Slot, pan_shifts, send_level_shift};
use crate::scsp::tables::LfoTables;
use crate::scsp::timers::Timers;
use bincode::{Decode, Encode};
use saturn_common::boxedarray::BoxedByteArray;
use saturn_common::num::{GetBit, U16Ext};
use std::array;

pub const SOUND_RAM_LEN: usize = 512 * 1024;

pub const SCSP_CLOCK_RATE: u64 = 22_579_200;
pub const CYCLES_PER_SAMPLE: i32 = 512;
pub const SAMPLE_RATE: u64 = SCSP_CLOCK_RATE / CYCLES_PER_SAMPLE as u64;

const SOUND_RAM_MASK: u32 = SOUND_RAM_LEN as u32 - 1;
// Only the first 128KB is decoded when MEM4MB is clear
const SOUND_RAM_SMALL_MASK: u32 = 0x1FFFF;

const REGISTER_MASK: u32 = 0xFFF;

// Register regions (offsets from the start of the register block)
const SLOT_REGISTERS_END: u32 = 0x3FF;
const COMMON_REGISTERS_START: u32 = 0x400;
const COMMON_REGISTERS_END: u32 = 0x43F;
const SOUND_STACK_START: u32 = 0x600;
const SOUND_STACK_END: u32 = 0x6FF;
const COEF_START: u32 = 0x700;
const COEF_END: u32 = 0x77F;
const MADRS_START: u32 = 0x780;
const MADRS_END: u32 = 0x7BF;
const MPRO_START: u32 = 0x800;
const MPRO_END: u32 = 0xBFF;
const MIXS_START: u32 = 0xE80;
const MIXS_END: u32 = 0xEBF;
const EFREG_START: u32 = 0xEC0;
const EFREG_END: u32 = 0xEDF;
const EXTS_START: u32 = 0xEE0;
const EXTS_END: u32 = 0xEE3;

const COMMON_WORDS: usize = 0x20;

const DMA_INTERRUPT: u16 = 1 << 4;
const SOFTWARE_INTERRUPT: u16 = 1 << 5;

// DMA flag bits (upper nibble of the DGATE/DDIR/DEXE byte)
const DMA_EXECUTE: u8 = 0x10;
const DMA_DIRECTION: u8 = 0x20;
const DMA_GATE: u8 = 0x40;

#[derive(Debug, Clone, Encode, Decode)]
pub struct SoundRam {
    ram: BoxedByteArray<SOUND_RAM_LEN>,
    mem4mb: bool,
}

impl SoundRam {
    #[must_use]
    pub fn new() -> Self {
        Self { ram: BoxedByteArray::new(), mem4mb: false }
    }

    pub fn clear(&mut self) {
        self.ram.fill(0);
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        self.ram.as_slice()
    }

    // Word and longword accesses decode 20 address bits; the upper 512KB is open when MEM4MB is set
    fn wide_address(&self, address: u32) -> Option<usize> {
        let address = address & 0xFFFFF;
        if !self.mem4mb {
            Some((address & SOUND_RAM_SMALL_MASK) as usize)
        } else if address > SOUND_RAM_MASK {
            None
        } else {
            Some(address as usize)
        }
    }

    #[must_use]
    pub fn read_byte(&self, address: u32) -> u8 {
        let mut address = address & SOUND_RAM_MASK;
        if !self.mem4mb {
            address &= SOUND_RAM_SMALL_MASK;
        }
        self.ram[address as usize]
    }

    #[must_use]
    pub fn read_word(&self, address: u32) -> u16 {
        match self.wide_address(address & !1) {
            Some(address) => u16::from_be_bytes([self.ram[address], self.ram[address + 1]]),
            None => 0xFFFF,
        }
    }

    #[must_use]
    pub fn read_longword(&self, address: u32) -> u32 {
        match self.wide_address(address & !3) {
            Some(address) => u32::from_be_bytes([
                self.ram[address],
                self.ram[address + 1],
                self.ram[address + 2],
                self.ram[address + 3],
            ]),
            None => 0xFFFFFFFF,
        }
    }

    pub fn write_byte(&mut self, address: u32, value: u8) {
        let mut address = address & SOUND_RAM_MASK;
        if !self.mem4mb {
            address &= SOUND_RAM_SMALL_MASK;
        }
        self.ram[address as usize] = value;
    }

    pub fn write_word(&mut self, address: u32, value: u16) {
        if let Some(address) = self.wide_address(address & !1) {
            self.ram[address..address + 2].copy_from_slice(&value.to_be_bytes());
        }
    }

    pub fn write_longword(&mut self, address: u32, value: u32) {
        if let Some(address) = self.wide_address(address & !3) {
            self.ram[address..address + 4].copy_from_slice(&value.to_be_bytes());
        }
    }

    /// Unmirrored word read used by the DSP ring buffer.
    #[must_use]
    pub fn read_word_direct(&self, address: u32) -> u16 {
        let address = (address & (SOUND_RAM_MASK & !1)) as usize;
        u16::from_be_bytes([self.ram[address], self.ram[address + 1]])
    }

    pub fn write_word_direct(&mut self, address: u32, value: u16) {
        let address = (address & (SOUND_RAM_MASK & !1)) as usize;
        self.ram[address..address + 2].copy_from_slice(&value.to_be_bytes());
    }
}

impl Default for SoundRam {
    fn default() -> Self {
        Self::new()
    }
}

/// SCIEB/SCIPD/SCILV for the 68000 and MCIEB/MCIPD for the main CPU.
#[derive(Debug, Clone, Default, Encode, Decode)]
struct InterruptControl {
    sound_enabled: u16,
    sound_pending: u16,
    sound_levels: [u8; 3],
    main_enabled: u16,
    main_pending: u16,
    sound_cpu_level: Option<u8>,
    main_request: bool,
}

impl InterruptControl {
    fn set_sound_cpu_level(&mut self, level: u8) {
        log::trace!("SCSP sound CPU interrupt level {level}");
        self.sound_cpu_level = Some(level);
    }

    fn level_for(&self, mask: u16) -> u8 {
        let mut level = 0;
        for (i, &levels) in self.sound_levels.iter().enumerate() {
            if u16::from(levels) & mask != 0 {
                level |= 1 << i;
            }
        }
        level
    }

    // Recomputes the 68000 interrupt level from every pending and enabled source. Sources above
    // bit 7 share the level bits of bit 7.
    fn check_sound(&mut self) {
        let mut mask = self.sound_pending & self.sound_enabled;
        if mask & !0xFF != 0 {
            mask = (mask & 0xFF) | 0x80;
        }

        let level = (0..8)
            .filter(|&bit| mask.bit(bit))
            .map(|bit| self.level_for(1 << bit))
            .max()
            .unwrap_or(0);
        if level != 0 {
            self.set_sound_cpu_level(level);
        }
    }

    fn trigger_sound(&mut self, id: u16) {
        let level = self.level_for(id.min(0x80));
        self.set_sound_cpu_level(level);
    }

    fn sound_interrupt(&mut self, id: u16) {
        self.sound_pending |= id;
        if self.sound_enabled & id != 0 {
            self.trigger_sound(id);
        }
    }

    fn main_interrupt(&mut self, id: u16) {
        self.main_pending |= id;
        if self.main_enabled & id != 0 {
            self.main_request = true;
        }
    }

    fn write_main_enabled(&mut self, value: u16) {
        self.main_enabled = value;
        if (0..11).any(|bit| value.bit(bit) && self.main_pending.bit(bit)) {
            self.main_request = true;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Encode, Decode)]
struct Monitor {
    call_address: u16,
    envelope_phase: u16,
    envelope_level: u16,
}

#[derive(Debug, Clone, Copy, Default, Encode, Decode)]
struct DmaRegisters {
    memory_address: u32,
    register_address: u32,
    length: u32,
    flags: u8,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Scsp {
    sound_ram: SoundRam,
    slots: [Slot; SLOT_COUNT],
    sound_stack: [i16; 64],
    lfo: LfoTables,
    dsp: Dsp,
    common: [u16; COMMON_WORDS],
    master_volume: u8,
    ring_buffer_length: u8,
    ring_buffer_pointer: u8,
    monitor_slot: u8,
    monitor: Monitor,
    dma: DmaRegisters,
    timers: Timers,
    midi: Midi,
    interrupts: InterruptControl,
    cdda: CddaBuffer,
    cycles_remaining: i32,
}

impl Scsp {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sound_ram: SoundRam::new(),
            slots: array::from_fn(|i| Slot::new(i as u8)),
            sound_stack: [0; 64],
            lfo: LfoTables::new(),
            dsp: Dsp::new(),
            common: [0; COMMON_WORDS],
            master_volume: 0,
            ring_buffer_length: 0,
            ring_buffer_pointer: 0,
            monitor_slot: 0,
            monitor: Monitor::default(),
            dma: DmaRegisters::default(),
            timers: Timers::new(),
            midi: Midi::new(),
            interrupts: InterruptControl::default(),
            cdda: CddaBuffer::new(),
            cycles_remaining: 0,
        }
    }

    /// Resets every register and slot. Sound RAM contents are kept.
    pub fn reset(&mut self) {
        let sound_ram = std::mem::take(&mut self.sound_ram);
        *self = Self { sound_ram: SoundRam { mem4mb: false, ..sound_ram }, ..Self::new() };
    }

    #[must_use]
    pub fn sound_ram(&self) -> &SoundRam {
        &self.sound_ram
    }

    pub fn sound_ram_mut(&mut self) -> &mut SoundRam {
        &mut self.sound_ram
    }

    /// Level most recently signaled to the 68000, if it changed since the last call.
    pub fn take_sound_cpu_interrupt(&mut self) -> Option<u8> {
        self.interrupts.sound_cpu_level.take()
    }

    /// Whether a main CPU sound request was raised since the last call.
    pub fn take_main_interrupt(&mut self) -> bool {
        std::mem::take(&mut self.interrupts.main_request)
    }

    /// Runs the chip for `cycles` SCSP clocks, appending one stereo sample per 512 clocks.
    pub fn exec(&mut self, cycles: u32, output: &mut Vec<(i16, i16)>) {
        self.cycles_remaining -= cycles as i32;
        while self.cycles_remaining < 0 {
            output.push(self.run_sample());
            self.cycles_remaining += CYCLES_PER_SAMPLE;
        }
    }

    fn run_sample(&mut self) -> (i16, i16) {
        let cd_input = self.cdda.next_sample();

        let timer_interrupts = self.timers.tick(1);
        self.raise(timer_interrupts);

        let sample = self.generate_sample(cd_input);
        self.update_monitor();

        sample
    }

    fn generate_sample(&mut self, (cd_l, cd_r): (i16, i16)) -> (i16, i16) {
        let mut sum_l = 0_i32;
        let mut sum_r = 0_i32;

        // 32 steps per sample; seven operations run on seven different slots at each step
        for step in 0..SLOT_COUNT {
            let slot_at = |delay: usize| (step + SLOT_COUNT - delay) & (SLOT_COUNT - 1);

            self.slots[step].op1(&self.lfo);
            self.slots[slot_at(1)].op2(&self.sound_stack);
            self.slots[slot_at(2)].op3(&self.sound_ram);
            self.slots[slot_at(3)].op4();
            self.slots[slot_at(4)].op5(&self.lfo);
            // Operation 6 (level calculation 2) is folded into operation 5

            let last = slot_at(6);
            self.slots[last].op7(&mut self.sound_stack);

            let slot = &self.slots[last];
            let output = i32::from(slot.state.output);

            let direct =
                i32::from((output >> send_level_shift(slot.regs.direct_send_level)) as i16);
            let (pan_l, pan_r) = pan_shifts(slot.regs.direct_pan);
            sum_l += direct >> pan_l;
            sum_r += direct >> pan_r;

            let mix_input =
                i32::from((output >> send_level_shift(slot.regs.input_mix_level)) as i16);
            self.dsp.mixs[usize::from(slot.regs.input_select & 0xF)] += mix_input * 16;
        }

        self.dsp.ring_buffer_pointer = self.ring_buffer_pointer.into();
        self.dsp.ring_buffer_length = self.ring_buffer_length.into();
        self.dsp.exts = [cd_l, cd_r];
        self.dsp.run(&mut self.sound_ram);

        // Effect returns: EFREG 0-15 use the send settings of slots 0-15, EXTS 0-1 use slots 16-17
        for (i, slot) in self.slots.iter().take(18).enumerate() {
            let input = match i {
                0..=15 => self.dsp.efreg[i],
                _ => self.dsp.exts[i - 16],
            };
            let effect_shift = send_level_shift(slot.regs.effect_send_level);
            let effect = i32::from((i32::from(input) >> effect_shift) as i16);
            let (pan_l, pan_r) = pan_shifts(slot.regs.effect_pan);
            sum_l += i32::from((effect >> pan_l) as i16);
            sum_r += i32::from((effect >> pan_r) as i16);
        }

        let volume_shift = 0xF - u32::from(self.master_volume);
        let clamp = |sample: i32| {
            (sample >> volume_shift).clamp(i16::MIN.into(), i16::MAX.into()) as i16
        };
        (clamp(sum_l), clamp(sum_r))
    }

    fn update_monitor(&mut self) {
        let state = &self.slots[usize::from(self.monitor_slot)].state;
        self.monitor = Monitor {
            call_address: (state.sample_offset >> 5) as u16,
            envelope_phase: state.envelope.to_sgc(),
            envelope_level: state.attenuation >> 5,
        };
    }

    // Each bit is signaled to the 68000 and then to the main CPU
    fn raise(&mut self, interrupts: u16) {
        for bit in 0..11 {
            if interrupts.bit(bit) {
                self.interrupts.sound_interrupt(1 << bit);
                self.interrupts.main_interrupt(1 << bit);
            }
        }
    }

    fn key_on_execute(&mut self) {
        for slot in &mut self.slots {
            if slot.regs.key_on {
                slot.key_on();
            } else {
                slot.key_off();
            }
        }
    }

    /// Pushes a byte into the MIDI input FIFO.
    pub fn midi_in_send(&mut self, value: u8) {
        let interrupts = self.midi.send_input(value);
        self.raise(interrupts);
    }

    /// Drains a byte from the MIDI output buffer.
    pub fn midi_out_read(&mut self) -> u8 {
        let (value, interrupts) = self.midi.read_output();
        self.raise(interrupts);
        value
    }

    /// Queues a CD-DA sector from the CD block.
    pub fn receive_cdda(&mut self, sector: &[u8; SECTOR_LEN]) -> CdReadTiming {
        self.cdda.receive_sector(sector)
    }

    pub fn clear_cdda(&mut self) {
        self.cdda.clear();
    }

    // Register file

    pub fn read_register_byte(&mut self, address: u32) -> u8 {
        let address = address & REGISTER_MASK;
        match address {
            0..=SLOT_REGISTERS_END => {
                self.slots[(address >> 5) as usize].read_byte(address & 0x1F)
            }
            COMMON_REGISTERS_START..=COMMON_REGISTERS_END => self.read_common_byte(address & 0x3F),
            _ => {
                let word = self.read_register_word(address & !1);
                if address.bit(0) { word.lsb() } else { word.msb() }
            }
        }
    }

    pub fn read_register_word(&mut self, address: u32) -> u16 {
        let address = address & REGISTER_MASK & !1;
        match address {
            0..=SLOT_REGISTERS_END => {
                self.slots[(address >> 5) as usize].read_word(address & 0x1F)
            }
            COMMON_REGISTERS_START..=COMMON_REGISTERS_END => self.read_common_word(address & 0x3E),
            SOUND_STACK_START..=SOUND_STACK_END => {
                self.sound_stack[(((address - SOUND_STACK_START) >> 1) & 0x3F) as usize] as u16
            }
            COEF_START..=COEF_END => self.dsp.coef[((address - COEF_START) >> 1) as usize] << 3,
            MADRS_START..=MADRS_END => self.dsp.madrs[((address - MADRS_START) >> 1) as usize],
            MPRO_START..=MPRO_END => self.dsp.read_mpro_word(address - MPRO_START),
            MIXS_START..=MIXS_END => {
                let mixs = self.dsp.mixs[((address - MIXS_START) >> 2) as usize];
                if !address.bit(1) { (mixs & 0xF) as u16 } else { ((mixs >> 4) & 0xFFFF) as u16 }
            }
            EFREG_START..=EFREG_END => {
                self.dsp.efreg[((address - EFREG_START) >> 1) as usize] as u16
            }
            EXTS_START..=EXTS_END => self.dsp.exts[((address - EXTS_START) >> 1) as usize] as u16,
            _ => {
                log::debug!("Unhandled SCSP register read {address:03X}");
                0
            }
        }
    }

    pub fn read_register_longword(&mut self, address: u32) -> u32 {
        let high = self.read_register_word(address & !3);
        let low = self.read_register_word((address & !3) | 2);
        (u32::from(high) << 16) | u32::from(low)
    }

    pub fn write_register_byte(&mut self, address: u32, value: u8) {
        let address = address & REGISTER_MASK;
        match address {
            0..=SLOT_REGISTERS_END => {
                let slot = &mut self.slots[(address >> 5) as usize];
                slot.write_byte(address & 0x1F, value);
                if address & 0x1F == 0 && value.bit(4) {
                    self.key_on_execute();
                }
            }
            COMMON_REGISTERS_START..=COMMON_REGISTERS_END => {
                self.write_common_byte(address & 0x3F, value);
            }
            COEF_START..=COEF_END => {
                let index = ((address - COEF_START) >> 1) as usize;
                let mut coef = self.dsp.coef[index] << 3;
                if address.bit(0) {
                    coef.set_lsb(value);
                } else {
                    coef.set_msb(value);
                }
                self.dsp.coef[index] = coef >> 3;
            }
            MADRS_START..=MADRS_END => {
                let madrs = &mut self.dsp.madrs[((address - MADRS_START) >> 1) as usize];
                if address.bit(0) {
                    madrs.set_lsb(value);
                } else {
                    madrs.set_msb(value);
                }
            }
            MPRO_START..=MPRO_END => self.dsp.write_mpro_byte(address - MPRO_START, value),
            _ => log::debug!("Unhandled SCSP register byte write {address:03X} {value:02X}"),
        }
    }

    pub fn write_register_word(&mut self, address: u32, value: u16) {
        let address = address & REGISTER_MASK & !1;
        match address {
            0..=SLOT_REGISTERS_END => {
                let slot = &mut self.slots[(address >> 5) as usize];
                if address & 0x1F == 0 {
                    // KB is latched before KYONEX applies it
                    slot.regs.key_on = value.bit(11);
                    if value.bit(12) {
                        self.key_on_execute();
                    }
                }
                self.slots[(address >> 5) as usize].write_word(address & 0x1F, value);
            }
            COMMON_REGISTERS_START..=COMMON_REGISTERS_END => {
                self.write_common_word(address & 0x3E, value);
            }
            COEF_START..=COEF_END => {
                self.dsp.coef[((address - COEF_START) >> 1) as usize] = value >> 3;
            }
            MADRS_START..=MADRS_END => {
                self.dsp.madrs[((address - MADRS_START) >> 1) as usize] = value;
            }
            MPRO_START..=MPRO_END => self.dsp.write_mpro_word(address - MPRO_START, value),
            EFREG_START..=EFREG_END => {
                self.dsp.efreg[((address - EFREG_START) >> 1) as usize] = value as i16;
            }
            _ => log::debug!("Unhandled SCSP register word write {address:03X} {value:04X}"),
        }
    }

    pub fn write_register_longword(&mut self, address: u32, value: u32) {
        self.write_register_word(address & !3, (value >> 16) as u16);
        self.write_register_word((address & !3) | 2, value as u16);
    }

    fn read_common_byte(&mut self, offset: u32) -> u8 {
        match offset {
            // Reading VER/MVOL clears the version bits
            0x01 => {
                self.common[0] &= 0xFF0F;
            }
            0x04 => return self.midi.flags(),
            0x05 => return self.midi_in_read(),
            0x07 => return self.midi_out_read(),
            0x08 => return (self.monitor.call_address >> 8) as u8,
            0x09 => {
                return ((self.monitor.call_address & 0xE0)
                    | (self.monitor.envelope_phase << 5)
                    | self.monitor.envelope_level) as u8;
            }
            0x1E => return self.interrupts.sound_enabled.msb(),
            0x1F => return self.interrupts.sound_enabled.lsb(),
            0x20 => return self.interrupts.sound_pending.msb(),
            0x21 => return self.interrupts.sound_pending.lsb(),
            0x2C => return self.interrupts.main_pending.msb(),
            0x2D => return self.interrupts.main_pending.lsb(),
            _ => {}
        }

        let word = self.common[(offset >> 1) as usize];
        if offset.bit(0) { word.lsb() } else { word.msb() }
    }

    fn read_common_word(&mut self, offset: u32) -> u16 {
        match offset {
            0x00 => {
                self.common[0] &= 0xFF0F;
            }
            0x04 => {
                let flags = self.midi.flags();
                return (u16::from(flags) << 8) | u16::from(self.midi_in_read());
            }
            0x06 => return self.midi_out_read().into(),
            0x08 => {
                return (self.monitor.call_address & 0x780)
                    | (self.monitor.envelope_phase << 5)
                    | self.monitor.envelope_level;
            }
            0x18 => return u16::from(self.timers.prescaler(0)) << 8,
            0x1A => return u16::from(self.timers.prescaler(1)) << 8,
            0x1C => return u16::from(self.timers.prescaler(2)) << 8,
            0x1E => return self.interrupts.sound_enabled,
            0x20 | 0x22 => return self.interrupts.sound_pending,
            0x2C => return self.interrupts.main_pending,
            _ => {}
        }

        self.common[(offset >> 1) as usize]
    }

    fn midi_in_read(&mut self) -> u8 {
        let (value, interrupts) = self.midi.read_input();
        self.raise(interrupts);
        value
    }

    fn write_common_byte(&mut self, offset: u32, value: u8) {
        let word = &mut self.common[(offset >> 1) as usize];
        if offset.bit(0) {
            word.set_lsb(value);
        } else {
            word.set_msb(value);
        }

        log::trace!("SCSP common register byte write {offset:02X} {value:02X}");

        let value16 = u16::from(value);
        match offset {
            0x00 => self.sound_ram.mem4mb = value.bit(1),
            0x01 => self.master_volume = value & 0xF,
            0x02 => self.ring_buffer_length = (self.ring_buffer_length & 1) | ((value & 1) << 1),
            0x03 => {
                self.ring_buffer_length = (self.ring_buffer_length & 2) | (value >> 7);
                self.ring_buffer_pointer = value & 0x7F;
            }
            0x07 => self.midi.send_output(value),
            0x08 => {
                self.monitor_slot = (value >> 3) & 0x1F;
                self.update_monitor();
            }
            0x12 => {
                self.dma.memory_address =
                    (self.dma.memory_address & 0x700FE) | (u32::from(value) << 8);
            }
            0x13 => {
                self.dma.memory_address =
                    (self.dma.memory_address & 0x7FF00) | u32::from(value & 0xFE);
            }
            0x14 => {
                self.dma.memory_address =
                    (self.dma.memory_address & 0xFFFE) | (u32::from(value & 0x70) << 12);
                self.dma.register_address =
                    (self.dma.register_address & 0xFE) | (u32::from(value & 0xF) << 8);
            }
            0x15 => {
                self.dma.register_address =
                    (self.dma.register_address & 0xF00) | u32::from(value & 0xFE);
            }
            0x16 => {
                self.dma.length = (self.dma.length & 0xFE) | (u32::from(value & 0xF) << 8);
                self.dma.flags = value & 0xF0;
                if self.dma.flags & DMA_EXECUTE != 0 {
                    self.execute_dma();
                }
            }
            0x17 => self.dma.length = (self.dma.length & 0xF00) | u32::from(value & 0xFE),
            0x18 => self.timers.set_prescaler(0, value),
            0x19 => self.timers.set_counter(0, value),
            0x1A => self.timers.set_prescaler(1, value),
            0x1B => self.timers.set_counter(1, value),
            0x1C => self.timers.set_prescaler(2, value),
            0x1D => self.timers.set_counter(2, value),
            0x1E => {
                self.interrupts.sound_enabled.set_msb(value & 0x07);
                self.interrupts.check_sound();
            }
            0x1F => {
                self.interrupts.sound_enabled.set_lsb(value);
                self.interrupts.check_sound();
            }
            0x21 => {
                if value16 & SOFTWARE_INTERRUPT != 0 {
                    self.interrupts.sound_interrupt(SOFTWARE_INTERRUPT);
                }
            }
            0x22 => {
                self.interrupts.sound_pending &= !(value16 << 8);
                self.interrupts.check_sound();
            }
            0x23 => {
                self.interrupts.sound_pending &= !value16;
                self.interrupts.check_sound();
            }
            0x25 | 0x27 | 0x29 => {
                self.interrupts.sound_levels[((offset - 0x25) >> 1) as usize] = value;
                self.interrupts.check_sound();
            }
            0x2A => self.interrupts.main_enabled.set_msb(value & 0x07),
            0x2B => self.interrupts.main_enabled.set_lsb(value),
            0x2D => {
                if value16 & SOFTWARE_INTERRUPT != 0 {
                    self.interrupts.main_interrupt(SOFTWARE_INTERRUPT);
                }
            }
            0x2E => self.interrupts.main_pending &= !(value16 << 8),
            0x2F => self.interrupts.main_pending &= !value16,
            _ => {}
        }
    }

    fn write_common_word(&mut self, offset: u32, value: u16) {
        self.common[(offset >> 1) as usize] = value;

        log::trace!("SCSP common register word write {offset:02X} {value:04X}");

        match offset {
            0x00 => {
                self.sound_ram.mem4mb = value.bit(9);
                self.master_volume = (value & 0xF) as u8;
            }
            0x02 => {
                self.ring_buffer_length = ((value >> 7) & 3) as u8;
                self.ring_buffer_pointer = (value & 0x7F) as u8;
            }
            0x06 => self.midi.send_output(value.lsb()),
            0x08 => {
                self.monitor_slot = ((value >> 11) & 0x1F) as u8;
                self.update_monitor();
            }
            0x12 => {
                self.dma.memory_address =
                    (self.dma.memory_address & 0x70000) | u32::from(value & 0xFFFE);
            }
            0x14 => {
                self.dma.memory_address =
                    (self.dma.memory_address & 0xFFFE) | (u32::from(value & 0x7000) << 4);
                self.dma.register_address = u32::from(value & 0xFFE);
            }
            0x16 => {
                self.dma.length = u32::from(value & 0xFFE);
                self.dma.flags = value.msb() & 0xF0;
                if self.dma.flags & DMA_EXECUTE != 0 {
                    self.execute_dma();
                }
            }
            0x18 | 0x1A | 0x1C => {
                let timer = ((offset - 0x18) >> 1) as usize;
                self.timers.set_prescaler(timer, value.msb());
                self.timers.set_counter(timer, value.lsb());
            }
            0x1E => {
                self.interrupts.sound_enabled = value & 0x7FF;
                self.interrupts.check_sound();
            }
            0x20 => {
                if value & SOFTWARE_INTERRUPT != 0 {
                    self.interrupts.sound_interrupt(SOFTWARE_INTERRUPT);
                }
            }
            0x22 => {
                self.interrupts.sound_pending &= !value;
                self.interrupts.check_sound();
            }
            0x24 | 0x26 | 0x28 => {
                self.interrupts.sound_levels[((offset - 0x24) >> 1) as usize] = value.lsb();
            }
            0x2A => self.interrupts.write_main_enabled(value & 0x7FF),
            0x2C => {
                if value & SOFTWARE_INTERRUPT != 0 {
                    self.interrupts.main_interrupt(SOFTWARE_INTERRUPT);
                }
            }
            0x2E => self.interrupts.main_pending &= !value,
            _ => {}
        }
    }

    // Transfers run to completion as soon as DEXE is written
    fn execute_dma(&mut self) {
        let DmaRegisters { memory_address, register_address, length, flags } = self.dma;

        log::trace!(
            "SCSP DMA: memory {memory_address:05X}, register {register_address:03X}, \
             length {length:03X}, flags {flags:02X}"
        );

        for i in 0..length >> 1 {
            let memory_address = memory_address.wrapping_add(2 * i);
            let register_address = (register_address + 2 * i) & REGISTER_MASK;

            // DMA control registers cannot be a transfer target
            if (0x412..=0x417).contains(&register_address) {
                log::debug!("SCSP DMA touching its own registers at {register_address:03X}");
                continue;
            }

            if flags & DMA_DIRECTION != 0 {
                let value = if flags & DMA_GATE != 0 {
                    0
                } else {
                    self.read_register_word(register_address)
                };
                self.sound_ram.write_word(memory_address, value);
            } else {
                let value = if flags & DMA_GATE != 0 {
                    0
                } else {
                    self.sound_ram.read_word(memory_address)
                };
                self.write_register_word(register_address, value);
            }
        }

        self.dma.flags &= !DMA_EXECUTE;
        self.common[0x16 >> 1] &= 0xE0FF;

        self.interrupts.sound_interrupt(DMA_INTERRUPT);
        self.interrupts.main_interrupt(DMA_INTERRUPT);
    }
}

impl Default for Scsp {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scsp::slot::EnvelopePhase;
    use test_log::test;

    #[test]
    fn sound_ram_mirrors_without_mem4mb() {
        let mut scsp = Scsp::new();
        scsp.sound_ram_mut().write_word(0x20010, 0x1234);
        assert_eq!(scsp.sound_ram().read_word(0x00010), 0x1234);
        assert_eq!(scsp.sound_ram().read_byte(0x40011), 0x34);

        scsp.write_register_word(0x400, 1 << 9);
        assert_eq!(scsp.sound_ram().read_word(0x20010), 0x0000);
        assert_eq!(scsp.sound_ram().read_word(0x80000), 0xFFFF);
        assert_eq!(scsp.sound_ram().read_longword(0x80000), 0xFFFFFFFF);

        scsp.sound_ram_mut().write_longword(0x7FFFC, 0xDEADBEEF);
        assert_eq!(scsp.sound_ram().read_word(0x7FFFE), 0xBEEF);
    }

    #[test]
    fn software_interrupts_use_configured_levels() {
        let mut scsp = Scsp::new();

        // Bit 5 routed to level 0b101
        scsp.write_register_byte(0x425, 0x20);
        scsp.write_register_byte(0x429, 0x20);
        scsp.write_register_word(0x41E, 0x0020);
        assert_eq!(scsp.take_sound_cpu_interrupt(), None);

        scsp.write_register_word(0x420, 0x0020);
        assert_eq!(scsp.take_sound_cpu_interrupt(), Some(5));
        assert_eq!(scsp.read_register_word(0x420) & 0x20, 0x20);

        scsp.write_register_word(0x422, 0x0020);
        assert_eq!(scsp.read_register_word(0x420) & 0x20, 0);

        // Main CPU requests only fire when enabled
        scsp.write_register_word(0x42C, 0x0020);
        assert!(!scsp.take_main_interrupt());
        scsp.write_register_word(0x42A, 0x0020);
        assert!(scsp.take_main_interrupt());
        assert!(!scsp.take_main_interrupt());
    }

    #[test]
    fn sources_above_bit_seven_share_its_level() {
        let mut scsp = Scsp::new();
        scsp.write_register_byte(0x427, 0x80);
        scsp.write_register_word(0x41E, 0x0400);

        let mut samples = Vec::new();
        scsp.exec(CYCLES_PER_SAMPLE as u32, &mut samples);
        assert_eq!(samples.len(), 1);
        assert_eq!(scsp.take_sound_cpu_interrupt(), Some(2));
    }

    #[test]
    fn dma_copies_sound_ram_into_registers() {
        let mut scsp = Scsp::new();
        for i in 0..4 {
            scsp.sound_ram_mut().write_word(0x1000 + 2 * i, 0x0100 * (i as u16 + 1));
        }

        scsp.write_register_word(0x412, 0x1000);
        scsp.write_register_word(0x414, 0x0780);
        scsp.write_register_word(0x416, 0x1008);

        assert_eq!(scsp.dsp.madrs[..4], [0x0100, 0x0200, 0x0300, 0x0400]);
        assert_eq!(scsp.read_register_word(0x416) & 0x1000, 0);
        assert_eq!(scsp.read_register_word(0x420) & DMA_INTERRUPT, DMA_INTERRUPT);
    }

    #[test]
    fn dma_gate_clears_sound_ram() {
        let mut scsp = Scsp::new();
        scsp.sound_ram_mut().write_longword(0x2000, 0x12345678);

        scsp.write_register_word(0x412, 0x2000);
        scsp.write_register_word(0x414, 0x0000);
        scsp.write_register_word(0x416, 0x7004);

        assert_eq!(scsp.sound_ram().read_longword(0x2000), 0);
    }

    #[test]
    fn kyonex_applies_key_bits_to_every_slot() {
        let mut scsp = Scsp::new();
        scsp.write_register_word(3 * 0x20, 0x0800);
        assert_eq!(scsp.slots[3].state.envelope, EnvelopePhase::Release);

        scsp.write_register_word(0, 0x1000);
        assert_eq!(scsp.slots[3].state.envelope, EnvelopePhase::Attack);
        assert_eq!(scsp.slots[0].state.envelope, EnvelopePhase::Release);

        scsp.write_register_byte(3 * 0x20, 0x00);
        scsp.write_register_byte(0x20, 0x10);
        assert_eq!(scsp.slots[3].state.envelope, EnvelopePhase::Release);
    }

    #[test]
    fn exec_carries_partial_samples() {
        let mut scsp = Scsp::new();
        let mut samples = Vec::new();

        scsp.exec(300, &mut samples);
        assert_eq!(samples.len(), 1);
        scsp.exec(200, &mut samples);
        assert_eq!(samples.len(), 1);
        scsp.exec(CYCLES_PER_SAMPLE as u32 * 3, &mut samples);
        assert_eq!(samples.len(), 4);
        assert!(samples.iter().all(|&sample| sample == (0, 0)));
    }

    #[test]
    fn dsp_coefficients_keep_thirteen_bits() {
        let mut scsp = Scsp::new();
        scsp.write_register_word(0x702, 0xFFFF);
        assert_eq!(scsp.read_register_word(0x702), 0xFFF8);

        scsp.write_register_byte(0x703, 0x00);
        assert_eq!(scsp.read_register_word(0x702), 0xFF00);
    }
}
