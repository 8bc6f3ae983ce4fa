//! SH-2 DMA controller (DMAC)
//!
//! Transfers are not performed all at once. Each channel accumulates a cycle budget in
//! `copy_clock` and moves one unit per access penalty until the budget runs out or the transfer
//! count reaches zero, so a long transfer is spread across several execution slices.

use crate::Sh2;
use crate::bus::BusInterface;
use bincode::{Decode, Encode};
use saturn_common::num::GetBit;

// Budget used when a CHCR write needs any in-flight transfer on the channel to finish first
const FLUSH_CYCLES: i32 = i32::MAX;

// Budget used when a transfer is started by a register write
const START_CYCLES: i32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum DmaAddressMode {
    #[default]
    Fixed = 0,
    AutoIncrement = 1,
    AutoDecrement = 2,
    Invalid = 3,
}

impl DmaAddressMode {
    fn from_value(value: u32) -> Self {
        match value & 3 {
            0 => Self::Fixed,
            1 => Self::AutoIncrement,
            2 => Self::AutoDecrement,
            3 => Self::Invalid,
            _ => unreachable!("value & 3 is always <= 3"),
        }
    }

    fn step(self) -> i32 {
        match self {
            Self::AutoIncrement => 1,
            Self::AutoDecrement => -1,
            Self::Fixed | Self::Invalid => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum DmaTransferUnit {
    #[default]
    Byte = 0,
    Word = 1,
    Longword = 2,
    SixteenByte = 3,
}

impl DmaTransferUnit {
    fn from_value(value: u32) -> Self {
        match value & 3 {
            0 => Self::Byte,
            1 => Self::Word,
            2 => Self::Longword,
            3 => Self::SixteenByte,
            _ => unreachable!("value & 3 is always <= 3"),
        }
    }

    fn bytes(self) -> i32 {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
            Self::Longword | Self::SixteenByte => 4,
        }
    }
}

/// Per-unit access penalty in CPU cycles for a transfer between two regions.
#[must_use]
pub fn access_penalty(source: u32, destination: u32) -> i32 {
    const HIGH_WRAM: u32 = 0x06000000;
    const LOW_WRAM: u32 = 0x00200000;
    const SOUND_RAM: u32 = 0x05A00000;
    const SOUND_REGS: u32 = 0x05B00000;
    const VDP1_RAM: u32 = 0x05C00000;
    const VDP1_REGS: u32 = 0x05D00000;
    const VDP2_RAM: u32 = 0x05E00000;
    const VDP2_REGS: u32 = 0x05F00000;
    const CS2: u32 = 0x05800000;

    let destination = destination & 0x0FF00000;
    match source & 0x0FF00000 {
        CS2 => 1,
        VDP2_RAM => match destination {
            HIGH_WRAM => 44,
            LOW_WRAM => 50,
            SOUND_RAM | SOUND_REGS | VDP1_RAM | VDP1_REGS => 427,
            VDP2_RAM => 1,
            VDP2_REGS => 50,
            _ => 44,
        },
        VDP1_RAM => match destination {
            HIGH_WRAM | LOW_WRAM | SOUND_RAM | SOUND_REGS => 50,
            VDP1_RAM | VDP1_REGS => 570,
            VDP2_RAM => 225,
            VDP2_REGS => 50,
            _ => 44,
        },
        _ => match destination {
            SOUND_RAM | SOUND_REGS => 20,
            VDP1_REGS => 30,
            VDP2_RAM => 82,
            _ => 14,
        },
    }
}

/// Destination range written by a transfer step, reported so execution cores can drop stale code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrittenRange {
    pub start: u32,
    pub len: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferOutcome {
    pub written: Option<WrittenRange>,
    pub completed: bool,
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct DmaChannel {
    // SARn (Source address register)
    pub sar: u32,
    // DARn (Destination address register)
    pub dar: u32,
    // TCRn (Transfer count register), 24 bits
    pub tcr: u32,
    // CHCRn (Channel control register)
    pub chcr: u32,
    // VCRDMAn (Vector number register)
    pub vcrdma: u32,
    // DRCRn (Request/response selection control register)
    pub drcr: u8,
    // TE can only be cleared by writing 0 after it has been read as 1
    te_unread: bool,
    copy_clock: i32,
}

impl DmaChannel {
    pub fn copy_clock(&self) -> i32 {
        self.copy_clock
    }

    pub fn set_copy_clock(&mut self, copy_clock: i32) {
        self.copy_clock = copy_clock;
    }

    /// DE set and TE clear.
    pub fn requesting(&self) -> bool {
        self.chcr & 0x3 == 0x1
    }

    fn dual_address_mode(&self) -> bool {
        !self.chcr.bit(3)
    }

    fn interrupt_enabled(&self) -> bool {
        self.chcr.bit(2)
    }

    pub fn read_chcr(&mut self) -> u32 {
        self.te_unread = false;
        self.chcr
    }

    pub fn write_chcr(&mut self, value: u32) {
        let te_held = self.chcr & (value | u32::from(self.te_unread) << 1) & 0x2;
        self.chcr = (value & !0x2) | te_held;

        log::trace!("CHCR write: {value:08X}");
        log::trace!("  Destination mode: {:?}", DmaAddressMode::from_value(value >> 14));
        log::trace!("  Source mode: {:?}", DmaAddressMode::from_value(value >> 12));
        log::trace!("  Transfer unit: {:?}", DmaTransferUnit::from_value(value >> 10));
        log::trace!("  Interrupt enabled: {}", value.bit(2));
        log::trace!("  DMA enabled: {}", value.bit(0));
    }

    /// Spend `cycles` worth of budget on this channel's transfer.
    pub fn transfer_cycles(&mut self, cycles: i32, bus: &mut dyn BusInterface) -> TransferOutcome {
        // TCR of zero never starts a transfer and leaves TE alone
        if self.chcr.bit(1) || self.tcr == 0 {
            return TransferOutcome::default();
        }

        let unit = DmaTransferUnit::from_value(self.chcr >> 10);
        let penalty = access_penalty(self.sar, self.dar);
        let step_penalty =
            if unit == DmaTransferUnit::SixteenByte { penalty >> 2 } else { penalty };

        self.copy_clock = self.copy_clock.saturating_add(cycles);
        if self.copy_clock < penalty {
            return TransferOutcome::default();
        }

        let source_step = DmaAddressMode::from_value(self.chcr >> 12).step() * unit.bytes();
        let destination_step = DmaAddressMode::from_value(self.chcr >> 14).step() * unit.bytes();

        let mut count: u32 = 0;
        let mut completed = false;
        while self.copy_clock >= 0 {
            self.copy_clock -= step_penalty;

            match unit {
                DmaTransferUnit::Byte => {
                    let value = dma_read_byte(bus, self.sar);
                    dma_write_byte(bus, self.dar, value);
                }
                DmaTransferUnit::Word => {
                    let value = dma_read_word(bus, self.sar);
                    dma_write_word(bus, self.dar, value);
                }
                DmaTransferUnit::Longword | DmaTransferUnit::SixteenByte => {
                    let value = dma_read_longword(bus, self.sar);
                    dma_write_longword(bus, self.dar, value);
                }
            }

            self.sar = self.sar.wrapping_add(source_step as u32);
            self.dar = self.dar.wrapping_add(destination_step as u32);
            self.tcr = self.tcr.wrapping_sub(1) & 0xFFFFFF;
            count += 1;

            if self.tcr == 0 {
                log::trace!("DMA finished after {count} units");
                self.chcr |= 0x2;
                self.te_unread = true;
                completed = true;
                break;
            }
        }

        let len = count.wrapping_mul(destination_step.unsigned_abs());
        let start = if destination_step < 0 {
            self.dar
        } else {
            self.dar.wrapping_sub(count.wrapping_mul(destination_step as u32))
        };
        let written = (len != 0).then_some(WrittenRange { start, len });

        TransferOutcome { written, completed }
    }
}

fn unhandled_dma_address(address: u32) {
    log::warn!("DMA access to unmapped address {address:08X}");
}

// DMA transfers go through the uncached address space and are not charged to either CPU
fn dma_read_byte(bus: &mut dyn BusInterface, address: u32) -> u8 {
    match address >> 29 {
        0 | 1 => bus.read_byte(address, None),
        _ => {
            unhandled_dma_address(address);
            0
        }
    }
}

fn dma_read_word(bus: &mut dyn BusInterface, address: u32) -> u16 {
    match address >> 29 {
        0 | 1 => bus.read_word(address, None),
        _ => {
            unhandled_dma_address(address);
            0
        }
    }
}

fn dma_read_longword(bus: &mut dyn BusInterface, address: u32) -> u32 {
    match address >> 29 {
        0 | 1 => bus.read_longword(address, None),
        _ => {
            unhandled_dma_address(address);
            0
        }
    }
}

fn dma_write_byte(bus: &mut dyn BusInterface, address: u32, value: u8) {
    match address >> 29 {
        0 | 1 => bus.write_byte(address, value, None),
        _ => unhandled_dma_address(address),
    }
}

fn dma_write_word(bus: &mut dyn BusInterface, address: u32, value: u16) {
    match address >> 29 {
        0 | 1 => bus.write_word(address, value, None),
        _ => unhandled_dma_address(address),
    }
}

fn dma_write_longword(bus: &mut dyn BusInterface, address: u32, value: u32) {
    match address >> 29 {
        0 | 1 => bus.write_longword(address, value, None),
        _ => unhandled_dma_address(address),
    }
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct DmaController {
    pub channels: [DmaChannel; 2],
    // $FFFFFFB0: DMAOR (DMA operation register)
    pub dmaor: u32,
}

impl DmaController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.chcr = 0;
            channel.te_unread = false;
        }
        self.dmaor = 0;
    }

    fn halted(&self) -> bool {
        // NMIF or AE
        self.dmaor & 0x6 != 0
    }

    fn round_robin(&self) -> bool {
        self.dmaor.bit(3)
    }

    fn enabled_without_errors(&self) -> bool {
        self.dmaor & 0x7 == 0x1
    }

    pub fn read_longword(&mut self, address: u32) -> Option<u32> {
        let value = match address {
            0x180 => self.channels[0].sar,
            0x184 => self.channels[0].dar,
            0x188 => self.channels[0].tcr,
            0x18C => self.channels[0].read_chcr(),
            0x190 => self.channels[1].sar,
            0x194 => self.channels[1].dar,
            0x198 => self.channels[1].tcr,
            0x19C => self.channels[1].read_chcr(),
            0x1A0 => self.channels[0].vcrdma,
            0x1A8 => self.channels[1].vcrdma,
            0x1B0 => self.dmaor,
            _ => return None,
        };
        Some(value)
    }

    pub fn read_byte(&self, address: u32) -> Option<u8> {
        match address {
            0x71 => Some(self.channels[0].drcr),
            0x72 => Some(self.channels[1].drcr),
            _ => None,
        }
    }

    pub fn write_byte(&mut self, address: u32, value: u8) -> bool {
        match address {
            0x71 => self.channels[0].drcr = value & 0x3,
            0x72 => self.channels[1].drcr = value & 0x3,
            _ => return false,
        }
        true
    }
}

fn scaled_budget(cycles: i32, channel: &DmaChannel) -> i32 {
    // Dual address transfers occupy the bus for both the read and the write
    if channel.dual_address_mode() { cycles.saturating_add(cycles / 2) } else { cycles }
}

impl Sh2 {
    /// Arbitrate between the two channels and spend this slice's DMA budget.
    pub(crate) fn dma_proc(&mut self, cycles: i32, bus: &mut dyn BusInterface) {
        if self.dmac.halted() {
            return;
        }

        let channels = &self.dmac.channels;
        match (channels[0].requesting(), channels[1].requesting()) {
            (true, true) => {
                let budget = scaled_budget(cycles, &channels[0]);
                if self.dmac.round_robin() {
                    self.dma_transfer(0, budget, bus);
                    self.dma_transfer(1, budget, bus);
                } else {
                    self.dma_transfer(0, budget, bus);
                }
            }
            (true, false) => {
                let budget = scaled_budget(cycles, &channels[0]);
                self.dma_transfer(0, budget, bus);
            }
            (false, true) => {
                let budget = scaled_budget(cycles, &channels[1]);
                self.dma_transfer(1, budget, bus);
            }
            (false, false) => {}
        }
    }

    fn dma_transfer(&mut self, channel: usize, cycles: i32, bus: &mut dyn BusInterface) {
        let outcome = self.dmac.channels[channel].transfer_cycles(cycles, bus);

        if outcome.completed && self.dmac.channels[channel].interrupt_enabled() {
            let vector = self.dmac.channels[channel].vcrdma as u8;
            self.interrupts.send(vector, self.intc.dmac_level());
        }

        if let Some(range) = outcome.written {
            self.write_notify(range.start, range.len);
        }
    }

    /// Returns false if the address is not a DMA controller longword register.
    pub(crate) fn write_dma_register(
        &mut self,
        address: u32,
        value: u32,
        bus: &mut dyn BusInterface,
    ) -> bool {
        match address {
            0x180 => self.dmac.channels[0].sar = value,
            0x184 => self.dmac.channels[0].dar = value,
            0x188 => self.dmac.channels[0].tcr = value & 0xFFFFFF,
            0x18C => self.write_chcr(0, value, bus),
            0x190 => self.dmac.channels[1].sar = value,
            0x194 => self.dmac.channels[1].dar = value,
            0x198 => self.dmac.channels[1].tcr = value & 0xFFFFFF,
            0x19C => self.write_chcr(1, value, bus),
            0x1A0 => self.dmac.channels[0].vcrdma = value & 0xFFFF,
            0x1A8 => self.dmac.channels[1].vcrdma = value & 0xFFFF,
            0x1B0 => {
                self.dmac.dmaor = value & 0xF;
                log::trace!("[{}] DMAOR write: {value:08X}", self.name());

                if value & 0x7 == 0x1 {
                    self.dma_proc(START_CYCLES, bus);
                }
            }
            _ => return false,
        }

        true
    }

    fn write_chcr(&mut self, channel: usize, value: u32, bus: &mut dyn BusInterface) {
        // Let any transfer still in flight on this channel run to completion under the old settings
        if self.dmac.channels[channel].tcr != 0 {
            self.dma_proc(FLUSH_CYCLES, bus);
        }

        self.dmac.channels[channel].write_chcr(value);

        if self.dmac.enabled_without_errors() && self.dmac.channels[channel].requesting() {
            self.dmac.channels[channel].copy_clock = 0;
            self.dma_proc(START_CYCLES, bus);
        }
    }
}
