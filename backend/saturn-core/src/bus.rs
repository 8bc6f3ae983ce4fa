//! Saturn main bus as seen by the SH-2s and their DMA controllers
//!
//! [`SaturnBus`] owns every device on the bus and dispatches accesses through the page table.
//! [`Sh2Bus`] wraps it for one CPU's execution slice: it adds memory breakpoint checks for that CPU
//! and delivers input capture writes to the other CPU, catching it up when it lags behind.

pub mod breakpoints;
pub mod pages;

use crate::bus::breakpoints::BreakpointHooks;
use crate::bus::pages::{Handler, PageMap, Region};
use crate::devices::{BasicScu, MappedDevice, OpenBus, ScuDevice};
use crate::memory::{BackupRam, Bios, WorkRam};
use crate::smpc::Smpc;
use crate::sound::SoundSystem;
use crate::vdp1::Vdp1;
use crate::video::{AccessSize, VideoInterface};
use saturn_config::SaturnConfig;
use sh2_emu::bus::BusInterface;
use sh2_emu::debug::MemoryAccessFlags;
use sh2_emu::{Sh2, WhichCpu};

// Access costs charged to the accessing CPU, indexed by byte/word/longword
const LOW_WRAM_READ_CYCLES: [u32; 3] = [4, 4, 12];
const LOW_WRAM_WRITE_CYCLES: [u32; 3] = [2, 2, 9];
const HIGH_WRAM_READ_CYCLES: u32 = 4;
const HIGH_WRAM_WRITE_CYCLES: u32 = 1;
const SOUND_RAM_READ_CYCLES: u32 = 10;
const SOUND_RAM_WRITE_CYCLES: u32 = 2;

// Word and longword sound RAM reads wait on the 68000 when it is running
const M68K_SYNC_CYCLES: u32 = 50;

/// Maximum nesting of inline catch-up execution triggered by input capture writes.
pub const MAX_CATCH_UP_DEPTH: u8 = 4;

fn charge(cycles: Option<&mut u32>, amount: u32) {
    if let Some(cycles) = cycles {
        *cycles = cycles.wrapping_add(amount);
    }
}

#[must_use]
pub fn cpu_index(which: WhichCpu) -> usize {
    match which {
        WhichCpu::Master => 0,
        WhichCpu::Slave => 1,
    }
}

macro_rules! word_to_byte {
    ($address:expr, $word:expr) => {{
        let word: u16 = $word;
        if $address & 1 == 0 { (word >> 8) as u8 } else { word as u8 }
    }};
}

pub struct SaturnBus {
    pub bios: Bios,
    pub low_wram: WorkRam,
    pub high_wram: WorkRam,
    pub backup_ram: BackupRam,
    pub smpc: Smpc,
    pub sound: SoundSystem,
    pub vdp1: Vdp1,
    pub video: Box<dyn VideoInterface>,
    pub vdp2: Box<dyn MappedDevice>,
    pub scu: Box<dyn ScuDevice>,
    pub cs0: Box<dyn MappedDevice>,
    pub cs1: Box<dyn MappedDevice>,
    pub cs2: Box<dyn MappedDevice>,
    pub stv_io: Box<dyn MappedDevice>,
    pub pages: PageMap,
    pub hooks: BreakpointHooks,
    /// Input capture writes that could not be delivered immediately, indexed by [`cpu_index`].
    pub pending_input_capture: [bool; 2],
}

impl SaturnBus {
    #[must_use]
    pub fn new(
        bios: Bios,
        backup_ram: BackupRam,
        config: &SaturnConfig,
        video: Box<dyn VideoInterface>,
        sound: SoundSystem,
    ) -> Self {
        Self {
            bios,
            low_wram: WorkRam::new(),
            high_wram: WorkRam::new(),
            backup_ram,
            smpc: Smpc::new(config),
            sound,
            vdp1: Vdp1::new(config.region.timing_mode()),
            video,
            vdp2: Box::new(OpenBus::new("VDP2")),
            scu: Box::new(BasicScu::new()),
            cs0: Box::new(OpenBus::new("CS0")),
            cs1: Box::new(OpenBus::new("CS1")),
            cs2: Box::new(OpenBus::new("CS2")),
            stv_io: Box::new(OpenBus::new("ST-V I/O")),
            pages: PageMap::new(),
            hooks: BreakpointHooks::new(),
            pending_input_capture: [false; 2],
        }
    }

    /// Take the queued input capture for `which`, if any.
    pub fn take_pending_input_capture(&mut self, which: WhichCpu) -> bool {
        std::mem::take(&mut self.pending_input_capture[cpu_index(which)])
    }

    pub fn read_byte(&mut self, address: u32, cycles: Option<&mut u32>) -> u8 {
        match self.pages.region(address) {
            Region::Bios => self.bios.read_byte(address),
            Region::Smpc => self.smpc.read(address),
            Region::BackupRam => self.backup_ram.read_byte(address),
            Region::LowWram => {
                charge(cycles, LOW_WRAM_READ_CYCLES[0]);
                self.low_wram.read_byte(address)
            }
            Region::StvIo => self.stv_io.read_byte(address),
            Region::Cs0 => self.cs0.read_byte(address),
            Region::Cs1 => self.cs1.read_byte(address),
            Region::Cs2 => self.cs2.read_byte(address),
            Region::SoundRam => {
                charge(cycles, SOUND_RAM_READ_CYCLES);
                self.sound.read_ram_byte(address)
            }
            Region::ScspRegisters => self.sound.scsp_mut().read_register_byte(address),
            Region::Vdp1Ram => self.vdp1.read_ram_byte(address),
            Region::Vdp1Framebuffer => {
                self.vdp1.read_framebuffer(AccessSize::Byte, address, self.video.as_mut()) as u8
            }
            Region::Vdp1Registers => {
                word_to_byte!(
                    address,
                    self.vdp1.read_register_word(address & !1, self.video.as_mut())
                )
            }
            Region::Vdp2Ram | Region::Vdp2ColorRam | Region::Vdp2Registers => {
                self.vdp2.read_byte(address)
            }
            Region::Scu => self.scu.read_byte(address),
            Region::HighWram => {
                charge(cycles, HIGH_WRAM_READ_CYCLES);
                self.high_wram.read_byte(address)
            }
            Region::Unhandled | Region::SlaveInputCapture | Region::MasterInputCapture => {
                log::debug!("Unhandled byte read {address:08X}");
                0
            }
        }
    }

    pub fn read_word(&mut self, address: u32, cycles: Option<&mut u32>) -> u16 {
        match self.pages.region(address) {
            Region::Bios => self.bios.read_word(address),
            Region::Smpc => {
                log::debug!("SMPC word read {address:08X}");
                0
            }
            Region::BackupRam => self.backup_ram.read_word(address),
            Region::LowWram => {
                charge(cycles, LOW_WRAM_READ_CYCLES[1]);
                self.low_wram.read_word(address)
            }
            Region::StvIo => self.stv_io.read_word(address),
            Region::Cs0 => self.cs0.read_word(address),
            Region::Cs1 => self.cs1.read_word(address),
            Region::Cs2 => self.cs2.read_word(address),
            Region::SoundRam => {
                let sync = if self.sound.m68k_running() { M68K_SYNC_CYCLES } else { 0 };
                charge(cycles, SOUND_RAM_READ_CYCLES + sync);
                self.sound.read_ram_word(address)
            }
            Region::ScspRegisters => self.sound.scsp_mut().read_register_word(address),
            Region::Vdp1Ram => self.vdp1.read_ram_word(address),
            Region::Vdp1Framebuffer => {
                self.vdp1.read_framebuffer(AccessSize::Word, address, self.video.as_mut()) as u16
            }
            Region::Vdp1Registers => self.vdp1.read_register_word(address, self.video.as_mut()),
            Region::Vdp2Ram | Region::Vdp2ColorRam | Region::Vdp2Registers => {
                self.vdp2.read_word(address)
            }
            Region::Scu => self.scu.read_word(address),
            Region::HighWram => {
                charge(cycles, HIGH_WRAM_READ_CYCLES);
                self.high_wram.read_word(address)
            }
            Region::Unhandled | Region::SlaveInputCapture | Region::MasterInputCapture => {
                log::debug!("Unhandled word read {address:08X}");
                0
            }
        }
    }

    pub fn read_longword(&mut self, address: u32, cycles: Option<&mut u32>) -> u32 {
        match self.pages.region(address) {
            Region::Bios => self.bios.read_longword(address),
            Region::Smpc => {
                log::debug!("SMPC longword read {address:08X}");
                0
            }
            Region::BackupRam => self.backup_ram.read_longword(address),
            Region::LowWram => {
                charge(cycles, LOW_WRAM_READ_CYCLES[2]);
                self.low_wram.read_longword(address)
            }
            Region::Cs0 => self.cs0.read_longword(address),
            Region::Cs1 => self.cs1.read_longword(address),
            Region::Cs2 => self.cs2.read_longword(address),
            Region::SoundRam => {
                let sync = if self.sound.m68k_running() { M68K_SYNC_CYCLES } else { 0 };
                charge(cycles, SOUND_RAM_READ_CYCLES + sync);
                self.sound.read_ram_longword(address)
            }
            Region::ScspRegisters => self.sound.scsp_mut().read_register_longword(address),
            Region::Vdp1Ram => self.vdp1.read_ram_longword(address),
            Region::Vdp1Framebuffer => {
                self.vdp1.read_framebuffer(AccessSize::Longword, address, self.video.as_mut())
            }
            Region::Vdp1Registers => {
                let high = self.vdp1.read_register_word(address & !3, self.video.as_mut());
                let low = self.vdp1.read_register_word((address & !3) | 2, self.video.as_mut());
                (u32::from(high) << 16) | u32::from(low)
            }
            Region::Vdp2Ram | Region::Vdp2ColorRam | Region::Vdp2Registers => {
                self.vdp2.read_longword(address)
            }
            Region::Scu => self.scu.read_longword(address),
            Region::HighWram => {
                charge(cycles, HIGH_WRAM_READ_CYCLES);
                self.high_wram.read_longword(address)
            }
            Region::Unhandled
            | Region::StvIo
            | Region::SlaveInputCapture
            | Region::MasterInputCapture => {
                log::debug!("Unhandled longword read {address:08X}");
                0
            }
        }
    }

    pub fn write_byte(&mut self, address: u32, value: u8, cycles: Option<&mut u32>) {
        match self.pages.region(address) {
            Region::Bios => log::debug!("BIOS byte write {address:08X} {value:02X}"),
            Region::Smpc => self.smpc.write(address, value),
            Region::BackupRam => self.backup_ram.write_byte(address, value),
            Region::LowWram => {
                charge(cycles, LOW_WRAM_WRITE_CYCLES[0]);
                self.low_wram.write_byte(address, value);
            }
            Region::StvIo => self.stv_io.write_byte(address, value),
            Region::Cs0 => self.cs0.write_byte(address, value),
            Region::Cs1 => self.cs1.write_byte(address, value),
            Region::Cs2 => self.cs2.write_byte(address, value),
            Region::SoundRam => {
                charge(cycles, SOUND_RAM_WRITE_CYCLES);
                self.sound.write_ram_byte(address, value);
            }
            Region::ScspRegisters => self.sound.scsp_mut().write_register_byte(address, value),
            Region::Vdp1Ram => self.vdp1.write_ram_byte(address, value),
            Region::Vdp1Framebuffer => self.vdp1.write_framebuffer(
                AccessSize::Byte,
                address,
                value.into(),
                self.video.as_mut(),
            ),
            Region::Vdp1Registers => {
                log::debug!("VDP1 register byte write {address:08X} {value:02X}");
            }
            Region::Vdp2Ram | Region::Vdp2ColorRam | Region::Vdp2Registers => {
                self.vdp2.write_byte(address, value);
            }
            Region::Scu => self.scu.write_byte(address, value),
            Region::HighWram => {
                charge(cycles, HIGH_WRAM_WRITE_CYCLES);
                self.high_wram.write_byte(address, value);
            }
            Region::Unhandled | Region::SlaveInputCapture | Region::MasterInputCapture => {
                log::debug!("Unhandled byte write {address:08X} {value:02X}");
            }
        }
    }

    pub fn write_word(&mut self, address: u32, value: u16, cycles: Option<&mut u32>) {
        match self.pages.region(address) {
            Region::Bios => log::debug!("BIOS word write {address:08X} {value:04X}"),
            Region::Smpc => log::debug!("SMPC word write {address:08X} {value:04X}"),
            Region::BackupRam => self.backup_ram.write_word(address, value),
            Region::LowWram => {
                charge(cycles, LOW_WRAM_WRITE_CYCLES[1]);
                self.low_wram.write_word(address, value);
            }
            Region::SlaveInputCapture => {
                self.pending_input_capture[cpu_index(WhichCpu::Slave)] = true;
            }
            Region::MasterInputCapture => {
                self.pending_input_capture[cpu_index(WhichCpu::Master)] = true;
            }
            Region::Cs0 => self.cs0.write_word(address, value),
            Region::Cs1 => self.cs1.write_word(address, value),
            Region::Cs2 => self.cs2.write_word(address, value),
            Region::SoundRam => {
                charge(cycles, SOUND_RAM_WRITE_CYCLES);
                self.sound.write_ram_word(address, value);
            }
            Region::ScspRegisters => self.sound.scsp_mut().write_register_word(address, value),
            Region::Vdp1Ram => self.vdp1.write_ram_word(address, value),
            Region::Vdp1Framebuffer => self.vdp1.write_framebuffer(
                AccessSize::Word,
                address,
                value.into(),
                self.video.as_mut(),
            ),
            Region::Vdp1Registers => {
                self.vdp1.write_register_word(address, value, self.video.as_mut());
            }
            Region::Vdp2Ram | Region::Vdp2ColorRam | Region::Vdp2Registers => {
                self.vdp2.write_word(address, value);
            }
            Region::Scu => self.scu.write_word(address, value),
            Region::HighWram => {
                charge(cycles, HIGH_WRAM_WRITE_CYCLES);
                self.high_wram.write_word(address, value);
            }
            Region::Unhandled | Region::StvIo => {
                log::debug!("Unhandled word write {address:08X} {value:04X}");
            }
        }
    }

    pub fn write_longword(&mut self, address: u32, value: u32, cycles: Option<&mut u32>) {
        match self.pages.region(address) {
            Region::Bios => log::debug!("BIOS longword write {address:08X} {value:08X}"),
            Region::Smpc => log::debug!("SMPC longword write {address:08X} {value:08X}"),
            Region::BackupRam => self.backup_ram.write_longword(address, value),
            Region::LowWram => {
                charge(cycles, LOW_WRAM_WRITE_CYCLES[2]);
                self.low_wram.write_longword(address, value);
            }
            Region::Cs0 => self.cs0.write_longword(address, value),
            Region::Cs1 => self.cs1.write_longword(address, value),
            Region::Cs2 => self.cs2.write_longword(address, value),
            Region::SoundRam => {
                charge(cycles, SOUND_RAM_WRITE_CYCLES);
                self.sound.write_ram_longword(address, value);
            }
            Region::ScspRegisters => {
                self.sound.scsp_mut().write_register_longword(address, value);
            }
            Region::Vdp1Ram => self.vdp1.write_ram_longword(address, value),
            Region::Vdp1Framebuffer => self.vdp1.write_framebuffer(
                AccessSize::Longword,
                address,
                value,
                self.video.as_mut(),
            ),
            Region::Vdp1Registers => {
                let video = self.video.as_mut();
                self.vdp1.write_register_word(address & !3, (value >> 16) as u16, video);
                self.vdp1.write_register_word((address & !3) | 2, value as u16, video);
            }
            Region::Vdp2Ram | Region::Vdp2ColorRam | Region::Vdp2Registers => {
                self.vdp2.write_longword(address, value);
            }
            Region::Scu => self.scu.write_longword(address, value),
            Region::HighWram => {
                charge(cycles, HIGH_WRAM_WRITE_CYCLES);
                self.high_wram.write_longword(address, value);
            }
            Region::Unhandled
            | Region::StvIo
            | Region::SlaveInputCapture
            | Region::MasterInputCapture => {
                log::debug!("Unhandled longword write {address:08X} {value:08X}");
            }
        }
    }
}

/// The bus for one SH-2's execution slice.
pub struct Sh2Bus<'a> {
    pub bus: &'a mut SaturnBus,
    pub which: WhichCpu,
    other: Option<&'a mut Sh2>,
    other_running: bool,
    // Executing CPU's timeline minus the other CPU's timeline at the same instant
    other_offset: u32,
    depth: u8,
    memory_hit: Option<(u32, MemoryAccessFlags)>,
}

impl<'a> Sh2Bus<'a> {
    /// A bus with no access to the other CPU. Input capture writes aimed at it are queued.
    pub fn new(bus: &'a mut SaturnBus, which: WhichCpu) -> Self {
        Self {
            bus,
            which,
            other: None,
            other_running: false,
            other_offset: 0,
            depth: 0,
            memory_hit: None,
        }
    }

    /// `other` is the CPU that is not executing. It is only run inline if `other_running` is set.
    ///
    /// The two cycle counters advance independently; `other_offset` is the executing CPU's
    /// counter minus the other's counter at the same point in emulated time.
    pub fn with_other(
        bus: &'a mut SaturnBus,
        which: WhichCpu,
        other: &'a mut Sh2,
        other_running: bool,
        other_offset: u32,
    ) -> Self {
        Self {
            bus,
            which,
            other: Some(other),
            other_running,
            other_offset,
            depth: 0,
            memory_hit: None,
        }
    }

    // DMA and other unattributed accesses (no cycle counter) never trigger breakpoints
    fn check_breakpoint(&mut self, address: u32, access: MemoryAccessFlags, attributed: bool) {
        if !attributed {
            return;
        }

        if let Handler::Watched(_) = self.bus.pages.handler(address) {
            if let Some(hook) = self.bus.hooks.check(self.which, address, access) {
                log::debug!(
                    "[{}] Memory breakpoint at {:08X} hit by {address:08X}",
                    self.which.name(),
                    hook.address
                );
                self.memory_hit = Some((hook.address, access));
            }
        }
    }

    // A capture aimed at the executing CPU, or at a CPU further up the catch-up chain, is
    // polled by that CPU at its next instruction boundary. Unpolled captures are delivered
    // after the slice.
    fn input_capture(&mut self, target: WhichCpu, cycles: Option<&mut u32>) {
        let Some(cpu) = self.other.as_deref_mut().filter(|cpu| cpu.which() == target) else {
            self.bus.pending_input_capture[cpu_index(target)] = true;
            return;
        };

        cpu.input_capture();
        if cpu.is_sleeping() {
            cpu.wake();
        }

        let Some(current_cycles) = cycles else { return };
        if !self.other_running {
            return;
        }

        if self.depth >= MAX_CATCH_UP_DEPTH {
            log::debug!(
                "[{}] Input capture catch-up skipped at depth {}",
                target.name(),
                self.depth
            );
            return;
        }

        let lag = current_cycles.wrapping_sub(self.other_offset).wrapping_sub(cpu.cycles()) as i32;
        if lag > 0 {
            log::trace!("[{}] Input capture catch-up of {lag} cycles", target.name());

            // The writer is mid-instruction and cannot be re-entered; captures the caught-up CPU
            // aims back at it go through the pending flags
            let mut nested = Sh2Bus {
                bus: &mut *self.bus,
                which: target,
                other: None,
                other_running: false,
                other_offset: 0,
                depth: self.depth + 1,
                memory_hit: None,
            };
            cpu.exec(lag as u32, &mut nested);
        }
    }
}

impl BusInterface for Sh2Bus<'_> {
    fn read_byte(&mut self, address: u32, cycles: Option<&mut u32>) -> u8 {
        self.check_breakpoint(address, MemoryAccessFlags::BYTE_READ, cycles.is_some());
        self.bus.read_byte(address, cycles)
    }

    fn read_word(&mut self, address: u32, cycles: Option<&mut u32>) -> u16 {
        self.check_breakpoint(address, MemoryAccessFlags::WORD_READ, cycles.is_some());
        self.bus.read_word(address, cycles)
    }

    fn read_longword(&mut self, address: u32, cycles: Option<&mut u32>) -> u32 {
        self.check_breakpoint(address, MemoryAccessFlags::LONG_READ, cycles.is_some());
        self.bus.read_longword(address, cycles)
    }

    fn write_byte(&mut self, address: u32, value: u8, cycles: Option<&mut u32>) {
        self.check_breakpoint(address, MemoryAccessFlags::BYTE_WRITE, cycles.is_some());
        self.bus.write_byte(address, value, cycles);
    }

    fn write_word(&mut self, address: u32, value: u16, cycles: Option<&mut u32>) {
        self.check_breakpoint(address, MemoryAccessFlags::WORD_WRITE, cycles.is_some());
        match self.bus.pages.region(address) {
            Region::SlaveInputCapture => self.input_capture(WhichCpu::Slave, cycles),
            Region::MasterInputCapture => self.input_capture(WhichCpu::Master, cycles),
            _ => self.bus.write_word(address, value, cycles),
        }
    }

    fn write_longword(&mut self, address: u32, value: u32, cycles: Option<&mut u32>) {
        self.check_breakpoint(address, MemoryAccessFlags::LONG_WRITE, cycles.is_some());
        self.bus.write_longword(address, value, cycles);
    }

    fn is_cacheable(&self, address: u32) -> bool {
        self.bus.pages.is_cacheable(address)
    }

    fn take_memory_breakpoint_hit(&mut self) -> Option<(u32, MemoryAccessFlags)> {
        self.memory_hit.take()
    }

    fn take_input_capture(&mut self) -> bool {
        self.bus.take_pending_input_capture(self.which)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::breakpoints::Hook;
    use crate::video::NullVideo;
    use sh2_emu::engine::Sh2CoreId;
    use test_log::test;

    fn new_bus() -> SaturnBus {
        let config = SaturnConfig::default();
        SaturnBus::new(
            Bios::new(&[]),
            BackupRam::new(config.backup_ram_size.byte_len(), None),
            &config,
            Box::new(NullVideo),
            SoundSystem::new(true),
        )
    }

    #[test]
    fn work_ram_access_costs() {
        let mut bus = new_bus();
        let mut sh2_bus = Sh2Bus::new(&mut bus, WhichCpu::Master);

        let mut cycles = 0;
        sh2_bus.write_longword(0x06000000, 0x12345678, Some(&mut cycles));
        assert_eq!(cycles, HIGH_WRAM_WRITE_CYCLES);
        assert_eq!(sh2_bus.read_longword(0x06000000, Some(&mut cycles)), 0x12345678);
        assert_eq!(cycles, HIGH_WRAM_WRITE_CYCLES + HIGH_WRAM_READ_CYCLES);

        let mut cycles = 0;
        sh2_bus.write_longword(0x00200000, 1, Some(&mut cycles));
        sh2_bus.read_longword(0x00200000, Some(&mut cycles));
        assert_eq!(cycles, 9 + 12);

        // Unattributed accesses cost nothing
        assert_eq!(sh2_bus.read_longword(0x06000000, None), 0x12345678);
    }

    #[test]
    fn sound_ram_reads_wait_on_running_68000() {
        let mut bus = new_bus();
        let mut cycles = 0;
        bus.read_word(0x25A00000, Some(&mut cycles));
        assert_eq!(cycles, SOUND_RAM_READ_CYCLES);

        bus.sound.start_m68k();
        let mut cycles = 0;
        bus.read_word(0x25A00000, Some(&mut cycles));
        assert_eq!(cycles, SOUND_RAM_READ_CYCLES + M68K_SYNC_CYCLES);

        let mut cycles = 0;
        bus.read_byte(0x25A00000, Some(&mut cycles));
        assert_eq!(cycles, SOUND_RAM_READ_CYCLES);
    }

    #[test]
    fn ram_read_write_back_is_idempotent() {
        let mut bus = new_bus();
        for _ in 0..1000 {
            let base = match rand::random::<u8>() % 3 {
                0 => 0x00200000,
                1 => 0x06000000,
                _ => 0x25C00000,
            };
            let address = base | (rand::random::<u32>() & 0x7FFFC);
            bus.write_longword(address, rand::random(), None);

            let before = bus.read_longword(address, None);
            bus.write_longword(address, before, None);
            assert_eq!(bus.read_longword(address, None), before);
        }
    }

    #[test]
    fn unhandled_pages_read_zero() {
        let mut bus = new_bus();
        bus.write_longword(0x00300000, 0xFFFFFFFF, None);
        assert_eq!(bus.read_longword(0x00300000, None), 0);
        assert_eq!(bus.read_word(0x20100000, None), 0);
    }

    #[test]
    fn memory_breakpoint_hits_only_owning_cpu() {
        let mut bus = new_bus();
        let hook = Hook {
            cpu: WhichCpu::Slave,
            address: 0x06004000,
            flags: MemoryAccessFlags::WORD_WRITE,
        };
        bus.hooks.install(hook, &mut bus.pages);

        let mut cycles = 0;
        let mut master = Sh2Bus::new(&mut bus, WhichCpu::Master);
        master.write_word(0x06004000, 1, Some(&mut cycles));
        assert_eq!(master.take_memory_breakpoint_hit(), None);

        let mut slave = Sh2Bus::new(&mut bus, WhichCpu::Slave);
        slave.write_word(0x26004000, 1, None);
        assert_eq!(slave.take_memory_breakpoint_hit(), None);
        slave.write_word(0x26004000, 1, Some(&mut cycles));
        assert_eq!(
            slave.take_memory_breakpoint_hit(),
            Some((0x06004000, MemoryAccessFlags::WORD_WRITE))
        );
    }

    #[test]
    fn input_capture_reaches_other_cpu() {
        let mut bus = new_bus();
        let mut slave = Sh2::new(WhichCpu::Slave, Sh2CoreId::Dummy);
        slave.reset();

        let mut cycles = 500;
        let mut sh2_bus = Sh2Bus::with_other(&mut bus, WhichCpu::Master, &mut slave, true, 0);
        sh2_bus.write_word(0x21000000, 0, Some(&mut cycles));
        drop(sh2_bus);

        // Caught up to the writer's cycle count
        assert_eq!(slave.cycles(), 500);
        assert!(!bus.take_pending_input_capture(WhichCpu::Slave));

        // Aimed at the executing CPU: queued
        let mut sh2_bus = Sh2Bus::with_other(&mut bus, WhichCpu::Master, &mut slave, true, 0);
        sh2_bus.write_word(0x21800000, 0, Some(&mut cycles));
        drop(sh2_bus);
        assert!(bus.take_pending_input_capture(WhichCpu::Master));
        assert!(!bus.take_pending_input_capture(WhichCpu::Master));
    }

    // MOV.W R0, @R1; BRA to self; NOP
    fn load_capture_program(bus: &mut SaturnBus, address: u32) {
        for (i, opcode) in [0x2101_u16, 0xAFFE, 0x0009].into_iter().enumerate() {
            bus.write_word(address + 2 * i as u32, opcode, None);
        }
    }

    fn capture_writing_slave(bus: &mut SaturnBus) -> Sh2 {
        load_capture_program(bus, 0x06000000);

        let mut slave = Sh2::new(WhichCpu::Slave, Sh2CoreId::Interpreter);
        slave.reset();
        slave.set_pc(0x06000000);
        // Master input capture
        slave.set_gpr(1, 0x21800000);
        slave
    }

    #[test]
    fn caught_up_cpu_can_capture_the_writer() {
        let mut bus = new_bus();
        let mut slave = capture_writing_slave(&mut bus);

        let mut cycles = 200;
        let mut master_bus = Sh2Bus::with_other(&mut bus, WhichCpu::Master, &mut slave, true, 0);
        master_bus.write_word(0x21000000, 0, Some(&mut cycles));

        // The writer sees the reply at its next instruction boundary, inside the same slice
        assert!(master_bus.take_input_capture());
        assert!(!master_bus.take_input_capture());
        drop(master_bus);

        assert_eq!(slave.frt().ftcsr & 0x80, 0x80);
        assert!(slave.cycles() >= 200);
    }

    #[test]
    fn catch_up_stops_at_depth_limit() {
        let mut bus = new_bus();
        let mut slave = capture_writing_slave(&mut bus);

        let mut cycles = 200;
        let mut master_bus = Sh2Bus::with_other(&mut bus, WhichCpu::Master, &mut slave, true, 0);
        master_bus.depth = MAX_CATCH_UP_DEPTH;
        master_bus.write_word(0x21000000, 0, Some(&mut cycles));
        assert!(!master_bus.take_input_capture());
        drop(master_bus);

        // Captured, but not run
        assert_eq!(slave.frt().ftcsr & 0x80, 0x80);
        assert_eq!(slave.cycles(), 0);
    }
}
