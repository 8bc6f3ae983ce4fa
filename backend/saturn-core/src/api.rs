//! Saturn public interface and main loop

use crate::bus::breakpoints::Hook;
use crate::bus::{SaturnBus, Sh2Bus, cpu_index};
use crate::devices::ScuInterrupt;
use crate::input::SaturnInputs;
use crate::memory::{BIOS_LEN, BackupRam, Bios, WorkRam};
use crate::savestate::{self, BINCODE_CONFIG, ChunkTag, SaveStateError, StateReader, StateWriter};
use crate::scsp::SCSP_CLOCK_RATE;
use crate::scsp::cdda::{CdReadTiming, SECTOR_LEN};
use crate::smpc::{Smpc, SmpcSignal};
use crate::sound::{SoundError, SoundInterface, SoundSystem};
use crate::vdp1::Vdp1;
use crate::video::VideoInterface;
use saturn_config::{SaturnConfig, Sh2CoreKind, TimingMode};
use sh2_emu::debug::{BreakpointHit, MemoryAccessFlags};
use sh2_emu::engine::{Sh2CoreId, Sh2Error};
use sh2_emu::{Sh2, WhichCpu};
use thiserror::Error;

// Each line is executed in this many slices; HBlank-in is raised after the last one
const SLICES_PER_LINE: u32 = 10;
const HBLANK_IN_SLICE: u32 = SLICES_PER_LINE - 1;

const NTSC_VBLANK_LINE: u32 = 224;
const PAL_VBLANK_LINE: u32 = 256;

#[derive(Debug, Error)]
pub enum SaturnError {
    #[error("BIOS image is {0} bytes; expected 1 to 512KB")]
    BiosSize(usize),
    #[error("SH-2 error: {0}")]
    Sh2(#[from] Sh2Error),
    #[error("Save state error: {0}")]
    SaveState(#[from] SaveStateError),
    #[error("Audio error: {0}")]
    Audio(SoundError),
}

/// Invoked after a CPU stops on a breakpoint. Memory breakpoints are suppressed for the duration
/// of the call, so the callback may freely inspect memory through the CPUs.
pub type BreakpointCallback = Box<dyn FnMut(&mut Saturn, WhichCpu, BreakpointHit)>;

fn core_id(kind: Sh2CoreKind) -> Sh2CoreId {
    match kind {
        Sh2CoreKind::Dummy => Sh2CoreId::Dummy,
        Sh2CoreKind::Interpreter => Sh2CoreId::Interpreter,
    }
}

fn vblank_line(timing_mode: TimingMode) -> u32 {
    match timing_mode {
        TimingMode::Ntsc => NTSC_VBLANK_LINE,
        TimingMode::Pal => PAL_VBLANK_LINE,
    }
}

type Sh2ChunkBody = (Sh2, u32, bool);
type OtherChunkBody = (WorkRam, WorkRam, u32, f64, bool);

pub struct Saturn {
    master: Sh2,
    slave: Sh2,
    bus: SaturnBus,
    sound_output: Box<dyn SoundInterface>,
    config: SaturnConfig,
    timing_mode: TimingMode,
    slave_running: bool,
    // Per-CPU cycle counter values marking the end of the current slice. Both CPUs reach their
    // deadline at the same point in emulated time.
    deadlines: [u32; 2],
    line: u32,
    scsp_cycle_fraction: f64,
    frame_counter: u32,
    breakpoint_callback: Option<BreakpointCallback>,
}

impl Saturn {
    /// Create a powered-on system.
    ///
    /// # Errors
    ///
    /// Returns an error if the BIOS image is empty or too large, or if the configured SH-2 core
    /// is unavailable.
    pub fn init(
        bios: &[u8],
        config: SaturnConfig,
        video: Box<dyn VideoInterface>,
        mut sound_output: Box<dyn SoundInterface>,
    ) -> Result<Self, SaturnError> {
        if bios.is_empty() || bios.len() > BIOS_LEN {
            return Err(SaturnError::BiosSize(bios.len()));
        }

        let core_id = core_id(config.sh2_core);
        let master = Sh2::new(WhichCpu::Master, core_id);
        let slave = Sh2::new(WhichCpu::Slave, core_id);
        master.init_core()?;
        slave.init_core()?;

        let timing_mode = config.region.timing_mode();
        sound_output.set_volume(config.volume);
        sound_output.change_video_format(timing_mode.frame_rate());

        let backup_ram = BackupRam::new(config.backup_ram_size.byte_len(), None);
        let sound = SoundSystem::new(config.audio_enabled);
        let bus = SaturnBus::new(Bios::new(bios), backup_ram, &config, video, sound);

        log::info!(
            "Creating Saturn with region {}, SH-2 core {}, {timing_mode:?} timing",
            config.region,
            config.sh2_core
        );

        let mut saturn = Self {
            master,
            slave,
            bus,
            sound_output,
            config,
            timing_mode,
            slave_running: false,
            deadlines: [0; 2],
            line: 0,
            scsp_cycle_fraction: 0.0,
            frame_counter: 0,
            breakpoint_callback: None,
        };
        saturn.reset_components();

        Ok(saturn)
    }

    #[must_use]
    pub fn config(&self) -> &SaturnConfig {
        &self.config
    }

    #[must_use]
    pub fn timing_mode(&self) -> TimingMode {
        self.timing_mode
    }

    #[must_use]
    pub fn frame_counter(&self) -> u32 {
        self.frame_counter
    }

    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    #[must_use]
    pub fn slave_running(&self) -> bool {
        self.slave_running
    }

    #[must_use]
    pub fn master(&self) -> &Sh2 {
        &self.master
    }

    #[must_use]
    pub fn slave(&self) -> &Sh2 {
        &self.slave
    }

    #[must_use]
    pub fn cpu(&self, which: WhichCpu) -> &Sh2 {
        match which {
            WhichCpu::Master => &self.master,
            WhichCpu::Slave => &self.slave,
        }
    }

    pub fn cpu_mut(&mut self, which: WhichCpu) -> &mut Sh2 {
        match which {
            WhichCpu::Master => &mut self.master,
            WhichCpu::Slave => &mut self.slave,
        }
    }

    #[must_use]
    pub fn bus(&self) -> &SaturnBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut SaturnBus {
        &mut self.bus
    }

    #[must_use]
    pub fn smpc(&self) -> &Smpc {
        &self.bus.smpc
    }

    #[must_use]
    pub fn vdp1(&self) -> &Vdp1 {
        &self.bus.vdp1
    }

    #[must_use]
    pub fn sound(&self) -> &SoundSystem {
        &self.bus.sound
    }

    /// Run one full frame: every line of the current video standard, with blanking events and
    /// audio output.
    ///
    /// # Errors
    ///
    /// Returns an error if the audio backend rejects samples.
    pub fn exec_frame(&mut self) -> Result<(), SaturnError> {
        for _ in 0..self.timing_mode.lines_per_frame() {
            self.exec_line();
        }

        self.flush_audio()
    }

    fn exec_line(&mut self) {
        let cycles_per_line = self.bus.vdp1.cycles_per_line().max(SLICES_PER_LINE as i32) as u32;
        let slice_cycles = cycles_per_line / SLICES_PER_LINE;
        let remainder = cycles_per_line % SLICES_PER_LINE;

        for slice in 0..SLICES_PER_LINE {
            let extra = u32::from(slice < remainder);
            self.exec(slice_cycles + extra);

            if slice == HBLANK_IN_SLICE {
                self.bus.vdp1.hblank_in(self.line, self.bus.video.as_mut());
                self.raise_scu(ScuInterrupt::HBlankIn);
            }
        }

        self.bus.vdp1.hblank_out(self.bus.video.as_mut());
        self.next_line();
    }

    fn next_line(&mut self) {
        self.line += 1;

        if self.line == vblank_line(self.timing_mode) {
            log::trace!("VBlank in, frame {}", self.frame_counter);
            self.raise_scu(ScuInterrupt::VBlankIn);
            self.bus.smpc.end_frame();
            self.bus.video.vdp2_draw_end();
            self.frame_counter = self.frame_counter.wrapping_add(1);
        }

        if self.line >= self.timing_mode.lines_per_frame() {
            self.line = 0;
            self.bus.vdp1.vblank_out(self.bus.video.as_mut());
            self.raise_scu(ScuInterrupt::VBlankOut);
            self.bus.video.vdp2_draw_start();
        }
    }

    /// Run a single slice of `cycles` SH-2 cycles: both CPUs, then the sound subsystem and SMPC
    /// catch up and any resulting interrupts and signals are delivered.
    pub fn exec(&mut self, cycles: u32) {
        for deadline in &mut self.deadlines {
            *deadline = deadline.wrapping_add(cycles);
        }

        if !self.slave_running {
            // A stopped slave has no debt when it is started
            self.deadlines[1] = self.slave.cycles();
        }

        self.run_cpu(WhichCpu::Master);
        if self.slave_running {
            self.run_cpu(WhichCpu::Slave);
        }
        self.deliver_input_captures();

        self.advance_sound(cycles);
        self.bus.smpc.exec(cycles.min(i32::MAX as u32) as i32, self.line);
        self.apply_smpc_signals();

        if self.bus.sound.take_main_interrupt() {
            self.raise_scu(ScuInterrupt::SoundRequest);
        }
        if self.bus.vdp1.take_draw_end() {
            self.raise_scu(ScuInterrupt::SpriteDrawEnd);
        }

        self.dispatch_breakpoints();
    }

    fn run_cpu(&mut self, which: WhichCpu) {
        let index = cpu_index(which);
        let offset = self.deadlines[index].wrapping_sub(self.deadlines[index ^ 1]);

        let (cpu, mut bus) = match which {
            WhichCpu::Master => (
                &mut self.master,
                Sh2Bus::with_other(
                    &mut self.bus,
                    which,
                    &mut self.slave,
                    self.slave_running,
                    offset,
                ),
            ),
            WhichCpu::Slave => (
                &mut self.slave,
                Sh2Bus::with_other(&mut self.bus, which, &mut self.master, true, offset),
            ),
        };

        // Negative when the CPU overshot a previous slice or was caught up inline
        let budget = self.deadlines[index].wrapping_sub(cpu.cycles()) as i32;
        if budget > 0 {
            cpu.exec(budget as u32, &mut bus);
        }
    }

    fn deliver_input_captures(&mut self) {
        for which in [WhichCpu::Master, WhichCpu::Slave] {
            if self.bus.take_pending_input_capture(which) {
                let cpu = self.cpu_mut(which);
                cpu.input_capture();
                cpu.wake();
            }
        }
    }

    fn advance_sound(&mut self, sh2_cycles: u32) {
        let sh2_clock = f64::from(self.bus.vdp1.cycles_per_line().max(1))
            * f64::from(self.timing_mode.lines_per_frame())
            * self.timing_mode.frame_rate();
        let ratio = SCSP_CLOCK_RATE as f64 / sh2_clock;

        self.scsp_cycle_fraction += f64::from(sh2_cycles) * ratio;
        let whole = self.scsp_cycle_fraction.floor();
        self.scsp_cycle_fraction -= whole;

        self.bus.sound.advance(whole as u64);
    }

    fn raise_scu(&mut self, source: ScuInterrupt) {
        if let Some(interrupt) = self.bus.scu.raise(source) {
            self.master.send_interrupt(interrupt.vector, interrupt.level);
        }
    }

    fn apply_smpc_signals(&mut self) {
        for signal in self.bus.smpc.take_signals() {
            log::debug!("Applying SMPC signal {signal:?}");

            match signal {
                SmpcSignal::StartSlave => {
                    self.slave.reset();
                    let mut bus = Sh2Bus::new(&mut self.bus, WhichCpu::Slave);
                    self.slave.power_on_reset(&mut bus);
                    self.deadlines[1] = self.slave.cycles();
                    self.slave_running = true;
                }
                SmpcSignal::StopSlave => {
                    self.slave_running = false;
                }
                SmpcSignal::StartSoundCpu => self.bus.sound.start_m68k(),
                SmpcSignal::StopSoundCpu => self.bus.sound.stop_m68k(),
                SmpcSignal::MasterNmi => self.master.nmi(),
                SmpcSignal::ClockChange(dot_clock) => {
                    self.bus.vdp1.reset(self.bus.video.as_mut());
                    self.bus.vdp1.set_display_timing(self.timing_mode, dot_clock);
                    self.bus.vdp2.reset();
                    self.bus.scu.reset();
                    self.bus.sound.reset();
                    self.slave_running = false;
                }
                SmpcSignal::SystemManagerInterrupt => {
                    self.raise_scu(ScuInterrupt::SystemManager);
                }
            }
        }
    }

    fn dispatch_breakpoints(&mut self) {
        for which in [WhichCpu::Master, WhichCpu::Slave] {
            let Some(hit) = self.cpu_mut(which).take_breakpoint_hit() else { continue };

            let Some(mut callback) = self.breakpoint_callback.take() else {
                log::debug!("[{}] Breakpoint hit with no callback: {hit:?}", which.name());
                continue;
            };

            self.bus.hooks.set_in_breakpoint(true);
            callback(self, which, hit);
            self.bus.hooks.set_in_breakpoint(false);

            // The callback may have installed a replacement
            if self.breakpoint_callback.is_none() {
                self.breakpoint_callback = Some(callback);
            }
        }
    }

    /// Push generated audio samples to the sound backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the audio backend rejects samples.
    pub fn flush_audio(&mut self) -> Result<(), SaturnError> {
        self.bus.sound.flush(self.sound_output.as_mut()).map_err(SaturnError::Audio)
    }

    pub fn receive_cdda(&mut self, sector: &[u8; SECTOR_LEN]) -> CdReadTiming {
        self.bus.sound.scsp_mut().receive_cdda(sector)
    }

    fn reset_components(&mut self) {
        let lock = self.bus.sound.lock().clone();
        let _guard = lock.hold();

        self.master.reset();
        self.slave.reset();
        self.slave_running = false;

        self.bus.smpc.reset();
        self.bus.sound.reset();
        self.bus.vdp1.reset(self.bus.video.as_mut());
        self.bus.vdp1.set_display_timing(self.timing_mode, self.bus.smpc.dot_clock());
        self.bus.vdp2.reset();
        self.bus.cs0.reset();
        self.bus.cs1.reset();
        self.bus.cs2.reset();
        self.bus.stv_io.reset();
        self.bus.scu.reset();
        self.bus.pending_input_capture = [false; 2];

        let mut bus = Sh2Bus::new(&mut self.bus, WhichCpu::Master);
        self.master.power_on_reset(&mut bus);

        self.deadlines = [self.master.cycles(), self.slave.cycles()];
        self.line = 0;
        self.scsp_cycle_fraction = 0.0;
        self.sound_output.reset();
    }

    /// Reset every component. Work RAM, sound RAM and backup RAM keep their contents.
    pub fn reset(&mut self) {
        log::info!("Soft resetting console");

        self.reset_components();
    }

    /// Power cycle. Work RAM and sound RAM are cleared; backup RAM keeps its contents.
    pub fn hard_reset(&mut self) {
        log::info!("Hard resetting console");

        self.bus.low_wram.clear();
        self.bus.high_wram.clear();
        self.bus.sound.scsp_mut().sound_ram_mut().clear();
        self.frame_counter = 0;

        self.reset_components();
    }

    pub fn set_inputs(&mut self, inputs: SaturnInputs) {
        self.bus.smpc.set_inputs(inputs);
    }

    #[must_use]
    pub fn inputs(&self) -> SaturnInputs {
        self.bus.smpc.inputs()
    }

    /// Press the console's reset button. The SMPC decides whether the master SH-2 sees an NMI.
    pub fn press_reset_button(&mut self) {
        self.bus.smpc.reset_button();
        self.apply_smpc_signals();
    }

    #[must_use]
    pub fn backup_ram(&self) -> &[u8] {
        self.bus.backup_ram.contents()
    }

    /// Replace backup RAM contents, e.g. with a previously saved file.
    pub fn load_backup_ram(&mut self, contents: &[u8]) {
        let len = self.config.backup_ram_size.byte_len();
        self.bus.backup_ram = BackupRam::new(len, Some(contents));
    }

    /// Whether backup RAM was written since the last call.
    pub fn take_backup_ram_dirty(&mut self) -> bool {
        self.bus.backup_ram.take_dirty()
    }

    pub fn set_breakpoint_callback(&mut self, callback: Option<BreakpointCallback>) {
        self.breakpoint_callback = callback;
    }

    /// # Errors
    ///
    /// Returns an error if the CPU rejects the breakpoint.
    pub fn add_code_breakpoint(
        &mut self,
        which: WhichCpu,
        address: u32,
    ) -> Result<(), SaturnError> {
        self.cpu_mut(which).add_code_breakpoint(address)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if no breakpoint is set at `address`.
    pub fn remove_code_breakpoint(
        &mut self,
        which: WhichCpu,
        address: u32,
    ) -> Result<(), SaturnError> {
        self.cpu_mut(which).remove_code_breakpoint(address)?;
        Ok(())
    }

    /// Watch `address` for the accesses in `flags` by one CPU.
    ///
    /// # Errors
    ///
    /// Returns an error if the CPU rejects the breakpoint.
    pub fn add_memory_breakpoint(
        &mut self,
        which: WhichCpu,
        address: u32,
        flags: MemoryAccessFlags,
    ) -> Result<(), SaturnError> {
        let breakpoint = self.cpu_mut(which).add_memory_breakpoint(address, flags)?;
        let hook = Hook { cpu: which, address: breakpoint.address, flags: breakpoint.flags };
        self.bus.hooks.install(hook, &mut self.bus.pages);

        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if no breakpoint is set at `address`.
    pub fn remove_memory_breakpoint(
        &mut self,
        which: WhichCpu,
        address: u32,
    ) -> Result<(), SaturnError> {
        let breakpoint = self.cpu_mut(which).remove_memory_breakpoint(address)?;
        self.bus.hooks.remove(which, breakpoint.address, &mut self.bus.pages);

        Ok(())
    }

    fn sync_breakpoint_hooks(&mut self) {
        self.bus.hooks.clear(&mut self.bus.pages);
        for cpu in [&self.master, &self.slave] {
            for breakpoint in cpu.memory_breakpoints() {
                let hook =
                    Hook { cpu: cpu.which(), address: breakpoint.address, flags: breakpoint.flags };
                self.bus.hooks.install(hook, &mut self.bus.pages);
            }
        }
    }

    /// Read memory as `which` sees it, through its cache and on-chip registers.
    pub fn read_memory_byte(&mut self, which: WhichCpu, address: u32) -> u8 {
        let (cpu, mut bus) = self.debug_access(which);
        cpu.read_memory_byte(address, &mut bus)
    }

    pub fn read_memory_word(&mut self, which: WhichCpu, address: u32) -> u16 {
        let (cpu, mut bus) = self.debug_access(which);
        cpu.read_memory_word(address, &mut bus)
    }

    pub fn read_memory_longword(&mut self, which: WhichCpu, address: u32) -> u32 {
        let (cpu, mut bus) = self.debug_access(which);
        cpu.read_memory_longword(address, &mut bus)
    }

    pub fn write_memory_byte(&mut self, which: WhichCpu, address: u32, value: u8) {
        let (cpu, mut bus) = self.debug_access(which);
        cpu.write_memory_byte(address, value, &mut bus);
    }

    pub fn write_memory_word(&mut self, which: WhichCpu, address: u32, value: u16) {
        let (cpu, mut bus) = self.debug_access(which);
        cpu.write_memory_word(address, value, &mut bus);
    }

    pub fn write_memory_longword(&mut self, which: WhichCpu, address: u32, value: u32) {
        let (cpu, mut bus) = self.debug_access(which);
        cpu.write_memory_longword(address, value, &mut bus);
    }

    fn debug_access(&mut self, which: WhichCpu) -> (&mut Sh2, Sh2Bus<'_>) {
        let cpu = match which {
            WhichCpu::Master => &mut self.master,
            WhichCpu::Slave => &mut self.slave,
        };
        (cpu, Sh2Bus::new(&mut self.bus, which))
    }

    /// Read the bus directly, bypassing caches, breakpoints and cycle accounting.
    pub fn peek_longword(&mut self, address: u32) -> u32 {
        self.bus.read_longword(address, None)
    }

    /// Serialize the whole system.
    ///
    /// # Errors
    ///
    /// Returns an error if any component fails to encode.
    pub fn save_state_buffer(&mut self) -> Result<Vec<u8>, SaturnError> {
        let lock = self.bus.sound.lock().clone();
        let _guard = lock.hold();

        self.sound_output.mute();
        let result = self.write_state();
        self.sound_output.unmute();

        result
    }

    fn write_state(&self) -> Result<Vec<u8>, SaturnError> {
        let mut writer = StateWriter::new(self.frame_counter, 0);

        writer.write_chunk(ChunkTag::Cartridge, &self.bus.cs0.save_state());
        writer.write_chunk(ChunkTag::CdBlock, &self.bus.cs2.save_state());

        let overshoot = |which: WhichCpu| {
            self.cpu(which).cycles().wrapping_sub(self.deadlines[cpu_index(which)])
        };

        writer.encode_chunk(
            ChunkTag::MasterSh2,
            (&self.master, overshoot(WhichCpu::Master), self.bus.pending_input_capture[0]),
        )?;

        let mut slave_body = vec![u8::from(self.slave_running)];
        slave_body.extend(bincode::encode_to_vec(
            (&self.slave, overshoot(WhichCpu::Slave), self.bus.pending_input_capture[1]),
            BINCODE_CONFIG,
        )
        .map_err(SaveStateError::from)?);
        writer.write_chunk(ChunkTag::SlaveSh2, &slave_body);

        writer.write_chunk(ChunkTag::Scsp, &self.bus.sound.save_state()?);
        writer.write_chunk(ChunkTag::Scu, &self.bus.scu.save_state());
        writer.encode_chunk(ChunkTag::Smpc, &self.bus.smpc)?;
        writer.encode_chunk(ChunkTag::Vdp1, &self.bus.vdp1)?;
        writer.write_chunk(ChunkTag::Vdp2, &self.bus.vdp2.save_state());
        writer.encode_chunk(
            ChunkTag::Other,
            (
                &self.bus.low_wram,
                &self.bus.high_wram,
                self.line,
                self.scsp_cycle_fraction,
                self.timing_mode == TimingMode::Pal,
            ),
        )?;

        Ok(writer.finish())
    }

    /// Restore the whole system from a buffer produced by [`Self::save_state_buffer`] or an
    /// older state version. If any chunk fails to decode, no component is modified.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is not a valid save state.
    pub fn load_state_buffer(&mut self, bytes: &[u8]) -> Result<(), SaturnError> {
        let lock = self.bus.sound.lock().clone();
        let _guard = lock.hold();

        self.sound_output.mute();
        let result = self.read_state(bytes);
        self.sound_output.unmute();

        result
    }

    fn read_state(&mut self, bytes: &[u8]) -> Result<(), SaturnError> {
        let mut reader = StateReader::new(bytes)?;

        let cartridge = reader.read_chunk(ChunkTag::Cartridge)?;
        let cd_block = reader.read_chunk(ChunkTag::CdBlock)?;

        let chunk = reader.read_chunk(ChunkTag::MasterSh2)?;
        let (master, master_overshoot, master_capture): Sh2ChunkBody =
            savestate::decode_body(&savestate::migrate_sh2(chunk.version, chunk.body)?)?;

        let chunk = reader.read_chunk(ChunkTag::SlaveSh2)?;
        let (&running, slave_body) = chunk.body.split_first().ok_or_else(|| {
            SaveStateError::SizeMismatch { expected: 1, actual: 0 }
        })?;
        let (slave, slave_overshoot, slave_capture): Sh2ChunkBody =
            savestate::decode_body(&savestate::migrate_sh2(chunk.version, slave_body)?)?;

        let scsp = reader.read_chunk(ChunkTag::Scsp)?;
        let scu = reader.read_chunk(ChunkTag::Scu)?;

        let chunk = reader.read_chunk(ChunkTag::Smpc)?;
        let smpc: Smpc =
            savestate::decode_body(&savestate::migrate_smpc(chunk.version, chunk.body)?)?;

        let vdp1: Vdp1 = savestate::decode_body(reader.read_chunk(ChunkTag::Vdp1)?.body)?;
        let vdp2 = reader.read_chunk(ChunkTag::Vdp2)?;
        let (low_wram, high_wram, line, scsp_cycle_fraction, is_pal): OtherChunkBody =
            savestate::decode_body(reader.read_chunk(ChunkTag::Other)?.body)?;

        // Last fallible step; it decodes fully before modifying the sound system
        self.bus.sound.load_state(scsp.body)?;

        self.bus.cs0.load_state(cartridge.body);
        self.bus.cs2.load_state(cd_block.body);
        self.bus.scu.load_state(scu.body);
        self.bus.vdp2.load_state(vdp2.body);

        self.master = master;
        self.slave = slave;
        self.slave_running = running != 0;
        self.deadlines = [
            self.master.cycles().wrapping_sub(master_overshoot),
            self.slave.cycles().wrapping_sub(slave_overshoot),
        ];
        self.bus.pending_input_capture = [master_capture, slave_capture];

        self.bus.smpc = smpc;
        self.bus.vdp1 = vdp1;
        self.bus.low_wram = low_wram;
        self.bus.high_wram = high_wram;
        self.timing_mode = if is_pal { TimingMode::Pal } else { TimingMode::Ntsc };
        self.line = line.min(self.timing_mode.lines_per_frame() - 1);
        self.scsp_cycle_fraction = scsp_cycle_fraction;
        self.frame_counter = reader.frame_counter();

        self.sync_breakpoint_hooks();
        self.sound_output.change_video_format(self.timing_mode.frame_rate());

        log::info!("Loaded save state (format version {})", reader.header_version());

        Ok(())
    }
}
