//! VDP1 command processor
//!
//! Walks the command table in VDP1 RAM against a cycle budget that is replenished every line. The
//! walk pauses when the budget runs out and resumes from the same command on the next line.
//! Pixels are produced by the [`VideoInterface`] backend; this module only decodes commands,
//! tracks clipping and local coordinates, and maintains the registers and framebuffer swap state.

use crate::smpc::DotClock;
use crate::video::{AccessSize, Vdp1Primitive, VideoInterface};
use bincode::{Decode, Encode};
use saturn_common::boxedarray::BoxedByteArray;
use saturn_common::define_bit_enum;
use saturn_common::num::{GetBit, read_u16_be, read_u32_be, write_u16_be, write_u32_be};
use saturn_config::TimingMode;

pub const VRAM_LEN: usize = 512 * 1024;
const VRAM_MASK: u32 = (VRAM_LEN - 1) as u32;
const FRAMEBUFFER_LEN: u32 = 0x40000;
const FRAMEBUFFER_READ_MASK: u32 = FRAMEBUFFER_LEN - 1;

const COMMAND_LEN: u32 = 0x20;
/// Commands walked per frame at most. Also bounds the replay buffer.
pub const COMMAND_BUFFER_LEN: usize = 5000;

const END_BIT: u16 = 1 << 15;
const SKIP_BIT: u16 = 1 << 14;

// EDSR: current frame end / error
const EDSR_CEF: u16 = 1 << 1;
const MODR_VERSION: u16 = 0x1000;

const SPRITE_BASE_COST: i32 = 70;
const GOURAUD_COST: i32 = 232;
const POLYGON_BASE_COST: i32 = 16;
const SETUP_COST: i32 = 16;
const MAX_DRAW_COST: i32 = 1000;

define_bit_enum!(FrameBuffer, [Zero, One]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum Vdp1Status {
    #[default]
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JumpMode {
    Next,
    Assign,
    Call,
    Return,
}

impl JumpMode {
    fn from_control(control: u16) -> Self {
        match control.bits(12..=13) {
            0 => Self::Next,
            1 => Self::Assign,
            2 => Self::Call,
            _ => Self::Return,
        }
    }
}

/// One 32-byte command table entry.
///
/// Fields are raw until the command is prepared for drawing; after that the vertex coordinates
/// are sign-extended and include the local coordinate offset.
#[derive(Debug, Clone, Copy, PartialEq, Default, Encode, Decode)]
pub struct Vdp1Command {
    pub control: u16,
    pub link: u16,
    pub draw_mode: u16,
    pub color: u16,
    pub source_address: u16,
    pub size: u16,
    pub xa: i32,
    pub ya: i32,
    pub xb: i32,
    pub yb: i32,
    pub xc: i32,
    pub yc: i32,
    pub xd: i32,
    pub yd: i32,
    pub gouraud_table: u16,
    pub width: u32,
    pub height: u32,
    pub flip: u8,
    /// Per-vertex RGB offsets in `-0.5..=0.5`, all zero when Gouraud shading is off
    pub gouraud: [[f32; 3]; 4],
}

impl Vdp1Command {
    fn read(vram: &[u8], address: u32) -> Self {
        let word = |offset: u32| read_u16_be(vram, ((address + offset) & VRAM_MASK) as usize);
        let coordinate = |offset: u32| i32::from(word(offset));

        Self {
            control: word(0x00),
            link: word(0x02),
            draw_mode: word(0x04),
            color: word(0x06),
            source_address: word(0x08),
            size: word(0x0A),
            xa: coordinate(0x0C),
            ya: coordinate(0x0E),
            xb: coordinate(0x10),
            yb: coordinate(0x12),
            xc: coordinate(0x14),
            yc: coordinate(0x16),
            xd: coordinate(0x18),
            yd: coordinate(0x1A),
            gouraud_table: word(0x1C),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn command_select(&self) -> u16 {
        self.control & 0xF
    }

    #[must_use]
    pub fn zoom_point(&self) -> u16 {
        self.control.bits(8..=11)
    }

    #[must_use]
    pub fn color_mode(&self) -> u16 {
        self.draw_mode.bits(3..=5)
    }

    #[must_use]
    pub fn gouraud_enabled(&self) -> bool {
        self.draw_mode.bit(2)
    }

    // All-zero tables show up when games leave garbage in the command list
    fn is_blank(&self) -> bool {
        self.control == 0
            && self.link == 0
            && self.draw_mode == 0
            && self.color == 0
            && self.source_address == 0
            && self.size == 0
            && [self.xa, self.ya, self.xb, self.yb, self.xc, self.yc, self.xd, self.yd]
                .iter()
                .all(|&c| c == 0)
            && self.gouraud_table == 0
    }

    fn decode_size(&mut self) {
        self.width = u32::from(self.size.bits(8..=13)) * 8;
        self.height = u32::from(self.size & 0xFF);
    }

    fn has_zero_size(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    fn extend_vertices(&mut self, count: usize, local_x: i32, local_y: i32) {
        let vertices = [
            (&mut self.xa, &mut self.ya),
            (&mut self.xb, &mut self.yb),
            (&mut self.xc, &mut self.yc),
            (&mut self.xd, &mut self.yd),
        ];
        for (x, y) in vertices.into_iter().take(count) {
            *x = sign_extend_coordinate(*x) + local_x;
            *y = sign_extend_coordinate(*y) + local_y;
        }
    }

    fn area(&self) -> i64 {
        let points =
            [(self.xa, self.ya), (self.xb, self.yb), (self.xc, self.yc), (self.xd, self.yd)];
        let twice_area: i64 = (0..4)
            .map(|i| {
                let (x0, y0) = points[i];
                let (x1, y1) = points[(i + 1) % 4];
                i64::from(x0) * i64::from(y1) - i64::from(x1) * i64::from(y0)
            })
            .sum();
        twice_area.abs() / 2
    }

    // Bytes of VDP1 RAM this command reads texture or lookup table data from
    fn texture_range(&self) -> (u32, u32) {
        let start = u32::from(self.source_address) * 8;
        let pixels = self.width.max(1) * self.height.max(1);
        match self.color_mode() {
            0 => (start, start + pixels / 2),
            1 => {
                let lut = u32::from(self.color) * 8;
                (start.min(lut), (start + pixels / 2).max(lut + 0x20))
            }
            2..=4 => (start, start + pixels),
            5 => (start, start + pixels * 2),
            mode => {
                log::debug!("Unsupported VDP1 sprite color mode {mode}");
                (0, 0)
            }
        }
    }
}

/// 13-bit vertex fields: bits 12-14 all act as the sign, bit 11 is dropped for positive values.
#[must_use]
pub fn sign_extend_coordinate(raw: i32) -> i32 {
    let raw = raw as u16;
    let extended = if raw & 0x7000 != 0 { raw | 0xF000 } else { raw & !0xF800 };
    let value = i32::from(extended as i16);
    if !(-1024..=1023).contains(&value) {
        log::debug!("VDP1 coordinate out of range: {raw:04X} -> {value}");
    }
    value
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct Vdp1Clipping {
    pub system_x2: i32,
    pub system_y2: i32,
    pub user_x1: i32,
    pub user_y1: i32,
    pub user_x2: i32,
    pub user_y2: i32,
    pub local_x: i32,
    pub local_y: i32,
}

impl Default for Vdp1Clipping {
    fn default() -> Self {
        Self {
            system_x2: 0,
            system_y2: 0,
            user_x1: 0,
            user_y1: 0,
            user_x2: 1024,
            user_y2: 512,
            local_x: 0,
            local_y: 0,
        }
    }
}

/// EWDR / EWLR / EWRR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Vdp1EraseArea {
    pub color: u16,
    pub upper_left: u16,
    pub lower_right: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct Vdp1Registers {
    pub tvmr: u16,
    pub fbcr: u16,
    pub ptmr: u16,
    pub ewdr: u16,
    pub ewlr: u16,
    pub ewrr: u16,
    pub endr: u16,
    pub edsr: u16,
    pub lopr: u16,
    pub copr: u16,
    pub modr: u16,
    /// COPR value published once every issued command has been consumed
    pub latched_copr: u16,
    /// Address of the current command table entry
    pub address: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrawResult {
    Drawn,
    /// Drawn, but the walk waits for the next line
    ZeroSize,
    Rejected,
    /// Not drawn, and the walk waits for the next line
    Damaged,
}

#[derive(Debug, Clone, Encode, Decode)]
struct ReplayEntry {
    command: Vdp1Command,
    ignition_line: Option<u32>,
    completion_line: u32,
    texture_start: u32,
    texture_end: u32,
}

#[derive(Debug, Clone, Copy, Default, Encode, Decode)]
struct FrameChange {
    manual_erase: bool,
    manual_change: bool,
    one_cycle_mode: bool,
    vblank_erase: bool,
    swap_pending: bool,
    plot_trigger_line: Option<u32>,
    plot_trigger_done: bool,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Vdp1 {
    vram: BoxedByteArray<VRAM_LEN>,
    registers: Vdp1Registers,
    clipping: Vdp1Clipping,
    status: Vdp1Status,
    clock: i32,
    return_address: Option<u32>,
    replay: Vec<ReplayEntry>,
    // Cycles spent since the list was started from the top, and the line it started on
    walk_cycles: u32,
    walk_start_line: u32,
    dirty_start: u32,
    dirty_end: u32,
    list_drawn: bool,
    list_limit: u32,
    need_draw: bool,
    edsr_checked: bool,
    frame_change: FrameChange,
    current_frame: FrameBuffer,
    timing_mode: TimingMode,
    dot_clock: DotClock,
    line: u32,
    draw_end: bool,
}

impl Vdp1 {
    #[must_use]
    pub fn new(timing_mode: TimingMode) -> Self {
        Self {
            vram: BoxedByteArray::new(),
            registers: Vdp1Registers { modr: MODR_VERSION, ..Vdp1Registers::default() },
            clipping: Vdp1Clipping::default(),
            status: Vdp1Status::Idle,
            clock: 0,
            return_address: None,
            replay: Vec::new(),
            walk_cycles: 0,
            walk_start_line: 0,
            dirty_start: VRAM_LEN as u32,
            dirty_end: 0,
            list_drawn: false,
            list_limit: VRAM_LEN as u32,
            need_draw: false,
            edsr_checked: false,
            frame_change: FrameChange::default(),
            current_frame: FrameBuffer::default(),
            timing_mode,
            dot_clock: DotClock::default(),
            line: 0,
            draw_end: false,
        }
    }

    pub fn reset(&mut self, video: &mut dyn VideoInterface) {
        self.registers.ptmr = 0;
        self.registers.modr = MODR_VERSION;
        self.registers.tvmr = 0;
        self.registers.ewdr = 0;
        self.registers.ewlr = 0;
        self.registers.ewrr = 0;
        self.registers.endr = 0;
        self.status = Vdp1Status::Idle;
        self.need_draw = false;
        self.clock = 0;
        video.vdp1_reset();
    }

    #[must_use]
    pub fn status(&self) -> Vdp1Status {
        self.status
    }

    #[must_use]
    pub fn registers(&self) -> &Vdp1Registers {
        &self.registers
    }

    #[must_use]
    pub fn clipping(&self) -> &Vdp1Clipping {
        &self.clipping
    }

    #[must_use]
    pub fn current_frame(&self) -> FrameBuffer {
        self.current_frame
    }

    #[must_use]
    pub fn vram(&self) -> &[u8] {
        &*self.vram
    }

    /// Horizontal resolution and video standard determine the VDP1 clock budget per line.
    pub fn set_display_timing(&mut self, timing_mode: TimingMode, dot_clock: DotClock) {
        self.timing_mode = timing_mode;
        self.dot_clock = dot_clock;
    }

    #[must_use]
    pub fn cycles_per_line(&self) -> i32 {
        let clock = match (self.timing_mode, self.dot_clock) {
            (TimingMode::Ntsc, DotClock::Dots320) => 26_842_600.0,
            (TimingMode::Ntsc, DotClock::Dots352) => 28_636_400.0,
            (TimingMode::Pal, DotClock::Dots320) => 26_656_400.0,
            (TimingMode::Pal, DotClock::Dots352) => 28_437_500.0,
        };
        let lines = f64::from(self.timing_mode.lines_per_frame());
        (clock / (self.timing_mode.frame_rate() * lines)) as i32
    }

    /// Whether a command list finished since the last call. The SCU sprite draw end interrupt.
    pub fn take_draw_end(&mut self) -> bool {
        std::mem::take(&mut self.draw_end)
    }

    // VDP1 RAM

    #[must_use]
    pub fn read_ram_byte(&self, address: u32) -> u8 {
        self.vram[(address & VRAM_MASK) as usize]
    }

    #[must_use]
    pub fn read_ram_word(&self, address: u32) -> u16 {
        self.vram_word(address)
    }

    #[must_use]
    pub fn read_ram_longword(&self, address: u32) -> u32 {
        read_u32_be(&*self.vram, (address & VRAM_MASK & !3) as usize)
    }

    pub fn write_ram_byte(&mut self, address: u32, value: u8) {
        let address = address & VRAM_MASK;
        self.note_vram_write(address, 1);
        self.vram[address as usize] = value;
    }

    pub fn write_ram_word(&mut self, address: u32, value: u16) {
        let address = address & VRAM_MASK & !1;
        self.note_vram_write(address, 2);
        write_u16_be(&mut *self.vram, address as usize, value);
    }

    pub fn write_ram_longword(&mut self, address: u32, value: u32) {
        let address = address & VRAM_MASK & !3;
        self.note_vram_write(address, 4);
        write_u32_be(&mut *self.vram, address as usize, value);
    }

    fn vram_word(&self, address: u32) -> u16 {
        read_u16_be(&*self.vram, (address & VRAM_MASK & !1) as usize)
    }

    fn note_vram_write(&mut self, address: u32, len: u32) {
        // The list may have changed behind the walk
        if self.list_limit >= address {
            self.list_drawn = false;
        }

        if self.status == Vdp1Status::Running {
            self.clock -= len as i32;
        }

        self.dirty_start = self.dirty_start.min(address);
        self.dirty_end = self.dirty_end.max(address + len);
    }

    fn reset_dirty_range(&mut self) {
        self.dirty_start = VRAM_LEN as u32;
        self.dirty_end = 0;
    }

    // Framebuffer

    pub fn read_framebuffer(
        &mut self,
        size: AccessSize,
        address: u32,
        video: &mut dyn VideoInterface,
    ) -> u32 {
        video.vdp1_read_framebuffer(size, address & FRAMEBUFFER_READ_MASK)
    }

    pub fn write_framebuffer(
        &mut self,
        size: AccessSize,
        address: u32,
        value: u32,
        video: &mut dyn VideoInterface,
    ) {
        let address = address & VRAM_MASK;
        if address < FRAMEBUFFER_LEN {
            video.vdp1_write_framebuffer(size, address, value);
        }
    }

    // Registers

    pub fn read_register_word(&mut self, address: u32, video: &mut dyn VideoInterface) -> u16 {
        match address & 0xFF {
            0x10 => {
                if !self.edsr_checked {
                    video.vdp1_finish_draw();
                }
                self.edsr_checked = true;
                self.registers.edsr
            }
            0x12 => self.registers.lopr,
            0x14 => self.registers.copr,
            0x16 => {
                MODR_VERSION
                    | ((self.registers.ptmr & 2) << 7)
                    | ((self.registers.fbcr & 0x1E) << 3)
                    | (self.registers.tvmr & 0xF)
            }
            address => {
                log::debug!("VDP1 read from write-only register {address:02X}");
                0
            }
        }
    }

    pub fn write_register_word(
        &mut self,
        address: u32,
        value: u16,
        video: &mut dyn VideoInterface,
    ) {
        log::trace!("VDP1 register write {:02X}: {value:04X} (line {})", address & 0xFF, self.line);

        match address & 0xFF {
            0x00 => {
                // VBE only sticks in manual change mode
                let value = if self.registers.fbcr & 3 != 3 { value & !0x4 } else { value };
                self.registers.tvmr = value;
                self.update_tvmr_mode();
            }
            0x02 => {
                self.registers.fbcr = value;
                self.update_fbcr_mode();
            }
            0x04 => self.write_ptmr(value, video),
            0x06 => self.registers.ewdr = value,
            0x08 => self.registers.ewlr = value,
            0x0A => self.registers.ewrr = value,
            0x0C => {
                self.registers.endr = value;
                self.status = Vdp1Status::Idle;
            }
            address => log::debug!("VDP1 write to read-only register {address:02X}: {value:04X}"),
        }
    }

    fn update_tvmr_mode(&mut self) {
        self.frame_change.vblank_erase =
            self.registers.fbcr & 3 == 3 && self.registers.tvmr.bit(3);
    }

    fn update_fbcr_mode(&mut self) {
        let mode = self.registers.fbcr & 3;
        let frame_change = &mut self.frame_change;
        frame_change.manual_change = mode == 3;
        frame_change.one_cycle_mode = false;
        frame_change.vblank_erase = false;

        if self.registers.tvmr.bit(3) {
            frame_change.vblank_erase = true;
        } else {
            // A manual erase request is held until the next frame change
            frame_change.one_cycle_mode = mode <= 1;
            frame_change.manual_erase |= mode == 2;
        }
    }

    fn write_ptmr(&mut self, value: u16, video: &mut dyn VideoInterface) {
        // Both bits set behaves like automatic draw
        let value = if value & 3 == 3 { 2 } else { value };
        self.registers.ptmr = value;
        self.frame_change.plot_trigger_line = None;
        self.frame_change.plot_trigger_done = false;

        if value == 1 {
            self.frame_change.plot_trigger_line = Some(self.line);
            self.abort();
            self.clock = 0;
            self.need_draw = true;
            self.try_draw(video);
            self.frame_change.plot_trigger_done = true;
        }
    }

    fn erase_area(&self) -> Vdp1EraseArea {
        Vdp1EraseArea {
            color: self.registers.ewdr,
            upper_left: self.registers.ewlr,
            lower_right: self.registers.ewrr,
        }
    }

    /// Discards an in-flight command list.
    fn abort(&mut self) {
        if self.status == Vdp1Status::Running {
            self.status = Vdp1Status::Idle;
            self.clock = 0;
        }
    }

    // Line events

    pub fn hblank_in(&mut self, line: u32, video: &mut dyn VideoInterface) {
        self.line = line;

        if !self.replay.is_empty() {
            self.replay_issued_commands(video);
        }

        if line == 0 {
            self.start_field(video);
        }

        let frame_change = &mut self.frame_change;
        if self.registers.ptmr == 1
            && frame_change.plot_trigger_line == Some(line)
            && !frame_change.plot_trigger_done
        {
            self.clock = 0;
            self.need_draw = true;
            frame_change.plot_trigger_done = true;
        }
    }

    pub fn hblank_out(&mut self, video: &mut dyn VideoInterface) {
        self.clock = self.clock.saturating_add(self.cycles_per_line());
        self.try_draw(video);
    }

    pub fn vblank_out(&mut self, video: &mut dyn VideoInterface) {
        if self.frame_change.vblank_erase {
            self.list_drawn = false;
            video.vdp1_erase_write(self.current_frame, self.erase_area());
        }
    }

    // Entries due by the next line are handed to the renderer; re-fetched first if their texture
    // was written after they were issued. A new field takes everything still outstanding.
    fn replay_issued_commands(&mut self, video: &mut dyn VideoInterface) {
        let next_line = self.line + 1;
        let new_field = self.line == 0;
        for entry in &mut self.replay {
            if !entry.ignition_line.is_some_and(|line| new_field || line <= next_line) {
                continue;
            }

            let overlaps =
                entry.texture_start < self.dirty_end && entry.texture_end > self.dirty_start;
            if overlaps && !self.edsr_checked {
                video.vdp1_regenerate_command(&entry.command);
            }
            entry.ignition_line = None;
        }

        if self.replay.last().is_some_and(|entry| entry.ignition_line.is_none()) {
            self.reset_dirty_range();
            video.vdp1_compose();
            self.registers.copr = self.registers.latched_copr;
            self.replay.clear();
        }
    }

    fn start_field(&mut self, video: &mut dyn VideoInterface) {
        let frame_change = &mut self.frame_change;
        frame_change.swap_pending |= frame_change.manual_change || frame_change.one_cycle_mode;

        if frame_change.swap_pending {
            if frame_change.manual_erase || frame_change.one_cycle_mode {
                frame_change.manual_erase = false;
                video.vdp1_erase_write(self.current_frame, self.erase_area());
            }

            video.vdp1_frame_change();
            self.list_drawn = false;
            self.current_frame = FrameBuffer::from_bit(!self.current_frame.to_bit());
            self.registers.lopr = self.registers.copr;
            self.retire_list_status();
            self.frame_change.swap_pending = false;
            log::trace!("VDP1 framebuffer swap, EDSR {:02X}", self.registers.edsr);

            if self.registers.ptmr == 2 {
                self.abort();
                self.clock = 0;
                self.need_draw = true;
            }
        } else if self.status == Vdp1Status::Running {
            self.need_draw = true;
        }

        if self.registers.ptmr == 1 {
            self.frame_change.plot_trigger_done = false;
        }
        self.frame_change.manual_change = false;
    }

    // Command list walk

    fn try_draw(&mut self, video: &mut dyn VideoInterface) {
        if self.need_draw {
            self.need_draw = self.draw(video);
        }
    }

    // Returns whether the list is still being walked
    fn draw(&mut self, video: &mut dyn VideoInterface) -> bool {
        if self.status == Vdp1Status::Idle {
            self.retire_list_status();
            self.registers.address = 0;
        }

        video.vdp1_draw_start();
        self.draw_commands(video);

        if self.status == Vdp1Status::Idle {
            log::trace!("VDP1 draw end at line {}", self.line);
            self.registers.edsr |= EDSR_CEF;
            self.draw_end = true;
            false
        } else {
            true
        }
    }

    // Previous list's end flag moves to BEF and the command pointers restart
    fn retire_list_status(&mut self) {
        self.registers.edsr >>= 1;
        self.registers.copr = 0;
        self.registers.latched_copr = 0;
    }

    // Only a walk from the top of the table forgets the issued commands; a resumed walk keeps
    // adding to them
    fn begin_walk(&mut self) {
        self.return_address = None;
        self.walk_cycles = 0;
        self.walk_start_line = self.line;
        self.edsr_checked = false;
        self.replay.clear();
        self.reset_dirty_range();
    }

    fn draw_commands(&mut self, video: &mut dyn VideoInterface) {
        if self.list_drawn {
            return;
        }

        self.list_limit = 0;
        if self.status == Vdp1Status::Idle {
            self.begin_walk();
        }
        self.status = Vdp1Status::Running;

        if self.registers.address > VRAM_MASK {
            log::debug!("VDP1 command address out of range: {:08X}", self.registers.address);
            self.status = Vdp1Status::Idle;
            return;
        }

        let mut command = self.vram_word(self.registers.address);
        let mut walked = 0;

        while command & END_BIT == 0 && walked < COMMAND_BUFFER_LEN {
            let address = self.registers.address;
            self.registers.copr = ((address & VRAM_MASK) >> 3) as u16;

            let cost = if command & SKIP_BIT == 0 {
                if self.clock <= 0 {
                    // Out of budget; continue from this command next line
                    return;
                }

                match self.execute_command(command, video) {
                    Some(cost) => cost,
                    None => {
                        log::warn!("Invalid VDP1 command {command:04X} at {address:05X}");
                        self.end_list_with_error(address);
                        return;
                    }
                }
            } else {
                SETUP_COST
            };
            self.clock -= cost;
            self.walk_cycles = self.walk_cycles.saturating_add(cost.max(0) as u32);

            if self.registers.edsr & EDSR_CEF != 0 {
                self.end_list_with_error(address);
                return;
            }

            self.registers.address = match JumpMode::from_control(command) {
                JumpMode::Next => address + COMMAND_LEN,
                JumpMode::Assign => u32::from(self.vram_word(address + 2)) * 8,
                JumpMode::Call => {
                    // Only one level of nesting; a nested call keeps the outer return address
                    if self.return_address.is_none() {
                        self.return_address = Some(address + COMMAND_LEN);
                    }
                    u32::from(self.vram_word(address + 2)) * 8
                }
                JumpMode::Return => {
                    self.return_address.take().unwrap_or(address + COMMAND_LEN)
                }
            };

            command = self.vram_word(self.registers.address);
            self.list_limit = self.registers.address;
            self.registers.latched_copr = ((self.registers.address & VRAM_MASK) >> 3) as u16;
            walked += 1;
        }

        if command & END_BIT != 0 {
            self.status = Vdp1Status::Idle;
        }
        self.list_drawn = true;
        self.list_limit = self.registers.address;
    }

    fn end_list_with_error(&mut self, address: u32) {
        self.registers.edsr |= EDSR_CEF;
        self.status = Vdp1Status::Idle;
        self.registers.copr = ((address & VRAM_MASK) >> 3) as u16;
        self.list_drawn = true;
        self.list_limit = address;
    }

    // Returns the command's cycle cost, or None for an invalid command
    fn execute_command(&mut self, command: u16, video: &mut dyn VideoInterface) -> Option<i32> {
        let address = self.registers.address;
        let mut cmd = Vdp1Command::read(&*self.vram, address);

        let (primitive, result, cost) = match command & 0xF {
            0x0 => {
                let (result, cost) = self.prepare_normal_sprite(&mut cmd);
                (Vdp1Primitive::NormalSprite, result, cost)
            }
            0x1 => {
                let (result, cost) = self.prepare_scaled_sprite(&mut cmd);
                (Vdp1Primitive::ScaledSprite, result, cost)
            }
            // 3 is undocumented but used in place of 2
            0x2 | 0x3 => {
                let (result, cost) = self.prepare_distorted_sprite(&mut cmd);
                (Vdp1Primitive::DistortedSprite, result, cost)
            }
            0x4 => (Vdp1Primitive::Polygon, DrawResult::Drawn, self.prepare_polygon(&mut cmd)),
            0x5 | 0x7 => {
                self.prepare_polyline(&mut cmd, 4);
                (Vdp1Primitive::Polyline, DrawResult::Drawn, 0)
            }
            0x6 => {
                self.prepare_polyline(&mut cmd, 2);
                (cmd.xc, cmd.yc, cmd.xd, cmd.yd) = (cmd.xb, cmd.yb, cmd.xa, cmd.ya);
                (Vdp1Primitive::Line, DrawResult::Drawn, 0)
            }
            0x8 | 0xB => {
                self.clipping.user_x1 = cmd.xa;
                self.clipping.user_y1 = cmd.ya;
                self.clipping.user_x2 = cmd.xc;
                self.clipping.user_y2 = cmd.yc;
                video.vdp1_clipping_changed(&self.clipping);
                return Some(SETUP_COST);
            }
            0x9 => {
                self.clipping.system_x2 = cmd.xc;
                self.clipping.system_y2 = cmd.yc;
                video.vdp1_clipping_changed(&self.clipping);
                return Some(SETUP_COST);
            }
            0xA => {
                self.clipping.local_x = i32::from(cmd.xa as u16 as i16);
                self.clipping.local_y = i32::from(cmd.ya as u16 as i16);
                video.vdp1_clipping_changed(&self.clipping);
                return Some(SETUP_COST);
            }
            _ => return None,
        };

        if matches!(result, DrawResult::Drawn | DrawResult::ZeroSize) {
            video.vdp1_draw(primitive, &cmd, &*self.vram, &self.clipping);
        }

        if matches!(result, DrawResult::ZeroSize | DrawResult::Damaged) {
            self.clock = 0;
        }

        if result == DrawResult::Drawn && self.replay.len() < COMMAND_BUFFER_LEN {
            let cycles_per_line = self.cycles_per_line().max(1) as u32;
            let last_line = self.timing_mode.lines_per_frame() - 1;
            let start_line = self.walk_start_line;
            let line_after = |cycles: u32| (start_line + cycles / cycles_per_line).min(last_line);

            let ignition_line = line_after(self.walk_cycles);
            let completion_line = line_after(self.walk_cycles.saturating_add(cost.max(0) as u32));
            let (texture_start, texture_end) = cmd.texture_range();
            self.replay.push(ReplayEntry {
                command: cmd,
                ignition_line: Some(ignition_line),
                completion_line,
                texture_start,
                texture_end,
            });
        }

        Some(cost)
    }

    fn load_gouraud(&self, cmd: &mut Vdp1Command) -> bool {
        if !cmd.gouraud_enabled() {
            cmd.gouraud = [[0.0; 3]; 4];
            return false;
        }

        let table = u32::from(cmd.gouraud_table) << 3;
        for (i, vertex) in cmd.gouraud.iter_mut().enumerate() {
            let color = self.vram_word(table + 2 * i as u32);
            *vertex = [0, 5, 10].map(|shift| f32::from((color >> shift) & 0x1F) / 31.0 - 0.5);
        }
        true
    }

    fn prepare_normal_sprite(&mut self, cmd: &mut Vdp1Command) -> (DrawResult, i32) {
        if cmd.is_blank() {
            return (DrawResult::Rejected, SPRITE_BASE_COST);
        }

        if cmd.size.bit(15) || cmd.color_mode() > 5 {
            self.registers.edsr |= EDSR_CEF;
            return (DrawResult::Rejected, SPRITE_BASE_COST);
        }

        cmd.decode_size();
        let (result, mut cost) = if cmd.has_zero_size() {
            (DrawResult::ZeroSize, SPRITE_BASE_COST)
        } else {
            (DrawResult::Drawn, 0)
        };
        cmd.flip = cmd.control.bits(4..=5) as u8;

        cmd.extend_vertices(1, self.clipping.local_x, self.clipping.local_y);
        let width = cmd.width.max(1) as i32;
        let height = cmd.height.max(1) as i32;
        (cmd.xb, cmd.yb) = (cmd.xa + width, cmd.ya);
        (cmd.xc, cmd.yc) = (cmd.xa + width, cmd.ya + height);
        (cmd.xd, cmd.yd) = (cmd.xa, cmd.ya + height);

        cost += sprite_cost(cmd.area());
        if self.load_gouraud(cmd) {
            cost += GOURAUD_COST;
        }

        (result, cost)
    }

    fn prepare_scaled_sprite(&mut self, cmd: &mut Vdp1Command) -> (DrawResult, i32) {
        if cmd.is_blank() {
            return (DrawResult::Rejected, SPRITE_BASE_COST);
        }

        cmd.decode_size();
        let (result, mut cost) = if cmd.has_zero_size() {
            (DrawResult::ZeroSize, SPRITE_BASE_COST)
        } else {
            (DrawResult::Drawn, 0)
        };
        cmd.flip = cmd.control.bits(4..=5) as u8;

        // Vertex D is unused
        cmd.extend_vertices(3, 0, 0);

        let zoom_point = cmd.zoom_point();
        let (width, height) = match zoom_point {
            0x0 => (i32::from((cmd.xc - cmd.xa) as i16), i32::from((cmd.yc - cmd.ya) as i16)),
            0x5..=0x7 | 0x9..=0xB | 0xD..=0xF => (cmd.xb, cmd.yb),
            _ => (0, 0),
        };

        // Horizontal then vertical anchor: left/center/right, upper/center/lower
        let x = match zoom_point & 3 {
            2 => cmd.xa - width / 2,
            3 => cmd.xa - width,
            _ => cmd.xa,
        };
        let y = match zoom_point >> 2 {
            2 => cmd.ya - height / 2,
            3 => cmd.ya - height,
            _ => cmd.ya,
        };

        let (left, top) = (x + self.clipping.local_x, y + self.clipping.local_y);
        (cmd.xa, cmd.ya) = (left, top);
        (cmd.xb, cmd.yb) = (left + width, top);
        (cmd.xc, cmd.yc) = (left + width, top + height);
        (cmd.xd, cmd.yd) = (left, top + height);

        cost += sprite_cost(cmd.area());
        if self.load_gouraud(cmd) {
            cost += GOURAUD_COST;
        }

        (result, cost)
    }

    fn prepare_distorted_sprite(&mut self, cmd: &mut Vdp1Command) -> (DrawResult, i32) {
        if cmd.is_blank() {
            return (DrawResult::Damaged, SPRITE_BASE_COST);
        }

        cmd.decode_size();
        let (result, mut cost) = if cmd.has_zero_size() {
            (DrawResult::ZeroSize, SPRITE_BASE_COST)
        } else {
            (DrawResult::Drawn, 0)
        };
        cmd.flip = cmd.control.bits(4..=5) as u8;

        cmd.extend_vertices(4, self.clipping.local_x, self.clipping.local_y);

        cost += sprite_cost(cmd.area() * 3);
        if self.load_gouraud(cmd) {
            cost += GOURAUD_COST;
        }

        (result, cost)
    }

    fn prepare_polygon(&mut self, cmd: &mut Vdp1Command) -> i32 {
        cmd.extend_vertices(4, self.clipping.local_x, self.clipping.local_y);

        let width = i64::from(((cmd.xa - cmd.xb).abs() + (cmd.xd - cmd.xc).abs()) / 2);
        let height = i64::from(((cmd.ya - cmd.yd).abs() + (cmd.yb - cmd.yc).abs()) / 2);
        let mut cost = (i64::from(POLYGON_BASE_COST) + width * height + width * 2)
            .min(i64::from(MAX_DRAW_COST)) as i32;

        if self.load_gouraud(cmd) {
            cost += GOURAUD_COST;
        }
        (cmd.width, cmd.height, cmd.flip) = (1, 1, 0);

        cost
    }

    // Lines are not charged against the budget
    fn prepare_polyline(&mut self, cmd: &mut Vdp1Command, vertices: usize) {
        cmd.extend_vertices(vertices, self.clipping.local_x, self.clipping.local_y);
        self.load_gouraud(cmd);
        (cmd.width, cmd.height, cmd.flip) = (1, 1, 0);
    }
}

fn sprite_cost(area: i64) -> i32 {
    (i64::from(SPRITE_BASE_COST) + area).min(i64::from(MAX_DRAW_COST)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::CountingVideo;
    use test_log::test;

    const POLYGON: u16 = 0x0004;
    const END: u16 = 0x8000;
    const CALL: u16 = 0x2000;
    const RETURN: u16 = 0x3000;

    fn write_command(vdp1: &mut Vdp1, address: u32, control: u16, link: u16) {
        vdp1.write_ram_word(address, control);
        vdp1.write_ram_word(address + 2, link);
    }

    fn write_polygon(vdp1: &mut Vdp1, address: u32, vertices: [(u16, u16); 4]) {
        write_command(vdp1, address, POLYGON, 0);
        for (i, (x, y)) in vertices.into_iter().enumerate() {
            vdp1.write_ram_word(address + 0x0C + 4 * i as u32, x);
            vdp1.write_ram_word(address + 0x0E + 4 * i as u32, y);
        }
    }

    fn plot_trigger(vdp1: &mut Vdp1, video: &mut CountingVideo) {
        vdp1.write_register_word(0x04, 1, video);
    }

    #[test]
    fn next_commands_until_end() {
        let mut vdp1 = Vdp1::new(TimingMode::Ntsc);
        let mut video = CountingVideo::recording();
        for i in 0..5 {
            write_command(&mut vdp1, i * COMMAND_LEN, POLYGON, 0);
        }
        write_command(&mut vdp1, 5 * COMMAND_LEN, END, 0);

        // Plot trigger starts the list with an empty budget
        plot_trigger(&mut vdp1, &mut video);
        assert_eq!(vdp1.status(), Vdp1Status::Running);
        assert_eq!(video.vdp1_draws, 0);

        vdp1.hblank_out(&mut video);
        assert_eq!(video.vdp1_draws, 5);
        assert_eq!(video.primitives, vec![Vdp1Primitive::Polygon; 5]);
        assert_eq!(vdp1.status(), Vdp1Status::Idle);
        assert!(vdp1.take_draw_end());
        assert_ne!(vdp1.registers().edsr & EDSR_CEF, 0);
        assert_eq!(vdp1.registers().copr, (4 * COMMAND_LEN >> 3) as u16);
    }

    #[test]
    fn call_returns_to_following_entry() {
        let mut vdp1 = Vdp1::new(TimingMode::Ntsc);
        let mut video = CountingVideo::new();

        write_command(&mut vdp1, 0x000, POLYGON, 0);
        write_command(&mut vdp1, 0x020, CALL | POLYGON, 0x200 / 8);
        write_command(&mut vdp1, 0x040, POLYGON, 0);
        write_command(&mut vdp1, 0x060, END, 0);
        write_command(&mut vdp1, 0x200, POLYGON, 0);
        write_command(&mut vdp1, 0x220, RETURN | POLYGON, 0);

        plot_trigger(&mut vdp1, &mut video);
        vdp1.hblank_out(&mut video);

        assert_eq!(video.vdp1_draws, 5);
        assert_eq!(vdp1.status(), Vdp1Status::Idle);
        assert_eq!(vdp1.registers().address, 0x060);
    }

    #[test]
    fn return_without_call_falls_through() {
        let mut vdp1 = Vdp1::new(TimingMode::Ntsc);
        let mut video = CountingVideo::new();

        write_command(&mut vdp1, 0x000, RETURN | POLYGON, 0);
        write_command(&mut vdp1, 0x020, END, 0);

        plot_trigger(&mut vdp1, &mut video);
        vdp1.hblank_out(&mut video);

        assert_eq!(video.vdp1_draws, 1);
        assert_eq!(vdp1.registers().address, 0x020);
    }

    #[test]
    fn budget_pauses_and_resumes_walk() {
        let mut vdp1 = Vdp1::new(TimingMode::Ntsc);
        let mut video = CountingVideo::new();
        assert_eq!(vdp1.cycles_per_line(), 1702);

        // 100x100 polygons cost the maximum 1000 cycles each
        let square = [(0, 0), (100, 0), (100, 100), (0, 100)];
        for i in 0..10 {
            write_polygon(&mut vdp1, i * COMMAND_LEN, square);
        }
        write_command(&mut vdp1, 10 * COMMAND_LEN, END, 0);

        plot_trigger(&mut vdp1, &mut video);
        vdp1.hblank_out(&mut video);
        assert_eq!(video.vdp1_draws, 2);
        assert_eq!(vdp1.status(), Vdp1Status::Running);
        assert_eq!(vdp1.registers().address, 2 * COMMAND_LEN);

        vdp1.hblank_out(&mut video);
        assert_eq!(video.vdp1_draws, 4);

        for _ in 0..10 {
            vdp1.hblank_out(&mut video);
        }
        assert_eq!(video.vdp1_draws, 10);
        assert_eq!(vdp1.status(), Vdp1Status::Idle);
    }

    #[test]
    fn plot_trigger_restarts_from_top() {
        let mut vdp1 = Vdp1::new(TimingMode::Ntsc);
        let mut video = CountingVideo::new();

        let square = [(0, 0), (100, 0), (100, 100), (0, 100)];
        for i in 0..10 {
            write_polygon(&mut vdp1, i * COMMAND_LEN, square);
        }
        write_command(&mut vdp1, 10 * COMMAND_LEN, END, 0);

        plot_trigger(&mut vdp1, &mut video);
        vdp1.hblank_out(&mut video);
        assert_eq!(vdp1.registers().address, 2 * COMMAND_LEN);

        plot_trigger(&mut vdp1, &mut video);
        assert_eq!(vdp1.registers().address, 0);
        assert_eq!(vdp1.status(), Vdp1Status::Running);
    }

    #[test]
    fn invalid_command_sets_error_and_stops() {
        let mut vdp1 = Vdp1::new(TimingMode::Ntsc);
        let mut video = CountingVideo::new();

        write_command(&mut vdp1, 0x000, POLYGON, 0);
        write_command(&mut vdp1, 0x020, 0x000C, 0);
        write_command(&mut vdp1, 0x040, POLYGON, 0);
        write_command(&mut vdp1, 0x060, END, 0);

        plot_trigger(&mut vdp1, &mut video);
        vdp1.hblank_out(&mut video);

        assert_eq!(video.vdp1_draws, 1);
        assert_eq!(vdp1.status(), Vdp1Status::Idle);
        assert_ne!(vdp1.registers().edsr & EDSR_CEF, 0);
        assert_eq!(vdp1.registers().copr, (0x020 >> 3) as u16);
    }

    #[test]
    fn oversized_sprite_is_rejected() {
        let mut vdp1 = Vdp1::new(TimingMode::Ntsc);
        let mut video = CountingVideo::new();

        write_command(&mut vdp1, 0x000, 0x0000, 0);
        vdp1.write_ram_word(0x00A, 0x8101);
        write_command(&mut vdp1, 0x020, END, 0);

        plot_trigger(&mut vdp1, &mut video);
        vdp1.hblank_out(&mut video);

        assert_eq!(video.vdp1_draws, 0);
        assert_ne!(vdp1.registers().edsr & EDSR_CEF, 0);
    }

    #[test]
    fn local_coordinates_offset_later_commands() {
        struct LastCommand(Option<Vdp1Command>);

        impl VideoInterface for LastCommand {
            fn name(&self) -> &'static str {
                "LastCommand"
            }

            fn vdp1_draw(
                &mut self,
                _primitive: Vdp1Primitive,
                command: &Vdp1Command,
                _vram: &[u8],
                _clipping: &Vdp1Clipping,
            ) {
                self.0 = Some(*command);
            }
        }

        let mut vdp1 = Vdp1::new(TimingMode::Ntsc);
        let mut video = LastCommand(None);

        write_command(&mut vdp1, 0x000, 0x000A, 0);
        vdp1.write_ram_word(0x00C, 16);
        vdp1.write_ram_word(0x00E, 0xFFF8);
        write_polygon(&mut vdp1, 0x020, [(10, 10), (0x1FFF, 0), (0, 0), (0, 0)]);
        write_command(&mut vdp1, 0x040, END, 0);

        vdp1.write_register_word(0x04, 1, &mut video);
        vdp1.hblank_out(&mut video);

        assert_eq!((vdp1.clipping().local_x, vdp1.clipping().local_y), (16, -8));
        let command = video.0.expect("polygon should have been drawn");
        assert_eq!((command.xa, command.ya), (26, 2));
        assert_eq!((command.xb, command.yb), (15, -8));
    }

    const TEXTURE_ADDRESS: u32 = 0x800;

    // 100x100 polygons reading 16bpp texture data at TEXTURE_ADDRESS, 1000 cycles each
    fn write_textured_list(vdp1: &mut Vdp1, count: u32) {
        let square = [(0, 0), (100, 0), (100, 100), (0, 100)];
        for i in 0..count {
            let address = i * COMMAND_LEN;
            write_polygon(vdp1, address, square);
            vdp1.write_ram_word(address + 0x04, 5 << 3);
            vdp1.write_ram_word(address + 0x08, (TEXTURE_ADDRESS / 8) as u16);
        }
        write_command(vdp1, count * COMMAND_LEN, END, 0);
    }

    // Runs lines with a CPU write to `texture_write` after each one
    fn run_lines(vdp1: &mut Vdp1, video: &mut CountingVideo, lines: u32, texture_write: u32) {
        for line in 0..lines {
            vdp1.hblank_in(line, video);
            vdp1.hblank_out(video);
            vdp1.write_ram_word(texture_write, line as u16);
        }
    }

    #[test]
    fn texture_write_regenerates_issued_commands() {
        let mut vdp1 = Vdp1::new(TimingMode::Ntsc);
        let mut video = CountingVideo::new();
        write_textured_list(&mut vdp1, 6);

        plot_trigger(&mut vdp1, &mut video);
        run_lines(&mut vdp1, &mut video, 40, TEXTURE_ADDRESS);

        assert_eq!(vdp1.status(), Vdp1Status::Idle);
        assert_eq!(video.vdp1_draws, 6);
        assert_eq!(video.vdp1_regenerates, 6);
        assert_eq!(video.vdp1_composes, 3);
        assert!(vdp1.replay.is_empty());
    }

    #[test]
    fn unrelated_write_does_not_regenerate() {
        let mut vdp1 = Vdp1::new(TimingMode::Ntsc);
        let mut video = CountingVideo::new();
        write_textured_list(&mut vdp1, 6);

        plot_trigger(&mut vdp1, &mut video);
        run_lines(&mut vdp1, &mut video, 40, 0x4000);

        assert_eq!(video.vdp1_regenerates, 0);
        assert_eq!(video.vdp1_composes, 3);
    }

    #[test]
    fn edsr_read_suppresses_regeneration() {
        let mut vdp1 = Vdp1::new(TimingMode::Ntsc);
        let mut video = CountingVideo::new();
        write_textured_list(&mut vdp1, 6);

        plot_trigger(&mut vdp1, &mut video);
        vdp1.read_register_word(0x10, &mut video);
        run_lines(&mut vdp1, &mut video, 40, TEXTURE_ADDRESS);

        assert_eq!(video.vdp1_regenerates, 0);
        assert!(video.vdp1_composes > 0);
    }

    #[test]
    fn later_commands_ignite_on_later_lines() {
        let mut vdp1 = Vdp1::new(TimingMode::Ntsc);
        let mut video = CountingVideo::new();
        write_textured_list(&mut vdp1, 6);

        plot_trigger(&mut vdp1, &mut video);
        vdp1.hblank_in(0, &mut video);
        vdp1.hblank_out(&mut video);
        vdp1.hblank_in(1, &mut video);
        vdp1.hblank_out(&mut video);

        // Issued 2000 and 3000 cycles into the walk at 1702 cycles per line
        let lines: Vec<_> = vdp1.replay.iter().map(|entry| entry.ignition_line).collect();
        assert_eq!(lines, vec![Some(1), Some(1)]);
        assert_eq!(vdp1.replay[1].completion_line, 2);
    }

    #[test]
    fn compose_publishes_latched_copr() {
        let mut vdp1 = Vdp1::new(TimingMode::Ntsc);
        let mut video = CountingVideo::new();
        write_textured_list(&mut vdp1, 2);

        plot_trigger(&mut vdp1, &mut video);
        vdp1.hblank_in(0, &mut video);
        vdp1.hblank_out(&mut video);
        assert_eq!(vdp1.status(), Vdp1Status::Idle);
        assert_eq!(vdp1.registers().copr, (COMMAND_LEN >> 3) as u16);
        assert_eq!(vdp1.registers().latched_copr, (2 * COMMAND_LEN >> 3) as u16);

        vdp1.hblank_in(1, &mut video);
        assert_eq!(video.vdp1_composes, 1);
        assert_eq!(vdp1.registers().copr, vdp1.registers().latched_copr);
    }

    #[test]
    fn coordinate_sign_extension() {
        assert_eq!(sign_extend_coordinate(0x03FF), 1023);
        assert_eq!(sign_extend_coordinate(0x1FFF), -1);
        assert_eq!(sign_extend_coordinate(0x1C00), -1024);
        assert_eq!(sign_extend_coordinate(0x0800), 0);
    }

    #[test]
    fn one_cycle_mode_swaps_every_field() {
        let mut vdp1 = Vdp1::new(TimingMode::Ntsc);
        let mut video = CountingVideo::new();

        vdp1.write_register_word(0x02, 0x0000, &mut video);
        assert_eq!(vdp1.current_frame(), FrameBuffer::Zero);

        vdp1.hblank_in(0, &mut video);
        assert_eq!(vdp1.current_frame(), FrameBuffer::One);
        vdp1.hblank_in(1, &mut video);
        assert_eq!(vdp1.current_frame(), FrameBuffer::One);
        vdp1.hblank_in(0, &mut video);
        assert_eq!(vdp1.current_frame(), FrameBuffer::Zero);
    }

    #[test]
    fn modr_reflects_mode_registers() {
        let mut vdp1 = Vdp1::new(TimingMode::Ntsc);
        let mut video = CountingVideo::new();

        vdp1.write_register_word(0x02, 0x0003, &mut video);
        vdp1.write_register_word(0x00, 0x000C, &mut video);
        vdp1.write_register_word(0x04, 0x0002, &mut video);

        assert_eq!(vdp1.read_register_word(0x16, &mut video), 0x1000 | 0x0100 | 0x0010 | 0x000C);
    }
}
