//! Host video backend interface
//!
//! The core never produces pixels itself. VDP1 hands fully decoded commands to the backend, and
//! CPU access to the VDP1 framebuffer goes through it.

use crate::vdp1::{FrameBuffer, Vdp1Clipping, Vdp1Command, Vdp1EraseArea};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vdp1Primitive {
    NormalSprite,
    ScaledSprite,
    DistortedSprite,
    Polygon,
    Polyline,
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessSize {
    Byte,
    Word,
    Longword,
}

pub trait VideoInterface {
    fn name(&self) -> &'static str;

    fn resize(&mut self, _width: u32, _height: u32, _fullscreen: bool) {}

    /// Size of the output surface in pixels.
    fn output_size(&self) -> (u32, u32) {
        (0, 0)
    }

    fn set_setting(&mut self, _key: &str, _value: i32) {}

    fn vdp1_reset(&mut self) {}

    /// Called before a command list walk begins or resumes.
    fn vdp1_draw_start(&mut self) {}

    /// `command` has its coordinates sign-extended and offset by the local coordinates.
    fn vdp1_draw(
        &mut self,
        primitive: Vdp1Primitive,
        command: &Vdp1Command,
        vram: &[u8],
        clipping: &Vdp1Clipping,
    );

    fn vdp1_clipping_changed(&mut self, _clipping: &Vdp1Clipping) {}

    /// A command whose texture data was written after it was issued. The backend should re-fetch
    /// it before rasterizing.
    fn vdp1_regenerate_command(&mut self, _command: &Vdp1Command) {}

    fn vdp1_compose(&mut self) {}

    /// The CPU read EDSR; any deferred drawing must be completed.
    fn vdp1_finish_draw(&mut self) {}

    fn vdp1_erase_write(&mut self, _framebuffer: FrameBuffer, _area: Vdp1EraseArea) {}

    fn vdp1_frame_change(&mut self) {}

    fn vdp1_read_framebuffer(&mut self, _size: AccessSize, _address: u32) -> u32 {
        0
    }

    fn vdp1_write_framebuffer(&mut self, _size: AccessSize, _address: u32, _value: u32) {}

    fn vdp2_draw_start(&mut self) {}

    fn vdp2_draw_end(&mut self) {}
}

/// Discards all drawing. Framebuffer reads return 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullVideo;

impl VideoInterface for NullVideo {
    fn name(&self) -> &'static str {
        "Null"
    }

    fn vdp1_draw(
        &mut self,
        _primitive: Vdp1Primitive,
        _command: &Vdp1Command,
        _vram: &[u8],
        _clipping: &Vdp1Clipping,
    ) {
    }
}

/// Counts frames and VDP1 backend calls without rendering anything.
#[derive(Debug, Clone, Default)]
pub struct CountingVideo {
    pub frames: u64,
    pub vdp1_draws: u64,
    pub vdp1_regenerates: u64,
    pub vdp1_composes: u64,
    pub primitives: Vec<Vdp1Primitive>,
    record_primitives: bool,
}

impl CountingVideo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also keep the primitive of every draw, in order.
    #[must_use]
    pub fn recording() -> Self {
        Self { record_primitives: true, ..Self::default() }
    }
}

impl VideoInterface for CountingVideo {
    fn name(&self) -> &'static str {
        "Counting"
    }

    fn vdp1_draw(
        &mut self,
        primitive: Vdp1Primitive,
        _command: &Vdp1Command,
        _vram: &[u8],
        _clipping: &Vdp1Clipping,
    ) {
        self.vdp1_draws += 1;
        if self.record_primitives {
            self.primitives.push(primitive);
        }
    }

    fn vdp1_regenerate_command(&mut self, _command: &Vdp1Command) {
        self.vdp1_regenerates += 1;
    }

    fn vdp1_compose(&mut self) {
        self.vdp1_composes += 1;
    }

    fn vdp2_draw_end(&mut self) {
        self.frames += 1;
    }
}
