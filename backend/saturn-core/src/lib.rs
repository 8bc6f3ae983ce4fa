pub mod api;
pub mod bus;
pub mod devices;
pub mod input;
pub mod m68k;
pub mod memory;
pub mod savestate;
pub mod scsp;
pub mod smpc;
pub mod sound;
pub mod vdp1;
pub mod video;

#[cfg(test)]
mod tests;

pub use api::{BreakpointCallback, Saturn, SaturnError};
pub use input::SaturnInputs;
pub use sh2_emu::WhichCpu;
