//! 68000 sound CPU glue
//!
//! The 68000 sees sound RAM at `$000000-$07FFFF` and the SCSP registers from `$100000`. It runs at
//! half of the SCSP clock, 256 cycles per output sample.

use crate::scsp::Scsp;
use bincode::{Decode, Encode};

/// 68000 cycles per SCSP output sample.
pub const M68K_CYCLES_PER_SAMPLE: u32 = 256;

const ADDRESS_MASK: u32 = 0xFFFFFF;
const SOUND_RAM_END: u32 = 0x07FFFF;
const REGISTERS_START: u32 = 0x100000;

/// Memory as seen by the 68000.
pub trait M68kBus {
    fn read_byte(&mut self, address: u32) -> u8;

    fn read_word(&mut self, address: u32) -> u16;

    fn write_byte(&mut self, address: u32, value: u8);

    fn write_word(&mut self, address: u32, value: u16);
}

/// A 68000 execution core.
pub trait M68kCore {
    fn name(&self) -> &'static str;

    /// Reloads SSP and PC from the vector table.
    fn reset(&mut self, bus: &mut dyn M68kBus);

    /// Runs at least `cycles` cycles and returns how many were actually run.
    fn execute(&mut self, cycles: u32, bus: &mut dyn M68kBus) -> u32;

    /// Sets the interrupt priority level input. 0 clears it.
    fn set_irq(&mut self, level: u8);

    /// Sound RAM in `[address, address + len)` was written by another bus master.
    fn write_notify(&mut self, _address: u32, _len: u32) {}

    fn save_state(&self) -> Vec<u8> {
        Vec::new()
    }

    fn load_state(&mut self, _state: &[u8]) {}
}

/// Core that consumes its cycle budget without executing anything.
#[derive(Debug, Clone, Default)]
pub struct DummyM68k {
    irq_level: u8,
}

impl DummyM68k {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn irq_level(&self) -> u8 {
        self.irq_level
    }
}

impl M68kCore for DummyM68k {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn reset(&mut self, _bus: &mut dyn M68kBus) {
        self.irq_level = 0;
    }

    fn execute(&mut self, cycles: u32, _bus: &mut dyn M68kBus) -> u32 {
        cycles
    }

    fn set_irq(&mut self, level: u8) {
        self.irq_level = level;
    }

    fn save_state(&self) -> Vec<u8> {
        vec![self.irq_level]
    }

    fn load_state(&mut self, state: &[u8]) {
        self.irq_level = state.first().copied().unwrap_or(0);
    }
}

/// Run state of the 68000, toggled by the SMPC SNDON/SNDOFF commands.
#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct SoundCpu {
    running: bool,
    // Cycles run past the end of the previous budget, or still owed when negative
    saved_cycles: i32,
}

impl SoundCpu {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn running(&self) -> bool {
        self.running
    }

    /// SNDON. Has no effect if the 68000 is already running.
    pub fn start(&mut self, core: &mut dyn M68kCore, bus: &mut dyn M68kBus) {
        if self.running {
            return;
        }

        core.reset(bus);
        self.saved_cycles = 0;
        self.running = true;
        log::debug!("68000 started");
    }

    /// SNDOFF. Has no effect if the 68000 is already stopped.
    pub fn stop(&mut self, core: &mut dyn M68kCore, bus: &mut dyn M68kBus) {
        if !self.running {
            return;
        }

        core.reset(bus);
        self.running = false;
        log::debug!("68000 stopped");
    }

    /// Gives the 68000 a budget of `cycles`, crediting any overshoot from the previous call.
    pub fn exec(&mut self, cycles: u32, core: &mut dyn M68kCore, bus: &mut dyn M68kBus) {
        if !self.running {
            return;
        }

        let mut balance = self.saved_cycles - cycles as i32;
        if balance < 0 {
            let executed = core.execute(balance.unsigned_abs(), bus);
            balance += executed as i32;
        }
        self.saved_cycles = balance;
    }
}

impl M68kBus for Scsp {
    fn read_byte(&mut self, address: u32) -> u8 {
        match address & ADDRESS_MASK {
            address @ 0..=SOUND_RAM_END => self.sound_ram().read_byte(address),
            address if address >= REGISTERS_START => self.read_register_byte(address),
            address => {
                log::debug!("68000 read from unmapped address {address:06X}");
                0
            }
        }
    }

    fn read_word(&mut self, address: u32) -> u16 {
        match address & ADDRESS_MASK {
            address @ 0..=SOUND_RAM_END => self.sound_ram().read_word(address),
            address if address >= REGISTERS_START => self.read_register_word(address),
            address => {
                log::debug!("68000 read from unmapped address {address:06X}");
                0
            }
        }
    }

    fn write_byte(&mut self, address: u32, value: u8) {
        match address & ADDRESS_MASK {
            address @ 0..=SOUND_RAM_END => self.sound_ram_mut().write_byte(address, value),
            address if address >= REGISTERS_START => self.write_register_byte(address, value),
            address => log::debug!("68000 write to unmapped address {address:06X} {value:02X}"),
        }
    }

    fn write_word(&mut self, address: u32, value: u16) {
        match address & ADDRESS_MASK {
            address @ 0..=SOUND_RAM_END => self.sound_ram_mut().write_word(address, value),
            address if address >= REGISTERS_START => self.write_register_word(address, value),
            address => log::debug!("68000 write to unmapped address {address:06X} {value:04X}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    /// Runs in fixed-size instruction steps, so it overshoots budgets like a real core.
    struct SteppingCore {
        step: u32,
        resets: u32,
        executed: u32,
    }

    impl M68kCore for SteppingCore {
        fn name(&self) -> &'static str {
            "Stepping"
        }

        fn reset(&mut self, _bus: &mut dyn M68kBus) {
            self.resets += 1;
        }

        fn execute(&mut self, cycles: u32, _bus: &mut dyn M68kBus) -> u32 {
            let run = cycles.div_ceil(self.step) * self.step;
            self.executed += run;
            run
        }

        fn set_irq(&mut self, _level: u8) {}
    }

    #[test]
    fn stopped_cpu_does_not_execute() {
        let mut scsp = Scsp::new();
        let mut core = SteppingCore { step: 10, resets: 0, executed: 0 };
        let mut cpu = SoundCpu::new();

        cpu.exec(100, &mut core, &mut scsp);
        assert_eq!(core.executed, 0);

        cpu.stop(&mut core, &mut scsp);
        assert_eq!(core.resets, 0);
    }

    #[test]
    fn overshoot_is_credited_to_next_budget() {
        let mut scsp = Scsp::new();
        let mut core = SteppingCore { step: 10, resets: 0, executed: 0 };
        let mut cpu = SoundCpu::new();

        cpu.start(&mut core, &mut scsp);
        cpu.start(&mut core, &mut scsp);
        assert_eq!(core.resets, 1);
        assert!(cpu.running());

        cpu.exec(25, &mut core, &mut scsp);
        assert_eq!(core.executed, 30);
        assert_eq!(cpu.saved_cycles, 5);

        // 5 cycles of credit cover this budget entirely
        cpu.exec(5, &mut core, &mut scsp);
        assert_eq!(core.executed, 30);

        cpu.exec(25, &mut core, &mut scsp);
        assert_eq!(core.executed, 60);

        cpu.stop(&mut core, &mut scsp);
        assert_eq!(core.resets, 2);
        assert!(!cpu.running());
    }

    #[test]
    fn address_map() {
        let mut scsp = Scsp::new();

        M68kBus::write_word(&mut scsp, 0x001000, 0xABCD);
        assert_eq!(scsp.sound_ram().read_word(0x1000), 0xABCD);
        assert_eq!(M68kBus::read_byte(&mut scsp, 0x001001), 0xCD);

        // Unmapped gap between sound RAM and the registers
        M68kBus::write_word(&mut scsp, 0x0C1000, 0x1234);
        assert_eq!(M68kBus::read_word(&mut scsp, 0x0C1000), 0);

        // COEF through the register window
        M68kBus::write_word(&mut scsp, 0x100700, 0x0808);
        assert_eq!(M68kBus::read_word(&mut scsp, 0x100700), 0x0808);
    }
}
