//! Sound subsystem (SCSP + 68000) and the host audio interface

use crate::m68k::{DummyM68k, M68K_CYCLES_PER_SAMPLE, M68kCore, SoundCpu};
use crate::savestate::{BINCODE_CONFIG, SaveStateError};
use crate::scsp::{CYCLES_PER_SAMPLE, Scsp};
use std::error::Error;
use std::sync::{Arc, Mutex, PoisonError};

pub type SoundError = Box<dyn Error + Send + Sync + 'static>;

/// Host audio backend. Receives interleaved stereo samples at [`crate::scsp::SAMPLE_RATE`].
pub trait SoundInterface {
    fn name(&self) -> &'static str;

    fn reset(&mut self) {}

    /// Called when the video standard changes so that the backend can adjust its buffering.
    fn change_video_format(&mut self, _frame_rate: f64) {}

    /// # Errors
    ///
    /// Returns an error if the samples cannot be queued to the audio device.
    fn update_audio(&mut self, samples: &[(i16, i16)]) -> Result<(), SoundError>;

    /// Number of samples the backend can accept without blocking.
    fn audio_space(&self) -> usize {
        usize::MAX
    }

    fn mute(&mut self) {}

    fn unmute(&mut self) {}

    /// `volume` is a percentage, 0-100.
    fn set_volume(&mut self, _volume: u8) {}
}

/// Discards all audio.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSound;

impl SoundInterface for NullSound {
    fn name(&self) -> &'static str {
        "Null"
    }

    fn update_audio(&mut self, _samples: &[(i16, i16)]) -> Result<(), SoundError> {
        Ok(())
    }
}

/// Collects every sample in memory. Samples received while muted are replaced with silence.
#[derive(Debug, Clone, Default)]
pub struct BufferedSound {
    samples: Vec<(i16, i16)>,
    muted: bool,
}

impl BufferedSound {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn samples(&self) -> &[(i16, i16)] {
        &self.samples
    }

    pub fn take_samples(&mut self) -> Vec<(i16, i16)> {
        std::mem::take(&mut self.samples)
    }
}

impl SoundInterface for BufferedSound {
    fn name(&self) -> &'static str {
        "Buffered"
    }

    fn reset(&mut self) {
        self.samples.clear();
    }

    fn update_audio(&mut self, samples: &[(i16, i16)]) -> Result<(), SoundError> {
        if self.muted {
            self.samples.extend(samples.iter().map(|_| (0, 0)));
        } else {
            self.samples.extend_from_slice(samples);
        }
        Ok(())
    }

    fn mute(&mut self) {
        self.muted = true;
    }

    fn unmute(&mut self) {
        self.muted = false;
    }
}

/// Shared flag that pauses sample generation while held, e.g. while a save state is taken.
#[derive(Debug, Clone, Default)]
pub struct AudioLock(Arc<Mutex<bool>>);

impl AudioLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks audio until the returned guard is dropped.
    #[must_use]
    pub fn hold(&self) -> AudioLockGuard<'_> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = true;
        AudioLockGuard(self)
    }
}

pub struct AudioLockGuard<'a>(&'a AudioLock);

impl Drop for AudioLockGuard<'_> {
    fn drop(&mut self) {
        *self.0.0.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }
}

pub struct SoundSystem {
    scsp: Scsp,
    cpu: SoundCpu,
    core: Box<dyn M68kCore + Send>,
    lock: AudioLock,
    samples: Vec<(i16, i16)>,
    // SCSP clock cycles not yet run
    pending_cycles: u64,
    enabled: bool,
}

impl SoundSystem {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self::with_core(Box::new(DummyM68k::new()), enabled)
    }

    #[must_use]
    pub fn with_core(core: Box<dyn M68kCore + Send>, enabled: bool) -> Self {
        log::info!("Using 68000 core: {}", core.name());
        Self {
            scsp: Scsp::new(),
            cpu: SoundCpu::new(),
            core,
            lock: AudioLock::new(),
            samples: Vec::new(),
            pending_cycles: 0,
            enabled,
        }
    }

    #[must_use]
    pub fn scsp(&self) -> &Scsp {
        &self.scsp
    }

    pub fn scsp_mut(&mut self) -> &mut Scsp {
        &mut self.scsp
    }

    #[must_use]
    pub fn lock(&self) -> &AudioLock {
        &self.lock
    }

    #[must_use]
    pub fn m68k_running(&self) -> bool {
        self.cpu.running()
    }

    pub fn start_m68k(&mut self) {
        self.cpu.start(self.core.as_mut(), &mut self.scsp);
    }

    pub fn stop_m68k(&mut self) {
        self.cpu.stop(self.core.as_mut(), &mut self.scsp);
    }

    /// Resets the SCSP and stops the 68000. Sound RAM is kept.
    pub fn reset(&mut self) {
        self.stop_m68k();
        self.scsp.reset();
        self.core.set_irq(0);
        self.pending_cycles = 0;
        self.samples.clear();
    }

    /// Runs the 68000 and the SCSP in lockstep, one output sample at a time.
    pub fn advance(&mut self, scsp_cycles: u64) {
        if self.lock.is_locked() {
            return;
        }

        self.pending_cycles += scsp_cycles;
        while self.pending_cycles >= CYCLES_PER_SAMPLE as u64 {
            self.pending_cycles -= CYCLES_PER_SAMPLE as u64;

            self.cpu.exec(M68K_CYCLES_PER_SAMPLE, self.core.as_mut(), &mut self.scsp);
            self.deliver_sound_interrupt();

            self.scsp.exec(CYCLES_PER_SAMPLE as u32, &mut self.samples);
            self.deliver_sound_interrupt();
        }

        if !self.enabled {
            self.samples.clear();
        }
    }

    fn deliver_sound_interrupt(&mut self) {
        if let Some(level) = self.scsp.take_sound_cpu_interrupt() {
            self.core.set_irq(level);
        }
    }

    /// Whether the SCSP raised a main CPU interrupt since the last call.
    pub fn take_main_interrupt(&mut self) -> bool {
        self.scsp.take_main_interrupt()
    }

    /// Hands buffered samples to the host.
    ///
    /// # Errors
    ///
    /// Propagates the backend's error; the samples are dropped in that case.
    pub fn flush(&mut self, sound: &mut dyn SoundInterface) -> Result<(), SoundError> {
        if self.samples.is_empty() {
            return Ok(());
        }

        let result = sound.update_audio(&self.samples);
        self.samples.clear();
        result
    }

    // SH-2 side sound RAM access. The execution core is told about every write.

    #[must_use]
    pub fn read_ram_byte(&self, address: u32) -> u8 {
        self.scsp.sound_ram().read_byte(address)
    }

    #[must_use]
    pub fn read_ram_word(&self, address: u32) -> u16 {
        self.scsp.sound_ram().read_word(address)
    }

    #[must_use]
    pub fn read_ram_longword(&self, address: u32) -> u32 {
        self.scsp.sound_ram().read_longword(address)
    }

    pub fn write_ram_byte(&mut self, address: u32, value: u8) {
        self.scsp.sound_ram_mut().write_byte(address, value);
        self.core.write_notify(address & 0x7FFFF, 1);
    }

    pub fn write_ram_word(&mut self, address: u32, value: u16) {
        self.scsp.sound_ram_mut().write_word(address, value);
        self.core.write_notify(address & 0x7FFFE, 2);
    }

    pub fn write_ram_longword(&mut self, address: u32, value: u32) {
        self.scsp.sound_ram_mut().write_longword(address, value);
        self.core.write_notify(address & 0x7FFFC, 4);
    }

    /// Serializes the SCSP, the 68000 run state and the core's own state.
    ///
    /// # Errors
    ///
    /// Propagates encoding errors.
    pub fn save_state(&self) -> Result<Vec<u8>, SaveStateError> {
        let state = (&self.scsp, &self.cpu, self.pending_cycles, self.core.save_state());
        Ok(bincode::encode_to_vec(state, BINCODE_CONFIG)?)
    }

    /// # Errors
    ///
    /// Propagates decoding errors. State is unchanged on error.
    pub fn load_state(&mut self, bytes: &[u8]) -> Result<(), SaveStateError> {
        let ((scsp, cpu, pending_cycles, core_state), _): ((Scsp, SoundCpu, u64, Vec<u8>), _) =
            bincode::decode_from_slice(bytes, BINCODE_CONFIG)?;

        self.scsp = scsp;
        self.cpu = cpu;
        self.pending_cycles = pending_cycles;
        self.core.load_state(&core_state);
        self.samples.clear();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn audio_lock_pauses_generation() {
        let mut sound = SoundSystem::new(true);
        let lock = sound.lock().clone();
        {
            let _guard = lock.hold();
            sound.advance(CYCLES_PER_SAMPLE as u64 * 4);
        }
        assert!(!sound.lock().is_locked());

        let mut output = BufferedSound::new();
        sound.flush(&mut output).unwrap();
        assert!(output.samples().is_empty());

        sound.advance(CYCLES_PER_SAMPLE as u64 * 4 + 100);
        sound.flush(&mut output).unwrap();
        assert_eq!(output.samples().len(), 4);
    }

    #[test]
    fn disabled_audio_drops_samples() {
        let mut sound = SoundSystem::new(false);
        sound.advance(CYCLES_PER_SAMPLE as u64 * 10);

        let mut output = BufferedSound::new();
        sound.flush(&mut output).unwrap();
        assert!(output.samples().is_empty());
    }

    #[test]
    fn state_round_trip_keeps_sound_ram_and_run_state() {
        let mut sound = SoundSystem::new(true);
        sound.write_ram_word(0x100, 0x4E71);
        sound.start_m68k();

        let state = sound.save_state().unwrap();

        let mut restored = SoundSystem::new(true);
        restored.load_state(&state).unwrap();
        assert_eq!(restored.read_ram_word(0x100), 0x4E71);
        assert!(restored.m68k_running());
    }
}
