use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use saturn_config::{SaturnConfig, SaturnRegion, Sh2CoreKind, SmpcLanguage};
use saturn_core::Saturn;
use saturn_core::sound::{NullSound, SoundError, SoundInterface};
use saturn_core::video::NullVideo;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

const EMULATION_OPTIONS_HEADING: &str = "Emulation Options";
const FILE_OPTIONS_HEADING: &str = "File Options";

#[derive(Parser)]
struct Args {
    /// BIOS image path
    #[arg(short = 'b', long)]
    bios: PathBuf,

    /// TOML config file; options given on the command line take precedence
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Number of frames to run before exiting
    #[arg(short = 'n', long, default_value_t = 60)]
    frames: u32,

    /// Console region
    #[arg(long, help_heading = EMULATION_OPTIONS_HEADING)]
    region: Option<SaturnRegion>,

    /// SH-2 execution core
    #[arg(long, help_heading = EMULATION_OPTIONS_HEADING)]
    sh2_core: Option<Sh2CoreKind>,

    /// BIOS language
    #[arg(long, help_heading = EMULATION_OPTIONS_HEADING)]
    language: Option<SmpcLanguage>,

    /// Emulate the ST-V arcade board
    #[arg(long, default_value_t, help_heading = EMULATION_OPTIONS_HEADING)]
    stv: bool,

    /// Start the RTC at this Unix timestamp instead of the host clock
    #[arg(long, help_heading = EMULATION_OPTIONS_HEADING)]
    base_time: Option<i64>,

    /// Backup RAM file; loaded at startup and written back if the game saved
    #[arg(long, help_heading = FILE_OPTIONS_HEADING)]
    backup_ram: Option<PathBuf>,

    /// Load this save state before running
    #[arg(long, help_heading = FILE_OPTIONS_HEADING)]
    load_state: Option<PathBuf>,

    /// Write a save state after the last frame
    #[arg(long, help_heading = FILE_OPTIONS_HEADING)]
    save_state: Option<PathBuf>,

    /// Write audio as raw interleaved stereo 16-bit little-endian PCM at 44100 Hz
    #[arg(long, help_heading = FILE_OPTIONS_HEADING)]
    audio_out: Option<PathBuf>,
}

impl Args {
    fn saturn_config(&self) -> SaturnConfig {
        let mut config = match &self.config {
            Some(path) => SaturnConfig::from_file(path),
            None => SaturnConfig::default(),
        };

        if let Some(region) = self.region {
            config.region = region;
        }
        if let Some(sh2_core) = self.sh2_core {
            config.sh2_core = sh2_core;
        }
        if let Some(language) = self.language {
            config.language = language;
        }
        if self.stv {
            config.stv = true;
        }
        if let Some(base_time) = self.base_time {
            config.clock_sync = true;
            config.base_time = Some(base_time);
        }
        config.audio_enabled |= self.audio_out.is_some();

        config
    }
}

struct PcmFileSound {
    writer: BufWriter<File>,
}

impl PcmFileSound {
    fn create(path: &Path) -> anyhow::Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create audio output '{}'", path.display()))?;
        Ok(Self { writer: BufWriter::new(file) })
    }
}

impl SoundInterface for PcmFileSound {
    fn name(&self) -> &'static str {
        "PCM file"
    }

    fn update_audio(&mut self, samples: &[(i16, i16)]) -> Result<(), SoundError> {
        for &(left, right) in samples {
            self.writer.write_all(&left.to_le_bytes())?;
            self.writer.write_all(&right.to_le_bytes())?;
        }
        Ok(())
    }
}

impl Drop for PcmFileSound {
    fn drop(&mut self) {
        if let Err(err) = self.writer.flush() {
            log::error!("Failed to flush audio output: {err}");
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.saturn_config();
    log::info!("Running with config {config:?}");

    let bios = fs::read(&args.bios)
        .with_context(|| format!("Failed to read BIOS from '{}'", args.bios.display()))?;

    let sound: Box<dyn SoundInterface> = match &args.audio_out {
        Some(path) => Box::new(PcmFileSound::create(path)?),
        None => Box::new(NullSound),
    };
    let mut saturn = Saturn::init(&bios, config, Box::new(NullVideo), sound)?;

    if let Some(path) = &args.backup_ram {
        match fs::read(path) {
            Ok(contents) => saturn.load_backup_ram(&contents),
            Err(err) => log::warn!("Not loading backup RAM from '{}': {err}", path.display()),
        }
    }

    if let Some(path) = &args.load_state {
        let state = fs::read(path)
            .with_context(|| format!("Failed to read save state '{}'", path.display()))?;
        saturn
            .load_state_buffer(&state)
            .with_context(|| format!("Failed to load save state '{}'", path.display()))?;
    }

    let start = Instant::now();
    for _ in 0..args.frames {
        saturn.exec_frame()?;

        if saturn.take_backup_ram_dirty() {
            if let Some(path) = &args.backup_ram {
                fs::write(path, saturn.backup_ram()).with_context(|| {
                    format!("Failed to write backup RAM to '{}'", path.display())
                })?;
            }
        }
    }
    log::info!("Ran {} frames in {:?}", args.frames, start.elapsed());

    if let Some(path) = &args.save_state {
        let state = saturn.save_state_buffer()?;
        fs::write(path, state)
            .with_context(|| format!("Failed to write save state '{}'", path.display()))?;
        log::info!("Wrote save state to '{}'", path.display());
    }

    Ok(())
}
