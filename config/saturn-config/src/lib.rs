use bincode::{Decode, Encode};
use std::fmt::{Display, Formatter};
#[cfg(feature = "serde")]
use std::path::Path;

pub const DEFAULT_VOLUME: u8 = 100;

/// Console region as reported by the SMPC area code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum SaturnRegion {
    Japan,
    AsiaNtsc,
    #[default]
    NorthAmerica,
    CentralSouthAmericaNtsc,
    Korea,
    AsiaPal,
    Europe,
    CentralSouthAmericaPal,
}

impl SaturnRegion {
    pub const ALL: [Self; 8] = [
        Self::Japan,
        Self::AsiaNtsc,
        Self::NorthAmerica,
        Self::CentralSouthAmericaNtsc,
        Self::Korea,
        Self::AsiaPal,
        Self::Europe,
        Self::CentralSouthAmericaPal,
    ];

    /// Area code returned in INTBACK OREG9.
    #[must_use]
    pub fn area_code(self) -> u8 {
        match self {
            Self::Japan => 0x1,
            Self::AsiaNtsc => 0x2,
            Self::NorthAmerica => 0x4,
            Self::CentralSouthAmericaNtsc => 0x5,
            Self::Korea => 0x6,
            Self::AsiaPal => 0xA,
            Self::Europe => 0xC,
            Self::CentralSouthAmericaPal => 0xD,
        }
    }

    #[must_use]
    pub fn from_area_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|region| region.area_code() == code)
    }

    #[must_use]
    pub fn timing_mode(self) -> TimingMode {
        if self.area_code() >= 0xA { TimingMode::Pal } else { TimingMode::Ntsc }
    }
}

impl Display for SaturnRegion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Japan => "Japan",
            Self::AsiaNtsc => "Asia (NTSC)",
            Self::NorthAmerica => "North America",
            Self::CentralSouthAmericaNtsc => "Central/South America (NTSC)",
            Self::Korea => "Korea",
            Self::AsiaPal => "Asia (PAL)",
            Self::Europe => "Europe",
            Self::CentralSouthAmericaPal => "Central/South America (PAL)",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum TimingMode {
    #[default]
    Ntsc,
    Pal,
}

impl TimingMode {
    #[must_use]
    pub fn frame_rate(self) -> f64 {
        match self {
            Self::Ntsc => 59.94,
            Self::Pal => 50.0,
        }
    }

    #[must_use]
    pub fn lines_per_frame(self) -> u32 {
        match self {
            Self::Ntsc => 263,
            Self::Pal => 313,
        }
    }
}

/// SH-2 execution core selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum Sh2CoreKind {
    Dummy,
    #[default]
    Interpreter,
}

impl Display for Sh2CoreKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy => f.write_str("Dummy"),
            Self::Interpreter => f.write_str("Interpreter"),
        }
    }
}

/// BIOS language stored in SMEM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum SmpcLanguage {
    #[default]
    English,
    German,
    French,
    Spanish,
    Italian,
    Japanese,
}

impl SmpcLanguage {
    #[must_use]
    pub fn to_smem(self) -> u8 {
        self as u8
    }
}

impl Display for SmpcLanguage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::English => "English",
            Self::German => "German",
            Self::French => "French",
            Self::Spanish => "Spanish",
            Self::Italian => "Italian",
            Self::Japanese => "Japanese",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum BackupRamSize {
    #[default]
    Internal32Kb,
}

impl BackupRamSize {
    #[must_use]
    pub fn byte_len(self) -> usize {
        match self {
            Self::Internal32Kb => 32 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SaturnConfig {
    pub region: SaturnRegion,
    pub sh2_core: Sh2CoreKind,
    /// ST-V arcade board instead of a Saturn console.
    pub stv: bool,
    /// Use `base_time` for the RTC instead of the host clock.
    pub clock_sync: bool,
    /// Unix seconds.
    pub base_time: Option<i64>,
    pub language: SmpcLanguage,
    pub audio_enabled: bool,
    /// 0-100
    pub volume: u8,
    pub backup_ram_size: BackupRamSize,
}

impl Default for SaturnConfig {
    fn default() -> Self {
        Self {
            region: SaturnRegion::default(),
            sh2_core: Sh2CoreKind::default(),
            stv: false,
            clock_sync: false,
            base_time: None,
            language: SmpcLanguage::default(),
            audio_enabled: true,
            volume: DEFAULT_VOLUME,
            backup_ram_size: BackupRamSize::default(),
        }
    }
}

impl SaturnConfig {
    /// Volume as a linear gain in `0.0..=1.0`.
    #[must_use]
    pub fn volume_gain(&self) -> f64 {
        f64::from(self.volume.min(100)) / 100.0
    }

    #[cfg(feature = "serde")]
    pub fn from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path).unwrap_or_else(|err| {
            log::warn!("Unable to read config file '{}': {err}", path.display());
            String::new()
        });
        Self::from_toml(&config_str)
    }

    #[cfg(feature = "serde")]
    #[must_use]
    pub fn from_toml(config_str: &str) -> Self {
        let mut config: Self = toml::from_str(config_str).unwrap_or_else(|err| {
            log::error!("Error deserializing Saturn config: {err}");
            Self::default()
        });
        if config.volume > 100 {
            log::warn!("Volume {} out of range, clamping to 100", config.volume);
            config.volume = 100;
        }
        config
    }
}
