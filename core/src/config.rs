use crate::error::Result;
use crate::line::DYNAMIC_AUDIO_ID;
use crate::profile::{Direction, FskFramePlan, ModemFamily, ModemProfile, ProfileOverrides};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level JSON config: `{"modem": {...}, "sync": {...}}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CassetteConfig {
    pub modem: ModemConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModemConfig {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(flatten)]
    pub overrides: ProfileOverrides,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Playback is left alone while within this many seconds of the tape
    #[serde(default = "default_tolerance_seconds")]
    pub tolerance_seconds: u32,
    #[serde(default = "default_no_data_timeout_ms")]
    pub no_data_timeout_ms: u64,
    #[serde(default = "default_tape_tick_ms")]
    pub tape_tick_ms: u64,
    #[serde(default = "default_line_queue_depth")]
    pub line_queue_depth: usize,
    #[serde(default = "default_dynamic_audio_id")]
    pub dynamic_audio_id: String,
}

fn default_mode() -> String {
    "1200".to_string()
}

fn default_sample_rate() -> u32 {
    crate::SAMPLE_RATE
}

fn default_tolerance_seconds() -> u32 {
    2
}

fn default_no_data_timeout_ms() -> u64 {
    1000
}

fn default_tape_tick_ms() -> u64 {
    250
}

fn default_line_queue_depth() -> usize {
    5
}

fn default_dynamic_audio_id() -> String {
    DYNAMIC_AUDIO_ID.to_string()
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            sample_rate: default_sample_rate(),
            overrides: ProfileOverrides::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tolerance_seconds: default_tolerance_seconds(),
            no_data_timeout_ms: default_no_data_timeout_ms(),
            tape_tick_ms: default_tape_tick_ms(),
            line_queue_depth: default_line_queue_depth(),
            dynamic_audio_id: default_dynamic_audio_id(),
        }
    }
}

impl SyncConfig {
    pub fn no_data_timeout(&self) -> Duration {
        Duration::from_millis(self.no_data_timeout_ms)
    }

    pub fn tape_tick(&self) -> Duration {
        Duration::from_millis(self.tape_tick_ms.max(1))
    }
}

impl ModemConfig {
    pub fn family(&self) -> Result<ModemFamily> {
        self.mode.parse()
    }

    pub fn profile(&self, direction: Direction) -> Result<ModemProfile> {
        ModemProfile::derive(self.family()?, direction, &self.overrides, self.sample_rate)
    }

    pub fn receive_plan(&self) -> Result<FskFramePlan> {
        FskFramePlan::new(self.profile(Direction::Receive)?)
    }
}

impl CassetteConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&text)?;
        log::debug!("loaded config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
