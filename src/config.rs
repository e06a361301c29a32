//! Application configuration
//!
//! Loaded from a TOML file; every field has a default, so a missing file or
//! a partial one is fine.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::constants;
use crate::error::{Error, Result};
use crate::playback::samples_duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub stream: StreamConfig,
    pub sync: SyncConfig,
    pub audio: AudioConfig,
}

/// Chunk scheduling parameters of the coordinator
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub sample_rate: u32,
    /// Samples per broadcast chunk
    pub chunk_size: usize,
    /// Gap samples inserted between songs
    pub gap_break_size: usize,
    /// Warm-up before the first chunk is scheduled
    pub stream_start_delay_secs: u64,
    /// How far in the future chunks are scheduled
    pub stream_delay_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Probe cycles per sync run
    pub cycles: usize,
    pub cycle_delay_ms: u64,
    /// Delay between sync runs
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub volume: f64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: constants::DEFAULT_SAMPLE_RATE,
            chunk_size: constants::DEFAULT_CHUNK_SIZE,
            gap_break_size: constants::DEFAULT_GAP_BREAK_SIZE,
            stream_start_delay_secs: constants::STREAM_START_DELAY_SECS,
            stream_delay_secs: constants::STREAM_DELAY_SECS,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cycles: constants::TIME_SYNC_CYCLES,
            cycle_delay_ms: constants::TIME_SYNC_CYCLE_DELAY_MS,
            interval_secs: constants::TIME_SYNC_INTERVAL_SECS,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            volume: constants::DEFAULT_VOLUME,
        }
    }
}

impl StreamConfig {
    /// Wall-clock duration of one chunk
    pub fn chunk_duration(&self) -> Duration {
        Duration::from_nanos(samples_duration(self.sample_rate, self.chunk_size) as u64)
    }

    pub fn stream_start_delay(&self) -> Duration {
        Duration::from_secs(self.stream_start_delay_secs)
    }

    pub fn stream_delay(&self) -> Duration {
        Duration::from_secs(self.stream_delay_secs)
    }
}

impl SyncConfig {
    pub fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_delay_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.stream.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be positive".to_string()));
        }
        if self.stream.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be positive".to_string()));
        }
        if self.sync.cycles == 0 {
            return Err(Error::Config("sync cycles must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.audio.volume) {
            return Err(Error::Config(format!(
                "volume must be in [0, 1], got {}",
                self.audio.volume
            )));
        }
        Ok(())
    }
}
