//! Buffering configuration
//!
//! Loaded from a JSON file when the host wants to override the defaults.
//! Every field has a default, so partial files are fine.

use crate::buffer::MAX_RING_SIZE;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

fn default_latency_ms() -> f64 {
    crate::DEFAULT_LATENCY_MS
}

fn default_tick_interval_ms() -> u64 {
    crate::DEFAULT_TICK_INTERVAL_MS
}

fn default_size_multiplier() -> u32 {
    crate::DEFAULT_SIZE_MULTIPLIER
}

fn default_event_capacity() -> usize {
    crate::DEFAULT_EVENT_CAPACITY
}

fn default_release_drain_chunks() -> usize {
    crate::DEFAULT_RELEASE_DRAIN_CHUNKS
}

/// Tunables for the write-ahead pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Write-ahead latency in milliseconds
    #[serde(default = "default_latency_ms")]
    pub latency_ms: f64,
    /// Background scheduler period in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Ring size = next power of two of `latency * size_multiplier`
    #[serde(default = "default_size_multiplier")]
    pub size_multiplier: u32,
    /// Capacity of the bounded event queue
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Upper bound on chunks rendered while draining on release
    #[serde(default = "default_release_drain_chunks")]
    pub release_drain_chunks: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            latency_ms: default_latency_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            size_multiplier: default_size_multiplier(),
            event_capacity: default_event_capacity(),
            release_drain_chunks: default_release_drain_chunks(),
        }
    }
}

impl BufferConfig {
    /// Check every field is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.latency_ms.is_finite()
            || self.latency_ms <= 0.0
            || self.latency_ms > crate::MAX_LATENCY_MS
        {
            return Err(ConfigError::InvalidLatency(self.latency_ms));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidTickInterval);
        }
        if self.size_multiplier < 2 {
            return Err(ConfigError::InvalidSizeMultiplier(self.size_multiplier));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::InvalidEventCapacity);
        }
        Ok(())
    }

    /// Write-ahead latency as a [`Duration`]
    pub fn latency(&self) -> Duration {
        Duration::from_secs_f64(self.latency_ms / 1000.0)
    }

    /// Scheduler period as a [`Duration`]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Write-ahead latency in samples at `sample_rate`, rounded to nearest
    pub fn latency_samples(&self, sample_rate: f64) -> u32 {
        (self.latency_ms * sample_rate / 1000.0).round() as u32
    }

    /// Check the rings needed at `sample_rate` stay within [`MAX_RING_SIZE`]
    pub fn check_ring_size(&self, sample_rate: f64) -> Result<(), ConfigError> {
        let latency = (self.latency_ms * sample_rate / 1000.0).round();
        let requested = latency * f64::from(self.size_multiplier);
        if !requested.is_finite() || requested > f64::from(MAX_RING_SIZE) {
            return Err(ConfigError::RingTooLarge {
                requested: requested as u64,
                max: MAX_RING_SIZE,
            });
        }
        Ok(())
    }

    /// Load config from disk, falling back to defaults on any error
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(config) => match config.validate() {
                    Ok(()) => {
                        tracing::info!(path = %path.display(), "Loaded buffer config");
                        config
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Invalid buffer config, using defaults");
                        Self::default()
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to parse buffer config, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "No buffer config found, using defaults");
                Self::default()
            }
        }
    }

    /// Save config to disk, creating parent directories if needed
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Buffer config saved");
        Ok(())
    }
}
