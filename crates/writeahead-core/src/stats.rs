//! Point-in-time health report
//!
//! Collects per-channel [`BufferStats`] and [`EventStats`] into one
//! serializable value, for logging or JSON telemetry.

use crate::buffer::BufferStats;
use crate::event::EventStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health of a [`crate::BufferedProcessor`] at one moment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub captured_at: DateTime<Utc>,
    /// Total reported latency (write-ahead plus the wrapped processor's)
    pub latency_samples: u32,
    /// Wrapped processor accepted activation and the scheduler is rendering
    #[serde(default)]
    pub processing: bool,
    pub channels: Vec<BufferStats>,
    pub events: EventStats,
}

impl StatsSnapshot {
    pub fn new(
        latency_samples: u32,
        processing: bool,
        channels: Vec<BufferStats>,
        events: EventStats,
    ) -> Self {
        Self {
            captured_at: Utc::now(),
            latency_samples,
            processing,
            channels,
            events,
        }
    }

    /// Underruns summed over all channels
    pub fn total_underruns(&self) -> u64 {
        self.channels.iter().map(|c| c.underruns).sum()
    }

    /// Overruns summed over all channels
    pub fn total_overruns(&self) -> u64 {
        self.channels.iter().map(|c| c.overruns).sum()
    }

    pub fn total_adjustments(&self) -> u64 {
        self.channels.iter().map(|c| c.adjustments).sum()
    }

    /// Lowest channel fill, `None` without channels
    pub fn min_fill_percentage(&self) -> Option<f32> {
        self.channels
            .iter()
            .map(|c| c.fill_percentage)
            .reduce(f32::min)
    }

    /// Events lost for any reason
    pub fn events_dropped(&self) -> u64 {
        self.events.dropped_full + self.events.dropped_late
    }
}
