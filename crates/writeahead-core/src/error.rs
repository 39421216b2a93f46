//! Error types
//!
//! Overruns, underruns and dropped events are degraded-but-running
//! conditions and show up as counters in [`crate::BufferStats`] and
//! [`crate::EventStats`]. The types here cover the few places where a
//! caller has to be told something went wrong.

use thiserror::Error;

/// A write was rejected by a [`crate::RingBuffer`]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    #[error("buffer overrun: {requested} samples requested, {available} available")]
    Overrun { requested: usize, available: usize },

    #[error("channel {channel} out of range ({channels} channels)")]
    ChannelOutOfRange { channel: usize, channels: usize },
}

/// Failure reported by the wrapped processor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessorError {
    #[error("processor initialization failed: {0}")]
    Initialization(String),

    #[error("processor activation failed: {0}")]
    Activation(String),

    #[error("processor error: {0}")]
    Other(String),
}

/// Invalid [`crate::BufferConfig`] value
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("latency must be in (0, {max}] milliseconds, got {0}", max = crate::MAX_LATENCY_MS)]
    InvalidLatency(f64),

    #[error("ring of {requested} samples exceeds the {max} sample limit")]
    RingTooLarge { requested: u64, max: u32 },

    #[error("tick interval must be at least 1 ms")]
    InvalidTickInterval,

    #[error("size multiplier must be at least 2, got {0}")]
    InvalidSizeMultiplier(u32),

    #[error("event capacity must be non-zero")]
    InvalidEventCapacity,
}

/// Errors surfaced by [`crate::BufferedProcessor`]
#[derive(Error, Debug)]
pub enum Error {
    #[error("processor is not initialized")]
    NotInitialized,

    #[error("processor is already initialized")]
    AlreadyInitialized,

    #[error("processor has been released")]
    Released,

    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(f64),

    #[error("invalid maximum block size: {0}")]
    InvalidBlockSize(usize),

    #[error("at least one channel is required")]
    NoChannels,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Processor(#[from] ProcessorError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(#[from] std::io::Error),
}
