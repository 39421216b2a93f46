//! Writeahead Core - Write-ahead buffering for real-time audio
//!
//! Decouples a processing routine that may stall (allocation, page faults,
//! scheduling jitter) from a hard-real-time audio callback. A background
//! worker renders audio ahead of time into per-channel lock-free ring
//! buffers, and the audio callback only ever copies out of those buffers.
//!
//! - [`buffer`]: write-ahead ring buffers and the per-channel set
//! - [`event`]: latency-aligned timestamped events (MIDI, parameter changes)
//! - [`scheduler`]: the adaptive background worker
//! - [`facade`]: [`BufferedProcessor`], the surface the host talks to

pub mod buffer;
pub mod config;
pub mod error;
pub mod event;
pub mod facade;
pub mod processor;
pub mod scheduler;
pub mod stats;

pub use buffer::{next_power_of_two, BufferStats, ChannelBufferSet, RingBuffer, MAX_RING_SIZE};
pub use config::BufferConfig;
pub use error::{BufferError, ConfigError, Error, ProcessorError};
pub use event::{EventPayload, EventStats, HostEvent, ParameterChange, TimestampedEvent};
pub use facade::{BufferedProcessor, ProcessorState};
pub use processor::Processor;
pub use stats::StatsSnapshot;

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date stamped by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Default write-ahead latency in milliseconds
pub const DEFAULT_LATENCY_MS: f64 = 50.0;

/// Longest write-ahead latency a config may ask for (10 seconds)
pub const MAX_LATENCY_MS: f64 = 10_000.0;

/// Default scheduler tick period in milliseconds (200 Hz)
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 5;

/// Ring size is at least this many times the write-ahead latency
pub const DEFAULT_SIZE_MULTIPLIER: u32 = 4;

/// Default capacity of the bounded event queue
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Default number of best-effort chunks rendered on release
pub const DEFAULT_RELEASE_DRAIN_CHUNKS: usize = 10;
