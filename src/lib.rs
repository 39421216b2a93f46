//! Writeahead - stall-tolerant write-ahead audio delivery
//!
//! This library re-exports the buffering, scheduling and event alignment
//! from `writeahead-core`, plus the stall soak harness used by the
//! `writeahead` binary.

pub use writeahead_core::{buffer, config, error, event, facade, processor, scheduler, stats};

pub use writeahead_core::{
    BufferConfig, BufferStats, BufferedProcessor, ChannelBufferSet, Error, EventPayload,
    EventStats, HostEvent, ParameterChange, Processor, ProcessorError, ProcessorState, RingBuffer,
    StatsSnapshot, TimestampedEvent,
};
pub use writeahead_core::{BUILD_DATE, DEFAULT_LATENCY_MS, VERSION};

pub mod soak;
