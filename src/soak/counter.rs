//! Frame-counter test processor
//!
//! Renders a 16-bit frame counter as a normalized sawtooth (0.0 to 1.0) on
//! every channel, and stalls for a fixed time every N chunks. Anything the
//! buffering loses, repeats or pads with silence shows up as a break in the
//! counter on the host side.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use writeahead_core::{Processor, ProcessorError, TimestampedEvent};

/// Encode a frame index as a normalized 16-bit sawtooth sample
pub fn encode_counter(frame: u64) -> f32 {
    (frame & 0xFFFF) as f32 / 65536.0
}

/// Decode a sawtooth sample back to its 16-bit counter value
pub fn decode_counter(sample: f32) -> u32 {
    (sample.clamp(0.0, 1.0) * 65536.0) as u32 & 0xFFFF
}

/// Processor emitting a frame counter with simulated stalls
pub struct CounterProcessor {
    frame: u64,
    stall: Duration,
    /// Stall on every Nth chunk; 0 disables stalls
    stall_every: usize,
    chunks: usize,
    active: bool,
    stalls: Arc<AtomicU64>,
    events: Arc<AtomicU64>,
}

impl CounterProcessor {
    pub fn new(stall: Duration, stall_every: usize) -> Self {
        Self {
            frame: 0,
            stall,
            stall_every,
            chunks: 0,
            active: false,
            stalls: Arc::new(AtomicU64::new(0)),
            events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared count of stalls taken so far
    pub fn stall_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.stalls)
    }

    /// Shared count of events received so far
    pub fn event_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.events)
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Processor for CounterProcessor {
    fn initialize(&mut self, sample_rate: f64, max_block_size: usize) -> Result<(), ProcessorError> {
        self.frame = 0;
        self.chunks = 0;
        tracing::debug!(sample_rate, max_block_size, "Counter processor initialized");
        Ok(())
    }

    fn process_audio(&mut self, _inputs: &[Vec<f32>], outputs: &mut [Vec<f32>], num_samples: usize) {
        self.chunks += 1;
        if self.stall_every > 0 && self.chunks % self.stall_every == 0 {
            self.stalls.fetch_add(1, Ordering::Relaxed);
            std::thread::sleep(self.stall);
        }

        for out in outputs.iter_mut() {
            for (i, sample) in out[..num_samples].iter_mut().enumerate() {
                *sample = encode_counter(self.frame + i as u64);
            }
        }
        self.frame += num_samples as u64;
    }

    fn set_active(&mut self, active: bool) -> Result<(), ProcessorError> {
        self.active = active;
        tracing::debug!(active, frame = self.frame, "Counter processor activation");
        Ok(())
    }

    fn process_events(&mut self, events: &[TimestampedEvent]) {
        self.events.fetch_add(events.len() as u64, Ordering::Relaxed);
    }
}
