//! One write-ahead ring per audio channel

use super::ring::{BufferStats, RingBuffer};
use crate::error::BufferError;

/// Per-channel [`RingBuffer`]s sharing one latency and sizing policy
#[derive(Debug)]
pub struct ChannelBufferSet {
    buffers: Vec<RingBuffer>,
    latency_samples: u32,
}

impl ChannelBufferSet {
    /// Create `num_channels` mono rings
    ///
    /// # Arguments
    /// * `num_channels` - Number of audio channels
    /// * `sample_rate` - Sample rate in Hz
    /// * `latency_samples` - Write-ahead distance per channel
    /// * `size_multiplier` - Ring size is `next_power_of_two(latency * multiplier)`
    pub fn new(
        num_channels: usize,
        sample_rate: f64,
        latency_samples: u32,
        size_multiplier: u32,
    ) -> Self {
        let buffers = (0..num_channels)
            .map(|_| {
                RingBuffer::with_latency_samples(sample_rate, 1, latency_samples, size_multiplier)
            })
            .collect();

        Self {
            buffers,
            latency_samples,
        }
    }

    /// Write `latency_samples` of silence into every channel
    ///
    /// Called once at initialization so the first real-time reads find
    /// defined data instead of underrunning.
    pub fn prefill_silence(&self) -> Result<(), BufferError> {
        let silence = vec![0.0f32; self.latency_samples as usize];
        for buffer in &self.buffers {
            buffer.write(&silence)?;
        }
        Ok(())
    }

    /// Append samples to one channel
    pub fn write(&self, channel: usize, samples: &[f32]) -> Result<(), BufferError> {
        match self.buffers.get(channel) {
            Some(buffer) => buffer.write(samples),
            None => Err(BufferError::ChannelOutOfRange {
                channel,
                channels: self.buffers.len(),
            }),
        }
    }

    /// Drain one channel; an unknown channel reads as silence
    pub fn read(&self, channel: usize, output: &mut [f32]) -> usize {
        match self.buffers.get(channel) {
            Some(buffer) => buffer.read(output),
            None => {
                output.fill(0.0);
                0
            }
        }
    }

    /// Lowest fill percentage across channels (100.0 when there are none)
    pub fn min_fill_percentage(&self) -> f32 {
        self.buffers
            .iter()
            .map(|b| b.stats().fill_percentage)
            .fold(100.0f32, f32::min)
    }

    /// Highest fill percentage across channels (0.0 when there are none)
    pub fn max_fill_percentage(&self) -> f32 {
        self.buffers
            .iter()
            .map(|b| b.stats().fill_percentage)
            .fold(0.0f32, f32::max)
    }

    /// Health snapshot for every channel
    pub fn stats(&self) -> Vec<BufferStats> {
        self.buffers.iter().map(RingBuffer::stats).collect()
    }

    /// Reset every channel (producer and consumer must be quiesced)
    pub fn reset(&mut self) {
        for buffer in &mut self.buffers {
            buffer.reset();
        }
    }

    pub fn get(&self, channel: usize) -> Option<&RingBuffer> {
        self.buffers.get(channel)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RingBuffer> {
        self.buffers.iter()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Write-ahead distance per channel in samples
    pub fn latency_samples(&self) -> u32 {
        self.latency_samples
    }
}
