//! Lock-free circular buffer with an enforced write-ahead distance
//!
//! The producer (background scheduler) appends rendered samples, the consumer
//! (real-time callback) drains them. Before every read the consumer makes sure
//! it trails the producer by at least `latency_samples`, snapping its own
//! position back with a compare-and-swap when it has caught up. That cushion
//! is what lets the producer stall without the consumer hearing it.
//!
//! ## Positions
//!
//! `read_pos` and `write_pos` are monotonically increasing sample counters.
//! Only `pos & mask` indexes the storage, so the ring size must be a power of
//! two. `write_pos - read_pos` stays within `[0, size]`.
//!
//! ## Failure semantics
//!
//! Overruns (no room to write) and underruns (not enough to read) are
//! expected under load. They are counted and the buffer keeps running:
//! overrun drops the write, underrun plays silence.

use super::sample::AtomicSample;
use crate::error::BufferError;
use crossbeam_utils::CachePadded;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Health snapshot of a single [`RingBuffer`]
///
/// Derived from the buffer's counters at call time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BufferStats {
    /// Reads that had to be padded with silence
    pub underruns: u64,
    /// Writes rejected for lack of space
    pub overruns: u64,
    /// Times the read position was moved to restore the write-ahead distance
    pub adjustments: u64,
    /// Readable samples as a percentage of the ring size (0.0 to 100.0)
    pub fill_percentage: f32,
    /// Distance between writer and reader expressed as time
    pub current_latency: Duration,
}

/// Single-producer/single-consumer write-ahead ring of `f32` samples
#[derive(Debug)]
pub struct RingBuffer {
    data: Box<[AtomicSample]>,
    read_pos: CachePadded<AtomicU64>,
    write_pos: CachePadded<AtomicU64>,
    size: u32,
    mask: u32,
    latency_samples: u32,
    sample_rate: f64,
    channels: usize,
    underruns: AtomicU64,
    overruns: AtomicU64,
    adjustments: AtomicU64,
}

impl RingBuffer {
    /// Create a buffer with the default 50ms write-ahead latency
    ///
    /// # Arguments
    /// * `sample_rate` - Sample rate in Hz
    /// * `channels` - Interleaved channels sharing this buffer (latency scales with it)
    pub fn new(sample_rate: f64, channels: usize) -> Self {
        Self::with_latency(
            sample_rate,
            channels,
            Duration::from_secs_f64(crate::DEFAULT_LATENCY_MS / 1000.0),
            crate::DEFAULT_SIZE_MULTIPLIER,
        )
    }

    /// Create a buffer with an explicit write-ahead latency
    pub fn with_latency(
        sample_rate: f64,
        channels: usize,
        latency: Duration,
        size_multiplier: u32,
    ) -> Self {
        let per_channel = (latency.as_secs_f64() * sample_rate).round() as u32;
        Self::with_latency_samples(sample_rate, channels, per_channel, size_multiplier)
    }

    /// Create a buffer from a per-channel latency already expressed in samples
    pub fn with_latency_samples(
        sample_rate: f64,
        channels: usize,
        latency_per_channel: u32,
        size_multiplier: u32,
    ) -> Self {
        let channels = channels.max(1);
        let multiplier = size_multiplier.max(1);
        // Clamped so `latency * multiplier` never exceeds MAX_RING_SIZE
        let latency_samples = latency_per_channel
            .checked_mul(channels as u32)
            .unwrap_or(u32::MAX)
            .min(MAX_RING_SIZE / multiplier);
        let size = next_power_of_two(latency_samples * multiplier);
        let data = (0..size).map(|_| AtomicSample::new(0.0)).collect();

        Self {
            data,
            read_pos: CachePadded::new(AtomicU64::new(0)),
            write_pos: CachePadded::new(AtomicU64::new(u64::from(latency_samples))),
            size,
            mask: size - 1,
            latency_samples,
            sample_rate,
            channels,
            underruns: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            adjustments: AtomicU64::new(0),
        }
    }

    /// Append samples, all or nothing
    ///
    /// Fails with [`BufferError::Overrun`] (and bumps the overrun counter)
    /// when there is not enough free space for the whole slice.
    pub fn write(&self, samples: &[f32]) -> Result<(), BufferError> {
        if samples.is_empty() {
            return Ok(());
        }

        let write_pos = self.write_pos.load(Ordering::Acquire);
        let read_pos = self.read_pos.load(Ordering::Acquire);

        let available = self.space_between(read_pos, write_pos);
        if available < samples.len() {
            self.overruns.fetch_add(1, Ordering::Relaxed);
            return Err(BufferError::Overrun {
                requested: samples.len(),
                available,
            });
        }

        let (head, tail) = self.spans(write_pos, samples.len());
        let (first, second) = samples.split_at(head.len());
        for (slot, &sample) in self.data[head].iter().zip(first) {
            slot.store(sample, Ordering::Relaxed);
        }
        for (slot, &sample) in self.data[tail].iter().zip(second) {
            slot.store(sample, Ordering::Relaxed);
        }

        self.write_pos.store(write_pos + samples.len() as u64, Ordering::Release);
        Ok(())
    }

    /// Drain up to `output.len()` samples, zero-filling whatever is missing
    ///
    /// Never blocks. Restores the write-ahead distance first, so the data
    /// returned is always at least `latency_samples` behind the writer.
    ///
    /// # Returns
    /// Number of real samples copied; `output[n..]` is silence.
    pub fn read(&self, output: &mut [f32]) -> usize {
        if output.is_empty() {
            return 0;
        }

        self.maintain_delay();

        let read_pos = self.read_pos.load(Ordering::Acquire);
        let write_pos = self.write_pos.load(Ordering::Acquire);

        let available = self.data_between(read_pos, write_pos);
        let to_read = available.min(output.len());
        if to_read < output.len() {
            self.underruns.fetch_add(1, Ordering::Relaxed);
        }

        let (head, tail) = self.spans(read_pos, to_read);
        let (first, second) = output[..to_read].split_at_mut(head.len());
        for (sample, slot) in first.iter_mut().zip(&self.data[head]) {
            *sample = slot.load(Ordering::Relaxed);
        }
        for (sample, slot) in second.iter_mut().zip(&self.data[tail]) {
            *sample = slot.load(Ordering::Relaxed);
        }

        self.read_pos.store(read_pos + to_read as u64, Ordering::Release);

        output[to_read..].fill(0.0);
        to_read
    }

    /// Pull the read position back so it trails the writer by `latency_samples`
    fn maintain_delay(&self) {
        let latency = u64::from(self.latency_samples);
        loop {
            let read_pos = self.read_pos.load(Ordering::Acquire);
            let write_pos = self.write_pos.load(Ordering::Acquire);

            if write_pos.saturating_sub(read_pos) >= latency {
                return;
            }

            let target = write_pos.saturating_sub(latency);
            if self
                .read_pos
                .compare_exchange(read_pos, target, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.adjustments.fetch_add(1, Ordering::Relaxed);
                return;
            }
            // Lost the race to another consumer, re-evaluate
        }
    }

    /// Zero the storage and restore the initial write-ahead positions
    ///
    /// Takes `&mut self`: producer and consumer must both be quiesced.
    pub fn reset(&mut self) {
        for slot in self.data.iter() {
            slot.store(0.0, Ordering::Relaxed);
        }
        self.read_pos.store(0, Ordering::Release);
        self.write_pos.store(u64::from(self.latency_samples), Ordering::Release);
        self.underruns.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
        self.adjustments.store(0, Ordering::Relaxed);
    }

    /// Current health counters and fill level
    pub fn stats(&self) -> BufferStats {
        let read_pos = self.read_pos.load(Ordering::Acquire);
        let write_pos = self.write_pos.load(Ordering::Acquire);

        let available = self.data_between(read_pos, write_pos);

        BufferStats {
            underruns: self.underruns.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            adjustments: self.adjustments.load(Ordering::Relaxed),
            fill_percentage: available as f32 / self.size as f32 * 100.0,
            current_latency: self.samples_to_duration(write_pos.saturating_sub(read_pos)),
        }
    }

    /// Distance between writer and reader as time
    pub fn current_latency(&self) -> Duration {
        let read_pos = self.read_pos.load(Ordering::Acquire);
        let write_pos = self.write_pos.load(Ordering::Acquire);
        self.samples_to_duration(write_pos.saturating_sub(read_pos))
    }

    /// Readable samples as a fraction of the ring size (0.0 to 1.0)
    pub fn utilization(&self) -> f32 {
        self.available_data() as f32 / self.size as f32
    }

    /// Samples currently readable
    pub fn available_data(&self) -> usize {
        let read_pos = self.read_pos.load(Ordering::Acquire);
        let write_pos = self.write_pos.load(Ordering::Acquire);
        self.data_between(read_pos, write_pos)
    }

    /// Samples that can be written without overrunning
    pub fn available_space(&self) -> usize {
        let read_pos = self.read_pos.load(Ordering::Acquire);
        let write_pos = self.write_pos.load(Ordering::Acquire);
        self.space_between(read_pos, write_pos)
    }

    /// Ring size in samples (a power of two)
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Index mask, `size - 1`
    pub fn mask(&self) -> u32 {
        self.mask
    }

    /// Enforced write-ahead distance in samples (all channels)
    pub fn latency_samples(&self) -> u32 {
        self.latency_samples
    }

    /// Total samples consumed so far
    pub fn read_pos(&self) -> u64 {
        self.read_pos.load(Ordering::Acquire)
    }

    /// Total samples produced so far, including the initial write-ahead
    pub fn write_pos(&self) -> u64 {
        self.write_pos.load(Ordering::Acquire)
    }

    fn data_between(&self, read_pos: u64, write_pos: u64) -> usize {
        // A reader ahead of the writer can only come from misuse; read nothing
        write_pos.saturating_sub(read_pos).min(u64::from(self.size)) as usize
    }

    fn space_between(&self, read_pos: u64, write_pos: u64) -> usize {
        let used = write_pos.saturating_sub(read_pos).min(u64::from(self.size));
        (u64::from(self.size) - used) as usize
    }

    /// Storage ranges covering `len` samples from `pos`, split at the wrap point
    fn spans(&self, pos: u64, len: usize) -> (Range<usize>, Range<usize>) {
        let start = (pos & u64::from(self.mask)) as usize;
        let first = len.min(self.data.len() - start);
        (start..start + first, 0..len - first)
    }

    fn samples_to_duration(&self, samples: u64) -> Duration {
        if self.sample_rate.is_nan() || self.sample_rate <= 0.0 {
            return Duration::ZERO;
        }
        let frames = samples as f64 / self.channels as f64;
        Duration::from_secs_f64(frames / self.sample_rate)
    }
}

/// Largest ring, in samples, a buffer will allocate
pub const MAX_RING_SIZE: u32 = 1 << 24;

/// Round up to the next power of two; `next_power_of_two(0) == 1`
pub fn next_power_of_two(n: u32) -> u32 {
    if n == 0 {
        return 1;
    }
    let mut n = n - 1;
    n |= n >> 1;
    n |= n >> 2;
    n |= n >> 4;
    n |= n >> 8;
    n |= n >> 16;
    n.wrapping_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_new_buffer() {
        let buf = RingBuffer::new(44100.0, 2);

        assert_eq!(buf.size().count_ones(), 1, "size must be a power of two");
        assert_eq!(buf.latency_samples(), 2205 * 2);
        assert_eq!(buf.write_pos(), u64::from(buf.latency_samples()));
        assert_eq!(buf.read_pos(), 0);
        assert_eq!(buf.mask(), buf.size() - 1);
    }

    #[test]
    fn test_latency_and_sizing_across_rates() {
        for &rate in &[22050.0, 44100.0, 48000.0, 88200.0, 96000.0, 192000.0] {
            for &channels in &[1usize, 2, 6] {
                let buf = RingBuffer::new(rate, channels);
                let latency = buf.latency_samples();

                assert_eq!(buf.size().count_ones(), 1);
                assert!(buf.size() >= latency * 4);
                assert_eq!(buf.mask(), buf.size() - 1);
                assert_eq!(buf.write_pos() - buf.read_pos(), u64::from(latency));

                let expected = Duration::from_millis(50).as_secs_f64();
                let measured = buf.current_latency().as_secs_f64();
                assert!(
                    (measured - expected).abs() <= 1.0 / rate,
                    "rate {} channels {}: latency {}s",
                    rate,
                    channels,
                    measured
                );
            }
        }
    }

    #[test]
    fn test_write_read() {
        let buf = RingBuffer::new(44100.0, 1);
        let latency = buf.latency_samples() as usize;

        let test_data = [1.0f32, 2.0, 3.0, 4.0, 5.0];
        buf.write(&test_data).unwrap();

        // The first reads return the initial write-ahead silence
        let mut output = [0.0f32; 5];
        let n = buf.read(&mut output);
        assert_eq!(n, output.len());
        assert!(output.iter().all(|&s| s == 0.0));

        let more: Vec<f32> = (0..latency).map(|i| (i + 10) as f32).collect();
        buf.write(&more).unwrap();

        let mut silence = vec![1.0f32; latency - test_data.len()];
        buf.read(&mut silence);
        assert!(silence.iter().all(|&s| s == 0.0));

        let n = buf.read(&mut output);
        assert_eq!(n, output.len());
        assert_eq!(output, test_data);
    }

    #[test]
    fn test_round_trip_with_wraparound() {
        // 50 samples of latency, 256-sample ring
        let buf = RingBuffer::new(1000.0, 1);
        assert_eq!(buf.latency_samples(), 50);
        assert_eq!(buf.size(), 256);

        let mut next_value = 1.0f32;
        let mut written = Vec::new();
        let mut write_ramp = |buf: &RingBuffer, len: usize| {
            let chunk: Vec<f32> = (0..len)
                .map(|_| {
                    let v = next_value;
                    next_value += 1.0;
                    v
                })
                .collect();
            buf.write(&chunk).unwrap();
            written.extend_from_slice(&chunk);
        };

        write_ramp(&buf, 100);
        let mut silence = [1.0f32; 50];
        assert_eq!(buf.read(&mut silence), 50);
        assert!(silence.iter().all(|&s| s == 0.0));

        // Keep the reader at least one latency behind so nothing is re-read
        let mut received = Vec::new();
        let mut block = [0.0f32; 64];
        for _ in 0..20 {
            write_ramp(&buf, 64);
            assert_eq!(buf.read(&mut block), 64);
            received.extend_from_slice(&block);
        }

        assert!(buf.write_pos() > 4 * u64::from(buf.size()));
        assert_eq!(received[..], written[..received.len()]);
        assert_eq!(buf.stats().adjustments, 0);
        assert_eq!(buf.stats().overruns, 0);
    }

    #[test]
    fn test_latency_maintenance() {
        let buf = RingBuffer::new(44100.0, 1);
        let latency = u64::from(buf.latency_samples());

        let data: Vec<f32> = (0..latency + 1000).map(|i| i as f32).collect();
        buf.write(&data).unwrap();

        // Force the reader much closer than the write-ahead distance
        let write_pos = buf.write_pos();
        buf.read_pos.store(write_pos - 100, Ordering::Release);

        let mut output = [0.0f32; 10];
        let n = buf.read(&mut output);
        assert_eq!(n, 10);
        assert_eq!(buf.stats().adjustments, 1);

        // maintain_delay restored exactly `latency`, then the read advanced by n
        let gap = buf.write_pos() - buf.read_pos();
        assert_eq!(gap, latency - n as u64);
    }

    #[test]
    fn test_buffer_overrun() {
        let buf = RingBuffer::new(1000.0, 1);
        let write_before = buf.write_pos();

        let too_much = vec![1.0f32; buf.size() as usize + 100];
        let err = buf.write(&too_much).unwrap_err();
        assert_eq!(
            err,
            BufferError::Overrun {
                requested: too_much.len(),
                available: (buf.size() - buf.latency_samples()) as usize,
            }
        );

        let stats = buf.stats();
        assert_eq!(stats.overruns, 1);
        assert_eq!(buf.write_pos(), write_before);
        assert_eq!(buf.read_pos(), 0);
        assert!(buf.data.iter().all(|s| s.load(Ordering::Relaxed) == 0.0));
    }

    #[test]
    fn test_buffer_underrun() {
        let buf = RingBuffer::new(44100.0, 1);
        let latency = buf.latency_samples() as usize;

        let mut output = vec![1.0f32; latency * 2];
        let n = buf.read(&mut output);

        assert_eq!(n, latency);
        assert!(n < output.len());
        assert!(output[n..].iter().all(|&s| s == 0.0));
        assert_eq!(buf.stats().underruns, 1);
    }

    #[test]
    fn test_reset() {
        let mut buf = RingBuffer::new(44100.0, 1);

        buf.write(&vec![0.5f32; 1000]).unwrap();
        let mut out = vec![0.0f32; 1000];
        for _ in 0..3 {
            buf.read(&mut out);
        }
        let _ = buf.write(&vec![0.5f32; buf.size() as usize + 100]);
        let stats = buf.stats();
        assert!(stats.adjustments > 0 || stats.underruns > 0);
        assert_eq!(stats.overruns, 1);

        buf.reset();

        let stats = buf.stats();
        assert_eq!(stats.underruns, 0);
        assert_eq!(stats.overruns, 0);
        assert_eq!(stats.adjustments, 0);
        assert_eq!(buf.read_pos(), 0);
        assert_eq!(buf.write_pos(), u64::from(buf.latency_samples()));
        assert!(buf.data.iter().all(|s| s.load(Ordering::Relaxed) == 0.0));
    }

    #[test]
    fn test_buffer_health_metrics() {
        let buf = RingBuffer::new(44100.0, 1);

        let stats = buf.stats();
        assert!(stats.fill_percentage > 0.0);

        let expected = Duration::from_millis(50);
        let tolerance = Duration::from_micros(100);
        assert!(stats.current_latency >= expected - tolerance);
        assert!(stats.current_latency <= expected + tolerance);

        let utilization = buf.utilization();
        assert!(utilization > 0.0 && utilization <= 1.0);
        approx::assert_relative_eq!(utilization * 100.0, stats.fill_percentage);

        buf.write(&[0.0f32; 1000]).unwrap();
        assert!(buf.stats().fill_percentage > stats.fill_percentage);
    }

    #[test]
    fn test_next_power_of_two() {
        let cases = [
            (0, 1),
            (1, 1),
            (2, 2),
            (3, 4),
            (5, 8),
            (15, 16),
            (16, 16),
            (17, 32),
            (1000, 1024),
            (2048, 2048),
        ];
        for (input, expected) in cases {
            assert_eq!(next_power_of_two(input), expected, "input {}", input);
        }
    }

    #[test]
    fn test_oversized_request_is_clamped() {
        let buf = RingBuffer::with_latency_samples(48000.0, 2, u32::MAX, 4);
        assert_eq!(buf.size(), MAX_RING_SIZE);
        assert_eq!(buf.mask(), MAX_RING_SIZE - 1);
        assert_eq!(buf.latency_samples(), MAX_RING_SIZE / 4);

        let buf = RingBuffer::with_latency_samples(48000.0, 1, 2400, u32::MAX);
        assert!(buf.size().is_power_of_two());
        assert!(buf.latency_samples() <= buf.size());
    }

    #[test]
    fn test_empty_slices_are_noops() {
        let buf = RingBuffer::new(48000.0, 1);
        assert!(buf.write(&[]).is_ok());
        assert_eq!(buf.read(&mut []), 0);
        assert_eq!(buf.stats(), RingBuffer::new(48000.0, 1).stats());
    }

    #[test]
    fn test_single_reader_sees_contiguous_data() {
        let buf = Arc::new(RingBuffer::new(48000.0, 1));
        let done = Arc::new(AtomicBool::new(false));
        const TOTAL: usize = 200_000;

        let writer = {
            let buf = Arc::clone(&buf);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut next = 1.0f32;
                let mut sent = 0usize;
                let mut chunk = [0.0f32; 256];
                while sent < TOTAL {
                    for s in chunk.iter_mut() {
                        *s = next;
                        next += 1.0;
                    }
                    while buf.write(&chunk).is_err() {
                        thread::yield_now();
                    }
                    sent += chunk.len();
                }
                done.store(true, Ordering::Release);
            })
        };

        let mut block = [0.0f32; 128];
        let mut reads = 0u64;
        while !done.load(Ordering::Acquire) {
            let n = buf.read(&mut block);
            reads += 1;
            // Positions only move forward within one read, so values must too
            for pair in block[..n].windows(2) {
                if pair[0] != 0.0 {
                    assert_eq!(pair[1], pair[0] + 1.0, "discontinuity inside a read");
                }
            }
        }

        writer.join().unwrap();
        assert!(buf.stats().adjustments <= reads);
    }

    #[test]
    fn test_concurrent_stress() {
        let buf = Arc::new(RingBuffer::new(44100.0, 2));
        let deadline = Instant::now() + Duration::from_millis(200);
        const THREADS: usize = 4;

        let mut handles = Vec::new();
        for id in 0..THREADS {
            let buf = Arc::clone(&buf);
            handles.push(thread::spawn(move || {
                let data = vec![id as f32; 100];
                let mut writes = 0u64;
                while Instant::now() < deadline {
                    if buf.write(&data).is_err() {
                        thread::sleep(Duration::from_micros(200));
                    }
                    writes += 1;
                }
                (writes, 0u64)
            }));
        }
        for _ in 0..THREADS {
            let buf = Arc::clone(&buf);
            handles.push(thread::spawn(move || {
                let mut output = [0.0f32; 100];
                let mut reads = 0u64;
                while Instant::now() < deadline {
                    let n = buf.read(&mut output);
                    assert!(n <= output.len());
                    reads += 1;
                    thread::sleep(Duration::from_micros(100));
                }
                (0u64, reads)
            }));
        }

        let mut total_reads = 0u64;
        for handle in handles {
            let (_, reads) = handle.join().expect("stress thread panicked");
            total_reads += reads;
        }

        // At most one adjustment per read call
        let stats = buf.stats();
        assert!(stats.adjustments <= total_reads);
        assert!(buf.available_data() <= buf.size() as usize);
        assert!(stats.fill_percentage <= 100.0);
    }

    mod properties {
        use super::super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn proptest_sizing_invariants(rate in 8000u32..200_000, channels in 1usize..8) {
                let buf = RingBuffer::new(f64::from(rate), channels);
                let latency = buf.latency_samples();

                prop_assert_eq!(buf.size().count_ones(), 1);
                prop_assert!(buf.size() >= latency * 4);
                prop_assert!(buf.size() < latency * 8);
                prop_assert_eq!(buf.mask(), buf.size() - 1);
            }

            #[test]
            fn proptest_next_power_of_two_is_smallest(n in 1u32..(1 << 31)) {
                let p = next_power_of_two(n);
                prop_assert_eq!(p.count_ones(), 1);
                prop_assert!(p >= n);
                prop_assert!(p / 2 < n);
            }
        }
    }
}
