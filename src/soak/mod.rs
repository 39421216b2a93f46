//! Stall soak test
//!
//! Wraps a [`counter::CounterProcessor`] in a [`BufferedProcessor`], plays
//! the host role from a dedicated thread at real-time block cadence and
//! checks the delivered counter for breaks.
//!
//! ```text
//! scheduler ─▶ rings ─▶ host thread ─▶ monitor ring (SPSC) ─▶ continuity analyzer
//! ```

pub mod cli;
pub mod continuity;
pub mod counter;

use anyhow::{anyhow, Result};
use continuity::{ContinuityAnalyzer, ContinuityReport};
use counter::CounterProcessor;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use writeahead_core::{BufferConfig, BufferedProcessor, HostEvent, StatsSnapshot};

/// MIDI timing clock, queued periodically to exercise the event path
const CLOCK_EVENT: u8 = 0xF8;

/// Blocks between queued clock events
const EVENT_INTERVAL_BLOCKS: u64 = 32;

/// Soak run parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoakOptions {
    pub sample_rate: u32,
    pub channels: usize,
    pub block_size: usize,
    pub seconds: f64,
    pub stall_ms: u64,
    pub stall_every: usize,
    #[serde(skip)]
    pub buffer: BufferConfig,
}

impl Default for SoakOptions {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            block_size: 256,
            seconds: 5.0,
            stall_ms: 20,
            stall_every: 50,
            buffer: BufferConfig::default(),
        }
    }
}

impl SoakOptions {
    /// Real-time length of one host block
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / f64::from(self.sample_rate))
    }
}

/// Outcome of a soak run
#[derive(Debug, Clone, Serialize)]
pub struct SoakReport {
    pub options: SoakOptions,
    pub blocks: u64,
    pub stalls: u64,
    /// Counter samples the monitor ring had no room for
    pub monitor_overflow: u64,
    pub events_received: u64,
    pub continuity: ContinuityReport,
    pub stats: StatsSnapshot,
}

impl SoakReport {
    /// No audible glitch: no counter breaks and no underruns
    pub fn is_healthy(&self) -> bool {
        self.continuity.is_clean() && self.stats.total_underruns() == 0
    }
}

struct HostSummary {
    blocks: u64,
    monitor_overflow: u64,
    stats: StatsSnapshot,
}

/// Run a soak until `options.seconds` elapse or `running` is cleared
pub fn run_soak(options: SoakOptions, running: Arc<AtomicBool>) -> Result<SoakReport> {
    options.buffer.validate()?;
    if options.block_size == 0 || options.channels == 0 {
        return Err(anyhow!("block size and channel count must be non-zero"));
    }
    let run_time = Duration::try_from_secs_f64(options.seconds).map_err(|_| {
        anyhow!(
            "run time must be a finite, non-negative number of seconds, got {}",
            options.seconds
        )
    })?;

    let processor = CounterProcessor::new(
        Duration::from_millis(options.stall_ms),
        options.stall_every,
    );
    let stalls = processor.stall_counter();
    let events = processor.event_counter();

    let mut wrapped =
        BufferedProcessor::with_config(processor, options.channels, options.buffer.clone());
    wrapped.initialize(f64::from(options.sample_rate), options.block_size)?;
    wrapped.set_active(true)?;

    tracing::info!(
        sample_rate = options.sample_rate,
        block_size = options.block_size,
        latency_samples = wrapped.latency_samples(),
        stall_ms = options.stall_ms,
        stall_every = options.stall_every,
        "Soak started"
    );

    let monitor = HeapRb::<f32>::new(options.sample_rate as usize);
    let (producer, mut consumer) = monitor.split();

    let host_options = options.clone();
    let host_running = Arc::clone(&running);
    let host = std::thread::Builder::new()
        .name("soak-host".into())
        .spawn(move || host_loop(wrapped, producer, &host_options, run_time, &host_running))?;

    let mut analyzer = ContinuityAnalyzer::default();
    let mut scratch = vec![0.0f32; (options.sample_rate as usize / 10).max(1024)];
    while !host.is_finished() {
        drain_monitor(&mut consumer, &mut analyzer, &mut scratch);
        std::thread::sleep(Duration::from_millis(10));
    }
    let summary = host
        .join()
        .map_err(|_| anyhow!("soak host thread panicked"))?;
    drain_monitor(&mut consumer, &mut analyzer, &mut scratch);

    let report = SoakReport {
        options,
        blocks: summary.blocks,
        stalls: stalls.load(Ordering::Relaxed),
        monitor_overflow: summary.monitor_overflow,
        events_received: events.load(Ordering::Relaxed),
        continuity: analyzer.finish(),
        stats: summary.stats,
    };
    tracing::info!(
        blocks = report.blocks,
        stalls = report.stalls,
        discontinuities = report.continuity.discontinuities,
        underruns = report.stats.total_underruns(),
        "Soak finished"
    );
    Ok(report)
}

/// Play the host: one `process_audio` per block period, channel 0 to the monitor
fn host_loop(
    mut wrapped: BufferedProcessor<CounterProcessor>,
    mut monitor: ringbuf::HeapProd<f32>,
    options: &SoakOptions,
    run_time: Duration,
    running: &AtomicBool,
) -> HostSummary {
    let period = options.block_duration();
    // None when the run time is too long to represent; runs until stopped
    let deadline = Instant::now().checked_add(run_time);
    let mut channels = vec![vec![0.0f32; options.block_size]; options.channels];
    let mut outputs: Vec<&mut [f32]> = channels.iter_mut().map(|c| c.as_mut_slice()).collect();
    let mut blocks = 0u64;
    let mut monitor_overflow = 0u64;
    let mut next = Instant::now();

    while running.load(Ordering::SeqCst) && deadline.map_or(true, |d| Instant::now() < d) {
        wrapped.process_audio(&mut outputs, options.block_size, &[]);

        let pushed = monitor.push_slice(&outputs[0]);
        monitor_overflow += (options.block_size - pushed) as u64;

        if blocks % EVENT_INTERVAL_BLOCKS == 0 {
            wrapped.queue_event(HostEvent::midi([CLOCK_EVENT], 0));
        }
        blocks += 1;

        next += period;
        let now = Instant::now();
        if next > now {
            std::thread::sleep(next - now);
        } else {
            // Behind schedule: keep cadence from here instead of bursting
            next = now;
        }
    }

    let stats = wrapped.stats_snapshot();
    wrapped.release();
    HostSummary {
        blocks,
        monitor_overflow,
        stats,
    }
}

fn drain_monitor(
    consumer: &mut ringbuf::HeapCons<f32>,
    analyzer: &mut ContinuityAnalyzer,
    scratch: &mut [f32],
) {
    while consumer.occupied_len() > 0 {
        let read = consumer.pop_slice(scratch);
        if read == 0 {
            break;
        }
        analyzer.feed(&scratch[..read]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_duration() {
        let options = SoakOptions {
            sample_rate: 48000,
            block_size: 24000,
            ..Default::default()
        };
        assert_eq!(options.block_duration(), Duration::from_millis(500));
    }

    #[test]
    fn test_rejects_unusable_run_time() {
        for seconds in [f64::INFINITY, f64::NAN, -1.0, 1.0e30] {
            let options = SoakOptions {
                seconds,
                ..Default::default()
            };
            assert!(
                run_soak(options, Arc::new(AtomicBool::new(true))).is_err(),
                "seconds = {}",
                seconds
            );
        }
    }

    #[test]
    fn test_rejects_zero_block() {
        let options = SoakOptions {
            block_size: 0,
            ..Default::default()
        };
        assert!(run_soak(options, Arc::new(AtomicBool::new(true))).is_err());
    }

    #[test]
    fn test_options_json_omits_buffer_config() {
        let json = serde_json::to_value(SoakOptions::default()).unwrap();
        assert_eq!(json["sample_rate"], 48000);
        assert!(json.get("buffer").is_none());
    }
}
