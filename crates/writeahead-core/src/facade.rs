//! Host-facing wrapper
//!
//! [`BufferedProcessor`] is the only type the audio callback touches. Its
//! `process_audio` copies already-rendered samples out of the channel
//! rings; the wrapped [`Processor`] runs on the background scheduler and is
//! never called from the callback.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized ──initialize──▶ Initialized ──set_active──▶ Active ⇄ Inactive
//!        └───────────────────────────┴──────────release─────────┴──▶ Released
//! ```

use crate::buffer::{BufferStats, ChannelBufferSet};
use crate::config::BufferConfig;
use crate::error::Error;
use crate::event::{event_channel, EventQueue, EventStats, HostEvent, ParameterChange};
use crate::processor::Processor;
use crate::scheduler::{BackgroundScheduler, ChunkWorker};
use crate::stats::StatsSnapshot;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Lifecycle state of a [`BufferedProcessor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Uninitialized,
    /// Scheduler running, processor not yet activated
    Initialized,
    Active,
    Inactive,
    /// Terminal
    Released,
}

/// Everything that exists between `initialize` and `release`
struct Running<P: Processor> {
    buffers: Arc<ChannelBufferSet>,
    queue: EventQueue,
    scheduler: BackgroundScheduler<P>,
    /// Activation the wrapped processor accepted, written by the worker
    processing: Arc<AtomicBool>,
    latency_samples: u32,
    wrapped_latency: u32,
    wrapped_tail: u32,
}

/// Write-ahead buffered wrapper around a [`Processor`]
pub struct BufferedProcessor<P: Processor> {
    /// Held until `initialize` hands it to the scheduler
    processor: Option<P>,
    num_channels: usize,
    config: BufferConfig,
    state: ProcessorState,
    active: Arc<AtomicBool>,
    running: Option<Running<P>>,
}

impl<P: Processor> BufferedProcessor<P> {
    /// Wrap `processor` with default buffering
    pub fn new(processor: P, num_channels: usize) -> Self {
        Self::with_config(processor, num_channels, BufferConfig::default())
    }

    /// Wrap `processor` with custom buffering (validated in `initialize`)
    pub fn with_config(processor: P, num_channels: usize, config: BufferConfig) -> Self {
        Self {
            processor: Some(processor),
            num_channels,
            config,
            state: ProcessorState::Uninitialized,
            active: Arc::new(AtomicBool::new(false)),
            running: None,
        }
    }

    /// Initialize the wrapped processor, allocate and prefill the channel
    /// rings and start the background scheduler
    ///
    /// # Arguments
    /// * `sample_rate` - Sample rate in Hz
    /// * `max_block_size` - Largest block the host will request, also the chunk size
    pub fn initialize(&mut self, sample_rate: f64, max_block_size: usize) -> Result<(), Error> {
        match self.state {
            ProcessorState::Uninitialized => {}
            ProcessorState::Released => return Err(Error::Released),
            _ => return Err(Error::AlreadyInitialized),
        }
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(Error::InvalidSampleRate(sample_rate));
        }
        if max_block_size == 0 {
            return Err(Error::InvalidBlockSize(max_block_size));
        }
        if self.num_channels == 0 {
            return Err(Error::NoChannels);
        }
        self.config.validate()?;
        self.config.check_ring_size(sample_rate)?;

        let processor = self.processor.as_mut().ok_or(Error::Released)?;
        processor.initialize(sample_rate, max_block_size)?;
        let wrapped_latency = processor.latency_samples();
        let wrapped_tail = processor.tail_samples();

        let latency_samples = self.config.latency_samples(sample_rate);
        let buffers = Arc::new(ChannelBufferSet::new(
            self.num_channels,
            sample_rate,
            latency_samples,
            self.config.size_multiplier,
        ));
        buffers.prefill_silence()?;

        let clock = Arc::new(AtomicU64::new(0));
        let (queue, aligner) =
            event_channel(self.config.event_capacity, latency_samples, Arc::clone(&clock));

        let processor = self.processor.take().ok_or(Error::Released)?;
        let worker = ChunkWorker::new(
            processor,
            Arc::clone(&buffers),
            aligner,
            clock,
            Arc::clone(&self.active),
            max_block_size,
        );
        let processing = worker.activation_state();
        let scheduler = match BackgroundScheduler::spawn(worker, self.config.tick_interval()) {
            Ok(scheduler) => scheduler,
            Err(e) => {
                // The processor went down with the failed thread
                self.state = ProcessorState::Released;
                return Err(e.into());
            }
        };

        tracing::info!(
            sample_rate,
            max_block_size,
            channels = self.num_channels,
            latency_samples,
            ring_size = buffers.get(0).map(|b| b.size()).unwrap_or(0),
            "Buffered processor initialized"
        );

        self.running = Some(Running {
            buffers,
            queue,
            scheduler,
            processing,
            latency_samples,
            wrapped_latency,
            wrapped_tail,
        });
        self.state = ProcessorState::Initialized;
        Ok(())
    }

    /// Real-time callback: fill `outputs` from the channel rings
    ///
    /// Never blocks, allocates or logs. Host channels beyond the configured
    /// count, and everything while not active, are filled with silence.
    /// `changes` are queued for the scheduler on the delayed timeline.
    pub fn process_audio(
        &mut self,
        outputs: &mut [&mut [f32]],
        num_samples: usize,
        changes: &[ParameterChange],
    ) {
        let Some(running) = self.running.as_ref() else {
            for out in outputs.iter_mut() {
                out.fill(0.0);
            }
            return;
        };

        let active = self.state == ProcessorState::Active;
        for (channel, out) in outputs.iter_mut().enumerate() {
            let n = num_samples.min(out.len());
            if active && channel < running.buffers.len() {
                running.buffers.read(channel, &mut out[..n]);
            } else {
                out[..n].fill(0.0);
            }
        }

        for change in changes {
            running.queue.enqueue((*change).into());
        }
    }

    /// Request activation; applied by the scheduler on its next tick
    pub fn set_active(&mut self, active: bool) -> Result<(), Error> {
        match self.state {
            ProcessorState::Uninitialized => return Err(Error::NotInitialized),
            ProcessorState::Released => return Err(Error::Released),
            _ => {}
        }

        self.active.store(active, Ordering::Release);
        self.state = if active {
            ProcessorState::Active
        } else {
            ProcessorState::Inactive
        };
        tracing::info!(active, "Activation requested");
        Ok(())
    }

    /// Write-ahead latency plus whatever the wrapped processor reports
    pub fn latency_samples(&self) -> u32 {
        match (&self.running, &self.processor) {
            (Some(running), _) => running
                .latency_samples
                .saturating_add(running.wrapped_latency),
            (None, Some(processor)) => processor.latency_samples(),
            (None, None) => 0,
        }
    }

    pub fn tail_samples(&self) -> u32 {
        match (&self.running, &self.processor) {
            (Some(running), _) => running.wrapped_tail,
            (None, Some(processor)) => processor.tail_samples(),
            (None, None) => 0,
        }
    }

    /// Queue an event for the scheduler; `false` if it was dropped or the
    /// processor is not running
    pub fn queue_event(&self, event: HostEvent) -> bool {
        match &self.running {
            Some(running) => running.queue.enqueue(event),
            None => false,
        }
    }

    /// One entry per channel, empty when not running
    pub fn buffer_stats(&self) -> Vec<BufferStats> {
        self.running
            .as_ref()
            .map(|r| r.buffers.stats())
            .unwrap_or_default()
    }

    pub fn event_stats(&self) -> EventStats {
        self.running
            .as_ref()
            .map(|r| r.queue.stats())
            .unwrap_or_default()
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        StatsSnapshot::new(
            self.latency_samples(),
            self.is_processing(),
            self.buffer_stats(),
            self.event_stats(),
        )
    }

    /// Requested lifecycle state; see [`Self::is_processing`] for whether the
    /// wrapped processor accepted the last activation request
    pub fn state(&self) -> ProcessorState {
        self.state
    }

    /// `true` once the scheduler has activated the wrapped processor and is
    /// rendering. Stays `false` after `set_active(true)` if the processor
    /// rejected the activation.
    pub fn is_processing(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| r.processing.load(Ordering::Acquire))
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Stop the scheduler and tear down. Safe to call more than once.
    ///
    /// When active, a bounded number of extra chunks are rendered first so
    /// the wrapped processor's output is not cut off mid-stream.
    pub fn release(&mut self) {
        if self.state == ProcessorState::Released {
            return;
        }
        let was_active = self.state == ProcessorState::Active;

        if let Some(mut running) = self.running.take() {
            match running.scheduler.stop() {
                Some(mut worker) => {
                    if was_active {
                        worker.drain(self.config.release_drain_chunks, self.config.tick_interval());
                    }
                    worker.deactivate();
                }
                None => tracing::warn!("Scheduler worker lost, skipping release drain"),
            }
        }

        self.active.store(false, Ordering::Release);
        self.processor = None;
        self.state = ProcessorState::Released;
        tracing::info!("Buffered processor released");
    }
}

impl<P: Processor> Drop for BufferedProcessor<P> {
    fn drop(&mut self) {
        self.release();
    }
}
