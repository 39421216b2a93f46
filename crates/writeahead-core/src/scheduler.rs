//! Adaptive background scheduler
//!
//! A dedicated thread wakes every tick, looks at how full the channel
//! buffers are and renders 0, 1, 2 or 4 chunks to keep them ahead of the
//! audio callback. Everything that touches the wrapped processor after
//! initialization happens here.

use crate::buffer::ChannelBufferSet;
use crate::event::EventTimeAligner;
use crate::processor::Processor;
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Number of chunks to render for the lowest channel fill percentage
pub fn chunks_for_fill(min_fill: f32) -> usize {
    if min_fill < 30.0 {
        4
    } else if min_fill < 50.0 {
        2
    } else if min_fill < 80.0 {
        1
    } else {
        0
    }
}

/// State owned by the scheduler thread
pub struct ChunkWorker<P: Processor> {
    processor: P,
    buffers: Arc<ChannelBufferSet>,
    aligner: EventTimeAligner,
    /// Samples rendered so far; the event queue reads it too
    clock: Arc<AtomicU64>,
    /// Activation requested by the host
    active: Arc<AtomicBool>,
    /// Last request acted on, so a failed `set_active` is not retried every tick
    seen_request: bool,
    processor_active: bool,
    /// Mirror of `processor_active` for readers outside the worker
    applied: Arc<AtomicBool>,
    max_block_size: usize,
    inputs: Vec<Vec<f32>>,
    outputs: Vec<Vec<f32>>,
    chunks_rendered: u64,
}

impl<P: Processor> ChunkWorker<P> {
    /// # Arguments
    /// * `processor` - Initialized, inactive processor
    /// * `buffers` - Channel rings shared with the audio callback
    /// * `aligner` - Consumer end of the event queue
    /// * `clock` - Sample clock shared with the event queue
    /// * `active` - Activation gate written by the host
    /// * `max_block_size` - Chunk size and scratch buffer length
    pub fn new(
        processor: P,
        buffers: Arc<ChannelBufferSet>,
        aligner: EventTimeAligner,
        clock: Arc<AtomicU64>,
        active: Arc<AtomicBool>,
        max_block_size: usize,
    ) -> Self {
        let channels = buffers.len();
        Self {
            processor,
            buffers,
            aligner,
            clock,
            active,
            seen_request: false,
            processor_active: false,
            applied: Arc::new(AtomicBool::new(false)),
            max_block_size,
            inputs: vec![vec![0.0; max_block_size]; channels],
            outputs: vec![vec![0.0; max_block_size]; channels],
            chunks_rendered: 0,
        }
    }

    /// Render one chunk of `num_samples` (capped at the block size) and
    /// append it to every channel
    pub fn process_chunk(&mut self, num_samples: usize) {
        let n = num_samples.min(self.max_block_size);
        if n == 0 {
            return;
        }

        for buf in self.inputs.iter_mut().chain(self.outputs.iter_mut()) {
            buf[..n].fill(0.0);
        }

        let chunk_start = self.clock.load(Ordering::Acquire);
        let events = self.aligner.drain_for_window(chunk_start, chunk_start + n as u64);
        if !events.is_empty() {
            self.processor.process_events(events);
        }

        self.processor.process_audio(&self.inputs, &mut self.outputs, n);

        for (channel, output) in self.outputs.iter().enumerate() {
            if let Err(e) = self.buffers.write(channel, &output[..n]) {
                tracing::trace!(channel, error = %e, "Chunk dropped");
            }
        }

        self.clock.fetch_add(n as u64, Ordering::Release);
        self.chunks_rendered += 1;
    }

    /// One scheduler tick: apply activation changes, then top up the
    /// buffers. Returns the number of chunks rendered.
    pub fn on_tick(&mut self) -> usize {
        self.reconcile_activation();
        if !self.processor_active {
            return 0;
        }

        let min_fill = self.buffers.min_fill_percentage();
        let chunks = chunks_for_fill(min_fill);
        if chunks > 1 {
            tracing::debug!(chunks, min_fill, "Buffers low, catching up");
        }
        for _ in 0..chunks {
            self.process_chunk(self.max_block_size);
        }
        chunks
    }

    fn reconcile_activation(&mut self) {
        let requested = self.active.load(Ordering::Acquire);
        if requested == self.seen_request {
            return;
        }
        self.seen_request = requested;

        match self.processor.set_active(requested) {
            Ok(()) => {
                self.set_processor_active(requested);
                tracing::info!(active = requested, "Processor activation applied");
            }
            Err(e) => {
                tracing::warn!(active = requested, error = %e, "Processor rejected activation change");
            }
        }
    }

    /// Render up to `max_chunks` more chunks on release so the tail is not
    /// cut off mid-stream. Stops early once every channel is nearly empty.
    pub fn drain(&mut self, max_chunks: usize, pause: Duration) -> usize {
        if !self.processor_active {
            return 0;
        }

        let mut rendered = 0;
        for i in 0..max_chunks {
            if self.buffers.max_fill_percentage() <= 1.0 {
                break;
            }
            self.process_chunk(self.max_block_size);
            rendered += 1;
            if i + 1 < max_chunks {
                std::thread::sleep(pause);
            }
        }
        tracing::debug!(rendered, "Release drain finished");
        rendered
    }

    /// Deactivate the processor if it is still active
    pub fn deactivate(&mut self) {
        if !self.processor_active {
            return;
        }
        match self.processor.set_active(false) {
            Ok(()) => self.set_processor_active(false),
            Err(e) => tracing::warn!(error = %e, "Processor failed to deactivate"),
        }
    }

    fn set_processor_active(&mut self, active: bool) {
        self.processor_active = active;
        self.applied.store(active, Ordering::Release);
    }

    /// Shared flag tracking whether the wrapped processor actually accepted
    /// activation, as opposed to the host's request
    pub fn activation_state(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.applied)
    }

    pub fn is_processor_active(&self) -> bool {
        self.processor_active
    }

    pub fn chunks_rendered(&self) -> u64 {
        self.chunks_rendered
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn into_processor(self) -> P {
        self.processor
    }

    fn run(&mut self, tick_interval: Duration, shutdown: &Receiver<()>) {
        let ticker = crossbeam_channel::tick(tick_interval);
        loop {
            crossbeam_channel::select! {
                recv(ticker) -> _ => {
                    self.on_tick();
                }
                recv(shutdown) -> _ => break,
            }
        }
    }
}

/// Handle to the running scheduler thread
pub struct BackgroundScheduler<P: Processor> {
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<Option<ChunkWorker<P>>>>,
}

impl<P: Processor> BackgroundScheduler<P> {
    /// Start ticking `worker` every `tick_interval` on a named thread
    pub fn spawn(worker: ChunkWorker<P>, tick_interval: Duration) -> std::io::Result<Self> {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);

        let thread = std::thread::Builder::new()
            .name("writeahead-scheduler".into())
            .spawn(move || {
                tracing::info!(?tick_interval, "Scheduler thread running");
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
                    let mut worker = worker;
                    worker.run(tick_interval, &shutdown_rx);
                    worker
                }));
                match result {
                    Ok(worker) => {
                        tracing::info!(
                            chunks = worker.chunks_rendered(),
                            "Scheduler thread exited normally"
                        );
                        Some(worker)
                    }
                    Err(panic_info) => {
                        let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                            s.to_string()
                        } else if let Some(s) = panic_info.downcast_ref::<String>() {
                            s.clone()
                        } else {
                            "unknown panic".to_string()
                        };
                        tracing::error!(panic = %msg, "Scheduler thread PANICKED");
                        None
                    }
                }
            })?;

        Ok(Self {
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    /// Stop the thread and hand the worker back
    ///
    /// Returns `None` if the worker panicked or was already stopped.
    pub fn stop(&mut self) -> Option<ChunkWorker<P>> {
        drop(self.shutdown.take());
        self.thread.take().and_then(|h| h.join().ok().flatten())
    }

    /// Check if the scheduler thread is still alive
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl<P: Processor> Drop for BackgroundScheduler<P> {
    fn drop(&mut self) {
        self.stop();
    }
}
