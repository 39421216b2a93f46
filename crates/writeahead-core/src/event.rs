//! Latency-aligned timestamped events
//!
//! The real-time side raises events (MIDI, parameter changes) against the
//! block it is currently playing. The audio it plays was rendered one
//! write-ahead latency earlier, so each event is shifted by that latency
//! when it is queued and delivered to whichever processing chunk covers its
//! shifted time.
//!
//! ```text
//! host block ──enqueue (+latency)──▶ bounded queue ──drain_for_window──▶ chunk
//! ```
//!
//! Both ends are non-blocking. A full queue drops the new event; an event
//! whose window has already been rendered is dropped as late. Both are
//! counted in [`EventStats`].

use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// What an event carries
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// Raw MIDI bytes
    Midi(Vec<u8>),
    /// Host parameter change
    Parameter { id: u32, value: f64 },
}

/// Event as raised by the host, before latency alignment
#[derive(Debug, Clone, PartialEq)]
pub struct HostEvent {
    pub payload: EventPayload,
    /// Position within the host block it was raised in
    pub sample_offset: u32,
    /// Absolute sample time; `None` derives it from the scheduler clock
    pub timestamp: Option<u64>,
}

impl HostEvent {
    /// MIDI event at `sample_offset` within the current block
    pub fn midi(data: impl Into<Vec<u8>>, sample_offset: u32) -> Self {
        Self {
            payload: EventPayload::Midi(data.into()),
            sample_offset,
            timestamp: None,
        }
    }

    /// Pin the event to an absolute sample time
    pub fn at(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Parameter change handed over by the host with an audio block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterChange {
    pub id: u32,
    pub value: f64,
    pub sample_offset: u32,
}

impl From<ParameterChange> for HostEvent {
    fn from(change: ParameterChange) -> Self {
        Self {
            payload: EventPayload::Parameter {
                id: change.id,
                value: change.value,
            },
            sample_offset: change.sample_offset,
            timestamp: None,
        }
    }
}

/// Event on the delayed timeline
///
/// `timestamp` already includes the write-ahead latency. Once delivered,
/// `sample_offset` is relative to the start of the chunk being processed.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampedEvent {
    pub payload: EventPayload,
    pub sample_offset: u32,
    pub timestamp: u64,
}

/// Event path counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStats {
    /// Events accepted into the queue
    pub queued: u64,
    /// Events dropped because the queue was full
    pub dropped_full: u64,
    /// Events dropped because their window was already rendered
    pub dropped_late: u64,
    /// Events handed to the processor
    pub delivered: u64,
}

#[derive(Debug, Default)]
struct EventCounters {
    queued: AtomicU64,
    dropped_full: AtomicU64,
    dropped_late: AtomicU64,
    delivered: AtomicU64,
}

impl EventCounters {
    fn snapshot(&self) -> EventStats {
        EventStats {
            queued: self.queued.load(Ordering::Relaxed),
            dropped_full: self.dropped_full.load(Ordering::Relaxed),
            dropped_late: self.dropped_late.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
        }
    }
}

/// Create the two ends of a bounded, latency-shifting event queue
///
/// # Arguments
/// * `capacity` - Maximum queued events before new ones are dropped
/// * `latency_samples` - Shift applied to every event timestamp
/// * `clock` - Scheduler sample clock, used for events without a timestamp
pub fn event_channel(
    capacity: usize,
    latency_samples: u32,
    clock: Arc<AtomicU64>,
) -> (EventQueue, EventTimeAligner) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    let counters = Arc::new(EventCounters::default());

    let queue = EventQueue {
        tx,
        clock,
        latency_samples: u64::from(latency_samples),
        counters: Arc::clone(&counters),
    };
    let aligner = EventTimeAligner {
        rx,
        held: None,
        due: Vec::with_capacity(128),
        counters,
    };
    (queue, aligner)
}

/// Producer end, used from the real-time side
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: Sender<TimestampedEvent>,
    clock: Arc<AtomicU64>,
    latency_samples: u64,
    counters: Arc<EventCounters>,
}

impl EventQueue {
    /// Shift an event onto the delayed timeline and queue it
    ///
    /// Never blocks. Returns `false` when the event was dropped.
    pub fn enqueue(&self, event: HostEvent) -> bool {
        let base = event.timestamp.unwrap_or_else(|| {
            self.clock.load(Ordering::Acquire) + u64::from(event.sample_offset)
        });
        let aligned = TimestampedEvent {
            payload: event.payload,
            sample_offset: event.sample_offset,
            timestamp: base + self.latency_samples,
        };

        match self.tx.try_send(aligned) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.counters.dropped_full.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn stats(&self) -> EventStats {
        self.counters.snapshot()
    }

    /// Shift applied to every timestamp
    pub fn latency_samples(&self) -> u64 {
        self.latency_samples
    }
}

/// Consumer end, owned by the background scheduler
#[derive(Debug)]
pub struct EventTimeAligner {
    rx: Receiver<TimestampedEvent>,
    /// First event of a future window, kept aside so arrival order survives
    held: Option<TimestampedEvent>,
    due: Vec<TimestampedEvent>,
    counters: Arc<EventCounters>,
}

impl EventTimeAligner {
    /// Collect the events that fall inside `[chunk_start, chunk_end)`
    ///
    /// Events inside the window get `sample_offset = timestamp - chunk_start`.
    /// Draining stops at the first event at or past `chunk_end`, which stays
    /// queued for a later window. Events before `chunk_start` are dropped.
    pub fn drain_for_window(&mut self, chunk_start: u64, chunk_end: u64) -> &[TimestampedEvent] {
        self.due.clear();

        loop {
            let mut event = match self.held.take() {
                Some(event) => event,
                None => match self.rx.try_recv() {
                    Ok(event) => event,
                    Err(_) => break,
                },
            };

            if event.timestamp >= chunk_end {
                self.held = Some(event);
                break;
            }

            if event.timestamp < chunk_start {
                self.counters.dropped_late.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(
                    timestamp = event.timestamp,
                    chunk_start,
                    "Dropping late event"
                );
                continue;
            }

            event.sample_offset = (event.timestamp - chunk_start) as u32;
            self.due.push(event);
        }

        self.counters
            .delivered
            .fetch_add(self.due.len() as u64, Ordering::Relaxed);
        &self.due
    }

    /// Events still waiting, including one held for a future window
    pub fn pending_len(&self) -> usize {
        self.rx.len() + usize::from(self.held.is_some())
    }

    pub fn stats(&self) -> EventStats {
        self.counters.snapshot()
    }
}
