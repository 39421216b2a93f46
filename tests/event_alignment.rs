//! Integration tests for event alignment across the write-ahead latency
//!
//! Events are shifted by the buffer latency on the way in and must reach
//! the processor inside the chunk that renders their shifted time.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use writeahead::{
    BufferConfig, BufferedProcessor, EventPayload, HostEvent, Processor, ProcessorError,
    TimestampedEvent,
};

/// Absolute sample time and payload of every event a processor received
type Received = Arc<Mutex<Vec<(u64, EventPayload)>>>;

struct RecordingProcessor {
    frame: u64,
    received: Received,
}

impl Processor for RecordingProcessor {
    fn initialize(&mut self, _: f64, _: usize) -> Result<(), ProcessorError> {
        Ok(())
    }

    fn process_audio(&mut self, _: &[Vec<f32>], _: &mut [Vec<f32>], num_samples: usize) {
        self.frame += num_samples as u64;
    }

    fn set_active(&mut self, _: bool) -> Result<(), ProcessorError> {
        Ok(())
    }

    fn process_events(&mut self, events: &[TimestampedEvent]) {
        let mut received = self.received.lock().unwrap();
        for event in events {
            received.push((self.frame + u64::from(event.sample_offset), event.payload.clone()));
        }
    }
}

/// 10 samples of write-ahead at 1 kHz, 4 sample chunks
fn setup() -> (BufferedProcessor<RecordingProcessor>, Received) {
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let processor = RecordingProcessor {
        frame: 0,
        received: Arc::clone(&received),
    };
    let config = BufferConfig {
        latency_ms: 10.0,
        tick_interval_ms: 1,
        ..Default::default()
    };
    let mut wrapped = BufferedProcessor::with_config(processor, 1, config);
    wrapped.initialize(1000.0, 4).unwrap();
    (wrapped, received)
}

/// Keep the host reading until `cond` holds or 5 seconds pass
fn play_until(
    wrapped: &mut BufferedProcessor<RecordingProcessor>,
    mut cond: impl FnMut(&BufferedProcessor<RecordingProcessor>) -> bool,
) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut out = [0.0f32; 4];
    while Instant::now() < deadline {
        if cond(&*wrapped) {
            return true;
        }
        wrapped.process_audio(&mut [&mut out[..]], 4, &[]);
        std::thread::sleep(Duration::from_millis(1));
    }
    cond(&*wrapped)
}

#[test]
fn test_events_land_at_shifted_time() {
    let (mut wrapped, received) = setup();

    // Queued before activation, so the clock is still at zero
    for (ts, note) in [(100u64, 60u8), (150, 62), (151, 64)] {
        assert!(wrapped.queue_event(HostEvent::midi([0x90, note, 100], 0).at(ts)));
    }
    wrapped.set_active(true).unwrap();

    assert!(play_until(&mut wrapped, |_| received.lock().unwrap().len() == 3));

    let times: Vec<u64> = received.lock().unwrap().iter().map(|(t, _)| *t).collect();
    assert_eq!(times, vec![110, 160, 161]);

    let stats = wrapped.event_stats();
    assert_eq!(stats.queued, 3);
    assert_eq!(stats.delivered, 3);
    assert_eq!(stats.dropped_late, 0);
}

#[test]
fn test_event_for_rendered_time_is_dropped() {
    let (mut wrapped, received) = setup();
    assert!(wrapped.queue_event(HostEvent::midi([0x90, 60, 100], 0).at(20)));
    wrapped.set_active(true).unwrap();

    // Once the marker at 30 is delivered the clock is past 10
    assert!(play_until(&mut wrapped, |_| received.lock().unwrap().len() == 1));

    assert!(wrapped.queue_event(HostEvent::midi([0x80, 60, 0], 0).at(0)));
    assert!(play_until(&mut wrapped, |w| w.event_stats().dropped_late == 1));
    assert_eq!(received.lock().unwrap().len(), 1);
    assert_eq!(received.lock().unwrap()[0].0, 30);
}

#[test]
fn test_parameter_changes_follow_the_clock() {
    let (mut wrapped, received) = setup();
    wrapped.set_active(true).unwrap();

    let change = writeahead::ParameterChange {
        id: 9,
        value: -1.0,
        sample_offset: 2,
    };
    let mut out = [0.0f32; 4];
    wrapped.process_audio(&mut [&mut out[..]], 4, &[change]);

    assert!(play_until(&mut wrapped, |_| !received.lock().unwrap().is_empty()));
    let (_, payload) = received.lock().unwrap()[0].clone();
    assert_eq!(payload, EventPayload::Parameter { id: 9, value: -1.0 });
    assert_eq!(wrapped.event_stats().dropped_late, 0);
}
