//! The processing routine being buffered

use crate::error::ProcessorError;
use crate::event::TimestampedEvent;

/// Audio processing routine wrapped by [`crate::BufferedProcessor`]
///
/// After `initialize` every call happens on the background scheduler
/// thread, so implementations may allocate, block or stall. Stalls shorter
/// than the write-ahead latency are invisible to the audio callback.
pub trait Processor: Send + 'static {
    /// Prepare for processing at `sample_rate` with blocks of at most
    /// `max_block_size` samples
    fn initialize(&mut self, sample_rate: f64, max_block_size: usize)
        -> Result<(), ProcessorError>;

    /// Render `num_samples` into the first `num_samples` of each output
    fn process_audio(&mut self, inputs: &[Vec<f32>], outputs: &mut [Vec<f32>], num_samples: usize);

    fn set_active(&mut self, active: bool) -> Result<(), ProcessorError>;

    /// Latency the routine itself introduces (lookahead etc.)
    fn latency_samples(&self) -> u32 {
        0
    }

    fn tail_samples(&self) -> u32 {
        0
    }

    /// Events due in the chunk about to be rendered, offsets relative to
    /// its first sample. Ignored unless overridden.
    fn process_events(&mut self, _events: &[TimestampedEvent]) {}
}
