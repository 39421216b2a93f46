//! Write-ahead sample buffers
//!
//! - [`ring`]: the single-channel lock-free write-ahead ring
//! - [`channels`]: one ring per audio channel, created and torn down together

pub mod channels;
pub mod ring;
mod sample;

pub use channels::ChannelBufferSet;
pub use ring::{next_power_of_two, BufferStats, RingBuffer, MAX_RING_SIZE};
