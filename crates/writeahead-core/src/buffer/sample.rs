//! Atomic sample slot
//!
//! Rust has no native atomic float, so a slot stores the `f32` bit pattern in
//! an [`AtomicU32`]. Slots are accessed with relaxed ordering; visibility is
//! established by the release/acquire pair on the ring's position counters.

use std::sync::atomic::{AtomicU32, Ordering};

#[repr(transparent)]
#[derive(Debug, Default)]
pub(crate) struct AtomicSample(AtomicU32);

impl AtomicSample {
    pub(crate) fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub(crate) fn load(&self, order: Ordering) -> f32 {
        f32::from_bits(self.0.load(order))
    }

    #[inline]
    pub(crate) fn store(&self, value: f32, order: Ordering) {
        self.0.store(value.to_bits(), order);
    }
}
