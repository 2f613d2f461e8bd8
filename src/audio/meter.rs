//! Latest-energy cell shared between the inbound-audio task and the
//! detector tick.
//!
//! A single f32 stored as atomic bits: the decode task overwrites it per
//! frame, the detector reads it every sampling interval. No history is kept;
//! the detector's consecutive-sample counter provides the hysteresis.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::level::rms;

/// Lock-free single-value energy meter.
#[derive(Debug, Default)]
pub struct LevelMeter {
    bits: AtomicU32,
}

impl LevelMeter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record the RMS energy of a decoded inbound frame.
    pub fn update(&self, chunk: &[f32]) {
        self.bits.store(rms(chunk).to_bits(), Ordering::Release);
    }

    /// Most recent RMS energy, 0.0 if nothing has been recorded.
    pub fn energy(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Read the most recent energy and reset the cell to silence.
    ///
    /// The detector samples with this so a stalled decode stream reads as
    /// silent on the next tick instead of holding the last loud value.
    pub fn take(&self) -> f32 {
        f32::from_bits(self.bits.swap(0.0f32.to_bits(), Ordering::AcqRel))
    }

    /// Reset to silence (session stop).
    pub fn clear(&self) {
        self.bits.store(0.0f32.to_bits(), Ordering::Release);
    }
}
