//! Shared engine parameters
//!
//! `EngineParams` is the control surface for the band splitter: crossover
//! frequencies and per-band gains, written by the control thread and read
//! once per block by the audio thread. All fields are independent atomics;
//! no ordering is required between them beyond per-field atomicity.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::types::NUM_BANDS;

/// Lowest permitted crossover frequency in Hz
pub const MIN_CROSSOVER_HZ: f32 = 20.0;

/// Highest permitted crossover frequency in Hz (before the nyquist clamp
/// applied at retune time, when the sample rate is known)
pub const MAX_CROSSOVER_HZ: f32 = 20000.0;

/// Minimum gap between the low/mid and mid/high crossover points in Hz
pub const MIN_CROSSOVER_GAP_HZ: f32 = 10.0;

/// Default low/mid crossover frequency in Hz
pub const DEFAULT_LOW_MID_HZ: f32 = 250.0;

/// Default mid/high crossover frequency in Hz
pub const DEFAULT_MID_HIGH_HZ: f32 = 4000.0;

/// Default per-band linear gain
pub const DEFAULT_BAND_GAIN: f32 = 0.5;

#[inline]
fn load_f32(atomic: &AtomicU32) -> f32 {
    f32::from_bits(atomic.load(Ordering::Relaxed))
}

#[inline]
fn store_f32(atomic: &AtomicU32, value: f32) {
    atomic.store(value.to_bits(), Ordering::Relaxed);
}

/// Atomic crossover and gain parameters shared between threads
///
/// Writers clamp; readers trust. The audio thread reads each field at most
/// once per block.
pub struct EngineParams {
    /// Low/mid crossover frequency (f32 bits)
    low_mid_hz: AtomicU32,
    /// Mid/high crossover frequency (f32 bits)
    mid_high_hz: AtomicU32,
    /// Per-band linear gain (f32 bits)
    band_gain: [AtomicU32; NUM_BANDS],
}

impl EngineParams {
    pub fn new() -> Self {
        Self {
            low_mid_hz: AtomicU32::new(DEFAULT_LOW_MID_HZ.to_bits()),
            mid_high_hz: AtomicU32::new(DEFAULT_MID_HIGH_HZ.to_bits()),
            band_gain: std::array::from_fn(|_| AtomicU32::new(DEFAULT_BAND_GAIN.to_bits())),
        }
    }

    /// Set both crossover frequencies (control thread)
    ///
    /// Values are clamped to the permitted range and the mid/high point is
    /// pushed up to preserve the minimum gap. The final nyquist-dependent
    /// clamp happens on the audio side where the sample rate is known.
    pub fn set_band_splits(&self, low_mid_hz: f32, mid_high_hz: f32) {
        let low = low_mid_hz.clamp(MIN_CROSSOVER_HZ, MAX_CROSSOVER_HZ);
        let mut high = mid_high_hz.clamp(MIN_CROSSOVER_HZ, MAX_CROSSOVER_HZ);

        if high < low + MIN_CROSSOVER_GAP_HZ {
            high = (low + MIN_CROSSOVER_GAP_HZ).min(MAX_CROSSOVER_HZ);
        }

        store_f32(&self.low_mid_hz, low);
        store_f32(&self.mid_high_hz, high);
    }

    /// Set one band's linear gain (control thread), clamped to [0, 1]
    pub fn set_band_gain(&self, band: usize, gain: f32) {
        assert!(band < NUM_BANDS, "band index out of range");
        store_f32(&self.band_gain[band], gain.clamp(0.0, 1.0));
    }

    /// Current low/mid crossover frequency (audio thread)
    #[inline]
    pub fn low_mid_hz(&self) -> f32 {
        load_f32(&self.low_mid_hz)
    }

    /// Current mid/high crossover frequency (audio thread)
    #[inline]
    pub fn mid_high_hz(&self) -> f32 {
        load_f32(&self.mid_high_hz)
    }

    /// Current linear gain for a band (audio thread)
    #[inline]
    pub fn band_gain(&self, band: usize) -> f32 {
        debug_assert!(band < NUM_BANDS);
        load_f32(&self.band_gain[band])
    }
}

impl Default for EngineParams {
    fn default() -> Self {
        Self::new()
    }
}
