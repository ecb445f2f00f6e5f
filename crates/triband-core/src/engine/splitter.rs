//! Three-way band splitter
//!
//! Splits a block into low/mid/high bands using two-pole state-variable
//! filters with Butterworth Q: a lowpass at the low/mid crossover for the
//! low band, a highpass-then-lowpass cascade for the mid band, and a
//! highpass at the mid/high crossover for the high band. The three outputs
//! sum back to a close approximation of the input.
//!
//! Retuning swaps a fresh `SvfCoefficients` value into each section; the
//! filter state integrators are never touched by a retune, so a mid-stream
//! crossover change produces no discontinuity beyond the frequency response
//! moving.

use crate::types::{StereoBuffer, StereoSample, DEFAULT_SAMPLE_RATE};

use super::params::{MIN_CROSSOVER_GAP_HZ, MIN_CROSSOVER_HZ};

/// Fraction of the sample rate usable as the highest crossover frequency
const NYQUIST_SAFE_RATIO: f32 = 0.49;

/// Coefficients for a two-pole SVF section
///
/// A plain value: retunes build a new one and assign it wholesale, never
/// mutate one that a processing loop may be reading.
#[derive(Debug, Clone, Copy)]
pub struct SvfCoefficients {
    g: f32,
    k: f32,
    a1: f32,
    a2: f32,
    a3: f32,
}

impl SvfCoefficients {
    /// Compute coefficients for the given cutoff with Butterworth Q (0.707)
    pub fn new(sample_rate: f32, cutoff: f32) -> Self {
        let q = std::f32::consts::FRAC_1_SQRT_2;

        let g = (std::f32::consts::PI * cutoff / sample_rate).tan();
        let k = 1.0 / q;
        let a1 = 1.0 / (1.0 + g * (g + k));
        let a2 = g * a1;
        let a3 = g * a2;

        Self { g, k, a1, a2, a3 }
    }
}

/// Two-pole (12dB/octave) state-variable filter section
///
/// SVF topology is numerically stable and yields lowpass and highpass
/// outputs from the same state update, which is what the three band chains
/// tap.
#[derive(Debug, Clone)]
struct SvfSection {
    coeffs: SvfCoefficients,
    // State per channel (left/right)
    ic1eq_l: f32,
    ic2eq_l: f32,
    ic1eq_r: f32,
    ic2eq_r: f32,
}

impl SvfSection {
    fn new(sample_rate: f32, cutoff: f32) -> Self {
        Self {
            coeffs: SvfCoefficients::new(sample_rate, cutoff),
            ic1eq_l: 0.0,
            ic2eq_l: 0.0,
            ic1eq_r: 0.0,
            ic2eq_r: 0.0,
        }
    }

    /// Swap in a new coefficient set, preserving filter state
    fn set_coefficients(&mut self, coeffs: SvfCoefficients) {
        self.coeffs = coeffs;
    }

    /// Process one stereo sample, returning (lowpass, highpass)
    #[inline]
    fn process(&mut self, input: StereoSample) -> (StereoSample, StereoSample) {
        let c = self.coeffs;

        // Left channel
        let v3_l = input.left - self.ic2eq_l;
        let v1_l = c.a1 * self.ic1eq_l + c.a2 * v3_l;
        let v2_l = self.ic2eq_l + c.a2 * self.ic1eq_l + c.a3 * v3_l;
        self.ic1eq_l = 2.0 * v1_l - self.ic1eq_l;
        self.ic2eq_l = 2.0 * v2_l - self.ic2eq_l;

        let low_l = v2_l;
        let high_l = input.left - c.k * v1_l - low_l;

        // Right channel
        let v3_r = input.right - self.ic2eq_r;
        let v1_r = c.a1 * self.ic1eq_r + c.a2 * v3_r;
        let v2_r = self.ic2eq_r + c.a2 * self.ic1eq_r + c.a3 * v3_r;
        self.ic1eq_r = 2.0 * v1_r - self.ic1eq_r;
        self.ic2eq_r = 2.0 * v2_r - self.ic2eq_r;

        let low_r = v2_r;
        let high_r = input.right - c.k * v1_r - low_r;

        (
            StereoSample::new(low_l, low_r),
            StereoSample::new(high_l, high_r),
        )
    }

    #[inline]
    fn lowpass(&mut self, input: StereoSample) -> StereoSample {
        self.process(input).0
    }

    #[inline]
    fn highpass(&mut self, input: StereoSample) -> StereoSample {
        self.process(input).1
    }

    fn reset(&mut self) {
        self.ic1eq_l = 0.0;
        self.ic2eq_l = 0.0;
        self.ic1eq_r = 0.0;
        self.ic2eq_r = 0.0;
    }
}

/// Three-way crossover filter bank
///
/// Owns the filter state exclusively; the audio thread drives both
/// processing and retunes (the control thread only writes the atomic split
/// parameters that trigger a retune).
pub struct BandSplitter {
    sample_rate: f32,
    /// Low band: lowpass at the low/mid crossover
    low_lp: SvfSection,
    /// Mid band: highpass at low/mid, then lowpass at mid/high
    mid_hp: SvfSection,
    mid_lp: SvfSection,
    /// High band: highpass at the mid/high crossover
    high_hp: SvfSection,
    effective_low_mid: f32,
    effective_mid_high: f32,
}

impl BandSplitter {
    pub fn new(low_mid_hz: f32, mid_high_hz: f32) -> Self {
        let sample_rate = DEFAULT_SAMPLE_RATE as f32;
        let mut splitter = Self {
            sample_rate,
            low_lp: SvfSection::new(sample_rate, low_mid_hz),
            mid_hp: SvfSection::new(sample_rate, low_mid_hz),
            mid_lp: SvfSection::new(sample_rate, mid_high_hz),
            high_hp: SvfSection::new(sample_rate, mid_high_hz),
            effective_low_mid: low_mid_hz,
            effective_mid_high: mid_high_hz,
        };
        splitter.retune(low_mid_hz, mid_high_hz);
        splitter
    }

    /// Set the sample rate, reset state and retune at the new rate
    pub fn prepare(&mut self, sample_rate: f32) {
        if sample_rate <= 0.0 {
            log::warn!(
                "BandSplitter::prepare: invalid sample rate {}, keeping {}",
                sample_rate,
                self.sample_rate
            );
            return;
        }

        self.sample_rate = sample_rate;
        self.reset();
        let (low, high) = (self.effective_low_mid, self.effective_mid_high);
        self.retune(low, high);
    }

    /// Retune the crossover points
    ///
    /// Requested values are clamped so the effective pair always satisfies
    /// `20 <= low <= high - 10 <= 0.49 * sample_rate - 10`. With an invalid
    /// sample rate, recomputation is skipped and the last valid coefficients
    /// stay in effect.
    pub fn retune(&mut self, low_mid_hz: f32, mid_high_hz: f32) {
        if self.sample_rate <= 0.0 {
            log::warn!(
                "BandSplitter::retune: sample rate not established, keeping previous coefficients"
            );
            return;
        }

        let nyquist_safe = NYQUIST_SAFE_RATIO * self.sample_rate;
        let low_ceiling = (nyquist_safe - MIN_CROSSOVER_GAP_HZ).max(MIN_CROSSOVER_HZ);
        let low = low_mid_hz.clamp(MIN_CROSSOVER_HZ, low_ceiling);
        let high = mid_high_hz.clamp(low + MIN_CROSSOVER_GAP_HZ, (low + MIN_CROSSOVER_GAP_HZ).max(nyquist_safe));

        self.low_lp.set_coefficients(SvfCoefficients::new(self.sample_rate, low));
        self.mid_hp.set_coefficients(SvfCoefficients::new(self.sample_rate, low));
        self.mid_lp.set_coefficients(SvfCoefficients::new(self.sample_rate, high));
        self.high_hp.set_coefficients(SvfCoefficients::new(self.sample_rate, high));

        self.effective_low_mid = low;
        self.effective_mid_high = high;
    }

    /// The clamped crossover pair currently in effect
    pub fn effective_splits(&self) -> (f32, f32) {
        (self.effective_low_mid, self.effective_mid_high)
    }

    /// The sample rate currently in effect
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Filter three copies of the input block in place
    ///
    /// Each buffer must already contain a copy of the source block; after
    /// the call, `low`/`mid`/`high` hold their band's content.
    pub fn process_bands(
        &mut self,
        low: &mut StereoBuffer,
        mid: &mut StereoBuffer,
        high: &mut StereoBuffer,
    ) {
        for sample in low.iter_mut() {
            *sample = self.low_lp.lowpass(*sample);
        }
        for sample in mid.iter_mut() {
            let hp = self.mid_hp.highpass(*sample);
            *sample = self.mid_lp.lowpass(hp);
        }
        for sample in high.iter_mut() {
            *sample = self.high_hp.highpass(*sample);
        }
    }

    /// Reset all filter state (call when the stream restarts)
    pub fn reset(&mut self) {
        self.low_lp.reset();
        self.mid_hp.reset();
        self.mid_lp.reset();
        self.high_hp.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_dc(splitter: &mut BandSplitter, blocks: usize, len: usize) -> (f32, f32, f32) {
        let mut last = (0.0, 0.0, 0.0);
        for _ in 0..blocks {
            let mut low = StereoBuffer::silence(len);
            let mut mid = StereoBuffer::silence(len);
            let mut high = StereoBuffer::silence(len);
            for i in 0..len {
                low[i] = StereoSample::mono(1.0);
                mid[i] = StereoSample::mono(1.0);
                high[i] = StereoSample::mono(1.0);
            }
            splitter.process_bands(&mut low, &mut mid, &mut high);
            let i = len - 1;
            last = (low[i].left, mid[i].left, high[i].left);
        }
        last
    }

    #[test]
    fn test_dc_lands_in_low_band() {
        let mut splitter = BandSplitter::new(250.0, 4000.0);
        splitter.prepare(48000.0);

        // Let the filters settle on steady DC input
        let (low, mid, high) = run_dc(&mut splitter, 40, 512);

        assert!((low - 1.0).abs() < 0.05, "DC should pass the low band, got {}", low);
        assert!(mid.abs() < 0.05, "DC should not pass the mid band, got {}", mid);
        assert!(high.abs() < 0.05, "DC should not pass the high band, got {}", high);
    }

    #[test]
    fn test_bands_sum_near_unity_for_dc() {
        let mut splitter = BandSplitter::new(250.0, 4000.0);
        splitter.prepare(48000.0);

        let (low, mid, high) = run_dc(&mut splitter, 40, 512);
        let sum = low + mid + high;

        assert!((sum - 1.0).abs() < 0.05, "band sum should reconstruct DC, got {}", sum);
    }

    #[test]
    fn test_retune_ordering_invariant() {
        let mut splitter = BandSplitter::new(250.0, 4000.0);
        splitter.prepare(48000.0);
        let nyquist_safe = 0.49 * 48000.0;

        let requests = [
            (20.0, 20.0),
            (5000.0, 100.0),
            (1.0, 30000.0),
            (25000.0, 25000.0),
            (250.0, 4000.0),
        ];

        for (lo, hi) in requests {
            splitter.retune(lo, hi);
            let (elo, ehi) = splitter.effective_splits();
            assert!(MIN_CROSSOVER_HZ <= elo, "low too small for request ({lo}, {hi})");
            assert!(elo <= ehi - MIN_CROSSOVER_GAP_HZ, "gap violated for request ({lo}, {hi})");
            assert!(ehi <= nyquist_safe, "nyquist violated for request ({lo}, {hi})");
        }
    }

    #[test]
    fn test_retune_mid_stream_stays_finite() {
        let mut splitter = BandSplitter::new(250.0, 4000.0);
        splitter.prepare(48000.0);

        let len = 256;
        for block in 0..20 {
            if block == 10 {
                splitter.retune(1000.0, 8000.0);
            }
            let mut low = StereoBuffer::silence(len);
            let mut mid = StereoBuffer::silence(len);
            let mut high = StereoBuffer::silence(len);
            for i in 0..len {
                let x = ((i + block * len) as f32 * 0.1).sin();
                low[i] = StereoSample::mono(x);
                mid[i] = StereoSample::mono(x);
                high[i] = StereoSample::mono(x);
            }
            splitter.process_bands(&mut low, &mut mid, &mut high);
            for i in 0..len {
                assert!(low[i].left.is_finite());
                assert!(mid[i].left.is_finite());
                assert!(high[i].left.is_finite());
                assert!(low[i].left.abs() < 10.0, "low band exploded after retune");
            }
        }
    }

    #[test]
    fn test_invalid_sample_rate_keeps_coefficients() {
        let mut splitter = BandSplitter::new(250.0, 4000.0);
        splitter.prepare(48000.0);
        let before = splitter.effective_splits();

        splitter.prepare(0.0);
        assert_eq!(splitter.sample_rate(), 48000.0);
        assert_eq!(splitter.effective_splits(), before);

        splitter.prepare(-1.0);
        assert_eq!(splitter.effective_splits(), before);
    }
}
