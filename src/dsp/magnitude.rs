//! Magnitude & Smoothing Stage
//!
//! Turns each complex transform frame into a per-bin smoothed magnitude and a
//! decibel level limited to the display range.
//!
//! # Per-bin update (bins `0..=N/2`)
//! 1. `amplitude = |X[i]| * 2` (single-sided spectrum)
//! 2. `smoothed[i] = a * amplitude + (1 - a) * smoothed[i]`
//! 3. `db[i] = gain_to_db(smoothed[i]) - gain_to_db(N)`
//! 4. limit to `[min_db, max_db]` and feed the peak tracker
//!
//! The smoothed state persists across cycles; it is the only memory the
//! analysis path carries from one frame to the next.

use super::peak::PeakTracker;
use super::utils::{gain_to_db, DecibelRange};
use crate::config::ConfigError;
use rustfft::num_complex::Complex;

pub const DEFAULT_FORGETTING_FACTOR: f32 = 0.2;

pub struct MagnitudeSmoother {
    fft_size: usize,
    forgetting_factor: f32,
    range: DecibelRange,
    /// `gain_to_db(N)`, subtracted from every level.
    size_offset_db: f32,
    smoothed: Vec<f32>,
    levels_db: Vec<f32>,
    peak: PeakTracker,
}

impl MagnitudeSmoother {
    pub fn new(fft_size: usize, forgetting_factor: f32, range: DecibelRange) -> Self {
        let bins = fft_size / 2 + 1;
        Self {
            fft_size,
            forgetting_factor: forgetting_factor.clamp(f32::MIN_POSITIVE, 1.0),
            range,
            size_offset_db: gain_to_db(fft_size as f32),
            smoothed: vec![0.0; bins],
            levels_db: vec![range.min_db; bins],
            peak: PeakTracker::new(range.min_db),
        }
    }

    pub fn forgetting_factor(&self) -> f32 {
        self.forgetting_factor
    }

    /// Change the smoothing weight. Values outside `(0, 1]` are rejected and
    /// the previous factor is kept.
    pub fn set_forgetting_factor(&mut self, alpha: f32) -> Result<(), ConfigError> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(ConfigError::ForgettingFactorOutOfRange(alpha));
        }
        self.forgetting_factor = alpha;
        Ok(())
    }

    pub fn range(&self) -> DecibelRange {
        self.range
    }

    /// Fold one transform frame into the smoothed state.
    pub fn update(&mut self, frame: &[Complex<f32>]) {
        debug_assert_eq!(frame.len(), self.fft_size);
        let alpha = self.forgetting_factor;
        let keep = 1.0 - alpha;

        for (i, (smoothed, level)) in self
            .smoothed
            .iter_mut()
            .zip(self.levels_db.iter_mut())
            .enumerate()
        {
            let mut amplitude = frame[i].norm() * 2.0;
            if !amplitude.is_finite() {
                amplitude = 0.0;
            }
            *smoothed = alpha * amplitude + keep * *smoothed;

            let db = self.range.limit(gain_to_db(*smoothed) - self.size_offset_db);
            *level = db;
            self.peak.update(db);
        }
    }

    /// Level for an arbitrary linear magnitude on this stage's scale
    /// (same normalisation and limiting as the per-bin levels).
    #[inline]
    pub fn level_db(&self, magnitude: f32) -> f32 {
        self.range.limit(gain_to_db(magnitude) - self.size_offset_db)
    }

    /// Smoothed linear magnitudes, `N/2 + 1` entries.
    pub fn smoothed(&self) -> &[f32] {
        &self.smoothed
    }

    /// Limited decibel levels, `N/2 + 1` entries.
    pub fn levels_db(&self) -> &[f32] {
        &self.levels_db
    }

    pub fn peak_db(&self) -> f32 {
        self.peak.peak_db()
    }

    pub fn reset(&mut self) {
        self.smoothed.fill(0.0);
        self.levels_db.fill(self.range.min_db);
        self.peak.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const N: usize = 16;

    fn frame_with(value: f32) -> Vec<Complex<f32>> {
        vec![Complex::new(value, 0.0); N]
    }

    #[test]
    fn test_alpha_one_is_memoryless() {
        let mut stage = MagnitudeSmoother::new(N, 1.0, DecibelRange::default());
        stage.update(&frame_with(3.0));
        assert!(stage.smoothed().iter().all(|&m| m == 6.0));
        stage.update(&frame_with(0.5));
        assert!(stage.smoothed().iter().all(|&m| m == 1.0));
        stage.update(&frame_with(0.0));
        assert!(stage.smoothed().iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_tiny_alpha_leaves_state_unchanged() {
        let mut stage = MagnitudeSmoother::new(N, 1.0, DecibelRange::default());
        stage.update(&frame_with(2.0));
        stage.set_forgetting_factor(1e-9).unwrap();
        for value in [10.0, 0.0, 100.0, 0.0] {
            stage.update(&frame_with(value));
        }
        assert!(stage.smoothed().iter().all(|&m| (m - 4.0).abs() < 1e-4));
    }

    #[test]
    fn test_decay_rate_matches_forgetting_factor() {
        let mut stage = MagnitudeSmoother::new(N, 0.2, DecibelRange::default());
        stage.update(&frame_with(5.0));
        let first = stage.smoothed()[0];
        assert!((first - 2.0).abs() < 1e-6);
        stage.update(&frame_with(0.0));
        assert!((stage.smoothed()[0] - first * 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_only_usable_bins_are_tracked() {
        let stage = MagnitudeSmoother::new(2048, 0.2, DecibelRange::default());
        assert_eq!(stage.smoothed().len(), 1025);
        assert_eq!(stage.levels_db().len(), 1025);
    }

    #[test]
    fn test_levels_are_normalised_by_transform_size_and_limited() {
        let mut stage = MagnitudeSmoother::new(N, 1.0, DecibelRange::default());
        // amplitude = 2 * N / 2 = N  ->  0 dB after normalisation
        stage.update(&frame_with(N as f32 / 2.0));
        assert!(stage.levels_db().iter().all(|&db| db.abs() < 1e-4));

        // louder than full scale is limited to max_db
        stage.update(&frame_with(N as f32 * 10.0));
        assert!(stage.levels_db().iter().all(|&db| db == 0.0));

        stage.update(&frame_with(0.0));
        assert!(stage.levels_db().iter().all(|&db| db == -100.0));
    }

    #[test]
    fn test_non_finite_input_stays_finite() {
        let mut stage = MagnitudeSmoother::new(N, 0.5, DecibelRange::default());
        let mut frame = frame_with(1.0);
        frame[1] = Complex::new(f32::NAN, 0.0);
        frame[2] = Complex::new(f32::INFINITY, 0.0);
        stage.update(&frame);
        assert!(stage.smoothed().iter().all(|m| m.is_finite() && *m >= 0.0));
        assert!(stage
            .levels_db()
            .iter()
            .all(|&db| (-100.0..=0.0).contains(&db)));
    }

    #[test]
    fn test_peak_follows_levels_and_resets() {
        let mut stage = MagnitudeSmoother::new(N, 1.0, DecibelRange::default());
        stage.update(&frame_with(N as f32 / 20.0)); // -20 dB
        assert!((stage.peak_db() + 20.0).abs() < 1e-3);
        stage.update(&frame_with(0.0));
        assert!((stage.peak_db() + 20.0).abs() < 1e-3);
        stage.reset();
        assert_eq!(stage.peak_db(), -100.0);
        assert!(stage.smoothed().iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_rejects_out_of_range_factor() {
        let mut stage = MagnitudeSmoother::new(N, 0.2, DecibelRange::default());
        assert!(stage.set_forgetting_factor(0.0).is_err());
        assert!(stage.set_forgetting_factor(1.5).is_err());
        assert!(stage.set_forgetting_factor(f32::NAN).is_err());
        assert_eq!(stage.forgetting_factor(), 0.2);
    }
}
