//! Continuous skew mapping (line / bar scopes).
//!
//! Compresses the `N/2` linear bins into `M` display buckets. A single skew
//! exponent `s` controls the warp: `s = 1` is linear, smaller values give
//! more room to the low end.
//!
//! ```text
//! forward:  p(i) = 1 - exp(ln(1 - i/M) * s)        bin = round(p * N/2)
//! inverse:  x(f) = 1 - (1 - 2 * (f * N / fs) / N)^(1/s)
//! ```
//!
//! The two are exact inverses for a shared `s`, so a renderer can place
//! frequency labels with `position_for_frequency` and they will line up with
//! the buckets produced by `fill`.

use super::utils::{bin_to_frequency, frequency_to_bin, DecibelRange};
use crate::config::ConfigError;

#[derive(Clone, Debug)]
pub struct SkewMapping {
    buckets: usize,
    skew: f32,
    fft_size: usize,
    /// Source bin for each bucket, tabulated on construction.
    bins: Vec<usize>,
}

impl SkewMapping {
    pub fn new(buckets: usize, skew: f32, fft_size: usize) -> Result<Self, ConfigError> {
        if buckets == 0 {
            return Err(ConfigError::InvalidScope(
                "bucket count must be at least 1".to_string(),
            ));
        }
        if !(skew.is_finite() && skew > 0.0) {
            return Err(ConfigError::InvalidScope(format!(
                "skew exponent must be positive and finite, got {skew}"
            )));
        }
        let half = fft_size / 2;
        let bins = (0..buckets)
            .map(|i| {
                let p = skewed_proportion(i, buckets, skew);
                ((p * half as f32).round().max(0.0) as usize).min(half)
            })
            .collect();
        Ok(Self {
            buckets,
            skew,
            fft_size,
            bins,
        })
    }

    pub fn buckets(&self) -> usize {
        self.buckets
    }

    pub fn skew(&self) -> f32 {
        self.skew
    }

    /// Unrounded proportion of `N/2` that bucket `i` starts at.
    pub fn proportion(&self, bucket: usize) -> f32 {
        skewed_proportion(bucket, self.buckets, self.skew)
    }

    #[inline]
    pub fn bin_for_bucket(&self, bucket: usize) -> usize {
        self.bins[bucket]
    }

    pub fn bins(&self) -> &[usize] {
        &self.bins
    }

    /// Frequency sampled by bucket `i`.
    pub fn frequency_at(&self, bucket: usize, sample_rate: f32) -> f32 {
        bin_to_frequency(self.bins[bucket] as f32, self.fft_size, sample_rate)
    }

    /// Normalised x position in `[0, 1]` for a frequency.
    pub fn position_for_frequency(&self, freq_hz: f32, sample_rate: f32) -> f32 {
        let bin = frequency_to_bin(freq_hz, self.fft_size, sample_rate);
        let linear = 2.0 * bin / self.fft_size as f32;
        position_for_proportion(linear, self.skew)
    }

    /// `out[i] = normalize(levels_db[bin(i)])`.
    pub fn fill(&self, levels_db: &[f32], range: DecibelRange, out: &mut [f32]) {
        debug_assert_eq!(out.len(), self.buckets);
        for (slot, &bin) in out.iter_mut().zip(self.bins.iter()) {
            *slot = range.normalize(levels_db[bin]);
        }
    }
}

/// `1 - exp(ln(1 - i/M) * s)`, for `i < M`.
#[inline]
pub fn skewed_proportion(bucket: usize, buckets: usize, skew: f32) -> f32 {
    debug_assert!(bucket < buckets);
    let t = bucket as f32 / buckets as f32;
    1.0 - ((1.0 - t).ln() * skew).exp()
}

/// Inverse warp of a linear proportion of `N/2`.
#[inline]
pub fn position_for_proportion(linear: f32, skew: f32) -> f32 {
    let linear = linear.clamp(0.0, 1.0);
    1.0 - (1.0 - linear).powf(1.0 / skew)
}
