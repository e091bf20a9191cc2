//! Discrete Band-Divide Mapping
//!
//! Partitions the usable bins `0..=N/2` into one contiguous band per target
//! frequency, then averages each band down to `D` sub-buckets.
//!
//! # Band boundaries
//! Each target frequency is snapped to `b_k = round(f_k * N / fs)`. The gap
//! between neighbouring targets is split at its midpoint:
//!
//! | gap `g` | reach left (from the right target) | reach right (from the left target) |
//! |---------|------------------------------------|------------------------------------|
//! | even    | `g / 2`                            | `g / 2 - 1`                        |
//! | odd     | `(g - 1) / 2`                      | `(g - 1) / 2`                      |
//!
//! so the bins of every gap are handed out exactly once. The first band always
//! starts at bin 0 and the last band always ends at `N/2`.
//!
//! # Sub-buckets
//! A band of `count` bins with `count = q * D + r` yields `r` sub-buckets of
//! `q + 1` bins followed by `D - r` sub-buckets of `q` bins, each the plain
//! mean of its contiguous run.

use super::utils::frequency_to_bin;
use crate::config::ConfigError;
use std::ops::RangeInclusive;

/// Inclusive bin range owned by one target frequency.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BandRange {
    pub start: usize,
    pub end: usize,
}

impl BandRange {
    #[inline]
    pub fn count(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn bins(&self) -> RangeInclusive<usize> {
        self.start..=self.end
    }
}

#[inline]
fn reach_left(gap: i64) -> i64 {
    if gap % 2 == 0 {
        gap / 2
    } else {
        (gap - 1) / 2
    }
}

#[inline]
fn reach_right(gap: i64) -> i64 {
    if gap % 2 == 0 {
        gap / 2 - 1
    } else {
        (gap - 1) / 2
    }
}

#[derive(Clone, Debug)]
pub struct BandDivider {
    target_bins: Vec<usize>,
    ranges: Vec<BandRange>,
    divide_unit: usize,
}

impl BandDivider {
    pub fn new(
        target_frequencies: &[f32],
        divide_unit: usize,
        fft_size: usize,
        sample_rate: f32,
    ) -> Result<Self, ConfigError> {
        if target_frequencies.is_empty() {
            return Err(ConfigError::InvalidTargetFrequencies(
                "at least one target frequency is required".to_string(),
            ));
        }
        if divide_unit == 0 {
            return Err(ConfigError::InvalidTargetFrequencies(
                "band divide unit must be at least 1".to_string(),
            ));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(ConfigError::InvalidSampleRate(sample_rate));
        }

        let half = (fft_size / 2) as i64;
        let nyquist = sample_rate / 2.0;
        let mut target_bins = Vec::with_capacity(target_frequencies.len());
        for (k, &freq) in target_frequencies.iter().enumerate() {
            if !(freq.is_finite() && freq >= 0.0 && freq <= nyquist) {
                return Err(ConfigError::InvalidTargetFrequencies(format!(
                    "target {k} ({freq} Hz) lies outside 0..={nyquist} Hz"
                )));
            }
            let bin = frequency_to_bin(freq, fft_size, sample_rate).round() as i64;
            target_bins.push(bin.clamp(0, half));
        }

        let gaps: Vec<i64> = target_bins.windows(2).map(|w| w[1] - w[0]).collect();
        if let Some(k) = gaps.iter().position(|&g| g < 1) {
            return Err(ConfigError::InvalidTargetFrequencies(format!(
                "targets {} ({} Hz) and {} ({} Hz) do not fall in strictly increasing bins",
                k,
                target_frequencies[k],
                k + 1,
                target_frequencies[k + 1]
            )));
        }

        let last = target_bins.len() - 1;
        let ranges: Vec<BandRange> = (0..target_bins.len())
            .map(|k| {
                let centre = target_bins[k];
                let start = if k == 0 {
                    0
                } else {
                    centre - reach_left(gaps[k - 1])
                };
                let end = if k == last {
                    half
                } else {
                    centre + reach_right(gaps[k])
                };
                (start, end)
            })
            .map(|(start, end)| BandRange {
                start: start as usize,
                end: end as usize,
            })
            .collect();

        for (band, range) in ranges.iter().enumerate() {
            if range.count() < divide_unit {
                return Err(ConfigError::DivideUnitTooLarge {
                    band,
                    bins: range.count(),
                    divide_unit,
                });
            }
        }

        Ok(Self {
            target_bins: target_bins.into_iter().map(|b| b as usize).collect(),
            ranges,
            divide_unit,
        })
    }

    pub fn target_bins(&self) -> &[usize] {
        &self.target_bins
    }

    pub fn ranges(&self) -> &[BandRange] {
        &self.ranges
    }

    pub fn divide_unit(&self) -> usize {
        self.divide_unit
    }

    pub fn band_count(&self) -> usize {
        self.ranges.len()
    }

    /// `K * D`.
    pub fn output_len(&self) -> usize {
        self.ranges.len() * self.divide_unit
    }

    /// Bin counts of the `D` sub-buckets of a band, in order.
    pub fn sub_bucket_sizes(&self, band: usize) -> impl Iterator<Item = usize> {
        let count = self.ranges[band].count();
        let quotient = count / self.divide_unit;
        let remainder = count % self.divide_unit;
        (0..self.divide_unit).map(move |j| if j < remainder { quotient + 1 } else { quotient })
    }

    /// Average `values` (indexed by bin) into `out`, band-major.
    pub fn divide(&self, values: &[f32], out: &mut [f32]) {
        debug_assert_eq!(out.len(), self.output_len());
        for (band, range) in self.ranges.iter().enumerate() {
            let cells = &mut out[band * self.divide_unit..(band + 1) * self.divide_unit];
            let mut start = range.start;
            for (cell, size) in cells.iter_mut().zip(self.sub_bucket_sizes(band)) {
                let run = &values[start..start + size];
                *cell = run.iter().sum::<f32>() / size as f32;
                start += size;
            }
            debug_assert_eq!(start, range.end + 1);
        }
    }
}
