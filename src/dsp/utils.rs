/// Linear gain to decibels. Zero and negative gains map to negative infinity;
/// callers are expected to clamp the result.
#[inline]
pub fn gain_to_db(gain: f32) -> f32 {
    if gain > 0.0 {
        20.0 * gain.log10()
    } else {
        f32::NEG_INFINITY
    }
}

/// Inclusive decibel display range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecibelRange {
    pub min_db: f32,
    pub max_db: f32,
}

impl Default for DecibelRange {
    fn default() -> Self {
        Self {
            min_db: -100.0,
            max_db: 0.0,
        }
    }
}

impl DecibelRange {
    pub fn new(min_db: f32, max_db: f32) -> Self {
        Self { min_db, max_db }
    }

    /// Clamp into `[min_db, max_db]`. NaN collapses to the floor.
    #[inline]
    pub fn limit(&self, db: f32) -> f32 {
        if db.is_nan() {
            return self.min_db;
        }
        db.clamp(self.min_db, self.max_db)
    }

    /// Map a decibel value onto `[0, 1]` after limiting it.
    #[inline]
    pub fn normalize(&self, db: f32) -> f32 {
        let span = self.max_db - self.min_db;
        ((self.limit(db) - self.min_db) / span).clamp(0.0, 1.0)
    }
}

/// Centre frequency of an FFT bin.
#[inline]
pub fn bin_to_frequency(bin: f32, fft_size: usize, sample_rate: f32) -> f32 {
    bin * sample_rate / fft_size as f32
}

/// Fractional bin position of a frequency.
#[inline]
pub fn frequency_to_bin(freq_hz: f32, fft_size: usize, sample_rate: f32) -> f32 {
    freq_hz * fft_size as f32 / sample_rate
}
