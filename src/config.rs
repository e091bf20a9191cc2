//! Analyzer configuration and its validation.
//!
//! Everything here is checked once at the configuration boundary. A config
//! that passes `validate()` can be handed to `SpectrumAnalyzer::new` without
//! any further runtime checks on the analysis path.

use crate::dsp::band_divide::BandDivider;
use crate::dsp::skew::SkewMapping;
use crate::dsp::utils::DecibelRange;
use crate::dsp::WindowFunction;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

pub const DEFAULT_FFT_SIZE: usize = 2048;
/// Largest transform `fit_to_sample_rate` will grow to.
pub const MAX_FFT_SIZE: usize = 16384;
pub const DEFAULT_TARGET_FREQUENCIES: [f32; 10] = [
    240.0, 500.0, 750.0, 1000.0, 1250.0, 1500.0, 1800.0, 2200.0, 3000.0, 5000.0,
];
pub const DEFAULT_BAND_DIVIDE_UNIT: usize = 10;

/// Configuration-contract violations.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Transform size is zero, one, or not a power of two
    InvalidFftSize(usize),
    /// Forgetting factor outside `(0, 1]`
    ForgettingFactorOutOfRange(f32),
    /// `min_db` must be finite and strictly below `max_db`
    InvalidDecibelRange { min_db: f32, max_db: f32 },
    InvalidScope(String),
    InvalidTargetFrequencies(String),
    /// A band has fewer bins than the requested number of sub-buckets
    DivideUnitTooLarge {
        band: usize,
        bins: usize,
        divide_unit: usize,
    },
    InvalidSampleRate(f32),
    InvalidRefreshRate(f32),
    /// A component was built for a different transform size
    SizeMismatch {
        component: &'static str,
        expected: usize,
        actual: usize,
    },
    Parse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidFftSize(n) => {
                write!(f, "FFT size must be a power of two >= 2, got {}", n)
            }
            ConfigError::ForgettingFactorOutOfRange(a) => {
                write!(f, "forgetting factor must lie in (0, 1], got {}", a)
            }
            ConfigError::InvalidDecibelRange { min_db, max_db } => {
                write!(f, "invalid decibel range [{}, {}]", min_db, max_db)
            }
            ConfigError::InvalidScope(msg) => write!(f, "invalid scope: {}", msg),
            ConfigError::InvalidTargetFrequencies(msg) => {
                write!(f, "invalid target frequencies: {}", msg)
            }
            ConfigError::DivideUnitTooLarge {
                band,
                bins,
                divide_unit,
            } => write!(
                f,
                "band {} spans {} bins, fewer than the divide unit {}",
                band, bins, divide_unit
            ),
            ConfigError::InvalidSampleRate(sr) => write!(f, "invalid sample rate {}", sr),
            ConfigError::InvalidRefreshRate(hz) => write!(f, "invalid refresh rate {} Hz", hz),
            ConfigError::SizeMismatch {
                component,
                expected,
                actual,
            } => write!(
                f,
                "{} holds {} points but the transform size is {}",
                component, actual, expected
            ),
            ConfigError::Parse(msg) => write!(f, "config parse error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// One continuous-skew display scope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScopeConfig {
    pub buckets: usize,
    /// 1.0 is linear; smaller values warp toward the low end.
    pub skew: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Transform size and ring buffer capacity (default: 2048)
    pub fft_size: usize,
    /// Smoothing weight for the newest frame (default: 0.2)
    pub forgetting_factor: f32,
    pub window: WindowFunction,
    /// Display floor (default: -100 dB)
    pub min_db: f32,
    /// Display ceiling (default: 0 dB)
    pub max_db: f32,
    /// Fine line scope (default: 128 buckets, skew 0.2)
    pub line_scope: ScopeConfig,
    /// Coarse bar scope (default: 32 buckets, skew 0.2)
    pub bar_scope: ScopeConfig,
    /// When false both scopes use skew 1.0
    pub logarithmic: bool,
    pub target_frequencies: Vec<f32>,
    /// Sub-buckets per band (default: 10)
    pub band_divide_unit: usize,
    /// Analysis cycles per second requested by the audio thread (default: 30)
    pub refresh_rate_hz: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            forgetting_factor: 0.2,
            window: WindowFunction::Rectangular,
            min_db: -100.0,
            max_db: 0.0,
            line_scope: ScopeConfig {
                buckets: 128,
                skew: 0.2,
            },
            bar_scope: ScopeConfig {
                buckets: 32,
                skew: 0.2,
            },
            logarithmic: true,
            target_frequencies: DEFAULT_TARGET_FREQUENCIES.to_vec(),
            band_divide_unit: DEFAULT_BAND_DIVIDE_UNIT,
            refresh_rate_hz: 30.0,
        }
    }
}

impl AnalyzerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn decibel_range(&self) -> DecibelRange {
        DecibelRange::new(self.min_db, self.max_db)
    }

    /// Skew actually applied to a scope given the log/linear toggle.
    pub fn effective_skew(&self, scope: &ScopeConfig) -> f32 {
        if self.logarithmic {
            scope.skew
        } else {
            1.0
        }
    }

    /// Number of samples between analysis requests at `sample_rate`.
    pub fn refresh_interval(&self, sample_rate: f32) -> usize {
        ((sample_rate / self.refresh_rate_hz).round() as usize).max(1)
    }

    /// Check every contract the analysis path relies on.
    pub fn validate(&self, sample_rate: f32) -> Result<(), ConfigError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(ConfigError::InvalidSampleRate(sample_rate));
        }
        if self.fft_size < 2 || !self.fft_size.is_power_of_two() {
            return Err(ConfigError::InvalidFftSize(self.fft_size));
        }
        if !(self.forgetting_factor > 0.0 && self.forgetting_factor <= 1.0) {
            return Err(ConfigError::ForgettingFactorOutOfRange(
                self.forgetting_factor,
            ));
        }
        if !(self.min_db.is_finite() && self.max_db.is_finite() && self.min_db < self.max_db) {
            return Err(ConfigError::InvalidDecibelRange {
                min_db: self.min_db,
                max_db: self.max_db,
            });
        }
        if !(self.refresh_rate_hz.is_finite() && self.refresh_rate_hz > 0.0) {
            return Err(ConfigError::InvalidRefreshRate(self.refresh_rate_hz));
        }
        for scope in [&self.line_scope, &self.bar_scope] {
            SkewMapping::new(scope.buckets, scope.skew, self.fft_size)?;
        }
        BandDivider::new(
            &self.target_frequencies,
            self.band_divide_unit,
            self.fft_size,
            sample_rate,
        )?;
        Ok(())
    }

    /// Copy of this config with `fft_size` doubled until every band has
    /// enough bins at `sample_rate`, up to `MAX_FFT_SIZE`. Any other
    /// validation failure is returned as is.
    pub fn fit_to_sample_rate(&self, sample_rate: f32) -> Result<Self, ConfigError> {
        let mut fitted = self.clone();
        loop {
            match fitted.validate(sample_rate) {
                Ok(()) => return Ok(fitted),
                Err(ConfigError::DivideUnitTooLarge { .. }) if fitted.fft_size < MAX_FFT_SIZE => {
                    fitted.fft_size *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = AnalyzerConfig::default();
        assert!(config.validate(44100.0).is_ok());
        assert!(config.validate(48000.0).is_ok());
        assert_eq!(config.fft_size, 2048);
        assert_eq!(config.window, WindowFunction::Rectangular);
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        let config = AnalyzerConfig {
            fft_size: 2000,
            ..Default::default()
        };
        assert_eq!(
            config.validate(44100.0),
            Err(ConfigError::InvalidFftSize(2000))
        );
    }

    #[test]
    fn test_rejects_forgetting_factor_out_of_range() {
        for alpha in [0.0, -0.1, 1.01] {
            let config = AnalyzerConfig {
                forgetting_factor: alpha,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(44100.0),
                Err(ConfigError::ForgettingFactorOutOfRange(_))
            ));
        }
    }

    #[test]
    fn test_rejects_inverted_decibel_range() {
        let config = AnalyzerConfig {
            min_db: 0.0,
            max_db: -100.0,
            ..Default::default()
        };
        assert!(config.validate(44100.0).is_err());
    }

    #[test]
    fn test_rejects_oversized_divide_unit() {
        let config = AnalyzerConfig {
            band_divide_unit: 40,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(44100.0),
            Err(ConfigError::DivideUnitTooLarge { .. })
        ));
    }

    #[test]
    fn test_small_transform_starves_bands() {
        // 256 points leaves the low targets only a few bins apart
        let config = AnalyzerConfig {
            fft_size: 256,
            ..Default::default()
        };
        assert!(config.validate(44100.0).is_err());
    }

    #[test]
    fn test_high_sample_rates_need_larger_transforms() {
        let config = AnalyzerConfig::default();
        for sr in [88200.0, 96000.0, 192000.0] {
            assert!(matches!(
                config.validate(sr),
                Err(ConfigError::DivideUnitTooLarge { .. })
            ));
        }
    }

    #[test]
    fn test_fit_to_sample_rate() {
        let config = AnalyzerConfig::default();
        for (sr, expected) in [
            (44100.0, 2048),
            (48000.0, 2048),
            (88200.0, 4096),
            (96000.0, 4096),
            (192000.0, 8192),
        ] {
            let fitted = config.fit_to_sample_rate(sr).unwrap();
            assert_eq!(fitted.fft_size, expected, "{} Hz", sr);
            assert!(fitted.validate(sr).is_ok());
            assert_eq!(fitted.band_divide_unit, config.band_divide_unit);
        }
    }

    #[test]
    fn test_fit_gives_up_at_the_cap() {
        // no band gets 4000 bins even at the largest transform
        let config = AnalyzerConfig {
            band_divide_unit: 4000,
            ..Default::default()
        };
        assert!(matches!(
            config.fit_to_sample_rate(44100.0),
            Err(ConfigError::DivideUnitTooLarge { .. })
        ));

        let bad_size = AnalyzerConfig {
            fft_size: 3000,
            ..Default::default()
        };
        assert_eq!(
            bad_size.fit_to_sample_rate(96000.0),
            Err(ConfigError::InvalidFftSize(3000))
        );
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config =
            AnalyzerConfig::from_json_str(r#"{ "forgetting_factor": 0.5, "window": "Hann" }"#)
                .unwrap();
        assert_eq!(config.forgetting_factor, 0.5);
        assert_eq!(config.window, WindowFunction::Hann);
        assert_eq!(config.band_divide_unit, 10);
        assert_eq!(config.target_frequencies.len(), 10);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = AnalyzerConfig {
            window: WindowFunction::Blackman,
            logarithmic: false,
            ..Default::default()
        };
        let json = config.to_json_string().unwrap();
        assert_eq!(AnalyzerConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_malformed_json_is_a_parse_error() {
        assert!(matches!(
            AnalyzerConfig::from_json_str("{ fft_size: }"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_linear_toggle_overrides_skew() {
        let mut config = AnalyzerConfig::default();
        assert_eq!(config.effective_skew(&config.line_scope), 0.2);
        config.logarithmic = false;
        assert_eq!(config.effective_skew(&config.line_scope), 1.0);
    }

    #[test]
    fn test_refresh_interval() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.refresh_interval(48000.0), 1600);
        assert_eq!(config.refresh_interval(44100.0), 1470);
    }
}
