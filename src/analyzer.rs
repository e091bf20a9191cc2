//! Spectrum Analyzer
//!
//! Owns every stage of one analysis cycle and the persistent state between
//! cycles. The audio thread only ever touches the shared history buffer; the
//! renderer only ever touches the shared meters. Everything else lives here
//! and is driven from a single (non-realtime) analysis context.
//!
//! ## Cycle
//! ```text
//! history --window--> input --transform--> spectrum --magnitude--> smoothed / dB
//!                                                       |
//!                           +---------------------------+------------------+
//!                           v                           v                  v
//!                     line scope (skew)         bar scope (skew)    band divide
//!                           +-------------> SpectrumMeters <-------------+
//! ```
//!
//! ## Audio Thread Safety
//! Nothing in this module is called from `process()`. Allocation only
//! happens in `new` and when the log/linear toggle rebuilds the scopes.

use crate::config::{AnalyzerConfig, ConfigError};
use crate::dsp::utils::bin_to_frequency;
use crate::dsp::{
    BandDivider, MagnitudeSmoother, RingBuffer, RustFftTransform, SkewMapping,
    SpectralTransform, WindowFunction, WindowTable,
};
use crate::meters::SpectrumMeters;
use log::{debug, info, warn};
use rustfft::num_complex::Complex;
use std::sync::Arc;

/// Dropped frames are reported once per this many occurrences.
const DROPPED_FRAME_LOG_INTERVAL: u64 = 256;

pub struct SpectrumAnalyzer {
    config: AnalyzerConfig,
    sample_rate: f32,

    history: Arc<RingBuffer>,
    meters: Arc<SpectrumMeters>,

    window: WindowTable,
    transform: Box<dyn SpectralTransform>,
    input: Vec<Complex<f32>>,
    spectrum: Vec<Complex<f32>>,
    magnitude: MagnitudeSmoother,

    line_scope: SkewMapping,
    bar_scope: SkewMapping,
    bands: BandDivider,

    line_levels: Vec<f32>,
    bar_levels: Vec<f32>,
    band_magnitudes: Vec<f32>,
    band_levels: Vec<f32>,

    cycles: u64,
}

impl SpectrumAnalyzer {
    /// Build an analyzer backed by the default `rustfft` transform.
    pub fn new(
        config: AnalyzerConfig,
        sample_rate: f32,
        history: Arc<RingBuffer>,
        meters: Arc<SpectrumMeters>,
    ) -> Result<Self, ConfigError> {
        let transform = Box::new(RustFftTransform::new(config.fft_size));
        Self::with_transform(config, sample_rate, history, meters, transform)
    }

    pub fn with_transform(
        config: AnalyzerConfig,
        sample_rate: f32,
        history: Arc<RingBuffer>,
        meters: Arc<SpectrumMeters>,
        transform: Box<dyn SpectralTransform>,
    ) -> Result<Self, ConfigError> {
        if let Err(e) = config.validate(sample_rate) {
            warn!("Analyzer config rejected: {}", e);
            return Err(e);
        }
        let n = config.fft_size;
        if history.capacity() != n {
            return Err(ConfigError::SizeMismatch {
                component: "history",
                expected: n,
                actual: history.capacity(),
            });
        }
        if transform.size() != n {
            return Err(ConfigError::SizeMismatch {
                component: "transform",
                expected: n,
                actual: transform.size(),
            });
        }

        let line_scope = SkewMapping::new(
            config.line_scope.buckets,
            config.effective_skew(&config.line_scope),
            n,
        )?;
        let bar_scope = SkewMapping::new(
            config.bar_scope.buckets,
            config.effective_skew(&config.bar_scope),
            n,
        )?;
        let bands = BandDivider::new(
            &config.target_frequencies,
            config.band_divide_unit,
            n,
            sample_rate,
        )?;

        if meters.line_len() != line_scope.buckets()
            || meters.bar_len() != bar_scope.buckets()
            || meters.band_len() != bands.output_len()
        {
            return Err(ConfigError::InvalidScope(format!(
                "meters sized {}/{}/{} but config needs {}/{}/{}",
                meters.line_len(),
                meters.bar_len(),
                meters.band_len(),
                line_scope.buckets(),
                bar_scope.buckets(),
                bands.output_len()
            )));
        }

        info!(
            "Spectrum analyzer ready: N={} fs={} window={} alpha={} bands={}x{}",
            n,
            sample_rate,
            config.window.name(),
            config.forgetting_factor,
            bands.band_count(),
            bands.divide_unit()
        );

        let range = config.decibel_range();
        let zero = Complex::new(0.0, 0.0);
        Ok(Self {
            window: WindowTable::new(config.window, n),
            transform,
            input: vec![zero; n],
            spectrum: vec![zero; n],
            magnitude: MagnitudeSmoother::new(n, config.forgetting_factor, range),
            line_levels: vec![0.0; line_scope.buckets()],
            bar_levels: vec![0.0; bar_scope.buckets()],
            band_magnitudes: vec![0.0; bands.output_len()],
            band_levels: vec![0.0; bands.output_len()],
            line_scope,
            bar_scope,
            bands,
            config,
            sample_rate,
            history,
            meters,
            cycles: 0,
        })
    }

    // =========================================================================
    // CYCLE
    // =========================================================================

    /// Run one cycle and publish it, unless the previous frame has not been
    /// taken yet. Returns whether a frame was published.
    pub fn refresh(&mut self) -> bool {
        let epoch = self.meters.epoch();
        self.refresh_since(epoch)
    }

    /// Like `refresh`, but the frame is only published if the meters are
    /// still in `epoch`. A caller that decides about resets before the cycle
    /// captures the epoch first, so a reset landing in between wins.
    pub fn refresh_since(&mut self, epoch: u64) -> bool {
        if self.meters.is_frame_pending() {
            self.record_dropped_frame();
            return false;
        }
        self.analyze();
        let published = self.meters.publish(
            epoch,
            &self.line_levels,
            &self.bar_levels,
            &self.band_levels,
            self.magnitude.peak_db(),
        );
        if !published {
            debug!("Discarding frame computed across a reset");
        }
        published
    }

    /// Count a frame the display was not ready for.
    pub fn record_dropped_frame(&self) {
        let dropped = self.meters.record_dropped_frame();
        if dropped % DROPPED_FRAME_LOG_INTERVAL == 1 {
            debug!("Display not keeping up: {} frames dropped", dropped);
        }
    }

    /// Run one cycle without touching the meters.
    pub fn analyze(&mut self) {
        self.window.fill_from(&self.history, &mut self.input);
        self.transform.forward(&self.input, &mut self.spectrum);
        self.magnitude.update(&self.spectrum);

        let range = self.magnitude.range();
        let levels = self.magnitude.levels_db();
        self.line_scope.fill(levels, range, &mut self.line_levels);
        self.bar_scope.fill(levels, range, &mut self.bar_levels);

        self.bands
            .divide(self.magnitude.smoothed(), &mut self.band_magnitudes);
        for (level, &mag) in self
            .band_levels
            .iter_mut()
            .zip(self.band_magnitudes.iter())
        {
            *level = range.normalize(self.magnitude.level_db(mag));
        }

        self.cycles += 1;
    }

    /// Forget all history and smoothing state. The history flush makes this
    /// a producer-side operation; use `reset_state` while a producer is live.
    pub fn reset(&mut self) {
        self.history.flush();
        let _ = self.reset_state();
    }

    /// Forget smoothing state, peak and published levels, leaving the
    /// history buffer to its writer. Returns the meters epoch the reset
    /// started.
    pub fn reset_state(&mut self) -> u64 {
        self.magnitude.reset();
        self.input.fill(Complex::new(0.0, 0.0));
        self.spectrum.fill(Complex::new(0.0, 0.0));
        self.line_levels.fill(0.0);
        self.bar_levels.fill(0.0);
        self.band_magnitudes.fill(0.0);
        self.band_levels.fill(0.0);
        let epoch = self.meters.clear();
        info!("Spectrum analyzer reset after {} cycles", self.cycles);
        self.cycles = 0;
        epoch
    }

    // =========================================================================
    // RUNTIME CONFIGURATION
    // =========================================================================

    pub fn set_forgetting_factor(&mut self, alpha: f32) -> Result<(), ConfigError> {
        if alpha == self.magnitude.forgetting_factor() {
            return Ok(());
        }
        self.magnitude.set_forgetting_factor(alpha)?;
        self.config.forgetting_factor = alpha;
        debug!("Forgetting factor set to {}", alpha);
        Ok(())
    }

    pub fn set_window(&mut self, kind: WindowFunction) {
        if self.window.select(kind) {
            self.config.window = kind;
            info!("Window set to {}", kind.name());
        }
    }

    /// Switch both scopes between their configured skew and a linear map.
    pub fn set_logarithmic(&mut self, logarithmic: bool) -> Result<(), ConfigError> {
        if logarithmic == self.config.logarithmic {
            return Ok(());
        }
        let mut config = self.config.clone();
        config.logarithmic = logarithmic;
        let line_scope = SkewMapping::new(
            config.line_scope.buckets,
            config.effective_skew(&config.line_scope),
            config.fft_size,
        )?;
        let bar_scope = SkewMapping::new(
            config.bar_scope.buckets,
            config.effective_skew(&config.bar_scope),
            config.fft_size,
        )?;
        self.line_scope = line_scope;
        self.bar_scope = bar_scope;
        self.config = config;
        info!(
            "Frequency axis set to {}",
            if logarithmic { "logarithmic" } else { "linear" }
        );
        Ok(())
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn fft_size(&self) -> usize {
        self.config.fft_size
    }

    pub fn history(&self) -> &Arc<RingBuffer> {
        &self.history
    }

    pub fn meters(&self) -> &Arc<SpectrumMeters> {
        &self.meters
    }

    pub fn window(&self) -> WindowFunction {
        self.window.kind()
    }

    pub fn forgetting_factor(&self) -> f32 {
        self.magnitude.forgetting_factor()
    }

    pub fn is_logarithmic(&self) -> bool {
        self.config.logarithmic
    }

    /// Raw transform output of the last cycle, `N` entries.
    pub fn spectrum(&self) -> &[Complex<f32>] {
        &self.spectrum
    }

    pub fn smoothed(&self) -> &[f32] {
        self.magnitude.smoothed()
    }

    pub fn levels_db(&self) -> &[f32] {
        self.magnitude.levels_db()
    }

    pub fn peak_db(&self) -> f32 {
        self.magnitude.peak_db()
    }

    pub fn line_levels(&self) -> &[f32] {
        &self.line_levels
    }

    pub fn bar_levels(&self) -> &[f32] {
        &self.bar_levels
    }

    pub fn band_levels(&self) -> &[f32] {
        &self.band_levels
    }

    /// Band-averaged linear magnitudes behind `band_levels`.
    pub fn band_magnitudes(&self) -> &[f32] {
        &self.band_magnitudes
    }

    pub fn line_scope(&self) -> &SkewMapping {
        &self.line_scope
    }

    pub fn bar_scope(&self) -> &SkewMapping {
        &self.bar_scope
    }

    pub fn band_divider(&self) -> &BandDivider {
        &self.bands
    }

    pub fn bin_frequency(&self, bin: usize) -> f32 {
        bin_to_frequency(bin as f32, self.config.fft_size, self.sample_rate)
    }

    pub fn line_frequency(&self, bucket: usize) -> f32 {
        self.line_scope.frequency_at(bucket, self.sample_rate)
    }

    pub fn bar_frequency(&self, bucket: usize) -> f32 {
        self.bar_scope.frequency_at(bucket, self.sample_rate)
    }

    /// Frequencies of the snapped band centres, one per target.
    pub fn band_centers(&self) -> Vec<f32> {
        self.bands
            .target_bins()
            .iter()
            .map(|&bin| self.bin_frequency(bin))
            .collect()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meters::DisplayFrame;

    fn build(config: AnalyzerConfig) -> SpectrumAnalyzer {
        let history = Arc::new(RingBuffer::new(config.fft_size));
        let meters = Arc::new(SpectrumMeters::for_config(&config));
        SpectrumAnalyzer::new(config, 44100.0, history, meters).unwrap()
    }

    /// Copies input to output untouched.
    struct IdentityTransform(usize);

    impl SpectralTransform for IdentityTransform {
        fn size(&self) -> usize {
            self.0
        }

        fn forward(&mut self, input: &[Complex<f32>], output: &mut [Complex<f32>]) {
            output.copy_from_slice(input);
        }
    }

    #[test]
    fn test_silence_sits_at_the_floor() {
        let mut analyzer = build(AnalyzerConfig::default());
        analyzer.analyze();
        assert!(analyzer.smoothed().iter().all(|&m| m == 0.0));
        assert!(analyzer.levels_db().iter().all(|&db| db == -100.0));
        assert_eq!(analyzer.peak_db(), -100.0);
        assert!(analyzer.line_levels().iter().all(|&v| v == 0.0));
        assert!(analyzer.band_levels().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_refresh_waits_for_consumer() {
        let mut analyzer = build(AnalyzerConfig::default());
        assert!(analyzer.refresh());
        assert!(!analyzer.refresh());
        assert!(!analyzer.refresh());
        assert_eq!(analyzer.meters().dropped_frames(), 2);
        assert_eq!(analyzer.cycles(), 1);

        let mut frame = DisplayFrame::default();
        assert!(analyzer.meters().take_frame(&mut frame));
        assert_eq!(frame.line.len(), 128);
        assert_eq!(frame.bars.len(), 32);
        assert_eq!(frame.bands.len(), 100);
        assert!(analyzer.refresh());
    }

    #[test]
    fn test_custom_transform_is_used() {
        let config = AnalyzerConfig {
            forgetting_factor: 1.0,
            ..Default::default()
        };
        let n = config.fft_size;
        let history = Arc::new(RingBuffer::new(n));
        let meters = Arc::new(SpectrumMeters::for_config(&config));
        let mut analyzer = SpectrumAnalyzer::with_transform(
            config,
            44100.0,
            Arc::clone(&history),
            meters,
            Box::new(IdentityTransform(n)),
        )
        .unwrap();

        for i in 0..n {
            history.write(i as f32);
        }
        analyzer.analyze();
        // rectangular window, oldest first: input[i] = i
        assert_eq!(analyzer.spectrum()[3].re, 3.0);
        assert_eq!(analyzer.smoothed()[3], 6.0);
    }

    #[test]
    fn test_mismatched_transform_is_rejected() {
        let config = AnalyzerConfig::default();
        let history = Arc::new(RingBuffer::new(2048));
        let meters = Arc::new(SpectrumMeters::for_config(&config));
        let result = SpectrumAnalyzer::with_transform(
            config,
            44100.0,
            history,
            meters,
            Box::new(IdentityTransform(1024)),
        );
        assert_eq!(
            result.err(),
            Some(ConfigError::SizeMismatch {
                component: "transform",
                expected: 2048,
                actual: 1024,
            })
        );
    }

    #[test]
    fn test_mismatched_history_is_rejected() {
        let config = AnalyzerConfig::default();
        let history = Arc::new(RingBuffer::new(4096));
        let meters = Arc::new(SpectrumMeters::for_config(&config));
        let result = SpectrumAnalyzer::new(config, 44100.0, history, meters);
        assert_eq!(
            result.err(),
            Some(ConfigError::SizeMismatch {
                component: "history",
                expected: 2048,
                actual: 4096,
            })
        );
    }

    #[test]
    fn test_mismatched_meters_are_rejected() {
        let config = AnalyzerConfig::default();
        let history = Arc::new(RingBuffer::new(2048));
        let meters = Arc::new(SpectrumMeters::new(64, 32, 100, -100.0));
        assert!(SpectrumAnalyzer::new(config, 44100.0, history, meters).is_err());
    }

    #[test]
    fn test_runtime_changes() {
        let mut analyzer = build(AnalyzerConfig::default());
        analyzer.set_window(WindowFunction::Blackman);
        assert_eq!(analyzer.window(), WindowFunction::Blackman);

        assert!(analyzer.set_forgetting_factor(0.0).is_err());
        assert_eq!(analyzer.forgetting_factor(), 0.2);
        analyzer.set_forgetting_factor(0.5).unwrap();
        assert_eq!(analyzer.forgetting_factor(), 0.5);

        let log_bin = analyzer.line_scope().bin_for_bucket(64);
        analyzer.set_logarithmic(false).unwrap();
        assert!(!analyzer.is_logarithmic());
        assert_eq!(analyzer.line_scope().skew(), 1.0);
        assert_eq!(analyzer.line_scope().bin_for_bucket(64), 512);
        assert!(log_bin < 512);
    }

    #[test]
    fn test_reset_clears_everything() {
        let config = AnalyzerConfig {
            forgetting_factor: 1.0,
            ..Default::default()
        };
        let mut analyzer = build(config);
        for i in 0..2048 {
            analyzer.history().write((i as f32 * 0.1).sin());
        }
        assert!(analyzer.refresh());
        assert!(analyzer.peak_db() > -100.0);

        analyzer.reset();
        assert_eq!(analyzer.history().samples_written(), 0);
        assert_eq!(analyzer.peak_db(), -100.0);
        assert_eq!(analyzer.meters().get_peak_db(), -100.0);
        assert!(!analyzer.meters().is_frame_pending());
        assert_eq!(analyzer.cycles(), 0);
        analyzer.analyze();
        assert!(analyzer.smoothed().iter().all(|&m| m == 0.0));
    }

    /// Identity transform that clears the shared meters mid-cycle, the way a
    /// host reset can land while a cycle is running.
    struct ClearingTransform {
        size: usize,
        meters: Arc<SpectrumMeters>,
    }

    impl SpectralTransform for ClearingTransform {
        fn size(&self) -> usize {
            self.size
        }

        fn forward(&mut self, input: &[Complex<f32>], output: &mut [Complex<f32>]) {
            output.copy_from_slice(input);
            self.meters.clear();
        }
    }

    #[test]
    fn test_reset_during_cycle_suppresses_publish() {
        let config = AnalyzerConfig {
            forgetting_factor: 1.0,
            ..Default::default()
        };
        let n = config.fft_size;
        let history = Arc::new(RingBuffer::new(n));
        let meters = Arc::new(SpectrumMeters::for_config(&config));
        let mut analyzer = SpectrumAnalyzer::with_transform(
            config,
            44100.0,
            Arc::clone(&history),
            Arc::clone(&meters),
            Box::new(ClearingTransform {
                size: n,
                meters: Arc::clone(&meters),
            }),
        )
        .unwrap();
        for _ in 0..n {
            history.write(0.5);
        }

        assert!(!analyzer.refresh());
        assert!(!meters.is_frame_pending());
        assert_eq!(meters.frames_published(), 0);
        assert_eq!(meters.get_peak_db(), -100.0);
        let mut frame = meters.empty_frame();
        assert!(!meters.take_frame(&mut frame));
    }

    #[test]
    fn test_stale_epoch_is_not_published() {
        let mut analyzer = build(AnalyzerConfig::default());
        let before = analyzer.meters().epoch();
        let after = analyzer.reset_state();
        assert_eq!(after, before + 1);

        assert!(!analyzer.refresh_since(before));
        assert!(!analyzer.meters().is_frame_pending());
        assert!(analyzer.refresh_since(after));
        assert!(analyzer.meters().is_frame_pending());
    }

    #[test]
    fn test_frequency_helpers() {
        let analyzer = build(AnalyzerConfig::default());
        assert_eq!(analyzer.line_frequency(0), 0.0);
        assert!((analyzer.bin_frequency(1024) - 22050.0).abs() < 1e-3);
        let centers = analyzer.band_centers();
        assert_eq!(centers.len(), 10);
        // 240 Hz snaps to bin 11
        assert!((centers[0] - 11.0 * 44100.0 / 2048.0).abs() < 1e-3);
    }
}
