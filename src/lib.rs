pub mod analyzer;
pub mod config;
pub mod dsp;
pub mod meters;

pub use crate::analyzer::SpectrumAnalyzer;
pub use crate::config::{AnalyzerConfig, ConfigError, ScopeConfig};
pub use crate::dsp::{RingBuffer, SpectralTransform, WindowFunction};
pub use crate::meters::{DisplayFrame, SpectrumMeters};

use assert_no_alloc::permit_alloc;
use log::{error, info, warn};
use nih_plug::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

const DEFAULT_SAMPLE_RATE: f32 = 44100.0;

/// Work handed from the audio thread to the background executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerTask {
    /// Run one analysis cycle and publish it if the display is ready,
    /// otherwise count a dropped frame.
    Refresh,
}

// -----------------------------------------------------------------------------
// PARAMETERS
// -----------------------------------------------------------------------------
#[derive(Params)]
pub struct AnalyzerParams {
    #[id = "forgetting_factor"]
    pub forgetting_factor: FloatParam,

    #[id = "window"]
    pub window: EnumParam<WindowFunction>,

    #[id = "log_scale"]
    pub log_scale: BoolParam,
}

impl Default for AnalyzerParams {
    fn default() -> Self {
        Self {
            forgetting_factor: FloatParam::new(
                "Smoothing",
                dsp::magnitude::DEFAULT_FORGETTING_FACTOR,
                FloatRange::Linear {
                    min: 0.01,
                    max: 1.0,
                },
            )
            .with_step_size(0.01),

            window: EnumParam::new("Window", WindowFunction::default()),

            log_scale: BoolParam::new("Logarithmic", true),
        }
    }
}

// -----------------------------------------------------------------------------
// PLUGIN
// -----------------------------------------------------------------------------
pub struct SpectrumPlugin {
    params: Arc<AnalyzerParams>,
    config: AnalyzerConfig,

    // Shared with the analysis task
    history: Arc<RingBuffer>,
    meters: Arc<SpectrumMeters>,
    analyzer: Arc<Mutex<Option<SpectrumAnalyzer>>>,
    reset_requested: Arc<AtomicBool>,

    sample_rate: f32,
    refresh_interval: usize,
    samples_until_refresh: usize,
}

impl Default for SpectrumPlugin {
    fn default() -> Self {
        let config = AnalyzerConfig::default();
        let refresh_interval = config.refresh_interval(DEFAULT_SAMPLE_RATE);
        Self {
            params: Arc::new(AnalyzerParams::default()),
            history: Arc::new(RingBuffer::new(config.fft_size)),
            meters: Arc::new(SpectrumMeters::for_config(&config)),
            analyzer: Arc::new(Mutex::new(None)),
            reset_requested: Arc::new(AtomicBool::new(false)),
            sample_rate: DEFAULT_SAMPLE_RATE,
            refresh_interval,
            samples_until_refresh: refresh_interval,
            config,
        }
    }
}

impl SpectrumPlugin {
    /// Display handoff for an embedding renderer.
    pub fn meters(&self) -> Arc<SpectrumMeters> {
        Arc::clone(&self.meters)
    }

    /// Build the analyzer for a session at `sample_rate`. The transform size
    /// grows past the configured one when the bands need more resolution,
    /// and the history is reallocated to match.
    fn prepare(&mut self, sample_rate: f32) -> Result<SpectrumAnalyzer, ConfigError> {
        let mut config = self.config.clone();
        config.forgetting_factor = self.params.forgetting_factor.value();
        config.window = self.params.window.value();
        config.logarithmic = self.params.log_scale.value();
        let config = config.fit_to_sample_rate(sample_rate)?;
        if config.fft_size != self.config.fft_size {
            info!(
                "Transform size raised from {} to {} for {} Hz",
                self.config.fft_size, config.fft_size, sample_rate
            );
        }

        if self.history.capacity() == config.fft_size {
            self.history.flush();
        } else {
            self.history = Arc::new(RingBuffer::new(config.fft_size));
        }
        self.sample_rate = sample_rate;
        self.refresh_interval = config.refresh_interval(sample_rate);
        self.samples_until_refresh = self.refresh_interval;

        SpectrumAnalyzer::new(
            config,
            sample_rate,
            Arc::clone(&self.history),
            Arc::clone(&self.meters),
        )
    }

    /// Count `samples` towards the next refresh. Drops are counted by the
    /// task itself, so a refresh is requested even while a frame is pending.
    fn advance(&mut self, samples: usize) -> Option<AnalyzerTask> {
        self.samples_until_refresh = self.samples_until_refresh.saturating_sub(samples);
        if self.samples_until_refresh > 0 {
            return None;
        }
        self.samples_until_refresh = self.refresh_interval;
        Some(AnalyzerTask::Refresh)
    }

    fn process_internal(
        &mut self,
        buffer: &mut Buffer,
        context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        // Analysis follows channel 0; audio passes through untouched
        let Some(channel) = buffer.as_slice_immutable().first() else {
            return ProcessStatus::Normal;
        };
        for &sample in channel.iter() {
            self.history.write(sample);
        }

        if let Some(task) = self.advance(channel.len()) {
            context.execute_background(task);
        }

        ProcessStatus::Normal
    }
}

fn run_task(
    task: AnalyzerTask,
    analyzer: &Mutex<Option<SpectrumAnalyzer>>,
    params: &AnalyzerParams,
    reset_requested: &AtomicBool,
) {
    match task {
        AnalyzerTask::Refresh => {
            let Ok(mut slot) = analyzer.lock() else {
                error!("Analyzer state poisoned, skipping refresh");
                return;
            };
            let Some(analyzer) = slot.as_mut() else {
                return;
            };

            // Taken before the reset check: a host reset that lands after
            // this point bumps the epoch and the frame is discarded.
            let mut epoch = analyzer.meters().epoch();
            // The audio thread already flushed the history
            if reset_requested.swap(false, Ordering::AcqRel) {
                epoch = analyzer.reset_state();
            }
            if let Err(e) = analyzer.set_forgetting_factor(params.forgetting_factor.value()) {
                warn!("Ignoring smoothing change: {}", e);
            }
            analyzer.set_window(params.window.value());
            if let Err(e) = analyzer.set_logarithmic(params.log_scale.value()) {
                warn!("Ignoring scale change: {}", e);
            }

            analyzer.refresh_since(epoch);
        }
    }
}

impl Plugin for SpectrumPlugin {
    const NAME: &'static str = "SpectraScope";
    const VENDOR: &'static str = "SpectraScope";
    const URL: &'static str = "";
    const EMAIL: &'static str = "";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            ..AudioIOLayout::const_default()
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            ..AudioIOLayout::const_default()
        },
    ];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = AnalyzerTask;

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    fn task_executor(&mut self) -> TaskExecutor<Self> {
        let analyzer = Arc::clone(&self.analyzer);
        let params = Arc::clone(&self.params);
        let reset_requested = Arc::clone(&self.reset_requested);
        Box::new(move |task| run_task(task, &analyzer, &params, &reset_requested))
    }

    fn initialize(
        &mut self,
        _audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let analyzer = match permit_alloc(|| self.prepare(buffer_config.sample_rate)) {
                Ok(analyzer) => analyzer,
                Err(e) => {
                    error!("Spectrum analyzer failed to initialize: {}", e);
                    return false;
                }
            };

            let Ok(mut slot) = self.analyzer.lock() else {
                error!("Analyzer state poisoned during initialize");
                return false;
            };
            *slot = Some(analyzer);
            self.reset_requested.store(false, Ordering::Release);

            info!(
                "Initialized at {} Hz with N={}, refreshing every {} samples",
                self.sample_rate,
                self.history.capacity(),
                self.refresh_interval
            );
            true
        }))
        .unwrap_or(false)
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.process_internal(buffer, context)
        }))
        .unwrap_or(ProcessStatus::Normal)
    }

    fn reset(&mut self) {
        // May run on the audio thread: atomics only, the analyzer resets itself
        // on its next cycle.
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.history.flush();
            // Request before clearing, so a cycle that missed the request
            // still sees the epoch change
            self.reset_requested.store(true, Ordering::Release);
            let _ = self.meters.clear();
            self.samples_until_refresh = self.refresh_interval;
        }))
        .unwrap_or(());
    }
}

impl ClapPlugin for SpectrumPlugin {
    const CLAP_ID: &'static str = "com.spectrascope.analyzer";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("Spectrum analyzer with skewed line/bar scopes and band-divide display");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Analyzer,
        ClapFeature::Stereo,
        ClapFeature::Mono,
    ];
}

impl Vst3Plugin for SpectrumPlugin {
    const VST3_CLASS_ID: [u8; 16] = *b"SpectraScopeAnlz";
    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Fx, Vst3SubCategory::Analyzer];
}

nih_export_clap!(SpectrumPlugin);
nih_export_vst3!(SpectrumPlugin);
