//! Offline spectrum scan.
//!
//! Feeds channel 0 of a WAV file through the analyzer at the configured
//! refresh cadence and prints one JSON object per published frame.
//!
//! ```text
//! spectrum_scan <input.wav> [config.json]
//! ```

use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader};
use serde::Serialize;
use spectrascope::{AnalyzerConfig, RingBuffer, SpectrumAnalyzer, SpectrumMeters};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Serialize)]
struct FrameRecord<'a> {
    frame: u64,
    time_s: f64,
    peak_db: f32,
    line: &'a [f32],
    bars: &'a [f32],
    bands: &'a [f32],
}

fn read_channel0(input: &Path) -> Result<(Vec<f32>, f32)> {
    let reader = WavReader::open(input)
        .with_context(|| format!("failed to open WAV '{}'", input.display()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .context("failed to decode float samples")?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .context("failed to decode integer samples")?
        }
    };

    let samples = interleaved.into_iter().step_by(channels).collect();
    Ok((samples, spec.sample_rate as f32))
}

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let input = args
        .next()
        .map(PathBuf::from)
        .context("usage: spectrum_scan <input.wav> [config.json]")?;
    let config = match args.next().map(PathBuf::from) {
        Some(path) => AnalyzerConfig::from_json_file(&path)
            .with_context(|| format!("failed to load config '{}'", path.display()))?,
        None => AnalyzerConfig::default(),
    };

    let (samples, sample_rate) = read_channel0(&input)?;
    let config = config
        .fit_to_sample_rate(sample_rate)
        .context("invalid analyzer configuration")?;
    let interval = config.refresh_interval(sample_rate);

    let history = Arc::new(RingBuffer::new(config.fft_size));
    let meters = Arc::new(SpectrumMeters::for_config(&config));
    let mut analyzer = SpectrumAnalyzer::new(
        config,
        sample_rate,
        Arc::clone(&history),
        Arc::clone(&meters),
    )
    .context("invalid analyzer configuration")?;

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut frame = meters.empty_frame();
    let mut published = 0u64;

    for (i, chunk) in samples.chunks(interval).enumerate() {
        for &sample in chunk {
            history.write(sample);
        }
        if chunk.len() < interval {
            break;
        }
        if analyzer.refresh() && meters.take_frame(&mut frame) {
            let record = FrameRecord {
                frame: published,
                time_s: ((i + 1) * interval) as f64 / sample_rate as f64,
                peak_db: frame.peak_db,
                line: &frame.line,
                bars: &frame.bars,
                bands: &frame.bands,
            };
            serde_json::to_writer(&mut out, &record)?;
            writeln!(out)?;
            published += 1;
        }
    }
    out.flush()?;

    eprintln!(
        "Scanned '{}': {} samples, {} frames, peak {:.1} dB",
        input.display(),
        samples.len(),
        published,
        analyzer.peak_db()
    );
    Ok(())
}
