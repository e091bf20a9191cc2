//! Spectral transform seam.
//!
//! The engine only prepares the transform input and interprets its output;
//! the transform itself sits behind `SpectralTransform` so the analysis path
//! can be driven by any complex FFT of the configured size.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Complex-to-complex forward transform of a fixed power-of-two size.
pub trait SpectralTransform: Send {
    fn size(&self) -> usize;

    /// Transform `input` into `output`. Both slices have length `size()`.
    fn forward(&mut self, input: &[Complex<f32>], output: &mut [Complex<f32>]);
}

/// `rustfft`-backed forward FFT with pre-allocated scratch.
pub struct RustFftTransform {
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
    size: usize,
}

impl RustFftTransform {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        Self { fft, scratch, size }
    }
}

impl SpectralTransform for RustFftTransform {
    fn size(&self) -> usize {
        self.size
    }

    fn forward(&mut self, input: &[Complex<f32>], output: &mut [Complex<f32>]) {
        output.copy_from_slice(input);
        self.fft.process_with_scratch(output, &mut self.scratch);
    }
}
