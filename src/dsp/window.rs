//! Analysis windows.
//!
//! The selected window is tabulated once per reconfiguration; filling the
//! transform input is then a multiply per sample with no branching.

use super::ring_buffer::RingBuffer;
use nih_plug::prelude::Enum;
use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[repr(usize)]
pub enum WindowFunction {
    #[serde(rename = "Rectangular")]
    #[name = "Rectangular Window"]
    Rectangular,
    #[serde(rename = "Hann")]
    #[name = "Hanning Window"]
    Hann,
    #[serde(rename = "Hamming")]
    #[name = "Hamming Window"]
    Hamming,
    #[serde(rename = "Blackman")]
    #[name = "Blackman Window"]
    Blackman,
    #[serde(rename = "Triangle")]
    #[name = "Triangle Window"]
    Triangle,
}

impl Default for WindowFunction {
    fn default() -> Self {
        WindowFunction::Rectangular
    }
}

impl WindowFunction {
    pub fn name(&self) -> &'static str {
        match self {
            WindowFunction::Rectangular => "Rectangular",
            WindowFunction::Hann => "Hann",
            WindowFunction::Hamming => "Hamming",
            WindowFunction::Blackman => "Blackman",
            WindowFunction::Triangle => "Triangle",
        }
    }

    /// Gain at position `i` of an `n`-point window.
    pub fn gain(&self, i: usize, n: usize) -> f32 {
        // Degenerate lengths have no taper to speak of.
        if n < 2 {
            return 1.0;
        }
        let denom = (n - 1) as f32;
        let x = i as f32;
        match self {
            WindowFunction::Rectangular => 1.0,
            WindowFunction::Hann => 0.5 * (1.0 - (2.0 * PI * x / denom).cos()),
            WindowFunction::Hamming => 0.54 - 0.46 * (2.0 * PI * x / denom).cos(),
            WindowFunction::Blackman => {
                0.42 - 0.5 * (2.0 * PI * x / denom).cos() + 0.08 * (4.0 * PI * x / denom).cos()
            }
            WindowFunction::Triangle => {
                if i <= n / 2 {
                    2.0 * x / denom
                } else {
                    2.0 - 2.0 * x / denom
                }
            }
        }
    }
}

/// Precomputed gains for one window kind at one transform size.
#[derive(Clone, Debug)]
pub struct WindowTable {
    kind: WindowFunction,
    gains: Vec<f32>,
}

impl WindowTable {
    pub fn new(kind: WindowFunction, size: usize) -> Self {
        Self {
            kind,
            gains: (0..size).map(|i| kind.gain(i, size)).collect(),
        }
    }

    pub fn kind(&self) -> WindowFunction {
        self.kind
    }

    pub fn gains(&self) -> &[f32] {
        &self.gains
    }

    /// Retabulate in place. Returns `true` if the kind actually changed.
    pub fn select(&mut self, kind: WindowFunction) -> bool {
        if kind == self.kind {
            return false;
        }
        let size = self.gains.len();
        self.kind = kind;
        for (i, g) in self.gains.iter_mut().enumerate() {
            *g = kind.gain(i, size);
        }
        true
    }

    /// Fill `dest[i]` with `ring.read(N - i) * window(i)`, every read pinned
    /// to one cursor position.
    pub fn fill_from(&self, ring: &RingBuffer, dest: &mut [Complex<f32>]) {
        self.fill_at(ring, ring.cursor(), dest);
    }

    pub fn fill_at(&self, ring: &RingBuffer, cursor: usize, dest: &mut [Complex<f32>]) {
        let n = self.gains.len();
        debug_assert_eq!(dest.len(), n);
        debug_assert_eq!(ring.capacity(), n);
        for (i, (out, &gain)) in dest.iter_mut().zip(self.gains.iter()).enumerate() {
            *out = Complex::new(ring.read_at(cursor, n - i) * gain, 0.0);
        }
    }
}
