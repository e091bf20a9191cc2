//! Lock-free display handoff between the analysis path and a renderer.
//!
//! The analysis path publishes one frame per cycle into atomic float slots
//! and raises `ready`. A renderer copies the slots out with `take_frame`,
//! which lowers `ready` again. While a frame is pending the analysis path
//! skips new cycles, so a reader never sees two frames interleaved.
//!
//! ## Epochs
//! `ready` shares one atomic word with an epoch counter that `clear()`
//! advances: `state = epoch << 1 | ready`. A cycle captures `epoch()` before
//! it starts and `publish` only raises `ready` if the epoch is unchanged, so
//! a frame computed from pre-reset state is never shown after a reset.

use crate::config::AnalyzerConfig;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

const READY: u64 = 1;

fn atomic_slots(len: usize) -> Box<[AtomicU32]> {
    (0..len).map(|_| AtomicU32::new(0.0f32.to_bits())).collect()
}

#[inline]
fn store_all(slots: &[AtomicU32], values: &[f32]) {
    for (slot, value) in slots.iter().zip(values.iter()) {
        slot.store(value.to_bits(), Ordering::Relaxed);
    }
}

#[inline]
fn load_all(slots: &[AtomicU32], out: &mut [f32]) {
    for (value, slot) in out.iter_mut().zip(slots.iter()) {
        *value = f32::from_bits(slot.load(Ordering::Relaxed));
    }
}

/// Plain copy of one published frame, every value normalised to `[0, 1]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DisplayFrame {
    pub line: Vec<f32>,
    pub bars: Vec<f32>,
    pub bands: Vec<f32>,
    pub peak_db: f32,
}

impl DisplayFrame {
    pub fn with_sizes(line: usize, bars: usize, bands: usize) -> Self {
        Self {
            line: vec![0.0; line],
            bars: vec![0.0; bars],
            bands: vec![0.0; bands],
            peak_db: 0.0,
        }
    }
}

/// Shared display state for the line scope, bar scope and band-divide cells.
pub struct SpectrumMeters {
    line: Box<[AtomicU32]>,
    bars: Box<[AtomicU32]>,
    bands: Box<[AtomicU32]>,
    peak_db: AtomicU32,
    floor_db: f32,
    state: AtomicU64,
    frames_published: AtomicU64,
    dropped_frames: AtomicU64,
}

impl SpectrumMeters {
    /// `floor_db` is the peak reported before the first frame and after
    /// every `clear()`.
    pub fn new(line: usize, bars: usize, bands: usize, floor_db: f32) -> Self {
        Self {
            line: atomic_slots(line),
            bars: atomic_slots(bars),
            bands: atomic_slots(bands),
            peak_db: AtomicU32::new(floor_db.to_bits()),
            floor_db,
            state: AtomicU64::new(0),
            frames_published: AtomicU64::new(0),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Slots sized for the scopes and bands `config` describes.
    pub fn for_config(config: &AnalyzerConfig) -> Self {
        Self::new(
            config.line_scope.buckets,
            config.bar_scope.buckets,
            config.target_frequencies.len() * config.band_divide_unit,
            config.min_db,
        )
    }

    pub fn line_len(&self) -> usize {
        self.line.len()
    }

    pub fn bar_len(&self) -> usize {
        self.bars.len()
    }

    pub fn band_len(&self) -> usize {
        self.bands.len()
    }

    pub fn empty_frame(&self) -> DisplayFrame {
        DisplayFrame::with_sizes(self.line.len(), self.bars.len(), self.bands.len())
    }

    /// True between `publish` and the next `take_frame`.
    pub fn is_frame_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) & READY != 0
    }

    /// Number of `clear()` calls so far.
    pub fn epoch(&self) -> u64 {
        self.state.load(Ordering::Acquire) >> 1
    }

    /// Publish a frame computed since `epoch`. Returns false, leaving
    /// nothing pending, if the meters were cleared in the meantime or a
    /// frame is still waiting.
    pub fn publish(
        &self,
        epoch: u64,
        line: &[f32],
        bars: &[f32],
        bands: &[f32],
        peak_db: f32,
    ) -> bool {
        if self.state.load(Ordering::Acquire) != epoch << 1 {
            return false;
        }
        store_all(&self.line, line);
        store_all(&self.bars, bars);
        store_all(&self.bands, bands);
        self.peak_db.store(peak_db.to_bits(), Ordering::Relaxed);
        let raised = self
            .state
            .compare_exchange(epoch << 1, epoch << 1 | READY, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if raised {
            self.frames_published.fetch_add(1, Ordering::Relaxed);
        }
        raised
    }

    /// Copy the pending frame into `frame` and release the slot.
    /// Returns false when nothing is pending, or when a `clear()` lands
    /// while the frame is being copied.
    pub fn take_frame(&self, frame: &mut DisplayFrame) -> bool {
        let state = self.state.load(Ordering::Acquire);
        if state & READY == 0 {
            return false;
        }
        frame.line.resize(self.line.len(), 0.0);
        frame.bars.resize(self.bars.len(), 0.0);
        frame.bands.resize(self.bands.len(), 0.0);
        load_all(&self.line, &mut frame.line);
        load_all(&self.bars, &mut frame.bars);
        load_all(&self.bands, &mut frame.bands);
        frame.peak_db = f32::from_bits(self.peak_db.load(Ordering::Relaxed));
        self.state
            .compare_exchange(state, state & !READY, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Drop any pending frame, clear the slots and start a new epoch.
    /// Returns the new epoch.
    pub fn clear(&self) -> u64 {
        // Lowers READY and advances the epoch in one step
        let previous = match self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                Some(((state >> 1) + 1) << 1)
            }) {
            Ok(state) | Err(state) => state,
        };
        for slot in self.line.iter().chain(self.bars.iter()).chain(self.bands.iter()) {
            slot.store(0.0f32.to_bits(), Ordering::Relaxed);
        }
        self.peak_db.store(self.floor_db.to_bits(), Ordering::Relaxed);
        (previous >> 1) + 1
    }

    /// Returns the new total.
    pub fn record_dropped_frame(&self) -> u64 {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    pub fn frames_published(&self) -> u64 {
        self.frames_published.load(Ordering::Relaxed)
    }

    pub fn get_peak_db(&self) -> f32 {
        f32::from_bits(self.peak_db.load(Ordering::Relaxed))
    }
}
