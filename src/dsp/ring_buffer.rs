//! Sample History Ring Buffer
//!
//! Fixed-capacity circular store shared between the audio thread (the single
//! writer) and the analysis thread (the single reader). Samples are kept as
//! `f32` bit patterns in atomics, the same trick `Meters` uses, so neither
//! side ever takes a lock.
//!
//! ## Ordering
//! - The writer stores the slot, then publishes the advanced cursor with
//!   `Release`.
//! - The reader loads the cursor with `Acquire` before touching slots.
//! - A window read may observe samples written while it runs. Individual
//!   samples are never torn.
//! - `flush()` rewinds the cursor, so it belongs to the writer as well.
//!
//! ## Audio Thread Safety
//! - All storage is allocated in `new()`
//! - `write()` never blocks, never fails, never allocates

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

pub struct RingBuffer {
    slots: Box<[AtomicU32]>,
    /// Total samples written since the last flush. Only ever advances.
    cursor: AtomicUsize,
    mask: usize,
}

impl RingBuffer {
    /// `capacity` must be a power of two (it matches the transform size,
    /// which the configuration layer already validated).
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "ring buffer capacity must be a power of two, got {capacity}"
        );
        let slots = (0..capacity)
            .map(|_| AtomicU32::new(0.0f32.to_bits()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            cursor: AtomicUsize::new(0),
            mask: capacity - 1,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Append one sample. Must only be called from the producer context.
    #[inline]
    pub fn write(&self, sample: f32) {
        let cursor = self.cursor.load(Ordering::Relaxed);
        self.slots[cursor & self.mask].store(sample.to_bits(), Ordering::Relaxed);
        self.cursor.store(cursor.wrapping_add(1), Ordering::Release);
    }

    /// Sample `offset` positions behind the write cursor.
    ///
    /// Offset 1 is the newest sample. Offset `capacity` aliases offset 0 and
    /// addresses the oldest retained sample. Slots never written read as 0.
    #[inline]
    pub fn read(&self, offset: usize) -> f32 {
        self.read_at(self.cursor(), offset)
    }

    /// Write position to pin a multi-sample read to.
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Like `read`, but relative to a cursor taken earlier with `cursor()`.
    /// Samples written since then land in the oldest slots first, so the
    /// newest end of the pinned window stays intact.
    #[inline]
    pub fn read_at(&self, cursor: usize, offset: usize) -> f32 {
        assert!(
            offset <= self.capacity(),
            "ring buffer offset {offset} exceeds capacity {}",
            self.capacity()
        );
        let index = cursor.wrapping_sub(offset) & self.mask;
        f32::from_bits(self.slots[index].load(Ordering::Relaxed))
    }

    /// Zero every slot and rewind the cursor.
    pub fn flush(&self) {
        for slot in self.slots.iter() {
            slot.store(0.0f32.to_bits(), Ordering::Relaxed);
        }
        self.cursor.store(0, Ordering::Release);
    }

    /// Samples written since the last flush, modulo `usize::MAX + 1`.
    pub fn samples_written(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }
}
