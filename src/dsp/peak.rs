/// Running maximum of decibel-limited levels.
///
/// Only `update()` and `reset()` mutate it; between resets the value never
/// goes down.
#[derive(Clone, Copy, Debug)]
pub struct PeakTracker {
    floor_db: f32,
    peak_db: f32,
}

impl PeakTracker {
    pub fn new(floor_db: f32) -> Self {
        Self {
            floor_db,
            peak_db: floor_db,
        }
    }

    #[inline]
    pub fn update(&mut self, clamped_db: f32) {
        if clamped_db > self.peak_db {
            self.peak_db = clamped_db;
        }
    }

    pub fn reset(&mut self) {
        self.peak_db = self.floor_db;
    }

    #[inline]
    pub fn peak_db(&self) -> f32 {
        self.peak_db
    }
}
