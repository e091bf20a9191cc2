pub mod band_divide;
pub mod magnitude;
pub mod peak;
pub mod ring_buffer;
pub mod skew;
pub mod transform;
pub mod utils;
pub mod window;

pub use band_divide::{BandDivider, BandRange};
pub use magnitude::MagnitudeSmoother;
pub use peak::PeakTracker;
pub use ring_buffer::RingBuffer;
pub use skew::SkewMapping;
pub use transform::{RustFftTransform, SpectralTransform};
pub use utils::DecibelRange;
pub use window::{WindowFunction, WindowTable};
