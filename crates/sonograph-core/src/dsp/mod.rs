//! Signal-processing kernels shared by the software engine and the
//! emulation layer.

pub mod biquad;
pub mod delay;
pub mod iir;
pub mod mix;

pub use biquad::{Biquad, BiquadCoefficients};
pub use delay::DelayLine;
pub use iir::IirFilter;
pub use mix::accumulate;
