//! Biquad (bi-quadratic) filter with Web-Audio-style parameterization.
//!
//! Coefficients follow the RBJ Audio EQ Cookbook. Low-pass and high-pass
//! interpret `Q` in dB; band-pass, notch, all-pass and peaking use it as a
//! plain quality factor; shelves use a fixed slope of 1.

use std::f64::consts::PI;

use crate::node::BiquadType;

/// Normalized biquad coefficients (`a0 == 1`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoefficients {
    /// Feedforward `b0`.
    pub b0: f64,
    /// Feedforward `b1`.
    pub b1: f64,
    /// Feedforward `b2`.
    pub b2: f64,
    /// Feedback `a1`.
    pub a1: f64,
    /// Feedback `a2`.
    pub a2: f64,
}

impl BiquadCoefficients {
    /// Passthrough coefficients.
    pub const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Computes coefficients for the given response.
    ///
    /// # Arguments
    ///
    /// * `filter_type` - Response type
    /// * `frequency` - Cutoff or center frequency in Hz
    /// * `detune` - Frequency offset in cents
    /// * `q` - Quality factor (dB for low/high-pass)
    /// * `gain_db` - Gain in dB (shelves and peaking only)
    /// * `sample_rate` - Sample rate in Hz
    pub fn compute(
        filter_type: BiquadType,
        frequency: f32,
        detune: f32,
        q: f32,
        gain_db: f32,
        sample_rate: f32,
    ) -> Self {
        let sample_rate = f64::from(sample_rate);
        let f0 = f64::from(frequency) * (f64::from(detune) / 1200.0).exp2();
        // Keep w0 strictly inside (0, pi) so the formulas stay finite.
        let normalized = (f0 / sample_rate).clamp(1e-6, 0.5 - 1e-6);
        let w0 = 2.0 * PI * normalized;
        let (sin, cos) = w0.sin_cos();
        let q = f64::from(q);
        let a = 10f64.powf(f64::from(gain_db) / 40.0);

        let (b0, b1, b2, a0, a1, a2) = match filter_type {
            BiquadType::Lowpass => {
                let alpha = sin / (2.0 * 10f64.powf(q / 20.0));
                (
                    (1.0 - cos) / 2.0,
                    1.0 - cos,
                    (1.0 - cos) / 2.0,
                    1.0 + alpha,
                    -2.0 * cos,
                    1.0 - alpha,
                )
            }
            BiquadType::Highpass => {
                let alpha = sin / (2.0 * 10f64.powf(q / 20.0));
                (
                    (1.0 + cos) / 2.0,
                    -(1.0 + cos),
                    (1.0 + cos) / 2.0,
                    1.0 + alpha,
                    -2.0 * cos,
                    1.0 - alpha,
                )
            }
            BiquadType::Bandpass => {
                let alpha = sin / (2.0 * q.max(1e-4));
                (alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos, 1.0 - alpha)
            }
            BiquadType::Notch => {
                let alpha = sin / (2.0 * q.max(1e-4));
                (1.0, -2.0 * cos, 1.0, 1.0 + alpha, -2.0 * cos, 1.0 - alpha)
            }
            BiquadType::Allpass => {
                let alpha = sin / (2.0 * q.max(1e-4));
                (
                    1.0 - alpha,
                    -2.0 * cos,
                    1.0 + alpha,
                    1.0 + alpha,
                    -2.0 * cos,
                    1.0 - alpha,
                )
            }
            BiquadType::Peaking => {
                let alpha = sin / (2.0 * q.max(1e-4));
                (
                    1.0 + alpha * a,
                    -2.0 * cos,
                    1.0 - alpha * a,
                    1.0 + alpha / a,
                    -2.0 * cos,
                    1.0 - alpha / a,
                )
            }
            BiquadType::Lowshelf => {
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * sin / 2.0 * 2f64.sqrt();
                (
                    a * ((a + 1.0) - (a - 1.0) * cos + two_sqrt_a_alpha),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos),
                    a * ((a + 1.0) - (a - 1.0) * cos - two_sqrt_a_alpha),
                    (a + 1.0) + (a - 1.0) * cos + two_sqrt_a_alpha,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos),
                    (a + 1.0) + (a - 1.0) * cos - two_sqrt_a_alpha,
                )
            }
            BiquadType::Highshelf => {
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * sin / 2.0 * 2f64.sqrt();
                (
                    a * ((a + 1.0) + (a - 1.0) * cos + two_sqrt_a_alpha),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos),
                    a * ((a + 1.0) + (a - 1.0) * cos - two_sqrt_a_alpha),
                    (a + 1.0) - (a - 1.0) * cos + two_sqrt_a_alpha,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos),
                    (a + 1.0) - (a - 1.0) * cos - two_sqrt_a_alpha,
                )
            }
        };

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// Direct Form I biquad state.
///
/// ```text
/// y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2]
///                - a1*y[n-1] - a2*y[n-2]
/// ```
#[derive(Debug, Clone)]
pub struct Biquad {
    coefficients: BiquadCoefficients,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    /// Creates a passthrough biquad.
    pub fn new() -> Self {
        Self {
            coefficients: BiquadCoefficients::IDENTITY,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Replaces the coefficients, keeping the filter state.
    pub fn set_coefficients(&mut self, coefficients: BiquadCoefficients) {
        self.coefficients = coefficients;
    }

    /// Returns the current coefficients.
    pub fn coefficients(&self) -> BiquadCoefficients {
        self.coefficients
    }

    /// Processes a single sample.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let c = &self.coefficients;
        let x = f64::from(input);
        let y = c.b0 * x + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y as f32
    }

    /// Clears the delay lines.
    pub fn clear(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

impl Default for Biquad {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settle(filter_type: BiquadType, frequency: f32, input: impl Fn(usize) -> f32) -> f32 {
        let mut biquad = Biquad::new();
        biquad.set_coefficients(BiquadCoefficients::compute(
            filter_type,
            frequency,
            0.0,
            0.0,
            0.0,
            44100.0,
        ));
        let mut peak = 0.0_f32;
        for n in 0..8192 {
            let y = biquad.process(input(n));
            if n > 4096 {
                peak = peak.max(y.abs());
            }
        }
        peak
    }

    #[test]
    fn passthrough_by_default() {
        let mut biquad = Biquad::new();
        for i in 0..10 {
            let input = i as f32 * 0.1;
            assert!((biquad.process(input) - input).abs() < 1e-6);
        }
    }

    #[test]
    fn lowpass_passes_dc() {
        let out = settle(BiquadType::Lowpass, 1000.0, |_| 1.0);
        assert!((out - 1.0).abs() < 0.01, "got {out}");
    }

    #[test]
    fn highpass_blocks_dc() {
        let out = settle(BiquadType::Highpass, 1000.0, |_| 1.0);
        assert!(out < 0.01, "got {out}");
    }

    #[test]
    fn lowpass_attenuates_near_nyquist() {
        let out = settle(BiquadType::Lowpass, 200.0, |n| if n % 2 == 0 { 1.0 } else { -1.0 });
        assert!(out < 0.001, "got {out}");
    }

    #[test]
    fn detune_of_one_octave_doubles_frequency() {
        let a = BiquadCoefficients::compute(BiquadType::Lowpass, 1000.0, 1200.0, 1.0, 0.0, 48000.0);
        let b = BiquadCoefficients::compute(BiquadType::Lowpass, 2000.0, 0.0, 1.0, 0.0, 48000.0);
        assert!((a.b0 - b.b0).abs() < 1e-12);
        assert!((a.a1 - b.a1).abs() < 1e-12);
    }

    #[test]
    fn peaking_with_zero_gain_is_flat() {
        let c = BiquadCoefficients::compute(BiquadType::Peaking, 1000.0, 0.0, 1.0, 0.0, 44100.0);
        assert!((c.b0 - 1.0).abs() < 1e-12);
        assert!((c.b1 - c.a1).abs() < 1e-12);
        assert!((c.b2 - c.a2).abs() < 1e-12);
    }
}
