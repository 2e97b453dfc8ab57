//! General direct-form IIR filter.
//!
//! ```text
//! y[n] = Σ b[k]·x[n-k] − Σ a[k]·y[n-k]      (a[0] normalized to 1)
//! ```
//!
//! Used both by the software engine's native IIR node and by the IIR
//! emulation that runs when an engine lacks one.

use std::collections::VecDeque;

/// Direct-form IIR filter with fixed coefficients.
#[derive(Debug, Clone)]
pub struct IirFilter {
    b: Vec<f64>,
    a: Vec<f64>,
    /// `x[n-1], x[n-2], ...`
    x_history: VecDeque<f64>,
    /// `y[n-1], y[n-2], ...`
    y_history: VecDeque<f64>,
}

impl IirFilter {
    /// Creates a filter, normalizing every coefficient by `feedback[0]`.
    ///
    /// Callers validate the coefficients first (see
    /// [`NodeKind::validate`](crate::NodeKind::validate)); a zero or missing
    /// `feedback[0]` yields a filter that outputs silence.
    pub fn new(feedforward: &[f64], feedback: &[f64]) -> Self {
        let a0 = feedback.first().copied().unwrap_or(0.0);
        let (b, a) = if a0 == 0.0 {
            (vec![0.0], vec![1.0])
        } else {
            (
                feedforward.iter().map(|c| c / a0).collect(),
                feedback.iter().map(|c| c / a0).collect(),
            )
        };
        Self {
            x_history: VecDeque::from(vec![0.0; b.len().saturating_sub(1)]),
            y_history: VecDeque::from(vec![0.0; a.len().saturating_sub(1)]),
            b,
            a,
        }
    }

    /// Returns the normalized feedforward coefficients.
    pub fn feedforward(&self) -> &[f64] {
        &self.b
    }

    /// Returns the normalized feedback coefficients (`a[0] == 1`).
    pub fn feedback(&self) -> &[f64] {
        &self.a
    }

    /// Processes a single sample.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let x = f64::from(input);
        let mut y = self.b[0] * x;
        for (b, past) in self.b[1..].iter().zip(&self.x_history) {
            y += b * past;
        }
        for (a, past) in self.a[1..].iter().zip(&self.y_history) {
            y -= a * past;
        }

        if !self.x_history.is_empty() {
            self.x_history.pop_back();
            self.x_history.push_front(x);
        }
        if !self.y_history.is_empty() {
            self.y_history.pop_back();
            self.y_history.push_front(y);
        }
        y as f32
    }

    /// Filters `samples` in place.
    pub fn process_slice(&mut self, samples: &mut [f32]) {
        for sample in samples {
            *sample = self.process(*sample);
        }
    }

    /// Clears the filter state.
    pub fn clear(&mut self) {
        self.x_history.iter_mut().for_each(|v| *v = 0.0);
        self.y_history.iter_mut().for_each(|v| *v = 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_passes_impulse() {
        let mut filter = IirFilter::new(&[1.0], &[1.0]);
        let mut samples = [1.0, 0.0, 0.0, 0.0];
        filter.process_slice(&mut samples);
        assert_eq!(samples, [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn coefficients_are_normalized() {
        let filter = IirFilter::new(&[2.0, 4.0], &[2.0, -1.0]);
        assert_eq!(filter.feedforward(), &[1.0, 2.0]);
        assert_eq!(filter.feedback(), &[1.0, -0.5]);
    }

    #[test]
    fn one_pole_impulse_response_is_geometric() {
        let mut filter = IirFilter::new(&[1.0], &[1.0, -0.5]);
        let mut samples = [1.0, 0.0, 0.0, 0.0];
        filter.process_slice(&mut samples);
        assert_eq!(samples, [1.0, 0.5, 0.25, 0.125]);
    }

    #[test]
    fn fir_taps_delay_the_input() {
        let mut filter = IirFilter::new(&[0.0, 0.0, 1.0], &[1.0]);
        let mut samples = [1.0, 2.0, 3.0, 4.0];
        filter.process_slice(&mut samples);
        assert_eq!(samples, [0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn clear_resets_state() {
        let mut filter = IirFilter::new(&[1.0], &[1.0, -0.9]);
        filter.process(1.0);
        filter.clear();
        assert_eq!(filter.process(0.0), 0.0);
    }
}
