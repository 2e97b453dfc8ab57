//! Circular-buffer delay line with linear interpolation.
//!
//! Reads are expressed relative to the most recently pushed sample:
//! `tap(0.0)` returns it, `tap(1.0)` the one before, and fractional delays
//! interpolate between neighbours. A node outside a feedback loop pushes the
//! current frame and then taps; a node inside a loop taps first (with the delay
//! reduced by one frame) so its output is known before its input is computed.

/// Interpolated delay line (heap-allocated, never reallocates).
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    /// Index of the most recently pushed sample.
    head: usize,
}

impl DelayLine {
    /// Creates a delay line able to reach `max_delay_samples` into the past.
    pub fn new(max_delay_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; max_delay_samples + 2],
            head: 0,
        }
    }

    /// Creates a delay line from a sample rate and a maximum delay time.
    pub fn from_time(sample_rate: f32, max_seconds: f64) -> Self {
        Self::new((f64::from(sample_rate) * max_seconds).ceil() as usize)
    }

    /// Returns the largest reachable delay in samples.
    pub fn max_delay(&self) -> usize {
        self.buffer.len() - 2
    }

    /// Appends a sample.
    #[inline]
    pub fn push(&mut self, sample: f32) {
        self.head = (self.head + 1) % self.buffer.len();
        self.buffer[self.head] = sample;
    }

    /// Reads the sample pushed `delay` samples before the latest one.
    #[inline]
    pub fn tap(&self, delay: f64) -> f32 {
        let delay = delay.clamp(0.0, self.max_delay() as f64);
        let whole = delay.floor() as usize;
        let frac = (delay - whole as f64) as f32;
        let a = self.at(whole);
        if frac == 0.0 {
            a
        } else {
            let b = self.at(whole + 1);
            a + (b - a) * frac
        }
    }

    #[inline]
    fn at(&self, back: usize) -> f32 {
        let len = self.buffer.len();
        self.buffer[(self.head + len - back % len) % len]
    }

    /// Clears the stored samples.
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.head = 0;
    }
}
