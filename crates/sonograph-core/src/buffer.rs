//! Planar multichannel sample buffers.
//!
//! [`AudioBuffer`] is the unit of exchange between the renderer and an engine:
//! engines render into one, buffer sources play one back, and emulated nodes
//! fill one from a partial render.

/// A planar (non-interleaved) buffer of `f32` samples.
///
/// Every channel has the same length. The sample rate travels with the data
/// so a buffer can be played back on a context without extra bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: f32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Creates a zeroed buffer with `channel_count` channels of `length` frames.
    pub fn new(channel_count: usize, length: usize, sample_rate: f32) -> Self {
        Self {
            sample_rate,
            channels: vec![vec![0.0; length]; channel_count],
        }
    }

    /// Creates a buffer from existing channel data.
    ///
    /// Shorter channels are zero-padded to the length of the longest one.
    pub fn from_channels(channels: Vec<Vec<f32>>, sample_rate: f32) -> Self {
        let length = channels.iter().map(Vec::len).max().unwrap_or(0);
        let channels = channels
            .into_iter()
            .map(|mut c| {
                c.resize(length, 0.0);
                c
            })
            .collect();
        Self {
            sample_rate,
            channels,
        }
    }

    /// Returns the sample rate in Hz.
    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Returns the number of channels.
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Returns the number of frames per channel.
    #[inline]
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Returns true if the buffer holds no frames.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the duration in seconds.
    pub fn duration(&self) -> f64 {
        self.len() as f64 / f64::from(self.sample_rate)
    }

    /// Returns one channel's samples.
    ///
    /// # Panics
    ///
    /// Panics if `index >= channel_count()`.
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Returns one channel's samples mutably.
    ///
    /// # Panics
    ///
    /// Panics if `index >= channel_count()`.
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    /// Iterates over all channels.
    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        self.channels.iter().map(Vec::as_slice)
    }

    /// Consumes the buffer and returns the raw channel vectors.
    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    /// Fills every channel with zeros.
    pub fn clear(&mut self) {
        for channel in &mut self.channels {
            channel.fill(0.0);
        }
    }

    /// Interleaves the channels frame by frame (`L R L R ...` for stereo).
    pub fn interleaved(&self) -> Vec<f32> {
        let channels = self.channel_count();
        let mut out = Vec::with_capacity(self.len() * channels);
        for frame in 0..self.len() {
            for channel in &self.channels {
                out.push(channel[frame]);
            }
        }
        out
    }

    /// Returns the largest absolute sample value across all channels.
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|c| c.iter())
            .fold(0.0_f32, |acc, s| acc.max(s.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_is_silent() {
        let buffer = AudioBuffer::new(2, 16, 48000.0);
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.len(), 16);
        assert_eq!(buffer.peak(), 0.0);
    }

    #[test]
    fn from_channels_pads_short_channels() {
        let buffer = AudioBuffer::from_channels(vec![vec![1.0, 2.0, 3.0], vec![4.0]], 44100.0);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.channel(1), &[4.0, 0.0, 0.0]);
    }

    #[test]
    fn interleave_orders_frames() {
        let buffer = AudioBuffer::from_channels(vec![vec![1.0, 2.0], vec![-1.0, -2.0]], 44100.0);
        assert_eq!(buffer.interleaved(), vec![1.0, -1.0, 2.0, -2.0]);
    }

    #[test]
    fn empty_buffer_has_no_channels_or_frames() {
        let buffer = AudioBuffer::new(0, 0, 44100.0);
        assert!(buffer.is_empty());
        assert_eq!(buffer.duration(), 0.0);
    }
}
