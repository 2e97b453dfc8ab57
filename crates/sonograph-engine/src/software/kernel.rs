//! Per-node processing state of a software render.

use std::f64::consts::TAU;

use sonograph_core::dsp::{Biquad, BiquadCoefficients, DelayLine, IirFilter};
use sonograph_core::{
    AudioBuffer, BufferSourceOptions, Lifecycle, NodeKind, RENDER_QUANTUM, Waveform,
};

use super::NativeNode;

/// Channels of one port for one block: `signal[channel][frame]`.
pub(crate) type Signal = Vec<Vec<f32>>;

/// Position of a block on the context timeline.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Block {
    pub start: usize,
    pub frames: usize,
    pub sample_rate: f32,
}

impl Block {
    #[inline]
    pub fn time(&self, frame: usize) -> f64 {
        (self.start + frame) as f64 / f64::from(self.sample_rate)
    }

    pub fn silence(&self, channels: usize) -> Signal {
        vec![vec![0.0; self.frames]; channels]
    }
}

/// Processing state carried across blocks.
#[derive(Debug)]
pub(crate) enum Kernel {
    Stateless,
    Oscillator { phase: f64 },
    BufferSource { position: Option<f64> },
    Delay { lines: Vec<DelayLine> },
    Biquad { filters: Vec<Biquad>, last: Option<[f32; 4]> },
    Iir { filters: Vec<IirFilter> },
}

impl Kernel {
    pub fn new(kind: &NodeKind, sample_rate: f32) -> Self {
        match kind {
            NodeKind::Oscillator(_) => Kernel::Oscillator { phase: 0.0 },
            NodeKind::BufferSource(_) => Kernel::BufferSource { position: None },
            NodeKind::Delay(options) => {
                // Room for a whole block on top of the longest delay.
                let max = (f64::from(sample_rate) * options.max_delay_time).ceil() as usize;
                Kernel::Delay {
                    lines: vec![DelayLine::new(max + RENDER_QUANTUM)],
                }
            }
            NodeKind::BiquadFilter(_) => Kernel::Biquad {
                filters: Vec::new(),
                last: None,
            },
            NodeKind::IirFilter(_) => Kernel::Iir {
                filters: Vec::new(),
            },
            _ => Kernel::Stateless,
        }
    }

    /// Runs one block of a node, returning one signal per output.
    pub fn process(
        &mut self,
        node: &NativeNode,
        inputs: Vec<Signal>,
        params: &[Vec<f32>],
        block: Block,
    ) -> Vec<Signal> {
        let mut inputs = inputs.into_iter();
        if let NodeKind::Delay(_) = node.kind {
            let input = inputs.next().unwrap_or_default();
            self.write_delay(&input, block.frames);
            return vec![self.read_delay(&params[0], block, 0.0)];
        }

        match (&node.kind, self) {
            (NodeKind::Destination, _) => vec![inputs.next().unwrap_or_default()],
            (NodeKind::ConstantSource, _) => {
                let mut out = block.silence(1);
                for (i, sample) in out[0].iter_mut().enumerate() {
                    if active(node.lifecycle, block.time(i)) {
                        *sample = params[0][i];
                    }
                }
                vec![out]
            }
            (NodeKind::Oscillator(options), Kernel::Oscillator { phase }) => {
                let mut out = block.silence(1);
                let sample_rate = f64::from(block.sample_rate);
                for (i, sample) in out[0].iter_mut().enumerate() {
                    if !active(node.lifecycle, block.time(i)) {
                        continue;
                    }
                    let frequency =
                        f64::from(params[0][i]) * (f64::from(params[1][i]) / 1200.0).exp2();
                    *sample = waveform(options.waveform, *phase) as f32;
                    *phase = (*phase + frequency / sample_rate).rem_euclid(1.0);
                }
                vec![out]
            }
            (NodeKind::BufferSource(options), Kernel::BufferSource { position }) => {
                vec![play_buffer(options, node.lifecycle, position, &params[0], block)]
            }
            (NodeKind::Gain, _) => {
                let mut signal = inputs.next().unwrap_or_default();
                for channel in &mut signal {
                    for (sample, gain) in channel.iter_mut().zip(&params[0]) {
                        *sample *= *gain;
                    }
                }
                vec![signal]
            }
            (NodeKind::BiquadFilter(options), Kernel::Biquad { filters, last }) => {
                let mut signal = inputs.next().unwrap_or_default();
                if filters.len() < signal.len() {
                    filters.resize_with(signal.len(), Biquad::new);
                    *last = None;
                }
                for i in 0..block.frames {
                    let current = [params[0][i], params[1][i], params[2][i], params[3][i]];
                    if *last != Some(current) {
                        let coefficients = BiquadCoefficients::compute(
                            options.filter_type,
                            current[0],
                            current[1],
                            current[2],
                            current[3],
                            block.sample_rate,
                        );
                        for filter in filters.iter_mut() {
                            filter.set_coefficients(coefficients);
                        }
                        *last = Some(current);
                    }
                    for (channel, filter) in signal.iter_mut().zip(filters.iter_mut()) {
                        channel[i] = filter.process(channel[i]);
                    }
                }
                vec![signal]
            }
            (NodeKind::IirFilter(options), Kernel::Iir { filters }) => {
                let mut signal = inputs.next().unwrap_or_default();
                while filters.len() < signal.len() {
                    filters.push(IirFilter::new(&options.feedforward, &options.feedback));
                }
                for (channel, filter) in signal.iter_mut().zip(filters.iter_mut()) {
                    filter.process_slice(channel);
                }
                vec![signal]
            }
            (NodeKind::ChannelSplitter { outputs }, _) => {
                let mut channels = inputs.next().unwrap_or_default().into_iter();
                (0..*outputs)
                    .map(|_| {
                        vec![channels.next().unwrap_or_else(|| vec![0.0; block.frames])]
                    })
                    .collect()
            }
            (NodeKind::ChannelMerger { .. }, _) => {
                vec![inputs.flatten().collect()]
            }
            (kind, _) => {
                let outputs = kind.traits().outputs;
                vec![block.silence(1); outputs]
            }
        }
    }

    /// Pushes one block of input into a delay.
    pub fn write_delay(&mut self, input: &Signal, frames: usize) {
        let Kernel::Delay { lines } = self else {
            return;
        };
        if lines.len() < input.len() {
            let template = DelayLine::new(lines.first().map_or(0, DelayLine::max_delay));
            lines.resize(input.len(), template);
        }
        for i in 0..frames {
            for (c, line) in lines.iter_mut().enumerate() {
                line.push(input.get(c).map_or(0.0, |channel| channel[i]));
            }
        }
    }

    /// Reads one block out of a delay.
    ///
    /// `lag` frames are subtracted from every tap; a delay on a feedback loop
    /// reads one frame ahead of its write and is clamped to one frame.
    pub fn read_delay(&self, delay_time: &[f32], block: Block, lag: f64) -> Signal {
        let Kernel::Delay { lines, .. } = self else {
            return block.silence(1);
        };
        let sample_rate = f64::from(block.sample_rate);
        let mut out = block.silence(lines.len());
        for i in 0..block.frames {
            // The tap is relative to the latest sample, which for a block of
            // several frames is the last one.
            let back = (block.frames - 1 - i) as f64;
            let delay = f64::from(delay_time[i]) * sample_rate;
            let delay = if lag > 0.0 {
                delay.max(lag) - lag
            } else {
                delay
            };
            for (channel, line) in out.iter_mut().zip(lines) {
                channel[i] = line.tap(delay + back);
            }
        }
        out
    }
}

/// Whether a source is sounding at `time`.
fn active(lifecycle: Lifecycle, time: f64) -> bool {
    let Some(start) = lifecycle.start else {
        return false;
    };
    time >= start.when
        && lifecycle.stop.is_none_or(|stop| time < stop)
        && start.duration.is_none_or(|duration| time < start.when + duration)
}

/// One period of `waveform` at `phase` in `[0, 1)`, starting at zero except
/// for the square wave.
fn waveform(waveform: Waveform, phase: f64) -> f64 {
    match waveform {
        Waveform::Sine => (TAU * phase).sin(),
        Waveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        Waveform::Sawtooth => 2.0 * ((phase + 0.5) % 1.0) - 1.0,
        Waveform::Triangle => {
            if phase < 0.25 {
                4.0 * phase
            } else if phase < 0.75 {
                2.0 - 4.0 * phase
            } else {
                4.0 * phase - 4.0
            }
        }
    }
}

fn play_buffer(
    options: &BufferSourceOptions,
    lifecycle: Lifecycle,
    position: &mut Option<f64>,
    playback_rate: &[f32],
    block: Block,
) -> Signal {
    let Some(buffer) = options.buffer.as_deref().filter(|b| !b.is_empty()) else {
        let channels = options.buffer.as_ref().map_or(1, |b| b.channel_count().max(1));
        return block.silence(channels);
    };
    let mut out = block.silence(buffer.channel_count());
    let buffer_rate = f64::from(buffer.sample_rate());
    let ratio = buffer_rate / f64::from(block.sample_rate);
    let len = buffer.len() as f64;
    let (loop_start, loop_end) = loop_points(options, buffer_rate, len);

    for i in 0..block.frames {
        if !active(lifecycle, block.time(i)) {
            continue;
        }
        let offset = lifecycle.start.map_or(0.0, |s| s.offset);
        let pos = *position.get_or_insert(offset * buffer_rate);
        if pos >= len || pos < 0.0 {
            continue;
        }
        for (c, channel) in out.iter_mut().enumerate() {
            channel[i] = sample_at(buffer, c, pos);
        }
        let mut next = pos + f64::from(playback_rate[i]) * ratio;
        if options.looping && next >= loop_end {
            next = loop_start + (next - loop_end) % (loop_end - loop_start);
        }
        *position = Some(next);
    }
    out
}

/// Loop region in buffer frames; falls back to the whole buffer when the
/// configured points are empty or out of range.
fn loop_points(options: &BufferSourceOptions, buffer_rate: f64, len: f64) -> (f64, f64) {
    let end = if options.loop_end > 0.0 && options.loop_end * buffer_rate <= len {
        options.loop_end * buffer_rate
    } else {
        len
    };
    let start = (options.loop_start * buffer_rate).max(0.0);
    if start < end { (start, end) } else { (0.0, len) }
}

fn sample_at(buffer: &AudioBuffer, channel: usize, position: f64) -> f32 {
    let samples = buffer.channel(channel);
    let index = position.floor() as usize;
    let frac = (position - position.floor()) as f32;
    let a = samples.get(index).copied().unwrap_or(0.0);
    if frac == 0.0 {
        return a;
    }
    let b = samples.get(index + 1).copied().unwrap_or(0.0);
    a + (b - a) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waveforms_start_where_expected() {
        assert_eq!(waveform(Waveform::Sine, 0.0), 0.0);
        assert_eq!(waveform(Waveform::Square, 0.0), 1.0);
        assert_eq!(waveform(Waveform::Sawtooth, 0.0), 0.0);
        assert_eq!(waveform(Waveform::Triangle, 0.0), 0.0);
        assert_eq!(waveform(Waveform::Triangle, 0.25), 1.0);
        assert_eq!(waveform(Waveform::Square, 0.75), -1.0);
    }

    #[test]
    fn loop_points_fall_back_to_whole_buffer() {
        let mut options = BufferSourceOptions {
            looping: true,
            ..BufferSourceOptions::default()
        };
        assert_eq!(loop_points(&options, 100.0, 50.0), (0.0, 50.0));
        options.loop_start = 0.1;
        options.loop_end = 0.3;
        assert_eq!(loop_points(&options, 100.0, 50.0), (10.0, 30.0));
        options.loop_start = 0.4;
        assert_eq!(loop_points(&options, 100.0, 50.0), (0.0, 50.0));
    }

    #[test]
    fn inactive_until_start() {
        let lifecycle = Lifecycle {
            start: Some(sonograph_core::Start {
                when: 1.0,
                offset: 0.0,
                duration: Some(0.5),
            }),
            stop: None,
        };
        assert!(!active(lifecycle, 0.5));
        assert!(active(lifecycle, 1.0));
        assert!(!active(lifecycle, 1.5));
        assert!(!active(Lifecycle::default(), 0.0));
    }
}
