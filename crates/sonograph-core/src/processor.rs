//! Custom block processors hosted by worklet nodes.
//!
//! A worklet node is described by [`WorkletOptions`](crate::WorkletOptions);
//! its [`ProcessorFactory`] creates one [`AudioProcessor`] per render. The
//! processor is called once per [`RENDER_QUANTUM`] frames with planar input
//! and output slices and the block's param values.
//!
//! # Example
//!
//! ```rust
//! use sonograph_core::{AudioProcessor, ParamValues, ProcessorError};
//!
//! struct Halve;
//!
//! impl AudioProcessor for Halve {
//!     fn process(
//!         &mut self,
//!         inputs: &[Vec<&[f32]>],
//!         outputs: &mut [Vec<&mut [f32]>],
//!         _parameters: &ParamValues<'_>,
//!     ) -> Result<bool, ProcessorError> {
//!         for (input, output) in inputs[0].iter().zip(outputs[0].iter_mut()) {
//!             for (x, y) in input.iter().zip(output.iter_mut()) {
//!                 *y = x * 0.5;
//!             }
//!         }
//!         Ok(true)
//!     }
//! }
//! ```

use thiserror::Error;

/// Frames per processing block.
pub const RENDER_QUANTUM: usize = 128;

/// Failure reported by a processor. Recorded by the renderer, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ProcessorError(pub String);

impl ProcessorError {
    /// Creates an error from any message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Param values for one block, looked up by name.
///
/// A slice holds either [`RENDER_QUANTUM`] values (one per frame) or a single
/// value when the param is constant across the block.
#[derive(Debug, Default)]
pub struct ParamValues<'a> {
    entries: Vec<(&'a str, &'a [f32])>,
}

impl<'a> ParamValues<'a> {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the values of one param.
    pub fn push(&mut self, name: &'a str, values: &'a [f32]) {
        self.entries.push((name, values));
    }

    /// Returns the values of the named param.
    pub fn get(&self, name: &str) -> Option<&'a [f32]> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, values)| *values)
    }

    /// Returns the value of the named param at `frame`, following the
    /// single-value convention.
    pub fn value_at(&self, name: &str, frame: usize) -> Option<f32> {
        let values = self.get(name)?;
        match values.len() {
            0 => None,
            1 => Some(values[0]),
            _ => values.get(frame).copied(),
        }
    }

    /// Iterates over `(name, values)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a [f32])> + '_ {
        self.entries.iter().copied()
    }

    /// Returns the number of params.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no params are present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A custom block processor.
pub trait AudioProcessor {
    /// Processes one block.
    ///
    /// `inputs[i][c]` is channel `c` of input `i`; an unconnected input has no
    /// channels. `outputs[o][c]` is pre-zeroed. Returning `Ok(false)` ends the
    /// processor's life: every later block is silent.
    fn process(
        &mut self,
        inputs: &[Vec<&[f32]>],
        outputs: &mut [Vec<&mut [f32]>],
        parameters: &ParamValues<'_>,
    ) -> Result<bool, ProcessorError>;
}

/// What a factory learns about the node it creates a processor for.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorOptions {
    /// Processor name.
    pub name: String,
    /// Sample rate of the render.
    pub sample_rate: f32,
    /// Number of inputs.
    pub number_of_inputs: usize,
    /// Number of outputs.
    pub number_of_outputs: usize,
    /// Resolved channel count of every output.
    pub output_channel_count: Vec<usize>,
}

/// Creates processors for a worklet node.
pub trait ProcessorFactory: Send + Sync {
    /// Creates a fresh processor instance.
    fn create(&self, options: &ProcessorOptions) -> Box<dyn AudioProcessor>;
}

impl<F> ProcessorFactory for F
where
    F: Fn(&ProcessorOptions) -> Box<dyn AudioProcessor> + Send + Sync,
{
    fn create(&self, options: &ProcessorOptions) -> Box<dyn AudioProcessor> {
        self(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_value_applies_to_every_frame() {
        let constant = [0.5];
        let ramp = [0.0, 1.0, 2.0];
        let mut values = ParamValues::new();
        values.push("gain", &constant);
        values.push("pan", &ramp);

        assert_eq!(values.value_at("gain", 100), Some(0.5));
        assert_eq!(values.value_at("pan", 2), Some(2.0));
        assert_eq!(values.value_at("pan", 3), None);
        assert_eq!(values.get("missing"), None);
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn closures_are_factories() {
        struct Silence;
        impl AudioProcessor for Silence {
            fn process(
                &mut self,
                _inputs: &[Vec<&[f32]>],
                _outputs: &mut [Vec<&mut [f32]>],
                _parameters: &ParamValues<'_>,
            ) -> Result<bool, ProcessorError> {
                Ok(false)
            }
        }

        let factory = |_: &ProcessorOptions| -> Box<dyn AudioProcessor> { Box::new(Silence) };
        let options = ProcessorOptions {
            name: "silence".into(),
            sample_rate: 44100.0,
            number_of_inputs: 1,
            number_of_outputs: 1,
            output_channel_count: vec![1],
        };
        let mut processor = factory.create(&options);
        let keep = processor
            .process(&[], &mut [], &ParamValues::new())
            .unwrap();
        assert!(!keep);
    }
}
