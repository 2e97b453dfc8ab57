//! Worklet processors built into the binary.
//!
//! Graph descriptions name them in `processor = "..."`.

use std::sync::Arc;

use sonograph_config::ProcessorRegistry;
use sonograph_core::{AudioProcessor, ParamValues, ProcessorError, ProcessorOptions};

/// Copies every input channel to the same output channel.
struct Passthrough;

impl AudioProcessor for Passthrough {
    fn process(
        &mut self,
        inputs: &[Vec<&[f32]>],
        outputs: &mut [Vec<&mut [f32]>],
        _parameters: &ParamValues<'_>,
    ) -> Result<bool, ProcessorError> {
        for (input, output) in inputs.iter().zip(outputs.iter_mut()) {
            for (x, y) in input.iter().zip(output.iter_mut()) {
                y.copy_from_slice(x);
            }
        }
        Ok(true)
    }
}

/// Clips input 0 to `[-threshold, threshold]`; threshold defaults to 1.
struct HardClip;

impl AudioProcessor for HardClip {
    fn process(
        &mut self,
        inputs: &[Vec<&[f32]>],
        outputs: &mut [Vec<&mut [f32]>],
        parameters: &ParamValues<'_>,
    ) -> Result<bool, ProcessorError> {
        let (Some(input), Some(output)) = (inputs.first(), outputs.first_mut()) else {
            return Ok(true);
        };
        for (x, y) in input.iter().zip(output.iter_mut()) {
            for (frame, (x, y)) in x.iter().zip(y.iter_mut()).enumerate() {
                let threshold = parameters
                    .value_at("threshold", frame)
                    .unwrap_or(1.0)
                    .abs();
                *y = x.clamp(-threshold, threshold);
            }
        }
        Ok(true)
    }
}

/// Registry holding every built-in processor.
pub fn builtin() -> ProcessorRegistry {
    ProcessorRegistry::new()
        .with(
            "passthrough",
            Arc::new(|_: &ProcessorOptions| Box::new(Passthrough) as Box<dyn AudioProcessor>),
        )
        .with(
            "hard-clip",
            Arc::new(|_: &ProcessorOptions| Box::new(HardClip) as Box<dyn AudioProcessor>),
        )
}
