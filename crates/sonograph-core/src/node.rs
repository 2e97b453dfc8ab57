//! Node catalog and per-node bookkeeping.
//!
//! Each node in an [`AudioGraph`](crate::AudioGraph) has a [`NodeId`] and a
//! [`NodeKind`] carrying the options it was created with. The kind determines
//! the node's static shape ([`NodeTraits`]), its params ([`ParamSpec`]s) and
//! its default [`ChannelConfig`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::buffer::AudioBuffer;
use crate::error::GraphError;
use crate::ids::{ContextId, EdgeId, NativeNodeId, NodeId, ParamId};
use crate::param::{DETUNE_LIMIT, ParamSpec};
use crate::processor::ProcessorFactory;

/// Upper bound on channel counts, splitter outputs and merger inputs.
pub const MAX_CHANNELS: usize = 32;

/// Maximum number of IIR coefficients on either side.
pub const MAX_IIR_COEFFICIENTS: usize = 20;

/// Fieldless discriminant of [`NodeKind`], used as a capability key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    /// Final sink of a context.
    Destination,
    /// Constant signal source.
    ConstantSource,
    /// Periodic waveform source.
    Oscillator,
    /// Sample playback source.
    BufferSource,
    /// Scalar gain.
    Gain,
    /// Variable delay line.
    Delay,
    /// Second-order filter.
    BiquadFilter,
    /// General IIR filter.
    IirFilter,
    /// Splits channels into separate outputs.
    ChannelSplitter,
    /// Merges inputs into channels of one output.
    ChannelMerger,
    /// Custom block processor.
    Worklet,
}

impl NodeType {
    /// Every node type, in catalog order.
    pub const ALL: [NodeType; 11] = [
        Self::Destination,
        Self::ConstantSource,
        Self::Oscillator,
        Self::BufferSource,
        Self::Gain,
        Self::Delay,
        Self::BiquadFilter,
        Self::IirFilter,
        Self::ChannelSplitter,
        Self::ChannelMerger,
        Self::Worklet,
    ];

    /// Returns the kebab-case name used in config files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Destination => "destination",
            Self::ConstantSource => "constant-source",
            Self::Oscillator => "oscillator",
            Self::BufferSource => "buffer-source",
            Self::Gain => "gain",
            Self::Delay => "delay",
            Self::BiquadFilter => "biquad-filter",
            Self::IirFilter => "iir-filter",
            Self::ChannelSplitter => "channel-splitter",
            Self::ChannelMerger => "channel-merger",
            Self::Worklet => "worklet",
        }
    }
}

impl core::fmt::Display for NodeType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Oscillator waveform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Waveform {
    /// Pure sine.
    #[default]
    Sine,
    /// Square wave.
    Square,
    /// Rising sawtooth.
    Sawtooth,
    /// Triangle wave.
    Triangle,
}

/// Options for [`NodeKind::Oscillator`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OscillatorOptions {
    /// Waveform to generate.
    #[serde(default)]
    pub waveform: Waveform,
}

/// Options for [`NodeKind::BufferSource`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BufferSourceOptions {
    /// Samples to play; `None` plays silence.
    pub buffer: Option<Arc<AudioBuffer>>,
    /// Whether playback wraps between the loop points.
    pub looping: bool,
    /// Loop start in seconds.
    pub loop_start: f64,
    /// Loop end in seconds; 0 means the end of the buffer.
    pub loop_end: f64,
}

/// Options for [`NodeKind::Delay`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DelayOptions {
    /// Upper bound of the `delayTime` param, in seconds.
    pub max_delay_time: f64,
}

impl Default for DelayOptions {
    fn default() -> Self {
        Self { max_delay_time: 1.0 }
    }
}

/// Biquad response type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BiquadType {
    /// Second-order low-pass.
    #[default]
    Lowpass,
    /// Second-order high-pass.
    Highpass,
    /// Constant skirt band-pass.
    Bandpass,
    /// Low shelf.
    Lowshelf,
    /// High shelf.
    Highshelf,
    /// Peaking EQ.
    Peaking,
    /// Band-reject.
    Notch,
    /// Phase-only all-pass.
    Allpass,
}

/// Options for [`NodeKind::BiquadFilter`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BiquadOptions {
    /// Response type.
    #[serde(default, rename = "filter")]
    pub filter_type: BiquadType,
}

/// Options for [`NodeKind::IirFilter`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IirOptions {
    /// Numerator coefficients `b[k]`.
    pub feedforward: Vec<f64>,
    /// Denominator coefficients `a[k]`; `a[0]` must be non-zero.
    pub feedback: Vec<f64>,
}

/// Options for [`NodeKind::Worklet`].
#[derive(Clone)]
pub struct WorkletOptions {
    /// Processor name, used in logs and errors.
    pub name: String,
    /// Creates the processor instance for a render.
    pub factory: Arc<dyn ProcessorFactory>,
    /// Number of inputs.
    pub number_of_inputs: usize,
    /// Number of outputs.
    pub number_of_outputs: usize,
    /// Fixed channel count per output; `None` follows the input.
    pub output_channel_count: Option<Vec<usize>>,
    /// Declared params.
    pub parameters: Vec<ParamSpec>,
}

impl WorkletOptions {
    /// Creates options for a one-input, one-output processor without params.
    pub fn new(name: impl Into<String>, factory: Arc<dyn ProcessorFactory>) -> Self {
        Self {
            name: name.into(),
            factory,
            number_of_inputs: 1,
            number_of_outputs: 1,
            output_channel_count: None,
            parameters: Vec::new(),
        }
    }
}

impl core::fmt::Debug for WorkletOptions {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkletOptions")
            .field("name", &self.name)
            .field("number_of_inputs", &self.number_of_inputs)
            .field("number_of_outputs", &self.number_of_outputs)
            .field("output_channel_count", &self.output_channel_count)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// The processing type of a node, with its construction options.
#[derive(Clone, Debug)]
pub enum NodeKind {
    /// Final sink. Created by the graph itself; exactly one per graph.
    Destination,
    /// Emits its `offset` param.
    ConstantSource,
    /// Periodic waveform.
    Oscillator(OscillatorOptions),
    /// Plays an [`AudioBuffer`].
    BufferSource(BufferSourceOptions),
    /// Multiplies by its `gain` param.
    Gain,
    /// Delays by its `delayTime` param. Breaks feedback cycles.
    Delay(DelayOptions),
    /// RBJ biquad.
    BiquadFilter(BiquadOptions),
    /// Direct-form IIR filter with fixed coefficients.
    IirFilter(IirOptions),
    /// One output per input channel.
    ChannelSplitter {
        /// Number of outputs.
        outputs: usize,
    },
    /// One output channel per input.
    ChannelMerger {
        /// Number of inputs.
        inputs: usize,
    },
    /// Custom block processor.
    Worklet(WorkletOptions),
}

/// Static shape of a node kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeTraits {
    /// Number of input slots.
    pub inputs: usize,
    /// Number of output slots.
    pub outputs: usize,
    /// Whether the node is scheduled with start/stop.
    pub is_source: bool,
    /// Whether the node may sit on a feedback loop.
    pub is_cycle_breaking: bool,
}

impl NodeKind {
    /// Returns the fieldless type of this kind.
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Destination => NodeType::Destination,
            Self::ConstantSource => NodeType::ConstantSource,
            Self::Oscillator(_) => NodeType::Oscillator,
            Self::BufferSource(_) => NodeType::BufferSource,
            Self::Gain => NodeType::Gain,
            Self::Delay(_) => NodeType::Delay,
            Self::BiquadFilter(_) => NodeType::BiquadFilter,
            Self::IirFilter(_) => NodeType::IirFilter,
            Self::ChannelSplitter { .. } => NodeType::ChannelSplitter,
            Self::ChannelMerger { .. } => NodeType::ChannelMerger,
            Self::Worklet(_) => NodeType::Worklet,
        }
    }

    /// Returns the node's port counts and behavioural flags.
    pub fn traits(&self) -> NodeTraits {
        let (inputs, outputs) = match self {
            Self::Destination => (1, 0),
            Self::ConstantSource | Self::Oscillator(_) | Self::BufferSource(_) => (0, 1),
            Self::Gain | Self::Delay(_) | Self::BiquadFilter(_) | Self::IirFilter(_) => (1, 1),
            Self::ChannelSplitter { outputs } => (1, *outputs),
            Self::ChannelMerger { inputs } => (*inputs, 1),
            Self::Worklet(options) => (options.number_of_inputs, options.number_of_outputs),
        };
        NodeTraits {
            inputs,
            outputs,
            is_source: matches!(
                self,
                Self::ConstantSource | Self::Oscillator(_) | Self::BufferSource(_)
            ),
            is_cycle_breaking: matches!(self, Self::Delay(_)),
        }
    }

    /// Returns the param specs of this kind at `sample_rate`.
    ///
    /// Frequency bounds depend on the Nyquist frequency, hence the argument.
    pub fn param_specs(&self, sample_rate: f32) -> Vec<ParamSpec> {
        let nyquist = sample_rate / 2.0;
        match self {
            Self::ConstantSource => vec![ParamSpec::unbounded("offset", 1.0)],
            Self::Oscillator(_) => vec![
                ParamSpec::new("frequency", 440.0, -nyquist, nyquist),
                ParamSpec::new("detune", 0.0, -DETUNE_LIMIT, DETUNE_LIMIT),
            ],
            Self::BufferSource(_) => vec![ParamSpec::unbounded("playbackRate", 1.0)],
            Self::Gain => vec![ParamSpec::unbounded("gain", 1.0)],
            Self::Delay(options) => vec![ParamSpec::new(
                "delayTime",
                0.0,
                0.0,
                options.max_delay_time as f32,
            )],
            Self::BiquadFilter(_) => vec![
                ParamSpec::new("frequency", 350.0, 0.0, nyquist),
                ParamSpec::new("detune", 0.0, -DETUNE_LIMIT, DETUNE_LIMIT),
                ParamSpec::unbounded("Q", 1.0),
                ParamSpec::new("gain", 0.0, -MOST_GAIN_DB, MOST_GAIN_DB),
            ],
            Self::Worklet(options) => options.parameters.clone(),
            Self::Destination
            | Self::IirFilter(_)
            | Self::ChannelSplitter { .. }
            | Self::ChannelMerger { .. } => Vec::new(),
        }
    }

    /// Returns the channel configuration a fresh node of this kind starts with.
    pub fn default_channel_config(&self, context_channels: usize) -> ChannelConfig {
        match self {
            Self::Destination => ChannelConfig::explicit(context_channels),
            Self::ChannelSplitter { outputs } => ChannelConfig {
                count: *outputs,
                mode: ChannelCountMode::Explicit,
                interpretation: ChannelInterpretation::Discrete,
            },
            Self::ChannelMerger { .. } => ChannelConfig::explicit(1),
            _ => ChannelConfig::default(),
        }
    }

    /// Checks the options against the kind's structural limits.
    pub fn validate(&self) -> Result<(), GraphError> {
        match self {
            Self::Delay(options) => {
                if !(options.max_delay_time > 0.0 && options.max_delay_time < 180.0) {
                    return Err(GraphError::InvalidOptions(format!(
                        "max delay time must be in (0, 180) seconds, got {}",
                        options.max_delay_time
                    )));
                }
            }
            Self::IirFilter(options) => validate_iir(options)?,
            Self::ChannelSplitter { outputs: count } | Self::ChannelMerger { inputs: count } => {
                if *count == 0 || *count > MAX_CHANNELS {
                    return Err(GraphError::InvalidOptions(format!(
                        "port count must be in 1..={MAX_CHANNELS}, got {count}"
                    )));
                }
            }
            Self::BufferSource(options) => {
                if !options.loop_start.is_finite() || !options.loop_end.is_finite() {
                    return Err(GraphError::InvalidOptions("loop points must be finite".into()));
                }
            }
            Self::Worklet(options) => validate_worklet(options)?,
            Self::Destination | Self::ConstantSource | Self::Oscillator(_) | Self::Gain | Self::BiquadFilter(_) => {}
        }
        Ok(())
    }
}

/// Nominal bound of the biquad `gain` param in dB (`40 * log10(f32::MAX)`).
const MOST_GAIN_DB: f32 = 1541.0;

fn validate_iir(options: &IirOptions) -> Result<(), GraphError> {
    let counts = [options.feedforward.len(), options.feedback.len()];
    if counts.iter().any(|n| *n == 0 || *n > MAX_IIR_COEFFICIENTS) {
        return Err(GraphError::InvalidOptions(format!(
            "IIR filters need 1..={MAX_IIR_COEFFICIENTS} coefficients per side, got {counts:?}"
        )));
    }
    if options
        .feedforward
        .iter()
        .chain(&options.feedback)
        .any(|c| !c.is_finite())
    {
        return Err(GraphError::InvalidOptions("IIR coefficients must be finite".into()));
    }
    if options.feedback[0] == 0.0 {
        return Err(GraphError::InvalidOptions("first feedback coefficient must not be zero".into()));
    }
    if options.feedforward.iter().all(|c| *c == 0.0) {
        return Err(GraphError::InvalidOptions("feedforward coefficients must not all be zero".into()));
    }
    Ok(())
}

fn validate_worklet(options: &WorkletOptions) -> Result<(), GraphError> {
    if options.number_of_inputs == 0 && options.number_of_outputs == 0 {
        return Err(GraphError::InvalidOptions(format!(
            "worklet '{}' needs at least one input or output",
            options.name
        )));
    }
    if let Some(counts) = &options.output_channel_count {
        if counts.len() != options.number_of_outputs {
            return Err(GraphError::InvalidOptions(format!(
                "worklet '{}' declares {} output channel counts for {} outputs",
                options.name,
                counts.len(),
                options.number_of_outputs
            )));
        }
        if counts.iter().any(|c| *c == 0 || *c > MAX_CHANNELS) {
            return Err(GraphError::InvalidOptions(format!(
                "worklet '{}' output channel counts must be in 1..={MAX_CHANNELS}",
                options.name
            )));
        }
    }
    for (i, spec) in options.parameters.iter().enumerate() {
        if options.parameters[..i].iter().any(|p| p.name == spec.name) {
            return Err(GraphError::InvalidOptions(format!(
                "worklet '{}' declares param '{}' twice",
                options.name, spec.name
            )));
        }
        if !(spec.min <= spec.default && spec.default <= spec.max) {
            return Err(GraphError::InvalidOptions(format!(
                "worklet param '{}' default {} lies outside [{}, {}]",
                spec.name, spec.default, spec.min, spec.max
            )));
        }
    }
    Ok(())
}

/// How the channel count of an input is derived from its connections.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelCountMode {
    /// Largest channel count among connections.
    #[default]
    Max,
    /// Like `Max`, capped at the configured count.
    ClampedMax,
    /// Always the configured count.
    Explicit,
}

/// How channels are mapped when up- or down-mixing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelInterpretation {
    /// Speaker layouts (mono, stereo, quad, 5.1) mix with standard rules.
    #[default]
    Speakers,
    /// Channels are filled or dropped by index.
    Discrete,
}

/// Channel count, count mode and interpretation of a node's inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Configured channel count.
    pub count: usize,
    /// Count mode.
    #[serde(default)]
    pub mode: ChannelCountMode,
    /// Interpretation.
    #[serde(default)]
    pub interpretation: ChannelInterpretation,
}

impl ChannelConfig {
    /// Creates an explicit speaker configuration with `count` channels.
    pub fn explicit(count: usize) -> Self {
        Self {
            count,
            mode: ChannelCountMode::Explicit,
            interpretation: ChannelInterpretation::Speakers,
        }
    }

    /// Computes the number of channels an input carries when the connections
    /// feeding it produce `connected` channels at most.
    pub fn computed_channels(&self, connected: Option<usize>) -> usize {
        match self.mode {
            ChannelCountMode::Explicit => self.count,
            ChannelCountMode::Max => connected.unwrap_or(1),
            ChannelCountMode::ClampedMax => connected.unwrap_or(1).min(self.count),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            count: 2,
            mode: ChannelCountMode::Max,
            interpretation: ChannelInterpretation::Speakers,
        }
    }
}

/// A scheduled start of a source node.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Start {
    /// Context time of the start, in seconds.
    pub when: f64,
    /// Offset into the source material (buffer sources only).
    pub offset: f64,
    /// Play duration (buffer sources only).
    pub duration: Option<f64>,
}

/// Start/stop schedule of a source node.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Lifecycle {
    /// Pending start, once scheduled.
    pub start: Option<Start>,
    /// Pending stop time, once scheduled.
    pub stop: Option<f64>,
}

/// Native node a facade node is already bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NativeBinding {
    /// Context owning the native node.
    pub context: ContextId,
    /// The native node.
    pub node: NativeNodeId,
}

/// A node of an [`AudioGraph`](crate::AudioGraph).
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) kind: NodeKind,
    pub(crate) channel: ChannelConfig,
    /// Incoming edge ids, one list per input slot.
    pub(crate) inputs: Vec<Vec<EdgeId>>,
    /// Outgoing edge ids, one list per output slot.
    pub(crate) outputs: Vec<Vec<EdgeId>>,
    pub(crate) params: Vec<ParamId>,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) binding: Option<NativeBinding>,
}

impl Node {
    pub(crate) fn new(id: NodeId, kind: NodeKind, channel: ChannelConfig) -> Self {
        let traits = kind.traits();
        Self {
            id,
            kind,
            channel,
            inputs: vec![Vec::new(); traits.inputs],
            outputs: vec![Vec::new(); traits.outputs],
            params: Vec::new(),
            lifecycle: Lifecycle::default(),
            binding: None,
        }
    }

    /// Returns the node's id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the node's kind and options.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Shorthand for `kind().traits()`.
    pub fn traits(&self) -> NodeTraits {
        self.kind.traits()
    }

    /// Returns the channel configuration of the node's inputs.
    pub fn channel_config(&self) -> ChannelConfig {
        self.channel
    }

    /// Returns the node's params in declaration order.
    pub fn params(&self) -> &[ParamId] {
        &self.params
    }

    /// Returns the start/stop schedule.
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Returns the native node this node is bound to, if any.
    pub fn binding(&self) -> Option<NativeBinding> {
        self.binding
    }

    pub(crate) fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.inputs.iter().chain(&self.outputs).flatten().copied()
    }
}
