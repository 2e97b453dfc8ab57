//! TOML graph descriptions.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sonograph_core::{
    AudioBuffer, AudioGraph, BiquadOptions, BufferSourceOptions, ChannelConfig, DelayOptions,
    GraphOptions, IirOptions, NodeId, NodeKind, OscillatorOptions, Param, ParamSpec, Start,
    WorkletOptions,
};

use crate::error::ConfigError;
use crate::processors::ProcessorRegistry;

/// Name under which every description can refer to the graph's destination.
pub const DESTINATION: &str = "destination";

/// A complete audio graph in TOML form.
///
/// # TOML Format
///
/// ```toml
/// [context]
/// sample_rate = 48000
/// channels = 2
/// duration = 1.5
///
/// [[nodes]]
/// name = "osc"
/// type = "oscillator"
/// waveform = "sawtooth"
/// start = 0.0
/// stop = 1.0
/// params = { frequency = 110.0 }
///
/// [[nodes]]
/// name = "lp"
/// type = "biquad-filter"
/// filter = "lowpass"
///
/// [[connections]]
/// from = "osc"
/// to = "lp"
///
/// [[connections]]
/// from = "lp"
/// to = "destination"
///
/// [[automation]]
/// node = "lp"
/// param = "frequency"
/// events = [
///     { type = "set-value", value = 200.0, time = 0.0 },
///     { type = "exponential-ramp", value = 4000.0, end_time = 1.0 },
/// ]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDescription {
    /// Render settings.
    #[serde(default)]
    pub context: ContextDescription,

    /// Nodes in declaration order.
    #[serde(default)]
    pub nodes: Vec<NodeDescription>,

    /// Node-to-node and node-to-param connections.
    #[serde(default)]
    pub connections: Vec<ConnectionDescription>,

    /// Automation histories, per param.
    #[serde(default)]
    pub automation: Vec<AutomationDescription>,
}

/// Sample rate, channel count and length of the render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDescription {
    /// Sample rate in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f32,

    /// Destination channel count.
    #[serde(default = "default_channels")]
    pub channels: usize,

    /// Length in frames. Takes precedence over `duration`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,

    /// Length in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

fn default_sample_rate() -> f32 {
    44100.0
}

fn default_channels() -> usize {
    2
}

impl Default for ContextDescription {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            length: None,
            duration: None,
        }
    }
}

impl ContextDescription {
    /// Number of frames to render; one second when neither length nor
    /// duration is given.
    pub fn frames(&self) -> usize {
        match (self.length, self.duration) {
            (Some(length), _) => length,
            (None, Some(duration)) => (duration * f64::from(self.sample_rate)).round().max(0.0) as usize,
            (None, None) => self.sample_rate.round() as usize,
        }
    }
}

/// One node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescription {
    /// Name used by connections and automation.
    pub name: String,

    /// Node type and its construction options.
    #[serde(flatten)]
    pub kind: KindDescription,

    /// Source start time in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,

    /// Offset into the source at start, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<f64>,

    /// How long the source plays after starting, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub play_for: Option<f64>,

    /// Source stop time in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<f64>,

    /// Input channel configuration; the type's default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelConfig>,

    /// Intrinsic param values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, f32>,
}

impl NodeDescription {
    /// Creates a node with nothing but a name and a type.
    pub fn new(name: impl Into<String>, kind: KindDescription) -> Self {
        Self {
            name: name.into(),
            kind,
            start: None,
            offset: None,
            play_for: None,
            stop: None,
            channel: None,
            params: BTreeMap::new(),
        }
    }

    /// Sets a param value.
    pub fn with_param(mut self, name: impl Into<String>, value: f32) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    /// Starts the source at `when`.
    pub fn starting_at(mut self, when: f64) -> Self {
        self.start = Some(when);
        self
    }
}

/// Node type, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum KindDescription {
    /// Emits its `offset` param.
    ConstantSource,
    /// Periodic waveform.
    Oscillator(OscillatorOptions),
    /// Plays inline sample data.
    BufferSource(BufferDescription),
    /// Multiplies by `gain`.
    Gain,
    /// Delays by `delayTime`.
    Delay {
        /// Upper bound of `delayTime`, in seconds.
        #[serde(default = "default_max_delay")]
        max_delay_time: f64,
    },
    /// RBJ biquad.
    BiquadFilter(BiquadOptions),
    /// Fixed-coefficient IIR filter.
    IirFilter(IirOptions),
    /// One output per input channel.
    ChannelSplitter {
        /// Number of outputs.
        #[serde(default = "default_ports")]
        outputs: usize,
    },
    /// One output channel per input.
    ChannelMerger {
        /// Number of inputs.
        #[serde(default = "default_ports")]
        inputs: usize,
    },
    /// Custom processor, looked up in a [`ProcessorRegistry`].
    Worklet(WorkletDescription),
}

fn default_max_delay() -> f64 {
    DelayOptions::default().max_delay_time
}

fn default_ports() -> usize {
    2
}

fn default_one() -> usize {
    1
}

/// Inline buffer for a buffer source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferDescription {
    /// Sample data, one list per channel.
    #[serde(default)]
    pub channels: Vec<Vec<f32>>,
    /// Whether playback wraps between the loop points.
    #[serde(default, rename = "loop")]
    pub looping: bool,
    /// Loop start in seconds.
    #[serde(default)]
    pub loop_start: f64,
    /// Loop end in seconds; 0 means the end of the buffer.
    #[serde(default)]
    pub loop_end: f64,
}

/// Worklet shape and processor name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkletDescription {
    /// Registered processor name.
    pub processor: String,
    /// Number of inputs.
    #[serde(default = "default_one")]
    pub inputs: usize,
    /// Number of outputs.
    #[serde(default = "default_one")]
    pub outputs: usize,
    /// Fixed channel count per output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_channel_count: Option<Vec<usize>>,
    /// Declared params.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParamSpec>,
}

/// A connection. `param` set means the connection drives that param of
/// `to` instead of an input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionDescription {
    /// Source node name.
    pub from: String,
    /// Source output index.
    #[serde(default)]
    pub output: usize,
    /// Destination node name.
    pub to: String,
    /// Destination input index.
    #[serde(default)]
    pub input: usize,
    /// Destination param name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

impl ConnectionDescription {
    /// Connects output 0 of `from` to input 0 of `to`.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            output: 0,
            to: to.into(),
            input: 0,
            param: None,
        }
    }
}

/// Automation of one param.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationDescription {
    /// Node owning the param.
    pub node: String,
    /// Param name.
    pub param: String,
    /// Events, applied in order.
    pub events: Vec<EventDescription>,
}

/// One automation call, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EventDescription {
    /// `set_value_at_time`.
    SetValue {
        /// Target value.
        value: f32,
        /// Time in seconds.
        time: f64,
    },
    /// `linear_ramp_to_value_at_time`.
    LinearRamp {
        /// Value reached.
        value: f32,
        /// End time in seconds.
        end_time: f64,
    },
    /// `exponential_ramp_to_value_at_time`.
    ExponentialRamp {
        /// Value reached.
        value: f32,
        /// End time in seconds.
        end_time: f64,
    },
    /// `set_target_at_time`.
    SetTarget {
        /// Asymptotic target.
        target: f32,
        /// Start time in seconds.
        start_time: f64,
        /// Time constant in seconds.
        time_constant: f64,
    },
    /// `set_value_curve_at_time`.
    SetValueCurve {
        /// Curve points.
        values: Vec<f32>,
        /// Start time in seconds.
        start_time: f64,
        /// Duration in seconds.
        duration: f64,
    },
    /// `cancel_scheduled_values`.
    CancelScheduledValues {
        /// Cancel time in seconds.
        time: f64,
    },
    /// `cancel_and_hold_at_time`.
    CancelAndHold {
        /// Cancel time in seconds.
        time: f64,
    },
}

impl EventDescription {
    fn apply(&self, param: &mut Param) -> Result<(), sonograph_core::AutomationError> {
        match self {
            Self::SetValue { value, time } => param.set_value_at_time(*value, *time)?,
            Self::LinearRamp { value, end_time } => {
                param.linear_ramp_to_value_at_time(*value, *end_time)?
            }
            Self::ExponentialRamp { value, end_time } => {
                param.exponential_ramp_to_value_at_time(*value, *end_time)?
            }
            Self::SetTarget {
                target,
                start_time,
                time_constant,
            } => param.set_target_at_time(*target, *start_time, *time_constant)?,
            Self::SetValueCurve {
                values,
                start_time,
                duration,
            } => param.set_value_curve_at_time(values, *start_time, *duration)?,
            Self::CancelScheduledValues { time } => param.cancel_scheduled_values(*time)?,
            Self::CancelAndHold { time } => param.cancel_and_hold_at_time(*time)?,
        };
        Ok(())
    }
}

impl KindDescription {
    fn to_kind(&self, sample_rate: f32, processors: &ProcessorRegistry) -> Result<NodeKind, ConfigError> {
        Ok(match self {
            Self::ConstantSource => NodeKind::ConstantSource,
            Self::Oscillator(options) => NodeKind::Oscillator(*options),
            Self::BufferSource(buffer) => NodeKind::BufferSource(BufferSourceOptions {
                buffer: (!buffer.channels.is_empty())
                    .then(|| Arc::new(AudioBuffer::from_channels(buffer.channels.clone(), sample_rate))),
                looping: buffer.looping,
                loop_start: buffer.loop_start,
                loop_end: buffer.loop_end,
            }),
            Self::Gain => NodeKind::Gain,
            Self::Delay { max_delay_time } => NodeKind::Delay(DelayOptions {
                max_delay_time: *max_delay_time,
            }),
            Self::BiquadFilter(options) => NodeKind::BiquadFilter(*options),
            Self::IirFilter(options) => NodeKind::IirFilter(options.clone()),
            Self::ChannelSplitter { outputs } => NodeKind::ChannelSplitter { outputs: *outputs },
            Self::ChannelMerger { inputs } => NodeKind::ChannelMerger { inputs: *inputs },
            Self::Worklet(worklet) => {
                let factory = processors
                    .get(&worklet.processor)
                    .ok_or_else(|| ConfigError::UnknownProcessor(worklet.processor.clone()))?;
                NodeKind::Worklet(WorkletOptions {
                    number_of_inputs: worklet.inputs,
                    number_of_outputs: worklet.outputs,
                    output_channel_count: worklet.output_channel_count.clone(),
                    parameters: worklet.parameters.clone(),
                    ..WorkletOptions::new(worklet.processor.clone(), factory)
                })
            }
        })
    }
}

impl GraphDescription {
    /// Load a description from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Load a description from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the description to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Convert the description to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Builds the graph, without any worklet processors available.
    ///
    /// Returns the graph and the id of every named node, the destination
    /// included under [`DESTINATION`].
    pub fn build(&self) -> Result<(AudioGraph, HashMap<String, NodeId>), ConfigError> {
        self.build_with(&ProcessorRegistry::new())
    }

    /// Builds the graph, resolving worklet processors in `processors`.
    pub fn build_with(
        &self,
        processors: &ProcessorRegistry,
    ) -> Result<(AudioGraph, HashMap<String, NodeId>), ConfigError> {
        let sample_rate = self.context.sample_rate;
        let mut graph = AudioGraph::new(GraphOptions {
            sample_rate,
            channel_count: self.context.channels,
        })
        .map_err(|e| ConfigError::graph("context", e))?;

        let mut names = HashMap::new();
        names.insert(DESTINATION.to_string(), graph.destination());

        for node in &self.nodes {
            if names.contains_key(&node.name) {
                return Err(ConfigError::DuplicateNode(node.name.clone()));
            }
            let at = |e| ConfigError::graph(node.name.as_str(), e);
            let id = graph
                .add_node(node.kind.to_kind(sample_rate, processors)?)
                .map_err(at)?;
            if let Some(channel) = node.channel {
                graph.set_channel_config(id, channel).map_err(at)?;
            }
            for (param, value) in &node.params {
                let param = graph.param_id(id, param).map_err(at)?;
                graph.param_mut(param).map_err(at)?.set_value(*value);
            }
            if let Some(when) = node.start {
                let start = Start {
                    when,
                    offset: node.offset.unwrap_or(0.0),
                    duration: node.play_for,
                };
                graph.start_at(id, start).map_err(at)?;
            }
            if let Some(when) = node.stop {
                graph.stop(id, when).map_err(at)?;
            }
            names.insert(node.name.clone(), id);
        }

        let lookup = |name: &str| {
            names
                .get(name)
                .copied()
                .ok_or_else(|| ConfigError::UnknownNode(name.to_string()))
        };

        for connection in &self.connections {
            let from = lookup(&connection.from)?;
            let to = lookup(&connection.to)?;
            let at = |e| {
                ConfigError::graph(format!("{} -> {}", connection.from, connection.to), e)
            };
            match &connection.param {
                Some(param) => {
                    let param = graph.param_id(to, param).map_err(at)?;
                    graph
                        .connect_param(from, connection.output, param)
                        .map_err(at)?;
                }
                None => {
                    graph
                        .connect(from, connection.output, to, connection.input)
                        .map_err(at)?;
                }
            }
        }

        for automation in &self.automation {
            let node = lookup(&automation.node)?;
            let at = |e| ConfigError::graph(automation.node.as_str(), e);
            let id = graph.param_id(node, &automation.param).map_err(at)?;
            let param = graph.param_mut(id).map_err(at)?;
            for event in &automation.events {
                event.apply(param).map_err(|source| ConfigError::Automation {
                    node: automation.node.clone(),
                    param: automation.param.clone(),
                    source,
                })?;
            }
        }

        tracing::debug!(
            nodes = self.nodes.len(),
            connections = self.connections.len(),
            automated = self.automation.len(),
            "graph description built"
        );
        Ok((graph, names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonograph_core::{BiquadType, NodeType, Waveform};

    const EXAMPLE: &str = r#"
[context]
sample_rate = 48000
channels = 1
duration = 0.5

[[nodes]]
name = "osc"
type = "oscillator"
waveform = "square"
start = 0.0
stop = 0.25
params = { frequency = 110.0 }

[[nodes]]
name = "lp"
type = "biquad-filter"
filter = "highpass"

[[nodes]]
name = "lfo"
type = "constant-source"
start = 0.0

[[connections]]
from = "osc"
to = "lp"

[[connections]]
from = "lfo"
to = "lp"
param = "detune"

[[connections]]
from = "lp"
to = "destination"

[[automation]]
node = "lp"
param = "frequency"
events = [
    { type = "set-value", value = 200.0, time = 0.0 },
    { type = "exponential-ramp", value = 4000.0, end_time = 0.5 },
]
"#;

    #[test]
    fn parses_nodes_by_type_tag() {
        let description = GraphDescription::from_toml(EXAMPLE).unwrap();
        assert_eq!(description.context.frames(), 24000);
        assert_eq!(
            description.nodes[0].kind,
            KindDescription::Oscillator(OscillatorOptions {
                waveform: Waveform::Square
            })
        );
        assert_eq!(
            description.nodes[1].kind,
            KindDescription::BiquadFilter(BiquadOptions {
                filter_type: BiquadType::Highpass
            })
        );
        assert_eq!(description.nodes[0].params["frequency"], 110.0);
        assert_eq!(description.connections[1].param.as_deref(), Some("detune"));
    }

    #[test]
    fn builds_graph_with_params_lifecycle_and_automation() {
        let (graph, names) = GraphDescription::from_toml(EXAMPLE).unwrap().build().unwrap();
        assert_eq!(graph.sample_rate(), 48000.0);
        assert_eq!(graph.channel_count(), 1);
        assert_eq!(names[DESTINATION], graph.destination());

        let osc = graph.node(names["osc"]).unwrap();
        assert_eq!(osc.kind().node_type(), NodeType::Oscillator);
        assert_eq!(osc.lifecycle().stop, Some(0.25));
        let frequency = graph.param_id(names["osc"], "frequency").unwrap();
        assert_eq!(graph.param(frequency).unwrap().value(), 110.0);

        let cutoff = graph.param_id(names["lp"], "frequency").unwrap();
        assert_eq!(graph.param(cutoff).unwrap().timeline().len(), 2);
        let detune = graph.param_id(names["lp"], "detune").unwrap();
        assert_eq!(graph.param_inputs(detune).unwrap().len(), 1);
        assert_eq!(graph.edges_into(graph.destination()).unwrap()[0].len(), 1);
    }

    #[test]
    fn frames_prefers_length_then_duration() {
        let mut context = ContextDescription::default();
        assert_eq!(context.frames(), 44100);
        context.duration = Some(0.1);
        assert_eq!(context.frames(), 4410);
        context.length = Some(7);
        assert_eq!(context.frames(), 7);
    }

    #[test]
    fn defaults_fill_in_optional_fields() {
        let description = GraphDescription::from_toml(
            r#"
[[nodes]]
name = "d"
type = "delay"

[[nodes]]
name = "m"
type = "channel-merger"
"#,
        )
        .unwrap();
        assert_eq!(description.context, ContextDescription::default());
        assert_eq!(
            description.nodes[0].kind,
            KindDescription::Delay {
                max_delay_time: 1.0
            }
        );
        assert_eq!(description.nodes[1].kind, KindDescription::ChannelMerger { inputs: 2 });
    }

    #[test]
    fn unknown_type_is_a_parse_error() {
        let err = GraphDescription::from_toml("[[nodes]]\nname = \"x\"\ntype = \"flanger\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn worklet_needs_a_registered_processor() {
        let description = GraphDescription {
            nodes: vec![NodeDescription::new(
                "w",
                KindDescription::Worklet(WorkletDescription {
                    processor: "crusher".into(),
                    inputs: 1,
                    outputs: 1,
                    output_channel_count: None,
                    parameters: Vec::new(),
                }),
            )],
            ..GraphDescription::default()
        };
        assert!(matches!(
            description.build(),
            Err(ConfigError::UnknownProcessor(name)) if name == "crusher"
        ));
    }

    #[test]
    fn destination_name_is_reserved() {
        let description = GraphDescription {
            nodes: vec![NodeDescription::new(DESTINATION, KindDescription::Gain)],
            ..GraphDescription::default()
        };
        assert!(matches!(
            description.build(),
            Err(ConfigError::DuplicateNode(_))
        ));
    }
}
