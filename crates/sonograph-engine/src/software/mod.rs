//! Reference software engine.
//!
//! [`SoftwareContext`] keeps its native nodes in a flat arena indexed by
//! [`NativeNodeId`]; slot 0 is the destination. Rendering schedules the
//! nodes upstream of the destination once, then runs them block by block:
//! 128-frame quanta normally, single frames when a feedback loop is present
//! so that each loop delay feeds back exactly one frame late at minimum.

mod kernel;
mod schedule;

use std::collections::BTreeMap;

use sonograph_core::dsp::accumulate;
use sonograph_core::{
    AudioBuffer, AutomationRate, AutomationTarget, AutomationTimeline, ChannelConfig,
    ChannelCountMode, ChannelInterpretation, ContextId, Lifecycle, MAX_CHANNELS, MAX_SAMPLE_RATE,
    MIN_SAMPLE_RATE, NativeNodeId, NativeParamId, NodeKind, NodeType, ParamSpec, RENDER_QUANTUM,
    Start,
};

use crate::{ContextOptions, ContextState, Engine, EngineContext, EngineError, EngineProfile};

use kernel::{Block, Kernel, Signal};
use schedule::Step;

const DESTINATION: usize = 0;

/// Sample-accurate engine rendering on the calling thread.
#[derive(Debug, Clone, Default)]
pub struct SoftwareEngine {
    profile: EngineProfile,
}

impl SoftwareEngine {
    /// Creates an engine supporting every primitive except worklets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine that behaves as described by `profile`.
    pub fn with_profile(profile: EngineProfile) -> Self {
        Self { profile }
    }

    /// Returns the engine's profile.
    pub fn profile(&self) -> &EngineProfile {
        &self.profile
    }

    /// Creates a concrete context.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidOptions`] for a sample rate outside
    /// `3000..=768000` Hz, a channel count outside `1..=32` or a zero length.
    pub fn context(&self, options: ContextOptions) -> Result<SoftwareContext, EngineError> {
        SoftwareContext::new(self.profile.clone(), options)
    }
}

impl Engine for SoftwareEngine {
    fn name(&self) -> &str {
        self.profile.name.as_deref().unwrap_or("software")
    }

    fn create_context(
        &self,
        options: ContextOptions,
    ) -> Result<Box<dyn EngineContext>, EngineError> {
        Ok(Box::new(self.context(options)?))
    }
}

/// Construction and wiring counters of a context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextStats {
    /// Nodes constructed through `create_node`.
    pub nodes_created: usize,
    /// Constructions per node type.
    pub created_by_type: BTreeMap<NodeType, usize>,
    /// Connections made (repeated identical connections not counted).
    pub connections: usize,
    /// Connections removed by `disconnect`.
    pub disconnections: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Connection {
    pub source: NativeNodeId,
    pub output: usize,
}

#[derive(Debug)]
struct NativeParam {
    spec: ParamSpec,
    timeline: AutomationTimeline,
    inputs: Vec<Connection>,
}

#[derive(Debug)]
pub(crate) struct NativeNode {
    pub kind: NodeKind,
    pub channel: ChannelConfig,
    pub lifecycle: Lifecycle,
    inputs: Vec<Vec<Connection>>,
    params: Vec<NativeParam>,
}

impl NativeNode {
    /// Every connection feeding the node, inputs first.
    pub fn sources(&self) -> impl Iterator<Item = &Connection> {
        self.inputs
            .iter()
            .flatten()
            .chain(self.params.iter().flat_map(|p| p.inputs.iter()))
    }

    pub fn is_delay(&self) -> bool {
        matches!(self.kind, NodeKind::Delay(_))
    }

    fn outputs(&self) -> usize {
        self.kind.traits().outputs
    }
}

/// A context of the [`SoftwareEngine`].
#[derive(Debug)]
pub struct SoftwareContext {
    id: ContextId,
    sample_rate: f32,
    length: usize,
    channel_count: usize,
    state: ContextState,
    profile: EngineProfile,
    nodes: Vec<NativeNode>,
    stats: ContextStats,
}

impl SoftwareContext {
    fn new(profile: EngineProfile, options: ContextOptions) -> Result<Self, EngineError> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&options.sample_rate) {
            return Err(EngineError::InvalidOptions(format!(
                "sample rate {} outside {MIN_SAMPLE_RATE}..={MAX_SAMPLE_RATE}",
                options.sample_rate
            )));
        }
        if !(1..=MAX_CHANNELS).contains(&options.channel_count) {
            return Err(EngineError::InvalidOptions(format!(
                "channel count {} outside 1..={MAX_CHANNELS}",
                options.channel_count
            )));
        }
        if options.length == 0 {
            return Err(EngineError::InvalidOptions("length must be positive".into()));
        }

        let destination = NativeNode {
            kind: NodeKind::Destination,
            channel: ChannelConfig::explicit(options.channel_count),
            lifecycle: Lifecycle::default(),
            inputs: vec![Vec::new()],
            params: Vec::new(),
        };
        Ok(Self {
            id: ContextId::next(),
            sample_rate: options.sample_rate,
            length: options.length,
            channel_count: options.channel_count,
            state: ContextState::Idle,
            profile,
            nodes: vec![destination],
            stats: ContextStats::default(),
        })
    }

    /// Returns the construction and wiring counters.
    pub fn stats(&self) -> &ContextStats {
        &self.stats
    }

    /// Returns the number of native nodes, destination included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the kind a native node was constructed with.
    pub fn node_kind(&self, node: NativeNodeId) -> Result<&NodeKind, EngineError> {
        Ok(&self.node(node)?.kind)
    }

    /// Returns the number of outgoing connections of `node`.
    pub fn outgoing_connections(&self, node: NativeNodeId) -> usize {
        self.nodes
            .iter()
            .flat_map(NativeNode::sources)
            .filter(|c| c.source == node)
            .count()
    }

    /// Returns the number of connections currently present.
    pub fn live_connections(&self) -> usize {
        self.nodes.iter().flat_map(NativeNode::sources).count()
    }

    fn node(&self, node: NativeNodeId) -> Result<&NativeNode, EngineError> {
        self.nodes
            .get(node.0 as usize)
            .ok_or(EngineError::NodeNotFound(node))
    }

    fn node_mut(&mut self, node: NativeNodeId) -> Result<&mut NativeNode, EngineError> {
        self.nodes
            .get_mut(node.0 as usize)
            .ok_or(EngineError::NodeNotFound(node))
    }

    fn native_param(&self, param: NativeParamId) -> Result<&NativeParam, EngineError> {
        self.node(param.node)?
            .params
            .get(param.index as usize)
            .ok_or(EngineError::UnknownParam(param))
    }

    fn check_idle(&self, operation: &str) -> Result<(), EngineError> {
        match self.state {
            ContextState::Idle => Ok(()),
            state => Err(EngineError::InvalidState(format!(
                "{operation} on a context in state {state:?}"
            ))),
        }
    }

    fn check_output(&self, node: NativeNodeId, output: usize) -> Result<(), EngineError> {
        let count = self.node(node)?.outputs();
        if output >= count {
            return Err(EngineError::output_out_of_range(node, output, count));
        }
        Ok(())
    }

    /// Layout a node of `kind` is constructed with.
    fn initial_channel_config(&self, kind: &NodeKind, requested: ChannelConfig) -> ChannelConfig {
        if matches!(kind, NodeKind::ChannelMerger { .. }) && self.profile.has_merger_quirk() {
            return ChannelConfig::default();
        }
        requested
    }

    /// Layout writes a correct engine refuses.
    fn check_layout(&self, node: &NativeNode, config: ChannelConfig) -> Result<(), EngineError> {
        let fixed = match node.kind {
            NodeKind::Destination => config.count == self.channel_count,
            NodeKind::ChannelSplitter { outputs } => {
                config.count == outputs
                    && config.mode == ChannelCountMode::Explicit
                    && config.interpretation == ChannelInterpretation::Discrete
            }
            NodeKind::ChannelMerger { .. } if !self.profile.has_merger_quirk() => {
                config.count == 1 && config.mode == ChannelCountMode::Explicit
            }
            _ => true,
        };
        if fixed {
            Ok(())
        } else {
            Err(EngineError::InvalidState(format!(
                "{} does not accept channel layout {config:?}",
                node.kind.node_type()
            )))
        }
    }

    fn render(&self) -> Result<AudioBuffer, EngineError> {
        let schedule = schedule::build(&self.nodes, DESTINATION)?;
        let quantum = if schedule.has_feedback() {
            1
        } else {
            RENDER_QUANTUM
        };
        tracing::debug!(
            context = self.id.index(),
            steps = schedule.steps.len(),
            quantum,
            "software render scheduled"
        );

        let mut kernels: Vec<Kernel> = self
            .nodes
            .iter()
            .map(|n| Kernel::new(&n.kind, self.sample_rate))
            .collect();
        let mut signals: Vec<Vec<Signal>> = vec![Vec::new(); self.nodes.len()];
        let mut rendered: Vec<Vec<f32>> = vec![Vec::with_capacity(self.length); self.channel_count];

        let mut start = 0;
        while start < self.length {
            let block = Block {
                start,
                frames: quantum.min(self.length - start),
                sample_rate: self.sample_rate,
            };
            for step in &schedule.steps {
                match *step {
                    Step::Process(idx) => {
                        let node = &self.nodes[idx];
                        let inputs = self.mix_inputs(node, &signals, block);
                        let params = self.param_values(node, &signals, block);
                        signals[idx] = kernels[idx].process(node, inputs, &params, block);
                    }
                    Step::DelayRead(idx) => {
                        let params = self.param_values(&self.nodes[idx], &signals, block);
                        signals[idx] = vec![kernels[idx].read_delay(&params[0], block, 1.0)];
                    }
                    Step::DelayWrite(idx) => {
                        let mut inputs = self.mix_inputs(&self.nodes[idx], &signals, block);
                        let input = inputs.pop().unwrap_or_default();
                        kernels[idx].write_delay(&input, block.frames);
                    }
                }
            }

            let destination = signals[DESTINATION].first();
            for (c, channel) in rendered.iter_mut().enumerate() {
                match destination.and_then(|d| d.get(c)) {
                    Some(samples) => channel.extend_from_slice(samples),
                    None => channel.resize(channel.len() + block.frames, 0.0),
                }
            }
            start += block.frames;
        }

        Ok(AudioBuffer::from_channels(rendered, self.sample_rate))
    }

    /// Mixes every input slot of `node` to its computed channel count.
    fn mix_inputs(&self, node: &NativeNode, signals: &[Vec<Signal>], block: Block) -> Vec<Signal> {
        node.inputs
            .iter()
            .map(|connections| {
                let sources: Vec<&Signal> = connections
                    .iter()
                    .filter_map(|c| signals[c.source.0 as usize].get(c.output))
                    .collect();
                let connected = sources.iter().map(|s| s.len()).max();
                let mut mixed = block.silence(node.channel.computed_channels(connected));
                for source in sources {
                    let channels: Vec<&[f32]> = source.iter().map(Vec::as_slice).collect();
                    accumulate(&channels, &mut mixed, node.channel.interpretation);
                }
                mixed
            })
            .collect()
    }

    /// Evaluates every param of `node`: timeline plus connected signals,
    /// clamped to the nominal range.
    fn param_values(
        &self,
        node: &NativeNode,
        signals: &[Vec<Signal>],
        block: Block,
    ) -> Vec<Vec<f32>> {
        node.params
            .iter()
            .map(|param| {
                let mut values = vec![0.0; block.frames];
                param
                    .timeline
                    .fill(block.time(0), self.sample_rate, &mut values);
                for connection in &param.inputs {
                    let Some(source) = signals[connection.source.0 as usize].get(connection.output)
                    else {
                        continue;
                    };
                    let channels: Vec<&[f32]> = source.iter().map(Vec::as_slice).collect();
                    let mut mono = block.silence(1);
                    accumulate(&channels, &mut mono, ChannelInterpretation::Speakers);
                    for (value, signal) in values.iter_mut().zip(&mono[0]) {
                        *value += signal;
                    }
                }
                for value in &mut values {
                    *value = param.spec.clamp(*value);
                }
                if param.spec.rate == AutomationRate::KRate {
                    let first = values[0];
                    values.fill(first);
                }
                values
            })
            .collect()
    }
}

impl EngineContext for SoftwareContext {
    fn id(&self) -> ContextId {
        self.id
    }

    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn length(&self) -> usize {
        self.length
    }

    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn state(&self) -> ContextState {
        self.state
    }

    fn destination(&self) -> NativeNodeId {
        NativeNodeId(DESTINATION as u32)
    }

    fn create_node(
        &mut self,
        kind: &NodeKind,
        channel: ChannelConfig,
    ) -> Result<NativeNodeId, EngineError> {
        self.check_idle("create_node")?;
        let node_type = kind.node_type();
        if node_type == NodeType::Worklet || !self.profile.supports(node_type) {
            return Err(EngineError::NotSupported(node_type));
        }
        if node_type == NodeType::Destination {
            return Err(EngineError::InvalidOptions(
                "a context has exactly one destination".into(),
            ));
        }
        kind.validate()
            .map_err(|e| EngineError::InvalidOptions(e.to_string()))?;
        if !(1..=MAX_CHANNELS).contains(&channel.count) {
            return Err(EngineError::InvalidOptions(format!(
                "channel count {} outside 1..={MAX_CHANNELS}",
                channel.count
            )));
        }

        let params = kind
            .param_specs(self.sample_rate)
            .into_iter()
            .map(|spec| {
                let default = self
                    .profile
                    .param_default(node_type, &spec.name)
                    .unwrap_or(spec.default);
                NativeParam {
                    timeline: AutomationTimeline::new(default),
                    spec,
                    inputs: Vec::new(),
                }
            })
            .collect();
        let id = NativeNodeId(self.nodes.len() as u32);
        self.nodes.push(NativeNode {
            channel: self.initial_channel_config(kind, channel),
            lifecycle: Lifecycle::default(),
            inputs: vec![Vec::new(); kind.traits().inputs],
            params,
            kind: kind.clone(),
        });
        self.stats.nodes_created += 1;
        *self.stats.created_by_type.entry(node_type).or_default() += 1;
        tracing::debug!(context = self.id.index(), node = %id, %node_type, "native node created");
        Ok(id)
    }

    fn param(&self, node: NativeNodeId, name: &str) -> Result<NativeParamId, EngineError> {
        let index = self
            .node(node)?
            .params
            .iter()
            .position(|p| p.spec.name == name)
            .ok_or_else(|| EngineError::ParamNotFound {
                node,
                name: name.to_string(),
            })?;
        Ok(NativeParamId {
            node,
            index: index as u32,
        })
    }

    fn param_value(&self, param: NativeParamId) -> Result<f32, EngineError> {
        Ok(self.native_param(param)?.timeline.default_value())
    }

    fn param_mut(
        &mut self,
        param: NativeParamId,
    ) -> Result<&mut dyn AutomationTarget, EngineError> {
        let node = self.node_mut(param.node)?;
        let native = node
            .params
            .get_mut(param.index as usize)
            .ok_or(EngineError::UnknownParam(param))?;
        Ok(&mut native.timeline)
    }

    fn channel_config(&self, node: NativeNodeId) -> Result<ChannelConfig, EngineError> {
        Ok(self.node(node)?.channel)
    }

    fn set_channel_config(
        &mut self,
        node: NativeNodeId,
        config: ChannelConfig,
    ) -> Result<(), EngineError> {
        if !(1..=MAX_CHANNELS).contains(&config.count) {
            return Err(EngineError::InvalidOptions(format!(
                "channel count {} outside 1..={MAX_CHANNELS}",
                config.count
            )));
        }
        self.check_layout(self.node(node)?, config)?;
        self.node_mut(node)?.channel = config;
        Ok(())
    }

    fn connect(
        &mut self,
        source: NativeNodeId,
        output: usize,
        destination: NativeNodeId,
        input: usize,
    ) -> Result<bool, EngineError> {
        self.check_idle("connect")?;
        self.check_output(source, output)?;
        let target = self.node_mut(destination)?;
        let count = target.inputs.len();
        let slot = target
            .inputs
            .get_mut(input)
            .ok_or(EngineError::input_out_of_range(destination, input, count))?;
        let connection = Connection { source, output };
        if slot.contains(&connection) {
            return Ok(false);
        }
        slot.push(connection);
        self.stats.connections += 1;
        tracing::debug!(%source, output, %destination, input, "native connect");
        Ok(true)
    }

    fn connect_param(
        &mut self,
        source: NativeNodeId,
        output: usize,
        param: NativeParamId,
    ) -> Result<bool, EngineError> {
        self.check_idle("connect_param")?;
        self.check_output(source, output)?;
        let native = self
            .node_mut(param.node)?
            .params
            .get_mut(param.index as usize)
            .ok_or(EngineError::UnknownParam(param))?;
        let connection = Connection { source, output };
        if native.inputs.contains(&connection) {
            return Ok(false);
        }
        native.inputs.push(connection);
        self.stats.connections += 1;
        tracing::debug!(%source, output, node = %param.node, param = param.index, "native connect to param");
        Ok(true)
    }

    fn disconnect(&mut self, node: NativeNodeId) -> Result<(), EngineError> {
        self.node(node)?;
        let mut removed = 0;
        for target in &mut self.nodes {
            let slots = target
                .inputs
                .iter_mut()
                .chain(target.params.iter_mut().map(|p| &mut p.inputs));
            for slot in slots {
                let before = slot.len();
                slot.retain(|c| c.source != node);
                removed += before - slot.len();
            }
        }
        self.stats.disconnections += removed;
        Ok(())
    }

    fn disconnect_from(
        &mut self,
        source: NativeNodeId,
        output: usize,
        destination: NativeNodeId,
        input: usize,
    ) -> Result<bool, EngineError> {
        self.node(source)?;
        let target = self.node_mut(destination)?;
        let count = target.inputs.len();
        let slot = target
            .inputs
            .get_mut(input)
            .ok_or(EngineError::input_out_of_range(destination, input, count))?;
        let removed = remove_connection(slot, Connection { source, output });
        if removed {
            self.stats.disconnections += 1;
            tracing::debug!(%source, output, %destination, input, "native disconnect");
        }
        Ok(removed)
    }

    fn disconnect_param(
        &mut self,
        source: NativeNodeId,
        output: usize,
        param: NativeParamId,
    ) -> Result<bool, EngineError> {
        self.node(source)?;
        let native = self
            .node_mut(param.node)?
            .params
            .get_mut(param.index as usize)
            .ok_or(EngineError::UnknownParam(param))?;
        let removed = remove_connection(&mut native.inputs, Connection { source, output });
        if removed {
            self.stats.disconnections += 1;
            tracing::debug!(%source, output, node = %param.node, param = param.index, "native disconnect from param");
        }
        Ok(removed)
    }

    fn start_source(&mut self, node: NativeNodeId, start: Start) -> Result<(), EngineError> {
        self.check_idle("start_source")?;
        let valid = |t: f64| t.is_finite() && t >= 0.0;
        if !valid(start.when) || !valid(start.offset) || !start.duration.is_none_or(valid) {
            return Err(EngineError::InvalidOptions(format!(
                "start times must be finite and non-negative: {start:?}"
            )));
        }
        let native = self.node_mut(node)?;
        if !native.kind.traits().is_source {
            return Err(EngineError::InvalidState(format!(
                "{} is not a source",
                native.kind.node_type()
            )));
        }
        if native.lifecycle.start.is_some() {
            return Err(EngineError::InvalidState(format!("{node} already started")));
        }
        native.lifecycle.start = Some(start);
        Ok(())
    }

    fn stop_source(&mut self, node: NativeNodeId, when: f64) -> Result<(), EngineError> {
        self.check_idle("stop_source")?;
        if !(when.is_finite() && when >= 0.0) {
            return Err(EngineError::InvalidOptions(format!(
                "stop time must be finite and non-negative: {when}"
            )));
        }
        let native = self.node_mut(node)?;
        if native.lifecycle.start.is_none() {
            return Err(EngineError::InvalidState(format!(
                "{node} stopped before it was started"
            )));
        }
        native.lifecycle.stop = Some(when);
        Ok(())
    }

    fn start_rendering(&mut self) -> Result<AudioBuffer, EngineError> {
        self.check_idle("start_rendering")?;
        self.state = ContextState::Rendering;
        let result = self.render();
        self.state = ContextState::Closed;
        match &result {
            Ok(buffer) => tracing::info!(
                context = self.id.index(),
                frames = buffer.len(),
                channels = buffer.channel_count(),
                nodes = self.nodes.len(),
                "software render finished"
            ),
            Err(e) => tracing::warn!(context = self.id.index(), error = %e, "software render failed"),
        }
        result
    }
}

fn remove_connection(slot: &mut Vec<Connection>, connection: Connection) -> bool {
    match slot.iter().position(|c| *c == connection) {
        Some(index) => {
            slot.remove(index);
            true
        }
        None => false,
    }
}
