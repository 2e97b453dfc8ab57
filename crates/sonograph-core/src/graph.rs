//! Audio graph: node, param and connection registry.
//!
//! [`AudioGraph`] owns the topology the renderer reads: nodes with their
//! channel configuration and lifecycle, params with their automation
//! timelines, and the connections between them. Every mutation is validated
//! synchronously; the renderer never sees an inconsistent graph.
//!
//! Connections form a multigraph. Two edges may join the same pair of nodes
//! as long as they use different output or input slots; an identical
//! `(source, output, target)` tuple is rejected. Edges are kept in insertion
//! order within each slot, which is the order fan-in is mixed in.

use std::collections::HashSet;

use crate::cycle::would_cycle;
use crate::edge::{Edge, Target};
use crate::error::{GraphError, Port};
use crate::ids::{EdgeId, GraphId, NodeId, ParamId};
use crate::node::{
    ChannelConfig, ChannelCountMode, ChannelInterpretation, MAX_CHANNELS, NativeBinding, Node,
    NodeKind, Start,
};
use crate::param::Param;
use crate::slots::Slots;

/// Lowest sample rate a graph accepts, in Hz.
pub const MIN_SAMPLE_RATE: f32 = 3000.0;
/// Highest sample rate a graph accepts, in Hz.
pub const MAX_SAMPLE_RATE: f32 = 768_000.0;

/// Construction options for [`AudioGraph`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GraphOptions {
    /// Sample rate in Hz.
    pub sample_rate: f32,
    /// Channel count of the destination.
    pub channel_count: usize,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            channel_count: 2,
        }
    }
}

/// Selects which connections [`AudioGraph::disconnect`] removes.
///
/// The empty filter ([`Disconnect::all`]) removes every outgoing connection.
/// Each additional constraint narrows the selection.
///
/// ```rust
/// use sonograph_core::{AudioGraph, Disconnect, GraphOptions, NodeKind};
///
/// let mut graph = AudioGraph::new(GraphOptions::default()).unwrap();
/// let gain = graph.add_node(NodeKind::Gain).unwrap();
/// let src = graph.add_node(NodeKind::ConstantSource).unwrap();
/// graph.connect(src, 0, gain, 0).unwrap();
/// graph.connect(gain, 0, graph.destination(), 0).unwrap();
///
/// assert_eq!(graph.disconnect(src, Disconnect::to_node(gain).at_input(0)).unwrap(), 1);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Disconnect {
    output: Option<usize>,
    target: Option<DisconnectTarget>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DisconnectTarget {
    Node { node: NodeId, input: Option<usize> },
    Param(ParamId),
}

impl Disconnect {
    /// Matches every outgoing connection.
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches connections into `node`.
    pub fn to_node(node: NodeId) -> Self {
        Self {
            output: None,
            target: Some(DisconnectTarget::Node { node, input: None }),
        }
    }

    /// Matches connections into `param`.
    pub fn to_param(param: ParamId) -> Self {
        Self {
            output: None,
            target: Some(DisconnectTarget::Param(param)),
        }
    }

    /// Restricts the match to one output slot of the source.
    pub fn from_output(mut self, output: usize) -> Self {
        self.output = Some(output);
        self
    }

    /// Restricts a node match to one input slot. Ignored for param targets.
    pub fn at_input(mut self, input: usize) -> Self {
        if let Some(DisconnectTarget::Node { input: slot, .. }) = &mut self.target {
            *slot = Some(input);
        }
        self
    }

    fn is_all(&self) -> bool {
        self.output.is_none() && self.target.is_none()
    }

    fn matches(&self, edge: &Edge) -> bool {
        if let Some(output) = self.output
            && edge.output != output
        {
            return false;
        }
        match (self.target, edge.target) {
            (None, _) => true,
            (
                Some(DisconnectTarget::Node { node, input }),
                Target::Node {
                    node: target,
                    input: slot,
                },
            ) => node == target && input.is_none_or(|i| i == slot),
            (Some(DisconnectTarget::Param(param)), Target::Param(target)) => param == target,
            _ => false,
        }
    }
}

/// A mutable audio-processing graph.
///
/// The graph is created with its destination node; every other node is added
/// with [`add_node`](Self::add_node) and wired with
/// [`connect`](Self::connect) / [`connect_param`](Self::connect_param).
#[derive(Debug, Clone)]
pub struct AudioGraph {
    id: GraphId,
    sample_rate: f32,
    channel_count: usize,
    destination: NodeId,
    nodes: Slots<Node>,
    params: Slots<Param>,
    edges: Slots<Edge>,
}

impl AudioGraph {
    /// Creates a graph holding only its destination node.
    pub fn new(options: GraphOptions) -> Result<Self, GraphError> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&options.sample_rate) {
            return Err(GraphError::InvalidOptions(format!(
                "sample rate must be in {MIN_SAMPLE_RATE}..={MAX_SAMPLE_RATE} Hz, got {}",
                options.sample_rate
            )));
        }
        if options.channel_count == 0 || options.channel_count > MAX_CHANNELS {
            return Err(GraphError::InvalidOptions(format!(
                "channel count must be in 1..={MAX_CHANNELS}, got {}",
                options.channel_count
            )));
        }

        let id = GraphId::next();
        let mut nodes = Slots::default();
        let key = nodes.vacant();
        let destination = NodeId {
            graph: id,
            slot: key.slot,
            generation: key.generation,
        };
        let kind = NodeKind::Destination;
        let channel = kind.default_channel_config(options.channel_count);
        nodes.insert(Node::new(destination, kind, channel));
        Ok(Self {
            id,
            sample_rate: options.sample_rate,
            channel_count: options.channel_count,
            destination,
            nodes,
            params: Slots::default(),
            edges: Slots::default(),
        })
    }

    /// Returns the graph's identity.
    pub fn id(&self) -> GraphId {
        self.id
    }

    /// Returns the sample rate in Hz.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Returns the destination's channel count.
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Returns the destination node.
    pub fn destination(&self) -> NodeId {
        self.destination
    }

    // --- Nodes ---

    /// Adds a node of the given kind and returns its id.
    ///
    /// The node's params are created from the kind's catalog specs.
    pub fn add_node(&mut self, kind: NodeKind) -> Result<NodeId, GraphError> {
        if matches!(kind, NodeKind::Destination) {
            return Err(GraphError::InvalidOptions(
                "a graph has exactly one destination".into(),
            ));
        }
        kind.validate()?;

        let key = self.nodes.vacant();
        let id = NodeId {
            graph: self.id,
            slot: key.slot,
            generation: key.generation,
        };
        let channel = kind.default_channel_config(self.channel_count);
        let specs = kind.param_specs(self.sample_rate);
        let mut node = Node::new(id, kind, channel);
        for spec in specs {
            let key = self.params.vacant();
            let param_id = ParamId {
                graph: self.id,
                slot: key.slot,
                generation: key.generation,
            };
            self.params.insert(Param::new(param_id, id, spec));
            node.params.push(param_id);
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_add: {} node {id}", node.kind.node_type());
        self.nodes.insert(node);
        Ok(id)
    }

    /// Removes a node together with its params and every connection that
    /// references either.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), GraphError> {
        if id == self.destination {
            return Err(GraphError::InvalidState(
                "the destination cannot be removed".into(),
            ));
        }
        let node = self.node(id)?;
        let mut edge_ids: Vec<EdgeId> = node.edge_ids().collect();
        for param in &node.params {
            if let Some(param) = self.params.get(param.key()) {
                edge_ids.extend_from_slice(&param.inputs);
            }
        }
        let params = node.params.clone();

        for edge_id in edge_ids {
            self.remove_edge(edge_id);
        }
        for param in params {
            self.params.remove(param.key());
        }
        self.nodes.remove(id.key());
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_remove: node {id}");
        Ok(())
    }

    /// Returns a node.
    pub fn node(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.check_graph(id.graph)?;
        self.nodes
            .get(id.key())
            .ok_or(GraphError::NodeNotFound(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, GraphError> {
        self.check_graph(id.graph)?;
        self.nodes
            .get_mut(id.key())
            .ok_or(GraphError::NodeNotFound(id))
    }

    /// Iterates over live nodes in slot order. Without removals this is
    /// creation order; a removed node's slot goes to the next node added.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Returns the number of live nodes, destination included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of live connections.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns a connection by id.
    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.key())
    }

    // --- Params ---

    /// Looks up a param of `node` by name.
    pub fn param_id(&self, node: NodeId, name: &str) -> Result<ParamId, GraphError> {
        let owner = self.node(node)?;
        owner
            .params
            .iter()
            .copied()
            .find(|p| self.param(*p).is_ok_and(|param| param.name() == name))
            .ok_or_else(|| GraphError::UnknownParam {
                node,
                name: name.to_owned(),
            })
    }

    /// Returns a param.
    pub fn param(&self, id: ParamId) -> Result<&Param, GraphError> {
        self.check_graph(id.graph)?;
        self.params
            .get(id.key())
            .ok_or(GraphError::ParamNotFound(id))
    }

    /// Returns a param for value changes and automation.
    pub fn param_mut(&mut self, id: ParamId) -> Result<&mut Param, GraphError> {
        self.check_graph(id.graph)?;
        self.params
            .get_mut(id.key())
            .ok_or(GraphError::ParamNotFound(id))
    }

    // --- Connections ---

    /// Connects output `output` of `source` to input `input` of `destination`.
    pub fn connect(
        &mut self,
        source: NodeId,
        output: usize,
        destination: NodeId,
        input: usize,
    ) -> Result<EdgeId, GraphError> {
        self.check_graph(source.graph)?;
        self.check_graph(destination.graph)?;
        self.check_output(source, output)?;
        let inputs = self.node(destination)?.inputs.len();
        if input >= inputs {
            return Err(GraphError::IndexOutOfRange {
                node: destination,
                port: Port::Input,
                index: input,
                count: inputs,
            });
        }

        let target = Target::Node {
            node: destination,
            input,
        };
        self.check_new_edge(source, output, target, destination)?;
        let id = self.insert_edge(Edge {
            source,
            output,
            target,
        });
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_connect: {source}[{output}] → {destination}[{input}]");
        Ok(id)
    }

    /// Connects output `output` of `source` to `param`.
    pub fn connect_param(
        &mut self,
        source: NodeId,
        output: usize,
        param: ParamId,
    ) -> Result<EdgeId, GraphError> {
        self.check_graph(source.graph)?;
        self.check_graph(param.graph)?;
        self.check_output(source, output)?;
        let owner = self.param(param)?.node;

        let target = Target::Param(param);
        self.check_new_edge(source, output, target, owner)?;
        let id = self.insert_edge(Edge {
            source,
            output,
            target,
        });
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_connect: {source}[{output}] → {param}");
        Ok(id)
    }

    /// Removes the outgoing connections of `source` selected by `filter`.
    ///
    /// Returns the number of removed connections. A filter that names an
    /// output, node or param with no matching connection is an error.
    pub fn disconnect(&mut self, source: NodeId, filter: Disconnect) -> Result<usize, GraphError> {
        let node = self.node(source)?;
        if let Some(output) = filter.output
            && output >= node.outputs.len()
        {
            return Err(GraphError::IndexOutOfRange {
                node: source,
                port: Port::Output,
                index: output,
                count: node.outputs.len(),
            });
        }
        match filter.target {
            Some(DisconnectTarget::Node { node, input }) => {
                let inputs = self.node(node)?.inputs.len();
                if let Some(input) = input
                    && input >= inputs
                {
                    return Err(GraphError::IndexOutOfRange {
                        node,
                        port: Port::Input,
                        index: input,
                        count: inputs,
                    });
                }
            }
            Some(DisconnectTarget::Param(param)) => {
                self.param(param)?;
            }
            None => {}
        }

        let matched: Vec<EdgeId> = node
            .outputs
            .iter()
            .flatten()
            .copied()
            .filter(|id| self.edge(*id).is_some_and(|edge| filter.matches(edge)))
            .collect();
        if matched.is_empty() && !filter.is_all() {
            return Err(GraphError::NotConnected(source));
        }

        for id in &matched {
            self.remove_edge(*id);
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_disconnect: {source} ({} edges)", matched.len());
        Ok(matched.len())
    }

    /// Returns the connections into each input slot of `node`, in insertion
    /// order.
    pub fn edges_into(&self, node: NodeId) -> Result<Vec<Vec<Edge>>, GraphError> {
        Ok(self.resolve_slots(&self.node(node)?.inputs))
    }

    /// Returns the connections out of each output slot of `node`, in insertion
    /// order.
    pub fn edges_from(&self, node: NodeId) -> Result<Vec<Vec<Edge>>, GraphError> {
        Ok(self.resolve_slots(&self.node(node)?.outputs))
    }

    /// Returns the connections driving `param`, in insertion order.
    pub fn param_inputs(&self, param: ParamId) -> Result<Vec<Edge>, GraphError> {
        let param = self.param(param)?;
        Ok(param
            .inputs
            .iter()
            .filter_map(|id| self.edge(*id).copied())
            .collect())
    }

    // --- Node state ---

    /// Schedules a source node to start at `when`.
    pub fn start(&mut self, node: NodeId, when: f64) -> Result<(), GraphError> {
        self.start_at(
            node,
            Start {
                when,
                ..Start::default()
            },
        )
    }

    /// Schedules a source node to start with an explicit offset and duration.
    pub fn start_at(&mut self, node: NodeId, start: Start) -> Result<(), GraphError> {
        let valid = start.when.is_finite()
            && start.when >= 0.0
            && start.offset.is_finite()
            && start.offset >= 0.0
            && start.duration.is_none_or(|d| d.is_finite() && d >= 0.0);
        if !valid {
            return Err(GraphError::InvalidOptions(format!(
                "start times must be finite and non-negative, got {start:?}"
            )));
        }
        let target = self.source_mut(node)?;
        if target.lifecycle.start.is_some() {
            return Err(GraphError::InvalidState(format!("{node} was already started")));
        }
        target.lifecycle.start = Some(start);
        Ok(())
    }

    /// Schedules a started source node to stop at `when`.
    pub fn stop(&mut self, node: NodeId, when: f64) -> Result<(), GraphError> {
        if !(when.is_finite() && when >= 0.0) {
            return Err(GraphError::InvalidOptions(format!(
                "stop time must be finite and non-negative, got {when}"
            )));
        }
        let target = self.source_mut(node)?;
        if target.lifecycle.start.is_none() {
            return Err(GraphError::InvalidState(format!("{node} was never started")));
        }
        target.lifecycle.stop = Some(when);
        Ok(())
    }

    /// Replaces the channel configuration of `node`.
    pub fn set_channel_config(&mut self, node: NodeId, config: ChannelConfig) -> Result<(), GraphError> {
        let context_channels = self.channel_count;
        let target = self.node_mut(node)?;
        let reject = |reason: String| GraphError::InvalidChannelConfig { node, reason };

        if config.count == 0 || config.count > MAX_CHANNELS {
            return Err(reject(format!(
                "channel count must be in 1..={MAX_CHANNELS}, got {}",
                config.count
            )));
        }
        match target.kind {
            NodeKind::Destination if config.count != context_channels => {
                return Err(reject(format!(
                    "destination channel count is fixed at {context_channels}"
                )));
            }
            NodeKind::ChannelSplitter { outputs } => {
                let fixed = ChannelConfig {
                    count: outputs,
                    mode: ChannelCountMode::Explicit,
                    interpretation: ChannelInterpretation::Discrete,
                };
                if config != fixed {
                    return Err(reject(format!(
                        "splitter configuration is fixed at {outputs} explicit discrete channels"
                    )));
                }
            }
            NodeKind::ChannelMerger { .. }
                if config.count != 1 || config.mode != ChannelCountMode::Explicit =>
            {
                return Err(reject("merger inputs are fixed at one explicit channel".into()));
            }
            _ => {}
        }
        target.channel = config;
        Ok(())
    }

    /// Records (or clears) the native node this node is already realized as.
    pub fn bind_native(&mut self, node: NodeId, binding: Option<NativeBinding>) -> Result<(), GraphError> {
        self.node_mut(node)?.binding = binding;
        Ok(())
    }

    // --- Channel counts ---

    /// Computes the channel count of input `input` of `node` from the graph
    /// structure, without rendering.
    pub fn input_channel_count(&self, node: NodeId, input: usize) -> Result<usize, GraphError> {
        let target = self.node(node)?;
        if input >= target.inputs.len() {
            return Err(GraphError::IndexOutOfRange {
                node,
                port: Port::Input,
                index: input,
                count: target.inputs.len(),
            });
        }
        Ok(self.input_channels(target, input, &mut HashSet::new()))
    }

    /// Computes the channel count of output `output` of `node` from the graph
    /// structure, without rendering.
    pub fn output_channel_count(&self, node: NodeId, output: usize) -> Result<usize, GraphError> {
        self.check_output(node, output)?;
        Ok(self
            .output_channels(node, output, &mut HashSet::new())
            .unwrap_or(1))
    }

    /// Returns `None` when `id` is already being visited (a feedback loop).
    fn output_channels(&self, id: NodeId, output: usize, visiting: &mut HashSet<NodeId>) -> Option<usize> {
        if !visiting.insert(id) {
            return None;
        }
        let node = self.node(id).ok()?;
        let count = match &node.kind {
            NodeKind::ConstantSource | NodeKind::Oscillator(_) | NodeKind::ChannelSplitter { .. } => Some(1),
            NodeKind::BufferSource(options) => Some(
                options
                    .buffer
                    .as_ref()
                    .map_or(1, |b| b.channel_count().max(1)),
            ),
            NodeKind::ChannelMerger { inputs } => Some(*inputs),
            NodeKind::Worklet(options) => match &options.output_channel_count {
                Some(counts) => counts.get(output).copied(),
                None if options.number_of_inputs == 1 && options.number_of_outputs == 1 => {
                    Some(self.input_channels(node, 0, visiting))
                }
                None => Some(1),
            },
            NodeKind::Destination
            | NodeKind::Gain
            | NodeKind::Delay(_)
            | NodeKind::BiquadFilter(_)
            | NodeKind::IirFilter(_) => Some(self.input_channels(node, 0, visiting)),
        };
        visiting.remove(&id);
        count
    }

    fn input_channels(&self, node: &Node, input: usize, visiting: &mut HashSet<NodeId>) -> usize {
        let connected = node.inputs[input]
            .iter()
            .filter_map(|id| self.edge(*id).copied())
            .filter_map(|edge| self.output_channels(edge.source, edge.output, visiting))
            .max();
        node.channel.computed_channels(connected)
    }

    // --- Internals ---

    fn check_graph(&self, graph: GraphId) -> Result<(), GraphError> {
        if graph == self.id {
            Ok(())
        } else {
            Err(GraphError::ContextMismatch {
                expected: self.id,
                found: graph,
            })
        }
    }

    fn check_output(&self, node: NodeId, output: usize) -> Result<(), GraphError> {
        let outputs = self.node(node)?.outputs.len();
        if output >= outputs {
            return Err(GraphError::IndexOutOfRange {
                node,
                port: Port::Output,
                index: output,
                count: outputs,
            });
        }
        Ok(())
    }

    fn check_new_edge(
        &self,
        source: NodeId,
        output: usize,
        target: Target,
        target_node: NodeId,
    ) -> Result<(), GraphError> {
        let duplicate = self.node(source)?.outputs[output]
            .iter()
            .filter_map(|id| self.edge(*id))
            .any(|edge| edge.target == target);
        if duplicate {
            return Err(GraphError::DuplicateConnection {
                from: source,
                output,
            });
        }
        if would_cycle(self, source, &target) {
            return Err(GraphError::Cycle {
                from: source,
                to: target_node,
            });
        }
        Ok(())
    }

    fn insert_edge(&mut self, edge: Edge) -> EdgeId {
        let id = EdgeId::from_key(self.edges.insert(edge));
        if let Some(source) = self.nodes.get_mut(edge.source.key()) {
            source.outputs[edge.output].push(id);
        }
        match edge.target {
            Target::Node { node, input } => {
                if let Some(target) = self.nodes.get_mut(node.key()) {
                    target.inputs[input].push(id);
                }
            }
            Target::Param(param) => {
                if let Some(target) = self.params.get_mut(param.key()) {
                    target.inputs.push(id);
                }
            }
        }
        id
    }

    fn remove_edge(&mut self, id: EdgeId) {
        let Some(edge) = self.edges.remove(id.key()) else {
            return;
        };
        if let Some(source) = self.nodes.get_mut(edge.source.key()) {
            source.outputs[edge.output].retain(|e| *e != id);
        }
        match edge.target {
            Target::Node { node, input } => {
                if let Some(target) = self.nodes.get_mut(node.key()) {
                    target.inputs[input].retain(|e| *e != id);
                }
            }
            Target::Param(param) => {
                if let Some(target) = self.params.get_mut(param.key()) {
                    target.inputs.retain(|e| *e != id);
                }
            }
        }
    }

    fn resolve_slots(&self, slots: &[Vec<EdgeId>]) -> Vec<Vec<Edge>> {
        slots
            .iter()
            .map(|slot| slot.iter().filter_map(|id| self.edge(*id).copied()).collect())
            .collect()
    }

    fn source_mut(&mut self, node: NodeId) -> Result<&mut Node, GraphError> {
        let target = self.node_mut(node)?;
        if !target.kind.traits().is_source {
            return Err(GraphError::InvalidState(format!(
                "{node} is a {} node, not a source",
                target.kind.node_type()
            )));
        }
        Ok(target)
    }
}
