//! Sonograph Core - audio graph model for offline rendering
//!
//! This crate holds everything the renderer reads from the application side:
//! the graph of processing nodes and control params, the connections between
//! them, and the automation scheduled on each param.
//!
//! # Core Abstractions
//!
//! ## Graph
//!
//! - [`AudioGraph`] - Node, param and connection registry with synchronous validation
//! - [`NodeKind`] - Node catalog (sources, gain, delay, filters, channel routing, worklets)
//! - [`Edge`] / [`Target`] - Connections into node inputs or params
//! - [`would_cycle`] - Rejects feedback loops that contain no delay
//!
//! ## Automation
//!
//! - [`AutomationTimeline`] - Ordered event log with sampling and deterministic replay
//! - [`AutomationTarget`] - Anything that accepts automation calls
//! - [`Param`] - Node-owned control parameter
//!
//! ## Custom Processing
//!
//! - [`AudioProcessor`] - Block processor hosted by a worklet node
//! - [`ProcessorFactory`] - Creates one processor per render
//!
//! ## DSP Kernels
//!
//! - [`dsp::IirFilter`], [`dsp::Biquad`], [`dsp::DelayLine`], [`dsp::accumulate`]
//!
//! # Features
//!
//! - `tracing` - Emit `tracing::debug!` events for graph mutations
//!
//! # Example
//!
//! ```rust
//! use sonograph_core::{AudioGraph, GraphOptions, NodeKind};
//!
//! let mut graph = AudioGraph::new(GraphOptions::default()).unwrap();
//! let source = graph.add_node(NodeKind::ConstantSource).unwrap();
//! let gain = graph.add_node(NodeKind::Gain).unwrap();
//! graph.connect(source, 0, gain, 0).unwrap();
//! graph.connect(gain, 0, graph.destination(), 0).unwrap();
//!
//! let level = graph.param_id(gain, "gain").unwrap();
//! graph
//!     .param_mut(level)
//!     .unwrap()
//!     .set_value_at_time(0.0, 0.0)
//!     .unwrap()
//!     .linear_ramp_to_value_at_time(1.0, 1.0)
//!     .unwrap();
//! graph.start(source, 0.0).unwrap();
//! ```

pub mod automation;
pub mod buffer;
pub mod cycle;
pub mod dsp;
pub mod edge;
pub mod error;
pub mod graph;
pub mod ids;
pub mod node;
pub mod param;
pub mod processor;
mod slots;

pub use automation::{AutomationEvent, AutomationTarget, AutomationTimeline};
pub use buffer::AudioBuffer;
pub use cycle::would_cycle;
pub use edge::{Edge, Target};
pub use error::{AutomationError, GraphError, Port};
pub use graph::{AudioGraph, Disconnect, GraphOptions, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};
pub use ids::{ContextId, EdgeId, GraphId, NativeNodeId, NativeParamId, NodeId, ParamId};
pub use node::{
    BiquadOptions, BiquadType, BufferSourceOptions, ChannelConfig, ChannelCountMode,
    ChannelInterpretation, DelayOptions, IirOptions, Lifecycle, MAX_CHANNELS,
    MAX_IIR_COEFFICIENTS, NativeBinding, Node, NodeKind, NodeTraits, NodeType, OscillatorOptions,
    Start, Waveform, WorkletOptions,
};
pub use param::{AutomationRate, DETUNE_LIMIT, MOST_POSITIVE, Param, ParamSpec};
pub use processor::{
    AudioProcessor, ParamValues, ProcessorError, ProcessorFactory, ProcessorOptions,
    RENDER_QUANTUM,
};
