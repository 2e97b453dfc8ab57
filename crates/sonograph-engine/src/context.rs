//! The engine seam: contexts that construct native nodes and render them.
//!
//! An [`Engine`] hands out [`EngineContext`]s. A context owns native nodes,
//! addressed by [`NativeNodeId`], and renders the nodes connected to its
//! destination into an [`AudioBuffer`] exactly once. The renderer treats
//! every implementation as possibly deficient: constructions may fail with
//! [`EngineError::NotSupported`] and primitives may report wrong defaults.

use sonograph_core::{
    AudioBuffer, AutomationTarget, ChannelConfig, ContextId, NativeNodeId, NativeParamId,
    NodeKind, Start,
};

use crate::EngineError;

/// Shape of a context to create.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContextOptions {
    /// Sample rate in Hz.
    pub sample_rate: f32,
    /// Render length in frames.
    pub length: usize,
    /// Channel count of the destination.
    pub channel_count: usize,
}

impl ContextOptions {
    /// Creates options for `channel_count` channels of `length` frames.
    pub fn new(channel_count: usize, length: usize, sample_rate: f32) -> Self {
        Self {
            sample_rate,
            length,
            channel_count,
        }
    }
}

/// Render state of a context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContextState {
    /// Accepting constructions; not rendered yet.
    Idle,
    /// Rendering to its buffer.
    Rendering,
    /// Rendered; the buffer was handed out.
    Closed,
}

/// A rendering context of an engine.
pub trait EngineContext {
    /// Returns the context's identity.
    fn id(&self) -> ContextId;

    /// Returns the sample rate in Hz.
    fn sample_rate(&self) -> f32;

    /// Returns the render length in frames.
    fn length(&self) -> usize;

    /// Returns the channel count of the destination.
    fn channel_count(&self) -> usize;

    /// Returns the render state.
    fn state(&self) -> ContextState;

    /// Returns the context's destination node.
    fn destination(&self) -> NativeNodeId;

    /// Constructs a native node of `kind` with the given input layout.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotSupported`] when the engine lacks the primitive,
    /// [`EngineError::InvalidOptions`] when `kind` is malformed and
    /// [`EngineError::InvalidState`] once rendering has started.
    fn create_node(
        &mut self,
        kind: &NodeKind,
        channel: ChannelConfig,
    ) -> Result<NativeNodeId, EngineError>;

    /// Looks up a param of a native node by name.
    fn param(&self, node: NativeNodeId, name: &str) -> Result<NativeParamId, EngineError>;

    /// Returns the current value of a native param.
    fn param_value(&self, param: NativeParamId) -> Result<f32, EngineError>;

    /// Returns a native param as an automation target.
    fn param_mut(&mut self, param: NativeParamId)
    -> Result<&mut dyn AutomationTarget, EngineError>;

    /// Returns the input layout of a native node.
    fn channel_config(&self, node: NativeNodeId) -> Result<ChannelConfig, EngineError>;

    /// Replaces the input layout of a native node.
    fn set_channel_config(
        &mut self,
        node: NativeNodeId,
        config: ChannelConfig,
    ) -> Result<(), EngineError>;

    /// Connects an output of `source` to an input of `destination`.
    ///
    /// Connecting the same pair of ports twice is a no-op. Returns whether a
    /// new connection was made.
    fn connect(
        &mut self,
        source: NativeNodeId,
        output: usize,
        destination: NativeNodeId,
        input: usize,
    ) -> Result<bool, EngineError>;

    /// Connects an output of `source` to a param; the signal adds to the
    /// param's automation. Returns whether a new connection was made.
    fn connect_param(
        &mut self,
        source: NativeNodeId,
        output: usize,
        param: NativeParamId,
    ) -> Result<bool, EngineError>;

    /// Removes every outgoing connection of `node`.
    fn disconnect(&mut self, node: NativeNodeId) -> Result<(), EngineError>;

    /// Removes the single connection made by [`connect`](Self::connect) with
    /// the same ports. Returns whether it existed.
    fn disconnect_from(
        &mut self,
        source: NativeNodeId,
        output: usize,
        destination: NativeNodeId,
        input: usize,
    ) -> Result<bool, EngineError>;

    /// Removes the single connection made by
    /// [`connect_param`](Self::connect_param). Returns whether it existed.
    fn disconnect_param(
        &mut self,
        source: NativeNodeId,
        output: usize,
        param: NativeParamId,
    ) -> Result<bool, EngineError>;

    /// Schedules the start of a source node.
    fn start_source(&mut self, node: NativeNodeId, start: Start) -> Result<(), EngineError>;

    /// Schedules the stop of a started source node.
    fn stop_source(&mut self, node: NativeNodeId, when: f64) -> Result<(), EngineError>;

    /// Renders everything connected to the destination.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidState`] unless the context is idle. A context
    /// renders at most once.
    fn start_rendering(&mut self) -> Result<AudioBuffer, EngineError>;
}

/// A rendering engine.
pub trait Engine {
    /// Returns the engine's display name.
    fn name(&self) -> &str;

    /// Creates a fresh idle context.
    fn create_context(
        &self,
        options: ContextOptions,
    ) -> Result<Box<dyn EngineContext>, EngineError>;
}
