//! Rendered node surfaces.
//!
//! A [`RenderedNode`] maps a graph node's ports and params onto native
//! objects of one context. Native and emulated nodes expose the same shape,
//! so the renderer wires both the same way.

use sonograph_core::{ChannelConfig, ContextId, NativeNodeId, NativeParamId, NodeId};
use sonograph_engine::EngineContext;

use crate::RenderError;

/// A native port: node plus output or input index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NativePort {
    /// Native node.
    pub node: NativeNodeId,
    /// Port index on that node.
    pub index: usize,
}

impl NativePort {
    /// Creates a port.
    pub fn new(node: NativeNodeId, index: usize) -> Self {
        Self { node, index }
    }
}

/// The native face of a rendered node.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedNode {
    pub(crate) node: NodeId,
    pub(crate) context: ContextId,
    /// The native node carrying the node's layout, when there is one.
    pub(crate) native: Option<NativeNodeId>,
    pub(crate) outputs: Vec<NativePort>,
    /// `None` when an emulation already consumed the input upstream.
    pub(crate) inputs: Vec<Option<NativePort>>,
    pub(crate) params: Vec<(String, Option<NativeParamId>)>,
    /// Layout a patched primitive must keep.
    pub(crate) guard: Option<ChannelConfig>,
    pub(crate) emulated: bool,
}

impl RenderedNode {
    /// Returns the graph node this surface renders.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Returns the context the surface lives in.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Returns the native node, unless the node is emulated.
    pub fn native(&self) -> Option<NativeNodeId> {
        self.native
    }

    /// Returns whether the node was built by emulation.
    pub fn is_emulated(&self) -> bool {
        self.emulated
    }

    /// Returns the native port of `output`.
    pub fn output(&self, output: usize) -> Result<NativePort, RenderError> {
        self.outputs.get(output).copied().ok_or_else(|| {
            RenderError::InvalidState(format!(
                "{} has no rendered output {output}",
                self.node
            ))
        })
    }

    /// Returns the native port of `input`, if it is wired in this context.
    pub fn input(&self, input: usize) -> Option<NativePort> {
        self.inputs.get(input).copied().flatten()
    }

    /// Returns the native param standing for the named param, if any.
    pub fn param(&self, name: &str) -> Option<NativeParamId> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, id)| *id)
    }

    /// Returns the number of outputs.
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Returns the guarded layout of a patched primitive.
    pub fn guarded_layout(&self) -> Option<ChannelConfig> {
        self.guard
    }

    /// Rewrites the native node's channel layout.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidState`] when the surface is emulated, belongs to
    /// another context, or guards a layout that `config` diverges from.
    pub fn set_channel_config(
        &self,
        context: &mut dyn EngineContext,
        config: ChannelConfig,
    ) -> Result<(), RenderError> {
        if context.id() != self.context {
            return Err(RenderError::InvalidState(format!(
                "{} was rendered for another context",
                self.node
            )));
        }
        let Some(native) = self.native else {
            return Err(RenderError::InvalidState(format!(
                "{} is emulated and has a fixed layout",
                self.node
            )));
        };
        if let Some(required) = self.guard.filter(|required| *required != config) {
            return Err(RenderError::InvalidState(format!(
                "{} must keep channel layout {required:?}",
                self.node
            )));
        }
        context.set_channel_config(native, config)?;
        Ok(())
    }
}
