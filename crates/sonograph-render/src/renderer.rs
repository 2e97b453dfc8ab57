//! Per-node rendering.
//!
//! [`RenderingSession::render`] materializes one graph node in one context,
//! recursing upstream depth-first so that a node's inputs and params are
//! fully connected before it is handed to its consumer.

use sonograph_core::{ChannelConfig, NativeBinding, NativeNodeId, Node, NodeId, NodeKind};
use sonograph_engine::EngineContext;

use crate::capability::{Capability, Patch};
use crate::emulation;
use crate::session::{Memo, RenderingSession};
use crate::surface::{NativePort, RenderedNode};
use crate::RenderError;

/// A native constructed for a graph node or an emulation helper.
pub(crate) struct Constructed {
    pub native: NativeNodeId,
    pub guard: Option<ChannelConfig>,
}

impl RenderingSession<'_> {
    /// Renders `node` into `context` and returns its surface.
    ///
    /// Repeated calls for the same pair return the memoized surface.
    ///
    /// # Errors
    ///
    /// [`RenderError::CapabilityUnavailable`] when the engine can provide
    /// the node neither natively nor by emulation, or when an emulated node
    /// sits on a feedback loop; [`RenderError::Cancelled`] once the session's
    /// token is set; engine, graph and replay errors otherwise.
    pub fn render(
        &mut self,
        node: NodeId,
        context: &mut dyn EngineContext,
    ) -> Result<RenderedNode, RenderError> {
        let key = (node, context.id());
        let graph = self.graph;
        let facade = graph.node(node)?;
        match self.memo.get(&key) {
            Some(Memo::InFlight(surface) | Memo::Ready(surface)) => return Ok(surface.clone()),
            Some(Memo::Pending) => {
                return Err(emulated_on_loop(facade));
            }
            None => {}
        }
        if self.emulating.contains(&node) {
            return Err(emulated_on_loop(facade));
        }
        self.cancel.check()?;

        if matches!(facade.kind(), NodeKind::Destination) {
            let surface = RenderedNode {
                node,
                context: key.1,
                native: Some(context.destination()),
                outputs: Vec::new(),
                inputs: vec![Some(NativePort::new(context.destination(), 0))],
                params: Vec::new(),
                guard: None,
                emulated: false,
            };
            return self.wire(facade, surface, context);
        }

        if let Some(binding) = facade.binding().filter(|b| b.context == key.1) {
            tracing::debug!(%node, native = %binding.node, "reusing bound native");
            let surface = native_surface(facade, binding, context)?;
            return self.wire(facade, surface, context);
        }

        let node_type = facade.kind().node_type();
        let capabilities = self.capabilities;
        match capabilities.get(node_type) {
            Capability::Native | Capability::Patched { .. } => {
                let surface = self.construct(facade, context)?;
                self.wire(facade, surface, context)
            }
            Capability::Emulated => {
                self.memo.insert(key, Memo::Pending);
                self.emulating.push(node);
                let result = emulation::emulate(self, facade, context);
                self.emulating.retain(|n| *n != node);
                match result {
                    Ok(surface) => {
                        tracing::debug!(%node, %node_type, "emulated");
                        self.memo.insert(key, Memo::Ready(surface.clone()));
                        Ok(surface)
                    }
                    Err(e) => {
                        self.memo.remove(&key);
                        Err(e)
                    }
                }
            }
            Capability::Unavailable { reason } => {
                Err(RenderError::unavailable(node, node_type, reason.clone()))
            }
        }
    }

    /// Constructs a native of `kind` and applies the probed patches.
    pub(crate) fn create_native(
        &mut self,
        context: &mut dyn EngineContext,
        kind: &NodeKind,
        channel: ChannelConfig,
    ) -> Result<Constructed, RenderError> {
        self.cancel.check()?;
        let native = context.create_node(kind, channel)?;
        self.created.push((context.id(), native));

        let mut guard = None;
        if let Capability::Patched { patches } = self.capabilities.get(kind.node_type()) {
            for patch in patches {
                match patch {
                    Patch::ParamDefault { param, value } => {
                        let id = context.param(native, param)?;
                        context.param_mut(id)?.set_value(*value);
                    }
                    Patch::ChannelLayout { .. } => {
                        context.set_channel_config(native, channel)?;
                        guard = Some(channel);
                    }
                }
                tracing::debug!(node = %native, ?patch, "patch applied");
            }
        }
        Ok(Constructed { native, guard })
    }

    /// Builds a fresh native for `facade`: construction, patches, param
    /// values, automation replay and lifecycle.
    fn construct(
        &mut self,
        facade: &Node,
        context: &mut dyn EngineContext,
    ) -> Result<RenderedNode, RenderError> {
        let graph = self.graph;
        let Constructed { native, guard } =
            self.create_native(context, facade.kind(), facade.channel_config())?;

        for &param_id in facade.params() {
            let param = graph.param(param_id)?;
            let target = context.param(native, param.name())?;
            if param.value() != param.spec().default {
                context.param_mut(target)?.set_value(param.value());
            }
            param.timeline().replay(context.param_mut(target)?)?;
        }

        let lifecycle = facade.lifecycle();
        if let Some(start) = lifecycle.start {
            context.start_source(native, start)?;
        }
        if let Some(stop) = lifecycle.stop {
            context.stop_source(native, stop)?;
        }

        tracing::debug!(
            node = %facade.id(),
            %native,
            node_type = %facade.kind().node_type(),
            "constructed"
        );
        let mut surface = native_surface(
            facade,
            NativeBinding {
                context: context.id(),
                node: native,
            },
            context,
        )?;
        surface.guard = guard;
        Ok(surface)
    }

    /// Marks the surface in flight, renders and connects everything feeding
    /// it, then marks it ready.
    fn wire(
        &mut self,
        facade: &Node,
        surface: RenderedNode,
        context: &mut dyn EngineContext,
    ) -> Result<RenderedNode, RenderError> {
        let key = (facade.id(), surface.context);
        self.memo.insert(key, Memo::InFlight(surface.clone()));

        let result = self.connect_upstream(facade, &surface, context);
        match result {
            Ok(()) => {
                self.memo.insert(key, Memo::Ready(surface.clone()));
                Ok(surface)
            }
            Err(e) => {
                self.memo.remove(&key);
                Err(e)
            }
        }
    }

    fn connect_upstream(
        &mut self,
        facade: &Node,
        surface: &RenderedNode,
        context: &mut dyn EngineContext,
    ) -> Result<(), RenderError> {
        let graph = self.graph;
        for (input, edges) in graph.edges_into(facade.id())?.iter().enumerate() {
            let Some(port) = surface.input(input) else {
                continue;
            };
            for edge in edges {
                let upstream = self.render(edge.source, context)?.output(edge.output)?;
                self.connect(context, upstream, port)?;
            }
        }
        for &param_id in facade.params() {
            let param = graph.param(param_id)?;
            let Some(target) = surface.param(param.name()) else {
                continue;
            };
            for edge in graph.param_inputs(param_id)? {
                let upstream = self.render(edge.source, context)?.output(edge.output)?;
                self.connect_param(context, upstream, target)?;
            }
        }
        Ok(())
    }
}

/// Surface of a node rendered by a single native of the same shape.
fn native_surface(
    facade: &Node,
    binding: NativeBinding,
    context: &dyn EngineContext,
) -> Result<RenderedNode, RenderError> {
    let traits = facade.traits();
    let native = binding.node;
    let params = facade
        .kind()
        .param_specs(context.sample_rate())
        .into_iter()
        .map(|spec| {
            let id = context.param(native, &spec.name)?;
            Ok((spec.name, Some(id)))
        })
        .collect::<Result<Vec<_>, RenderError>>()?;
    Ok(RenderedNode {
        node: facade.id(),
        context: binding.context,
        native: Some(native),
        outputs: (0..traits.outputs)
            .map(|o| NativePort::new(native, o))
            .collect(),
        inputs: (0..traits.inputs)
            .map(|i| Some(NativePort::new(native, i)))
            .collect(),
        params,
        guard: None,
        emulated: false,
    })
}

fn emulated_on_loop(facade: &Node) -> RenderError {
    RenderError::unavailable(
        facade.id(),
        facade.kind().node_type(),
        "emulated nodes cannot sit on a feedback loop",
    )
}
