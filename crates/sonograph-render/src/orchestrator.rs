//! Render passes.

use std::collections::HashMap;

use sonograph_core::{AudioBuffer, AudioGraph, ContextId, NodeId, NodeKind};
use sonograph_engine::{ContextOptions, ContextState, Engine, EngineContext, EngineError};

use crate::capability::{CapabilityDescriptor, probe};
use crate::session::{CancelToken, Ledger, RenderingSession};
use crate::surface::{NativePort, RenderedNode};
use crate::{ProcessorFailure, RenderError};

/// Renders audio graphs offline against one engine.
///
/// The engine is probed once, in [`OfflineRenderer::new`]; every pass reuses
/// the descriptor. Nodes rendered into a context by
/// [`render_node`](OfflineRenderer::render_node) stay rendered: later calls on
/// the same context, [`start_rendering`](OfflineRenderer::start_rendering)
/// included, reuse them instead of constructing them again.
///
/// ```
/// use sonograph_core::{AudioGraph, GraphOptions, NodeKind};
/// use sonograph_engine::SoftwareEngine;
/// use sonograph_render::OfflineRenderer;
///
/// let mut graph = AudioGraph::new(GraphOptions::default()).unwrap();
/// let source = graph.add_node(NodeKind::ConstantSource).unwrap();
/// let gain = graph.add_node(NodeKind::Gain).unwrap();
/// graph.connect(source, 0, gain, 0).unwrap();
/// graph.connect(gain, 0, graph.destination(), 0).unwrap();
/// graph.start(source, 0.0).unwrap();
/// let id = graph.param_id(gain, "gain").unwrap();
/// graph.param_mut(id).unwrap().set_value(0.5);
///
/// let mut renderer = OfflineRenderer::new(SoftwareEngine::new()).unwrap();
/// let buffer = renderer.render_graph(&graph, 5).unwrap();
/// assert_eq!(buffer.channel(0), &[0.5; 5]);
/// ```
pub struct OfflineRenderer<E: Engine> {
    engine: E,
    capabilities: CapabilityDescriptor,
    failures: Vec<ProcessorFailure>,
    ledgers: HashMap<ContextId, Ledger>,
}

impl<E: Engine> OfflineRenderer<E> {
    /// Probes `engine` and wraps it.
    ///
    /// # Errors
    ///
    /// Fails when the engine cannot create the probe context.
    pub fn new(engine: E) -> Result<Self, EngineError> {
        let capabilities = probe(&engine)?;
        Ok(Self {
            engine,
            capabilities,
            failures: Vec::new(),
            ledgers: HashMap::new(),
        })
    }

    /// Returns the wrapped engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Returns the probed capabilities.
    pub fn capabilities(&self) -> &CapabilityDescriptor {
        &self.capabilities
    }

    /// Returns the processor failures of the last pass.
    pub fn processor_errors(&self) -> &[ProcessorFailure] {
        &self.failures
    }

    /// Renders `destination` into `context` and returns the rendered buffer.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidState`] when the context already rendered, plus
    /// every error of [`RenderingSession::render`]. On error every connection
    /// the pass made is removed and every native node it created is
    /// disconnected.
    pub fn start_rendering(
        &mut self,
        graph: &AudioGraph,
        destination: NodeId,
        context: &mut dyn EngineContext,
    ) -> Result<AudioBuffer, RenderError> {
        self.start_rendering_with(graph, destination, context, &CancelToken::new())
    }

    /// Like [`start_rendering`](Self::start_rendering), observing `cancel`.
    ///
    /// # Errors
    ///
    /// [`RenderError::Cancelled`] once `cancel` is set, plus the errors of
    /// [`start_rendering`](Self::start_rendering).
    pub fn start_rendering_with(
        &mut self,
        graph: &AudioGraph,
        destination: NodeId,
        context: &mut dyn EngineContext,
        cancel: &CancelToken,
    ) -> Result<AudioBuffer, RenderError> {
        let id = context.id();
        if let Err(e) = check_idle(context) {
            self.ledgers.remove(&id);
            return Err(e);
        }
        self.failures.clear();

        let ledger = self.ledgers.remove(&id).unwrap_or_default();
        let mut session = RenderingSession::resume(
            graph,
            &self.engine,
            &self.capabilities,
            cancel.clone(),
            id,
            ledger.clone(),
        );
        let result = render_pass(&mut session, graph, destination, context);
        if result.is_err() {
            session.release(context);
            if context.state() == ContextState::Idle {
                self.ledgers.insert(id, ledger);
            }
        }
        let created = session.created.len();
        self.failures = session.into_failures();

        match &result {
            Ok(buffer) => tracing::info!(
                context = id.index(),
                frames = buffer.len(),
                channels = buffer.channel_count(),
                natives = created,
                processor_errors = self.failures.len(),
                "render pass finished"
            ),
            Err(e) => tracing::info!(
                context = id.index(),
                error = %e,
                "render pass aborted"
            ),
        }
        result
    }

    /// Renders a single node into `context` without starting the render.
    ///
    /// The node and everything upstream of it are remembered for `context`:
    /// rendering them again, directly or as part of a later pass, returns the
    /// same surfaces. Graph changes made after a node was rendered into a
    /// context are not reflected in that context.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidState`] when the context already rendered, plus
    /// every error of [`RenderingSession::render`]. On error the call's own
    /// natives and connections are undone; earlier calls are unaffected.
    pub fn render_node(
        &mut self,
        graph: &AudioGraph,
        node: NodeId,
        context: &mut dyn EngineContext,
    ) -> Result<RenderedNode, RenderError> {
        let id = context.id();
        if let Err(e) = check_idle(context) {
            self.ledgers.remove(&id);
            return Err(e);
        }

        let ledger = self.ledgers.remove(&id).unwrap_or_default();
        let mut session = RenderingSession::resume(
            graph,
            &self.engine,
            &self.capabilities,
            CancelToken::new(),
            id,
            ledger.clone(),
        );
        match session.render(node, context) {
            Ok(surface) => {
                let (ledger, failures) = session.finish(id);
                self.ledgers.insert(id, ledger);
                self.failures = failures;
                Ok(surface)
            }
            Err(e) => {
                session.release(context);
                self.ledgers.insert(id, ledger);
                self.failures = session.into_failures();
                Err(e)
            }
        }
    }

    /// Drops what earlier [`render_node`](Self::render_node) calls remembered
    /// for `context`. The natives stay connected in the context; the next
    /// call on it constructs afresh. Returns whether anything was remembered.
    pub fn forget(&mut self, context: ContextId) -> bool {
        self.ledgers.remove(&context).is_some()
    }

    /// Creates a context matching the graph's destination and renders it.
    ///
    /// # Errors
    ///
    /// Engine errors creating the context, plus the errors of
    /// [`start_rendering`](Self::start_rendering).
    pub fn render_graph(
        &mut self,
        graph: &AudioGraph,
        length: usize,
    ) -> Result<AudioBuffer, RenderError> {
        self.render_graph_with(graph, length, &CancelToken::new())
    }

    /// Like [`render_graph`](Self::render_graph), observing `cancel`.
    ///
    /// # Errors
    ///
    /// As [`render_graph`](Self::render_graph), plus
    /// [`RenderError::Cancelled`].
    pub fn render_graph_with(
        &mut self,
        graph: &AudioGraph,
        length: usize,
        cancel: &CancelToken,
    ) -> Result<AudioBuffer, RenderError> {
        let destination = graph.destination();
        let channels = graph.node(destination)?.channel_config().count;
        let mut context = self.engine.create_context(ContextOptions::new(
            channels,
            length,
            graph.sample_rate(),
        ))?;
        self.start_rendering_with(graph, destination, context.as_mut(), cancel)
    }
}

fn render_pass(
    session: &mut RenderingSession<'_>,
    graph: &AudioGraph,
    destination: NodeId,
    context: &mut dyn EngineContext,
) -> Result<AudioBuffer, RenderError> {
    let surface = session.render(destination, context)?;
    if !matches!(graph.node(destination)?.kind(), NodeKind::Destination) {
        let output = surface.output(0)?;
        let sink = NativePort::new(context.destination(), 0);
        session.connect(context, output, sink)?;
    }
    session.cancel.check()?;
    Ok(context.start_rendering()?)
}

fn check_idle(context: &dyn EngineContext) -> Result<(), RenderError> {
    if context.state() == ContextState::Idle {
        Ok(())
    } else {
        Err(RenderError::InvalidState(format!(
            "context {} already rendered",
            context.id().index()
        )))
    }
}

impl<E: Engine + core::fmt::Debug> core::fmt::Debug for OfflineRenderer<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OfflineRenderer")
            .field("engine", &self.engine)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}
