//! Per-pass rendering state.
//!
//! A [`RenderingSession`] lives for one render call. Its memo arena holds at
//! most one entry per (node, context) pair, which is what makes every node
//! render exactly once per context however many consumers reach it. The
//! surfaces a call leaves in its target context are handed back as a
//! [`Ledger`] and seed the next call on that context.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sonograph_core::{AudioGraph, ContextId, NativeNodeId, NativeParamId, NodeId};
use sonograph_engine::{Engine, EngineContext};

use crate::surface::{NativePort, RenderedNode};
use crate::{CapabilityDescriptor, ProcessorFailure, RenderError};

/// Cooperative cancellation flag, shareable across threads.
///
/// Once cancelled, a pass starts no further construction and fails with
/// [`RenderError::Cancelled`].
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self) -> Result<(), RenderError> {
        if self.is_cancelled() {
            Err(RenderError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Memo entry of one (node, context) pair.
#[derive(Debug)]
pub(crate) enum Memo {
    /// Emulation running; no native exists yet.
    Pending,
    /// Constructed; inputs still being connected.
    InFlight(RenderedNode),
    /// Fully wired.
    Ready(RenderedNode),
}

/// Surfaces already wired into one context, keyed by graph node.
pub(crate) type Ledger = HashMap<NodeId, RenderedNode>;

/// A connection made by the session.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Wire {
    Node { from: NativePort, to: NativePort },
    Param { from: NativePort, to: NativeParamId },
}

/// State of one render call.
pub struct RenderingSession<'a> {
    pub(crate) graph: &'a AudioGraph,
    pub(crate) engine: &'a dyn Engine,
    pub(crate) capabilities: &'a CapabilityDescriptor,
    pub(crate) cancel: CancelToken,
    pub(crate) memo: HashMap<(NodeId, ContextId), Memo>,
    /// Nodes whose emulation is running, in any context.
    pub(crate) emulating: Vec<NodeId>,
    /// Natives constructed by this session.
    pub(crate) created: Vec<(ContextId, NativeNodeId)>,
    /// New connections made by this session, in order.
    wires: Vec<(ContextId, Wire)>,
    pub(crate) failures: Vec<ProcessorFailure>,
}

impl<'a> RenderingSession<'a> {
    /// Creates an empty session.
    pub fn new(
        graph: &'a AudioGraph,
        engine: &'a dyn Engine,
        capabilities: &'a CapabilityDescriptor,
        cancel: CancelToken,
    ) -> Self {
        Self {
            graph,
            engine,
            capabilities,
            cancel,
            memo: HashMap::new(),
            emulating: Vec::new(),
            created: Vec::new(),
            wires: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Creates a session that treats every surface of `ledger` as already
    /// rendered into `context`.
    pub(crate) fn resume(
        graph: &'a AudioGraph,
        engine: &'a dyn Engine,
        capabilities: &'a CapabilityDescriptor,
        cancel: CancelToken,
        context: ContextId,
        ledger: Ledger,
    ) -> Self {
        let mut session = Self::new(graph, engine, capabilities, cancel);
        session.memo.extend(
            ledger
                .into_iter()
                .map(|(node, surface)| ((node, context), Memo::Ready(surface))),
        );
        session
    }

    /// Returns the surface already rendered for `node` in `context`.
    pub fn surface(&self, node: NodeId, context: ContextId) -> Option<&RenderedNode> {
        match self.memo.get(&(node, context))? {
            Memo::InFlight(surface) | Memo::Ready(surface) => Some(surface),
            Memo::Pending => None,
        }
    }

    /// Returns the natives constructed so far in `context`.
    pub fn created_in(&self, context: ContextId) -> impl Iterator<Item = NativeNodeId> + '_ {
        self.created
            .iter()
            .filter(move |(c, _)| *c == context)
            .map(|(_, n)| *n)
    }

    /// Returns the processor failures recorded so far.
    pub fn failures(&self) -> &[ProcessorFailure] {
        &self.failures
    }

    /// Connects two native ports, remembering the connection if it is new.
    pub(crate) fn connect(
        &mut self,
        context: &mut dyn EngineContext,
        from: NativePort,
        to: NativePort,
    ) -> Result<(), RenderError> {
        if context.connect(from.node, from.index, to.node, to.index)? {
            self.wires.push((context.id(), Wire::Node { from, to }));
        }
        Ok(())
    }

    /// Connects a native port to a native param, remembering the connection
    /// if it is new.
    pub(crate) fn connect_param(
        &mut self,
        context: &mut dyn EngineContext,
        from: NativePort,
        to: NativeParamId,
    ) -> Result<(), RenderError> {
        if context.connect_param(from.node, from.index, to)? {
            self.wires.push((context.id(), Wire::Param { from, to }));
        }
        Ok(())
    }

    /// Undoes what the session did to `context`: every connection it made
    /// is removed, newest first, and every native it constructed is
    /// disconnected. Connections that existed before the session, including
    /// those between natives the application bound, are left alone.
    pub fn release(&self, context: &mut dyn EngineContext) {
        let id = context.id();
        let mut unwired = 0;
        for (_, wire) in self.wires.iter().rev().filter(|(c, _)| *c == id) {
            let result = match *wire {
                Wire::Node { from, to } => {
                    context.disconnect_from(from.node, from.index, to.node, to.index)
                }
                Wire::Param { from, to } => context.disconnect_param(from.node, from.index, to),
            };
            match result {
                Ok(true) => unwired += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(?wire, error = %e, "unwiring failed"),
            }
        }
        let mut released = 0;
        for native in self.created_in(id) {
            match context.disconnect(native) {
                Ok(()) => released += 1,
                Err(e) => tracing::warn!(node = %native, error = %e, "release failed"),
            }
        }
        tracing::debug!(context = id.index(), unwired, released, "released session natives");
    }

    /// Splits the session into the ledger of `context` and its processor
    /// failures.
    pub(crate) fn finish(self, context: ContextId) -> (Ledger, Vec<ProcessorFailure>) {
        let ledger = self
            .memo
            .into_iter()
            .filter_map(|((node, c), memo)| match memo {
                Memo::Ready(surface) if c == context => Some((node, surface)),
                _ => None,
            })
            .collect();
        (ledger, self.failures)
    }

    pub(crate) fn into_failures(self) -> Vec<ProcessorFailure> {
        self.failures
    }
}
