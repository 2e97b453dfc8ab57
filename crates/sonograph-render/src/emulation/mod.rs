//! Software emulation of primitives the engine lacks.
//!
//! Emulated nodes render their upstream into a disposable partial context,
//! process the result in software and play it back into the real context
//! through a buffer source. The surface they return has the same outputs and
//! params as a native node; its inputs are `None` because upstream was
//! already consumed by the partial context.

mod iir;
mod worklet;

use std::sync::Arc;

use sonograph_core::{
    AudioBuffer, BufferSourceOptions, ChannelConfig, ChannelCountMode, NativeNodeId, Node, NodeKind,
    Start,
};
use sonograph_engine::{ContextOptions, EngineContext};

use crate::RenderError;
use crate::session::RenderingSession;
use crate::surface::RenderedNode;

/// Builds the substitute surface for an emulated node.
pub(crate) fn emulate(
    session: &mut RenderingSession<'_>,
    facade: &Node,
    context: &mut dyn EngineContext,
) -> Result<RenderedNode, RenderError> {
    match facade.kind() {
        NodeKind::IirFilter(options) => iir::emulate(session, facade, options, context),
        NodeKind::Worklet(options) => worklet::emulate(session, facade, options, context),
        other => Err(RenderError::unavailable(
            facade.id(),
            other.node_type(),
            "no software emulation exists for this type",
        )),
    }
}

/// Creates a partial context with the real context's length and rate.
fn partial_context(
    session: &RenderingSession<'_>,
    channels: usize,
    context: &dyn EngineContext,
) -> Result<Box<dyn EngineContext>, RenderError> {
    let options = ContextOptions::new(channels, context.length(), context.sample_rate());
    Ok(session.engine.create_context(options)?)
}

/// Renders everything feeding `input` of `facade` into a fresh partial
/// context of `channels` channels, mixed the way the node's own input would
/// mix it.
fn render_input(
    session: &mut RenderingSession<'_>,
    facade: &Node,
    input: usize,
    channels: usize,
    context: &dyn EngineContext,
) -> Result<AudioBuffer, RenderError> {
    let edges = session
        .graph
        .edges_into(facade.id())?
        .into_iter()
        .nth(input)
        .unwrap_or_default();
    if edges.is_empty() {
        return Ok(AudioBuffer::new(
            channels,
            context.length(),
            context.sample_rate(),
        ));
    }

    let mut partial = partial_context(session, channels, context)?;
    let destination = partial.destination();
    partial.set_channel_config(
        destination,
        ChannelConfig {
            count: channels,
            mode: ChannelCountMode::Explicit,
            interpretation: facade.channel_config().interpretation,
        },
    )?;
    for edge in edges {
        let upstream = session.render(edge.source, partial.as_mut())?.output(edge.output)?;
        partial.connect(upstream.node, upstream.index, destination, 0)?;
    }
    session.cancel.check()?;
    tracing::debug!(node = %facade.id(), input, channels, "partial context rendering");
    Ok(partial.start_rendering()?)
}

/// Plays `buffer` into `context` from time zero and returns the player.
fn play_back(
    session: &mut RenderingSession<'_>,
    buffer: AudioBuffer,
    context: &mut dyn EngineContext,
) -> Result<NativeNodeId, RenderError> {
    let channels = buffer.channel_count().max(1);
    let kind = NodeKind::BufferSource(BufferSourceOptions {
        buffer: Some(Arc::new(buffer)),
        ..BufferSourceOptions::default()
    });
    let player = session
        .create_native(context, &kind, ChannelConfig::explicit(channels))?
        .native;
    context.start_source(player, Start::default())?;
    Ok(player)
}
