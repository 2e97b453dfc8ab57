//! IIR filter emulation: filter the rendered input in software.

use sonograph_core::dsp::IirFilter;
use sonograph_core::{AudioBuffer, IirOptions, Node};
use sonograph_engine::EngineContext;

use super::{play_back, render_input};
use crate::RenderError;
use crate::session::RenderingSession;
use crate::surface::{NativePort, RenderedNode};

pub(super) fn emulate(
    session: &mut RenderingSession<'_>,
    facade: &Node,
    options: &IirOptions,
    context: &mut dyn EngineContext,
) -> Result<RenderedNode, RenderError> {
    let channels = session.graph.input_channel_count(facade.id(), 0)?.max(1);
    let input = render_input(session, facade, 0, channels, context)?;
    let sample_rate = input.sample_rate();

    let filtered: Vec<Vec<f32>> = input
        .into_channels()
        .into_iter()
        .map(|mut samples| {
            IirFilter::new(&options.feedforward, &options.feedback).process_slice(&mut samples);
            samples
        })
        .collect();
    let player = play_back(
        session,
        AudioBuffer::from_channels(filtered, sample_rate),
        context,
    )?;

    Ok(RenderedNode {
        node: facade.id(),
        context: context.id(),
        native: None,
        outputs: vec![NativePort::new(player, 0)],
        inputs: vec![None],
        params: Vec::new(),
        guard: None,
        emulated: true,
    })
}

#[cfg(test)]
mod tests {
    use sonograph_core::{AudioGraph, GraphOptions, IirOptions, NodeKind, NodeType};
    use sonograph_engine::{EngineProfile, SoftwareEngine};

    use crate::{OfflineRenderer, RenderError};

    fn engine_without_iir() -> SoftwareEngine {
        SoftwareEngine::with_profile(EngineProfile {
            unsupported: vec![NodeType::IirFilter],
            ..EngineProfile::default()
        })
    }

    #[test]
    fn one_pole_lowpass_settles_on_dc() {
        let mut graph = AudioGraph::new(GraphOptions {
            sample_rate: 8000.0,
            channel_count: 1,
        })
        .unwrap();
        let dc = graph.add_node(NodeKind::ConstantSource).unwrap();
        graph.start(dc, 0.0).unwrap();
        let filter = graph
            .add_node(NodeKind::IirFilter(IirOptions {
                feedforward: vec![0.5],
                feedback: vec![1.0, -0.5],
            }))
            .unwrap();
        graph.connect(dc, 0, filter, 0).unwrap();
        graph.connect(filter, 0, graph.destination(), 0).unwrap();

        let mut renderer = OfflineRenderer::new(engine_without_iir()).unwrap();
        let out = renderer.render_graph(&graph, 64).unwrap();
        let samples = out.channel(0);
        assert!((samples[0] - 0.5).abs() < 1e-6);
        assert!((samples[1] - 0.75).abs() < 1e-6);
        assert!((samples[63] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn iir_on_a_feedback_loop_is_unavailable() {
        let mut graph = AudioGraph::new(GraphOptions {
            sample_rate: 8000.0,
            channel_count: 1,
        })
        .unwrap();
        let filter = graph
            .add_node(NodeKind::IirFilter(IirOptions {
                feedforward: vec![1.0],
                feedback: vec![1.0],
            }))
            .unwrap();
        let delay = graph
            .add_node(NodeKind::Delay(Default::default()))
            .unwrap();
        graph.connect(filter, 0, delay, 0).unwrap();
        graph.connect(delay, 0, filter, 0).unwrap();
        graph.connect(filter, 0, graph.destination(), 0).unwrap();

        let mut renderer = OfflineRenderer::new(engine_without_iir()).unwrap();
        let err = renderer.render_graph(&graph, 16).unwrap_err();
        assert!(matches!(
            err,
            RenderError::CapabilityUnavailable {
                node_type: NodeType::IirFilter,
                ..
            }
        ));
    }
}
