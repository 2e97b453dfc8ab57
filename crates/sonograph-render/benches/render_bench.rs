//! Criterion benchmarks for offline render passes (`sonograph-render`).
//!
//! Two axes:
//!
//! - **Construct** - rendering graphs of varying size into a context without
//!   starting the engine, which isolates walk, construction and replay cost
//! - **Pass** - full passes including the software engine, native and
//!   emulated
//!
//! Run with: `cargo bench -p sonograph-render -- render/`
#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use sonograph_core::{
    AudioGraph, AudioProcessor, GraphOptions, IirOptions, NodeId, NodeKind, NodeType,
    OscillatorOptions, ParamValues, ProcessorError, ProcessorOptions, WorkletOptions,
};
use sonograph_engine::{ContextOptions, EngineContext, EngineProfile, SoftwareEngine};
use sonograph_render::OfflineRenderer;

const SAMPLE_RATE: f32 = 48000.0;
const LENGTH: usize = 4800;
const CHAIN_LENGTHS: &[usize] = &[4, 16, 64];

// ---------------------------------------------------------------------------
// Graph constructors
// ---------------------------------------------------------------------------

fn graph() -> AudioGraph {
    AudioGraph::new(GraphOptions {
        sample_rate: SAMPLE_RATE,
        channel_count: 2,
    })
    .unwrap()
}

fn oscillator(graph: &mut AudioGraph) -> NodeId {
    let osc = graph
        .add_node(NodeKind::Oscillator(OscillatorOptions::default()))
        .unwrap();
    graph.start(osc, 0.0).unwrap();
    osc
}

/// Oscillator through `n` gains, each with a short ramp.
fn make_chain(n: usize) -> AudioGraph {
    let mut graph = graph();
    let mut prev = oscillator(&mut graph);
    for i in 0..n {
        let gain = graph.add_node(NodeKind::Gain).unwrap();
        let level = graph.param_id(gain, "gain").unwrap();
        graph
            .param_mut(level)
            .unwrap()
            .set_value_at_time(1.0, 0.0)
            .unwrap()
            .linear_ramp_to_value_at_time(0.99, 0.01 * (i + 1) as f64)
            .unwrap();
        graph.connect(prev, 0, gain, 0).unwrap();
        prev = gain;
    }
    graph.connect(prev, 0, graph.destination(), 0).unwrap();
    graph
}

fn make_iir() -> AudioGraph {
    let mut graph = graph();
    let osc = oscillator(&mut graph);
    let filter = graph
        .add_node(NodeKind::IirFilter(IirOptions {
            feedforward: vec![0.0675, 0.1349, 0.0675],
            feedback: vec![1.0, -1.1430, 0.4128],
        }))
        .unwrap();
    graph.connect(osc, 0, filter, 0).unwrap();
    graph.connect(filter, 0, graph.destination(), 0).unwrap();
    graph
}

/// Halves its input.
struct Halve;

impl AudioProcessor for Halve {
    fn process(
        &mut self,
        inputs: &[Vec<&[f32]>],
        outputs: &mut [Vec<&mut [f32]>],
        _parameters: &ParamValues<'_>,
    ) -> Result<bool, ProcessorError> {
        for (input, output) in inputs[0].iter().zip(outputs[0].iter_mut()) {
            for (x, y) in input.iter().zip(output.iter_mut()) {
                *y = x * 0.5;
            }
        }
        Ok(true)
    }
}

fn make_worklet() -> AudioGraph {
    let mut graph = graph();
    let osc = oscillator(&mut graph);
    let node = graph
        .add_node(NodeKind::Worklet(WorkletOptions::new(
            "halve",
            Arc::new(|_: &ProcessorOptions| Box::new(Halve) as Box<dyn AudioProcessor>),
        )))
        .unwrap();
    graph.connect(osc, 0, node, 0).unwrap();
    graph.connect(node, 0, graph.destination(), 0).unwrap();
    graph
}

// ---------------------------------------------------------------------------
// Construct benchmarks
// ---------------------------------------------------------------------------

fn bench_construct(c: &mut Criterion) {
    let mut group = c.benchmark_group("render/construct");
    let engine = SoftwareEngine::new();
    let mut renderer = OfflineRenderer::new(SoftwareEngine::new()).unwrap();

    for &n in CHAIN_LENGTHS {
        let graph = make_chain(n);
        group.bench_with_input(BenchmarkId::new("chain", n), &graph, |b, graph| {
            b.iter(|| {
                let mut ctx = engine
                    .context(ContextOptions::new(2, LENGTH, SAMPLE_RATE))
                    .unwrap();
                black_box(
                    renderer
                        .render_node(graph, graph.destination(), &mut ctx)
                        .unwrap(),
                );
                renderer.forget(ctx.id());
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Full passes - 100 ms at 48 kHz
// ---------------------------------------------------------------------------

fn bench_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("render/pass");

    {
        let mut renderer = OfflineRenderer::new(SoftwareEngine::new()).unwrap();
        let graph = make_chain(16);
        group.bench_function("chain_16", |b| {
            b.iter(|| black_box(renderer.render_graph(&graph, LENGTH).unwrap()));
        });
    }

    {
        let graph = make_iir();
        let mut native = OfflineRenderer::new(SoftwareEngine::new()).unwrap();
        let mut emulated = OfflineRenderer::new(SoftwareEngine::with_profile(EngineProfile {
            unsupported: vec![NodeType::IirFilter],
            ..EngineProfile::default()
        }))
        .unwrap();
        group.bench_function("iir_native", |b| {
            b.iter(|| black_box(native.render_graph(&graph, LENGTH).unwrap()));
        });
        group.bench_function("iir_emulated", |b| {
            b.iter(|| black_box(emulated.render_graph(&graph, LENGTH).unwrap()));
        });
    }

    {
        let mut renderer = OfflineRenderer::new(SoftwareEngine::new()).unwrap();
        let graph = make_worklet();
        group.bench_function("worklet_emulated", |b| {
            b.iter(|| black_box(renderer.render_graph(&graph, LENGTH).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_construct, bench_pass);
criterion_main!(benches);
