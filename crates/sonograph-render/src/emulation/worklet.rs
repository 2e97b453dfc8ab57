//! Worklet emulation: run the processor block by block in software.
//!
//! Every connected input and every param is rendered into one partial
//! context. Each input passes through a Gain (which fixes its channel count
//! and mixing) and a ChannelSplitter; each param becomes a ConstantSource
//! carrying its value, automation and param connections. A ChannelMerger
//! packs the lot into consecutive channels of the partial destination:
//!
//! ```text
//! input 0 -> Gain(c0) -> Splitter(c0) --\
//! input 1 -> Gain(c1) -> Splitter(c1) ---+-> Merger(T) -> destination(T)
//! param p -> ConstantSource ------------/
//! ```
//!
//! The processor then runs over the unpacked channels and its outputs are
//! played back into the real context.

use std::ops::Range;

use sonograph_core::{
    AudioBuffer, AutomationRate, ChannelConfig, ChannelCountMode, ChannelInterpretation,
    MAX_CHANNELS, Node, NodeKind, ParamValues, ProcessorOptions, RENDER_QUANTUM, Start,
    WorkletOptions,
};
use sonograph_engine::EngineContext;

use super::{partial_context, play_back};
use crate::session::RenderingSession;
use crate::surface::{NativePort, RenderedNode};
use crate::{ProcessorFailure, RenderError};

/// Most channels one partial context can pack.
const MAX_PACKED_CHANNELS: usize = MAX_CHANNELS;

/// Channels carried by the partial context, in packing order.
struct Packing {
    /// Channel range of every input; empty for unconnected inputs.
    inputs: Vec<Range<usize>>,
    /// Channel of every param.
    params: Vec<usize>,
    total: usize,
}

impl Packing {
    fn new(input_channels: &[usize], param_count: usize) -> Self {
        let mut next = 0;
        let inputs = input_channels
            .iter()
            .map(|&count| {
                let range = next..next + count;
                next += count;
                range
            })
            .collect();
        let params: Vec<usize> = (next..next + param_count).collect();
        let total = next + params.len();
        Self {
            inputs,
            params,
            total,
        }
    }
}

pub(super) fn emulate(
    session: &mut RenderingSession<'_>,
    facade: &Node,
    options: &WorkletOptions,
    context: &mut dyn EngineContext,
) -> Result<RenderedNode, RenderError> {
    let graph = session.graph;
    let node = facade.id();
    let edges = graph.edges_into(node)?;

    let input_channels = edges
        .iter()
        .enumerate()
        .map(|(input, connected)| {
            if connected.is_empty() {
                Ok(0)
            } else {
                graph.input_channel_count(node, input)
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    let packing = Packing::new(&input_channels, facade.params().len());
    if packing.total > MAX_PACKED_CHANNELS {
        return Err(RenderError::unavailable(
            node,
            facade.kind().node_type(),
            format!(
                "inputs and params need {} channels, at most {MAX_PACKED_CHANNELS} can be packed",
                packing.total
            ),
        ));
    }

    let packed = pack(session, facade, &packing, context)?;
    let output_channel_count = (0..options.number_of_outputs)
        .map(|o| graph.output_channel_count(node, o))
        .collect::<Result<Vec<_>, _>>()?;
    let outputs = process(
        session,
        facade,
        options,
        &packing,
        &packed,
        &output_channel_count,
    )?;

    let surface_outputs = unpack(session, outputs, &output_channel_count, context)?;
    let params = facade
        .params()
        .iter()
        .map(|&id| Ok((graph.param(id)?.name().to_string(), None)))
        .collect::<Result<Vec<_>, RenderError>>()?;

    Ok(RenderedNode {
        node,
        context: context.id(),
        native: None,
        outputs: surface_outputs,
        inputs: vec![None; options.number_of_inputs],
        params,
        guard: None,
        emulated: true,
    })
}

/// Renders every input and param into consecutive channels of one buffer.
fn pack(
    session: &mut RenderingSession<'_>,
    facade: &Node,
    packing: &Packing,
    context: &dyn EngineContext,
) -> Result<AudioBuffer, RenderError> {
    if packing.total == 0 {
        return Ok(AudioBuffer::new(1, context.length(), context.sample_rate()));
    }
    let graph = session.graph;
    let mut partial = partial_context(session, packing.total, context)?;
    let partial = partial.as_mut();
    let destination = partial.destination();
    partial.set_channel_config(destination, discrete(packing.total))?;

    let merger = session
        .create_native(
            partial,
            &NodeKind::ChannelMerger {
                inputs: packing.total,
            },
            ChannelConfig::explicit(1),
        )?
        .native;
    partial.connect(merger, 0, destination, 0)?;

    let edges = graph.edges_into(facade.id())?;
    for (range, connected) in packing.inputs.iter().zip(&edges) {
        if range.is_empty() {
            continue;
        }
        let gain = session
            .create_native(
                partial,
                &NodeKind::Gain,
                ChannelConfig {
                    count: range.len(),
                    mode: ChannelCountMode::Explicit,
                    interpretation: facade.channel_config().interpretation,
                },
            )?
            .native;
        let splitter = session
            .create_native(
                partial,
                &NodeKind::ChannelSplitter {
                    outputs: range.len(),
                },
                discrete(range.len()),
            )?
            .native;
        partial.connect(gain, 0, splitter, 0)?;
        for (output, channel) in range.clone().enumerate() {
            partial.connect(splitter, output, merger, channel)?;
        }
        for edge in connected {
            let upstream = session.render(edge.source, partial)?.output(edge.output)?;
            partial.connect(upstream.node, upstream.index, gain, 0)?;
        }
    }

    for (&param_id, &channel) in facade.params().iter().zip(&packing.params) {
        let param = graph.param(param_id)?;
        let source = session
            .create_native(partial, &NodeKind::ConstantSource, ChannelConfig::default())?
            .native;
        let offset = partial.param(source, "offset")?;
        partial.param_mut(offset)?.set_value(param.value());
        param.timeline().replay(partial.param_mut(offset)?)?;
        partial.start_source(source, Start::default())?;
        for edge in graph.param_inputs(param_id)? {
            let upstream = session.render(edge.source, partial)?.output(edge.output)?;
            partial.connect_param(upstream.node, upstream.index, offset)?;
        }
        partial.connect(source, 0, merger, channel)?;
    }

    session.cancel.check()?;
    tracing::debug!(node = %facade.id(), channels = packing.total, "worklet inputs packed");
    Ok(partial.start_rendering()?)
}

/// Runs the processor over the packed buffer; returns one channel list per
/// output, truncated to the render length.
fn process(
    session: &mut RenderingSession<'_>,
    facade: &Node,
    options: &WorkletOptions,
    packing: &Packing,
    packed: &AudioBuffer,
    output_channel_count: &[usize],
) -> Result<Vec<Vec<Vec<f32>>>, RenderError> {
    let graph = session.graph;
    let length = packed.len();
    let blocks = length.div_ceil(RENDER_QUANTUM);
    let padded = blocks * RENDER_QUANTUM;
    let pad = |samples: &[f32]| {
        let mut v = samples.to_vec();
        v.resize(padded, 0.0);
        v
    };

    let inputs: Vec<Vec<Vec<f32>>> = packing
        .inputs
        .iter()
        .map(|range| range.clone().map(|c| pad(packed.channel(c))).collect())
        .collect();
    let params = facade
        .params()
        .iter()
        .zip(&packing.params)
        .map(|(&id, &channel)| {
            let param = graph.param(id)?;
            Ok((param.name(), pad(packed.channel(channel)), param.spec()))
        })
        .collect::<Result<Vec<_>, RenderError>>()?;
    let mut outputs: Vec<Vec<Vec<f32>>> = output_channel_count
        .iter()
        .map(|&count| vec![vec![0.0; padded]; count])
        .collect();

    let mut processor = options.factory.create(&ProcessorOptions {
        name: options.name.clone(),
        sample_rate: packed.sample_rate(),
        number_of_inputs: options.number_of_inputs,
        number_of_outputs: options.number_of_outputs,
        output_channel_count: output_channel_count.to_vec(),
    });

    for block in 0..blocks {
        let range = block * RENDER_QUANTUM..(block + 1) * RENDER_QUANTUM;
        let block_inputs: Vec<Vec<&[f32]>> = inputs
            .iter()
            .map(|channels| channels.iter().map(|c| &c[range.clone()]).collect())
            .collect();
        let block_params: Vec<Vec<f32>> = params
            .iter()
            .map(|(_, values, spec)| {
                if spec.rate == AutomationRate::KRate {
                    return vec![spec.clamp(values[range.start])];
                }
                let clamped: Vec<f32> = values[range.clone()]
                    .iter()
                    .map(|&v| spec.clamp(v))
                    .collect();
                if clamped.iter().all(|&v| v == clamped[0]) {
                    vec![clamped[0]]
                } else {
                    clamped
                }
            })
            .collect();
        let mut values = ParamValues::new();
        for ((name, _, _), block_values) in params.iter().zip(&block_params) {
            values.push(name, block_values);
        }
        let mut block_outputs: Vec<Vec<&mut [f32]>> = outputs
            .iter_mut()
            .map(|channels| {
                channels
                    .iter_mut()
                    .map(|c| &mut c[range.clone()])
                    .collect()
            })
            .collect();

        match processor.process(&block_inputs, &mut block_outputs, &values) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(node = %facade.id(), block, "processor finished");
                break;
            }
            Err(error) => {
                for channel in block_outputs.iter_mut().flatten() {
                    channel.fill(0.0);
                }
                tracing::warn!(
                    node = %facade.id(),
                    processor = %options.name,
                    block,
                    %error,
                    "processor failed, node silenced"
                );
                session.failures.push(ProcessorFailure {
                    node: facade.id(),
                    processor: options.name.clone(),
                    block,
                    error,
                });
                break;
            }
        }
    }

    for channel in outputs.iter_mut().flatten() {
        channel.truncate(length);
    }
    Ok(outputs)
}

/// Plays the processor outputs back into `context`, regrouped per output.
fn unpack(
    session: &mut RenderingSession<'_>,
    outputs: Vec<Vec<Vec<f32>>>,
    output_channel_count: &[usize],
    context: &mut dyn EngineContext,
) -> Result<Vec<NativePort>, RenderError> {
    if outputs.is_empty() {
        return Ok(Vec::new());
    }
    let player = play_back(
        session,
        AudioBuffer::from_channels(
            outputs.into_iter().flatten().collect(),
            context.sample_rate(),
        ),
        context,
    )?;
    if output_channel_count.len() == 1 {
        return Ok(vec![NativePort::new(player, 0)]);
    }

    let total: usize = output_channel_count.iter().sum();
    let splitter = session
        .create_native(
            context,
            &NodeKind::ChannelSplitter { outputs: total },
            discrete(total),
        )?
        .native;
    session.connect(
        context,
        NativePort::new(player, 0),
        NativePort::new(splitter, 0),
    )?;

    let mut next = 0;
    let mut ports = Vec::with_capacity(output_channel_count.len());
    for &count in output_channel_count {
        let merger = session
            .create_native(
                context,
                &NodeKind::ChannelMerger { inputs: count },
                ChannelConfig::explicit(1),
            )?
            .native;
        for input in 0..count {
            session.connect(
                context,
                NativePort::new(splitter, next + input),
                NativePort::new(merger, input),
            )?;
        }
        next += count;
        ports.push(NativePort::new(merger, 0));
    }
    Ok(ports)
}

fn discrete(count: usize) -> ChannelConfig {
    ChannelConfig {
        count,
        mode: ChannelCountMode::Explicit,
        interpretation: ChannelInterpretation::Discrete,
    }
}
