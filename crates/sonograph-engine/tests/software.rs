//! Integration tests for the software engine.
//!
//! Renders small hand-wired native graphs and checks samples directly.

use std::sync::Arc;

use sonograph_core::{
    AudioBuffer, AutomationTarget, BiquadOptions, BufferSourceOptions, ChannelConfig, DelayOptions,
    IirOptions, NodeKind, NodeType, OscillatorOptions, Start, Waveform,
};
use sonograph_engine::{
    ContextOptions, ContextState, Engine, EngineContext, EngineError, EngineProfile, Quirk,
    SoftwareContext, SoftwareEngine,
};

fn mono(length: usize) -> SoftwareContext {
    SoftwareEngine::new()
        .context(ContextOptions::new(1, length, 44100.0))
        .unwrap()
}

fn node(ctx: &mut SoftwareContext, kind: NodeKind) -> sonograph_core::NativeNodeId {
    ctx.create_node(&kind, kind.default_channel_config(ctx.channel_count()))
        .unwrap()
}

fn started_constant(ctx: &mut SoftwareContext, offset: f32) -> sonograph_core::NativeNodeId {
    let source = node(ctx, NodeKind::ConstantSource);
    let param = ctx.param(source, "offset").unwrap();
    ctx.param_mut(param).unwrap().set_value(offset);
    ctx.start_source(source, Start::default()).unwrap();
    source
}

#[test]
fn constant_through_half_gain() {
    let mut ctx = mono(5);
    let source = started_constant(&mut ctx, 1.0);
    let gain = node(&mut ctx, NodeKind::Gain);
    let level = ctx.param(gain, "gain").unwrap();
    ctx.param_mut(level).unwrap().set_value(0.5);
    ctx.connect(source, 0, gain, 0).unwrap();
    ctx.connect(gain, 0, ctx.destination(), 0).unwrap();

    let buffer = ctx.start_rendering().unwrap();
    assert_eq!(buffer.channel(0), &[0.5; 5]);
    assert_eq!(ctx.state(), ContextState::Closed);
}

#[test]
fn second_render_is_invalid_state() {
    let mut ctx = mono(8);
    ctx.start_rendering().unwrap();
    assert!(matches!(
        ctx.start_rendering(),
        Err(EngineError::InvalidState(_))
    ));
    assert!(matches!(
        ctx.create_node(&NodeKind::Gain, ChannelConfig::default()),
        Err(EngineError::InvalidState(_))
    ));
}

#[test]
fn feedback_through_one_sample_delay_stays_bounded() {
    let mut ctx = mono(2000);
    let source = started_constant(&mut ctx, 1.0);
    ctx.stop_source(source, 1.0 / 44100.0).unwrap();
    let gain = node(&mut ctx, NodeKind::Gain);
    let delay = node(&mut ctx, NodeKind::Delay(DelayOptions::default()));
    ctx.param_mut(ctx.param(gain, "gain").unwrap())
        .unwrap()
        .set_value(0.5);
    // Zero is clamped up to one frame inside a loop.
    ctx.param_mut(ctx.param(delay, "delayTime").unwrap())
        .unwrap()
        .set_value(0.0);

    ctx.connect(source, 0, gain, 0).unwrap();
    ctx.connect(gain, 0, delay, 0).unwrap();
    ctx.connect(delay, 0, gain, 0).unwrap();
    ctx.connect(gain, 0, ctx.destination(), 0).unwrap();

    let buffer = ctx.start_rendering().unwrap();
    let out = buffer.channel(0);
    // An impulse decaying by half every frame.
    assert_eq!(&out[..4], &[0.5, 0.25, 0.125, 0.0625]);
    assert!(out.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
}

#[test]
fn delay_outside_a_loop_shifts_by_whole_frames() {
    let mut ctx = mono(300);
    let source = started_constant(&mut ctx, 1.0);
    let delay = node(&mut ctx, NodeKind::Delay(DelayOptions::default()));
    ctx.param_mut(ctx.param(delay, "delayTime").unwrap())
        .unwrap()
        .set_value(200.0 / 44100.0);
    ctx.connect(source, 0, delay, 0).unwrap();
    ctx.connect(delay, 0, ctx.destination(), 0).unwrap();

    let buffer = ctx.start_rendering().unwrap();
    let out = buffer.channel(0);
    assert!(out[..199].iter().all(|s| *s == 0.0));
    assert!(out[201..].iter().all(|s| (*s - 1.0).abs() < 1e-6));
}

#[test]
fn linear_ramp_is_sampled_per_frame() {
    let mut ctx = mono(4410);
    let source = node(&mut ctx, NodeKind::ConstantSource);
    let offset = ctx.param(source, "offset").unwrap();
    let target = ctx.param_mut(offset).unwrap();
    target.set_value_at_time(0.0, 0.0).unwrap();
    target.linear_ramp_to_value_at_time(1.0, 0.1).unwrap();
    ctx.start_source(source, Start::default()).unwrap();
    ctx.connect(source, 0, ctx.destination(), 0).unwrap();

    let buffer = ctx.start_rendering().unwrap();
    let out = buffer.channel(0);
    assert_eq!(out[0], 0.0);
    assert!((out[2205] - 0.5).abs() < 1e-4);
    assert!(out.windows(2).all(|w| w[1] >= w[0]));
}

#[test]
fn signal_into_param_adds_to_its_value() {
    let mut ctx = mono(16);
    let carrier = started_constant(&mut ctx, 1.0);
    let modulator = started_constant(&mut ctx, 0.25);
    let gain = node(&mut ctx, NodeKind::Gain);
    let level = ctx.param(gain, "gain").unwrap();
    ctx.param_mut(level).unwrap().set_value(0.5);
    ctx.connect(carrier, 0, gain, 0).unwrap();
    ctx.connect_param(modulator, 0, level).unwrap();
    ctx.connect(gain, 0, ctx.destination(), 0).unwrap();

    let buffer = ctx.start_rendering().unwrap();
    assert!(buffer.channel(0).iter().all(|s| (*s - 0.75).abs() < 1e-6));
}

#[test]
fn sources_respect_start_and_stop() {
    let mut ctx = mono(441);
    let source = node(&mut ctx, NodeKind::ConstantSource);
    ctx.start_source(
        source,
        Start {
            when: 0.001,
            ..Start::default()
        },
    )
    .unwrap();
    ctx.stop_source(source, 0.005).unwrap();
    ctx.connect(source, 0, ctx.destination(), 0).unwrap();

    let out = ctx.start_rendering().unwrap().into_channels().remove(0);
    let sounding: Vec<usize> = (0..out.len()).filter(|i| out[*i] != 0.0).collect();
    assert_eq!(sounding.first(), Some(&45));
    assert_eq!(sounding.last(), Some(&220));
}

#[test]
fn lifecycle_misuse_is_rejected() {
    let mut ctx = mono(8);
    let source = node(&mut ctx, NodeKind::ConstantSource);
    let gain = node(&mut ctx, NodeKind::Gain);
    assert!(matches!(
        ctx.stop_source(source, 0.0),
        Err(EngineError::InvalidState(_))
    ));
    assert!(matches!(
        ctx.start_source(gain, Start::default()),
        Err(EngineError::InvalidState(_))
    ));
    ctx.start_source(source, Start::default()).unwrap();
    assert!(matches!(
        ctx.start_source(source, Start::default()),
        Err(EngineError::InvalidState(_))
    ));
}

#[test]
fn oscillator_square_alternates() {
    let mut ctx = mono(100);
    let osc = node(
        &mut ctx,
        NodeKind::Oscillator(OscillatorOptions {
            waveform: Waveform::Square,
        }),
    );
    ctx.param_mut(ctx.param(osc, "frequency").unwrap())
        .unwrap()
        .set_value(441.0);
    ctx.start_source(osc, Start::default()).unwrap();
    ctx.connect(osc, 0, ctx.destination(), 0).unwrap();

    let out = ctx.start_rendering().unwrap().into_channels().remove(0);
    // 100 frames per period at 441 Hz.
    assert!(out[..50].iter().all(|s| *s == 1.0));
    assert!(out[51..].iter().all(|s| *s == -1.0));
}

#[test]
fn buffer_source_plays_and_loops() {
    let buffer = Arc::new(AudioBuffer::from_channels(
        vec![vec![1.0, 2.0, 3.0], vec![-1.0, -2.0, -3.0]],
        44100.0,
    ));
    let mut ctx = SoftwareEngine::new()
        .context(ContextOptions::new(2, 7, 44100.0))
        .unwrap();
    let player = node(
        &mut ctx,
        NodeKind::BufferSource(BufferSourceOptions {
            buffer: Some(buffer),
            looping: true,
            ..BufferSourceOptions::default()
        }),
    );
    ctx.start_source(player, Start::default()).unwrap();
    ctx.connect(player, 0, ctx.destination(), 0).unwrap();

    let out = ctx.start_rendering().unwrap();
    assert_eq!(out.channel(0), &[1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0]);
    assert_eq!(out.channel(1), &[-1.0, -2.0, -3.0, -1.0, -2.0, -3.0, -1.0]);
}

#[test]
fn identity_iir_passes_signal() {
    let mut ctx = mono(256);
    let source = started_constant(&mut ctx, 0.3);
    let iir = node(
        &mut ctx,
        NodeKind::IirFilter(IirOptions {
            feedforward: vec![2.0],
            feedback: vec![2.0],
        }),
    );
    ctx.connect(source, 0, iir, 0).unwrap();
    ctx.connect(iir, 0, ctx.destination(), 0).unwrap();

    let buffer = ctx.start_rendering().unwrap();
    assert!(buffer.channel(0).iter().all(|s| (*s - 0.3).abs() < 1e-6));
}

#[test]
fn lowpass_passes_dc() {
    let mut ctx = mono(4096);
    let source = started_constant(&mut ctx, 1.0);
    let filter = node(&mut ctx, NodeKind::BiquadFilter(BiquadOptions::default()));
    ctx.connect(source, 0, filter, 0).unwrap();
    ctx.connect(filter, 0, ctx.destination(), 0).unwrap();

    let buffer = ctx.start_rendering().unwrap();
    assert!((buffer.channel(0)[4095] - 1.0).abs() < 1e-3);
}

#[test]
fn splitter_and_merger_swap_channels() {
    let mut ctx = SoftwareEngine::new()
        .context(ContextOptions::new(2, 4, 44100.0))
        .unwrap();
    let left = started_constant(&mut ctx, 1.0);
    let right = started_constant(&mut ctx, 2.0);
    let pack = node(&mut ctx, NodeKind::ChannelMerger { inputs: 2 });
    let split = node(&mut ctx, NodeKind::ChannelSplitter { outputs: 2 });
    let swap = node(&mut ctx, NodeKind::ChannelMerger { inputs: 2 });
    ctx.connect(left, 0, pack, 0).unwrap();
    ctx.connect(right, 0, pack, 1).unwrap();
    ctx.connect(pack, 0, split, 0).unwrap();
    ctx.connect(split, 0, swap, 1).unwrap();
    ctx.connect(split, 1, swap, 0).unwrap();
    ctx.connect(swap, 0, ctx.destination(), 0).unwrap();

    let out = ctx.start_rendering().unwrap();
    assert_eq!(out.channel(0), &[2.0; 4]);
    assert_eq!(out.channel(1), &[1.0; 4]);
}

#[test]
fn profile_switches_primitives_off() {
    let engine = SoftwareEngine::with_profile(EngineProfile {
        name: Some("legacy".into()),
        unsupported: vec![NodeType::IirFilter],
        quirks: Vec::new(),
    });
    assert_eq!(engine.name(), "legacy");
    let mut ctx = engine
        .create_context(ContextOptions::new(1, 8, 44100.0))
        .unwrap();
    let kind = NodeKind::IirFilter(IirOptions {
        feedforward: vec![1.0],
        feedback: vec![1.0],
    });
    assert_eq!(
        ctx.create_node(&kind, ChannelConfig::default()),
        Err(EngineError::NotSupported(NodeType::IirFilter))
    );
}

#[test]
fn quirks_distort_defaults_and_layouts() {
    let engine = SoftwareEngine::with_profile(EngineProfile {
        name: None,
        unsupported: Vec::new(),
        quirks: vec![
            Quirk::MergerLayout,
            Quirk::ParamDefault {
                node: NodeType::Gain,
                param: "gain".into(),
                value: 0.0,
            },
        ],
    });
    let mut ctx = engine.context(ContextOptions::new(1, 8, 44100.0)).unwrap();
    let gain = node(&mut ctx, NodeKind::Gain);
    assert_eq!(ctx.param_value(ctx.param(gain, "gain").unwrap()).unwrap(), 0.0);

    let merger = node(&mut ctx, NodeKind::ChannelMerger { inputs: 2 });
    assert_ne!(ctx.channel_config(merger).unwrap(), ChannelConfig::explicit(1));
    ctx.set_channel_config(merger, ChannelConfig::explicit(1))
        .unwrap();
    assert_eq!(ctx.channel_config(merger).unwrap(), ChannelConfig::explicit(1));
}

#[test]
fn correct_merger_refuses_other_layouts() {
    let mut ctx = mono(8);
    let merger = node(&mut ctx, NodeKind::ChannelMerger { inputs: 2 });
    assert_eq!(ctx.channel_config(merger).unwrap(), ChannelConfig::explicit(1));
    assert!(matches!(
        ctx.set_channel_config(merger, ChannelConfig::default()),
        Err(EngineError::InvalidState(_))
    ));
}

#[test]
fn stats_count_constructions() {
    let mut ctx = mono(8);
    let a = node(&mut ctx, NodeKind::Gain);
    let b = node(&mut ctx, NodeKind::Gain);
    let _ = node(&mut ctx, NodeKind::ConstantSource);
    ctx.connect(a, 0, b, 0).unwrap();

    let stats = ctx.stats();
    assert_eq!(stats.nodes_created, 3);
    assert_eq!(stats.created_by_type.get(&NodeType::Gain), Some(&2));
    assert_eq!(stats.connections, 1);
}

#[test]
fn out_of_range_ports_are_reported() {
    let mut ctx = mono(8);
    let split = node(&mut ctx, NodeKind::ChannelSplitter { outputs: 2 });
    let gain = node(&mut ctx, NodeKind::Gain);
    assert!(matches!(
        ctx.connect(split, 2, gain, 0),
        Err(EngineError::IndexOutOfRange { index: 2, count: 2, .. })
    ));
    assert!(matches!(
        ctx.connect(split, 0, gain, 1),
        Err(EngineError::IndexOutOfRange { index: 1, count: 1, .. })
    ));
    assert!(matches!(
        ctx.param(gain, "frequency"),
        Err(EngineError::ParamNotFound { .. })
    ));
}
