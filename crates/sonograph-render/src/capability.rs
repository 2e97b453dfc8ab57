//! Capability probing.
//!
//! [`probe`] constructs every primitive once on a tiny context and records
//! how the engine can provide each [`NodeType`]: natively, natively with
//! corrections, through software emulation, or not at all. The result is
//! computed once per engine and consulted by every render pass, so the
//! renderer never discovers missing primitives by trial and error.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use sonograph_core::{
    AudioProcessor, BiquadOptions, BufferSourceOptions, ChannelConfig, DelayOptions, IirOptions,
    NodeKind, NodeType, OscillatorOptions, ParamValues, ProcessorError, ProcessorOptions,
    WorkletOptions,
};
use sonograph_engine::{ContextOptions, Engine, EngineContext, EngineError};

/// Primitives the IIR emulation builds in the rendering context.
pub const IIR_REQUIREMENTS: &[NodeType] = &[NodeType::BufferSource];

/// Primitives the worklet emulation builds.
pub const WORKLET_REQUIREMENTS: &[NodeType] = &[
    NodeType::BufferSource,
    NodeType::ChannelSplitter,
    NodeType::ChannelMerger,
    NodeType::Gain,
    NodeType::ConstantSource,
];

static UNPROBED: Capability = Capability::Unavailable {
    reason: String::new(),
};

/// A correction applied right after constructing a primitive.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Patch {
    /// The engine starts this param from the wrong default.
    ParamDefault {
        /// Param name.
        param: String,
        /// The correct default.
        value: f32,
    },
    /// The engine constructs the node with the wrong channel layout; the
    /// layout is rewritten and then guarded against diverging writes.
    ChannelLayout {
        /// Layout the probe expected.
        expected: ChannelConfig,
        /// Layout the engine produced.
        found: ChannelConfig,
    },
}

/// How a node type is provided.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "support", rename_all = "kebab-case")]
pub enum Capability {
    /// Constructed natively, no corrections needed.
    Native,
    /// Constructed natively, then corrected.
    Patched {
        /// Corrections in application order.
        patches: Vec<Patch>,
    },
    /// Built from other primitives and software processing.
    Emulated,
    /// Neither native nor emulated.
    Unavailable {
        /// Why.
        reason: String,
    },
}

impl Capability {
    /// Returns whether the type can be constructed natively.
    pub fn is_native(&self) -> bool {
        matches!(self, Capability::Native | Capability::Patched { .. })
    }

    /// Returns whether the type can be rendered at all.
    pub fn is_available(&self) -> bool {
        !matches!(self, Capability::Unavailable { .. })
    }
}

/// Capability of every node type of one engine.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CapabilityDescriptor {
    engine: String,
    capabilities: BTreeMap<NodeType, Capability>,
}

impl CapabilityDescriptor {
    /// Returns the name of the probed engine.
    pub fn engine(&self) -> &str {
        &self.engine
    }

    /// Returns how `node_type` is provided.
    pub fn get(&self, node_type: NodeType) -> &Capability {
        self.capabilities.get(&node_type).unwrap_or(&UNPROBED)
    }

    /// Iterates over every probed type.
    pub fn iter(&self) -> impl Iterator<Item = (NodeType, &Capability)> {
        self.capabilities.iter().map(|(t, c)| (*t, c))
    }
}

/// Probes every primitive of `engine`.
///
/// # Errors
///
/// Fails only when the engine cannot create the probe context.
pub fn probe(engine: &dyn Engine) -> Result<CapabilityDescriptor, EngineError> {
    let mut context = engine.create_context(ContextOptions::new(1, 1, 44100.0))?;
    let mut capabilities = BTreeMap::new();
    capabilities.insert(NodeType::Destination, Capability::Native);

    let mut unsupported = Vec::new();
    for kind in probe_kinds() {
        let node_type = kind.node_type();
        match probe_kind(context.as_mut(), &kind) {
            Ok(capability) => {
                capabilities.insert(node_type, capability);
            }
            Err(EngineError::NotSupported(_)) => unsupported.push(node_type),
            Err(e) => {
                tracing::warn!(%node_type, error = %e, "probe construction failed");
                capabilities.insert(
                    node_type,
                    Capability::Unavailable {
                        reason: e.to_string(),
                    },
                );
            }
        }
    }

    for node_type in unsupported {
        let requirements = match node_type {
            NodeType::IirFilter => IIR_REQUIREMENTS,
            NodeType::Worklet => WORKLET_REQUIREMENTS,
            _ => {
                capabilities.insert(
                    node_type,
                    Capability::Unavailable {
                        reason: "not supported by the engine and not emulated".into(),
                    },
                );
                continue;
            }
        };
        let missing: Vec<NodeType> = requirements
            .iter()
            .copied()
            .filter(|r| !capabilities.get(r).is_some_and(Capability::is_native))
            .collect();
        let capability = if missing.is_empty() {
            Capability::Emulated
        } else {
            Capability::Unavailable {
                reason: format!(
                    "emulation needs {}",
                    missing
                        .iter()
                        .map(|t| t.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            }
        };
        capabilities.insert(node_type, capability);
    }

    let descriptor = CapabilityDescriptor {
        engine: engine.name().to_string(),
        capabilities,
    };
    for (node_type, capability) in descriptor.iter() {
        match capability {
            Capability::Native => {}
            Capability::Patched { patches } => {
                tracing::warn!(%node_type, ?patches, "primitive needs patching");
            }
            other => tracing::debug!(%node_type, capability = ?other, "probed"),
        }
    }
    Ok(descriptor)
}

fn probe_kind(context: &mut dyn EngineContext, kind: &NodeKind) -> Result<Capability, EngineError> {
    let expected = kind.default_channel_config(context.channel_count());
    let native = context.create_node(kind, expected)?;

    let mut patches = Vec::new();
    let found = context.channel_config(native)?;
    if found != expected {
        patches.push(Patch::ChannelLayout { expected, found });
    }
    for spec in kind.param_specs(context.sample_rate()) {
        let param = context.param(native, &spec.name)?;
        if context.param_value(param)? != spec.default {
            patches.push(Patch::ParamDefault {
                param: spec.name.clone(),
                value: spec.default,
            });
        }
    }

    Ok(if patches.is_empty() {
        Capability::Native
    } else {
        Capability::Patched { patches }
    })
}

/// One representative of every constructible kind.
fn probe_kinds() -> Vec<NodeKind> {
    vec![
        NodeKind::ConstantSource,
        NodeKind::Oscillator(OscillatorOptions::default()),
        NodeKind::BufferSource(BufferSourceOptions::default()),
        NodeKind::Gain,
        NodeKind::Delay(DelayOptions::default()),
        NodeKind::BiquadFilter(BiquadOptions::default()),
        NodeKind::IirFilter(IirOptions {
            feedforward: vec![1.0],
            feedback: vec![1.0],
        }),
        NodeKind::ChannelSplitter { outputs: 2 },
        NodeKind::ChannelMerger { inputs: 2 },
        NodeKind::Worklet(WorkletOptions::new("probe", Arc::new(idle_processor))),
    ]
}

struct Idle;

impl AudioProcessor for Idle {
    fn process(
        &mut self,
        _inputs: &[Vec<&[f32]>],
        _outputs: &mut [Vec<&mut [f32]>],
        _parameters: &ParamValues<'_>,
    ) -> Result<bool, ProcessorError> {
        Ok(false)
    }
}

fn idle_processor(_: &ProcessorOptions) -> Box<dyn AudioProcessor> {
    Box::new(Idle)
}
