//! Sonograph Render - offline rendering of audio graphs onto an engine
//!
//! An [`OfflineRenderer`] turns an [`AudioGraph`](sonograph_core::AudioGraph)
//! into native nodes of an [`EngineContext`](sonograph_engine::EngineContext)
//! and asks the engine to render them to a buffer.
//!
//! ## Rendering model
//!
//! - The engine is [probed](probe) once. Every node type is either native,
//!   native with [patches](Patch), emulated in software, or unavailable.
//! - A [`RenderingSession`] walks the graph depth-first from the
//!   destination. Each node is constructed at most once per context; repeated
//!   consumers share its [`RenderedNode`] surface, across
//!   [`render_node`](OfflineRenderer::render_node) calls too.
//! - Params receive their current value, then their automation history is
//!   replayed, then their signal connections are wired.
//! - IIR filters and worklets the engine lacks are rendered upstream on a
//!   partial context, processed in software and played back through a buffer
//!   source.
//! - Processor errors do not abort a pass; they are collected in
//!   [`OfflineRenderer::processor_errors`].
//! - A [`CancelToken`] aborts a pass between constructions. An aborted pass
//!   removes the connections it made and disconnects the natives it created.
//!
//! # Example
//!
//! ```rust
//! use sonograph_core::{AudioGraph, GraphOptions, NodeKind};
//! use sonograph_engine::SoftwareEngine;
//! use sonograph_render::{Capability, OfflineRenderer};
//! use sonograph_core::NodeType;
//!
//! let mut graph = AudioGraph::new(GraphOptions::default()).unwrap();
//! let osc = graph.add_node(NodeKind::Oscillator(Default::default())).unwrap();
//! graph.connect(osc, 0, graph.destination(), 0).unwrap();
//! graph.start(osc, 0.0).unwrap();
//!
//! let mut renderer = OfflineRenderer::new(SoftwareEngine::new()).unwrap();
//! assert_eq!(renderer.capabilities().get(NodeType::Worklet), &Capability::Emulated);
//!
//! let buffer = renderer.render_graph(&graph, 256).unwrap();
//! assert_eq!(buffer.channel_count(), 2);
//! assert!(buffer.peak() > 0.9);
//! ```

pub mod capability;
mod emulation;
pub mod error;
pub mod orchestrator;
mod renderer;
pub mod session;
pub mod surface;

pub use capability::{Capability, CapabilityDescriptor, Patch, probe};
pub use error::{ProcessorFailure, RenderError};
pub use orchestrator::OfflineRenderer;
pub use session::{CancelToken, RenderingSession};
pub use surface::{NativePort, RenderedNode};
