//! Sonograph Engine - the rendering seam and a reference software engine
//!
//! The renderer never computes samples itself. It constructs native nodes on
//! an [`EngineContext`], wires them, and asks the context to render. This
//! crate defines that seam and ships [`SoftwareEngine`], a sample-accurate
//! implementation whose primitives can be switched off or made to misbehave
//! through an [`EngineProfile`].
//!
//! # Example
//!
//! ```rust
//! use sonograph_core::{ChannelConfig, NodeKind, Start};
//! use sonograph_engine::{ContextOptions, EngineContext, SoftwareEngine};
//!
//! let engine = SoftwareEngine::new();
//! let mut context = engine.context(ContextOptions::new(1, 4, 44100.0)).unwrap();
//! let source = context
//!     .create_node(&NodeKind::ConstantSource, ChannelConfig::default())
//!     .unwrap();
//! context.connect(source, 0, context.destination(), 0).unwrap();
//! context.start_source(source, Start::default()).unwrap();
//!
//! let buffer = context.start_rendering().unwrap();
//! assert_eq!(buffer.channel(0), &[1.0; 4]);
//! ```

pub mod context;
pub mod error;
pub mod profile;
pub mod software;

pub use context::{ContextOptions, ContextState, Engine, EngineContext};
pub use error::EngineError;
pub use profile::{EngineProfile, Quirk};
pub use software::{ContextStats, SoftwareContext, SoftwareEngine};
