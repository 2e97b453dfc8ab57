//! Graph descriptions and engine profiles for sonograph.
//!
//! This crate turns TOML files into the objects the renderer works on.
//!
//! # Features
//!
//! - **Graph descriptions**: nodes tagged by `type`, connections to inputs or
//!   params, and per-param automation, built into an
//!   [`AudioGraph`](sonograph_core::AudioGraph)
//! - **Processor registry**: worklet processors are code and are referred to
//!   by name
//! - **Engine profiles**: switch primitives off and inject quirks to
//!   simulate deficient engines
//!
//! # Example
//!
//! ```rust
//! use sonograph_config::GraphDescription;
//!
//! let description = GraphDescription::from_toml(r#"
//! [context]
//! sample_rate = 8000
//! channels = 1
//! length = 16
//!
//! [[nodes]]
//! name = "dc"
//! type = "constant-source"
//! start = 0.0
//! params = { offset = 0.5 }
//!
//! [[connections]]
//! from = "dc"
//! to = "destination"
//! "#).unwrap();
//!
//! let (graph, names) = description.build().unwrap();
//! assert_eq!(graph.node_count(), 2);
//! assert!(names.contains_key("dc"));
//! assert_eq!(description.context.frames(), 16);
//! ```

mod description;
mod error;
mod processors;
mod profile;

pub use description::{
    AutomationDescription, BufferDescription, ConnectionDescription, ContextDescription,
    DESTINATION, EventDescription, GraphDescription, KindDescription, NodeDescription,
    WorkletDescription,
};
pub use error::ConfigError;
pub use processors::ProcessorRegistry;
pub use profile::{load_profile, profile_from_toml, save_profile};
