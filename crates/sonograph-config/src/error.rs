//! Error types for configuration operations.

use std::path::PathBuf;

use sonograph_core::{AutomationError, GraphError};
use thiserror::Error;

/// Errors that can occur while loading or building configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file
    #[error("failed to write file '{path}': {source}")]
    WriteFile {
        /// Path of the file that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// A connection or automation entry names a node that is not declared
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// Two nodes share a name
    #[error("node '{0}' is declared twice")]
    DuplicateNode(String),

    /// A worklet names a processor nobody registered
    #[error("unknown processor: {0}")]
    UnknownProcessor(String),

    /// The graph refused a node, connection or setting
    #[error("graph error at '{at}': {source}")]
    Graph {
        /// Node or connection being built.
        at: String,
        /// What the graph reported.
        #[source]
        source: GraphError,
    },

    /// An automation event was refused
    #[error("automation of '{node}.{param}' rejected: {source}")]
    Automation {
        /// Node owning the param.
        node: String,
        /// Param name.
        param: String,
        /// What the timeline reported.
        #[source]
        source: AutomationError,
    },
}

impl ConfigError {
    /// Create a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Create a write file error.
    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::WriteFile {
            path: path.into(),
            source,
        }
    }

    /// Create a graph error located at `at`.
    pub fn graph(at: impl Into<String>, source: GraphError) -> Self {
        ConfigError::Graph {
            at: at.into(),
            source,
        }
    }
}
