//! Connections between nodes and params.
//!
//! An [`Edge`] carries the output of one node either into an input slot of
//! another node or into a param, where it is summed with the param's
//! automation.

use crate::ids::{NodeId, ParamId};

/// Where a connection ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Target {
    /// An input slot of a node.
    Node {
        /// Destination node.
        node: NodeId,
        /// Input slot index.
        input: usize,
    },
    /// A param.
    Param(ParamId),
}

/// A directed connection recorded in the graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Edge {
    /// Source node.
    pub source: NodeId,
    /// Output slot of the source.
    pub output: usize,
    /// Destination.
    pub target: Target,
}
