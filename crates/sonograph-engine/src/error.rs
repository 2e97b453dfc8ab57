//! Error types for engine operations.

use sonograph_core::{NativeNodeId, NativeParamId, NodeType, Port};
use thiserror::Error;

/// Errors raised by an [`EngineContext`](crate::EngineContext).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The engine cannot construct this node type.
    #[error("{0} nodes are not supported by this engine")]
    NotSupported(NodeType),

    /// The call is not allowed in the context's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The native node does not exist in this context.
    #[error("{0} not found")]
    NodeNotFound(NativeNodeId),

    /// The native node has no param with that name.
    #[error("{node} has no param named '{name}'")]
    ParamNotFound {
        /// Node that was searched.
        node: NativeNodeId,
        /// Requested name.
        name: String,
    },

    /// The native param handle does not resolve.
    #[error("param {}#{} not found", .0.node, .0.index)]
    UnknownParam(NativeParamId),

    /// A port index exceeds the node's port count.
    #[error("{port} index {index} out of range for {node} ({count} available)")]
    IndexOutOfRange {
        /// Node whose ports were indexed.
        node: NativeNodeId,
        /// Output or input side.
        port: Port,
        /// Requested index.
        index: usize,
        /// Number of ports on that side.
        count: usize,
    },

    /// Construction or context options were rejected.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// The connected nodes contain a loop with no delay in it.
    #[error("feedback loop without a delay through {0}")]
    FeedbackWithoutDelay(NativeNodeId),
}

impl EngineError {
    /// Create an out-of-range error for an output index.
    pub fn output_out_of_range(node: NativeNodeId, index: usize, count: usize) -> Self {
        EngineError::IndexOutOfRange {
            node,
            port: Port::Output,
            index,
            count,
        }
    }

    /// Create an out-of-range error for an input index.
    pub fn input_out_of_range(node: NativeNodeId, index: usize, count: usize) -> Self {
        EngineError::IndexOutOfRange {
            node,
            port: Port::Input,
            index,
            count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_supported_names_the_type() {
        let err = EngineError::NotSupported(NodeType::IirFilter);
        assert_eq!(err.to_string(), "iir-filter nodes are not supported by this engine");
    }

    #[test]
    fn unknown_param_display() {
        let err = EngineError::UnknownParam(NativeParamId {
            node: NativeNodeId(3),
            index: 1,
        });
        assert_eq!(err.to_string(), "param native#3#1 not found");
    }
}
