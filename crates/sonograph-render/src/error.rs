//! Error types for render passes.

use sonograph_core::{AutomationError, GraphError, NodeId, NodeType, ProcessorError};
use sonograph_engine::EngineError;
use thiserror::Error;

/// Errors that abort a render pass.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    /// The engine cannot provide the node, natively or through emulation.
    #[error("{node_type} node {node} cannot be rendered: {reason}")]
    CapabilityUnavailable {
        /// The node being rendered.
        node: NodeId,
        /// Its type.
        node_type: NodeType,
        /// Why no construction exists.
        reason: String,
    },

    /// The context or surface does not allow the call.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The pass was cancelled through its [`CancelToken`](crate::CancelToken).
    #[error("render cancelled")]
    Cancelled,

    /// The engine refused an operation.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// The graph could not be read.
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// An automation history could not be replayed.
    #[error("automation replay failed: {0}")]
    Automation(#[from] AutomationError),
}

impl RenderError {
    /// Create a capability error for `node`.
    pub fn unavailable(node: NodeId, node_type: NodeType, reason: impl Into<String>) -> Self {
        RenderError::CapabilityUnavailable {
            node,
            node_type,
            reason: reason.into(),
        }
    }
}

/// A processor failure recorded during a pass. The pass itself continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorFailure {
    /// The worklet node whose processor failed.
    pub node: NodeId,
    /// Processor name.
    pub processor: String,
    /// Index of the failing 128-frame block.
    pub block: usize,
    /// What the processor reported.
    pub error: ProcessorError,
}

impl core::fmt::Display for ProcessorFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "processor '{}' on {} failed in block {}: {}",
            self.processor, self.node, self.block, self.error
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_convert() {
        let err: RenderError = EngineError::InvalidState("closed".into()).into();
        assert!(matches!(err, RenderError::Engine(_)));
        assert_eq!(err.to_string(), "engine error: invalid state: closed");
    }

    #[test]
    fn cancelled_display() {
        assert_eq!(RenderError::Cancelled.to_string(), "render cancelled");
    }
}
