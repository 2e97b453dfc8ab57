//! Error types for graph mutation and automation scheduling.
//!
//! Structural errors ([`GraphError`]) are raised synchronously when the graph is
//! edited, never during a render. Scheduling errors ([`AutomationError`]) are
//! raised when an automation event is inserted into a timeline.

use thiserror::Error;

use crate::ids::{GraphId, NodeId, ParamId};

/// Which side of a node a port index refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Port {
    /// An output slot of the source node.
    Output,
    /// An input slot of the destination node.
    Input,
}

impl core::fmt::Display for Port {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Output => f.write_str("output"),
            Self::Input => f.write_str("input"),
        }
    }
}

/// Errors that can occur while editing an [`AudioGraph`](crate::AudioGraph).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    /// The node was removed or never existed in this graph.
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    /// The param was removed or never existed in this graph.
    #[error("param {0} not found")]
    ParamNotFound(ParamId),

    /// The node has no param with the given name.
    #[error("node {node} has no param named '{name}'")]
    UnknownParam {
        /// Node that was searched.
        node: NodeId,
        /// Requested param name.
        name: String,
    },

    /// An endpoint belongs to a different graph.
    #[error("endpoint belongs to {found}, expected {expected}")]
    ContextMismatch {
        /// Graph that received the call.
        expected: GraphId,
        /// Graph that allocated the offending id.
        found: GraphId,
    },

    /// A port index exceeds the node's port count.
    #[error("{port} index {index} out of range for {node} ({count} available)")]
    IndexOutOfRange {
        /// Node whose ports were indexed.
        node: NodeId,
        /// Output or input side.
        port: Port,
        /// Requested index.
        index: usize,
        /// Number of ports on that side.
        count: usize,
    },

    /// The connection would close a feedback loop with no delay in it.
    #[error("connecting {from} to {to} would create a cycle without a delay")]
    Cycle {
        /// Source of the rejected connection.
        from: NodeId,
        /// Node (or param owner) the connection pointed at.
        to: NodeId,
    },

    /// The identical connection already exists.
    #[error("{from} output {output} is already connected to that destination")]
    DuplicateConnection {
        /// Source node.
        from: NodeId,
        /// Source output index.
        output: usize,
    },

    /// A selective disconnect matched no connection.
    #[error("{0} is not connected to the requested destination")]
    NotConnected(NodeId),

    /// The node options are not acceptable for that node kind.
    #[error("invalid node options: {0}")]
    InvalidOptions(String),

    /// The channel configuration is not acceptable for that node kind.
    #[error("invalid channel configuration for {node}: {reason}")]
    InvalidChannelConfig {
        /// Node whose configuration was rejected.
        node: NodeId,
        /// Why it was rejected.
        reason: String,
    },

    /// The operation is not allowed in the node's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// An automation call on one of the graph's params failed.
    #[error(transparent)]
    Automation(#[from] AutomationError),
}

/// Errors raised when scheduling automation events.
///
/// Every variant except [`Overlap`](Self::Overlap) is a range violation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AutomationError {
    /// A value or time was NaN or infinite.
    #[error("{what} must be finite, got {value}")]
    NonFinite {
        /// Which argument was rejected.
        what: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// A time or time constant was negative.
    #[error("{what} must not be negative, got {value}")]
    Negative {
        /// Which argument was rejected.
        what: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// Exponential ramps cannot reach zero or cross sign.
    #[error("exponential ramp needs a strictly positive target, got {0}")]
    ExponentialTarget(f32),

    /// The value an exponential ramp would start from is zero or negative.
    #[error("exponential ramp cannot start from {0}")]
    ExponentialStart(f32),

    /// Value curves need at least two points.
    #[error("value curve needs at least two points, got {0}")]
    CurveTooShort(usize),

    /// Value curves need a strictly positive duration.
    #[error("value curve duration must be positive, got {0}")]
    CurveDuration(f64),

    /// The event collides with a value curve already in the timeline.
    #[error("event at {time}s overlaps a scheduled value curve")]
    Overlap {
        /// Time of the rejected event.
        time: f64,
    },
}

impl AutomationError {
    /// Returns true for range violations (everything except overlaps).
    pub fn is_range_error(&self) -> bool {
        !matches!(self, Self::Overlap { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_out_of_range_display_names_port() {
        let node = NodeId {
            graph: GraphId::next(),
            slot: 3,
            generation: 0,
        };
        let err = GraphError::IndexOutOfRange {
            node,
            port: Port::Input,
            index: 2,
            count: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("input index 2"), "got: {msg}");
        assert!(msg.contains("1 available"), "got: {msg}");
    }

    #[test]
    fn overlap_is_not_a_range_error() {
        assert!(!AutomationError::Overlap { time: 1.0 }.is_range_error());
        assert!(AutomationError::ExponentialTarget(0.0).is_range_error());
        assert!(AutomationError::CurveTooShort(1).is_range_error());
    }

    #[test]
    fn automation_error_converts_into_graph_error() {
        let err: GraphError = AutomationError::CurveDuration(0.0).into();
        assert!(matches!(err, GraphError::Automation(_)));
        assert_eq!(err.to_string(), "value curve duration must be positive, got 0");
    }
}
