//! Feedback detection for proposed connections.
//!
//! A connection `source → target` closes a loop when `source` is already
//! reachable from the target. Loops are only legal when a cycle-breaking node
//! (a delay) sits on them, so the walk does not continue through such nodes.

use std::collections::HashSet;

use crate::edge::Target;
use crate::graph::AudioGraph;
use crate::ids::NodeId;

/// Returns true if connecting `source` to `target` would create a feedback
/// loop without a delay in it.
///
/// A param target stands for the node that owns it. Only connections already
/// in the graph are followed, so the walk terminates on any graph.
pub fn would_cycle(graph: &AudioGraph, source: NodeId, target: &Target) -> bool {
    let Some(start) = owner(graph, target) else {
        return false;
    };
    if breaks_cycles(graph, start) || breaks_cycles(graph, source) {
        return false;
    }
    if start == source {
        return true;
    }

    let mut visited = HashSet::new();
    let mut stack = vec![start];
    while let Some(current) = stack.pop() {
        if current == source {
            return true;
        }
        if !visited.insert(current) || breaks_cycles(graph, current) {
            continue;
        }
        let Ok(outputs) = graph.edges_from(current) else {
            continue;
        };
        stack.extend(
            outputs
                .iter()
                .flatten()
                .filter_map(|edge| owner(graph, &edge.target)),
        );
    }
    false
}

fn owner(graph: &AudioGraph, target: &Target) -> Option<NodeId> {
    match target {
        Target::Node { node, .. } => Some(*node),
        Target::Param(param) => graph.param(*param).ok().map(|p| p.node()),
    }
}

fn breaks_cycles(graph: &AudioGraph, node: NodeId) -> bool {
    graph
        .node(node)
        .is_ok_and(|n| n.traits().is_cycle_breaking)
}
