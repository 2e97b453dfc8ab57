//! Processing order of a software context.
//!
//! Only nodes upstream of the destination (through inputs or params) are
//! scheduled. A delay that can reach itself is split in two steps: its read
//! has no dependencies, so the loop is cut there, and its write runs once its
//! input is known. Everything else is ordered with Kahn's algorithm.

use std::collections::VecDeque;

use sonograph_core::NativeNodeId;

use super::NativeNode;
use crate::EngineError;

/// One unit of work per frame block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Step {
    /// Mix inputs, evaluate params and run the node.
    Process(usize),
    /// Emit the output of a delay on a feedback loop.
    DelayRead(usize),
    /// Feed the input of a delay on a feedback loop.
    DelayWrite(usize),
}

/// Ordered steps plus what the block size depends on.
#[derive(Debug)]
pub(crate) struct Schedule {
    pub steps: Vec<Step>,
    /// Per node: whether it is a delay on a feedback loop.
    pub looped: Vec<bool>,
}

impl Schedule {
    /// Returns whether any feedback loop is scheduled.
    pub fn has_feedback(&self) -> bool {
        self.looped.iter().any(|l| *l)
    }
}

pub(crate) fn build(nodes: &[NativeNode], destination: usize) -> Result<Schedule, EngineError> {
    let n = nodes.len();

    let mut reachable = vec![false; n];
    let mut stack = vec![destination];
    while let Some(idx) = stack.pop() {
        if !reachable[idx] {
            reachable[idx] = true;
            stack.extend(nodes[idx].sources().map(|c| c.source.0 as usize));
        }
    }

    let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (idx, node) in nodes.iter().enumerate().filter(|(i, _)| reachable[*i]) {
        for connection in node.sources() {
            consumers[connection.source.0 as usize].push(idx);
        }
    }

    let looped: Vec<bool> = (0..n)
        .map(|idx| reachable[idx] && nodes[idx].is_delay() && reaches(&consumers, idx, idx))
        .collect();

    // Step slots: 2 * idx is the process/write step, 2 * idx + 1 the read.
    let producer = |idx: usize| if looped[idx] { 2 * idx + 1 } else { 2 * idx };
    let mut present = vec![false; 2 * n];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); 2 * n];
    let mut in_degree = vec![0u32; 2 * n];
    for idx in (0..n).filter(|i| reachable[*i]) {
        present[2 * idx] = true;
        if looped[idx] {
            present[2 * idx + 1] = true;
        }
        for connection in nodes[idx].sources() {
            let from = producer(connection.source.0 as usize);
            successors[from].push(2 * idx);
            in_degree[2 * idx] += 1;
        }
    }

    let mut queue: VecDeque<usize> = (0..2 * n)
        .filter(|&slot| present[slot] && in_degree[slot] == 0)
        .collect();
    let mut steps = Vec::new();
    while let Some(slot) = queue.pop_front() {
        let idx = slot / 2;
        steps.push(match (slot % 2 == 1, looped[idx]) {
            (true, _) => Step::DelayRead(idx),
            (false, true) => Step::DelayWrite(idx),
            (false, false) => Step::Process(idx),
        });
        for &next in &successors[slot] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    let expected = present.iter().filter(|p| **p).count();
    if steps.len() != expected {
        let stuck = (0..2 * n)
            .find(|&slot| present[slot] && in_degree[slot] > 0)
            .map_or(destination, |slot| slot / 2);
        return Err(EngineError::FeedbackWithoutDelay(NativeNodeId(stuck as u32)));
    }

    Ok(Schedule { steps, looped })
}

/// Depth-first search along consumer edges from `start` looking for `target`.
fn reaches(consumers: &[Vec<usize>], start: usize, target: usize) -> bool {
    let mut seen = vec![false; consumers.len()];
    let mut stack: Vec<usize> = consumers[start].clone();
    while let Some(idx) = stack.pop() {
        if idx == target {
            return true;
        }
        if !seen[idx] {
            seen[idx] = true;
            stack.extend_from_slice(&consumers[idx]);
        }
    }
    false
}
