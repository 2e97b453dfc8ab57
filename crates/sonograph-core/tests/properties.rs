//! Property-based tests for the graph registry and automation timelines.
//!
//! Random connection sequences must never leave a delay-free loop in the
//! graph, and any accepted automation history must replay onto a fresh
//! timeline as the same curve.

use std::collections::HashSet;

use proptest::prelude::*;
use sonograph_core::{
    AudioGraph, AutomationTarget, AutomationTimeline, DelayOptions, GraphOptions, NodeId,
    NodeKind, Target,
};

/// Independent check: is there a loop made only of non-delay nodes?
fn has_delay_free_loop(graph: &AudioGraph) -> bool {
    let nodes: Vec<NodeId> = graph
        .nodes()
        .filter(|n| !n.traits().is_cycle_breaking)
        .map(|n| n.id())
        .collect();
    let successors = |id: NodeId| -> Vec<NodeId> {
        graph
            .edges_from(id)
            .unwrap()
            .into_iter()
            .flatten()
            .map(|edge| match edge.target {
                Target::Node { node, .. } => node,
                Target::Param(param) => graph.param(param).unwrap().node(),
            })
            .filter(|n| !graph.node(*n).unwrap().traits().is_cycle_breaking)
            .collect()
    };

    for &start in &nodes {
        let mut seen = HashSet::new();
        let mut stack = successors(start);
        while let Some(current) = stack.pop() {
            if current == start {
                return true;
            }
            if seen.insert(current) {
                stack.extend(successors(current));
            }
        }
    }
    false
}

#[derive(Debug, Clone)]
enum Event {
    Set(f32, f64),
    Linear(f32, f64),
    Exponential(f32, f64),
    Target(f32, f64, f64),
    Curve(Vec<f32>, f64, f64),
    Cancel(f64),
    Hold(f64),
}

fn event() -> impl Strategy<Value = Event> {
    prop_oneof![
        (-2.0f32..2.0, 0.0f64..4.0).prop_map(|(v, t)| Event::Set(v, t)),
        (-2.0f32..2.0, 0.0f64..4.0).prop_map(|(v, t)| Event::Linear(v, t)),
        (0.01f32..2.0, 0.0f64..4.0).prop_map(|(v, t)| Event::Exponential(v, t)),
        (-2.0f32..2.0, 0.0f64..4.0, 0.0f64..1.0).prop_map(|(v, t, c)| Event::Target(v, t, c)),
        (prop::collection::vec(-2.0f32..2.0, 2..6), 0.0f64..4.0, 0.01f64..1.0)
            .prop_map(|(v, t, d)| Event::Curve(v, t, d)),
        (0.0f64..4.0).prop_map(Event::Cancel),
        (0.0f64..4.0).prop_map(Event::Hold),
    ]
}

fn apply(timeline: &mut AutomationTimeline, event: &Event) {
    // Rejections are part of the property: they must leave the timeline intact.
    let _ = match event {
        Event::Set(v, t) => timeline.set_value_at_time(*v, *t),
        Event::Linear(v, t) => timeline.linear_ramp_to_value_at_time(*v, *t),
        Event::Exponential(v, t) => timeline.exponential_ramp_to_value_at_time(*v, *t),
        Event::Target(v, t, c) => timeline.set_target_at_time(*v, *t, *c),
        Event::Curve(v, t, d) => timeline.set_value_curve_at_time(v, *t, *d),
        Event::Cancel(t) => timeline.cancel_scheduled_values(*t),
        Event::Hold(t) => timeline.cancel_and_hold_at_time(*t),
    };
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Whatever sequence of connections is attempted, the accepted ones never
    /// close a loop without a delay.
    #[test]
    fn accepted_connections_never_form_delay_free_loops(
        delays in prop::collection::vec(any::<bool>(), 2..8),
        attempts in prop::collection::vec((0usize..8, 0usize..8, any::<bool>()), 0..40),
    ) {
        let mut graph = AudioGraph::new(GraphOptions::default()).unwrap();
        let nodes: Vec<NodeId> = delays
            .iter()
            .map(|delay| {
                let kind = if *delay {
                    NodeKind::Delay(DelayOptions::default())
                } else {
                    NodeKind::Gain
                };
                graph.add_node(kind).unwrap()
            })
            .collect();

        for (from, to, to_param) in attempts {
            let source = nodes[from % nodes.len()];
            let target = nodes[to % nodes.len()];
            if to_param {
                let name = if delays[to % nodes.len()] { "delayTime" } else { "gain" };
                let param = graph.param_id(target, name).unwrap();
                let _ = graph.connect_param(source, 0, param);
            } else {
                let _ = graph.connect(source, 0, target, 0);
            }
            prop_assert!(!has_delay_free_loop(&graph));
        }
    }

    /// Replaying a timeline onto a fresh one reproduces the sampled curve, and
    /// replaying the copy again changes nothing.
    #[test]
    fn replay_reproduces_the_curve(
        default in -1.0f32..1.0,
        events in prop::collection::vec(event(), 0..12),
    ) {
        let mut original = AutomationTimeline::new(default);
        for event in &events {
            apply(&mut original, event);
        }

        let mut first = AutomationTimeline::new(default);
        original.replay(&mut first).unwrap();
        let mut second = AutomationTimeline::new(default);
        first.replay(&mut second).unwrap();

        for step in 0..=100 {
            let t = f64::from(step) * 0.05;
            let expected = original.value_at(t);
            prop_assert_eq!(first.value_at(t).to_bits(), expected.to_bits(), "t = {}", t);
            prop_assert_eq!(second.value_at(t).to_bits(), expected.to_bits(), "t = {}", t);
        }
    }

    /// Events stay sorted by time whatever order they are scheduled in.
    #[test]
    fn events_stay_sorted(events in prop::collection::vec(event(), 0..16)) {
        let mut timeline = AutomationTimeline::new(0.0);
        for event in &events {
            apply(&mut timeline, event);
        }
        let times: Vec<f64> = timeline.events().iter().map(|e| e.time()).collect();
        prop_assert!(times.windows(2).all(|w| w[0] <= w[1]), "{:?}", times);
    }

    /// Sampled values are finite for any accepted history.
    #[test]
    fn sampled_values_are_finite(events in prop::collection::vec(event(), 0..12)) {
        let mut timeline = AutomationTimeline::new(0.5);
        for event in &events {
            apply(&mut timeline, event);
        }
        let mut out = [0.0f32; 256];
        timeline.fill(0.0, 64.0, &mut out);
        prop_assert!(out.iter().all(|v| v.is_finite()));
    }
}
