//! Validate a graph description.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Args;
use sonograph_config::GraphDescription;
use sonograph_render::OfflineRenderer;

use super::common::engine;
use crate::processors;

#[derive(Args)]
pub struct CheckArgs {
    /// Graph description (TOML)
    #[arg(value_name = "GRAPH")]
    graph: PathBuf,

    /// Engine profile (TOML); reports node types it cannot render
    #[arg(short, long)]
    profile: Option<PathBuf>,
}

pub fn run(args: CheckArgs) -> anyhow::Result<()> {
    let description = GraphDescription::load(&args.graph)?;
    let (graph, _) = description.build_with(&processors::builtin())?;
    let renderer = OfflineRenderer::new(engine(args.profile.as_deref())?)?;

    let mut by_type = BTreeMap::new();
    for node in graph.nodes() {
        *by_type.entry(node.kind().node_type()).or_insert(0usize) += 1;
    }

    println!("Graph: {}", args.graph.display());
    println!(
        "  {} Hz, {} channel(s), {} frames",
        graph.sample_rate(),
        graph.channel_count(),
        description.context.frames()
    );
    println!(
        "  {} nodes, {} connections, {} automated params",
        graph.node_count(),
        graph.edge_count(),
        description.automation.len()
    );

    let mut unavailable = Vec::new();
    for (node_type, count) in &by_type {
        let capability = renderer.capabilities().get(*node_type);
        println!("  {:<18} x{count}", node_type.to_string());
        if !capability.is_available() {
            unavailable.push(node_type.to_string());
        }
    }

    if !unavailable.is_empty() {
        anyhow::bail!("engine cannot render: {}", unavailable.join(", "));
    }
    println!("OK");
    Ok(())
}
