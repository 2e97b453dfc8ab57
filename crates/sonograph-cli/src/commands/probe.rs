//! Show the probed capabilities of an engine.

use std::path::PathBuf;

use clap::Args;
use sonograph_engine::Engine;
use sonograph_render::{Capability, Patch, probe};

use super::common::engine;

#[derive(Args)]
pub struct ProbeArgs {
    /// Engine profile (TOML)
    #[arg(short, long)]
    profile: Option<PathBuf>,

    /// Print the descriptor as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: ProbeArgs) -> anyhow::Result<()> {
    let engine = engine(args.profile.as_deref())?;
    let descriptor = probe(&engine)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&descriptor)?);
        return Ok(());
    }

    println!("Engine: {}\n", engine.name());
    println!("{:<18} SUPPORT", "NODE TYPE");
    println!("{}", "-".repeat(60));
    for (node_type, capability) in descriptor.iter() {
        println!("{:<18} {}", node_type.to_string(), describe(capability));
    }
    Ok(())
}

fn describe(capability: &Capability) -> String {
    match capability {
        Capability::Native => "native".to_string(),
        Capability::Patched { patches } => {
            let patches: Vec<String> = patches
                .iter()
                .map(|patch| match patch {
                    Patch::ParamDefault { param, value } => format!("{param} default {value}"),
                    Patch::ChannelLayout { .. } => "channel layout".to_string(),
                })
                .collect();
            format!("patched ({})", patches.join(", "))
        }
        Capability::Emulated => "emulated".to_string(),
        Capability::Unavailable { reason } => format!("unavailable: {reason}"),
    }
}
