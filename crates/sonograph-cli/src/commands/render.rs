//! Render a graph description to a WAV file.

use std::path::PathBuf;

use clap::Args;
use hound::{SampleFormat, WavSpec, WavWriter};
use sonograph_config::GraphDescription;
use sonograph_core::AudioBuffer;
use sonograph_render::{CancelToken, OfflineRenderer};

use super::common::{engine, linear_to_db, rms};
use crate::processors;

#[derive(Args)]
pub struct RenderArgs {
    /// Graph description (TOML)
    #[arg(value_name = "GRAPH")]
    graph: PathBuf,

    /// Output WAV file
    #[arg(short, long, value_name = "OUTPUT")]
    output: PathBuf,

    /// Engine profile (TOML)
    #[arg(short, long)]
    profile: Option<PathBuf>,

    /// Output bit depth (16, 24, or 32)
    #[arg(long, default_value = "32", value_parser = parse_bit_depth)]
    bit_depth: u16,

    /// Override the described length, in frames
    #[arg(long)]
    length: Option<usize>,
}

fn parse_bit_depth(s: &str) -> Result<u16, String> {
    match s.parse::<u16>() {
        Ok(bits @ (16 | 24 | 32)) => Ok(bits),
        _ => Err(format!("invalid bit depth '{s}' (expected 16, 24, or 32)")),
    }
}

pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    let description = GraphDescription::load(&args.graph)?;
    let (graph, _) = description.build_with(&processors::builtin())?;
    let length = args.length.unwrap_or_else(|| description.context.frames());

    let mut renderer = OfflineRenderer::new(engine(args.profile.as_deref())?)?;

    let cancel = CancelToken::new();
    let handler = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nCancelling...");
        handler.cancel();
    })?;

    println!(
        "Rendering {} ({} nodes, {} frames at {} Hz)...",
        args.graph.display(),
        graph.node_count(),
        length,
        graph.sample_rate()
    );
    let buffer = renderer.render_graph_with(&graph, length, &cancel)?;

    for failure in renderer.processor_errors() {
        eprintln!("warning: {failure}");
    }

    let samples = buffer.interleaved();
    println!(
        "  {} channel(s), RMS {:.1} dB, Peak {:.1} dB",
        buffer.channel_count(),
        linear_to_db(rms(&samples)),
        linear_to_db(buffer.peak())
    );

    println!("Writing {}...", args.output.display());
    write_wav(&args.output, &buffer, args.bit_depth)?;
    println!("Done!");
    Ok(())
}

fn write_wav(path: &std::path::Path, buffer: &AudioBuffer, bits_per_sample: u16) -> anyhow::Result<()> {
    let spec = WavSpec {
        channels: u16::try_from(buffer.channel_count())?,
        sample_rate: buffer.sample_rate().round() as u32,
        bits_per_sample,
        sample_format: if bits_per_sample == 32 {
            SampleFormat::Float
        } else {
            SampleFormat::Int
        },
    };
    let mut writer = WavWriter::create(path, spec)?;

    if bits_per_sample == 32 {
        for sample in buffer.interleaved() {
            writer.write_sample(sample)?;
        }
    } else {
        let max_val = (1i32 << (bits_per_sample - 1)) as f32;
        for sample in buffer.interleaved() {
            let int_sample = (sample * max_val).clamp(-max_val, max_val - 1.0) as i32;
            writer.write_sample(int_sample)?;
        }
    }

    writer.finalize()?;
    Ok(())
}
