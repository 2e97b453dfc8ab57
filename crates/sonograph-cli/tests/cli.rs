//! Integration tests for the `sonograph` binary.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

fn sonograph_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_sonograph"))
}

const HALF_DC: &str = r#"
[context]
sample_rate = 8000
channels = 2
length = 256

[[nodes]]
name = "dc"
type = "constant-source"
start = 0.0

[[nodes]]
name = "amp"
type = "gain"
params = { gain = 0.5 }

[[connections]]
from = "dc"
to = "amp"

[[connections]]
from = "amp"
to = "destination"
"#;

const CLIPPED: &str = r#"
[context]
sample_rate = 8000
channels = 1
length = 300

[[nodes]]
name = "dc"
type = "constant-source"
start = 0.0
params = { offset = 0.9 }

[[nodes]]
name = "clip"
type = "worklet"
processor = "hard-clip"
output_channel_count = [1]
parameters = [{ name = "threshold", default = 0.25, min = 0.0, max = 1.0 }]

[[connections]]
from = "dc"
to = "clip"

[[connections]]
from = "clip"
to = "destination"
"#;

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn read_wav(path: &Path) -> (hound::WavSpec, Vec<f32>) {
    let reader = hound::WavReader::open(path).unwrap();
    let spec = reader.spec();
    let samples = reader
        .into_samples::<f32>()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    (spec, samples)
}

// ---------------------------------------------------------------------------
// render
// ---------------------------------------------------------------------------

#[test]
fn render_writes_float_wav() {
    let dir = TempDir::new().unwrap();
    let graph = write(dir.path(), "graph.toml", HALF_DC);
    let out = dir.path().join("out.wav");

    let output = sonograph_bin()
        .arg("render")
        .arg(&graph)
        .arg("-o")
        .arg(&out)
        .output()
        .expect("failed to run sonograph render");
    assert!(
        output.status.success(),
        "render failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let (spec, samples) = read_wav(&out);
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 8000);
    assert_eq!(spec.bits_per_sample, 32);
    assert_eq!(samples.len(), 512);
    assert!(samples.iter().all(|&s| s == 0.5));
}

#[test]
fn render_writes_16_bit_wav() {
    let dir = TempDir::new().unwrap();
    let graph = write(dir.path(), "graph.toml", HALF_DC);
    let out = dir.path().join("out16.wav");

    let status = sonograph_bin()
        .args(["render", "--bit-depth", "16", "-o"])
        .arg(&out)
        .arg(&graph)
        .status()
        .unwrap();
    assert!(status.success());

    let reader = hound::WavReader::open(&out).unwrap();
    assert_eq!(reader.spec().bits_per_sample, 16);
    assert_eq!(reader.duration(), 256);
}

#[test]
fn render_runs_builtin_worklet() {
    let dir = TempDir::new().unwrap();
    let graph = write(dir.path(), "clip.toml", CLIPPED);
    let out = dir.path().join("clip.wav");

    let status = sonograph_bin()
        .arg("render")
        .arg(&graph)
        .arg("-o")
        .arg(&out)
        .status()
        .unwrap();
    assert!(status.success());

    let (_, samples) = read_wav(&out);
    assert_eq!(samples.len(), 300);
    assert!(samples.iter().all(|&s| s == 0.25));
}

#[test]
fn render_rejects_unknown_node() {
    let dir = TempDir::new().unwrap();
    let graph = write(
        dir.path(),
        "bad.toml",
        "[[connections]]\nfrom = \"ghost\"\nto = \"destination\"\n",
    );

    let output = sonograph_bin()
        .arg("render")
        .arg(&graph)
        .arg("-o")
        .arg(dir.path().join("bad.wav"))
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("ghost"));
}

#[test]
fn render_rejects_invalid_bit_depth() {
    let output = sonograph_bin()
        .args(["render", "graph.toml", "-o", "out.wav", "--bit-depth", "12"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}

// ---------------------------------------------------------------------------
// probe
// ---------------------------------------------------------------------------

#[test]
fn probe_lists_node_types() {
    let output = sonograph_bin().arg("probe").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for name in ["gain", "iir-filter", "worklet"] {
        assert!(stdout.contains(name), "probe should list '{name}'");
    }
    assert!(stdout.contains("emulated"));
}

#[test]
fn probe_json_reflects_profile() {
    let dir = TempDir::new().unwrap();
    let profile = write(
        dir.path(),
        "legacy.toml",
        "unsupported = [\"iir-filter\"]\n\n[[quirks]]\nkind = \"merger-layout\"\n",
    );

    let output = sonograph_bin()
        .args(["probe", "--json", "--profile"])
        .arg(&profile)
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let capabilities = &json["capabilities"];
    assert_eq!(capabilities["iir-filter"]["support"], "emulated");
    assert_eq!(capabilities["channel-merger"]["support"], "patched");
    assert_eq!(capabilities["gain"]["support"], "native");
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

#[test]
fn check_summarizes_graph() {
    let dir = TempDir::new().unwrap();
    let graph = write(dir.path(), "graph.toml", HALF_DC);

    let output = sonograph_bin().arg("check").arg(&graph).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("3 nodes, 2 connections"));
    assert!(stdout.contains("OK"));
}

#[test]
fn check_fails_when_engine_lacks_a_type() {
    let dir = TempDir::new().unwrap();
    let graph = write(dir.path(), "clip.toml", CLIPPED);
    let profile = write(
        dir.path(),
        "bare.toml",
        "unsupported = [\"buffer-source\", \"worklet\"]\n",
    );

    let output = sonograph_bin()
        .arg("check")
        .arg(&graph)
        .arg("--profile")
        .arg(&profile)
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("worklet"));
}
