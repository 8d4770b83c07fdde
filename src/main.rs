// Example runner for the `dynamo_vision` library: reads a manifest of captured frames
// and their parsed elements, runs the engine, and prints the selection as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use dynamo_vision::manifest::Manifest;
use dynamo_vision::{HistogramEmbedder, ParallelPipeline, PipelineConfig, RegionPipeline};

/// Locate the dynamic content region of a UI capture sequence.
#[derive(Parser)]
#[command(name = "dynamo_vision")]
#[command(version)]
struct Cli {
    /// Manifest JSON listing frame images and their parsed elements
    #[arg(short, long)]
    manifest: PathBuf,

    /// Pipeline configuration JSON (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Histogram bins per channel for the built-in embedder
    #[arg(long, default_value_t = 8)]
    bins: usize,

    /// Build frames on a worker pool
    #[arg(long)]
    parallel: bool,

    /// Print the full report instead of only the selection
    #[arg(long)]
    report: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let manifest = Manifest::from_json_file(&cli.manifest)
        .with_context(|| format!("loading manifest {}", cli.manifest.display()))?;
    info!(frames = manifest.len(), parallel = cli.parallel, "starting analysis");

    let embedder = Arc::new(HistogramEmbedder::new(cli.bins));
    let frames = manifest.into_inputs();
    let report = if cli.parallel {
        ParallelPipeline::new(config, embedder)?.analyze_detailed(frames).await
    } else {
        RegionPipeline::new(config, embedder)?.analyze_detailed(&frames)
    };
    info!(
        valid = report.valid_frames,
        skipped = report.skipped_frames,
        candidates = report.candidates.len(),
        "analysis finished"
    );

    let json = if cli.report {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string_pretty(&report.selection)?
    };
    println!("{json}");
    Ok(())
}
