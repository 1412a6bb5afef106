// highway-sim: runs a pitch-judged session on a virtual clock with a synthetic
// singer and prints the performance summary.

mod chart_file;
mod sim;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use highway_service::HighwayConfig;
use tracing::info;

use chart_file::ChartFile;
use sim::{Simulation, SimulationReport, SingerModel};

#[derive(Parser, Debug)]
#[command(name = "highway-sim", about = "Note highway session simulator")]
struct Args {
    /// Chart JSON to play. A built-in C major scale is used when omitted.
    #[arg(long)]
    chart: Option<PathBuf>,

    /// Highway config JSON file; defaults are used when it does not exist.
    #[arg(long, default_value = "highway.json", env = "HIGHWAY_CONFIG")]
    config: PathBuf,

    /// Virtual frame rate driving `tick`.
    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// Constant singer offset from the target pitch.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    detune_cents: f64,

    /// Random spread around the detuned pitch.
    #[arg(long, default_value_t = 10.0)]
    jitter_cents: f64,

    /// Pitch detector rate.
    #[arg(long, default_value_t = 20.0)]
    sample_rate_hz: f64,

    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,

    /// Log session events at debug level.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = HighwayConfig::load_from(&args.config)?;
    info!(path = %args.config.display(), "highway config loaded");

    let chart = match &args.chart {
        Some(path) => {
            info!(path = %path.display(), "loading chart");
            ChartFile::load(path)?
        }
        None => ChartFile::c_major_scale()?,
    };
    let timeline = chart.timeline()?;

    let singer = SingerModel {
        detune_cents: args.detune_cents,
        jitter_cents: args.jitter_cents,
        sample_rate_hz: args.sample_rate_hz,
        ..Default::default()
    };
    let mut simulation = Simulation::new(config, singer, args.fps, args.seed)?;
    let report = simulation.run(&chart.title, timeline)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &SimulationReport) {
    let summary = &report.summary;
    println!("{}", report.title);
    println!(
        "  {} frames, {} pitch samples",
        report.frames, report.samples
    );
    println!(
        "  hits {}/{} ({:.0}%)",
        summary.hits,
        summary.total,
        summary.hit_rate * 100.0
    );
    if let Some(cents) = summary.mean_accuracy_cents {
        println!("  mean accuracy {cents:+.1} cents");
    }
    if let Some(cents) = summary.mean_abs_accuracy_cents {
        println!("  mean |accuracy| {cents:.1} cents");
    }
    if let Some(ms) = summary.mean_timing_offset_ms {
        println!("  mean onset {ms:.0} ms");
    }
    for note in &report.notes {
        let accuracy = note
            .accuracy_cents
            .map_or_else(|| "-".to_string(), |c| format!("{c:+.1}c"));
        println!(
            "  {:>4} {} {:>8} sustain {:.2}",
            note.note_id.to_string(),
            if note.hit { "hit " } else { "miss" },
            accuracy,
            note.sampled_duration_ratio
        );
    }
}
