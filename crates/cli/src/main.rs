//! CLI entry point for proxyforge
//!
//! Scans a source tree, resolves proxy conflicts up front, then encodes
//! every remaining proxy on a bounded worker pool.

use clap::Parser;
use log::{error, info};
use proxyforge::pipeline::{execute_run, prepare_run, RunError};
use proxyforge::{
    cancel_on_ctrl_c, cancel_pair, init_logging, run_startup_checks, shutdown_after_countdown,
    Codec, Config, ConflictMode, FfmpegInvoker, JobStatus, Resolution, RunSummary,
    Scale, TerminalPrompt, ToolProbe, WorkerPlan,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// Generate editing proxies for every video under a source path
#[derive(Parser, Debug)]
#[command(name = "proxyforge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Source directory or single video file
    path: PathBuf,

    /// Proxy codec: h264, prores or dnxhr
    #[arg(long, value_parser = parse_codec)]
    codec: Option<Codec>,

    /// Proxy scale: quarter or half
    #[arg(long, value_parser = parse_scale)]
    scale: Option<Scale>,

    /// Number of concurrent encodes (default: auto)
    #[arg(long)]
    max_workers: Option<u32>,

    /// Encode one file at a time
    #[arg(long)]
    no_parallel: bool,

    /// What to do when a proxy of another format exists: ask, duplicate or skip
    #[arg(long, value_parser = parse_conflict_mode)]
    on_conflict: Option<ConflictMode>,

    /// Power off the computer when processing is complete
    #[arg(long)]
    shutdown: bool,

    /// Path to the configuration file
    #[arg(short, long, default_value = "proxyforge.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_codec(s: &str) -> Result<Codec, String> {
    Codec::parse(s).ok_or_else(|| format!("unknown codec '{}'", s))
}

fn parse_scale(s: &str) -> Result<Scale, String> {
    Scale::parse(s).ok_or_else(|| format!("unknown scale '{}'", s))
}

fn parse_conflict_mode(s: &str) -> Result<ConflictMode, String> {
    ConflictMode::parse(s).ok_or_else(|| format!("unknown conflict mode '{}'", s))
}

impl Args {
    /// Overlays command line flags on the loaded configuration
    fn apply_to(&self, config: &mut Config) {
        if let Some(codec) = self.codec {
            config.proxy.codec = codec;
        }
        if let Some(scale) = self.scale {
            config.proxy.scale = scale;
        }
        if self.max_workers.is_some() {
            config.proxy.max_workers = self.max_workers;
        }
        if self.no_parallel {
            config.proxy.parallel = false;
        }
        if let Some(mode) = self.on_conflict {
            config.proxy.on_conflict = mode;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = match Config::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    args.apply_to(&mut config);

    match run(&args, config).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            if let RunError::EncoderUnavailable {
                summary,
                record_path,
                ..
            } = &e
            {
                print_summary(summary, None, record_path.as_deref());
            }
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(args: &Args, config: Config) -> Result<u8, RunError> {
    run_startup_checks(&config.tools, true)?;
    let workers = WorkerPlan::derive(&config.proxy);

    println!("Source: {}", args.path.display());
    println!(
        "Codec: {}  Scale: {}  Workers: {} ({} logical cores)",
        config.proxy.codec, config.proxy.scale.as_str(), workers.workers, workers.logical_cores
    );

    let probe = ToolProbe::new(&config.tools);
    let prepared = prepare_run(&args.path, &config, &probe, &mut TerminalPrompt::stdio())?;
    for warning in &prepared.discovery.warnings {
        println!("Warning: {}: {}", warning.path.display(), warning.message);
    }
    let moved = prepared.migrations.iter().filter(|m| m.moved()).count();
    if moved > 0 {
        println!(
            "Moved {} existing proxy file(s) into {}",
            moved,
            prepared.discovery.layout.proxies_dir().display()
        );
    }
    for migration in prepared.migrations.iter().filter(|m| !m.moved()) {
        println!(
            "Warning: left {} in place ({:?})",
            migration.from.display(),
            migration.outcome
        );
    }
    println!(
        "Planned {} file(s): {} to encode ({} duplicate), {} skipped",
        prepared.plan.entries.len(),
        prepared.runnable_count(),
        prepared.plan.count(Resolution::Duplicate),
        prepared.plan.count(Resolution::Skip)
    );

    let (handle, signal) = cancel_pair();
    cancel_on_ctrl_c(handle);
    let invoker = Arc::new(FfmpegInvoker::new(&config.tools));
    let outcome = execute_run(prepared, workers.workers, invoker, signal).await?;
    print_summary(
        &outcome.summary,
        Some(outcome.skipped),
        outcome.record_path.as_deref(),
    );

    if args.shutdown && !outcome.summary.interrupted {
        let (handle, signal) = cancel_pair();
        cancel_on_ctrl_c(handle);
        shutdown_after_countdown(signal).await?;
    }
    Ok(outcome.exit_code())
}

fn print_summary(summary: &RunSummary, skipped: Option<usize>, record_path: Option<&Path>) {
    println!("\n{}", "=".repeat(60));
    println!("Processing complete");
    println!("{}", "=".repeat(60));
    println!("Workers:    {}", summary.workers);
    println!("Wall time:  {:.1}s", summary.wall_time_secs);
    println!("Succeeded:  {}", summary.succeeded());
    println!("Failed:     {}", summary.failed());
    println!("Cancelled:  {}", summary.cancelled());
    if let Some(skipped) = skipped {
        println!("Skipped:    {}", skipped);
    }

    for job in summary.jobs.iter().filter(|j| j.status == JobStatus::Failed) {
        println!(
            "  FAILED {}: {}",
            job.source().display(),
            job.error.as_deref().unwrap_or("unknown error")
        );
    }
    if let Some(path) = record_path {
        info!("Run record: {}", path.display());
        println!("Run record: {}", path.display());
    }
    if summary.interrupted {
        println!("Run interrupted; unfinished files were marked cancelled.");
    }
}
