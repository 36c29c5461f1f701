//! Benchmark entry point
//!
//! Encodes the same source set with every codec and worker-count
//! configuration, then writes and prints a performance report.

use clap::Parser;
use log::error;
use proxyforge::pipeline::{run_benchmark, RunError};
use proxyforge::{
    cancel_on_ctrl_c, cancel_pair, configuration_matrix, format_mm_ss, init_logging,
    run_startup_checks, Config, FfmpegInvoker, Scale, ToolProbe,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Find the best worker count per proxy codec on this machine
#[derive(Parser, Debug)]
#[command(name = "proxyforge-bench")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Source directory or single video file to benchmark with
    path: PathBuf,

    /// Proxy scale: quarter or half
    #[arg(long, value_parser = parse_scale)]
    scale: Option<Scale>,

    /// Seconds to wait between configurations
    #[arg(long)]
    pause: Option<u64>,

    /// Path to the configuration file
    #[arg(short, long, default_value = "proxyforge.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_scale(s: &str) -> Result<Scale, String> {
    Scale::parse(s).ok_or_else(|| format!("unknown scale '{}'", s))
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
    if let Some(scale) = args.scale {
        config.proxy.scale = scale;
    }
    if let Some(pause) = args.pause {
        config.benchmark.pause_between_runs_secs = pause;
    }

    match run(&args, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(args: &Args, config: &Config) -> Result<(), RunError> {
    run_startup_checks(&config.tools, true)?;

    let matrix = configuration_matrix();
    println!("Benchmarking {} configuration(s) on {}", matrix.len(), args.path.display());
    for configuration in &matrix {
        println!("  {}", configuration);
    }

    let (handle, signal) = cancel_pair();
    cancel_on_ctrl_c(handle);
    let probe = ToolProbe::new(&config.tools);
    let invoker = Arc::new(FfmpegInvoker::new(&config.tools));
    let outcome = run_benchmark(&args.path, config, &probe, invoker, signal).await?;

    let report = &outcome.report;
    println!("\n{}", "=".repeat(66));
    println!("BENCHMARK RESULTS");
    println!("{}", "=".repeat(66));
    println!("CPU: {}", report.system_info.cpu);
    println!(
        "OS:  {} {} ({})",
        report.system_info.os, report.system_info.os_version, report.system_info.arch
    );
    println!(
        "Total benchmark time: {}",
        format_mm_ss(report.total_benchmark_time_seconds)
    );
    print!("{}", report.render());
    println!("\nReport written to {}", outcome.report_path.display());
    Ok(())
}
