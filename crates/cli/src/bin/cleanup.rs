//! Orphaned proxy cleanup
//!
//! Lists proxies whose original footage no longer exists. Nothing is deleted
//! unless `--delete` is given and the operator confirms (or passes `--yes`).

use clap::Parser;
use proxyforge::{
    delete_orphans, init_logging, Config, OrphanScan, OrphanScanner, TerminalPrompt,
};
use std::path::PathBuf;
use std::process::ExitCode;

/// Find and remove proxies whose originals are gone
#[derive(Parser, Debug)]
#[command(name = "proxyforge-cleanup")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Proxy directory to clean up
    proxy_dir: PathBuf,

    /// Actually delete orphans (default is a dry run)
    #[arg(long)]
    delete: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    yes: bool,

    /// Path to the configuration file
    #[arg(short, long, default_value = "proxyforge.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn print_orphans(scan: &OrphanScan) {
    println!("\nFound {} orphaned proxy file(s):", scan.orphans.len());
    println!("{}", "=".repeat(80));
    for (i, orphan) in scan.orphans.iter().enumerate() {
        let name = orphan
            .proxy
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!("{:3}. {} ({:.1}MB)", i + 1, name, megabytes(orphan.size_bytes));
        println!("     Expected original: {}.*", orphan.expected_stem);
    }
    println!("Total size: {:.1}MB", megabytes(scan.total_bytes()));
    println!("{}", "=".repeat(80));
}

fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = match Config::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let scanner = OrphanScanner::new(&args.proxy_dir, &config.scan.extensions);
    let scan = match scanner.scan() {
        Ok(scan) => scan,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Proxy files found: {}", scan.proxy_files);
    if scan.orphans.is_empty() {
        println!("No orphaned proxy files found!");
        return ExitCode::SUCCESS;
    }
    print_orphans(&scan);

    if !args.delete {
        println!("DRY RUN - no files deleted. Re-run with --delete to remove them.");
        return ExitCode::SUCCESS;
    }
    if !args.yes
        && !TerminalPrompt::stdio().confirm("Do you want to delete these orphaned proxy files?")
    {
        println!("Cleanup cancelled.");
        return ExitCode::SUCCESS;
    }

    let report = delete_orphans(&scan.orphans);
    println!("Files deleted: {}", report.deleted);
    println!("Errors: {}", report.errors.len());
    if report.errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
