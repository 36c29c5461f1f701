//! Powering off the host after a run (`--shutdown`).

use crate::cancel::CancelSignal;
use log::{info, warn};
use std::io;
use std::time::Duration;

/// Seconds the operator has to abort a pending shutdown
pub const SHUTDOWN_COUNTDOWN_SECS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Initiated,
    Aborted,
}

/// Program and arguments that power off a host running `os`
pub fn shutdown_command(os: &str) -> (&'static str, &'static [&'static str]) {
    match os {
        "windows" => ("shutdown", &["/s", "/t", "0"]),
        _ => ("sudo", &["shutdown", "-h", "now"]),
    }
}

/// Ticks once per second from `seconds` down to 1.
///
/// Returns false as soon as `cancel` fires.
pub async fn countdown<F>(seconds: u32, tick: Duration, mut cancel: CancelSignal, mut on_tick: F) -> bool
where
    F: FnMut(u32),
{
    for remaining in (1..=seconds).rev() {
        on_tick(remaining);
        tokio::select! {
            _ = tokio::time::sleep(tick) => {}
            _ = cancel.cancelled() => return false,
        }
    }
    true
}

/// Counts down, then runs the platform shutdown command.
pub async fn shutdown_after_countdown(cancel: CancelSignal) -> io::Result<ShutdownOutcome> {
    println!("\nInitiating shutdown in {} seconds...", SHUTDOWN_COUNTDOWN_SECS);
    println!("Press Ctrl+C to abort shutdown");

    let elapsed = countdown(
        SHUTDOWN_COUNTDOWN_SECS,
        Duration::from_secs(1),
        cancel,
        |remaining| println!("Shutting down in {} seconds...", remaining),
    )
    .await;
    if !elapsed {
        println!("\nShutdown aborted!");
        return Ok(ShutdownOutcome::Aborted);
    }

    let (program, args) = shutdown_command(std::env::consts::OS);
    info!("Running {} {}", program, args.join(" "));
    let status = tokio::process::Command::new(program).args(args).status().await?;
    if !status.success() {
        warn!("Shutdown command exited with {}", status);
    }
    Ok(ShutdownOutcome::Initiated)
}
