//! Startup checks
//!
//! Verifies that the external tools a run depends on can be launched before
//! any file is scanned or encoded:
//! - ffmpeg (encoding)
//! - ffprobe (audio and frame-rate probing)
//! - exiftool (device metadata)

use log::info;
use proxyforge_config::ToolsConfig;
use std::process::Command;
use thiserror::Error;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Missing required tool(s): {}\n{hint}", .missing.join(", "))]
    ToolUnavailable { missing: Vec<String>, hint: String },
}

/// Argument each tool accepts to print its version and exit
fn version_arg(tool_name: &str) -> &'static str {
    if tool_name.contains("exiftool") {
        "-ver"
    } else {
        "-version"
    }
}

/// Check whether `tool` can be launched and exits successfully
///
/// Returns the first line of its version output.
pub fn probe_tool(tool: &str) -> Option<String> {
    let output = Command::new(tool).arg(version_arg(tool)).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Some(stdout.lines().next().unwrap_or_default().trim().to_string())
}

/// Parse FFmpeg version string and extract major version number
///
/// Handles various FFmpeg version formats:
/// - Standard: "ffmpeg version 6.1.1 ..."
/// - N-prefixed: "ffmpeg version n7.0-... ..."
pub fn parse_ffmpeg_version(version_output: &str) -> Option<u32> {
    let version_line = version_output
        .lines()
        .find(|line| line.to_lowercase().contains("version"))?;

    let version_part = version_line
        .to_lowercase()
        .split("version")
        .nth(1)?
        .split_whitespace()
        .next()?
        .to_string();

    let version_str = version_part.trim_start_matches('n');
    version_str
        .split(|c| c == '.' || c == '-')
        .next()?
        .parse()
        .ok()
}

/// Installation instructions for `missing` tools on `os`
pub fn install_hint(os: &str, missing: &[String]) -> String {
    let packages: Vec<&str> = missing
        .iter()
        .map(|tool| {
            // ffprobe ships with ffmpeg
            if tool.contains("ffprobe") || tool.contains("ffmpeg") {
                "ffmpeg"
            } else {
                "exiftool"
            }
        })
        .fold(Vec::new(), |mut acc, pkg| {
            if !acc.contains(&pkg) {
                acc.push(pkg);
            }
            acc
        });

    let (manager, command) = match os {
        "macos" => ("Homebrew", "brew install"),
        "windows" => ("Chocolatey", "choco install"),
        _ => ("your package manager", "sudo apt install"),
    };

    let lines: Vec<String> = packages
        .iter()
        .map(|&pkg| {
            // Debian packages exiftool as libimage-exiftool-perl
            let pkg = if pkg == "exiftool" && command.starts_with("sudo apt") {
                "libimage-exiftool-perl"
            } else {
                pkg
            };
            format!("  {} {}", command, pkg)
        })
        .collect();

    format!("Install using {}:\n{}", manager, lines.join("\n"))
}

/// Check the given tools with a custom launcher (used by tests)
pub fn check_tools_with<F>(tools: &[&str], probe: F) -> Result<(), StartupError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing = Vec::new();
    for tool in tools {
        match probe(tool) {
            Some(version) => info!("Found {}: {}", tool, version),
            None => missing.push(tool.to_string()),
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        let hint = install_hint(std::env::consts::OS, &missing);
        Err(StartupError::ToolUnavailable { missing, hint })
    }
}

/// Run all startup checks
///
/// `need_exiftool` is false for flows that never classify sources.
pub fn run_startup_checks(tools: &ToolsConfig, need_exiftool: bool) -> Result<(), StartupError> {
    let mut required = vec![tools.ffmpeg.as_str(), tools.ffprobe.as_str()];
    if need_exiftool {
        required.push(tools.exiftool.as_str());
    }
    check_tools_with(&required, probe_tool)?;

    if let Some(major) = probe_tool(&tools.ffmpeg).as_deref().and_then(parse_ffmpeg_version) {
        info!("Using FFmpeg major version {}", major);
    }
    Ok(())
}
