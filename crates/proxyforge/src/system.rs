//! Host description recorded in run records and benchmark reports.

use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Longest CPU label used in file names
const MAX_CPU_LABEL_LEN: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    /// CPU brand string, e.g. "Apple M2 Pro"
    pub cpu: String,
    pub os: String,
    pub os_version: String,
    pub arch: String,
    pub logical_cores: u32,
    pub physical_cores: u32,
    pub total_memory_bytes: u64,
}

/// Collects the host description using sysinfo
pub fn collect_system_info() -> SystemInfo {
    let mut sys = System::new();
    sys.refresh_cpu_all();
    sys.refresh_memory();

    let cpu = sys
        .cpus()
        .first()
        .map(|c| c.brand().trim().to_string())
        .filter(|brand| !brand.is_empty())
        .unwrap_or_else(|| "Unknown CPU".to_string());

    SystemInfo {
        cpu,
        os: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
        os_version: System::os_version().unwrap_or_else(|| "unknown".to_string()),
        arch: std::env::consts::ARCH.to_string(),
        logical_cores: num_cpus::get() as u32,
        physical_cores: num_cpus::get_physical() as u32,
        total_memory_bytes: sys.total_memory(),
    }
}

impl SystemInfo {
    /// CPU name reduced to something safe and short enough for a file name
    pub fn cpu_label(&self) -> String {
        filename_friendly_cpu(&self.cpu)
    }
}

/// Turns a CPU brand string into a file-name-safe label.
///
/// Trademark marks and filler words are removed, vendor prefixes shortened,
/// every other non-word character becomes `-`, runs of `-` collapse, and the
/// result is capped at 30 characters.
pub fn filename_friendly_cpu(cpu: &str) -> String {
    let cleaned = cpu
        .replace("(R)", "")
        .replace("(TM)", "")
        .replace(" CPU", "")
        .replace(" Processor", "")
        .replace("Intel Core ", "Intel-")
        .replace("AMD Ryzen ", "AMD-Ryzen-")
        .replace("Apple ", "Apple-");

    let mut label = String::with_capacity(cleaned.len());
    for c in cleaned.chars() {
        let c = if c.is_alphanumeric() || c == '_' || c == '.' || c == '-' {
            c
        } else {
            '-'
        };
        if c == '-' && label.ends_with('-') {
            continue;
        }
        label.push(c);
    }

    let label = label.trim_matches('-');
    let truncated: String = label.chars().take(MAX_CPU_LABEL_LEN).collect();
    let truncated = truncated.trim_end_matches('-');

    if truncated.is_empty() {
        "Unknown-CPU".to_string()
    } else {
        truncated.to_string()
    }
}
