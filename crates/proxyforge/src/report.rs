//! Benchmark report: derived metrics, recommendations, and persistence.
//!
//! For each codec the single-worker result is the baseline:
//! - `speedup = baseline_time / time` (exactly 1.0 for the baseline)
//! - `efficiency = speedup / workers`
//!
//! Recommendations break ties toward the lowest worker count.

use crate::system::SystemInfo;
use log::info;
use proxyforge_config::Codec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for report persistence
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Metrics of one benchmark configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub codec: Codec,
    pub worker_count: u32,
    pub total_time_seconds: f64,
    /// Jobs the run attempted
    pub file_count: usize,
    pub failures: usize,
    /// None when the codec has no usable baseline
    pub speedup: Option<f64>,
    pub efficiency: Option<f64>,
}

impl BenchmarkResult {
    /// A result whose derived metrics are not computed yet
    pub fn measured(
        codec: Codec,
        worker_count: u32,
        total_time_seconds: f64,
        file_count: usize,
        failures: usize,
    ) -> Self {
        Self {
            codec,
            worker_count,
            total_time_seconds,
            file_count,
            failures,
            speedup: None,
            efficiency: None,
        }
    }

    pub fn is_baseline(&self) -> bool {
        self.worker_count == 1
    }
}

/// Fills in speedup and efficiency relative to each codec's baseline.
pub fn apply_baselines(results: &mut [BenchmarkResult]) {
    let baselines: BTreeMap<Codec, f64> = results
        .iter()
        .filter(|r| r.is_baseline())
        .map(|r| (r.codec, r.total_time_seconds))
        .collect();

    for result in results.iter_mut() {
        let speedup = if result.is_baseline() {
            Some(1.0)
        } else {
            baselines
                .get(&result.codec)
                .copied()
                .filter(|&base| base > 0.0 && result.total_time_seconds > 0.0)
                .map(|base| base / result.total_time_seconds)
        };
        result.speedup = speedup;
        result.efficiency = speedup.map(|s| s / result.worker_count.max(1) as f64);
    }
}

/// Thresholds a configuration must meet to be a sweet spot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweetSpotThresholds {
    pub min_efficiency: f64,
    pub min_speedup: f64,
}

impl Default for SweetSpotThresholds {
    fn default() -> Self {
        Self {
            min_efficiency: 0.70,
            min_speedup: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub worker_count: u32,
    pub total_time_seconds: f64,
    pub speedup: Option<f64>,
    pub efficiency: Option<f64>,
}

impl From<&BenchmarkResult> for Recommendation {
    fn from(r: &BenchmarkResult) -> Self {
        Self {
            worker_count: r.worker_count,
            total_time_seconds: r.total_time_seconds,
            speedup: r.speedup,
            efficiency: r.efficiency,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodecRecommendations {
    pub most_efficient: Option<Recommendation>,
    pub fastest: Option<Recommendation>,
    pub sweet_spot: Option<Recommendation>,
    pub advice: String,
}

/// Picks the best element by `better`, keeping the earlier one on ties.
///
/// `sorted` must be in ascending worker order so ties favour fewer workers.
fn pick<'a, F>(sorted: &[&'a BenchmarkResult], better: F) -> Option<&'a BenchmarkResult>
where
    F: Fn(&BenchmarkResult, &BenchmarkResult) -> bool,
{
    sorted.iter().copied().fold(None, |best, r| match best {
        Some(b) if !better(r, b) => Some(b),
        _ => Some(r),
    })
}

/// Recommendations for one codec's results.
pub fn recommend(results: &[BenchmarkResult], thresholds: SweetSpotThresholds) -> CodecRecommendations {
    let mut sorted: Vec<&BenchmarkResult> = results.iter().collect();
    sorted.sort_by_key(|r| r.worker_count);

    let parallel: Vec<&BenchmarkResult> = sorted
        .iter()
        .copied()
        .filter(|r| !r.is_baseline() && r.efficiency.is_some())
        .collect();
    let most_efficient = pick(&parallel, |a, b| a.efficiency > b.efficiency);

    let fastest = pick(&sorted, |a, b| a.total_time_seconds < b.total_time_seconds);

    let qualifying: Vec<&BenchmarkResult> = sorted
        .iter()
        .copied()
        .filter(|r| match (r.efficiency, r.speedup) {
            (Some(e), Some(s)) => e >= thresholds.min_efficiency && s >= thresholds.min_speedup,
            _ => false,
        })
        .collect();
    let sweet_spot = pick(&qualifying, |a, b| a.speedup > b.speedup);

    let advice = advice(most_efficient, fastest, sweet_spot);

    CodecRecommendations {
        most_efficient: most_efficient.map(Recommendation::from),
        fastest: fastest.map(Recommendation::from),
        sweet_spot: sweet_spot.map(Recommendation::from),
        advice,
    }
}

fn advice(
    most_efficient: Option<&BenchmarkResult>,
    fastest: Option<&BenchmarkResult>,
    sweet_spot: Option<&BenchmarkResult>,
) -> String {
    let speedup = |r: &BenchmarkResult| r.speedup.unwrap_or(0.0);
    let efficiency = |r: &BenchmarkResult| r.efficiency.unwrap_or(0.0) * 100.0;

    match (most_efficient, fastest, sweet_spot) {
        (_, _, Some(sweet)) if most_efficient.map(|m| m.worker_count) != Some(sweet.worker_count) => format!(
            "Recommended: {} workers for optimal balance of speed ({:.1}x) and efficiency ({:.1}%)",
            sweet.worker_count,
            speedup(sweet),
            efficiency(sweet)
        ),
        (Some(eff), Some(fast), _) if eff.worker_count == fast.worker_count => format!(
            "Clear winner: {} workers provides both best speed and efficiency",
            eff.worker_count
        ),
        (Some(eff), Some(fast), _) => format!(
            "Choose {} workers for efficiency ({:.1}%) or {} for maximum speed ({:.1}x)",
            eff.worker_count,
            efficiency(eff),
            fast.worker_count,
            speedup(fast)
        ),
        (None, Some(fast), _) => format!(
            "Fastest: {} workers; no single-worker baseline to compare against",
            fast.worker_count
        ),
        _ => "No results".to_string(),
    }
}

/// Persisted outcome of a complete benchmark sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub system_info: SystemInfo,
    /// Sweep start, `YYYYmmdd-HHMMSS`
    pub timestamp: String,
    pub source_path: PathBuf,
    pub total_benchmark_time_seconds: f64,
    pub results: Vec<BenchmarkResult>,
    pub recommendations: BTreeMap<Codec, CodecRecommendations>,
}

impl Report {
    /// Derives metrics and recommendations from raw measurements
    pub fn build(
        system_info: SystemInfo,
        timestamp: String,
        source_path: PathBuf,
        mut results: Vec<BenchmarkResult>,
        thresholds: SweetSpotThresholds,
    ) -> Self {
        apply_baselines(&mut results);

        let mut by_codec: BTreeMap<Codec, Vec<BenchmarkResult>> = BTreeMap::new();
        for r in &results {
            by_codec.entry(r.codec).or_default().push(r.clone());
        }
        let recommendations = by_codec
            .iter()
            .map(|(codec, rs)| (*codec, recommend(rs, thresholds)))
            .collect();

        Self {
            system_info,
            timestamp,
            source_path,
            total_benchmark_time_seconds: results.iter().map(|r| r.total_time_seconds).sum(),
            results,
            recommendations,
        }
    }

    /// `benchmark-report-<cpu>-<timestamp>.json`
    pub fn file_name(&self) -> String {
        format!(
            "benchmark-report-{}-{}.json",
            self.system_info.cpu_label(),
            self.timestamp
        )
    }

    /// Writes the report into `dir`, creating it if needed.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, ReportError> {
        let path = dir.join(self.file_name());
        let json = serde_json::to_string_pretty(self)?;
        std::fs::create_dir_all(dir)
            .and_then(|_| std::fs::write(&path, json))
            .map_err(|source| ReportError::Write {
                path: path.clone(),
                source,
            })?;
        info!("Benchmark report written to {}", path.display());
        Ok(path)
    }

    /// Human-readable per-codec analysis
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (codec, recs) in &self.recommendations {
            let _ = writeln!(out, "\n{} codec performance:", codec.as_str().to_uppercase());
            let _ = writeln!(out, "{}", "-".repeat(66));
            let _ = writeln!(
                out,
                "{:<15} {:<10} {:<12} {:<8} {:<8} {:<8}",
                "Configuration", "Time (s)", "Time (MM:SS)", "Workers", "Files", "Speedup"
            );

            let mut rows: Vec<&BenchmarkResult> =
                self.results.iter().filter(|r| r.codec == *codec).collect();
            rows.sort_by(|a, b| a.total_time_seconds.total_cmp(&b.total_time_seconds));

            for r in rows {
                let speedup = r
                    .speedup
                    .map(|s| format!("{:.2}x", s))
                    .unwrap_or_else(|| "N/A".to_string());
                let marker = match &recs.fastest {
                    Some(f) if f.worker_count == r.worker_count => " *",
                    _ => "",
                };
                let _ = writeln!(
                    out,
                    "{:<15} {:<10.1} {:<12} {:<8} {:<8} {:<8}{}",
                    format!("{}-{}w", codec, r.worker_count),
                    r.total_time_seconds,
                    format_mm_ss(r.total_time_seconds),
                    r.worker_count,
                    r.file_count - r.failures,
                    speedup,
                    marker
                );
            }
            let _ = writeln!(out, "{}", recs.advice);
        }
        out
    }
}

/// Formats seconds as `M:SS`
pub fn format_mm_ss(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}
