//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Proxy codec requested by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    H264,
    Prores,
    Dnxhr,
}

impl Codec {
    /// All codecs accepted on the command line
    pub const ALL: [Codec; 3] = [Codec::H264, Codec::Prores, Codec::Dnxhr];

    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::H264 => "h264",
            Codec::Prores => "prores",
            Codec::Dnxhr => "dnxhr",
        }
    }

    /// Container extension (without the dot) used for proxies of this codec
    pub fn container_extension(&self) -> &'static str {
        match self {
            Codec::H264 => "mp4",
            Codec::Prores | Codec::Dnxhr => "mov",
        }
    }

    /// Parse a codec name, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "h264" => Some(Codec::H264),
            "prores" => Some(Codec::Prores),
            "dnxhr" => Some(Codec::Dnxhr),
            _ => None,
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output scale relative to the source resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    Quarter,
    Half,
}

impl Scale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scale::Quarter => "quarter",
            Scale::Half => "half",
        }
    }

    /// ffmpeg scale filter preserving aspect ratio
    pub fn filter(&self) -> &'static str {
        match self {
            Scale::Quarter => "scale=iw/4:ih/4",
            Scale::Half => "scale=iw/2:ih/2",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "quarter" => Some(Scale::Quarter),
            "half" => Some(Scale::Half),
            _ => None,
        }
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Initial policy for conflicts with pre-existing proxies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictMode {
    /// Ask the operator per conflicting file
    Ask,
    /// Create a duplicate proxy for every conflict
    Duplicate,
    /// Skip every conflicting file
    Skip,
}

impl ConflictMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ask" => Some(ConflictMode::Ask),
            "duplicate" => Some(ConflictMode::Duplicate),
            "skip" => Some(ConflictMode::Skip),
            _ => None,
        }
    }
}

/// Proxy generation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProxyConfig {
    /// Requested codec (mobile footage is always forced to H.264)
    #[serde(default = "default_codec")]
    pub codec: Codec,
    /// Output scale
    #[serde(default = "default_scale")]
    pub scale: Scale,
    /// Maximum concurrent encodes (auto-detected if None)
    #[serde(default)]
    pub max_workers: Option<u32>,
    /// Run encodes in parallel (false forces a single worker)
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    /// How conflicts with existing proxies are resolved initially
    #[serde(default = "default_on_conflict")]
    pub on_conflict: ConflictMode,
    /// Move proxies kept beside their sources by older layouts into the proxies directory
    #[serde(default = "default_migrate_legacy")]
    pub migrate_legacy: bool,
}

fn default_codec() -> Codec {
    Codec::Prores
}

fn default_scale() -> Scale {
    Scale::Quarter
}

fn default_parallel() -> bool {
    true
}

fn default_on_conflict() -> ConflictMode {
    ConflictMode::Ask
}

fn default_migrate_legacy() -> bool {
    true
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            codec: default_codec(),
            scale: default_scale(),
            max_workers: None,
            parallel: default_parallel(),
            on_conflict: default_on_conflict(),
            migrate_legacy: default_migrate_legacy(),
        }
    }
}

/// Source discovery and output naming settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanConfig {
    /// Source extensions without the leading dot (case-insensitive)
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Name of the sibling directory receiving all proxies
    #[serde(default = "default_proxies_dir_name")]
    pub proxies_dir_name: String,
    /// Marker file forcing mobile classification for its subtree
    #[serde(default = "default_mobile_marker")]
    pub mobile_marker: String,
    /// Suffix appended to the source stem for proxy names
    #[serde(default = "default_proxy_suffix")]
    pub proxy_suffix: String,
}

fn default_extensions() -> Vec<String> {
    ["mp4", "mov", "mxf", "avi", "mkv"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_proxies_dir_name() -> String {
    "proxies".to_string()
}

fn default_mobile_marker() -> String {
    ".is_android".to_string()
}

fn default_proxy_suffix() -> String {
    "_proxy".to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            proxies_dir_name: default_proxies_dir_name(),
            mobile_marker: default_mobile_marker(),
            proxy_suffix: default_proxy_suffix(),
        }
    }
}

/// External tool locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,
    #[serde(default = "default_exiftool")]
    pub exiftool: String,
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_exiftool() -> String {
    "exiftool".to_string()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            exiftool: default_exiftool(),
        }
    }
}

/// Benchmark sweep settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkConfig {
    /// Directory (sibling of the source tree) receiving benchmark reports
    #[serde(default = "default_logs_dir_name")]
    pub logs_dir_name: String,
    /// Idle pause between two configurations
    #[serde(default = "default_pause_between_runs_secs")]
    pub pause_between_runs_secs: u64,
    /// Minimum efficiency for a sweet-spot recommendation
    #[serde(default = "default_sweet_spot_min_efficiency")]
    pub sweet_spot_min_efficiency: f64,
    /// Minimum speedup for a sweet-spot recommendation
    #[serde(default = "default_sweet_spot_min_speedup")]
    pub sweet_spot_min_speedup: f64,
}

fn default_logs_dir_name() -> String {
    "benchmark_logs".to_string()
}

fn default_pause_between_runs_secs() -> u64 {
    2
}

fn default_sweet_spot_min_efficiency() -> f64 {
    0.70
}

fn default_sweet_spot_min_speedup() -> f64 {
    2.0
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            logs_dir_name: default_logs_dir_name(),
            pause_between_runs_secs: default_pause_between_runs_secs(),
            sweet_spot_min_efficiency: default_sweet_spot_min_efficiency(),
            sweet_spot_min_speedup: default_sweet_spot_min_speedup(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - PROXYFORGE_CODEC -> proxy.codec
    /// - PROXYFORGE_SCALE -> proxy.scale
    /// - PROXYFORGE_MAX_WORKERS -> proxy.max_workers
    /// - PROXYFORGE_PARALLEL -> proxy.parallel
    /// - PROXYFORGE_ON_CONFLICT -> proxy.on_conflict
    /// - PROXYFORGE_FFMPEG / PROXYFORGE_FFPROBE / PROXYFORGE_EXIFTOOL -> tools.*
    pub fn apply_env_overrides(&mut self) {
        if let Some(codec) = env::var("PROXYFORGE_CODEC").ok().and_then(|v| Codec::parse(&v)) {
            self.proxy.codec = codec;
        }

        if let Some(scale) = env::var("PROXYFORGE_SCALE").ok().and_then(|v| Scale::parse(&v)) {
            self.proxy.scale = scale;
        }

        if let Ok(val) = env::var("PROXYFORGE_MAX_WORKERS") {
            if let Ok(workers) = val.parse::<u32>() {
                if workers > 0 {
                    self.proxy.max_workers = Some(workers);
                }
            }
        }

        if let Ok(val) = env::var("PROXYFORGE_PARALLEL") {
            // Accept "true", "1", "yes" as true; "false", "0", "no" as false
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.proxy.parallel = true,
                "false" | "0" | "no" => self.proxy.parallel = false,
                _ => {} // Invalid value, keep existing
            }
        }

        if let Some(mode) = env::var("PROXYFORGE_ON_CONFLICT")
            .ok()
            .and_then(|v| ConflictMode::parse(&v))
        {
            self.proxy.on_conflict = mode;
        }

        if let Ok(val) = env::var("PROXYFORGE_FFMPEG") {
            if !val.trim().is_empty() {
                self.tools.ffmpeg = val;
            }
        }
        if let Ok(val) = env::var("PROXYFORGE_FFPROBE") {
            if !val.trim().is_empty() {
                self.tools.ffprobe = val;
            }
        }
        if let Ok(val) = env::var("PROXYFORGE_EXIFTOOL") {
            if !val.trim().is_empty() {
                self.tools.exiftool = val;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }
}

/// Number of concurrent encode workers for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPlan {
    /// Logical cores detected (or assumed)
    pub logical_cores: u32,
    /// Workers the scheduler will run
    pub workers: u32,
}

impl WorkerPlan {
    /// Derive the worker count from the proxy settings and detected cores
    pub fn derive(proxy: &ProxyConfig) -> Self {
        Self::derive_with_cores(proxy, num_cpus::get() as u32)
    }

    /// Derive using an explicit core count
    ///
    /// - `parallel = false` forces a single worker
    /// - an explicit non-zero `max_workers` is used unchanged
    /// - otherwise half the logical cores (at least 1), capped at 8
    pub fn derive_with_cores(proxy: &ProxyConfig, logical_cores: u32) -> Self {
        let workers = if !proxy.parallel {
            1
        } else {
            match proxy.max_workers {
                Some(n) if n > 0 => n,
                _ => auto_workers(logical_cores),
            }
        };

        Self {
            logical_cores,
            workers,
        }
    }
}

fn auto_workers(logical_cores: u32) -> u32 {
    (logical_cores / 2).clamp(1, 8)
}
