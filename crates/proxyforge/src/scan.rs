//! Scanner module for discovering source videos.
//!
//! Walks a source tree (or accepts a single file) and returns the candidate
//! videos that should receive a proxy, filtering by extension and excluding
//! proxy directories and files that already look like proxies.

use log::{debug, info, warn};
use proxyforge_config::ScanConfig;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use walkdir::WalkDir;

/// Error type for source discovery.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The source path does not exist.
    #[error("Source path does not exist: {0}")]
    NotFound(PathBuf),

    /// A single-file source does not have a supported extension.
    #[error("Not a supported video file: {0}")]
    NotAVideo(PathBuf),

    /// A single-file source is itself a proxy.
    #[error("Source appears to be a proxy file: {0}")]
    LooksLikeProxy(PathBuf),
}

/// A candidate video file discovered during scanning.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanCandidate {
    /// Full path to the video file.
    pub path: PathBuf,
    /// File size in bytes at discovery time.
    pub size_bytes: u64,
    /// Last modified time of the file.
    pub modified_time: SystemTime,
}

/// Result of scanning a source path.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Root of the source tree (the directory itself, or a file's parent).
    pub tree_root: PathBuf,
    /// Candidates, sorted by path.
    pub candidates: Vec<ScanCandidate>,
}

/// Checks if a file has one of the configured extensions (case-insensitive).
pub fn is_video_file(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            extensions
                .iter()
                .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Checks if a file name marks it as a proxy rather than a source.
pub fn looks_like_proxy(path: &Path) -> bool {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_lowercase().contains("proxy"))
        .unwrap_or(false)
}

fn is_proxies_dir(path: &Path, proxies_dir_name: &str) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().eq_ignore_ascii_case(proxies_dir_name))
        .unwrap_or(false)
}

fn candidate_from_metadata(path: &Path, metadata: &std::fs::Metadata) -> ScanCandidate {
    ScanCandidate {
        path: path.to_path_buf(),
        size_bytes: metadata.len(),
        modified_time: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
    }
}

/// Scans a source path for videos.
///
/// A directory is walked recursively:
/// - directories named like the proxies directory are not descended into
/// - files must carry a configured extension
/// - files whose stem contains `proxy` are ignored
///
/// A single file is accepted as-is if it passes the same filters; its parent
/// directory becomes the tree root.
pub fn scan_sources(source: &Path, cfg: &ScanConfig) -> Result<ScanOutcome, ScanError> {
    if !source.exists() {
        return Err(ScanError::NotFound(source.to_path_buf()));
    }

    if source.is_file() {
        if !is_video_file(source, &cfg.extensions) {
            return Err(ScanError::NotAVideo(source.to_path_buf()));
        }
        if looks_like_proxy(source) {
            return Err(ScanError::LooksLikeProxy(source.to_path_buf()));
        }
        let tree_root = source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let metadata = std::fs::metadata(source)
            .map_err(|_| ScanError::NotFound(source.to_path_buf()))?;
        return Ok(ScanOutcome {
            tree_root,
            candidates: vec![candidate_from_metadata(source, &metadata)],
        });
    }

    info!("Scanning directory: {}", source.display());

    let walker = WalkDir::new(source).into_iter().filter_entry(|entry| {
        // Never descend into proxy output directories below the root
        !(entry.depth() > 0
            && entry.file_type().is_dir()
            && is_proxies_dir(entry.path(), &cfg.proxies_dir_name))
    });

    let mut candidates = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Error reading directory entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !is_video_file(path, &cfg.extensions) || looks_like_proxy(path) {
            continue;
        }

        match entry.metadata() {
            Ok(metadata) => {
                debug!("Found source video: {}", path.display());
                candidates.push(candidate_from_metadata(path, &metadata));
            }
            Err(e) => warn!("Failed to stat {}: {}", path.display(), e),
        }
    }

    candidates.sort_by(|a, b| a.path.cmp(&b.path));
    info!(
        "Scan complete: {} video file(s) under {}",
        candidates.len(),
        source.display()
    );

    Ok(ScanOutcome {
        tree_root: source.to_path_buf(),
        candidates,
    })
}
