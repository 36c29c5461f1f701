//! Orphaned proxy detection.
//!
//! A proxy is orphaned when no original with the same stem exists anywhere
//! in the tree next to its proxies directory. Two naming schemes are
//! recognised:
//! - generated proxies, `<stem>_proxy.<ext>` (optionally `_proxy_<codec>`)
//! - Sony camera proxies, `<stem>S<digits>.<ext>`

use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum OrphanError {
    #[error("Proxy directory does not exist: {0}")]
    NotFound(PathBuf),

    #[error("Proxy path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Directory names never searched for originals
const SKIPPED_DIR_NAMES: [&str; 2] = ["proxies", "proxy"];

/// Stem of a Sony proxy with its `S<digits>` suffix removed
fn strip_sony_suffix(stem: &str) -> Option<&str> {
    let digits = stem.len() - stem.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    let rest = &stem[..stem.len() - digits];
    let base = rest.strip_suffix('S')?;
    (!base.is_empty()).then_some(base)
}

/// Stem of the original a proxy file was made from, if it is a proxy at all.
pub fn original_stem(proxy: &Path) -> Option<String> {
    let stem = proxy.file_stem()?.to_str()?;
    if let Some(base) = strip_sony_suffix(stem) {
        return Some(base.to_string());
    }
    let index = stem.to_lowercase().rfind("_proxy")?;
    stem.get(..index)
        .filter(|base| !base.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Orphan {
    pub proxy: PathBuf,
    pub expected_stem: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default)]
pub struct OrphanScan {
    /// Proxy files examined
    pub proxy_files: usize,
    pub orphans: Vec<Orphan>,
}

impl OrphanScan {
    pub fn total_bytes(&self) -> u64 {
        self.orphans.iter().map(|o| o.size_bytes).sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeletionReport {
    pub deleted: usize,
    pub errors: Vec<(PathBuf, String)>,
}

pub struct OrphanScanner {
    proxies_dir: PathBuf,
    extensions: Vec<String>,
}

impl OrphanScanner {
    pub fn new(proxies_dir: &Path, extensions: &[String]) -> Self {
        Self {
            proxies_dir: proxies_dir.to_path_buf(),
            extensions: extensions.iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    fn is_video(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.contains(&e.to_lowercase()))
            .unwrap_or(false)
    }

    /// Tree searched for originals: the parent of the proxies directory
    pub fn search_root(&self) -> &Path {
        self.proxies_dir.parent().unwrap_or(&self.proxies_dir)
    }

    /// Lowercase stems of every original video below the search root
    fn original_stems(&self) -> HashMap<String, PathBuf> {
        let root = self.search_root().to_path_buf();
        let walker = WalkDir::new(&root).into_iter().filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if SKIPPED_DIR_NAMES.contains(&name.as_str()) {
                return false;
            }
            // Archived footage does not keep a proxy alive
            let relative = entry.path().strip_prefix(&root).unwrap_or(entry.path());
            !relative.to_string_lossy().to_lowercase().contains("archive")
        });

        let mut stems = HashMap::new();
        for entry in walker.filter_map(|e| e.ok()) {
            let path = entry.path();
            if entry.file_type().is_file() && self.is_video(path) {
                if let Some(stem) = path.file_stem() {
                    stems
                        .entry(stem.to_string_lossy().to_lowercase())
                        .or_insert_with(|| path.to_path_buf());
                }
            }
        }
        stems
    }

    /// Lists proxies in the proxies directory whose original is gone.
    pub fn scan(&self) -> Result<OrphanScan, OrphanError> {
        if !self.proxies_dir.exists() {
            return Err(OrphanError::NotFound(self.proxies_dir.clone()));
        }
        if !self.proxies_dir.is_dir() {
            return Err(OrphanError::NotADirectory(self.proxies_dir.clone()));
        }

        info!("Scanning proxy directory: {}", self.proxies_dir.display());
        info!("Searching for originals in: {}", self.search_root().display());
        let originals = self.original_stems();

        let read_err = |source| OrphanError::Io {
            path: self.proxies_dir.clone(),
            source,
        };
        let mut proxies: Vec<PathBuf> = std::fs::read_dir(&self.proxies_dir)
            .map_err(read_err)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && self.is_video(p))
            .collect();
        proxies.sort();

        let mut scan = OrphanScan::default();
        for proxy in proxies {
            let Some(expected_stem) = original_stem(&proxy) else {
                continue;
            };
            scan.proxy_files += 1;

            match originals.get(&expected_stem.to_lowercase()) {
                Some(original) => debug!(
                    "Found original for {}: {}",
                    proxy.display(),
                    original.display()
                ),
                None => {
                    let size_bytes = std::fs::metadata(&proxy).map(|m| m.len()).unwrap_or(0);
                    info!("Orphaned: {} (expected: {})", proxy.display(), expected_stem);
                    scan.orphans.push(Orphan {
                        proxy,
                        expected_stem,
                        size_bytes,
                    });
                }
            }
        }
        Ok(scan)
    }
}

/// Deletes the given orphans; individual failures are collected, not fatal.
pub fn delete_orphans(orphans: &[Orphan]) -> DeletionReport {
    let mut report = DeletionReport::default();
    for orphan in orphans {
        match std::fs::remove_file(&orphan.proxy) {
            Ok(()) => {
                info!("Deleted: {}", orphan.proxy.display());
                report.deleted += 1;
            }
            Err(e) => {
                warn!("Error deleting {}: {}", orphan.proxy.display(), e);
                report.errors.push((orphan.proxy.clone(), e.to_string()));
            }
        }
    }
    report
}
