//! Moving proxies left by older layouts into the shared proxies directory.
//!
//! Older runs kept a proxy next to its source, either in a `proxies` folder
//! (any case) inside the source folder or directly beside the source. Before
//! planning, each such proxy that still has a video stream is moved to
//! `<proxies dir>/<stem><suffix>.<ext>`, keeping its container, so the planner
//! treats it like any other existing proxy.

use crate::classify::SourceFile;
use crate::layout::OutputLayout;
use crate::probe::MetadataProbe;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationOutcome {
    Moved,
    /// Something already occupies the destination; the legacy proxy stays put
    DestinationExists,
    Failed(String),
}

/// One legacy proxy found for a source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Migration {
    pub source: PathBuf,
    pub from: PathBuf,
    pub to: PathBuf,
    pub outcome: MigrationOutcome,
}

impl Migration {
    pub fn moved(&self) -> bool {
        self.outcome == MigrationOutcome::Moved
    }
}

/// Regular files of `dir`, sorted; unreadable directories yield nothing.
fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect(),
        Err(e) => {
            debug!("Cannot list {}: {}", dir.display(), e);
            Vec::new()
        }
    };
    files.sort();
    files
}

fn lowercase_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// First valid legacy proxy of `source`, if any.
pub fn find_legacy_proxy(
    source: &Path,
    layout: &OutputLayout,
    validator: &dyn MetadataProbe,
) -> Option<PathBuf> {
    let folder = source.parent()?;
    let wanted = layout.proxy_stem(source).to_lowercase();
    let dir_name = layout
        .proxies_dir()
        .file_name()?
        .to_string_lossy()
        .to_lowercase();

    let legacy_dirs = subdirs(folder).into_iter().filter(|dir| {
        dir.file_name()
            .map(|n| n.to_string_lossy().to_lowercase() == dir_name)
            .unwrap_or(false)
            && dir != layout.proxies_dir()
    });
    for dir in legacy_dirs {
        let found = files_in(&dir)
            .into_iter()
            .filter(|p| lowercase_stem(p) == wanted)
            .find(|p| validator.has_video_stream(p).unwrap_or(false));
        if found.is_some() {
            return found;
        }
    }

    files_in(folder)
        .into_iter()
        .filter(|p| p != source && lowercase_stem(p).starts_with(&wanted))
        .find(|p| validator.has_video_stream(p).unwrap_or(false))
}

/// Subdirectories of `dir`, sorted.
fn subdirs(dir: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect()
        })
        .unwrap_or_default();
    dirs.sort();
    dirs
}

/// Renames `from` to `to`, copying across filesystems when needed.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)
}

/// Moves every valid legacy proxy of `sources` into the proxies directory.
///
/// Never overwrites: a destination that exists, or that an earlier source
/// of the same pass already took, is reported as
/// [`MigrationOutcome::DestinationExists`].
pub fn migrate_legacy_proxies(
    sources: &[SourceFile],
    layout: &OutputLayout,
    validator: &dyn MetadataProbe,
) -> Vec<Migration> {
    let mut taken = HashSet::new();
    let mut migrations = Vec::new();

    for source in sources {
        let Some(from) = find_legacy_proxy(&source.path, layout, validator) else {
            continue;
        };
        let name = match from.extension() {
            Some(ext) => format!(
                "{}.{}",
                layout.proxy_stem(&source.path),
                ext.to_string_lossy().to_lowercase()
            ),
            None => layout.proxy_stem(&source.path),
        };
        let to = layout.proxies_dir().join(name);

        let outcome = if !taken.insert(to.to_string_lossy().to_lowercase()) || to.exists() {
            warn!(
                "Not moving {}: {} already exists",
                from.display(),
                to.display()
            );
            MigrationOutcome::DestinationExists
        } else {
            match fs::create_dir_all(layout.proxies_dir()).and_then(|_| move_file(&from, &to)) {
                Ok(()) => {
                    info!("Moved existing proxy {} -> {}", from.display(), to.display());
                    MigrationOutcome::Moved
                }
                Err(e) => {
                    warn!("Failed to move {}: {}", from.display(), e);
                    MigrationOutcome::Failed(e.to_string())
                }
            }
        };

        migrations.push(Migration {
            source: source.path.clone(),
            from,
            to,
            outcome,
        });
    }
    migrations
}
