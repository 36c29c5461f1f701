//! Output layout: where proxies, run records, and benchmark reports live.
//!
//! All proxies of a source tree go into one `proxies` directory that is a
//! sibling of the tree root. Proxy names are `<stem><suffix>.<ext>`; duplicate
//! proxies created next to an existing proxy of another format carry the codec
//! as well, `<stem><suffix>_<codec>.<ext>`, so they can never collide with it.
//!
//! Sources from different folders may share a stem. The planner then walks
//! [`OutputLayout::destination_candidates`] until it finds a name no other
//! source of the run has claimed.

use proxyforge_config::{Codec, ScanConfig};
use std::path::{Path, PathBuf};

/// Directory (sibling of the tree root) receiving per-run JSON records.
pub const RUN_LOGS_DIR_NAME: &str = "proxy_logs";

#[derive(Debug, Clone, PartialEq)]
pub struct OutputLayout {
    tree_root: PathBuf,
    proxies_dir: PathBuf,
    proxy_suffix: String,
}

impl OutputLayout {
    /// Layout for a source tree rooted at `tree_root`
    pub fn for_tree(tree_root: &Path, cfg: &ScanConfig) -> Self {
        let proxies_dir = sibling_of(tree_root, &cfg.proxies_dir_name);
        Self {
            tree_root: tree_root.to_path_buf(),
            proxies_dir,
            proxy_suffix: cfg.proxy_suffix.clone(),
        }
    }

    pub fn tree_root(&self) -> &Path {
        &self.tree_root
    }

    pub fn proxies_dir(&self) -> &Path {
        &self.proxies_dir
    }

    /// `<stem><suffix>` for a source file
    pub fn proxy_stem(&self, source: &Path) -> String {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}{}", stem, self.proxy_suffix)
    }

    /// Regular proxy destination for a source encoded with `codec`
    pub fn proxy_path(&self, source: &Path, codec: Codec) -> PathBuf {
        self.proxies_dir.join(format!(
            "{}.{}",
            self.proxy_stem(source),
            codec.container_extension()
        ))
    }

    /// `<stem><suffix>_<qualifier>.<ext>`
    pub fn qualified_proxy_path(&self, source: &Path, codec: Codec, qualifier: &str) -> PathBuf {
        self.proxies_dir.join(format!(
            "{}_{}.{}",
            self.proxy_stem(source),
            qualifier,
            codec.container_extension()
        ))
    }

    /// Proxy destinations for `source` in order of preference.
    ///
    /// The plain name comes first, then the name qualified by the source
    /// extension, then by the parent folder name, then by a counter starting
    /// at 2. The sequence is infinite.
    pub fn destination_candidates<'a>(
        &'a self,
        source: &'a Path,
        codec: Codec,
    ) -> impl Iterator<Item = PathBuf> + 'a {
        let extension = source
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());
        let folder = source
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned());
        let named = [extension, folder]
            .into_iter()
            .flatten()
            .filter(|q| !q.is_empty())
            .map(move |q| self.qualified_proxy_path(source, codec, &q));
        let numbered =
            (2u32..).map(move |n| self.qualified_proxy_path(source, codec, &n.to_string()));

        std::iter::once(self.proxy_path(source, codec))
            .chain(named)
            .chain(numbered)
    }

    /// Destination for a duplicate proxy of `planned`, carrying the codec name
    pub fn duplicate_path(&self, planned: &Path, codec: Codec) -> PathBuf {
        let stem = planned
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.proxies_dir.join(format!(
            "{}_{}.{}",
            stem,
            codec.as_str(),
            codec.container_extension()
        ))
    }

    /// A directory that sits next to the tree root (e.g. benchmark logs)
    pub fn sibling_dir(&self, name: &str) -> PathBuf {
        sibling_of(&self.tree_root, name)
    }
}

fn sibling_of(tree_root: &Path, name: &str) -> PathBuf {
    match tree_root.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(name),
        _ => tree_root.join(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn layout() -> OutputLayout {
        OutputLayout::for_tree(Path::new("/footage/shoot"), &ScanConfig::default())
    }

    #[test]
    fn test_proxies_dir_is_sibling() {
        assert_eq!(layout().proxies_dir(), Path::new("/footage/proxies"));
        assert_eq!(
            layout().sibling_dir("benchmark_logs"),
            PathBuf::from("/footage/benchmark_logs")
        );
    }

    #[test]
    fn test_proxy_names() {
        let l = layout();
        let src = Path::new("/footage/shoot/day1/clip001.MXF");
        assert_eq!(
            l.proxy_path(src, Codec::Prores),
            PathBuf::from("/footage/proxies/clip001_proxy.mov")
        );
        assert_eq!(
            l.proxy_path(src, Codec::H264),
            PathBuf::from("/footage/proxies/clip001_proxy.mp4")
        );
        assert_eq!(
            l.duplicate_path(&l.proxy_path(src, Codec::H264), Codec::H264),
            PathBuf::from("/footage/proxies/clip001_proxy_h264.mp4")
        );
    }

    #[test]
    fn test_destination_candidates_order() {
        let l = layout();
        let src = Path::new("/footage/shoot/cam_b/clip001.MXF");
        let names: Vec<_> = l
            .destination_candidates(src, Codec::Prores)
            .take(5)
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "clip001_proxy.mov",
                "clip001_proxy_mxf.mov",
                "clip001_proxy_cam_b.mov",
                "clip001_proxy_2.mov",
                "clip001_proxy_3.mov",
            ]
        );
    }

    #[test]
    fn test_destination_candidates_without_extension() {
        let l = layout();
        let names: Vec<_> = l
            .destination_candidates(Path::new("/footage/shoot/clip"), Codec::H264)
            .take(3)
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["clip_proxy.mp4", "clip_proxy_shoot.mp4", "clip_proxy_2.mp4"]);
    }

    // *For any* source stem and pair of codecs, the duplicate destination never
    // equals a regular proxy destination.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_duplicate_never_collides(
            stem in "[a-zA-Z0-9_]{1,16}",
            a in 0usize..3,
            b in 0usize..3,
        ) {
            let l = layout();
            let src = PathBuf::from(format!("/footage/shoot/{}.mov", stem));
            let dup = l.duplicate_path(&l.proxy_path(&src, Codec::ALL[a]), Codec::ALL[a]);
            let regular = l.proxy_path(&src, Codec::ALL[b]);
            prop_assert_ne!(dup, regular);
        }
    }
}
