pub mod inventory;

use crate::SUPPORTED_EXTENSIONS;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Dataset root {path} is not accessible: {source}")]
    Root {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Dataset root {0} is not a directory")]
    NotADirectory(String),
}

/// How class labels are read off the directory layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LabelMode {
    /// `root/<genre>/<track>`: the directory holding the track is the class.
    #[default]
    Genre,
    /// `root/<artist>/<album>/<track>`: the album's parent is the class, so
    /// every album of an artist shares one label.
    Artist,
}

impl LabelMode {
    /// Depth below the root of the directories that directly hold tracks.
    pub fn container_depth(self) -> usize {
        match self {
            Self::Genre => 1,
            Self::Artist => 2,
        }
    }

    /// Depth below the root at which track files live.
    pub fn track_depth(self) -> usize {
        self.container_depth() + 1
    }

    /// The class directory for a track-holding directory: the directory
    /// itself in genre mode, the album's parent (the artist) in artist mode.
    fn class_dir(self, container: &Path) -> Option<&Path> {
        match self {
            Self::Genre => Some(container),
            Self::Artist => container.parent(),
        }
    }

    /// Class name for a track-holding directory, or `None` when the
    /// directory does not sit at class level under `root`.
    ///
    /// `root` must be the canonical root the walk started from; both checks
    /// compare path contents, so the root itself is never taken as a class.
    pub fn class_name(self, container: &Path, root: &Path) -> Option<String> {
        let class_dir = self.class_dir(container)?;
        if is_root(class_dir, root) || !class_dir.parent().is_some_and(|p| is_root(p, root)) {
            return None;
        }
        class_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }
}

impl std::fmt::Display for LabelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Genre => write!(f, "genre"),
            Self::Artist => write!(f, "artist"),
        }
    }
}

/// Ordered class names; a name's index is its position of first appearance.
#[derive(Debug, Default, Clone)]
pub struct LabelMapping {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl LabelMapping {
    /// Index for `name`, appending it if this is the first time it is seen.
    pub fn register(&mut self, name: &str) -> usize {
        if let Some(&label) = self.index.get(name) {
            return label;
        }
        let label = self.names.len();
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), label);
        label
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn into_names(self) -> Vec<String> {
        self.names
    }
}

/// One audio file and the class it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledTrack {
    pub label: usize,
    pub class_name: String,
    pub path: PathBuf,
}

/// Result of walking a dataset root.
#[derive(Debug)]
pub struct Traversal {
    /// Canonicalized dataset root.
    pub root: PathBuf,
    pub mode: LabelMode,
    pub mapping: LabelMapping,
    /// Tracks in traversal order (lexicographic at every level).
    pub tracks: Vec<LabeledTrack>,
    /// Files at track level whose extension is not a supported audio type.
    pub unsupported: u64,
}

/// True if `path` has one of the supported audio extensions.
pub fn is_supported_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

fn is_root(path: &Path, root: &Path) -> bool {
    path == root
}

fn canonical_root(root: &Path) -> Result<PathBuf, ScanError> {
    let canonical = root.canonicalize().map_err(|source| ScanError::Root {
        path: root.display().to_string(),
        source,
    })?;
    if !canonical.is_dir() {
        return Err(ScanError::NotADirectory(root.display().to_string()));
    }
    Ok(canonical)
}

/// Walk a dataset root and label every supported track.
///
/// Classes are registered when their track-holding directory is visited, so a
/// class keeps its index even if none of its files decode. Entries that
/// cannot be read are logged and skipped.
pub fn walk(root: &Path, mode: LabelMode) -> Result<Traversal, ScanError> {
    let root = canonical_root(root)?;
    let mut mapping = LabelMapping::default();
    let mut tracks = Vec::new();
    let mut unsupported = 0u64;

    // Track-holding directory currently being walked, with its label.
    let mut current: Option<(PathBuf, usize, String)> = None;

    let walker = WalkDir::new(&root)
        .follow_links(true)
        .min_depth(1)
        .max_depth(mode.track_depth())
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        if entry.file_type().is_dir() {
            if entry.depth() == mode.container_depth() {
                current = mode.class_name(entry.path(), &root).map(|name| {
                    let label = mapping.register(&name);
                    log::debug!("Class {} ({}) <- {}", label, name, entry.path().display());
                    (entry.path().to_path_buf(), label, name)
                });
            }
            continue;
        }

        if entry.depth() != mode.track_depth() {
            log::trace!("Ignoring {} (not at track level)", entry.path().display());
            continue;
        }

        let Some((dir, label, class_name)) = &current else {
            continue;
        };
        if entry.path().parent() != Some(dir.as_path()) {
            continue;
        }

        if !is_supported_audio(entry.path()) {
            log::debug!("Skipping unsupported file {}", entry.path().display());
            unsupported += 1;
            continue;
        }

        tracks.push(LabeledTrack {
            label: *label,
            class_name: class_name.clone(),
            path: entry.into_path(),
        });
    }

    log::info!(
        "Found {} tracks in {} classes under {} ({} mode, {} unsupported files skipped)",
        tracks.len(),
        mapping.len(),
        root.display(),
        mode,
        unsupported
    );

    Ok(Traversal {
        root,
        mode,
        mapping,
        tracks,
        unsupported,
    })
}
