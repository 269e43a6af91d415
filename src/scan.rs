//! Source tree scanning.
//!
//! Walks the configured source root and yields one [`SourceEntry`] per file
//! and directory below it. The walk is lazy: file contents are read as the
//! iterator advances, so a scan can be stopped early without touching the
//! rest of the tree. Every call to [`Scanner::entries`] starts a fresh walk.
//!
//! ## Ordering
//!
//! Entries are sorted by file name within each directory, and a directory is
//! yielded before its contents:
//!
//! ```text
//! src/
//! ├── _includes/          # excluded by the default `_*` rule, never walked
//! ├── blog/               # → "blog"
//! │   └── first.md        # → "blog/first.md"
//! ├── index.md            # → "index.md"
//! └── public/             # → "public"
//!     └── logo.png        # → "public/logo.png"
//! ```
//!
//! This order is the *scan order* the engine uses for tie-breaking, which is
//! what keeps builds reproducible.
//!
//! ## Errors
//!
//! A missing or non-directory root is fatal and reported by
//! [`Scanner::new`]. Anything that goes wrong for a single entry (permission
//! denied, a file vanishing mid-walk) is yielded as an `Err` item and the walk
//! carries on with its siblings.

use crate::rules::PathRules;
use crate::types::{SourceEntry, relative_identity};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Source root not found: {0}")]
    RootNotFound(PathBuf),
    #[error("Source root is not a directory: {0}")]
    RootNotDirectory(PathBuf),
    #[error("Cannot walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("Cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Path is not valid UTF-8: {0}")]
    InvalidPath(PathBuf),
}

impl ScanError {
    /// Source-relative path of the entry this error belongs to, if known.
    pub fn entry_path(&self) -> Option<String> {
        match self {
            ScanError::Read { path, .. } => Some(path.clone()),
            ScanError::Walk { path, .. } | ScanError::InvalidPath(path) => {
                Some(path.to_string_lossy().replace('\\', "/"))
            }
            ScanError::RootNotFound(_) | ScanError::RootNotDirectory(_) => None,
        }
    }
}

/// Walks a source root, skipping hidden entries and excluded paths.
#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
    exclude: PathRules,
}

impl Scanner {
    pub fn new(root: impl Into<PathBuf>, exclude: PathRules) -> Result<Self, ScanError> {
        let root = root.into();
        if !root.exists() {
            return Err(ScanError::RootNotFound(root));
        }
        if !root.is_dir() {
            return Err(ScanError::RootNotDirectory(root));
        }
        Ok(Self { root, exclude })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a new walk of the source tree.
    pub fn entries(&self) -> Entries<'_> {
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter();
        Entries {
            scanner: self,
            walker,
        }
    }
}

/// Lazy iterator over the entries of one walk.
pub struct Entries<'a> {
    scanner: &'a Scanner,
    walker: walkdir::IntoIter,
}

impl Iterator for Entries<'_> {
    type Item = Result<SourceEntry, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .and_then(|p| p.strip_prefix(&self.scanner.root).ok())
                        .map(Path::to_path_buf)
                        .unwrap_or_default();
                    warn!(path = %path.display(), error = %err, "skipping unreadable entry");
                    return Some(Err(ScanError::Walk { path, source: err }));
                }
            };

            let rel = entry
                .path()
                .strip_prefix(&self.scanner.root)
                .unwrap_or(entry.path());
            let Some(identity) = relative_identity(rel) else {
                return Some(Err(ScanError::InvalidPath(rel.to_path_buf())));
            };

            let is_dir = entry.file_type().is_dir();
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if hidden || self.scanner.exclude.matches(&identity) {
                debug!(path = %identity, "excluded");
                if is_dir {
                    self.walker.skip_current_dir();
                }
                continue;
            }

            if is_dir {
                return Some(Ok(SourceEntry::directory(identity)));
            }

            return Some(match fs::read(entry.path()) {
                Ok(content) => Ok(SourceEntry::file(identity, content)),
                Err(source) => {
                    warn!(path = %identity, error = %source, "cannot read file");
                    Err(ScanError::Read {
                        path: identity,
                        source,
                    })
                }
            });
        }
    }
}
