//! Shared types used across all pipeline components.
//!
//! Paths inside the pipeline are plain `String`s, relative to the source root
//! (for identities) or the destination root (for output paths), always with
//! `/` separators. Keeping them as strings rather than `PathBuf` makes the
//! artifact map and every log line platform-independent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};

/// What a scanned entry is on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One discoverable unit under the source root.
///
/// Created by the scanner, never mutated, and consumed by the engine when it
/// builds the entry's task. Directory entries carry no content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Source-root-relative path; also the entry's logical identity.
    pub path: String,
    pub kind: EntryKind,
    pub content: Vec<u8>,
}

impl SourceEntry {
    pub fn file(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            content: content.into(),
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            content: Vec::new(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn content_type(&self) -> ContentType {
        ContentType::from_path(&self.path)
    }
}

/// Content type of a file, derived from its extension.
///
/// `styles.util.css` → `css`, `index.md` → `md`, `LICENSE` → empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentType(String);

impl ContentType {
    pub fn new(ext: impl AsRef<str>) -> Self {
        Self(ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
    }

    pub fn from_path(path: &str) -> Self {
        Self::new(extension(path).unwrap_or_default())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentType {
    fn from(ext: &str) -> Self {
        Self::new(ext)
    }
}

/// Final path component of a `/`-separated path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Extension of the final path component, without the dot.
///
/// Dotfiles (`.htaccess`) have no extension.
pub fn extension(path: &str) -> Option<&str> {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(&name[idx + 1..]),
    }
}

/// Replace the extension of `path` with `ext`, adding one if missing.
///
/// ```
/// use sitepipe::types::with_extension;
/// assert_eq!(with_extension("blog/post.md", "html"), "blog/post.html");
/// assert_eq!(with_extension("LICENSE", "txt"), "LICENSE.txt");
/// ```
pub fn with_extension(path: &str, ext: &str) -> String {
    let (dir, name) = match path.rfind('/') {
        Some(idx) => (&path[..=idx], &path[idx + 1..]),
        None => ("", path),
    };
    let stem = match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    };
    if ext.is_empty() {
        format!("{dir}{stem}")
    } else {
        format!("{dir}{stem}.{ext}")
    }
}

/// Convert a filesystem path relative to the source root into an identity.
///
/// Returns `None` for paths that leave the root or contain non-UTF-8 names.
pub fn relative_identity(path: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(parts.join("/"))
}
