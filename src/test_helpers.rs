//! Shared test utilities for the sitepipe test suite.
//!
//! Provides fixture setup, in-memory source trees, and a configurable stub
//! transformer that records every call it receives.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let log = InvocationLog::default();
//! let registry = TransformerRegistry::new()
//!     .with(StubTransformer::for_type("compile", "scss").producing("css").recording(&log))
//!     .unwrap();
//!
//! let plan = pipeline.plan_entries(entries(&[("theme.scss", "body {}")]));
//! assert_eq!(log.for_path("theme.scss"), vec!["compile"]);
//! ```

use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use crate::scan::ScanError;
use crate::transform::{TransformError, TransformOutput, Transformer, default_output_path};
use crate::types::{ContentType, SourceEntry};

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/site/` to a temp directory and return it.
///
/// Tests get an isolated copy they can mutate without affecting other tests
/// or the source fixtures.
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// Write `(relative path, content)` pairs below `root`, creating parents.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (path, content) in files {
        let full = root.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&full, content).unwrap();
    }
}

/// In-memory scan results for `Pipeline::plan_entries`, in the given order.
pub fn entries(files: &[(&str, &str)]) -> Vec<Result<SourceEntry, ScanError>> {
    files
        .iter()
        .map(|(path, content)| Ok(SourceEntry::file(*path, *content)))
        .collect()
}

// =========================================================================
// Stub transformer
// =========================================================================

/// Shared record of `(transformer, path)` calls, in call order.
#[derive(Debug, Clone, Default)]
pub struct InvocationLog(Arc<Mutex<Vec<(String, String)>>>);

impl InvocationLog {
    fn push(&self, transformer: &str, path: &str) {
        self.0
            .lock()
            .unwrap()
            .push((transformer.to_string(), path.to_string()));
    }

    /// Transformer names invoked with `path`, in order.
    pub fn for_path(&self, path: &str) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, p)| p == path)
            .map(|(t, _)| t.clone())
            .collect()
    }
}

/// Transformer whose behaviour is assembled from builder calls.
///
/// By default it accepts everything, declares no output type, and returns
/// its input unchanged.
#[derive(Debug, Clone)]
pub struct StubTransformer {
    name: String,
    accepts: Option<ContentType>,
    produces: Option<ContentType>,
    rename: Option<(String, String)>,
    append: Option<String>,
    fail: bool,
    log: Option<InvocationLog>,
}

impl StubTransformer {
    pub fn any(name: &str) -> Self {
        Self {
            name: name.to_string(),
            accepts: None,
            produces: None,
            rename: None,
            append: None,
            fail: false,
            log: None,
        }
    }

    /// Accept only files whose current content type is `ext`.
    pub fn for_type(name: &str, ext: &str) -> Self {
        Self {
            accepts: Some(ContentType::new(ext)),
            ..Self::any(name)
        }
    }

    pub fn producing(mut self, ext: &str) -> Self {
        self.produces = Some(ContentType::new(ext));
        self
    }

    /// Rewrite a path suffix, e.g. `.util.css` → `.css`.
    pub fn renaming(mut self, from: &str, to: &str) -> Self {
        self.rename = Some((from.to_string(), to.to_string()));
        self
    }

    pub fn appending(mut self, text: &str) -> Self {
        self.append = Some(text.to_string());
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn recording(mut self, log: &InvocationLog) -> Self {
        self.log = Some(log.clone());
        self
    }
}

impl Transformer for StubTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn applies_to(&self, _path: &str, content_type: &ContentType) -> bool {
        self.accepts.as_ref().is_none_or(|t| t == content_type)
    }

    fn produces(&self) -> Option<ContentType> {
        self.produces.clone()
    }

    fn transform(&self, mut content: Vec<u8>, path: &str) -> Result<TransformOutput, TransformError> {
        if let Some(log) = &self.log {
            log.push(&self.name, path);
        }
        if self.fail {
            return Err(TransformError::failed(format!("{} refused {path}", self.name)));
        }
        let out_path = match &self.rename {
            Some((from, to)) if path.ends_with(from.as_str()) => {
                format!("{}{to}", &path[..path.len() - from.len()])
            }
            _ => default_output_path(path, self.produces.as_ref()),
        };
        if let Some(text) = &self.append {
            content.extend_from_slice(text.as_bytes());
        }
        Ok(TransformOutput::new(content, out_path))
    }
}
