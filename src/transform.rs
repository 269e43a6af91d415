//! Transformer capability trait and shared types.
//!
//! A [`Transformer`] is one stage of a file's build: markdown rendering, a
//! layout shell, a CSS post-processor, fingerprinting. The pipeline core only
//! ever talks to transformers through this trait, so concrete implementations
//! (see [`crate::transformers`]) are interchangeable and testable in isolation.

use crate::types::{ContentType, with_extension};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Input is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("{0}")]
    Failed(String),
}

impl TransformError {
    pub fn failed(message: impl Into<String>) -> Self {
        TransformError::Failed(message.into())
    }
}

/// New content and output path produced by one transformer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutput {
    pub content: Vec<u8>,
    /// Destination-relative output path after this stage.
    pub path: String,
}

impl TransformOutput {
    pub fn new(content: impl Into<Vec<u8>>, path: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            path: path.into(),
        }
    }
}

/// A pluggable build stage.
///
/// `applies_to` must be a pure function of its arguments: the classifier
/// calls it once per file while planning, and the resulting chain is fixed
/// for the rest of the build.
pub trait Transformer: Send + Sync {
    /// Unique identity within a registry; appears in logs and errors.
    fn name(&self) -> &str;

    fn applies_to(&self, path: &str, content_type: &ContentType) -> bool;

    /// Content type this stage emits. `None` leaves the type unchanged.
    fn produces(&self) -> Option<ContentType> {
        None
    }

    /// Transform `content`, currently destined for `path`.
    fn transform(&self, content: Vec<u8>, path: &str) -> Result<TransformOutput, TransformError>;
}

/// The path a stage emits by default: `path` with its extension rewritten to
/// `produces`, or unchanged when the stage keeps the type.
pub fn default_output_path(path: &str, produces: Option<&ContentType>) -> String {
    match produces {
        Some(ct) => with_extension(path, ct.as_str()),
        None => path.to_string(),
    }
}
