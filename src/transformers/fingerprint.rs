use crate::transform::{TransformError, TransformOutput, Transformer};
use crate::types::{ContentType, extension, with_extension};
use sha2::{Digest, Sha256};

/// Content-hash renaming for cache busting: `site.css` → `site.1a2b3c4d.css`.
///
/// Pages that reference the file pick up the new name through the
/// artifact map, so nothing else needs to know the hash.
#[derive(Debug, Clone)]
pub struct FingerprintTransformer {
    extensions: Vec<String>,
    hash_len: usize,
}

impl Default for FingerprintTransformer {
    fn default() -> Self {
        Self {
            extensions: vec!["css".to_string(), "js".to_string()],
            hash_len: 8,
        }
    }
}

impl FingerprintTransformer {
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }
}

/// Hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

impl Transformer for FingerprintTransformer {
    fn name(&self) -> &str {
        "fingerprint"
    }

    fn applies_to(&self, _path: &str, content_type: &ContentType) -> bool {
        self.extensions.iter().any(|e| e == content_type.as_str())
    }

    fn transform(&self, content: Vec<u8>, path: &str) -> Result<TransformOutput, TransformError> {
        let Some(ext) = extension(path) else {
            return Ok(TransformOutput::new(content, path));
        };
        let hash = content_hash(&content);
        let renamed = with_extension(path, &format!("{}.{ext}", &hash[..self.hash_len]));
        Ok(TransformOutput::new(content, renamed))
    }
}
