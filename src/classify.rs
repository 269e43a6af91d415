//! File classification: which transformers apply to an entry, and where its
//! output lands by default.
//!
//! Classification walks the registry in priority order while tracking a
//! *declared* path and content type, starting from the source file's own.
//! Each transformer that accepts the declared pair joins the chain, and its
//! declared output type (if any) becomes the type the next transformer sees:
//!
//! ```text
//! registry: [markdown (md→html), layout (html), css-minify (css)]
//!
//! index.md   md   → markdown → html → layout → html      => index.html
//! site.css   css  → css-minify                            => site.css
//! logo.png   png  → (nothing applies)                     => logo.png
//! ```
//!
//! This is what lets a post-processor registered after a compiler pick up the
//! compiler's output type. When several selected transformers declare
//! different output types, the last one wins.
//!
//! The function is pure: identical inputs always give identical results.

use crate::registry::TransformerDescriptor;
use crate::rules::PathRules;
use crate::transform::default_output_path;
use crate::types::SourceEntry;

/// How the engine should treat an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Run the transformer chain (possibly empty).
    Transform,
    /// Matched a passthrough rule: copy verbatim, never transform.
    Passthrough,
    Directory,
}

/// Result of classifying one entry.
#[derive(Debug, Clone)]
pub struct Classification {
    pub disposition: Disposition,
    /// Transformers to run, in execution order.
    pub transformers: Vec<TransformerDescriptor>,
    /// Declared default output path.
    pub output_path: String,
}

impl Classification {
    pub fn identities(&self) -> Vec<&str> {
        self.transformers
            .iter()
            .map(|d| d.identity.as_str())
            .collect()
    }

    /// True when the entry's bytes are copied unchanged.
    pub fn is_verbatim(&self) -> bool {
        self.disposition == Disposition::Passthrough || self.transformers.is_empty()
    }
}

pub fn classify(
    entry: &SourceEntry,
    descriptors: &[TransformerDescriptor],
    passthrough: &PathRules,
) -> Classification {
    if entry.is_dir() {
        return identity(entry, Disposition::Directory);
    }
    if passthrough.matches(&entry.path) {
        return identity(entry, Disposition::Passthrough);
    }

    let mut ordered: Vec<&TransformerDescriptor> = descriptors.iter().collect();
    ordered.sort_by_key(|d| d.priority);

    let mut declared_path = entry.path.clone();
    let mut declared_type = entry.content_type();
    let mut selected = Vec::new();

    for descriptor in ordered {
        if !descriptor.applies_to(&declared_path, &declared_type) {
            continue;
        }
        if let Some(produces) = &descriptor.produces {
            declared_path = default_output_path(&declared_path, Some(produces));
            declared_type = produces.clone();
        }
        selected.push(descriptor.clone());
    }

    Classification {
        disposition: Disposition::Transform,
        transformers: selected,
        output_path: declared_path,
    }
}

fn identity(entry: &SourceEntry, disposition: Disposition) -> Classification {
    Classification {
        disposition,
        transformers: Vec::new(),
        output_path: entry.path.clone(),
    }
}
