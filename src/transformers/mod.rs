//! Built-in transformers.
//!
//! | Name | Applies to | Produces | Effect |
//! |------|-----------|----------|--------|
//! | `markdown` | `md`, `markdown` | `html` | CommonMark + tables, footnotes, strikethrough |
//! | `layout` | `html` | | wraps the body in a document shell |
//! | `css-minify` | `css` | | strips comments, collapses whitespace |
//! | `fingerprint` | `css`, `js` | | renames to `name.<hash>.ext` |
//!
//! Config lists them by name; the list order is registration order.

mod css;
mod fingerprint;
mod layout;
mod markdown;

pub use css::{CssMinifyTransformer, minify};
pub use fingerprint::FingerprintTransformer;
pub use layout::LayoutTransformer;
pub use markdown::MarkdownTransformer;

use crate::config::LayoutConfig;
use crate::layout::ShellLayout;
use crate::registry::{RegistryError, TransformerRegistry};

/// Names accepted in the `transformers` config list.
pub const BUILTIN_NAMES: &[&str] = &["markdown", "layout", "css-minify", "fingerprint"];

/// Register the named built-ins, in order.
pub fn registry_from_names<S: AsRef<str>>(
    names: &[S],
    layout: Option<&LayoutConfig>,
) -> Result<TransformerRegistry, RegistryError> {
    let mut registry = TransformerRegistry::new();
    for name in names {
        match name.as_ref() {
            "markdown" => registry.register(MarkdownTransformer::new())?,
            "layout" => registry.register(match layout {
                Some(config) => LayoutTransformer::new(shell_layout(config)),
                None => LayoutTransformer::passthrough(),
            })?,
            "css-minify" => registry.register(CssMinifyTransformer)?,
            "fingerprint" => registry.register(FingerprintTransformer::default())?,
            other => return Err(RegistryError::Unknown(other.to_string())),
        }
    }
    Ok(registry)
}

fn shell_layout(config: &LayoutConfig) -> ShellLayout {
    ShellLayout::new(&config.title)
        .with_lang(&config.lang)
        .with_stylesheets(config.stylesheets.clone())
}
