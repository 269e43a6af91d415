//! Cross-file reference tokens.
//!
//! A transformer that needs to point at another source file emits a
//! reference token instead of a URL:
//!
//! ```text
//! <link rel="stylesheet" href="@ref(css/site.util.css)">
//! ```
//!
//! The path inside the token is relative to the source root (a leading `/`
//! or `./` is accepted). The engine replaces each token with `/` followed by
//! the referenced file's *final* output path, so the page above ends up
//! linking to whatever `css/site.util.css` became after its own chain ran,
//! e.g. `/css/site.css`.

use std::collections::BTreeSet;
use std::ops::Range;

const OPEN: &str = "@ref(";

/// One token found in a piece of content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// The path as written between the parentheses.
    pub raw: String,
    /// Normalised source identity, or `None` if the path leaves the root.
    pub target: Option<String>,
    span: Range<usize>,
}

/// Find every well-formed reference token in `text`, in order.
///
/// An opener without a closing `)` on the same line is left alone.
pub fn find_references(text: &str) -> Vec<Reference> {
    let mut refs = Vec::new();
    let mut cursor = 0;
    while let Some(offset) = text[cursor..].find(OPEN) {
        let start = cursor + offset;
        let body_start = start + OPEN.len();
        let rest = &text[body_start..];
        let Some(close) = rest.find([')', '\n']).filter(|&i| rest.as_bytes()[i] == b')') else {
            cursor = body_start;
            continue;
        };
        let raw = unquote(rest[..close].trim()).to_string();
        refs.push(Reference {
            target: normalize(&raw),
            raw,
            span: start..body_start + close + 1,
        });
        cursor = body_start + close + 1;
    }
    refs
}

/// Distinct normalised targets referenced by `text`.
pub fn targets(refs: &[Reference]) -> BTreeSet<String> {
    refs.iter().filter_map(|r| r.target.clone()).collect()
}

/// Replace every token with the URL `resolve` gives for its target.
///
/// Tokens whose target `resolve` does not know are left untouched; the
/// engine never calls this before all targets are resolvable.
pub fn substitute<F>(text: &str, refs: &[Reference], mut resolve: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for reference in refs {
        let replacement = reference.target.as_deref().and_then(&mut resolve);
        if let Some(url) = replacement {
            out.push_str(&text[last..reference.span.start]);
            out.push_str(&url);
            last = reference.span.end;
        }
    }
    out.push_str(&text[last..]);
    out
}

/// Public URL for an output path: root-relative with a leading slash.
pub fn output_url(output_path: &str) -> String {
    format!("/{}", output_path.trim_start_matches('/'))
}

/// Build a token pointing at `path`. Used by transformers that emit links.
pub fn reference_token(path: &str) -> String {
    format!("{OPEN}{path})")
}

/// Normalise a referenced path to a source identity.
///
/// Strips leading `/` and `./`, resolves `.` and `..` segments, and rejects
/// paths that would climb above the root.
pub fn normalize(raw: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            part => parts.push(part),
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn unquote(s: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(quote).and_then(|s| s.strip_suffix(quote)) {
            return inner;
        }
    }
    s
}
