use crate::layout::{Layout, Page, first_heading};
use crate::transform::{TransformError, TransformOutput, Transformer};
use crate::types::ContentType;
use std::fmt;

/// Wraps HTML bodies in a [`Layout`].
///
/// Files that already look like full documents (start with a doctype or
/// `<html>`) are left alone, as is everything when no layout is configured.
pub struct LayoutTransformer {
    layout: Option<Box<dyn Layout>>,
}

impl LayoutTransformer {
    pub fn new(layout: impl Layout + 'static) -> Self {
        Self {
            layout: Some(Box::new(layout)),
        }
    }

    pub fn passthrough() -> Self {
        Self { layout: None }
    }
}

impl fmt::Debug for LayoutTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutTransformer")
            .field("configured", &self.layout.is_some())
            .finish()
    }
}

fn is_full_document(html: &str) -> bool {
    let head = html.trim_start();
    let head = head.get(..9).unwrap_or(head).to_ascii_lowercase();
    head.starts_with("<!doctype") || head.starts_with("<html")
}

impl Transformer for LayoutTransformer {
    fn name(&self) -> &str {
        "layout"
    }

    fn applies_to(&self, _path: &str, content_type: &ContentType) -> bool {
        content_type.as_str() == "html"
    }

    fn transform(&self, content: Vec<u8>, path: &str) -> Result<TransformOutput, TransformError> {
        let Some(layout) = &self.layout else {
            return Ok(TransformOutput::new(content, path));
        };
        let body = String::from_utf8(content)?;
        if is_full_document(&body) {
            return Ok(TransformOutput::new(body, path));
        }

        let title = first_heading(&body).unwrap_or_default();
        let document = layout.render(&Page {
            title: &title,
            path,
            children: &body,
        });
        Ok(TransformOutput::new(document, path))
    }
}
