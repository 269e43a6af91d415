use crate::transform::{TransformError, TransformOutput, Transformer, default_output_path};
use crate::types::ContentType;
use pulldown_cmark::{Options, Parser, html};

/// Markdown to HTML body fragment.
///
/// Reference tokens written as link targets (`[styles](@ref(site.css))`)
/// survive rendering untouched and are resolved by the engine afterwards.
#[derive(Debug, Clone)]
pub struct MarkdownTransformer {
    options: Options,
}

impl MarkdownTransformer {
    pub fn new() -> Self {
        Self {
            options: Options::ENABLE_TABLES
                | Options::ENABLE_FOOTNOTES
                | Options::ENABLE_STRIKETHROUGH,
        }
    }
}

impl Default for MarkdownTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl Transformer for MarkdownTransformer {
    fn name(&self) -> &str {
        "markdown"
    }

    fn applies_to(&self, _path: &str, content_type: &ContentType) -> bool {
        matches!(content_type.as_str(), "md" | "markdown")
    }

    fn produces(&self) -> Option<ContentType> {
        Some(ContentType::new("html"))
    }

    fn transform(&self, content: Vec<u8>, path: &str) -> Result<TransformOutput, TransformError> {
        let source = String::from_utf8(content)?;
        let mut body = String::with_capacity(source.len() * 3 / 2);
        html::push_html(&mut body, Parser::new_ext(&source, self.options));
        Ok(TransformOutput::new(
            body,
            default_output_path(path, self.produces().as_ref()),
        ))
    }
}
