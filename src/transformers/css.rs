use crate::transform::{TransformError, TransformOutput, Transformer};
use crate::types::ContentType;

/// Whitespace-and-comments CSS minifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct CssMinifyTransformer;

impl Transformer for CssMinifyTransformer {
    fn name(&self) -> &str {
        "css-minify"
    }

    fn applies_to(&self, _path: &str, content_type: &ContentType) -> bool {
        content_type.as_str() == "css"
    }

    fn transform(&self, content: Vec<u8>, path: &str) -> Result<TransformOutput, TransformError> {
        let css = String::from_utf8(content)?;
        Ok(TransformOutput::new(minify(&css), path))
    }
}

/// Characters that never need whitespace on either side.
const TIGHT: [char; 5] = ['{', '}', ';', ',', '>'];

/// Strip comments and collapse whitespace. String literals are kept verbatim.
pub fn minify(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut chars = css.chars().peekable();
    let mut space = false;

    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            c if c.is_whitespace() => space = true,
            c if TIGHT.contains(&c) => {
                space = false;
                if c == '}' && out.ends_with(';') {
                    out.pop();
                }
                out.push(c);
            }
            _ => {
                if space && !out.is_empty() && !out.ends_with(TIGHT) {
                    out.push(' ');
                }
                space = false;
                out.push(c);
                if c == '"' || c == '\'' {
                    copy_string(&mut chars, &mut out, c);
                }
            }
        }
    }
    out
}

fn copy_string(chars: &mut impl Iterator<Item = char>, out: &mut String, quote: char) {
    while let Some(c) = chars.next() {
        out.push(c);
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else if c == quote {
            break;
        }
    }
}
