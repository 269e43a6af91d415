//! Page layouts.
//!
//! A [`Layout`] wraps a rendered page body in a full HTML document. The
//! pipeline never renders layouts itself; the `layout` transformer calls one.
//! Stylesheets are linked with reference tokens so the engine rewrites them
//! to wherever the stylesheet ends up after its own transformers ran.

use crate::reference::reference_token;
use maud::{DOCTYPE, Markup, PreEscaped, html};

/// What a layout receives for one page.
#[derive(Debug, Clone, Copy)]
pub struct Page<'a> {
    pub title: &'a str,
    /// Output path of the page being wrapped.
    pub path: &'a str,
    /// Rendered body HTML, inserted unescaped.
    pub children: &'a str,
}

pub trait Layout: Send + Sync {
    fn render(&self, page: &Page<'_>) -> String;
}

/// Minimal document shell: doctype, head with stylesheet links, body slot.
#[derive(Debug, Clone)]
pub struct ShellLayout {
    site_title: String,
    lang: String,
    stylesheets: Vec<String>,
}

impl ShellLayout {
    pub fn new(site_title: impl Into<String>) -> Self {
        Self {
            site_title: site_title.into(),
            lang: "en".to_string(),
            stylesheets: Vec::new(),
        }
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    /// Source-relative stylesheet paths to link from every page.
    pub fn with_stylesheets(mut self, stylesheets: Vec<String>) -> Self {
        self.stylesheets = stylesheets;
        self
    }

    fn document(&self, page: &Page<'_>) -> Markup {
        let title = if page.title.is_empty() || page.title == self.site_title {
            self.site_title.clone()
        } else if self.site_title.is_empty() {
            page.title.to_string()
        } else {
            format!("{} | {}", page.title, self.site_title)
        };

        html! {
            (DOCTYPE)
            html lang=(self.lang) {
                head {
                    meta charset="UTF-8";
                    meta name="viewport" content="width=device-width, initial-scale=1.0";
                    title { (title) }
                    @for sheet in &self.stylesheets {
                        link rel="stylesheet" href=(reference_token(sheet));
                    }
                }
                body {
                    (PreEscaped(page.children))
                }
            }
        }
    }
}

impl Layout for ShellLayout {
    fn render(&self, page: &Page<'_>) -> String {
        self.document(page).into_string()
    }
}

/// Text of the first `<h1>` in `html`, with inner tags removed.
pub fn first_heading(html: &str) -> Option<String> {
    let start = html.find("<h1")?;
    let open_end = start + html[start..].find('>')? + 1;
    let close = open_end + html[open_end..].find("</h1>")?;

    let mut text = String::new();
    let mut in_tag = false;
    for c in html[open_end..close].chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
