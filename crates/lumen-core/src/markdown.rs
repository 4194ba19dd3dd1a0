//! Markdown and math renderer seams.
//!
//! The render pipeline decides *what* is math, reasoning or code. Turning
//! markdown into HTML and typesetting formulas is delegated to the
//! implementations behind these traits.

use std::sync::LazyLock;

use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, html};
use regex::Regex;

/// Converts markdown to HTML.
pub trait MarkdownRenderer: Send + Sync {
    fn render(&self, markdown: &str) -> Result<String, RenderError>;
}

/// Renders one formula to HTML.
///
/// Failures are per formula; the caller falls back to the literal source for
/// the failing formula only.
pub trait MathRenderer: Send + Sync {
    fn render(&self, latex: &str, display_mode: bool) -> Result<String, MathError>;
}

/// Decorates the text of a code block. Returning `None` leaves the block as
/// plain escaped text.
pub trait SyntaxHighlighter: Send + Sync {
    fn highlight(&self, language: &str, code: &str) -> Option<String>;
}

/// Error types for formula rendering.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    #[error("Empty formula")]
    Empty,

    #[error("Unbalanced braces in formula: {0}")]
    UnbalancedBraces(String),

    #[error("Formula ends with a lone backslash: {0}")]
    TrailingBackslash(String),

    #[error("Math renderer failed: {0}")]
    Backend(String),
}

/// Error types for a whole render pass.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Markdown conversion failed: {0}")]
    Markdown(String),
}

// ============================================================================
// pulldown-cmark
// ============================================================================

/// Formatting tags allowed through as raw HTML, bare only (no attributes).
static ALLOWED_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^</?(?i:b|i|em|strong|u|s|del|ins|sub|sup|kbd|mark|small|br|hr|p|details|summary|blockquote|ul|ol|li|table|thead|tbody|tr|th|td)\s*/?>",
    )
    .expect("valid allowed tag regex")
});

/// GitHub-flavored markdown via pulldown-cmark.
///
/// Soft line breaks become `<br />`. Raw HTML is shown as text unless it is
/// made only of comments and bare formatting tags like `<br>` or `<sub>`.
/// Links and images pointing at `javascript:`, `vbscript:` or non-image
/// `data:` URLs lose their destination.
#[derive(Debug, Clone, Copy, Default)]
pub struct CmarkRenderer;

impl CmarkRenderer {
    fn options() -> Options {
        Options::ENABLE_TABLES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS
            | Options::ENABLE_FOOTNOTES
    }
}

/// True if every `<` in `raw` starts a complete comment or an allowed tag.
fn is_safe_markup(raw: &str) -> bool {
    let mut rest = raw;
    while let Some(start) = rest.find('<') {
        let tail = &rest[start..];
        let len = if let Some(body) = tail.strip_prefix("<!--") {
            match body.find("-->") {
                Some(end) => 4 + end + 3,
                None => return false,
            }
        } else {
            match ALLOWED_TAG.find(tail) {
                Some(m) => m.end(),
                None => return false,
            }
        };
        rest = &tail[len..];
    }
    true
}

/// True for URLs a browser would execute or load as a document.
fn is_unsafe_url(url: &str, image: bool) -> bool {
    let scheme: String = url
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_ascii_control())
        .take(16)
        .collect::<String>()
        .to_ascii_lowercase();
    scheme.starts_with("javascript:")
        || scheme.starts_with("vbscript:")
        || (scheme.starts_with("data:") && !(image && scheme.starts_with("data:image/")))
}

fn sanitize(event: Event<'_>) -> Event<'_> {
    match event {
        Event::Html(raw) | Event::InlineHtml(raw) if !is_safe_markup(&raw) => Event::Text(raw),
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) if is_unsafe_url(&dest_url, false) => {
            tracing::debug!(url = %dest_url, "link destination dropped");
            Event::Start(Tag::Link {
                link_type,
                dest_url: CowStr::Borrowed(""),
                title,
                id,
            })
        }
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) if is_unsafe_url(&dest_url, true) => {
            tracing::debug!(url = %dest_url, "image source dropped");
            Event::Start(Tag::Image {
                link_type,
                dest_url: CowStr::Borrowed(""),
                title,
                id,
            })
        }
        other => other,
    }
}

impl MarkdownRenderer for CmarkRenderer {
    fn render(&self, markdown: &str) -> Result<String, RenderError> {
        let parser = Parser::new_ext(markdown, Self::options()).map(|event| match event {
            Event::SoftBreak => Event::HardBreak,
            other => sanitize(other),
        });

        let mut out = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut out, parser);
        Ok(out)
    }
}

// ============================================================================
// Deferred math
// ============================================================================

/// Emits formulas wrapped in `\(…\)` / `\[…\]` for a client-side typesetter.
///
/// Performs the structural checks a typesetter would fail on, so a broken
/// formula is flagged at render time instead of showing up garbled.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeferredMath;

impl DeferredMath {
    fn validate(latex: &str) -> Result<(), MathError> {
        if latex.trim().is_empty() {
            return Err(MathError::Empty);
        }

        let mut depth: i64 = 0;
        let mut chars = latex.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    // An escaped character never counts as a brace.
                    if chars.next().is_none() {
                        return Err(MathError::TrailingBackslash(latex.to_string()));
                    }
                }
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(MathError::UnbalancedBraces(latex.to_string()));
                    }
                }
                _ => {}
            }
        }

        if depth == 0 {
            Ok(())
        } else {
            Err(MathError::UnbalancedBraces(latex.to_string()))
        }
    }
}

impl MathRenderer for DeferredMath {
    fn render(&self, latex: &str, display_mode: bool) -> Result<String, MathError> {
        Self::validate(latex)?;
        let escaped = escape_html(latex);
        Ok(if display_mode {
            format!("<span class=\"math math-display\">\\[{escaped}\\]</span>")
        } else {
            format!("<span class=\"math math-inline\">\\({escaped}\\)</span>")
        })
    }
}

// ============================================================================
// Escaping
// ============================================================================

/// Escapes `&`, `<`, `>` and `"`.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Reverses the entities produced by [`escape_html`] plus `&#39;`.
///
/// `&amp;` is handled last so `&amp;lt;` decodes to `&lt;`, not `<`.
pub fn unescape_html(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
