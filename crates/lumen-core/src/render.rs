//! Content rendering.
//!
//! [`ContentRenderer`] turns one complete model response into a
//! [`RenderedMessage`]:
//!
//! 1. image data URIs short-circuit to an image
//! 2. reasoning sections are pulled out into collapsed blocks
//! 3. the math chain swaps formulas for placeholders (prose only)
//! 4. markdown is converted to HTML
//! 5. placeholders are replaced by rendered formulas, or by the formula's
//!    source where they ended up in an attribute or a `<code>` element
//! 6. code blocks get copy/preview affordances
//!
//! Rendering never fails from the caller's point of view: any unexpected error
//! degrades the message to its raw text.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::{Captures, Regex};

use crate::config::{CodeConfig, Config, Labels};
use crate::markdown::{
    CmarkRenderer, DeferredMath, MarkdownRenderer, MathRenderer, RenderError, SyntaxHighlighter,
    escape_html, unescape_html,
};
use crate::math::{MathPipeline, MathSpan, PLACEHOLDER_CLOSE, PLACEHOLDER_OPEN};
use crate::reasoning;

static IMAGE_DATA_URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^data:image/[a-zA-Z0-9.+-]+;base64,(.*)$").expect("valid image regex")
});

static CODE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<pre><code(?: class="language-([^"]+)")?>(.*?)</code></pre>"#)
        .expect("valid code block regex")
});

/// A collapsible reasoning block shown above the answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasoningBlock {
    pub index: usize,
    pub header: String,
    /// Plain text, shown as-is.
    pub content: String,
    pub collapsed: bool,
}

impl ReasoningBlock {
    /// Flips between collapsed and expanded.
    pub fn toggle(&mut self) {
        self.collapsed = !self.collapsed;
    }

    pub fn to_html(&self) -> String {
        let state = if self.collapsed { " collapsed" } else { "" };
        format!(
            "<div class=\"reasoning-section{state}\" data-reasoning-index=\"{index}\">\
             <div class=\"reasoning-header\">{header}</div>\
             <div class=\"reasoning-content\">{content}</div></div>",
            index = self.index,
            header = escape_html(&self.header),
            content = escape_html(&self.content),
        )
    }
}

/// A code block found in the rendered body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// Position among the message's code blocks; matches `data-code-index`.
    pub index: usize,
    pub language: Option<String>,
    /// The block's literal text, unescaped. This is what "copy" puts on the
    /// clipboard and what "preview" opens.
    pub text: String,
    pub previewable: bool,
}

/// The main content of a message after markdown conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBody {
    pub html: String,
    pub code_blocks: Vec<CodeBlock>,
    /// Formulas that fell back to their literal source.
    pub formula_errors: usize,
}

/// The final artifact for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedMessage {
    /// The whole payload was an image data URI.
    Image { src: String },
    /// Reasoning blocks followed by the body, if any content remained.
    Content {
        reasoning: Vec<ReasoningBlock>,
        body: Option<RenderedBody>,
    },
    /// Neither reasoning nor content.
    NoOutput { label: String },
    /// Rendering failed; the raw text is shown unprocessed.
    Verbatim { text: String },
}

impl RenderedMessage {
    pub fn to_html(&self) -> String {
        match self {
            RenderedMessage::Image { src } => {
                format!("<img class=\"rendered-image\" src=\"{}\" alt=\"\">", escape_html(src))
            }
            RenderedMessage::Content { reasoning, body } => {
                let mut out = String::new();
                for block in reasoning {
                    out.push_str(&block.to_html());
                }
                if let Some(body) = body {
                    let _ = write!(out, "<div class=\"message-body\">{}</div>", body.html);
                }
                out
            }
            RenderedMessage::NoOutput { label } => {
                format!("<div class=\"no-output\">{}</div>", escape_html(label))
            }
            RenderedMessage::Verbatim { text } => {
                format!("<div class=\"raw-text\">{}</div>", escape_html(text))
            }
        }
    }

    /// Code blocks of the body, empty for every other variant.
    pub fn code_blocks(&self) -> &[CodeBlock] {
        match self {
            RenderedMessage::Content {
                body: Some(body), ..
            } => &body.code_blocks,
            _ => &[],
        }
    }

    pub fn reasoning_mut(&mut self) -> Option<&mut Vec<ReasoningBlock>> {
        match self {
            RenderedMessage::Content { reasoning, .. } => Some(reasoning),
            _ => None,
        }
    }
}

/// The rendering pipeline.
pub struct ContentRenderer {
    math: MathPipeline,
    markdown: Box<dyn MarkdownRenderer>,
    formulas: Box<dyn MathRenderer>,
    highlighter: Option<Box<dyn SyntaxHighlighter>>,
    code: CodeConfig,
    labels: Labels,
}

impl Default for ContentRenderer {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl std::fmt::Debug for ContentRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentRenderer")
            .field("math", &self.math)
            .field("highlighter", &self.highlighter.is_some())
            .field("code", &self.code)
            .finish_non_exhaustive()
    }
}

impl ContentRenderer {
    /// Builds a renderer with pulldown-cmark and deferred math.
    pub fn new(config: &Config) -> Self {
        Self {
            math: MathPipeline::from(&config.math),
            markdown: Box::new(CmarkRenderer),
            formulas: Box::new(DeferredMath),
            highlighter: None,
            code: config.code.clone(),
            labels: config.labels.clone(),
        }
    }

    #[must_use]
    pub fn with_markdown(mut self, markdown: Box<dyn MarkdownRenderer>) -> Self {
        self.markdown = markdown;
        self
    }

    #[must_use]
    pub fn with_math_renderer(mut self, formulas: Box<dyn MathRenderer>) -> Self {
        self.formulas = formulas;
        self
    }

    #[must_use]
    pub fn with_highlighter(mut self, highlighter: Box<dyn SyntaxHighlighter>) -> Self {
        self.highlighter = Some(highlighter);
        self
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn code_config(&self) -> &CodeConfig {
        &self.code
    }

    /// Renders a complete response. Never fails: errors degrade to
    /// [`RenderedMessage::Verbatim`].
    pub fn render(&self, raw: &str) -> RenderedMessage {
        match self.try_render(raw) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(error = %err, "render failed, showing raw text");
                RenderedMessage::Verbatim {
                    text: raw.to_string(),
                }
            }
        }
    }

    /// Same as [`render`](Self::render) but surfaces the error.
    pub fn try_render(&self, raw: &str) -> Result<RenderedMessage, RenderError> {
        if let Some(src) = image_data_uri(raw) {
            return Ok(RenderedMessage::Image { src });
        }

        let split = reasoning::extract(raw);
        let reasoning: Vec<ReasoningBlock> = split
            .sections
            .into_iter()
            .enumerate()
            .map(|(index, section)| ReasoningBlock {
                index,
                header: self.labels.reasoning_header(index),
                content: section.content,
                collapsed: true,
            })
            .collect();

        let body = if split.remainder.is_empty() {
            None
        } else {
            Some(self.render_body(&split.remainder)?)
        };

        if reasoning.is_empty() && body.is_none() {
            return Ok(RenderedMessage::NoOutput {
                label: self.labels.no_output.clone(),
            });
        }

        Ok(RenderedMessage::Content { reasoning, body })
    }

    /// Math, markdown, formula substitution and code affordances on the main
    /// content.
    pub fn render_body(&self, markdown: &str) -> Result<RenderedBody, RenderError> {
        let (prepared, spans) = self.math.run(markdown);
        let html = self.markdown.render(&prepared)?;
        let (html, formula_errors) = self.substitute_formulas(&html, &spans);
        let (html, code_blocks) = self.decorate_code_blocks(&html);

        tracing::debug!(
            formulas = spans.len(),
            formula_errors,
            code_blocks = code_blocks.len(),
            "body rendered"
        );

        Ok(RenderedBody {
            html,
            code_blocks,
            formula_errors,
        })
    }

    /// Swaps every placeholder token in `html` for its formula.
    ///
    /// A token inside a tag (an `alt` text, say) or inside `<code>` gets the
    /// escaped literal source instead. Tokens the markdown renderer dropped,
    /// like those of an unused reference definition, are simply absent.
    fn substitute_formulas(&self, html: &str, spans: &[MathSpan]) -> (String, usize) {
        let by_id: HashMap<&str, &MathSpan> = spans.iter().map(|s| (s.id.as_str(), s)).collect();
        let mut out = String::with_capacity(html.len());
        let mut errors = 0;
        let mut substituted = 0;
        let mut pos = 0;

        while let Some(found) = html[pos..].find(PLACEHOLDER_OPEN) {
            let open = pos + found;
            let id_start = open + PLACEHOLDER_OPEN.len_utf8();
            let Some(id_len) = html[id_start..].find(PLACEHOLDER_CLOSE) else {
                break;
            };
            let id = &html[id_start..id_start + id_len];
            out.push_str(&html[pos..open]);
            pos = id_start + id_len + PLACEHOLDER_CLOSE.len_utf8();

            let Some(span) = by_id.get(id) else {
                out.push_str(id);
                continue;
            };
            substituted += 1;

            if inside_markup_or_code(&html[..open]) {
                out.push_str(&escape_html(&span.literal_source()));
                continue;
            }
            match self.formulas.render(&span.latex, span.display_mode) {
                Ok(rendered) => out.push_str(&rendered),
                Err(err) => {
                    tracing::warn!(id = %span.id, error = %err, "formula failed to render");
                    errors += 1;
                    out.push_str(&formula_error_html(span, &err.to_string()));
                }
            }
        }
        out.push_str(&html[pos..]);

        if substituted < spans.len() {
            tracing::debug!(
                dropped = spans.len() - substituted,
                "formulas dropped by markdown conversion"
            );
        }
        (out, errors)
    }

    fn decorate_code_blocks(&self, html: &str) -> (String, Vec<CodeBlock>) {
        let mut blocks = Vec::new();

        let decorated = CODE_BLOCK.replace_all(html, |caps: &Captures<'_>| {
            let index = blocks.len();
            let language = caps.get(1).map(|m| m.as_str().to_string());
            let escaped_text = &caps[2];
            let text = unescape_html(escaped_text);
            let previewable = language
                .as_deref()
                .is_some_and(|lang| self.code.is_previewable(lang));

            let inner = language
                .as_deref()
                .and_then(|lang| self.highlighter.as_ref()?.highlight(lang, &text))
                .unwrap_or_else(|| escaped_text.to_string());

            let mut out = format!("<div class=\"code-block\" data-code-index=\"{index}\">");
            out.push_str("<div class=\"code-actions\">");
            if previewable {
                let _ = write!(
                    out,
                    "<button class=\"code-button\" data-action=\"preview\" data-code-index=\"{index}\">{}</button>",
                    escape_html(&self.labels.preview)
                );
            }
            let _ = write!(
                out,
                "<button class=\"code-button\" data-action=\"copy\" data-code-index=\"{index}\">{}</button>",
                escape_html(&self.labels.copy)
            );
            out.push_str("</div>");
            match &language {
                Some(lang) => {
                    let _ = write!(out, "<pre><code class=\"language-{lang}\">{inner}</code></pre>");
                }
                None => {
                    let _ = write!(out, "<pre><code>{inner}</code></pre>");
                }
            }
            out.push_str("</div>");

            blocks.push(CodeBlock {
                index,
                language,
                text,
                previewable,
            });
            out
        });

        (decorated.into_owned(), blocks)
    }
}

/// True if `before` ends inside a tag or an open `<code>` element.
///
/// Text from the markdown renderer is escaped, so every raw `<` opens markup.
fn inside_markup_or_code(before: &str) -> bool {
    let in_tag = match (before.rfind('<'), before.rfind('>')) {
        (Some(lt), Some(gt)) => lt > gt,
        (Some(_), None) => true,
        (None, _) => false,
    };
    in_tag || before.matches("<code").count() > before.matches("</code>").count()
}

fn formula_error_html(span: &MathSpan, error: &str) -> String {
    format!(
        "<span class=\"math-error\" style=\"color: #ff6b6b\" title=\"{}\">{}</span>",
        escape_html(error),
        escape_html(&span.literal_source())
    )
}

/// Returns the trimmed data URI if `raw` is nothing but a valid base-64 image.
fn image_data_uri(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let caps = IMAGE_DATA_URI.captures(trimmed)?;
    let payload: String = caps[1].split_whitespace().collect();
    if payload.is_empty() || STANDARD.decode(payload.as_bytes()).is_err() {
        return None;
    }
    Some(trimmed.to_string())
}

/// Wraps a whole HTML document in an ```` ```html ```` fence so it renders as
/// a previewable code block. Returns `None` for anything else.
///
/// A document starts with `<!doctype html>`, or starts with `<html` and ends
/// with `</html>` (case-insensitive).
pub fn wrap_html_document(raw: &str) -> Option<String> {
    let lower = raw.trim().to_ascii_lowercase();
    let is_document = lower.starts_with("<!doctype html>")
        || (lower.starts_with("<html") && lower.ends_with("</html>"));
    if !is_document {
        return None;
    }

    let longest_run = raw
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    let fence = "`".repeat(longest_run.max(2) + 1);
    Some(format!("{fence}html\n{raw}\n{fence}"))
}

/// Wraps a rendered fragment into a standalone HTML page.
pub fn standalone_page(title: &str, fragment: &str) -> String {
    format!(
        "<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
         <style>\n\
         .reasoning-section.collapsed .reasoning-content {{ display: none; }}\n\
         .reasoning-header {{ cursor: pointer; font-weight: bold; }}\n\
         .code-block {{ position: relative; }}\n\
         .code-actions {{ position: absolute; top: 8px; right: 8px; display: flex; gap: 8px; }}\n\
         .rendered-image {{ max-width: 100%; height: auto; }}\n\
         </style>\n</head>\n<body>\n{fragment}\n</body>\n</html>\n",
        title = escape_html(title),
    )
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::markdown::MathError;

    /// Fails on one specific formula, succeeds on everything else.
    struct FailOn(&'static str);

    impl MathRenderer for FailOn {
        fn render(&self, latex: &str, display_mode: bool) -> Result<String, MathError> {
            if latex == self.0 {
                Err(MathError::Backend(format!("cannot typeset {latex}")))
            } else {
                Ok(format!("<m display=\"{display_mode}\">{latex}</m>"))
            }
        }
    }

    struct BrokenMarkdown;

    impl MarkdownRenderer for BrokenMarkdown {
        fn render(&self, _markdown: &str) -> Result<String, RenderError> {
            Err(RenderError::Markdown("boom".to_string()))
        }
    }

    struct Upper;

    impl SyntaxHighlighter for Upper {
        fn highlight(&self, language: &str, code: &str) -> Option<String> {
            (language == "shout").then(|| code.to_uppercase())
        }
    }

    fn body(message: &RenderedMessage) -> &RenderedBody {
        match message {
            RenderedMessage::Content {
                body: Some(body), ..
            } => body,
            other => panic!("expected body, got {other:?}"),
        }
    }

    #[test]
    fn test_plain_markdown() {
        let message = ContentRenderer::default().render("Hello **world**");
        let body = body(&message);
        assert!(body.html.contains("<strong>world</strong>"), "{}", body.html);
        assert!(body.code_blocks.is_empty());
    }

    #[test]
    fn test_inline_and_display_math_rendered() {
        let message = ContentRenderer::default().render("Area $\\pi r^2$ and\n\n$$\n\\sum_{i=1}^{n} i = \\frac{n(n+1)}{2} \\quad \\text{which is a fairly long formula for the display threshold}\n$$\n");
        let html = &body(&message).html;
        assert!(html.contains("\\(\\pi r^2\\)"), "{html}");
        assert!(html.contains("math-display"), "{html}");
        assert!(!html.contains(PLACEHOLDER_OPEN), "{html}");
    }

    #[test]
    fn test_markdown_does_not_touch_math() {
        let message = ContentRenderer::default().render("Product $a*b*c$ here");
        let html = &body(&message).html;
        assert!(html.contains("\\(a*b*c\\)"), "{html}");
        assert!(!html.contains("<em>"), "{html}");
    }

    #[test]
    fn test_failing_formula_isolated() {
        let renderer = ContentRenderer::default().with_math_renderer(Box::new(FailOn("bad")));
        let message = renderer.render("Good $x$ and broken $bad$.");
        let body = body(&message);
        assert_eq!(body.formula_errors, 1);
        assert!(body.html.contains("<m display=\"false\">x</m>"), "{}", body.html);
        assert!(
            body.html
                .contains("<span class=\"math-error\" style=\"color: #ff6b6b\""),
            "{}",
            body.html
        );
        assert!(body.html.contains(">$bad$</span>"), "{}", body.html);
    }

    #[test]
    fn test_math_inside_inline_code_shows_source() {
        let message = ContentRenderer::default().render("Use `$x$` literally");
        let html = &body(&message).html;
        assert!(html.contains("<code>$x$</code>"), "{html}");
    }

    #[test]
    fn test_escaped_dollars_render_as_text() {
        let message =
            ContentRenderer::default().render("# Prices\n\nIt costs \\$5 and \\$10 **today**.");
        let html = &body(&message).html;
        assert!(html.contains("<h1>Prices</h1>"), "{html}");
        assert!(
            html.contains("It costs $5 and $10 <strong>today</strong>."),
            "{html}"
        );
        assert!(!html.contains("math-inline"), "{html}");
    }

    #[test]
    fn test_unbalanced_markup_never_degrades() {
        let inputs = [
            "x_$^*\nkk<|kk<*\\²**)",
            "\\$a$ <b $c$ `$d` [e]($f$)",
            "$$\n<!-- $x$\n$$ ![$y$](z)",
        ];
        for input in inputs {
            let message = ContentRenderer::default().render(input);
            assert!(matches!(message, RenderedMessage::Content { .. }), "{input:?}");
            let html = message.to_html();
            assert!(!html.contains(PLACEHOLDER_OPEN), "{html}");
            assert!(!html.contains(PLACEHOLDER_CLOSE), "{html}");
        }
    }

    #[test]
    fn test_indented_code_and_code_spans_keep_whitespace() {
        let renderer = ContentRenderer::default();

        let message = renderer.render("Script:\n\n    echo $A   $B\n");
        assert_eq!(message.code_blocks()[0].text, "echo $A   $B\n");

        let message = renderer.render("Run `echo $HOME  $PATH` now");
        let html = &body(&message).html;
        assert!(html.contains("<code>echo $HOME  $PATH</code>"), "{html}");
    }

    #[test]
    fn test_html_attributes_are_not_math() {
        let message = ContentRenderer::default().render("y <a href=\"x^2\">l</a>");
        let html = &body(&message).html;
        assert!(!html.contains("math-inline"), "{html}");
        assert!(html.contains("x^2"), "{html}");
    }

    #[test]
    fn test_formula_in_image_alt_shows_source() {
        let message = ContentRenderer::default().render("![$x$](pic.png) and $y$");
        let html = &body(&message).html;
        assert!(html.contains("alt=\"$x$\""), "{html}");
        assert!(html.contains("\\(y\\)"), "{html}");
    }

    #[test]
    fn test_fenced_code_untouched_by_math() {
        let message = ContentRenderer::default().render("```python\nx^2 = $y$\n```\n");
        let body = body(&message);
        assert_eq!(body.code_blocks.len(), 1);
        assert_eq!(body.code_blocks[0].text, "x^2 = $y$\n");
        assert_eq!(body.code_blocks[0].language.as_deref(), Some("python"));
        assert!(!body.code_blocks[0].previewable);
    }

    #[test]
    fn test_code_block_affordances() {
        let message = ContentRenderer::default()
            .render("```html\n<p>hi & bye</p>\n```\n\n```\nplain\n```\n");
        let body = body(&message);
        assert_eq!(body.code_blocks.len(), 2);
        assert_eq!(body.code_blocks[0].text, "<p>hi & bye</p>\n");
        assert!(body.code_blocks[0].previewable);
        assert!(!body.code_blocks[1].previewable);
        assert_eq!(body.code_blocks[1].language, None);
        assert!(body.html.contains("data-action=\"preview\" data-code-index=\"0\">Preview"));
        assert!(body.html.contains("data-action=\"copy\" data-code-index=\"1\">Copy"));
        assert!(!body.html.contains("data-action=\"preview\" data-code-index=\"1\""));
    }

    #[test]
    fn test_highlighter_applied_when_available() {
        let renderer = ContentRenderer::default().with_highlighter(Box::new(Upper));
        let message = renderer.render("```shout\nhello\n```\n\n```rust\nquiet\n```\n");
        let html = &body(&message).html;
        assert!(html.contains(">HELLO\n</code>"), "{html}");
        assert!(html.contains(">quiet\n</code>"), "{html}");
    }

    #[test]
    fn test_reasoning_blocks_collapsed_with_headers() {
        let message = ContentRenderer::default()
            .render("<think>first</think><think>second</think>Answer");
        let RenderedMessage::Content { reasoning, body } = &message else {
            panic!("expected content");
        };
        assert_eq!(reasoning.len(), 2);
        assert!(reasoning.iter().all(|r| r.collapsed));
        assert_eq!(reasoning[0].header, "Model reasoning");
        assert_eq!(reasoning[1].header, "Model reasoning (2)");
        assert_eq!(reasoning[1].content, "second");
        assert!(body.is_some());

        let html = message.to_html();
        let first = html.find("reasoning-section").unwrap();
        let answer = html.find("Answer").unwrap();
        assert!(first < answer);
    }

    #[test]
    fn test_reasoning_toggle() {
        let mut message = ContentRenderer::default().render("<think>a < b</think>");
        let blocks = message.reasoning_mut().unwrap();
        blocks[0].toggle();
        assert!(!blocks[0].collapsed);
        let html = message.to_html();
        assert!(html.contains("class=\"reasoning-section\""), "{html}");
        assert!(html.contains("a &lt; b"), "{html}");
    }

    #[test]
    fn test_reasoning_only_has_no_body() {
        let message = ContentRenderer::default().render("<thinking>just thoughts</thinking>");
        let RenderedMessage::Content { reasoning, body } = message else {
            panic!("expected content");
        };
        assert_eq!(reasoning.len(), 1);
        assert!(body.is_none());
    }

    #[test]
    fn test_no_output_placeholder() {
        let renderer = ContentRenderer::default();
        assert_eq!(
            renderer.render("   \n "),
            RenderedMessage::NoOutput {
                label: "(No text output)".to_string()
            }
        );
    }

    #[test]
    fn test_image_data_uri() {
        let message = ContentRenderer::default().render("  data:image/png;base64,iVBORw0KGgo=  ");
        assert_eq!(
            message,
            RenderedMessage::Image {
                src: "data:image/png;base64,iVBORw0KGgo=".to_string()
            }
        );
        assert!(message.to_html().starts_with("<img"));

        let jpeg = ContentRenderer::default().render("data:image/jpeg;base64,/9j/4AAQ");
        assert!(matches!(jpeg, RenderedMessage::Image { .. }));
    }

    #[test]
    fn test_invalid_image_payload_rendered_as_text() {
        let message = ContentRenderer::default().render("data:image/png;base64,not base64!");
        assert!(matches!(message, RenderedMessage::Content { .. }));
    }

    #[test]
    fn test_failure_degrades_to_verbatim() {
        let renderer = ContentRenderer::default().with_markdown(Box::new(BrokenMarkdown));
        let message = renderer.render("<b>raw</b>");
        assert_eq!(
            message,
            RenderedMessage::Verbatim {
                text: "<b>raw</b>".to_string()
            }
        );
        assert_eq!(message.to_html(), "<div class=\"raw-text\">&lt;b&gt;raw&lt;/b&gt;</div>");
        assert!(renderer.try_render("x").is_err());
    }

    #[test]
    fn test_render_is_deterministic() {
        let renderer = ContentRenderer::default();
        let text = "Energy $E = mc^2$ and x² ≤ 4\n\n```js\nlet a = 1;\n```";
        assert_eq!(renderer.render(text), renderer.render(text));
    }

    #[test]
    fn test_wrap_html_document() {
        let wrapped = wrap_html_document("<!DOCTYPE html><html><body>x</body></html>").unwrap();
        assert!(wrapped.starts_with("```html\n<!DOCTYPE html>"));
        assert!(wrapped.ends_with("\n```"));

        assert!(wrap_html_document("<html lang=\"en\"><p>x</p></html>").is_some());
        assert!(wrap_html_document("<html> unterminated").is_none());
        assert!(wrap_html_document("Some <b>markup</b>").is_none());

        let with_fence = wrap_html_document("<html>```js```</html>").unwrap();
        assert!(with_fence.starts_with("````html\n"));
    }

    #[test]
    fn test_wrapped_document_is_previewable() {
        let doc = "<!doctype html>\n<html><body><h1>Hi</h1></body></html>";
        let wrapped = wrap_html_document(doc).unwrap();
        let message = ContentRenderer::default().render(&wrapped);
        let blocks = message.code_blocks();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].previewable);
        assert_eq!(blocks[0].text, format!("{doc}\n"));
    }

    #[test]
    fn test_standalone_page() {
        let page = standalone_page("a & b", "<p>x</p>");
        assert!(page.starts_with("<!doctype html>"));
        assert!(page.contains("<title>a &amp; b</title>"));
        assert!(page.contains("<p>x</p>"));
    }

    proptest! {
        #[test]
        fn rendering_never_degrades(text in r"[ab2 $\\^_{}`<>*#\-\[\]()!\n²é]{0,48}") {
            let message = ContentRenderer::default().render(&text);
            let is_verbatim = matches!(message, RenderedMessage::Verbatim { .. });
            prop_assert!(!is_verbatim);
            let html = message.to_html();
            prop_assert!(!html.contains(PLACEHOLDER_OPEN));
            prop_assert!(!html.contains(PLACEHOLDER_CLOSE));
        }

        #[test]
        fn fenced_code_text_is_preserved(code in r"[a-z$ \\^_*<&]{1,30}") {
            let message = ContentRenderer::default().render(&format!("```sh\n{code}\n```\n"));
            let blocks = message.code_blocks();
            prop_assert_eq!(blocks.len(), 1);
            prop_assert_eq!(&blocks[0].text, &format!("{code}\n"));
        }
    }
}
