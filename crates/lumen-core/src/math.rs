//! Math span detection, normalization and extraction.
//!
//! The pipeline is a chain of pure text passes:
//!
//! 1. [`notation::normalize`](crate::notation::normalize): unicode glyphs → LaTeX
//! 2. [`auto_detect`]: wrap bare math in `$…$`
//! 3. [`merge_adjacent`]: `$a$ + $b$` → `$a + b$`
//! 4. [`cleanup`]: drop empty pairs, demote short display spans, collapse spaces
//! 5. [`MathExtractor::extract`]: swap every span for a placeholder token
//!
//! After markdown conversion the placeholders are swapped back for rendered
//! formulas (see [`crate::render`]). The markdown renderer never sees the
//! formula source, so `*`, `_` and `\\` inside math survive intact.
//!
//! A backslash-escaped `\$` is never a delimiter. Every pass masks those
//! dollars on entry and restores them on exit, so `\$5 and \$10` stays prose.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::config::MathConfig;
use crate::notation;
use crate::verbatim::{FenceTracker, is_indented, split_verbatim};

/// Commands recognized as math when they appear bare in prose.
const LATEX_COMMANDS: &[&str] = &[
    "sqrt", "frac", "text", "times", "div", "pm", "mp", "leq", "geq", "neq", "approx", "equiv",
    "sim", "sum", "prod", "int", "lim", "infty", "alpha", "beta", "gamma", "delta", "epsilon",
    "theta", "lambda", "mu", "pi", "sigma", "phi", "omega", "sin", "cos", "tan", "log", "ln",
    "left", "right", "circ", "cdot", "Delta", "Sigma", "Pi", "Omega",
];

/// Default ceiling for [`merge_adjacent`] rounds.
pub const DEFAULT_MERGE_MAX_ITERATIONS: usize = 20;

/// Default length under which a one-line display span becomes inline.
pub const DEFAULT_DISPLAY_DEMOTE_MAX_LEN: usize = 100;

/// Opens a placeholder token.
pub const PLACEHOLDER_OPEN: char = '\u{E000}';

/// Closes a placeholder token.
pub const PLACEHOLDER_CLOSE: char = '\u{E001}';

/// Stands in for `\$` while a pass runs.
const ESCAPED_DOLLAR: char = '\u{E002}';

static AUTO_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let commands = LATEX_COMMANDS.join("|");
    let group = r"\{[^}]+\}";
    let pattern = [
        // \frac{a}{b}, \sqrt{x}, \text{…}
        format!(r"\\(?:{commands})(?:\s*{group})+"),
        r"\\sqrt\s*\d+".to_string(),
        // x^2, a_{ij}, \sum_{i=1}^n
        format!(r"(?:\\[a-zA-Z]+|[a-zA-Z][a-zA-Z0-9]*)(?:[\^_](?:{group}|\d+|[a-zA-Z]))+"),
        format!(r"\^(?:{group}|\d+)"),
        format!(r"_(?:{group}|[a-zA-Z]|\d+)"),
        format!(r"\\frac\s*{group}\s*{group}"),
        // Bare command; unknown names are filtered out after matching.
        r"\\[a-zA-Z]+".to_string(),
        r"\^\\circ".to_string(),
    ]
    .join("|");
    Regex::new(&pattern).expect("valid auto-detect regex")
});

static ADJACENT_SPANS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\$([^$\n]+?)\$[ \t]*(\+|-|\*|/|=|≈|≠|≤|≥|×|÷|±|\\approx|\\neq|\\leq|\\geq|\\times|\\div|\\pm|<|>)[ \t]*\$([^$\n]+?)\$",
    )
    .expect("valid merge regex")
});

static CLEANUP_SPANS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\$\$(.*?)\$\$|\$([^$\n]+)\$").expect("valid cleanup regex"));

static DISPLAY_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\$\$(.*?)\$\$").expect("valid display regex"));

// Placeholders left by display extraction never end up inside an inline span.
static INLINE_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$([^$\n\x{E000}\x{E001}]+?)\$").expect("valid inline regex")
});

// ============================================================================
// Escaped dollars
// ============================================================================

/// Swaps each `\$` whose backslash is not itself escaped for a sentinel, so
/// the span patterns only see real delimiters.
fn mask_escaped_dollars(text: &str) -> Cow<'_, str> {
    if !text.contains("\\$") {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    let mut backslashes = 0usize;
    for c in text.chars() {
        match c {
            '\\' => {
                backslashes += 1;
                out.push(c);
            }
            '$' if backslashes % 2 == 1 => {
                out.pop();
                out.push(ESCAPED_DOLLAR);
                backslashes = 0;
            }
            _ => {
                backslashes = 0;
                out.push(c);
            }
        }
    }
    Cow::Owned(out)
}

fn unmask_escaped_dollars(text: &str) -> String {
    text.replace(ESCAPED_DOLLAR, "\\$")
}

fn trailing_backslashes(text: &str) -> usize {
    text.chars().rev().take_while(|c| *c == '\\').count()
}

fn is_reserved(c: char) -> bool {
    matches!(c, PLACEHOLDER_OPEN | PLACEHOLDER_CLOSE | ESCAPED_DOLLAR)
}

// ============================================================================
// Auto-detection
// ============================================================================

/// Wraps bare math expressions in single-dollar delimiters.
///
/// Lines are processed independently. Fenced code (fence lines and their
/// bodies), 4-space or tab indented lines, lines containing `$$` and lines
/// inside a multi-line `$$…$$` block are left alone.
pub fn auto_detect(text: &str) -> String {
    let masked = mask_escaped_dollars(text);
    let mut tracker = FenceTracker::default();
    let mut in_display = false;
    let lines: Vec<Cow<'_, str>> = masked
        .split('\n')
        .map(|line| {
            if tracker.observe(line) {
                return Cow::Borrowed(line);
            }
            let skip = in_display || skip_line(line);
            if line.matches("$$").count() % 2 == 1 {
                in_display = !in_display;
            }
            if skip {
                Cow::Borrowed(line)
            } else {
                wrap_line(line)
            }
        })
        .collect();
    unmask_escaped_dollars(&lines.join("\n"))
}

fn skip_line(line: &str) -> bool {
    line.contains("$$") || is_indented(line)
}

/// Applies accepted matches left to right. Inserted dollars come in pairs, so
/// parity checks against the original line stay valid.
fn wrap_line(line: &str) -> Cow<'_, str> {
    let mut out = String::new();
    let mut last = 0;

    for m in AUTO_PATTERN.find_iter(line) {
        if !accept_candidate(line, m.start(), m.end()) {
            continue;
        }
        out.push_str(&line[last..m.start()]);
        out.push('$');
        out.push_str(m.as_str());
        out.push('$');
        last = m.end();
    }

    if last == 0 {
        return Cow::Borrowed(line);
    }
    out.push_str(&line[last..]);
    Cow::Owned(out)
}

fn accept_candidate(line: &str, start: usize, end: usize) -> bool {
    let candidate = &line[start..end];
    let before = &line[..start];

    // `\\pi` is an escaped backslash followed by plain text.
    if trailing_backslashes(before) % 2 == 1 {
        return false;
    }

    if let Some(name) = candidate.strip_prefix('\\')
        && name.chars().all(|c| c.is_ascii_alphabetic())
        && !LATEX_COMMANDS.contains(&name)
    {
        return false;
    }

    // Partial identifiers like the `snake_c` in `snake_case`.
    let ends_alnum = candidate
        .chars()
        .next_back()
        .is_some_and(|c| c.is_ascii_alphanumeric());
    let next = line[end..].chars().next();
    if ends_alnum && next.is_some_and(|c| c.is_ascii_alphabetic() || c == '_') {
        return false;
    }

    // Already inside `$…$` or inline code.
    if before.matches('$').count() % 2 == 1 || before.matches('`').count() % 2 == 1 {
        return false;
    }

    !looks_like_link(before) && !inside_tag(before, &line[end..])
}

/// True if the candidate sits in the attributes of an HTML tag, as in
/// `<a href="x^2">`.
fn inside_tag(before: &str, after: &str) -> bool {
    let Some(open) = before.rfind('<') else {
        return false;
    };
    let tail = &before[open + 1..];
    let opens_tag = tail.starts_with(|c: char| c.is_ascii_alphabetic() || c == '/');
    opens_tag
        && !tail.contains('>')
        && after
            .split('<')
            .next()
            .is_some_and(|rest| rest.contains('>'))
}

/// True if the text right before a candidate is a URL or link target.
///
/// Checks the ten preceding characters and the whitespace-delimited token the
/// candidate belongs to, so long URLs are caught too.
fn looks_like_link(before: &str) -> bool {
    let window_start = before
        .char_indices()
        .rev()
        .nth(9)
        .map_or(0, |(idx, _)| idx);
    let window = &before[window_start..];
    let token = before
        .rfind(char::is_whitespace)
        .map_or(before, |idx| &before[idx..]);

    [window, token]
        .iter()
        .any(|s| s.contains("http") || s.contains("]("))
}

// ============================================================================
// Merging
// ============================================================================

/// Coalesces `$a$ op $b$` into `$a op b$` with the default iteration ceiling.
pub fn merge_adjacent(text: &str) -> String {
    merge_adjacent_bounded(text, DEFAULT_MERGE_MAX_ITERATIONS)
}

/// Coalesces adjacent spans joined by an operator until a fixed point or
/// `max_iterations` rounds, whichever comes first.
pub fn merge_adjacent_bounded(text: &str, max_iterations: usize) -> String {
    let mut current = mask_escaped_dollars(text).into_owned();
    for _ in 0..max_iterations {
        let merged = ADJACENT_SPANS
            .replace_all(&current, |caps: &Captures<'_>| {
                format!("${} {} {}$", &caps[1], &caps[2], &caps[3])
            })
            .into_owned();
        if merged == current {
            break;
        }
        current = merged;
    }
    unmask_escaped_dollars(&current)
}

// ============================================================================
// Cleanup
// ============================================================================

/// Cleans delimiters with the default demotion threshold.
pub fn cleanup(text: &str) -> String {
    cleanup_with(text, DEFAULT_DISPLAY_DEMOTE_MAX_LEN)
}

/// Removes empty pairs, demotes one-line display spans shorter than
/// `demote_max_len` characters to inline, and collapses whitespace inside
/// inline spans.
///
/// Removing a pair can expose a new one (`$$ $\t$b` → `$\t$b` → `b`), so
/// rounds repeat until nothing changes. Display spans that stay display are
/// left byte-for-byte intact.
pub fn cleanup_with(text: &str, demote_max_len: usize) -> String {
    let mut current = mask_escaped_dollars(text).into_owned();
    // A changing round either shortens the text or turns some other
    // whitespace into a plain space, so this terminates.
    loop {
        let next = cleanup_round(&current, demote_max_len);
        if next == current {
            break;
        }
        current = next;
    }
    unmask_escaped_dollars(&current)
}

fn cleanup_round(text: &str, demote_max_len: usize) -> String {
    CLEANUP_SPANS
        .replace_all(text, |caps: &Captures<'_>| {
            if let Some(display) = caps.get(1) {
                let inner = display.as_str();
                if inner.trim().is_empty() {
                    return String::new();
                }
                if !inner.contains('\n') && inner.trim().chars().count() < demote_max_len {
                    return inline_span(inner);
                }
                return caps[0].to_string();
            }
            inline_span(&caps[2])
        })
        .into_owned()
}

fn inline_span(inner: &str) -> String {
    let mut collapsed = inner.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return String::new();
    }
    // An odd backslash run right before the closing `$` would escape it.
    if trailing_backslashes(&collapsed) % 2 == 1 {
        collapsed.push(' ');
    }
    format!("${collapsed}$")
}

// ============================================================================
// Extraction
// ============================================================================

/// A formula pulled out of the text for the duration of one render pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathSpan {
    /// Unique within a render pass.
    pub id: String,
    /// Trimmed formula source, without delimiters.
    pub latex: String,
    pub display_mode: bool,
}

impl MathSpan {
    /// The token that stands in for this formula during markdown conversion.
    pub fn placeholder(&self) -> String {
        placeholder_for(&self.id)
    }

    /// The formula with its delimiters, as it appeared before extraction.
    pub fn literal_source(&self) -> String {
        if self.display_mode {
            format!("$${}$$", self.latex)
        } else {
            format!("${}$", self.latex)
        }
    }
}

/// Placeholder token for a formula id.
///
/// Private-use delimiters are plain text to a markdown renderer: no syntax
/// can escape, split or absorb them, wherever the token lands.
pub fn placeholder_for(id: &str) -> String {
    format!("{PLACEHOLDER_OPEN}{id}{PLACEHOLDER_CLOSE}")
}

/// Replaces math spans with placeholders, handing out sequential ids.
///
/// One extractor is used per render pass; ids keep counting across every
/// `extract` call so several prose segments never share an id.
#[derive(Debug, Default)]
pub struct MathExtractor {
    next_id: usize,
}

impl MathExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extracts `$$…$$` spans (display) and then `$…$` spans (inline).
    ///
    /// Display extraction runs first so a display span's delimiters are never
    /// read as two inline delimiters.
    pub fn extract(&mut self, text: &str) -> (String, Vec<MathSpan>) {
        let masked = mask_escaped_dollars(text);
        let mut spans = Vec::new();

        let text = DISPLAY_SPAN.replace_all(&masked, |caps: &Captures<'_>| {
            let span = self.next_span(&caps[1], true);
            let placeholder = span.placeholder();
            spans.push(span);
            placeholder
        });

        let text = INLINE_SPAN
            .replace_all(&text, |caps: &Captures<'_>| {
                let span = self.next_span(&caps[1], false);
                let placeholder = span.placeholder();
                spans.push(span);
                placeholder
            })
            .into_owned();

        (unmask_escaped_dollars(&text), spans)
    }

    fn next_span(&mut self, latex: &str, display_mode: bool) -> MathSpan {
        let id = format!("math-{}", self.next_id);
        self.next_id += 1;
        MathSpan {
            id,
            latex: unmask_escaped_dollars(latex.trim()),
            display_mode,
        }
    }
}

/// One-shot extraction with a fresh id sequence.
pub fn extract(text: &str) -> (String, Vec<MathSpan>) {
    MathExtractor::new().extract(text)
}

/// Puts each formula's literal source back in place of its placeholder.
pub fn restore_literals(text: &str, spans: &[MathSpan]) -> String {
    spans.iter().fold(text.to_string(), |acc, span| {
        acc.replacen(&span.placeholder(), &span.literal_source(), 1)
    })
}

// ============================================================================
// Pipeline
// ============================================================================

/// The full math preparation chain, configured once per renderer.
#[derive(Debug, Clone)]
pub struct MathPipeline {
    pub auto_detect: bool,
    pub merge_max_iterations: usize,
    pub display_demote_max_len: usize,
}

impl Default for MathPipeline {
    fn default() -> Self {
        Self {
            auto_detect: true,
            merge_max_iterations: DEFAULT_MERGE_MAX_ITERATIONS,
            display_demote_max_len: DEFAULT_DISPLAY_DEMOTE_MAX_LEN,
        }
    }
}

impl From<&MathConfig> for MathPipeline {
    fn from(config: &MathConfig) -> Self {
        Self {
            auto_detect: config.auto_detect,
            merge_max_iterations: config.merge_max_iterations,
            display_demote_max_len: config.display_demote_max_len,
        }
    }
}

impl MathPipeline {
    /// Runs normalize → auto-detect → merge → cleanup on one prose chunk.
    pub fn prepare(&self, text: &str) -> String {
        let normalized = notation::normalize(text);
        let wrapped = if self.auto_detect {
            auto_detect(&normalized)
        } else {
            normalized
        };
        let merged = merge_adjacent_bounded(&wrapped, self.merge_max_iterations);
        cleanup_with(&merged, self.display_demote_max_len)
    }

    /// Prepares and extracts math from prose. Code blocks, code spans, link
    /// destinations and the other regions of [`split_verbatim`] pass through
    /// untouched. Ids are sequential across the whole text.
    ///
    /// The private-use characters reserved for placeholders are dropped from
    /// the input first.
    pub fn run(&self, text: &str) -> (String, Vec<MathSpan>) {
        let text: String = text.chars().filter(|c| !is_reserved(*c)).collect();
        let mut extractor = MathExtractor::new();
        let mut out = String::with_capacity(text.len());
        let mut spans = Vec::new();

        for segment in split_verbatim(&text) {
            if segment.verbatim {
                out.push_str(segment.text);
                continue;
            }
            let prepared = self.prepare(segment.text);
            let (replaced, mut found) = extractor.extract(&prepared);
            out.push_str(&replaced);
            spans.append(&mut found);
        }

        tracing::debug!(formulas = spans.len(), "math extracted");
        (out, spans)
    }
}
