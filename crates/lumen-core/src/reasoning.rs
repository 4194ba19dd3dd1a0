//! Reasoning section extraction.
//!
//! Some models wrap intermediate reasoning in `<thinking>…</thinking>` or
//! `<think>…</think>` tags inside the regular response text. This parser pulls
//! those regions out so they can be shown as collapsed blocks above the
//! answer.
//!
//! Example:
//! ```text
//! <think>The user wants a sum.</think>
//! The answer is 4.
//! ```
//!
//! yields one section (`"The user wants a sum."`) and the remainder
//! `"The answer is 4."`.
//!
//! An opening tag without its closing tag is left in the text untouched:
//! during streaming the section simply is not complete yet.

/// One extracted reasoning region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasoningSection {
    /// The delimited substring exactly as it appeared, tags included.
    pub full_match: String,
    /// Inner text, trimmed.
    pub content: String,
}

/// Result of splitting reasoning from the main text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReasoningSplit {
    /// Sections in order of appearance, grouped by delimiter kind
    /// (all `<thinking>` sections first, then all `<think>` sections).
    pub sections: Vec<ReasoningSection>,
    /// Text with every complete section removed, trimmed.
    pub remainder: String,
}

/// An open/close tag pair.
#[derive(Debug, Clone, Copy)]
struct Delimiters {
    open: &'static str,
    close: &'static str,
}

/// Tried in this order; each kind is exhausted before the next one runs.
const DELIMITERS: &[Delimiters] = &[
    Delimiters {
        open: "<thinking>",
        close: "</thinking>",
    },
    Delimiters {
        open: "<think>",
        close: "</think>",
    },
];

/// Splits reasoning sections out of `text`.
///
/// For each delimiter kind the working text is scanned left to right for
/// open/close pairs; every matched range is then cut out before the next kind
/// is scanned, so excised text is never looked at again.
pub fn extract(text: &str) -> ReasoningSplit {
    let mut sections = Vec::new();
    let mut working = text.to_string();

    for delims in DELIMITERS {
        let ranges = find_pairs(&working, *delims);
        if ranges.is_empty() {
            continue;
        }

        let mut remainder = String::with_capacity(working.len());
        let mut last = 0;
        for (start, end) in ranges {
            let full = &working[start..end];
            let inner = &full[delims.open.len()..full.len() - delims.close.len()];
            sections.push(ReasoningSection {
                full_match: full.to_string(),
                content: inner.trim().to_string(),
            });
            remainder.push_str(&working[last..start]);
            last = end;
        }
        remainder.push_str(&working[last..]);
        working = remainder;
    }

    if !sections.is_empty() {
        tracing::debug!(sections = sections.len(), "reasoning sections extracted");
    }

    ReasoningSplit {
        sections,
        remainder: working.trim().to_string(),
    }
}

/// Byte ranges of complete `open…close` pairs, left to right.
fn find_pairs(text: &str, delims: Delimiters) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut from = 0;

    while let Some(rel_start) = text[from..].find(delims.open) {
        let start = from + rel_start;
        let body_start = start + delims.open.len();
        let Some(rel_end) = text[body_start..].find(delims.close) else {
            break;
        };
        let end = body_start + rel_end + delims.close.len();
        ranges.push((start, end));
        from = end;
    }

    ranges
}

/// Returns true if `text` contains an opening tag with no closing tag after it.
///
/// Used while streaming to tell "still reasoning" apart from "no reasoning".
pub fn has_open_section(text: &str) -> bool {
    DELIMITERS.iter().any(|delims| {
        text.rfind(delims.open)
            .is_some_and(|start| !text[start..].contains(delims.close))
    })
}
