//! Verbatim region detection.
//!
//! Math rewriting must never touch code or link targets. This module splits
//! text into prose and verbatim segments so the math passes can run on prose
//! only.
//!
//! Block level: fenced code (fence lines included), indented code blocks and
//! link reference definitions. Inline level, inside prose: code spans,
//! autolinks, HTML comments and inline link destinations.

use std::sync::LazyLock;

use regex::Regex;

static REFERENCE_DEFINITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}\[[^\^\]\n][^\]\n]*\]:[ \t]*\S").expect("valid reference regex")
});

static LIST_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}(?:[-*+]|\d{1,9}[.)])(?:[ \t]|$)").expect("valid list item regex")
});

static AUTOLINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<[A-Za-z][A-Za-z0-9+.\-]{1,31}:[^<>\x00-\x20]*>").expect("valid autolink regex")
});

/// A contiguous run of text that is either prose or verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub text: &'a str,
    pub verbatim: bool,
}

/// An opening fence: marker character and run length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fence {
    marker: char,
    len: usize,
}

/// Returns the fence on this line, if it is one.
///
/// A fence is at least three backticks or tildes at the start of a line, after
/// at most three leading spaces (four spaces is an indented code block).
fn fence_on_line(line: &str) -> Option<Fence> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let rest = &line[indent..];
    let marker = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = rest.chars().take_while(|c| *c == marker).count();
    (len >= 3).then_some(Fence { marker, len })
}

/// Returns true if this line opens or closes a fence.
pub fn is_fence_line(line: &str) -> bool {
    fence_on_line(line).is_some()
}

/// Tracks fence state line by line.
#[derive(Debug, Default)]
pub struct FenceTracker {
    open: Option<Fence>,
}

impl FenceTracker {
    /// Feeds one line. Returns true if the line belongs to a code block
    /// (including its opening and closing fence lines).
    pub fn observe(&mut self, line: &str) -> bool {
        let fence = fence_on_line(line);
        match (self.open, fence) {
            (None, Some(f)) => {
                self.open = Some(f);
                true
            }
            (Some(open), Some(f)) if f.marker == open.marker && f.len >= open.len => {
                // Closing fences carry no info string.
                let after = line.trim_start_matches(' ');
                let after = after.trim_start_matches(open.marker);
                if after.trim().is_empty() {
                    self.open = None;
                }
                true
            }
            (Some(_), _) => true,
            (None, None) => false,
        }
    }

    pub fn in_code_block(&self) -> bool {
        self.open.is_some()
    }
}

/// Four spaces or a tab: the indentation of an indented code block.
pub fn is_indented(line: &str) -> bool {
    line.starts_with("    ") || line.starts_with('\t')
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Splits text into prose and block-level verbatim segments: fenced code,
/// indented code and link reference definitions.
///
/// Indented lines only open a code block after a blank line, and never inside
/// a list, where they continue the list item instead.
pub fn split_blocks(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut tracker = FenceTracker::default();
    let mut seg_start = 0;
    let mut seg_verbatim = false;
    let mut pos = 0;
    let mut prev_blank = true;
    let mut prev_indented_code = false;
    let mut in_list = false;

    for line in text.split_inclusive('\n') {
        let content = line.trim_end_matches(['\n', '\r']);
        let blank = is_blank(content);

        let verbatim = if tracker.observe(content) {
            true
        } else if blank {
            false
        } else if is_indented(content) {
            !in_list && (prev_blank || prev_indented_code)
        } else {
            REFERENCE_DEFINITION.is_match(content)
        };

        if !blank && !verbatim {
            if LIST_ITEM.is_match(content) {
                in_list = true;
            } else if prev_blank && !is_indented(content) {
                in_list = false;
            }
        }
        prev_indented_code = verbatim && is_indented(content) && !tracker.in_code_block();
        prev_blank = blank;

        if verbatim != seg_verbatim && pos > seg_start {
            segments.push(Segment {
                text: &text[seg_start..pos],
                verbatim: seg_verbatim,
            });
            seg_start = pos;
        }
        seg_verbatim = verbatim;
        pos += line.len();
    }

    if pos > seg_start {
        segments.push(Segment {
            text: &text[seg_start..pos],
            verbatim: seg_verbatim,
        });
    }

    segments
}

/// Splits one prose block into text and inline verbatim segments: code
/// spans, autolinks, HTML comments and the `(…)` of inline links.
///
/// Backslash-escaped characters never open a region. Unmatched backtick runs
/// are plain text.
pub fn split_inline(text: &str) -> Vec<Segment<'_>> {
    let bytes = text.as_bytes();
    let mut segments = Vec::new();
    let mut prose_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let region = match bytes[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'`' => {
                let run = backtick_run(bytes, i);
                match code_span_end(text, i, run) {
                    Some(end) => Some((i, end)),
                    None => {
                        i += run;
                        continue;
                    }
                }
            }
            b'<' => html_end(text, i).map(|end| (i, end)),
            b']' if bytes.get(i + 1) == Some(&b'(') => {
                destination_end(text, i + 1).map(|end| (i + 1, end))
            }
            _ => None,
        };

        match region {
            Some((start, end)) => {
                if start > prose_start {
                    segments.push(Segment {
                        text: &text[prose_start..start],
                        verbatim: false,
                    });
                }
                segments.push(Segment {
                    text: &text[start..end],
                    verbatim: true,
                });
                prose_start = end;
                i = end;
            }
            None => i += 1,
        }
    }

    if prose_start < text.len() {
        segments.push(Segment {
            text: &text[prose_start..],
            verbatim: false,
        });
    }

    segments
}

/// Block and inline splitting combined.
///
/// Concatenating the segments' text yields the input exactly. An unterminated
/// fence extends to the end of the text.
pub fn split_verbatim(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    for block in split_blocks(text) {
        if block.verbatim {
            segments.push(block);
        } else {
            segments.extend(split_inline(block.text));
        }
    }
    segments
}

fn backtick_run(bytes: &[u8], start: usize) -> usize {
    bytes[start..].iter().take_while(|&&b| b == b'`').count()
}

/// End of the code span opened by a backtick run of length `run` at `start`:
/// the next run of exactly the same length, within the same paragraph.
fn code_span_end(text: &str, start: usize, run: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = start + run;
    while i < bytes.len() {
        if bytes[i] != b'`' {
            i += 1;
            continue;
        }
        let len = backtick_run(bytes, i);
        if len == run {
            return (!has_blank_line(&text[start..i])).then_some(i + len);
        }
        i += len;
    }
    None
}

/// True if a whole blank line sits inside `text`.
fn has_blank_line(text: &str) -> bool {
    let lines: Vec<&str> = text.split('\n').collect();
    lines.len() > 2 && lines[1..lines.len() - 1].iter().any(|l| is_blank(l))
}

fn html_end(text: &str, start: usize) -> Option<usize> {
    let rest = &text[start..];
    if let Some(body) = rest.strip_prefix("<!--") {
        return body.find("-->").map(|end| start + 4 + end + 3);
    }
    AUTOLINK.find(rest).map(|m| start + m.end())
}

/// End of a link destination starting at the `(` at `open`, balancing nested
/// parentheses. Gives up at a blank line.
fn destination_end(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            b'\n' if text[i + 1..].split('\n').next().is_some_and(is_blank) => return None,
            _ => {}
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verbatim_parts(text: &str) -> Vec<&str> {
        split_verbatim(text)
            .into_iter()
            .filter(|s| s.verbatim)
            .map(|s| s.text)
            .collect()
    }

    #[test]
    fn test_no_fences_single_prose_segment() {
        let segments = split_blocks("hello\nworld");
        assert_eq!(segments.len(), 1);
        assert!(!segments[0].verbatim);
    }

    #[test]
    fn test_fenced_block_is_isolated() {
        let text = "before\n```rust\nlet x = 1;\n```\nafter\n";
        let segments = split_blocks(text);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].text, "before\n");
        assert_eq!(segments[1].text, "```rust\nlet x = 1;\n```\n");
        assert!(segments[1].verbatim);
        assert_eq!(segments[2].text, "after\n");
        let joined: String = segments.iter().map(|s| s.text).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn test_unterminated_fence_runs_to_end() {
        let segments = split_blocks("text\n~~~\ncode $x$\n");
        assert_eq!(segments.len(), 2);
        assert!(segments[1].verbatim);
        assert!(segments[1].text.contains("$x$"));
    }

    #[test]
    fn test_mismatched_marker_does_not_close() {
        let mut tracker = FenceTracker::default();
        assert!(tracker.observe("```"));
        assert!(tracker.observe("~~~"));
        assert!(tracker.in_code_block());
        assert!(tracker.observe("```"));
        assert!(!tracker.in_code_block());
    }

    #[test]
    fn test_four_spaces_is_not_a_fence() {
        assert!(!is_fence_line("    ```"));
        assert!(is_fence_line("   ```python"));
        assert!(!is_fence_line("``inline``"));
    }

    #[test]
    fn test_indented_code_after_blank_line() {
        assert_eq!(
            verbatim_parts("Script:\n\n    echo $A   $B\n\tmore $C\nafter"),
            ["    echo $A   $B\n\tmore $C\n"]
        );
    }

    #[test]
    fn test_indented_paragraph_continuation_is_prose() {
        assert!(verbatim_parts("para\n    more $x$\n").is_empty());
    }

    #[test]
    fn test_indented_list_continuation_is_prose() {
        assert!(verbatim_parts("- item\n\n    more $x$\n").is_empty());
        assert!(verbatim_parts("1. one\n\n    - nested $y$\n").is_empty());
        assert_eq!(
            verbatim_parts("- item\n\nparagraph\n\n    code $z$\n"),
            ["    code $z$\n"]
        );
    }

    #[test]
    fn test_reference_definitions_are_verbatim() {
        assert_eq!(
            verbatim_parts("see [a]\n\n[a]: https://x.org/$y$\n"),
            ["[a]: https://x.org/$y$\n"]
        );
        assert!(verbatim_parts("[^1]: note $x$\n").is_empty());
    }

    #[test]
    fn test_code_spans_are_verbatim() {
        let segments = split_verbatim("Run `echo $HOME  $PATH` now");
        let parts: Vec<_> = segments.iter().map(|s| (s.text, s.verbatim)).collect();
        assert_eq!(
            parts,
            [
                ("Run ", false),
                ("`echo $HOME  $PATH`", true),
                (" now", false)
            ]
        );

        assert_eq!(verbatim_parts("a ``x ` y`` b"), ["``x ` y``"]);
    }

    #[test]
    fn test_unmatched_or_escaped_backticks_are_prose() {
        assert!(verbatim_parts("a ` b $x$").is_empty());
        assert!(verbatim_parts("a ``x` b").is_empty());
        assert!(verbatim_parts("\\`not code` $x$").is_empty());
        assert!(verbatim_parts("`a\n\nb`").is_empty());
        assert_eq!(verbatim_parts("`a\nb`"), ["`a\nb`"]);
    }

    #[test]
    fn test_link_destinations_are_verbatim() {
        assert_eq!(
            verbatim_parts("[docs](https://e.com/x^2) and x^2"),
            ["(https://e.com/x^2)"]
        );
        assert_eq!(
            verbatim_parts("[w](https://en.wikipedia.org/wiki/F_(x)) then"),
            ["(https://en.wikipedia.org/wiki/F_(x))"]
        );
        assert!(verbatim_parts("just (parens $x$)").is_empty());
    }

    #[test]
    fn test_autolinks_and_comments_are_verbatim() {
        assert_eq!(
            verbatim_parts("go <https://x.com/$a$> now"),
            ["<https://x.com/$a$>"]
        );
        assert_eq!(verbatim_parts("a <!-- $x$ --> b"), ["<!-- $x$ -->"]);
        assert!(verbatim_parts("a <b> c < d").is_empty());
    }

    #[test]
    fn test_segments_concatenate_to_input() {
        let inputs = [
            "# T\n\nUse `a` and [l](u(v)) <!-- c -->\n\n    code\n```\nf\n```\n",
            "é `ü` ² <https://ü.x> ](",
            "",
            "\\",
            "``",
        ];
        for input in inputs {
            let joined: String = split_verbatim(input).iter().map(|s| s.text).collect();
            assert_eq!(joined, input);
        }
    }
}
