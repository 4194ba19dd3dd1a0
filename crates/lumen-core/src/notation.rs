//! Unicode math notation normalization.
//!
//! Models frequently emit "pretty" math (`x²`, `√2`, `a ≤ b`, `π`) instead of
//! LaTeX. This module rewrites those glyphs into their LaTeX command form so
//! that the math detector downstream only has to recognize one notation.
//!
//! Both passes are pure, total and idempotent.

use std::sync::LazyLock;

use regex::Regex;

/// Glyph → LaTeX table. Targets never contain a source glyph, so the order of
/// replacement is irrelevant.
const GLYPHS: &[(char, &str)] = &[
    ('√', "\\sqrt"),
    ('×', "\\times"),
    ('÷', "\\div"),
    ('±', "\\pm"),
    ('≈', "\\approx"),
    ('≠', "\\neq"),
    ('≤', "\\leq"),
    ('≥', "\\geq"),
    ('∞', "\\infty"),
    ('α', "\\alpha"),
    ('β', "\\beta"),
    ('γ', "\\gamma"),
    ('δ', "\\delta"),
    ('ε', "\\epsilon"),
    ('θ', "\\theta"),
    ('λ', "\\lambda"),
    ('μ', "\\mu"),
    ('π', "\\pi"),
    ('σ', "\\sigma"),
    ('φ', "\\phi"),
    ('ω', "\\omega"),
    ('Δ', "\\Delta"),
    ('Σ', "\\Sigma"),
    ('Π', "\\Pi"),
    ('Ω', "\\Omega"),
];

static SQRT_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\sqrt\s*(\d+)").expect("valid regex"));

// No nested parentheses: inner groups are rewritten first, then the outer one
// on the next round.
static SQRT_PARENS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\sqrt\s*\(([^()]+)\)").expect("valid regex"));

/// Maps a superscript digit glyph to its ASCII digit.
fn superscript_digit(c: char) -> Option<char> {
    match c {
        '⁰' => Some('0'),
        '¹' => Some('1'),
        '²' => Some('2'),
        '³' => Some('3'),
        '⁴' => Some('4'),
        '⁵' => Some('5'),
        '⁶' => Some('6'),
        '⁷' => Some('7'),
        '⁸' => Some('8'),
        '⁹' => Some('9'),
        _ => None,
    }
}

fn glyph_command(c: char) -> Option<&'static str> {
    GLYPHS
        .iter()
        .find_map(|(glyph, command)| (*glyph == c).then_some(*command))
}

/// Full normalization: glyph replacement followed by `\sqrt` bracing.
pub fn normalize(text: &str) -> String {
    fix_sqrt(&replace_glyphs(text))
}

/// Replaces unicode math glyphs with LaTeX commands.
///
/// A run of superscript digits becomes a single exponent (`x²³` → `x^{23}`).
/// A command followed directly by an ASCII letter gets a separating space so
/// that `αx` becomes `\alpha x` rather than the unknown `\alphax`.
pub fn replace_glyphs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(digit) = superscript_digit(c) {
            let mut digits = String::from(digit);
            while let Some(next) = chars.peek().copied().and_then(superscript_digit) {
                digits.push(next);
                chars.next();
            }
            if digits.len() == 1 {
                out.push('^');
                out.push_str(&digits);
            } else {
                out.push_str("^{");
                out.push_str(&digits);
                out.push('}');
            }
            continue;
        }

        if let Some(command) = glyph_command(c) {
            out.push_str(command);
            if chars.peek().is_some_and(char::is_ascii_alphabetic) {
                out.push(' ');
            }
            continue;
        }

        out.push(c);
    }

    out
}

/// Rewrites `\sqrt N` and `\sqrt(expr)` into `\sqrt{N}` / `\sqrt{expr}`.
///
/// Already-braced forms are left untouched. Runs until no rewrite applies,
/// which terminates because every round removes at least one paren pair or
/// braces at least one digit run.
pub fn fix_sqrt(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let braced = SQRT_DIGITS.replace_all(&current, r"\sqrt{$1}");
        let braced = SQRT_PARENS.replace_all(&braced, r"\sqrt{$1}").into_owned();
        if braced == current {
            return current;
        }
        current = braced;
    }
}
