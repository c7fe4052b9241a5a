//! Text normalisation for the PDF text layer and OCR transcriptions.
//!
//! PDFium returns text exactly as the producer laid it out: `\r\n` line
//! endings from Windows generators, runs of trailing spaces used for column
//! alignment, zero-width characters and soft hyphens from word processors.
//! None of it carries meaning for the analysis prompt. The rules here never
//! change visible characters.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so the per-line rules see `\n` only.
//! Invisible characters are removed before trimming so a line ending in
//! `U+200B` is still trimmed.

use once_cell::sync::Lazy;
use regex::Regex;

/// Clean one page of text-layer output.
///
/// Whitespace-only input becomes the empty string, so callers can test
/// emptiness with `is_empty()`.
pub fn clean_page_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim_matches('\n').to_string()
}

/// Clean a vision-model transcription: strip outer fences, then apply the
/// page rules.
pub fn clean_transcription(input: &str) -> String {
    clean_page_text(&strip_markdown_fences(input))
}

/// Join per-page text with a blank line between pages. Empty pages are
/// skipped so they do not leave gaps.
pub fn join_pages<S: AsRef<str>>(pages: &[S]) -> String {
    pages
        .iter()
        .map(AsRef::as_ref)
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ── Outer fences ─────────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|text|md)?\n(.*)\n```\s*$").unwrap());

fn strip_markdown_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Line endings ─────────────────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Trailing whitespace ──────────────────────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Blank lines ──────────────────────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").into_owned()
}

// ── Invisible Unicode ────────────────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}
