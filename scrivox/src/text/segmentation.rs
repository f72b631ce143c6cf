/// Paragraph segmentation for recognized text
/// OCR output keeps the page's blank lines; we turn those into paragraph
/// boundaries and drop everything else that is only whitespace.
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

/// Separator placed between paragraphs when rendering.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

lazy_static! {
    // A newline followed by one or more whitespace-only lines.
    static ref PARAGRAPH_BREAK: Regex = Regex::new(r"\n(?:[^\S\n]*\n)+").unwrap();
}

/// A trimmed, non-empty span of text. Only [`segment`] creates these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Paragraph(String);

impl Paragraph {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Paragraph {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Paragraph {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for Paragraph {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Paragraph {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Paragraphs joined with [`PARAGRAPH_SEPARATOR`]. This is what gets shown,
/// read aloud and exported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DisplayText(String);

impl DisplayText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn paragraphs(&self) -> Vec<Paragraph> {
        segment(&self.0)
    }
}

impl AsRef<str> for DisplayText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayText {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<DisplayText> for String {
    fn from(text: DisplayText) -> Self {
        text.0
    }
}

/// Split raw text into paragraphs on runs of blank lines.
///
/// Lines holding only whitespace count as blank. Every span is trimmed and
/// spans that end up empty are dropped, so whitespace-only input yields no
/// paragraphs and input without a blank line yields exactly one.
pub fn segment(raw: &str) -> Vec<Paragraph> {
    PARAGRAPH_BREAK
        .split(raw)
        .map(str::trim)
        .filter(|span| !span.is_empty())
        .map(|span| Paragraph(span.to_string()))
        .collect()
}

/// Join paragraphs with a single blank line between each.
pub fn render(paragraphs: &[Paragraph]) -> DisplayText {
    let joined = paragraphs
        .iter()
        .map(Paragraph::as_str)
        .collect::<Vec<_>>()
        .join(PARAGRAPH_SEPARATOR);
    DisplayText(joined)
}

/// `render(&segment(raw))`
pub fn normalize(raw: &str) -> DisplayText {
    render(&segment(raw))
}
