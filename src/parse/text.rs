//! Text post-processing for feed contents
//!
//! Feed texts regularly contain HTML. Clients that cannot render it can
//! request a processed variant: plain text with tags stripped, or a
//! Markdown-flavoured conversion.

use std::borrow::Cow;

use regex::Regex;

/// Text processors selectable through the `process_text` parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextProcessor {
    StripHtml,
    Markdown,
}

impl TextProcessor {
    /// Parse the `process_text` request parameter
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "strip_html" => Some(Self::StripHtml),
            "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }

    pub fn process(&self, input: &str) -> String {
        match self {
            Self::StripHtml => strip_html(input),
            Self::Markdown => to_markdown(input),
        }
    }
}

/// Remove HTML tags and decode entities so the text can be displayed in
/// a plain text view
///
/// Line-breaking elements (`<br>`, `<ul>`, `</li>`, `<p>`) become newline
/// equivalents and `<li>` becomes a bullet before tags are dropped.
pub fn strip_html(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }

    let newline_tags = Regex::new(r"(?i)(<br[^>]*>|</?ul[^>]*>|</li>)").expect("Invalid regex");
    let listing_tags = Regex::new(r"(?i)<li[^>]*>").expect("Invalid regex");
    let paragraph_tags = Regex::new(r"(?i)<p>").expect("Invalid regex");
    let strip_tags = Regex::new(r"<[^>]*>").expect("Invalid regex");
    let collapse_newlines = Regex::new(r"([\r\n]{2})[\r\n]+").expect("Invalid regex");

    // Convert common HTML elements to their text equivalent
    let result = newline_tags.replace_all(input, "\n");
    let result = listing_tags.replace_all(&result, "\n * ");
    let result = paragraph_tags.replace_all(&result, "\n\n");

    // Remove all remaining HTML/XML tags
    let result = strip_tags.replace_all(&result, "");

    let result = decode_entities(&result);

    let result = collapse_newlines.replace_all(&result, "$1");

    result.trim().to_string()
}

/// Convert HTML to Markdown-flavoured plain text
fn to_markdown(input: &str) -> String {
    html2text::from_read(input.as_bytes(), 200)
        .map(|text| text.trim().to_string())
        .unwrap_or_default()
}

/// Decode numeric and common named HTML entities
fn decode_entities(input: &str) -> String {
    let numeric = Regex::new(r"&#(\d{2,4});").expect("Invalid regex");
    let decoded = numeric.replace_all(input, |caps: &regex::Captures| {
        caps[1]
            .parse::<u32>()
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });

    decode_named_entities(&decoded).into_owned()
}

fn decode_named_entities(input: &str) -> Cow<'_, str> {
    if !input.contains('&') {
        return Cow::Borrowed(input);
    }

    let entities = [
        ("&amp;", "&"),
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&apos;", "'"),
        ("&nbsp;", " "),
        ("&ndash;", "\u{2013}"),
        ("&mdash;", "\u{2014}"),
        ("&hellip;", "\u{2026}"),
        ("&ldquo;", "\u{201C}"),
        ("&rdquo;", "\u{201D}"),
        ("&lsquo;", "\u{2018}"),
        ("&rsquo;", "\u{2019}"),
        ("&bull;", "\u{2022}"),
        ("&middot;", "\u{B7}"),
        ("&copy;", "\u{A9}"),
        ("&reg;", "\u{AE}"),
        ("&trade;", "\u{2122}"),
        ("&auml;", "\u{E4}"),
        ("&ouml;", "\u{F6}"),
        ("&uuml;", "\u{FC}"),
        ("&szlig;", "\u{DF}"),
    ];

    let mut result = input.to_string();
    for (entity, replacement) in &entities {
        result = result.replace(entity, replacement);
    }

    Cow::Owned(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html_basic() {
        assert_eq!(strip_html(""), "");
        assert_eq!(strip_html("plain text"), "plain text");
        assert_eq!(strip_html("<p>Hello</p>"), "Hello");
        assert_eq!(
            strip_html("<div>Test <strong>bold</strong> text</div>"),
            "Test bold text"
        );
    }

    #[test]
    fn test_strip_html_line_breaks() {
        assert_eq!(strip_html("one<br>two"), "one\ntwo");
        assert_eq!(strip_html("one<br />two"), "one\ntwo");
        assert_eq!(strip_html("a<p>b"), "a\n\nb");
    }

    #[test]
    fn test_strip_html_lists() {
        let html = "<ul><li>first</li><li>second</li></ul>";
        let result = strip_html(html);
        assert!(result.contains("* first"));
        assert!(result.contains("* second"));
    }

    #[test]
    fn test_strip_html_entities() {
        assert_eq!(strip_html("Hello &amp; goodbye"), "Hello & goodbye");
        assert_eq!(strip_html("&lt;tag&gt;"), "<tag>");
        assert_eq!(strip_html("caf&#101;"), "cafe");
    }

    #[test]
    fn test_strip_html_collapses_newline_runs() {
        assert_eq!(strip_html("a\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_processor_from_name() {
        assert_eq!(
            TextProcessor::from_name("strip_html"),
            Some(TextProcessor::StripHtml)
        );
        assert_eq!(
            TextProcessor::from_name("markdown"),
            Some(TextProcessor::Markdown)
        );
        assert_eq!(TextProcessor::from_name("none"), None);
        assert_eq!(TextProcessor::from_name(""), None);
    }

    #[test]
    fn test_markdown_processor() {
        let result = TextProcessor::Markdown.process("<p>Hello <em>world</em></p>");
        assert!(result.contains("Hello"));
        assert!(!result.contains("<p>"));
    }
}
