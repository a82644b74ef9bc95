//! Text helpers shared by the email templates: slugs, tag stripping,
//! reading time and HTML escaping.

use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;

/// Average reading speed used for reading time estimates
const WORDS_PER_MINUTE: usize = 200;

lazy_static! {
    static ref NON_SLUG_CHARS: Regex = Regex::new(r"[^a-z0-9]+").unwrap();

    static ref HTML_TAG: Regex = Regex::new(r"<[^>]*>").unwrap();

    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();

    /// Line breaks and the end of block elements
    static ref BLOCK_BREAK: Regex = Regex::new(r"(?i)<br\s*/?>|</(p|div|li|h[1-6])\s*>").unwrap();

    static ref HORIZONTAL_SPACE: Regex = Regex::new(r"[^\S\n]+").unwrap();

    static ref BLANK_LINES: Regex = Regex::new(r"\n{3,}").unwrap();

    /// Markdown images and links: keep the label, drop the target
    static ref MARKDOWN_LINK: Regex = Regex::new(r"!?\[([^\]]*)\]\([^)]*\)").unwrap();

    /// Fenced and inline code markers, emphasis, headings, quotes, list bullets
    static ref MARKDOWN_SYNTAX: Regex =
        Regex::new(r"(?m)(```|`|\*\*|__|[*_~]|^\s{0,3}#{1,6}\s|^\s{0,3}>\s?|^\s*[-+]\s)").unwrap();
}

/// Build a URL slug from a job title and an optional company name.
///
/// The result only contains `[a-z0-9-]`, never starts or ends with a hyphen
/// and never has two hyphens in a row. A blank title yields an empty slug.
pub fn generate_slug(title: &str, company: Option<&str>) -> String {
    if title.trim().is_empty() {
        return String::new();
    }

    let source = match company.map(str::trim).filter(|c| !c.is_empty()) {
        Some(company) => format!("{} {}", title, company),
        None => title.to_string(),
    };

    // "Don't" is one word and "Ingénieur" keeps its letters
    let folded: String = source
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '\'' | '\u{2019}'))
        .map(fold_latin)
        .collect();

    NON_SLUG_CHARS
        .replace_all(&folded, "-")
        .trim_matches('-')
        .to_string()
}

/// ASCII base letter for common accented Latin letters
fn fold_latin(c: char) -> Cow<'static, str> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
        'ç' => "c",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => "o",
        'ù' | 'ú' | 'û' | 'ü' => "u",
        'ý' | 'ÿ' => "y",
        'ß' => "ss",
        'æ' => "ae",
        'œ' => "oe",
        _ => return Cow::Owned(c.to_string()),
    };
    Cow::Borrowed(folded)
}

/// Remove all tags from an HTML fragment and return readable text.
///
/// Decodes `&nbsp;`, `&amp;`, `&lt;`, `&gt;` and `&quot;`, then collapses
/// runs of whitespace into single spaces.
pub fn strip_html_tags<'a>(html: impl Into<Option<&'a str>>) -> String {
    let Some(html) = html.into() else {
        return String::new();
    };
    if html.is_empty() {
        return String::new();
    }

    let without_tags = HTML_TAG.replace_all(html, " ");
    let decoded = decode_entities(&without_tags);

    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}

/// Like [`strip_html_tags`], but keeps line structure: `<br>`, closing block
/// tags and newlines become line breaks, at most one blank line in a row.
pub fn strip_html_tags_keep_lines(html: &str) -> String {
    let with_breaks = BLOCK_BREAK.replace_all(html, "\n");
    let without_tags = HTML_TAG.replace_all(&with_breaks, " ");
    let decoded = decode_entities(&without_tags);

    let lines = decoded
        .lines()
        .map(|line| HORIZONTAL_SPACE.replace_all(line, " ").trim().to_string())
        .collect::<Vec<_>>()
        .join("\n");

    BLANK_LINES.replace_all(&lines, "\n\n").trim().to_string()
}

/// `&amp;` last so escaped entities are not decoded twice
fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

/// Estimated reading time in whole minutes, rounded up. Empty content is 0.
pub fn calculate_reading_time(content: &str) -> u32 {
    let words = count_words(content);
    words.div_ceil(WORDS_PER_MINUTE) as u32
}

fn count_words(content: &str) -> usize {
    let text = strip_html_tags(content);
    let text = MARKDOWN_LINK.replace_all(&text, "$1");
    let text = MARKDOWN_SYNTAX.replace_all(&text, " ");

    text.split_whitespace()
        .filter(|word| word.chars().any(char::is_alphanumeric))
        .count()
}

/// Escape HTML special characters
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Capitalize the first character for display
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().chain(chars).collect(),
    }
}
