//! Query classification: ISBN vs. title, Korean vs. other script, and the
//! cleaned-up search text sent to providers.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Parenthesised runs this long are blurbs or edition notes, not part of the title.
const MIN_NOISE_PAREN_CHARS: usize = 20;
/// A trailing subtitle is only dropped when it is at least this long...
const MIN_SUBTITLE_CHARS: usize = 10;
/// ...and the whole title is longer than this.
const MIN_TITLE_FOR_SUBTITLE_STRIP: usize = 10;
/// Cleaned text shorter than this is discarded in favour of the raw query.
const MIN_SEARCH_CHARS: usize = 3;

static ISBN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d{13}|\d{9}[\dXx])$").expect("valid isbn regex"));
static NOISE_PAREN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\([^)]{{{},}}\)", MIN_NOISE_PAREN_CHARS)).expect("valid paren regex")
});
static SUBTITLE_SEP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+[-–—:]\s+|:\s+").expect("valid separator regex"));
static MULTI_SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Isbn,
    Title,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Script {
    Korean,
    Other,
}

/// A classified lookup request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookQuery {
    raw: String,
    kind: QueryKind,
    script: Script,
    search_text: String,
}

impl BookQuery {
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn script(&self) -> Script {
        self.script
    }

    /// For ISBN queries, the code without separators.
    pub fn search_text(&self) -> &str {
        &self.search_text
    }

    pub fn is_isbn(&self) -> bool {
        self.kind == QueryKind::Isbn
    }
}

/// Classifies a single-item lookup. ISBN-shaped input is tagged as such.
pub fn classify(raw: &str) -> BookQuery {
    let raw = raw.trim();
    if let Some(code) = isbn_code(raw) {
        return BookQuery {
            raw: raw.to_string(),
            kind: QueryKind::Isbn,
            script: Script::Other,
            search_text: code,
        };
    }
    classify_title(raw)
}

/// Classifies input that must be treated as a literal title, as bulk
/// ingestion and background updates do, even when it looks like an ISBN.
pub fn classify_title(raw: &str) -> BookQuery {
    let raw = raw.trim();
    BookQuery {
        raw: raw.to_string(),
        kind: QueryKind::Title,
        script: detect_script(raw),
        search_text: preprocess_title(raw),
    }
}

/// Returns the separator-free code when `value` is shaped like an ISBN-10 or ISBN-13.
/// Check digits are not validated.
pub fn isbn_code(value: &str) -> Option<String> {
    let stripped: String = value
        .chars()
        .filter(|ch| !ch.is_whitespace() && *ch != '-')
        .collect();
    if ISBN_RE.is_match(&stripped) {
        Some(stripped.to_ascii_uppercase())
    } else {
        None
    }
}

pub fn is_hangul(ch: char) -> bool {
    matches!(ch,
        '\u{AC00}'..='\u{D7A3}'   // syllables
        | '\u{1100}'..='\u{11FF}' // jamo
        | '\u{3130}'..='\u{318F}' // compatibility jamo
        | '\u{A960}'..='\u{A97F}' // jamo extended-A
        | '\u{D7B0}'..='\u{D7FF}' // jamo extended-B
    )
}

pub fn detect_script(text: &str) -> Script {
    if text.chars().any(is_hangul) {
        Script::Korean
    } else {
        Script::Other
    }
}

/// Cleans a title for searching. The stored title is never replaced by this.
pub fn preprocess_title(title: &str) -> String {
    let original = title.trim();

    let without_blurbs = NOISE_PAREN_RE.replace_all(original, " ");
    let mut cleaned = collapse_whitespace(&without_blurbs);

    if cleaned.chars().count() > MIN_TITLE_FOR_SUBTITLE_STRIP {
        if let Some(head) = strip_subtitle(&cleaned) {
            cleaned = head;
        }
    }

    if cleaned.chars().count() < MIN_SEARCH_CHARS {
        return collapse_whitespace(original);
    }
    cleaned
}

fn strip_subtitle(title: &str) -> Option<String> {
    let separator = SUBTITLE_SEP_RE.find(title)?;
    let head = title[..separator.start()].trim();
    let tail = title[separator.end()..].trim();
    if head.is_empty() || tail.chars().count() < MIN_SUBTITLE_CHARS {
        return None;
    }
    Some(head.to_string())
}

fn collapse_whitespace(value: &str) -> String {
    MULTI_SPACE_RE.replace_all(value.trim(), " ").into_owned()
}
