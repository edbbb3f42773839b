use std::sync::Arc;

use crate::catalog::CatalogRepository;
use crate::error::Result;
use crate::ranking::is_word_char;

/// Checks candidate titles and ISBNs against the catalog. Read-only.
#[derive(Clone)]
pub struct DuplicateDetector {
    catalog: Arc<dyn CatalogRepository>,
}

impl DuplicateDetector {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { catalog }
    }

    /// A matching ISBN is a duplicate regardless of title. Otherwise titles
    /// must be equal after [`normalize_title`].
    pub fn is_duplicate(&self, title: &str, isbn: Option<&str>) -> Result<bool> {
        if let Some(isbn) = isbn.map(normalize_isbn).filter(|isbn| !isbn.is_empty()) {
            let hit = self
                .catalog
                .list_isbns()?
                .iter()
                .any(|stored| normalize_isbn(stored) == isbn);
            if hit {
                return Ok(true);
            }
        }

        let wanted = normalize_title(title);
        if wanted.is_empty() {
            return Ok(false);
        }
        Ok(self
            .catalog
            .list_titles()?
            .iter()
            .any(|stored| normalize_title(stored) == wanted))
    }
}

pub fn normalize_isbn(value: &str) -> String {
    value
        .chars()
        .filter(|ch| *ch != '-' && !ch.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Lowercase, keep only word characters, then squash runs of three or more
/// identical characters to one.
pub fn normalize_title(value: &str) -> String {
    let kept: Vec<char> = value
        .to_lowercase()
        .chars()
        .filter(|ch| is_word_char(*ch))
        .collect();

    let mut normalized = String::with_capacity(kept.len());
    let mut index = 0;
    while index < kept.len() {
        let ch = kept[index];
        let mut run = 1;
        while index + run < kept.len() && kept[index + run] == ch {
            run += 1;
        }
        let emit = if run >= 3 { 1 } else { run };
        normalized.extend(std::iter::repeat(ch).take(emit));
        index += run;
    }
    normalized
}
