//! Title-similarity filtering for title-path search results.

use std::collections::HashSet;

use crate::models::BookCandidate;
use crate::query::is_hangul;

/// Candidates scoring below this are dropped.
pub const MIN_SIMILARITY: f64 = 0.3;
/// Score given when the query or the candidate title has no comparable words.
pub const NEUTRAL_SIMILARITY: f64 = 0.5;

/// Scores `candidates` against `original_query`, drops weak matches and
/// returns the survivors sorted by descending similarity. Ties keep the
/// provider's order.
pub fn filter_candidates(
    candidates: Vec<BookCandidate>,
    original_query: &str,
) -> Vec<BookCandidate> {
    let query_words = tokenize(original_query);
    let mut kept: Vec<BookCandidate> = candidates
        .into_iter()
        .filter_map(|mut candidate| {
            let title_words = tokenize(&candidate.title);
            let score = if query_words.is_empty() || title_words.is_empty() {
                NEUTRAL_SIMILARITY
            } else {
                overlap(&query_words, &title_words)
            };
            if score < MIN_SIMILARITY {
                log::debug!(
                    "dropping candidate \"{}\" (score {:.2}) for \"{}\"",
                    candidate.title,
                    score,
                    original_query
                );
                return None;
            }
            candidate.similarity = Some(score);
            Some(candidate)
        })
        .collect();
    kept.sort_by(|a, b| {
        let a = a.similarity.unwrap_or_default();
        let b = b.similarity.unwrap_or_default();
        b.total_cmp(&a)
    });
    kept
}

/// Shared-word ratio of two titles: |A ∩ B| / min(|A|, |B|). Zero when
/// either side has no words.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a_words = tokenize(a);
    let b_words = tokenize(b);
    if a_words.is_empty() || b_words.is_empty() {
        return 0.0;
    }
    overlap(&a_words, &b_words)
}

fn overlap(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let shared = a.intersection(b).count();
    shared as f64 / a.len().min(b.len()) as f64
}

fn tokenize(value: &str) -> HashSet<String> {
    value
        .to_lowercase()
        .replace(|ch: char| !is_word_char(ch), " ")
        .split_whitespace()
        .map(|token| token.to_string())
        .collect()
}

pub(crate) fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || is_hangul(ch)
}

#[cfg(test)]
mod tests {
    use super::{filter_candidates, similarity, NEUTRAL_SIMILARITY};
    use crate::models::BookCandidate;

    fn candidate(title: &str) -> BookCandidate {
        BookCandidate {
            title: title.to_string(),
            authors: vec![],
            publisher: "Unknown".to_string(),
            published_date: "Unknown".to_string(),
            isbn: String::new(),
            identifiers: vec![],
            description: String::new(),
            thumbnail_url: String::new(),
            retailer_link: None,
            source: "google".to_string(),
            similarity: None,
        }
    }

    #[test]
    fn identical_titles_score_one_and_disjoint_zero() {
        assert_eq!(similarity("Clean Code", "clean code!"), 1.0);
        assert_eq!(similarity("클린 코드", "클린 코드"), 1.0);
        assert_eq!(similarity("Clean Code", "Dune"), 0.0);
        assert_eq!(similarity("", "Dune"), 0.0);
    }

    #[test]
    fn overlap_is_relative_to_the_shorter_title() {
        assert_eq!(
            similarity("Clean Code", "Clean Code: A Handbook of Agile Software"),
            1.0
        );
        assert_eq!(similarity("Clean Architecture", "Clean Code"), 0.5);
    }

    #[test]
    fn filter_drops_disjoint_and_sorts_descending() {
        let ranked = filter_candidates(
            vec![
                candidate("Clean Architecture Guide Book"),
                candidate("Dune"),
                candidate("Clean Code"),
                candidate("The Clean Coder"),
            ],
            "Clean Code",
        );
        let titles: Vec<&str> = ranked.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Clean Code", "Clean Architecture Guide Book", "The Clean Coder"]
        );
        let scores: Vec<f64> = ranked.iter().map(|c| c.similarity.unwrap()).collect();
        assert!(scores.windows(2).all(|pair| pair[0] >= pair[1]));
    }

    #[test]
    fn titles_without_words_get_neutral_score() {
        let ranked = filter_candidates(vec![candidate("!!!")], "Clean Code");
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].similarity, Some(NEUTRAL_SIMILARITY));

        let ranked = filter_candidates(vec![candidate("Dune")], "---");
        assert_eq!(ranked[0].similarity, Some(NEUTRAL_SIMILARITY));
    }

    #[test]
    fn empty_input_stays_empty() {
        assert!(filter_candidates(vec![], "Clean Code").is_empty());
    }
}
