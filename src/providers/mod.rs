//! External metadata providers.
//!
//! Two catalog searches sit behind [`MetadataProvider`]: a domestic one
//! ([`naver::NaverBooks`]) and an international one ([`google::GoogleBooks`]).
//! The domestic client also implements [`RetailerLinkLookup`].

use thiserror::Error;

use crate::models::{BookCandidate, UNKNOWN};

pub mod google;
pub mod http;
pub mod naver;

pub use google::GoogleBooks;
pub use naver::NaverBooks;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0} is not configured")]
    Unconfigured(&'static str),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{provider} returned HTTP {status}")]
    Status { provider: &'static str, status: u16 },

    #[error("could not decode response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Network-level failures that a retry might fix.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ProviderError::Transport(_) | ProviderError::Status { .. }
        )
    }
}

/// One provider search hit with every field defaulted when missing.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResult {
    pub title: String,
    pub authors: Vec<String>,
    pub publisher: String,
    pub published_date: String,
    pub description: String,
    pub thumbnail_url: String,
    pub identifiers: Vec<String>,
    pub retailer_link: Option<String>,
}

impl Default for RawResult {
    fn default() -> Self {
        Self {
            title: UNKNOWN.to_string(),
            authors: vec![],
            publisher: UNKNOWN.to_string(),
            published_date: UNKNOWN.to_string(),
            description: String::new(),
            thumbnail_url: String::new(),
            identifiers: vec![],
            retailer_link: None,
        }
    }
}

impl RawResult {
    pub fn into_candidate(self, source: &str) -> BookCandidate {
        let isbn = preferred_isbn(&self.identifiers);
        BookCandidate {
            title: self.title,
            authors: self.authors,
            publisher: self.publisher,
            published_date: self.published_date,
            isbn,
            identifiers: self.identifiers,
            description: self.description,
            thumbnail_url: self.thumbnail_url,
            retailer_link: self.retailer_link,
            source: source.to_string(),
            similarity: None,
        }
    }
}

/// ISBN-13 when present, otherwise the first identifier.
fn preferred_isbn(identifiers: &[String]) -> String {
    identifiers
        .iter()
        .find(|value| value.len() == 13 && value.chars().all(|ch| ch.is_ascii_digit()))
        .or_else(|| identifiers.first())
        .cloned()
        .unwrap_or_default()
}

pub trait MetadataProvider: Send + Sync {
    /// Short tag stored on candidates, e.g. `"naver"`.
    fn name(&self) -> &'static str;

    /// An empty list means "no results"; `Err` means the call itself failed.
    fn search(&self, query: &str) -> Result<Vec<RawResult>, ProviderError>;
}

/// Result of a best-effort lookup. `NotFound` is a normal answer;
/// `LookupFailed` means the lookup could not be performed.
#[derive(Debug)]
pub enum LookupOutcome {
    Found(String),
    NotFound,
    LookupFailed(ProviderError),
}

/// Finds a domestic retailer deep link for a book.
pub trait RetailerLinkLookup: Send + Sync {
    fn find_link(&self, title: &str, isbn: Option<&str>) -> LookupOutcome;
}
