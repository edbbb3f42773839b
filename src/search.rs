//! Provider fan-out for one classified query.
//!
//! ISBN queries go to the provider that owns the ISBN's region first and try
//! a few query spellings before moving on. Title queries go to the provider
//! matching the title's script first, and every non-empty answer is ranked;
//! the other provider is only consulted when that leaves nothing.

use std::sync::Arc;

use crate::config::ProvidersConfig;
use crate::duplicates::normalize_isbn;
use crate::models::BookCandidate;
use crate::providers::{
    GoogleBooks, LookupOutcome, MetadataProvider, NaverBooks, ProviderError, RetailerLinkLookup,
};
use crate::query::{BookQuery, Script};
use crate::ranking::filter_candidates;

const DOMESTIC_ISBN13_PREFIXES: [&str; 3] = ["979", "97889", "97811"];
const DOMESTIC_ISBN10_PREFIX: &str = "89";

pub struct SearchOrchestrator {
    domestic: Arc<dyn MetadataProvider>,
    international: Arc<dyn MetadataProvider>,
    links: Option<Arc<dyn RetailerLinkLookup>>,
}

impl SearchOrchestrator {
    pub fn new(
        domestic: Arc<dyn MetadataProvider>,
        international: Arc<dyn MetadataProvider>,
    ) -> Self {
        Self {
            domestic,
            international,
            links: None,
        }
    }

    pub fn with_link_lookup(mut self, links: Arc<dyn RetailerLinkLookup>) -> Self {
        self.links = Some(links);
        self
    }

    /// Naver as the domestic provider and link lookup, Google Books as the
    /// international one.
    pub fn from_config(config: &ProvidersConfig) -> Result<Self, ProviderError> {
        let naver = Arc::new(NaverBooks::new(config)?);
        let google = Arc::new(GoogleBooks::new(config)?);
        Ok(Self::new(naver.clone(), google).with_link_lookup(naver))
    }

    /// Name of the provider consulted first for `query`.
    pub fn primary_provider(&self, query: &BookQuery) -> &'static str {
        self.provider_order(query)[0].name()
    }

    /// Like [`try_resolve`](Self::try_resolve), with transport failures
    /// degraded to an empty list.
    pub fn resolve(&self, query: &BookQuery) -> Vec<BookCandidate> {
        match self.try_resolve(query) {
            Ok(candidates) => candidates,
            Err(err) => {
                log::warn!("lookup for \"{}\" failed: {}", query.raw(), err);
                vec![]
            }
        }
    }

    /// Ordered candidates, best first. An empty list means no provider had
    /// a usable answer. `Err` is returned only when every provider call that
    /// was made failed at the transport level, so a retry may help.
    pub fn try_resolve(&self, query: &BookQuery) -> Result<Vec<BookCandidate>, ProviderError> {
        let mut tally = CallTally::default();
        let found = if query.is_isbn() {
            self.resolve_isbn(query, &mut tally)
        } else {
            self.resolve_title(query, &mut tally)
        };
        match found {
            Some(candidates) => Ok(self.attach_retailer_link(candidates)),
            None => tally.into_empty_result(),
        }
    }

    fn provider_order(&self, query: &BookQuery) -> [&Arc<dyn MetadataProvider>; 2] {
        let domestic_first = if query.is_isbn() {
            is_domestic_isbn(query.search_text())
        } else {
            query.script() == Script::Korean
        };
        if domestic_first {
            [&self.domestic, &self.international]
        } else {
            [&self.international, &self.domestic]
        }
    }

    fn resolve_isbn(&self, query: &BookQuery, tally: &mut CallTally) -> Option<Vec<BookCandidate>> {
        let code = query.search_text();
        let variants = isbn_variants(query.raw(), code);
        for provider in self.provider_order(query) {
            for variant in &variants {
                let found = self.call(provider.as_ref(), &variant.text, tally);
                let accepted: Vec<BookCandidate> = if variant.trusted {
                    found
                } else {
                    found
                        .into_iter()
                        .filter(|candidate| candidate_matches_isbn(candidate, code))
                        .collect()
                };
                if !accepted.is_empty() {
                    log::debug!(
                        "isbn {} resolved by {} via \"{}\"",
                        code,
                        provider.name(),
                        variant.text
                    );
                    return Some(accepted);
                }
            }
        }
        None
    }

    fn resolve_title(
        &self,
        query: &BookQuery,
        tally: &mut CallTally,
    ) -> Option<Vec<BookCandidate>> {
        for provider in self.provider_order(query) {
            let found = self.call(provider.as_ref(), query.search_text(), tally);
            if found.is_empty() {
                continue;
            }
            let ranked = filter_candidates(found, query.raw());
            if !ranked.is_empty() {
                return Some(ranked);
            }
            log::debug!(
                "no {} result for \"{}\" survived ranking",
                provider.name(),
                query.raw()
            );
        }
        None
    }

    fn call(
        &self,
        provider: &dyn MetadataProvider,
        text: &str,
        tally: &mut CallTally,
    ) -> Vec<BookCandidate> {
        match provider.search(text) {
            Ok(results) => {
                tally.attempted += 1;
                results
                    .into_iter()
                    .map(|result| result.into_candidate(provider.name()))
                    .collect()
            }
            Err(ProviderError::Unconfigured(name)) => {
                log::debug!("skipping {}: not configured", name);
                vec![]
            }
            Err(err) => {
                tally.attempted += 1;
                log::warn!("{} search for \"{}\" failed: {}", provider.name(), text, err);
                if err.is_transport() {
                    tally.transport_failures += 1;
                    tally.last_error = Some(err);
                }
                vec![]
            }
        }
    }

    fn attach_retailer_link(&self, mut candidates: Vec<BookCandidate>) -> Vec<BookCandidate> {
        let Some(links) = &self.links else {
            return candidates;
        };
        let Some(top) = candidates.first_mut() else {
            return candidates;
        };
        if top.retailer_link.is_some() {
            return candidates;
        }
        let isbn = Some(top.isbn.as_str()).filter(|isbn| !isbn.is_empty());
        match links.find_link(&top.title, isbn) {
            LookupOutcome::Found(link) => top.retailer_link = Some(link),
            LookupOutcome::NotFound => {}
            LookupOutcome::LookupFailed(err) => {
                log::log!(
                    link_failure_level(&err),
                    "retailer link lookup for \"{}\" failed: {}",
                    top.title,
                    err
                );
            }
        }
        candidates
    }
}

/// A lookup that was never configured is expected, not degraded.
fn link_failure_level(err: &ProviderError) -> log::Level {
    match err {
        ProviderError::Unconfigured(_) => log::Level::Debug,
        _ => log::Level::Warn,
    }
}

#[derive(Default)]
struct CallTally {
    attempted: usize,
    transport_failures: usize,
    last_error: Option<ProviderError>,
}

impl CallTally {
    fn into_empty_result(self) -> Result<Vec<BookCandidate>, ProviderError> {
        match self.last_error {
            Some(err) if self.attempted > 0 && self.transport_failures == self.attempted => Err(err),
            _ => Ok(vec![]),
        }
    }
}

struct IsbnVariant {
    text: String,
    /// Results for this spelling are taken without checking their ISBN.
    trusted: bool,
}

fn isbn_variants(raw: &str, code: &str) -> Vec<IsbnVariant> {
    let mut variants = vec![];
    let raw = raw.trim();
    if raw != code {
        variants.push(IsbnVariant {
            text: raw.to_string(),
            trusted: false,
        });
    }
    variants.push(IsbnVariant {
        text: code.to_string(),
        trusted: true,
    });
    variants.push(IsbnVariant {
        text: format!("isbn:{}", code),
        trusted: false,
    });
    variants
}

pub fn is_domestic_isbn(code: &str) -> bool {
    match code.len() {
        13 => DOMESTIC_ISBN13_PREFIXES
            .iter()
            .any(|prefix| code.starts_with(prefix)),
        10 => code.starts_with(DOMESTIC_ISBN10_PREFIX),
        _ => false,
    }
}

/// Substring match in either direction so ISBN-10 and ISBN-13 forms of the
/// same book line up.
fn candidate_matches_isbn(candidate: &BookCandidate, code: &str) -> bool {
    std::iter::once(&candidate.isbn)
        .chain(candidate.identifiers.iter())
        .map(|value| normalize_isbn(value))
        .filter(|value| !value.is_empty())
        .any(|value| value.contains(code) || code.contains(value.as_str()))
}

#[cfg(test)]
mod tests {
    use super::{is_domestic_isbn, link_failure_level, SearchOrchestrator};
    use crate::config::ProvidersConfig;
    use crate::providers::{NaverBooks, ProviderError};
    use crate::query::{classify, classify_title};
    use crate::test_support::{call_log, calls, raw, FakeLinks, FakeProvider};
    use std::sync::Arc;

    fn orchestrator(domestic: FakeProvider, international: FakeProvider) -> SearchOrchestrator {
        SearchOrchestrator::new(Arc::new(domestic), Arc::new(international))
    }

    #[test]
    fn domestic_prefixes() {
        assert!(is_domestic_isbn("9788936434267"));
        assert!(is_domestic_isbn("9791190090018"));
        assert!(is_domestic_isbn("8936434267"));
        assert!(!is_domestic_isbn("9780134685991"));
        assert!(!is_domestic_isbn("0134685997"));
    }

    #[test]
    fn domestic_isbn_queries_domestic_provider_first() {
        let log = call_log();
        let search = orchestrator(
            FakeProvider::new("naver", &log),
            FakeProvider::new("google", &log),
        );
        let query = classify("9788936434267");

        assert!(search.try_resolve(&query).expect("resolve").is_empty());
        assert_eq!(
            calls(&log),
            vec![
                "naver:9788936434267",
                "naver:isbn:9788936434267",
                "google:9788936434267",
                "google:isbn:9788936434267",
            ]
        );
        assert_eq!(search.primary_provider(&query), "naver");
    }

    #[test]
    fn foreign_isbn_queries_international_provider_first() {
        let log = call_log();
        let search = orchestrator(
            FakeProvider::new("naver", &log),
            FakeProvider::new("google", &log)
                .answer("9780134685991", vec![raw("Effective Java", &[])]),
        );
        let query = classify("9780134685991");

        let found = search.resolve(&query);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source, "google");
        assert_eq!(calls(&log), vec!["google:9780134685991"]);
        assert_eq!(search.primary_provider(&query), "google");
    }

    #[test]
    fn qualified_variants_must_carry_the_isbn() {
        let log = call_log();
        let search = orchestrator(
            FakeProvider::new("naver", &log),
            FakeProvider::new("google", &log)
                .answer("978-0-13-468599-1", vec![raw("Unrelated", &["9781111111111"])])
                .answer(
                    "isbn:9780134685991",
                    vec![
                        raw("Wrong", &["9782222222222"]),
                        raw("Effective Java", &["0134685997", "9780134685991"]),
                    ],
                ),
        );

        let found = search.resolve(&classify("978-0-13-468599-1"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Effective Java");
        assert_eq!(found[0].isbn, "9780134685991");
        assert_eq!(
            calls(&log),
            vec![
                "google:978-0-13-468599-1",
                "google:9780134685991",
                "google:isbn:9780134685991",
            ]
        );
    }

    #[test]
    fn korean_title_prefers_domestic_and_falls_back() {
        let log = call_log();
        let search = orchestrator(
            FakeProvider::new("naver", &log),
            FakeProvider::new("google", &log).answer_all(vec![raw("클린 코드", &[])]),
        );

        let found = search.resolve(&classify("클린 코드"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source, "google");
        assert_eq!(found[0].similarity, Some(1.0));
        assert_eq!(calls(&log), vec!["naver:클린 코드", "google:클린 코드"]);
    }

    #[test]
    fn fallback_runs_when_ranking_removes_everything() {
        let log = call_log();
        let search = orchestrator(
            FakeProvider::new("naver", &log).answer_all(vec![raw("Clean Code", &[])]),
            FakeProvider::new("google", &log).answer_all(vec![raw("Dune Messiah", &[])]),
        );

        let found = search.resolve(&classify("Clean Code"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source, "naver");
        assert_eq!(calls(&log), vec!["google:Clean Code", "naver:Clean Code"]);
    }

    #[test]
    fn title_search_uses_cleaned_text_but_ranks_against_raw() {
        let log = call_log();
        let search = orchestrator(
            FakeProvider::new("naver", &log),
            FakeProvider::new("google", &log)
                .answer_all(vec![raw("Refactoring", &[]), raw("Dune", &[])]),
        );

        let found = search.resolve(&classify("Refactoring - Improving the Design of Existing Code"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Refactoring");
        assert_eq!(calls(&log), vec!["google:Refactoring"]);
    }

    #[test]
    fn bulk_titles_that_look_like_isbns_search_as_titles() {
        let log = call_log();
        let search = orchestrator(
            FakeProvider::new("naver", &log),
            FakeProvider::new("google", &log),
        );
        search.resolve(&classify_title("9788936434267"));
        assert_eq!(
            calls(&log),
            vec!["google:9788936434267", "naver:9788936434267"]
        );
    }

    #[test]
    fn transport_failures_surface_only_from_try_resolve() {
        let log = call_log();
        let search = orchestrator(
            FakeProvider::new("naver", &log).failing(),
            FakeProvider::new("google", &log).failing(),
        );
        let query = classify("Clean Code");

        assert!(matches!(
            search.try_resolve(&query),
            Err(ProviderError::Status { status: 503, .. })
        ));
        assert!(search.resolve(&query).is_empty());
    }

    #[test]
    fn one_healthy_provider_means_no_error() {
        let log = call_log();
        let search = orchestrator(
            FakeProvider::new("naver", &log),
            FakeProvider::new("google", &log).failing(),
        );
        assert!(search
            .try_resolve(&classify("Clean Code"))
            .expect("resolve")
            .is_empty());
    }

    #[test]
    fn retailer_link_is_attached_to_top_candidate() {
        let log = call_log();
        let search = orchestrator(
            FakeProvider::new("naver", &log)
                .answer_all(vec![raw("클린 코드", &["9788966260959"]), raw("클린 코드 2", &[])]),
            FakeProvider::new("google", &log),
        )
        .with_link_lookup(Arc::new(FakeLinks {
            link: Some("https://product.kyobobook.co.kr/detail/S0001".to_string()),
            failing: false,
        }));

        let found = search.resolve(&classify("클린 코드"));
        assert_eq!(
            found[0].retailer_link.as_deref(),
            Some("https://product.kyobobook.co.kr/detail/S0001")
        );
        assert!(found[1].retailer_link.is_none());
    }

    #[test]
    fn failed_link_lookup_keeps_the_result() {
        let log = call_log();
        let search = orchestrator(
            FakeProvider::new("naver", &log).answer_all(vec![raw("클린 코드", &[])]),
            FakeProvider::new("google", &log),
        )
        .with_link_lookup(Arc::new(FakeLinks {
            link: None,
            failing: true,
        }));

        let found = search.resolve(&classify("클린 코드"));
        assert_eq!(found.len(), 1);
        assert!(found[0].retailer_link.is_none());
    }

    #[test]
    fn unconfigured_link_lookup_is_quiet() {
        assert_eq!(
            link_failure_level(&ProviderError::Unconfigured("naver")),
            log::Level::Debug
        );
        assert_eq!(
            link_failure_level(&ProviderError::Status {
                provider: "naver",
                status: 500
            }),
            log::Level::Warn
        );

        let log = call_log();
        let search = orchestrator(
            FakeProvider::new("naver", &log).answer_all(vec![raw("클린 코드", &[])]),
            FakeProvider::new("google", &log),
        )
        .with_link_lookup(Arc::new(
            NaverBooks::new(&ProvidersConfig::default()).expect("client"),
        ));
        let found = search.resolve(&classify("클린 코드"));
        assert_eq!(found.len(), 1);
        assert!(found[0].retailer_link.is_none());
    }
}
