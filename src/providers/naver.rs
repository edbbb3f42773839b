use serde_json::Value;

use super::http::{clean_html_tags, json_str_or, JsonClient};
use super::{LookupOutcome, MetadataProvider, ProviderError, RawResult, RetailerLinkLookup};
use crate::config::{NaverConfig, ProvidersConfig};
use crate::models::UNKNOWN;

const BOOK_SEARCH_URL: &str = "https://openapi.naver.com/v1/search/book.json";
const SHOP_SEARCH_URL: &str = "https://openapi.naver.com/v1/search/shop.json";
const MAX_BOOK_RESULTS: usize = 5;
const MAX_SHOP_RESULTS: usize = 10;
const RETAILER_MALL_NAME: &str = "교보문고";
const RETAILER_HOST_MARKER: &str = "kyobobook";

/// Domestic catalog search (Naver Books) plus the Kyobo link lookup that
/// runs over Naver Shopping. Both need API credentials.
pub struct NaverBooks {
    http: JsonClient,
    credentials: NaverConfig,
}

impl NaverBooks {
    pub fn new(config: &ProvidersConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            http: JsonClient::new("naver", config)?,
            credentials: config.naver.clone(),
        })
    }

    fn get(&self, url: &str) -> Result<Value, ProviderError> {
        if !self.credentials.is_configured() {
            return Err(ProviderError::Unconfigured("naver"));
        }
        self.http.get_json(
            url,
            &[
                ("X-Naver-Client-Id", self.credentials.client_id.as_str()),
                (
                    "X-Naver-Client-Secret",
                    self.credentials.client_secret.as_str(),
                ),
            ],
        )
    }
}

impl MetadataProvider for NaverBooks {
    fn name(&self) -> &'static str {
        "naver"
    }

    fn search(&self, query: &str) -> Result<Vec<RawResult>, ProviderError> {
        let url = format!(
            "{}?query={}&display={}&start=1&sort=sim",
            BOOK_SEARCH_URL,
            urlencoding::encode(query),
            MAX_BOOK_RESULTS
        );
        let data = self.get(&url)?;
        let results = parse_book_items(&data);
        if self.http.debug_enabled() {
            log::info!(
                "[metadata-debug] naver search query=\"{}\" hits={}",
                query,
                results.len()
            );
        }
        Ok(results)
    }
}

impl RetailerLinkLookup for NaverBooks {
    fn find_link(&self, title: &str, isbn: Option<&str>) -> LookupOutcome {
        let key = isbn
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(title);
        let url = format!(
            "{}?query={}&display={}&start=1&sort=sim",
            SHOP_SEARCH_URL,
            urlencoding::encode(&format!("{} 책", key)),
            MAX_SHOP_RESULTS
        );
        match self.get(&url) {
            Ok(data) => match find_retailer_link(&data) {
                Some(link) => LookupOutcome::Found(link),
                None => LookupOutcome::NotFound,
            },
            Err(err) => LookupOutcome::LookupFailed(err),
        }
    }
}

fn parse_book_items(data: &Value) -> Vec<RawResult> {
    let items = data
        .get("items")
        .and_then(|value| value.as_array())
        .cloned()
        .unwrap_or_default();
    items
        .iter()
        .take(MAX_BOOK_RESULTS)
        .map(|item| {
            let authors = clean_html_tags(&json_str_or(item, "author", ""))
                .split('^')
                .map(|author| author.trim().to_string())
                .filter(|author| !author.is_empty())
                .collect();
            let identifiers = json_str_or(item, "isbn", "")
                .split_whitespace()
                .map(|value| value.to_string())
                .collect();
            let link = json_str_or(item, "link", "");
            RawResult {
                title: non_blank_or_unknown(clean_html_tags(&json_str_or(
                    item, "title", UNKNOWN,
                ))),
                authors,
                publisher: non_blank_or_unknown(clean_html_tags(&json_str_or(
                    item, "publisher", UNKNOWN,
                ))),
                published_date: json_str_or(item, "pubdate", UNKNOWN),
                description: clean_html_tags(&json_str_or(item, "description", "")),
                thumbnail_url: json_str_or(item, "image", ""),
                identifiers,
                retailer_link: is_retailer_link(&link).then_some(link),
            }
        })
        .collect()
}

fn find_retailer_link(data: &Value) -> Option<String> {
    let items = data.get("items").and_then(|value| value.as_array())?;
    for item in items {
        let link = json_str_or(item, "link", "");
        let mall_name = json_str_or(item, "mallName", "").to_lowercase();
        let retailer_mall =
            mall_name.contains(RETAILER_MALL_NAME) || mall_name.contains(RETAILER_HOST_MARKER);
        if (retailer_mall && !link.is_empty()) || is_retailer_link(&link) {
            return Some(link);
        }
    }
    None
}

fn is_retailer_link(link: &str) -> bool {
    link.to_lowercase().contains(RETAILER_HOST_MARKER)
}

fn non_blank_or_unknown(value: String) -> String {
    if value.is_empty() {
        UNKNOWN.to_string()
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::{find_retailer_link, parse_book_items, NaverBooks};
    use crate::config::ProvidersConfig;
    use crate::providers::{LookupOutcome, MetadataProvider, ProviderError, RetailerLinkLookup};
    use serde_json::json;

    #[test]
    fn parses_book_items_and_cleans_markup() {
        let data = json!({
            "items": [{
                "title": "<b>클린</b> 코드",
                "author": "로버트 C. 마틴^박재호",
                "publisher": "인사이트",
                "pubdate": "20131224",
                "isbn": "8966260950 9788966260959",
                "description": "애자일 <i>소프트웨어</i> 장인 정신",
                "image": "https://shopping-phinf.pstatic.net/cover.jpg",
                "link": "https://search.shopping.naver.com/book/catalog/1"
            }, {
                "author": ""
            }]
        });

        let results = parse_book_items(&data);
        assert_eq!(results.len(), 2);

        let first = &results[0];
        assert_eq!(first.title, "클린 코드");
        assert_eq!(first.authors, vec!["로버트 C. 마틴", "박재호"]);
        assert_eq!(first.publisher, "인사이트");
        assert_eq!(first.published_date, "20131224");
        assert_eq!(first.description, "애자일 소프트웨어 장인 정신");
        assert_eq!(first.identifiers, vec!["8966260950", "9788966260959"]);
        assert!(first.retailer_link.is_none());

        let second = &results[1];
        assert_eq!(second.title, "Unknown");
        assert!(second.authors.is_empty());
        assert_eq!(second.publisher, "Unknown");
        assert!(second.identifiers.is_empty());
    }

    #[test]
    fn finds_kyobo_by_mall_name_or_link() {
        let by_mall = json!({ "items": [
            { "mallName": "알라딘", "link": "https://aladin.co.kr/1" },
            { "mallName": "교보문고", "link": "https://link.example/kb" }
        ]});
        assert_eq!(
            find_retailer_link(&by_mall).as_deref(),
            Some("https://link.example/kb")
        );

        let by_link = json!({ "items": [
            { "mallName": "네이버", "link": "https://product.kyobobook.co.kr/detail/S0001" }
        ]});
        assert_eq!(
            find_retailer_link(&by_link).as_deref(),
            Some("https://product.kyobobook.co.kr/detail/S0001")
        );

        let none = json!({ "items": [{ "mallName": "yes24", "link": "https://yes24.com/1" }] });
        assert!(find_retailer_link(&none).is_none());
        assert!(find_retailer_link(&json!({})).is_none());
    }

    #[test]
    fn missing_credentials_fail_without_network() {
        let provider = NaverBooks::new(&ProvidersConfig::default()).expect("client");
        assert!(matches!(
            provider.search("클린 코드"),
            Err(ProviderError::Unconfigured("naver"))
        ));
        assert!(matches!(
            provider.find_link("클린 코드", None),
            LookupOutcome::LookupFailed(ProviderError::Unconfigured(_))
        ));
    }
}
