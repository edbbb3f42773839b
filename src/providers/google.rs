use serde_json::Value;

use super::http::{json_str_or, json_string_list, JsonClient};
use super::{MetadataProvider, ProviderError, RawResult};
use crate::config::ProvidersConfig;
use crate::models::UNKNOWN;

const VOLUMES_URL: &str = "https://www.googleapis.com/books/v1/volumes";
const MAX_RESULTS: usize = 5;

/// International catalog search over the Google Books volumes API.
/// Works without a key; a configured key is appended to every request.
pub struct GoogleBooks {
    http: JsonClient,
    api_key: Option<String>,
}

impl GoogleBooks {
    pub fn new(config: &ProvidersConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            http: JsonClient::new("google", config)?,
            api_key: config
                .google
                .api_key
                .as_ref()
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
        })
    }

    fn volumes_url(&self, query: &str) -> String {
        let mut url = format!(
            "{}?q={}&maxResults={}",
            VOLUMES_URL,
            urlencoding::encode(query),
            MAX_RESULTS
        );
        if let Some(key) = &self.api_key {
            url.push_str("&key=");
            url.push_str(&urlencoding::encode(key));
        }
        url
    }
}

impl MetadataProvider for GoogleBooks {
    fn name(&self) -> &'static str {
        "google"
    }

    fn search(&self, query: &str) -> Result<Vec<RawResult>, ProviderError> {
        let data = self.http.get_json(&self.volumes_url(query), &[])?;
        let results = parse_volumes(&data);
        if self.http.debug_enabled() {
            log::info!(
                "[metadata-debug] google search query=\"{}\" hits={}",
                query,
                results.len()
            );
        }
        Ok(results)
    }
}

fn parse_volumes(data: &Value) -> Vec<RawResult> {
    let Some(items) = data.get("items").and_then(|value| value.as_array()) else {
        return vec![];
    };
    items
        .iter()
        .take(MAX_RESULTS)
        .filter_map(|item| item.get("volumeInfo"))
        .map(|info| RawResult {
            title: json_str_or(info, "title", UNKNOWN),
            authors: json_string_list(info, "authors"),
            publisher: json_str_or(info, "publisher", UNKNOWN),
            published_date: json_str_or(info, "publishedDate", UNKNOWN),
            description: json_str_or(info, "description", ""),
            thumbnail_url: info
                .get("imageLinks")
                .map(|links| json_str_or(links, "thumbnail", ""))
                .map(|url| secure_thumbnail(&url))
                .unwrap_or_default(),
            identifiers: isbn_identifiers(info),
            retailer_link: None,
        })
        .collect()
}

/// ISBN-13 entries first, then ISBN-10. Other identifier types are dropped.
fn isbn_identifiers(info: &Value) -> Vec<String> {
    let Some(entries) = info
        .get("industryIdentifiers")
        .and_then(|value| value.as_array())
    else {
        return vec![];
    };
    let mut identifiers = vec![];
    for kind in ["ISBN_13", "ISBN_10"] {
        for entry in entries {
            if entry.get("type").and_then(|value| value.as_str()) == Some(kind) {
                let identifier = json_str_or(entry, "identifier", "");
                if !identifier.is_empty() {
                    identifiers.push(identifier);
                }
            }
        }
    }
    identifiers
}

fn secure_thumbnail(url: &str) -> String {
    match url.strip_prefix("http://") {
        Some(rest) => format!("https://{}", rest),
        None => url.to_string(),
    }
}
