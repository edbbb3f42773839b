use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use regex::Regex;
use reqwest::blocking::Client;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::LazyLock;
use std::time::Duration;

use super::ProviderError;
use crate::config::ProvidersConfig;

const RATE_LIMIT_POLL: Duration = Duration::from_millis(25);

static HTML_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid html tag regex"));

/// Blocking JSON client shared by the provider implementations: fixed
/// timeout, user agent and a per-provider request rate limit.
pub struct JsonClient {
    provider: &'static str,
    client: Client,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    debug: bool,
}

impl JsonClient {
    pub fn new(provider: &'static str, config: &ProvidersConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        Ok(Self {
            provider,
            client,
            limiter: RateLimiter::direct(Quota::per_second(per_second)),
            debug: config.debug,
        })
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug
    }

    /// GETs `url` and decodes the body. Non-success statuses are errors.
    pub fn get_json(&self, url: &str, headers: &[(&str, &str)]) -> Result<Value, ProviderError> {
        self.wait_for_slot();
        if self.debug {
            log::info!("[metadata-debug] {} http start url={}", self.provider, url);
        }

        let mut request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json");
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().map_err(|err| {
            log::warn!("{} request failed: {}", self.provider, err);
            ProviderError::Transport(err)
        })?;

        let status = response.status();
        if !status.is_success() {
            log::warn!("{} request returned {}", self.provider, status);
            return Err(ProviderError::Status {
                provider: self.provider,
                status: status.as_u16(),
            });
        }

        let data = response
            .json::<Value>()
            .map_err(|err| ProviderError::Decode(err.to_string()))?;
        if self.debug {
            log::info!(
                "[metadata-debug] {} http success url={} status={}",
                self.provider,
                url,
                status
            );
        }
        Ok(data)
    }

    fn wait_for_slot(&self) {
        while self.limiter.check().is_err() {
            std::thread::sleep(RATE_LIMIT_POLL);
        }
    }
}

pub fn clean_html_tags(text: &str) -> String {
    HTML_TAG_RE.replace_all(text, "").trim().to_string()
}

/// Trimmed string at `key`, or `default` when missing or blank.
pub fn json_str_or(value: &Value, key: &str, default: &str) -> String {
    value
        .get(key)
        .and_then(|entry| entry.as_str())
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .unwrap_or(default)
        .to_string()
}

pub fn json_string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(|entry| entry.as_array())
        .map(|values| {
            values
                .iter()
                .filter_map(|entry| entry.as_str())
                .map(|entry| entry.trim().to_string())
                .filter(|entry| !entry.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{clean_html_tags, json_str_or, json_string_list};
    use serde_json::json;

    #[test]
    fn strips_markup_from_provider_text() {
        assert_eq!(clean_html_tags("<b>클린</b> 코드 "), "클린 코드");
        assert_eq!(clean_html_tags("plain"), "plain");
        assert_eq!(clean_html_tags(""), "");
    }

    #[test]
    fn json_helpers_default_missing_fields() {
        let data = json!({ "title": "  ", "authors": ["A", " ", "B"], "publisher": "Insight" });
        assert_eq!(json_str_or(&data, "title", "Unknown"), "Unknown");
        assert_eq!(json_str_or(&data, "publisher", "Unknown"), "Insight");
        assert_eq!(json_str_or(&data, "missing", ""), "");
        assert_eq!(json_string_list(&data, "authors"), vec!["A", "B"]);
        assert!(json_string_list(&data, "missing").is_empty());
    }
}
