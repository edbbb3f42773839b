//! Runtime configuration.
//!
//! Loaded from an optional TOML file, then overlaid with environment
//! variables for provider credentials and the database path. The resulting
//! [`Config`] is passed explicitly to everything that needs it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const DEFAULT_USER_AGENT: &str = "BookTrack/0.1 (+https://github.com/booktrack/booktrack)";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub providers: ProvidersConfig,
    pub ingest: IngestConfig,
    pub updater: UpdaterConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("books.db"),
        }
    }
}

/// Provider credentials and HTTP behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Upper bound on requests per second, per provider.
    pub requests_per_second: u32,
    pub user_agent: String,
    /// Emit `[metadata-debug]` lines for every provider call.
    pub debug: bool,
    pub naver: NaverConfig,
    pub google: GoogleConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 3,
            requests_per_second: 5,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            debug: false,
            naver: NaverConfig::default(),
            google: GoogleConfig::default(),
        }
    }
}

impl ProvidersConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NaverConfig {
    pub client_id: String,
    pub client_secret: String,
}

impl NaverConfig {
    pub fn is_configured(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Resolution attempts per title in enriched mode.
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    /// Insert a pause after every `pause_every` titles in enriched mode.
    pub pause_every: usize,
    pub pause_ms: u64,
    pub batch_size: usize,
    pub batch_pause_ms: u64,
    /// Largest list accepted by a single non-batched bulk call. Zero disables the guard.
    pub max_titles_per_request: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 500,
            pause_every: 5,
            pause_ms: 100,
            batch_size: 50,
            batch_pause_ms: 2000,
            max_titles_per_request: 500,
        }
    }
}

impl IngestConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    pub item_pause_ms: u64,
    /// Default number of log entries returned when the caller gives no limit.
    pub log_limit: usize,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            item_pause_ms: 500,
            log_limit: 20,
        }
    }
}

impl UpdaterConfig {
    pub fn item_pause(&self) -> Duration {
        Duration::from_millis(self.item_pause_ms)
    }
}

impl Config {
    /// Reads `path` when given (a missing file is an error), otherwise starts
    /// from defaults. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|err| Error::Config(err.to_string()))
    }

    /// Overlays values from `lookup`; blank values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = non_blank("NAVER_CLIENT_ID") {
            self.providers.naver.client_id = value;
        }
        if let Some(value) = non_blank("NAVER_CLIENT_SECRET") {
            self.providers.naver.client_secret = value;
        }
        if let Some(value) = non_blank("GOOGLE_BOOKS_API_KEY") {
            self.providers.google.api_key = Some(value);
        }
        if let Some(value) = non_blank("BOOKTRACK_DB") {
            self.database.path = PathBuf::from(value);
        }
    }
}
