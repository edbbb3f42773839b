use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogRepository;
use crate::config::IngestConfig;
use crate::duplicates::DuplicateDetector;
use crate::models::{BatchSummary, BookCandidate, BulkResult, IngestIssue, IngestSuccess, NewBook, UNKNOWN};
use crate::providers::ProviderError;
use crate::query::classify_title;
use crate::search::SearchOrchestrator;

/// Whether bulk ingestion looks titles up before storing them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentMode {
    /// Resolve each title against the providers, with retries.
    Enriched,
    /// Store titles as given with unknown metadata. No provider calls.
    #[default]
    Safe,
}

pub struct IngestionPipeline {
    catalog: Arc<dyn CatalogRepository>,
    duplicates: DuplicateDetector,
    search: Arc<SearchOrchestrator>,
    config: IngestConfig,
}

impl IngestionPipeline {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        search: Arc<SearchOrchestrator>,
        config: IngestConfig,
    ) -> Self {
        Self {
            duplicates: DuplicateDetector::new(catalog.clone()),
            catalog,
            search,
            config,
        }
    }

    /// Adds every non-blank title. Per-title failures are collected, never
    /// returned as an error.
    pub fn ingest<T: AsRef<str>>(&self, titles: &[T], mode: EnrichmentMode) -> BulkResult {
        let mut result = BulkResult::default();
        for title in titles {
            let title = title.as_ref().trim();
            if title.is_empty() {
                continue;
            }
            result.total += 1;
            self.ingest_one(title, mode, &mut result);

            if mode == EnrichmentMode::Enriched
                && self.config.pause_every > 0
                && result.total % self.config.pause_every == 0
            {
                thread::sleep(self.config.pause());
            }
        }
        log::info!(
            "ingested {} titles ({:?}): {} added, {} duplicates, {} errors",
            result.total,
            mode,
            result.success.len(),
            result.duplicates.len(),
            result.errors.len()
        );
        result
    }

    /// Runs [`ingest`](Self::ingest) over fixed-size chunks with a pause
    /// between them. `batch_size` falls back to the configured size.
    pub fn ingest_batched<T: AsRef<str>>(
        &self,
        titles: &[T],
        mode: EnrichmentMode,
        batch_size: Option<usize>,
    ) -> BulkResult {
        let batch_size = batch_size.unwrap_or(self.config.batch_size).max(1);
        let total_batches = titles.len().div_ceil(batch_size);
        let mut result = BulkResult::default();

        for (index, chunk) in titles.chunks(batch_size).enumerate() {
            let batch_num = index + 1;
            log::info!("batch {}/{}: {} titles", batch_num, total_batches, chunk.len());
            let batch = self.ingest(chunk, mode);
            result.batches.push(BatchSummary {
                batch_num,
                total_batches,
                success_count: batch.success.len(),
                duplicate_count: batch.duplicates.len(),
                error_count: batch.errors.len(),
            });
            result.absorb(batch);

            if batch_num < total_batches {
                thread::sleep(self.config.batch_pause());
            }
        }
        result
    }

    fn ingest_one(&self, title: &str, mode: EnrichmentMode, result: &mut BulkResult) {
        if self.is_duplicate(title) {
            result.duplicates.push(IngestIssue {
                title: title.to_string(),
                reason: "already in catalog".to_string(),
            });
            return;
        }

        let book = match mode {
            EnrichmentMode::Safe => NewBook::title_only(title),
            EnrichmentMode::Enriched => match self.resolve_with_retry(title) {
                Ok(Some(candidate)) => {
                    let mut book = NewBook::from_candidate(&candidate);
                    if book.title.trim().is_empty() || book.title == UNKNOWN {
                        book.title = title.to_string();
                    }
                    book
                }
                Ok(None) => {
                    result.errors.push(IngestIssue {
                        title: title.to_string(),
                        reason: "no search result".to_string(),
                    });
                    return;
                }
                Err(err) => {
                    result.errors.push(IngestIssue {
                        title: title.to_string(),
                        reason: format!("search failed: {}", err),
                    });
                    return;
                }
            },
        };

        match self.catalog.insert(&book) {
            Ok(id) => result.success.push(IngestSuccess {
                id,
                title: book.title,
                authors: book.details.authors,
            }),
            Err(err) => {
                log::warn!("could not store \"{}\": {}", title, err);
                result.errors.push(IngestIssue {
                    title: title.to_string(),
                    reason: err.to_string(),
                });
            }
        }
    }

    /// A failing duplicate check lets the title through.
    fn is_duplicate(&self, title: &str) -> bool {
        match self.duplicates.is_duplicate(title, None) {
            Ok(found) => found,
            Err(err) => {
                log::warn!("duplicate check for \"{}\" failed, continuing: {}", title, err);
                false
            }
        }
    }

    /// Empty answers and transport failures are both retried. The error of
    /// the last attempt, if any, is returned.
    fn resolve_with_retry(&self, title: &str) -> Result<Option<BookCandidate>, ProviderError> {
        let query = classify_title(title);
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.search.try_resolve(&query) {
                Ok(candidates) if !candidates.is_empty() => {
                    return Ok(candidates.into_iter().next());
                }
                Ok(_) => last_error = None,
                Err(err) => {
                    log::warn!(
                        "lookup for \"{}\" failed (attempt {}/{}): {}",
                        title,
                        attempt,
                        attempts,
                        err
                    );
                    last_error = Some(err);
                }
            }
            if attempt < attempts {
                thread::sleep(self.config.retry_delay());
            }
        }
        match last_error {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }
}
