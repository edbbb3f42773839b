//! Book purchase tracking with catalog metadata enrichment.
//!
//! [`BookTracker`] is the entry point: it resolves queries against the
//! configured providers, adds books one at a time or in bulk, and runs
//! background enrichment jobs over books stored without metadata.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod catalog;
pub mod config;
pub mod db;
pub mod duplicates;
pub mod error;
pub mod ingest;
pub mod jobs;
pub mod models;
pub mod providers;
pub mod query;
pub mod ranking;
pub mod search;
pub mod updater;

#[cfg(test)]
mod test_support;

pub use catalog::CatalogRepository;
pub use config::Config;
pub use db::Database;
pub use duplicates::DuplicateDetector;
pub use error::{Error, Result};
pub use ingest::{EnrichmentMode, IngestionPipeline};
pub use jobs::JobRepository;
pub use models::{
    BatchSummary, Book, BookCandidate, BookDetails, BulkResult, JobStatus, NewBook, UpdateJob,
    UpdateLogEntry, UNKNOWN,
};
pub use query::{classify, classify_title, BookQuery, QueryKind, Script};
pub use ranking::filter_candidates;
pub use search::SearchOrchestrator;
pub use updater::{BackgroundUpdater, JobStatusReport, RunNowReport, StartOutcome};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOptions {
    /// Store the book even when it looks like one already in the catalog.
    pub allow_duplicate: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: BookQuery,
    pub primary_provider: &'static str,
    pub candidates: Vec<BookCandidate>,
    /// The query, or its top candidate's ISBN, is already in the catalog.
    pub is_duplicate: bool,
}

pub struct BookTracker {
    db: Database,
    search: Arc<SearchOrchestrator>,
    duplicates: DuplicateDetector,
    pipeline: IngestionPipeline,
    updater: BackgroundUpdater,
    config: Config,
}

impl BookTracker {
    /// Opens the configured database and builds the real provider clients.
    pub fn open(config: Config) -> Result<Self> {
        let db = Database::open(&config.database.path)?;
        let search = SearchOrchestrator::from_config(&config.providers)?;
        Ok(Self::with_parts(db, search, config))
    }

    pub fn with_parts(db: Database, search: SearchOrchestrator, config: Config) -> Self {
        let catalog: Arc<dyn CatalogRepository> = Arc::new(db.clone());
        let jobs: Arc<dyn JobRepository> = Arc::new(db.clone());
        let search = Arc::new(search);
        Self {
            duplicates: DuplicateDetector::new(catalog.clone()),
            pipeline: IngestionPipeline::new(catalog.clone(), search.clone(), config.ingest.clone()),
            updater: BackgroundUpdater::new(catalog, jobs, search.clone(), config.updater.clone()),
            search,
            db,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn classify(&self, raw: &str) -> BookQuery {
        classify(raw)
    }

    pub fn resolve(&self, query: &BookQuery) -> Vec<BookCandidate> {
        self.search.resolve(query)
    }

    /// Classifies and resolves `raw`, flagging whether the book is already
    /// in the catalog.
    pub fn search(&self, raw: &str) -> Result<SearchResponse> {
        if raw.trim().is_empty() {
            return Err(Error::Validation("search query must not be empty".to_string()));
        }
        let query = classify(raw);
        let candidates = self.search.resolve(&query);

        let (title, isbn) = match (query.is_isbn(), candidates.first()) {
            (true, top) => (
                top.map(|top| top.title.clone()).unwrap_or_default(),
                Some(query.search_text().to_string()),
            ),
            (false, top) => (
                query.raw().to_string(),
                top.map(|top| top.isbn.clone()).filter(|isbn| !isbn.is_empty()),
            ),
        };
        let is_duplicate = match self.duplicates.is_duplicate(&title, isbn.as_deref()) {
            Ok(found) => found,
            Err(err) => {
                log::warn!("duplicate check for \"{}\" failed: {}", raw, err);
                false
            }
        };

        Ok(SearchResponse {
            primary_provider: self.search.primary_provider(&query),
            query,
            candidates,
            is_duplicate,
        })
    }

    pub fn is_duplicate(&self, title: &str, isbn: Option<&str>) -> Result<bool> {
        self.duplicates.is_duplicate(title, isbn)
    }

    /// Stores one book. A duplicate is rejected with [`Error::Duplicate`]
    /// unless `options.allow_duplicate` is set.
    pub fn add_book(&self, mut book: NewBook, options: AddOptions) -> Result<Book> {
        book.title = book.title.trim().to_string();
        if book.title.is_empty() {
            return Err(Error::Validation("title must not be empty".to_string()));
        }
        if !options.allow_duplicate {
            let isbn = Some(book.details.isbn.as_str()).filter(|isbn| !isbn.trim().is_empty());
            if self.duplicates.is_duplicate(&book.title, isbn)? {
                return Err(Error::Duplicate { title: book.title });
            }
        }
        let id = self.db.insert(&book)?;
        log::info!("added book {} \"{}\"", id, book.title);
        self.db
            .get(id)?
            .ok_or_else(|| Error::NotFound(format!("book {}", id)))
    }

    /// Title-only add; the book is picked up by the next background run.
    pub fn add_title(&self, title: &str, price: Option<f64>, notes: &str) -> Result<Book> {
        self.add_book(
            NewBook::title_only(title).with_price(price).with_notes(notes),
            AddOptions::default(),
        )
    }

    /// Newest purchase first.
    pub fn list_books(&self) -> Result<Vec<Book>> {
        self.db.list_all()
    }

    /// Returns the deleted book's title.
    pub fn delete_book(&self, id: i64) -> Result<String> {
        let title = self
            .db
            .delete(id)?
            .ok_or_else(|| Error::NotFound(format!("book {}", id)))?;
        log::info!("deleted book {} \"{}\"", id, title);
        Ok(title)
    }

    pub fn update_details(&self, id: i64, details: &BookDetails) -> Result<Book> {
        if !self.db.update_details(id, details)? {
            return Err(Error::NotFound(format!("book {}", id)));
        }
        self.db
            .get(id)?
            .ok_or_else(|| Error::NotFound(format!("book {}", id)))
    }

    /// Bulk add in one pass. Lists longer than the configured request limit
    /// are rejected; use [`ingest_batched`](Self::ingest_batched) for those.
    pub fn ingest<T: AsRef<str>>(&self, titles: &[T], mode: EnrichmentMode) -> Result<BulkResult> {
        let limit = self.config.ingest.max_titles_per_request;
        if limit > 0 && titles.len() > limit {
            return Err(Error::Validation(format!(
                "{} titles exceeds the limit of {} per request",
                titles.len(),
                limit
            )));
        }
        Ok(self.pipeline.ingest(titles, mode))
    }

    pub fn ingest_batched<T: AsRef<str>>(
        &self,
        titles: &[T],
        mode: EnrichmentMode,
        batch_size: Option<usize>,
    ) -> BulkResult {
        self.pipeline.ingest_batched(titles, mode, batch_size)
    }

    pub fn start_run(&self) -> Result<StartOutcome> {
        self.updater.start_run()
    }

    pub fn status(&self, job_id: &str) -> Result<JobStatusReport> {
        self.updater.status(job_id)
    }

    pub fn logs(&self, job_id: &str, limit: Option<usize>) -> Result<Vec<UpdateLogEntry>> {
        self.updater.logs(job_id, limit)
    }

    pub fn run_now(&self, count: usize, budget: Duration) -> Result<RunNowReport> {
        self.updater.run_now(count, budget)
    }

    pub fn cancel_run(&self, job_id: &str) -> bool {
        self.updater.cancel(job_id)
    }

    pub fn wait_for_run(&self, job_id: &str) {
        self.updater.wait(job_id)
    }
}
