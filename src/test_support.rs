//! Shared test doubles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use crate::catalog::CatalogRepository;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{Book, BookDetails, NewBook};
use crate::providers::{LookupOutcome, MetadataProvider, ProviderError, RawResult, RetailerLinkLookup};

pub fn temp_database() -> (TempDir, Database) {
    let dir = tempfile::tempdir().expect("temp dir");
    let db = Database::open(dir.path().join("books.db")).expect("open database");
    (dir, db)
}

/// Chronological record of provider calls as `"<provider>:<query>"`.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(vec![]))
}

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().expect("call log").clone()
}

pub fn raw(title: &str, identifiers: &[&str]) -> RawResult {
    RawResult {
        title: title.to_string(),
        authors: vec!["Test Author".to_string()],
        publisher: "Test Press".to_string(),
        published_date: "2020".to_string(),
        identifiers: identifiers.iter().map(|value| value.to_string()).collect(),
        ..RawResult::default()
    }
}

/// Provider answering from a script. Unscripted queries get `default`.
pub struct FakeProvider {
    name: &'static str,
    scripted: HashMap<String, Vec<RawResult>>,
    default: Vec<RawResult>,
    failing: bool,
    log: CallLog,
}

impl FakeProvider {
    pub fn new(name: &'static str, log: &CallLog) -> Self {
        Self {
            name,
            scripted: HashMap::new(),
            default: vec![],
            failing: false,
            log: log.clone(),
        }
    }

    pub fn answer(mut self, query: &str, results: Vec<RawResult>) -> Self {
        self.scripted.insert(query.to_string(), results);
        self
    }

    pub fn answer_all(mut self, results: Vec<RawResult>) -> Self {
        self.default = results;
        self
    }

    /// Every call fails with a 503.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }
}

impl MetadataProvider for FakeProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn search(&self, query: &str) -> Result<Vec<RawResult>, ProviderError> {
        self.log
            .lock()
            .expect("call log")
            .push(format!("{}:{}", self.name, query));
        if self.failing {
            return Err(ProviderError::Status {
                provider: self.name,
                status: 503,
            });
        }
        Ok(self
            .scripted
            .get(query)
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }
}

pub struct FakeLinks {
    pub link: Option<String>,
    pub failing: bool,
}

impl RetailerLinkLookup for FakeLinks {
    fn find_link(&self, _title: &str, _isbn: Option<&str>) -> LookupOutcome {
        if self.failing {
            return LookupOutcome::LookupFailed(ProviderError::Status {
                provider: "fake",
                status: 500,
            });
        }
        match &self.link {
            Some(link) => LookupOutcome::Found(link.clone()),
            None => LookupOutcome::NotFound,
        }
    }
}

/// Catalog over a real database with selected operations forced to fail.
pub struct FlakyCatalog {
    pub inner: Database,
    pub fail_title_scan: bool,
    /// `insert` fails for this exact title.
    pub fail_insert_for: Option<String>,
    /// `update_details` fails for this book id.
    pub fail_update_for: Option<i64>,
}

impl FlakyCatalog {
    pub fn new(inner: &Database) -> Self {
        Self {
            inner: inner.clone(),
            fail_title_scan: false,
            fail_insert_for: None,
            fail_update_for: None,
        }
    }
}

fn store_failure(what: &str) -> Error {
    Error::Store(rusqlite::Error::InvalidParameterName(what.to_string()))
}

impl CatalogRepository for FlakyCatalog {
    fn insert(&self, book: &NewBook) -> Result<i64> {
        if self.fail_insert_for.as_deref() == Some(book.title.as_str()) {
            return Err(store_failure("insert"));
        }
        self.inner.insert(book)
    }

    fn get(&self, id: i64) -> Result<Option<Book>> {
        self.inner.get(id)
    }

    fn list_all(&self) -> Result<Vec<Book>> {
        self.inner.list_all()
    }

    fn list_titles(&self) -> Result<Vec<String>> {
        if self.fail_title_scan {
            return Err(store_failure("titles"));
        }
        self.inner.list_titles()
    }

    fn list_isbns(&self) -> Result<Vec<String>> {
        self.inner.list_isbns()
    }

    fn list_unenriched(&self) -> Result<Vec<Book>> {
        self.inner.list_unenriched()
    }

    fn update_details(&self, id: i64, details: &BookDetails) -> Result<bool> {
        if self.fail_update_for == Some(id) {
            return Err(store_failure("update"));
        }
        self.inner.update_details(id, details)
    }

    fn delete(&self, id: i64) -> Result<Option<String>> {
        self.inner.delete(id)
    }
}
