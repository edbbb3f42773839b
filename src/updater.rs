//! Background enrichment of books still carrying the unknown sentinel.
//!
//! A run is tracked as an [`UpdateJob`] with one log entry per processed
//! book. Each run gets its own worker thread and cancellation flag, owned by
//! the [`BackgroundUpdater`] until the caller waits on it or the next start
//! finds it finished.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::CatalogRepository;
use crate::config::UpdaterConfig;
use crate::error::{Error, Result};
use crate::jobs::JobRepository;
use crate::models::{Book, BookDetails, JobStatus, UpdateJob, UpdateLogEntry};
use crate::query::classify_title;
use crate::search::SearchOrchestrator;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StartOutcome {
    /// No book needs enrichment; no job was created.
    NothingToUpdate,
    Started { job_id: String, total: usize },
}

impl StartOutcome {
    pub fn message(&self) -> String {
        match self {
            StartOutcome::NothingToUpdate => "nothing to update".to_string(),
            StartOutcome::Started { job_id, total } => {
                format!("started job {} for {} books", job_id, total)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusReport {
    #[serde(flatten)]
    pub job: UpdateJob,
    pub progress_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunNowReport {
    pub processed: usize,
    pub success: usize,
    pub errors: usize,
    /// Books still carrying the unknown sentinel afterwards.
    pub remaining: usize,
    /// The time budget ran out before `count` books were processed.
    pub timed_out: bool,
}

struct JobHandle {
    cancel: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

pub struct BackgroundUpdater {
    catalog: Arc<dyn CatalogRepository>,
    jobs: Arc<dyn JobRepository>,
    search: Arc<SearchOrchestrator>,
    config: UpdaterConfig,
    handles: Mutex<HashMap<String, JobHandle>>,
}

impl BackgroundUpdater {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        jobs: Arc<dyn JobRepository>,
        search: Arc<SearchOrchestrator>,
        config: UpdaterConfig,
    ) -> Self {
        Self {
            catalog,
            jobs,
            search,
            config,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a job over every unenriched book and starts it on a worker
    /// thread. Returns without waiting for the run.
    pub fn start_run(&self) -> Result<StartOutcome> {
        let books = self.catalog.list_unenriched()?;
        if books.is_empty() {
            log::info!("background update requested, nothing to update");
            return Ok(StartOutcome::NothingToUpdate);
        }

        let now = Utc::now();
        let job = UpdateJob {
            id: Uuid::new_v4().to_string(),
            status: JobStatus::Pending,
            total_books: books.len(),
            processed_books: 0,
            success_count: 0,
            error_count: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        self.jobs.create_job(&job)?;

        let cancel = Arc::new(AtomicBool::new(false));
        let worker = RunWorker {
            job_id: job.id.clone(),
            catalog: self.catalog.clone(),
            jobs: self.jobs.clone(),
            search: self.search.clone(),
            item_pause: self.config.item_pause(),
            cancel: cancel.clone(),
        };
        let spawned = thread::Builder::new()
            .name(format!("book-update-{}", &job.id[..8]))
            .spawn(move || worker.run(books));

        match spawned {
            Ok(thread) => {
                let mut handles = self.handles();
                handles.retain(|_, handle| !handle.thread.is_finished());
                handles.insert(job.id.clone(), JobHandle { cancel, thread });
                drop(handles);
                log::info!("started update job {} for {} books", job.id, job.total_books);
                Ok(StartOutcome::Started {
                    job_id: job.id,
                    total: job.total_books,
                })
            }
            Err(err) => {
                log::error!("could not start worker for job {}: {}", job.id, err);
                self.jobs
                    .transition(&job.id, JobStatus::Pending, JobStatus::Processing)?;
                self.jobs
                    .transition(&job.id, JobStatus::Processing, JobStatus::Failed)?;
                Err(Error::Io(err))
            }
        }
    }

    pub fn status(&self, job_id: &str) -> Result<JobStatusReport> {
        let job = self.find_job(job_id)?;
        Ok(JobStatusReport {
            progress_percent: job.progress_percent(),
            job,
        })
    }

    /// Newest entries first. `None` uses the configured default limit.
    pub fn logs(&self, job_id: &str, limit: Option<usize>) -> Result<Vec<UpdateLogEntry>> {
        let job = self.find_job(job_id)?;
        self.jobs
            .recent_logs(&job.id, limit.unwrap_or(self.config.log_limit))
    }

    /// Asks a running job to stop before its next book. Returns false when
    /// this updater does not own a live worker for `job_id`.
    pub fn cancel(&self, job_id: &str) -> bool {
        match self.handles().get(job_id) {
            Some(handle) if !handle.thread.is_finished() => {
                handle.cancel.store(true, Ordering::SeqCst);
                log::info!("cancellation requested for job {}", job_id);
                true
            }
            _ => false,
        }
    }

    /// Blocks until the worker for `job_id` has exited. A job without a
    /// live handle returns immediately.
    pub fn wait(&self, job_id: &str) {
        let handle = self.handles().remove(job_id);
        if let Some(handle) = handle {
            if handle.thread.join().is_err() {
                log::error!("worker for job {} exited abnormally", job_id);
            }
        }
    }

    /// Enriches up to `count` books on the calling thread, stopping early
    /// once `budget` has elapsed. No job record is written.
    pub fn run_now(&self, count: usize, budget: Duration) -> Result<RunNowReport> {
        let started = Instant::now();
        let books = self.catalog.list_unenriched()?;
        let selected = &books[..count.min(books.len())];
        let mut report = RunNowReport::default();

        for (index, book) in selected.iter().enumerate() {
            if started.elapsed() >= budget {
                report.timed_out = true;
                log::info!(
                    "run-now budget of {:?} exhausted after {} books",
                    budget,
                    report.processed
                );
                break;
            }
            let outcome = enrich_book(self.catalog.as_ref(), &self.search, book);
            report.processed += 1;
            if outcome.success {
                report.success += 1;
            } else {
                report.errors += 1;
            }
            log::debug!("book {}: {}", book.id, outcome.message);
            if index + 1 < selected.len() {
                thread::sleep(self.config.item_pause());
            }
        }

        report.remaining = self.catalog.list_unenriched()?.len();
        Ok(report)
    }

    fn find_job(&self, job_id: &str) -> Result<UpdateJob> {
        let job_id = job_id.trim();
        if Uuid::parse_str(job_id).is_err() {
            return Err(Error::Validation(format!("malformed job id: {:?}", job_id)));
        }
        self.jobs
            .get_job(job_id)?
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<String, JobHandle>> {
        self.handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct RunWorker {
    job_id: String,
    catalog: Arc<dyn CatalogRepository>,
    jobs: Arc<dyn JobRepository>,
    search: Arc<SearchOrchestrator>,
    item_pause: Duration,
    cancel: Arc<AtomicBool>,
}

impl RunWorker {
    fn run(self, books: Vec<Book>) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.process(&books)));
        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err.to_string(),
            Err(_) => "worker panicked".to_string(),
        };
        log::error!("update job {} failed: {}", self.job_id, failure);
        if let Err(err) = self
            .jobs
            .transition(&self.job_id, JobStatus::Processing, JobStatus::Failed)
        {
            log::error!("could not mark job {} failed: {}", self.job_id, err);
        }
    }

    fn process(&self, books: &[Book]) -> Result<()> {
        self.jobs
            .transition(&self.job_id, JobStatus::Pending, JobStatus::Processing)?;

        let total = books.len();
        let (mut processed, mut success, mut errors) = (0, 0, 0);
        for book in books {
            if self.cancel.load(Ordering::SeqCst) {
                log::info!(
                    "update job {} cancelled at book {}/{}",
                    self.job_id,
                    processed + 1,
                    total
                );
                break;
            }

            let outcome = enrich_book(self.catalog.as_ref(), &self.search, book);
            processed += 1;
            if outcome.success {
                success += 1;
            } else {
                errors += 1;
            }
            self.jobs
                .append_log(&self.job_id, book.id, outcome.success, &outcome.message)?;
            self.jobs
                .record_progress(&self.job_id, processed, success, errors)?;

            if processed < total {
                thread::sleep(self.item_pause);
            }
        }

        self.jobs
            .transition(&self.job_id, JobStatus::Processing, JobStatus::Completed)?;
        log::info!(
            "update job {} completed: {} updated, {} failed, {}/{} processed",
            self.job_id,
            success,
            errors,
            processed,
            total
        );
        Ok(())
    }
}

struct ItemOutcome {
    success: bool,
    message: String,
}

impl ItemOutcome {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Looks `book` up by its stored title and overwrites its metadata with the
/// top candidate. Every failure is reported in the outcome, never returned.
fn enrich_book(
    catalog: &dyn CatalogRepository,
    search: &SearchOrchestrator,
    book: &Book,
) -> ItemOutcome {
    let query = classify_title(&book.title);
    let candidates = match search.try_resolve(&query) {
        Ok(candidates) => candidates,
        Err(err) => return ItemOutcome::failed(format!("search failed: {}", err)),
    };
    let Some(top) = candidates.first() else {
        return ItemOutcome::failed("no search result");
    };
    match catalog.update_details(book.id, &BookDetails::from(top)) {
        Ok(true) => ItemOutcome {
            success: true,
            message: format!("updated from {}: {}", top.source, top.authors_display()),
        },
        Ok(false) => ItemOutcome::failed("book no longer exists"),
        Err(err) => ItemOutcome::failed(format!("store error: {}", err)),
    }
}
