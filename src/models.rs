use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder written into metadata fields of books added without enrichment.
/// `authors == UNKNOWN` marks a book for the background update scan.
pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub authors: String,
    pub publisher: String,
    pub published_date: String,
    pub isbn: String,
    pub description: String,
    pub thumbnail_url: String,
    pub retailer_link: String,
    pub purchase_date: DateTime<Utc>,
    pub price: Option<f64>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl Book {
    pub fn needs_enrichment(&self) -> bool {
        self.authors == UNKNOWN
    }
}

/// A book about to be inserted; the store assigns `id` and `created_at`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NewBook {
    pub title: String,
    pub details: BookDetails,
    pub purchase_date: Option<DateTime<Utc>>,
    pub price: Option<f64>,
    pub notes: String,
}

impl NewBook {
    /// Title-only entry with every metadata field set to the unknown sentinel.
    pub fn title_only(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            details: BookDetails::unknown(),
            purchase_date: None,
            price: None,
            notes: String::new(),
        }
    }

    pub fn from_candidate(candidate: &BookCandidate) -> Self {
        Self {
            title: candidate.title.clone(),
            details: BookDetails::from(candidate),
            purchase_date: None,
            price: None,
            notes: String::new(),
        }
    }

    pub fn with_price(mut self, price: Option<f64>) -> Self {
        self.price = price;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

/// The metadata fields a detail update may overwrite. Title, price, notes and
/// purchase date are never part of an update.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BookDetails {
    pub authors: String,
    pub publisher: String,
    pub published_date: String,
    pub isbn: String,
    pub description: String,
    pub thumbnail_url: String,
    pub retailer_link: String,
}

impl BookDetails {
    pub fn unknown() -> Self {
        Self {
            authors: UNKNOWN.to_string(),
            publisher: UNKNOWN.to_string(),
            published_date: UNKNOWN.to_string(),
            isbn: String::new(),
            description: String::new(),
            thumbnail_url: String::new(),
            retailer_link: String::new(),
        }
    }
}

impl From<&BookCandidate> for BookDetails {
    fn from(candidate: &BookCandidate) -> Self {
        Self {
            authors: candidate.authors_display(),
            publisher: candidate.publisher.clone(),
            published_date: candidate.published_date.clone(),
            isbn: candidate.isbn.clone(),
            description: candidate.description.clone(),
            thumbnail_url: candidate.thumbnail_url.clone(),
            retailer_link: candidate.retailer_link.clone().unwrap_or_default(),
        }
    }
}

/// One provider result. Transient: produced per lookup, never stored as-is.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BookCandidate {
    pub title: String,
    pub authors: Vec<String>,
    pub publisher: String,
    pub published_date: String,
    /// Preferred ISBN, possibly empty.
    pub isbn: String,
    /// Every identifier the provider returned.
    pub identifiers: Vec<String>,
    pub description: String,
    pub thumbnail_url: String,
    pub retailer_link: Option<String>,
    pub source: String,
    /// Title similarity assigned by the ranker.
    pub similarity: Option<f64>,
}

impl BookCandidate {
    pub fn authors_display(&self) -> String {
        let joined = self
            .authors
            .iter()
            .map(|author| author.trim())
            .filter(|author| !author.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
        if joined.is_empty() {
            UNKNOWN.to_string()
        } else {
            joined
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// pending -> processing -> {completed, failed}; nothing else.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UpdateJob {
    pub id: String,
    pub status: JobStatus,
    pub total_books: usize,
    pub processed_books: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl UpdateJob {
    pub fn progress_percent(&self) -> f64 {
        if self.total_books == 0 {
            return 0.0;
        }
        let ratio = self.processed_books as f64 / self.total_books as f64;
        (ratio * 1000.0).round() / 10.0
    }
}

/// Append-only audit record, one per processed book.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UpdateLogEntry {
    pub id: i64,
    pub job_id: String,
    pub book_id: i64,
    pub success: bool,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct IngestSuccess {
    pub id: i64,
    pub title: String,
    pub authors: String,
}

/// A duplicate or error outcome for one title.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct IngestIssue {
    pub title: String,
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub batch_num: usize,
    pub total_batches: usize,
    pub success_count: usize,
    pub duplicate_count: usize,
    pub error_count: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct BulkResult {
    pub success: Vec<IngestSuccess>,
    pub duplicates: Vec<IngestIssue>,
    pub errors: Vec<IngestIssue>,
    /// Non-blank titles considered.
    pub total: usize,
    /// Filled only by the batched variant.
    pub batches: Vec<BatchSummary>,
}

impl BulkResult {
    pub fn absorb(&mut self, other: BulkResult) {
        self.success.extend(other.success);
        self.duplicates.extend(other.duplicates);
        self.errors.extend(other.errors);
        self.total += other.total;
    }
}

#[cfg(test)]
mod tests {
    use super::{BookCandidate, JobStatus, UpdateJob, UNKNOWN};
    use chrono::Utc;

    fn candidate(authors: &[&str]) -> BookCandidate {
        BookCandidate {
            title: "Clean Code".to_string(),
            authors: authors.iter().map(|value| value.to_string()).collect(),
            publisher: "Prentice Hall".to_string(),
            published_date: "2008".to_string(),
            isbn: String::new(),
            identifiers: vec![],
            description: String::new(),
            thumbnail_url: String::new(),
            retailer_link: None,
            source: "google".to_string(),
            similarity: None,
        }
    }

    #[test]
    fn authors_display_joins_and_falls_back_to_unknown() {
        assert_eq!(
            candidate(&["Robert C. Martin", " Dean Wampler "]).authors_display(),
            "Robert C. Martin, Dean Wampler"
        );
        assert_eq!(candidate(&[]).authors_display(), UNKNOWN);
        assert_eq!(candidate(&["  "]).authors_display(), UNKNOWN);
    }

    #[test]
    fn job_status_only_moves_forward() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Failed));
    }

    #[test]
    fn job_status_round_trips_through_text() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>(), Ok(status));
        }
        assert!("paused".parse::<JobStatus>().is_err());
    }

    #[test]
    fn progress_percent_uses_processed_over_total() {
        let now = Utc::now();
        let mut job = UpdateJob {
            id: "job".to_string(),
            status: JobStatus::Processing,
            total_books: 3,
            processed_books: 1,
            success_count: 1,
            error_count: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        assert_eq!(job.progress_percent(), 33.3);
        job.processed_books = 3;
        assert_eq!(job.progress_percent(), 100.0);
        job.total_books = 0;
        assert_eq!(job.progress_percent(), 0.0);
    }
}
