use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{from_millis, to_millis, Database};
use crate::error::{Error, Result};
use crate::models::{JobStatus, UpdateJob, UpdateLogEntry};

/// Storage for background update jobs and their audit log.
pub trait JobRepository: Send + Sync {
    fn create_job(&self, job: &UpdateJob) -> Result<()>;

    fn get_job(&self, id: &str) -> Result<Option<UpdateJob>>;

    /// Moves a job from `from` to `to`. Fails with [`Error::InvalidTransition`]
    /// when the move is not allowed or the job is no longer in `from`.
    fn transition(&self, id: &str, from: JobStatus, to: JobStatus) -> Result<()>;

    /// Stores the live counters of a processing job. Counters never decrease.
    fn record_progress(&self, id: &str, processed: usize, success: usize, errors: usize)
        -> Result<()>;

    fn append_log(&self, job_id: &str, book_id: i64, success: bool, message: &str) -> Result<()>;

    /// Most recent entries for a job, newest first.
    fn recent_logs(&self, job_id: &str, limit: usize) -> Result<Vec<UpdateLogEntry>>;
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<UpdateJob> {
    let status: String = row.get(1)?;
    let status = status.parse::<JobStatus>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            Box::<dyn std::error::Error + Send + Sync>::from(err),
        )
    })?;
    Ok(UpdateJob {
        id: row.get(0)?,
        status,
        total_books: row.get::<_, i64>(2)? as usize,
        processed_books: row.get::<_, i64>(3)? as usize,
        success_count: row.get::<_, i64>(4)? as usize,
        error_count: row.get::<_, i64>(5)? as usize,
        created_at: from_millis(row.get(6)?),
        updated_at: from_millis(row.get(7)?),
        completed_at: row.get::<_, Option<i64>>(8)?.map(from_millis),
    })
}

impl JobRepository for Database {
    fn create_job(&self, job: &UpdateJob) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO update_jobs (id, status, total_books, processed_books, success_count, \
             error_count, created_at, updated_at, completed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                job.id,
                job.status.as_str(),
                job.total_books as i64,
                job.processed_books as i64,
                job.success_count as i64,
                job.error_count as i64,
                to_millis(job.created_at),
                to_millis(job.updated_at),
                job.completed_at.map(to_millis),
            ],
        )?;
        Ok(())
    }

    fn get_job(&self, id: &str) -> Result<Option<UpdateJob>> {
        let conn = self.connection()?;
        let job = conn
            .query_row(
                "SELECT id, status, total_books, processed_books, success_count, error_count, \
                 created_at, updated_at, completed_at FROM update_jobs WHERE id = ?1",
                params![id],
                job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    fn transition(&self, id: &str, from: JobStatus, to: JobStatus) -> Result<()> {
        let invalid = || Error::InvalidTransition {
            job_id: id.to_string(),
            from,
            to,
        };
        if !from.can_transition_to(to) {
            return Err(invalid());
        }

        let conn = self.connection()?;
        let now = to_millis(Utc::now());
        let completed_at = to.is_terminal().then_some(now);
        let changed = conn.execute(
            "UPDATE update_jobs SET status = ?1, updated_at = ?2, completed_at = ?3 \
             WHERE id = ?4 AND status = ?5",
            params![to.as_str(), now, completed_at, id, from.as_str()],
        )?;
        if changed == 0 {
            return Err(invalid());
        }
        Ok(())
    }

    fn record_progress(
        &self,
        id: &str,
        processed: usize,
        success: usize,
        errors: usize,
    ) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "UPDATE update_jobs SET processed_books = ?1, success_count = ?2, error_count = ?3, \
             updated_at = ?4 WHERE id = ?5 AND status = 'processing' AND processed_books <= ?1",
            params![
                processed as i64,
                success as i64,
                errors as i64,
                to_millis(Utc::now()),
                id,
            ],
        )?;
        Ok(())
    }

    fn append_log(&self, job_id: &str, book_id: i64, success: bool, message: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO update_logs (job_id, book_id, success, message, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![job_id, book_id, success, message, to_millis(Utc::now())],
        )?;
        Ok(())
    }

    fn recent_logs(&self, job_id: &str, limit: usize) -> Result<Vec<UpdateLogEntry>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, job_id, book_id, success, message, created_at FROM update_logs \
             WHERE job_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let entries = stmt
            .query_map(params![job_id, limit as i64], |row| {
                Ok(UpdateLogEntry {
                    id: row.get(0)?,
                    job_id: row.get(1)?,
                    book_id: row.get(2)?,
                    success: row.get(3)?,
                    message: row.get(4)?,
                    created_at: from_millis(row.get(5)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<UpdateLogEntry>>>()?;
        Ok(entries)
    }
}
