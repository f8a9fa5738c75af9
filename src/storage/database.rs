//! SQLite Database
//!
//! Embedded database for persistent storage using rusqlite with r2d2
//! connection pooling. Job status rows are write-once per transition and the
//! event log is append-only; nothing in the pipeline reads its own writes
//! back during a run.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OptionalExtension;

use claimlens_core::JobStatus;

use crate::models::{EventLevel, JobEvent, JobRecord};
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::database_path;

/// Type alias for the connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Sink for job status transitions and events.
///
/// The orchestrator writes through this narrow interface and never assumes
/// read-after-write consistency; failures are surfaced to the caller, which
/// logs and continues.
pub trait JobSink: Send + Sync {
    /// Record a status transition for a job.
    fn record_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error_count: usize,
        warning_count: usize,
    ) -> AppResult<()>;

    /// Append one event to the job's log.
    fn append_event(
        &self,
        job_id: &str,
        stage: &str,
        level: EventLevel,
        message: &str,
    ) -> AppResult<()>;
}

/// Database service for managing SQLite operations
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Create a database from an existing connection pool.
    pub fn from_pool(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create an in-memory database for testing.
    ///
    /// Uses an in-memory SQLite database with the same schema as the
    /// production database. Useful for integration and unit tests.
    pub fn new_in_memory() -> AppResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// Create a new database instance with connection pooling
    pub fn new() -> AppResult<Self> {
        let db_path = database_path()?;

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;

        Ok(db)
    }

    /// Get a clone of the connection pool
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Initialize the database schema
    fn init_schema(&self) -> AppResult<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                error_count INTEGER NOT NULL DEFAULT 0,
                warning_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS job_events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id TEXT NOT NULL,
                stage TEXT NOT NULL,
                level TEXT NOT NULL,
                message TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_job_events_job_id ON job_events(job_id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS prompt_configs (
                step TEXT PRIMARY KEY,
                prompt TEXT NOT NULL,
                provider TEXT,
                model TEXT,
                temperature REAL NOT NULL DEFAULT 0.1,
                max_tokens INTEGER NOT NULL DEFAULT 512,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        Ok(())
    }

    /// Fetch a job row by id.
    pub fn get_job(&self, job_id: &str) -> AppResult<Option<JobRecord>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))?;

        let mut stmt = conn.prepare(
            "SELECT id, status, error_count, warning_count, created_at, updated_at
             FROM jobs WHERE id = ?1",
        )?;

        let result = stmt
            .query_row(rusqlite::params![job_id], |row| {
                let status_str: String = row.get(1)?;
                Ok(JobRecord {
                    id: row.get(0)?,
                    status: status_str.parse().unwrap_or(JobStatus::Pending),
                    error_count: row.get::<_, i64>(2)? as usize,
                    warning_count: row.get::<_, i64>(3)? as usize,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            })
            .optional()?;

        Ok(result)
    }

    /// List all events for a job in append order.
    pub fn list_events(&self, job_id: &str) -> AppResult<Vec<JobEvent>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))?;

        let mut stmt = conn.prepare(
            "SELECT seq, job_id, stage, level, message, created_at
             FROM job_events WHERE job_id = ?1 ORDER BY seq ASC",
        )?;

        let rows = stmt.query_map(rusqlite::params![job_id], |row| {
            let level_str: String = row.get(3)?;
            Ok(JobEvent {
                seq: row.get(0)?,
                job_id: row.get(1)?,
                stage: row.get(2)?,
                level: level_str.parse().unwrap_or(EventLevel::Info),
                message: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }
}

impl JobSink for Database {
    fn record_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error_count: usize,
        warning_count: usize,
    ) -> AppResult<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))?;

        conn.execute(
            "INSERT INTO jobs (id, status, error_count, warning_count)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                error_count = excluded.error_count,
                warning_count = excluded.warning_count,
                updated_at = datetime('now')",
            rusqlite::params![
                job_id,
                status.to_string(),
                error_count as i64,
                warning_count as i64
            ],
        )?;
        Ok(())
    }

    fn append_event(
        &self,
        job_id: &str,
        stage: &str,
        level: EventLevel,
        message: &str,
    ) -> AppResult<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))?;

        conn.execute(
            "INSERT INTO job_events (job_id, stage, level, message) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![job_id, stage, level.to_string(), message],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions_persisted() {
        let db = Database::new_in_memory().unwrap();

        db.record_status("job-1", JobStatus::InProgress, 0, 0).unwrap();
        db.record_status("job-1", JobStatus::Completed, 0, 1).unwrap();

        let record = db.get_job("job-1").unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.warning_count, 1);
    }

    #[test]
    fn test_missing_job_is_none() {
        let db = Database::new_in_memory().unwrap();
        assert!(db.get_job("nope").unwrap().is_none());
    }

    #[test]
    fn test_events_append_in_order() {
        let db = Database::new_in_memory().unwrap();

        db.append_event("job-1", "estimate_extraction", EventLevel::Info, "started")
            .unwrap();
        db.append_event("job-1", "estimate_extraction", EventLevel::Warning, "low confidence")
            .unwrap();
        db.append_event("job-2", "roof_extraction", EventLevel::Info, "other job")
            .unwrap();

        let events = db.list_events("job-1").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "started");
        assert_eq!(events[1].level, EventLevel::Warning);
        assert!(events[0].seq < events[1].seq);
    }
}
