//! SQLite job store.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

use super::models::*;

const DB_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Invalid stored value: {0}")]
    Corrupt(String),
    #[error("Database connection lock poisoned")]
    Poisoned,
}

/// Thread-safe database store.
///
/// Every write is a single statement, so replicas sharing the file see
/// either the old row or the new one.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the job database at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(30))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    /// Insert or fully overwrite a job row.
    pub fn save_job(&self, job: &Job) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO jobs (id, action, name, status, result, created_at, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                action = excluded.action,
                name = excluded.name,
                status = excluded.status,
                result = excluded.result,
                started_at = excluded.started_at,
                finished_at = excluded.finished_at",
            params![
                job.id,
                job.action.as_str(),
                job.name,
                job.status.as_str(),
                job.result,
                format_db_time(job.created_at),
                job.started_at.map(format_db_time),
                job.finished_at.map(format_db_time),
            ],
        )?;
        Ok(())
    }

    /// Look a job up by id.
    pub fn get_job(&self, id: &str) -> Result<Option<Job>, DbError> {
        let conn = self.conn()?;
        let job = conn
            .query_row(
                "SELECT id, action, name, status, result, created_at, started_at, finished_at
                 FROM jobs WHERE id = ?1",
                params![id],
                job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    /// Delete terminal jobs that finished before `cutoff`.
    pub fn delete_finished_jobs_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DbError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM jobs WHERE status IN ('done', 'failed') AND finished_at < ?1",
            params![format_db_time(cutoff)],
        )?;
        Ok(deleted)
    }
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    let action: String = row.get(1)?;
    let status: String = row.get(3)?;
    let created_at: String = row.get(5)?;
    let started_at: Option<String> = row.get(6)?;
    let finished_at: Option<String> = row.get(7)?;

    Ok(Job {
        id: row.get(0)?,
        action: JobAction::parse(&action).ok_or_else(|| invalid(1, format!("action {:?}", action)))?,
        name: row.get(2)?,
        status: JobStatus::parse(&status).ok_or_else(|| invalid(3, format!("status {:?}", status)))?,
        result: row.get(4)?,
        created_at: parse_db_time(&created_at)
            .ok_or_else(|| invalid(5, format!("timestamp {:?}", created_at)))?,
        started_at: started_at.as_deref().and_then(parse_db_time),
        finished_at: finished_at.as_deref().and_then(parse_db_time),
    })
}

fn invalid(column: usize, what: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(DbError::Corrupt(what)))
}

fn format_db_time(t: DateTime<Utc>) -> String {
    t.format(DB_TIME_FORMAT).to_string()
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [DB_TIME_FORMAT, "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}
