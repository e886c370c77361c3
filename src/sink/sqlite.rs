use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};

use crate::utils::time::format_timestamp;

use super::{EventSink, SessionIds};

/// Sink backed by a local SQLite database. The connection opens once per
/// process; a crash loses at most the in-flight row, never committed ones.
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    /// Opens the sink database at the given path, creating it if necessary.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let sink = Self { conn };
        sink.init()?;
        Ok(sink)
    }

    /// Useful for testing. The database is destroyed when the connection
    /// closes.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let sink = Self { conn };
        sink.init()?;
        Ok(sink)
    }

    /// Idempotent, safe to call on an already initialized database.
    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS transitions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                activity_title TEXT NOT NULL,
                logged_at TEXT NOT NULL,
                employee_id TEXT NOT NULL,
                organization_id TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS activity_summaries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                activity_title TEXT NOT NULL,
                total_seconds INTEGER NOT NULL,
                summary_date TEXT NOT NULL,
                employee_id TEXT NOT NULL,
                organization_id TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }
}

impl EventSink for SqliteSink {
    fn record_transition(
        &mut self,
        activity_title: &str,
        at: DateTime<Utc>,
        ids: &SessionIds,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO transitions (activity_title, logged_at, employee_id, organization_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                activity_title,
                format_timestamp(at),
                ids.employee_id,
                ids.organization_id
            ],
        )?;
        Ok(())
    }

    fn record_summary(
        &mut self,
        activity_title: &str,
        total_seconds: i64,
        date: NaiveDate,
        ids: &SessionIds,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO activity_summaries
                 (activity_title, total_seconds, summary_date, employee_id, organization_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                activity_title,
                total_seconds,
                date.format("%Y-%m-%d").to_string(),
                ids.employee_id,
                ids.organization_id
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
impl SqliteSink {
    pub fn transitions(&self) -> Result<Vec<(String, String, String, String)>> {
        let mut statement = self.conn.prepare(
            "SELECT activity_title, logged_at, employee_id, organization_id
             FROM transitions ORDER BY id",
        )?;
        let rows = statement
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn summaries(&self) -> Result<Vec<(String, i64, String)>> {
        let mut statement = self.conn.prepare(
            "SELECT activity_title, total_seconds, summary_date
             FROM activity_summaries ORDER BY id",
        )?;
        let rows = statement
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
