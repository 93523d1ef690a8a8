//! Status history repository.

use cafelink_core::TriState;
use rusqlite::{params, Connection};

use super::parse_datetime;
use crate::error::Result;
use crate::models::StatusChange;

/// Repository for the append-only status log.
pub struct HistoryRepo;

impl HistoryRepo {
    /// Records a status write.
    pub fn insert(conn: &Connection, status: TriState, source: &str) -> Result<i64> {
        conn.execute(
            "INSERT INTO status_history (status, source) VALUES (?1, ?2)",
            params![u8::from(status), source],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent changes first.
    pub fn recent(conn: &Connection, limit: i64) -> Result<Vec<StatusChange>> {
        let mut stmt = conn.prepare(
            "SELECT id, status, source, changed_at FROM status_history
             ORDER BY id DESC LIMIT ?1",
        )?;

        let changes = stmt
            .query_map([limit], |row| {
                let raw: u8 = row.get(1)?;
                Ok((
                    row.get::<_, i64>(0)?,
                    raw,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .filter_map(|r| r.ok())
            .filter_map(|(id, raw, source, changed_at)| {
                // Rows with an unknown status are skipped rather than failing the log.
                let status = TriState::try_from(raw).ok()?;
                Some(StatusChange {
                    id,
                    status,
                    source,
                    changed_at: parse_datetime(&changed_at),
                })
            })
            .collect();

        Ok(changes)
    }
}
