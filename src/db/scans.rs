use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::sqlite::{open_database, open_memory_database};
use super::DatabaseError;
use crate::pipeline::recorder::ScanStore;
use crate::pipeline::types::{Label, ScanRecord};

/// SQLite-backed scan history. One connection, serialized by a mutex.
pub struct SqliteScanStore {
    conn: Mutex<Connection>,
}

impl SqliteScanStore {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self {
            conn: Mutex::new(open_database(path)?),
        })
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self {
            conn: Mutex::new(open_memory_database()?),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }
}

impl ScanStore for SqliteScanStore {
    fn insert(&self, record: &ScanRecord) -> Result<(), DatabaseError> {
        self.with_conn(|conn| insert_scan(conn, record))
    }

    fn recent_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ScanRecord>, DatabaseError> {
        self.with_conn(|conn| recent_scans_for_user(conn, user_id, limit))
    }
}

pub fn insert_scan(conn: &Connection, record: &ScanRecord) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO scans (id, user_id, text, label, confidence, summary, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            record.id.to_string(),
            record.user_id,
            record.display_text,
            record.label.as_str(),
            record.confidence,
            record.explanation,
            record.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        ],
    )?;
    Ok(())
}

pub fn recent_scans_for_user(
    conn: &Connection,
    user_id: &str,
    limit: usize,
) -> Result<Vec<ScanRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, text, label, confidence, summary, created_at
         FROM scans WHERE user_id = ?1
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?2",
    )?;

    let rows = stmt.query_map(params![user_id, limit as i64], |row| {
        Ok(ScanRow {
            id: row.get(0)?,
            user_id: row.get(1)?,
            text: row.get(2)?,
            label: row.get(3)?,
            confidence: row.get(4)?,
            summary: row.get(5)?,
            created_at: row.get(6)?,
        })
    })?;

    let mut records = Vec::new();
    for row in rows {
        records.push(scan_from_row(row?)?);
    }
    Ok(records)
}

struct ScanRow {
    id: String,
    user_id: String,
    text: String,
    label: String,
    confidence: f64,
    summary: String,
    created_at: String,
}

fn scan_from_row(row: ScanRow) -> Result<ScanRecord, DatabaseError> {
    let id = Uuid::parse_str(&row.id).map_err(|e| DatabaseError::InvalidValue {
        field: "id".into(),
        reason: e.to_string(),
    })?;
    let label = Label::from_str(&row.label).map_err(|_| DatabaseError::InvalidEnum {
        field: "label".into(),
        value: row.label.clone(),
    })?;
    let created_at = DateTime::parse_from_rfc3339(&row.created_at)
        .map_err(|e| DatabaseError::InvalidValue {
            field: "created_at".into(),
            reason: e.to_string(),
        })?
        .with_timezone(&Utc);

    Ok(ScanRecord {
        id,
        user_id: row.user_id,
        display_text: row.text,
        label,
        confidence: row.confidence,
        explanation: row.summary,
        created_at,
    })
}
