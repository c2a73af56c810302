use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating ledger directory {}", dir.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("opening ledger {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS runs (
            id          INTEGER PRIMARY KEY,
            input_url   TEXT NOT NULL,
            mode        TEXT NOT NULL CHECK(mode IN ('scrape','upload')),
            started_at  TEXT NOT NULL,
            finished_at TEXT
        );

        CREATE TABLE IF NOT EXISTS uploads (
            id          INTEGER PRIMARY KEY,
            run_id      INTEGER NOT NULL REFERENCES runs(id),
            source_url  TEXT NOT NULL,
            handle      TEXT,
            title       TEXT,
            product_id  TEXT,
            status      TEXT NOT NULL CHECK(status IN ('uploaded','partial','failed','skipped')),
            error       TEXT,
            latency_ms  INTEGER,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_uploads_source ON uploads(source_url);
        CREATE INDEX IF NOT EXISTS idx_uploads_status ON uploads(status);

        CREATE TABLE IF NOT EXISTS upload_steps (
            id          INTEGER PRIMARY KEY,
            upload_id   INTEGER NOT NULL REFERENCES uploads(id),
            step        TEXT NOT NULL,
            status      TEXT NOT NULL CHECK(status IN ('done','skipped','failed')),
            detail      TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_steps_upload ON upload_steps(upload_id);
        ",
    )?;
    Ok(())
}

// ── Runs ──

pub fn start_run(conn: &Connection, input_url: &str, mode: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO runs (input_url, mode, started_at) VALUES (?1, ?2, ?3)",
        params![input_url, mode, Utc::now().to_rfc3339()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn finish_run(conn: &Connection, run_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE runs SET finished_at = ?1 WHERE id = ?2",
        params![Utc::now().to_rfc3339(), run_id],
    )?;
    Ok(())
}

// ── Uploads ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Uploaded,
    Partial,
    Failed,
    Skipped,
}

impl UploadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadStatus::Uploaded => "uploaded",
            UploadStatus::Partial => "partial",
            UploadStatus::Failed => "failed",
            UploadStatus::Skipped => "skipped",
        }
    }
}

pub struct UploadRow {
    pub source_url: String,
    pub handle: Option<String>,
    pub title: Option<String>,
    pub product_id: Option<String>,
    pub status: UploadStatus,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

pub struct StepRow {
    pub step: String,
    pub status: String, // "done", "skipped", "failed"
    pub detail: Option<String>,
}

pub fn record_upload(
    conn: &Connection,
    run_id: i64,
    row: &UploadRow,
    steps: &[StepRow],
) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO uploads
         (run_id, source_url, handle, title, product_id, status, error, latency_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            run_id, row.source_url, row.handle, row.title, row.product_id,
            row.status.as_str(), row.error, row.latency_ms,
        ],
    )?;
    let upload_id = tx.last_insert_rowid();
    {
        let mut stmt = tx.prepare(
            "INSERT INTO upload_steps (upload_id, step, status, detail) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for s in steps {
            stmt.execute(params![upload_id, s.step, s.status, s.detail])?;
        }
    }
    tx.commit()?;
    Ok(upload_id)
}

/// Product id of the latest upload of `source_url` that created a product.
pub fn already_uploaded(conn: &Connection, source_url: &str) -> Result<Option<String>> {
    let id = conn
        .query_row(
            "SELECT product_id FROM uploads
             WHERE source_url = ?1
               AND status IN ('uploaded','partial')
               AND product_id IS NOT NULL
             ORDER BY id DESC
             LIMIT 1",
            [source_url],
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}

// ── History ──

pub struct HistoryRow {
    pub created_at: String,
    pub status: String,
    pub handle: String,
    pub product_id: String,
    pub failed_steps: usize,
    pub source_url: String,
}

pub fn recent_uploads(conn: &Connection, limit: usize) -> Result<Vec<HistoryRow>> {
    let mut stmt = conn.prepare(
        "SELECT u.created_at, u.status, COALESCE(u.handle,''), COALESCE(u.product_id,''),
                (SELECT COUNT(*) FROM upload_steps s
                 WHERE s.upload_id = u.id AND s.status = 'failed'),
                u.source_url
         FROM uploads u
         ORDER BY u.id DESC
         LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit as i64], |row| {
            Ok(HistoryRow {
                created_at: row.get(0)?,
                status: row.get(1)?,
                handle: row.get(2)?,
                product_id: row.get(3)?,
                failed_steps: row.get(4)?,
                source_url: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub runs: usize,
    pub total: usize,
    pub uploaded: usize,
    pub partial: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failed_steps: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let runs: usize = conn.query_row("SELECT COUNT(*) FROM runs", [], |r| r.get(0))?;
    let total: usize = conn.query_row("SELECT COUNT(*) FROM uploads", [], |r| r.get(0))?;
    let count = |status: UploadStatus| -> Result<usize> {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM uploads WHERE status = ?1",
            [status.as_str()],
            |r| r.get(0),
        )?)
    };
    let failed_steps: usize = conn.query_row(
        "SELECT COUNT(*) FROM upload_steps WHERE status = 'failed'",
        [],
        |r| r.get(0),
    )?;
    Ok(Stats {
        runs,
        total,
        uploaded: count(UploadStatus::Uploaded)?,
        partial: count(UploadStatus::Partial)?,
        failed: count(UploadStatus::Failed)?,
        skipped: count(UploadStatus::Skipped)?,
        failed_steps,
    })
}
