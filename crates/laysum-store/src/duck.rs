//! DuckDB storage for users, summaries, assignments and annotations.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::{Connection, OptionalExt, params};
use tracing::{debug, info};

use laysum_core::config::DEFAULT_WINDOW_DAYS;
use laysum_core::{AnnotationRecord, DocumentItem, Label, Scores};

use crate::traits::{annotation_owner, check_window, window_start};
use crate::{AdminStore, AnnotationStore, StoreError, UserSettings};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id VARCHAR PRIMARY KEY,
    name VARCHAR NOT NULL,
    email VARCHAR,
    summary_window_days INTEGER NOT NULL DEFAULT 7,
    is_admin BOOLEAN NOT NULL DEFAULT false
);
CREATE TABLE IF NOT EXISTS text_summaries (
    id VARCHAR PRIMARY KEY,
    source_text VARCHAR NOT NULL,
    summary VARCHAR NOT NULL
);
CREATE SEQUENCE IF NOT EXISTS assignment_seq;
CREATE TABLE IF NOT EXISTS assignments (
    user_id VARCHAR NOT NULL,
    text_id VARCHAR NOT NULL,
    assigned_at_ms BIGINT NOT NULL,
    completed BOOLEAN NOT NULL DEFAULT false,
    seq BIGINT NOT NULL DEFAULT nextval('assignment_seq'),
    PRIMARY KEY (user_id, text_id)
);
CREATE TABLE IF NOT EXISTS annotations (
    user_id VARCHAR NOT NULL,
    text_id VARCHAR NOT NULL,
    comprehensiveness INTEGER NOT NULL,
    layness INTEGER NOT NULL,
    factuality INTEGER NOT NULL,
    usefulness INTEGER NOT NULL,
    labels VARCHAR NOT NULL,
    updated_at_ms BIGINT NOT NULL,
    PRIMARY KEY (user_id, text_id)
);
";

/// DuckDB-backed annotation store.
///
/// Labels are kept as a JSON array in the `annotations.labels` column, in
/// the same shape the HTTP service uses. Supports both in-memory
/// ([`open`](Self::open)) and file-backed
/// ([`open_persistent`](Self::open_persistent)) databases; the schema is
/// created on open and reopening an existing file keeps its data.
pub struct DuckStore {
    conn: Mutex<Connection>,
    default_window_days: i32,
}

impl DuckStore {
    /// Open an in-memory DuckDB database.
    pub fn open() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open or create a persistent DuckDB database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let store = Self::init(Connection::open(path)?)?;
        info!(path = %path.display(), "opened annotation database");
        Ok(store)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            default_window_days: DEFAULT_WINDOW_DAYS,
        })
    }

    /// Window used for users without a settings row.
    pub fn with_default_window(mut self, days: i32) -> Self {
        self.default_window_days = days;
        self
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Other("duckdb connection lock poisoned".into()))
    }

    // ── Setup ──

    /// Insert or update a user and their settings.
    pub fn upsert_user(&self, user: &UserSettings) -> Result<(), StoreError> {
        check_window(user.summary_window_days)?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO users (id, name, email, summary_window_days, is_admin)
             VALUES (?, ?, ?, ?, ?)",
            params![
                user.id,
                user.name,
                user.email,
                user.summary_window_days,
                user.is_admin
            ],
        )?;
        Ok(())
    }

    /// Insert or update summaries, e.g. from a document file.
    pub fn import_documents(&self, documents: &[DocumentItem]) -> Result<usize, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for doc in documents {
            tx.execute(
                "INSERT OR REPLACE INTO text_summaries (id, source_text, summary) VALUES (?, ?, ?)",
                params![doc.id, doc.source_text, doc.summary],
            )?;
        }
        tx.commit()?;
        info!(count = documents.len(), "imported summaries");
        Ok(documents.len())
    }

    /// Assign a known summary to `user`. Re-assigning resets the time but
    /// keeps the completion flag.
    pub fn assign(
        &self,
        user: &str,
        document_id: &str,
        assigned_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        require_document(&conn, document_id)?;
        let updated = conn.execute(
            "UPDATE assignments SET assigned_at_ms = ? WHERE user_id = ? AND text_id = ?",
            params![assigned_at.timestamp_millis(), user, document_id],
        )?;
        if updated == 0 {
            conn.execute(
                "INSERT INTO assignments (user_id, text_id, assigned_at_ms) VALUES (?, ?, ?)",
                params![user, document_id, assigned_at.timestamp_millis()],
            )?;
        }
        debug!(user, document_id, "assigned summary");
        Ok(())
    }

    // ── Counts ──

    /// Number of rows in the `annotations` table.
    pub fn annotation_count(&self) -> Result<usize, StoreError> {
        self.count_table("annotations")
    }

    /// Number of rows in the `text_summaries` table.
    pub fn document_count(&self) -> Result<usize, StoreError> {
        self.count_table("text_summaries")
    }

    fn count_table(&self, table: &str) -> Result<usize, StoreError> {
        let sql = format!("SELECT count(*)::BIGINT AS cnt FROM {table}");
        let batches = self.query_arrow(&sql)?;
        let batch = batches
            .first()
            .ok_or_else(|| StoreError::Other(format!("no count returned for {table}")))?;
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<arrow::array::Int64Array>()
            .ok_or_else(|| StoreError::Other("count column not i64".into()))?;
        Ok(col.value(0) as usize)
    }

    // ── Escape hatch ──

    /// Execute arbitrary SQL and return Arrow RecordBatches.
    pub fn query_arrow(&self, sql: &str) -> Result<Vec<RecordBatch>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        Ok(batches)
    }

    fn window_days(conn: &Connection, user: &str, default: i32) -> Result<i32, StoreError> {
        let days = conn
            .query_row(
                "SELECT summary_window_days FROM users WHERE id = ?",
                [user],
                |row| row.get::<_, i32>(0),
            )
            .optional()?;
        Ok(days.unwrap_or(default))
    }

    fn is_admin(conn: &Connection, user: &str) -> Result<bool, StoreError> {
        let admin = conn
            .query_row("SELECT is_admin FROM users WHERE id = ?", [user], |row| {
                row.get::<_, bool>(0)
            })
            .optional()?;
        Ok(admin.unwrap_or(false))
    }
}

fn require_document(conn: &Connection, document_id: &str) -> Result<(), StoreError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM text_summaries WHERE id = ?",
            [document_id],
            |_| Ok(()),
        )
        .optional()?;
    found.ok_or_else(|| StoreError::NotFound(format!("document {document_id}")))
}

fn score(value: i32) -> Result<u8, StoreError> {
    u8::try_from(value).map_err(|_| StoreError::Other(format!("stored score {value} out of range")))
}

struct AnnotationRow {
    document_id: String,
    scores: [i32; 4],
    labels: String,
}

impl AnnotationRow {
    const COLUMNS: &'static str =
        "text_id, comprehensiveness, layness, factuality, usefulness, labels";

    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            document_id: row.get(0)?,
            scores: [row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?],
            labels: row.get(5)?,
        })
    }

    fn into_record(self) -> Result<AnnotationRecord, StoreError> {
        let [c, l, f, u] = self.scores;
        let labels: Vec<Label> = serde_json::from_str(&self.labels)?;
        Ok(AnnotationRecord {
            document_id: self.document_id,
            scores: Scores::new(score(c)?, score(l)?, score(f)?, score(u)?),
            labels,
        })
    }
}

#[async_trait]
impl AnnotationStore for DuckStore {
    async fn assigned_documents(&self, user: &str) -> Result<Vec<DocumentItem>, StoreError> {
        let conn = self.conn()?;
        let days = Self::window_days(&conn, user, self.default_window_days)?;
        let cutoff = window_start(days, Utc::now()).timestamp_millis();

        let mut stmt = conn.prepare(
            "SELECT s.id, s.source_text, s.summary, a.assigned_at_ms, a.completed
             FROM assignments a
             JOIN text_summaries s ON s.id = a.text_id
             WHERE a.user_id = ? AND (NOT a.completed OR a.assigned_at_ms >= ?)
             ORDER BY a.assigned_at_ms, a.seq",
        )?;
        let rows = stmt.query_map(params![user, cutoff], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, bool>(4)?,
            ))
        })?;

        let mut items = Vec::new();
        for row in rows {
            let (id, source_text, summary, assigned_ms, completed) = row?;
            let mut item = DocumentItem::new(id, source_text, summary);
            item.assigned_at = DateTime::from_timestamp_millis(assigned_ms);
            item.completed = completed;
            items.push(item);
        }
        debug!(user, days, count = items.len(), "assigned documents");
        Ok(items)
    }

    async fn load_annotation(
        &self,
        user: &str,
        document_id: &str,
    ) -> Result<Option<AnnotationRecord>, StoreError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM annotations WHERE user_id = ? AND text_id = ?",
            AnnotationRow::COLUMNS
        );
        let row = conn
            .query_row(&sql, [user, document_id], AnnotationRow::from_row)
            .optional()?;
        row.map(AnnotationRow::into_record).transpose()
    }

    async fn save_annotation(
        &self,
        user: &str,
        record: &AnnotationRecord,
    ) -> Result<(), StoreError> {
        record.validate()?;
        let labels = serde_json::to_string(&record.labels)?;
        let scores = record.scores;

        let mut conn = self.conn()?;
        require_document(&conn, &record.document_id)?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO annotations
                 (user_id, text_id, comprehensiveness, layness, factuality, usefulness, labels, updated_at_ms)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                user,
                record.document_id,
                i32::from(scores.comprehensiveness),
                i32::from(scores.layness),
                i32::from(scores.factuality),
                i32::from(scores.usefulness),
                labels,
                Utc::now().timestamp_millis()
            ],
        )?;
        if record.is_complete() {
            tx.execute(
                "UPDATE assignments SET completed = true WHERE user_id = ? AND text_id = ?",
                params![user, record.document_id],
            )?;
        }
        tx.commit()?;
        info!(user, document_id = %record.document_id, labels = record.labels.len(), "annotation saved");
        Ok(())
    }
}

#[async_trait]
impl AdminStore for DuckStore {
    async fn list_users(&self) -> Result<Vec<UserSettings>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, email, summary_window_days, is_admin FROM users ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(UserSettings {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                summary_window_days: row.get(3)?,
                is_admin: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    async fn set_summary_window(&self, user: &str, days: i32) -> Result<(), StoreError> {
        check_window(days)?;
        let updated = self.conn()?.execute(
            "UPDATE users SET summary_window_days = ? WHERE id = ?",
            params![days, user],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("user {user}")));
        }
        info!(user, days, "summary window updated");
        Ok(())
    }

    async fn annotations_for_user(
        &self,
        caller: &str,
        target: Option<&str>,
    ) -> Result<Vec<AnnotationRecord>, StoreError> {
        let conn = self.conn()?;
        let owner = annotation_owner(caller, Self::is_admin(&conn, caller)?, target);
        let sql = format!(
            "SELECT {} FROM annotations WHERE user_id = ? ORDER BY text_id",
            AnnotationRow::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([owner], AnnotationRow::from_row)?;
        rows.map(|row| row?.into_record()).collect()
    }
}
