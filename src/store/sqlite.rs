use super::{check_outcome, DocumentStore};
use crate::document::{ConversionOutcome, Document, DocumentStatus, PageLink};
use crate::error::StoreError;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    seq               INTEGER PRIMARY KEY AUTOINCREMENT,
    id                TEXT NOT NULL UNIQUE,
    title             TEXT NOT NULL,
    original_filename TEXT NOT NULL,
    status            TEXT NOT NULL DEFAULT 'pending',
    page_count        INTEGER,
    page_image_paths  TEXT NOT NULL DEFAULT '[]',
    links             TEXT NOT NULL DEFAULT '[]',
    error             TEXT,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_documents_created ON documents (created_at DESC, seq DESC);
CREATE INDEX IF NOT EXISTS idx_documents_status ON documents (status);
";

const COLUMNS: &str = "id, title, original_filename, status, page_count, page_image_paths, \
                       error, created_at, updated_at, links";

/// SQLite-backed [`DocumentStore`].
///
/// One connection behind a mutex; every call runs to completion before the
/// next one starts.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Private in-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        add_links_column(&conn)?;
        debug!("SQLite schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".into()))
    }
}

/// Databases created before link extraction lack the `links` column.
fn add_links_column(conn: &Connection) -> Result<(), StoreError> {
    let present: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info('documents') WHERE name = 'links'",
        [],
        |row| row.get(0),
    )?;
    if present == 0 {
        conn.execute_batch("ALTER TABLE documents ADD COLUMN links TEXT NOT NULL DEFAULT '[]';")?;
        info!("Added links column to documents table");
    }
    Ok(())
}

/// Raw column values, decoded into a [`Document`] by [`document_from_row`].
struct DocumentRow {
    id: String,
    title: String,
    original_filename: String,
    status: String,
    page_count: Option<i64>,
    page_image_paths: String,
    error: Option<String>,
    created_at: String,
    updated_at: String,
    links: String,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        id: row.get(0)?,
        title: row.get(1)?,
        original_filename: row.get(2)?,
        status: row.get(3)?,
        page_count: row.get(4)?,
        page_image_paths: row.get(5)?,
        error: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        links: row.get(9)?,
    })
}

fn document_from_row(row: DocumentRow) -> Result<Document, StoreError> {
    let id = Uuid::parse_str(&row.id)
        .map_err(|e| StoreError::Corrupt(format!("id '{}': {e}", row.id)))?;
    let status: DocumentStatus = row
        .status
        .parse()
        .map_err(|e: String| StoreError::Corrupt(format!("{id}: {e}")))?;
    let page_count = row
        .page_count
        .map(|n| {
            usize::try_from(n).map_err(|_| StoreError::Corrupt(format!("{id}: page_count {n}")))
        })
        .transpose()?;
    let page_image_paths: Vec<String> = serde_json::from_str(&row.page_image_paths)
        .map_err(|e| StoreError::Corrupt(format!("{id}: page_image_paths: {e}")))?;
    let links: Vec<PageLink> = serde_json::from_str(&row.links)
        .map_err(|e| StoreError::Corrupt(format!("{id}: links: {e}")))?;

    Ok(Document {
        id,
        title: row.title,
        status,
        page_count,
        page_image_paths,
        original_filename: row.original_filename,
        created_at: parse_time(id, &row.created_at)?,
        updated_at: parse_time(id, &row.updated_at)?,
        error: row.error,
        links,
    })
}

// Fixed-width UTC timestamps sort correctly as text.
fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(id: Uuid, s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("{id}: timestamp '{s}': {e}")))
}

fn select_one(conn: &Connection, id: Uuid) -> Result<Option<Document>, StoreError> {
    let sql = format!("SELECT {COLUMNS} FROM documents WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], read_row)
        .optional()?;
    row.map(document_from_row).transpose()
}

impl DocumentStore for SqliteStore {
    fn create(&self, title: &str, original_filename: &str) -> Result<Document, StoreError> {
        let conn = self.conn()?;
        let doc = Document::new_pending(title, original_filename);
        conn.execute(
            "INSERT INTO documents (id, title, original_filename, status, page_image_paths,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, '[]', ?5, ?6)",
            params![
                doc.id.to_string(),
                doc.title,
                doc.original_filename,
                doc.status.as_str(),
                format_time(&doc.created_at),
                format_time(&doc.updated_at),
            ],
        )?;
        Ok(doc)
    }

    fn get(&self, id: Uuid) -> Result<Option<Document>, StoreError> {
        let conn = self.conn()?;
        select_one(&conn, id)
    }

    fn list(&self) -> Result<Vec<Document>, StoreError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {COLUMNS} FROM documents ORDER BY created_at DESC, seq DESC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], read_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(document_from_row).collect()
    }

    fn update(&self, id: Uuid, outcome: &ConversionOutcome) -> Result<Document, StoreError> {
        check_outcome(id, outcome)?;
        let conn = self.conn()?;
        let mut doc = select_one(&conn, id)?.ok_or(StoreError::NotFound(id))?;
        if doc.status.is_terminal() {
            return Err(StoreError::InvalidTransition {
                id,
                from: doc.status,
            });
        }
        doc.apply(outcome);

        let paths = serde_json::to_string(&doc.page_image_paths)
            .map_err(|e| StoreError::Corrupt(format!("{id}: page_image_paths: {e}")))?;
        let links = serde_json::to_string(&doc.links)
            .map_err(|e| StoreError::Corrupt(format!("{id}: links: {e}")))?;
        let changed = conn.execute(
            "UPDATE documents SET status = ?2, page_count = ?3, page_image_paths = ?4,
             error = ?5, updated_at = ?6, links = ?7
             WHERE id = ?1 AND status = 'pending'",
            params![
                id.to_string(),
                doc.status.as_str(),
                doc.page_count.map(|n| n as i64),
                paths,
                doc.error,
                format_time(&doc.updated_at),
                links,
            ],
        )?;
        if changed == 0 {
            // Only reachable if another connection touched the file.
            return Err(StoreError::NotFound(id));
        }
        Ok(doc)
    }

    fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM documents WHERE id = ?1", params![id.to_string()])?;
        Ok(n > 0)
    }

    fn pending(&self) -> Result<Vec<Document>, StoreError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {COLUMNS} FROM documents WHERE status = 'pending' ORDER BY created_at ASC, seq ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], read_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(document_from_row).collect()
    }
}
