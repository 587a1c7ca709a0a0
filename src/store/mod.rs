//! Document store: the durable mapping from id to [`Document`].
//!
//! Two backends implement the same [`DocumentStore`] contract:
//!
//! * [`MemoryStore`]: process-local, for tests and throwaway runs.
//! * [`SqliteStore`]: an embedded SQLite file, the default for the server.
//!
//! [`open_store`] picks one from a connection string. Both backends guard
//! all mutations with one lock, so two updates to the same document never
//! interleave and a status flip is atomic from every caller's viewpoint.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::document::{ConversionOutcome, Document};
use crate::error::StoreError;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Persistence contract used by the pipeline.
///
/// The store knows nothing about files on disk; cleaning up a document's
/// pages is the pipeline's job.
pub trait DocumentStore: Send + Sync {
    /// Insert a new `pending` record with a fresh id.
    fn create(&self, title: &str, original_filename: &str) -> Result<Document, StoreError>;

    /// Look up one record. A missing id is `Ok(None)`, not an error.
    fn get(&self, id: Uuid) -> Result<Option<Document>, StoreError>;

    /// Every record, newest first.
    fn list(&self) -> Result<Vec<Document>, StoreError>;

    /// Apply a conversion result to a `pending` record.
    ///
    /// Fails with [`StoreError::NotFound`] for unknown ids and
    /// [`StoreError::InvalidTransition`] if the record already left `pending`.
    fn update(&self, id: Uuid, outcome: &ConversionOutcome) -> Result<Document, StoreError>;

    /// Remove a record; returns whether one existed.
    fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Records still `pending`, oldest first.
    fn pending(&self) -> Result<Vec<Document>, StoreError> {
        let mut docs: Vec<Document> = self
            .list()?
            .into_iter()
            .filter(|d| !d.status.is_terminal())
            .collect();
        docs.reverse();
        Ok(docs)
    }
}

/// Reject `Ready` outcomes whose count and path list disagree.
pub(crate) fn check_outcome(id: Uuid, outcome: &ConversionOutcome) -> Result<(), StoreError> {
    if let ConversionOutcome::Ready {
        page_count,
        page_image_paths,
        ..
    } = outcome
    {
        if *page_count != page_image_paths.len() {
            return Err(StoreError::Inconsistent {
                id,
                page_count: *page_count,
                paths: page_image_paths.len(),
            });
        }
    }
    Ok(())
}

/// Open a store from a connection string.
///
/// | URL | Backend |
/// |-----|---------|
/// | `memory://` | [`MemoryStore`] |
/// | `sqlite://<path>` | [`SqliteStore`] at `<path>` |
/// | `sqlite::memory:` | [`SqliteStore`] in memory |
/// | `<path>.db` / `<path>.sqlite` | [`SqliteStore`] at `<path>` |
pub fn open_store(url: &str) -> Result<Arc<dyn DocumentStore>, StoreError> {
    let url = url.trim();
    if url == "memory://" || url == "memory" {
        info!("Using in-memory document store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    if url == "sqlite::memory:" {
        info!("Using in-memory SQLite document store");
        return Ok(Arc::new(SqliteStore::open_in_memory()?));
    }
    if let Some(path) = url.strip_prefix("sqlite://") {
        return open_sqlite_file(Path::new(path));
    }
    if let Some(path) = url.strip_prefix("sqlite:") {
        return open_sqlite_file(Path::new(path));
    }
    if url.ends_with(".db") || url.ends_with(".sqlite") {
        return open_sqlite_file(Path::new(url));
    }
    Err(StoreError::UnsupportedUrl(url.to_string()))
}

fn open_sqlite_file(path: &Path) -> Result<Arc<dyn DocumentStore>, StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            StoreError::Unavailable(format!("cannot create '{}': {e}", parent.display()))
        })?;
    }
    info!(path = %path.display(), "Using SQLite document store");
    Ok(Arc::new(SqliteStore::open(path)?))
}
