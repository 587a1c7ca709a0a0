//! Error types for the openflip library.
//!
//! Four error types follow the four places a failure can originate:
//!
//! * [`FlipbookError`]: **request-level**. The upload is refused or the
//!   service cannot serve the call at all (oversized file, not a PDF, store
//!   down). Returned as `Err(FlipbookError)` from [`crate::Flipbooks`] and
//!   mapped to HTTP status codes by the API layer.
//!
//! * [`ConversionError`]: **absorbed**. Something broke after the upload was
//!   accepted (a page failed to render, the disk filled up). It never leaves
//!   the pipeline as an `Err`; it is recorded on the document as
//!   `status = failed` with the message as `error`.
//!
//! * [`RasterError`]: returned by a [`crate::pipeline::render::Rasterizer`].
//!
//! * [`StoreError`]: returned by a [`crate::store::DocumentStore`].

use crate::document::DocumentStatus;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Request-level errors returned by [`crate::Flipbooks`].
#[derive(Debug, Error)]
pub enum FlipbookError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// Upload is larger than the configured `MAX_FILE_SIZE`.
    #[error("File too large: {size} bytes exceeds the limit of {limit} bytes")]
    FileTooLarge { size: usize, limit: usize },

    /// The request carried no file bytes at all.
    #[error("No file content was uploaded")]
    EmptyUpload,

    /// The bytes are not a PDF the rasterizer can open.
    #[error("File is not a valid PDF: {detail}")]
    NotAPdf { detail: String },

    /// The PDF opened fine but has no pages to show.
    #[error("PDF contains no pages")]
    EmptyDocument,

    // ── Service errors ────────────────────────────────────────────────────
    /// The document store could not be reached; nothing was recorded.
    #[error("Document store unavailable: {0}")]
    StorageUnavailable(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FlipbookError {
    /// True for errors caused by the upload itself rather than the service.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            FlipbookError::FileTooLarge { .. }
                | FlipbookError::EmptyUpload
                | FlipbookError::NotAPdf { .. }
                | FlipbookError::EmptyDocument
        )
    }
}

impl From<StoreError> for FlipbookError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => FlipbookError::StorageUnavailable(msg),
            other => FlipbookError::Internal(other.to_string()),
        }
    }
}

/// A failure after the upload was accepted.
///
/// Stored on the document as its `error` string when it transitions to
/// [`DocumentStatus::Failed`].
#[derive(Debug, Error)]
pub enum ConversionError {
    /// Could not persist the original PDF under `uploads/`.
    #[error("Failed to store the uploaded PDF at '{path}': {source}")]
    UploadWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The rasterizer failed on a page.
    #[error("Page {page}: rasterisation failed: {detail}")]
    Render { page: usize, detail: String },

    /// The rendered bitmap could not be encoded to the page format.
    #[error("Page {page}: image encoding failed: {detail}")]
    Encode { page: usize, detail: String },

    /// Writing a page image to disk failed.
    #[error("Page {page}: failed to write '{path}': {source}")]
    PageWrite {
        page: usize,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Recording the result in the store failed.
    #[error("Failed to record conversion result: {0}")]
    Store(#[from] StoreError),

    /// A blocking render task panicked or was aborted.
    #[error("Render task panicked: {0}")]
    TaskPanicked(String),
}

/// Errors from the rasterization service.
#[derive(Debug, Clone, Error)]
pub enum RasterError {
    /// Input is not a parseable PDF.
    #[error("Invalid PDF document: {0}")]
    InvalidDocument(String),

    /// A page could not be rendered.
    #[error("Rendering page {page} failed: {detail}")]
    Render { page: usize, detail: String },

    /// Requested page index past the end of the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    Binding(String),
}

/// Errors from a document store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend unreachable or returned an I/O-level error.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// No record with this id.
    #[error("Document {0} not found")]
    NotFound(Uuid),

    /// The record already left `pending`; statuses only move forward.
    #[error("Document {id} is already {from}; only pending documents can be updated")]
    InvalidTransition { id: Uuid, from: DocumentStatus },

    /// A `ready` outcome whose page count disagrees with its image list.
    #[error("Inconsistent result for {id}: page_count={page_count} but {paths} image paths")]
    Inconsistent {
        id: Uuid,
        page_count: usize,
        paths: usize,
    },

    /// A stored row could not be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// The connection string names a backend that is not supported.
    #[error("Unsupported database URL '{0}' (expected memory:// or sqlite://<path>)")]
    UnsupportedUrl(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_too_large_display() {
        let e = FlipbookError::FileTooLarge {
            size: 60,
            limit: 50,
        };
        let msg = e.to_string();
        assert!(msg.contains("60"), "got: {msg}");
        assert!(msg.contains("50"), "got: {msg}");
        assert!(e.is_validation());
    }

    #[test]
    fn storage_unavailable_is_not_validation() {
        let e: FlipbookError = StoreError::Unavailable("disk I/O error".into()).into();
        assert!(matches!(e, FlipbookError::StorageUnavailable(_)));
        assert!(!e.is_validation());
    }

    #[test]
    fn other_store_errors_become_internal() {
        let e: FlipbookError = StoreError::Corrupt("bad status".into()).into();
        assert!(matches!(e, FlipbookError::Internal(_)));
    }

    #[test]
    fn invalid_transition_display() {
        let id = Uuid::new_v4();
        let e = StoreError::InvalidTransition {
            id,
            from: DocumentStatus::Ready,
        };
        let msg = e.to_string();
        assert!(msg.contains(&id.to_string()));
        assert!(msg.contains("ready"));
    }

    #[test]
    fn render_error_display() {
        let e = ConversionError::Render {
            page: 3,
            detail: "bad xref".into(),
        };
        assert!(e.to_string().contains("Page 3"));
        assert!(e.to_string().contains("bad xref"));
    }
}
