//! # openflip
//!
//! Turn uploaded PDFs into flipbooks: one fixed-size image per page, plus a
//! small HTTP service and static pages to upload, browse and read them.
//!
//! ## Why images?
//!
//! A flipbook reader needs every page at the same size and ready to paint,
//! on any browser, without shipping a PDF engine to the client. So each page
//! is rasterised once on the server with pdfium, letterboxed into a shared
//! canvas, and stored as WebP (or PNG / JPEG).
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Validate  size, %PDF magic, page count        (request path)
//!  ├─ 2. Register  pending record in the store         (request path)
//!  ├─ 3. Persist   storage/uploads/{id}.pdf            (background)
//!  ├─ 4. Render    page → canvas, parallel, bounded    (background)
//!  ├─ 5. Write     storage/pages/{id}/0001.webp …      (background)
//!  └─ 6. Finalize  pending → ready | failed            (background)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use openflip::{open_store, Flipbooks, PdfiumRasterizer, PipelineConfig, StorageLayout};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = open_store("sqlite://storage/openflip.db")?;
//!     let rasterizer = Arc::new(PdfiumRasterizer::new(None)?);
//!     let flipbooks = Flipbooks::new(
//!         store,
//!         rasterizer,
//!         StorageLayout::new("storage"),
//!         PipelineConfig::default(),
//!     );
//!
//!     let bytes = std::fs::read("report.pdf")?;
//!     let doc = flipbooks.ingest(bytes, "report.pdf", None).await?;
//!     println!("{} → {:?} ({} pages)", doc.title, doc.status, doc.page_count.unwrap_or(0));
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `openflip` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! openflip = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod api;
pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod layout;
pub mod pipeline;
pub mod progress;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{Canvas, PageFormat, PipelineConfig, PipelineConfigBuilder};
pub use convert::Flipbooks;
pub use document::{ConversionOutcome, Document, DocumentStatus, PageLink};
pub use error::{ConversionError, FlipbookError, RasterError, StoreError};
pub use layout::StorageLayout;
pub use pipeline::render::{PdfiumRasterizer, Rasterizer};
pub use progress::{ConversionProgressCallback, ProgressCallback};
pub use store::{open_store, DocumentStore, MemoryStore, SqliteStore};
