//! The conversion pipeline: uploaded PDF → stored page images.
//!
//! [`Flipbooks`] owns the collaborators (store, rasterizer, storage layout,
//! config) and exposes the operations the HTTP layer and CLI call.
//!
//! ## Request path vs. background path
//!
//! [`Flipbooks::upload`] does only the cheap, synchronous part: validation,
//! a page count from the rasterizer, and a `pending` record. Everything
//! after that (persisting the PDF, rendering, encoding, writing pages, the
//! final status flip) runs in a spawned task. [`Flipbooks::ingest`] runs the
//! same steps but awaits the result, which is what the CLI and tests want.
//!
//! ## Failure model
//!
//! Once the record exists, nothing escapes as an `Err`: any
//! [`ConversionError`] is written to the record as `status = failed`. Pages
//! already written stay on disk for diagnosis and go away with the document
//! on delete. After the first page error no new page starts, and the pages
//! already rendering are waited for before the outcome is recorded, so
//! nothing writes into a document's directory once its status is terminal.

use crate::config::PipelineConfig;
use crate::document::{ConversionOutcome, Document, PageLink};
use crate::error::{ConversionError, FlipbookError, RasterError, StoreError};
use crate::layout::{page_file_name, write_atomic, StorageLayout};
use crate::pipeline::render::{fit_to_canvas, Rasterizer};
use crate::pipeline::{encode, input};
use crate::store::DocumentStore;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Reason recorded on documents whose conversion died with the process.
pub const INTERRUPTED_REASON: &str = "conversion interrupted";

/// The flipbook service. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Flipbooks {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn DocumentStore>,
    rasterizer: Arc<dyn Rasterizer>,
    layout: StorageLayout,
    config: PipelineConfig,
    /// Bounds page renders across every conversion in flight.
    render_permits: Arc<Semaphore>,
}

/// Output of a fully rendered document.
struct RenderedPages {
    references: Vec<String>,
    links: Vec<PageLink>,
}

/// One page on disk.
struct WrittenPage {
    reference: String,
    bytes: usize,
    links: Vec<PageLink>,
}

/// A validated upload, ready to be converted.
struct Accepted {
    doc: Document,
    pdf: Arc<[u8]>,
    total_pages: usize,
}

impl Flipbooks {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        rasterizer: Arc<dyn Rasterizer>,
        layout: StorageLayout,
        config: PipelineConfig,
    ) -> Self {
        let render_permits = Arc::new(Semaphore::new(config.render_workers.max(1)));
        Self {
            inner: Arc::new(Inner {
                store,
                rasterizer,
                layout,
                config,
                render_permits,
            }),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.inner.layout
    }

    /// Accept an upload and convert it in the background.
    ///
    /// Returns the `pending` record as soon as it exists. Validation
    /// failures return `Err` and leave nothing behind.
    pub async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        title: Option<&str>,
    ) -> Result<Document, FlipbookError> {
        let accepted = self.accept(bytes, filename, title).await?;
        let doc = accepted.doc.clone();

        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.convert(accepted).await {
                error!(error = %e, "Background conversion could not record its result");
            }
        });
        Ok(doc)
    }

    /// Accept an upload and wait for its conversion to finish.
    ///
    /// Returns the record in its terminal state, `ready` or `failed`.
    pub async fn ingest(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        title: Option<&str>,
    ) -> Result<Document, FlipbookError> {
        let accepted = self.accept(bytes, filename, title).await?;
        self.convert(accepted).await
    }

    pub async fn get_document(&self, id: Uuid) -> Result<Option<Document>, FlipbookError> {
        Ok(self.with_store(move |s| s.get(id)).await?)
    }

    /// All documents, newest first.
    pub async fn list_documents(&self) -> Result<Vec<Document>, FlipbookError> {
        Ok(self.with_store(|s| s.list()).await?)
    }

    /// Remove a document's files, then its record.
    ///
    /// Returns whether a record existed. Safe to repeat.
    pub async fn delete_document(&self, id: Uuid) -> Result<bool, FlipbookError> {
        self.inner
            .layout
            .remove_document_files(id)
            .await
            .map_err(|e| FlipbookError::Internal(format!("removing files of {id}: {e}")))?;
        let existed = self.with_store(move |s| s.delete(id)).await?;
        if existed {
            info!(%id, "Document deleted");
        } else {
            debug!(%id, "Delete of unknown document");
        }
        Ok(existed)
    }

    /// Mark documents left `pending` by a previous process as failed.
    ///
    /// Call once at startup, before accepting uploads. Returns how many
    /// records were changed.
    pub async fn recover_interrupted(&self) -> Result<usize, FlipbookError> {
        let pending = self.with_store(|s| s.pending()).await?;
        let mut recovered = 0;
        for doc in pending {
            let id = doc.id;
            let outcome = ConversionOutcome::Failed {
                reason: INTERRUPTED_REASON.to_string(),
            };
            match self.with_store(move |s| s.update(id, &outcome)).await {
                Ok(_) => {
                    warn!(%id, title = %doc.title, "Marked interrupted conversion as failed");
                    recovered += 1;
                }
                // Finished or deleted since we listed it.
                Err(StoreError::InvalidTransition { .. } | StoreError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(recovered)
    }

    // ── Request path ─────────────────────────────────────────────────────

    async fn accept(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        title: Option<&str>,
    ) -> Result<Accepted, FlipbookError> {
        input::validate_upload(&bytes, self.inner.config.max_file_size)?;

        let pdf: Arc<[u8]> = Arc::from(bytes);
        let total_pages = {
            let rasterizer = Arc::clone(&self.inner.rasterizer);
            let pdf = Arc::clone(&pdf);
            tokio::task::spawn_blocking(move || rasterizer.page_count(&pdf))
                .await
                .map_err(|e| FlipbookError::Internal(format!("page count task failed: {e}")))?
        };
        let total_pages = match total_pages {
            Ok(0) => return Err(FlipbookError::EmptyDocument),
            Ok(n) => n,
            Err(RasterError::InvalidDocument(detail)) => {
                return Err(FlipbookError::NotAPdf { detail })
            }
            Err(e) => return Err(FlipbookError::Internal(e.to_string())),
        };

        let original_filename = input::display_filename(filename);
        let title = input::derive_title(title, &original_filename);
        let doc = self
            .with_store(move |s| s.create(&title, &original_filename))
            .await?;
        info!(
            id = %doc.id,
            title = %doc.title,
            pages = total_pages,
            bytes = pdf.len(),
            "Upload accepted"
        );
        Ok(Accepted {
            doc,
            pdf,
            total_pages,
        })
    }

    // ── Background path ──────────────────────────────────────────────────

    /// Run the conversion and record its outcome.
    ///
    /// `Err` only when the outcome itself could not be recorded.
    async fn convert(&self, accepted: Accepted) -> Result<Document, FlipbookError> {
        let Accepted {
            doc,
            pdf,
            total_pages,
        } = accepted;
        let id = doc.id;
        let start = Instant::now();

        let outcome = match self.render_document(id, pdf, total_pages).await {
            Ok(RenderedPages { references, links }) => ConversionOutcome::Ready {
                page_count: references.len(),
                page_image_paths: references,
                links,
            },
            Err(e) => {
                warn!(%id, error = %e, "Conversion failed");
                ConversionOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        let recorded = {
            let outcome = outcome.clone();
            self.with_store(move |s| s.update(id, &outcome)).await
        };
        match recorded {
            Ok(doc) => {
                info!(
                    %id,
                    status = %doc.status,
                    pages = doc.page_count.unwrap_or(0),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Conversion finished"
                );
                Ok(doc)
            }
            Err(StoreError::NotFound(_)) => {
                // Deleted while we were working; don't leave orphans behind.
                info!(%id, "Document deleted during conversion; removing its files");
                if let Err(e) = self.inner.layout.remove_document_files(id).await {
                    warn!(%id, error = %e, "Failed to remove files of deleted document");
                }
                Err(FlipbookError::Internal(format!(
                    "document {id} was deleted during conversion"
                )))
            }
            Err(e) => {
                error!(%id, error = %e, status = %outcome.status(), "Failed to record conversion result");
                self.record_failure_after(id, &e).await;
                Err(e.into())
            }
        }
    }

    /// One attempt to leave the record `failed` after the real outcome could
    /// not be written, so it does not stay `pending` until the next restart.
    async fn record_failure_after(&self, id: Uuid, cause: &StoreError) {
        let outcome = ConversionOutcome::Failed {
            reason: format!("could not record conversion result: {cause}"),
        };
        match self.with_store(move |s| s.update(id, &outcome)).await {
            Ok(_) => warn!(%id, "Recorded conversion as failed after store error"),
            Err(e) => error!(%id, error = %e, "Document left pending"),
        }
    }

    /// Persist the original, then render, encode and write every page.
    ///
    /// Returns page references in page order and the links of all pages.
    async fn render_document(
        &self,
        id: Uuid,
        pdf: Arc<[u8]>,
        total_pages: usize,
    ) -> Result<RenderedPages, ConversionError> {
        let layout = &self.inner.layout;
        let config = &self.inner.config;
        let progress = config.progress_callback.clone();

        let upload_path = layout.upload_path(id);
        {
            let pdf = Arc::clone(&pdf);
            let path = upload_path.clone();
            tokio::task::spawn_blocking(move || write_atomic(&path, &pdf))
                .await
                .map_err(|e| ConversionError::TaskPanicked(e.to_string()))?
                .map_err(|source| ConversionError::UploadWrite {
                    path: upload_path,
                    source,
                })?;
        }

        if let Some(cb) = &progress {
            cb.on_conversion_start(total_pages);
        }

        let abort = Arc::new(AtomicBool::new(false));
        let mut pages = stream::iter(0..total_pages)
            .map(|index| {
                self.render_one_page(id, Arc::clone(&pdf), index, total_pages, Arc::clone(&abort))
            })
            .buffer_unordered(config.render_workers.max(1));

        let mut slots: Vec<Option<String>> = vec![None; total_pages];
        let mut page_links: Vec<Vec<PageLink>> = vec![Vec::new(); total_pages];
        let mut written = 0;
        let mut failure: Option<ConversionError> = None;
        // Drain fully: a page already on the blocking pool still writes.
        while let Some((index, result)) = pages.next().await {
            match result {
                Ok(Some(page)) => {
                    if let Some(cb) = &progress {
                        cb.on_page_complete(index + 1, total_pages, page.bytes);
                    }
                    slots[index] = Some(page.reference);
                    page_links[index] = page.links;
                    written += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    if let Some(cb) = &progress {
                        cb.on_page_error(index + 1, total_pages, &e.to_string());
                    }
                    abort.store(true, Ordering::SeqCst);
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
            }
        }

        if let Some(cb) = &progress {
            cb.on_conversion_complete(total_pages, written);
        }
        if let Some(e) = failure {
            return Err(e);
        }

        let references = slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.ok_or_else(|| ConversionError::Render {
                    page: i + 1,
                    detail: "page produced no output".into(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RenderedPages {
            references,
            links: page_links.into_iter().flatten().collect(),
        })
    }

    /// Render one page on the blocking pool, holding a render permit.
    ///
    /// Resolves to `(index, Ok(None))` when `abort` was raised before the
    /// page started.
    async fn render_one_page(
        &self,
        id: Uuid,
        pdf: Arc<[u8]>,
        index: usize,
        total_pages: usize,
        abort: Arc<AtomicBool>,
    ) -> (usize, Result<Option<WrittenPage>, ConversionError>) {
        let page = index + 1;
        if abort.load(Ordering::SeqCst) {
            return (index, Ok(None));
        }
        let permit = match Arc::clone(&self.inner.render_permits).acquire_owned().await {
            Ok(p) => p,
            Err(e) => return (index, Err(ConversionError::TaskPanicked(e.to_string()))),
        };

        let rasterizer = Arc::clone(&self.inner.rasterizer);
        let config = self.inner.config.clone();
        let layout = self.inner.layout.clone();
        let task = tokio::task::spawn_blocking(move || -> Result<Option<WrittenPage>, ConversionError> {
            let _permit = permit;
            if abort.load(Ordering::SeqCst) {
                return Ok(None);
            }
            if let Some(cb) = &config.progress_callback {
                cb.on_page_start(page, total_pages);
            }

            let canvas = config.canvas;
            let mut image = rasterizer
                .render_page(&pdf, index, canvas)
                .map_err(|e| ConversionError::Render {
                    page,
                    detail: e.to_string(),
                })?;
            if (image.width(), image.height()) != (canvas.width, canvas.height) {
                image = fit_to_canvas(&image, canvas);
            }

            let bytes = encode::encode_page(&image, config.page_format, config.jpeg_quality)
                .map_err(|e| ConversionError::Encode {
                    page,
                    detail: e.to_string(),
                })?;

            let reference = layout.page_reference(id, page, total_pages, config.page_format);
            let path = layout
                .document_pages_dir(id)
                .join(page_file_name(page, total_pages, config.page_format));
            write_atomic(&path, &bytes).map_err(|source| ConversionError::PageWrite {
                page,
                path: path.clone(),
                source,
            })?;
            debug!(%id, page, bytes = bytes.len(), "Page written");

            let links = rasterizer
                .page_links(&pdf, index, canvas)
                .unwrap_or_else(|e| {
                    warn!(%id, page, error = %e, "Skipping links of page");
                    Vec::new()
                });
            Ok(Some(WrittenPage {
                reference,
                bytes: bytes.len(),
                links,
            }))
        });

        let result = match task.await {
            Ok(r) => r,
            Err(e) => Err(ConversionError::TaskPanicked(e.to_string())),
        };
        (index, result)
    }

    /// Run a store call on the blocking pool.
    async fn with_store<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn DocumentStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.inner.store);
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
    }
}
