//! Shared fixtures for the integration tests: fake rasterizers, fake PDFs and
//! a `Flipbooks` wired to a temporary storage root.

#![allow(dead_code)]

use image::{DynamicImage, Rgb, RgbImage};
use openflip::{
    Canvas, ConversionOutcome, Document, DocumentStore, Flipbooks, MemoryStore, PageFormat,
    PageLink, PipelineConfig, PipelineConfigBuilder, RasterError, Rasterizer, StorageLayout,
    StoreError,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Small canvas so the tests stay fast.
pub const CANVAS: Canvas = Canvas::new(120, 160);

/// Size of the fake page bitmaps: landscape, so fitting letterboxes them.
pub const SOURCE_SIZE: (u32, u32) = (200, 100);

/// Bytes that pass the upload checks and tell [`FakeRasterizer`] how many
/// pages to report.
pub fn fake_pdf(pages: usize) -> Vec<u8> {
    format!("%PDF-1.4\n% pages={pages}\n%%EOF\n").into_bytes()
}

/// Colour of page `index` in fake renders.
pub fn page_colour(index: usize) -> Rgb<u8> {
    Rgb([(index * 37 % 200) as u8 + 20, 90, 160])
}

fn parse_pages(pdf: &[u8]) -> Result<usize, RasterError> {
    let text = String::from_utf8_lossy(pdf);
    text.split("pages=")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| RasterError::InvalidDocument("no page table".into()))
}

fn solid_page(index: usize) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(
        SOURCE_SIZE.0,
        SOURCE_SIZE.1,
        page_colour(index),
    ))
}

/// Renders solid-colour pages, with optional failure, delay and gating.
#[derive(Default)]
pub struct FakeRasterizer {
    /// 0-based page index that fails to render.
    pub fail_on: Option<usize>,
    /// Sleep `(total - index) * delay` so later pages finish first.
    pub reverse_delay: Option<Duration>,
    /// Sleep this long in every render.
    pub fixed_delay: Option<Duration>,
    /// When set, renders block until [`Gate::open`].
    pub gate: Option<Arc<Gate>>,
    /// Sleep this long when rendering this 0-based page only.
    pub slow_page: Option<(usize, Duration)>,
    /// 0-based pages that carry one link, see [`link_for`].
    pub linked_pages: Vec<usize>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub renders: AtomicUsize,
}

impl FakeRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(index: usize) -> Self {
        Self {
            fail_on: Some(index),
            ..Self::default()
        }
    }

    pub fn reverse_order(delay: Duration) -> Self {
        Self {
            reverse_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            fixed_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Page `fail_on` errors at once while page `slow` takes `delay`.
    pub fn failing_while_slow(fail_on: usize, slow: usize, delay: Duration) -> Self {
        Self {
            fail_on: Some(fail_on),
            slow_page: Some((slow, delay)),
            ..Self::default()
        }
    }

    pub fn with_links_on(pages: &[usize]) -> Self {
        Self {
            linked_pages: pages.to_vec(),
            ..Self::default()
        }
    }

    pub fn gated(gate: Arc<Gate>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }
}

impl Rasterizer for FakeRasterizer {
    fn page_count(&self, pdf: &[u8]) -> Result<usize, RasterError> {
        parse_pages(pdf)
    }

    fn render_page(
        &self,
        pdf: &[u8],
        index: usize,
        _canvas: Canvas,
    ) -> Result<DynamicImage, RasterError> {
        let total = parse_pages(pdf)?;
        if index >= total {
            return Err(RasterError::PageOutOfRange {
                page: index + 1,
                total,
            });
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.wait();
        }
        if let Some(delay) = self.reverse_delay {
            std::thread::sleep(delay * (total - index) as u32);
        }
        if let Some(delay) = self.fixed_delay {
            std::thread::sleep(delay);
        }
        if let Some((slow, delay)) = self.slow_page {
            if slow == index {
                std::thread::sleep(delay);
            }
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.renders.fetch_add(1, Ordering::SeqCst);

        if self.fail_on == Some(index) {
            return Err(RasterError::Render {
                page: index + 1,
                detail: "corrupt content stream".into(),
            });
        }
        Ok(solid_page(index))
    }

    fn page_links(
        &self,
        _pdf: &[u8],
        index: usize,
        _canvas: Canvas,
    ) -> Result<Vec<PageLink>, RasterError> {
        if self.linked_pages.contains(&index) {
            Ok(vec![link_for(index)])
        } else {
            Ok(Vec::new())
        }
    }
}

/// The link [`FakeRasterizer`] reports on a linked page.
pub fn link_for(index: usize) -> PageLink {
    PageLink {
        page: index + 1,
        url: format!("https://example.com/page/{}", index + 1),
        x: 10.0,
        y: 20.0,
        width: 30.0,
        height: 8.5,
    }
}

/// A latch that blocks renders until opened.
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) {
        let mut open = self.open.lock().unwrap();
        *open = true;
        self.cv.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cv.wait(open).unwrap();
        }
    }
}

/// A memory store whose `create` always fails, as if the backend were down.
pub struct FailingCreateStore(pub Arc<MemoryStore>);

impl DocumentStore for FailingCreateStore {
    fn create(&self, _title: &str, _original_filename: &str) -> Result<Document, StoreError> {
        Err(StoreError::Unavailable("database is locked".into()))
    }

    fn get(&self, id: uuid::Uuid) -> Result<Option<Document>, StoreError> {
        self.0.get(id)
    }

    fn list(&self) -> Result<Vec<Document>, StoreError> {
        self.0.list()
    }

    fn update(&self, id: uuid::Uuid, outcome: &ConversionOutcome) -> Result<Document, StoreError> {
        self.0.update(id, outcome)
    }

    fn delete(&self, id: uuid::Uuid) -> Result<bool, StoreError> {
        self.0.delete(id)
    }
}

/// A memory store whose first `update` fails with `Unavailable`.
pub struct FlakyUpdateStore {
    pub inner: Arc<MemoryStore>,
    tripped: AtomicBool,
}

impl FlakyUpdateStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            tripped: AtomicBool::new(false),
        }
    }
}

impl DocumentStore for FlakyUpdateStore {
    fn create(&self, title: &str, original_filename: &str) -> Result<Document, StoreError> {
        self.inner.create(title, original_filename)
    }

    fn get(&self, id: uuid::Uuid) -> Result<Option<Document>, StoreError> {
        self.inner.get(id)
    }

    fn list(&self) -> Result<Vec<Document>, StoreError> {
        self.inner.list()
    }

    fn update(&self, id: uuid::Uuid, outcome: &ConversionOutcome) -> Result<Document, StoreError> {
        if !self.tripped.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        self.inner.update(id, outcome)
    }

    fn delete(&self, id: uuid::Uuid) -> Result<bool, StoreError> {
        self.inner.delete(id)
    }
}

/// A `Flipbooks` over a temp dir and a memory store.
pub struct Harness {
    pub flipbooks: Flipbooks,
    pub store: Arc<MemoryStore>,
    pub layout: StorageLayout,
    pub rasterizer: Arc<FakeRasterizer>,
    _tmp: TempDir,
}

/// Test defaults: small canvas, PNG pages, two workers.
pub fn test_config() -> PipelineConfigBuilder {
    PipelineConfig::builder()
        .canvas(CANVAS)
        .page_format(PageFormat::Png)
        .render_workers(2)
}

pub async fn harness() -> Harness {
    harness_with(FakeRasterizer::new(), test_config()).await
}

pub async fn harness_with(rasterizer: FakeRasterizer, config: PipelineConfigBuilder) -> Harness {
    harness_wrapping(rasterizer, config, |store| store as Arc<dyn DocumentStore>).await
}

/// Like [`harness_with`], but the pipeline sees the memory store through
/// `wrap`. `Harness::store` stays the unwrapped store.
pub async fn harness_wrapping<W>(
    rasterizer: FakeRasterizer,
    config: PipelineConfigBuilder,
    wrap: W,
) -> Harness
where
    W: FnOnce(Arc<MemoryStore>) -> Arc<dyn DocumentStore>,
{
    let tmp = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(tmp.path().join("storage"));
    layout.ensure_dirs().await.unwrap();

    let store = Arc::new(MemoryStore::new());
    let rasterizer = Arc::new(rasterizer);
    let flipbooks = Flipbooks::new(
        wrap(store.clone()),
        rasterizer.clone() as Arc<dyn Rasterizer>,
        layout.clone(),
        config.build().unwrap(),
    );
    Harness {
        flipbooks,
        store,
        layout,
        rasterizer,
        _tmp: tmp,
    }
}

/// Poll `check` every 10 ms for up to five seconds.
pub async fn eventually<F>(mut check: F, what: &str)
where
    F: FnMut() -> bool,
{
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Poll the document until it leaves `pending`.
pub async fn wait_until_done(flipbooks: &Flipbooks, id: uuid::Uuid) -> openflip::Document {
    for _ in 0..500 {
        let doc = flipbooks.get_document(id).await.unwrap().unwrap();
        if doc.status.is_terminal() {
            return doc;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("document {id} never finished converting");
}
