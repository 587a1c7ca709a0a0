//! PDF rasterisation: one page at a time, fitted to the shared canvas.
//!
//! ## Why a trait?
//!
//! The pipeline only needs "how many pages" and "give me page N as an
//! image". Putting that behind [`Rasterizer`] keeps pdfium out of every test
//! but the end-to-end one; the rest of the suite injects fakes.
//!
//! ## Why load pdfium per call?
//!
//! The upstream `Pdfium` handle is not `Send`, so it cannot live inside an
//! `Arc` shared with the blocking pool. Loading it per operation is cheap
//! because the OS caches the `dlopen`. Pdfium itself is single-threaded, so
//! [`PdfiumRasterizer`] holds a lock for the duration of each call; the
//! letterboxing and encoding that follow still run in parallel.

use crate::config::Canvas;
use crate::document::PageLink;
use crate::error::RasterError;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// Source of page images for the conversion pipeline.
///
/// Implementations are called from `spawn_blocking` threads, possibly for
/// several pages of the same document at once.
pub trait Rasterizer: Send + Sync {
    /// Number of pages, or [`RasterError::InvalidDocument`] if the bytes do
    /// not open as a PDF.
    fn page_count(&self, pdf: &[u8]) -> Result<usize, RasterError>;

    /// Render page `index` (0-based) into an image of exactly the canvas size.
    fn render_page(
        &self,
        pdf: &[u8],
        index: usize,
        canvas: Canvas,
    ) -> Result<DynamicImage, RasterError>;

    /// URI links on page `index` (0-based), placed on the same canvas as
    /// [`Self::render_page`]. Rasterizers that cannot see links report none.
    fn page_links(
        &self,
        pdf: &[u8],
        index: usize,
        canvas: Canvas,
    ) -> Result<Vec<PageLink>, RasterError> {
        let _ = (pdf, index, canvas);
        Ok(Vec::new())
    }

    /// Every page, in order.
    fn render(&self, pdf: &[u8], canvas: Canvas) -> Result<Vec<DynamicImage>, RasterError> {
        let total = self.page_count(pdf)?;
        (0..total)
            .map(|i| self.render_page(pdf, i, canvas))
            .collect()
    }
}

/// Scale `img` to fit inside `canvas`, keeping its aspect ratio, and centre
/// it on a white background. The result is always exactly canvas-sized.
pub fn fit_to_canvas(img: &DynamicImage, canvas: Canvas) -> DynamicImage {
    let (w, h) = canvas.fit(img.width(), img.height());
    let scaled = if (w, h) == (img.width(), img.height()) {
        img.to_rgb8()
    } else {
        img.resize_exact(w, h, FilterType::Lanczos3).to_rgb8()
    };

    let mut out = RgbImage::from_pixel(canvas.width, canvas.height, Rgb([255, 255, 255]));
    let x = (canvas.width - w) / 2;
    let y = (canvas.height - h) / 2;
    imageops::overlay(&mut out, &scaled, x as i64, y as i64);
    DynamicImage::ImageRgb8(out)
}

/// Map a link rectangle onto the canvas produced by [`fit_to_canvas`].
///
/// `rect` is `[left, bottom, right, top]` in PDF points with a bottom-left
/// origin; `page_size` is the page's width and height in points. The result
/// uses image pixels with a top-left origin, rounded to 0.01 px.
pub fn place_link(
    page: usize,
    url: String,
    rect: [f32; 4],
    page_size: (f32, f32),
    canvas: Canvas,
) -> PageLink {
    let (pw, ph) = (page_size.0.max(1.0), page_size.1.max(1.0));
    let (w, h) = canvas.fit(pw.round() as u32, ph.round() as u32);
    let sx = w as f32 / pw;
    let sy = h as f32 / ph;
    let ox = ((canvas.width - w) / 2) as f32;
    let oy = ((canvas.height - h) / 2) as f32;

    let (left, right) = (rect[0].min(rect[2]), rect[0].max(rect[2]));
    let (bottom, top) = (rect[1].min(rect[3]), rect[1].max(rect[3]));
    let round = |v: f32| (v * 100.0).round() / 100.0;
    PageLink {
        page,
        url,
        x: round(ox + left * sx),
        y: round(oy + (ph - top) * sy),
        width: round((right - left) * sx),
        height: round((top - bottom) * sy),
    }
}

/// [`Rasterizer`] backed by the pdfium library.
pub struct PdfiumRasterizer {
    lib_path: Option<PathBuf>,
    lock: Mutex<()>,
}

impl PdfiumRasterizer {
    /// Create a rasterizer and check that pdfium can be loaded.
    ///
    /// `lib_path` may name the library file or the directory holding it.
    /// Without it, the directory of the running executable is tried, then
    /// the system library search path.
    pub fn new(lib_path: Option<PathBuf>) -> Result<Self, RasterError> {
        let rasterizer = Self::deferred(lib_path);
        let _ = rasterizer.load()?;
        info!("pdfium library bound");
        Ok(rasterizer)
    }

    /// Like [`Self::new`] but without the up-front check; binding errors
    /// surface on first use. For commands that may never render.
    pub fn deferred(lib_path: Option<PathBuf>) -> Self {
        Self {
            lib_path,
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Pdfium, RasterError> {
        if let Some(path) = &self.lib_path {
            let file = if path.is_dir() {
                library_in(path)
            } else {
                path.to_string_lossy().into_owned()
            };
            debug!(path = %file, "Loading pdfium from configured path");
            let bindings = Pdfium::bind_to_library(&file)
                .map_err(|e| RasterError::Binding(format!("{file}: {e:?}")))?;
            return Ok(Pdfium::new(bindings));
        }

        if let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            let file = library_in(&exe_dir);
            if let Ok(bindings) = Pdfium::bind_to_library(&file) {
                debug!(dir = %exe_dir.display(), "Loaded pdfium next to the executable");
                return Ok(Pdfium::new(bindings));
            }
        }

        let bindings =
            Pdfium::bind_to_system_library().map_err(|e| RasterError::Binding(format!("{e:?}")))?;
        Ok(Pdfium::new(bindings))
    }

    fn with_document<T>(
        &self,
        pdf: &[u8],
        f: impl FnOnce(&PdfDocument<'_>) -> Result<T, RasterError>,
    ) -> Result<T, RasterError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| RasterError::Binding("pdfium lock poisoned".into()))?;
        let pdfium = self.load()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(map_load_error)?;
        f(&document)
    }
}

/// Platform file name of the pdfium library inside `dir`.
fn library_in(dir: &Path) -> String {
    let dir = dir.to_string_lossy().into_owned();
    PathBuf::from(Pdfium::pdfium_platform_library_name_at_path(&dir))
        .to_string_lossy()
        .into_owned()
}

fn map_load_error(e: PdfiumError) -> RasterError {
    let msg = format!("{e:?}");
    let lower = msg.to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        RasterError::InvalidDocument(format!("password-protected PDFs are not supported ({msg})"))
    } else {
        RasterError::InvalidDocument(msg)
    }
}

fn page_at<'a>(
    document: &PdfDocument<'a>,
    index: usize,
    total: usize,
) -> Result<PdfPage<'a>, RasterError> {
    if index >= total {
        return Err(RasterError::PageOutOfRange {
            page: index + 1,
            total,
        });
    }
    document
        .pages()
        .get(index as u16)
        .map_err(|e| RasterError::Render {
            page: index + 1,
            detail: format!("{e:?}"),
        })
}

fn links_on(page: &PdfPage<'_>, page_num: usize, canvas: Canvas) -> Vec<PageLink> {
    let size = (page.width().value, page.height().value);
    page.links()
        .iter()
        .filter_map(|link| {
            let url = match link.action()? {
                PdfAction::Uri(action) => action.uri().ok()?,
                _ => return None,
            };
            if url.trim().is_empty() {
                return None;
            }
            let rect = link.rect().ok()?;
            Some(place_link(
                page_num,
                url,
                [
                    rect.left().value,
                    rect.bottom().value,
                    rect.right().value,
                    rect.top().value,
                ],
                size,
                canvas,
            ))
        })
        .collect()
}

fn render_one(
    document: &PdfDocument<'_>,
    index: usize,
    total: usize,
    canvas: Canvas,
) -> Result<DynamicImage, RasterError> {
    let page = page_at(document, index, total)?;

    let render_config = PdfRenderConfig::new()
        .set_target_width(canvas.width as i32)
        .set_maximum_height(canvas.height as i32);
    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| RasterError::Render {
            page: index + 1,
            detail: format!("{e:?}"),
        })?;

    let image = bitmap.as_image();
    debug!(
        page = index + 1,
        width = image.width(),
        height = image.height(),
        "Rendered page"
    );
    Ok(fit_to_canvas(&image, canvas))
}

impl Rasterizer for PdfiumRasterizer {
    fn page_count(&self, pdf: &[u8]) -> Result<usize, RasterError> {
        self.with_document(pdf, |doc| Ok(doc.pages().len() as usize))
    }

    fn render_page(
        &self,
        pdf: &[u8],
        index: usize,
        canvas: Canvas,
    ) -> Result<DynamicImage, RasterError> {
        self.with_document(pdf, |doc| {
            let total = doc.pages().len() as usize;
            render_one(doc, index, total, canvas)
        })
    }

    fn page_links(
        &self,
        pdf: &[u8],
        index: usize,
        canvas: Canvas,
    ) -> Result<Vec<PageLink>, RasterError> {
        self.with_document(pdf, |doc| {
            let total = doc.pages().len() as usize;
            let page = page_at(doc, index, total)?;
            let links = links_on(&page, index + 1, canvas);
            debug!(page = index + 1, links = links.len(), "Extracted links");
            Ok(links)
        })
    }

    fn render(&self, pdf: &[u8], canvas: Canvas) -> Result<Vec<DynamicImage>, RasterError> {
        self.with_document(pdf, |doc| {
            let total = doc.pages().len() as usize;
            (0..total)
                .map(|i| render_one(doc, i, total, canvas))
                .collect()
        })
    }
}
