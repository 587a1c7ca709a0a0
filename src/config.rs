//! Configuration types for the conversion pipeline.
//!
//! Every conversion knob lives in [`PipelineConfig`], built through its
//! [`PipelineConfigBuilder`]. The binary maps its command-line flags and
//! environment variables onto the builder once at startup; the library never
//! reads the environment itself.

use crate::error::FlipbookError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::str::FromStr;

/// Default upload ceiling: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

/// Configuration for the PDF → flipbook pipeline.
///
/// # Example
/// ```rust
/// use openflip::{Canvas, PageFormat, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .canvas(Canvas::new(1000, 1414))
///     .page_format(PageFormat::Jpeg)
///     .render_workers(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.page_format.extension(), "jpg");
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Largest accepted upload in bytes. Default: 50 MiB.
    pub max_file_size: usize,

    /// Size every page image is letterboxed into. Default: 1240 × 1754
    /// (A4 at 150 DPI).
    ///
    /// All pages of all documents share this size so the reader can lay out
    /// spreads without measuring each image.
    pub canvas: Canvas,

    /// Output image format. Default: [`PageFormat::Webp`].
    pub page_format: PageFormat,

    /// JPEG quality (1-100), used only with [`PageFormat::Jpeg`]. Default: 85.
    pub jpeg_quality: u8,

    /// Pages rendered at once, across every conversion in the process.
    /// Default: 4.
    pub render_workers: usize,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            canvas: Canvas::default(),
            page_format: PageFormat::default(),
            jpeg_quality: 85,
            render_workers: 4,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("max_file_size", &self.max_file_size)
            .field("canvas", &self.canvas)
            .field("page_format", &self.page_format)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("render_workers", &self.render_workers)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn max_file_size(mut self, bytes: usize) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn canvas(mut self, canvas: Canvas) -> Self {
        self.config.canvas = canvas;
        self
    }

    pub fn page_format(mut self, format: PageFormat) -> Self {
        self.config.page_format = format;
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn render_workers(mut self, n: usize) -> Self {
        self.config.render_workers = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, FlipbookError> {
        let c = &self.config;
        if c.max_file_size == 0 {
            return Err(FlipbookError::Internal(
                "Invalid configuration: max_file_size must be ≥ 1 byte".into(),
            ));
        }
        if c.canvas.width < Canvas::MIN_SIDE || c.canvas.height < Canvas::MIN_SIDE {
            return Err(FlipbookError::Internal(format!(
                "Invalid configuration: canvas must be at least {min}×{min}, got {}×{}",
                c.canvas.width,
                c.canvas.height,
                min = Canvas::MIN_SIDE,
            )));
        }
        if c.canvas.width > Canvas::MAX_SIDE || c.canvas.height > Canvas::MAX_SIDE {
            return Err(FlipbookError::Internal(format!(
                "Invalid configuration: canvas sides are capped at {}, got {}×{}",
                Canvas::MAX_SIDE,
                c.canvas.width,
                c.canvas.height,
            )));
        }
        Ok(self.config)
    }
}

// ── Value types ──────────────────────────────────────────────────────────

/// Fixed output size of every page image, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub const MIN_SIDE: u32 = 100;
    pub const MAX_SIDE: u32 = 8000;

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Largest size with the source's aspect ratio that fits inside the canvas.
    ///
    /// Both sides are at least 1 px.
    pub fn fit(&self, src_width: u32, src_height: u32) -> (u32, u32) {
        if src_width == 0 || src_height == 0 {
            return (self.width, self.height);
        }
        let scale = f64::min(
            self.width as f64 / src_width as f64,
            self.height as f64 / src_height as f64,
        );
        let w = ((src_width as f64 * scale).round() as u32).clamp(1, self.width);
        let h = ((src_height as f64 * scale).round() as u32).clamp(1, self.height);
        (w, h)
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(1240, 1754)
    }
}

/// Encoding of generated page images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageFormat {
    /// Lossless WebP. (default)
    #[default]
    Webp,
    Png,
    /// Lossy JPEG at `jpeg_quality`.
    Jpeg,
}

impl PageFormat {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            PageFormat::Webp => "webp",
            PageFormat::Png => "png",
            PageFormat::Jpeg => "jpg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            PageFormat::Webp => "image/webp",
            PageFormat::Png => "image/png",
            PageFormat::Jpeg => "image/jpeg",
        }
    }

    /// Guess the format from a stored file name.
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
        ext.parse().ok()
    }
}

impl FromStr for PageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webp" => Ok(PageFormat::Webp),
            "png" => Ok(PageFormat::Png),
            "jpg" | "jpeg" => Ok(PageFormat::Jpeg),
            other => Err(format!("unknown page format '{other}' (webp, png, jpeg)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::builder().build().unwrap();
        assert_eq!(config.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert_eq!(config.canvas, Canvas::new(1240, 1754));
        assert_eq!(config.page_format, PageFormat::Webp);
        assert_eq!(config.render_workers, 4);
    }

    #[test]
    fn builder_clamps_workers_and_quality() {
        let config = PipelineConfig::builder()
            .render_workers(0)
            .jpeg_quality(0)
            .build()
            .unwrap();
        assert_eq!(config.render_workers, 1);
        assert_eq!(config.jpeg_quality, 1);
    }

    #[test]
    fn builder_rejects_tiny_canvas() {
        let err = PipelineConfig::builder()
            .canvas(Canvas::new(10, 1754))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("canvas"), "got: {err}");
    }

    #[test]
    fn fit_landscape_into_portrait() {
        // US Letter landscape (792 × 612 pt) into the default A4 canvas.
        let (w, h) = Canvas::default().fit(792, 612);
        assert_eq!(w, 1240);
        assert_eq!(h, 958);
    }

    #[test]
    fn fit_upscales_small_pages() {
        let (w, h) = Canvas::new(200, 400).fit(50, 50);
        assert_eq!((w, h), (200, 200));
    }

    #[test]
    fn page_format_parsing() {
        assert_eq!("JPEG".parse::<PageFormat>(), Ok(PageFormat::Jpeg));
        assert_eq!("jpg".parse::<PageFormat>(), Ok(PageFormat::Jpeg));
        assert_eq!(PageFormat::from_path("pages/x/0001.webp"), Some(PageFormat::Webp));
        assert_eq!(PageFormat::from_path("noext"), None);
        assert!("gif".parse::<PageFormat>().is_err());
    }
}
