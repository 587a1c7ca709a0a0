//! CLI binary for openflip.
//!
//! A thin shim over the library crate: maps flags and environment variables
//! to `PipelineConfig`, wires the store and rasterizer, and either serves
//! HTTP or runs a one-off command.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use openflip::api::{self, AppState, DocumentView};
use openflip::{
    open_store, Canvas, ConversionProgressCallback, DocumentStatus, Flipbooks, PageFormat,
    PdfiumRasterizer, PipelineConfig, ProgressCallback, Rasterizer, StorageLayout,
};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar for `openflip convert`. Pages finish out of order, so
/// per-page start times are keyed by page number.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} pages  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        self.bar.set_prefix("Rendering");
        self.bar.reset_eta();
    }

    fn on_page_start(&self, page_num: usize, _total_pages: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_num, Instant::now());
        }
    }

    fn on_page_complete(&self, page_num: usize, total_pages: usize, bytes: usize) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            green("✓"),
            page_num,
            total_pages,
            dim(&format!("{:>8} bytes", bytes)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total_pages,
            red(error),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, _total_pages: usize, _success_count: usize) {
        self.bar.finish_and_clear();
    }
}

// ── Arguments ────────────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the web service on :8000
  openflip serve

  # Convert one file and print its record
  openflip convert report.pdf --title "Q3 Report"

  # Newest five documents as JSON
  openflip list --limit 5 --json

  # Remove a document and its images
  openflip delete 2b7c4c1e-8a51-4a3e-9d0a-6f3c1f0a9e11

ENVIRONMENT VARIABLES:
  PORT              HTTP port (default 8000)
  MAX_FILE_SIZE     Upload limit in bytes (default 52428800)
  DATABASE_URL      memory:// | sqlite://<path> (default sqlite://<STORAGE_DIR>/openflip.db)
  STORAGE_DIR       Root for uploads/ and pages/ (default ./storage)
  STATIC_DIR        HTML pages directory (default ./static)
  PDFIUM_LIB_PATH   libpdfium file or the directory holding it
  RENDER_WORKERS    Pages rendered at once (default 4)
  PAGE_WIDTH        Canvas width in px (default 1240)
  PAGE_HEIGHT       Canvas height in px (default 1754)
  PAGE_FORMAT       webp | png | jpeg (default webp)
  JPEG_QUALITY      1-100 (default 85)

A .env file in the working directory is loaded first.
"#;

/// Turn PDFs into page-image flipbooks.
#[derive(Parser, Debug)]
#[command(
    name = "openflip",
    version,
    about = "Turn PDFs into page-image flipbooks",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args, Debug)]
struct Settings {
    /// Root directory for uploads/ and pages/.
    #[arg(long, global = true, env = "STORAGE_DIR", default_value = "storage")]
    storage_dir: PathBuf,

    /// Document store: memory:// or sqlite://<path>.
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Path to libpdfium, or the directory containing it.
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Largest accepted upload, in bytes.
    #[arg(long, global = true, env = "MAX_FILE_SIZE", default_value_t = openflip::config::DEFAULT_MAX_FILE_SIZE)]
    max_file_size: usize,

    /// Pages rendered at once, across all conversions.
    #[arg(long, global = true, env = "RENDER_WORKERS", default_value_t = 4)]
    render_workers: usize,

    /// Canvas width in pixels.
    #[arg(long, global = true, env = "PAGE_WIDTH", default_value_t = 1240)]
    page_width: u32,

    /// Canvas height in pixels.
    #[arg(long, global = true, env = "PAGE_HEIGHT", default_value_t = 1754)]
    page_height: u32,

    /// Page image format: webp, png or jpeg.
    #[arg(long, global = true, env = "PAGE_FORMAT", default_value = "webp")]
    page_format: PageFormat,

    /// JPEG quality (1-100); only used with --page-format jpeg.
    #[arg(long, global = true, env = "JPEG_QUALITY", default_value_t = 85,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "OPENFLIP_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "OPENFLIP_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service (default).
    Serve(ServeArgs),

    /// Convert one PDF and wait for it to finish.
    Convert(ConvertArgs),

    /// List stored documents, newest first.
    List(ListArgs),

    /// Delete a document and its files.
    Delete {
        /// Document id.
        id: Uuid,
    },
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 8000)]
    port: u16,

    /// Directory with index.html, upload.html, gallery.html, reader.html.
    #[arg(long, env = "STATIC_DIR", default_value = "static")]
    static_dir: PathBuf,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// PDF file to convert.
    input: PathBuf,

    /// Title; derived from the file name when omitted.
    #[arg(long)]
    title: Option<String>,

    /// Print the resulting record as JSON.
    #[arg(long)]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "OPENFLIP_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Show at most this many documents.
    #[arg(long)]
    limit: Option<usize>,

    /// Print JSON instead of a table.
    #[arg(long)]
    json: bool,
}

// ── main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let settings = &cli.settings;

    // A progress bar replaces INFO logs during `convert`.
    let show_progress = matches!(
        &cli.command,
        Some(Command::Convert(c)) if !c.no_progress && !c.json && !settings.quiet
    );
    let filter = if settings.verbose {
        "debug"
    } else if settings.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        None => serve(&cli.settings, ServeArgs::parse_env()).await,
        Some(Command::Serve(args)) => serve(&cli.settings, args).await,
        Some(Command::Convert(args)) => convert(&cli.settings, args, show_progress).await,
        Some(Command::List(args)) => list(&cli.settings, args).await,
        Some(Command::Delete { id }) => delete(&cli.settings, id).await,
    }
}

impl ServeArgs {
    /// Defaults for bare `openflip`, still honouring PORT / STATIC_DIR.
    fn parse_env() -> Self {
        #[derive(Parser)]
        struct Only {
            #[command(flatten)]
            serve: ServeArgs,
        }
        Only::parse_from(["openflip"]).serve
    }
}

// ── Wiring ───────────────────────────────────────────────────────────────────

fn pipeline_config(settings: &Settings, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .max_file_size(settings.max_file_size)
        .canvas(Canvas::new(settings.page_width, settings.page_height))
        .page_format(settings.page_format)
        .jpeg_quality(settings.jpeg_quality)
        .render_workers(settings.render_workers);
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

fn database_url(settings: &Settings) -> String {
    settings.database_url.clone().unwrap_or_else(|| {
        format!("sqlite://{}", settings.storage_dir.join("openflip.db").display())
    })
}

/// Build the service. `check_pdfium` binds the library up front so a
/// missing libpdfium is reported at startup rather than on first upload.
async fn flipbooks(
    settings: &Settings,
    progress: Option<ProgressCallback>,
    check_pdfium: bool,
) -> Result<Flipbooks> {
    let layout = StorageLayout::new(&settings.storage_dir);
    layout
        .ensure_dirs()
        .await
        .with_context(|| format!("Failed to create {}", settings.storage_dir.display()))?;

    let url = database_url(settings);
    let store = open_store(&url).with_context(|| format!("Failed to open store at {url}"))?;

    let rasterizer: Arc<dyn Rasterizer> = if check_pdfium {
        Arc::new(
            PdfiumRasterizer::new(settings.pdfium_lib_path.clone())
                .context("Failed to load the PDFium library")?,
        )
    } else {
        Arc::new(PdfiumRasterizer::deferred(settings.pdfium_lib_path.clone()))
    };

    let config = pipeline_config(settings, progress)?;
    info!(?config, storage = %layout.root().display(), "Pipeline configured");
    Ok(Flipbooks::new(store, rasterizer, layout, config))
}

// ── Commands ─────────────────────────────────────────────────────────────────

async fn serve(settings: &Settings, args: ServeArgs) -> Result<()> {
    let flipbooks = flipbooks(settings, None, true).await?;

    let recovered = flipbooks
        .recover_interrupted()
        .await
        .context("Failed to recover interrupted conversions")?;
    if recovered > 0 {
        warn!(count = recovered, "Marked interrupted conversions as failed");
    }

    if !args.static_dir.join("index.html").exists() {
        warn!(dir = %args.static_dir.display(), "Static directory has no index.html");
    }

    let app = api::app(AppState::new(flipbooks, &args.static_dir));
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn convert(settings: &Settings, args: ConvertArgs, show_progress: bool) -> Result<()> {
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let flipbooks = flipbooks(settings, progress, true).await?;

    let bytes = tokio::fs::read(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let filename = file_name(&args.input);

    let start = Instant::now();
    let doc = flipbooks
        .ingest(bytes, &filename, args.title.as_deref())
        .await
        .context("Conversion failed")?;

    if args.json {
        let json = serde_json::to_string_pretty(&DocumentView::from(doc.clone()))
            .context("Failed to serialise document")?;
        println!("{json}");
    } else if !settings.quiet {
        match doc.status {
            DocumentStatus::Ready => eprintln!(
                "{}  {}  {} pages  {}ms  →  {}",
                green("✔"),
                bold(&doc.title),
                doc.page_count.unwrap_or(0),
                start.elapsed().as_millis(),
                flipbooks.layout().document_pages_dir(doc.id).display(),
            ),
            _ => eprintln!(
                "{}  {}  {}",
                red("✘"),
                bold(&doc.title),
                red(doc.error.as_deref().unwrap_or("conversion failed")),
            ),
        }
        println!("{}", doc.id);
    }

    if doc.status != DocumentStatus::Ready {
        bail!("Conversion of {} failed", args.input.display());
    }
    Ok(())
}

async fn list(settings: &Settings, args: ListArgs) -> Result<()> {
    let flipbooks = flipbooks(settings, None, false).await?;
    let mut docs = flipbooks.list_documents().await.context("Failed to list documents")?;
    if let Some(limit) = args.limit {
        docs.truncate(limit);
    }

    if args.json {
        let views: Vec<DocumentView> = docs.into_iter().map(DocumentView::from).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&views).context("Failed to serialise documents")?
        );
        return Ok(());
    }

    for doc in docs {
        let status = match doc.status {
            DocumentStatus::Ready => green("ready  "),
            DocumentStatus::Pending => dim("pending"),
            DocumentStatus::Failed => red("failed "),
        };
        println!(
            "{}  {}  {:>5}  {}  {}",
            doc.id,
            status,
            doc.page_count.map(|n| n.to_string()).unwrap_or_else(|| "-".into()),
            doc.created_at.format("%Y-%m-%d %H:%M"),
            doc.title,
        );
    }
    Ok(())
}

async fn delete(settings: &Settings, id: Uuid) -> Result<()> {
    let flipbooks = flipbooks(settings, None, false).await?;
    if flipbooks.delete_document(id).await.context("Delete failed")? {
        if !settings.quiet {
            eprintln!("{} Deleted {id}", green("✔"));
        }
        Ok(())
    } else {
        bail!("No document with id {id}")
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.pdf".to_string())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
