//! HTTP surface: JSON API, page images and the static HTML pages.
//!
//! | Method | Path | |
//! |---|---|---|
//! | GET | `/api/health` | liveness |
//! | POST | `/api/upload` | multipart `file` + optional `title` → 202 |
//! | GET | `/api/documents` | newest first, `?limit=N` |
//! | GET / DELETE | `/api/documents/{id}` | one document |
//! | GET | `/api/documents/{id}/page/{n}` | page image, 1-based |
//! | GET | `/pages/...` | generated images, straight from disk |
//! | GET | `/`, `/upload`, `/gallery`, `/reader/{id}` | HTML |

mod error;
mod handlers;

pub use error::{ApiError, ErrorCode, ErrorResponse};
pub use handlers::{DocumentView, HealthResponse};

use crate::Flipbooks;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

/// Room for multipart boundaries and the `title` field on top of the file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub flipbooks: Flipbooks,
    /// Directory holding `index.html`, `upload.html`, `gallery.html` and
    /// `reader.html`.
    pub static_dir: PathBuf,
}

impl AppState {
    pub fn new(flipbooks: Flipbooks, static_dir: impl Into<PathBuf>) -> Self {
        Self {
            flipbooks,
            static_dir: static_dir.into(),
        }
    }
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let body_limit = state
        .flipbooks
        .config()
        .max_file_size
        .saturating_add(MULTIPART_OVERHEAD);
    let pages_dir = state.flipbooks.layout().pages_dir();
    let static_dir = state.static_dir.clone();
    let html = |name: &str| ServeFile::new(static_dir.join(name));

    Router::new()
        .route("/api/health", get(handlers::health))
        .route(
            "/api/upload",
            post(handlers::upload).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/api/documents", get(handlers::list_documents))
        .route(
            "/api/documents/{id}",
            get(handlers::get_document).delete(handlers::delete_document),
        )
        .route("/api/documents/{id}/page/{n}", get(handlers::page_image))
        .nest_service("/pages", ServeDir::new(pages_dir))
        .route_service("/", html("index.html"))
        .route_service("/upload", html("upload.html"))
        .route_service("/gallery", html("gallery.html"))
        .route_service("/reader/{id}", html("reader.html"))
        .nest_service("/static", ServeDir::new(&static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
