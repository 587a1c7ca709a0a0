use super::{ApiError, AppState};
use crate::config::PageFormat;
use crate::document::{Document, DocumentStatus, PageLink};
use crate::error::FlipbookError;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Document as returned by the API: the stored record plus page URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentView {
    pub id: Uuid,
    pub title: String,
    pub status: DocumentStatus,
    pub page_count: Option<usize>,
    /// Image URLs, in page order.
    pub pages: Vec<String>,
    /// First page URL, once ready.
    pub thumbnail: Option<String>,
    pub original_filename: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
    /// Clickable areas in canvas pixels, by 1-based page.
    pub links: Vec<PageLink>,
}

impl From<Document> for DocumentView {
    fn from(doc: Document) -> Self {
        let pages: Vec<String> = doc
            .page_image_paths
            .iter()
            .map(|p| format!("/{p}"))
            .collect();
        Self {
            id: doc.id,
            title: doc.title,
            status: doc.status,
            page_count: doc.page_count,
            thumbnail: pages.first().cloned(),
            pages,
            original_filename: doc.original_filename,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
            error: doc.error,
            links: doc.links,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

/// Non-UUID ids can't name a document, so they are simply not found.
fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(format!("Document {raw}")))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut title: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("upload.pdf").to_string();
                let bytes = field.bytes().await?;
                debug!(filename = %filename, bytes = bytes.len(), "Received upload");
                file = Some((filename, bytes.to_vec()));
            }
            "title" => {
                title = Some(field.text().await?);
            }
            _ => {}
        }
    }

    let (filename, bytes) = file.ok_or(ApiError::MissingField("file"))?;
    let doc = state
        .flipbooks
        .upload(bytes, &filename, title.as_deref())
        .await?;
    Ok((StatusCode::ACCEPTED, Json(DocumentView::from(doc))))
}

pub async fn list_documents(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<DocumentView>>, ApiError> {
    let mut docs = state.flipbooks.list_documents().await?;
    if let Some(limit) = params.limit {
        docs.truncate(limit);
    }
    Ok(Json(docs.into_iter().map(DocumentView::from).collect()))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentView>, ApiError> {
    let id = parse_id(&id)?;
    let doc = state
        .flipbooks
        .get_document(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Document {id}")))?;
    Ok(Json(doc.into()))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    if state.flipbooks.delete_document(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Document {id}")))
    }
}

/// One page image by 1-based number.
pub async fn page_image(
    State(state): State<AppState>,
    Path((id, n)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let not_found = || ApiError::NotFound(format!("Page {n} of document {id}"));

    let page: usize = n.parse().map_err(|_| not_found())?;
    let doc = state
        .flipbooks
        .get_document(id)
        .await?
        .ok_or_else(not_found)?;
    let reference = page
        .checked_sub(1)
        .and_then(|i| doc.page_image_paths.get(i))
        .ok_or_else(not_found)?;
    let path = state
        .flipbooks
        .layout()
        .resolve_page_reference(reference)
        .ok_or_else(not_found)?;

    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => {
            return Err(FlipbookError::Internal(format!(
                "reading {}: {e}",
                path.display()
            ))
            .into())
        }
    };
    let mime = PageFormat::from_path(reference)
        .map(|f| f.mime_type())
        .unwrap_or("application/octet-stream");
    Ok(([(header::CONTENT_TYPE, mime)], bytes))
}
