//! HTTP surface, driven through `tower::ServiceExt::oneshot`.
//!
//! Run with:
//!   cargo test --test api

mod common;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use common::*;
use http_body_util::BodyExt;
use openflip::api::{app, AppState, DocumentView, ErrorCode, ErrorResponse, HealthResponse};
use openflip::DocumentStatus;
use tower::ServiceExt;

const BOUNDARY: &str = "openflip-test-boundary";

fn router(h: &Harness) -> Router {
    let static_dir = concat!(env!("CARGO_MANIFEST_DIR"), "/static");
    app(AppState::new(h.flipbooks.clone(), static_dir))
}

fn multipart(file: Option<(&str, &[u8])>, title: Option<&str>) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(title) = title {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\n{title}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((name, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: application/pdf\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::post("/api/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::delete(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let headers = res.headers().clone();
    let body = res.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, headers, body)
}

fn error_code(body: &[u8]) -> ErrorCode {
    serde_json::from_slice::<ErrorResponse>(body).unwrap().code
}

#[tokio::test]
async fn health_reports_ok() {
    let h = harness().await;
    let (status, _, body) = send(&router(&h), get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    let health: HealthResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.service, "openflip");
}

#[tokio::test]
async fn upload_is_accepted_then_converted() {
    let h = harness().await;
    let app = router(&h);
    let pdf = fake_pdf(2);

    let (status, _, body) = send(&app, multipart(Some(("annual_report.pdf", pdf.as_slice())), None)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let doc: DocumentView = serde_json::from_slice(&body).unwrap();
    assert_eq!(doc.title, "Annual Report");
    assert_eq!(doc.original_filename, "annual_report.pdf");

    let done = wait_until_done(&h.flipbooks, doc.id).await;
    assert_eq!(done.status, DocumentStatus::Ready);

    let (status, _, body) = send(&app, get(&format!("/api/documents/{}", doc.id))).await;
    assert_eq!(status, StatusCode::OK);
    let view: DocumentView = serde_json::from_slice(&body).unwrap();
    assert_eq!(view.page_count, Some(2));
    assert_eq!(view.pages.len(), 2);
    assert_eq!(view.thumbnail.as_deref(), Some(view.pages[0].as_str()));
    assert!(view.pages[0].starts_with(&format!("/pages/{}/", doc.id)));

    // The page URLs are directly fetchable.
    let (status, headers, bytes) = send(&app, get(&view.pages[1])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/png");
    assert!(!bytes.is_empty());
}

#[tokio::test]
async fn document_view_carries_page_links() {
    let h = harness_with(FakeRasterizer::with_links_on(&[1]), test_config()).await;
    let app = router(&h);
    let doc = h
        .flipbooks
        .ingest(fake_pdf(2), "linked.pdf", None)
        .await
        .unwrap();

    let (status, _, body) = send(&app, get(&format!("/api/documents/{}", doc.id))).await;
    assert_eq!(status, StatusCode::OK);
    let raw: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(raw["links"][0]["page"], 2);
    assert_eq!(raw["links"][0]["url"], "https://example.com/page/2");
    let view: DocumentView = serde_json::from_slice(&body).unwrap();
    assert_eq!(view.links, vec![link_for(1)]);

    // Documents without links still carry the field.
    let plain = h
        .flipbooks
        .ingest(fake_pdf(1), "plain.pdf", None)
        .await
        .unwrap();
    let (_, _, body) = send(&app, get(&format!("/api/documents/{}", plain.id))).await;
    let raw: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(raw["links"], serde_json::json!([]));
}

#[tokio::test]
async fn upload_uses_the_title_field() {
    let h = harness().await;
    let pdf = fake_pdf(1);
    let (status, _, body) = send(
        &router(&h),
        multipart(Some(("x.pdf", pdf.as_slice())), Some("My Book")),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let doc: DocumentView = serde_json::from_slice(&body).unwrap();
    assert_eq!(doc.title, "My Book");
}

#[tokio::test]
async fn upload_without_file_is_bad_request() {
    let h = harness().await;
    let (status, _, body) = send(&router(&h), multipart(None, Some("orphan title"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), ErrorCode::MissingField);
}

#[tokio::test]
async fn upload_of_non_pdf_is_bad_request() {
    let h = harness().await;
    let (status, _, body) = send(
        &router(&h),
        multipart(Some(("photo.pdf", &b"\x89PNG\r\n\x1a\n"[..])), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), ErrorCode::InvalidPdf);
    assert!(h.flipbooks.list_documents().await.unwrap().is_empty());
}

#[tokio::test]
async fn upload_over_the_file_limit_is_413() {
    let h = harness_with(FakeRasterizer::new(), test_config().max_file_size(32)).await;
    let mut pdf = fake_pdf(1);
    pdf.resize(100, b' ');
    let (status, _, body) = send(&router(&h), multipart(Some(("big.pdf", pdf.as_slice())), None)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(error_code(&body), ErrorCode::PayloadTooLarge);
}

#[tokio::test]
async fn upload_over_the_body_limit_is_413() {
    let h = harness_with(FakeRasterizer::new(), test_config().max_file_size(32)).await;
    let mut pdf = fake_pdf(1);
    pdf.resize(200 * 1024, b' ');
    let (status, _, _) = send(&router(&h), multipart(Some(("huge.pdf", pdf.as_slice())), None)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(h.flipbooks.list_documents().await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_and_malformed_ids_are_404() {
    let h = harness().await;
    let app = router(&h);
    let unknown = uuid::Uuid::new_v4();
    for uri in [
        format!("/api/documents/{unknown}"),
        "/api/documents/not-a-uuid".to_string(),
        format!("/api/documents/{unknown}/page/1"),
    ] {
        let (status, _, body) = send(&app, get(&uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(error_code(&body), ErrorCode::NotFound);
    }
}

#[tokio::test]
async fn list_is_newest_first_and_limited() {
    let h = harness().await;
    let mut titles = Vec::new();
    for name in ["first.pdf", "second.pdf", "third.pdf"] {
        titles.push(
            h.flipbooks
                .ingest(fake_pdf(1), name, None)
                .await
                .unwrap()
                .title,
        );
    }
    let app = router(&h);

    let (status, _, body) = send(&app, get("/api/documents")).await;
    assert_eq!(status, StatusCode::OK);
    let all: Vec<DocumentView> = serde_json::from_slice(&body).unwrap();
    let listed: Vec<_> = all.iter().map(|d| d.title.clone()).collect();
    assert_eq!(listed, vec!["Third", "Second", "First"]);

    let (_, _, body) = send(&app, get("/api/documents?limit=2")).await;
    let limited: Vec<DocumentView> = serde_json::from_slice(&body).unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].title, "Third");
}

#[tokio::test]
async fn delete_then_delete_again() {
    let h = harness().await;
    let doc = h
        .flipbooks
        .ingest(fake_pdf(1), "bye.pdf", None)
        .await
        .unwrap();
    let app = router(&h);
    let uri = format!("/api/documents/{}", doc.id);

    let (status, _, body) = send(&app, delete(&uri)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());
    assert!(!h.layout.document_pages_dir(doc.id).exists());

    let (status, _, _) = send(&app, delete(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = send(&app, get(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn page_endpoint_is_one_based() {
    let h = harness().await;
    let doc = h
        .flipbooks
        .ingest(fake_pdf(2), "pages.pdf", None)
        .await
        .unwrap();
    let app = router(&h);
    let base = format!("/api/documents/{}/page", doc.id);

    let (status, headers, bytes) = send(&app, get(&format!("{base}/1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/png");
    let img = image::load_from_memory(&bytes).unwrap();
    assert_eq!((img.width(), img.height()), (CANVAS.width, CANVAS.height));

    for bad in ["0", "3", "first"] {
        let (status, _, _) = send(&app, get(&format!("{base}/{bad}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "page {bad}");
    }
}

#[tokio::test]
async fn html_pages_are_served() {
    let h = harness().await;
    let app = router(&h);
    for uri in ["/", "/upload", "/gallery", "/reader/anything"] {
        let (status, headers, body) = send(&app, get(uri)).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert!(headers[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html"));
        assert!(String::from_utf8_lossy(&body).contains("OpenFlip"));
    }
    let (status, _, _) = send(&app, get("/static/app.css")).await;
    assert_eq!(status, StatusCode::OK);
}
