//! The persisted document record and its state model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Conversion state of a document.
///
/// Moves forward exactly once: `Pending → Ready` or `Pending → Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Ready,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Failed => "failed",
        }
    }

    /// Ready and failed documents never change again (except by deletion).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DocumentStatus::Pending)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DocumentStatus::Pending),
            "ready" => Ok(DocumentStatus::Ready),
            "failed" => Ok(DocumentStatus::Failed),
            other => Err(format!("unknown document status '{other}'")),
        }
    }
}

/// One uploaded PDF and everything known about its conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Opaque identifier; also the directory name of the generated pages.
    pub id: Uuid,
    pub title: String,
    pub status: DocumentStatus,
    /// Known only once `status == Ready`.
    pub page_count: Option<usize>,
    /// Storage-relative image paths (`pages/{id}/0001.webp`), in page order.
    /// Empty until `status == Ready`.
    pub page_image_paths: Vec<String>,
    /// Name of the uploaded file, kept for display only.
    pub original_filename: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Failure reason when `status == Failed`.
    pub error: Option<String>,
    /// Hyperlinks found on the pages, in canvas pixels. Empty until ready.
    #[serde(default)]
    pub links: Vec<PageLink>,
}

/// A clickable URI area on one page.
///
/// Coordinates are pixels on the page image (top-left origin), so the reader
/// can overlay them without knowing the PDF page size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLink {
    /// 1-based page number.
    pub page: usize,
    pub url: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Document {
    /// A fresh `pending` record.
    pub fn new_pending(title: impl Into<String>, original_filename: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            status: DocumentStatus::Pending,
            page_count: None,
            page_image_paths: Vec::new(),
            original_filename: original_filename.into(),
            created_at: now,
            updated_at: now,
            error: None,
            links: Vec::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == DocumentStatus::Ready
    }

    /// Apply a conversion outcome to this record in place.
    ///
    /// Callers (the store backends) check the transition is legal first.
    pub(crate) fn apply(&mut self, outcome: &ConversionOutcome) {
        match outcome {
            ConversionOutcome::Ready {
                page_count,
                page_image_paths,
                links,
            } => {
                self.status = DocumentStatus::Ready;
                self.page_count = Some(*page_count);
                self.page_image_paths = page_image_paths.clone();
                self.links = links.clone();
                self.error = None;
            }
            ConversionOutcome::Failed { reason } => {
                self.status = DocumentStatus::Failed;
                self.page_count = None;
                self.page_image_paths.clear();
                self.links.clear();
                self.error = Some(reason.clone());
            }
        }
        self.updated_at = Utc::now();
    }
}

/// The result the pipeline records when a conversion ends.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionOutcome {
    Ready {
        page_count: usize,
        page_image_paths: Vec<String>,
        links: Vec<PageLink>,
    },
    Failed {
        reason: String,
    },
}

impl ConversionOutcome {
    pub fn status(&self) -> DocumentStatus {
        match self {
            ConversionOutcome::Ready { .. } => DocumentStatus::Ready,
            ConversionOutcome::Failed { .. } => DocumentStatus::Failed,
        }
    }
}
