//! On-disk layout of uploads and generated pages.
//!
//! ```text
//! {root}/
//! ├── uploads/{id}.pdf          original file
//! └── pages/{id}/0001.webp      generated pages, 1-based, zero-padded
//!                0002.webp
//! ```
//!
//! Every path is derived from the document's UUID; the uploaded file name
//! never reaches the file system.

use crate::config::PageFormat;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

const UPLOADS_DIR: &str = "uploads";
const PAGES_DIR: &str = "pages";

/// Minimum digits in a page file name.
const PAGE_NAME_WIDTH: usize = 4;

/// Resolves storage paths under a single root directory.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join(UPLOADS_DIR)
    }

    pub fn pages_dir(&self) -> PathBuf {
        self.root.join(PAGES_DIR)
    }

    /// Create `uploads/` and `pages/` if missing.
    pub async fn ensure_dirs(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(self.uploads_dir()).await?;
        tokio::fs::create_dir_all(self.pages_dir()).await?;
        Ok(())
    }

    pub fn upload_path(&self, id: Uuid) -> PathBuf {
        self.uploads_dir().join(format!("{id}.pdf"))
    }

    pub fn document_pages_dir(&self, id: Uuid) -> PathBuf {
        self.pages_dir().join(id.to_string())
    }

    /// Storage-relative reference recorded in `page_image_paths`.
    pub fn page_reference(&self, id: Uuid, page_num: usize, total: usize, format: PageFormat) -> String {
        format!("{PAGES_DIR}/{id}/{}", page_file_name(page_num, total, format))
    }

    /// Absolute path for a reference produced by [`Self::page_reference`].
    ///
    /// Returns `None` for anything that is not a plain `pages/{uuid}/{file}`
    /// reference, so a tampered record cannot point outside the root.
    pub fn resolve_page_reference(&self, reference: &str) -> Option<PathBuf> {
        let mut parts = reference.split('/');
        let (Some(PAGES_DIR), Some(id), Some(file), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return None;
        };
        let id: Uuid = id.parse().ok()?;
        if file.is_empty() || file.starts_with('.') || file.contains('\\') {
            return None;
        }
        Some(self.document_pages_dir(id).join(file))
    }

    /// Remove a document's page directory and original upload.
    ///
    /// Missing files are not an error, so the call can be repeated.
    pub async fn remove_document_files(&self, id: Uuid) -> io::Result<()> {
        let pages = self.document_pages_dir(id);
        match tokio::fs::remove_dir_all(&pages).await {
            Ok(()) => debug!(path = %pages.display(), "Removed page directory"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let upload = self.upload_path(id);
        match tokio::fs::remove_file(&upload).await {
            Ok(()) => debug!(path = %upload.display(), "Removed original upload"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

/// File name of a page: 1-based index, zero-padded to at least four digits
/// (wider when the document needs it) so names sort in page order.
pub fn page_file_name(page_num: usize, total: usize, format: PageFormat) -> String {
    let width = total.to_string().len().max(PAGE_NAME_WIDTH);
    format!("{page_num:0width$}.{}", format.extension())
}

/// Write `bytes` to `path` through a sibling temp file and a rename, so
/// readers never observe a half-written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
