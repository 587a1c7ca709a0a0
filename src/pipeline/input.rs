//! Upload validation and naming.
//!
//! Cheap checks run here before the rasterizer ever sees the bytes: size,
//! emptiness and the `%PDF` magic. The rasterizer then gets the final say
//! on whether the document actually opens (see [`crate::Flipbooks`]).

use crate::error::FlipbookError;
use tracing::debug;

const PDF_MAGIC: &[u8] = b"%PDF";

/// Title used when neither the caller nor the file name yields one.
pub const UNTITLED: &str = "Untitled";

/// Check size and PDF magic bytes of an upload.
pub fn validate_upload(bytes: &[u8], max_file_size: usize) -> Result<(), FlipbookError> {
    if bytes.is_empty() {
        return Err(FlipbookError::EmptyUpload);
    }
    if bytes.len() > max_file_size {
        return Err(FlipbookError::FileTooLarge {
            size: bytes.len(),
            limit: max_file_size,
        });
    }
    if !has_pdf_magic(bytes) {
        let head: String = bytes
            .iter()
            .take(PDF_MAGIC.len())
            .map(|b| format!("{b:02x}"))
            .collect();
        return Err(FlipbookError::NotAPdf {
            detail: format!("missing %PDF header (file starts with 0x{head})"),
        });
    }
    debug!(bytes = bytes.len(), "Upload passed validation");
    Ok(())
}

/// PDFs may carry junk before the header; readers accept it within the
/// first 1024 bytes.
fn has_pdf_magic(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(1024)];
    window.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC)
}

/// Strip any directory components a browser may have sent.
pub fn display_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() {
        "upload.pdf".to_string()
    } else {
        base.to_string()
    }
}

/// Choose a document title.
///
/// A non-blank `custom` title wins. Otherwise the file name is turned into
/// one: `annual_report_2024.pdf` → `Annual Report 2024`.
pub fn derive_title(custom: Option<&str>, filename: &str) -> String {
    if let Some(t) = custom.map(str::trim).filter(|t| !t.is_empty()) {
        return t.to_string();
    }

    let base = display_filename(filename);
    let stem = match base.len().checked_sub(4) {
        Some(cut) if base.is_char_boundary(cut) && base[cut..].eq_ignore_ascii_case(".pdf") => {
            &base[..cut]
        }
        _ => base.as_str(),
    };
    let title = stem
        .replace('_', " ")
        .split_whitespace()
        .map(title_case_word)
        .collect::<Vec<_>>()
        .join(" ");

    if title.is_empty() {
        UNTITLED.to_string()
    } else {
        title
    }
}

fn title_case_word(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut at_start = true;
    for c in word.chars() {
        if c.is_alphabetic() {
            if at_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_start = false;
        } else {
            out.push(c);
            at_start = true;
        }
    }
    out
}
