//! Pipeline stages for PDF → flipbook conversion.
//!
//! Each submodule implements one transformation step and is testable on its
//! own; [`crate::Flipbooks`] strings them together.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ pages/{id}/NNNN.ext
//! (bytes)   (pdfium)   (webp/png/jpeg)
//! ```
//!
//! 1. [`input`]: size and magic-byte checks, title derivation
//! 2. [`render`]: rasterise one page into the shared canvas; runs in
//!    `spawn_blocking` because pdfium is blocking and not async-safe
//! 3. [`encode`]: turn the canvas bitmap into the configured image format

pub mod encode;
pub mod input;
pub mod render;
