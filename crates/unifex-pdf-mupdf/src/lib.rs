//! MuPDF-backed PDF support for unifex.
//!
//! This crate is the sole AGPL island: it isolates the mupdf dependency
//! (which is AGPL-3.0) so that non-PDF code paths do not transitively
//! depend on it.
//!
//! A mupdf `Document` cannot be shared across threads, so everything here
//! keeps the raw file bytes and opens a short-lived document per call. That
//! makes [`PdfExtractor`] reentrant and lets [`render_page`] run from any
//! worker.

mod extractor;
mod render;

pub use extractor::PdfExtractor;
pub use render::{page_count, page_size, render_page};

use unifex_core::ExtractError;

const PDF_MAGIC: &str = "application/pdf";

fn open_document(bytes: &[u8]) -> Result<mupdf::Document, mupdf::Error> {
    mupdf::Document::from_bytes(bytes, PDF_MAGIC)
}

fn page_error(index: usize, e: mupdf::Error) -> ExtractError {
    ExtractError::page(index, format!("mupdf: {e}"))
}
