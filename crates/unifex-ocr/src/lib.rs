//! OCR-backed extraction for unifex.
//!
//! [`ImageExtractor`] turns any [`OcrEngine`] into an extraction unit. It
//! accepts raster images and PDFs alike: PDF pages are rendered at the
//! configured resolution before detection, so callers never see the
//! difference.

mod engine;
mod extractor;
pub mod languages;
mod tesseract;

pub use engine::{Detection, OcrEngine, OcrError};
pub use extractor::ImageExtractor;
pub use tesseract::{TESSERACT_CMD_ENV, TesseractEngine};
