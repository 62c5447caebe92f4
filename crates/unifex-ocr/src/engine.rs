use image::RgbImage;
use thiserror::Error;

use unifex_core::{Concurrency, ExtractError, ExtractorKind};

#[derive(Error, Debug)]
pub enum OcrError {
    /// The engine's runtime is missing or unusable.
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),
    #[error("OCR engine failed: {0}")]
    Engine(String),
    #[error("cannot parse OCR output: {0}")]
    Parse(String),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<OcrError> for ExtractError {
    fn from(e: OcrError) -> Self {
        match e {
            OcrError::Unavailable(msg) => ExtractError::BackendInit(msg),
            other => ExtractError::PageExtraction {
                page: 0,
                message: other.to_string(),
            },
        }
    }
}

/// One detected text region, in pixels of the image it was found in.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub text: String,
    /// Corners clockwise from the top-left.
    pub polygon: Vec<[f64; 2]>,
    /// In [0, 1].
    pub confidence: f64,
}

impl Detection {
    /// Detection covering an axis-aligned rectangle.
    pub fn rect(text: impl Into<String>, x0: f64, y0: f64, x1: f64, y1: f64, confidence: f64) -> Self {
        Self {
            text: text.into(),
            polygon: vec![[x0, y0], [x1, y0], [x1, y1], [x0, y1]],
            confidence,
        }
    }
}

/// A text detector over raster images.
pub trait OcrEngine: Send + Sync {
    fn kind(&self) -> ExtractorKind;

    /// Name recorded in document metadata.
    fn name(&self) -> &str;

    /// Languages in the engine's own notation.
    fn languages(&self) -> Vec<String>;

    fn concurrency(&self) -> Concurrency {
        Concurrency::Reentrant
    }

    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, OcrError>;
}
