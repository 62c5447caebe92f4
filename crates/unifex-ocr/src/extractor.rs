use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbImage;

use unifex_core::source::{self, SourceFormat};
use unifex_core::{
    Concurrency, CoordinateInfo, CoordinateUnit, ExtractError, ExtractionUnit, ExtractorMetadata,
    ExtractorOptions, ExtractorSpec, Page, Resource, TextBlock, convert_page,
    polygon_to_bbox_and_rotation,
};

use crate::engine::OcrEngine;

/// Source pixels, decoded once at open.
enum Raster {
    Image(RgbImage),
    /// Pages are rendered on demand at the configured dpi.
    Pdf(Vec<u8>),
}

/// Extraction unit for image-only engines.
///
/// Output defaults to POINTS for PDF sources and PIXELS for raster images;
/// raster images carry no resolution, so they cannot be converted to
/// physical units.
pub struct ImageExtractor<E> {
    path: PathBuf,
    engine: E,
    raster: Resource<Arc<Raster>>,
    page_count: usize,
    options: ExtractorOptions,
}

impl<E: OcrEngine> ImageExtractor<E> {
    pub fn open(path: impl Into<PathBuf>, engine: E, options: ExtractorOptions) -> Result<Self, ExtractError> {
        let path = path.into();
        let format = source::detect(&path)?;
        let bytes = std::fs::read(&path)
            .map_err(|e| ExtractError::BackendInit(format!("cannot read {}: {e}", path.display())))?;

        let (raster, page_count) = match format {
            SourceFormat::Pdf => {
                let count = unifex_pdf_mupdf::page_count(&bytes)?;
                (Raster::Pdf(bytes), count)
            }
            SourceFormat::Image(_) => {
                let image = image::load_from_memory(&bytes).map_err(|e| {
                    ExtractError::BackendInit(format!("cannot decode {}: {e}", path.display()))
                })?;
                (Raster::Image(image.to_rgb8()), 1)
            }
        };
        tracing::debug!(
            path = %path.display(),
            engine = engine.name(),
            pdf = matches!(raster, Raster::Pdf(_)),
            page_count,
            "opened OCR source"
        );

        Ok(Self {
            path,
            engine,
            raster: Resource::new("OCR source", Arc::new(raster)),
            page_count,
            options,
        })
    }

    fn is_pdf(&self) -> bool {
        self.raster
            .with(|r| matches!(r.as_ref(), Raster::Pdf(_)))
            .unwrap_or(false)
    }

    fn detect_page(&self, raster: &Raster, index: usize) -> Result<Page, ExtractError> {
        let (image, dpi, default_unit) = match raster {
            Raster::Image(image) => (Cow::Borrowed(image), None, CoordinateUnit::Pixels),
            Raster::Pdf(bytes) => (
                Cow::Owned(unifex_pdf_mupdf::render_page(bytes, index, self.options.dpi)?),
                Some(self.options.dpi as f64),
                CoordinateUnit::Points,
            ),
        };

        let detections = self.engine.detect(&image)?;
        let mut page = Page::new(
            index,
            image.width() as f64,
            image.height() as f64,
            CoordinateInfo {
                unit: CoordinateUnit::Pixels,
                dpi,
            },
        );
        for detection in detections {
            let Some((bbox, rotation)) = polygon_to_bbox_and_rotation(&detection.polygon, CoordinateUnit::Pixels)
            else {
                continue;
            };
            page.texts.push(
                TextBlock::new(detection.text, bbox)
                    .with_confidence(detection.confidence.clamp(0.0, 1.0))
                    .with_rotation(rotation),
            );
        }

        let target = self.options.output_unit.unwrap_or(default_unit);
        Ok(convert_page(page, target)?)
    }
}

impl<E: OcrEngine + Clone + 'static> ExtractionUnit for ImageExtractor<E> {
    fn source(&self) -> &Path {
        &self.path
    }

    fn page_count(&self) -> usize {
        self.page_count
    }

    fn metadata(&self) -> ExtractorMetadata {
        let mut metadata = ExtractorMetadata::new(self.engine.kind())
            .with_extra("ocr_engine", self.engine.name())
            .with_extra("languages", self.engine.languages());
        if self.is_pdf() {
            metadata = metadata.with_extra("dpi", self.options.dpi);
        }
        metadata
    }

    fn concurrency(&self) -> Concurrency {
        self.engine.concurrency()
    }

    fn try_extract_page(&self, index: usize) -> Result<Page, ExtractError> {
        let raster = self.raster.with(Arc::clone)?;
        self.detect_page(&raster, index)
    }

    fn open_sibling(&self) -> Result<Box<dyn ExtractionUnit>, ExtractError> {
        let raster = self
            .raster
            .with(Arc::clone)
            .map_err(|_| ExtractError::BackendInit("source already closed".into()))?;
        Ok(Box::new(Self {
            path: self.path.clone(),
            engine: self.engine.clone(),
            raster: Resource::new("OCR source", raster),
            page_count: self.page_count,
            options: self.options.clone(),
        }))
    }

    fn spec(&self) -> Option<ExtractorSpec> {
        Some(ExtractorSpec::new(
            self.path.clone(),
            self.engine.kind(),
            self.options.clone(),
        ))
    }

    fn close(&self) -> Result<(), ExtractError> {
        if self.raster.release().is_some() {
            tracing::debug!(path = %self.path.display(), "closed OCR source");
        }
        Ok(())
    }
}
