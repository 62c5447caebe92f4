use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use unifex_core::source::{self, SourceFormat};
use unifex_core::{
    CoordinateUnit, ExtractError, ExtractionUnit, ExtractorKind, ExtractorMetadata,
    ExtractorOptions, Page, Resource, convert_page,
};

use crate::client::GoogleClient;
use crate::response::{self, Document, Frame};

const OCR_ENGINE: &str = "google_document_ai";

type Processed = Arc<OnceLock<Result<Document, String>>>;

/// Google Document AI backend.
///
/// The document is processed once, on the first page request, and every
/// page is cut from that result. PDF pages are placed in points using the
/// PDF's own page sizes; images keep the pixel dimension the service reports.
/// Like the Azure backend it has no spec, so it never runs in worker
/// processes.
pub struct GoogleDocaiExtractor {
    path: PathBuf,
    client: GoogleClient,
    bytes: Resource<Arc<Vec<u8>>>,
    format: SourceFormat,
    processed: Processed,
    page_count: usize,
    options: ExtractorOptions,
}

impl GoogleDocaiExtractor {
    pub fn open(path: impl Into<PathBuf>, options: ExtractorOptions) -> Result<Self, ExtractError> {
        let client = GoogleClient::from_options(&options)?;
        Self::with_client(path, client, options)
    }

    pub fn with_client(
        path: impl Into<PathBuf>,
        client: GoogleClient,
        options: ExtractorOptions,
    ) -> Result<Self, ExtractError> {
        let path = path.into();
        let format = source::detect(&path)?;
        let bytes = std::fs::read(&path)
            .map_err(|e| ExtractError::BackendInit(format!("cannot read {}: {e}", path.display())))?;
        let page_count = match format {
            SourceFormat::Pdf => unifex_pdf_mupdf::page_count(&bytes)?,
            SourceFormat::Image(_) => 1,
        };
        tracing::debug!(
            path = %path.display(),
            processor = client.processor_name(),
            page_count,
            "opened Google Document AI source"
        );

        Ok(Self {
            path,
            client,
            bytes: Resource::new("Document AI source", Arc::new(bytes)),
            format,
            processed: Arc::new(OnceLock::new()),
            page_count,
            options,
        })
    }

    fn document(&self, bytes: &[u8]) -> Result<&Document, ExtractError> {
        let outcome = self.processed.get_or_init(|| {
            self.client
                .process(bytes, self.format.mime_type())
                .map_err(|e| {
                    tracing::warn!(path = %self.path.display(), error = %e, "Document AI processing failed");
                    e.to_string()
                })
        });
        outcome.as_ref().map_err(|message| ExtractError::PageExtraction {
            page: 0,
            message: message.clone(),
        })
    }
}

impl ExtractionUnit for GoogleDocaiExtractor {
    fn source(&self) -> &Path {
        &self.path
    }

    fn page_count(&self) -> usize {
        self.page_count
    }

    fn metadata(&self) -> ExtractorMetadata {
        ExtractorMetadata::new(ExtractorKind::GoogleDocai)
            .with_extra("ocr_engine", OCR_ENGINE)
            .with_extra("processor_name", self.client.processor_name())
    }

    fn try_extract_page(&self, index: usize) -> Result<Page, ExtractError> {
        let bytes = self.bytes.with(Arc::clone)?;
        let frame = match self.format {
            SourceFormat::Pdf => {
                let (width, height) = unifex_pdf_mupdf::page_size(&bytes, index)?;
                Some(Frame {
                    width,
                    height,
                    unit: CoordinateUnit::Points,
                })
            }
            SourceFormat::Image(_) => None,
        };
        let page = response::to_page(self.document(&bytes)?, index, frame)?;
        let native = page.unit();
        Ok(convert_page(page, self.options.output_unit.unwrap_or(native))?)
    }

    fn open_sibling(&self) -> Result<Box<dyn ExtractionUnit>, ExtractError> {
        Ok(Box::new(Self {
            path: self.path.clone(),
            client: self.client.clone(),
            bytes: Resource::new("Document AI source", self.bytes.with(Arc::clone).map_err(|_| {
                ExtractError::BackendInit("source already closed".into())
            })?),
            format: self.format,
            processed: Arc::clone(&self.processed),
            page_count: self.page_count,
            options: self.options.clone(),
        }))
    }

    fn close(&self) -> Result<(), ExtractError> {
        if self.bytes.release().is_some() {
            tracing::debug!(path = %self.path.display(), "closed Document AI source");
        }
        Ok(())
    }
}
