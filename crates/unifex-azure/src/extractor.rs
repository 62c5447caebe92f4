use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use unifex_core::source::{self, SourceFormat};
use unifex_core::{
    CoordinateUnit, ExtractError, ExtractionUnit, ExtractorKind, ExtractorMetadata,
    ExtractorOptions, Page, Resource, convert_page,
};

use crate::client::AzureClient;
use crate::response::{self, AnalyzeResult};

/// The one analysis every page is cut from, shared with siblings.
type Analysis = Arc<OnceLock<Result<AnalyzeResult, String>>>;

/// Azure Document Intelligence backend.
///
/// The whole document is analyzed once, on the first page request; other
/// pages wait for and reuse that result. A worker process would repeat the
/// paid analysis, so this unit has no spec and runs on thread pools only.
pub struct AzureDiExtractor {
    path: PathBuf,
    client: AzureClient,
    bytes: Resource<Arc<Vec<u8>>>,
    format: SourceFormat,
    analysis: Analysis,
    page_count: usize,
    options: ExtractorOptions,
}

impl AzureDiExtractor {
    pub fn open(path: impl Into<PathBuf>, options: ExtractorOptions) -> Result<Self, ExtractError> {
        let client = AzureClient::from_options(&options)?;
        Self::with_client(path, client, options)
    }

    pub fn with_client(
        path: impl Into<PathBuf>,
        client: AzureClient,
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
        tracing::debug!(path = %path.display(), model = client.model(), page_count, "opened Azure source");

        Ok(Self {
            path,
            client,
            bytes: Resource::new("Azure source", Arc::new(bytes)),
            format,
            analysis: Arc::new(OnceLock::new()),
            page_count,
            options,
        })
    }

    fn analysis(&self) -> Result<&AnalyzeResult, ExtractError> {
        let bytes = self.bytes.with(Arc::clone)?;
        let outcome = self.analysis.get_or_init(|| {
            self.client
                .analyze(&bytes, self.format.mime_type())
                .map_err(|e| {
                    tracing::warn!(path = %self.path.display(), error = %e, "Azure analysis failed");
                    e.to_string()
                })
        });
        outcome
            .as_ref()
            .map_err(|message| ExtractError::PageExtraction {
                page: 0,
                message: message.clone(),
            })
    }
}

impl ExtractionUnit for AzureDiExtractor {
    fn source(&self) -> &Path {
        &self.path
    }

    fn page_count(&self) -> usize {
        self.page_count
    }

    fn metadata(&self) -> ExtractorMetadata {
        let mut metadata = ExtractorMetadata::new(ExtractorKind::AzureDi)
            .with_extra("model_id", self.client.model());
        if let Some(Ok(result)) = self.analysis.get()
            && let Some(model) = &result.model_id
        {
            metadata = metadata.with_extra("model_id", model.as_str());
        }
        metadata
    }

    fn try_extract_page(&self, index: usize) -> Result<Page, ExtractError> {
        let page = response::to_page(self.analysis()?, index)?;
        let default_unit = match page.unit() {
            CoordinateUnit::Inches => CoordinateUnit::Points,
            other => other,
        };
        Ok(convert_page(page, self.options.output_unit.unwrap_or(default_unit))?)
    }

    fn open_sibling(&self) -> Result<Box<dyn ExtractionUnit>, ExtractError> {
        Ok(Box::new(Self {
            path: self.path.clone(),
            client: self.client.clone(),
            bytes: Resource::new("Azure source", self.bytes.with(Arc::clone).map_err(|_| {
                ExtractError::BackendInit("source already closed".into())
            })?),
            format: self.format,
            analysis: Arc::clone(&self.analysis),
            page_count: self.page_count,
            options: self.options.clone(),
        }))
    }

    fn close(&self) -> Result<(), ExtractError> {
        if self.bytes.release().is_some() {
            tracing::debug!(path = %self.path.display(), "closed Azure source");
        }
        Ok(())
    }
}
