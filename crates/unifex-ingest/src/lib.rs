use std::path::{Path, PathBuf};

use unifex_core::{
    Concurrency, ExtractError, ExtractionUnit, ExtractorKind, ExtractorMetadata, ExtractorOptions,
    ExtractorSpec, Page,
};
use unifex_ocr::{ImageExtractor, TesseractEngine};
use unifex_pdf_mupdf::PdfExtractor;

pub mod worker;

// Re-export the pieces callers need alongside the factory
pub use unifex_core::{ExtractOptions, ExtractionResult, ScopedUnit, extract};

/// Every backend compiled into this build.
pub enum Extractor {
    Pdf(PdfExtractor),
    Tesseract(ImageExtractor<TesseractEngine>),
    #[cfg(feature = "azure")]
    AzureDi(unifex_azure::AzureDiExtractor),
    #[cfg(feature = "google")]
    GoogleDocai(unifex_google::GoogleDocaiExtractor),
}

/// Open a backend of `kind` on `source`.
///
/// Image-based backends accept PDFs and raster images alike; the source
/// format is sniffed, not taken from the extension. An unreadable or
/// unsupported source is rejected before any engine or credential is
/// looked at.
pub fn create_extractor(
    source: impl Into<PathBuf>,
    kind: ExtractorKind,
    options: ExtractorOptions,
) -> Result<Extractor, ExtractError> {
    let source = source.into();
    tracing::debug!(path = %source.display(), %kind, "creating extractor");
    unifex_core::source::detect(&source)?;
    match kind {
        ExtractorKind::Pdf => Ok(Extractor::Pdf(PdfExtractor::open(source, options)?)),
        ExtractorKind::Tesseract => {
            let engine = TesseractEngine::new(&options)?;
            Ok(Extractor::Tesseract(ImageExtractor::open(source, engine, options)?))
        }
        #[cfg(feature = "azure")]
        ExtractorKind::AzureDi => Ok(Extractor::AzureDi(unifex_azure::AzureDiExtractor::open(
            source, options,
        )?)),
        #[cfg(not(feature = "azure"))]
        ExtractorKind::AzureDi => Err(ExtractError::BackendInit(
            "Azure support not compiled in (enable the `azure` feature of unifex-ingest)".into(),
        )),
        #[cfg(feature = "google")]
        ExtractorKind::GoogleDocai => Ok(Extractor::GoogleDocai(
            unifex_google::GoogleDocaiExtractor::open(source, options)?,
        )),
        #[cfg(not(feature = "google"))]
        ExtractorKind::GoogleDocai => Err(ExtractError::BackendInit(
            "Google Document AI support not compiled in (enable the `google` feature of unifex-ingest)"
                .into(),
        )),
    }
}

impl Extractor {
    /// Reopen a unit from its spec, as process-pool workers do.
    pub fn open(spec: &ExtractorSpec) -> Result<Self, ExtractError> {
        create_extractor(spec.source.clone(), spec.kind, spec.options.clone())
    }

    pub fn kind(&self) -> ExtractorKind {
        match self {
            Self::Pdf(_) => ExtractorKind::Pdf,
            Self::Tesseract(_) => ExtractorKind::Tesseract,
            #[cfg(feature = "azure")]
            Self::AzureDi(_) => ExtractorKind::AzureDi,
            #[cfg(feature = "google")]
            Self::GoogleDocai(_) => ExtractorKind::GoogleDocai,
        }
    }

    fn inner(&self) -> &dyn ExtractionUnit {
        match self {
            Self::Pdf(unit) => unit,
            Self::Tesseract(unit) => unit,
            #[cfg(feature = "azure")]
            Self::AzureDi(unit) => unit,
            #[cfg(feature = "google")]
            Self::GoogleDocai(unit) => unit,
        }
    }
}

impl ExtractionUnit for Extractor {
    fn source(&self) -> &Path {
        self.inner().source()
    }

    fn page_count(&self) -> usize {
        self.inner().page_count()
    }

    fn metadata(&self) -> ExtractorMetadata {
        self.inner().metadata()
    }

    fn concurrency(&self) -> Concurrency {
        self.inner().concurrency()
    }

    fn try_extract_page(&self, index: usize) -> Result<Page, ExtractError> {
        self.inner().try_extract_page(index)
    }

    fn open_sibling(&self) -> Result<Box<dyn ExtractionUnit>, ExtractError> {
        self.inner().open_sibling()
    }

    fn spec(&self) -> Option<ExtractorSpec> {
        self.inner().spec()
    }

    fn close(&self) -> Result<(), ExtractError> {
        self.inner().close()
    }
}
