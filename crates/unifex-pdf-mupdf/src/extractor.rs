use std::path::{Path, PathBuf};

use mupdf::{MetadataName, TextPageFlags};

use unifex_core::source::{self, SourceFormat};
use unifex_core::{
    BBox, CharacterMerger, CoordinateInfo, CoordinateUnit, ExtractError, ExtractionUnit,
    ExtractorKind, ExtractorMetadata, ExtractorOptions, ExtractorSpec, FontInfo, Page, Resource,
    TextBlock, convert_page,
};

use crate::{open_document, page_error};

/// Native PDF text-layer extractor.
///
/// Geometry is in PDF points with a top-left origin, offset so the page's
/// visible area starts at (0, 0). Blocks carry no confidence.
pub struct PdfExtractor {
    path: PathBuf,
    bytes: Resource<Vec<u8>>,
    page_count: usize,
    metadata: ExtractorMetadata,
    options: ExtractorOptions,
}

impl PdfExtractor {
    pub fn open(path: impl Into<PathBuf>, options: ExtractorOptions) -> Result<Self, ExtractError> {
        let path = path.into();
        if !matches!(source::detect(&path)?, SourceFormat::Pdf) {
            return Err(ExtractError::UnsupportedSource {
                path,
                reason: "the pdf extractor only reads PDF files".into(),
            });
        }
        let bytes = std::fs::read(&path)
            .map_err(|e| ExtractError::BackendInit(format!("cannot read {}: {e}", path.display())))?;

        let doc = open_document(&bytes).map_err(|e| {
            ExtractError::BackendInit(format!("cannot open PDF {}: {e}", path.display()))
        })?;
        let page_count = doc
            .page_count()
            .map_err(|e| ExtractError::BackendInit(format!("cannot count pages: {e}")))?
            .max(0) as usize;
        let metadata = read_metadata(&doc);
        tracing::debug!(path = %path.display(), page_count, "opened PDF");

        Ok(Self {
            path,
            bytes: Resource::new("PDF buffer", bytes),
            page_count,
            metadata,
            options,
        })
    }

    fn read_page(&self, bytes: &[u8], index: usize) -> Result<Page, ExtractError> {
        let doc = open_document(bytes).map_err(|e| page_error(index, e))?;
        let page = doc.load_page(index as i32).map_err(|e| page_error(index, e))?;
        let bounds = page.bounds().map_err(|e| page_error(index, e))?;
        let text_page = page
            .to_text_page(TextPageFlags::empty())
            .map_err(|e| page_error(index, e))?;

        let (ox, oy) = (bounds.x0 as f64, bounds.y0 as f64);
        let rect = |x0: f32, y0: f32, x1: f32, y1: f32| {
            BBox::new(
                x0 as f64 - ox,
                y0 as f64 - oy,
                x1 as f64 - ox,
                y1 as f64 - oy,
                CoordinateUnit::Points,
            )
        };

        let mut out = Page::new(
            index,
            (bounds.x1 - bounds.x0) as f64,
            (bounds.y1 - bounds.y0) as f64,
            CoordinateInfo {
                unit: CoordinateUnit::Points,
                dpi: None,
            },
        );

        for block in text_page.blocks() {
            for line in block.lines() {
                match self.options.character_merger {
                    CharacterMerger::Lines => {
                        let mut text = String::new();
                        let mut size = None;
                        for c in line.chars() {
                            text.push(c.char().unwrap_or('\u{FFFD}'));
                            size.get_or_insert(c.size() as f64);
                        }
                        if text.trim().is_empty() {
                            continue;
                        }
                        let b = line.bounds();
                        let mut block = TextBlock::new(text, rect(b.x0, b.y0, b.x1, b.y1));
                        block.font_info = size.map(|size| FontInfo {
                            size: Some(size),
                            ..FontInfo::default()
                        });
                        out.texts.push(block);
                    }
                    CharacterMerger::Characters => {
                        for c in line.chars() {
                            let q = c.quad();
                            let x0 = q.ul.x.min(q.ll.x);
                            let x1 = q.ur.x.max(q.lr.x);
                            let y0 = q.ul.y.min(q.ur.y);
                            let y1 = q.ll.y.max(q.lr.y);
                            let mut block = TextBlock::new(
                                c.char().unwrap_or('\u{FFFD}').to_string(),
                                rect(x0, y0, x1, y1),
                            );
                            block.font_info = Some(FontInfo {
                                size: Some(c.size() as f64),
                                ..FontInfo::default()
                            });
                            out.texts.push(block);
                        }
                    }
                }
            }
        }

        self.to_output_unit(out)
    }

    fn to_output_unit(&self, mut page: Page) -> Result<Page, ExtractError> {
        match self.options.output_unit {
            None | Some(CoordinateUnit::Points) => Ok(page),
            Some(unit) => {
                // Pixel output means "as if rendered at the configured dpi".
                if unit == CoordinateUnit::Pixels {
                    page.coordinate_info = Some(CoordinateInfo {
                        unit: CoordinateUnit::Points,
                        dpi: Some(self.options.dpi as f64),
                    });
                }
                Ok(convert_page(page, unit)?)
            }
        }
    }
}

fn read_metadata(doc: &mupdf::Document) -> ExtractorMetadata {
    let get = |name: MetadataName| doc.metadata(name).ok().filter(|s| !s.trim().is_empty());
    let mut metadata = ExtractorMetadata::new(ExtractorKind::Pdf);
    metadata.title = get(MetadataName::Title);
    metadata.author = get(MetadataName::Author);
    metadata.creator = get(MetadataName::Creator);
    metadata.producer = get(MetadataName::Producer);
    metadata.creation_date = get(MetadataName::CreationDate);
    metadata.modification_date = get(MetadataName::ModDate);
    if let Some(format) = get(MetadataName::Format) {
        metadata = metadata.with_extra("format", format);
    }
    metadata
}

impl ExtractionUnit for PdfExtractor {
    fn source(&self) -> &Path {
        &self.path
    }

    fn page_count(&self) -> usize {
        self.page_count
    }

    fn metadata(&self) -> ExtractorMetadata {
        self.metadata.clone()
    }

    fn try_extract_page(&self, index: usize) -> Result<Page, ExtractError> {
        self.bytes.with(|bytes| self.read_page(bytes, index))?
    }

    fn spec(&self) -> Option<ExtractorSpec> {
        Some(ExtractorSpec::new(
            self.path.clone(),
            ExtractorKind::Pdf,
            self.options.clone(),
        ))
    }

    fn close(&self) -> Result<(), ExtractError> {
        if self.bytes.release().is_some() {
            tracing::debug!(path = %self.path.display(), "closed PDF");
        }
        Ok(())
    }
}
