//! Extraction data model shared by every backend.
//!
//! Everything here is built once per extraction call and is immutable
//! afterwards; backends construct pages, the aggregator assembles them into
//! a [`Document`] owned by the returned [`ExtractionResult`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::PageError;

/// Closed set of extraction backends known at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractorKind {
    /// Native PDF text layer.
    Pdf,
    /// Local Tesseract OCR.
    Tesseract,
    /// Azure Document Intelligence.
    AzureDi,
    /// Google Document AI.
    GoogleDocai,
}

impl ExtractorKind {
    pub const ALL: [ExtractorKind; 4] = [Self::Pdf, Self::Tesseract, Self::AzureDi, Self::GoogleDocai];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Tesseract => "tesseract",
            Self::AzureDi => "azure-di",
            Self::GoogleDocai => "google-docai",
        }
    }

    /// Whether the backend only understands raster input and needs PDF pages
    /// rendered before detection.
    pub fn is_image_based(&self) -> bool {
        matches!(self, Self::Tesseract)
    }
}

impl fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|k| k.as_str()).collect();
                format!("unknown extractor '{s}' (expected one of: {})", names.join(", "))
            })
    }
}

/// Unit system a coordinate is expressed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateUnit {
    /// 1/72 inch, the PDF native unit.
    #[default]
    Points,
    /// Raster pixels at some resolution.
    Pixels,
    Inches,
    /// 0..1 relative to the page size.
    Normalized,
}

impl CoordinateUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Points => "points",
            Self::Pixels => "pixels",
            Self::Inches => "inches",
            Self::Normalized => "normalized",
        }
    }
}

impl fmt::Display for CoordinateUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoordinateUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "points" | "pt" => Ok(Self::Points),
            "pixels" | "px" => Ok(Self::Pixels),
            "inches" | "in" => Ok(Self::Inches),
            "normalized" => Ok(Self::Normalized),
            other => Err(format!("unknown coordinate unit '{other}'")),
        }
    }
}

/// Axis-aligned rectangle, top-left origin, `x0 <= x1` and `y0 <= y1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    #[serde(default)]
    pub unit: CoordinateUnit,
}

impl BBox {
    /// Build a box, swapping coordinates if they arrive inverted.
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64, unit: CoordinateUnit) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
            unit,
        }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
            unit: self.unit,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FontInfo {
    pub name: Option<String>,
    pub size: Option<f64>,
    pub flags: Option<u32>,
    pub weight: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
    pub bbox: BBox,
    /// Degrees, counter-clockwise from the positive x axis.
    pub rotation: Option<f64>,
    /// Only set by probabilistic producers (OCR, cloud, LLM).
    pub confidence: Option<f64>,
    pub font_info: Option<FontInfo>,
}

impl TextBlock {
    pub fn new(text: impl Into<String>, bbox: BBox) -> Self {
        Self {
            text: text.into(),
            bbox,
            rotation: None,
            confidence: None,
            font_info: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = Some(rotation);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    pub text: String,
    pub row: usize,
    pub col: usize,
    pub bbox: Option<BBox>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("table row indices are not contiguous: row {0} has no cells")]
    MissingRow(usize),
    #[error("table column indices are not contiguous: column {0} has no cells")]
    MissingColumn(usize),
    #[error("table cell ({row}, {col}) is outside a table of {cells} cells")]
    CellOutOfRange { row: usize, col: usize, cells: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// 0-based page index.
    pub page: usize,
    pub cells: Vec<TableCell>,
    pub row_count: usize,
    pub col_count: usize,
    pub bbox: Option<BBox>,
}

impl Table {
    /// Build a table, checking that the rows and columns in use form
    /// contiguous 0-based ranges.
    ///
    /// Contiguous indices never reach the number of cells, so any index at
    /// or past it is rejected before the occupancy grid is sized.
    pub fn from_cells(
        page: usize,
        cells: Vec<TableCell>,
        bbox: Option<BBox>,
    ) -> Result<Self, TableError> {
        if let Some(cell) = cells.iter().find(|c| c.row >= cells.len() || c.col >= cells.len()) {
            return Err(TableError::CellOutOfRange {
                row: cell.row,
                col: cell.col,
                cells: cells.len(),
            });
        }
        let row_count = cells.iter().map(|c| c.row + 1).max().unwrap_or(0);
        let col_count = cells.iter().map(|c| c.col + 1).max().unwrap_or(0);

        let mut rows = vec![false; row_count];
        let mut cols = vec![false; col_count];
        for cell in &cells {
            rows[cell.row] = true;
            cols[cell.col] = true;
        }
        if let Some(row) = rows.iter().position(|seen| !seen) {
            return Err(TableError::MissingRow(row));
        }
        if let Some(col) = cols.iter().position(|seen| !seen) {
            return Err(TableError::MissingColumn(col));
        }

        Ok(Self {
            page,
            cells,
            row_count,
            col_count,
            bbox,
        })
    }

    /// Dense row-major grid; missing cells are empty strings.
    pub fn to_grid(&self) -> Vec<Vec<String>> {
        let mut grid = vec![vec![String::new(); self.col_count]; self.row_count];
        for cell in &self.cells {
            if let Some(slot) = grid.get_mut(cell.row).and_then(|r| r.get_mut(cell.col)) {
                *slot = cell.text.clone();
            }
        }
        grid
    }
}

/// The coordinate system a page's geometry is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateInfo {
    pub unit: CoordinateUnit,
    /// Resolution bridging pixels and points, when known.
    pub dpi: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// 0-based page index.
    pub page: usize,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub texts: Vec<TextBlock>,
    #[serde(default)]
    pub tables: Vec<Table>,
    pub coordinate_info: Option<CoordinateInfo>,
}

impl Page {
    pub fn new(page: usize, width: f64, height: f64, info: CoordinateInfo) -> Self {
        Self {
            page,
            width,
            height,
            texts: Vec::new(),
            tables: Vec::new(),
            coordinate_info: Some(info),
        }
    }

    /// The unit this page's geometry is declared in.
    pub fn unit(&self) -> CoordinateUnit {
        self.coordinate_info.map(|c| c.unit).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorMetadata {
    pub extractor_type: ExtractorKind,
    pub title: Option<String>,
    pub author: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    /// Backend-specific extras (`ocr_engine`, `languages`, `dpi`, ...).
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ExtractorMetadata {
    pub fn new(extractor_type: ExtractorKind) -> Self {
        Self {
            extractor_type,
            title: None,
            author: None,
            creator: None,
            producer: None,
            creation_date: None,
            modification_date: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub path: PathBuf,
    /// Always in ascending page-index order.
    pub pages: Vec<Page>,
    pub metadata: Option<ExtractorMetadata>,
}

/// Outcome of one page task: exactly one of page or error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageExtractionResult {
    pub page: usize,
    pub outcome: Result<Page, PageError>,
}

impl PageExtractionResult {
    pub fn success(page: Page) -> Self {
        Self {
            page: page.page,
            outcome: Ok(page),
        }
    }

    pub fn failure(error: PageError) -> Self {
        Self {
            page: error.page,
            outcome: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn page_data(&self) -> Option<&Page> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&PageError> {
        self.outcome.as_ref().err()
    }
}

/// Aggregated outcome of a whole job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Successfully extracted pages only, ascending by index.
    pub document: Document,
    /// True iff `failed_pages` is empty.
    pub success: bool,
    pub failed_pages: BTreeMap<usize, PageError>,
}

impl ExtractionResult {
    pub fn failure_count(&self) -> usize {
        self.failed_pages.len()
    }
}
