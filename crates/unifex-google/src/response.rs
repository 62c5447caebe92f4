//! Document AI `Document` payload and its translation into unifex pages.
//!
//! Token geometry arrives as normalized vertices (0..1 of the page), so the
//! page can be built in whatever frame the caller knows the page extent in:
//! points for PDFs, the reported pixel dimension for images.

use serde::{Deserialize, Deserializer};

use unifex_core::{
    CoordinateInfo, CoordinateUnit, ExtractError, Page, Table, TableCell, TextBlock,
    polygon_to_bbox_and_rotation,
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Document {
    pub text: String,
    pub pages: Vec<DocumentPage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentPage {
    /// 1-based.
    pub page_number: usize,
    pub dimension: Option<Dimension>,
    pub tokens: Vec<Token>,
    pub tables: Vec<DocumentTable>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Dimension {
    pub width: f64,
    pub height: f64,
    /// Usually `pixels`.
    pub unit: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Layout {
    pub text_anchor: Option<TextAnchor>,
    pub confidence: Option<f64>,
    pub bounding_poly: Option<BoundingPoly>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextAnchor {
    pub text_segments: Vec<TextSegment>,
}

/// Character offsets into [`Document::text`]. The JSON encoding carries
/// them as strings and omits zeros.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextSegment {
    #[serde(deserialize_with = "int64")]
    pub start_index: usize,
    #[serde(deserialize_with = "int64")]
    pub end_index: usize,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BoundingPoly {
    /// Absolute, in the page's [`Dimension`] unit.
    pub vertices: Vec<Vertex>,
    pub normalized_vertices: Vec<Vertex>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Token {
    pub layout: Option<Layout>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentTable {
    pub layout: Option<Layout>,
    pub header_rows: Vec<TableRow>,
    pub body_rows: Vec<TableRow>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TableRow {
    pub cells: Vec<DocumentCell>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DocumentCell {
    pub layout: Option<Layout>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Int64 {
    Number(u64),
    Text(String),
}

fn int64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    match Int64::deserialize(deserializer)? {
        Int64::Number(n) => usize::try_from(n).map_err(serde::de::Error::custom),
        Int64::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// The extent normalized vertices are scaled to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub width: f64,
    pub height: f64,
    pub unit: CoordinateUnit,
}

impl DocumentPage {
    /// The page's own reported extent.
    pub fn frame(&self) -> Option<Frame> {
        let dim = self.dimension.as_ref().filter(|d| d.width > 0.0 && d.height > 0.0)?;
        let unit = match dim.unit.as_str() {
            "inches" | "inch" => CoordinateUnit::Inches,
            "points" => CoordinateUnit::Points,
            _ => CoordinateUnit::Pixels,
        };
        Some(Frame {
            width: dim.width,
            height: dim.height,
            unit,
        })
    }

    /// Normalized corners of a layout, from whichever vertex list is present.
    fn normalized_corners(&self, layout: &Layout) -> Vec<[f64; 2]> {
        let Some(poly) = &layout.bounding_poly else {
            return Vec::new();
        };
        if !poly.normalized_vertices.is_empty() {
            return poly.normalized_vertices.iter().map(|v| [v.x, v.y]).collect();
        }
        match self.dimension.as_ref().filter(|d| d.width > 0.0 && d.height > 0.0) {
            Some(dim) => poly
                .vertices
                .iter()
                .map(|v| [v.x / dim.width, v.y / dim.height])
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Character offset to byte offset lookup for [`Document::text`].
struct TextIndex<'a> {
    text: &'a str,
    offsets: Vec<usize>,
}

impl<'a> TextIndex<'a> {
    fn new(text: &'a str) -> Self {
        let offsets = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        Self { text, offsets }
    }

    fn slice(&self, start: usize, end: usize) -> Option<&'a str> {
        let from = *self.offsets.get(start)?;
        let to = *self.offsets.get(end)?;
        self.text.get(from..to)
    }

    /// Concatenated text of every segment, trimmed. Out-of-range segments
    /// contribute nothing.
    fn anchor_text(&self, layout: &Layout) -> String {
        let Some(anchor) = &layout.text_anchor else {
            return String::new();
        };
        anchor
            .text_segments
            .iter()
            .filter_map(|s| self.slice(s.start_index, s.end_index))
            .collect::<String>()
            .trim()
            .to_string()
    }
}

fn scaled(corners: &[[f64; 2]], frame: Frame) -> Vec<[f64; 2]> {
    corners
        .iter()
        .map(|[x, y]| [x * frame.width, y * frame.height])
        .collect()
}

/// Build page `index` (0-based), scaling normalized geometry to `frame`, or
/// to the page's reported dimension when `frame` is `None`.
///
/// Tokens without geometry or text are skipped. Table columns are cell
/// positions within their row; spans are not expanded.
pub fn to_page(document: &Document, index: usize, frame: Option<Frame>) -> Result<Page, ExtractError> {
    let analyzed = document
        .pages
        .iter()
        .find(|p| p.page_number == index + 1)
        .or_else(|| document.pages.get(index).filter(|p| p.page_number == 0))
        .ok_or_else(|| ExtractError::page(index, "page missing from processed document"))?;
    let frame = frame
        .or_else(|| analyzed.frame())
        .ok_or_else(|| ExtractError::page(index, "page has no dimension"))?;
    let text = TextIndex::new(&document.text);

    let mut page = Page::new(
        index,
        frame.width,
        frame.height,
        CoordinateInfo {
            unit: frame.unit,
            dpi: None,
        },
    );

    for token in &analyzed.tokens {
        let Some(layout) = &token.layout else {
            continue;
        };
        let corners = analyzed.normalized_corners(layout);
        if corners.len() < 4 {
            continue;
        }
        let content = text.anchor_text(layout);
        if content.is_empty() {
            continue;
        }
        let Some((bbox, rotation)) = polygon_to_bbox_and_rotation(&scaled(&corners, frame), frame.unit)
        else {
            continue;
        };
        let mut block = TextBlock::new(content, bbox).with_rotation(rotation);
        block.confidence = layout.confidence;
        page.texts.push(block);
    }

    for table in &analyzed.tables {
        let mut cells = Vec::new();
        let rows = table
            .header_rows
            .iter()
            .chain(&table.body_rows)
            .filter(|r| !r.cells.is_empty());
        for (row, table_row) in rows.enumerate() {
            for (col, cell) in table_row.cells.iter().enumerate() {
                let (content, bbox) = match &cell.layout {
                    Some(layout) => {
                        let corners = scaled(&analyzed.normalized_corners(layout), frame);
                        (
                            text.anchor_text(layout),
                            polygon_to_bbox_and_rotation(&corners, frame.unit).map(|(b, _)| b),
                        )
                    }
                    None => (String::new(), None),
                };
                cells.push(TableCell {
                    text: content,
                    row,
                    col,
                    bbox,
                });
            }
        }
        let bbox = table.layout.as_ref().and_then(|layout| {
            let corners = scaled(&analyzed.normalized_corners(layout), frame);
            polygon_to_bbox_and_rotation(&corners, frame.unit).map(|(b, _)| b)
        });
        let table = Table::from_cells(index, cells, bbox)
            .map_err(|e| ExtractError::page(index, format!("malformed table: {e}")))?;
        page.tables.push(table);
    }

    Ok(page)
}
