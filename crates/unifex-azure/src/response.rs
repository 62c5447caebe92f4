//! Analyze-result payload and its translation into unifex pages.

use serde::Deserialize;

use unifex_core::{
    BBox, CoordinateInfo, CoordinateUnit, ExtractError, Page, Table, TableCell, TextBlock,
    flat_to_points, polygon_to_bbox_and_rotation,
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzeResult {
    pub model_id: Option<String>,
    pub pages: Vec<AnalyzedPage>,
    pub tables: Vec<AnalyzedTable>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzedPage {
    /// 1-based.
    pub page_number: usize,
    pub width: f64,
    pub height: f64,
    /// `inch` for PDFs, `pixel` for images.
    pub unit: String,
    pub words: Vec<Word>,
    pub lines: Vec<Line>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct Span {
    pub offset: usize,
    pub length: usize,
}

impl Span {
    fn contains(&self, other: &Span) -> bool {
        other.offset >= self.offset && other.offset + other.length <= self.offset + self.length
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Word {
    pub content: String,
    pub polygon: Vec<f64>,
    pub confidence: f64,
    pub span: Span,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Line {
    pub content: String,
    pub polygon: Vec<f64>,
    pub spans: Vec<Span>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BoundingRegion {
    pub page_number: usize,
    pub polygon: Vec<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzedCell {
    pub row_index: usize,
    pub column_index: usize,
    pub content: String,
    pub bounding_regions: Vec<BoundingRegion>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzedTable {
    pub row_count: Option<usize>,
    pub column_count: Option<usize>,
    pub cells: Vec<AnalyzedCell>,
    pub bounding_regions: Vec<BoundingRegion>,
}

impl AnalyzeResult {
    pub fn page(&self, index: usize) -> Option<&AnalyzedPage> {
        self.pages.iter().find(|p| p.page_number == index + 1)
    }
}

impl AnalyzedPage {
    pub fn coordinate_unit(&self) -> CoordinateUnit {
        match self.unit.as_str() {
            "inch" => CoordinateUnit::Inches,
            _ => CoordinateUnit::Pixels,
        }
    }

    /// Mean confidence of the words inside a line's spans.
    fn line_confidence(&self, line: &Line) -> Option<f64> {
        let scores: Vec<f64> = self
            .words
            .iter()
            .filter(|w| line.spans.iter().any(|s| s.contains(&w.span)))
            .map(|w| w.confidence)
            .collect();
        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }
}

fn region_bbox(polygon: &[f64], unit: CoordinateUnit) -> Option<(BBox, f64)> {
    polygon_to_bbox_and_rotation(&flat_to_points(polygon), unit)
}

/// Build page `index` (0-based) in the page's native unit.
pub fn to_page(result: &AnalyzeResult, index: usize) -> Result<Page, ExtractError> {
    let analyzed = result
        .page(index)
        .ok_or_else(|| ExtractError::page(index, "page missing from analysis result"))?;
    let unit = analyzed.coordinate_unit();
    let mut page = Page::new(
        index,
        analyzed.width,
        analyzed.height,
        CoordinateInfo { unit, dpi: None },
    );

    for line in &analyzed.lines {
        let Some((bbox, rotation)) = region_bbox(&line.polygon, unit) else {
            continue;
        };
        let mut block = TextBlock::new(line.content.clone(), bbox).with_rotation(rotation);
        block.confidence = analyzed.line_confidence(line);
        page.texts.push(block);
    }

    for table in &result.tables {
        let Some(region) = table.bounding_regions.iter().find(|r| r.page_number == index + 1) else {
            continue;
        };
        if let Some(cell) = table.cells.iter().find(|c| {
            table.row_count.is_some_and(|n| c.row_index >= n)
                || table.column_count.is_some_and(|n| c.column_index >= n)
        }) {
            return Err(ExtractError::page(
                index,
                format!(
                    "malformed table: cell ({}, {}) outside declared {}x{} grid",
                    cell.row_index,
                    cell.column_index,
                    table.row_count.unwrap_or_default(),
                    table.column_count.unwrap_or_default()
                ),
            ));
        }
        let cells = table
            .cells
            .iter()
            .map(|cell| TableCell {
                text: cell.content.clone(),
                row: cell.row_index,
                col: cell.column_index,
                bbox: cell
                    .bounding_regions
                    .first()
                    .and_then(|r| region_bbox(&r.polygon, unit))
                    .map(|(bbox, _)| bbox),
            })
            .collect();
        let bbox = region_bbox(&region.polygon, unit).map(|(bbox, _)| bbox);
        let table = Table::from_cells(index, cells, bbox)
            .map_err(|e| ExtractError::page(index, format!("malformed table: {e}")))?;
        page.tables.push(table);
    }

    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AnalyzeResult {
        serde_json::from_str(
            r#"{
              "modelId": "prebuilt-layout",
              "pages": [{
                "pageNumber": 1, "width": 8.5, "height": 11, "unit": "inch",
                "words": [
                  {"content": "Hello", "polygon": [1,1, 1.5,1, 1.5,1.2, 1,1.2], "confidence": 0.9, "span": {"offset": 0, "length": 5}},
                  {"content": "World", "polygon": [1.6,1, 2,1, 2,1.2, 1.6,1.2], "confidence": 0.7, "span": {"offset": 6, "length": 5}},
                  {"content": "Total", "polygon": [1,3, 1.4,3, 1.4,3.2, 1,3.2], "confidence": 0.5, "span": {"offset": 12, "length": 5}}
                ],
                "lines": [
                  {"content": "Hello World", "polygon": [1,1, 2,1, 2,1.2, 1,1.2], "spans": [{"offset": 0, "length": 11}]},
                  {"content": "Total", "polygon": [1,3, 1.4,3, 1.4,3.2, 1,3.2], "spans": [{"offset": 12, "length": 5}]}
                ]
              }],
              "tables": [{
                "rowCount": 1, "columnCount": 2,
                "boundingRegions": [{"pageNumber": 1, "polygon": [1,3, 3,3, 3,4, 1,4]}],
                "cells": [
                  {"rowIndex": 0, "columnIndex": 0, "content": "Total", "boundingRegions": [{"pageNumber": 1, "polygon": [1,3, 2,3, 2,4, 1,4]}]},
                  {"rowIndex": 0, "columnIndex": 1, "content": "42", "boundingRegions": [{"pageNumber": 1, "polygon": [2,3, 3,3, 3,4, 2,4]}]}
                ]
              }]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn lines_carry_mean_word_confidence() {
        let page = to_page(&sample(), 0).unwrap();
        assert_eq!(page.unit(), CoordinateUnit::Inches);
        assert_eq!(page.texts.len(), 2);
        assert_eq!(page.texts[0].text, "Hello World");
        assert!((page.texts[0].confidence.unwrap() - 0.8).abs() < 1e-9);
        assert_eq!(page.texts[1].confidence, Some(0.5));
        let b = page.texts[0].bbox;
        assert_eq!((b.x0, b.y0, b.x1, b.y1), (1.0, 1.0, 2.0, 1.2));
    }

    #[test]
    fn tables_are_attached_to_their_page() {
        let page = to_page(&sample(), 0).unwrap();
        assert_eq!(page.tables.len(), 1);
        let table = &page.tables[0];
        assert_eq!((table.row_count, table.col_count), (1, 2));
        assert_eq!(table.to_grid(), vec![vec!["Total".to_string(), "42".to_string()]]);
        assert_eq!(table.cells[1].bbox.unwrap().x0, 2.0);
    }

    #[test]
    fn missing_page_fails_that_page() {
        let err = to_page(&sample(), 3).unwrap_err();
        assert!(matches!(err, ExtractError::PageExtraction { page: 3, .. }));
    }

    #[test]
    fn cell_outside_declared_grid_fails_the_page() {
        let mut result = sample();
        result.tables[0].cells[1].row_index = 7;
        let err = to_page(&result, 0).unwrap_err();
        assert!(matches!(err, ExtractError::PageExtraction { page: 0, .. }));
        assert!(err.to_string().contains("outside declared 1x2 grid"), "{err}");
    }

    #[test]
    fn huge_cell_index_fails_the_page_without_counts() {
        let mut result = sample();
        result.tables[0].row_count = None;
        result.tables[0].column_count = None;
        result.tables[0].cells[0].row_index = usize::MAX;
        let err = to_page(&result, 0).unwrap_err();
        assert!(matches!(err, ExtractError::PageExtraction { page: 0, .. }));
        assert!(err.to_string().contains("malformed table"), "{err}");
    }

    #[test]
    fn pixel_unit_for_images() {
        let mut result = sample();
        result.pages[0].unit = "pixel".into();
        assert_eq!(to_page(&result, 0).unwrap().unit(), CoordinateUnit::Pixels);
    }
}
