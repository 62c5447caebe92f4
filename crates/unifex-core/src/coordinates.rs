//! Conversion of geometry between coordinate units.
//!
//! POINTS, INCHES and PIXELS are physical units bridged by a fixed 72 points
//! per inch and, for pixels, the page resolution. NORMALIZED is relative to
//! the page extent, which is expressed in the page's own declared unit.
//!
//! Everything here is pure: no state, safe from any number of workers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{BBox, CoordinateInfo, CoordinateUnit, Page, Table, TextBlock};

pub const POINTS_PER_INCH: f64 = 72.0;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateError {
    #[error("converting {from} to {to} requires a resolution (dpi)")]
    MissingResolution {
        from: CoordinateUnit,
        to: CoordinateUnit,
    },
    #[error("converting to or from normalized coordinates requires non-zero page dimensions")]
    MissingPageDimensions,
}

/// Page geometry needed to interpret coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageContext {
    pub width: Option<f64>,
    pub height: Option<f64>,
    /// Unit `width` and `height` are expressed in.
    pub unit: CoordinateUnit,
    pub dpi: Option<f64>,
}

impl PageContext {
    pub fn new(width: f64, height: f64, unit: CoordinateUnit) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            unit,
            dpi: None,
        }
    }

    /// Context with no page extent; only physical conversions succeed.
    pub fn without_dimensions(unit: CoordinateUnit) -> Self {
        Self {
            width: None,
            height: None,
            unit,
            dpi: None,
        }
    }

    pub fn with_dpi(mut self, dpi: Option<f64>) -> Self {
        self.dpi = dpi.filter(|d| *d > 0.0);
        self
    }

    pub fn for_page(page: &Page) -> Self {
        let info = page.coordinate_info.unwrap_or(CoordinateInfo {
            unit: CoordinateUnit::Points,
            dpi: None,
        });
        Self::new(page.width, page.height, info.unit).with_dpi(info.dpi)
    }
}

#[derive(Clone, Copy)]
enum Axis {
    X,
    Y,
}

fn extent(ctx: &PageContext, axis: Axis) -> Result<f64, CoordinateError> {
    let value = match axis {
        Axis::X => ctx.width,
        Axis::Y => ctx.height,
    };
    match value {
        Some(v) if v.is_finite() && v > 0.0 && ctx.unit != CoordinateUnit::Normalized => Ok(v),
        _ => Err(CoordinateError::MissingPageDimensions),
    }
}

/// Convert between two physical units (anything but NORMALIZED).
fn physical(
    value: f64,
    from: CoordinateUnit,
    to: CoordinateUnit,
    dpi: Option<f64>,
) -> Result<f64, CoordinateError> {
    if from == to {
        return Ok(value);
    }
    let need_dpi = || dpi.ok_or(CoordinateError::MissingResolution { from, to });
    let points = match from {
        CoordinateUnit::Points => value,
        CoordinateUnit::Inches => value * POINTS_PER_INCH,
        CoordinateUnit::Pixels => value * POINTS_PER_INCH / need_dpi()?,
        CoordinateUnit::Normalized => return Err(CoordinateError::MissingPageDimensions),
    };
    match to {
        CoordinateUnit::Points => Ok(points),
        CoordinateUnit::Inches => Ok(points / POINTS_PER_INCH),
        CoordinateUnit::Pixels => Ok(points * need_dpi()? / POINTS_PER_INCH),
        CoordinateUnit::Normalized => Err(CoordinateError::MissingPageDimensions),
    }
}

fn convert_value(
    value: f64,
    axis: Axis,
    from: CoordinateUnit,
    to: CoordinateUnit,
    ctx: &PageContext,
) -> Result<f64, CoordinateError> {
    use CoordinateUnit::Normalized;
    match (from, to) {
        (a, b) if a == b => Ok(value),
        (Normalized, _) => physical(value * extent(ctx, axis)?, ctx.unit, to, ctx.dpi),
        (_, Normalized) => Ok(physical(value, from, ctx.unit, ctx.dpi)? / extent(ctx, axis)?),
        _ => physical(value, from, to, ctx.dpi),
    }
}

/// Convert a box from `from` to `to` within the given page context.
///
/// Fails with [`CoordinateError::MissingResolution`] when pixels are bridged
/// to a physical unit without a dpi, and with
/// [`CoordinateError::MissingPageDimensions`] when NORMALIZED is involved and
/// the page extent is absent or zero.
pub fn convert(
    bbox: &BBox,
    from: CoordinateUnit,
    to: CoordinateUnit,
    ctx: &PageContext,
) -> Result<BBox, CoordinateError> {
    Ok(BBox::new(
        convert_value(bbox.x0, Axis::X, from, to, ctx)?,
        convert_value(bbox.y0, Axis::Y, from, to, ctx)?,
        convert_value(bbox.x1, Axis::X, from, to, ctx)?,
        convert_value(bbox.y1, Axis::Y, from, to, ctx)?,
        to,
    ))
}

/// Converts whole structures out of one source unit.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateConverter {
    source_unit: CoordinateUnit,
    ctx: PageContext,
}

impl CoordinateConverter {
    pub fn new(source_unit: CoordinateUnit, ctx: PageContext) -> Self {
        Self { source_unit, ctx }
    }

    pub fn convert_bbox(&self, bbox: &BBox, to: CoordinateUnit) -> Result<BBox, CoordinateError> {
        convert(bbox, self.source_unit, to, &self.ctx)
    }

    pub fn convert_text_block(
        &self,
        block: &TextBlock,
        to: CoordinateUnit,
    ) -> Result<TextBlock, CoordinateError> {
        Ok(TextBlock {
            bbox: self.convert_bbox(&block.bbox, to)?,
            ..block.clone()
        })
    }

    pub fn convert_table(&self, table: &Table, to: CoordinateUnit) -> Result<Table, CoordinateError> {
        let mut out = table.clone();
        if let Some(bbox) = &table.bbox {
            out.bbox = Some(self.convert_bbox(bbox, to)?);
        }
        for cell in &mut out.cells {
            if let Some(bbox) = &cell.bbox {
                cell.bbox = Some(self.convert_bbox(bbox, to)?);
            }
        }
        Ok(out)
    }
}

/// Re-express a page (extent, text blocks and tables) in `to`.
pub fn convert_page(page: Page, to: CoordinateUnit) -> Result<Page, CoordinateError> {
    let from = page.unit();
    if from == to {
        return Ok(page);
    }
    let ctx = PageContext::for_page(&page);
    let converter = CoordinateConverter::new(from, ctx);

    let (width, height) = if to == CoordinateUnit::Normalized {
        (1.0, 1.0)
    } else {
        (
            convert_value(page.width, Axis::X, from, to, &ctx)?,
            convert_value(page.height, Axis::Y, from, to, &ctx)?,
        )
    };

    let texts = page
        .texts
        .iter()
        .map(|t| converter.convert_text_block(t, to))
        .collect::<Result<Vec<_>, _>>()?;
    let tables = page
        .tables
        .iter()
        .map(|t| converter.convert_table(t, to))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page {
        page: page.page,
        width,
        height,
        texts,
        tables,
        coordinate_info: Some(CoordinateInfo { unit: to, dpi: ctx.dpi }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use CoordinateUnit::*;

    const UNITS: [CoordinateUnit; 4] = [Points, Pixels, Inches, Normalized];

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-6 * a.abs().max(b.abs()).max(1.0)
    }

    fn assert_bbox_close(a: &BBox, b: &BBox) {
        assert!(
            close(a.x0, b.x0) && close(a.y0, b.y0) && close(a.x1, b.x1) && close(a.y1, b.y1),
            "{a:?} != {b:?}"
        );
    }

    #[test]
    fn test_points_to_pixels_uses_dpi() {
        let ctx = PageContext::new(595.0, 842.0, Points).with_dpi(Some(144.0));
        let b = BBox::new(72.0, 36.0, 144.0, 72.0, Points);
        let px = convert(&b, Points, Pixels, &ctx).unwrap();
        assert_eq!((px.x0, px.y0, px.x1, px.y1), (144.0, 72.0, 288.0, 144.0));
        assert_eq!(px.unit, Pixels);
    }

    #[test]
    fn test_inches_to_points() {
        let ctx = PageContext::without_dimensions(Inches);
        let b = BBox::new(1.0, 0.5, 2.0, 1.0, Inches);
        let pt = convert(&b, Inches, Points, &ctx).unwrap();
        assert_eq!((pt.x0, pt.y0, pt.x1, pt.y1), (72.0, 36.0, 144.0, 72.0));
    }

    #[test]
    fn test_missing_dpi_fails() {
        let ctx = PageContext::new(595.0, 842.0, Points);
        let b = BBox::new(0.0, 0.0, 10.0, 10.0, Points);
        assert_eq!(
            convert(&b, Points, Pixels, &ctx).unwrap_err(),
            CoordinateError::MissingResolution { from: Points, to: Pixels }
        );
    }

    #[test]
    fn test_pixels_to_normalized_needs_no_dpi() {
        let ctx = PageContext::new(1000.0, 500.0, Pixels);
        let b = BBox::new(100.0, 50.0, 500.0, 250.0, Pixels);
        let n = convert(&b, Pixels, Normalized, &ctx).unwrap();
        assert_eq!((n.x0, n.y0, n.x1, n.y1), (0.1, 0.1, 0.5, 0.5));
    }

    #[test]
    fn test_normalized_without_dimensions_fails() {
        let b = BBox::new(0.1, 0.1, 0.2, 0.2, Normalized);
        let no_dims = PageContext::without_dimensions(Points);
        assert_eq!(
            convert(&b, Normalized, Points, &no_dims).unwrap_err(),
            CoordinateError::MissingPageDimensions
        );
        let zero = PageContext::new(0.0, 842.0, Points);
        assert_eq!(
            convert(&b, Normalized, Points, &zero).unwrap_err(),
            CoordinateError::MissingPageDimensions
        );
    }

    #[test]
    fn test_round_trip_all_unit_pairs() {
        let ctx = PageContext::new(612.0, 792.0, Points).with_dpi(Some(300.0));
        let boxes = [
            BBox::new(48.0, 57.0, 200.0, 74.0, Points),
            BBox::new(0.0, 0.0, 612.0, 792.0, Points),
            BBox::new(0.333, 12.5, 1.0 / 3.0 * 100.0, 700.123456, Points),
        ];
        for original in &boxes {
            for from in UNITS {
                let start = convert(original, Points, from, &ctx).unwrap();
                for to in UNITS {
                    let there = convert(&start, from, to, &ctx).unwrap();
                    let back = convert(&there, to, from, &ctx).unwrap();
                    assert_bbox_close(&back, &start);
                }
            }
        }
    }

    #[test]
    fn test_convert_page_rescales_extent_and_blocks() {
        let mut page = Page::new(
            0,
            1700.0,
            2200.0,
            CoordinateInfo {
                unit: Pixels,
                dpi: Some(200.0),
            },
        );
        page.texts.push(TextBlock::new("hi", BBox::new(200.0, 400.0, 400.0, 600.0, Pixels)));

        let pts = convert_page(page, Points).unwrap();
        assert!(close(pts.width, 612.0));
        assert!(close(pts.height, 792.0));
        assert_eq!(pts.unit(), Points);
        let b = pts.texts[0].bbox;
        assert!(close(b.x0, 72.0) && close(b.y1, 216.0));

        let norm = convert_page(pts, Normalized).unwrap();
        assert_eq!((norm.width, norm.height), (1.0, 1.0));
        assert!(norm.texts[0].bbox.x1 <= 1.0);
    }
}
