use image::RgbImage;
use mupdf::{Colorspace, Matrix};

use unifex_core::{ExtractError, POINTS_PER_INCH};

use crate::{open_document, page_error};

/// Number of pages in a PDF held in memory.
pub fn page_count(bytes: &[u8]) -> Result<usize, ExtractError> {
    let doc = open_document(bytes)
        .map_err(|e| ExtractError::BackendInit(format!("cannot open PDF: {e}")))?;
    let count = doc
        .page_count()
        .map_err(|e| ExtractError::BackendInit(format!("cannot count PDF pages: {e}")))?;
    Ok(count.max(0) as usize)
}

/// Width and height of one page, in points.
pub fn page_size(bytes: &[u8], index: usize) -> Result<(f64, f64), ExtractError> {
    let doc = open_document(bytes).map_err(|e| page_error(index, e))?;
    let page = doc.load_page(index as i32).map_err(|e| page_error(index, e))?;
    let bounds = page.bounds().map_err(|e| page_error(index, e))?;
    Ok(((bounds.x1 - bounds.x0) as f64, (bounds.y1 - bounds.y0) as f64))
}

/// Rasterize one page at `dpi` to an RGB image.
///
/// Pixel `(x, y)` of the result covers PDF user-space point
/// `(x * 72 / dpi, y * 72 / dpi)` from the page's top-left corner.
pub fn render_page(bytes: &[u8], index: usize, dpi: u32) -> Result<RgbImage, ExtractError> {
    let doc = open_document(bytes).map_err(|e| page_error(index, e))?;
    let page = doc.load_page(index as i32).map_err(|e| page_error(index, e))?;

    let scale = dpi as f32 / POINTS_PER_INCH as f32;
    let matrix = Matrix::new_scale(scale, scale);
    let pixmap = page
        .to_pixmap(&matrix, &Colorspace::device_rgb(), false, false)
        .map_err(|e| page_error(index, e))?;

    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let samples = pixmap.samples();
    let n = (pixmap.n() as usize).max(1);
    // Rows may be padded; derive the stride from the buffer.
    let stride = if height > 0 { samples.len() / height as usize } else { 0 };

    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height as usize {
        for x in 0..width as usize {
            let offset = y * stride + x * n;
            let r = samples.get(offset).copied().unwrap_or(255);
            let (g, b) = if n >= 3 {
                (
                    samples.get(offset + 1).copied().unwrap_or(255),
                    samples.get(offset + 2).copied().unwrap_or(255),
                )
            } else {
                (r, r)
            };
            rgb.extend_from_slice(&[r, g, b]);
        }
    }

    tracing::debug!(page = index, dpi, width, height, "rendered page");
    RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| ExtractError::page(index, "rendered pixmap has an unexpected size"))
}
