//! Image-route tests driven by a deterministic in-process engine.

use image::RgbImage;

use unifex_core::testing::write_text_pdf;
use unifex_core::{
    CoordinateUnit, ErrorKind, ExtractOptions, ExtractionUnit, ExtractorKind, ExtractorOptions,
    extract,
};
use unifex_ocr::{Detection, ImageExtractor, OcrEngine, OcrError};

/// Reports one detection spanning every dark pixel.
#[derive(Clone)]
struct InkEngine;

impl OcrEngine for InkEngine {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Tesseract
    }

    fn name(&self) -> &str {
        "ink"
    }

    fn languages(&self) -> Vec<String> {
        vec!["eng".into()]
    }

    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, OcrError> {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, pixel) in image.enumerate_pixels() {
            if pixel.0.iter().all(|&c| c > 128) {
                continue;
            }
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
        Ok(bounds
            .map(|(x0, y0, x1, y1)| {
                Detection::rect("ink", x0 as f64, y0 as f64, (x1 + 1) as f64, (y1 + 1) as f64, 0.9)
            })
            .into_iter()
            .collect())
    }
}

fn one_page_pdf(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("scan.pdf");
    write_text_pdf(&path, &["Hello World"]).unwrap();
    path
}

#[test]
fn pdf_route_matches_manually_rendered_image() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = one_page_pdf(&dir);

    let bytes = std::fs::read(&pdf).unwrap();
    let png = dir.path().join("page0.png");
    unifex_pdf_mupdf::render_page(&bytes, 0, 100)
        .unwrap()
        .save(&png)
        .unwrap();

    let options = ExtractorOptions::default()
        .with_dpi(100)
        .with_output_unit(CoordinateUnit::Pixels);
    let from_pdf = ImageExtractor::open(&pdf, InkEngine, options.clone()).unwrap();
    let from_png = ImageExtractor::open(&png, InkEngine, options).unwrap();
    assert_eq!(from_pdf.page_count(), 1);
    assert_eq!(from_png.page_count(), 1);

    let a = from_pdf.try_extract_page(0).unwrap();
    let b = from_png.try_extract_page(0).unwrap();
    assert_eq!((a.width, a.height), (b.width, b.height));
    assert_eq!(a.texts, b.texts);
    assert_eq!(a.coordinate_info.unwrap().dpi, Some(100.0));
    assert_eq!(b.coordinate_info.unwrap().dpi, None);
}

#[test]
fn pdf_pages_default_to_points() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = one_page_pdf(&dir);
    let unit = ImageExtractor::open(&pdf, InkEngine, ExtractorOptions::default().with_dpi(144)).unwrap();

    let page = unit.try_extract_page(0).unwrap();
    assert_eq!(page.unit(), CoordinateUnit::Points);
    assert!((page.width - 612.0).abs() < 1.0, "{}", page.width);
    let block = &page.texts[0];
    assert_eq!(block.confidence, Some(0.9));
    assert_eq!(block.rotation, Some(0.0));
    // Text starts at x=72pt.
    assert!(block.bbox.x0 > 70.0 && block.bbox.x0 < 80.0, "{:?}", block.bbox);

    let metadata = unit.metadata();
    assert_eq!(metadata.extra["ocr_engine"], "ink");
    assert_eq!(metadata.extra["dpi"], 144);
}

#[test]
fn raster_image_cannot_be_converted_to_points() {
    let dir = tempfile::tempdir().unwrap();
    let png = dir.path().join("blank.png");
    RgbImage::from_pixel(40, 20, image::Rgb([0, 0, 0])).save(&png).unwrap();

    let options = ExtractorOptions::default().with_output_unit(CoordinateUnit::Points);
    let unit = ImageExtractor::open(&png, InkEngine, options).unwrap();
    let result = extract(&unit, &ExtractOptions::new()).unwrap();
    assert!(!result.success);
    assert_eq!(result.failed_pages[&0].kind, ErrorKind::MissingResolution);
}

#[test]
fn raster_image_defaults_to_pixels() {
    let dir = tempfile::tempdir().unwrap();
    let png = dir.path().join("block.png");
    let mut image = RgbImage::from_pixel(100, 50, image::Rgb([255, 255, 255]));
    for x in 10..30 {
        for y in 5..15 {
            image.put_pixel(x, y, image::Rgb([0, 0, 0]));
        }
    }
    image.save(&png).unwrap();

    let unit = ImageExtractor::open(&png, InkEngine, ExtractorOptions::default()).unwrap();
    let page = unit.try_extract_page(0).unwrap();
    assert_eq!(page.unit(), CoordinateUnit::Pixels);
    let b = page.texts[0].bbox;
    assert_eq!((b.x0, b.y0, b.x1, b.y1), (10.0, 5.0, 30.0, 15.0));
}

#[test]
fn siblings_share_source_and_close_independently() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = one_page_pdf(&dir);
    let unit = ImageExtractor::open(&pdf, InkEngine, ExtractorOptions::default()).unwrap();
    let sibling = unit.open_sibling().unwrap();
    sibling.close().unwrap();
    assert!(unit.try_extract_page(0).is_ok());
    unit.close().unwrap();
    assert!(!unit.extract_page(0).is_success());
    assert_eq!(unit.spec().unwrap().kind, ExtractorKind::Tesseract);
}

#[test]
#[ignore = "requires a tesseract installation"]
fn tesseract_reads_rendered_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = one_page_pdf(&dir);
    let options = ExtractorOptions::default();
    let engine = unifex_ocr::TesseractEngine::new(&options).unwrap();
    let unit = ImageExtractor::open(&pdf, engine, options).unwrap();
    let result = extract(&unit, &ExtractOptions::new()).unwrap();
    let text: Vec<_> = result.document.pages[0]
        .texts
        .iter()
        .map(|b| b.text.as_str())
        .collect();
    assert!(text.join(" ").contains("Hello"), "{text:?}");
}
