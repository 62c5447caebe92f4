//! Test doubles and fixtures, shared with other crates through the
//! `test-util` feature.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::ExtractError;
use crate::models::{
    BBox, CoordinateInfo, CoordinateUnit, ExtractorKind, ExtractorMetadata, Page, TextBlock,
};
use crate::options::ExtractorSpec;
use crate::unit::{Concurrency, ExtractionUnit, Resource};

/// Shared atomic counter handed out by [`FakeUnit`].
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[derive(Debug, Clone, Default)]
struct Behaviour {
    failing: BTreeSet<usize>,
    panicking: BTreeSet<usize>,
    delays: BTreeMap<usize, Duration>,
    fail_sibling_open: bool,
}

/// In-memory extraction unit with scripted per-page behaviour.
///
/// Page `i` contains a single block reading `page i` at a position derived
/// from `i`, so results from different runs compare equal.
#[derive(Debug)]
pub struct FakeUnit {
    path: PathBuf,
    page_count: usize,
    concurrency: Concurrency,
    behaviour: Arc<Behaviour>,
    spec: Option<ExtractorSpec>,
    handle: Resource<()>,
    busy: AtomicBool,
    releases: Counter,
    siblings: Counter,
    started: Counter,
    overlaps: Counter,
}

impl FakeUnit {
    pub fn new(page_count: usize) -> Self {
        Self {
            path: PathBuf::from("fake.pdf"),
            page_count,
            concurrency: Concurrency::Reentrant,
            behaviour: Arc::new(Behaviour::default()),
            spec: None,
            handle: Resource::new("fake handle", ()),
            busy: AtomicBool::new(false),
            releases: Counter::default(),
            siblings: Counter::default(),
            started: Counter::default(),
            overlaps: Counter::default(),
        }
    }

    fn behaviour_mut(&mut self) -> &mut Behaviour {
        Arc::make_mut(&mut self.behaviour)
    }

    pub fn failing_on(mut self, index: usize) -> Self {
        self.behaviour_mut().failing.insert(index);
        self
    }

    pub fn panicking_on(mut self, index: usize) -> Self {
        self.behaviour_mut().panicking.insert(index);
        self
    }

    pub fn with_delay(mut self, index: usize, delay: Duration) -> Self {
        self.behaviour_mut().delays.insert(index, delay);
        self
    }

    /// Delay every page by the same amount.
    pub fn with_uniform_delay(mut self, delay: Duration) -> Self {
        for index in 0..self.page_count {
            self.behaviour_mut().delays.insert(index, delay);
        }
        self
    }

    pub fn exclusive(mut self) -> Self {
        self.concurrency = Concurrency::Exclusive;
        self
    }

    pub fn failing_sibling_open(mut self) -> Self {
        self.behaviour_mut().fail_sibling_open = true;
        self
    }

    pub fn with_spec(mut self, spec: ExtractorSpec) -> Self {
        self.spec = Some(spec);
        self
    }

    /// Number of handle releases across this unit and all its siblings.
    pub fn release_counter(&self) -> Counter {
        self.releases.clone()
    }

    /// Number of siblings opened.
    pub fn sibling_counter(&self) -> Counter {
        self.siblings.clone()
    }

    /// Number of page extractions started.
    pub fn started_counter(&self) -> Counter {
        self.started.clone()
    }

    /// Number of times an exclusive handle was entered while already busy.
    pub fn overlap_counter(&self) -> Counter {
        self.overlaps.clone()
    }

    /// The page a successful extraction of `index` yields.
    pub fn expected_page(index: usize) -> Page {
        let mut page = Page::new(
            index,
            612.0,
            792.0,
            CoordinateInfo {
                unit: CoordinateUnit::Points,
                dpi: None,
            },
        );
        let y = 72.0 + (index % 40) as f64 * 12.0;
        page.texts.push(TextBlock::new(
            format!("page {index}"),
            BBox::new(72.0, y, 144.0, y + 10.0, CoordinateUnit::Points),
        ));
        page
    }
}

impl ExtractionUnit for FakeUnit {
    fn source(&self) -> &Path {
        &self.path
    }

    fn page_count(&self) -> usize {
        self.page_count
    }

    fn metadata(&self) -> ExtractorMetadata {
        ExtractorMetadata::new(ExtractorKind::Pdf).with_extra("fake", true)
    }

    fn concurrency(&self) -> Concurrency {
        self.concurrency
    }

    fn try_extract_page(&self, index: usize) -> Result<Page, ExtractError> {
        self.handle.with(|_| ())?;
        self.started.bump();

        let exclusive = self.concurrency == Concurrency::Exclusive;
        if exclusive && self.busy.swap(true, Ordering::SeqCst) {
            self.overlaps.bump();
        }

        if let Some(delay) = self.behaviour.delays.get(&index) {
            std::thread::sleep(*delay);
        }
        if exclusive {
            self.busy.store(false, Ordering::SeqCst);
        }

        if self.behaviour.panicking.contains(&index) {
            panic!("scripted panic on page {index}");
        }
        if self.behaviour.failing.contains(&index) {
            return Err(ExtractError::page(index, format!("scripted failure on page {index}")));
        }
        Ok(Self::expected_page(index))
    }

    fn open_sibling(&self) -> Result<Box<dyn ExtractionUnit>, ExtractError> {
        if self.behaviour.fail_sibling_open {
            return Err(ExtractError::BackendInit("scripted sibling open failure".into()));
        }
        self.siblings.bump();
        Ok(Box::new(FakeUnit {
            path: self.path.clone(),
            page_count: self.page_count,
            concurrency: self.concurrency,
            behaviour: Arc::clone(&self.behaviour),
            spec: self.spec.clone(),
            handle: Resource::new("fake handle", ()),
            busy: AtomicBool::new(false),
            releases: self.releases.clone(),
            siblings: self.siblings.clone(),
            started: self.started.clone(),
            overlaps: self.overlaps.clone(),
        }))
    }

    fn spec(&self) -> Option<ExtractorSpec> {
        self.spec.clone()
    }

    fn close(&self) -> Result<(), ExtractError> {
        if self.handle.release().is_some() {
            self.releases.bump();
        }
        Ok(())
    }
}

fn escape_pdf_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_ascii() => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

/// Write a minimal Letter-size PDF with one line of Helvetica text per page,
/// each drawn at (72, 700) in PDF user space.
pub fn write_text_pdf(path: &Path, pages: &[&str]) -> std::io::Result<()> {
    // Objects: 1 catalog, 2 page tree, 3 font, then (page, contents) pairs.
    let mut objects: Vec<String> = Vec::new();
    let kids: Vec<String> = (0..pages.len()).map(|i| format!("{} 0 R", 4 + 2 * i)).collect();
    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
    objects.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        pages.len()
    ));
    objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string());
    for (i, text) in pages.iter().enumerate() {
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            5 + 2 * i
        ));
        let content = format!("BT /F1 24 Tf 72 700 Td ({}) Tj ET", escape_pdf_text(text));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            content.len(),
            content
        ));
    }

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        let _ = write!(pdf, "{} 0 obj\n{}\nendobj\n", i + 1, body);
    }
    let xref_at = pdf.len();
    let _ = write!(pdf, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = write!(pdf, "{offset:010} 00000 n \n");
    }
    let _ = write!(
        pdf,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_at
    );
    std::fs::write(path, pdf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_written_pdf_is_sniffed_as_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("two.pdf");
        write_text_pdf(&path, &["Hello (world)", "Second page"]).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.4"));
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("/Count 2"));
        assert!(text.contains(r"(Hello \(world\)) Tj"));
        assert!(text.ends_with("%%EOF\n"));
    }

    #[test]
    fn test_siblings_share_counters() {
        let unit = FakeUnit::new(2).exclusive();
        let sibling = unit.open_sibling().unwrap();
        sibling.close().unwrap();
        unit.close().unwrap();
        assert_eq!(unit.release_counter().get(), 2);
        assert_eq!(unit.sibling_counter().get(), 1);
    }
}
