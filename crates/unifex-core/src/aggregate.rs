use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::error::{ErrorKind, PageError};
use crate::models::{Document, ExtractionResult, ExtractorMetadata, Page, PageExtractionResult};

/// Collects page outcomes in completion order and assembles them in page
/// order.
#[derive(Debug)]
pub struct Aggregator {
    path: PathBuf,
    requested: BTreeSet<usize>,
    pages: BTreeMap<usize, Page>,
    failures: BTreeMap<usize, PageError>,
}

impl Aggregator {
    pub fn new(path: impl Into<PathBuf>, requested: &[usize]) -> Self {
        Self {
            path: path.into(),
            requested: requested.iter().copied().collect(),
            pages: BTreeMap::new(),
            failures: BTreeMap::new(),
        }
    }

    /// Record one outcome. Outcomes for pages that were not requested, or
    /// that already reported, are dropped.
    pub fn record(&mut self, result: PageExtractionResult) {
        let index = result.page;
        if !self.requested.contains(&index) {
            tracing::warn!(page = index, "dropping result for a page that was not requested");
            return;
        }
        if self.pages.contains_key(&index) || self.failures.contains_key(&index) {
            tracing::warn!(page = index, "dropping duplicate result");
            return;
        }
        match result.outcome {
            Ok(page) => {
                self.pages.insert(index, page);
            }
            Err(error) => {
                self.failures.insert(index, error);
            }
        }
    }

    pub fn reported(&self) -> usize {
        self.pages.len() + self.failures.len()
    }

    /// Assemble the job result. Requested pages that never reported are
    /// failed: as cancelled when cancellation was requested, otherwise as
    /// unprocessed.
    pub fn finish(mut self, metadata: Option<ExtractorMetadata>, cancelled: bool) -> ExtractionResult {
        let missing: Vec<usize> = self
            .requested
            .iter()
            .copied()
            .filter(|i| !self.pages.contains_key(i) && !self.failures.contains_key(i))
            .collect();
        for index in missing {
            let error = if cancelled {
                PageError::new(index, ErrorKind::Cancelled, "not issued: cancellation requested")
            } else {
                PageError::new(index, ErrorKind::PageExtraction, "page was not processed")
            };
            self.failures.insert(index, error);
        }

        let success = self.failures.is_empty();
        ExtractionResult {
            document: Document {
                path: self.path,
                pages: self.pages.into_values().collect(),
                metadata,
            },
            success,
            failed_pages: self.failures,
        }
    }
}
