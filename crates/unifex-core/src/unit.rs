//! The capability contract every extraction backend implements.

use std::ops::Deref;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use crate::error::{ErrorKind, ExtractError, PageError};
use crate::models::{ExtractorMetadata, Page, PageExtractionResult};
use crate::options::ExtractorSpec;

/// Whether one handle may serve concurrent `extract_page` calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Concurrency {
    /// Safe to share one handle across thread-pool workers.
    #[default]
    Reentrant,
    /// Each thread-pool worker needs its own handle from
    /// [`ExtractionUnit::open_sibling`].
    Exclusive,
}

/// An opened backend bound to one source.
///
/// Opening happens in each backend's constructor and is fatal on failure;
/// there is no partially opened unit. Page extraction never fails the job:
/// [`ExtractionUnit::extract_page`] folds every backend failure into the
/// returned [`PageExtractionResult`].
pub trait ExtractionUnit: Send + Sync {
    fn source(&self) -> &Path;

    fn page_count(&self) -> usize;

    fn metadata(&self) -> ExtractorMetadata;

    fn concurrency(&self) -> Concurrency {
        Concurrency::Reentrant
    }

    /// Extract one in-range page, coordinates already in the output unit.
    fn try_extract_page(&self, index: usize) -> Result<Page, ExtractError>;

    /// Extract one page, capturing out-of-range indices, backend errors and
    /// panics as that page's failure.
    fn extract_page(&self, index: usize) -> PageExtractionResult {
        let page_count = self.page_count();
        if index >= page_count {
            return PageExtractionResult::failure(PageError::new(
                index,
                ErrorKind::PageExtraction,
                format!("page index {index} out of range (document has {page_count} pages)"),
            ));
        }

        match catch_unwind(AssertUnwindSafe(|| self.try_extract_page(index))) {
            Ok(Ok(mut page)) => {
                page.page = index;
                PageExtractionResult::success(page)
            }
            Ok(Err(e)) => {
                tracing::debug!(page = index, error = %e, "page extraction failed");
                PageExtractionResult::failure(e.into_page_error(index))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::warn!(page = index, %message, "backend panicked during page extraction");
                PageExtractionResult::failure(PageError::new(
                    index,
                    ErrorKind::PageExtraction,
                    format!("backend panicked: {message}"),
                ))
            }
        }
    }

    /// Open an independent handle on the same source, for exclusive units
    /// shared by several thread-pool workers.
    fn open_sibling(&self) -> Result<Box<dyn ExtractionUnit>, ExtractError> {
        Err(ExtractError::BackendInit(format!(
            "{} cannot open independent handles",
            self.source().display()
        )))
    }

    /// How to reopen this unit from scratch in another process.
    fn spec(&self) -> Option<ExtractorSpec> {
        None
    }

    /// Release backend resources. Must be idempotent.
    fn close(&self) -> Result<(), ExtractError>;
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// A backend resource that is released at most once.
///
/// Access after release is a page-level error, never a crash.
#[derive(Debug)]
pub struct Resource<T> {
    name: &'static str,
    slot: RwLock<Option<T>>,
}

impl<T> Resource<T> {
    pub fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            slot: RwLock::new(Some(value)),
        }
    }

    /// Run `f` against the live resource.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, ExtractError> {
        let guard = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(value) => Ok(f(value)),
            None => Err(ExtractError::PageExtraction {
                page: 0,
                message: format!("{} already released", self.name),
            }),
        }
    }

    /// Take the resource out. Returns `None` on every call after the first.
    pub fn release(&self) -> Option<T> {
        self.slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn is_released(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// Closes the wrapped unit when dropped, on every exit path.
///
/// Prefer [`ScopedUnit::close`] to observe release errors; drop only logs
/// them.
pub struct ScopedUnit<U: ExtractionUnit> {
    unit: U,
}

impl<U: ExtractionUnit> ScopedUnit<U> {
    pub fn new(unit: U) -> Self {
        Self { unit }
    }

    pub fn close(self) -> Result<(), ExtractError> {
        // Drop runs afterwards and hits the idempotent path.
        self.unit.close()
    }
}

impl<U: ExtractionUnit> Deref for ScopedUnit<U> {
    type Target = U;

    fn deref(&self) -> &U {
        &self.unit
    }
}

impl<U: ExtractionUnit> ExtractionUnit for ScopedUnit<U> {
    fn source(&self) -> &Path {
        self.unit.source()
    }

    fn page_count(&self) -> usize {
        self.unit.page_count()
    }

    fn metadata(&self) -> ExtractorMetadata {
        self.unit.metadata()
    }

    fn concurrency(&self) -> Concurrency {
        self.unit.concurrency()
    }

    fn try_extract_page(&self, index: usize) -> Result<Page, ExtractError> {
        self.unit.try_extract_page(index)
    }

    fn open_sibling(&self) -> Result<Box<dyn ExtractionUnit>, ExtractError> {
        self.unit.open_sibling()
    }

    fn spec(&self) -> Option<ExtractorSpec> {
        self.unit.spec()
    }

    fn close(&self) -> Result<(), ExtractError> {
        self.unit.close()
    }
}

impl<U: ExtractionUnit> Drop for ScopedUnit<U> {
    fn drop(&mut self) {
        if let Err(e) = self.unit.close() {
            tracing::warn!(source = %self.unit.source().display(), error = %e, "failed to release extraction unit");
        }
    }
}

impl ExtractionUnit for Box<dyn ExtractionUnit> {
    fn source(&self) -> &Path {
        (**self).source()
    }

    fn page_count(&self) -> usize {
        (**self).page_count()
    }

    fn metadata(&self) -> ExtractorMetadata {
        (**self).metadata()
    }

    fn concurrency(&self) -> Concurrency {
        (**self).concurrency()
    }

    fn try_extract_page(&self, index: usize) -> Result<Page, ExtractError> {
        (**self).try_extract_page(index)
    }

    fn extract_page(&self, index: usize) -> PageExtractionResult {
        (**self).extract_page(index)
    }

    fn open_sibling(&self) -> Result<Box<dyn ExtractionUnit>, ExtractError> {
        (**self).open_sibling()
    }

    fn spec(&self) -> Option<ExtractorSpec> {
        (**self).spec()
    }

    fn close(&self) -> Result<(), ExtractError> {
        (**self).close()
    }
}
