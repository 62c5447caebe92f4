//! Async entry points over the synchronous dispatcher.
//!
//! The pool runs on a dedicated OS thread and its completion is delivered
//! through a oneshot channel, so awaiting a job never blocks the event
//! loop, whichever runtime flavor the caller uses.

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::dispatch::{ExtractOptions, ProgressEvent, extract};
use crate::error::ExtractError;
use crate::models::{ExtractionResult, PageExtractionResult};
use crate::unit::ExtractionUnit;

type JobOutcome = Result<ExtractionResult, ExtractError>;

fn spawn_job<U: ExtractionUnit + ?Sized + 'static>(
    unit: Arc<U>,
    options: ExtractOptions,
) -> Result<oneshot::Receiver<JobOutcome>, ExtractError> {
    let (tx, rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("unifex-dispatch".into())
        .spawn(move || {
            let outcome = extract(unit.as_ref(), &options);
            // Release the progress observer and the unit handle before
            // completing, so page streams end and the caller holds the last
            // handle once the final result is observable.
            drop(options);
            drop(unit);
            let _ = tx.send(outcome);
        })
        .map_err(|e| ExtractError::Executor(format!("failed to start dispatcher thread: {e}")))?;
    Ok(rx)
}

async fn await_job(rx: oneshot::Receiver<JobOutcome>) -> JobOutcome {
    rx.await
        .map_err(|_| ExtractError::Executor("dispatcher thread exited without a result".into()))?
}

/// Async equivalent of [`extract`]: same ordering, partial-failure and
/// cancellation behavior, suspending only until the aggregated result is
/// ready.
pub async fn extract_async<U: ExtractionUnit + ?Sized + 'static>(
    unit: Arc<U>,
    options: ExtractOptions,
) -> JobOutcome {
    await_job(spawn_job(unit, options)?).await
}

/// Page results in completion order, followed by the aggregated result.
pub struct PageStream {
    pages: async_channel::Receiver<PageExtractionResult>,
    result: oneshot::Receiver<JobOutcome>,
}

impl PageStream {
    /// Next finished page, or `None` once every page has reported.
    pub async fn next_page(&mut self) -> Option<PageExtractionResult> {
        self.pages.recv().await.ok()
    }

    /// Wait for the aggregated result. Pages not yet consumed are still
    /// part of it.
    pub async fn finish(self) -> JobOutcome {
        await_job(self.result).await
    }
}

/// Start a job and stream each page's outcome as it completes.
pub fn stream_pages<U: ExtractionUnit + ?Sized + 'static>(
    unit: Arc<U>,
    mut options: ExtractOptions,
) -> Result<PageStream, ExtractError> {
    let (page_tx, page_rx) = async_channel::unbounded();
    let observer = options.progress.take();
    options = options.with_progress(move |event| {
        if let ProgressEvent::PageFinished { result, .. } = &event {
            let _ = page_tx.try_send(result.clone());
        }
        if let Some(observer) = &observer {
            observer(event);
        }
    });
    let result = spawn_job(unit, options)?;
    Ok(PageStream {
        pages: page_rx,
        result,
    })
}
