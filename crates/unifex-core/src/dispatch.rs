//! Work dispatcher: splits a job into page tasks, runs them on a worker pool
//! and hands every outcome to the [`Aggregator`].
//!
//! Sequential, thread and process execution share one shape: page indices go
//! into a task queue up front, workers pull the next index whenever they
//! finish one, and outcomes come back on a result queue drained by the
//! calling thread. The sequential path is the same loop with one worker and
//! no queue.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::aggregate::Aggregator;
use crate::error::ExtractError;
use crate::models::{ExtractionResult, PageExtractionResult};
use crate::process::{self, WorkerCommand};
use crate::unit::{Concurrency, ExtractionUnit};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    /// Workers are threads sharing this process.
    #[default]
    Thread,
    /// Workers are child processes, each opening its own unit.
    Process,
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thread => f.write_str("thread"),
            Self::Process => f.write_str("process"),
        }
    }
}

impl FromStr for ExecutorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "thread" | "threads" => Ok(Self::Thread),
            "process" | "processes" => Ok(Self::Process),
            other => Err(format!("unknown executor '{other}' (expected thread or process)")),
        }
    }
}

/// Progress events emitted while a job runs.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// The pool is about to start.
    Started { total: usize, workers: usize },
    /// A page reported, in completion order.
    PageFinished {
        result: PageExtractionResult,
        completed: usize,
        total: usize,
    },
}

pub type ProgressFn = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Per-call job parameters.
#[derive(Clone, Default)]
pub struct ExtractOptions {
    /// Page indices to extract; `None` means every page.
    pub pages: Option<Vec<usize>>,
    /// Upper bound on workers. `None`, 0 and 1 select the sequential path.
    pub max_workers: Option<usize>,
    pub executor: ExecutorKind,
    /// Stops issuing new page tasks once cancelled.
    pub cancel: CancellationToken,
    /// Worker process command for [`ExecutorKind::Process`]; defaults to
    /// [`WorkerCommand::from_env`].
    pub worker_command: Option<WorkerCommand>,
    pub progress: Option<ProgressFn>,
}

impl fmt::Debug for ExtractOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractOptions")
            .field("pages", &self.pages)
            .field("max_workers", &self.max_workers)
            .field("executor", &self.executor)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("worker_command", &self.worker_command)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl ExtractOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages(mut self, pages: impl IntoIterator<Item = usize>) -> Self {
        self.pages = Some(pages.into_iter().collect());
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }

    pub fn with_executor(mut self, executor: ExecutorKind) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_worker_command(mut self, command: WorkerCommand) -> Self {
        self.worker_command = Some(command);
        self
    }

    pub fn with_progress(mut self, progress: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    fn is_parallel(&self) -> bool {
        self.max_workers.unwrap_or(1) > 1
    }

    /// Active workers for `tasks` pages: `min(max_workers, tasks)`, at least 1.
    pub fn worker_count(&self, tasks: usize) -> usize {
        self.max_workers.unwrap_or(1).min(tasks).max(1)
    }
}

/// De-duplicate the requested indices, keeping first-request order.
fn plan_pages(requested: Option<&[usize]>, page_count: usize) -> Vec<usize> {
    match requested {
        None => (0..page_count).collect(),
        Some(pages) => {
            let mut seen = BTreeSet::new();
            pages.iter().copied().filter(|i| seen.insert(*i)).collect()
        }
    }
}

/// One slot of the pool. Returns `Err` when the slot itself is lost (a dead
/// worker process); the dispatcher then fails the page and retires the slot.
pub(crate) trait PageWorker: Send {
    fn run(&mut self, index: usize) -> Result<PageExtractionResult, String>;
}

/// Thread worker borrowing the caller's unit.
struct SharedWorker<'a, U: ?Sized> {
    unit: &'a U,
}

impl<U: ExtractionUnit + ?Sized> PageWorker for SharedWorker<'_, U> {
    fn run(&mut self, index: usize) -> Result<PageExtractionResult, String> {
        Ok(self.unit.extract_page(index))
    }
}

/// Thread worker owning a sibling handle, closed when the worker drops.
struct OwnedWorker {
    unit: Box<dyn ExtractionUnit>,
}

impl PageWorker for OwnedWorker {
    fn run(&mut self, index: usize) -> Result<PageExtractionResult, String> {
        Ok(self.unit.extract_page(index))
    }
}

impl Drop for OwnedWorker {
    fn drop(&mut self) {
        if let Err(e) = self.unit.close() {
            tracing::warn!(error = %e, "failed to release worker handle");
        }
    }
}

fn thread_workers<'a, U>(unit: &'a U, count: usize) -> Result<Vec<Box<dyn PageWorker + 'a>>, ExtractError>
where
    U: ExtractionUnit + ?Sized + 'a,
{
    let mut workers: Vec<Box<dyn PageWorker + 'a>> = Vec::with_capacity(count);
    match unit.concurrency() {
        Concurrency::Reentrant => {
            for _ in 0..count {
                workers.push(Box::new(SharedWorker { unit }));
            }
        }
        Concurrency::Exclusive => {
            // The caller's handle serves one worker; the rest get siblings.
            // A failed open drops (and closes) the siblings opened so far.
            workers.push(Box::new(SharedWorker { unit }));
            for _ in 1..count {
                workers.push(Box::new(OwnedWorker {
                    unit: unit.open_sibling()?,
                }));
            }
        }
    }
    Ok(workers)
}

/// Feeds outcomes to the aggregator and the progress observer.
struct Collector<'a> {
    aggregator: Aggregator,
    progress: Option<&'a ProgressFn>,
    total: usize,
}

impl Collector<'_> {
    fn report(&mut self, result: PageExtractionResult) {
        match self.progress {
            Some(progress) => {
                let event_result = result.clone();
                self.aggregator.record(result);
                progress(ProgressEvent::PageFinished {
                    result: event_result,
                    completed: self.aggregator.reported(),
                    total: self.total,
                });
            }
            None => self.aggregator.record(result),
        }
    }
}

fn run_sequential<U: ExtractionUnit + ?Sized>(
    unit: &U,
    tasks: &[usize],
    cancel: &CancellationToken,
    collector: &mut Collector<'_>,
) {
    for &index in tasks {
        if cancel.is_cancelled() {
            tracing::debug!(page = index, "cancelled, not issuing further pages");
            break;
        }
        tracing::debug!(page = index, "extracting page");
        collector.report(unit.extract_page(index));
    }
}

fn worker_loop(
    id: usize,
    mut worker: Box<dyn PageWorker + '_>,
    tasks: async_channel::Receiver<usize>,
    results: async_channel::Sender<PageExtractionResult>,
    cancel: &CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            tracing::debug!(worker = id, "cancelled, worker stopping");
            break;
        }
        let Ok(index) = tasks.recv_blocking() else {
            break;
        };
        tracing::debug!(worker = id, page = index, "extracting page");
        match worker.run(index) {
            Ok(result) => {
                if results.send_blocking(result).is_err() {
                    break;
                }
            }
            Err(reason) => {
                tracing::warn!(worker = id, page = index, %reason, "worker lost, retiring slot");
                let lost = ExtractError::page(index, format!("worker lost: {reason}"));
                let _ = results.send_blocking(PageExtractionResult::failure(lost.into_page_error(index)));
                break;
            }
        }
    }
}

fn run_pool(
    workers: Vec<Box<dyn PageWorker + '_>>,
    tasks: &[usize],
    cancel: &CancellationToken,
    collector: &mut Collector<'_>,
) {
    let (task_tx, task_rx) = async_channel::unbounded::<usize>();
    for &index in tasks {
        // Unbounded and still open: cannot fail.
        let _ = task_tx.try_send(index);
    }
    drop(task_tx);

    let (result_tx, result_rx) = async_channel::unbounded::<PageExtractionResult>();

    std::thread::scope(|scope| {
        for (id, worker) in workers.into_iter().enumerate() {
            let tasks = task_rx.clone();
            let results = result_tx.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("unifex-worker-{id}"))
                .spawn_scoped(scope, move || worker_loop(id, worker, tasks, results, cancel));
            if let Err(e) = spawned {
                tracing::warn!(worker = id, error = %e, "failed to spawn worker thread");
            }
        }
        // Workers hold the only senders now; the drain ends when they exit.
        drop(result_tx);
        while let Ok(result) = result_rx.recv_blocking() {
            collector.report(result);
        }
    });
}

/// Extract the requested pages of `unit`.
///
/// Page failures never fail the call; they land in
/// [`ExtractionResult::failed_pages`]. Errors returned here are job-fatal
/// and happen before any page task is issued: a sibling handle or worker
/// process that could not be opened.
pub fn extract<U: ExtractionUnit + ?Sized>(
    unit: &U,
    options: &ExtractOptions,
) -> Result<ExtractionResult, ExtractError> {
    let start = Instant::now();
    let tasks = plan_pages(options.pages.as_deref(), unit.page_count());
    let parallel = options.is_parallel() && !tasks.is_empty();
    let workers = if parallel { options.worker_count(tasks.len()) } else { 1 };
    let mode = if parallel { options.executor.to_string() } else { "sequential".to_string() };

    tracing::info!(
        source = %unit.source().display(),
        pages = tasks.len(),
        workers,
        executor = %mode,
        "starting extraction"
    );

    let pool = if parallel {
        Some(match options.executor {
            ExecutorKind::Thread => thread_workers(unit, workers)?,
            ExecutorKind::Process => {
                process::spawn_workers(unit, workers, options.worker_command.as_ref())?
            }
        })
    } else {
        None
    };

    if let Some(progress) = &options.progress {
        progress(ProgressEvent::Started {
            total: tasks.len(),
            workers,
        });
    }

    let mut collector = Collector {
        aggregator: Aggregator::new(unit.source(), &tasks),
        progress: options.progress.as_ref(),
        total: tasks.len(),
    };
    match pool {
        Some(pool) => run_pool(pool, &tasks, &options.cancel, &mut collector),
        None => run_sequential(unit, &tasks, &options.cancel, &mut collector),
    }

    let result = collector
        .aggregator
        .finish(Some(unit.metadata()), options.cancel.is_cancelled());
    tracing::info!(
        source = %unit.source().display(),
        succeeded = result.document.pages.len(),
        failed = result.failure_count(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "extraction finished"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_count_caps_at_tasks() {
        let opts = ExtractOptions::new().with_max_workers(8);
        assert_eq!(opts.worker_count(3), 3);
        assert_eq!(opts.worker_count(20), 8);
        assert_eq!(ExtractOptions::new().worker_count(5), 1);
        assert_eq!(ExtractOptions::new().with_max_workers(0).worker_count(5), 1);
    }

    #[test]
    fn test_plan_pages_dedupes_in_request_order() {
        assert_eq!(plan_pages(Some(&[3, 1, 3, 0, 1]), 5), vec![3, 1, 0]);
        assert_eq!(plan_pages(None, 3), vec![0, 1, 2]);
    }

    #[test]
    fn test_executor_kind_parse() {
        assert_eq!("Process".parse::<ExecutorKind>().unwrap(), ExecutorKind::Process);
        assert_eq!(ExecutorKind::default(), ExecutorKind::Thread);
        assert!("fibers".parse::<ExecutorKind>().is_err());
    }
}
