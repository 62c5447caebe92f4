//! Integration tests for the async bridge.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use unifex_core::testing::FakeUnit;
use unifex_core::{ErrorKind, ExtractOptions, ScopedUnit, extract, extract_async, stream_pages};

#[tokio::test(flavor = "current_thread")]
async fn async_result_matches_sync_result() {
    let unit = Arc::new(FakeUnit::new(9).failing_on(4));
    let sync = extract(unit.as_ref(), &ExtractOptions::new()).unwrap();
    let asynchronous = extract_async(Arc::clone(&unit), ExtractOptions::new().with_max_workers(4))
        .await
        .unwrap();
    assert_eq!(asynchronous.document.pages, sync.document.pages);
    assert_eq!(asynchronous.failed_pages, sync.failed_pages);
    assert!(!asynchronous.success);
}

#[tokio::test(flavor = "current_thread")]
async fn event_loop_keeps_running_while_job_is_in_flight() {
    let unit = Arc::new(FakeUnit::new(4).with_uniform_delay(Duration::from_millis(50)));
    let job = tokio::spawn(extract_async(unit, ExtractOptions::new()));

    // On a single-threaded runtime this only completes if the job does not
    // block the loop.
    let mut ticks = 0;
    while !job.is_finished() {
        tokio::time::sleep(Duration::from_millis(5)).await;
        ticks += 1;
    }
    assert!(ticks > 5, "loop only ticked {ticks} times");
    assert!(job.await.unwrap().unwrap().success);
}

#[tokio::test]
async fn shared_scoped_unit_is_released_when_the_last_handle_drops() {
    let unit = FakeUnit::new(5);
    let releases = unit.release_counter();
    let scoped = Arc::new(ScopedUnit::new(unit));

    let result = extract_async(Arc::clone(&scoped), ExtractOptions::new().with_max_workers(2))
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(releases.get(), 0);

    drop(scoped);
    assert_eq!(releases.get(), 1);
}

#[tokio::test]
async fn stream_yields_each_page_then_the_aggregate() {
    let unit = Arc::new(FakeUnit::new(6).failing_on(0));
    let mut stream = stream_pages(unit, ExtractOptions::new().with_max_workers(3)).unwrap();

    let mut seen = Vec::new();
    while let Some(result) = stream.next_page().await {
        seen.push(result.page);
    }
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);

    let result = stream.finish().await.unwrap();
    assert_eq!(result.document.pages.len(), 5);
    assert_eq!(result.failed_pages[&0].kind, ErrorKind::PageExtraction);
}

#[tokio::test]
async fn stream_keeps_caller_progress_observer() {
    let unit = Arc::new(FakeUnit::new(3));
    let (tx, rx) = std::sync::mpsc::channel();
    let options = ExtractOptions::new().with_progress(move |event| {
        let _ = tx.send(event);
    });
    let stream = stream_pages(unit, options).unwrap();
    let result = stream.finish().await.unwrap();
    assert!(result.success);
    // Started plus one event per page.
    assert_eq!(rx.try_iter().count(), 4);
}

#[tokio::test]
async fn async_cancellation_matches_sync_semantics() {
    let unit = Arc::new(FakeUnit::new(10).with_uniform_delay(Duration::from_millis(20)));
    let cancel = CancellationToken::new();
    let options = ExtractOptions::new()
        .with_max_workers(2)
        .with_cancel(cancel.clone());
    let job = tokio::spawn(extract_async(unit, options));
    tokio::time::sleep(Duration::from_millis(30)).await;
    cancel.cancel();

    let result = job.await.unwrap().unwrap();
    assert!(!result.success);
    assert!(result.failed_pages.values().any(|e| e.kind == ErrorKind::Cancelled));
    assert_eq!(result.document.pages.len() + result.failed_pages.len(), 10);
}
