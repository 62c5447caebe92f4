//! Runs the extractor against a local stand-in for the analyze API.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use unifex_core::testing::write_text_pdf;
use unifex_core::{
    CoordinateUnit, ExecutorKind, ExtractError, ExtractOptions, ExtractionUnit, ExtractorKind,
    ExtractorOptions, extract,
};
use unifex_azure::{AzureClient, AzureDiExtractor, ENDPOINT_ENV, KEY_ENV};

const RESULT: &str = r#"{
  "status": "succeeded",
  "analyzeResult": {
    "modelId": "prebuilt-read",
    "pages": [
      {"pageNumber": 1, "width": 8.5, "height": 11, "unit": "inch",
       "words": [{"content": "Hello", "polygon": [1,1, 2,1, 2,1.5, 1,1.5], "confidence": 0.99, "span": {"offset": 0, "length": 5}}],
       "lines": [{"content": "Hello", "polygon": [1,1, 2,1, 2,1.5, 1,1.5], "spans": [{"offset": 0, "length": 5}]}]},
      {"pageNumber": 2, "width": 8.5, "height": 11, "unit": "inch",
       "words": [{"content": "Second", "polygon": [1,2, 2,2, 2,2.5, 1,2.5], "confidence": 0.95, "span": {"offset": 6, "length": 6}}],
       "lines": [{"content": "Second", "polygon": [1,2, 2,2, 2,2.5, 1,2.5], "spans": [{"offset": 6, "length": 6}]}]}
    ]
  }
}"#;

/// Serves one POST (202 + operation-location) followed by GETs returning
/// the finished operation. Returns the endpoint and the POST counter.
fn serve_analyze() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    let posts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&posts);
    let operation = format!("{endpoint}/operations/1");

    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            let mut content_length = 0usize;
            loop {
                let mut header = String::new();
                reader.read_line(&mut header).unwrap();
                if header.trim().is_empty() {
                    break;
                }
                if let Some(value) = header.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
            }
            let mut body = vec![0; content_length];
            reader.read_exact(&mut body).unwrap();

            let response = if request_line.starts_with("POST") {
                counter.fetch_add(1, Ordering::SeqCst);
                format!(
                    "HTTP/1.1 202 Accepted\r\noperation-location: {operation}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                )
            } else {
                format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{RESULT}",
                    RESULT.len()
                )
            };
            stream.write_all(response.as_bytes()).unwrap();
        }
    });
    (endpoint, posts)
}

#[test]
fn pages_share_one_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.pdf");
    write_text_pdf(&path, &["Hello", "Second"]).unwrap();

    let (endpoint, posts) = serve_analyze();
    let client = AzureClient::new(&endpoint, "test-key".into(), "prebuilt-read".into())
        .unwrap()
        .with_polling(Duration::from_millis(10), 10);
    let unit = AzureDiExtractor::with_client(&path, client, ExtractorOptions::default()).unwrap();
    assert_eq!(unit.page_count(), 2);

    let result = extract(&unit, &ExtractOptions::new().with_max_workers(2)).unwrap();
    assert!(result.success, "{:?}", result.failed_pages);
    assert_eq!(posts.load(Ordering::SeqCst), 1);

    let first = &result.document.pages[0];
    assert_eq!(first.unit(), CoordinateUnit::Points);
    assert!((first.width - 612.0).abs() < 1e-9);
    let b = first.texts[0].bbox;
    assert_eq!((b.x0, b.y0, b.x1, b.y1), (72.0, 72.0, 144.0, 108.0));
    assert_eq!(first.texts[0].confidence, Some(0.99));
    assert_eq!(result.document.pages[1].texts[0].text, "Second");

    let metadata = result.document.metadata.unwrap();
    assert_eq!(metadata.extractor_type, ExtractorKind::AzureDi);
    unit.close().unwrap();
}

#[test]
fn missing_credentials_fail_at_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.pdf");
    write_text_pdf(&path, &["Hello"]).unwrap();

    let options = ExtractorOptions::default()
        .with_credential(ENDPOINT_ENV, "")
        .with_credential(KEY_ENV, "");
    let err = AzureDiExtractor::open(&path, options).err().unwrap();
    assert!(matches!(err, ExtractError::BackendInit(_)));
}

#[test]
fn process_pool_is_refused_without_analyzing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.pdf");
    write_text_pdf(&path, &["Hello", "Second"]).unwrap();

    let (endpoint, posts) = serve_analyze();
    let client = AzureClient::new(&endpoint, "test-key".into(), "prebuilt-read".into()).unwrap();
    let unit = AzureDiExtractor::with_client(&path, client, ExtractorOptions::default()).unwrap();
    assert!(unit.spec().is_none());

    let options = ExtractOptions::new()
        .with_max_workers(2)
        .with_executor(ExecutorKind::Process);
    let err = extract(&unit, &options).unwrap_err();
    assert!(matches!(err, ExtractError::Executor(_)), "{err}");
    assert_eq!(posts.load(Ordering::SeqCst), 0);
}
