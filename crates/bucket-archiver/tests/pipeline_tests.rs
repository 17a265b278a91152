//! End-to-end pipeline tests against the in-memory store.
//!
//! These exercise the full generate → persist → archive → upload flow,
//! including failure injection and the round-trip property of the uploaded
//! archive.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use bucket_archiver::{ArchiverError, Config, MemoryStore, Orchestrator};
use futures::io::AsyncReadExt;

fn test_config(bucket: &str, files: usize) -> Config {
    let mut config = Config::default();
    config.bucket = bucket.to_string();
    config.generator.file_count = files;
    config.generator.rows_per_file = 100;
    // Small capacity so backpressure is actually exercised.
    config.pipeline.pipe_capacity = 2;
    config
}

/// Decode a zip archive into (name, bytes) pairs.
async fn read_archive(bytes: Vec<u8>) -> Vec<(String, Vec<u8>)> {
    use async_zip::base::read::seek::ZipFileReader;

    let mut zip = ZipFileReader::with_tokio(Cursor::new(bytes)).await.unwrap();
    let count = zip.file().entries().len();
    let mut out = Vec::with_capacity(count);
    for index in 0..count {
        let name = zip.file().entries()[index]
            .filename()
            .as_str()
            .unwrap()
            .to_string();
        let mut reader = zip.reader_with_entry(index).await.unwrap();
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await.unwrap();
        out.push((name, data));
    }
    out
}

#[tokio::test]
async fn test_two_file_run_roundtrips_archive() {
    let store = Arc::new(MemoryStore::new().with_chunk_size(64));
    let orchestrator = Orchestrator::new(store.clone(), test_config("b", 2));

    let result = orchestrator.run(None).await.unwrap();

    assert_eq!(result.status, "completed");
    assert_eq!(result.files_total, 2);
    assert_eq!(result.puts_succeeded, 2);
    assert_eq!(result.puts_failed, 0);
    assert_eq!(result.archive_entries, 2);

    let archive = store.object("b", "demo.zip").unwrap();
    assert_eq!(archive.content_type, "application/zip");

    let entries = read_archive(archive.data.to_vec()).await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].0, "1.csv");
    assert_eq!(entries[1].0, "2.csv");

    // Byte-for-byte equality with what was stored under the source keys.
    for (name, data) in &entries {
        let stored = store.object("b", name).unwrap();
        assert_eq!(&stored.data[..], &data[..], "content mismatch for {}", name);
    }
}

#[tokio::test]
async fn test_zero_file_run_uploads_empty_archive() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = Orchestrator::new(store.clone(), test_config("b", 0));

    let result = orchestrator.run(None).await.unwrap();

    assert_eq!(result.files_total, 0);
    assert_eq!(result.archive_entries, 0);
    assert_eq!(result.archive_bytes, 0);

    let archive = store.object("b", "demo.zip").unwrap();
    let entries = read_archive(archive.data.to_vec()).await;
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_put_failure_does_not_block_sibling_puts() {
    let store = Arc::new(MemoryStore::new());
    store.fail_put("1.csv");
    let orchestrator = Orchestrator::new(store.clone(), test_config("b", 3));

    // The run fails later, when the missing key cannot be re-read for the
    // archive; the put phase itself must still have attempted every key.
    let err = orchestrator.run(None).await.unwrap_err();

    assert_eq!(store.put_attempts(), 3);
    assert!(store.object("b", "1.csv").is_none());
    assert!(store.object("b", "2.csv").is_some());
    assert!(store.object("b", "3.csv").is_some());
    assert!(store.object("b", "demo.zip").is_none());
    assert!(matches!(err, ArchiverError::NotFound { .. }));
}

#[tokio::test]
async fn test_get_failure_fails_upload_instead_of_truncating() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = Orchestrator::new(store.clone(), test_config("b", 2));

    // Let both puts succeed, then poison the second read.
    store.fail_get("2.csv");

    let err = orchestrator.run(None).await.unwrap_err();

    assert!(matches!(err, ArchiverError::Transient { .. }));
    // No partial archive may have been stored.
    assert!(store.object("b", "demo.zip").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_slow_source_still_yields_complete_archive() {
    let store = Arc::new(
        MemoryStore::new()
            .with_chunk_size(16)
            .with_get_latency(Duration::from_millis(5)),
    );
    let orchestrator = Orchestrator::new(store.clone(), test_config("b", 2));

    let result = orchestrator.run(None).await.unwrap();
    assert_eq!(result.archive_entries, 2);

    let archive = store.object("b", "demo.zip").unwrap();
    let entries = read_archive(archive.data.to_vec()).await;
    assert_eq!(entries.len(), 2);
    for (name, data) in &entries {
        let stored = store.object("b", name).unwrap();
        assert_eq!(&stored.data[..], &data[..]);
    }
}

#[tokio::test]
async fn test_archive_bytes_accounts_for_all_payloads() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = Orchestrator::new(store.clone(), test_config("b", 2));

    let result = orchestrator.run(None).await.unwrap();

    let expected: u64 = ["1.csv", "2.csv"]
        .iter()
        .map(|key| store.object("b", key).unwrap().data.len() as u64)
        .sum();
    assert_eq!(result.archive_bytes, expected);
}
