//! In-memory object store for tests and local development.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tracing::warn;

use crate::error::{ArchiverError, Result};
use crate::store::{ByteStream, ObjectStore, StoreOp};

/// A stored object: content type plus body bytes.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub content_type: String,
    pub data: Bytes,
}

/// In-memory, HashMap-based object store.
///
/// All objects are held behind an `RwLock` for safe concurrent access.
/// Supports per-key failure injection and simulated read latency so pipeline
/// behavior under slow or failing stores can be exercised deterministically.
pub struct MemoryStore {
    objects: RwLock<HashMap<(String, String), StoredObject>>,
    fail_puts: RwLock<HashSet<String>>,
    fail_gets: RwLock<HashSet<String>>,
    put_attempts: AtomicUsize,
    chunk_size: usize,
    get_latency: Option<Duration>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            fail_puts: RwLock::new(HashSet::new()),
            fail_gets: RwLock::new(HashSet::new()),
            put_attempts: AtomicUsize::new(0),
            chunk_size: 1024,
            get_latency: None,
        }
    }

    /// Set the chunk size used when streaming objects out.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Delay each streamed chunk by `latency`, simulating a slow service.
    pub fn with_get_latency(mut self, latency: Duration) -> Self {
        self.get_latency = Some(latency);
        self
    }

    /// Make every put for `key` fail with a transient error.
    pub fn fail_put(&self, key: impl Into<String>) {
        self.fail_puts
            .write()
            .expect("lock poisoned")
            .insert(key.into());
    }

    /// Make every get for `key` fail with a transient error.
    pub fn fail_get(&self, key: impl Into<String>) {
        self.fail_gets
            .write()
            .expect("lock poisoned")
            .insert(key.into());
    }

    /// Number of put attempts observed, including injected failures.
    pub fn put_attempts(&self) -> usize {
        self.put_attempts.load(Ordering::Relaxed)
    }

    /// Fetch a stored object for assertions.
    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .read()
            .expect("lock poisoned")
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<ByteStream> {
        StoreOp::read("get", bucket, key).emit();

        if self.fail_gets.read().expect("lock poisoned").contains(key) {
            warn!(bucket, key, "injected get failure");
            return Err(ArchiverError::transient("get", "injected failure"));
        }

        let data = self
            .object(bucket, key)
            .ok_or_else(|| ArchiverError::not_found(bucket, key))?
            .data;

        let chunks: Vec<Bytes> = data
            .chunks(self.chunk_size)
            .map(Bytes::copy_from_slice)
            .collect();
        let latency = self.get_latency;

        let stream = futures::stream::iter(chunks).then(move |chunk| async move {
            if let Some(delay) = latency {
                tokio::time::sleep(delay).await;
            }
            Ok::<_, ArchiverError>(chunk)
        });

        Ok(Box::pin(stream))
    }

    async fn put(&self, bucket: &str, key: &str, content_type: &str, body: Bytes) -> Result<()> {
        StoreOp::write("put", bucket, key, content_type).emit();
        self.put_attempts.fetch_add(1, Ordering::Relaxed);

        if self.fail_puts.read().expect("lock poisoned").contains(key) {
            warn!(bucket, key, "injected put failure");
            return Err(ArchiverError::transient("put", "injected failure"));
        }

        self.objects.write().expect("lock poisoned").insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                content_type: content_type.to_string(),
                data: body,
            },
        );
        Ok(())
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        mut stream: ByteStream,
    ) -> Result<()> {
        StoreOp::write("upload", bucket, key, content_type).emit();

        // Consume incrementally; an in-band stream error fails the upload
        // before anything is stored.
        let mut buf = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buf.extend_from_slice(&chunk);
        }

        self.objects.write().expect("lock poisoned").insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                content_type: content_type.to_string(),
                data: buf.freeze(),
            },
        );
        Ok(())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("object_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::byte_stream_from;
    use futures::TryStreamExt;

    async fn collect(stream: ByteStream) -> Result<Bytes> {
        let chunks: Vec<Bytes> = stream.try_collect().await?;
        let mut buf = BytesMut::new();
        for chunk in chunks {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }

    #[tokio::test]
    async fn test_put_then_get_roundtrip() {
        let store = MemoryStore::new();
        store
            .put("b", "1.csv", "text/csv", Bytes::from_static(b"a,b,c"))
            .await
            .unwrap();

        let stream = store.get("b", "1.csv").await.unwrap();
        let data = collect(stream).await.unwrap();
        assert_eq!(&data[..], b"a,b,c");
        assert_eq!(store.object("b", "1.csv").unwrap().content_type, "text/csv");
    }

    #[tokio::test]
    async fn test_get_missing_key_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get("b", "nope").await.err().unwrap();
        assert!(matches!(err, ArchiverError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_get_streams_in_chunks() {
        let store = MemoryStore::new().with_chunk_size(2);
        store
            .put("b", "k", "text/csv", Bytes::from_static(b"abcde"))
            .await
            .unwrap();

        let stream = store.get("b", "k").await.unwrap();
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(&chunks[0][..], b"ab");
        assert_eq!(&chunks[2][..], b"e");
    }

    #[tokio::test]
    async fn test_injected_put_failure() {
        let store = MemoryStore::new();
        store.fail_put("1.csv");

        let err = store
            .put("b", "1.csv", "text/csv", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiverError::Transient { .. }));
        assert_eq!(store.put_attempts(), 1);
        assert!(store.object("b", "1.csv").is_none());
    }

    #[tokio::test]
    async fn test_injected_get_failure() {
        let store = MemoryStore::new();
        store
            .put("b", "2.csv", "text/csv", Bytes::from_static(b"x"))
            .await
            .unwrap();
        store.fail_get("2.csv");

        assert!(store.get("b", "2.csv").await.is_err());
    }

    #[tokio::test]
    async fn test_upload_consumes_stream() {
        let store = MemoryStore::new();
        store
            .upload(
                "b",
                "out.zip",
                "application/zip",
                byte_stream_from(Bytes::from_static(b"zipbytes")),
            )
            .await
            .unwrap();

        let stored = store.object("b", "out.zip").unwrap();
        assert_eq!(&stored.data[..], b"zipbytes");
        assert_eq!(stored.content_type, "application/zip");
    }

    #[tokio::test]
    async fn test_upload_surfaces_stream_error_and_stores_nothing() {
        let store = MemoryStore::new();
        let stream: ByteStream = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(ArchiverError::stream("get b/2.csv", "connection reset")),
        ]));

        let err = store
            .upload("b", "out.zip", "application/zip", stream)
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiverError::Stream { .. }));
        assert!(store.object("b", "out.zip").is_none());
    }
}
