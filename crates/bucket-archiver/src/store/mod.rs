//! Object-store client contract.
//!
//! The archiver core never talks to a concrete storage service; it works
//! against the [`ObjectStore`] trait so runs can be wired to S3 in production
//! and to an in-memory double in tests.
//!
//! # Streaming
//!
//! [`ObjectStore::get`] and [`ObjectStore::upload`] exchange a [`ByteStream`]:
//! a boxed stream of `Result<Bytes>` chunks. Errors travel in-band on the same
//! channel as data, so a failing source read surfaces to whichever stage is
//! consuming the stream instead of being side-registered.

pub mod memory;
pub mod s3;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use tracing::info;

use crate::error::{ArchiverError, Result};

/// Incremental byte stream with in-band error propagation.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send + 'static>>;

/// Build a single-chunk [`ByteStream`] from a byte buffer.
pub fn byte_stream_from(data: Bytes) -> ByteStream {
    Box::pin(futures::stream::once(async move {
        Ok::<_, ArchiverError>(data)
    }))
}

/// Typed record describing a store operation, emitted before each call.
///
/// Request bodies are deliberately absent; only addressing metadata is
/// logged.
#[derive(Debug, Clone, Serialize)]
pub struct StoreOp<'a> {
    /// Operation name (`get`, `put`, `upload`).
    pub operation: &'static str,
    /// Destination bucket.
    pub bucket: &'a str,
    /// Object key.
    pub key: &'a str,
    /// Content type, when the operation writes.
    pub content_type: Option<&'a str>,
}

impl<'a> StoreOp<'a> {
    /// Describe a read operation.
    pub fn read(operation: &'static str, bucket: &'a str, key: &'a str) -> Self {
        Self {
            operation,
            bucket,
            key,
            content_type: None,
        }
    }

    /// Describe a write operation.
    pub fn write(
        operation: &'static str,
        bucket: &'a str,
        key: &'a str,
        content_type: &'a str,
    ) -> Self {
        Self {
            operation,
            bucket,
            key,
            content_type: Some(content_type),
        }
    }

    /// Emit this record on the logging side channel at info level.
    pub fn emit(&self) {
        info!(
            operation = self.operation,
            bucket = self.bucket,
            key = self.key,
            content_type = self.content_type,
            "store operation"
        );
    }
}

/// Key-addressed byte storage supporting whole-object writes and incremental
/// streaming in both directions.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open an incremental read stream for `key`.
    ///
    /// Fails with [`ArchiverError::NotFound`](crate::ArchiverError::NotFound)
    /// when the key is absent and
    /// [`ArchiverError::Transient`](crate::ArchiverError::Transient) on
    /// service faults. Errors occurring after the stream is open are yielded
    /// in-band by the stream itself.
    async fn get(&self, bucket: &str, key: &str) -> Result<ByteStream>;

    /// Write a whole object body under `key`.
    async fn put(&self, bucket: &str, key: &str, content_type: &str, body: Bytes) -> Result<()>;

    /// Write an object by consuming `stream` incrementally.
    ///
    /// The total size need not be known up front. Any error yielded by the
    /// stream fails the upload with that error as the cause; nothing is
    /// stored in that case.
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        stream: ByteStream,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_byte_stream_from_yields_single_chunk() {
        let mut stream = byte_stream_from(Bytes::from_static(b"abc"));
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(&first[..], b"abc");
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_store_op_shape() {
        let op = StoreOp::write("put", "b", "1.csv", "text/csv");
        assert_eq!(op.operation, "put");
        assert_eq!(op.content_type, Some("text/csv"));

        let op = StoreOp::read("get", "b", "1.csv");
        assert!(op.content_type.is_none());

        // Serializes without bodies by construction.
        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains("\"operation\":\"get\""));
    }
}
