//! S3-backed object store.
//!
//! `get` streams the object body incrementally; `put` writes whole bodies;
//! `upload` runs a multipart upload fed from the input stream so the total
//! size never needs to be known up front. A stream error mid-upload aborts
//! the multipart upload and surfaces the stream's own error as the cause.

use aws_config::BehaviorVersion;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream as SdkByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::config::MIN_PART_SIZE;
use crate::error::{ArchiverError, Result};
use crate::store::{ByteStream, ObjectStore, StoreOp};

/// Default multipart part size (8 MiB).
pub const DEFAULT_PART_SIZE: usize = 8 * 1024 * 1024;

/// Object store backed by an S3-compatible service.
pub struct S3Store {
    client: Client,
    part_size: usize,
}

impl S3Store {
    /// Wrap an existing S3 client.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            part_size: DEFAULT_PART_SIZE,
        }
    }

    /// Build a store from ambient AWS configuration (env, profile, IMDS).
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::new(Client::new(&config))
    }

    /// Set the multipart part size, clamped to the service minimum.
    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = part_size.max(MIN_PART_SIZE);
        self
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        stream: &mut ByteStream,
    ) -> Result<Vec<CompletedPart>> {
        let mut parts = Vec::new();
        let mut buf = BytesMut::with_capacity(self.part_size);

        while let Some(chunk) = stream.try_next().await? {
            buf.extend_from_slice(&chunk);
            while buf.len() >= self.part_size {
                let body = buf.split_to(self.part_size).freeze();
                parts.push(
                    self.send_part(bucket, key, upload_id, parts.len() as i32 + 1, body)
                        .await?,
                );
            }
        }
        if !buf.is_empty() {
            let body = buf.freeze();
            parts.push(
                self.send_part(bucket, key, upload_id, parts.len() as i32 + 1, body)
                    .await?,
            );
        }
        Ok(parts)
    }

    async fn send_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<CompletedPart> {
        debug!(bucket, key, part_number, size = body.len(), "uploading part");
        let resp = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(SdkByteStream::from(body))
            .send()
            .await
            .map_err(|err| map_sdk_error("upload", bucket, key, err))?;
        Ok(CompletedPart::builder()
            .part_number(part_number)
            .set_e_tag(resp.e_tag().map(str::to_owned))
            .build())
    }

    async fn abort_upload(&self, bucket: &str, key: &str, upload_id: &str) {
        if let Err(err) = self
            .client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
        {
            warn!(
                bucket,
                key,
                "failed to abort multipart upload: {}",
                DisplayErrorContext(&err)
            );
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3Store {
    async fn get(&self, bucket: &str, key: &str) -> Result<ByteStream> {
        StoreOp::read("get", bucket, key).emit();

        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| map_sdk_error("get", bucket, key, err))?;

        let context = format!("get {}/{}", bucket, key);
        let stream = ReaderStream::new(resp.body.into_async_read())
            .map_err(move |err| ArchiverError::stream(context.clone(), err.to_string()));
        Ok(Box::pin(stream))
    }

    async fn put(&self, bucket: &str, key: &str, content_type: &str, body: Bytes) -> Result<()> {
        StoreOp::write("put", bucket, key, content_type).emit();

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(SdkByteStream::from(body))
            .send()
            .await
            .map_err(|err| map_sdk_error("put", bucket, key, err))?;
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

        let create = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|err| map_sdk_error("upload", bucket, key, err))?;
        let upload_id = create
            .upload_id()
            .ok_or_else(|| ArchiverError::transient("upload", "service returned no upload id"))?
            .to_string();

        match self.upload_parts(bucket, key, &upload_id, &mut stream).await {
            Ok(parts) if parts.is_empty() => {
                // Multipart completion requires at least one part; a zero-byte
                // body falls back to a whole-object put.
                self.abort_upload(bucket, key, &upload_id).await;
                self.client
                    .put_object()
                    .bucket(bucket)
                    .key(key)
                    .content_type(content_type)
                    .body(SdkByteStream::from(Bytes::new()))
                    .send()
                    .await
                    .map_err(|err| map_sdk_error("upload", bucket, key, err))?;
                Ok(())
            }
            Ok(parts) => {
                let completed = CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build();
                self.client
                    .complete_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(completed)
                    .send()
                    .await
                    .map_err(|err| map_sdk_error("upload", bucket, key, err))?;
                Ok(())
            }
            Err(err) => {
                warn!(bucket, key, "upload failed: {}", err);
                self.abort_upload(bucket, key, &upload_id).await;
                Err(err)
            }
        }
    }
}

/// Map an SDK failure onto the archiver error taxonomy.
fn map_sdk_error<E, R>(
    operation: &'static str,
    bucket: &str,
    key: &str,
    err: SdkError<E, R>,
) -> ArchiverError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    match err.code() {
        Some("NoSuchKey") | Some("NoSuchBucket") => ArchiverError::not_found(bucket, key),
        Some("AccessDenied") => {
            ArchiverError::permission(operation, DisplayErrorContext(&err).to_string())
        }
        _ => ArchiverError::transient(operation, DisplayErrorContext(&err).to_string()),
    }
}
