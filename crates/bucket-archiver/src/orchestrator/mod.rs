//! Pipeline orchestrator - main workflow coordinator.
//!
//! One run flows through three phases:
//!
//! 1. synthesize N payloads,
//! 2. persist each payload with independent, settle-all puts,
//! 3. re-read every key and compose a zip archive on the fly, uploading the
//!    encoder's output live through a bounded conduit.
//!
//! Put failures are recorded per key and never abort the run; get, encoding
//! and upload failures propagate through the conduit and fail the run as a
//! whole.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::archive::ArchiveWriter;
use crate::config::Config;
use crate::content::{generate_payloads, Payload, CONTENT_TYPE_CSV};
use crate::error::{ArchiverError, Result};
use crate::pipe::{self, PipeWriter};
use crate::store::ObjectStore;

/// Content type of the uploaded archive.
pub const CONTENT_TYPE_ZIP: &str = "application/zip";

/// Archive pipeline orchestrator.
///
/// Receives its object store explicitly so runs can be wired to S3 in
/// production and to test doubles elsewhere; lifecycle is scoped to one run.
pub struct Orchestrator {
    store: Arc<dyn ObjectStore>,
    config: Config,
}

/// Outcome of a single put in the settle-all phase.
#[derive(Debug)]
pub struct PutOutcome {
    /// Object key the put targeted.
    pub key: String,
    /// Success, or the typed error that settled this put.
    pub result: Result<()>,
}

impl PutOutcome {
    /// Whether this put succeeded.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Result of an archive run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Payloads generated.
    pub files_total: usize,

    /// Puts that succeeded.
    pub puts_succeeded: usize,

    /// Puts that failed (recorded, non-fatal).
    pub puts_failed: usize,

    /// Keys whose put failed.
    pub failed_keys: Vec<String>,

    /// Key the archive was uploaded under.
    pub archive_key: String,

    /// Entries in the uploaded archive.
    pub archive_entries: u64,

    /// Payload bytes drained into the archive.
    pub archive_bytes: u64,
}

impl RunResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Orchestrator {
    /// Create a new orchestrator over an injected store.
    pub fn new(store: Arc<dyn ObjectStore>, config: Config) -> Self {
        Self { store, config }
    }

    /// Run the full pipeline.
    pub async fn run(&self, cancel: Option<CancellationToken>) -> Result<RunResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let cancel = cancel.unwrap_or_default();

        info!(
            "Starting archive run {} (bucket: {})",
            run_id, self.config.bucket
        );

        // Phase 1: synthesize payloads
        let generator = &self.config.generator;
        let payloads = generate_payloads(generator.file_count, generator.rows_per_file);
        info!(
            "Phase 1: generated {} payloads ({} rows each)",
            payloads.len(),
            generator.rows_per_file
        );

        // Phase 2: persist every payload; each put settles independently
        info!("Phase 2: persisting payloads");
        let outcomes = self.persist_all(&payloads, &cancel).await;

        let failed_keys: Vec<String> = outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| o.key.clone())
            .collect();
        let puts_succeeded = outcomes.len() - failed_keys.len();

        if !failed_keys.is_empty() {
            warn!(
                "{} of {} puts failed: {:?}",
                failed_keys.len(),
                outcomes.len(),
                failed_keys
            );
        }
        if puts_succeeded == 0 && !payloads.is_empty() {
            warn!("no put succeeded; attempting archive phase anyway");
        }
        if cancel.is_cancelled() {
            return Err(ArchiverError::Cancelled);
        }

        // Phase 3: stream-compose the archive and upload it
        info!(
            "Phase 3: archiving {} objects into {}/{}",
            payloads.len(),
            self.config.bucket,
            self.config.pipeline.archive_key
        );
        let names: Vec<String> = payloads.iter().map(|p| p.name.clone()).collect();
        let (archive_entries, archive_bytes) = self.archive_and_upload(&names, &cancel).await?;

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let result = RunResult {
            run_id,
            status: "completed".to_string(),
            started_at,
            completed_at,
            duration_seconds: duration,
            files_total: payloads.len(),
            puts_succeeded,
            puts_failed: failed_keys.len(),
            failed_keys,
            archive_key: self.config.pipeline.archive_key.clone(),
            archive_entries,
            archive_bytes,
        };

        info!(
            "Run {}: {} files, {}/{} puts ok, archive {} ({} entries, {} bytes) in {:.1}s",
            result.status,
            result.files_total,
            result.puts_succeeded,
            result.files_total,
            result.archive_key,
            result.archive_entries,
            result.archive_bytes,
            result.duration_seconds
        );

        Ok(result)
    }

    /// Persist all payloads and settle every outcome.
    ///
    /// Puts run concurrently; one failure neither cancels nor blocks the
    /// others, and failures are returned per key rather than propagated.
    pub async fn persist_all(
        &self,
        payloads: &[Payload],
        cancel: &CancellationToken,
    ) -> Vec<PutOutcome> {
        let mut handles = Vec::with_capacity(payloads.len());

        for payload in payloads {
            if cancel.is_cancelled() {
                info!("Cancellation requested, skipping remaining puts");
                break;
            }

            let store = Arc::clone(&self.store);
            let bucket = self.config.bucket.clone();
            let key = payload.name.clone();
            let data = payload.data.clone();

            let handle = tokio::spawn(async move {
                store.put(&bucket, &key, CONTENT_TYPE_CSV, data).await
            });
            handles.push((payload.name.clone(), handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (key, handle) in handles {
            let result = match handle.await {
                Ok(Ok(())) => {
                    debug!("{}: stored", key);
                    Ok(())
                }
                Ok(Err(e)) => {
                    warn!("{}: put failed - {}", key, e);
                    Err(e)
                }
                Err(e) => {
                    error!("{}: put task panicked - {}", key, e);
                    Err(ArchiverError::Task(format!("put task panicked: {}", e)))
                }
            };
            outcomes.push(PutOutcome { key, result });
        }
        outcomes
    }

    /// Re-read `names` from the store, encode them into a zip archive and
    /// upload the encoder's output as it is produced.
    ///
    /// Returns `(entries, payload_bytes)` on success. The archive is streamed
    /// through a bounded conduit, so at no point does the whole encoded body
    /// exist in memory.
    pub async fn archive_and_upload(
        &self,
        names: &[String],
        cancel: &CancellationToken,
    ) -> Result<(u64, u64)> {
        let (writer, reader) = pipe::bounded(self.config.pipeline.pipe_capacity);

        let store = Arc::clone(&self.store);
        let bucket = self.config.bucket.clone();
        let archive_key = self.config.pipeline.archive_key.clone();
        let upload_handle = tokio::spawn(async move {
            store
                .upload(&bucket, &archive_key, CONTENT_TYPE_ZIP, reader.into_byte_stream())
                .await
        });

        let encode_result = self.encode_entries(writer, names, cancel).await;

        let upload_result = match upload_handle.await {
            Ok(res) => res,
            Err(e) => Err(ArchiverError::Task(format!("upload task panicked: {}", e))),
        };

        match (encode_result, upload_result) {
            (Ok(stats), Ok(())) => Ok(stats),
            // The encoder saw the failure first; report that root cause even
            // though the upload fails as a consequence.
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
        }
    }

    /// Drive the encoder over the conduit's writer half.
    ///
    /// On any failure the conduit is poisoned so the concurrent upload fails
    /// with the encoder's root cause instead of seeing a truncated archive.
    async fn encode_entries(
        &self,
        writer: PipeWriter,
        names: &[String],
        cancel: &CancellationToken,
    ) -> Result<(u64, u64)> {
        let abort = writer.abort_handle();

        match self.drive_encoder(writer, names, cancel).await {
            Ok(stats) => Ok(stats),
            Err(e) => {
                warn!("archive encoding failed: {}", e);
                abort
                    .abort(ArchiverError::stream("archive", e.to_string()))
                    .await;
                Err(e)
            }
        }
    }

    async fn drive_encoder(
        &self,
        writer: PipeWriter,
        names: &[String],
        cancel: &CancellationToken,
    ) -> Result<(u64, u64)> {
        let mut archive = ArchiveWriter::new(writer);
        let bucket = self.config.bucket.clone();
        let store = Arc::clone(&self.store);
        let prefetch = self.config.pipeline.get_prefetch.max(1);

        // Open up to `prefetch` get streams ahead of the encoder; entries are
        // still appended strictly in payload order.
        let mut gets = futures::stream::iter(names.iter().cloned().map(move |name| {
            let store = Arc::clone(&store);
            let bucket = bucket.clone();
            async move {
                let stream = store.get(&bucket, &name).await;
                (name, stream)
            }
        }))
        .buffered(prefetch);

        let mut total_bytes = 0u64;
        while let Some((name, stream)) = gets.next().await {
            if cancel.is_cancelled() {
                return Err(ArchiverError::Cancelled);
            }
            let written = archive.append_entry(&name, stream?).await?;
            debug!("{}: archived {} bytes", name, written);
            total_bytes += written;
        }

        let entries = archive.entries();
        // Sealing the archive returns the conduit writer; dropping it delivers
        // end-of-stream to the uploader.
        let _writer = archive.finalize().await?;
        Ok((entries, total_bytes))
    }
}
