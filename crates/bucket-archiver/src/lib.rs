//! # bucket-archiver
//!
//! Streaming object-store archiver library.
//!
//! A run synthesizes a set of CSV payloads, persists each one independently
//! to an object store, then re-reads all of them and uploads a zip archive
//! composed on the fly — the full archive never exists in memory or on disk.
//! The core is the pipeline plumbing:
//!
//! - **settle-all puts**: every payload is written concurrently and every
//!   outcome is observed; one failure never cancels its siblings
//! - **bounded conduit**: the archive encoder's output is consumed live by
//!   the uploader with backpressure in both directions
//! - **in-band failures**: a failing read during archiving poisons the
//!   conduit, so the upload fails with the root cause instead of storing a
//!   truncated archive
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bucket_archiver::{Config, Orchestrator, S3Store};
//!
//! #[tokio::main]
//! async fn main() -> bucket_archiver::Result<()> {
//!     let store = Arc::new(S3Store::from_env().await);
//!     let orchestrator = Orchestrator::new(store, Config::default());
//!     let result = orchestrator.run(None).await?;
//!     println!("uploaded {} ({} entries)", result.archive_key, result.archive_entries);
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod config;
pub mod content;
pub mod error;
pub mod orchestrator;
pub mod pipe;
pub mod store;

// Re-exports for convenient access
pub use archive::ArchiveWriter;
pub use config::{Config, GeneratorConfig, PipelineConfig, DEFAULT_BUCKET};
pub use content::{generate_payloads, Payload, CONTENT_TYPE_CSV};
pub use error::{ArchiverError, Result};
pub use orchestrator::{Orchestrator, PutOutcome, RunResult, CONTENT_TYPE_ZIP};
pub use store::memory::MemoryStore;
pub use store::s3::S3Store;
pub use store::{ByteStream, ObjectStore};
