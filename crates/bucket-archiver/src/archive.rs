//! Streaming archive encoder.
//!
//! [`ArchiveWriter`] wraps a streaming zip encoder over any async sink and
//! enforces the entry lifecycle by ownership: entries are appended while the
//! writer is open, and [`ArchiveWriter::finalize`] consumes the writer, after
//! which no further entry can exist. Entry bytes are framed and emitted onto
//! the sink as they arrive; the whole archive never exists in memory.
//!
//! A source stream that fails mid-read aborts the append with that error.
//! The encoder does not write a trailing structure in that case, so an
//! interrupted archive is never mistaken for a complete one; callers feeding
//! a live consumer are expected to poison their sink (see
//! [`PipeAbortHandle`](crate::pipe::PipeAbortHandle)).

use async_zip::base::write::ZipFileWriter;
use async_zip::{Compression, ZipEntryBuilder};
use futures::io::AsyncWriteExt;
use futures::TryStreamExt;
use tokio::io::AsyncWrite;
use tokio_util::compat::Compat;

use crate::error::Result;
use crate::store::ByteStream;

/// Streaming zip writer over an async sink.
pub struct ArchiveWriter<W: AsyncWrite + Unpin + Send> {
    inner: ZipFileWriter<Compat<W>>,
    entries: u64,
}

impl<W: AsyncWrite + Unpin + Send> ArchiveWriter<W> {
    /// Open an archive writing into `sink`.
    pub fn new(sink: W) -> Self {
        Self {
            inner: ZipFileWriter::with_tokio(sink),
            entries: 0,
        }
    }

    /// Number of entries appended so far.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Append one named entry by draining `stream` to exhaustion.
    ///
    /// Returns the number of payload bytes written. A stream error abandons
    /// the entry and is returned as-is, so the caller sees the source's root
    /// cause.
    pub async fn append_entry(&mut self, name: &str, mut stream: ByteStream) -> Result<u64> {
        let builder = ZipEntryBuilder::new(name.to_string().into(), Compression::Deflate);
        let mut entry = self.inner.write_entry_stream(builder).await?;

        let mut written = 0u64;
        while let Some(chunk) = stream.try_next().await? {
            entry.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        entry.close().await?;

        self.entries += 1;
        Ok(written)
    }

    /// Seal the archive: write the trailing structure and hand back the sink.
    ///
    /// Legal with zero entries; the result is a valid empty archive.
    pub async fn finalize(self) -> Result<W> {
        let sink = self.inner.close().await?;
        Ok(sink.into_inner())
    }
}
