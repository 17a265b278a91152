//! Bounded in-memory conduit between a byte producer and a byte consumer.
//!
//! The writer half implements [`tokio::io::AsyncWrite`] so the archive
//! encoder can treat it as an ordinary sink; the reader half implements
//! [`futures::Stream`] so the uploader can consume it incrementally. Chunks
//! and errors travel in-band over a bounded channel:
//!
//! - the writer suspends once the reader lags `capacity` chunks behind
//!   (backpressure, bounding memory),
//! - the reader suspends while no chunk is available,
//! - dropping the writer ends the stream (`None`), so the reader observes a
//!   clean end-of-stream,
//! - dropping the reader makes further writes fail with `BrokenPipe`,
//! - [`PipeAbortHandle::abort`] poisons the conduit with a typed error so the
//!   consumer fails with the producer's root cause instead of a truncated,
//!   valid-looking prefix.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;

use crate::error::{ArchiverError, Result};
use crate::store::ByteStream;

type Item = Result<Bytes>;

/// Create a conduit holding at most `capacity` in-flight chunks.
pub fn bounded(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel::<Item>(capacity.max(1));
    let writer = PipeWriter {
        raw: tx.clone(),
        tx: PollSender::new(tx),
    };
    (writer, PipeReader { rx })
}

/// Writable end of the conduit.
pub struct PipeWriter {
    tx: PollSender<Item>,
    raw: mpsc::Sender<Item>,
}

impl PipeWriter {
    /// Obtain a handle that can poison the conduit with an error.
    ///
    /// The handle holds the channel open: end-of-stream is delivered once the
    /// writer and every outstanding handle have been dropped.
    pub fn abort_handle(&self) -> PipeAbortHandle {
        PipeAbortHandle {
            tx: self.raw.clone(),
        }
    }
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "conduit reader dropped")
}

impl AsyncWrite for PipeWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        match self.tx.poll_reserve(cx) {
            Poll::Ready(Ok(())) => {
                let chunk = Bytes::copy_from_slice(buf);
                let len = chunk.len();
                if self.tx.send_item(Ok(chunk)).is_err() {
                    return Poll::Ready(Err(broken_pipe()));
                }
                Poll::Ready(Ok(len))
            }
            Poll::Ready(Err(_)) => Poll::Ready(Err(broken_pipe())),
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Chunks are handed over on write; there is nothing to flush.
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.tx.close();
        Poll::Ready(Ok(()))
    }
}

/// Poisons the conduit so the reader observes the producer's failure.
pub struct PipeAbortHandle {
    tx: mpsc::Sender<Item>,
}

impl PipeAbortHandle {
    /// Deliver `error` in-band and release the handle.
    ///
    /// Best effort: if the reader is already gone there is nobody left to
    /// notify.
    pub async fn abort(self, error: ArchiverError) {
        let _ = self.tx.send(Err(error)).await;
    }
}

/// Readable end of the conduit.
pub struct PipeReader {
    rx: mpsc::Receiver<Item>,
}

impl PipeReader {
    /// Box this reader as a [`ByteStream`] for the store's upload side.
    pub fn into_byte_stream(self) -> ByteStream {
        Box::pin(self)
    }
}

impl Stream for PipeReader {
    type Item = Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let (mut writer, mut reader) = bounded(4);

        writer.write_all(b"hello ").await.unwrap();
        writer.write_all(b"world").await.unwrap();
        writer.shutdown().await.unwrap();
        drop(writer);

        let first = reader.next().await.unwrap().unwrap();
        let second = reader.next().await.unwrap().unwrap();
        assert_eq!(&first[..], b"hello ");
        assert_eq!(&second[..], b"world");
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dropping_writer_signals_end_of_stream() {
        let (writer, mut reader) = bounded(1);
        drop(writer);
        assert!(reader.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_writer_suspends_at_capacity() {
        let (mut writer, mut reader) = bounded(1);

        // Fills the single slot.
        writer.write_all(b"one").await.unwrap();

        // The next write cannot complete until the reader drains a chunk.
        let blocked = timeout(Duration::from_millis(50), writer.write_all(b"two")).await;
        assert!(blocked.is_err(), "write completed despite full conduit");

        let drained = reader.next().await.unwrap().unwrap();
        assert_eq!(&drained[..], b"one");

        timeout(Duration::from_millis(50), writer.write_all(b"two"))
            .await
            .expect("write should proceed after drain")
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_reader_breaks_writes() {
        let (mut writer, reader) = bounded(1);
        drop(reader);

        let err = writer.write_all(b"data").await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_abort_poisons_reader() {
        let (writer, mut reader) = bounded(4);
        let abort = writer.abort_handle();

        abort
            .abort(ArchiverError::stream("get b/2.csv", "connection reset"))
            .await;
        drop(writer);

        let err = reader.next().await.unwrap().unwrap_err();
        assert!(matches!(err, ArchiverError::Stream { .. }));
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn test_abort_after_data_preserves_order() {
        let (mut writer, mut reader) = bounded(4);
        let abort = writer.abort_handle();

        writer.write_all(b"partial").await.unwrap();
        abort.abort(ArchiverError::Cancelled).await;
        drop(writer);

        assert_eq!(&reader.next().await.unwrap().unwrap()[..], b"partial");
        assert!(matches!(
            reader.next().await.unwrap().unwrap_err(),
            ArchiverError::Cancelled
        ));
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_write_is_noop() {
        let (mut writer, mut reader) = bounded(1);
        assert_eq!(writer.write(b"").await.unwrap(), 0);
        drop(writer);
        assert!(reader.next().await.is_none());
    }
}
