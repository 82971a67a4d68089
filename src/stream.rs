//! Chunked body stream for file downloads.
//!
//! The stream is pull-driven: hyper only polls for the next chunk once the
//! previous one has been accepted by the transport, so a slow client simply
//! stalls the read loop instead of buffering the file in memory.

use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt, Take};
use tokio_util::io::ReaderStream;
use tracing::{debug, error, warn};

/// Lifecycle of a download body after headers have been committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Streaming,
    Completed,
    Aborted,
}

/// Streams at most `expected` bytes from `reader` in `chunk_size` pieces.
///
/// The reader (normally the opened file) is owned by the stream and released
/// when the stream is dropped, whichever way the transfer ends.
pub struct DownloadStream<R> {
    inner: ReaderStream<Take<R>>,
    path: PathBuf,
    expected: u64,
    sent: u64,
    state: StreamState,
}

impl<R: AsyncRead + Unpin> DownloadStream<R> {
    pub fn new(reader: R, path: PathBuf, expected: u64, chunk_size: usize) -> Self {
        Self {
            inner: ReaderStream::with_capacity(reader.take(expected), chunk_size),
            path,
            expected,
            sent: 0,
            state: StreamState::Streaming,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn bytes_sent(&self) -> u64 {
        self.sent
    }
}

impl<R: AsyncRead + Unpin> Stream for DownloadStream<R> {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.state != StreamState::Streaming {
            return Poll::Ready(None);
        }

        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                self.sent += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                // Headers are already on the wire; the only option is to let
                // the transport drop the connection.
                error!(
                    "Read failed after {} of {} bytes of {}: {}",
                    self.sent,
                    self.expected,
                    self.path.display(),
                    e
                );
                self.state = StreamState::Aborted;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                if self.sent < self.expected {
                    // File shrank between stat and read.
                    error!(
                        "File truncated during download: {} sent {} of {} bytes",
                        self.path.display(),
                        self.sent,
                        self.expected
                    );
                    self.state = StreamState::Aborted;
                    return Poll::Ready(Some(Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "file shorter than advertised content length",
                    ))));
                }
                debug!("Completed download: {} ({} bytes)", self.path.display(), self.sent);
                self.state = StreamState::Completed;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<R> Drop for DownloadStream<R> {
    fn drop(&mut self) {
        if self.state != StreamState::Streaming {
            return;
        }
        if self.sent == 0 && self.expected > 0 {
            // HEAD requests and early cancellations never poll the body.
            debug!("Download body dropped before streaming: {}", self.path.display());
        } else if self.sent < self.expected {
            warn!(
                "Client went away after {} of {} bytes of {}",
                self.sent,
                self.expected,
                self.path.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Cursor;

    /// Reader that yields `remaining` bytes and then fails.
    struct FailingReader {
        remaining: usize,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.remaining == 0 {
                return Poll::Ready(Err(io::Error::other("disk error")));
            }
            let n = self.remaining.min(buf.remaining());
            buf.put_slice(&vec![b'x'; n]);
            self.remaining -= n;
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_chunks_are_bounded_and_complete() {
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let mut stream = DownloadStream::new(
            Cursor::new(data.clone()),
            PathBuf::from("data.bin"),
            data.len() as u64,
            4096,
        );

        let mut received = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            assert!(chunk.len() <= 4096);
            received.extend_from_slice(&chunk);
        }

        assert_eq!(received, data);
        assert_eq!(stream.state(), StreamState::Completed);
        assert_eq!(stream.bytes_sent(), data.len() as u64);
    }

    #[tokio::test]
    async fn test_never_exceeds_expected_length() {
        // File grew after it was stat'ed.
        let data = vec![7u8; 10_000];
        let mut stream = DownloadStream::new(Cursor::new(data), PathBuf::from("grown.bin"), 6_000, 1024);

        let mut total = 0;
        while let Some(chunk) = stream.next().await {
            total += chunk.unwrap().len();
        }

        assert_eq!(total, 6_000);
        assert_eq!(stream.state(), StreamState::Completed);
    }

    #[tokio::test]
    async fn test_truncated_file_aborts() {
        let data = vec![1u8; 100];
        let mut stream = DownloadStream::new(Cursor::new(data), PathBuf::from("short.bin"), 500, 64);

        let mut saw_error = false;
        while let Some(chunk) = stream.next().await {
            if let Err(e) = chunk {
                assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof);
                saw_error = true;
            }
        }

        assert!(saw_error);
        assert_eq!(stream.state(), StreamState::Aborted);
        assert_eq!(stream.bytes_sent(), 100);
    }

    #[tokio::test]
    async fn test_read_error_aborts_and_ends_stream() {
        let reader = FailingReader { remaining: 3000 };
        let mut stream = DownloadStream::new(reader, PathBuf::from("broken.bin"), 10_000, 1024);

        let mut received = 0;
        let mut errors = 0;
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => received += bytes.len(),
                Err(_) => errors += 1,
            }
        }

        assert_eq!(received, 3000);
        assert_eq!(errors, 1);
        assert_eq!(stream.state(), StreamState::Aborted);
    }

    #[tokio::test]
    async fn test_empty_file_completes() {
        let mut stream = DownloadStream::new(Cursor::new(Vec::new()), PathBuf::from("empty"), 0, 8192);
        assert!(stream.next().await.is_none());
        assert_eq!(stream.state(), StreamState::Completed);
    }
}
