//! Forward-only reads over a live object-store connection.

use std::fmt;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::BoxStream;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader, ReadBuf};
use tokio_util::io::StreamReader;
use tracing::debug;

use super::error::{StorageError, StorageOp};
use super::object::ObjectInfo;
use super::spool::{self, MaterializedObject};

/// Read-ahead buffer for remote streams. Object stores deliver data fast,
/// so this is larger than the usual 8 KiB.
pub const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Body chunks as delivered by the transport.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

type BufferedBody = BufReader<StreamReader<ByteStream, Bytes>>;

/// An object read straight from the store.
///
/// Owns the connection until [`close`](Self::close) is called or the handle
/// is dropped. Reads are sequential only; the type has no seek or write
/// capability.
pub struct StreamedObject {
    info: ObjectInfo,
    body: Option<BufferedBody>,
}

impl StreamedObject {
    /// Wraps a transport byte stream.
    #[must_use]
    pub fn new(info: ObjectInfo, stream: ByteStream) -> Self {
        Self {
            info,
            body: Some(BufReader::with_capacity(
                READ_BUFFER_SIZE,
                StreamReader::new(stream),
            )),
        }
    }

    /// Object properties.
    #[must_use]
    pub fn info(&self) -> &ObjectInfo {
        &self.info
    }

    /// Reads up to `n` bytes, fewer only at end of stream.
    ///
    /// Returns an empty buffer once the stream is exhausted.
    pub async fn read(&mut self, n: usize) -> Result<Bytes, StorageError> {
        let key = self.info.name.clone();
        let body = self.body.as_mut().ok_or_else(|| {
            StorageError::operation(StorageOp::Download, &key, "read on closed stream")
        })?;

        let mut buf = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            let read = body
                .read(&mut buf[filled..])
                .await
                .map_err(|e| StorageError::operation(StorageOp::Download, &key, e))?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        buf.truncate(filled);
        Ok(Bytes::from(buf))
    }

    /// Releases the connection.
    ///
    /// Returns `true` if this call released it; later calls do nothing and
    /// return `false`.
    pub fn close(&mut self) -> bool {
        match self.body.take() {
            Some(body) => {
                drop(body);
                debug!(key = %self.info.name, "closed object stream");
                true
            }
            None => false,
        }
    }

    /// True once the connection has been released.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.body.is_none()
    }

    /// Drains the stream into a local copy and releases the connection.
    ///
    /// The copy spools to a temp file in `spool_dir` when the object is larger
    /// than `spool_threshold` bytes.
    pub async fn into_materialized(
        mut self,
        spool_threshold: u64,
        spool_dir: Option<&Path>,
    ) -> Result<MaterializedObject, StorageError> {
        let info = self.info.clone();
        let result = spool::materialize(&mut self, info, spool_threshold, spool_dir).await;
        self.close();
        result
    }
}

impl AsyncRead for StreamedObject {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut().body.as_mut() {
            Some(body) => Pin::new(body).poll_read(cx, buf),
            None => Poll::Ready(Err(io::Error::other("read on closed stream"))),
        }
    }
}

impl fmt::Debug for StreamedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamedObject")
            .field("info", &self.info)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::StreamExt;
    use futures::stream;

    use super::*;

    /// Stream that counts how many times it is torn down.
    struct CountingStream {
        inner: ByteStream,
        drops: Arc<AtomicUsize>,
    }

    impl futures::Stream for CountingStream {
        type Item = io::Result<Bytes>;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            self.inner.as_mut().poll_next(cx)
        }
    }

    impl Drop for CountingStream {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn chunks(parts: &[&'static [u8]]) -> ByteStream {
        let items: Vec<io::Result<Bytes>> = parts.iter().map(|p| Ok(Bytes::from_static(p))).collect();
        stream::iter(items).boxed()
    }

    fn object(parts: &[&'static [u8]]) -> StreamedObject {
        let size = parts.iter().map(|p| p.len() as u64).sum();
        StreamedObject::new(ObjectInfo::new("users/42/abc.txt", size), chunks(parts))
    }

    #[tokio::test]
    async fn test_read_spans_chunks() {
        let mut obj = object(&[b"hello ", b"wor", b"ld"]);

        assert_eq!(obj.read(8).await.expect("read"), Bytes::from_static(b"hello wo"));
        assert_eq!(obj.read(100).await.expect("read"), Bytes::from_static(b"rld"));
    }

    #[tokio::test]
    async fn test_read_past_end_returns_empty() {
        let mut obj = object(&[b"abc"]);

        assert_eq!(obj.read(3).await.expect("read").len(), 3);
        assert!(obj.read(10).await.expect("read at eof").is_empty());
        assert!(obj.read(10).await.expect("read at eof").is_empty());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let drops = Arc::new(AtomicUsize::new(0));
        let stream = CountingStream {
            inner: chunks(&[b"data"]),
            drops: Arc::clone(&drops),
        };
        let mut obj = StreamedObject::new(ObjectInfo::new("k", 4), stream.boxed());

        assert!(obj.close());
        assert!(!obj.close());
        assert!(obj.is_closed());
        drop(obj);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_read_after_close_fails() {
        let mut obj = object(&[b"abc"]);
        obj.close();

        let err = obj.read(1).await.unwrap_err();
        assert!(matches!(err, StorageError::Operation { .. }));
    }

    #[tokio::test]
    async fn test_transport_error_surfaces_as_operation() {
        let items: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"ab")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ];
        let mut obj = StreamedObject::new(ObjectInfo::new("k", 10), stream::iter(items).boxed());

        let err = obj.read(10).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Operation {
                operation: StorageOp::Download,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_into_materialized_releases_stream() {
        let drops = Arc::new(AtomicUsize::new(0));
        let stream = CountingStream {
            inner: chunks(&[b"spool", b"ed"]),
            drops: Arc::clone(&drops),
        };
        let obj = StreamedObject::new(ObjectInfo::new("k", 7), stream.boxed());

        let mut local = obj.into_materialized(1024, None).await.expect("materialize");
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        let mut out = Vec::new();
        local.read_to_end(&mut out).await.expect("read");
        assert_eq!(out, b"spooled");
    }
}
