//! Local copies of downloaded objects, spooled to memory or disk.
//!
//! The object size is known before the copy starts, so the backing store is
//! picked once up front instead of rolling over from memory to disk midway.

use std::fmt;
use std::io::{self, Cursor, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use tempfile::{NamedTempFile, TempPath};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tracing::{debug, warn};

use super::error::{StorageError, StorageOp};
use super::object::ObjectInfo;

/// Chunk size used when draining a source into the spool.
pub const COPY_CHUNK_SIZE: usize = 64 * 1024;

const SPOOL_FILE_PREFIX: &str = "portal-spool-";

/// Where a materialized object keeps its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpoolBacking {
    /// In-memory buffer.
    Memory,
    /// Temporary file on disk.
    Disk,
}

enum Backing {
    Memory(Cursor<Vec<u8>>),
    Disk { file: File, path: TempPath },
}

/// A fully downloaded object supporting random access.
///
/// The backing is chosen at creation and never changes. Closing (or dropping)
/// the handle frees the buffer or deletes the spool file.
pub struct MaterializedObject {
    info: ObjectInfo,
    backing: Option<Backing>,
}

/// Copies `source` to a local, seekable copy.
///
/// Objects with `info.size` above `spool_threshold` go to a temp file in
/// `spool_dir` (system temp dir when `None`), everything else to memory. The
/// source is read to the end in [`COPY_CHUNK_SIZE`] chunks and the read
/// position of the result is reset to the start.
pub async fn materialize<R>(
    source: &mut R,
    mut info: ObjectInfo,
    spool_threshold: u64,
    spool_dir: Option<&Path>,
) -> Result<MaterializedObject, StorageError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let spool_err = |e: io::Error| StorageError::operation(StorageOp::Spool, &info.name, e);

    let (backing, copied) = if info.size > spool_threshold {
        let dir = spool_dir.map(Path::to_path_buf);
        let named = blocking(move || create_spool_file(dir))
            .await
            .map_err(spool_err)?;
        let (file, path) = named.into_parts();
        let mut file = File::from_std(file);

        let copied = copy_chunks(source, &mut file).await.map_err(spool_err)?;
        file.flush().await.map_err(spool_err)?;
        file.seek(SeekFrom::Start(0)).await.map_err(spool_err)?;

        debug!(key = %info.name, path = %path.display(), bytes = copied, "spooled object to disk");
        (Backing::Disk { file, path }, copied)
    } else {
        let capacity = usize::try_from(info.size).unwrap_or(0);
        let mut buf = Vec::with_capacity(capacity);

        let copied = copy_chunks(source, &mut buf).await.map_err(spool_err)?;

        debug!(key = %info.name, bytes = copied, "spooled object to memory");
        (Backing::Memory(Cursor::new(buf)), copied)
    };

    if copied != info.size {
        warn!(
            key = %info.name,
            expected = info.size,
            actual = copied,
            "object size differs from reported content length"
        );
        info.size = copied;
    }

    Ok(MaterializedObject {
        info,
        backing: Some(backing),
    })
}

fn create_spool_file(dir: Option<PathBuf>) -> io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(SPOOL_FILE_PREFIX);
    match dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
}

/// Runs filesystem work on the blocking pool.
async fn blocking<T, F>(f: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(io::Error::other)?
}

async fn copy_chunks<R, W>(source: &mut R, sink: &mut W) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut chunk = vec![0u8; COPY_CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = source.read(&mut chunk).await?;
        if n == 0 {
            return Ok(total);
        }
        sink.write_all(&chunk[..n]).await?;
        total += n as u64;
    }
}

impl MaterializedObject {
    /// Object properties. `size` is the number of bytes actually copied.
    #[must_use]
    pub fn info(&self) -> &ObjectInfo {
        &self.info
    }

    /// Backing store kind, `None` once closed.
    #[must_use]
    pub fn backing(&self) -> Option<SpoolBacking> {
        self.backing.as_ref().map(|b| match b {
            Backing::Memory(_) => SpoolBacking::Memory,
            Backing::Disk { .. } => SpoolBacking::Disk,
        })
    }

    /// Path of the spool file for disk-backed objects.
    #[must_use]
    pub fn spool_path(&self) -> Option<&Path> {
        match &self.backing {
            Some(Backing::Disk { path, .. }) => Some(&**path),
            _ => None,
        }
    }

    /// True once the backing store has been released.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.backing.is_none()
    }

    /// Reads the whole object from the start.
    pub async fn read_all(&mut self) -> Result<Vec<u8>, StorageError> {
        let key = self.info.name.clone();
        let err = |e: io::Error| StorageError::operation(StorageOp::Spool, &key, e);

        self.rewind().await.map_err(err)?;
        let mut out = Vec::with_capacity(usize::try_from(self.info.size).unwrap_or(0));
        self.read_to_end(&mut out).await.map_err(err)?;
        Ok(out)
    }

    /// Frees the buffer or removes the spool file. Safe to call twice.
    ///
    /// The file is removed on the blocking pool. Dropping an unclosed handle
    /// removes it synchronously instead.
    pub async fn close(&mut self) -> Result<(), StorageError> {
        match self.backing.take() {
            Some(Backing::Disk { file, path }) => {
                drop(file);
                let removed = path.to_path_buf();
                blocking(move || path.close())
                    .await
                    .map_err(|e| StorageError::operation(StorageOp::Spool, &self.info.name, e))?;
                debug!(key = %self.info.name, path = %removed.display(), "removed spool file");
                Ok(())
            }
            Some(Backing::Memory(_)) | None => Ok(()),
        }
    }
}

fn closed() -> io::Error {
    io::Error::other("materialized object is closed")
}

impl AsyncRead for MaterializedObject {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut().backing.as_mut() {
            Some(Backing::Memory(cursor)) => Pin::new(cursor).poll_read(cx, buf),
            Some(Backing::Disk { file, .. }) => Pin::new(file).poll_read(cx, buf),
            None => Poll::Ready(Err(closed())),
        }
    }
}

impl AsyncSeek for MaterializedObject {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        match self.get_mut().backing.as_mut() {
            Some(Backing::Memory(cursor)) => Pin::new(cursor).start_seek(position),
            Some(Backing::Disk { file, .. }) => Pin::new(file).start_seek(position),
            None => Err(closed()),
        }
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        match self.get_mut().backing.as_mut() {
            Some(Backing::Memory(cursor)) => Pin::new(cursor).poll_complete(cx),
            Some(Backing::Disk { file, .. }) => Pin::new(file).poll_complete(cx),
            None => Poll::Ready(Err(closed())),
        }
    }
}

impl fmt::Debug for MaterializedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaterializedObject")
            .field("info", &self.info)
            .field("backing", &self.backing())
            .field("spool_path", &self.spool_path())
            .finish()
    }
}
