//! Random-access read capability and source implementations.
//!
//! [`RandomAccessRead`] is the seam between the caching channel and whatever
//! actually holds the bytes: a local file, an object-store download, or an
//! in-memory test double. Seeking is a bookkeeping operation — no I/O happens
//! until the next `read`.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Result of a single `read` call.
///
/// End-of-data is a distinguished outcome rather than an error, and is kept
/// separate from a zero-capacity read: reading into an empty buffer while
/// bytes remain yields `Read(0)`, never `Eof`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes were copied into the caller's buffer.
    Read(usize),
    /// The current position is at or beyond the end of the data.
    Eof,
}

/// Read-only random access over a fixed-size sequence of bytes.
///
/// The contract consumed (for the remote source) and exposed (by the
/// channel) alike:
///
/// - `size` is fixed for the lifetime of the handle, captured when the
///   handle is opened.
/// - `set_position` accepts **any** offset, including at or beyond `size`;
///   it performs no I/O and never range-checks. An out-of-bounds position
///   only means the next `read` returns [`ReadOutcome::Eof`].
/// - `read` may return fewer bytes than the buffer holds even before EOF;
///   callers that need a full window must loop.
/// - After `close`, `read` and `set_position` fail with
///   [`Closed`](crate::error::ErrorKind::Closed); the `size` and `position`
///   getters stay usable. A second `close` is a benign no-op.
#[async_trait]
pub trait RandomAccessRead: Send {
    /// Total size of the underlying data in bytes.
    fn size(&self) -> u64;

    /// Current read offset.
    fn position(&self) -> u64;

    /// Move the read offset. No I/O, no range check.
    fn set_position(&mut self, pos: u64) -> Result<()>;

    /// Read some bytes from the current position into `buf`, advancing the
    /// position by the number of bytes read.
    async fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome>;

    /// Release the underlying resources.
    async fn close(&mut self) -> Result<()>;
}

/// Owned handle to a boxed source, for callers that pick one at runtime.
pub type SourceHandle = Box<dyn RandomAccessRead>;

#[async_trait]
impl<T: RandomAccessRead + ?Sized> RandomAccessRead for Box<T> {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn position(&self) -> u64 {
        (**self).position()
    }

    fn set_position(&mut self, pos: u64) -> Result<()> {
        (**self).set_position(pos)
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome> {
        (**self).read(buf).await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }
}

/// Read-only random access over a local file via `tokio::fs`.
///
/// The size is captured from metadata at open. The position is tracked
/// logically and applied with a seek immediately before each read, so
/// repositioning is free.
///
/// # Examples
///
/// ```no_run
/// use hoard_channel::{FileSource, RandomAccessRead, ReadOutcome};
///
/// # async fn example() -> hoard_channel::error::Result<()> {
/// let mut source = FileSource::open("/var/lib/repository/objects/ab/cdef01").await?;
/// source.set_position(1024)?;
/// let mut buf = [0u8; 512];
/// if let ReadOutcome::Read(n) = source.read(&mut buf).await? {
///     println!("read {n} bytes at offset 1024");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FileSource {
    /// `None` once closed.
    file: Option<File>,
    path: PathBuf,
    size: u64,
    pos: u64,
}

impl FileSource {
    /// Open a file for read-only random access, capturing its size.
    ///
    /// # Errors
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await.map_err(|e| map_io_error(e, &path))?;
        let size = file.metadata().await.map_err(ErrorKind::Io)?.len();
        Ok(Self {
            file: Some(file),
            path,
            size,
            pos: 0,
        })
    }

    /// Path this source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RandomAccessRead for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn set_position(&mut self, pos: u64) -> Result<()> {
        if self.file.is_none() {
            exn::bail!(ErrorKind::Closed);
        }
        self.pos = pos;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome> {
        let Some(file) = self.file.as_mut() else {
            exn::bail!(ErrorKind::Closed);
        };
        if self.pos >= self.size {
            return Ok(ReadOutcome::Eof);
        }
        if buf.is_empty() {
            return Ok(ReadOutcome::Read(0));
        }
        // The logical position may have moved since the last read; the OS
        // cursor is only authoritative for the duration of this call.
        file.seek(SeekFrom::Start(self.pos)).await.map_err(ErrorKind::Io)?;
        let n = file.read(buf).await.map_err(ErrorKind::Io)?;
        if n == 0 {
            // Shorter on disk than the size captured at open.
            return Ok(ReadOutcome::Eof);
        }
        self.pos += n as u64;
        Ok(ReadOutcome::Read(n))
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the handle releases it; nothing to flush on a read-only file.
        self.file.take();
        Ok(())
    }
}

fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
    match e.kind() {
        std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
        _ => ErrorKind::Io(e),
    }
}

/// In-memory source for testing.
///
/// Counts `read` and `set_position` calls so tests can assert that a fully
/// cached window never touches the source again. `with_max_chunk` caps how
/// many bytes a single `read` returns, to exercise short-read handling, and
/// `with_reported_size` makes the source claim more bytes than it holds, to
/// exercise EOF defence.
#[cfg(any(test, feature = "mock"))]
pub struct MockSource {
    data: Vec<u8>,
    reported_size: u64,
    pos: u64,
    open: bool,
    max_chunk: usize,
    reads: usize,
    seeks: usize,
}

#[cfg(any(test, feature = "mock"))]
impl MockSource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        Self {
            reported_size: data.len() as u64,
            data,
            pos: 0,
            open: true,
            max_chunk: usize::MAX,
            reads: 0,
            seeks: 0,
        }
    }

    /// Cap the number of bytes a single `read` call returns.
    pub fn with_max_chunk(mut self, max_chunk: usize) -> Self {
        self.max_chunk = max_chunk;
        self
    }

    /// Report a size different from the actual data length.
    ///
    /// A source claiming more bytes than it holds signals EOF mid-window,
    /// which a well-behaved source never does; the channel must survive it
    /// anyway.
    pub fn with_reported_size(mut self, size: u64) -> Self {
        self.reported_size = size;
        self
    }

    /// Number of `read` calls made so far.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Number of `set_position` calls made so far.
    pub fn seeks(&self) -> usize {
        self.seeks
    }
}

#[cfg(any(test, feature = "mock"))]
#[async_trait]
impl RandomAccessRead for MockSource {
    fn size(&self) -> u64 {
        self.reported_size
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn set_position(&mut self, pos: u64) -> Result<()> {
        if !self.open {
            exn::bail!(ErrorKind::Closed);
        }
        self.seeks += 1;
        self.pos = pos;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome> {
        if !self.open {
            exn::bail!(ErrorKind::Closed);
        }
        self.reads += 1;
        if self.pos >= self.data.len() as u64 {
            return Ok(ReadOutcome::Eof);
        }
        if buf.is_empty() {
            return Ok(ReadOutcome::Read(0));
        }
        let start = self.pos as usize;
        let n = buf.len().min(self.data.len() - start).min(self.max_chunk);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.pos += n as u64;
        Ok(ReadOutcome::Read(n))
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }
}
