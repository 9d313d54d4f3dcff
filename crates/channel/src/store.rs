//! Cache store contract and implementations.
//!
//! The store is the durable, local half of the channel: a random-access
//! file that gets filled piecewise at absolute offsets as windows of the
//! source are fetched. Writes may be sparse — the channel only ever reads
//! back ranges it has written itself, so the holes never need zero-filling.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Local, durable, random-access byte store.
///
/// - `write_at` persists bytes at an absolute offset; gaps between writes
///   are allowed.
/// - `read_at` returns exactly `len` bytes previously written at `offset`;
///   reading a range that was never written is a caller bug and fails.
/// - After `close`, both operations fail with
///   [`Closed`](crate::error::ErrorKind::Closed); closing twice is a benign
///   no-op. Closing never deletes the on-disk content.
#[async_trait]
pub trait CacheStore: Send {
    /// Persist `data` starting at absolute `offset`.
    async fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()>;

    /// Read exactly `len` previously written bytes starting at `offset`.
    async fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>>;

    /// Flush and release the underlying resources.
    async fn close(&mut self) -> Result<()>;
}

/// Cache store backed by a local file via `tokio::fs`.
///
/// The file is opened (or created) without truncation, so bytes written by
/// an earlier run stay on disk; whether anything trusts them is the
/// caller's business — a fresh channel never does.
pub struct FileStore {
    /// `None` once closed.
    file: Option<File>,
    path: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a cache file for random-access read/write.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await
            .map_err(ErrorKind::Io)?;
        Ok(Self { file: Some(file), path })
    }

    /// Path of the backing cache file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            exn::bail!(ErrorKind::Closed);
        };
        if data.is_empty() {
            return Ok(());
        }
        file.seek(SeekFrom::Start(offset)).await.map_err(ErrorKind::Io)?;
        file.write_all(data).await.map_err(ErrorKind::Io)?;
        Ok(())
    }

    async fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let Some(file) = self.file.as_mut() else {
            exn::bail!(ErrorKind::Closed);
        };
        file.seek(SeekFrom::Start(offset)).await.map_err(ErrorKind::Io)?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf).await.map_err(ErrorKind::Io)?;
        Ok(buf)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await.map_err(ErrorKind::Io)?;
        }
        Ok(())
    }
}

/// In-memory cache store for testing.
///
/// Tracks which offsets have actually been written and refuses to serve
/// anything else, so a test fails loudly if the channel ever reads a range
/// it never persisted.
#[cfg(any(test, feature = "mock"))]
pub struct MemStore {
    data: Vec<u8>,
    written: hoard_ranges::RangeSet,
    open: bool,
}

#[cfg(any(test, feature = "mock"))]
impl MemStore {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            written: hoard_ranges::RangeSet::new(),
            open: true,
        }
    }

    /// Everything written so far, with zero bytes in the holes.
    pub fn contents(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(any(test, feature = "mock"))]
impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "mock"))]
#[async_trait]
impl CacheStore for MemStore {
    async fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if !self.open {
            exn::bail!(ErrorKind::Closed);
        }
        if data.is_empty() {
            return Ok(());
        }
        let end = offset as usize + data.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[offset as usize..end].copy_from_slice(data);
        self.written.insert(hoard_ranges::ByteRange::new(offset, end as u64));
        Ok(())
    }

    async fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        if !self.open {
            exn::bail!(ErrorKind::Closed);
        }
        let window = hoard_ranges::ByteRange::new(offset, offset + len as u64);
        if !self.written.is_covered(window) {
            exn::bail!(ErrorKind::Store(format!("read of never-written range {window}")));
        }
        Ok(self.data[offset as usize..offset as usize + len].to_vec())
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_store_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path().join("cache.bin")).await.unwrap();
        store.write_at(0, b"hello").await.unwrap();
        assert_eq!(store.read_at(0, 5).await.unwrap(), b"hello");
        assert_eq!(store.read_at(1, 3).await.unwrap(), b"ell");
    }

    #[tokio::test]
    async fn test_file_store_sparse_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path().join("cache.bin")).await.unwrap();
        // Write out of order with a hole in the middle.
        store.write_at(100, b"tail").await.unwrap();
        store.write_at(0, b"head").await.unwrap();
        assert_eq!(store.read_at(0, 4).await.unwrap(), b"head");
        assert_eq!(store.read_at(100, 4).await.unwrap(), b"tail");
    }

    #[tokio::test]
    async fn test_file_store_read_past_end_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path().join("cache.bin")).await.unwrap();
        store.write_at(0, b"abc").await.unwrap();
        let err = store.read_at(0, 10).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Io(_)));
    }

    #[tokio::test]
    async fn test_file_store_content_survives_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.bin");
        let mut store = FileStore::open(&path).await.unwrap();
        store.write_at(0, b"durable").await.unwrap();
        store.close().await.unwrap();
        // Close releases the handle but never deletes the file.
        assert_eq!(std::fs::read(&path).unwrap(), b"durable");

        // Re-opening does not truncate.
        let mut store = FileStore::open(&path).await.unwrap();
        assert_eq!(store.read_at(0, 7).await.unwrap(), b"durable");
    }

    #[tokio::test]
    async fn test_file_store_closed() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path().join("cache.bin")).await.unwrap();
        store.close().await.unwrap();
        assert!(matches!(&*store.write_at(0, b"x").await.unwrap_err(), ErrorKind::Closed));
        assert!(matches!(&*store.read_at(0, 1).await.unwrap_err(), ErrorKind::Closed));
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_mem_store_rejects_unwritten_reads() {
        let mut store = MemStore::new();
        store.write_at(0, b"aaa").await.unwrap();
        store.write_at(10, b"bbb").await.unwrap();
        assert_eq!(store.read_at(10, 3).await.unwrap(), b"bbb");
        // The hole between the writes was never persisted.
        let err = store.read_at(0, 13).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Store(_)));
    }

    #[tokio::test]
    async fn test_mem_store_overwrite_is_last_writer_wins() {
        let mut store = MemStore::new();
        store.write_at(0, b"xxxx").await.unwrap();
        store.write_at(1, b"yy").await.unwrap();
        assert_eq!(store.read_at(0, 4).await.unwrap(), b"xyyx");
    }
}
