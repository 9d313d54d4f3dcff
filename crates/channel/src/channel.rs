//! The read-through caching channel.

use crate::error::{ErrorKind, Result};
use crate::source::{RandomAccessRead, ReadOutcome};
use crate::store::CacheStore;
use async_trait::async_trait;
use hoard_ranges::{ByteRange, RangeSet};
use tracing::instrument;

/// A random-access read channel that persists every byte it fetches.
///
/// Wraps a read-only [`RandomAccessRead`] source and a [`CacheStore`].
/// Each `read` splits the requested window into sub-ranges already present
/// in the store and gaps that are not; gaps are fetched from the source in
/// ascending order, written into the store at their absolute offsets, and
/// recorded in the coverage set. The window is then served from the store,
/// so every byte handed to a caller has also been persisted.
///
/// The channel is a single-consumer object: all methods take `&mut self`
/// and there is no internal locking. Two channel instances over the same
/// store location race benignly — both write identical bytes, sourced from
/// the same immutable object.
///
/// # Examples
///
/// ```no_run
/// use hoard_channel::{CachingChannel, FileSource, FileStore, ReadOutcome};
///
/// # async fn example() -> hoard_channel::error::Result<()> {
/// let source = FileSource::open("/mnt/repository/objects/ab/cdef01").await?;
/// let store = FileStore::open("/var/cache/hoard/abcdef01").await?;
/// let mut channel = CachingChannel::new(source, store);
///
/// let mut buf = vec![0u8; 4096];
/// channel.set_position(1 << 20)?;
/// match channel.read(&mut buf).await? {
///     ReadOutcome::Read(n) => println!("{n} bytes (now cached locally)"),
///     ReadOutcome::Eof => println!("past the end"),
/// }
/// channel.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct CachingChannel<D, S> {
    source: D,
    store: S,
    /// Source size, captured once at construction.
    size: u64,
    pos: u64,
    cached: RangeSet,
    open: bool,
}

impl<D: RandomAccessRead, S: CacheStore> CachingChannel<D, S> {
    /// Bind a source and a cache store into a channel.
    ///
    /// The source's size is captured here and fixed for the channel's
    /// lifetime. Coverage always starts empty: bytes a previous run may
    /// have left at the store location are untrusted and will be
    /// re-fetched before ever being served.
    pub fn new(source: D, store: S) -> Self {
        let size = source.size();
        Self {
            source,
            store,
            size,
            pos: 0,
            cached: RangeSet::new(),
            open: true,
        }
    }

    /// Total size of the wrapped source in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Current read offset. May be at or beyond [`size`](Self::size).
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Move the read offset. Any value is accepted — positions at or beyond
    /// the source size are not an error, they just make the next `read`
    /// return [`ReadOutcome::Eof`]. No I/O happens here.
    pub fn set_position(&mut self, pos: u64) -> Result<()> {
        if !self.open {
            exn::bail!(ErrorKind::Closed);
        }
        self.pos = pos;
        Ok(())
    }

    /// Byte ranges of the source currently present in the cache store.
    pub fn coverage(&self) -> &RangeSet {
        &self.cached
    }

    /// Whether the entire source, `[0, size)`, is cached locally.
    pub fn is_complete(&self) -> bool {
        self.cached.covers_exactly(ByteRange::new(0, self.size))
    }

    /// Read from the current position, filling cache gaps from the source
    /// first.
    ///
    /// Returns [`ReadOutcome::Eof`] when the position is at or beyond the
    /// source size, and [`ReadOutcome::Read`]`(0)` for a zero-capacity
    /// buffer while bytes remain — the two are never conflated. Otherwise
    /// the window `[position, position + min(buf.len(), remaining))` is
    /// made fully resident in the store and served from it in one
    /// contiguous read.
    ///
    /// # Errors
    ///
    /// Source and store failures propagate verbatim; nothing is retried and
    /// nothing already persisted is rolled back. Coverage reflects exactly
    /// the bytes that were durably written before the failing step, so a
    /// retried read skips the sub-ranges that were already secured.
    #[instrument(skip(self, buf), fields(pos = self.pos, capacity = buf.len()))]
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome> {
        if !self.open {
            exn::bail!(ErrorKind::Closed);
        }
        if self.pos >= self.size {
            return Ok(ReadOutcome::Eof);
        }
        if buf.is_empty() {
            return Ok(ReadOutcome::Read(0));
        }
        let available = self.size - self.pos;
        let mut to_read = (buf.len() as u64).min(available);
        let window = ByteRange::new(self.pos, self.pos + to_read);

        // Snapshot the holes up front: filling them mutates the set, and
        // inserts only ever grow coverage, so the snapshot stays valid.
        let gaps: Vec<ByteRange> = self.cached.gaps(window).collect();
        for gap in gaps {
            let got = self.fill_gap(gap).await?;
            if got < gap.len() {
                // The source ended before the window did. Everything below
                // `gap.start + got` is contiguous coverage; serve that
                // prefix and nothing more.
                to_read = gap.start + got - self.pos;
                break;
            }
        }
        if to_read == 0 {
            // The source hit EOF at the very start of the window.
            return Ok(ReadOutcome::Eof);
        }

        let data = self.store.read_at(self.pos, to_read as usize).await?;
        buf[..data.len()].copy_from_slice(&data);
        self.pos += to_read;
        Ok(ReadOutcome::Read(to_read as usize))
    }

    /// Fetch one hole from the source and persist it, returning the number
    /// of bytes actually obtained (less than `gap.len()` only if the source
    /// signalled EOF early).
    async fn fill_gap(&mut self, gap: ByteRange) -> Result<u64> {
        tracing::debug!(gap = %gap, "fetching uncached range from source");
        self.source.set_position(gap.start)?;
        let mut chunk = vec![0u8; gap.len() as usize];
        let mut filled = 0;
        while filled < chunk.len() {
            match self.source.read(&mut chunk[filled..]).await? {
                ReadOutcome::Read(0) | ReadOutcome::Eof => break,
                ReadOutcome::Read(n) => filled += n,
            }
        }
        if filled > 0 {
            // Persist before recording coverage: the set must never claim
            // bytes the store does not hold.
            self.store.write_at(gap.start, &chunk[..filled]).await?;
            self.cached.insert(ByteRange::new(gap.start, gap.start + filled as u64));
        }
        Ok(filled as u64)
    }

    /// Always fails: the channel is read-only.
    pub async fn write(&mut self, _data: &[u8]) -> Result<usize> {
        tracing::info!("rejecting write on read-only caching channel");
        exn::bail!(ErrorKind::Unsupported("write"));
    }

    /// Always fails: the channel is read-only.
    pub async fn truncate(&mut self, _len: u64) -> Result<()> {
        tracing::info!("rejecting truncate on read-only caching channel");
        exn::bail!(ErrorKind::Unsupported("truncate"));
    }

    /// Close the source and the store.
    ///
    /// The cache file's content is a durable side effect of having read
    /// through the channel; closing never deletes it. Closing an already
    /// closed channel is a benign no-op. After close, `read`,
    /// `set_position`, `write` and `truncate` fail with
    /// [`Closed`](crate::error::ErrorKind::Closed); the getters and
    /// [`is_complete`](Self::is_complete) stay usable.
    pub async fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.source.close().await?;
        self.store.close().await?;
        Ok(())
    }
}

/// The channel exposes the same capability surface it consumes, so a fully
/// constructed channel can stand in anywhere a plain source is expected.
#[async_trait]
impl<D: RandomAccessRead, S: CacheStore> RandomAccessRead for CachingChannel<D, S> {
    fn size(&self) -> u64 {
        CachingChannel::size(self)
    }

    fn position(&self) -> u64 {
        CachingChannel::position(self)
    }

    fn set_position(&mut self, pos: u64) -> Result<()> {
        CachingChannel::set_position(self, pos)
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome> {
        CachingChannel::read(self, buf).await
    }

    async fn close(&mut self) -> Result<()> {
        CachingChannel::close(self).await
    }
}
