//! User-facing cursor over the logical byte stream.
//!
//! A [`LogicalCursor`] reads the reconstructed stream as if it were a flat
//! file: byte reads, bulk reads, seek/tell, cloning, and zero-copy logical
//! slicing. Each cursor is single-threaded; clones carry their own raw
//! input and transform and may proceed in parallel, coordinating only
//! through the shared cache and buffer pool.

use std::panic::Location;
use std::sync::Arc;

use crate::cache::DecompressionCache;
use crate::error::{Error, Result};
use crate::input::RawInput;
use crate::pool::SharedBufferPool;
use crate::reader::ChunkReader;
use crate::transform::ReadTransform;

pub struct LogicalCursor {
    reader: ChunkReader,
    /// Slice base added to every caller position.
    logical_base: u64,
    /// Slice length; `None` reads to the end of the stream.
    max_logical_len: Option<u64>,
    closed_at: Option<&'static Location<'static>>,
}

/// Configures and opens a [`LogicalCursor`].
///
/// ```ignore
/// let cursor = LogicalCursor::builder(input, Box::new(DeflateTransform::new()))
///     .cache(cache)
///     .open()?;
/// ```
pub struct CursorBuilder {
    input: Box<dyn RawInput>,
    transform: Box<dyn ReadTransform>,
    cache: Option<Arc<DecompressionCache>>,
    pool: Option<Arc<SharedBufferPool>>,
}

impl CursorBuilder {
    /// Attach a decompression cache shared between cursors of this file.
    pub fn cache(mut self, cache: Arc<DecompressionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use a shared buffer pool instead of a private one.
    pub fn pool(mut self, pool: Arc<SharedBufferPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Parses the header, loads or reconstructs the chunk directory, and
    /// returns a cursor positioned at logical offset zero.
    pub fn open(self) -> Result<LogicalCursor> {
        let pool = self
            .pool
            .unwrap_or_else(|| Arc::new(SharedBufferPool::new()));
        let reader = ChunkReader::new(self.input, self.transform, self.cache, pool)?;
        Ok(LogicalCursor {
            reader,
            logical_base: 0,
            max_logical_len: None,
            closed_at: None,
        })
    }
}

impl LogicalCursor {
    pub fn builder(input: Box<dyn RawInput>, transform: Box<dyn ReadTransform>) -> CursorBuilder {
        CursorBuilder {
            input,
            transform,
            cache: None,
            pool: None,
        }
    }

    /// Opens a cursor with a private pool and no cache.
    pub fn open(input: Box<dyn RawInput>, transform: Box<dyn ReadTransform>) -> Result<Self> {
        Self::builder(input, transform).open()
    }

    fn ensure_open(&self) -> Result<()> {
        match self.closed_at {
            Some(site) => Err(Error::AlreadyClosed(site)),
            None => Ok(()),
        }
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        self.ensure_open()?;
        self.reader.read_byte()
    }

    /// Fills `dst` from the current position, crossing chunk boundaries as
    /// needed. Fails with [`Error::EndOfStream`] when the stream runs out
    /// before `dst` is full.
    pub fn read_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        self.ensure_open()?;
        self.reader.read_bytes(dst)
    }

    pub fn seek(&mut self, pos: u64) -> Result<()> {
        self.ensure_open()?;
        let absolute = self.logical_base.checked_add(pos).ok_or(Error::OutOfRange {
            position: pos,
            length: self.len(),
        })?;
        self.reader.seek(absolute)
    }

    pub fn tell(&self) -> u64 {
        self.reader.position().saturating_sub(self.logical_base)
    }

    /// Logical length visible through this cursor: the slice length for
    /// slices, the total stream length otherwise.
    pub fn len(&self) -> u64 {
        self.max_logical_len
            .unwrap_or_else(|| self.reader.total_len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Independent cursor at the same position. The raw input and the
    /// transform are deep-cloned; the decompressed buffer is shared until
    /// either side refills it.
    pub fn try_clone(&self) -> Result<LogicalCursor> {
        self.ensure_open()?;
        Ok(LogicalCursor {
            reader: self.reader.try_clone()?,
            logical_base: self.logical_base,
            max_logical_len: self.max_logical_len,
            closed_at: None,
        })
    }

    /// Cursor exposing `[base, base + len)` of the stream as positions
    /// `[0, len)`. No bytes are copied.
    pub fn slice(&self, base: u64, len: u64) -> Result<LogicalCursor> {
        self.ensure_open()?;
        let mut sliced = LogicalCursor {
            reader: self.reader.try_clone()?,
            logical_base: base,
            max_logical_len: Some(len),
            closed_at: None,
        };
        sliced.seek(0)?;
        Ok(sliced)
    }

    /// Closes the raw handle and returns the buffer to the pool. A second
    /// close reports where the first one happened.
    #[track_caller]
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.reader.release_resources();
        self.closed_at = Some(Location::caller());
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }

    /// The chunk directory backing this cursor.
    pub fn directory(&self) -> &crate::directory::ChunkDirectory {
        self.reader.directory()
    }
}
