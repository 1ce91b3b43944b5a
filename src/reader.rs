//! # Chunk Reader
//!
//! Owns the raw input, the chunk directory, and the current decompressed
//! buffer; everything user-facing goes through [`crate::cursor::LogicalCursor`].
//!
//! ## Read Flow
//!
//! ```text
//! cursor.read_byte()
//!   └─ refill()                      when the buffer is exhausted
//!        ├─ reconcile_position()     find the chunk owning the next
//!        │                           logical byte (overwrites may have
//!        │                           displaced the append-order guess)
//!        ├─ cache.lock(start)        one decompressor per chunk key
//!        ├─ cache.get(start)         hit: copy, skip the frame
//!        ├─ frame parse + transform  miss: inflate into the pool buffer
//!        ├─ CRC check
//!        ├─ apply_overwrites()       splat later overlapping chunks over
//!        │                           the buffer, latest write wins
//!        └─ cache.put(start, buf)
//! ```
//!
//! ## Overwrite Resolution
//!
//! The producer appends; a seek-back-and-write shows up as a later chunk
//! overlapping an earlier logical range. The directory keeps append order,
//! so after decompressing a chunk the reader walks the remaining entries
//! and copies every overlapping later payload over the buffer. Reads then
//! see the newest bytes no matter which chunk physically holds them. A
//! later chunk that only partially overlaps is entered mid-payload through
//! the reconcile fallback when the cursor reaches its unshadowed tail.
//!
//! ## Buffer Discipline
//!
//! The decompressed buffer comes from the shared pool and may be shared
//! with cursor clones; the reader swaps in a fresh buffer before writing
//! whenever the handle is shared. The compressed scratch buffer is shared
//! across the whole clone family under a mutex and grown in place.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cache::DecompressionCache;
use crate::directory::ChunkDirectory;
use crate::error::{Error, Result};
use crate::format::{self, usize_from, FrameHeader, HEADER_MAGIC, MIN_FILE_LEN, TRAILER_LEN, TRAILER_MAGIC};
use crate::input::{RawInput, SliceInput};
use crate::pool::{SharedBuffer, SharedBufferPool};
use crate::transform::ReadTransform;

/// Slack added to the compressed scratch buffer over the largest expected
/// physical read.
const SCRATCH_SLACK: usize = 4;

pub struct ChunkReader {
    input: Box<dyn RawInput>,
    transform: Box<dyn ReadTransform>,
    directory: Arc<ChunkDirectory>,
    cache: Option<Arc<DecompressionCache>>,
    pool: Arc<SharedBufferPool>,
    /// Current decompressed chunk, possibly shared with cursor clones.
    buffer: SharedBuffer,
    /// Compressed-read scratch, shared across the clone family and guarded
    /// because it is grown in place.
    scratch: Arc<Mutex<Vec<u8>>>,
    max_chunk_size: usize,
    /// Logical offset of the first byte in `buffer`.
    buffer_logical_start: u64,
    /// Read position within `buffer`.
    buffer_offset: usize,
    /// Bytes of `buffer` holding decompressed data.
    buffer_fill: usize,
    /// Append-order index of the next chunk expected by sequential reads.
    chunk_idx: usize,
    /// Physical frame offset whose payload `buffer` currently holds.
    buffer_physical_pos: Option<u64>,
}

impl ChunkReader {
    pub(crate) fn new(
        mut input: Box<dyn RawInput>,
        mut transform: Box<dyn ReadTransform>,
        cache: Option<Arc<DecompressionCache>>,
        pool: Arc<SharedBufferPool>,
    ) -> Result<Self> {
        let file_len = input.len();
        if file_len < MIN_FILE_LEN {
            return Err(Error::InvalidFile(format!(
                "{file_len} bytes is below the {MIN_FILE_LEN}-byte minimum"
            )));
        }
        input.seek(0)?;
        let magic = input.read_u64_be()?;
        if magic != HEADER_MAGIC {
            return Err(Error::InvalidFile(format!("bad header magic {magic:#x}")));
        }
        let config_len = input.read_var_u64()?;
        if config_len > file_len {
            return Err(Error::InvalidFile(format!(
                "config length {config_len} exceeds file of {file_len} bytes"
            )));
        }
        let mut config = vec![0u8; usize_from(config_len, "config length")?];
        input.read_exact(&mut config)?;
        transform.set_config(&config)?;
        let body_start = input.tell();

        let scratch = Arc::new(Mutex::new(Vec::new()));
        let directory = Arc::new(load_directory(
            input.as_mut(),
            transform.as_mut(),
            &scratch,
            body_start,
        )?);

        let max_chunk_size = usize_from(directory.max_logical_len(), "max chunk size")?;
        {
            let mut scratch = scratch.lock();
            let want = usize_from(directory.max_physical_read(), "max physical read")?
                .saturating_add(SCRATCH_SLACK);
            if scratch.len() < want {
                scratch.resize(want, 0);
            }
        }
        if let Some(first) = directory.records().first() {
            input.seek(first.physical_start)?;
        }
        let buffer = pool.acquire(max_chunk_size);

        Ok(Self {
            input,
            transform,
            directory,
            cache,
            pool,
            buffer,
            scratch,
            max_chunk_size,
            buffer_logical_start: 0,
            buffer_offset: 0,
            buffer_fill: 0,
            chunk_idx: 0,
            buffer_physical_pos: None,
        })
    }

    pub fn directory(&self) -> &ChunkDirectory {
        &self.directory
    }

    pub(crate) fn total_len(&self) -> u64 {
        self.directory.total_logical_len()
    }

    /// Absolute logical position of the next byte this reader would return.
    pub(crate) fn position(&self) -> u64 {
        self.buffer_logical_start + self.buffer_offset as u64
    }

    pub(crate) fn read_byte(&mut self) -> Result<u8> {
        if self.buffer_offset >= self.buffer_fill {
            self.refill()?;
        }
        let byte = self.buffer.bytes()[self.buffer_offset];
        self.buffer_offset += 1;
        Ok(byte)
    }

    pub(crate) fn read_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        let available = self.buffer_fill - self.buffer_offset;
        if dst.len() < available {
            let offset = self.buffer_offset;
            dst.copy_from_slice(&self.buffer.bytes()[offset..offset + dst.len()]);
            self.buffer_offset += dst.len();
            return Ok(());
        }

        let mut written = 0;
        while written < dst.len() {
            let available = self.buffer_fill - self.buffer_offset;
            let step = available.min(dst.len() - written);
            let offset = self.buffer_offset;
            dst[written..written + step]
                .copy_from_slice(&self.buffer.bytes()[offset..offset + step]);
            written += step;
            self.buffer_offset += step;
            if written < dst.len() {
                self.refill()?;
            }
        }
        Ok(())
    }

    pub(crate) fn seek(&mut self, pos: u64) -> Result<()> {
        if pos >= self.buffer_logical_start {
            let offset = pos - self.buffer_logical_start;
            if offset < self.buffer_fill as u64 {
                self.buffer_offset = offset as usize;
                return Ok(());
            }
        }
        if self.directory.is_empty() {
            if pos == 0 {
                self.buffer_offset = 0;
                return Ok(());
            }
            return Err(Error::OutOfRange {
                position: pos,
                length: self.total_len(),
            });
        }

        let idx = self.directory.find_owning_chunk(pos)?;
        let record = *self.directory.record(idx);
        if record.logical_start != self.buffer_logical_start || self.buffer_fill == 0 {
            self.buffer_logical_start = record.logical_start;
            self.chunk_idx = idx;
            self.buffer_fill = 0;
            self.input.seek(record.physical_start)?;
            self.refill()?;
        }
        let offset = pos - self.buffer_logical_start;
        if offset > self.buffer_fill as u64 {
            return Err(Error::OutOfRange {
                position: pos,
                length: self.total_len(),
            });
        }
        self.buffer_offset = offset as usize;
        Ok(())
    }

    /// Loads the chunk owning the next logical position into the buffer.
    pub(crate) fn refill(&mut self) -> Result<()> {
        self.buffer_logical_start += self.buffer_fill as u64;
        self.buffer_fill = 0;
        self.buffer_offset = 0;
        if self.buffer_logical_start >= self.directory.total_logical_len() {
            return Err(Error::EndOfStream);
        }
        let initial_offset = self.reconcile_position()?;
        let physical_start = self.input.tell();
        let key = self.buffer_logical_start;
        let target_idx = self.chunk_idx;

        let cache = self.cache.clone();
        let _guard = cache.as_ref().map(|shared| shared.lock(key));

        if let Some(bytes) = cache.as_ref().and_then(|shared| shared.get(key)) {
            let fill = bytes.len();
            let capacity = self.max_chunk_size.max(fill);
            let dst = self.buffer.make_mut(capacity);
            dst[..fill].copy_from_slice(&bytes);
            self.buffer_fill = fill;
            // keep the physical cursor on the next append-order frame
            let next = if target_idx + 1 < self.directory.len() {
                self.directory.record(target_idx + 1).physical_start
            } else {
                self.directory.directory_start()
            };
            self.input.seek(next)?;
        } else {
            let header = FrameHeader::read_from(self.input.as_mut())?;
            if header.logical_start != key {
                return Err(Error::FramingMismatch {
                    expected: key,
                    found: header.logical_start,
                });
            }
            let compressed_len = usize_from(header.compressed_len, "compressed chunk size")?;
            let logical_len = usize_from(header.logical_len, "chunk logical length")?;

            if self.buffer.is_shared() {
                let pool = Arc::clone(&self.pool);
                self.buffer = pool.acquire(self.max_chunk_size.max(logical_len));
                self.buffer_physical_pos = None;
            }

            if self.buffer_physical_pos == Some(physical_start) {
                // the buffer already holds this chunk from an earlier pass
                let skip_to = self.input.tell() + compressed_len as u64;
                self.input.seek(skip_to)?;
                self.buffer_fill = logical_len;
            } else {
                let capacity = self.max_chunk_size.max(logical_len).max(compressed_len);
                let produced = {
                    let mut scratch = self.scratch.lock();
                    if scratch.len() < compressed_len {
                        scratch.resize(compressed_len, 0);
                    }
                    self.input.read_exact(&mut scratch[..compressed_len])?;
                    let dst = self.buffer.make_mut(capacity);
                    match self.transform.transform(
                        &scratch[..compressed_len],
                        &mut dst[..logical_len],
                        logical_len,
                    )? {
                        Some(n) if n == logical_len => n,
                        Some(n) => {
                            return Err(Error::DecodeSizeMismatch {
                                expected: logical_len,
                                actual: n,
                            })
                        }
                        None => {
                            dst[..compressed_len].copy_from_slice(&scratch[..compressed_len]);
                            compressed_len
                        }
                    }
                };
                format::verify_crc(&self.buffer.bytes()[..produced], header.crc)?;
                self.buffer_fill = produced;
                self.apply_overwrites(target_idx)?;
                if let Some(shared) = cache.as_ref() {
                    shared.put(key, &self.buffer.bytes()[..self.buffer_fill]);
                }
            }
        }

        self.buffer_offset = initial_offset;
        self.buffer_physical_pos = Some(physical_start);
        self.chunk_idx = target_idx + 1;
        Ok(())
    }

    /// Positions the raw input on the chunk owning `buffer_logical_start`.
    ///
    /// Sequential reads normally land on `chunk_idx` or the entry after it;
    /// overwritten files displace that, so the remaining cases consult the
    /// directory, always preferring the latest entry starting at the target
    /// position. The returned offset is nonzero only when the position is
    /// reachable solely through the middle of an overlapping chunk.
    fn reconcile_position(&mut self) -> Result<usize> {
        let pos = self.buffer_logical_start;
        let n = self.directory.len();
        let expected = self.chunk_idx;

        let mut initial_offset = 0usize;
        let target = if expected < n && self.directory.record(expected).logical_start == pos {
            expected
        } else if expected + 1 >= n {
            return Err(Error::EndOfStream);
        } else if self.directory.record(expected + 1).logical_start == pos {
            expected + 1
        } else {
            let first = self
                .directory
                .find_owning_chunk(pos)
                .map_err(|_| Error::ChunkNotFound(pos))?;
            let mut exact = None;
            for idx in first..n {
                let record = self.directory.record(idx);
                if record.logical_start > pos {
                    break;
                }
                if record.logical_start == pos {
                    // keep scanning: the latest chunk starting here wins
                    exact = Some(idx);
                }
            }
            match exact {
                Some(idx) => idx,
                None => {
                    let fallback =
                        (first..n).find(|&idx| self.directory.record(idx).covers(pos));
                    let Some(idx) = fallback else {
                        return Err(Error::ChunkNotFound(pos));
                    };
                    let record = self.directory.record(idx);
                    warn!(
                        position = pos,
                        chunk = idx,
                        "entering chunk mid-payload via overlap fallback"
                    );
                    initial_offset = (pos - record.logical_start) as usize;
                    self.buffer_logical_start = record.logical_start;
                    idx
                }
            }
        };

        let physical = self.directory.record(target).physical_start;
        if self.input.tell() != physical {
            self.input.seek(physical)?;
        }
        self.chunk_idx = target;
        Ok(initial_offset)
    }

    /// Copies every later chunk overlapping the buffered range over the
    /// buffer, in append order, so the newest write owns each byte.
    fn apply_overwrites(&mut self, base_idx: usize) -> Result<()> {
        let start = self.buffer_logical_start;
        let end = start + self.buffer_fill as u64;
        let resume = self.input.tell();

        for idx in (base_idx + 1)..self.directory.len() {
            let record = *self.directory.record(idx);
            if record.logical_start >= end || record.logical_end() <= start {
                continue;
            }
            self.input.seek(record.physical_start)?;
            let patch = read_frame_payload(
                self.input.as_mut(),
                self.transform.as_mut(),
                &self.scratch,
                Some(record.logical_start),
            )?;

            let patch_end = record.logical_start + patch.len() as u64;
            let copy_start = start.max(record.logical_start);
            let copy_end = end.min(patch_end);
            if copy_start >= copy_end {
                continue;
            }
            let src_off = (copy_start - record.logical_start) as usize;
            let dst_off = (copy_start - start) as usize;
            let len = (copy_end - copy_start) as usize;
            let fill = self.buffer_fill;
            let dst = self.buffer.make_mut(fill);
            dst[dst_off..dst_off + len].copy_from_slice(&patch[src_off..src_off + len]);
        }

        self.input.seek(resume)?;
        Ok(())
    }

    pub(crate) fn try_clone(&self) -> Result<ChunkReader> {
        Ok(ChunkReader {
            input: self.input.try_clone()?,
            transform: self.transform.clone_box(),
            directory: Arc::clone(&self.directory),
            cache: self.cache.clone(),
            pool: Arc::clone(&self.pool),
            buffer: self.buffer.share(),
            scratch: Arc::clone(&self.scratch),
            max_chunk_size: self.max_chunk_size,
            buffer_logical_start: self.buffer_logical_start,
            buffer_offset: self.buffer_offset,
            buffer_fill: self.buffer_fill,
            chunk_idx: self.chunk_idx,
            buffer_physical_pos: self.buffer_physical_pos,
        })
    }

    /// Drops the raw handle and hands the buffer back to the pool.
    pub(crate) fn release_resources(&mut self) {
        let pool = Arc::clone(&self.pool);
        self.buffer = pool.empty_handle();
        self.input = Box::new(SliceInput::empty());
        self.buffer_fill = 0;
        self.buffer_offset = 0;
        self.buffer_physical_pos = None;
    }
}

fn load_directory(
    input: &mut dyn RawInput,
    transform: &mut dyn ReadTransform,
    scratch: &Mutex<Vec<u8>>,
    body_start: u64,
) -> Result<ChunkDirectory> {
    match load_from_trailer(input, transform, scratch) {
        Ok(Some(directory)) => return Ok(directory),
        Ok(None) => debug!("no directory trailer, rebuilding by scan"),
        Err(err) => debug!(%err, "directory trailer rejected, rebuilding by scan"),
    }
    ChunkDirectory::scan(input, body_start)
}

/// Reads the trailer-addressed directory, or `None` when the trailing magic
/// says no directory was written. Any parse or validation failure is an
/// error so the caller falls back to a scan.
fn load_from_trailer(
    input: &mut dyn RawInput,
    transform: &mut dyn ReadTransform,
    scratch: &Mutex<Vec<u8>>,
) -> Result<Option<ChunkDirectory>> {
    let file_len = input.len();
    if file_len < TRAILER_LEN {
        return Ok(None);
    }
    input.seek(file_len - 16)?;
    let magic = input.read_u64_be()?;
    let total_logical_len = input.read_u64_be()?;
    if magic < TRAILER_MAGIC {
        return Ok(None);
    }

    input.seek(file_len - TRAILER_LEN)?;
    let directory_start = input.read_u64_be()?;
    if directory_start >= file_len {
        return Err(Error::DirectoryCorrupt(format!(
            "directory start {directory_start} outside file of {file_len} bytes"
        )));
    }
    input.seek(directory_start)?;
    let payload = read_frame_payload(input, transform, scratch, None)?;
    let directory = ChunkDirectory::parse_payload(&payload, total_logical_len, directory_start)?;
    Ok(Some(directory))
}

/// Decompresses one chunk frame at the input's position into a fresh
/// vector: used for the directory frame and for overwrite patches, which
/// must not disturb the reader's main buffer. The logical-start field is
/// validated only when the caller knows what to expect.
pub(crate) fn read_frame_payload(
    input: &mut dyn RawInput,
    transform: &mut dyn ReadTransform,
    scratch: &Mutex<Vec<u8>>,
    expect_logical_start: Option<u64>,
) -> Result<Vec<u8>> {
    let header = FrameHeader::read_from(input)?;
    if let Some(expected) = expect_logical_start {
        if header.logical_start != expected {
            return Err(Error::FramingMismatch {
                expected,
                found: header.logical_start,
            });
        }
    }
    let compressed_len = usize_from(header.compressed_len, "compressed chunk size")?;
    let logical_len = usize_from(header.logical_len, "chunk logical length")?;

    let mut payload = vec![0u8; logical_len];
    let produced = {
        let mut scratch = scratch.lock();
        if scratch.len() < compressed_len {
            scratch.resize(compressed_len, 0);
        }
        input.read_exact(&mut scratch[..compressed_len])?;
        match transform.transform(&scratch[..compressed_len], &mut payload, logical_len)? {
            Some(n) if n == logical_len => n,
            Some(n) => {
                return Err(Error::DecodeSizeMismatch {
                    expected: logical_len,
                    actual: n,
                })
            }
            None => {
                payload.clear();
                payload.extend_from_slice(&scratch[..compressed_len]);
                compressed_len
            }
        }
    };
    payload.truncate(produced);
    format::verify_crc(&payload, header.crc)?;
    Ok(payload)
}
