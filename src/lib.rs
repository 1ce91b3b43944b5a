//! # chunkstream
//!
//! Read-side core of a log-structured, chunked, transparently-transformed
//! byte stream. A producer writes a file as a sequence of independently
//! transformed (compressed, encrypted, or raw) chunks terminated by a chunk
//! directory; this crate reconstructs random access over the logical byte
//! space as if it were a flat file, even though the physical file is
//! append-only, may contain overwrites, and may have lost its directory.
//!
//! ## Quick Start
//!
//! ```ignore
//! use chunkstream::{DeflateTransform, LogicalCursor, MmapInput};
//!
//! let input = Box::new(MmapInput::open("data.chunks")?);
//! let mut cursor = LogicalCursor::open(input, Box::new(DeflateTransform::new()))?;
//!
//! cursor.seek(4096)?;
//! let mut page = vec![0u8; 512];
//! cursor.read_bytes(&mut page)?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        LogicalCursor (+ clones)         │  read/seek/slice/close
//! ├─────────────────────────────────────────┤
//! │              ChunkReader                │  frames, CRC, overwrites
//! ├──────────────┬─────────────┬────────────┤
//! │ChunkDirectory│Decompression│SharedBuffer│
//! │ (index)      │Cache (LRU)  │Pool        │
//! ├──────────────┴─────────────┴────────────┤
//! │       RawInput       │   ReadTransform  │
//! │ (slice/file/mmap)    │ (identity/zlib)  │
//! └──────────────────────┴──────────────────┘
//! ```
//!
//! Reads flow top-down: the cursor asks the reader for bytes, the reader
//! locates the owning chunk in the directory, deduplicates decompression
//! work through the cache's per-chunk locks, inflates through the
//! transform, verifies the CRC, and serves from a pooled buffer that
//! cursor clones share copy-on-refill.
//!
//! ## Overwrite Semantics
//!
//! The physical file is append-only; an overwrite is just a later chunk
//! covering an already-written logical range. The directory preserves
//! append order and the reader resolves every byte to the latest chunk
//! covering it.
//!
//! ## Recovery
//!
//! Files missing their directory trailer (crash before close, truncation)
//! are recovered by scanning chunk frames from the header to end of file.

pub mod cache;
pub mod cursor;
pub mod directory;
pub mod error;
pub mod format;
pub mod input;
pub mod pool;
pub mod reader;
pub mod transform;

pub use cache::DecompressionCache;
pub use cursor::{CursorBuilder, LogicalCursor};
pub use directory::{ChunkDirectory, ChunkRecord};
pub use error::{Error, Result};
pub use input::{FileInput, MmapInput, RawInput, SliceInput};
pub use pool::{SharedBuffer, SharedBufferPool};
pub use reader::ChunkReader;
pub use transform::{DeflateTransform, IdentityTransform, ReadTransform};
