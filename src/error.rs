//! Error kinds surfaced by the chunk reader.
//!
//! Every failure mode a caller may want to dispatch on gets its own variant;
//! recovery is the caller's choice. The only internal recovery is the
//! directory loader falling back from the trailer to a full scan, which
//! matches on [`Error::DirectoryCorrupt`] before giving up.

use std::panic::Location;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Raw input shorter than the minimum header or wrong header magic.
    #[error("invalid chunked file: {0}")]
    InvalidFile(String),

    /// The trailer directory failed validation and scan recovery also
    /// failed to parse the chunk sequence.
    #[error("chunk directory corrupt: {0}")]
    DirectoryCorrupt(String),

    /// On-disk chunk start disagrees with the expected cursor position.
    #[error("invalid chunk location: expected {expected}, found {found}")]
    FramingMismatch { expected: u64, found: u64 },

    /// Decompressed payload checksum disagrees with the frame.
    #[error("chunk crc mismatch: stored {stored:#x}, computed {computed:#x}")]
    CrcMismatch { stored: u64, computed: u32 },

    /// The transform produced fewer or more bytes than the frame declared.
    #[error("transform produced {actual} bytes, expected {expected}")]
    DecodeSizeMismatch { expected: usize, actual: usize },

    /// Read past the total logical length of the stream.
    #[error("read past end of stream")]
    EndOfStream,

    /// Seek to a logical position no chunk maps.
    #[error("logical position {position} out of range for stream of length {length}")]
    OutOfRange { position: u64, length: u64 },

    /// Overlap fallback could not resolve a chunk for an in-range position.
    /// Indicates producer-side corruption.
    #[error("no chunk found covering logical position {0}")]
    ChunkNotFound(u64),

    /// Second close, or any operation after close. Carries the site of the
    /// first close so double-close bugs are diagnosable.
    #[error("cursor already closed (first closed at {0})")]
    AlreadyClosed(&'static Location<'static>),

    /// Physical I/O or a cache wait was interrupted.
    #[error("operation aborted")]
    OperationAborted,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
