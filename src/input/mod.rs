//! Seekable byte sources feeding the chunk reader.
//!
//! [`RawInput`] is the contract the reader consumes: positioned reads over
//! an immutable byte extent, plus cloning into an independent handle so
//! cursor clones never fight over a shared file offset. Three sources are
//! provided: [`SliceInput`] over in-memory bytes (also used internally to
//! re-read decompressed directory payloads), [`FileInput`] over a plain
//! file descriptor, and [`MmapInput`] over a shared read-only mapping.

mod file;
mod mmap;
mod slice;

pub use file::FileInput;
pub use mmap::MmapInput;
pub use slice::SliceInput;

use crate::error::{Error, Result};

/// A seekable, cloneable byte source.
///
/// Positions are absolute byte offsets into the physical extent. Seeking
/// past the end is permitted (directory scans skip over payloads that may
/// extend past a torn tail); reads at such positions fail with an
/// unexpected-EOF I/O error.
pub trait RawInput: Send {
    fn seek(&mut self, pos: u64) -> Result<()>;

    fn tell(&self) -> u64;

    fn len(&self) -> u64;

    fn read_exact(&mut self, dst: &mut [u8]) -> Result<()>;

    /// An independent handle over the same extent, positioned where this
    /// one is. Clones never share a read cursor.
    fn try_clone(&self) -> Result<Box<dyn RawInput>>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u64_be(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    /// Reads a varint: seven-bit groups, least significant first, MSB
    /// continuation.
    fn read_var_u64(&mut self) -> Result<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            value |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift >= 64 {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "varint exceeds 64 bits",
                )));
            }
        }
    }
}
