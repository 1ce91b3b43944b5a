use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

use crate::error::Result;
use crate::input::RawInput;

/// Memory-mapped file input. All clones share one read-only mapping and
/// carry independent positions, so cloning is a pointer bump.
#[derive(Debug, Clone)]
pub struct MmapInput {
    map: Arc<Mmap>,
    pos: u64,
}

impl MmapInput {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        // SAFETY: the mapping is read-only and the format is append-only;
        // the reader contract does not cover concurrent truncation of the
        // underlying file.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self {
            map: Arc::new(map),
            pos: 0,
        })
    }
}

impl RawInput for MmapInput {
    fn seek(&mut self, pos: u64) -> Result<()> {
        self.pos = pos;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn len(&self) -> u64 {
        self.map.len() as u64
    }

    fn read_exact(&mut self, dst: &mut [u8]) -> Result<()> {
        let start = usize::try_from(self.pos)
            .map_err(|_| std::io::Error::from(std::io::ErrorKind::UnexpectedEof))?;
        let end = start
            .checked_add(dst.len())
            .filter(|&end| end <= self.map.len())
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::UnexpectedEof))?;
        dst.copy_from_slice(&self.map[start..end]);
        self.pos = end as u64;
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn RawInput>> {
        Ok(Box::new(self.clone()))
    }
}
