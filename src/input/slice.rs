use std::sync::Arc;

use crate::error::Result;
use crate::input::RawInput;

/// In-memory input over shared immutable bytes. Clones share the backing
/// allocation and carry independent positions.
#[derive(Debug, Clone)]
pub struct SliceInput {
    data: Arc<[u8]>,
    pos: u64,
}

impl SliceInput {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl RawInput for SliceInput {
    fn seek(&mut self, pos: u64) -> Result<()> {
        self.pos = pos;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_exact(&mut self, dst: &mut [u8]) -> Result<()> {
        let start = usize::try_from(self.pos)
            .map_err(|_| std::io::Error::from(std::io::ErrorKind::UnexpectedEof))?;
        let end = start
            .checked_add(dst.len())
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::UnexpectedEof))?;
        dst.copy_from_slice(&self.data[start..end]);
        self.pos = end as u64;
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn RawInput>> {
        Ok(Box::new(self.clone()))
    }
}
