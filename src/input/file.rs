use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::input::RawInput;

/// Plain file input. Cloning re-opens the file by path so each handle owns
/// its descriptor and offset; a duplicated descriptor would share the OS
/// file offset between clones.
#[derive(Debug)]
pub struct FileInput {
    path: PathBuf,
    file: File,
    pos: u64,
    len: u64,
}

impl FileInput {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            pos: 0,
            len,
        })
    }
}

impl RawInput for FileInput {
    fn seek(&mut self, pos: u64) -> Result<()> {
        self.pos = pos;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn read_exact(&mut self, dst: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(self.pos))?;
        let mut filled = 0;
        while filled < dst.len() {
            match self.file.read(&mut dst[filled..]) {
                Ok(0) => {
                    return Err(Error::Io(std::io::ErrorKind::UnexpectedEof.into()));
                }
                Ok(n) => filled += n,
                // An interrupt aborts the read instead of retrying; callers
                // see it as a cancelled operation.
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {
                    return Err(Error::OperationAborted);
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.pos += dst.len() as u64;
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn RawInput>> {
        let mut clone = FileInput::open(&self.path)?;
        clone.pos = self.pos;
        Ok(Box::new(clone))
    }
}
