use flate2::{Decompress, FlushDecompress, Status};

use crate::error::{Error, Result};
use crate::transform::ReadTransform;

/// Zlib inflate transform. One inflater is kept per cursor and reset per
/// chunk; chunks are independent streams.
pub struct DeflateTransform {
    inflater: Decompress,
    config: Vec<u8>,
}

impl DeflateTransform {
    pub fn new() -> Self {
        Self {
            inflater: Decompress::new(true),
            config: Vec::new(),
        }
    }
}

impl Default for DeflateTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadTransform for DeflateTransform {
    fn set_config(&mut self, config: &[u8]) -> Result<()> {
        // The producer records its compression parameters here; inflate
        // needs none of them but the bytes are kept for introspection.
        self.config = config.to_vec();
        Ok(())
    }

    fn transform(
        &mut self,
        src: &[u8],
        dst: &mut [u8],
        expected_len: usize,
    ) -> Result<Option<usize>> {
        let out_len = expected_len.min(dst.len());
        let out = &mut dst[..out_len];
        self.inflater.reset(true);
        loop {
            let in_off = self.inflater.total_in() as usize;
            let out_off = self.inflater.total_out() as usize;
            let status = self
                .inflater
                .decompress(&src[in_off..], &mut out[out_off..], FlushDecompress::Finish)
                .map_err(|e| {
                    Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
                })?;
            match status {
                Status::StreamEnd => return Ok(Some(self.inflater.total_out() as usize)),
                Status::Ok | Status::BufError => {
                    let consumed_all = self.inflater.total_in() as usize >= src.len();
                    let filled_all = self.inflater.total_out() as usize >= out.len();
                    if consumed_all || filled_all {
                        return Ok(Some(self.inflater.total_out() as usize));
                    }
                }
            }
        }
    }

    fn clone_box(&self) -> Box<dyn ReadTransform> {
        Box::new(Self {
            inflater: Decompress::new(true),
            config: self.config.clone(),
        })
    }
}
