//! Read-side payload transforms.
//!
//! A [`ReadTransform`] inverts whatever byte function the producer applied
//! per chunk: decompression, decryption, or nothing. The reader calls
//! [`ReadTransform::transform`] once per chunk with the raw frame payload
//! and a destination sized to the frame's declared logical length.
//!
//! Returning `Ok(None)` means "pass-through": the payload was stored
//! untransformed and the reader copies it verbatim, treating the compressed
//! length as the logical length. Transforms may hold stream state (an
//! inflater, a cipher), so cursor cloning duplicates them via
//! [`ReadTransform::clone_box`].

mod deflate;

pub use deflate::DeflateTransform;

use crate::error::Result;

pub trait ReadTransform: Send {
    /// Receives the opaque config bytes stored in the file header before
    /// any chunk is read.
    fn set_config(&mut self, config: &[u8]) -> Result<()>;

    /// Transforms `src` into `dst`, returning the number of bytes produced,
    /// or `None` when the payload was stored untransformed. `expected_len`
    /// is the frame's declared logical length; `dst` is at least that long.
    fn transform(
        &mut self,
        src: &[u8],
        dst: &mut [u8],
        expected_len: usize,
    ) -> Result<Option<usize>>;

    /// An independent instance for a cloned cursor.
    fn clone_box(&self) -> Box<dyn ReadTransform>;
}

/// Transform for files whose producer stored chunks untransformed.
#[derive(Debug, Default, Clone)]
pub struct IdentityTransform;

impl IdentityTransform {
    pub fn new() -> Self {
        Self
    }
}

impl ReadTransform for IdentityTransform {
    fn set_config(&mut self, _config: &[u8]) -> Result<()> {
        Ok(())
    }

    fn transform(
        &mut self,
        _src: &[u8],
        _dst: &mut [u8],
        _expected_len: usize,
    ) -> Result<Option<usize>> {
        Ok(None)
    }

    fn clone_box(&self) -> Box<dyn ReadTransform> {
        Box::new(self.clone())
    }
}
