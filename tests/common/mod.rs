//! Test-side producer for the chunked file format, plus small helpers.
//!
//! The writer half of the format lives outside the library; tests need it
//! to exercise the reader, so a minimal bit-exact producer lives here:
//! header + config, chunk frames (identity or zlib), optional directory
//! trailer. Frame byte spans are recorded so corruption tests can flip
//! specific bytes.

#![allow(dead_code)]

use std::io::Write;

use crc::{Crc, CRC_32_ISO_HDLC};
use flate2::write::ZlibEncoder;

use chunkstream::format::{write_var_u64, HEADER_MAGIC, TRAILER_MAGIC};
use chunkstream::{
    DeflateTransform, IdentityTransform, LogicalCursor, ReadTransform, SliceInput,
};

pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Identity,
    Deflate,
}

/// Byte spans of one written frame inside the produced file.
#[derive(Debug, Clone, Copy)]
pub struct FrameSpan {
    pub frame_start: usize,
    pub payload_start: usize,
    pub payload_len: usize,
}

pub struct ChunkFileBuilder {
    out: Vec<u8>,
    codec: Codec,
    entries: Vec<(u64, u64, u64)>,
    frames: Vec<FrameSpan>,
    total: u64,
}

impl ChunkFileBuilder {
    pub fn new(codec: Codec) -> Self {
        Self::with_config(codec, b"")
    }

    pub fn with_config(codec: Codec, config: &[u8]) -> Self {
        let mut out = Vec::new();
        out.extend_from_slice(&HEADER_MAGIC.to_be_bytes());
        write_var_u64(&mut out, config.len() as u64);
        out.extend_from_slice(config);
        Self {
            out,
            codec,
            entries: Vec::new(),
            frames: Vec::new(),
            total: 0,
        }
    }

    fn encode(&self, payload: &[u8]) -> Vec<u8> {
        match self.codec {
            Codec::Identity => payload.to_vec(),
            Codec::Deflate => {
                let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(payload).unwrap();
                encoder.finish().unwrap()
            }
        }
    }

    fn write_frame(&mut self, logical_start: u64, payload: &[u8], declared_len: u64) -> FrameSpan {
        let frame_start = self.out.len();
        let compressed = self.encode(payload);
        write_var_u64(&mut self.out, logical_start);
        write_var_u64(&mut self.out, u64::from(CRC32.checksum(payload)));
        write_var_u64(&mut self.out, compressed.len() as u64);
        write_var_u64(&mut self.out, declared_len);
        let payload_start = self.out.len();
        self.out.extend_from_slice(&compressed);
        FrameSpan {
            frame_start,
            payload_start,
            payload_len: compressed.len(),
        }
    }

    /// Appends a chunk of `payload` starting at logical `logical_start`.
    /// Overlapping an earlier chunk is an overwrite; the later write wins
    /// on read.
    pub fn write_chunk(&mut self, logical_start: u64, payload: &[u8]) {
        let physical_start = self.out.len() as u64;
        let span = self.write_frame(logical_start, payload, payload.len() as u64);
        self.frames.push(span);
        self.entries
            .push((logical_start, physical_start, payload.len() as u64));
        self.total = self.total.max(logical_start + payload.len() as u64);
    }

    /// Like `write_chunk` but lies about the decompressed length in the
    /// frame header and the directory, for decode-mismatch tests.
    pub fn write_chunk_declaring_len(&mut self, logical_start: u64, payload: &[u8], declared: u64) {
        let physical_start = self.out.len() as u64;
        let span = self.write_frame(logical_start, payload, declared);
        self.frames.push(span);
        self.entries.push((logical_start, physical_start, declared));
        self.total = self.total.max(logical_start + declared);
    }

    pub fn frame(&self, idx: usize) -> FrameSpan {
        self.frames[idx]
    }

    pub fn total_len(&self) -> u64 {
        self.total
    }

    /// Closes the file properly: directory frame, then the 24-byte trailer.
    pub fn finish(mut self) -> Vec<u8> {
        let mut dir_payload = Vec::new();
        write_var_u64(&mut dir_payload, self.entries.len() as u64);
        for &(logical_start, physical_start, logical_len) in &self.entries {
            write_var_u64(&mut dir_payload, logical_start);
            write_var_u64(&mut dir_payload, physical_start);
            write_var_u64(&mut dir_payload, logical_len);
        }
        let directory_start = self.out.len() as u64;
        let total = self.total;
        self.write_frame(total, &dir_payload, dir_payload.len() as u64);
        self.out.extend_from_slice(&directory_start.to_be_bytes());
        self.out.extend_from_slice(&TRAILER_MAGIC.to_be_bytes());
        self.out.extend_from_slice(&total.to_be_bytes());
        self.out
    }

    /// Simulates a crash before close: no directory, no trailer.
    pub fn finish_without_directory(self) -> Vec<u8> {
        self.out
    }
}

pub fn transform_for(codec: Codec) -> Box<dyn ReadTransform> {
    match codec {
        Codec::Identity => Box::new(IdentityTransform::new()),
        Codec::Deflate => Box::new(DeflateTransform::new()),
    }
}

pub fn open_cursor(bytes: Vec<u8>, codec: Codec) -> LogicalCursor {
    LogicalCursor::open(Box::new(SliceInput::new(bytes)), transform_for(codec))
        .expect("cursor open")
}

/// Deterministic non-repeating filler.
pub fn patterned(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}
