//! Shared archive-building and chunk-source helpers for the integration
//! tests. Archives are hand-assembled byte-by-byte rather than produced by
//! some other ZIP library, matching the teacher crate's own
//! `tests/zip64_reader.rs` style of crafting exact bytes in-test.

use std::cell::Cell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use bytes::Bytes;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::Write;

use stream_unzip::ChunkSource;

pub const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x0403_4b50;
pub const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0201_4b50;
pub const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0605_4b50;
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x0807_4b50;

pub const FLAG_DEFERRED_SIZES: u16 = 0x0008;

/// Deflate-compresses `data` with a raw (no zlib header/trailer) stream, the
/// form the local header's "deflate" method expects.
pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Appends a complete stored-method member (known sizes, no ZIP64, no data
/// descriptor) to `out`.
pub fn push_stored_member(out: &mut Vec<u8>, name: &[u8], data: &[u8]) {
    push_local_header(out, 0, 0, data.len() as u32, data.len() as u32, name, &[]);
    out.extend_from_slice(data);
}

/// Appends a complete deflate-method member with known sizes to `out`.
pub fn push_deflate_member(out: &mut Vec<u8>, name: &[u8], data: &[u8]) {
    let compressed = deflate(data);
    push_local_header(
        out,
        0,
        8,
        compressed.len() as u32,
        data.len() as u32,
        name,
        &[],
    );
    out.extend_from_slice(&compressed);
}

/// Appends a data-descriptor ("bit 3") member: the local header carries
/// zero sizes, the payload follows directly, then a data descriptor with
/// the real sizes.
pub fn push_bit3_member(out: &mut Vec<u8>, name: &[u8], data: &[u8], method: u16) {
    let payload = match method {
        0 => data.to_vec(),
        8 => deflate(data),
        other => panic!("unsupported test method {other}"),
    };
    push_local_header(out, FLAG_DEFERRED_SIZES, method, 0, 0, name, &[]);
    out.extend_from_slice(&payload);
    out.extend_from_slice(&DATA_DESCRIPTOR_SIGNATURE.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // crc32, unchecked
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
}

/// Appends a stored member whose sizes are carried via a ZIP64 extra field
/// rather than the (sentinel-filled) base header fields.
pub fn push_zip64_stored_member(out: &mut Vec<u8>, name: &[u8], data: &[u8]) {
    let mut extra = Vec::new();
    extra.extend_from_slice(&0x0001u16.to_le_bytes());
    extra.extend_from_slice(&16u16.to_le_bytes());
    extra.extend_from_slice(&(data.len() as u64).to_le_bytes()); // uncompressed
    extra.extend_from_slice(&(data.len() as u64).to_le_bytes()); // compressed
    push_local_header(out, 0, 0, 0xffff_ffff, 0xffff_ffff, name, &extra);
    out.extend_from_slice(data);
}

fn push_local_header(
    out: &mut Vec<u8>,
    flags: u16,
    method: u16,
    compressed_size: u32,
    uncompressed_size: u32,
    name: &[u8],
    extra: &[u8],
) {
    out.extend_from_slice(&LOCAL_FILE_HEADER_SIGNATURE.to_le_bytes());
    out.extend_from_slice(&20u16.to_le_bytes()); // version needed
    out.extend_from_slice(&flags.to_le_bytes());
    out.extend_from_slice(&method.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // mod time/date
    out.extend_from_slice(&0u32.to_le_bytes()); // crc32
    out.extend_from_slice(&compressed_size.to_le_bytes());
    out.extend_from_slice(&uncompressed_size.to_le_bytes());
    out.extend_from_slice(&(name.len() as u16).to_le_bytes());
    out.extend_from_slice(&(extra.len() as u16).to_le_bytes());
    out.extend_from_slice(name);
    out.extend_from_slice(extra);
}

/// Appends a minimal end-of-central-directory record (no real entries —
/// just enough to let the signature dispatch terminate the session).
pub fn push_eocd(out: &mut Vec<u8>) {
    out.extend_from_slice(&END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
    out.extend_from_slice(&[0u8; 18]);
}

/// A [`ChunkSource`] that hands out `bytes` split into fixed-size pieces,
/// and records whether `cancel` was called and how many times.
pub struct FixedChunkSource {
    remaining: VecDeque<u8>,
    chunk_size: usize,
    pub cancelled: Rc<Cell<u32>>,
}

impl FixedChunkSource {
    pub fn new(bytes: Vec<u8>, chunk_size: usize) -> Self {
        Self {
            remaining: bytes.into_iter().collect(),
            chunk_size: chunk_size.max(1),
            cancelled: Rc::new(Cell::new(0)),
        }
    }

    pub fn cancel_count(&self) -> Rc<Cell<u32>> {
        self.cancelled.clone()
    }
}

impl ChunkSource for FixedChunkSource {
    fn next_chunk(&mut self) -> Option<io::Result<Bytes>> {
        if self.remaining.is_empty() {
            return None;
        }
        let take = self.chunk_size.min(self.remaining.len());
        let chunk: Vec<u8> = self.remaining.drain(..take).collect();
        Some(Ok(Bytes::from(chunk)))
    }

    fn cancel(&mut self) {
        self.cancelled.set(self.cancelled.get() + 1);
    }
}
