//! Local file header parsing and the member-boundary signature dispatch.
//!
//! Everything here reads forward from the pull buffer only; none of it ever
//! seeks, because the archive is never assumed to be seekable.

use bytes::Bytes;

use crate::chunk::{ChunkSource, PullBuffer};
use crate::error::{DecodeError, Result};

const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x0403_4b50;
const CENTRAL_DIRECTORY_HEADER_SIGNATURE: u32 = 0x0201_4b50;
const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0605_4b50;

const ZIP64_EXTRA_ID: u16 = 0x0001;
const ZIP64_SENTINEL: u32 = 0xffff_ffff;

const FLAG_ENCRYPTED: u16 = 0x0001;
const FLAG_DEFERRED_SIZES: u16 = 0x0008;

/// The four-byte marker the decoder finds at every member boundary.
pub(crate) enum Signature {
    Local(LocalHeader),
    CentralDirectory,
    EndOfCentralDirectory,
}

/// A parsed local file header, with ZIP64 replacement sizes already applied.
pub(crate) struct LocalHeader {
    pub(crate) name: Bytes,
    pub(crate) compression_method: u16,
    pub(crate) deferred_sizes: bool,
    pub(crate) zip64_extra_present: bool,
    /// `None` only when `deferred_sizes` is set; otherwise the size of the
    /// compressed payload that follows, with ZIP64 substitution applied.
    pub(crate) compressed_size: Option<u64>,
    /// The size surfaced to the consumer as `Member::size_hint`.
    pub(crate) uncompressed_size: Option<u64>,
}

/// Reads the next four-byte signature and, for a local file header,
/// the header that follows it. Returns `Ok(None)` if the source ends
/// cleanly right at a boundary.
pub(crate) fn parse_next<S: ChunkSource>(buf: &mut PullBuffer<S>) -> Result<Option<Signature>> {
    let sig_bytes = match buf.try_take_exact(4)? {
        Some(bytes) => bytes,
        None => return Ok(None),
    };
    let signature = u32::from_le_bytes(sig_bytes[..4].try_into().unwrap());
    match signature {
        LOCAL_FILE_HEADER_SIGNATURE => Ok(Some(Signature::Local(parse_local_header(buf)?))),
        CENTRAL_DIRECTORY_HEADER_SIGNATURE => Ok(Some(Signature::CentralDirectory)),
        END_OF_CENTRAL_DIRECTORY_SIGNATURE => Ok(Some(Signature::EndOfCentralDirectory)),
        other => Err(DecodeError::UnexpectedSignature(other)),
    }
}

fn parse_local_header<S: ChunkSource>(buf: &mut PullBuffer<S>) -> Result<LocalHeader> {
    let fixed = buf.take_exact(26)?;

    let flags = u16_le(&fixed, 2);
    let compression_method = u16_le(&fixed, 4);
    let compressed_size_32 = u32_le(&fixed, 14);
    let uncompressed_size_32 = u32_le(&fixed, 18);
    let name_len = u16_le(&fixed, 22) as usize;
    let extra_len = u16_le(&fixed, 24) as usize;

    if flags & FLAG_ENCRYPTED != 0 {
        return Err(DecodeError::UnsupportedFlag(flags));
    }
    if compression_method != 0 && compression_method != 8 {
        return Err(DecodeError::UnsupportedCompression(compression_method));
    }

    let name = buf.take_exact(name_len)?;
    let extra = buf.take_exact(extra_len)?;

    let deferred_sizes = flags & FLAG_DEFERRED_SIZES != 0;
    let zip64 = find_zip64_extra(&extra);
    let zip64_extra_present = zip64.is_some();

    let (compressed_size, uncompressed_size) = if deferred_sizes {
        (None, None)
    } else {
        let mut uncompressed_size = uncompressed_size_32 as u64;
        let mut compressed_size = compressed_size_32 as u64;
        let mut cursor = 0usize;
        if let Some(zip64_data) = zip64 {
            if uncompressed_size_32 == ZIP64_SENTINEL {
                uncompressed_size = take_u64(zip64_data, &mut cursor)?;
            }
            if compressed_size_32 == ZIP64_SENTINEL {
                compressed_size = take_u64(zip64_data, &mut cursor)?;
            }
        } else if uncompressed_size_32 == ZIP64_SENTINEL || compressed_size_32 == ZIP64_SENTINEL {
            return Err(DecodeError::MissingZip64Field);
        }
        (Some(compressed_size), Some(uncompressed_size))
    };

    Ok(LocalHeader {
        name,
        compression_method,
        deferred_sizes,
        zip64_extra_present,
        compressed_size,
        uncompressed_size,
    })
}

/// Scans the raw extra field area for a ZIP64 (`0x0001`) record and
/// returns its data slice, if present.
fn find_zip64_extra(extra: &[u8]) -> Option<&[u8]> {
    let mut pos = 0usize;
    while pos + 4 <= extra.len() {
        let id = u16_le(extra, pos);
        let size = u16_le(extra, pos + 2) as usize;
        let data_start = pos + 4;
        let data_end = data_start.checked_add(size)?;
        if data_end > extra.len() {
            return None;
        }
        if id == ZIP64_EXTRA_ID {
            return Some(&extra[data_start..data_end]);
        }
        pos = data_end;
    }
    None
}

fn take_u64(data: &[u8], cursor: &mut usize) -> Result<u64> {
    let end = *cursor + 8;
    if end > data.len() {
        return Err(DecodeError::MissingZip64Field);
    }
    let value = u64::from_le_bytes(data[*cursor..end].try_into().unwrap());
    *cursor = end;
    Ok(value)
}

fn u16_le(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn u32_le(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
