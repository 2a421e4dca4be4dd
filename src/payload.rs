//! Decodes one member's payload: stored or deflate, with a size known up
//! front from the local header or deferred to a trailing data descriptor.

use bytes::{Bytes, BytesMut};
use flate2::{Decompress, DecompressError, FlushDecompress, Status};

use crate::chunk::{ChunkSource, PullBuffer};
use crate::error::{DecodeError, Result};
use crate::header::LocalHeader;

const DATA_DESCRIPTOR_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x07, 0x08];

/// Width of the size fields in a trailing data descriptor. ZIP64 widens
/// them from 4 bytes to 8, signalled by the local header carrying a ZIP64
/// extra field at all (independent of whether sizes needed substitution).
#[derive(Clone, Copy)]
enum DescriptorWidth {
    Narrow,
    Wide,
}

impl DescriptorWidth {
    fn size_field_len(self) -> usize {
        match self {
            DescriptorWidth::Narrow => 4,
            DescriptorWidth::Wide => 8,
        }
    }
}

pub(crate) enum PayloadDecoder {
    StoredKnown {
        remaining: u64,
    },
    StoredDescriptor {
        width: DescriptorWidth,
        carry: Vec<u8>,
        pending: std::collections::VecDeque<Bytes>,
        emitted: u64,
        descriptor_done: bool,
    },
    DeflateKnown {
        inflater: Decompress,
        remaining_in: u64,
        finished: bool,
    },
    DeflateDescriptor {
        inflater: Decompress,
        width: DescriptorWidth,
        emitted: u64,
        finished: bool,
    },
}

impl PayloadDecoder {
    pub(crate) fn new(header: &LocalHeader) -> Result<Self> {
        let width = if header.zip64_extra_present {
            DescriptorWidth::Wide
        } else {
            DescriptorWidth::Narrow
        };
        Ok(match (header.compression_method, header.deferred_sizes) {
            (0, false) => PayloadDecoder::StoredKnown {
                remaining: header.compressed_size.expect("known size"),
            },
            (0, true) => PayloadDecoder::StoredDescriptor {
                width,
                carry: Vec::new(),
                pending: std::collections::VecDeque::new(),
                emitted: 0,
                descriptor_done: false,
            },
            (8, false) => PayloadDecoder::DeflateKnown {
                inflater: Decompress::new(false),
                remaining_in: header.compressed_size.expect("known size"),
                finished: false,
            },
            (8, true) => PayloadDecoder::DeflateDescriptor {
                inflater: Decompress::new(false),
                width,
                emitted: 0,
                finished: false,
            },
            (other, _) => return Err(DecodeError::UnsupportedCompression(other)),
        })
    }

    /// Produces the next output chunk, at most `chunk_size` bytes and never
    /// empty. Returns `Ok(None)` once the member's payload is exhausted.
    pub(crate) fn next_chunk<S: ChunkSource>(
        &mut self,
        buf: &mut PullBuffer<S>,
        chunk_size: usize,
    ) -> Result<Option<Bytes>> {
        match self {
            PayloadDecoder::StoredKnown { remaining } => {
                if *remaining == 0 {
                    return Ok(None);
                }
                let take = (*remaining).min(chunk_size as u64) as usize;
                let chunk = buf.take_up_to(take)?;
                *remaining -= chunk.len() as u64;
                Ok(Some(chunk))
            }
            PayloadDecoder::StoredDescriptor {
                width,
                carry,
                pending,
                emitted,
                descriptor_done,
            } => loop {
                if let Some(front) = pending.front_mut() {
                    let take = front.len().min(chunk_size);
                    let chunk = front.split_to(take);
                    let empty = front.is_empty();
                    if empty {
                        pending.pop_front();
                    }
                    return Ok(Some(chunk));
                }
                if *descriptor_done {
                    return Ok(None);
                }
                if scan_for_descriptor(buf, carry, pending, emitted)? {
                    let (_, uncompressed_size) = parse_data_descriptor(buf, *width)?;
                    if uncompressed_size != *emitted {
                        return Err(DecodeError::LengthMismatch);
                    }
                    *descriptor_done = true;
                }
            },
            PayloadDecoder::DeflateKnown {
                inflater,
                remaining_in,
                finished,
            } => {
                if *finished {
                    return Ok(None);
                }
                loop {
                    let to_pull = (*remaining_in).min(8192) as usize;
                    let input = if to_pull == 0 {
                        Bytes::new()
                    } else {
                        buf.take_up_to(to_pull)?
                    };
                    let flush = if *remaining_in == 0 {
                        FlushDecompress::Finish
                    } else {
                        FlushDecompress::None
                    };
                    let (consumed, produced, status) =
                        run_inflater(inflater, &input, chunk_size, flush)?;
                    if consumed < input.len() {
                        buf.return_unused(input.slice(consumed..));
                    }
                    *remaining_in -= consumed as u64;
                    if status == Status::StreamEnd {
                        *finished = true;
                        if *remaining_in != 0 {
                            return Err(DecodeError::LengthMismatch);
                        }
                    } else if status == Status::BufError
                        || (consumed == 0 && produced.is_none())
                    {
                        // The inflater made no forward progress against the
                        // bytes the header declared as the compressed size:
                        // either it reported it can't continue, or it
                        // consumed and produced nothing despite input (or
                        // the declared end) being available. That only
                        // happens when `compressed_size` undercounts the
                        // real stream.
                        return Err(DecodeError::LengthMismatch);
                    }
                    if let Some(chunk) = produced {
                        return Ok(Some(chunk));
                    }
                    if *finished {
                        return Ok(None);
                    }
                }
            }
            PayloadDecoder::DeflateDescriptor {
                inflater,
                width,
                emitted,
                finished,
            } => {
                if *finished {
                    return Ok(None);
                }
                loop {
                    let input = buf.take_up_to(8192)?;
                    let (consumed, produced, status) =
                        run_inflater(inflater, &input, chunk_size, FlushDecompress::None)?;
                    if consumed < input.len() {
                        buf.return_unused(input.slice(consumed..));
                    }
                    if let Some(chunk) = &produced {
                        *emitted += chunk.len() as u64;
                    }
                    if status == Status::StreamEnd {
                        *finished = true;
                        let (_, uncompressed_size) = parse_data_descriptor(buf, *width)?;
                        if uncompressed_size != *emitted {
                            return Err(DecodeError::LengthMismatch);
                        }
                    }
                    if let Some(chunk) = produced {
                        return Ok(Some(chunk));
                    }
                    if *finished {
                        return Ok(None);
                    }
                }
            }
        }
    }
}

fn run_inflater(
    inflater: &mut Decompress,
    input: &[u8],
    chunk_size: usize,
    flush: FlushDecompress,
) -> Result<(usize, Option<Bytes>, Status)> {
    let mut output = vec![0u8; chunk_size];
    let before_in = inflater.total_in();
    let before_out = inflater.total_out();
    let status = inflater
        .decompress(input, &mut output, flush)
        .map_err(|e: DecompressError| DecodeError::from(e))?;
    let consumed = (inflater.total_in() - before_in) as usize;
    let produced = (inflater.total_out() - before_out) as usize;
    output.truncate(produced);
    let chunk = if produced > 0 {
        Some(Bytes::from(output))
    } else {
        None
    };
    Ok((consumed, chunk, status))
}

/// Pulls a chunk of raw bytes and searches `carry ++ chunk` for the data
/// descriptor signature. Confirmed payload bytes are pushed onto `pending`
/// and counted into `emitted`; anything from the signature onward is pushed
/// back onto the pull buffer so [`parse_data_descriptor`] can read it with
/// ordinary exact-size reads.
fn scan_for_descriptor<S: ChunkSource>(
    buf: &mut PullBuffer<S>,
    carry: &mut Vec<u8>,
    pending: &mut std::collections::VecDeque<Bytes>,
    emitted: &mut u64,
) -> Result<bool> {
    let new_data = buf.take_up_to(8192)?;
    let mut combined = Vec::with_capacity(carry.len() + new_data.len());
    combined.extend_from_slice(carry);
    combined.extend_from_slice(&new_data);

    if let Some(pos) = find_descriptor_signature(&combined) {
        if pos > 0 {
            pending.push_back(Bytes::copy_from_slice(&combined[..pos]));
            *emitted += pos as u64;
        }
        buf.return_unused(Bytes::copy_from_slice(&combined[pos..]));
        carry.clear();
        Ok(true)
    } else {
        let keep = combined.len().saturating_sub(DATA_DESCRIPTOR_SIGNATURE.len() - 1);
        if keep > 0 {
            pending.push_back(Bytes::copy_from_slice(&combined[..keep]));
            *emitted += keep as u64;
        }
        *carry = combined[keep..].to_vec();
        Ok(false)
    }
}

fn find_descriptor_signature(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(DATA_DESCRIPTOR_SIGNATURE.len())
        .position(|w| w == DATA_DESCRIPTOR_SIGNATURE)
}

/// Reads a trailing data descriptor: an optional signature, a CRC32, and
/// compressed/uncompressed sizes in `width`-byte fields. Returns the CRC32
/// and uncompressed size.
fn parse_data_descriptor<S: ChunkSource>(
    buf: &mut PullBuffer<S>,
    width: DescriptorWidth,
) -> Result<(u32, u64)> {
    let first = buf.take_exact(4)?;
    let has_signature = first[..] == DATA_DESCRIPTOR_SIGNATURE;
    let crc_bytes = if has_signature {
        buf.take_exact(4)?
    } else {
        first
    };
    let crc32 = u32::from_le_bytes(crc_bytes[..4].try_into().unwrap());

    let size_len = width.size_field_len();
    let compressed_bytes = buf.take_exact(size_len)?;
    let uncompressed_bytes = buf.take_exact(size_len)?;
    let uncompressed_size = read_sized_le(&uncompressed_bytes);
    let _compressed_size = read_sized_le(&compressed_bytes);

    Ok((crc32, uncompressed_size))
}

fn read_sized_le(bytes: &Bytes) -> u64 {
    match bytes.len() {
        4 => u32::from_le_bytes(bytes[..4].try_into().unwrap()) as u64,
        8 => u64::from_le_bytes(bytes[..8].try_into().unwrap()),
        _ => unreachable!("descriptor size fields are always 4 or 8 bytes"),
    }
}
