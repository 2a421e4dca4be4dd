//! The member iterator: drives the pull buffer, header parser and payload
//! decoder in sequence and enforces the "sequential, at-most-once" payload
//! consumption discipline described at the crate root.

use bytes::Bytes;

use crate::chunk::{ChunkSource, PullBuffer};
use crate::error::Result;
use crate::header::{self, Signature};
use crate::payload::PayloadDecoder;

const DEFAULT_CHUNK_SIZE: usize = 65536;

/// Tracks why the session stopped asking the parser for another member, so
/// `Drop` can tell a session that ran to completion apart from one that was
/// abandoned mid-archive.
enum State {
    Between,
    InMember,
    Finished,
}

/// Decodes a ZIP archive member-by-member from a [`ChunkSource`], without
/// ever reading the central directory or seeking.
///
/// `ZipDecoder` cannot implement `std::iter::Iterator` because each yielded
/// [`Member`] borrows the decoder mutably for the lifetime of its payload;
/// instead, drive it with an explicit loop:
///
/// ```no_run
/// use stream_unzip::{ChunkSource, IterChunkSource, ZipDecoder};
/// # use bytes::Bytes;
/// # use std::io;
/// # fn chunks() -> impl Iterator<Item = io::Result<Bytes>> { std::iter::empty() }
/// let mut decoder = ZipDecoder::new(IterChunkSource::new(chunks()));
/// while let Some(mut member) = decoder.next_member().unwrap() {
///     while let Some(_chunk) = member.next_chunk().unwrap() {
///         // consume payload
///     }
/// }
/// ```
pub struct ZipDecoder<S> {
    buf: PullBuffer<S>,
    chunk_size: usize,
    state: State,
}

impl<S: ChunkSource> ZipDecoder<S> {
    /// Creates a decoder with the default output chunk size (64 KiB).
    pub fn new(source: S) -> Self {
        Self::with_chunk_size(source, DEFAULT_CHUNK_SIZE)
    }

    /// Creates a decoder that yields payload chunks no larger than
    /// `chunk_size` bytes. `chunk_size` is clamped up to 1 so callers can't
    /// accidentally wedge the decoder with a zero-sized request.
    pub fn with_chunk_size(source: S, chunk_size: usize) -> Self {
        Self {
            buf: PullBuffer::new(source),
            chunk_size: chunk_size.max(1),
            state: State::Between,
        }
    }

    /// Parses the next member's header and returns a handle to it, or
    /// `None` once the session has ended (central directory reached, or the
    /// producer exhausted cleanly at a member boundary).
    ///
    /// If the previously returned [`Member`] still had unread payload, its
    /// `Drop` impl already drained it, so the parser cursor is correctly
    /// positioned here regardless of how much the caller actually read.
    pub fn next_member(&mut self) -> Result<Option<Member<'_, S>>> {
        if matches!(self.state, State::Finished) {
            return Ok(None);
        }
        match header::parse_next(&mut self.buf)? {
            None => {
                self.state = State::Finished;
                Ok(None)
            }
            Some(Signature::CentralDirectory) | Some(Signature::EndOfCentralDirectory) => {
                self.state = State::Finished;
                self.buf.drain_source_to_exhaustion()?;
                Ok(None)
            }
            Some(Signature::Local(local)) => {
                self.state = State::InMember;
                let size_hint = local.uncompressed_size;
                let name = local.name.clone();
                let decoder = PayloadDecoder::new(&local)?;
                Ok(Some(Member {
                    name,
                    size_hint,
                    decoder,
                    decoder_state: &mut self.state,
                    buf: &mut self.buf,
                    chunk_size: self.chunk_size,
                    exhausted: false,
                }))
            }
        }
    }
}

impl<S: ChunkSource> Drop for ZipDecoder<S> {
    fn drop(&mut self) {
        if !matches!(self.state, State::Finished) {
            self.buf.source_mut().cancel();
        }
    }
}

/// A single archive member: its name, its declared size (if the local
/// header carried one unambiguously), and its decompressed payload.
///
/// Dropping a `Member` before fully reading its payload drains and discards
/// the remainder so the next call to [`ZipDecoder::next_member`] starts at
/// the right offset; this is the core's safety net against a consumer that
/// stops reading partway through a file.
pub struct Member<'a, S> {
    name: Bytes,
    size_hint: Option<u64>,
    decoder: PayloadDecoder,
    decoder_state: &'a mut State,
    buf: &'a mut PullBuffer<S>,
    chunk_size: usize,
    exhausted: bool,
}

impl<'a, S: ChunkSource> Member<'a, S> {
    /// The member's file name, exactly as the raw bytes of the local
    /// header's filename field — no character-set decoding is performed.
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// The declared uncompressed size, when the local header carried it
    /// unambiguously. `None` when the "sizes in data descriptor" flag was
    /// set; the true size is only known once the payload is fully read.
    pub fn size_hint(&self) -> Option<u64> {
        self.size_hint
    }

    /// Returns the next chunk of decompressed payload, at most the
    /// decoder's configured chunk size and never empty, or `None` once the
    /// member is fully decoded.
    pub fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.exhausted {
            return Ok(None);
        }
        match self.decoder.next_chunk(self.buf, self.chunk_size) {
            Ok(Some(chunk)) => Ok(Some(chunk)),
            Ok(None) => {
                self.exhausted = true;
                *self.decoder_state = State::Between;
                Ok(None)
            }
            Err(err) => {
                self.exhausted = true;
                Err(err)
            }
        }
    }

    /// Reads and discards the entire remaining payload.
    fn drain(&mut self) -> Result<()> {
        while self.next_chunk()?.is_some() {}
        Ok(())
    }
}

impl<'a, S: ChunkSource> Drop for Member<'a, S> {
    fn drop(&mut self) {
        let _ = self.drain();
    }
}
